//! Structural search: label matches ranked by incoming relation count

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::debug;

use crate::config::Prefixes;
use crate::error::{Error, Result};
use crate::query::Query;
use crate::sparql::{SelectResults, SparqlEndpoint, builder};

use super::{SearchCandidate, SearchMode, SearchOutcome, SearchStrategy, Searcher, within_timeout};

/// Relation searcher over a SPARQL endpoint
pub struct RelationSearcher<E: SparqlEndpoint> {
    endpoint: Arc<E>,
    prefixes: Arc<Prefixes>,
    limit: usize,
    timeout: Duration,
}

impl<E: SparqlEndpoint> RelationSearcher<E> {
    pub fn new(endpoint: Arc<E>, prefixes: Arc<Prefixes>, limit: usize, timeout: Duration) -> Self {
        Self {
            endpoint,
            prefixes,
            limit,
            timeout,
        }
    }

    /// Run one strategy; `None` when it does not apply to these tokens
    async fn run(
        &self,
        tokens: &[String],
        strategy: SearchStrategy,
    ) -> Result<Option<Vec<SearchCandidate>>> {
        let Some(sparql) = builder::relation_search(&self.prefixes, tokens, strategy, self.limit)
        else {
            return Ok(None);
        };
        debug!(?strategy, query = %sparql, "Running relation search");
        let results = self.endpoint.select(&sparql).await?;
        parse_candidates(&results).map(Some)
    }
}

#[async_trait]
impl<E: SparqlEndpoint + 'static> Searcher for RelationSearcher<E> {
    fn mode(&self) -> SearchMode {
        SearchMode::Relation
    }

    async fn search(&self, query: &Query) -> Result<SearchOutcome> {
        within_timeout(SearchMode::Relation, self.timeout, async {
            let tokens = query.tokens();
            let exact = self.run(tokens, SearchStrategy::Exact).await?.unwrap_or_default();
            if !exact.is_empty() {
                return Ok(SearchOutcome::new(
                    SearchMode::Relation,
                    SearchStrategy::Exact,
                    exact,
                ));
            }

            let partial = self.run(tokens, SearchStrategy::Partial).await?;
            Ok(match partial {
                Some(candidates) => {
                    SearchOutcome::new(SearchMode::Relation, SearchStrategy::Partial, candidates)
                }
                None => SearchOutcome::new(SearchMode::Relation, SearchStrategy::Exact, exact),
            })
        })
        .await
    }
}

/// Turn `?o ?name ?relationCount` rows into candidates
///
/// Scores are relation counts normalized by the largest count in the set.
fn parse_candidates(results: &SelectResults) -> Result<Vec<SearchCandidate>> {
    let mut rows = Vec::with_capacity(results.rows().len());
    for row in results.rows() {
        let id = row
            .get("o")
            .map(|term| term.value.clone())
            .ok_or_else(|| Error::MalformedResponse("relation row without ?o".to_string()))?;
        let count: f64 = row
            .get("relationCount")
            .and_then(|term| term.value.trim().parse().ok())
            .ok_or_else(|| {
                Error::MalformedResponse(format!("relation row for '{}' has no numeric count", id))
            })?;
        let label = row.get("name").map(|term| term.value.clone());
        rows.push((id, count, label));
    }

    let max = rows.iter().map(|(_, count, _)| *count).fold(0.0_f64, f64::max);
    Ok(rows
        .into_iter()
        .map(|(id, count, label)| {
            let score = if max > 0.0 { count / max } else { 0.0 };
            let candidate = SearchCandidate::new(id, SearchMode::Relation, score);
            match label {
                Some(label) => candidate.with_label(label),
                None => candidate,
            }
        })
        .collect())
}
