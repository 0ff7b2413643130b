//! Lexical search: label matches ranked by token similarity

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::debug;

use crate::config::Prefixes;
use crate::error::{Error, Result};
use crate::query::{Query, local_name, query_tokens};
use crate::sparql::{SelectResults, SparqlEndpoint, builder};

use super::{SearchCandidate, SearchMode, SearchOutcome, SearchStrategy, Searcher, within_timeout};

/// Text searcher over a SPARQL endpoint
pub struct TextSearcher<E: SparqlEndpoint> {
    endpoint: Arc<E>,
    prefixes: Arc<Prefixes>,
    limit: usize,
    timeout: Duration,
}

impl<E: SparqlEndpoint> TextSearcher<E> {
    pub fn new(endpoint: Arc<E>, prefixes: Arc<Prefixes>, limit: usize, timeout: Duration) -> Self {
        Self {
            endpoint,
            prefixes,
            limit,
            timeout,
        }
    }

    async fn run(
        &self,
        query: &Query,
        strategy: SearchStrategy,
    ) -> Result<Option<Vec<SearchCandidate>>> {
        let Some(sparql) = builder::text_search(&self.prefixes, query.tokens(), strategy, self.limit)
        else {
            return Ok(None);
        };
        debug!(?strategy, query = %sparql, "Running text search");
        let results = self.endpoint.select(&sparql).await?;
        parse_candidates(&results, query, &self.prefixes.entity).map(Some)
    }
}

#[async_trait]
impl<E: SparqlEndpoint + 'static> Searcher for TextSearcher<E> {
    fn mode(&self) -> SearchMode {
        SearchMode::Text
    }

    async fn search(&self, query: &Query) -> Result<SearchOutcome> {
        within_timeout(SearchMode::Text, self.timeout, async {
            let exact = self.run(query, SearchStrategy::Exact).await?.unwrap_or_default();
            if !exact.is_empty() {
                return Ok(SearchOutcome::new(SearchMode::Text, SearchStrategy::Exact, exact));
            }

            Ok(match self.run(query, SearchStrategy::Partial).await? {
                Some(candidates) => {
                    SearchOutcome::new(SearchMode::Text, SearchStrategy::Partial, candidates)
                }
                None => SearchOutcome::new(SearchMode::Text, SearchStrategy::Exact, exact),
            })
        })
        .await
    }
}

fn parse_candidates(
    results: &SelectResults,
    query: &Query,
    entity_ns: &str,
) -> Result<Vec<SearchCandidate>> {
    let query_set: BTreeSet<&str> = query.tokens().iter().map(String::as_str).collect();
    let mut candidates = Vec::with_capacity(results.rows().len());

    for row in results.rows() {
        let id = row
            .get("o")
            .map(|term| term.value.clone())
            .ok_or_else(|| Error::MalformedResponse("text row without ?o".to_string()))?;
        let label = row.get("name").map(|term| term.value.clone());

        let name = label.as_deref().unwrap_or_else(|| local_name(&id, entity_ns));
        let score = jaccard(&query_set, &query_tokens(name));
        let candidate = SearchCandidate::new(id, SearchMode::Text, score);
        candidates.push(match label {
            Some(label) => candidate.with_label(label),
            None => candidate,
        });
    }
    Ok(candidates)
}

/// |A ∩ B| / |A ∪ B|, zero when both are empty
fn jaccard(query: &BTreeSet<&str>, name: &[String]) -> f64 {
    let name: BTreeSet<&str> = name.iter().map(String::as_str).collect();
    let union = query.union(&name).count();
    if union == 0 {
        return 0.0;
    }
    query.intersection(&name).count() as f64 / union as f64
}
