//! Bad-link filtering of merged candidates
//!
//! Text-only hits must share enough tokens with the query through their
//! surface: IRI local name, search label, category links and ontology links.
//! Hits backed by relation search are kept regardless of lexical overlap.
//! Links are only fetched for text-only hits whose name and label fall short.

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::error::{Error, Result};
use crate::graph::{ClassCatalog, Facet, GraphQueryClient};
use crate::query::{Query, local_name, surface_tokens};
use crate::search::SearchMode;

use super::merge::MergedCandidate;

/// Category and ontology links fetched while filtering
///
/// `None` means the facet was not fetched, or its lookup failed.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SurfaceLinks {
    pub categories: Option<Vec<String>>,
    pub ontology_links: Option<Vec<String>>,
}

/// A candidate together with the tokens it is known by
#[derive(Debug, Clone, PartialEq)]
pub struct LinkedEntity {
    pub candidate: MergedCandidate,
    pub surface_tokens: BTreeSet<String>,
    pub links: SurfaceLinks,
}

impl LinkedEntity {
    /// Surface made of the IRI local name and the search label
    pub fn new(candidate: MergedCandidate, entity_ns: &str) -> Self {
        let mut tokens: BTreeSet<String> =
            surface_tokens(local_name(&candidate.id, entity_ns)).collect();
        if let Some(label) = candidate.label.as_deref() {
            tokens.extend(surface_tokens(label));
        }
        Self {
            candidate,
            surface_tokens: tokens,
            links: SurfaceLinks::default(),
        }
    }

    /// Add the tokens of fetched category and ontology links
    fn attach(&mut self, links: SurfaceLinks, catalog: &ClassCatalog, category_ns: &str) {
        for category in links.categories.iter().flatten() {
            self.surface_tokens
                .extend(surface_tokens(local_name(category, category_ns)));
        }
        for class in links.ontology_links.iter().flatten() {
            self.surface_tokens.extend(catalog.tokens(class));
        }
        self.links = links;
    }

    /// Number of query tokens this entity's surface mentions
    pub fn overlap(&self, query: &Query) -> usize {
        query
            .tokens()
            .iter()
            .filter(|token| self.surface_tokens.contains(*token))
            .count()
    }
}

/// Token-overlap filter
#[derive(Clone)]
pub struct LinkFilter {
    graph: Arc<dyn GraphQueryClient>,
    catalog: Arc<ClassCatalog>,
    entity_ns: String,
    category_ns: String,
    min_shared_tokens: usize,
    timeout: Duration,
    max_in_flight: usize,
}

impl LinkFilter {
    pub fn new(
        graph: Arc<dyn GraphQueryClient>,
        catalog: Arc<ClassCatalog>,
        entity_ns: impl Into<String>,
        category_ns: impl Into<String>,
        min_shared_tokens: usize,
    ) -> Self {
        Self {
            graph,
            catalog,
            entity_ns: entity_ns.into(),
            category_ns: category_ns.into(),
            min_shared_tokens,
            timeout: Duration::from_millis(5_000),
            max_in_flight: 8,
        }
    }

    /// Timeout for each link lookup
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Candidates whose links are fetched concurrently
    pub fn with_max_in_flight(mut self, max: usize) -> Self {
        self.max_in_flight = max.max(1);
        self
    }

    /// Overlap a candidate needs to survive without relation evidence
    pub fn threshold(&self, query: &Query) -> usize {
        self.min_shared_tokens.min(query.tokens().len())
    }

    /// Drop text-only candidates whose overlap is below the threshold
    ///
    /// Input order is preserved. Candidates whose links could not be fetched
    /// before `deadline` are judged on their name and label alone. Only
    /// caller cancellation is an error.
    pub async fn filter(
        &self,
        candidates: Vec<MergedCandidate>,
        query: &Query,
        deadline: Option<Instant>,
        cancel: &CancellationToken,
    ) -> Result<Vec<LinkedEntity>> {
        let threshold = self.threshold(query);
        let mut linked: Vec<LinkedEntity> = candidates
            .into_iter()
            .map(|candidate| LinkedEntity::new(candidate, &self.entity_ns))
            .collect();

        let short: Vec<(usize, String)> = linked
            .iter()
            .enumerate()
            .filter(|(_, l)| {
                !l.candidate.has_mode(SearchMode::Relation) && l.overlap(query) < threshold
            })
            .map(|(index, l)| (index, l.candidate.id.clone()))
            .collect();
        if !short.is_empty() {
            for (index, links) in self.fetch_links(short, deadline, cancel).await? {
                linked[index].attach(links, &self.catalog, &self.category_ns);
            }
        }

        Ok(linked
            .into_iter()
            .filter(|linked| {
                let overlap = linked.overlap(query);
                let keep = overlap >= threshold || linked.candidate.has_mode(SearchMode::Relation);
                if !keep {
                    debug!(entity = %linked.candidate.id, overlap, threshold, "Dropping bad link");
                }
                keep
            })
            .collect())
    }

    async fn fetch_links(
        &self,
        entities: Vec<(usize, String)>,
        deadline: Option<Instant>,
        cancel: &CancellationToken,
    ) -> Result<Vec<(usize, SurfaceLinks)>> {
        let permits = Arc::new(Semaphore::new(self.max_in_flight));
        let mut tasks = JoinSet::new();
        for (index, id) in entities {
            let graph = Arc::clone(&self.graph);
            let permits = Arc::clone(&permits);
            let timeout = self.timeout;
            tasks.spawn(async move {
                let _permit = permits.acquire_owned().await;
                (index, surface_links(graph.as_ref(), &id, timeout).await)
            });
        }

        let expired = async {
            match deadline {
                Some(at) => tokio::time::sleep_until(at).await,
                None => std::future::pending::<()>().await,
            }
        };
        tokio::pin!(expired);

        let mut fetched = Vec::new();
        loop {
            tokio::select! {
                biased;

                _ = cancel.cancelled() => {
                    tasks.abort_all();
                    debug!("Link lookup cancelled by caller");
                    return Err(Error::Cancelled);
                }

                _ = &mut expired => {
                    tasks.abort_all();
                    warn!(pending = tasks.len(), "Deadline expired during link lookup");
                    break;
                }

                joined = tasks.join_next() => match joined {
                    Some(Ok(links)) => fetched.push(links),
                    Some(Err(join_error)) => {
                        warn!(error = %join_error, "Link lookup task did not complete");
                    }
                    None => break,
                },
            }
        }
        Ok(fetched)
    }
}

/// Fetch the category and ontology links of one entity
async fn surface_links(graph: &dyn GraphQueryClient, id: &str, timeout: Duration) -> SurfaceLinks {
    let (categories, ontology) = tokio::join!(
        tokio::time::timeout(timeout, graph.categories(id)),
        tokio::time::timeout(timeout, graph.ontology_links(id)),
    );
    SurfaceLinks {
        categories: settle(id, Facet::Categories, categories),
        ontology_links: settle(id, Facet::Ontology, ontology),
    }
}

fn settle<E>(
    id: &str,
    facet: Facet,
    fetched: std::result::Result<Result<Vec<String>>, E>,
) -> Option<Vec<String>> {
    match fetched {
        Ok(Ok(links)) => Some(links),
        Ok(Err(error)) => {
            warn!(entity = %id, %facet, error = %error, "Link lookup failed");
            None
        }
        Err(_) => {
            warn!(entity = %id, %facet, "Link lookup timed out");
            None
        }
    }
}
