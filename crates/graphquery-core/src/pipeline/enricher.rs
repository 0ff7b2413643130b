//! Concurrent neighborhood enrichment of filtered candidates
//!
//! Each candidate is enriched in its own task, at most `max_in_flight` at a
//! time. Within a task the label, categories, ontology links and
//! income/outcome entities are fetched concurrently; similar entities follow
//! once categories are scored. Links already fetched by the link filter are
//! reused. A failed facet is left empty and recorded.

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::error::{Error, Result};
use crate::graph::{Facet, GraphQueryClient};

use super::composer::{EnrichedEntity, fallback_label};
use super::filter::LinkedEntity;
use super::merge::MergedCandidate;
use super::scorer::{CategoryScorer, ranked_categories, top_categories};

/// Most categories combined into one similar-entity lookup
const MAX_SIMILAR_CATEGORIES: usize = 3;

/// A facet that could not be fetched
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EnrichmentFailure {
    pub entity: String,
    pub facet: Facet,
    pub reason: String,
}

impl EnrichmentFailure {
    pub fn new(entity: impl Into<String>, facet: Facet, reason: impl Into<String>) -> Self {
        Self {
            entity: entity.into(),
            facet,
            reason: reason.into(),
        }
    }

    fn log(&self) {
        let error = Error::EnrichmentPartialFailure {
            entity: self.entity.clone(),
            facet: self.facet.to_string(),
            reason: self.reason.clone(),
        };
        warn!(code = error.code(), error = %error, "Enrichment degraded");
    }
}

/// Entities in input order plus every recorded failure
#[derive(Debug, Default)]
pub struct Enrichment {
    pub entities: Vec<EnrichedEntity>,
    pub failures: Vec<EnrichmentFailure>,
}

/// Fetches entity neighborhoods through a [`GraphQueryClient`]
#[derive(Clone)]
pub struct EntityEnricher {
    graph: Arc<dyn GraphQueryClient>,
    scorer: CategoryScorer,
    entity_ns: String,
    timeout: Duration,
    similar_limit: usize,
    max_in_flight: usize,
}

impl EntityEnricher {
    pub fn new(
        graph: Arc<dyn GraphQueryClient>,
        scorer: CategoryScorer,
        entity_ns: impl Into<String>,
    ) -> Self {
        Self {
            graph,
            scorer,
            entity_ns: entity_ns.into(),
            timeout: Duration::from_millis(5_000),
            similar_limit: 10,
            max_in_flight: 8,
        }
    }

    /// Per-facet timeout
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_similar_limit(mut self, limit: usize) -> Self {
        self.similar_limit = limit;
        self
    }

    /// Candidates enriched concurrently
    pub fn with_max_in_flight(mut self, max: usize) -> Self {
        self.max_in_flight = max.max(1);
        self
    }

    /// Enrich every candidate, returning entities in input order
    ///
    /// On `deadline`, unfinished candidates come back with empty facets and a
    /// failure for [`Facet::All`]. Only caller cancellation is an error.
    pub async fn enrich(
        &self,
        candidates: Vec<LinkedEntity>,
        deadline: Option<Instant>,
        cancel: &CancellationToken,
    ) -> Result<Enrichment> {
        let bare: Vec<MergedCandidate> = candidates
            .iter()
            .map(|linked| linked.candidate.clone())
            .collect();
        let mut slots: Vec<Option<(EnrichedEntity, Vec<EnrichmentFailure>)>> =
            vec![None; bare.len()];

        let permits = Arc::new(Semaphore::new(self.max_in_flight));
        let mut tasks = JoinSet::new();
        for (index, linked) in candidates.into_iter().enumerate() {
            let enricher = self.clone();
            let permits = Arc::clone(&permits);
            tasks.spawn(async move {
                let _permit = permits.acquire_owned().await;
                (index, enricher.enrich_one(linked).await)
            });
        }

        let expired = async {
            match deadline {
                Some(at) => tokio::time::sleep_until(at).await,
                None => std::future::pending::<()>().await,
            }
        };
        tokio::pin!(expired);

        let mut unfinished_reason = "enrichment task did not complete".to_string();
        loop {
            tokio::select! {
                biased;

                _ = cancel.cancelled() => {
                    tasks.abort_all();
                    debug!("Enrichment cancelled by caller");
                    return Err(Error::Cancelled);
                }

                _ = &mut expired => {
                    tasks.abort_all();
                    unfinished_reason = "deadline expired before enrichment finished".to_string();
                    break;
                }

                joined = tasks.join_next() => match joined {
                    Some(Ok((index, enriched))) => slots[index] = Some(enriched),
                    Some(Err(join_error)) => {
                        warn!(error = %join_error, "Enrichment task did not complete");
                    }
                    None => break,
                },
            }
        }

        let mut enrichment = Enrichment::default();
        for (candidate, slot) in bare.iter().zip(slots) {
            let (entity, failures) = slot.unwrap_or_else(|| {
                let failure =
                    EnrichmentFailure::new(candidate.id.clone(), Facet::All, unfinished_reason.clone());
                failure.log();
                (EnrichedEntity::bare(candidate, &self.entity_ns), vec![failure])
            });
            enrichment.entities.push(entity);
            enrichment.failures.extend(failures);
        }
        Ok(enrichment)
    }

    /// Fetch one candidate's neighborhood, degrading per facet
    async fn enrich_one(&self, linked: LinkedEntity) -> (EnrichedEntity, Vec<EnrichmentFailure>) {
        let LinkedEntity {
            candidate, links, ..
        } = linked;
        let id = candidate.id.as_str();
        let graph = self.graph.as_ref();
        let mut failures = Vec::new();

        let (label, categories, ontology, income, outcome) = tokio::join!(
            self.fetch(id, Facet::Label, graph.label(id)),
            self.fetch(
                id,
                Facet::Categories,
                known_or(links.categories, graph.categories(id))
            ),
            self.fetch(
                id,
                Facet::Ontology,
                known_or(links.ontology_links, graph.ontology_links(id))
            ),
            self.fetch(id, Facet::Income, graph.income_entities(id)),
            self.fetch(id, Facet::Outcome, graph.outcome_entities(id)),
        );
        let label = settle(label, &mut failures);
        let categories = settle(categories, &mut failures);
        let ontology_links = settle(ontology, &mut failures);
        let income_entities = settle(income, &mut failures);
        let outcome_entities = settle(outcome, &mut failures);

        let scored_categories = self.scorer.score(&categories, &ontology_links);
        let ranked = ranked_categories(&scored_categories);
        let similar = self
            .fetch(id, Facet::Similar, self.similar(id, &ranked, &ontology_links))
            .await;
        let similar_entities = settle(similar, &mut failures);

        debug!(
            entity = %id,
            categories = categories.len(),
            ontology = ontology_links.len(),
            similar = similar_entities.len(),
            failed_facets = failures.len(),
            "Entity enriched"
        );

        let mut entity = EnrichedEntity::bare(&candidate, &self.entity_ns);
        entity.label = label.unwrap_or_else(|| fallback_label(&candidate, &self.entity_ns));
        entity.top_categories = top_categories(&scored_categories);
        entity.scored_categories = scored_categories;
        entity.categories = categories;
        entity.ontology_links = ontology_links;
        entity.income_entities = income_entities;
        entity.outcome_entities = outcome_entities;
        entity.similar_entities = similar_entities;
        (entity, failures)
    }

    /// Entities sharing the strongest categories and the ontology classes
    ///
    /// With more than [`MAX_SIMILAR_CATEGORIES`] categories, the top three,
    /// two, then one are tried until more than one match turns up. Otherwise
    /// only the ontology classes constrain the lookup.
    async fn similar(&self, id: &str, ranked: &[String], ontology: &[String]) -> Result<Vec<String>> {
        let limit = self.similar_limit + 1;
        let mut found = Vec::new();

        if ranked.len() > MAX_SIMILAR_CATEGORIES {
            for take in (1..=MAX_SIMILAR_CATEGORIES).rev() {
                found = self
                    .graph
                    .similar_entities(ontology, &ranked[..take], limit)
                    .await?;
                found.retain(|entity| entity != id);
                if found.len() > 1 {
                    break;
                }
            }
        } else if !ontology.is_empty() {
            found = self.graph.similar_entities(ontology, &[], limit).await?;
        }

        found.retain(|entity| entity != id);
        found.sort();
        found.dedup();
        found.truncate(self.similar_limit);
        Ok(found)
    }

    async fn fetch<T>(
        &self,
        entity: &str,
        facet: Facet,
        work: impl Future<Output = Result<T>>,
    ) -> std::result::Result<T, EnrichmentFailure> {
        match tokio::time::timeout(self.timeout, work).await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(error)) => Err(EnrichmentFailure::new(entity, facet, error.to_string())),
            Err(_) => Err(EnrichmentFailure::new(
                entity,
                facet,
                format!("timed out after {} ms", self.timeout.as_millis()),
            )),
        }
    }
}

/// Links fetched earlier, or the lookup that fetches them
async fn known_or(
    known: Option<Vec<String>>,
    lookup: impl Future<Output = Result<Vec<String>>>,
) -> Result<Vec<String>> {
    match known {
        Some(links) => Ok(links),
        None => lookup.await,
    }
}

/// Keep a fetched facet, or log the failure and fall back to empty
fn settle<T: Default>(
    fetched: std::result::Result<T, EnrichmentFailure>,
    failures: &mut Vec<EnrichmentFailure>,
) -> T {
    match fetched {
        Ok(value) => value,
        Err(failure) => {
            failure.log();
            failures.push(failure);
            T::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::ClassCatalog;
    use crate::pipeline::{SurfaceLinks, merge};
    use crate::search::{SearchCandidate, SearchMode};
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::sync::Mutex;

    const NS: &str = "http://fkg.iust.ac.ir/resource/";
    const CAT: &str = "http://fkg.iust.ac.ir/category/";

    /// In-memory neighborhood with optional failing entities and facets
    #[derive(Default)]
    struct FakeGraph {
        categories: HashMap<String, Vec<String>>,
        fail_entity: Option<String>,
        fail_facet: Option<Facet>,
        slow_entity: Option<String>,
        similar_calls: Mutex<Vec<(usize, usize)>>,
        similar_answer: Vec<String>,
    }

    impl FakeGraph {
        async fn check(&self, entity: &str, facet: Facet) -> Result<()> {
            if self.slow_entity.as_deref() == Some(entity) {
                tokio::time::sleep(Duration::from_secs(60)).await;
            }
            if self.fail_entity.as_deref() == Some(entity)
                && self.fail_facet.is_none_or(|f| f == facet)
            {
                return Err(Error::GraphUnavailable("store down".to_string()));
            }
            Ok(())
        }
    }

    #[async_trait]
    impl GraphQueryClient for FakeGraph {
        async fn label(&self, entity: &str) -> Result<Option<String>> {
            self.check(entity, Facet::Label).await?;
            Ok(None)
        }

        async fn categories(&self, entity: &str) -> Result<Vec<String>> {
            self.check(entity, Facet::Categories).await?;
            Ok(self.categories.get(entity).cloned().unwrap_or_default())
        }

        async fn ontology_links(&self, entity: &str) -> Result<Vec<String>> {
            self.check(entity, Facet::Ontology).await?;
            Ok(vec!["http://ex.org/onto/City".to_string()])
        }

        async fn income_entities(&self, entity: &str) -> Result<Vec<String>> {
            self.check(entity, Facet::Income).await?;
            Ok(vec![format!("{NS}France")])
        }

        async fn outcome_entities(&self, entity: &str) -> Result<Vec<String>> {
            self.check(entity, Facet::Outcome).await?;
            Ok(vec![format!("{NS}Seine")])
        }

        async fn similar_entities(
            &self,
            ontology: &[String],
            categories: &[String],
            _limit: usize,
        ) -> Result<Vec<String>> {
            self.similar_calls
                .lock()
                .unwrap()
                .push((ontology.len(), categories.len()));
            Ok(self.similar_answer.clone())
        }

        async fn class_labels(&self) -> Result<HashMap<String, String>> {
            Ok(HashMap::new())
        }
    }

    fn enricher(graph: Arc<FakeGraph>) -> EntityEnricher {
        let scorer = CategoryScorer::new(Arc::new(ClassCatalog::default()), CAT);
        EntityEnricher::new(graph, scorer, NS).with_timeout(Duration::from_millis(200))
    }

    fn linked(names: &[&str]) -> Vec<LinkedEntity> {
        let candidates = names
            .iter()
            .enumerate()
            .map(|(i, name)| {
                SearchCandidate::new(format!("{NS}{name}"), SearchMode::Relation, 1.0 - i as f64 * 0.1)
            })
            .collect();
        merge(candidates, Vec::new())
            .into_iter()
            .map(|c| LinkedEntity::new(c, NS))
            .collect()
    }

    #[tokio::test]
    async fn test_full_enrichment() {
        let graph = Arc::new(FakeGraph {
            categories: HashMap::from([(
                format!("{NS}Paris"),
                vec![format!("{CAT}City_districts")],
            )]),
            similar_answer: vec![format!("{NS}Paris"), format!("{NS}Lyon")],
            ..Default::default()
        });
        let result = enricher(Arc::clone(&graph))
            .enrich(linked(&["Paris"]), None, &CancellationToken::new())
            .await
            .unwrap();

        assert!(result.failures.is_empty());
        let paris = &result.entities[0];
        assert_eq!(paris.label(), "Paris");
        assert_eq!(paris.categories(), &[format!("{CAT}City_districts")]);
        assert_eq!(paris.scored_categories()[&format!("{CAT}City_districts")], 1.5);
        assert_eq!(paris.top_categories(), &[format!("{CAT}City_districts")]);
        assert_eq!(paris.income_entities(), &[format!("{NS}France")]);
        assert_eq!(paris.outcome_entities(), &[format!("{NS}Seine")]);
        // the entity itself is never similar to itself
        assert_eq!(paris.similar_entities(), &[format!("{NS}Lyon")]);
        assert_eq!(graph.similar_calls.lock().unwrap().as_slice(), &[(1, 0)]);
    }

    #[tokio::test]
    async fn test_links_from_filter_are_reused() {
        let graph = Arc::new(FakeGraph {
            fail_entity: Some(format!("{NS}Lyon")),
            fail_facet: Some(Facet::Categories),
            ..Default::default()
        });
        let mut lyon = linked(&["Lyon"]);
        lyon[0].links = SurfaceLinks {
            categories: Some(vec![format!("{CAT}Cities_in_France")]),
            ontology_links: None,
        };
        let result = enricher(graph)
            .enrich(lyon, None, &CancellationToken::new())
            .await
            .unwrap();

        // categories come from the filter, ontology links are still fetched
        assert!(result.failures.is_empty());
        let lyon = &result.entities[0];
        assert_eq!(lyon.categories(), &[format!("{CAT}Cities_in_France")]);
        assert_eq!(lyon.ontology_links(), &["http://ex.org/onto/City".to_string()]);
    }

    #[tokio::test]
    async fn test_similar_narrows_categories() {
        let categories: Vec<String> = ["Alpha", "Beta", "Gamma", "Delta"]
            .iter()
            .map(|c| format!("{CAT}{c}"))
            .collect();
        let graph = Arc::new(FakeGraph {
            categories: HashMap::from([(format!("{NS}Paris"), categories)]),
            similar_answer: vec![format!("{NS}Lyon")],
            ..Default::default()
        });
        enricher(Arc::clone(&graph))
            .enrich(linked(&["Paris"]), None, &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(
            graph.similar_calls.lock().unwrap().as_slice(),
            &[(1, 3), (1, 2), (1, 1)]
        );
    }

    #[tokio::test]
    async fn test_failed_facet_is_empty_and_recorded() {
        let graph = Arc::new(FakeGraph {
            fail_entity: Some(format!("{NS}Paris")),
            fail_facet: Some(Facet::Income),
            ..Default::default()
        });
        let result = enricher(graph)
            .enrich(linked(&["Paris"]), None, &CancellationToken::new())
            .await
            .unwrap();
        let paris = &result.entities[0];
        assert!(paris.income_entities().is_empty());
        assert_eq!(paris.outcome_entities(), &[format!("{NS}Seine")]);
        assert_eq!(result.failures.len(), 1);
        assert_eq!(result.failures[0].facet, Facet::Income);
    }

    #[tokio::test]
    async fn test_one_entity_failing_leaves_others_intact() {
        let graph = Arc::new(FakeGraph {
            fail_entity: Some(format!("{NS}Lyon")),
            ..Default::default()
        });
        let result = enricher(graph)
            .enrich(linked(&["Paris", "Lyon"]), None, &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(result.entities.len(), 2);
        assert_eq!(result.entities[0].identifier(), format!("{NS}Paris"));
        assert_eq!(result.entities[0].ontology_links().len(), 1);
        assert_eq!(result.entities[1].label(), "Lyon");
        assert!(result.entities[1].ontology_links().is_empty());
        assert!(result.failures.iter().all(|f| f.entity == format!("{NS}Lyon")));
        assert_eq!(result.failures.len(), 5);
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_facets_time_out() {
        let graph = Arc::new(FakeGraph {
            slow_entity: Some(format!("{NS}Paris")),
            ..Default::default()
        });
        let result = enricher(graph)
            .enrich(linked(&["Paris"]), None, &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(result.entities.len(), 1);
        assert!(result.failures.iter().all(|f| f.reason.contains("timed out")));
    }

    #[tokio::test(start_paused = true)]
    async fn test_deadline_returns_bare_entities() {
        let graph = Arc::new(FakeGraph {
            slow_entity: Some(format!("{NS}Lyon")),
            ..Default::default()
        });
        let enricher = enricher(graph).with_timeout(Duration::from_secs(120));
        let deadline = Instant::now() + Duration::from_millis(50);
        let result = enricher
            .enrich(linked(&["Paris", "Lyon"]), Some(deadline), &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(result.entities.len(), 2);
        assert_eq!(result.entities[0].income_entities().len(), 1);
        assert!(result.entities[1].income_entities().is_empty());
        assert_eq!(
            result.failures,
            vec![EnrichmentFailure::new(
                format!("{NS}Lyon"),
                Facet::All,
                "deadline expired before enrichment finished"
            )]
        );
    }

    #[tokio::test]
    async fn test_cancelled_enrichment_errors() {
        let cancel = CancellationToken::new();
        cancel.cancel();
        let err = enricher(Arc::new(FakeGraph::default()))
            .enrich(linked(&["Paris"]), None, &cancel)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Cancelled));
    }
}
