//! Final result assembly

use std::collections::{BTreeMap, BTreeSet};

use serde::Serialize;

use crate::query::local_name;
use crate::search::{SearchMode, SearchStrategy};

use super::enricher::EnrichmentFailure;
use super::merge::MergedCandidate;

/// A surviving entity with its graph neighborhood
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EnrichedEntity {
    pub(crate) identifier: String,
    pub(crate) label: String,
    pub(crate) modes: BTreeSet<SearchMode>,
    pub(crate) score: f64,
    pub(crate) categories: Vec<String>,
    pub(crate) top_categories: Vec<String>,
    pub(crate) scored_categories: BTreeMap<String, f64>,
    pub(crate) ontology_links: Vec<String>,
    pub(crate) income_entities: Vec<String>,
    pub(crate) outcome_entities: Vec<String>,
    pub(crate) similar_entities: Vec<String>,
}

impl EnrichedEntity {
    /// Entity with every facet empty
    ///
    /// The label falls back to the search label, then to the local name with
    /// underscores as spaces.
    pub(crate) fn bare(candidate: &MergedCandidate, entity_ns: &str) -> Self {
        Self {
            identifier: candidate.id.clone(),
            label: fallback_label(candidate, entity_ns),
            modes: candidate.modes.clone(),
            score: candidate.score,
            categories: Vec::new(),
            top_categories: Vec::new(),
            scored_categories: BTreeMap::new(),
            ontology_links: Vec::new(),
            income_entities: Vec::new(),
            outcome_entities: Vec::new(),
            similar_entities: Vec::new(),
        }
    }

    pub fn identifier(&self) -> &str {
        &self.identifier
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn modes(&self) -> &BTreeSet<SearchMode> {
        &self.modes
    }

    pub fn score(&self) -> f64 {
        self.score
    }

    pub fn categories(&self) -> &[String] {
        &self.categories
    }

    /// Categories scoring at or above the mean, best first
    pub fn top_categories(&self) -> &[String] {
        &self.top_categories
    }

    pub fn scored_categories(&self) -> &BTreeMap<String, f64> {
        &self.scored_categories
    }

    pub fn ontology_links(&self) -> &[String] {
        &self.ontology_links
    }

    pub fn income_entities(&self) -> &[String] {
        &self.income_entities
    }

    pub fn outcome_entities(&self) -> &[String] {
        &self.outcome_entities
    }

    pub fn similar_entities(&self) -> &[String] {
        &self.similar_entities
    }
}

pub(crate) fn fallback_label(candidate: &MergedCandidate, entity_ns: &str) -> String {
    match &candidate.label {
        Some(label) => label.clone(),
        None => local_name(&candidate.id, entity_ns).replace('_', " "),
    }
}

/// Answer to one query run
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryResult {
    modes_used: BTreeSet<SearchMode>,
    strategies: BTreeMap<SearchMode, SearchStrategy>,
    entities: Vec<EnrichedEntity>,
    enrichment_failures: Vec<EnrichmentFailure>,
}

impl QueryResult {
    /// Modes whose searcher contributed to this result
    pub fn modes_used(&self) -> &BTreeSet<SearchMode> {
        &self.modes_used
    }

    /// Query variant that answered each contributing mode
    pub fn strategies(&self) -> &BTreeMap<SearchMode, SearchStrategy> {
        &self.strategies
    }

    pub fn entities(&self) -> &[EnrichedEntity] {
        &self.entities
    }

    pub fn entity(&self, identifier: &str) -> Option<&EnrichedEntity> {
        self.entities.iter().find(|e| e.identifier == identifier)
    }

    /// Facets that could not be fetched; the entities are still present
    pub fn enrichment_failures(&self) -> &[EnrichmentFailure] {
        &self.enrichment_failures
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }
}

/// Assemble the result
///
/// Entities are ordered by score descending, identifier ascending; failures
/// by entity then facet.
pub fn compose(
    mut entities: Vec<EnrichedEntity>,
    modes_used: BTreeSet<SearchMode>,
    strategies: BTreeMap<SearchMode, SearchStrategy>,
    mut enrichment_failures: Vec<EnrichmentFailure>,
) -> QueryResult {
    entities.sort_by(|a, b| {
        b.score
            .total_cmp(&a.score)
            .then_with(|| a.identifier.cmp(&b.identifier))
    });
    enrichment_failures.sort_by(|a, b| a.entity.cmp(&b.entity).then_with(|| a.facet.cmp(&b.facet)));

    QueryResult {
        modes_used,
        strategies,
        entities,
        enrichment_failures,
    }
}
