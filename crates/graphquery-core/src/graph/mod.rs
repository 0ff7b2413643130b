//! Entity-detail access to the knowledge graph
//!
//! [`GraphQueryClient`] is the boundary the enricher talks to: one method per
//! neighborhood facet so that each can be fetched, timed out and degraded
//! independently. [`SparqlGraphClient`] implements it over any
//! [`SparqlEndpoint`].

mod catalog;

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;
use tracing::debug;

use crate::config::Prefixes;
use crate::error::Result;
use crate::sparql::{SparqlEndpoint, builder};

pub use catalog::ClassCatalog;

/// One independently fetched part of an entity's neighborhood
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Facet {
    Label,
    Categories,
    Ontology,
    Income,
    Outcome,
    Similar,
    /// The entity as a whole (deadline, aborted task)
    All,
}

impl Facet {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Label => "label",
            Self::Categories => "categories",
            Self::Ontology => "ontology",
            Self::Income => "income",
            Self::Outcome => "outcome",
            Self::Similar => "similar",
            Self::All => "all",
        }
    }
}

impl fmt::Display for Facet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Neighborhood lookups for a single entity
#[async_trait]
pub trait GraphQueryClient: Send + Sync {
    /// Human-readable label, if the entity has one
    async fn label(&self, entity: &str) -> Result<Option<String>>;

    /// Category resources the entity links to
    async fn categories(&self, entity: &str) -> Result<Vec<String>>;

    /// Ontology classes the entity is typed with
    async fn ontology_links(&self, entity: &str) -> Result<Vec<String>>;

    /// Entities with a relation pointing at `entity`
    async fn income_entities(&self, entity: &str) -> Result<Vec<String>>;

    /// Entities `entity` has a relation to
    async fn outcome_entities(&self, entity: &str) -> Result<Vec<String>>;

    /// Entities linked to every given class and category, at most `limit`
    async fn similar_entities(
        &self,
        ontology: &[String],
        categories: &[String],
        limit: usize,
    ) -> Result<Vec<String>>;

    /// Labels of every ontology class, keyed by class IRI
    async fn class_labels(&self) -> Result<HashMap<String, String>>;
}

/// [`GraphQueryClient`] backed by SPARQL queries
pub struct SparqlGraphClient<E: SparqlEndpoint> {
    endpoint: Arc<E>,
    prefixes: Arc<Prefixes>,
}

impl<E: SparqlEndpoint> SparqlGraphClient<E> {
    pub fn new(endpoint: Arc<E>, prefixes: Arc<Prefixes>) -> Self {
        Self { endpoint, prefixes }
    }

    async fn first_column(&self, query: String) -> Result<Vec<String>> {
        debug!(query = %query, "Fetching entity facet");
        let mut values = self.endpoint.select(&query).await?.first_column()?;
        values.sort();
        values.dedup();
        Ok(values)
    }
}

#[async_trait]
impl<E: SparqlEndpoint + 'static> GraphQueryClient for SparqlGraphClient<E> {
    async fn label(&self, entity: &str) -> Result<Option<String>> {
        let query = builder::entity_label(&self.prefixes, entity)?;
        let results = self.endpoint.select(&query).await?;
        Ok(results.column("label").into_iter().next())
    }

    async fn categories(&self, entity: &str) -> Result<Vec<String>> {
        self.first_column(builder::categories(&self.prefixes, entity)?)
            .await
    }

    async fn ontology_links(&self, entity: &str) -> Result<Vec<String>> {
        self.first_column(builder::ontology_links(&self.prefixes, entity)?)
            .await
    }

    async fn income_entities(&self, entity: &str) -> Result<Vec<String>> {
        self.first_column(builder::income_entities(&self.prefixes, entity)?)
            .await
    }

    async fn outcome_entities(&self, entity: &str) -> Result<Vec<String>> {
        self.first_column(builder::outcome_entities(&self.prefixes, entity)?)
            .await
    }

    async fn similar_entities(
        &self,
        ontology: &[String],
        categories: &[String],
        limit: usize,
    ) -> Result<Vec<String>> {
        match builder::similar_entities(&self.prefixes, ontology, categories, limit)? {
            Some(query) => self.first_column(query).await,
            None => Ok(Vec::new()),
        }
    }

    async fn class_labels(&self) -> Result<HashMap<String, String>> {
        let results = self
            .endpoint
            .select(&builder::class_labels(&self.prefixes))
            .await?;

        let mut labels = HashMap::new();
        for row in results.rows() {
            if let (Some(class), Some(label)) = (row.get("class"), row.get("label")) {
                labels
                    .entry(class.value.clone())
                    .or_insert_with(|| label.value.clone());
            }
        }
        Ok(labels)
    }
}
