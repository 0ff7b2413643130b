//! Ontology class labels, loaded once and shared read-only

use std::collections::{BTreeSet, HashMap};

use tracing::info;

use crate::error::Result;
use crate::query::{local_name, surface_tokens};

use super::GraphQueryClient;

/// Class IRI -> label lookup used when scoring categories
#[derive(Debug, Clone, Default)]
pub struct ClassCatalog {
    labels: HashMap<String, String>,
}

impl ClassCatalog {
    pub fn new(labels: HashMap<String, String>) -> Self {
        Self { labels }
    }

    /// Fetch every class label from the graph
    pub async fn load(graph: &dyn GraphQueryClient) -> Result<Self> {
        let labels = graph.class_labels().await?;
        info!(classes = labels.len(), "Loaded ontology class catalog");
        Ok(Self::new(labels))
    }

    pub fn label(&self, class: &str) -> Option<&str> {
        self.labels.get(class).map(String::as_str)
    }

    /// Surface tokens naming `class`: its label when known, else its local name
    pub fn tokens(&self, class: &str) -> BTreeSet<String> {
        match self.label(class) {
            Some(label) => surface_tokens(label).collect(),
            None => surface_tokens(local_name(class, "")).collect(),
        }
    }
}
