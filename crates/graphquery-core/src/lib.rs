//! graphquery core library
//!
//! Hybrid question answering over a knowledge graph:
//! - Relation and text search run in parallel against a SPARQL endpoint
//! - Candidates are merged, filtered for bad links and enriched with their
//!   graph neighborhood
//! - Categories are scored against ontology links
//! - Failures of a single mode or facet degrade the answer instead of
//!   aborting it

pub mod config;
pub mod engine;
pub mod error;
pub mod graph;
pub mod pipeline;
pub mod query;
pub mod search;
pub mod sparql;

pub use error::{Error, Result};

/// Re-export commonly used types
pub mod prelude {
    pub use crate::config::Config;
    pub use crate::engine::{QueryEngine, RunOptions};
    pub use crate::error::{Error, Result};
    pub use crate::pipeline::{EnrichedEntity, QueryResult};
    pub use crate::search::{ModeSelection, SearchMode};
}
