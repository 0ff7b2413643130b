//! CPU-side stages and enrichment between dispatch and the final result
//!
//! merge -> filter -> enrich (+ score) -> compose

mod composer;
mod enricher;
mod filter;
mod merge;
mod scorer;

pub use composer::{EnrichedEntity, QueryResult, compose};
pub use enricher::{Enrichment, EnrichmentFailure, EntityEnricher};
pub use filter::{LinkFilter, LinkedEntity, SurfaceLinks};
pub use merge::{MergedCandidate, merge};
pub use scorer::{CATEGORY_WEIGHT, CategoryScorer, ONTOLOGY_WEIGHT, ranked_categories, top_categories};
