//! Relation and text search over the knowledge graph
//!
//! Two independent retrieval strategies produce [`SearchCandidate`]s:
//!
//! - **Relation search** ranks entities whose label matches the query by the
//!   number of distinct relations pointing at them.
//! - **Text search** ranks label matches by lexical similarity.
//!
//! The [`QueryDispatcher`] runs the selected searchers as parallel tasks and
//! degrades to whichever mode succeeded.

mod dispatcher;
mod relation;
mod text;

use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::query::Query;

pub use dispatcher::{DispatchOutcome, ModeFailure, QueryDispatcher};
pub use relation::RelationSearcher;
pub use text::TextSearcher;

/// Retrieval mode that produced a candidate
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SearchMode {
    Relation,
    Text,
}

impl SearchMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Relation => "relation",
            Self::Text => "text",
        }
    }
}

impl fmt::Display for SearchMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SearchMode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "relation" => Ok(Self::Relation),
            "text" => Ok(Self::Text),
            other => Err(Error::ConfigError(format!(
                "Unknown search mode '{}'. Valid modes: relation, text",
                other
            ))),
        }
    }
}

/// Which searchers a run dispatches
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ModeSelection {
    #[default]
    Both,
    RelationOnly,
    TextOnly,
}

impl ModeSelection {
    /// Build a selection from a list of configured modes
    ///
    /// An empty list is rejected; duplicates are ignored.
    pub fn from_modes(modes: &[SearchMode]) -> Result<Self> {
        let set: BTreeSet<SearchMode> = modes.iter().copied().collect();
        match (set.contains(&SearchMode::Relation), set.contains(&SearchMode::Text)) {
            (true, true) => Ok(Self::Both),
            (true, false) => Ok(Self::RelationOnly),
            (false, true) => Ok(Self::TextOnly),
            (false, false) => Err(Error::ConfigError(
                "At least one search mode must be selected".to_string(),
            )),
        }
    }

    /// Modes included in this selection, in canonical order
    pub fn modes(&self) -> Vec<SearchMode> {
        match self {
            Self::Both => vec![SearchMode::Relation, SearchMode::Text],
            Self::RelationOnly => vec![SearchMode::Relation],
            Self::TextOnly => vec![SearchMode::Text],
        }
    }

    pub fn includes(&self, mode: SearchMode) -> bool {
        self.modes().contains(&mode)
    }
}

impl FromStr for ModeSelection {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "both" | "all" => Ok(Self::Both),
            "relation" => Ok(Self::RelationOnly),
            "text" => Ok(Self::TextOnly),
            other => Err(Error::ConfigError(format!(
                "Unknown mode selection '{}'. Valid options: both, relation, text",
                other
            ))),
        }
    }
}

/// Which query variant answered a search
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SearchStrategy {
    /// Label matched every query token
    Exact,
    /// Label matched a contiguous subset of the tokens
    Partial,
}

/// A single hit from one searcher
#[derive(Debug, Clone, PartialEq)]
pub struct SearchCandidate {
    /// Entity IRI
    pub id: String,
    /// Mode that produced the hit
    pub mode: SearchMode,
    /// Searcher-internal relevance in `[0, 1]`
    pub score: f64,
    /// Label sampled by the searcher, when the store returned one
    pub label: Option<String>,
}

impl SearchCandidate {
    pub fn new(id: impl Into<String>, mode: SearchMode, score: f64) -> Self {
        Self {
            id: id.into(),
            mode,
            score,
            label: None,
        }
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }
}

/// Everything one searcher returned for one query
#[derive(Debug, Clone)]
pub struct SearchOutcome {
    pub mode: SearchMode,
    pub strategy: SearchStrategy,
    /// Ordered by score descending, identifier ascending
    pub candidates: Vec<SearchCandidate>,
}

impl SearchOutcome {
    /// Build an outcome, establishing the candidate order
    pub fn new(
        mode: SearchMode,
        strategy: SearchStrategy,
        mut candidates: Vec<SearchCandidate>,
    ) -> Self {
        sort_candidates(&mut candidates);
        Self {
            mode,
            strategy,
            candidates,
        }
    }
}

/// A retrieval strategy over the graph
///
/// Implementations apply their own timeout and report failures in the
/// search taxonomy (`SearchTimeout`, `SearchUnavailable`,
/// `SearchMalformedResponse`). Each call re-executes the search.
#[async_trait]
pub trait Searcher: Send + Sync {
    /// Mode this searcher contributes
    fn mode(&self) -> SearchMode;

    /// Run the search for `query`
    async fn search(&self, query: &Query) -> Result<SearchOutcome>;
}

/// Run one searcher's graph round-trips under its timeout
///
/// Graph-level failures come back in the search taxonomy.
pub(crate) async fn within_timeout<T, F>(mode: SearchMode, timeout: Duration, work: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    match tokio::time::timeout(timeout, work).await {
        Ok(result) => result.map_err(|e| e.into_search_error(mode)),
        Err(_) => Err(Error::SearchTimeout {
            mode,
            after_ms: timeout.as_millis() as u64,
        }),
    }
}

/// Score descending, identifier ascending
pub(crate) fn sort_candidates(candidates: &mut [SearchCandidate]) {
    candidates.sort_by(|a, b| b.score.total_cmp(&a.score).then_with(|| a.id.cmp(&b.id)));
}
