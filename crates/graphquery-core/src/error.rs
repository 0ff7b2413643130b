//! Error types for graphquery

use thiserror::Error;

use crate::search::SearchMode;

/// Result type alias using graphquery's Error
pub type Result<T> = std::result::Result<T, Error>;

/// graphquery error types with helpful messages and suggestions
#[derive(Error, Debug)]
pub enum Error {
    // Query errors (E001-E099)
    #[error("Invalid query: {0}")]
    InvalidQuery(String),

    // Search errors (E100-E199)
    #[error("{mode} search timed out after {after_ms} ms")]
    SearchTimeout { mode: SearchMode, after_ms: u64 },

    #[error("Search unavailable: {0}")]
    SearchUnavailable(String),

    #[error("Search returned a malformed response: {0}")]
    SearchMalformedResponse(String),

    // Enrichment errors (E200-E299)
    #[error("Enrichment of '{entity}' lost facet '{facet}': {reason}")]
    EnrichmentPartialFailure {
        entity: String,
        facet: String,
        reason: String,
    },

    // Run control (E300-E399)
    #[error("Query cancelled by caller")]
    Cancelled,

    // Graph store errors (E400-E499)
    #[error("Graph endpoint unavailable: {0}")]
    GraphUnavailable(String),

    #[error("Graph endpoint timed out after {0} ms")]
    GraphTimeout(u64),

    #[error("Malformed graph response: {0}")]
    MalformedResponse(String),

    #[error("Network error: {0}. Check that the SPARQL endpoint is reachable.")]
    NetworkError(#[from] reqwest::Error),

    // Config errors (E600-E699)
    #[error("Configuration error: {0}")]
    ConfigError(String),
}

impl Error {
    /// Get error code for this error type
    pub fn code(&self) -> &'static str {
        match self {
            Self::InvalidQuery(_) => "E001",
            Self::SearchTimeout { .. } => "E100",
            Self::SearchUnavailable(_) => "E101",
            Self::SearchMalformedResponse(_) => "E102",
            Self::EnrichmentPartialFailure { .. } => "E200",
            Self::Cancelled => "E300",
            Self::GraphUnavailable(_) => "E400",
            Self::GraphTimeout(_) => "E401",
            Self::MalformedResponse(_) => "E402",
            Self::NetworkError(_) => "E403",
            Self::ConfigError(_) => "E600",
        }
    }

    /// Get suggestion for how to fix this error
    pub fn suggestion(&self) -> Option<String> {
        match self {
            Self::InvalidQuery(_) => {
                Some("Use at least one word of three or more characters".to_string())
            }
            Self::SearchTimeout { .. } => {
                Some("graphquery config set search.timeout_ms <millis>".to_string())
            }
            Self::SearchUnavailable(_) | Self::GraphUnavailable(_) | Self::NetworkError(_) => {
                Some("graphquery doctor".to_string())
            }
            Self::GraphTimeout(_) => {
                Some("graphquery config set enrichment.timeout_ms <millis>".to_string())
            }
            Self::ConfigError(_) => Some("graphquery config list".to_string()),
            _ => None,
        }
    }

    /// Whether this error ends a query run instead of degrading it
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::InvalidQuery(_)
                | Self::SearchUnavailable(_)
                | Self::Cancelled
                | Self::ConfigError(_)
        )
    }

    /// Convert a graph-level failure into the per-searcher taxonomy
    ///
    /// Errors already in the search taxonomy pass through unchanged.
    pub fn into_search_error(self, mode: SearchMode) -> Self {
        match self {
            Self::GraphTimeout(after_ms) => Self::SearchTimeout { mode, after_ms },
            Self::GraphUnavailable(msg) => Self::SearchUnavailable(format!("{mode}: {msg}")),
            Self::NetworkError(e) if e.is_timeout() => Self::SearchTimeout { mode, after_ms: 0 },
            Self::NetworkError(e) => Self::SearchUnavailable(format!("{mode}: {e}")),
            Self::MalformedResponse(msg) => {
                Self::SearchMalformedResponse(format!("{mode}: {msg}"))
            }
            other @ (Self::SearchTimeout { .. }
            | Self::SearchUnavailable(_)
            | Self::SearchMalformedResponse(_)
            | Self::InvalidQuery(_)
            | Self::Cancelled) => other,
            other => Self::SearchUnavailable(format!("{mode}: {other}")),
        }
    }
}
