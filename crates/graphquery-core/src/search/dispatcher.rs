//! Parallel dispatch of the selected searchers
//!
//! Every selected searcher runs as its own task in a [`JoinSet`] owned by the
//! dispatch call. The call returns once every task has finished, the deadline
//! passes, or the caller cancels; in the last two cases the remaining tasks
//! are aborted together.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use tokio::task::JoinSet;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::error::{Error, Result};
use crate::query::Query;

use super::{ModeSelection, SearchCandidate, SearchMode, SearchOutcome, SearchStrategy, Searcher};

/// A mode that did not contribute, with the reason
#[derive(Debug)]
pub struct ModeFailure {
    pub mode: SearchMode,
    pub error: Error,
}

/// What the dispatch produced, per mode
#[derive(Debug, Default)]
pub struct DispatchOutcome {
    pub relation: Vec<SearchCandidate>,
    pub text: Vec<SearchCandidate>,
    /// Modes whose searcher completed successfully, even with no hits
    pub modes_used: BTreeSet<SearchMode>,
    pub strategies: BTreeMap<SearchMode, SearchStrategy>,
    pub failures: Vec<ModeFailure>,
}

impl DispatchOutcome {
    fn record_success(&mut self, outcome: SearchOutcome) {
        debug!(
            mode = %outcome.mode,
            strategy = ?outcome.strategy,
            candidates = outcome.candidates.len(),
            "Search mode completed"
        );
        self.modes_used.insert(outcome.mode);
        self.strategies.insert(outcome.mode, outcome.strategy);
        match outcome.mode {
            SearchMode::Relation => self.relation = outcome.candidates,
            SearchMode::Text => self.text = outcome.candidates,
        }
    }

    fn record_failure(&mut self, mode: SearchMode, error: Error) {
        warn!(mode = %mode, code = error.code(), error = %error, "Search mode failed, continuing without it");
        self.failures.push(ModeFailure { mode, error });
    }
}

/// Runs the relation and text searchers side by side
#[derive(Clone)]
pub struct QueryDispatcher {
    relation: Arc<dyn Searcher>,
    text: Arc<dyn Searcher>,
}

impl QueryDispatcher {
    pub fn new(relation: Arc<dyn Searcher>, text: Arc<dyn Searcher>) -> Self {
        Self { relation, text }
    }

    fn searcher(&self, mode: SearchMode) -> Arc<dyn Searcher> {
        match mode {
            SearchMode::Relation => Arc::clone(&self.relation),
            SearchMode::Text => Arc::clone(&self.text),
        }
    }

    /// Run the selected searchers concurrently and gather their results
    ///
    /// Fails with `SearchUnavailable` only when no selected mode succeeded,
    /// and with `Cancelled` when `cancel` fires first.
    pub async fn dispatch(
        &self,
        query: &Query,
        selection: ModeSelection,
        deadline: Option<Instant>,
        cancel: &CancellationToken,
    ) -> Result<DispatchOutcome> {
        let started = Instant::now();
        let mut pending: BTreeSet<SearchMode> = BTreeSet::new();
        let mut tasks = JoinSet::new();

        for mode in selection.modes() {
            let searcher = self.searcher(mode);
            let query = query.clone();
            pending.insert(mode);
            tasks.spawn(async move { (mode, searcher.search(&query).await) });
        }

        let expired = async {
            match deadline {
                Some(at) => tokio::time::sleep_until(at).await,
                None => std::future::pending::<()>().await,
            }
        };
        tokio::pin!(expired);

        let mut outcome = DispatchOutcome::default();
        let mut task_error: Option<String> = None;

        while !pending.is_empty() {
            tokio::select! {
                biased;

                _ = cancel.cancelled() => {
                    tasks.abort_all();
                    debug!("Dispatch cancelled by caller");
                    return Err(Error::Cancelled);
                }

                _ = &mut expired => {
                    tasks.abort_all();
                    let after_ms = started.elapsed().as_millis() as u64;
                    for mode in std::mem::take(&mut pending) {
                        outcome.record_failure(mode, Error::SearchTimeout { mode, after_ms });
                    }
                }

                joined = tasks.join_next() => match joined {
                    Some(Ok((mode, result))) => {
                        pending.remove(&mode);
                        match result {
                            Ok(found) => outcome.record_success(found),
                            Err(error) => outcome.record_failure(mode, error),
                        }
                    }
                    Some(Err(join_error)) => {
                        warn!(error = %join_error, "Search task did not complete");
                        task_error = Some(join_error.to_string());
                    }
                    None => break,
                },
            }
        }

        // tasks that panicked never reported their mode
        for mode in std::mem::take(&mut pending) {
            let reason = task_error.clone().unwrap_or_else(|| "search task lost".to_string());
            outcome.record_failure(mode, Error::SearchUnavailable(format!("{}: {}", mode, reason)));
        }

        outcome.failures.sort_by_key(|failure| failure.mode);

        if outcome.modes_used.is_empty() {
            let causes: Vec<String> = outcome
                .failures
                .iter()
                .map(|failure| format!("{} ({})", failure.error, failure.error.code()))
                .collect();
            return Err(Error::SearchUnavailable(format!(
                "no search mode succeeded: {}",
                causes.join("; ")
            )));
        }

        Ok(outcome)
    }
}
