//! Merge per-mode candidates into one ranked list

use std::collections::{BTreeMap, BTreeSet};

use crate::search::{SearchCandidate, SearchMode};

/// An entity with every mode that found it
#[derive(Debug, Clone, PartialEq)]
pub struct MergedCandidate {
    pub id: String,
    pub modes: BTreeSet<SearchMode>,
    /// Best raw score per mode
    pub mode_scores: BTreeMap<SearchMode, f64>,
    /// Sum of `mode_scores`
    pub score: f64,
    pub label: Option<String>,
}

impl MergedCandidate {
    pub fn has_mode(&self, mode: SearchMode) -> bool {
        self.modes.contains(&mode)
    }
}

#[derive(Default)]
struct Accumulator {
    scores: BTreeMap<SearchMode, f64>,
    labels: BTreeMap<SearchMode, BTreeSet<String>>,
}

/// Group candidates by identifier and combine their scores
///
/// Each candidate is keyed by the mode it carries, so the two inputs are
/// interchangeable. Duplicates within one mode collapse to their maximum;
/// the combined score sums the per-mode maxima. Output is ordered by
/// combined score descending, identifier ascending.
pub fn merge(first: Vec<SearchCandidate>, second: Vec<SearchCandidate>) -> Vec<MergedCandidate> {
    let mut grouped: BTreeMap<String, Accumulator> = BTreeMap::new();

    for candidate in first.into_iter().chain(second) {
        let entry = grouped.entry(candidate.id).or_default();
        entry
            .scores
            .entry(candidate.mode)
            .and_modify(|best| *best = best.max(candidate.score))
            .or_insert(candidate.score);
        if let Some(label) = candidate.label {
            entry.labels.entry(candidate.mode).or_default().insert(label);
        }
    }

    let mut merged: Vec<MergedCandidate> = grouped
        .into_iter()
        .map(|(id, acc)| {
            let label = [SearchMode::Relation, SearchMode::Text]
                .iter()
                .find_map(|mode| acc.labels.get(mode).and_then(|set| set.first().cloned()));
            MergedCandidate {
                id,
                modes: acc.scores.keys().copied().collect(),
                score: acc.scores.values().sum(),
                mode_scores: acc.scores,
                label,
            }
        })
        .collect();

    merged.sort_by(|a, b| b.score.total_cmp(&a.score).then_with(|| a.id.cmp(&b.id)));
    merged
}
