//! Category relevance scoring
//!
//! `score(c) = ONTOLOGY_WEIGHT * a(c) + CATEGORY_WEIGHT * b(c)` where `a(c)`
//! counts ontology links whose class tokens share a token with `c`'s local
//! name and `b(c)` counts category links naming `c`.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use crate::graph::ClassCatalog;
use crate::query::{local_name, query_tokens};

pub const ONTOLOGY_WEIGHT: f64 = 1.0;
pub const CATEGORY_WEIGHT: f64 = 0.5;

/// Scores an entity's categories against its ontology links
#[derive(Debug, Clone)]
pub struct CategoryScorer {
    catalog: Arc<ClassCatalog>,
    category_ns: String,
}

impl CategoryScorer {
    pub fn new(catalog: Arc<ClassCatalog>, category_ns: impl Into<String>) -> Self {
        Self {
            catalog,
            category_ns: category_ns.into(),
        }
    }

    /// Score every category present in `categories`
    pub fn score(&self, categories: &[String], ontology: &[String]) -> BTreeMap<String, f64> {
        let class_tokens: Vec<BTreeSet<String>> =
            ontology.iter().map(|class| self.catalog.tokens(class)).collect();

        let mut mentions: BTreeMap<&str, usize> = BTreeMap::new();
        for category in categories {
            *mentions.entry(category.as_str()).or_default() += 1;
        }

        mentions
            .into_iter()
            .map(|(category, named)| {
                let tokens = query_tokens(local_name(category, &self.category_ns));
                let resolved = class_tokens
                    .iter()
                    .filter(|class| tokens.iter().any(|token| class.contains(token)))
                    .count();
                let score = ONTOLOGY_WEIGHT * resolved as f64 + CATEGORY_WEIGHT * named as f64;
                (category.to_string(), score)
            })
            .collect()
    }
}

/// All scored categories, score descending then name ascending
pub fn ranked_categories(scores: &BTreeMap<String, f64>) -> Vec<String> {
    let mut ranked: Vec<(&String, f64)> = scores.iter().map(|(c, s)| (c, *s)).collect();
    ranked.sort_by(|a, b| b.1.total_cmp(&a.1).then_with(|| a.0.cmp(b.0)));
    ranked.into_iter().map(|(c, _)| c.clone()).collect()
}

/// Categories scoring at or above the mean, ranked
pub fn top_categories(scores: &BTreeMap<String, f64>) -> Vec<String> {
    if scores.is_empty() {
        return Vec::new();
    }
    let mean = scores.values().sum::<f64>() / scores.len() as f64;
    ranked_categories(scores)
        .into_iter()
        .filter(|category| scores[category] >= mean)
        .collect()
}
