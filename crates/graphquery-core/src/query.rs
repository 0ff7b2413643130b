//! Query parsing and token normalization
//!
//! The same normalization is applied to query text and to the surface text
//! of graph links (IRI local names, labels, class names) so that overlap can
//! be computed by plain string equality.

use crate::error::{Error, Result};

/// Minimum token length (in chars) kept from query text
pub const MIN_TOKEN_CHARS: usize = 3;

/// Zero-width non-joiner, common inside Persian labels and IRIs
const ZWNJ: char = '\u{200c}';

/// An immutable user query
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Query {
    text: String,
    tokens: Vec<String>,
}

impl Query {
    /// Parse raw query text
    ///
    /// Fails with [`Error::InvalidQuery`] when no token survives
    /// normalization.
    pub fn parse(text: impl Into<String>) -> Result<Self> {
        let text = text.into();
        let tokens = query_tokens(&text);

        if tokens.is_empty() {
            return Err(Error::InvalidQuery(format!(
                "'{}' contains no word of {} or more characters",
                text.trim(),
                MIN_TOKEN_CHARS
            )));
        }

        Ok(Self { text, tokens })
    }

    /// The raw text as given by the caller
    pub fn text(&self) -> &str {
        &self.text
    }

    /// Normalized, deduplicated tokens in first-occurrence order
    pub fn tokens(&self) -> &[String] {
        &self.tokens
    }

    /// Whether `token` (already normalized) is one of the query tokens
    pub fn contains_token(&self, token: &str) -> bool {
        self.tokens.iter().any(|t| t == token)
    }
}

/// Normalize free text into lowercase surface tokens
///
/// Splits on whitespace and any non-alphanumeric character and removes
/// zero-width non-joiners. No length floor is applied.
pub fn surface_tokens(text: &str) -> impl Iterator<Item = String> + '_ {
    text.split(|c: char| c != ZWNJ && !c.is_alphanumeric())
        .map(|part| {
            part.chars()
                .filter(|c| *c != ZWNJ)
                .flat_map(char::to_lowercase)
                .collect::<String>()
        })
        .filter(|token| !token.is_empty())
}

/// Tokenize query text: surface tokens of at least [`MIN_TOKEN_CHARS`]
/// chars, deduplicated
pub fn query_tokens(text: &str) -> Vec<String> {
    let mut tokens: Vec<String> = Vec::new();
    for token in surface_tokens(text) {
        if token.chars().count() >= MIN_TOKEN_CHARS && !tokens.contains(&token) {
            tokens.push(token);
        }
    }
    tokens
}

/// Local name of an IRI
///
/// Strips `namespace` when the IRI lives under it, otherwise everything up
/// to the last `/` or `#`.
pub fn local_name<'a>(iri: &'a str, namespace: &str) -> &'a str {
    if !namespace.is_empty() {
        if let Some(rest) = iri.strip_prefix(namespace) {
            return rest;
        }
    }
    match iri.rfind(['/', '#']) {
        Some(pos) => &iri[pos + 1..],
        None => iri,
    }
}
