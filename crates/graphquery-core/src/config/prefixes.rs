//! Namespace configuration shared by every query the engine builds

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Namespaces every generated query may rely on
const BUILTIN_PREFIXES: [(&str, &str); 4] = [
    ("rdf", "http://www.w3.org/1999/02/22-rdf-syntax-ns#"),
    ("rdfs", "http://www.w3.org/2000/01/rdf-schema#"),
    ("owl", "http://www.w3.org/2002/07/owl#"),
    ("xsd", "http://www.w3.org/2001/XMLSchema#"),
];

/// Entity/category namespaces and the typing predicate
///
/// Read-only once an engine is built; shared between tasks behind an `Arc`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Prefixes {
    /// Namespace every result entity lives under (IRI, prefix name or CURIE)
    pub entity: String,
    /// Namespace of category resources (IRI, prefix name or CURIE)
    pub category: String,
    /// Predicate linking an entity to its ontology classes (IRI or CURIE)
    #[serde(rename = "type")]
    pub type_predicate: String,
    /// Additional short-name -> namespace pairs
    #[serde(default)]
    pub extra: BTreeMap<String, String>,
}

impl Default for Prefixes {
    fn default() -> Self {
        Self {
            entity: "http://fkg.iust.ac.ir/resource/".to_string(),
            category: "http://fkg.iust.ac.ir/category/".to_string(),
            type_predicate: "rdf:type".to_string(),
            extra: BTreeMap::new(),
        }
    }
}

impl Prefixes {
    /// Look up the namespace bound to a short name
    pub fn namespace(&self, short: &str) -> Option<&str> {
        self.extra.get(short).map(String::as_str).or_else(|| {
            BUILTIN_PREFIXES
                .iter()
                .find(|(name, _)| *name == short)
                .map(|(_, ns)| *ns)
        })
    }

    /// Expand a CURIE (`rdf:type`) or pass an absolute IRI through
    pub fn resolve(&self, term: &str) -> Result<String> {
        let term = term.trim();
        if is_absolute_iri(term) {
            return Ok(term.to_string());
        }
        let (short, local) = term.split_once(':').ok_or_else(|| {
            Error::ConfigError(format!("'{}' is neither an IRI nor a CURIE", term))
        })?;
        self.namespace(short)
            .map(|ns| format!("{}{}", ns, local))
            .ok_or_else(|| Error::ConfigError(format!("Unknown prefix '{}' in '{}'", short, term)))
    }

    /// Expand a namespace given as an absolute IRI, a prefix name (`fkgr`)
    /// or a CURIE (`fkgr:`)
    pub fn resolve_namespace(&self, term: &str) -> Result<String> {
        let term = term.trim();
        if is_absolute_iri(term) || term.contains(':') {
            return self.resolve(term);
        }
        self.namespace(term)
            .map(str::to_string)
            .ok_or_else(|| Error::ConfigError(format!("Unknown prefix '{}'", term)))
    }

    /// Copy with the entity and category namespaces expanded to absolute IRIs
    pub fn resolved(&self) -> Result<Self> {
        Ok(Self {
            entity: self.resolve_namespace(&self.entity)?,
            category: self.resolve_namespace(&self.category)?,
            ..self.clone()
        })
    }

    /// Full IRI of the typing predicate
    pub fn type_iri(&self) -> Result<String> {
        self.resolve(&self.type_predicate)
    }

    /// SPARQL `PREFIX` declarations for built-in and extra namespaces
    pub fn prologue(&self) -> String {
        let mut lines: Vec<String> = BUILTIN_PREFIXES
            .iter()
            .filter(|(name, _)| !self.extra.contains_key(*name))
            .map(|(name, ns)| format!("PREFIX {}: <{}>", name, ns))
            .collect();
        lines.extend(
            self.extra
                .iter()
                .map(|(name, ns)| format!("PREFIX {}: <{}>", name, ns)),
        );
        lines.join("\n")
    }

    /// Validate that every namespace is usable in a query
    pub fn validate(&self) -> Result<()> {
        for (name, ns) in &self.extra {
            if name.is_empty() || !name.chars().all(|c| c.is_alphanumeric() || c == '_' || c == '-') {
                return Err(Error::ConfigError(format!("Invalid prefix name '{}'", name)));
            }
            if !is_absolute_iri(ns) {
                return Err(Error::ConfigError(format!(
                    "prefixes.extra.{} must be an absolute namespace IRI, got '{}'",
                    name, ns
                )));
            }
        }
        for (key, value) in [("entity", &self.entity), ("category", &self.category)] {
            let namespace = self.resolve_namespace(value).map_err(|e| {
                Error::ConfigError(format!("prefixes.{} cannot be resolved: {}", key, e))
            })?;
            if !is_absolute_iri(&namespace) {
                return Err(Error::ConfigError(format!(
                    "prefixes.{} must expand to an absolute namespace IRI, got '{}'",
                    key, namespace
                )));
            }
        }
        self.type_iri().map(|_| ())
    }
}

/// Whether `value` is an absolute IRI usable inside `<...>`
pub fn is_absolute_iri(value: &str) -> bool {
    let has_scheme = value.starts_with("http://")
        || value.starts_with("https://")
        || value.starts_with("urn:");
    has_scheme
        && !value.chars().any(|c| {
            c.is_whitespace() || matches!(c, '<' | '>' | '"' | '{' | '}' | '|' | '^' | '`' | '\\')
        })
}
