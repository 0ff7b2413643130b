//! SPARQL 1.1 query results, JSON format

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Response body of a `SELECT` query
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SelectResults {
    pub head: Head,
    pub results: Bindings,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Head {
    #[serde(default)]
    pub vars: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Bindings {
    #[serde(default)]
    pub bindings: Vec<HashMap<String, Term>>,
}

/// One bound RDF term
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Term {
    /// `uri`, `literal`, `typed-literal` or `bnode`
    #[serde(rename = "type")]
    pub kind: String,
    pub value: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub datatype: Option<String>,
    #[serde(rename = "xml:lang", default, skip_serializing_if = "Option::is_none")]
    pub lang: Option<String>,
}

impl Term {
    pub fn uri(value: impl Into<String>) -> Self {
        Self {
            kind: "uri".to_string(),
            value: value.into(),
            datatype: None,
            lang: None,
        }
    }

    pub fn literal(value: impl Into<String>) -> Self {
        Self {
            kind: "literal".to_string(),
            value: value.into(),
            datatype: None,
            lang: None,
        }
    }

    pub fn is_uri(&self) -> bool {
        self.kind == "uri"
    }
}

impl SelectResults {
    /// Parse a JSON results document
    pub fn from_json(body: &str) -> Result<Self> {
        serde_json::from_str(body)
            .map_err(|e| Error::MalformedResponse(format!("invalid SPARQL JSON results: {}", e)))
    }

    /// Build a result set from rows of `(var, term)` pairs
    pub fn from_rows<I, R>(vars: &[&str], rows: I) -> Self
    where
        I: IntoIterator<Item = R>,
        R: IntoIterator<Item = (&'static str, Term)>,
    {
        Self {
            head: Head {
                vars: vars.iter().map(|v| v.to_string()).collect(),
            },
            results: Bindings {
                bindings: rows
                    .into_iter()
                    .map(|row| row.into_iter().map(|(k, v)| (k.to_string(), v)).collect())
                    .collect(),
            },
        }
    }

    pub fn rows(&self) -> &[HashMap<String, Term>] {
        &self.results.bindings
    }

    /// Values bound to `var`, skipping rows where it is unbound
    pub fn column(&self, var: &str) -> Vec<String> {
        self.rows()
            .iter()
            .filter_map(|row| row.get(var).map(|term| term.value.clone()))
            .collect()
    }

    /// Values of the first projected variable
    ///
    /// Fails when the head declares no variables.
    pub fn first_column(&self) -> Result<Vec<String>> {
        let var = self
            .head
            .vars
            .first()
            .ok_or_else(|| Error::MalformedResponse("result head has no variables".to_string()))?;
        Ok(self.column(var))
    }
}
