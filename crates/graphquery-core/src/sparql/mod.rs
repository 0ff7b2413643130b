//! SPARQL protocol binding
//!
//! - [`SparqlEndpoint`]: anything that can answer a `SELECT`
//! - [`HttpSparqlClient`]: the SPARQL 1.1 protocol over HTTP
//! - [`builder`]: query text for searches and entity details
//! - [`SelectResults`]: the JSON results format

pub mod builder;
mod client;
mod results;

use async_trait::async_trait;

use crate::error::Result;

pub use client::{HttpSparqlClient, HttpSparqlClientBuilder};
pub use results::{Bindings, Head, SelectResults, Term};

/// Executes `SELECT` queries against a graph store
#[async_trait]
pub trait SparqlEndpoint: Send + Sync {
    /// Run `query` and return its bindings
    async fn select(&self, query: &str) -> Result<SelectResults>;
}
