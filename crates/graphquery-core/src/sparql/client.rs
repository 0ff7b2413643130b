//! HTTP SPARQL client
//!
//! Sends queries as `application/sparql-query` POST bodies and expects
//! `application/sparql-results+json` back.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client as HttpClient;
use reqwest::header::{ACCEPT, CONTENT_TYPE};
use tracing::debug;

use crate::config::Config;
use crate::error::{Error, Result};

use super::SparqlEndpoint;
use super::results::SelectResults;

const SPARQL_QUERY_CONTENT_TYPE: &str = "application/sparql-query";
const SPARQL_RESULTS_JSON: &str = "application/sparql-results+json";

/// Default per-request timeout when none is configured
const DEFAULT_TIMEOUT_MS: u64 = 10_000;

/// Error bodies are cut to this many chars in messages
const MAX_ERROR_BODY_CHARS: usize = 200;

/// SPARQL endpoint reached over HTTP
///
/// Cheap to clone; clones share the connection pool.
#[derive(Clone)]
pub struct HttpSparqlClient {
    http_client: HttpClient,
    url: String,
    timeout: Duration,
}

impl std::fmt::Debug for HttpSparqlClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpSparqlClient")
            .field("url", &self.url)
            .field("timeout", &self.timeout)
            .finish()
    }
}

/// Builder for creating an HttpSparqlClient
pub struct HttpSparqlClientBuilder {
    url: Option<String>,
    timeout_ms: Option<u64>,
}

impl Default for HttpSparqlClientBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl HttpSparqlClientBuilder {
    pub fn new() -> Self {
        Self {
            url: None,
            timeout_ms: None,
        }
    }

    /// Set the endpoint URL
    pub fn url(mut self, url: impl Into<String>) -> Self {
        self.url = Some(url.into());
        self
    }

    /// Set the request timeout
    pub fn timeout_ms(mut self, ms: u64) -> Self {
        self.timeout_ms = Some(ms);
        self
    }

    pub fn build(self) -> Result<HttpSparqlClient> {
        let url = self
            .url
            .ok_or_else(|| Error::ConfigError("SPARQL endpoint URL is required".to_string()))?;
        let timeout = Duration::from_millis(self.timeout_ms.unwrap_or(DEFAULT_TIMEOUT_MS));

        let http_client = HttpClient::builder()
            .timeout(timeout)
            .build()
            .map_err(Error::NetworkError)?;

        Ok(HttpSparqlClient {
            http_client,
            url,
            timeout,
        })
    }
}

impl HttpSparqlClient {
    /// Create a client for `url` with the default timeout
    pub fn new(url: impl Into<String>) -> Result<Self> {
        HttpSparqlClientBuilder::new().url(url).build()
    }

    pub fn builder() -> HttpSparqlClientBuilder {
        HttpSparqlClientBuilder::new()
    }

    /// Client for the configured endpoint
    ///
    /// The transport timeout is the larger of the search and enrichment
    /// timeouts; callers apply their own tighter limits on top.
    pub fn from_config(config: &Config) -> Result<Self> {
        let timeout_ms = config.search.timeout_ms.max(config.enrichment.timeout_ms);
        HttpSparqlClientBuilder::new()
            .url(config.endpoint.effective_url())
            .timeout_ms(timeout_ms)
            .build()
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    fn map_transport_error(&self, e: reqwest::Error) -> Error {
        if e.is_timeout() {
            Error::GraphTimeout(self.timeout.as_millis() as u64)
        } else if e.is_connect() {
            Error::GraphUnavailable(format!("cannot connect to {}: {}", self.url, e))
        } else {
            Error::NetworkError(e)
        }
    }
}

#[async_trait]
impl SparqlEndpoint for HttpSparqlClient {
    async fn select(&self, query: &str) -> Result<SelectResults> {
        debug!(url = %self.url, query_len = query.len(), "Sending SPARQL query");

        let response = self
            .http_client
            .post(&self.url)
            .header(CONTENT_TYPE, SPARQL_QUERY_CONTENT_TYPE)
            .header(ACCEPT, SPARQL_RESULTS_JSON)
            .body(query.to_string())
            .send()
            .await
            .map_err(|e| self.map_transport_error(e))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| self.map_transport_error(e))?;

        if !status.is_success() {
            let snippet: String = body.chars().take(MAX_ERROR_BODY_CHARS).collect();
            return Err(Error::GraphUnavailable(format!(
                "{} answered {}: {}",
                self.url,
                status,
                snippet.trim()
            )));
        }

        let results = SelectResults::from_json(&body)?;
        debug!(rows = results.rows().len(), "SPARQL query answered");
        Ok(results)
    }
}
