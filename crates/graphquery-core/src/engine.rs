//! End-to-end query execution
//!
//! parse -> dispatch -> merge -> filter -> enrich -> compose

use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::error::{Error, Result};
use crate::graph::{ClassCatalog, GraphQueryClient, SparqlGraphClient};
use crate::pipeline::{
    CategoryScorer, EntityEnricher, LinkFilter, QueryResult, compose, merge,
};
use crate::query::Query;
use crate::search::{ModeSelection, QueryDispatcher, RelationSearcher, Searcher, TextSearcher};
use crate::sparql::HttpSparqlClient;

/// Per-run overrides
#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    /// Modes to dispatch; the configured modes when unset
    pub selection: Option<ModeSelection>,
    /// Budget for the whole run; the configured deadline when unset
    pub deadline: Option<Duration>,
    /// Caller-side cancellation
    pub cancel: Option<CancellationToken>,
}

impl RunOptions {
    pub fn selection(mut self, selection: ModeSelection) -> Self {
        self.selection = Some(selection);
        self
    }

    pub fn deadline(mut self, deadline: Duration) -> Self {
        self.deadline = Some(deadline);
        self
    }

    pub fn cancel(mut self, cancel: CancellationToken) -> Self {
        self.cancel = Some(cancel);
        self
    }
}

/// The hybrid query pipeline
pub struct QueryEngine {
    dispatcher: QueryDispatcher,
    filter: LinkFilter,
    enricher: EntityEnricher,
    selection: ModeSelection,
    deadline: Option<Duration>,
}

impl QueryEngine {
    /// Connect to the configured SPARQL endpoint
    ///
    /// Loads the ontology class catalog once; if that fails the engine runs
    /// with an empty catalog.
    pub async fn connect(config: &Config) -> Result<Self> {
        config
            .validate()
            .map_err(|e| Error::ConfigError(e.to_string()))?;

        let endpoint = Arc::new(HttpSparqlClient::from_config(config)?);
        let prefixes = Arc::new(config.prefixes.resolved()?);
        info!(endpoint = %endpoint.url(), "Connecting query engine");

        let relation = RelationSearcher::new(
            Arc::clone(&endpoint),
            Arc::clone(&prefixes),
            config.search.relation_limit,
            config.search.timeout(),
        );
        let text = TextSearcher::new(
            Arc::clone(&endpoint),
            Arc::clone(&prefixes),
            config.search.text_limit,
            config.search.timeout(),
        );
        let graph: Arc<dyn GraphQueryClient> = Arc::new(SparqlGraphClient::new(endpoint, prefixes));

        let catalog = match tokio::time::timeout(
            config.enrichment.timeout(),
            ClassCatalog::load(graph.as_ref()),
        )
        .await
        {
            Ok(Ok(catalog)) => catalog,
            Ok(Err(e)) => {
                warn!(error = %e, "Could not load class catalog, scoring with local names");
                ClassCatalog::default()
            }
            Err(_) => {
                warn!("Class catalog load timed out, scoring with local names");
                ClassCatalog::default()
            }
        };

        Self::builder()
            .config(config)
            .relation_searcher(Arc::new(relation))
            .text_searcher(Arc::new(text))
            .graph(graph)
            .catalog(catalog)
            .build()
    }

    pub fn builder() -> QueryEngineBuilder {
        QueryEngineBuilder::default()
    }

    /// Default mode selection for runs
    pub fn selection(&self) -> ModeSelection {
        self.selection
    }

    /// Run a query with the configured defaults
    pub async fn run(&self, text: &str) -> Result<QueryResult> {
        self.run_with(text, RunOptions::default()).await
    }

    /// Run a query
    ///
    /// Fails with `InvalidQuery` for text without usable tokens,
    /// `SearchUnavailable` when no selected search mode succeeded, and
    /// `Cancelled` when the caller cancels. Every other failure degrades the
    /// result instead.
    pub async fn run_with(&self, text: &str, options: RunOptions) -> Result<QueryResult> {
        let query = Query::parse(text)?;
        let selection = options.selection.unwrap_or(self.selection);
        let deadline = options
            .deadline
            .or(self.deadline)
            .map(|budget| Instant::now() + budget);
        let cancel = options.cancel.unwrap_or_default();

        info!(query = %query.text(), tokens = ?query.tokens(), ?selection, "Running query");

        let dispatched = self
            .dispatcher
            .dispatch(&query, selection, deadline, &cancel)
            .await?;

        let merged = merge(dispatched.relation, dispatched.text);
        let merged_count = merged.len();
        let linked = self
            .filter
            .filter(merged, &query, deadline, &cancel)
            .await?;
        debug!(merged = merged_count, kept = linked.len(), "Filtered candidates");

        let enrichment = self.enricher.enrich(linked, deadline, &cancel).await?;
        let result = compose(
            enrichment.entities,
            dispatched.modes_used,
            dispatched.strategies,
            enrichment.failures,
        );

        info!(
            entities = result.entities().len(),
            modes = ?result.modes_used(),
            degraded_facets = result.enrichment_failures().len(),
            "Query complete"
        );
        Ok(result)
    }
}

/// Assembles a [`QueryEngine`] from arbitrary searchers and graph clients
#[derive(Default)]
pub struct QueryEngineBuilder {
    config: Config,
    relation: Option<Arc<dyn Searcher>>,
    text: Option<Arc<dyn Searcher>>,
    graph: Option<Arc<dyn GraphQueryClient>>,
    catalog: ClassCatalog,
}

impl QueryEngineBuilder {
    /// Take namespaces, limits and timeouts from `config`
    ///
    /// Namespaces given as prefix names or CURIEs are expanded by
    /// [`QueryEngineBuilder::build`].
    pub fn config(mut self, config: &Config) -> Self {
        self.config = config.clone();
        self
    }

    pub fn relation_searcher(mut self, searcher: Arc<dyn Searcher>) -> Self {
        self.relation = Some(searcher);
        self
    }

    pub fn text_searcher(mut self, searcher: Arc<dyn Searcher>) -> Self {
        self.text = Some(searcher);
        self
    }

    pub fn graph(mut self, graph: Arc<dyn GraphQueryClient>) -> Self {
        self.graph = Some(graph);
        self
    }

    pub fn catalog(mut self, catalog: ClassCatalog) -> Self {
        self.catalog = catalog;
        self
    }

    pub fn build(self) -> Result<QueryEngine> {
        let relation = self
            .relation
            .ok_or_else(|| Error::ConfigError("relation searcher is required".to_string()))?;
        let text = self
            .text
            .ok_or_else(|| Error::ConfigError("text searcher is required".to_string()))?;
        let graph = self
            .graph
            .ok_or_else(|| Error::ConfigError("graph client is required".to_string()))?;

        let config = self.config;
        let prefixes = config.prefixes.resolved()?;
        let catalog = Arc::new(self.catalog);
        let filter = LinkFilter::new(
            Arc::clone(&graph),
            Arc::clone(&catalog),
            prefixes.entity.clone(),
            prefixes.category.clone(),
            config.search.min_shared_tokens,
        )
        .with_timeout(config.enrichment.timeout())
        .with_max_in_flight(config.enrichment.max_in_flight);
        let scorer = CategoryScorer::new(catalog, prefixes.category.clone());
        let enricher = EntityEnricher::new(graph, scorer, prefixes.entity)
            .with_timeout(config.enrichment.timeout())
            .with_similar_limit(config.enrichment.similar_limit)
            .with_max_in_flight(config.enrichment.max_in_flight);

        Ok(QueryEngine {
            dispatcher: QueryDispatcher::new(relation, text),
            filter,
            enricher,
            selection: config.pipeline.selection()?,
            deadline: config.pipeline.deadline(),
        })
    }
}
