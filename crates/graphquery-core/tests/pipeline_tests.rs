//! graphquery pipeline integration tests
//!
//! Runs the full engine against in-memory searchers and graph clients.

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use graphquery_core::{
    Error, Result,
    config::Config,
    engine::{QueryEngine, RunOptions},
    graph::{ClassCatalog, Facet, GraphQueryClient},
    pipeline::merge,
    query::Query,
    search::{ModeSelection, SearchCandidate, SearchMode, SearchOutcome, SearchStrategy, Searcher},
};

const NS: &str = "http://fkg.iust.ac.ir/resource/";
const CAT: &str = "http://fkg.iust.ac.ir/category/";

fn iri(name: &str) -> String {
    format!("{NS}{name}")
}

/// Searcher with a canned answer
struct StaticSearcher {
    mode: SearchMode,
    hits: Vec<(&'static str, f64, Option<&'static str>)>,
    fail: bool,
    delay: Option<Duration>,
}

impl StaticSearcher {
    fn hits(mode: SearchMode, hits: Vec<(&'static str, f64, Option<&'static str>)>) -> Arc<Self> {
        Arc::new(Self {
            mode,
            hits,
            fail: false,
            delay: None,
        })
    }

    fn failing(mode: SearchMode) -> Arc<Self> {
        Arc::new(Self {
            mode,
            hits: Vec::new(),
            fail: true,
            delay: None,
        })
    }

    fn slow(mode: SearchMode, delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            mode,
            hits: Vec::new(),
            fail: false,
            delay: Some(delay),
        })
    }
}

#[async_trait]
impl Searcher for StaticSearcher {
    fn mode(&self) -> SearchMode {
        self.mode
    }

    async fn search(&self, _query: &Query) -> Result<SearchOutcome> {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if self.fail {
            return Err(Error::SearchUnavailable(format!(
                "{}: connection refused",
                self.mode
            )));
        }
        let candidates = self
            .hits
            .iter()
            .map(|(name, score, label)| {
                let candidate = SearchCandidate::new(iri(name), self.mode, *score);
                match label {
                    Some(label) => candidate.with_label(*label),
                    None => candidate,
                }
            })
            .collect();
        Ok(SearchOutcome::new(self.mode, SearchStrategy::Exact, candidates))
    }
}

/// In-memory neighborhood; every facet of `broken` fails
#[derive(Default)]
struct MemoryGraph {
    labels: HashMap<String, String>,
    categories: HashMap<String, Vec<String>>,
    ontology: HashMap<String, Vec<String>>,
    income: HashMap<String, Vec<String>>,
    outcome: HashMap<String, Vec<String>>,
    broken: Option<String>,
}

impl MemoryGraph {
    fn france() -> Self {
        let paris = iri("Paris");
        let lyon = iri("Lyon");
        let toulon = iri("Toulon");
        Self {
            labels: HashMap::from([(paris.clone(), "Paris".to_string())]),
            categories: HashMap::from([
                (
                    paris.clone(),
                    vec![format!("{CAT}Capitals_in_Europe"), format!("{CAT}Cities_in_France")],
                ),
                (lyon.clone(), vec![format!("{CAT}Cities_in_France")]),
                (toulon.clone(), vec![format!("{CAT}Ports_in_Provence")]),
            ]),
            ontology: HashMap::from([
                (paris.clone(), vec!["http://ex.org/onto/Capital".to_string()]),
                (lyon.clone(), vec!["http://ex.org/onto/City".to_string()]),
                (toulon, vec!["http://ex.org/onto/City".to_string()]),
            ]),
            income: HashMap::from([(paris.clone(), vec![iri("France")])]),
            outcome: HashMap::from([(paris, vec![iri("Seine")]), (lyon, vec![iri("Rhone")])]),
            broken: None,
        }
    }

    fn lookup(&self, map: &HashMap<String, Vec<String>>, entity: &str) -> Result<Vec<String>> {
        self.check(entity)?;
        Ok(map.get(entity).cloned().unwrap_or_default())
    }

    fn check(&self, entity: &str) -> Result<()> {
        if self.broken.as_deref() == Some(entity) {
            return Err(Error::GraphUnavailable("store refused the query".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl GraphQueryClient for MemoryGraph {
    async fn label(&self, entity: &str) -> Result<Option<String>> {
        self.check(entity)?;
        Ok(self.labels.get(entity).cloned())
    }

    async fn categories(&self, entity: &str) -> Result<Vec<String>> {
        self.lookup(&self.categories, entity)
    }

    async fn ontology_links(&self, entity: &str) -> Result<Vec<String>> {
        self.lookup(&self.ontology, entity)
    }

    async fn income_entities(&self, entity: &str) -> Result<Vec<String>> {
        self.lookup(&self.income, entity)
    }

    async fn outcome_entities(&self, entity: &str) -> Result<Vec<String>> {
        self.lookup(&self.outcome, entity)
    }

    async fn similar_entities(
        &self,
        _ontology: &[String],
        _categories: &[String],
        _limit: usize,
    ) -> Result<Vec<String>> {
        Ok(vec![iri("Paris"), iri("Lyon"), iri("Marseille")])
    }

    async fn class_labels(&self) -> Result<HashMap<String, String>> {
        Ok(HashMap::new())
    }
}

fn catalog() -> ClassCatalog {
    ClassCatalog::new(HashMap::from([
        (
            "http://ex.org/onto/Capital".to_string(),
            "capital city".to_string(),
        ),
        ("http://ex.org/onto/City".to_string(), "city".to_string()),
    ]))
}

fn engine(
    relation: Arc<dyn Searcher>,
    text: Arc<dyn Searcher>,
    graph: MemoryGraph,
) -> QueryEngine {
    QueryEngine::builder()
        .relation_searcher(relation)
        .text_searcher(text)
        .graph(Arc::new(graph))
        .catalog(catalog())
        .build()
        .unwrap()
}

fn france_text_hits() -> Arc<StaticSearcher> {
    StaticSearcher::hits(
        SearchMode::Text,
        vec![
            ("Paris", 0.7, Some("Paris")),
            ("Lyon", 0.3, Some("Lyon")),
            ("Toulon", 0.2, Some("Toulon")),
        ],
    )
}

fn france_engine() -> QueryEngine {
    engine(
        StaticSearcher::hits(SearchMode::Relation, vec![("Paris", 0.9, Some("Paris"))]),
        france_text_hits(),
        MemoryGraph::france(),
    )
}

fn ids(result: &graphquery_core::pipeline::QueryResult) -> Vec<&str> {
    result.entities().iter().map(|e| e.identifier()).collect()
}

// ========== End-to-end ==========

#[tokio::test]
async fn test_capital_of_france_ranks_paris_first() {
    let result = france_engine().run("capital of France").await.unwrap();

    assert_eq!(
        result.modes_used(),
        &BTreeSet::from([SearchMode::Relation, SearchMode::Text])
    );
    let paris = &result.entities()[0];
    assert_eq!(paris.identifier(), iri("Paris"));
    assert_eq!(
        paris.modes(),
        &BTreeSet::from([SearchMode::Relation, SearchMode::Text])
    );
    assert!((paris.score() - 1.6).abs() < 1e-9);
}

#[tokio::test]
async fn test_text_hit_survives_through_its_category_link() {
    let result = france_engine().run("capital of France").await.unwrap();

    // Lyon's name shares nothing with the query, its category names France
    assert_eq!(ids(&result), vec![iri("Paris"), iri("Lyon")]);
    let lyon = result.entity(&iri("Lyon")).unwrap();
    assert_eq!(lyon.modes(), &BTreeSet::from([SearchMode::Text]));
    assert_eq!(lyon.categories(), &[format!("{CAT}Cities_in_France")]);
    assert_eq!(lyon.ontology_links(), &["http://ex.org/onto/City".to_string()]);
}

#[tokio::test]
async fn test_text_hit_without_matching_links_is_dropped() {
    let result = france_engine().run("capital of France").await.unwrap();
    assert!(result.entity(&iri("Toulon")).is_none());
}

#[tokio::test]
async fn test_text_hit_survives_when_its_label_mentions_france() {
    let mut graph = MemoryGraph::france();
    graph.categories.remove(&iri("Lyon"));
    let engine = engine(
        StaticSearcher::hits(SearchMode::Relation, vec![("Paris", 0.9, Some("Paris"))]),
        StaticSearcher::hits(
            SearchMode::Text,
            vec![("Paris", 0.7, Some("Paris")), ("Lyon", 0.3, Some("Lyon, France"))],
        ),
        graph,
    );
    let result = engine.run("capital of France").await.unwrap();
    assert_eq!(ids(&result), vec![iri("Paris"), iri("Lyon")]);
}

#[tokio::test]
async fn test_namespaces_given_as_prefix_names() {
    let mut config = Config::default();
    config
        .set("prefixes.extra.fkgr", "http://fkg.iust.ac.ir/resource/")
        .unwrap();
    config
        .set("prefixes.extra.fkgc", "http://fkg.iust.ac.ir/category/")
        .unwrap();
    config.set("prefixes.entity", "fkgr").unwrap();
    config.set("prefixes.category", "fkgc:").unwrap();

    let engine = QueryEngine::builder()
        .config(&config)
        .relation_searcher(StaticSearcher::hits(
            SearchMode::Relation,
            vec![("Paris", 0.9, Some("Paris"))],
        ))
        .text_searcher(france_text_hits())
        .graph(Arc::new(MemoryGraph::france()))
        .catalog(catalog())
        .build()
        .unwrap();
    let result = engine.run("capital of France").await.unwrap();

    assert_eq!(ids(&result), vec![iri("Paris"), iri("Lyon")]);
    let paris = result.entity(&iri("Paris")).unwrap();
    assert_eq!(paris.label(), "Paris");
    assert!(
        paris
            .scored_categories()
            .contains_key(&format!("{CAT}Capitals_in_Europe"))
    );
}

#[test]
fn test_unresolvable_namespace_fails_to_build() {
    let mut config = Config::default();
    config.prefixes.entity = "fkgr:".to_string();
    let err = QueryEngine::builder()
        .config(&config)
        .relation_searcher(StaticSearcher::hits(SearchMode::Relation, Vec::new()))
        .text_searcher(StaticSearcher::hits(SearchMode::Text, Vec::new()))
        .graph(Arc::new(MemoryGraph::default()))
        .build()
        .err()
        .unwrap();
    assert!(matches!(err, Error::ConfigError(_)));
}

#[tokio::test]
async fn test_paris_is_fully_enriched() {
    let result = france_engine().run("capital of France").await.unwrap();
    let paris = result.entity(&iri("Paris")).unwrap();

    assert_eq!(paris.label(), "Paris");
    assert_eq!(paris.income_entities(), &[iri("France")]);
    assert_eq!(paris.outcome_entities(), &[iri("Seine")]);
    assert_eq!(paris.ontology_links(), &["http://ex.org/onto/Capital".to_string()]);
    // neither category resolves against the Capital class
    assert_eq!(paris.scored_categories().len(), 2);
    assert_eq!(paris.similar_entities(), &[iri("Lyon"), iri("Marseille")]);
    assert!(result.enrichment_failures().is_empty());
}

#[tokio::test]
async fn test_results_are_identical_across_runs() {
    let engine = france_engine();
    let first = engine.run("capital of France").await.unwrap();
    let second = engine.run("capital of France").await.unwrap();
    assert_eq!(first, second);
}

// ========== Degradation ==========

#[tokio::test]
async fn test_both_searchers_failing_is_fatal() {
    let engine = engine(
        StaticSearcher::failing(SearchMode::Relation),
        StaticSearcher::failing(SearchMode::Text),
        MemoryGraph::france(),
    );
    let err = engine.run("capital of France").await.unwrap_err();
    assert!(matches!(err, Error::SearchUnavailable(_)));
    assert!(err.is_fatal());
    assert_eq!(err.code(), "E101");
}

#[tokio::test]
async fn test_text_failure_leaves_relation_results() {
    let engine = engine(
        StaticSearcher::hits(
            SearchMode::Relation,
            vec![("Paris", 0.9, Some("Paris")), ("Lyon", 0.2, None)],
        ),
        StaticSearcher::failing(SearchMode::Text),
        MemoryGraph::france(),
    );
    let result = engine.run("capital of France").await.unwrap();

    assert_eq!(result.modes_used(), &BTreeSet::from([SearchMode::Relation]));
    assert_eq!(ids(&result), vec![iri("Paris"), iri("Lyon")]);
    assert!(
        result
            .entities()
            .iter()
            .all(|e| e.modes() == &BTreeSet::from([SearchMode::Relation]))
    );
}

#[tokio::test]
async fn test_enrichment_failure_is_isolated_to_one_entity() {
    let mut graph = MemoryGraph::france();
    graph.broken = Some(iri("Lyon"));
    let engine = engine(
        StaticSearcher::hits(
            SearchMode::Relation,
            vec![("Paris", 0.9, Some("Paris")), ("Lyon", 0.5, Some("Lyon"))],
        ),
        StaticSearcher::hits(SearchMode::Text, Vec::new()),
        graph,
    );
    let result = engine.run("capital of France").await.unwrap();

    let paris = result.entity(&iri("Paris")).unwrap();
    assert_eq!(paris.outcome_entities(), &[iri("Seine")]);
    assert!(!paris.categories().is_empty());

    let lyon = result.entity(&iri("Lyon")).unwrap();
    assert_eq!(lyon.label(), "Lyon");
    assert!(lyon.categories().is_empty());
    assert!(lyon.outcome_entities().is_empty());

    assert!(!result.enrichment_failures().is_empty());
    assert!(
        result
            .enrichment_failures()
            .iter()
            .all(|f| f.entity == iri("Lyon"))
    );
    assert!(
        result
            .enrichment_failures()
            .iter()
            .any(|f| f.facet == Facet::Categories)
    );
}

#[tokio::test(start_paused = true)]
async fn test_deadline_drops_slow_mode() {
    let engine = engine(
        StaticSearcher::hits(SearchMode::Relation, vec![("Paris", 0.9, Some("Paris"))]),
        StaticSearcher::slow(SearchMode::Text, Duration::from_secs(60)),
        MemoryGraph::france(),
    );
    let options = RunOptions::default().deadline(Duration::from_secs(1));
    let result = engine.run_with("capital of France", options).await.unwrap();
    assert_eq!(result.modes_used(), &BTreeSet::from([SearchMode::Relation]));
    assert_eq!(result.entities()[0].identifier(), iri("Paris"));
}

// ========== Run control ==========

#[tokio::test]
async fn test_query_without_tokens_is_invalid() {
    let err = france_engine().run("of a").await.unwrap_err();
    assert!(matches!(err, Error::InvalidQuery(_)));
    assert!(err.is_fatal());
}

#[tokio::test]
async fn test_mode_selection_override() {
    let result = france_engine()
        .run_with(
            "capital of France",
            RunOptions::default().selection(ModeSelection::RelationOnly),
        )
        .await
        .unwrap();
    assert_eq!(result.modes_used(), &BTreeSet::from([SearchMode::Relation]));
    assert_eq!(
        result.entities()[0].modes(),
        &BTreeSet::from([SearchMode::Relation])
    );
}

#[tokio::test]
async fn test_cancelled_run_returns_error() {
    let cancel = CancellationToken::new();
    cancel.cancel();
    let err = france_engine()
        .run_with("capital of France", RunOptions::default().cancel(cancel))
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Cancelled));
}

#[tokio::test]
async fn test_result_json_shape() {
    let result = france_engine().run("capital of France").await.unwrap();
    let json = serde_json::to_value(&result).unwrap();
    assert_eq!(json["modesUsed"], serde_json::json!(["relation", "text"]));
    assert_eq!(json["strategies"]["relation"], "exact");
    let paris = &json["entities"][0];
    for field in [
        "identifier",
        "label",
        "categories",
        "scoredCategories",
        "ontologyLinks",
        "incomeEntities",
        "outcomeEntities",
        "similarEntities",
    ] {
        assert!(!paris[field].is_null(), "missing {}", field);
    }
}

// ========== Merge properties ==========

#[test]
fn test_merge_is_commutative() {
    let relation = vec![
        SearchCandidate::new(iri("Paris"), SearchMode::Relation, 0.9),
        SearchCandidate::new(iri("Nice"), SearchMode::Relation, 0.35),
        SearchCandidate::new(iri("Lyon"), SearchMode::Relation, 0.1),
    ];
    let text = vec![
        SearchCandidate::new(iri("Lyon"), SearchMode::Text, 0.3),
        SearchCandidate::new(iri("Paris"), SearchMode::Text, 0.7),
        SearchCandidate::new(iri("Brest"), SearchMode::Text, 0.5),
    ];
    let forward = merge(relation.clone(), text.clone());
    let backward = merge(text, relation);
    assert_eq!(forward, backward);

    let ids: Vec<&str> = forward.iter().map(|m| m.id.as_str()).collect();
    assert_eq!(ids, vec![iri("Paris"), iri("Brest"), iri("Lyon"), iri("Nice")]);
}
