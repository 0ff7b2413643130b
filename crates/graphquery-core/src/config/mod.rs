//! Configuration management with file persistence

mod prefixes;

pub use prefixes::{Prefixes, is_absolute_iri};

use anyhow::{Context, anyhow};
use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::search::{ModeSelection, SearchMode};

/// graphquery configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub endpoint: EndpointConfig,
    #[serde(default)]
    pub pipeline: PipelineConfig,
    #[serde(default)]
    pub prefixes: Prefixes,
    #[serde(default)]
    pub search: SearchConfig,
    #[serde(default)]
    pub enrichment: EnrichmentConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EndpointConfig {
    /// SPARQL query service address
    pub url: String,
    /// Process-local address (`GRAPHQUERY_ENDPOINT`, `--endpoint`); never saved
    #[serde(skip)]
    pub url_override: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub modes: Vec<SearchMode>,
    /// Overall deadline for dispatch plus enrichment
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deadline_ms: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchConfig {
    pub timeout_ms: u64,
    pub relation_limit: usize,
    pub text_limit: usize,
    /// Query tokens a text-only hit must share with its links
    pub min_shared_tokens: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EnrichmentConfig {
    /// Timeout for each facet fetch
    pub timeout_ms: u64,
    pub similar_limit: usize,
    /// Candidates enriched concurrently
    pub max_in_flight: usize,
}

impl Default for EndpointConfig {
    fn default() -> Self {
        Self {
            url: "http://localhost:3030/kg/sparql".to_string(),
            url_override: None,
        }
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            modes: vec![SearchMode::Relation, SearchMode::Text],
            deadline_ms: None,
        }
    }
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            timeout_ms: 5_000,
            relation_limit: 10,
            text_limit: 20,
            min_shared_tokens: 1,
        }
    }
}

impl Default for EnrichmentConfig {
    fn default() -> Self {
        Self {
            timeout_ms: 5_000,
            similar_limit: 10,
            max_in_flight: 8,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            endpoint: EndpointConfig::default(),
            pipeline: PipelineConfig::default(),
            prefixes: Prefixes::default(),
            search: SearchConfig::default(),
            enrichment: EnrichmentConfig::default(),
        }
    }
}

impl PipelineConfig {
    pub fn selection(&self) -> crate::Result<ModeSelection> {
        ModeSelection::from_modes(&self.modes)
    }

    pub fn deadline(&self) -> Option<Duration> {
        self.deadline_ms.map(Duration::from_millis)
    }
}

impl EndpointConfig {
    /// Address queries are sent to: the override when set, else `url`
    pub fn effective_url(&self) -> &str {
        self.url_override.as_deref().unwrap_or(&self.url)
    }

    /// Route this process to `url` without touching the saved address
    pub fn override_url(&mut self, url: impl Into<String>) {
        let url: String = url.into();
        let url = url.trim();
        if !url.is_empty() {
            self.url_override = Some(url.to_string());
        }
    }
}

impl SearchConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

impl EnrichmentConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

/// Keys accepted by [`Config::get`] and [`Config::set`]
const KEYS: [&str; 13] = [
    "endpoint.url",
    "pipeline.modes",
    "pipeline.deadline_ms",
    "prefixes.entity",
    "prefixes.category",
    "prefixes.type",
    "search.timeout_ms",
    "search.relation_limit",
    "search.text_limit",
    "search.min_shared_tokens",
    "enrichment.timeout_ms",
    "enrichment.similar_limit",
    "enrichment.max_in_flight",
];

impl Config {
    /// Get the config directory path
    pub fn config_dir() -> anyhow::Result<PathBuf> {
        let dir = if let Ok(custom_dir) = env::var("GRAPHQUERY_CONFIG_DIR") {
            PathBuf::from(custom_dir)
        } else {
            dirs::config_dir()
                .ok_or_else(|| anyhow!("Could not determine config directory"))?
                .join("graphquery")
        };
        Ok(dir)
    }

    /// Get the config file path
    pub fn config_path() -> anyhow::Result<PathBuf> {
        Ok(Self::config_dir()?.join("config.toml"))
    }

    /// Load configuration from file, or use defaults if it doesn't exist
    ///
    /// `GRAPHQUERY_ENDPOINT` overrides the endpoint URL for this process
    /// either way; the override is never written back by [`Config::save`].
    pub fn load() -> anyhow::Result<Self> {
        let path = Self::config_path()?;

        let mut config = if path.exists() {
            Self::read_file(&path)?
        } else {
            Config::default()
        };
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from an explicit file
    pub fn load_from(path: &Path) -> anyhow::Result<Self> {
        let mut config = Self::read_file(path)?;
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    fn read_file(path: &Path) -> anyhow::Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        toml::from_str(&contents)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(url) = env::var("GRAPHQUERY_ENDPOINT") {
            self.endpoint.override_url(url);
        }
    }

    /// Save configuration to the default location
    pub fn save(&self) -> anyhow::Result<()> {
        let dir = Self::config_dir()?;
        fs::create_dir_all(&dir)
            .with_context(|| format!("Failed to create config directory: {}", dir.display()))?;
        self.save_to(&Self::config_path()?)
    }

    /// Save configuration to an explicit file
    pub fn save_to(&self, path: &Path) -> anyhow::Result<()> {
        self.validate()?;

        let contents = toml::to_string_pretty(self).context("Failed to serialize config")?;

        fs::write(path, contents)
            .with_context(|| format!("Failed to write config file: {}", path.display()))?;

        Ok(())
    }

    /// Validate configuration
    pub fn validate(&self) -> anyhow::Result<()> {
        check_endpoint_url("endpoint.url", &self.endpoint.url)?;
        if let Some(url) = &self.endpoint.url_override {
            check_endpoint_url("endpoint override", url)?;
        }
        self.pipeline.selection()?;
        if self.pipeline.deadline_ms == Some(0) {
            return Err(anyhow!("pipeline.deadline_ms must be greater than zero"));
        }
        self.prefixes.validate()?;

        let positive = [
            ("search.timeout_ms", self.search.timeout_ms),
            ("search.relation_limit", self.search.relation_limit as u64),
            ("search.text_limit", self.search.text_limit as u64),
            ("enrichment.timeout_ms", self.enrichment.timeout_ms),
            ("enrichment.similar_limit", self.enrichment.similar_limit as u64),
            ("enrichment.max_in_flight", self.enrichment.max_in_flight as u64),
        ];
        for (key, value) in positive {
            if value == 0 {
                return Err(anyhow!("{} must be greater than zero", key));
            }
        }
        Ok(())
    }

    /// Get a configuration value by key
    pub fn get(&self, key: &str) -> anyhow::Result<String> {
        match key {
            "endpoint.url" => Ok(self.endpoint.url.clone()),

            "pipeline.modes" => Ok(self
                .pipeline
                .modes
                .iter()
                .map(SearchMode::as_str)
                .collect::<Vec<_>>()
                .join(", ")),
            "pipeline.deadline_ms" => Ok(self
                .pipeline
                .deadline_ms
                .map(|ms| ms.to_string())
                .unwrap_or_else(|| "(none)".to_string())),

            "prefixes.entity" => Ok(self.prefixes.entity.clone()),
            "prefixes.category" => Ok(self.prefixes.category.clone()),
            "prefixes.type" => Ok(self.prefixes.type_predicate.clone()),

            "search.timeout_ms" => Ok(self.search.timeout_ms.to_string()),
            "search.relation_limit" => Ok(self.search.relation_limit.to_string()),
            "search.text_limit" => Ok(self.search.text_limit.to_string()),
            "search.min_shared_tokens" => Ok(self.search.min_shared_tokens.to_string()),

            "enrichment.timeout_ms" => Ok(self.enrichment.timeout_ms.to_string()),
            "enrichment.similar_limit" => Ok(self.enrichment.similar_limit.to_string()),
            "enrichment.max_in_flight" => Ok(self.enrichment.max_in_flight.to_string()),

            _ => match key.strip_prefix("prefixes.extra.") {
                Some(short) => self
                    .prefixes
                    .extra
                    .get(short)
                    .cloned()
                    .ok_or_else(|| anyhow!("No extra prefix named '{}'", short)),
                None => Err(unknown_key(key)),
            },
        }
    }

    /// Set a configuration value by key
    pub fn set(&mut self, key: &str, value: &str) -> anyhow::Result<()> {
        let value = value.trim();
        match key {
            "endpoint.url" => {
                check_endpoint_url(key, value)?;
                self.endpoint.url = value.to_string();
            }

            "pipeline.modes" => {
                let modes = value
                    .split(',')
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
                    .map(str::parse::<SearchMode>)
                    .collect::<crate::Result<Vec<_>>>()?;
                ModeSelection::from_modes(&modes)?;
                self.pipeline.modes = modes;
            }
            "pipeline.deadline_ms" => {
                self.pipeline.deadline_ms = match value {
                    "" | "none" => None,
                    _ => {
                        let ms: u64 = value
                            .parse()
                            .with_context(|| format!("Invalid deadline_ms value: {}", value))?;
                        if ms == 0 {
                            return Err(anyhow!("Deadline must be greater than zero"));
                        }
                        Some(ms)
                    }
                };
            }

            "prefixes.entity" | "prefixes.category" => {
                let namespace = self.prefixes.resolve_namespace(value)?;
                if !is_absolute_iri(&namespace) {
                    return Err(anyhow!("Namespace must expand to an absolute IRI: {}", value));
                }
                if key == "prefixes.entity" {
                    self.prefixes.entity = value.to_string();
                } else {
                    self.prefixes.category = value.to_string();
                }
            }
            "prefixes.type" => {
                self.prefixes.resolve(value)?;
                self.prefixes.type_predicate = value.to_string();
            }

            "search.timeout_ms" => self.search.timeout_ms = parse_positive(key, value)?,
            "search.relation_limit" => self.search.relation_limit = parse_positive(key, value)?,
            "search.text_limit" => self.search.text_limit = parse_positive(key, value)?,
            "search.min_shared_tokens" => {
                self.search.min_shared_tokens = value
                    .parse()
                    .with_context(|| format!("Invalid min_shared_tokens value: {}", value))?;
            }

            "enrichment.timeout_ms" => self.enrichment.timeout_ms = parse_positive(key, value)?,
            "enrichment.similar_limit" => {
                self.enrichment.similar_limit = parse_positive(key, value)?
            }
            "enrichment.max_in_flight" => {
                self.enrichment.max_in_flight = parse_positive(key, value)?
            }

            _ => match key.strip_prefix("prefixes.extra.") {
                Some(short) => {
                    if !is_absolute_iri(value) {
                        return Err(anyhow!("Namespace must be an absolute IRI: {}", value));
                    }
                    self.prefixes
                        .extra
                        .insert(short.to_string(), value.to_string());
                    self.prefixes.validate()?;
                }
                None => return Err(unknown_key(key)),
            },
        }
        Ok(())
    }

    /// List all configuration keys and their values
    pub fn list(&self) -> anyhow::Result<Vec<(String, String)>> {
        let mut entries = KEYS
            .iter()
            .map(|key| Ok((key.to_string(), self.get(key)?)))
            .collect::<anyhow::Result<Vec<_>>>()?;

        entries.extend(
            self.prefixes
                .extra
                .iter()
                .map(|(short, ns)| (format!("prefixes.extra.{}", short), ns.clone())),
        );
        Ok(entries)
    }

    /// Reset configuration to defaults
    pub fn reset() -> anyhow::Result<()> {
        let path = Self::config_path()?;
        if path.exists() {
            fs::remove_file(&path)
                .with_context(|| format!("Failed to remove config file: {}", path.display()))?;
        }
        Ok(())
    }
}

fn check_endpoint_url(key: &str, url: &str) -> anyhow::Result<()> {
    let url = url.trim();
    if !(url.starts_with("http://") || url.starts_with("https://")) {
        return Err(anyhow!("{} must start with http:// or https://, got '{}'", key, url));
    }
    Ok(())
}

fn parse_positive<T>(key: &str, value: &str) -> anyhow::Result<T>
where
    T: std::str::FromStr + PartialEq + Default,
{
    let parsed: T = value
        .parse()
        .map_err(|_| anyhow!("Invalid {} value: {}", key, value))?;
    if parsed == T::default() {
        return Err(anyhow!("{} must be greater than zero", key));
    }
    Ok(parsed)
}

fn unknown_key(key: &str) -> anyhow::Error {
    anyhow!(
        "Unknown configuration key: {}. Use `graphquery config list` to see available keys.",
        key
    )
}
