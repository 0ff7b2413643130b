//! graphquery CLI - hybrid knowledge graph queries

use std::process::ExitCode;
use std::time::Duration;

use clap::{Parser, Subcommand};
use graphquery_core::config::Config;
use graphquery_core::engine::{QueryEngine, RunOptions};
use graphquery_core::pipeline::QueryResult;
use graphquery_core::query::Query;
use graphquery_core::search::ModeSelection;
use graphquery_core::sparql::{HttpSparqlClient, SparqlEndpoint, builder};
use graphquery_core::Error;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

#[derive(Parser)]
#[command(name = "graphquery")]
#[command(author, version, about = "Hybrid relation and text search over a knowledge graph", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Output format (text or json)
    #[arg(long, global = true, default_value = "text")]
    format: OutputFormat,

    /// Quiet mode (minimal output)
    #[arg(short, long, global = true)]
    quiet: bool,
}

#[derive(Clone, Copy, Default, clap::ValueEnum)]
enum OutputFormat {
    #[default]
    Text,
    Json,
}

#[derive(Clone, Copy, clap::ValueEnum)]
enum ModeArg {
    Both,
    Relation,
    Text,
}

impl From<ModeArg> for ModeSelection {
    fn from(mode: ModeArg) -> Self {
        match mode {
            ModeArg::Both => ModeSelection::Both,
            ModeArg::Relation => ModeSelection::RelationOnly,
            ModeArg::Text => ModeSelection::TextOnly,
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Answer a free-text query
    Query {
        /// Query text
        text: String,

        /// Search modes to run (defaults to pipeline.modes)
        #[arg(short, long)]
        mode: Option<ModeArg>,

        /// SPARQL endpoint URL for this run
        #[arg(short, long)]
        endpoint: Option<String>,

        /// Overall budget in milliseconds
        #[arg(long)]
        deadline_ms: Option<u64>,
    },

    /// Manage configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },

    /// Check configuration and endpoint health
    Doctor,
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Show the whole configuration
    Show,
    /// Get a configuration value
    Get { key: String },
    /// Set a configuration value
    Set { key: String, value: String },
    /// List all configuration values
    List,
    /// Reset configuration to defaults
    Reset,
    /// Show config file path
    Path,
}

#[tokio::main]
async fn main() -> ExitCode {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    let default_level = if cli.quiet { "warn" } else { "info" };
    let directive = format!("graphquery_core={}", default_level);
    let filter = tracing_subscriber::EnvFilter::from_default_env();
    let filter = match directive.parse() {
        Ok(directive) => filter.add_directive(directive),
        Err(_) => filter,
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            report(&e);
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    match cli.command {
        Commands::Query {
            text,
            mode,
            endpoint,
            deadline_ms,
        } => cmd_query(&text, mode, endpoint, deadline_ms, cli.format).await,

        Commands::Config { action } => cmd_config(action, cli.format, cli.quiet),

        Commands::Doctor => cmd_doctor(cli.quiet).await,
    }
}

/// Print `error[<code>]: <message>` and a hint for core errors
fn report(e: &anyhow::Error) {
    match e.downcast_ref::<Error>() {
        Some(error) => {
            eprintln!("error[{}]: {}", error.code(), error);
            if let Some(hint) = error.suggestion() {
                eprintln!("  hint: {}", hint);
            }
        }
        None => eprintln!("error: {:#}", e),
    }
}

// ============================================================================
// Command Implementations
// ============================================================================

async fn cmd_query(
    text: &str,
    mode: Option<ModeArg>,
    endpoint: Option<String>,
    deadline_ms: Option<u64>,
    format: OutputFormat,
) -> anyhow::Result<()> {
    // reject unusable text before touching the network
    Query::parse(text)?;

    let mut config = Config::load()?;
    if let Some(url) = endpoint {
        config.endpoint.override_url(url);
    }
    let engine = QueryEngine::connect(&config).await?;

    let cancel = CancellationToken::new();
    let on_interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted, cancelling query");
            on_interrupt.cancel();
        }
    });

    let mut options = RunOptions::default().cancel(cancel);
    if let Some(mode) = mode {
        options = options.selection(mode.into());
    }
    if let Some(ms) = deadline_ms {
        options = options.deadline(Duration::from_millis(ms));
    }

    let result = engine.run_with(text, options).await?;
    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&result)?),
        OutputFormat::Text => print_result(&result),
    }
    Ok(())
}

fn print_result(result: &QueryResult) {
    let modes: Vec<&str> = result.modes_used().iter().map(|m| m.as_str()).collect();
    println!("Modes: {}", modes.join(", "));

    if result.is_empty() {
        println!("No entities found.");
        return;
    }

    for (rank, entity) in result.entities().iter().enumerate() {
        let found_by: Vec<&str> = entity.modes().iter().map(|m| m.as_str()).collect();
        println!();
        println!(
            "{}. {} ({:.2}) [{}]",
            rank + 1,
            entity.label(),
            entity.score(),
            found_by.join(", ")
        );
        println!("   {}", entity.identifier());
        if !entity.top_categories().is_empty() {
            println!("   Top categories: {}", entity.top_categories().join(", "));
        }
        if !entity.ontology_links().is_empty() {
            println!("   Ontology: {}", entity.ontology_links().join(", "));
        }
        println!(
            "   Links: {} incoming, {} outgoing",
            entity.income_entities().len(),
            entity.outcome_entities().len()
        );
        if !entity.similar_entities().is_empty() {
            println!("   Similar: {}", entity.similar_entities().join(", "));
        }
    }

    if !result.enrichment_failures().is_empty() {
        println!();
        println!("Degraded facets:");
        for failure in result.enrichment_failures() {
            println!("  {} ({}): {}", failure.entity, failure.facet, failure.reason);
        }
    }
}

fn cmd_config(action: ConfigAction, format: OutputFormat, quiet: bool) -> anyhow::Result<()> {
    match action {
        ConfigAction::Show => {
            let config = Config::load()?;
            match format {
                OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&config)?),
                OutputFormat::Text => {
                    for (key, value) in config.list()? {
                        println!("{} = {}", key, value);
                    }
                }
            }
        }
        ConfigAction::Get { key } => {
            let config = Config::load()?;
            let value = config.get(&key)?;
            println!("{}", value);
        }
        ConfigAction::Set { key, value } => {
            let mut config = Config::load()?;
            config.set(&key, &value)?;
            config.save()?;
            if !quiet {
                println!("Set {} = {}", key, value);
            }
        }
        ConfigAction::List => {
            let config = Config::load()?;
            let items = config.list()?;
            for (key, value) in items {
                println!("{} = {}", key, value);
            }
        }
        ConfigAction::Reset => {
            Config::reset()?;
            if !quiet {
                println!("Configuration reset to defaults.");
            }
        }
        ConfigAction::Path => {
            let path = Config::config_path()?;
            println!("{}", path.display());
        }
    }
    Ok(())
}

async fn cmd_doctor(quiet: bool) -> anyhow::Result<()> {
    if !quiet {
        println!("graphquery Health Check");
        println!("=======================");
        println!();
    }

    let mut all_ok = true;

    let config = match Config::load() {
        Ok(config) => {
            if !quiet {
                println!("[OK] Configuration: Valid");
            }
            Some(config)
        }
        Err(e) => {
            all_ok = false;
            if !quiet {
                println!("[!!] Configuration: Error - {:#}", e);
            }
            None
        }
    };

    if !quiet {
        match Config::config_path() {
            Ok(path) => {
                if path.exists() {
                    println!("[OK] Config file: {}", path.display());
                } else {
                    println!("[--] Config file: {} (using defaults)", path.display());
                }
            }
            Err(e) => println!("[!!] Config file: Error - {}", e),
        }
    }

    if let Some(config) = config {
        let client = HttpSparqlClient::from_config(&config)?;
        debug!(endpoint = %client.url(), "Checking endpoint");
        match client.select(builder::ping()).await {
            Ok(_) => {
                if !quiet {
                    println!("[OK] Endpoint: {}", client.url());
                }
            }
            Err(e) => {
                all_ok = false;
                if !quiet {
                    println!("[!!] Endpoint: {} - {}", client.url(), e);
                    if let Some(hint) = e.suggestion() {
                        println!("     {}", hint);
                    }
                }
            }
        }

        if !quiet {
            let modes: Vec<&str> = config.pipeline.modes.iter().map(|m| m.as_str()).collect();
            println!("[--] Modes: {}", modes.join(", "));
        }
    }

    if !quiet {
        println!();
    }
    if all_ok {
        if !quiet {
            println!("All checks passed.");
        }
        Ok(())
    } else {
        Err(anyhow::anyhow!("One or more health checks failed"))
    }
}
