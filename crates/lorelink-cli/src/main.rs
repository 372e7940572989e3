//! Lorelink CLI - relationship suggestions for story graphs

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, anyhow};
use clap::{Parser, Subcommand};
use lorelink_core::config::Config;
use lorelink_core::domain::{
    FeedbackAction, FeedbackDetails, GraphStore, RelationshipKind, RelationshipSuggestion,
    SuggestionStatus, SuggestionStore,
};
use lorelink_core::learning::LearningEngine;
use lorelink_core::llm::{LlmClient, LlmTypeClassifier};
use lorelink_core::prediction::RelationshipPredictor;
use lorelink_core::scheduler::{BatchScheduler, JobStatus, ProgressRecord};
use lorelink_core::storage::{
    Database, GraphDocument, SqliteEphemeralStore, SqliteGraphStore, SqliteSuggestionStore,
};
use serde::Serialize;
use tracing::{debug, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "lorelink")]
#[command(author, version, about = "Relationship suggestions for story knowledge graphs", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// SQLite database file (defaults to the configured path)
    #[arg(long, global = true)]
    db: Option<PathBuf>,

    /// Output format (text or json)
    #[arg(long, global = true, default_value = "text")]
    format: OutputFormat,

    /// Verbose logging on stderr
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Clone, Copy, Default, PartialEq, Eq, clap::ValueEnum)]
enum OutputFormat {
    #[default]
    Text,
    Json,
}

#[derive(Subcommand)]
enum Commands {
    /// Create the database and apply migrations
    Init,

    /// Import a graph from a JSON document
    Import {
        /// Path to the graph document
        file: PathBuf,
    },

    /// List graphs
    Graphs,

    /// Generate suggestions for a graph, an entity or a single pair
    Predict {
        graph: String,
        /// Only pair this entity with the others
        #[arg(short, long, conflicts_with = "pair")]
        entity: Option<String>,
        /// Predict exactly one pair
        #[arg(long, num_args = 2, value_names = ["A", "B"])]
        pair: Option<Vec<String>>,
        /// Maximum suggestions to create
        #[arg(short, long, default_value_t = 20)]
        limit: usize,
    },

    /// Schedule a generation job for a graph and wait for it
    Schedule { graph: String },

    /// Schedule generation jobs for every graph and wait for them
    Refresh,

    /// Show the progress record of a graph
    Progress { graph: String },

    /// Cancel a queued job
    Cancel { graph: String },

    /// List suggestions, highest priority first
    Suggestions {
        graph: String,
        /// pending, accepted, rejected, modified, dismissed or auto_accepted
        #[arg(short, long)]
        status: Option<String>,
        #[arg(short, long, default_value_t = 20)]
        limit: usize,
    },

    /// Record a decision on a pending suggestion
    Feedback {
        suggestion_id: String,
        /// accept, reject, modify or dismiss
        action: String,
        #[arg(short, long, default_value = "cli")]
        user: String,
        /// Corrected relationship type (modify only)
        #[arg(long)]
        corrected_type: Option<String>,
        /// Corrected strength 0-100 (modify only)
        #[arg(long)]
        strength: Option<u8>,
        #[arg(long)]
        explanation: Option<String>,
    },

    /// Fold new feedback into the learned weights now
    Learn { graph: String },

    /// Show accuracy metrics for a graph
    Metrics { graph: String },

    /// Show the weights used for scoring
    Weights {
        graph: String,
        /// Resolve the weights for one relationship type
        #[arg(short, long)]
        kind: Option<String>,
    },

    /// Forget learned weights for a graph
    ResetLearning { graph: String },

    /// Configuration management
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Print the effective configuration
    Show,
    /// Show config file path
    Path,
    /// Write a default config file
    Init {
        #[arg(long)]
        force: bool,
    },
    /// Get a configuration value
    Get { key: String },
    /// Set a configuration value
    Set { key: String, value: String },
}

#[tokio::main]
async fn main() {
    let _ = dotenvy::dotenv();
    let cli = Cli::parse();

    let default_filter = if cli.verbose {
        "lorelink=debug,lorelink_core=debug"
    } else {
        "lorelink=warn,lorelink_core=warn"
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter)),
        )
        .with_writer(std::io::stderr)
        .init();

    if let Err(e) = run(cli).await {
        match e.downcast_ref::<lorelink_core::Error>() {
            Some(core) => {
                eprintln!("Error [{}]: {}", core.code(), core);
                if let Some(hint) = core.suggestion() {
                    eprintln!("  Try: {}", hint);
                }
            }
            None => eprintln!("Error: {:#}", e),
        }
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let format = cli.format;

    if let Commands::Config { action } = cli.command {
        return cmd_config(action, format);
    }

    let app = App::open(cli.db).await?;
    match cli.command {
        Commands::Init => cmd_init(&app, format),
        Commands::Import { file } => cmd_import(&app, &file, format).await,
        Commands::Graphs => cmd_graphs(&app, format).await,
        Commands::Predict {
            graph,
            entity,
            pair,
            limit,
        } => cmd_predict(&app, &graph, entity.as_deref(), pair, limit, format).await,
        Commands::Schedule { graph } => cmd_schedule(&app, &graph, format).await,
        Commands::Refresh => cmd_refresh(&app, format).await,
        Commands::Progress { graph } => cmd_progress(&app, &graph, format).await,
        Commands::Cancel { graph } => cmd_cancel(&app, &graph, format).await,
        Commands::Suggestions {
            graph,
            status,
            limit,
        } => cmd_suggestions(&app, &graph, status.as_deref(), limit, format).await,
        Commands::Feedback {
            suggestion_id,
            action,
            user,
            corrected_type,
            strength,
            explanation,
        } => {
            let action = FeedbackAction::parse(&action).ok_or_else(|| {
                anyhow!("Unknown action '{}'. Use accept, reject, modify or dismiss.", action)
            })?;
            let mut details = FeedbackDetails::default();
            if let Some(kind) = corrected_type {
                details = details.with_corrected_type(parse_kind(&kind)?);
            }
            if let Some(strength) = strength {
                details = details.with_corrected_strength(strength.min(100));
            }
            if let Some(explanation) = explanation {
                details = details.with_explanation(explanation);
            }
            cmd_feedback(&app, &suggestion_id, action, &user, details, format).await
        }
        Commands::Learn { graph } => cmd_learn(&app, &graph, format).await,
        Commands::Metrics { graph } => cmd_metrics(&app, &graph, format).await,
        Commands::Weights { graph, kind } => cmd_weights(&app, &graph, kind.as_deref(), format).await,
        Commands::ResetLearning { graph } => cmd_reset_learning(&app, &graph, format).await,
        Commands::Config { .. } => Ok(()),
    }
}

// ============================================================================
// Wiring
// ============================================================================

/// Stores and configuration shared by every command
struct App {
    config: Config,
    db_path: PathBuf,
    schema_version: i32,
    graph: Arc<SqliteGraphStore>,
    suggestions: Arc<SqliteSuggestionStore>,
    cache: Arc<SqliteEphemeralStore>,
}

impl App {
    async fn open(db: Option<PathBuf>) -> anyhow::Result<Self> {
        let config = Config::load()?;
        let db_path = match db {
            Some(path) => path,
            None => config.database_path()?,
        };

        let database = Database::open(&db_path).await?;
        let pool = database.pool().clone();
        let cache = Arc::new(SqliteEphemeralStore::new(pool.clone()));
        let purged = cache.purge_expired().await?;
        debug!(path = %db_path.display(), purged, "Opened database");

        Ok(Self {
            config,
            db_path,
            schema_version: database.schema_version(),
            graph: Arc::new(SqliteGraphStore::new(pool.clone())),
            suggestions: Arc::new(SqliteSuggestionStore::new(pool)),
            cache,
        })
    }

    fn predictor(&self) -> anyhow::Result<RelationshipPredictor> {
        let predictor = RelationshipPredictor::new(
            self.graph.clone(),
            self.suggestions.clone(),
            self.config.features.clone(),
            self.config.prediction.clone(),
        );

        if !self.config.llm.enabled {
            return Ok(predictor);
        }
        match self.config.llm.resolved_api_key()?.filter(|k| !k.trim().is_empty()) {
            Some(key) => {
                let client = LlmClient::new(self.config.llm.clone(), key)?;
                Ok(predictor.with_classifier(Arc::new(LlmTypeClassifier::new(client))))
            }
            None => {
                warn!("llm.enabled is set but no API key was found; using rules only");
                Ok(predictor)
            }
        }
    }

    fn learning(&self) -> LearningEngine {
        LearningEngine::new(
            self.suggestions.clone(),
            self.cache.clone(),
            self.config.learning.clone(),
        )
    }

    fn scheduler(&self) -> anyhow::Result<BatchScheduler> {
        Ok(BatchScheduler::new(
            self.graph.clone(),
            Arc::new(self.predictor()?),
            self.cache.clone(),
            self.config.scheduler.clone(),
        ))
    }

    async fn ensure_graph(&self, graph_id: &str) -> anyhow::Result<()> {
        if self.graph.graph_exists(graph_id).await? {
            Ok(())
        } else {
            Err(lorelink_core::Error::GraphNotFound(graph_id.to_string()).into())
        }
    }
}

fn parse_kind(s: &str) -> anyhow::Result<RelationshipKind> {
    RelationshipKind::parse(s).ok_or_else(|| {
        let known: Vec<&str> = RelationshipKind::all().iter().map(|k| k.as_str()).collect();
        anyhow!("Unknown relationship type '{}'. Known types: {}", s, known.join(", "))
    })
}

fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn print_suggestion(s: &RelationshipSuggestion) {
    println!(
        "  {}  {} -> {}  {}  confidence {:.1}  strength {}  [{}]",
        s.id, s.source_entity_id, s.target_entity_id, s.suggested_type, s.confidence, s.strength, s.status
    );
    println!("      {}", s.reasoning);
}

fn print_progress(record: &ProgressRecord) {
    println!("Graph: {}", record.graph_id);
    println!("  Job: {}", record.job_id);
    println!("  Status: {}", record.status);
    println!(
        "  Progress: {}/{} pairs ({:.0}%)",
        record.processed,
        record.total,
        record.percent()
    );
    println!("  Created: {}", record.created);
    if record.skipped > 0 {
        println!("  Skipped: {}", record.skipped);
    }
    if let Some(started) = record.started_at {
        println!("  Started: {}", started.format("%Y-%m-%d %H:%M:%S"));
    }
    if let Some(finished) = record.finished_at {
        println!("  Finished: {}", finished.format("%Y-%m-%d %H:%M:%S"));
    }
    if let Some(error) = &record.error {
        println!("  Error: {}", error);
    }
}

// ============================================================================
// Command Implementations
// ============================================================================

fn cmd_init(app: &App, format: OutputFormat) -> anyhow::Result<()> {
    if format == OutputFormat::Json {
        return print_json(&serde_json::json!({
            "database": app.db_path,
            "schema_version": app.schema_version,
        }));
    }
    println!(
        "Database ready at {} (schema v{})",
        app.db_path.display(),
        app.schema_version
    );
    println!("\nNext: lorelink import <graph.json>");
    Ok(())
}

async fn cmd_import(app: &App, file: &Path, format: OutputFormat) -> anyhow::Result<()> {
    let contents = std::fs::read_to_string(file)
        .with_context(|| format!("Failed to read graph document: {}", file.display()))?;
    let document = GraphDocument::from_json(&contents)?;
    app.graph.import(&document).await?;

    if format == OutputFormat::Json {
        return print_json(&serde_json::json!({
            "graph_id": document.id,
            "entities": document.entities.len(),
            "relationships": document.relationships.len(),
            "fragments": document.fragments.len(),
            "events": document.events.len(),
        }));
    }
    println!(
        "Imported graph '{}' ({} entities, {} relationships, {} fragments, {} events)",
        document.id,
        document.entities.len(),
        document.relationships.len(),
        document.fragments.len(),
        document.events.len()
    );
    Ok(())
}

async fn cmd_graphs(app: &App, format: OutputFormat) -> anyhow::Result<()> {
    let graphs = app.graph.list_graphs().await?;
    if format == OutputFormat::Json {
        return print_json(&graphs);
    }
    if graphs.is_empty() {
        println!("No graphs found.");
        println!("\nImport one with: lorelink import <graph.json>");
        return Ok(());
    }
    println!("Graphs:");
    for g in graphs {
        let pending = app.suggestions.count_pending(&g.id).await?;
        println!(
            "  {} - {} ({} entities, {} pending suggestions)",
            g.id, g.name, g.entity_count, pending
        );
    }
    Ok(())
}

async fn cmd_predict(
    app: &App,
    graph: &str,
    entity: Option<&str>,
    pair: Option<Vec<String>>,
    limit: usize,
    format: OutputFormat,
) -> anyhow::Result<()> {
    let predictor = app.predictor()?;
    let created = match (entity, pair.as_deref()) {
        (_, Some([a, b])) => predictor.predict_pair(graph, a, b).await?.into_iter().collect(),
        (_, Some(_)) => return Err(anyhow!("--pair takes exactly two entity ids")),
        (Some(entity), None) => predictor.predict_for_entity(entity, graph, limit).await?,
        (None, None) => predictor.predict_for_graph(graph, limit).await?,
    };

    if format == OutputFormat::Json {
        return print_json(&created);
    }
    if created.is_empty() {
        println!("No new suggestions.");
        return Ok(());
    }
    println!("Created {} suggestion(s):", created.len());
    for s in &created {
        print_suggestion(s);
    }
    Ok(())
}

async fn cmd_schedule(app: &App, graph: &str, format: OutputFormat) -> anyhow::Result<()> {
    let scheduler = app.scheduler()?;
    let scheduled = scheduler.schedule_generation_job(graph).await?;
    if scheduled {
        scheduler.wait_idle().await;
    }
    let record = scheduler.get_progress(graph).await?;

    if format == OutputFormat::Json {
        print_json(&serde_json::json!({ "scheduled": scheduled, "progress": record }))?;
    } else {
        if !scheduled {
            println!("Job not scheduled: a job is already active or the rate limit is reached.");
        }
        if let Some(record) = &record {
            print_progress(record);
        }
    }

    match record {
        Some(r) if scheduled && r.status == JobStatus::Failed => Err(lorelink_core::Error::JobFailed {
            graph_id: r.graph_id,
            message: r.error.unwrap_or_default(),
        }
        .into()),
        _ => Ok(()),
    }
}

async fn cmd_refresh(app: &App, format: OutputFormat) -> anyhow::Result<()> {
    let scheduler = app.scheduler()?;
    let report = scheduler.refresh_all_graphs().await?;
    scheduler.wait_idle().await;

    if format == OutputFormat::Json {
        return print_json(&report);
    }
    println!("Scheduled: {}", report.scheduled.len());
    for graph in &report.scheduled {
        if let Some(record) = scheduler.get_progress(graph).await? {
            println!(
                "  {} - {} ({} created)",
                graph, record.status, record.created
            );
        }
    }
    if !report.skipped.is_empty() {
        println!("Skipped: {}", report.skipped.join(", "));
    }
    Ok(())
}

async fn cmd_progress(app: &App, graph: &str, format: OutputFormat) -> anyhow::Result<()> {
    let record = app.scheduler()?.get_progress(graph).await?;
    if format == OutputFormat::Json {
        return print_json(&record);
    }
    match record {
        Some(record) => print_progress(&record),
        None => println!("No job recorded for graph '{}'.", graph),
    }
    Ok(())
}

async fn cmd_cancel(app: &App, graph: &str, format: OutputFormat) -> anyhow::Result<()> {
    let cancelled = app.scheduler()?.cancel_job(graph).await?;
    if format == OutputFormat::Json {
        return print_json(&serde_json::json!({ "graph_id": graph, "cancelled": cancelled }));
    }
    if cancelled {
        println!("Cancelled queued job for '{}'.", graph);
    } else {
        println!("No queued job to cancel for '{}'.", graph);
    }
    Ok(())
}

async fn cmd_suggestions(
    app: &App,
    graph: &str,
    status: Option<&str>,
    limit: usize,
    format: OutputFormat,
) -> anyhow::Result<()> {
    app.ensure_graph(graph).await?;
    let status = status
        .map(|s| {
            SuggestionStatus::parse(s).ok_or_else(|| anyhow!("Unknown suggestion status '{}'", s))
        })
        .transpose()?;
    let suggestions = app.suggestions.list_suggestions(graph, status, limit).await?;

    if format == OutputFormat::Json {
        return print_json(&suggestions);
    }
    if suggestions.is_empty() {
        println!("No suggestions found.");
        return Ok(());
    }
    println!("Suggestions:");
    for s in &suggestions {
        print_suggestion(s);
    }
    Ok(())
}

async fn cmd_feedback(
    app: &App,
    suggestion_id: &str,
    action: FeedbackAction,
    user: &str,
    details: FeedbackDetails,
    format: OutputFormat,
) -> anyhow::Result<()> {
    let outcome = app
        .learning()
        .record_feedback(suggestion_id, action, user, details)
        .await?;

    if format == OutputFormat::Json {
        return print_json(&serde_json::json!({
            "feedback": outcome.feedback,
            "weights_updated": outcome.weights_updated,
        }));
    }
    println!(
        "Recorded {} on suggestion {}.",
        outcome.feedback.action, suggestion_id
    );
    if outcome.weights_updated {
        println!("Learned weights updated for graph '{}'.", outcome.feedback.graph_id);
    }
    Ok(())
}

async fn cmd_learn(app: &App, graph: &str, format: OutputFormat) -> anyhow::Result<()> {
    app.ensure_graph(graph).await?;
    let updated = app.learning().update_weights(graph).await?;
    if format == OutputFormat::Json {
        return print_json(&serde_json::json!({ "graph_id": graph, "updated": updated }));
    }
    if updated {
        println!("Weights updated for '{}'.", graph);
    } else {
        println!("Nothing to learn yet for '{}'.", graph);
    }
    Ok(())
}

async fn cmd_metrics(app: &App, graph: &str, format: OutputFormat) -> anyhow::Result<()> {
    app.ensure_graph(graph).await?;
    let summary = app.learning().learning_summary(graph).await?;

    if format == OutputFormat::Json {
        return print_json(&summary);
    }
    let m = &summary.metrics;
    println!("Graph: {}", graph);
    println!("  Feedback: {} ({} actioned)", summary.feedback_count, m.actioned);
    println!(
        "  TP {}  FP {}  TN {}  FN {}",
        m.true_positives, m.false_positives, m.true_negatives, m.false_negatives
    );
    println!("  Precision: {:.1}%", m.precision);
    println!("  Recall: {:.1}%", m.recall);
    println!("  F1: {:.1}%", m.f1_score);
    println!("  Accuracy: {:.1}%", m.accuracy);
    println!(
        "  Predicted improvement: {:.1} points",
        summary.predicted_improvement
    );
    match summary.last_updated {
        Some(at) => println!("  Weights updated: {}", at.format("%Y-%m-%d %H:%M:%S")),
        None => println!("  Weights updated: never"),
    }
    Ok(())
}

async fn cmd_weights(
    app: &App,
    graph: &str,
    kind: Option<&str>,
    format: OutputFormat,
) -> anyhow::Result<()> {
    app.ensure_graph(graph).await?;
    let kind = kind.map(parse_kind).transpose()?;
    let weights = app.learning().get_optimal_weights(graph, kind).await?;

    if format == OutputFormat::Json {
        return print_json(&weights);
    }
    match kind {
        Some(kind) => println!("Weights for '{}' ({}):", graph, kind),
        None => println!("Weights for '{}':", graph),
    }
    for (feature, weight) in &weights {
        println!("  {:<22} {:.3}", feature.as_str(), weight);
    }
    Ok(())
}

async fn cmd_reset_learning(app: &App, graph: &str, format: OutputFormat) -> anyhow::Result<()> {
    app.ensure_graph(graph).await?;
    let removed = app.learning().reset_learning(graph).await?;
    if format == OutputFormat::Json {
        return print_json(&serde_json::json!({ "graph_id": graph, "removed": removed }));
    }
    println!(
        "Removed {} learned weight(s) for '{}'. Default weights apply again.",
        removed, graph
    );
    Ok(())
}

fn cmd_config(action: ConfigAction, format: OutputFormat) -> anyhow::Result<()> {
    match action {
        ConfigAction::Show => {
            let config = Config::load()?;
            if format == OutputFormat::Json {
                print_json(&config)?;
            } else {
                print!("{}", toml::to_string_pretty(&config)?);
            }
        }
        ConfigAction::Path => {
            let path = Config::config_path()?;
            println!("{}", path.display());
        }
        ConfigAction::Init { force } => {
            let path = Config::config_path()?;
            if path.exists() && !force {
                return Err(anyhow!(
                    "Config file already exists at {}. Use --force to overwrite.",
                    path.display()
                ));
            }
            Config::default().save()?;
            println!("Wrote default configuration to {}", path.display());
        }
        ConfigAction::Get { key } => {
            let config = Config::load()?;
            println!("{}", config.get(&key)?);
        }
        ConfigAction::Set { key, value } => {
            let mut config = Config::load()?;
            config.set(&key, &value)?;
            config.save()?;
            println!("Set {} = {}", key, value);
        }
    }
    Ok(())
}

#[cfg(test)]
mod main_tests;
