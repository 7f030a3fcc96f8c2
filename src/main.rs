use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};

use contextual_rag::chunking::loader::{collect_paths, load_document};
use contextual_rag::core::config::validation::validate_config;
use contextual_rag::core::config::{AppPaths, ConfigService, PipelineSettings};
use contextual_rag::core::logging;
use contextual_rag::state::AppState;

#[derive(Parser)]
#[command(name = "contextual-rag", version, about = "Contextual chunking and hybrid retrieval")]
struct Cli {
    /// Debug logging unless RUST_LOG is set
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Config file to use instead of the discovered config.yml
    #[arg(long, global = true, env = "CTXRAG_CONFIG_PATH")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Segment, enrich and index documents
    Ingest(IngestArgs),
    /// Search the knowledge store
    Query(QueryArgs),
    /// Show, validate or initialize the configuration
    Config(ConfigArgs),
}

#[derive(Args)]
struct IngestArgs {
    /// Files or directories (.txt, .md)
    #[arg(required = true)]
    paths: Vec<PathBuf>,

    #[arg(long)]
    json: bool,
}

#[derive(Args)]
struct QueryArgs {
    text: String,

    /// Defaults to retrieval.top_k
    #[arg(short = 'k', long)]
    top_k: Option<usize>,

    #[arg(long)]
    json: bool,
}

#[derive(Args)]
struct ConfigArgs {
    /// Only check the configuration
    #[arg(long)]
    validate: bool,

    /// Write the default configuration if none exists
    #[arg(long)]
    init: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let paths = AppPaths::new();
    logging::init(&paths, cli.verbose);

    let mut config = ConfigService::new(Arc::new(paths));
    if let Some(path) = cli.config {
        config = config.with_config_path(path);
    }

    match cli.command {
        Commands::Ingest(args) => ingest(config, args).await,
        Commands::Query(args) => query(config, args).await,
        Commands::Config(args) => show_config(config, args),
    }
}

async fn ingest(config: ConfigService, args: IngestArgs) -> Result<()> {
    let files = collect_paths(&args.paths).context("Failed to collect input files")?;
    if files.is_empty() {
        bail!("No supported documents found");
    }

    let state = AppState::initialize(config)
        .await
        .context("Failed to initialize")?;
    let mut pipeline = state.ingest_pipeline();

    let mut reports = Vec::with_capacity(files.len());
    for file in &files {
        let document = match load_document(file) {
            Ok(document) => document,
            Err(err) => {
                tracing::warn!("Skipping {}: {}", file.display(), err);
                continue;
            }
        };
        let report = pipeline
            .ingest(&document)
            .await
            .with_context(|| format!("Failed to index {}", file.display()))?;
        if !args.json {
            println!(
                "{}: {} segments, {} enriched ({} recovered), {} unenriched, {} stored",
                file.display(),
                report.segments,
                report.enriched,
                report.recovered,
                report.unenriched,
                report.stored
            );
        }
        reports.push(report);
    }

    if args.json {
        println!("{}", serde_json::to_string_pretty(&reports)?);
    }
    Ok(())
}

async fn query(config: ConfigService, args: QueryArgs) -> Result<()> {
    let state = AppState::initialize(config)
        .await
        .context("Failed to initialize")?;
    let top_k = args.top_k.unwrap_or(state.settings.retrieval.top_k);

    let results = state.query_pipeline().search(&args.text, top_k).await;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&results)?);
        return Ok(());
    }
    if results.is_empty() {
        println!("No results");
    }
    for (rank, candidate) in results.iter().enumerate() {
        println!("{}. [{}] score={:.3}", rank + 1, candidate.id, candidate.score);
        println!("{}\n", candidate.display_text());
    }
    Ok(())
}

fn show_config(config: ConfigService, args: ConfigArgs) -> Result<()> {
    if args.init {
        let path = config.config_write_path();
        let written = config
            .init_config(&PipelineSettings::default_document())
            .context("Failed to write default config")?;
        if written {
            println!("Wrote {}", path.display());
        } else {
            println!("Config already exists at {}", path.display());
        }
    }

    let raw = config.load_config().context("Failed to read config")?;
    validate_config(&raw).context("Invalid config")?;
    if args.validate {
        println!("Config OK ({})", config.config_path().display());
        return Ok(());
    }

    let redacted = config.redact_sensitive_values(&raw);
    print!("{}", serde_yaml::to_string(&redacted)?);
    Ok(())
}
