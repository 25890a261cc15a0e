//! CLI command definitions, routing, and tracing setup.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use clap::{Parser, Subcommand};
use color_eyre::eyre::{Result, eyre};
use indicatif::{ProgressBar, ProgressStyle};
use mojarung_api::AppState;
use mojarung_core::{
    CompanyPipelineConfig, NewsPipeline, NewsPipelineConfig, PipelineProgress,
    run_company_pipeline, run_news_pipeline,
};
use mojarung_dedup::embedder_from_config;
use mojarung_llm::{ChatModel, LlmClient};
use mojarung_parsers::{Fetcher, SourceRegistry};
use mojarung_shared::{
    AppConfig, config_file_path, init_config, load_config, load_config_from, secret_key,
    validate_llm_key,
};
use mojarung_storage::Storage;
use tracing::info;

// ---------------------------------------------------------------------------
// CLI structure
// ---------------------------------------------------------------------------

/// Mojarung — personalised financial news with LLM enrichment.
#[derive(Parser)]
#[command(
    name = "mojarung",
    version,
    about = "Scrape, deduplicate and enrich financial news, and serve it over HTTP.",
    long_about = None,
)]
pub(crate) struct Cli {
    /// Config file (defaults to ~/.mojarung/mojarung.toml).
    #[arg(long, global = true, env = "MOJARUNG_CONFIG")]
    pub config: Option<PathBuf>,

    /// Log format: text (default) or json.
    #[arg(long, default_value = "text", global = true)]
    pub log_format: LogFormat,

    /// Verbosity level (-v, -vv, -vvv).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Command,
}

/// Log output format.
#[derive(Clone, Debug, clap::ValueEnum)]
pub(crate) enum LogFormat {
    Text,
    Json,
}

/// Top-level CLI subcommands.
#[derive(Subcommand)]
pub(crate) enum Command {
    /// Start the HTTP API.
    Serve {
        /// Socket address, overriding `server.bind`.
        #[arg(long)]
        bind: Option<String>,
    },

    /// Run the news pipeline once: scrape, deduplicate, enrich, store.
    Parse,

    /// Run the company pipeline once: listing, names, descriptions, tags.
    Companies,

    /// Database management.
    Db {
        #[command(subcommand)]
        action: DbAction,
    },

    /// Configuration management.
    Config {
        /// Config subcommand.
        #[command(subcommand)]
        action: ConfigAction,
    },
}

/// Database subcommands.
#[derive(Subcommand)]
pub(crate) enum DbAction {
    /// Create the database and apply migrations.
    Init,
    /// Drop all data and recreate the schema.
    Reset {
        /// Confirm the reset.
        #[arg(long)]
        yes: bool,
    },
}

/// Config subcommands.
#[derive(Subcommand)]
pub(crate) enum ConfigAction {
    /// Initialize config file with defaults.
    Init,
    /// Show resolved configuration.
    Show,
}

// ---------------------------------------------------------------------------
// Tracing setup
// ---------------------------------------------------------------------------

const CRATES: [&str; 9] = [
    "mojarung",
    "mojarung_api",
    "mojarung_core",
    "mojarung_dedup",
    "mojarung_invest",
    "mojarung_llm",
    "mojarung_parsers",
    "mojarung_shared",
    "mojarung_storage",
];

/// Initialize tracing based on CLI flags.
pub(crate) fn init_tracing(cli: &Cli) {
    use tracing_subscriber::{EnvFilter, fmt};

    let level = match cli.verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    let mut directives: Vec<String> = CRATES.iter().map(|c| format!("{c}={level}")).collect();
    if cli.verbose > 0 {
        directives.push(format!("tower_http={level}"));
    }

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(directives.join(",")));

    match cli.log_format {
        LogFormat::Text => {
            fmt()
                .with_env_filter(env_filter)
                .with_target(false)
                .init();
        }
        LogFormat::Json => {
            fmt()
                .json()
                .with_env_filter(env_filter)
                .init();
        }
    }
}

// ---------------------------------------------------------------------------
// Command dispatch
// ---------------------------------------------------------------------------

/// Run the CLI command.
pub(crate) async fn run(cli: Cli) -> Result<()> {
    let config_path = cli.config;
    match cli.command {
        Command::Serve { bind } => cmd_serve(&load(config_path)?, bind).await,
        Command::Parse => cmd_parse(&load(config_path)?).await,
        Command::Companies => cmd_companies(&load(config_path)?).await,
        Command::Db { action } => match action {
            DbAction::Init => cmd_db_init(&load(config_path)?).await,
            DbAction::Reset { yes } => cmd_db_reset(&load(config_path)?, yes).await,
        },
        Command::Config { action } => match action {
            ConfigAction::Init => cmd_config_init(),
            ConfigAction::Show => cmd_config_show(config_path),
        },
    }
}

fn load(path: Option<PathBuf>) -> Result<AppConfig> {
    Ok(match path {
        Some(path) => load_config_from(&path)?,
        None => load_config()?,
    })
}

async fn open_storage(config: &AppConfig) -> Result<Storage> {
    let path = config.database.resolved_path()?;
    info!(path = %path.display(), "opening database");
    Ok(Storage::open(&path).await?)
}

fn llm_client(config: &AppConfig) -> Result<LlmClient> {
    let key = validate_llm_key(config)?;
    Ok(LlmClient::from_config(&config.llm, key)?)
}

// ---------------------------------------------------------------------------
// Command handlers
// ---------------------------------------------------------------------------

async fn cmd_serve(config: &AppConfig, bind: Option<String>) -> Result<()> {
    let secret = secret_key(config)?;
    let llm: Arc<dyn ChatModel> = Arc::new(llm_client(config)?);
    let storage = open_storage(config).await?;
    let bind = bind.unwrap_or_else(|| config.server.bind.clone());

    let state = AppState::new(config.clone(), storage, llm, &secret)?;
    info!(%bind, sources = ?state.sources.names(), "starting API server");
    mojarung_api::serve(state, &bind).await?;
    Ok(())
}

async fn cmd_parse(config: &AppConfig) -> Result<()> {
    let llm = llm_client(config)?;
    let storage = open_storage(config).await?;
    let embedder = embedder_from_config(config)?;
    let fetcher = Fetcher::from_config(&config.parsers)?;
    let sources = SourceRegistry::from_config(&config.parsers)?;
    if sources.is_empty() {
        return Err(eyre!("no news sources configured under [parsers].sources"));
    }

    let pipeline = NewsPipeline {
        storage: &storage,
        llm: &llm,
        embedder: embedder.as_ref(),
        fetcher: &fetcher,
        sources: &sources,
    };
    let started = Instant::now();
    let progress = CliProgress::new();
    let report = run_news_pipeline(
        &pipeline,
        &NewsPipelineConfig::from_config(config)?,
        &progress,
    )
    .await?;

    println!();
    println!("  News pipeline finished");
    println!("  Parsed:      {}", report.parsed);
    println!("  Duplicates:  {}", report.duplicates);
    println!("  New:         {}", report.unique);
    println!("  After dedup: {}", report.after_dedup);
    println!("  Saved:       {}", report.saved);
    println!("  Rejected:    {}", report.rejected);
    println!("  Time:        {:.1}s", started.elapsed().as_secs_f64());
    println!();

    Ok(())
}

async fn cmd_companies(config: &AppConfig) -> Result<()> {
    let llm = llm_client(config)?;
    let storage = open_storage(config).await?;
    let fetcher = Fetcher::from_config(&config.parsers)?;

    let started = Instant::now();
    let progress = CliProgress::new();
    let report = run_company_pipeline(
        &storage,
        &llm,
        &fetcher,
        &CompanyPipelineConfig::from_config(config)?,
        &progress,
    )
    .await?;

    println!();
    println!("  Company pipeline finished");
    println!("  Listed:  {}", report.listed);
    println!("  Skipped: {}", report.skipped);
    println!("  Saved:   {}", report.saved);
    println!("  Failed:  {}", report.failed);
    println!("  Time:    {:.1}s", started.elapsed().as_secs_f64());
    println!();

    Ok(())
}

async fn cmd_db_init(config: &AppConfig) -> Result<()> {
    open_storage(config).await?;
    println!(
        "Database ready at: {}",
        config.database.resolved_path()?.display()
    );
    Ok(())
}

async fn cmd_db_reset(config: &AppConfig, yes: bool) -> Result<()> {
    if !yes {
        return Err(eyre!(
            "this drops every user, article and company; pass --yes to confirm"
        ));
    }
    open_storage(config).await?.reset().await?;
    println!("Database reset.");
    Ok(())
}

fn cmd_config_init() -> Result<()> {
    let path = init_config()?;
    println!("Config initialized at: {}", path.display());
    Ok(())
}

fn cmd_config_show(path: Option<PathBuf>) -> Result<()> {
    let source = match &path {
        Some(path) => path.clone(),
        None => config_file_path()?,
    };
    let config = load(path)?;
    let toml_str = toml::to_string_pretty(&config)?;
    println!("# {}", source.display());
    println!("{toml_str}");
    Ok(())
}

// ---------------------------------------------------------------------------
// CLI progress reporter
// ---------------------------------------------------------------------------

/// Spinner that shows the current phase and item count.
struct CliProgress {
    spinner: ProgressBar,
    phase: std::sync::Mutex<String>,
}

impl CliProgress {
    fn new() -> Self {
        let spinner = ProgressBar::new_spinner();
        let style = ProgressStyle::with_template("{spinner:.cyan} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"]);
        spinner.set_style(style);
        spinner.enable_steady_tick(std::time::Duration::from_millis(80));
        Self {
            spinner,
            phase: std::sync::Mutex::new(String::new()),
        }
    }
}

impl PipelineProgress for CliProgress {
    fn phase(&self, name: &str) {
        if let Ok(mut phase) = self.phase.lock() {
            *phase = name.to_string();
        }
        self.spinner.set_message(name.to_string());
    }

    fn step(&self, current: usize, total: usize) {
        let phase = self.phase.lock().map(|p| p.clone()).unwrap_or_default();
        self.spinner
            .set_message(format!("{phase} [{current}/{total}]"));
    }

    fn done(&self, summary: &str) {
        self.spinner.finish_and_clear();
        info!(summary, "done");
    }
}
