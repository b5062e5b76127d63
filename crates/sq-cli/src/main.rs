use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use sq_core::{Pipeline, Provider, ToolRegistry, Topology};
use sq_providers::OpenAIProvider;
use sq_tools::{create_web_tools, LangSearchClient};

mod chat;
mod config;
mod interface;
mod session;
mod turn;

use config::{Config, ModelEntry, Overrides};
use interface::{ReadlineInterface, TerminalOutput};
use session::SessionHistory;

/// Log level for tracing output
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LogLevel {
    /// Most verbose
    Trace,
    /// Model requests, search requests, tool execution details
    Debug,
    /// Node completions and generated queries
    Info,
    /// Quiet: only warnings and errors
    Warn,
    /// Minimal: only errors
    Error,
}

impl LogLevel {
    fn as_filter(&self) -> &'static str {
        match self {
            LogLevel::Trace => "trace",
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
        }
    }
}

#[derive(Parser)]
#[command(name = "sq")]
#[command(author, version, about = "Support-query: Apple product support answers from official documentation", long_about = None)]
pub struct Cli {
    /// Question to answer once, then exit
    #[arg(short, long)]
    pub prompt: Option<String>,

    /// Config file (default: ~/.config/sq/config.toml)
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Model that generates search queries
    #[arg(long)]
    pub query_model: Option<String>,

    /// Model that writes the answer
    #[arg(long)]
    pub answer_model: Option<String>,

    /// Base URL for both models' OpenAI-compatible API
    #[arg(long)]
    pub base_url: Option<String>,

    /// Search results per query
    #[arg(long)]
    pub count: Option<u32>,

    /// Site to restrict searches to
    #[arg(long)]
    pub site: Option<String>,

    /// Pipeline topology (linear, tool_loop)
    #[arg(long)]
    pub topology: Option<Topology>,

    /// Print answers at once instead of a few characters at a time
    #[arg(long)]
    pub no_typewriter: bool,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, value_enum, default_value = "warn")]
    pub log_level: LogLevel,

    /// Enable debug logging (shorthand for --log-level debug)
    #[arg(short, long)]
    pub debug: bool,

    /// Write logs to file (JSON-lines format)
    #[arg(long)]
    pub log_file: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

impl Cli {
    fn overrides(&self) -> Overrides {
        Overrides {
            query_model: self.query_model.clone(),
            answer_model: self.answer_model.clone(),
            base_url: self.base_url.clone(),
            count: self.count,
            site: self.site.clone(),
            topology: self.topology,
            no_typewriter: self.no_typewriter,
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Run only the web search and print the citations
    Search {
        /// Search keywords
        #[arg(required = true)]
        query: Vec<String>,

        /// Number of results
        #[arg(short = 'n', long)]
        count: Option<u32>,
    },
    /// Show current configuration
    Config,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Resolve log level: --debug overrides --log-level
    let log_level = if cli.debug {
        LogLevel::Debug
    } else {
        cli.log_level
    };

    let filter = EnvFilter::new(log_level.as_filter());

    if let Some(log_path) = &cli.log_file {
        // Log file specified: write JSON to file
        let file = std::fs::File::create(log_path)
            .with_context(|| format!("Failed to create log file: {:?}", log_path))?;
        tracing_subscriber::registry()
            .with(filter)
            .with(
                fmt::layer()
                    .json()
                    .with_writer(std::sync::Mutex::new(file)),
            )
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .init();
    }

    let mut config = Config::load(cli.config.as_deref())?;
    config.apply(&cli.overrides());
    config.validate()?;

    match &cli.command {
        Some(Commands::Search { query, count }) => {
            search_mode(&config, &query.join(" "), count.unwrap_or(config.search.count)).await
        }
        Some(Commands::Config) => show_config(&cli, &config),
        None => {
            let pipeline = build_pipeline(&config)?;
            if let Some(prompt) = &cli.prompt {
                completion_mode(&pipeline, prompt).await
            } else {
                let stdout_is_tty = atty::is(atty::Stream::Stdout);
                let typewriter = (config.ui.typewriter && stdout_is_tty)
                    .then(|| Duration::from_millis(config.ui.typewriter_delay_ms));
                let output = TerminalOutput::stdout()
                    .with_typewriter(typewriter)
                    .with_color(stdout_is_tty);
                chat::run_chat(&pipeline, ReadlineInterface::new(output)).await
            }
        }
    }
}

/// Wire the models, the search tool and the pipeline from configuration.
fn build_pipeline(config: &Config) -> Result<Pipeline> {
    let http = config.http_client()?;

    if config.search.api_key.is_none() {
        tracing::warn!(
            "No search API key configured; set LANGSEARCH_API_KEY or [search].api_key"
        );
    }

    let query_model = create_provider("query", &config.models.query, http.clone());
    let answer_model = create_provider("answer", &config.models.answer, http.clone());

    let search = LangSearchClient::new(config.search_config()).with_client(http);
    let mut registry = ToolRegistry::new();
    for tool in create_web_tools(search, config.search.count) {
        registry.register(tool);
    }

    Ok(Pipeline::new(
        query_model,
        answer_model,
        Arc::new(registry),
        config.pipeline_config(),
    ))
}

fn create_provider(stage: &str, entry: &ModelEntry, http: reqwest::Client) -> Arc<dyn Provider> {
    let mut provider = OpenAIProvider::new()
        .with_client(http)
        .with_name(stage)
        .with_base_url(&entry.base_url)
        .with_default_model(&entry.model);
    if let Some(key) = &entry.api_key {
        provider = provider.with_api_key(key);
    }
    Arc::new(provider)
}

/// Answer a single question without the interactive loop.
async fn completion_mode(pipeline: &Pipeline, prompt: &str) -> Result<()> {
    let mut history = SessionHistory::new();
    let mut output = TerminalOutput::stdout().with_color(atty::is(atty::Stream::Stdout));

    let outcome = turn::run_turn(pipeline, &mut history, prompt, &mut output).await?;
    if outcome.failed {
        std::process::exit(1);
    }
    Ok(())
}

async fn search_mode(config: &Config, query: &str, count: u32) -> Result<()> {
    let client = LangSearchClient::new(config.search_config()).with_client(config.http_client()?);
    let results = client.search(query, count.max(1)).await?;
    println!("{}", results.to_citation_text());
    Ok(())
}

fn show_config(cli: &Cli, config: &Config) -> Result<()> {
    let path = match &cli.config {
        Some(path) => path.clone(),
        None => Config::config_path()?,
    };
    println!("# Configuration file: {}", path.display());
    if !path.exists() {
        println!("# (not found, using defaults and environment)");
    }
    println!(
        "{}",
        toml::to_string_pretty(&config.redacted()).context("Failed to render configuration")?
    );
    Ok(())
}
