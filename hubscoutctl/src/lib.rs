use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::{Args, Parser, Subcommand, ValueEnum};
use serde::Serialize;
use thiserror::Error;
use tracing::info;
use tracing_subscriber::EnvFilter;

use hubscout_core::browser::{BrowserLauncher, ChromiumSessionFactory, RunMetrics, SessionFactory};
use hubscout_core::{
    load_input, load_scout_config, write_records, ConfigError, InputError, OutputError,
    ScoutConfig, ScrapeError, ScrapeOrchestrator, ScrapeSettings,
};

pub type Result<T> = std::result::Result<T, AppError>;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("config error: {0}")]
    Config(#[from] ConfigError),
    #[error("validating: {0}")]
    Input(#[from] InputError),
    #[error("{0}")]
    Scrape(#[from] ScrapeError),
    #[error("writing: {0}")]
    Output(#[from] OutputError),
    #[error("serialization error: {0}")]
    Serialize(#[from] serde_json::Error),
}

#[derive(Parser, Debug)]
#[command(
    author,
    version,
    about = "Scrape GitHub search results through a pool of untrusted proxies",
    long_about = None
)]
pub struct Cli {
    /// Path to hubscout.toml (built-in defaults when omitted)
    #[arg(long)]
    pub config: Option<PathBuf>,
    /// Log filter, e.g. `info` or `hubscout_core=debug` (overrides RUST_LOG)
    #[arg(long)]
    pub log_level: Option<String>,
    /// Format for command summaries
    #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
    pub format: OutputFormat,
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Race the proxies, fetch the search page and write the results
    Scrape(ScrapeArgs),
    /// Race the proxies only and report which one connected first
    Probe(InputArgs),
    /// Check the input file and show the search that would run
    Validate(InputArgs),
}

#[derive(Args, Debug, Clone)]
pub struct InputArgs {
    /// Run input: keywords, proxies and search type
    #[arg(long, default_value = "input.json")]
    pub input: PathBuf,
}

#[derive(Args, Debug, Clone)]
pub struct ScrapeArgs {
    #[command(flatten)]
    pub input: InputArgs,
    /// Where to write the results (defaults to output.path from the config)
    #[arg(long)]
    pub output: Option<PathBuf>,
    /// Do not echo the results to stdout
    #[arg(long)]
    pub no_print: bool,
}

/// Installs the stderr log subscriber. Safe to call more than once.
pub fn init_tracing(level: Option<&str>) {
    let filter = match level {
        Some(level) => EnvFilter::new(level),
        None => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
    };
    let _ = tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(filter)
        .try_init();
}

pub async fn run(cli: Cli) -> Result<()> {
    let config = load_config(cli.config.as_deref())?;

    match &cli.command {
        Commands::Validate(args) => {
            let summary = validate(&config, args)?;
            render(&summary, cli.format)?;
        }
        Commands::Probe(args) => {
            let summary = probe(&config, args).await?;
            render(&summary, cli.format)?;
        }
        Commands::Scrape(args) => {
            let (summary, rendered) = scrape(&config, args).await?;
            if config.output.print && !args.no_print {
                println!("{rendered}");
            } else {
                render(&summary, cli.format)?;
            }
        }
    }

    Ok(())
}

fn load_config(path: Option<&Path>) -> Result<ScoutConfig> {
    match path {
        Some(path) => Ok(load_scout_config(path)?),
        None => {
            let config = ScoutConfig::default();
            config.validate()?;
            Ok(config)
        }
    }
}

fn validate(config: &ScoutConfig, args: &InputArgs) -> Result<ValidationSummary> {
    let input = load_input(&args.input)?;
    let settings = ScrapeSettings::from_config(config)?;
    Ok(ValidationSummary {
        input: args.input.display().to_string(),
        search_type: input.search_type.to_string(),
        keywords: input.keywords.clone(),
        proxies: input.proxies.len(),
        fetches_details: input.search_type.wants_extras(),
        search_url: settings.search_url(&input),
    })
}

async fn probe(config: &ScoutConfig, args: &InputArgs) -> Result<ProbeSummary> {
    let input = load_input(&args.input)?;
    let factory = launch(config).await?;
    let outcome = match orchestrator(&factory, config) {
        Ok(orchestrator) => orchestrator
            .probe(&input.proxies)
            .await
            .map(|proxy| (proxy, orchestrator.metrics())),
        Err(err) => Err(err),
    };
    factory.shutdown().await;

    let (proxy, metrics) = outcome?;
    Ok(ProbeSummary {
        proxy,
        candidates: input.proxies.len(),
        metrics,
    })
}

async fn scrape(config: &ScoutConfig, args: &ScrapeArgs) -> Result<(ScrapeSummary, String)> {
    let input = load_input(&args.input.input)?;
    let output = args
        .output
        .clone()
        .unwrap_or_else(|| PathBuf::from(&config.output.path));

    let factory = launch(config).await?;
    let outcome = match orchestrator(&factory, config) {
        Ok(orchestrator) => orchestrator.run(&input).await,
        Err(err) => Err(err),
    };
    factory.shutdown().await;
    let report = outcome?;

    let rendered = write_records(&output, &report.records)?;
    info!(
        path = %output.display(),
        records = report.records.len(),
        "results written"
    );
    let summary = ScrapeSummary {
        proxy: report.proxy,
        search_url: report.search_url,
        records: report.records.len(),
        output: output.display().to_string(),
        retries: report.metrics.retries,
        duration_ms: report.duration_ms,
    };
    Ok((summary, rendered))
}

async fn launch(config: &ScoutConfig) -> Result<Arc<ChromiumSessionFactory>> {
    let factory = BrowserLauncher::new(config)
        .launch()
        .await
        .map_err(ScrapeError::Launch)?;
    Ok(Arc::new(factory))
}

fn orchestrator(
    factory: &Arc<ChromiumSessionFactory>,
    config: &ScoutConfig,
) -> std::result::Result<ScrapeOrchestrator, ScrapeError> {
    let sessions: Arc<dyn SessionFactory> = factory.clone();
    ScrapeOrchestrator::from_config(sessions, config)
}

fn render<T>(value: &T, format: OutputFormat) -> Result<()>
where
    T: Serialize + DisplayFallback,
{
    match format {
        OutputFormat::Text => {
            println!("{}", value.display());
            Ok(())
        }
        OutputFormat::Json => {
            let json = serde_json::to_string_pretty(value)?;
            println!("{}", json);
            Ok(())
        }
    }
}

trait DisplayFallback {
    fn display(&self) -> String;
}

#[derive(Debug, Serialize)]
struct ValidationSummary {
    input: String,
    search_type: String,
    keywords: Vec<String>,
    proxies: usize,
    fetches_details: bool,
    search_url: String,
}

#[derive(Debug, Serialize)]
struct ProbeSummary {
    proxy: String,
    candidates: usize,
    metrics: RunMetrics,
}

#[derive(Debug, Serialize)]
struct ScrapeSummary {
    proxy: String,
    search_url: String,
    records: usize,
    output: String,
    retries: u64,
    duration_ms: u64,
}

impl DisplayFallback for ValidationSummary {
    fn display(&self) -> String {
        let mut lines = vec![format!("{} is valid", self.input)];
        lines.push(format!("  type: {}", self.search_type));
        lines.push(format!("  keywords: {}", self.keywords.join(", ")));
        lines.push(format!("  proxies: {}", self.proxies));
        lines.push(format!(
            "  repository details: {}",
            if self.fetches_details { "yes" } else { "no" }
        ));
        lines.push(format!("  search url: {}", self.search_url));
        lines.join("\n")
    }
}

impl DisplayFallback for ProbeSummary {
    fn display(&self) -> String {
        format!(
            "{} connected first ({} candidates, {} failed, {} cancelled)",
            self.proxy,
            self.candidates,
            self.metrics.probes_failed,
            self.metrics.probes_cancelled
        )
    }
}

impl DisplayFallback for ScrapeSummary {
    fn display(&self) -> String {
        [
            format!("{} results via {}", self.records, self.proxy),
            format!("  search url: {}", self.search_url),
            format!("  written to: {}", self.output),
            format!("  retries: {}", self.retries),
            format!("  duration: {}ms", self.duration_ms),
        ]
        .join("\n")
    }
}
