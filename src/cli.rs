use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::{Args, Parser, Subcommand, ValueEnum};

use crate::browser::{BrowserOptions, ChromeLauncher};
use crate::dispatch::BatchDispatcher;
use crate::scrape::{RetryPolicy, ScrapeTiming, Scraper};
use crate::selectors::Selectors;
use crate::urls::{DEFAULT_ALLOWED_HOST, UrlPolicy};

#[derive(Debug, Parser)]
#[command(author, version, about)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Scrape product pages and store the valid records.
    Scrape(ScrapeArgs),
    /// Normalize and store raw records from a JSON Lines file.
    Ingest(IngestArgs),
    /// Print matching records as JSON Lines.
    Search(SearchArgs),
    /// Print the record stored for one URL.
    Lookup(LookupArgs),
    /// Print the number of stored records.
    Count(StoreArgs),
    /// Write a full CSV or JSON snapshot of the catalog.
    Export(ExportArgs),
    /// Print price, rating and author distributions as JSON.
    Stats(StoreArgs),
    /// Re-run the scrape pipeline on a fixed interval.
    Schedule(ScheduleArgs),
}

#[derive(Debug, Clone, Args)]
pub struct StoreArgs {
    /// SQLite database file (created if missing).
    #[arg(long, env = "BOOKCATALOG_DB", default_value = "catalog.db")]
    pub db: PathBuf,
}

#[derive(Debug, Clone, Args)]
pub struct ScrapeOptions {
    /// Show the browser window instead of running headless.
    #[arg(long)]
    pub headed: bool,

    /// Chromium/Chrome executable (default: auto-detect).
    #[arg(long)]
    pub chrome: Option<PathBuf>,

    /// Browser sessions per URL before giving up.
    #[arg(long, default_value_t = 3, value_parser = clap::value_parser!(u32).range(1..))]
    pub max_attempts: u32,

    /// Delay between attempts.
    #[arg(long, default_value_t = 2000)]
    pub retry_delay_ms: u64,

    /// Navigation timeout.
    #[arg(long, default_value_t = 30)]
    pub page_load_timeout_secs: u64,

    /// Pause after browser start, before navigating.
    #[arg(long, default_value_t = 2000)]
    pub warmup_ms: u64,

    /// Pause after navigation for client-side rendering.
    #[arg(long, default_value_t = 5000)]
    pub settle_ms: u64,

    /// Per-field element lookup timeout.
    #[arg(long, default_value_t = 10)]
    pub element_timeout_secs: u64,

    /// Maximum browsers running at once.
    #[arg(
        long,
        default_value_t = 4,
        value_parser = clap::builder::RangedU64ValueParser::<usize>::new().range(1..)
    )]
    pub concurrency: usize,

    /// YAML file overriding the built-in field locators.
    #[arg(long)]
    pub selectors: Option<PathBuf>,

    /// Only URLs on this host are scraped.
    #[arg(long, default_value = DEFAULT_ALLOWED_HOST)]
    pub allowed_host: String,
}

impl ScrapeOptions {
    pub fn timing(&self) -> ScrapeTiming {
        ScrapeTiming {
            warmup: Duration::from_millis(self.warmup_ms),
            page_load_timeout: Duration::from_secs(self.page_load_timeout_secs),
            settle: Duration::from_millis(self.settle_ms),
            element_timeout: Duration::from_secs(self.element_timeout_secs),
            ..ScrapeTiming::default()
        }
    }

    pub fn retry(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.max_attempts,
            delay: Duration::from_millis(self.retry_delay_ms),
        }
    }

    pub fn url_policy(&self) -> UrlPolicy {
        UrlPolicy::new(&self.allowed_host)
    }

    pub fn selectors(&self) -> anyhow::Result<Selectors> {
        match &self.selectors {
            Some(path) => Selectors::load(path),
            None => Ok(Selectors::default()),
        }
    }

    /// Chromium-backed dispatcher configured from these flags.
    pub fn dispatcher(&self) -> anyhow::Result<BatchDispatcher> {
        let launcher = ChromeLauncher::new(BrowserOptions {
            headless: !self.headed,
            executable: self.chrome.clone(),
            request_timeout: Duration::from_secs(self.page_load_timeout_secs),
        });
        let scraper = Scraper::new(Arc::new(launcher), self.selectors()?)
            .with_timing(self.timing())
            .with_retry(self.retry());
        Ok(BatchDispatcher::new(scraper, self.concurrency))
    }
}

#[derive(Debug, Args)]
pub struct ScrapeArgs {
    /// Product page URL (repeatable).
    #[arg(long = "url")]
    pub urls: Vec<String>,

    /// File with one URL per line (`#` starts a comment).
    #[arg(long)]
    pub urls_file: Option<PathBuf>,

    #[command(flatten)]
    pub store: StoreArgs,

    #[command(flatten)]
    pub options: ScrapeOptions,
}

#[derive(Debug, Args)]
pub struct IngestArgs {
    /// JSON Lines file of raw records.
    #[arg(long)]
    pub input: PathBuf,

    /// Only URLs on this host are accepted.
    #[arg(long, default_value = DEFAULT_ALLOWED_HOST)]
    pub allowed_host: String,

    #[command(flatten)]
    pub store: StoreArgs,
}

#[derive(Debug, Args)]
pub struct SearchArgs {
    /// Case-insensitive text matched against title, author and description.
    #[arg(long)]
    pub query: Option<String>,

    #[arg(long)]
    pub limit: Option<usize>,

    #[command(flatten)]
    pub store: StoreArgs,
}

#[derive(Debug, Args)]
pub struct LookupArgs {
    #[arg(long)]
    pub url: String,

    #[command(flatten)]
    pub store: StoreArgs,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ExportFormat {
    Csv,
    Json,
}

#[derive(Debug, Args)]
pub struct ExportArgs {
    #[arg(long, value_enum)]
    pub format: ExportFormat,

    /// Output file; replaced if it exists.
    #[arg(long)]
    pub out: PathBuf,

    #[command(flatten)]
    pub store: StoreArgs,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum UrlSourceKind {
    /// Every URL already in the catalog.
    Catalog,
    /// The URLs listed in `--urls-file`, re-read on each run.
    File,
}

#[derive(Debug, Args)]
pub struct ScheduleArgs {
    /// Seconds between runs. The first run starts immediately.
    #[arg(long, default_value_t = 86_400)]
    pub interval_secs: u64,

    #[arg(long, value_enum, default_value_t = UrlSourceKind::Catalog)]
    pub source: UrlSourceKind,

    /// URL list for `--source file`.
    #[arg(long, required_if_eq("source", "file"))]
    pub urls_file: Option<PathBuf>,

    /// Stop after this many runs (default: run until interrupted).
    #[arg(long)]
    pub max_runs: Option<u64>,

    #[command(flatten)]
    pub store: StoreArgs,

    #[command(flatten)]
    pub options: ScrapeOptions,
}
