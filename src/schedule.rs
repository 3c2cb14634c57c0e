use std::future::Future;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::Context as _;
use tokio::time::MissedTickBehavior;

use crate::catalog::open_store;
use crate::cli::{ScheduleArgs, UrlSourceKind};
use crate::dispatch::BatchDispatcher;
use crate::pipeline::{read_url_list, run_batch};
use crate::store::CatalogStore;
use crate::urls::UrlPolicy;

/// Where each scheduled run gets its URLs from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UrlSource {
    /// Every URL already in the catalog.
    Catalog,
    /// A URL list file, re-read on every run.
    File(PathBuf),
}

impl UrlSource {
    pub async fn resolve(&self, store: &dyn CatalogStore) -> anyhow::Result<Vec<String>> {
        match self {
            Self::Catalog => store.list_urls().await.context("list catalog urls"),
            Self::File(path) => read_url_list(path),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Schedule {
    pub interval: Duration,
    /// `None` runs until shutdown.
    pub max_runs: Option<u64>,
}

/// Runs the batch pipeline once immediately and then every `interval`
/// until `max_runs` is reached or `shutdown` resolves. Returns the number
/// of runs started. A failed run is logged and does not stop the loop.
pub async fn run_schedule(
    schedule: &Schedule,
    source: &UrlSource,
    dispatcher: &BatchDispatcher,
    store: &dyn CatalogStore,
    policy: &UrlPolicy,
    shutdown: impl Future<Output = ()>,
) -> u64 {
    let mut ticker = tokio::time::interval(schedule.interval.max(Duration::from_millis(1)));
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    tokio::pin!(shutdown);

    let mut runs = 0;
    loop {
        if schedule.max_runs.is_some_and(|max| runs >= max) {
            tracing::info!(runs, "reached max runs");
            break;
        }
        tokio::select! {
            _ = &mut shutdown => {
                tracing::info!(runs, "schedule stopped");
                break;
            }
            _ = ticker.tick() => {}
        }

        runs += 1;
        tracing::info!(run = runs, "scheduled run starting");
        // Shutdown is only observed between runs.
        if let Err(err) = run_once(source, dispatcher, store, policy).await {
            tracing::error!(run = runs, err = %format!("{err:#}"), "scheduled run failed");
        }
    }
    runs
}

async fn run_once(
    source: &UrlSource,
    dispatcher: &BatchDispatcher,
    store: &dyn CatalogStore,
    policy: &UrlPolicy,
) -> anyhow::Result<()> {
    let urls = source.resolve(store).await?;
    if urls.is_empty() {
        tracing::warn!(?source, "no urls to scrape");
        return Ok(());
    }
    let report = run_batch(dispatcher, store, policy, &urls)
        .await
        .context("run batch")?;
    tracing::info!(
        stored = report.stored,
        failed = report.urls.len() - report.stored,
        "scheduled run finished"
    );
    Ok(())
}

pub async fn run(args: ScheduleArgs) -> anyhow::Result<()> {
    let source = match args.source {
        UrlSourceKind::Catalog => UrlSource::Catalog,
        UrlSourceKind::File => UrlSource::File(
            args.urls_file
                .clone()
                .ok_or_else(|| anyhow::anyhow!("--urls-file is required with --source file"))?,
        ),
    };
    let schedule = Schedule {
        interval: Duration::from_secs(args.interval_secs),
        max_runs: args.max_runs,
    };
    let dispatcher = args.options.dispatcher().context("configure scraper")?;
    let store = open_store(&args.store).await?;

    tracing::info!(
        interval_secs = args.interval_secs,
        ?source,
        max_runs = ?args.max_runs,
        "schedule started"
    );
    let shutdown = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            tracing::error!(%err, "listen for ctrl-c");
            std::future::pending::<()>().await;
        }
    };
    run_schedule(
        &schedule,
        &source,
        &dispatcher,
        &store,
        &args.options.url_policy(),
        shutdown,
    )
    .await;
    Ok(())
}
