use std::path::Path;

use anyhow::Context as _;
use serde::Serialize;

use crate::catalog::open_store;
use crate::cli::{IngestArgs, ScrapeArgs};
use crate::dispatch::BatchDispatcher;
use crate::formats::RawBook;
use crate::normalize::normalize;
use crate::scrape::ScrapeError;
use crate::store::CatalogStore;
use crate::urls::UrlPolicy;

/// What happened to one input URL. Every URL ends in exactly one state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum UrlOutcome {
    /// Failed the URL policy; no browser was started for it.
    Rejected,
    /// Every scrape attempt failed.
    ScrapeFailed,
    /// Scraped, but a required field was missing.
    Invalid,
    StoreFailed,
    Stored,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UrlReport {
    pub url: String,
    pub outcome: UrlOutcome,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct BatchReport {
    pub stored: usize,
    pub rejected: usize,
    pub scrape_failed: usize,
    pub invalid: usize,
    pub store_failed: usize,
    pub urls: Vec<UrlReport>,
}

impl BatchReport {
    fn push(&mut self, url: impl Into<String>, outcome: UrlOutcome, detail: Option<String>) {
        let counter = match outcome {
            UrlOutcome::Rejected => &mut self.rejected,
            UrlOutcome::ScrapeFailed => &mut self.scrape_failed,
            UrlOutcome::Invalid => &mut self.invalid,
            UrlOutcome::StoreFailed => &mut self.store_failed,
            UrlOutcome::Stored => &mut self.stored,
        };
        *counter += 1;
        self.urls.push(UrlReport {
            url: url.into(),
            outcome,
            detail,
        });
    }

    pub fn outcome_of(&self, url: &str) -> Option<UrlOutcome> {
        self.urls
            .iter()
            .find(|report| report.url == url)
            .map(|report| report.outcome)
    }
}

/// Scrapes, normalizes and stores `urls`, reporting in input order.
///
/// URLs that fail the policy never reach the dispatcher. Per-URL failures
/// are recorded in the report; only non-session scrape errors abort.
pub async fn run_batch(
    dispatcher: &BatchDispatcher,
    store: &dyn CatalogStore,
    policy: &UrlPolicy,
    urls: &[String],
) -> Result<BatchReport, ScrapeError> {
    let mut accepted = Vec::new();
    let mut verdicts = Vec::with_capacity(urls.len());
    for url in urls {
        match policy.check(url) {
            Ok(()) => {
                verdicts.push(None);
                accepted.push(url.trim().to_owned());
            }
            Err(reason) => {
                tracing::warn!(url = %url, %reason, "rejected url");
                verdicts.push(Some(reason.to_string()));
            }
        }
    }

    tracing::info!(accepted = accepted.len(), total = urls.len(), "dispatching batch");
    let mut scraped = dispatcher.scrape_all(&accepted).await?.into_iter();

    let mut report = BatchReport::default();
    for (url, verdict) in urls.iter().zip(verdicts) {
        if let Some(reason) = verdict {
            report.push(url.as_str(), UrlOutcome::Rejected, Some(reason));
            continue;
        }
        match scraped.next().flatten() {
            Some(raw) => {
                let (outcome, detail) = store_raw(store, &raw).await;
                report.push(url.as_str(), outcome, detail);
            }
            None => report.push(url.as_str(), UrlOutcome::ScrapeFailed, None),
        }
    }

    tracing::info!(
        stored = report.stored,
        rejected = report.rejected,
        scrape_failed = report.scrape_failed,
        invalid = report.invalid,
        store_failed = report.store_failed,
        "batch finished"
    );
    Ok(report)
}

/// Normalizes and stores already-extracted records.
pub async fn ingest(store: &dyn CatalogStore, policy: &UrlPolicy, raws: &[RawBook]) -> BatchReport {
    let mut report = BatchReport::default();
    for raw in raws {
        if let Err(reason) = policy.check(raw.url.trim()) {
            tracing::warn!(url = %raw.url, %reason, "rejected url");
            report.push(raw.url.as_str(), UrlOutcome::Rejected, Some(reason.to_string()));
            continue;
        }
        let (outcome, detail) = store_raw(store, raw).await;
        report.push(raw.url.as_str(), outcome, detail);
    }
    tracing::info!(stored = report.stored, total = raws.len(), "ingest finished");
    report
}

async fn store_raw(store: &dyn CatalogStore, raw: &RawBook) -> (UrlOutcome, Option<String>) {
    let record = match normalize(raw) {
        Ok(record) => record,
        Err(err) => {
            tracing::warn!(url = %raw.url, %err, "invalid record");
            return (UrlOutcome::Invalid, Some(err.to_string()));
        }
    };
    match store.upsert(&record).await {
        Ok(()) => {
            tracing::debug!(url = %record.url, "stored");
            (UrlOutcome::Stored, None)
        }
        Err(err) => {
            tracing::error!(url = %record.url, %err, "store failed");
            (UrlOutcome::StoreFailed, Some(err.to_string()))
        }
    }
}

/// One URL per line; blank lines and `#` comments are skipped.
pub fn read_url_list(path: &Path) -> anyhow::Result<Vec<String>> {
    let contents = std::fs::read_to_string(path)
        .with_context(|| format!("read url list: {}", path.display()))?;
    Ok(contents
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .map(str::to_owned)
        .collect())
}

/// Parses a JSON Lines file of raw records.
pub fn read_raw_books(path: &Path) -> anyhow::Result<Vec<RawBook>> {
    let contents = std::fs::read_to_string(path)
        .with_context(|| format!("read input: {}", path.display()))?;
    contents
        .lines()
        .enumerate()
        .filter(|(_, line)| !line.trim().is_empty())
        .map(|(index, line)| {
            serde_json::from_str(line)
                .with_context(|| format!("parse {} line {}", path.display(), index + 1))
        })
        .collect()
}

pub async fn scrape(args: ScrapeArgs) -> anyhow::Result<()> {
    let mut urls = args.urls.clone();
    if let Some(path) = &args.urls_file {
        urls.extend(read_url_list(path)?);
    }
    if urls.is_empty() {
        anyhow::bail!("no urls given (use --url or --urls-file)");
    }

    let dispatcher = args.options.dispatcher().context("configure scraper")?;
    let store = open_store(&args.store).await?;
    let report = run_batch(&dispatcher, &store, &args.options.url_policy(), &urls)
        .await
        .context("run batch")?;
    print_report(&report)
}

pub async fn ingest_command(args: IngestArgs) -> anyhow::Result<()> {
    let raws = read_raw_books(&args.input)?;
    let store = open_store(&args.store).await?;
    let report = ingest(&store, &UrlPolicy::new(&args.allowed_host), &raws).await;
    print_report(&report)
}

fn print_report(report: &BatchReport) -> anyhow::Result<()> {
    let json = serde_json::to_string_pretty(report).context("serialize report")?;
    println!("{json}");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn report_counts_follow_outcomes() {
        let mut report = BatchReport::default();
        report.push("a", UrlOutcome::Stored, None);
        report.push("b", UrlOutcome::Rejected, Some("host".to_owned()));
        report.push("c", UrlOutcome::Stored, None);

        assert_eq!(report.stored, 2);
        assert_eq!(report.rejected, 1);
        assert_eq!(report.outcome_of("b"), Some(UrlOutcome::Rejected));
        assert_eq!(report.outcome_of("z"), None);

        let json = serde_json::to_value(&report).expect("serialize");
        assert_eq!(json["urls"][1]["outcome"], "rejected");
        assert!(json["urls"][0].get("detail").is_none());
    }

    #[test]
    fn url_list_skips_comments_and_blanks() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("urls.txt");
        std::fs::write(
            &path,
            "# daily list\nhttps://www.packtpub.com/en-us/product/a\n\n  https://www.packtpub.com/en-us/product/b  \n",
        )?;
        assert_eq!(
            read_url_list(&path)?,
            vec![
                "https://www.packtpub.com/en-us/product/a".to_owned(),
                "https://www.packtpub.com/en-us/product/b".to_owned(),
            ]
        );
        Ok(())
    }
}
