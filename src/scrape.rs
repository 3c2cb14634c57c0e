use std::sync::Arc;
use std::time::Duration;

use crate::browser::{SessionError, SessionLauncher};
use crate::formats::RawBook;
use crate::selectors::Selectors;

#[derive(Debug, thiserror::Error)]
pub enum ScrapeError {
    #[error(transparent)]
    Session(#[from] SessionError),
    #[error("invalid locator for {field}: {reason}")]
    InvalidLocator { field: &'static str, reason: String },
    #[error("scrape task failed: {0}")]
    Task(String),
}

/// Waits applied while loading and reading one page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScrapeTiming {
    /// Pause after the browser starts, before navigating.
    pub warmup: Duration,
    pub page_load_timeout: Duration,
    /// Unconditional pause after navigation for client-side rendering.
    pub settle: Duration,
    /// Upper bound for each field's presence lookup.
    pub element_timeout: Duration,
    pub poll_interval: Duration,
}

impl Default for ScrapeTiming {
    fn default() -> Self {
        Self {
            warmup: Duration::from_secs(2),
            page_load_timeout: Duration::from_secs(30),
            settle: Duration::from_secs(5),
            element_timeout: Duration::from_secs(10),
            poll_interval: Duration::from_millis(250),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            delay: Duration::from_secs(2),
        }
    }
}

/// Scrapes single product pages. Cheap to clone; clones share the launcher.
#[derive(Clone)]
pub struct Scraper {
    launcher: Arc<dyn SessionLauncher>,
    selectors: Arc<Selectors>,
    timing: ScrapeTiming,
    retry: RetryPolicy,
}

impl Scraper {
    pub fn new(launcher: Arc<dyn SessionLauncher>, selectors: Selectors) -> Self {
        Self {
            launcher,
            selectors: Arc::new(selectors),
            timing: ScrapeTiming::default(),
            retry: RetryPolicy::default(),
        }
    }

    pub fn with_timing(mut self, timing: ScrapeTiming) -> Self {
        self.timing = timing;
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        self.retry
    }

    /// One full session cycle: launch, extract, tear down.
    ///
    /// The browser is closed whether or not extraction succeeded.
    pub async fn scrape_once(&self, url: &str) -> Result<RawBook, ScrapeError> {
        let mut session = self.launcher.launch().await?;
        let outcome =
            crate::extract::extract(session.as_mut(), url, &self.selectors, &self.timing).await;
        if let Err(err) = session.close().await {
            tracing::warn!(url, %err, "browser teardown failed");
        }
        outcome
    }

    /// Retries session failures with a fresh browser each attempt.
    ///
    /// Returns `Ok(None)` once `max_attempts` sessions have failed. Errors
    /// that are not session failures are returned immediately. A policy of
    /// zero attempts still makes one; the CLI refuses to build one.
    pub async fn scrape_with_retry(&self, url: &str) -> Result<Option<RawBook>, ScrapeError> {
        let max_attempts = self.retry.max_attempts.max(1);
        for attempt in 1..=max_attempts {
            match self.scrape_once(url).await {
                Ok(raw) => {
                    tracing::info!(url, attempt, "scraped");
                    return Ok(Some(raw));
                }
                Err(ScrapeError::Session(err)) => {
                    tracing::warn!(url, attempt, %err, "scrape attempt failed");
                    if attempt < max_attempts {
                        tokio::time::sleep(self.retry.delay).await;
                    }
                }
                Err(err) => return Err(err),
            }
        }

        tracing::error!(url, attempts = max_attempts, "giving up on url");
        Ok(None)
    }
}
