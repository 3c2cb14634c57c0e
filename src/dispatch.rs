use std::sync::Arc;

use tokio::sync::Semaphore;
use tokio::task::JoinSet;

use crate::formats::RawBook;
use crate::scrape::{ScrapeError, Scraper};

/// Fans URLs out to concurrent scrapes and collects results in input order.
#[derive(Clone)]
pub struct BatchDispatcher {
    scraper: Scraper,
    semaphore: Arc<Semaphore>,
}

impl BatchDispatcher {
    /// At most `max_concurrency` browsers run at once. The CLI rejects 0;
    /// callers passing it directly get a pool of one.
    pub fn new(scraper: Scraper, max_concurrency: usize) -> Self {
        Self {
            scraper,
            semaphore: Arc::new(Semaphore::new(max_concurrency.max(1))),
        }
    }

    pub fn scraper(&self) -> &Scraper {
        &self.scraper
    }

    /// One slot per input URL; `None` marks a URL that exhausted its retries.
    ///
    /// A non-session error from any URL aborts the remaining tasks.
    pub async fn scrape_all(&self, urls: &[String]) -> Result<Vec<Option<RawBook>>, ScrapeError> {
        let mut tasks = JoinSet::new();
        for (index, url) in urls.iter().cloned().enumerate() {
            let scraper = self.scraper.clone();
            let semaphore = Arc::clone(&self.semaphore);
            tasks.spawn(async move {
                // Never closed: the dispatcher owns the only handle that could.
                let _permit = semaphore
                    .acquire_owned()
                    .await
                    .expect("scrape pool semaphore is closed");
                let result = scraper.scrape_with_retry(&url).await;
                (index, url, result)
            });
        }

        let mut results: Vec<Option<RawBook>> = vec![None; urls.len()];
        while let Some(joined) = tasks.join_next().await {
            let (index, url, result) = joined.map_err(|err| ScrapeError::Task(err.to_string()))?;
            results[index] = result.map_err(|err| {
                tracing::error!(url = %url, %err, "scrape aborted batch");
                err
            })?;
        }

        Ok(results)
    }
}
