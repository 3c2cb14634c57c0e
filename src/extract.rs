use std::time::Duration;

use tokio::time::Instant;

use crate::browser::PageSession;
use crate::formats::RawBook;
use crate::scrape::{ScrapeError, ScrapeTiming};
use crate::selectors::{Locator, Selectors};

/// Loads `url` in `session` and reads every product field.
///
/// Fields that never show up within the element timeout come back as
/// `None` (or an empty list); only session failures and unusable locators
/// abort the extraction.
pub async fn extract(
    session: &mut dyn PageSession,
    url: &str,
    selectors: &Selectors,
    timing: &ScrapeTiming,
) -> Result<RawBook, ScrapeError> {
    tokio::time::sleep(timing.warmup).await;
    session.navigate(url, timing.page_load_timeout).await?;
    // Product pages render client-side after the load event.
    tokio::time::sleep(timing.settle).await;

    let mut lookup = FieldLookup {
        session,
        timeout: timing.element_timeout,
        poll_interval: timing.poll_interval,
    };

    Ok(RawBook {
        url: url.to_owned(),
        title: lookup.first("title", &selectors.title).await?,
        authors: lookup.all("authors", &selectors.authors).await?,
        original_price: lookup
            .first("original_price", &selectors.original_price)
            .await?,
        discounted_price: lookup
            .first("discounted_price", &selectors.discounted_price)
            .await?,
        rating: lookup.first("rating", &selectors.rating).await?,
        num_ratings: lookup.first("num_ratings", &selectors.num_ratings).await?,
        pages: lookup.first("pages", &selectors.pages).await?,
        edition: lookup.first("edition", &selectors.edition).await?,
        publication_date: lookup
            .first("publication_date", &selectors.publication_date)
            .await?,
        key_benefits: lookup.all("key_benefits", &selectors.key_benefits).await?,
        description: lookup.first("description", &selectors.description).await?,
        what_you_will_learn: lookup
            .all("what_you_will_learn", &selectors.what_you_will_learn)
            .await?,
    })
}

struct FieldLookup<'a> {
    session: &'a mut dyn PageSession,
    timeout: Duration,
    poll_interval: Duration,
}

impl FieldLookup<'_> {
    async fn first(
        &mut self,
        field: &'static str,
        locators: &[Locator],
    ) -> Result<Option<String>, ScrapeError> {
        Ok(self
            .await_present(field, locators)
            .await?
            .and_then(|texts| texts.into_iter().next()))
    }

    async fn all(
        &mut self,
        field: &'static str,
        locators: &[Locator],
    ) -> Result<Vec<String>, ScrapeError> {
        Ok(self
            .await_present(field, locators)
            .await?
            .unwrap_or_default())
    }

    /// Polls until one of `locators` matches at least one element. Every
    /// locator is tried at least once even with a zero timeout.
    async fn await_present(
        &mut self,
        field: &'static str,
        locators: &[Locator],
    ) -> Result<Option<Vec<String>>, ScrapeError> {
        for locator in locators {
            locator
                .validate()
                .map_err(|reason| ScrapeError::InvalidLocator { field, reason })?;
        }

        let deadline = Instant::now() + self.timeout;
        loop {
            for locator in locators {
                let texts = self.session.query_texts(locator).await?;
                if !texts.is_empty() {
                    tracing::trace!(field, %locator, count = texts.len(), "field located");
                    return Ok(Some(texts));
                }
            }
            if Instant::now() >= deadline {
                tracing::warn!(field, timeout = ?self.timeout, "element not found");
                return Ok(None);
            }
            tokio::time::sleep(self.poll_interval).await;
        }
    }
}
