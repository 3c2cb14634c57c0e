#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use bookcatalog::browser::{PageSession, SessionError, SessionLauncher};
use bookcatalog::scrape::{RetryPolicy, ScrapeTiming, Scraper};
use bookcatalog::selectors::{Locator, Selectors};

pub const FIELDS: [&str; 12] = [
    "title",
    "authors",
    "original_price",
    "discounted_price",
    "rating",
    "num_ratings",
    "pages",
    "edition",
    "publication_date",
    "key_benefits",
    "description",
    "what_you_will_learn",
];

/// One `#<field>` CSS locator per field.
pub fn test_selectors() -> Selectors {
    let loc = |field: &str| vec![Locator::css(format!("#{field}"))];
    Selectors {
        title: loc("title"),
        authors: loc("authors"),
        original_price: loc("original_price"),
        discounted_price: loc("discounted_price"),
        rating: loc("rating"),
        num_ratings: loc("num_ratings"),
        pages: loc("pages"),
        edition: loc("edition"),
        publication_date: loc("publication_date"),
        key_benefits: loc("key_benefits"),
        description: loc("description"),
        what_you_will_learn: loc("what_you_will_learn"),
    }
}

pub fn instant_timing() -> ScrapeTiming {
    ScrapeTiming {
        warmup: Duration::ZERO,
        page_load_timeout: Duration::from_secs(5),
        settle: Duration::ZERO,
        element_timeout: Duration::ZERO,
        poll_interval: Duration::from_millis(1),
    }
}

/// Element lookups that actually poll: `timeout` per field, 5ms between polls.
pub fn polling_timing(timeout: Duration) -> ScrapeTiming {
    ScrapeTiming {
        element_timeout: timeout,
        poll_interval: Duration::from_millis(5),
        ..instant_timing()
    }
}

pub fn scraper(browser: &FakeBrowser, max_attempts: u32) -> Scraper {
    Scraper::new(Arc::new(browser.clone()), test_selectors())
        .with_timing(instant_timing())
        .with_retry(RetryPolicy {
            max_attempts,
            delay: Duration::ZERO,
        })
}

pub fn product_url(slug: &str) -> String {
    format!("https://www.packtpub.com/en-us/product/{slug}")
}

#[derive(Debug, Clone, Default)]
pub struct FakePage {
    texts: HashMap<String, Vec<String>>,
    load_delay: Duration,
    /// Navigation failures before the page loads; `u32::MAX` never loads.
    failures: u32,
    /// Lookups of a locator that come back empty before it renders.
    hidden_polls: HashMap<String, u32>,
    /// Locator whose lookup fails with a protocol error.
    broken: Option<String>,
}

impl FakePage {
    /// Every field present with plausible text.
    pub fn product(title: &str) -> Self {
        Self::default()
            .with("title", &[title])
            .with("authors", &["By", "Jane Doe"])
            .with("original_price", &["$39.99"])
            .with("discounted_price", &["$27.98"])
            .with("rating", &["4.5"])
            .with("num_ratings", &["(12 Ratings)"])
            .with("pages", &["320 pages"])
            .with("edition", &["1st Edition"])
            .with("publication_date", &["Mar 2024"])
            .with("key_benefits", &["Learn fast", "Build things"])
            .with("description", &["A practical guide."])
            .with("what_you_will_learn", &["Ownership"])
    }

    pub fn with(mut self, field: &str, texts: &[&str]) -> Self {
        self.texts.insert(
            format!("#{field}"),
            texts.iter().map(|text| (*text).to_owned()).collect(),
        );
        self
    }

    pub fn without(mut self, field: &str) -> Self {
        self.texts.remove(&format!("#{field}"));
        self
    }

    /// `field` renders only after `polls` empty lookups in a session.
    pub fn revealed_after(mut self, field: &str, polls: u32) -> Self {
        self.hidden_polls.insert(format!("#{field}"), polls);
        self
    }

    pub fn broken_at(mut self, field: &str) -> Self {
        self.broken = Some(format!("#{field}"));
        self
    }

    pub fn delayed(mut self, delay: Duration) -> Self {
        self.load_delay = delay;
        self
    }

    pub fn failing(mut self, times: u32) -> Self {
        self.failures = times;
        self
    }

    pub fn unreachable(self) -> Self {
        self.failing(u32::MAX)
    }
}

#[derive(Debug, Default)]
struct Shared {
    pages: Mutex<HashMap<String, FakePage>>,
    navigations: Mutex<HashMap<String, u32>>,
    /// Launches left to fail; `u32::MAX` fails forever.
    launch_failures: Mutex<u32>,
    launches: AtomicUsize,
    closes: AtomicUsize,
    live: AtomicUsize,
    max_live: AtomicUsize,
}

/// In-memory stand-in for a browser. Clones share state and counters.
#[derive(Debug, Clone, Default)]
pub struct FakeBrowser {
    shared: Arc<Shared>,
}

impl FakeBrowser {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn page(self, url: &str, page: FakePage) -> Self {
        self.shared
            .pages
            .lock()
            .unwrap()
            .insert(url.to_owned(), page);
        self
    }

    pub fn failing_launches(self, times: u32) -> Self {
        *self.shared.launch_failures.lock().unwrap() = times;
        self
    }

    /// Launch attempts, failed ones included.
    pub fn launches(&self) -> usize {
        self.shared.launches.load(Ordering::SeqCst)
    }

    pub fn closes(&self) -> usize {
        self.shared.closes.load(Ordering::SeqCst)
    }

    pub fn live(&self) -> usize {
        self.shared.live.load(Ordering::SeqCst)
    }

    pub fn max_live(&self) -> usize {
        self.shared.max_live.load(Ordering::SeqCst)
    }

    pub fn navigations(&self, url: &str) -> u32 {
        self.shared
            .navigations
            .lock()
            .unwrap()
            .get(url)
            .copied()
            .unwrap_or(0)
    }
}

#[async_trait]
impl SessionLauncher for FakeBrowser {
    async fn launch(&self) -> Result<Box<dyn PageSession>, SessionError> {
        self.shared.launches.fetch_add(1, Ordering::SeqCst);
        {
            let mut remaining = self.shared.launch_failures.lock().unwrap();
            if *remaining > 0 {
                if *remaining != u32::MAX {
                    *remaining -= 1;
                }
                return Err(SessionError::Launch("chrome exited during startup".to_owned()));
            }
        }
        let live = self.shared.live.fetch_add(1, Ordering::SeqCst) + 1;
        self.shared.max_live.fetch_max(live, Ordering::SeqCst);
        Ok(Box::new(FakeSession {
            shared: Arc::clone(&self.shared),
            current: None,
            polls: HashMap::new(),
        }))
    }
}

struct FakeSession {
    shared: Arc<Shared>,
    current: Option<FakePage>,
    polls: HashMap<String, u32>,
}

#[async_trait]
impl PageSession for FakeSession {
    async fn navigate(&mut self, url: &str, _timeout: Duration) -> Result<(), SessionError> {
        let attempt = {
            let mut navigations = self.shared.navigations.lock().unwrap();
            let count = navigations.entry(url.to_owned()).or_default();
            *count += 1;
            *count
        };
        let page = self.shared.pages.lock().unwrap().get(url).cloned();
        let Some(page) = page else {
            return Err(SessionError::Navigation {
                url: url.to_owned(),
                reason: "net::ERR_NAME_NOT_RESOLVED".to_owned(),
            });
        };

        tokio::time::sleep(page.load_delay).await;
        if attempt <= page.failures {
            return Err(SessionError::Navigation {
                url: url.to_owned(),
                reason: "net::ERR_CONNECTION_RESET".to_owned(),
            });
        }
        self.current = Some(page);
        Ok(())
    }

    async fn query_texts(&mut self, locator: &Locator) -> Result<Vec<String>, SessionError> {
        let Some(page) = self.current.as_ref() else {
            return Ok(Vec::new());
        };
        let key = locator.value();
        if page.broken.as_deref() == Some(key) {
            return Err(SessionError::Protocol(format!("{locator}: target closed")));
        }

        let polls = self.polls.entry(key.to_owned()).or_default();
        *polls += 1;
        if *polls <= page.hidden_polls.get(key).copied().unwrap_or(0) {
            return Ok(Vec::new());
        }
        Ok(page.texts.get(key).cloned().unwrap_or_default())
    }

    async fn close(self: Box<Self>) -> Result<(), SessionError> {
        self.shared.closes.fetch_add(1, Ordering::SeqCst);
        self.shared.live.fetch_sub(1, Ordering::SeqCst);
        Ok(())
    }
}
