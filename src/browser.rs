use std::path::PathBuf;
use std::time::Duration;

use async_trait::async_trait;
use chromiumoxide::browser::{Browser, BrowserConfig};
use chromiumoxide::cdp::browser_protocol::page::AddScriptToEvaluateOnNewDocumentParams;
use chromiumoxide::error::CdpError;
use chromiumoxide::{Element, Page};
use futures::StreamExt as _;
use tokio::task::JoinHandle;

use crate::selectors::Locator;

const HIDE_WEBDRIVER_SCRIPT: &str =
    "Object.defineProperty(navigator, 'webdriver', {get: () => undefined})";

#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("launch browser: {0}")]
    Launch(String),
    #[error("navigate to {url}: {reason}")]
    Navigation { url: String, reason: String },
    #[error("navigate to {url}: page did not load within {timeout:?}")]
    NavigationTimeout { url: String, timeout: Duration },
    #[error("browser protocol: {0}")]
    Protocol(String),
}

/// One browser process bound to a single page.
#[async_trait]
pub trait PageSession: Send {
    async fn navigate(&mut self, url: &str, timeout: Duration) -> Result<(), SessionError>;

    /// Text of every element currently matching `locator`, in document
    /// order. An empty result is not an error.
    async fn query_texts(&mut self, locator: &Locator) -> Result<Vec<String>, SessionError>;

    /// Terminates the browser process.
    async fn close(self: Box<Self>) -> Result<(), SessionError>;
}

#[async_trait]
pub trait SessionLauncher: Send + Sync {
    async fn launch(&self) -> Result<Box<dyn PageSession>, SessionError>;
}

#[derive(Debug, Clone)]
pub struct BrowserOptions {
    pub headless: bool,
    pub executable: Option<PathBuf>,
    pub request_timeout: Duration,
}

impl Default for BrowserOptions {
    fn default() -> Self {
        Self {
            headless: true,
            executable: None,
            request_timeout: Duration::from_secs(30),
        }
    }
}

/// Launches a fresh Chromium per session with automation fingerprints masked.
#[derive(Debug, Clone, Default)]
pub struct ChromeLauncher {
    options: BrowserOptions,
}

impl ChromeLauncher {
    pub fn new(options: BrowserOptions) -> Self {
        Self { options }
    }

    fn config(&self) -> Result<BrowserConfig, SessionError> {
        // Chromium's default switch set includes `--enable-automation`, so
        // it is replaced wholesale.
        let mut builder = BrowserConfig::builder()
            .disable_default_args()
            .no_sandbox()
            .request_timeout(self.options.request_timeout)
            .args([
                "--disable-dev-shm-usage",
                "--disable-blink-features=AutomationControlled",
                "--disable-background-networking",
                "--disable-background-timer-throttling",
                "--disable-backgrounding-occluded-windows",
                "--disable-breakpad",
                "--disable-hang-monitor",
                "--disable-popup-blocking",
                "--disable-prompt-on-repost",
                "--disable-sync",
                "--metrics-recording-only",
                "--no-first-run",
                "--password-store=basic",
                "--use-mock-keychain",
            ]);
        if !self.options.headless {
            builder = builder.with_head();
        }
        if let Some(executable) = &self.options.executable {
            builder = builder.chrome_executable(executable);
        }
        builder.build().map_err(SessionError::Launch)
    }
}

#[async_trait]
impl SessionLauncher for ChromeLauncher {
    async fn launch(&self) -> Result<Box<dyn PageSession>, SessionError> {
        let config = self.config()?;
        let (browser, mut handler) = Browser::launch(config)
            .await
            .map_err(|err| SessionError::Launch(err.to_string()))?;
        let handler_task = tokio::spawn(async move { while handler.next().await.is_some() {} });

        let mut session = ChromeSession {
            browser,
            page: None,
            handler_task,
        };
        match session.open_page().await {
            Ok(()) => {
                tracing::debug!(headless = self.options.headless, "browser session started");
                Ok(Box::new(session))
            }
            Err(err) => {
                if let Err(close_err) = Box::new(session).close().await {
                    tracing::warn!(%close_err, "tear down half-started browser");
                }
                Err(err)
            }
        }
    }
}

struct ChromeSession {
    browser: Browser,
    page: Option<Page>,
    handler_task: JoinHandle<()>,
}

impl ChromeSession {
    async fn open_page(&mut self) -> Result<(), SessionError> {
        let page = self
            .browser
            .new_page("about:blank")
            .await
            .map_err(|err| SessionError::Launch(format!("open page: {err}")))?;
        page.execute(AddScriptToEvaluateOnNewDocumentParams::new(
            HIDE_WEBDRIVER_SCRIPT,
        ))
        .await
        .map_err(|err| SessionError::Launch(format!("install startup script: {err}")))?;
        self.page = Some(page);
        Ok(())
    }

    fn page(&self) -> Result<&Page, SessionError> {
        self.page
            .as_ref()
            .ok_or_else(|| SessionError::Protocol("session has no open page".to_owned()))
    }
}

#[async_trait]
impl PageSession for ChromeSession {
    async fn navigate(&mut self, url: &str, timeout: Duration) -> Result<(), SessionError> {
        let page = self.page()?;
        match tokio::time::timeout(timeout, page.goto(url)).await {
            Ok(Ok(_)) => Ok(()),
            Ok(Err(err)) => Err(SessionError::Navigation {
                url: url.to_owned(),
                reason: err.to_string(),
            }),
            Err(_) => Err(SessionError::NavigationTimeout {
                url: url.to_owned(),
                timeout,
            }),
        }
    }

    async fn query_texts(&mut self, locator: &Locator) -> Result<Vec<String>, SessionError> {
        let page = self.page()?;
        let found = match locator.to_css() {
            Some(css) => page.find_elements(css).await,
            None => page.find_xpaths(locator.value()).await,
        };
        let elements = match found {
            Ok(elements) => elements,
            Err(CdpError::NotFound) => return Ok(Vec::new()),
            Err(err) => return Err(SessionError::Protocol(format!("{locator}: {err}"))),
        };

        let mut texts = Vec::with_capacity(elements.len());
        for element in &elements {
            texts.push(element_text(element).await?);
        }
        Ok(texts)
    }

    async fn close(mut self: Box<Self>) -> Result<(), SessionError> {
        let closed = self.browser.close().await;
        let waited = self.browser.wait().await;
        self.handler_task.abort();
        closed.map_err(|err| SessionError::Protocol(format!("close browser: {err}")))?;
        waited.map_err(|err| SessionError::Protocol(format!("wait for browser exit: {err}")))?;
        tracing::debug!("browser session closed");
        Ok(())
    }
}

impl Drop for ChromeSession {
    // `Browser` kills its child process on drop; the handler task would
    // otherwise outlive it.
    fn drop(&mut self) {
        self.handler_task.abort();
    }
}

async fn element_text(element: &Element) -> Result<String, SessionError> {
    element
        .inner_text()
        .await
        .map(Option::unwrap_or_default)
        .map_err(|err| SessionError::Protocol(format!("read element text: {err}")))
}
