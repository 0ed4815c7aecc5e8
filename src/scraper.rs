use async_trait::async_trait;
use chromiumoxide::browser::{Browser, BrowserConfig};
use chromiumoxide::Page;
use futures::StreamExt;
use log::{debug, error, info, warn};
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, ACCEPT_LANGUAGE, USER_AGENT};
use reqwest::StatusCode;
use scraper::node::Node;
use scraper::Html;
use std::path::PathBuf;
use std::time::Duration;
use tokio::task::JoinHandle;
use uuid::Uuid;

use crate::error::ScrapeError;

pub const DESKTOP_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";

/// Below this many characters of `innerText` the page HTML is reduced to text instead.
const MIN_VISIBLE_CHARS: usize = 100;

const SKIPPED_TAGS: &[&str] = &["script", "style", "noscript", "template"];

/// Elements whose edges separate words in rendered text.
const BLOCK_TAGS: &[&str] = &[
    "address", "article", "aside", "blockquote", "br", "dd", "div", "dl", "dt", "footer",
    "form", "h1", "h2", "h3", "h4", "h5", "h6", "header", "hr", "li", "main", "nav", "ol",
    "p", "pre", "section", "table", "td", "th", "tr", "ul",
];

const CHROME_ARGS: &[&str] = &[
    "--disable-blink-features=AutomationControlled",
    "--no-sandbox",
    "--disable-dev-shm-usage",
    "--disable-gpu",
    "--disable-extensions",
    "--disable-notifications",
    "--disable-popup-blocking",
    "--disable-infobars",
    "--no-first-run",
    "--no-default-browser-check",
    "--mute-audio",
];

const INNER_TEXT_JS: &str = "document.body ? document.body.innerText : ''";

/// Starts a browsing session for one job.
#[async_trait]
pub trait BrowserLauncher: Send + Sync {
    async fn launch(&self, headless: bool) -> Result<Box<dyn BrowserSession>, ScrapeError>;
}

/// A live session owned by exactly one running job.
#[async_trait]
pub trait BrowserSession: Send {
    /// Loads `url` and returns its visible text.
    async fn page_text(&mut self, url: &str) -> Result<String, ScrapeError>;

    /// Releases the underlying browser. Must be safe to call more than once.
    async fn close(&mut self);
}

/// Reduces an HTML document to its readable text: script/style content is
/// dropped, entities are decoded and whitespace runs become single spaces.
///
/// Adjacent text nodes are joined as-is so inline markup such as
/// `info@<em>acme</em>.com` stays intact. Only block boundaries add a break.
pub fn html_to_text(html: &str) -> String {
    let document = Html::parse_document(html);
    let mut out = String::new();
    let mut current_block = None;

    for node in document.tree.root().descendants() {
        match node.value() {
            Node::Element(el) if BLOCK_TAGS.contains(&el.name()) => out.push(' '),
            Node::Text(text) => {
                let hidden = node
                    .ancestors()
                    .any(|ancestor| has_tag(ancestor.value(), SKIPPED_TAGS));
                if hidden {
                    continue;
                }
                let block = node
                    .ancestors()
                    .find(|ancestor| has_tag(ancestor.value(), BLOCK_TAGS))
                    .map(|ancestor| ancestor.id());
                if block != current_block {
                    out.push(' ');
                    current_block = block;
                }
                out.push_str(text);
            }
            _ => {}
        }
    }

    out.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn has_tag(node: &Node, tags: &[&str]) -> bool {
    node.as_element().is_some_and(|el| tags.contains(&el.name()))
}

// ---------------------------------------------------------------------------
// Chrome / Chromium over CDP
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct ChromeLauncher {
    chrome_path: Option<PathBuf>,
    page_timeout: Duration,
    render_wait: Duration,
}

impl ChromeLauncher {
    pub fn new(chrome_path: Option<PathBuf>, page_timeout: Duration) -> Self {
        ChromeLauncher {
            chrome_path,
            page_timeout,
            render_wait: Duration::from_secs(4),
        }
    }

    /// Pause after navigation so script-rendered results are in the DOM.
    pub fn with_render_wait(mut self, render_wait: Duration) -> Self {
        self.render_wait = render_wait;
        self
    }
}

#[async_trait]
impl BrowserLauncher for ChromeLauncher {
    async fn launch(&self, headless: bool) -> Result<Box<dyn BrowserSession>, ScrapeError> {
        let user_data_dir =
            std::env::temp_dir().join(format!("email_scraper_chrome_{}", Uuid::new_v4().simple()));
        std::fs::create_dir_all(&user_data_dir).map_err(|e| {
            ScrapeError::Launch(format!("cannot create profile directory {}: {}", user_data_dir.display(), e))
        })?;

        let mut builder = BrowserConfig::builder()
            .request_timeout(self.page_timeout)
            .window_size(1400, 900)
            .user_data_dir(user_data_dir.clone())
            .arg(format!("--user-agent={}", DESKTOP_USER_AGENT));
        if let Some(path) = &self.chrome_path {
            builder = builder.chrome_executable(path);
        }
        if !headless {
            builder = builder.with_head();
        }
        for arg in CHROME_ARGS {
            builder = builder.arg(*arg);
        }

        let config = match builder.build() {
            Ok(config) => config,
            Err(e) => {
                let _ = std::fs::remove_dir_all(&user_data_dir);
                return Err(ScrapeError::Launch(e));
            }
        };

        info!("Launching Chrome (headless: {})", headless);
        let (browser, mut handler) = match Browser::launch(config).await {
            Ok(pair) => pair,
            Err(e) => {
                let _ = std::fs::remove_dir_all(&user_data_dir);
                return Err(ScrapeError::Launch(e.to_string()));
            }
        };

        let handler_task = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if let Err(e) = event {
                    debug!("CDP handler error: {}", e);
                }
            }
            debug!("CDP handler finished");
        });

        let mut session = ChromeSession {
            browser: Some(browser),
            page: None,
            handler_task,
            user_data_dir,
            page_timeout: self.page_timeout,
            render_wait: self.render_wait,
        };

        if let Err(e) = session.open_tab().await {
            session.close().await;
            return Err(e);
        }

        Ok(Box::new(session))
    }
}

pub struct ChromeSession {
    browser: Option<Browser>,
    page: Option<Page>,
    handler_task: JoinHandle<()>,
    user_data_dir: PathBuf,
    page_timeout: Duration,
    render_wait: Duration,
}

impl ChromeSession {
    async fn open_tab(&mut self) -> Result<(), ScrapeError> {
        let browser = self
            .browser
            .as_ref()
            .ok_or_else(|| ScrapeError::Launch("browser session is closed".to_string()))?;
        let page = browser
            .new_page("about:blank")
            .await
            .map_err(|e| ScrapeError::Launch(format!("cannot open tab: {}", e)))?;
        self.page = Some(page);
        Ok(())
    }
}

#[async_trait]
impl BrowserSession for ChromeSession {
    async fn page_text(&mut self, url: &str) -> Result<String, ScrapeError> {
        let page = self
            .page
            .as_ref()
            .ok_or_else(|| ScrapeError::Launch("browser session is closed".to_string()))?;

        let navigation = tokio::time::timeout(self.page_timeout, async {
            page.goto(url).await?;
            page.wait_for_navigation().await?;
            Ok::<_, chromiumoxide::error::CdpError>(())
        })
        .await;
        match navigation {
            Err(_) => return Err(ScrapeError::Timeout { url: url.to_string() }),
            Ok(Err(e)) => {
                return Err(ScrapeError::Navigation {
                    url: url.to_string(),
                    message: e.to_string(),
                })
            }
            Ok(Ok(())) => {}
        }

        if !self.render_wait.is_zero() {
            tokio::time::sleep(self.render_wait).await;
        }

        let visible = match page.evaluate(INNER_TEXT_JS).await {
            Ok(result) => result.into_value::<String>().unwrap_or_default(),
            Err(e) => {
                debug!("innerText evaluation failed on {}: {}", url, e);
                String::new()
            }
        };
        let visible = visible.trim();
        if visible.chars().count() > MIN_VISIBLE_CHARS {
            debug!("Extracted {} characters of visible text", visible.len());
            return Ok(visible.to_string());
        }

        info!("Low content ({} chars) on {}, falling back to HTML", visible.len(), url);
        let html = page.content().await.map_err(|e| ScrapeError::Navigation {
            url: url.to_string(),
            message: e.to_string(),
        })?;
        Ok(html_to_text(&html))
    }

    async fn close(&mut self) {
        if let Some(page) = self.page.take() {
            if let Err(e) = page.close().await {
                debug!("Failed to close tab: {}", e);
            }
        }
        if let Some(mut browser) = self.browser.take() {
            if let Err(e) = browser.close().await {
                warn!("Failed to close browser cleanly: {}", e);
            }
            if let Err(e) = browser.wait().await {
                warn!("Failed to wait for browser exit: {}", e);
            }
            info!("Browser closed");
        }
        self.handler_task.abort();
        if self.user_data_dir.exists() {
            if let Err(e) = std::fs::remove_dir_all(&self.user_data_dir) {
                warn!("Failed to remove Chrome profile {}: {}", self.user_data_dir.display(), e);
            }
        }
    }
}

impl Drop for ChromeSession {
    fn drop(&mut self) {
        self.handler_task.abort();
        if let Some(browser) = self.browser.take() {
            // Dropping a running Browser kills its child process.
            error!("Browser session dropped without close, killing browser process");
            drop(browser);
        }
        if self.user_data_dir.exists() {
            let _ = std::fs::remove_dir_all(&self.user_data_dir);
        }
    }
}

// ---------------------------------------------------------------------------
// Plain HTTP, for hosts without Chrome
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct HttpLauncher {
    timeout: Duration,
}

impl HttpLauncher {
    pub fn new(timeout: Duration) -> Self {
        HttpLauncher { timeout }
    }
}

#[async_trait]
impl BrowserLauncher for HttpLauncher {
    async fn launch(&self, headless: bool) -> Result<Box<dyn BrowserSession>, ScrapeError> {
        if !headless {
            debug!("HTTP backend has no window; ignoring headless=false");
        }

        let mut headers = HeaderMap::new();
        headers.insert(USER_AGENT, HeaderValue::from_static(DESKTOP_USER_AGENT));
        headers.insert(ACCEPT_LANGUAGE, HeaderValue::from_static("en-US,en;q=0.9"));
        headers.insert(
            ACCEPT,
            HeaderValue::from_static("text/html,application/xhtml+xml;q=0.9,*/*;q=0.8"),
        );

        let client = reqwest::Client::builder()
            .timeout(self.timeout)
            .default_headers(headers)
            .cookie_store(true)
            .build()
            .map_err(|e| ScrapeError::Launch(format!("cannot build HTTP client: {}", e)))?;

        Ok(Box::new(HttpSession { client }))
    }
}

pub struct HttpSession {
    client: reqwest::Client,
}

#[async_trait]
impl BrowserSession for HttpSession {
    async fn page_text(&mut self, url: &str) -> Result<String, ScrapeError> {
        let resp = self.client.get(url).send().await.map_err(|e| {
            if e.is_timeout() {
                ScrapeError::Timeout { url: url.to_string() }
            } else {
                ScrapeError::Http(e)
            }
        })?;

        let status = resp.status();
        if status == StatusCode::FORBIDDEN || status == StatusCode::TOO_MANY_REQUESTS {
            warn!("Blocked at {}: {}", url, status);
            return Err(ScrapeError::Blocked {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }
        if !status.is_success() {
            return Err(ScrapeError::Navigation {
                url: url.to_string(),
                message: format!("HTTP {}", status),
            });
        }

        let html = resp.text().await?;
        Ok(html_to_text(&html))
    }

    async fn close(&mut self) {}
}
