use log::{info, warn};
use std::sync::Arc;

use crate::delay_manager::{self, DelayRange};
use crate::error::ScrapeError;
use crate::scraper::{BrowserLauncher, BrowserSession};

pub const GOOGLE_SEARCH_URL: &str = "https://www.google.com/search";

/// Google shows ten organic results per page.
const RESULTS_PER_PAGE: u32 = 10;

/// Reported after every result page, whether it loaded or not.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageProgress {
    pub page: u32,
    pub total: u32,
    pub message: String,
}

pub struct SearchEngine {
    launcher: Arc<dyn BrowserLauncher>,
    delay: DelayRange,
    base_url: String,
}

impl SearchEngine {
    pub fn new(launcher: Arc<dyn BrowserLauncher>) -> Self {
        SearchEngine {
            launcher,
            delay: DelayRange::default(),
            base_url: GOOGLE_SEARCH_URL.to_string(),
        }
    }

    pub fn with_delay(mut self, delay: DelayRange) -> Self {
        self.delay = delay;
        self
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    pub fn page_url(&self, keywords: &str, page: u32) -> String {
        let start = page.saturating_sub(1) * RESULTS_PER_PAGE;
        format!(
            "{}?q={}&start={}",
            self.base_url,
            urlencoding::encode(keywords),
            start
        )
    }

    /// Walks result pages `1..=max_pages` and returns their concatenated text.
    ///
    /// Only a failure to establish the session is an error. A page that fails
    /// to load is reported through `on_progress` and skipped.
    pub async fn search_and_extract(
        &self,
        keywords: &str,
        max_pages: u32,
        headless: bool,
        on_progress: &mut (dyn FnMut(PageProgress) + Send),
    ) -> Result<String, ScrapeError> {
        info!("Searching for: '{}' ({} pages)", keywords, max_pages);
        let mut session = self.launcher.launch(headless).await?;

        let text = self
            .collect_pages(session.as_mut(), keywords, max_pages, on_progress)
            .await;

        session.close().await;
        info!("Scraping completed. Total text extracted: {} characters", text.chars().count());
        Ok(text)
    }

    async fn collect_pages(
        &self,
        session: &mut dyn BrowserSession,
        keywords: &str,
        max_pages: u32,
        on_progress: &mut (dyn FnMut(PageProgress) + Send),
    ) -> String {
        let mut all_text = String::new();

        for page in 1..=max_pages {
            delay_manager::random_page_delay(&self.delay).await;

            let url = self.page_url(keywords, page);
            info!("Loading page {}/{}: {}", page, max_pages, url);

            let message = match session.page_text(&url).await {
                Ok(text) => {
                    let chars = text.chars().count();
                    all_text.push_str(&text);
                    all_text.push('\n');
                    format!("Page {}/{} completed ({} characters)", page, max_pages, chars)
                }
                Err(e) => {
                    warn!("Page {}/{} failed: {}", page, max_pages, e);
                    format!("Page {}/{} failed: {}", page, max_pages, e)
                }
            };

            on_progress(PageProgress {
                page,
                total: max_pages,
                message,
            });
        }

        all_text
    }
}
