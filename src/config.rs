use clap::{ArgAction, Parser, ValueEnum};
use log::LevelFilter;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use crate::delay_manager::DelayRange;
use crate::job_manager::{JobSettings, MAX_PAGES_LIMIT};
use crate::scraper::{BrowserLauncher, ChromeLauncher, HttpLauncher};
use crate::search_engine::{SearchEngine, GOOGLE_SEARCH_URL};

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Backend {
    /// Drive a local Chrome/Chromium over CDP.
    Chrome,
    /// Plain HTTP requests, no JavaScript.
    Http,
}

#[derive(Debug, Clone, Parser)]
#[command(author, version, about = "Extract email addresses from Google search results", long_about = None)]
pub struct Config {
    /// Address the web UI binds to
    #[arg(long, default_value = "127.0.0.1")]
    pub host: String,

    #[arg(long, default_value_t = 8000)]
    pub port: u16,

    /// Directory holding index.html and the poller script
    #[arg(long, default_value = "static")]
    pub static_dir: PathBuf,

    #[arg(long, value_enum, default_value_t = Backend::Chrome)]
    pub backend: Backend,

    /// Chrome/Chromium executable; auto-detected when omitted
    #[arg(long)]
    pub chrome_path: Option<PathBuf>,

    #[arg(long, default_value = GOOGLE_SEARCH_URL)]
    pub search_url: String,

    /// Pages scraped when a request does not say
    #[arg(long, default_value_t = 2)]
    pub default_pages: u32,

    /// Run the browser without a window unless a request says otherwise
    #[arg(long, default_value_t = true, action = ArgAction::Set)]
    pub headless: bool,

    #[arg(long, default_value_t = 2000)]
    pub min_delay_ms: u64,

    #[arg(long, default_value_t = 3000)]
    pub max_delay_ms: u64,

    #[arg(long, default_value_t = 60)]
    pub page_timeout_secs: u64,

    /// Jobs allowed to scrape at the same time; later ones wait their turn
    #[arg(long, default_value_t = 1)]
    pub max_concurrent_jobs: usize,

    /// Finished jobs kept in memory before the oldest are dropped
    #[arg(long, default_value_t = 100)]
    pub max_retained_jobs: usize,

    #[arg(long, default_value_t = LevelFilter::Info)]
    pub log_level: LevelFilter,
}

impl Config {
    pub fn validate(&self) -> Result<(), String> {
        if self.min_delay_ms > self.max_delay_ms {
            return Err(format!(
                "--min-delay-ms ({}) must not exceed --max-delay-ms ({})",
                self.min_delay_ms, self.max_delay_ms
            ));
        }
        if self.max_concurrent_jobs == 0 {
            return Err("--max-concurrent-jobs must be at least 1".to_string());
        }
        if !(1..=MAX_PAGES_LIMIT).contains(&self.default_pages) {
            return Err(format!("--default-pages must be between 1 and {}", MAX_PAGES_LIMIT));
        }
        Ok(())
    }

    pub fn bind_addr(&self) -> (String, u16) {
        (self.host.clone(), self.port)
    }

    pub fn job_settings(&self) -> JobSettings {
        JobSettings {
            default_pages: self.default_pages,
            default_headless: self.headless,
            max_concurrent_jobs: self.max_concurrent_jobs,
            max_retained_jobs: self.max_retained_jobs,
            ..JobSettings::default()
        }
    }

    pub fn launcher(&self) -> Arc<dyn BrowserLauncher> {
        let timeout = Duration::from_secs(self.page_timeout_secs);
        match self.backend {
            Backend::Chrome => Arc::new(ChromeLauncher::new(self.chrome_path.clone(), timeout)),
            Backend::Http => Arc::new(HttpLauncher::new(timeout)),
        }
    }

    pub fn search_engine(&self) -> SearchEngine {
        SearchEngine::new(self.launcher())
            .with_delay(DelayRange::from_millis(self.min_delay_ms, self.max_delay_ms))
            .with_base_url(self.search_url.clone())
    }
}
