#![allow(dead_code)]

use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::Notify;

use email_scraper_lib::delay_manager::DelayRange;
use email_scraper_lib::{
    BrowserLauncher, BrowserSession, JobManager, JobSettings, ScrapeError, SearchEngine,
};

/// Serves the same text for every result page, without a real browser.
#[derive(Default)]
pub struct FakeLauncher {
    pub text: String,
    pub fail_launch: bool,
    /// When set, each page waits for a `notify_one` before returning.
    pub gate: Option<Arc<Notify>>,
    pub launches: AtomicUsize,
}

impl FakeLauncher {
    pub fn serving(text: &str) -> Self {
        FakeLauncher {
            text: text.to_string(),
            ..Default::default()
        }
    }

    pub fn gated(text: &str, gate: Arc<Notify>) -> Self {
        FakeLauncher {
            text: text.to_string(),
            gate: Some(gate),
            ..Default::default()
        }
    }

    pub fn failing() -> Self {
        FakeLauncher {
            fail_launch: true,
            ..Default::default()
        }
    }

    pub fn launch_count(&self) -> usize {
        self.launches.load(Ordering::SeqCst)
    }
}

struct FakeSession {
    text: String,
    gate: Option<Arc<Notify>>,
}

#[async_trait]
impl BrowserLauncher for FakeLauncher {
    async fn launch(&self, _headless: bool) -> Result<Box<dyn BrowserSession>, ScrapeError> {
        self.launches.fetch_add(1, Ordering::SeqCst);
        if self.fail_launch {
            return Err(ScrapeError::Launch("browser executable not found".to_string()));
        }
        Ok(Box::new(FakeSession {
            text: self.text.clone(),
            gate: self.gate.clone(),
        }))
    }
}

#[async_trait]
impl BrowserSession for FakeSession {
    async fn page_text(&mut self, _url: &str) -> Result<String, ScrapeError> {
        if let Some(gate) = &self.gate {
            gate.notified().await;
        }
        Ok(self.text.clone())
    }

    async fn close(&mut self) {}
}

pub fn job_manager(launcher: Arc<FakeLauncher>) -> Arc<JobManager> {
    let search = SearchEngine::new(launcher).with_delay(DelayRange::none());
    Arc::new(JobManager::new(search, JobSettings::default()))
}
