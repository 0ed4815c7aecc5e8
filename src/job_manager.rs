use chrono::{DateTime, Utc};
use log::{error, info, warn};
use serde::{de, Deserialize, Deserializer, Serialize};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::{Semaphore, TryAcquireError};
use uuid::Uuid;

use crate::error::AppError;
use crate::extractor::{filter_free_domains, EmailExtractor, FREE_EMAIL_DOMAINS};
use crate::report::{self, ReportFormat, Sheet};
use crate::search_engine::{PageProgress, SearchEngine};

pub const MAX_PAGES_LIMIT: u32 = 10;

const SEPARATOR: &str = "--------------------------------------------------";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Running,
    Done,
    Error,
}

impl JobStatus {
    pub fn is_terminal(self) -> bool {
        !matches!(self, JobStatus::Running)
    }
}

#[derive(Debug, Clone)]
pub struct JobSettings {
    pub default_pages: u32,
    pub default_headless: bool,
    pub max_concurrent_jobs: usize,
    /// Finished jobs kept before the oldest are evicted. Running jobs never are.
    pub max_retained_jobs: usize,
    /// Log lines kept per job.
    pub max_log_lines: usize,
    /// Most recent log lines returned by a status poll.
    pub status_log_tail: usize,
}

impl Default for JobSettings {
    fn default() -> Self {
        JobSettings {
            default_pages: 2,
            default_headless: true,
            max_concurrent_jobs: 1,
            max_retained_jobs: 100,
            max_log_lines: 200,
            status_log_tail: 20,
        }
    }
}

/// Body of `POST /api/start`. Missing fields fall back to [`JobSettings`].
#[derive(Debug, Clone, Default, Deserialize)]
pub struct StartRequest {
    #[serde(default)]
    pub keywords: String,
    #[serde(default, deserialize_with = "lenient_page_count")]
    pub max_pages: Option<i64>,
    pub headless_mode: Option<bool>,
    #[serde(default)]
    pub exclude_free_emails: bool,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum PageCount {
    Int(i64),
    Float(f64),
    Text(String),
}

/// Accepts `3`, `3.0` and `"3"`. Fractional numbers are truncated.
fn lenient_page_count<'de, D>(deserializer: D) -> Result<Option<i64>, D::Error>
where
    D: Deserializer<'de>,
{
    let invalid = |raw: &dyn std::fmt::Display| -> D::Error {
        <D::Error as de::Error>::custom(format!("max_pages must be an integer, got {}", raw))
    };
    match Option::<PageCount>::deserialize(deserializer)? {
        None => Ok(None),
        Some(PageCount::Int(n)) => Ok(Some(n)),
        Some(PageCount::Float(f)) if f.is_finite() => Ok(Some(f.trunc() as i64)),
        Some(PageCount::Float(f)) => Err(invalid(&f)),
        Some(PageCount::Text(text)) => text
            .trim()
            .parse::<i64>()
            .map(Some)
            .map_err(|_| invalid(&format!("'{}'", text))),
    }
}

#[derive(Debug)]
struct Job {
    status: JobStatus,
    progress: u8,
    logs: Vec<String>,
    keywords: String,
    max_pages: u32,
    headless_mode: bool,
    exclude_free_emails: bool,
    emails_found: Vec<String>,
    scraped_text_length: usize,
    error: Option<String>,
    created_at: DateTime<Utc>,
    reports: HashMap<ReportFormat, Vec<u8>>,
}

impl Job {
    fn push_log(&mut self, line: impl Into<String>, max_lines: usize) {
        self.logs.push(line.into());
        if self.logs.len() > max_lines {
            let excess = self.logs.len() - max_lines;
            self.logs.drain(..excess);
        }
    }
}

/// What a status poll sees.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct JobSnapshot {
    pub status: JobStatus,
    pub progress: u8,
    pub logs: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub emails_found: Option<Vec<String>>,
    pub scraped_text_length: usize,
    pub max_pages: u32,
    pub keywords: String,
    pub headless_mode: bool,
    pub exclude_free_emails: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

type JobTable = Arc<Mutex<HashMap<String, Job>>>;

fn lock(jobs: &JobTable) -> MutexGuard<'_, HashMap<String, Job>> {
    jobs.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Registry of scrape jobs. Each job is written by its own background task
/// and read by any number of status polls.
pub struct JobManager {
    jobs: JobTable,
    search: Arc<SearchEngine>,
    extractor: Arc<EmailExtractor>,
    slots: Arc<Semaphore>,
    settings: JobSettings,
}

impl JobManager {
    pub fn new(search: SearchEngine, settings: JobSettings) -> Self {
        JobManager {
            jobs: Arc::new(Mutex::new(HashMap::new())),
            search: Arc::new(search),
            extractor: Arc::new(EmailExtractor::new()),
            slots: Arc::new(Semaphore::new(settings.max_concurrent_jobs.max(1))),
            settings,
        }
    }

    pub fn settings(&self) -> &JobSettings {
        &self.settings
    }

    /// Validates the request, records a `running` job and spawns its pipeline.
    /// Must be called from within a tokio runtime.
    pub fn start(&self, request: StartRequest) -> Result<String, AppError> {
        let keywords = request.keywords.trim().to_string();
        if keywords.is_empty() {
            return Err(AppError::Validation("Please enter search keywords".to_string()));
        }

        let max_pages = request
            .max_pages
            .unwrap_or(i64::from(self.settings.default_pages));
        if !(1..=i64::from(MAX_PAGES_LIMIT)).contains(&max_pages) {
            return Err(AppError::Validation(format!(
                "Max pages must be between 1 and {}",
                MAX_PAGES_LIMIT
            )));
        }
        let max_pages = max_pages as u32;
        let headless_mode = request.headless_mode.unwrap_or(self.settings.default_headless);

        let job_id = Uuid::new_v4().simple().to_string();
        let job = Job {
            status: JobStatus::Running,
            progress: 0,
            logs: Vec::new(),
            keywords: keywords.clone(),
            max_pages,
            headless_mode,
            exclude_free_emails: request.exclude_free_emails,
            emails_found: Vec::new(),
            scraped_text_length: 0,
            error: None,
            created_at: Utc::now(),
            reports: HashMap::new(),
        };

        {
            let mut jobs = lock(&self.jobs);
            jobs.insert(job_id.clone(), job);
            evict_finished(&mut jobs, self.settings.max_retained_jobs);
        }
        info!("Job {} queued: '{}' ({} pages)", job_id, keywords, max_pages);

        let run = JobRun {
            job_id: job_id.clone(),
            jobs: self.jobs.clone(),
            search: self.search.clone(),
            extractor: self.extractor.clone(),
            slots: self.slots.clone(),
            max_log_lines: self.settings.max_log_lines,
        };
        tokio::spawn(run.execute());

        Ok(job_id)
    }

    pub fn status(&self, job_id: &str) -> Result<JobSnapshot, AppError> {
        let jobs = lock(&self.jobs);
        let job = jobs.get(job_id).ok_or_else(job_not_found)?;

        let tail_start = job.logs.len().saturating_sub(self.settings.status_log_tail);
        Ok(JobSnapshot {
            status: job.status,
            progress: job.progress,
            logs: job.logs[tail_start..].to_vec(),
            emails_found: (job.status == JobStatus::Done).then(|| job.emails_found.clone()),
            scraped_text_length: job.scraped_text_length,
            max_pages: job.max_pages,
            keywords: job.keywords.clone(),
            headless_mode: job.headless_mode,
            exclude_free_emails: job.exclude_free_emails,
            error: job.error.clone(),
        })
    }

    /// Returns the report bytes and the keywords used for the filename.
    /// Only `done` jobs have downloads; anything else is not found.
    pub fn download(&self, job_id: &str, format: ReportFormat) -> Result<(Vec<u8>, String), AppError> {
        let (emails, keywords) = {
            let jobs = lock(&self.jobs);
            let job = jobs.get(job_id).ok_or_else(job_not_found)?;
            if job.status != JobStatus::Done {
                return Err(AppError::NotFound("Results are not ready yet".to_string()));
            }
            if let Some(bytes) = job.reports.get(&format) {
                return Ok((bytes.clone(), job.keywords.clone()));
            }
            (job.emails_found.clone(), job.keywords.clone())
        };

        let bytes = report::render(format, &Sheet::from_emails(&emails))
            .map_err(|e| AppError::Internal(e.to_string()))?;

        if let Some(job) = lock(&self.jobs).get_mut(job_id) {
            job.reports.entry(format).or_insert_with(|| bytes.clone());
        }
        Ok((bytes, keywords))
    }

    pub fn job_count(&self) -> usize {
        lock(&self.jobs).len()
    }
}

fn job_not_found() -> AppError {
    AppError::NotFound("Job not found".to_string())
}

fn evict_finished(jobs: &mut HashMap<String, Job>, keep: usize) {
    let mut finished: Vec<(DateTime<Utc>, String)> = jobs
        .iter()
        .filter(|(_, job)| job.status.is_terminal())
        .map(|(id, job)| (job.created_at, id.clone()))
        .collect();
    if finished.len() <= keep {
        return;
    }
    finished.sort();
    let excess = finished.len() - keep;
    for (_, id) in finished.into_iter().take(excess) {
        info!("Evicting finished job {}", id);
        jobs.remove(&id);
    }
}

/// Everything the background pipeline of one job needs.
struct JobRun {
    job_id: String,
    jobs: JobTable,
    search: Arc<SearchEngine>,
    extractor: Arc<EmailExtractor>,
    slots: Arc<Semaphore>,
    max_log_lines: usize,
}

struct JobParams {
    keywords: String,
    max_pages: u32,
    headless: bool,
    exclude_free: bool,
}

impl JobRun {
    fn update(&self, apply: impl FnOnce(&mut Job, usize)) {
        if let Some(job) = lock(&self.jobs).get_mut(&self.job_id) {
            apply(job, self.max_log_lines);
        }
    }

    fn log(&self, line: impl Into<String>) {
        let line = line.into();
        self.update(|job, max| job.push_log(line, max));
    }

    fn params(&self) -> Option<JobParams> {
        lock(&self.jobs).get(&self.job_id).map(|job| JobParams {
            keywords: job.keywords.clone(),
            max_pages: job.max_pages,
            headless: job.headless_mode,
            exclude_free: job.exclude_free_emails,
        })
    }

    async fn execute(self) {
        let _permit = match self.slots.clone().try_acquire_owned() {
            Ok(permit) => permit,
            Err(TryAcquireError::NoPermits) => {
                self.log("Waiting for another job to finish...");
                match self.slots.clone().acquire_owned().await {
                    Ok(permit) => permit,
                    Err(e) => {
                        self.fail(format!("job scheduler unavailable: {}", e));
                        return;
                    }
                }
            }
            Err(TryAcquireError::Closed) => {
                self.fail("job scheduler unavailable: semaphore closed".to_string());
                return;
            }
        };

        let Some(params) = self.params() else {
            warn!("Job {} vanished before it started", self.job_id);
            return;
        };

        match self.pipeline(&params).await {
            Ok(count) => info!("Job {} done with {} emails", self.job_id, count),
            Err(message) => self.fail(message),
        }
    }

    async fn pipeline(&self, params: &JobParams) -> Result<usize, String> {
        self.log(format!("Starting search for: {}", params.keywords));
        self.log(format!("Max pages: {}", params.max_pages));
        self.log(format!("Headless mode: {}", params.headless));
        self.log(SEPARATOR);

        let mut on_progress = |p: PageProgress| {
            let progress = (p.page * 50 / p.total.max(1)) as u8;
            self.update(|job, max| {
                job.progress = progress;
                job.push_log(p.message, max);
            });
        };
        let scraped = self
            .search
            .search_and_extract(&params.keywords, params.max_pages, params.headless, &mut on_progress)
            .await
            .map_err(|e| e.to_string())?;

        let text_length = scraped.chars().count();
        self.update(|job, max| {
            job.scraped_text_length = text_length;
            job.progress = 50;
            job.push_log(SEPARATOR, max);
            job.push_log(format!("Scraping complete. Extracted {} characters", text_length), max);
            job.push_log("Starting email extraction...", max);
        });

        let mut emails = self.extractor.extract(&scraped);
        self.log(format!("Found {} unique emails", emails.len()));

        if params.exclude_free {
            let before = emails.len();
            emails = filter_free_domains(emails, true, FREE_EMAIL_DOMAINS);
            self.log(format!(
                "Filtered: {} -> {} (removed {} free domains)",
                before,
                emails.len(),
                before - emails.len()
            ));
        }
        emails.sort();

        let count = emails.len();
        self.update(|job, max| {
            job.emails_found = emails.clone();
            job.progress = 75;
            job.push_log(format!("Email extraction complete. Final count: {}", count), max);
            job.push_log("Generating Excel file...", max);
        });

        let xlsx = report::to_xlsx(&Sheet::from_emails(&emails)).map_err(|e| e.to_string())?;

        self.update(|job, max| {
            job.reports.insert(ReportFormat::Xlsx, xlsx);
            job.progress = 100;
            job.push_log("Excel file generated successfully", max);
            job.push_log(SEPARATOR, max);
            job.status = JobStatus::Done;
        });
        Ok(count)
    }

    fn fail(&self, message: String) {
        error!("Job {} failed: {}", self.job_id, message);
        self.update(|job, max| {
            job.push_log(format!("ERROR: {}", message), max);
            job.error = Some(message);
            job.status = JobStatus::Error;
        });
    }
}
