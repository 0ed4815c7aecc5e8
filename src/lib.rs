pub mod config;
pub mod delay_manager;
pub mod error;
pub mod extractor;
pub mod job_manager;
pub mod logger;
pub mod report;
pub mod scraper;
pub mod search_engine;
pub mod server;

// Exporting types for convenience
pub use crate::config::{Backend, Config};
pub use crate::error::{AppError, ScrapeError};
pub use crate::extractor::EmailExtractor;
pub use crate::job_manager::{JobManager, JobSettings, JobSnapshot, JobStatus, StartRequest};
pub use crate::report::{ReportFormat, Sheet};
pub use crate::scraper::{BrowserLauncher, BrowserSession, ChromeLauncher, HttpLauncher};
pub use crate::search_engine::{PageProgress, SearchEngine};
