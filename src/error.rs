use actix_web::http::StatusCode;
use actix_web::{HttpResponse, ResponseError};
use serde::Serialize;
use thiserror::Error;

/// Failures raised while driving the browser.
///
/// `Launch` is terminal for a job. Every other variant describes a single
/// result page and is logged by the search loop before it moves on.
#[derive(Debug, Error)]
pub enum ScrapeError {
    #[error("could not start browser session: {0}")]
    Launch(String),
    #[error("failed to load {url}: {message}")]
    Navigation { url: String, message: String },
    #[error("timed out loading {url}")]
    Timeout { url: String },
    #[error("blocked at {url} (HTTP {status})")]
    Blocked { url: String, status: u16 },
    #[error("http request failed: {0}")]
    Http(#[from] reqwest::Error),
}

/// Errors surfaced by the HTTP API as `{"detail": "..."}`.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("{0}")]
    Validation(String),
    #[error("{0}")]
    NotFound(String),
    #[error("{0}")]
    Internal(String),
}

#[derive(Serialize)]
struct ErrorBody<'a> {
    detail: &'a str,
}

impl ResponseError for AppError {
    fn status_code(&self) -> StatusCode {
        match self {
            AppError::Validation(_) => StatusCode::BAD_REQUEST,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        let detail = self.to_string();
        HttpResponse::build(self.status_code()).json(ErrorBody { detail: &detail })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use actix_web::body::to_bytes;

    #[actix_web::test]
    async fn validation_error_renders_detail_body() {
        let err = AppError::Validation("Please enter search keywords".to_string());
        let resp = err.error_response();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

        let body = to_bytes(resp.into_body()).await.unwrap();
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["detail"], "Please enter search keywords");
    }

    #[test]
    fn not_found_maps_to_404() {
        assert_eq!(
            AppError::NotFound("Job not found".into()).status_code(),
            StatusCode::NOT_FOUND
        );
    }
}
