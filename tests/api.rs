mod common;

use actix_web::http::{header, StatusCode};
use actix_web::{test, web, App};
use pretty_assertions::assert_eq;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;

use common::{job_manager, FakeLauncher};
use email_scraper_lib::server::{configure_api, AppState};
use email_scraper_lib::JobManager;

const PAGE_TEXT: &str = "Contact sales@acme.com, Support@Acme.com or jane.doe@gmail.com for details.";

macro_rules! app {
    ($manager:expr) => {
        test::init_service(
            App::new()
                .app_data(web::Data::new(AppState {
                    job_manager: $manager.clone(),
                }))
                .configure(configure_api),
        )
        .await
    };
}

async fn wait_until_finished(manager: &Arc<JobManager>, job_id: &str) {
    for _ in 0..200 {
        if manager.status(job_id).unwrap().status.is_terminal() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("job {} did not finish", job_id);
}

#[actix_web::test]
async fn health_reports_ok_and_time() {
    let manager = job_manager(Arc::new(FakeLauncher::serving("")));
    let app = app!(manager);

    let req = test::TestRequest::get().uri("/health").to_request();
    let body: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(body["ok"], json!(true));
    assert!(body["time"].as_i64().unwrap() > 0);
}

#[actix_web::test]
async fn start_validates_page_range() {
    let manager = job_manager(Arc::new(FakeLauncher::serving("")));
    let app = app!(manager);

    for pages in [0, 11] {
        let req = test::TestRequest::post()
            .uri("/api/start")
            .set_json(json!({"keywords": "dentists", "max_pages": pages}))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST, "max_pages={}", pages);
        let body: Value = test::read_body_json(resp).await;
        assert_eq!(body["detail"], "Max pages must be between 1 and 10");
    }

    for pages in [1, 10] {
        let req = test::TestRequest::post()
            .uri("/api/start")
            .set_json(json!({"keywords": "dentists", "max_pages": pages}))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::OK, "max_pages={}", pages);
    }
}

#[actix_web::test]
async fn start_rejects_blank_keywords_and_bad_json() {
    let manager = job_manager(Arc::new(FakeLauncher::serving("")));
    let app = app!(manager);

    let req = test::TestRequest::post()
        .uri("/api/start")
        .set_json(json!({"keywords": "  ", "max_pages": 2}))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["detail"], "Please enter search keywords");

    let req = test::TestRequest::post()
        .uri("/api/start")
        .insert_header((header::CONTENT_TYPE, "application/json"))
        .set_payload("{not json")
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    let body: Value = test::read_body_json(resp).await;
    assert!(body["detail"].as_str().unwrap().starts_with("Invalid request body"));
}

#[actix_web::test]
async fn new_job_is_running_and_not_downloadable() {
    let gate = Arc::new(Notify::new());
    let manager = job_manager(Arc::new(FakeLauncher::gated(PAGE_TEXT, gate)));
    let app = app!(manager);

    let req = test::TestRequest::post()
        .uri("/api/start")
        .set_json(json!({"keywords": "acme", "max_pages": 2, "headless_mode": true}))
        .to_request();
    let body: Value = test::call_and_read_body_json(&app, req).await;
    let job_id = body["job_id"].as_str().unwrap().to_string();

    let req = test::TestRequest::get()
        .uri(&format!("/api/status/{}", job_id))
        .to_request();
    let status: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(status["status"], "running");
    assert_eq!(status["progress"], 0);
    assert_eq!(status["keywords"], "acme");
    assert_eq!(status["max_pages"], 2);
    assert!(status.get("emails_found").is_none());

    let req = test::TestRequest::get()
        .uri(&format!("/download/{}/xlsx", job_id))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
}

#[actix_web::test]
async fn unknown_job_is_404() {
    let manager = job_manager(Arc::new(FakeLauncher::serving("")));
    let app = app!(manager);

    let req = test::TestRequest::get().uri("/api/status/nope").to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["detail"], "Job not found");

    let req = test::TestRequest::get().uri("/download/nope/csv").to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
}

#[actix_web::test]
async fn finished_job_serves_all_downloads() {
    let manager = job_manager(Arc::new(FakeLauncher::serving(PAGE_TEXT)));
    let app = app!(manager);

    let req = test::TestRequest::post()
        .uri("/api/start")
        .set_json(json!({
            "keywords": "acme support",
            "max_pages": 1,
            "exclude_free_emails": true
        }))
        .to_request();
    let body: Value = test::call_and_read_body_json(&app, req).await;
    let job_id = body["job_id"].as_str().unwrap().to_string();

    wait_until_finished(&manager, &job_id).await;

    let req = test::TestRequest::get()
        .uri(&format!("/api/status/{}", job_id))
        .to_request();
    let status: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(status["status"], "done");
    assert_eq!(status["progress"], 100);
    assert_eq!(status["emails_found"], json!(["sales@acme.com", "support@acme.com"]));
    assert!(status.get("error").is_none());

    let req = test::TestRequest::get()
        .uri(&format!("/download/{}/txt", job_id))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(resp.headers().get(header::CONTENT_TYPE).unwrap(), "text/plain");
    let disposition = resp
        .headers()
        .get(header::CONTENT_DISPOSITION)
        .unwrap()
        .to_str()
        .unwrap()
        .to_string();
    assert!(disposition.starts_with("attachment"));
    assert!(disposition.contains("emails_acme_support.txt"));
    let body = test::read_body(resp).await;
    assert_eq!(&body[..], b"sales@acme.com\nsupport@acme.com\n");

    let req = test::TestRequest::get()
        .uri(&format!("/download/{}/csv", job_id))
        .to_request();
    let body = test::call_and_read_body(&app, req).await;
    assert_eq!(&body[..], b"Email\nsales@acme.com\nsupport@acme.com\n");

    let req = test::TestRequest::get()
        .uri(&format!("/download/{}/xlsx", job_id))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::OK);
    let body = test::read_body(resp).await;
    assert_eq!(&body[..2], b"PK");

    let req = test::TestRequest::get()
        .uri(&format!("/download/{}/pdf", job_id))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
}

#[actix_web::test]
async fn launch_failure_is_reported_in_status() {
    let manager = job_manager(Arc::new(FakeLauncher::failing()));
    let app = app!(manager);

    let req = test::TestRequest::post()
        .uri("/api/start")
        .set_json(json!({"keywords": "acme", "max_pages": 3}))
        .to_request();
    let body: Value = test::call_and_read_body_json(&app, req).await;
    let job_id = body["job_id"].as_str().unwrap().to_string();

    wait_until_finished(&manager, &job_id).await;

    let req = test::TestRequest::get()
        .uri(&format!("/api/status/{}", job_id))
        .to_request();
    let status: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(status["status"], "error");
    assert!(status["error"]
        .as_str()
        .unwrap()
        .contains("browser executable not found"));
}
