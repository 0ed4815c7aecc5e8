use actix_cors::Cors;
use actix_web::http::header::{ContentDisposition, DispositionParam, DispositionType};
use actix_web::{error, get, post, web, App, HttpRequest, HttpResponse, HttpServer, Responder};
use log::info;
use serde_json::json;
use std::sync::Arc;

use crate::config::Config;
use crate::error::AppError;
use crate::job_manager::{JobManager, StartRequest};
use crate::report::{self, ReportFormat};

pub struct AppState {
    pub job_manager: Arc<JobManager>,
}

#[get("/health")]
async fn health_check() -> impl Responder {
    HttpResponse::Ok().json(json!({
        "ok": true,
        "time": chrono::Utc::now().timestamp(),
    }))
}

#[post("/api/start")]
async fn start_job(
    body: web::Json<StartRequest>,
    data: web::Data<AppState>,
) -> Result<HttpResponse, AppError> {
    let job_id = data.job_manager.start(body.into_inner())?;
    Ok(HttpResponse::Ok().json(json!({ "job_id": job_id })))
}

#[get("/api/status/{job_id}")]
async fn get_status(
    path: web::Path<String>,
    data: web::Data<AppState>,
) -> Result<HttpResponse, AppError> {
    let snapshot = data.job_manager.status(&path.into_inner())?;
    Ok(HttpResponse::Ok().json(snapshot))
}

#[get("/download/{job_id}/{format}")]
async fn download_result(
    path: web::Path<(String, String)>,
    data: web::Data<AppState>,
) -> Result<HttpResponse, AppError> {
    let (job_id, format) = path.into_inner();
    let format: ReportFormat = format.parse().map_err(AppError::NotFound)?;

    let (bytes, keywords) = data.job_manager.download(&job_id, format)?;
    let disposition = ContentDisposition {
        disposition: DispositionType::Attachment,
        parameters: vec![DispositionParam::Filename(report::download_filename(
            &keywords, format,
        ))],
    };

    Ok(HttpResponse::Ok()
        .content_type(format.content_type())
        .insert_header(disposition)
        .body(bytes))
}

/// Malformed or mistyped JSON bodies come back as `400 {"detail": ...}`.
fn json_error_handler(err: error::JsonPayloadError, _req: &HttpRequest) -> error::Error {
    AppError::Validation(format!("Invalid request body: {}", err)).into()
}

/// Registers the API routes. Callers supply `web::Data<AppState>`.
pub fn configure_api(cfg: &mut web::ServiceConfig) {
    cfg.app_data(web::JsonConfig::default().error_handler(json_error_handler))
        .service(health_check)
        .service(start_job)
        .service(get_status)
        .service(download_result);
}

pub async fn run(config: Config) -> std::io::Result<()> {
    let job_manager = Arc::new(JobManager::new(config.search_engine(), config.job_settings()));
    let state = web::Data::new(AppState { job_manager });
    let static_dir = config.static_dir.clone();
    let (host, port) = config.bind_addr();

    info!("Starting Web Server at http://{}:{}", host, port);
    info!("Serving UI from {}", static_dir.display());

    HttpServer::new(move || {
        let cors = Cors::default()
            .allow_any_origin()
            .allow_any_method()
            .allow_any_header();

        App::new()
            .wrap(cors)
            .app_data(state.clone())
            .configure(configure_api)
            .service(actix_files::Files::new("/", static_dir.clone()).index_file("index.html"))
    })
    .bind((host, port))?
    .run()
    .await
}
