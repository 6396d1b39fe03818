use std::net::SocketAddr;

use axum::{
    extract::{rejection::JsonRejection, Path, State},
    http::{StatusCode, Uri},
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tokio_util::sync::CancellationToken;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::{DefaultMakeSpan, DefaultOnResponse, TraceLayer};
use tracing::Level;
use uuid::Uuid;

use crate::error::JobhostError;
use crate::service::JobService;

#[derive(Deserialize)]
struct SubmitJobRequest {
    cmd_string: String,
}

#[derive(Serialize)]
struct ErrorResponse {
    message: String,
    error: String,
}

struct ApiError {
    status: StatusCode,
    message: String,
    error: String,
}

impl ApiError {
    fn new(message: impl Into<String>, err: JobhostError) -> Self {
        let status = match &err {
            JobhostError::JobNotFound(_) => StatusCode::NOT_FOUND,
            JobhostError::InvalidJob(_) => StatusCode::BAD_REQUEST,
            JobhostError::QueueFull => StatusCode::SERVICE_UNAVAILABLE,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        Self {
            status,
            message: message.into(),
            error: err.to_string(),
        }
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        // Keeps axum's status: 400 bad syntax, 415 wrong content type, 422 wrong shape
        Self {
            status: rejection.status(),
            message: "Invalid request body".to_string(),
            error: rejection.body_text(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        if self.status.is_server_error() {
            tracing::error!(message = %self.message, error = %self.error, "Request failed");
        }
        (
            self.status,
            Json(ErrorResponse {
                message: self.message,
                error: self.error,
            }),
        )
            .into_response()
    }
}

/// Build the HTTP router for job submission and lookup.
pub fn router(service: JobService) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health_check", get(health_check_handler))
        .route("/job", get(list_jobs_handler).post(submit_job_handler))
        .route("/job/:job_id", get(get_job_handler))
        .fallback(not_found_handler)
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
                .on_response(DefaultOnResponse::new().level(Level::INFO)),
        )
        .layer(cors)
        .with_state(service)
}

/// Serve the API until `shutdown` fires.
pub async fn run_api(
    addr: SocketAddr,
    service: JobService,
    shutdown: CancellationToken,
) -> std::io::Result<()> {
    let app = router(service);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!(addr = %listener.local_addr()?, "Starting HTTP API");

    axum::serve(listener, app)
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await
}

async fn health_check_handler() -> impl IntoResponse {
    (StatusCode::OK, Json(json!({ "ok": 1 })))
}

async fn not_found_handler(uri: Uri) -> impl IntoResponse {
    tracing::info!(uri = %uri, "Not found");
    (StatusCode::NOT_FOUND, format!("Not found: {}", uri))
}

async fn list_jobs_handler(State(service): State<JobService>) -> Result<Response, ApiError> {
    let jobs = service
        .list()
        .await
        .map_err(|e| ApiError::new("Error retrieving jobs", e))?;
    Ok(Json(jobs).into_response())
}

async fn get_job_handler(
    State(service): State<JobService>,
    Path(job_id): Path<String>,
) -> Result<Response, ApiError> {
    let id = Uuid::parse_str(&job_id).map_err(|e| {
        ApiError::new(
            format!("Invalid job id {}", job_id),
            JobhostError::InvalidJob(e.to_string()),
        )
    })?;

    let job = service
        .get(id)
        .await
        .map_err(|e| ApiError::new(format!("Error retrieving job with {}", job_id), e))?;
    Ok(Json(job).into_response())
}

async fn submit_job_handler(
    State(service): State<JobService>,
    payload: Result<Json<SubmitJobRequest>, JsonRejection>,
) -> Result<Response, ApiError> {
    let Json(payload) = payload?;
    let command = payload.cmd_string;
    let job = service
        .submit(command.clone())
        .await
        .map_err(|e| ApiError::new(format!("Error creating job {:?}", command), e))?;
    Ok(Json(job.id).into_response())
}
