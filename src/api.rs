use crate::case::api::create_tests;
use crate::case::service::{BatchOrchestrator, PipelineError};
use crate::config::Config;
use crate::http::{ApiClient, HttpError};
use crate::jira::client::JiraClient;
use crate::jira::service::TestIssueOperations;
use crate::zephyr::client::ZephyrClient;
use crate::zephyr::service::StepPublisher;
use axum::extract::DefaultBodyLimit;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Serialize;
use serde_json::{json, Value};
use std::sync::Arc;
use thiserror::Error;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::{DefaultMakeSpan, DefaultOnRequest, DefaultOnResponse, TraceLayer};
use tower_http::LatencyUnit;
use tracing::Level;

const BODY_LIMIT_BYTES: usize = 5 * 1024 * 1024;

#[derive(Clone)]
pub struct AppState {
    pub orchestrator: Arc<BatchOrchestrator>,
}

/// Wires the real Jira and Zephyr clients from `config`.
pub fn build_state(config: &Config) -> Result<AppState, HttpError> {
    let api_client = Arc::new(ApiClient::new()?);
    let tracker = Arc::new(JiraClient::new(api_client.clone(), &config.jira));
    let step_store = Arc::new(ZephyrClient::new(api_client, &config.zephyr));
    let orchestrator = BatchOrchestrator::new(
        TestIssueOperations::new(tracker, &config.jira),
        StepPublisher::new(step_store),
        config.failure_policy,
    );
    Ok(AppState {
        orchestrator: Arc::new(orchestrator),
    })
}

pub fn build_api(app_state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/create-tests", post(create_tests))
        .route("/health", get(health))
        .layer(cors)
        .layer(DefaultBodyLimit::max(BODY_LIMIT_BYTES))
        .layer(TraceLayer::new_for_http()
            .make_span_with(
                DefaultMakeSpan::new().level(Level::INFO))
            .on_request(
                DefaultOnRequest::new()
                    .level(Level::INFO))
            .on_response(
                DefaultOnResponse::new()
                    .level(Level::INFO)
                    .latency_unit(LatencyUnit::Micros)
            ))
        .with_state(app_state)
}

async fn health() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

pub struct ApiResponse<T>(pub T);

impl<T> ApiResponse<T> {
    pub fn from<E: Into<AppError>>(result: Result<T, E>) -> Result<ApiResponse<T>, AppError> {
        result.map(ApiResponse).map_err(Into::into)
    }
}

impl<T> IntoResponse for ApiResponse<T>
where
    T: Serialize,
{
    fn into_response(self) -> Response {
        (StatusCode::OK, Json(self.0)).into_response()
    }
}

#[derive(Debug, Error)]
pub enum AppError {
    #[error("{0}")]
    Validation(String),
    #[error("upstream failure: {0}")]
    Upstream(Value),
}

impl From<PipelineError> for AppError {
    fn from(error: PipelineError) -> Self {
        AppError::Upstream(error.payload())
    }
}

#[derive(Serialize, Clone)]
pub struct ErrorBody {
    pub error: Value,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        match self {
            AppError::Validation(message) => {
                (StatusCode::BAD_REQUEST, Json(ErrorBody { error: Value::String(message) })).into_response()
            }
            AppError::Upstream(payload) => {
                tracing::error!("batch failed: {}", payload);
                (StatusCode::INTERNAL_SERVER_ERROR, Json(ErrorBody { error: payload })).into_response()
            }
        }
    }
}
