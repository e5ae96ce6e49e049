//! HTTP API for submitting text commands
//!
//! - `POST /api/process_voice` classifies and executes `{"command": "..."}`
//! - `GET /api/get_response` returns the last result
//! - `GET /api/status` reports liveness and queue depth

use std::sync::Arc;

use axum::{
    Json, Router,
    extract::State,
    http::StatusCode,
    routing::{get, post},
};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tokio::net::TcpListener;
use tokio::sync::RwLock;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::classifier::Classifier;
use crate::pipeline::{CommandQueue, Dispatcher};
use crate::{Error, Result};

const NO_RESULT_YET: &str = "No command has been processed yet.";
const PROCESS_FAILED: &str = "Failed to process command";

/// Shared state for API handlers
pub struct ApiState {
    classifier: Classifier,
    dispatcher: Dispatcher,
    queue: Arc<CommandQueue>,
    last_result: RwLock<Option<Value>>,
}

impl ApiState {
    pub fn new(classifier: Classifier, dispatcher: Dispatcher, queue: Arc<CommandQueue>) -> Self {
        Self {
            classifier,
            dispatcher,
            queue,
            last_result: RwLock::new(None),
        }
    }
}

/// Body of `POST /api/process_voice`
#[derive(Debug, Deserialize)]
pub struct ProcessRequest {
    pub command: Option<String>,
}

/// Body of `GET /api/status`
#[derive(Debug, Serialize)]
pub struct StatusResponse {
    pub status: &'static str,
    pub queue_len: usize,
}

async fn process_voice(
    State(state): State<Arc<ApiState>>,
    Json(request): Json<ProcessRequest>,
) -> (StatusCode, Json<Value>) {
    let Some(text) = request
        .command
        .map(|c| c.trim().to_string())
        .filter(|c| !c.is_empty())
    else {
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({ "error": "No command or audio file provided" })),
        );
    };

    tracing::info!(command = %text, "api command");
    let command = state.classifier.classify(&text).await;

    let (status, body) = match state.dispatcher.execute(&command).await {
        Some(result) => (StatusCode::OK, json!({ "result": result })),
        None => (
            StatusCode::INTERNAL_SERVER_ERROR,
            json!({ "error": PROCESS_FAILED }),
        ),
    };

    *state.last_result.write().await = Some(body.clone());
    (status, Json(body))
}

async fn get_response(State(state): State<Arc<ApiState>>) -> Json<Value> {
    let last = state.last_result.read().await.clone();
    Json(last.unwrap_or_else(|| json!({ "result": NO_RESULT_YET })))
}

async fn status(State(state): State<Arc<ApiState>>) -> Json<StatusResponse> {
    Json(StatusResponse {
        status: "running",
        queue_len: state.queue.len(),
    })
}

/// Build the API router
pub fn router(state: Arc<ApiState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/api/process_voice", post(process_voice))
        .route("/api/get_response", get(get_response))
        .route("/api/status", get(status).post(status))
        .with_state(state)
        .layer(cors)
        .layer(TraceLayer::new_for_http())
}

/// Serve the API on `0.0.0.0:<port>`
///
/// # Errors
///
/// Returns error if the server fails to bind or run
pub async fn serve(state: Arc<ApiState>, port: u16) -> Result<()> {
    let addr = format!("0.0.0.0:{port}");
    let listener = TcpListener::bind(&addr)
        .await
        .map_err(|e| Error::Config(format!("failed to bind API server: {e}")))?;

    tracing::info!(port, "API server listening");

    axum::serve(listener, router(state))
        .await
        .map_err(|e| Error::Config(format!("API server error: {e}")))?;

    Ok(())
}
