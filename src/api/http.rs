//! HTTP API Server
//!
//! REST API for producing records to and consuming records from the log.

use std::future::Future;
use std::sync::Arc;

use axum::{
    extract::{Json, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Router,
};
use serde::{Deserialize, Serialize};
use tower_http::trace::TraceLayer;

use crate::config::ApiConfig;
use crate::error::{Error, Result};
use crate::log::{Log, Offset, Record};

/// Shared application state
pub struct AppState {
    /// The commit log served by this node
    pub log: Arc<Log>,
}

/// HTTP API server
pub struct HttpServer {
    config: ApiConfig,
    state: Arc<AppState>,
}

impl HttpServer {
    /// Create a new HTTP server
    pub fn new(config: ApiConfig, log: Arc<Log>) -> Self {
        Self {
            config,
            state: Arc::new(AppState { log }),
        }
    }

    /// Get the state for sharing with other components
    pub fn state(&self) -> Arc<AppState> {
        Arc::clone(&self.state)
    }

    /// Create the router
    fn create_router(state: Arc<AppState>) -> Router {
        Router::new()
            .route("/", get(handle_consume).post(handle_produce))
            .route("/offsets", get(handle_offsets))
            .route("/health", get(handle_health))
            .layer(TraceLayer::new_for_http())
            .with_state(state)
    }

    /// Start the HTTP server, returning once `shutdown` resolves
    pub async fn start<F>(&self, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        if !self.config.enabled {
            tracing::info!("HTTP API disabled");
            return Ok(());
        }

        let app = Self::create_router(Arc::clone(&self.state));

        let listener = tokio::net::TcpListener::bind(&self.config.bind_address).await?;
        tracing::info!("HTTP API listening on {}", self.config.bind_address);

        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown)
            .await
            .map_err(|e| Error::Network(format!("HTTP server error: {}", e)))?;

        Ok(())
    }
}

// ============ Request/Response Types ============

/// Produce request
#[derive(Debug, Deserialize, Serialize)]
pub struct ProduceRequest {
    pub record: Record,
}

/// Produce response
#[derive(Debug, Deserialize, Serialize)]
pub struct ProduceResponse {
    pub offset: Offset,
}

/// Consume request
#[derive(Debug, Deserialize, Serialize)]
pub struct ConsumeRequest {
    pub offset: Offset,
}

/// Consume response
#[derive(Debug, Deserialize, Serialize)]
pub struct ConsumeResponse {
    pub record: Record,
}

/// Offsets response
#[derive(Debug, Deserialize, Serialize)]
pub struct OffsetsResponse {
    pub lowest: Offset,
    pub highest: Offset,
}

/// Health response
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub healthy: bool,
}

/// Error response
#[derive(Debug, Deserialize, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: String,
}

/// Log error rendered as an HTTP response
#[derive(Debug)]
pub struct ApiError(Error);

impl From<Error> for ApiError {
    fn from(e: Error) -> Self {
        ApiError(e)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code) = if self.0.is_not_found() {
            (StatusCode::NOT_FOUND, "OUT_OF_RANGE")
        } else {
            tracing::error!("Request failed: {}", self.0);
            (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR")
        };

        (
            status,
            Json(ErrorResponse {
                error: self.0.to_string(),
                code: code.to_string(),
            }),
        )
            .into_response()
    }
}

/// Run a blocking log operation off the async runtime
async fn with_log<T, F>(state: &AppState, op: F) -> std::result::Result<T, ApiError>
where
    T: Send + 'static,
    F: FnOnce(&Log) -> Result<T> + Send + 'static,
{
    let log = Arc::clone(&state.log);
    tokio::task::spawn_blocking(move || op(&log))
        .await
        .map_err(|e| Error::Internal(format!("Log task failed: {}", e)))?
        .map_err(ApiError)
}

// ============ Handlers ============

async fn handle_produce(
    State(state): State<Arc<AppState>>,
    Json(req): Json<ProduceRequest>,
) -> std::result::Result<Json<ProduceResponse>, ApiError> {
    let offset = with_log(&state, move |log| log.append(req.record)).await?;
    Ok(Json(ProduceResponse { offset }))
}

async fn handle_consume(
    State(state): State<Arc<AppState>>,
    Json(req): Json<ConsumeRequest>,
) -> std::result::Result<Json<ConsumeResponse>, ApiError> {
    let record = with_log(&state, move |log| log.read(req.offset)).await?;
    Ok(Json(ConsumeResponse { record }))
}

async fn handle_offsets(
    State(state): State<Arc<AppState>>,
) -> std::result::Result<Json<OffsetsResponse>, ApiError> {
    let (lowest, highest) = with_log(&state, |log| {
        Ok((log.lowest_offset()?, log.highest_offset()?))
    })
    .await?;
    Ok(Json(OffsetsResponse { lowest, highest }))
}

async fn handle_health() -> impl IntoResponse {
    Json(HealthResponse { healthy: true })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::LogConfig;
    use tempfile::tempdir;

    fn test_state(dir: &std::path::Path) -> Arc<AppState> {
        let log = Log::new(dir, LogConfig::default()).unwrap();
        Arc::new(AppState { log: Arc::new(log) })
    }

    #[tokio::test]
    async fn test_produce_consume() {
        let dir = tempdir().unwrap();
        let state = test_state(dir.path());

        let Json(produced) = handle_produce(
            State(Arc::clone(&state)),
            Json(ProduceRequest {
                record: Record::new("hello world"),
            }),
        )
        .await
        .unwrap();
        assert_eq!(produced.offset, 0);

        let Json(consumed) = handle_consume(
            State(Arc::clone(&state)),
            Json(ConsumeRequest { offset: 0 }),
        )
        .await
        .unwrap();
        assert_eq!(consumed.record.value, b"hello world");
        assert_eq!(consumed.record.offset, 0);

        let Json(offsets) = handle_offsets(State(state))
            .await
            .unwrap();
        assert_eq!(offsets.lowest, 0);
        assert_eq!(offsets.highest, 0);
    }

    #[tokio::test]
    async fn test_consume_missing_offset_is_not_found() {
        let dir = tempdir().unwrap();
        let state = test_state(dir.path());

        let response = handle_consume(State(state), Json(ConsumeRequest { offset: 3 }))
            .await
            .into_response();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[test]
    fn test_error_status_mapping() {
        let response = ApiError(Error::OutOfRange(1)).into_response();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);

        let response = ApiError(Error::ClosedFile("0.store".into())).into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn test_produce_request_json() {
        let req: ProduceRequest =
            serde_json::from_str(r#"{"record": {"value": [104, 105]}}"#).unwrap();
        assert_eq!(req.record.value, b"hi");
        assert_eq!(req.record.offset, 0);
    }
}
