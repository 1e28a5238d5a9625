//! # Gatekeep API - HTTP Surface
//!
//! JSON over HTTP/1.1 endpoints for the four public operations (Check,
//! Write, Read, BatchCheck) plus liveness. Handlers validate inputs, fan
//! out to the checker, and attach zookies; all shared handles travel in an
//! injected [`AppState`] rather than ambient globals.

use std::sync::Arc;
use std::time::Duration;

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::Serialize;
use thiserror::Error;
use tower_http::{compression::CompressionLayer, cors::CorsLayer};
use tracing::info;

use gatekeep_cache::DecisionCache;
use gatekeep_config::Config;
use gatekeep_core::Checker;
use gatekeep_store::TupleStore;
use gatekeep_types::{CacheError, EngineError, StoreError};
use gatekeep_zookie::ZookieMint;

pub mod handlers;
pub mod health;
pub mod paging;

/// API-level error, mapped onto HTTP at the boundary.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{0}")]
    InvalidRequest(String),

    #[error("precondition not met: {0}")]
    PreconditionFailed(String),

    #[error("request deadline exceeded")]
    Timeout,

    #[error("storage error: {0}")]
    Storage(String),

    #[error("storage unavailable: {0}")]
    Unavailable(String),

    #[error("cache error: {0}")]
    Cache(String),
}

impl From<EngineError> for ApiError {
    fn from(err: EngineError) -> Self {
        match err {
            EngineError::Validation(message) => ApiError::InvalidRequest(message),
            EngineError::Storage(e) => e.into(),
            EngineError::Cache(e) => e.into(),
            EngineError::Timeout => ApiError::Timeout,
        }
    }
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Unavailable(message) => ApiError::Unavailable(message),
            other => ApiError::Storage(other.to_string()),
        }
    }
}

impl From<CacheError> for ApiError {
    fn from(err: CacheError) -> Self {
        ApiError::Cache(err.to_string())
    }
}

impl ApiError {
    fn status(&self) -> StatusCode {
        match self {
            ApiError::InvalidRequest(_) | ApiError::PreconditionFailed(_) => {
                StatusCode::BAD_REQUEST
            },
            ApiError::Timeout => StatusCode::REQUEST_TIMEOUT,
            ApiError::Storage(_) | ApiError::Cache(_) => StatusCode::INTERNAL_SERVER_ERROR,
            ApiError::Unavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
        }
    }

    fn category(&self) -> &'static str {
        match self {
            ApiError::InvalidRequest(_) => "validation error",
            ApiError::PreconditionFailed(_) => "precondition failed",
            ApiError::Timeout => "timeout",
            ApiError::Storage(_) => "storage error",
            ApiError::Unavailable(_) => "storage unavailable",
            ApiError::Cache(_) => "cache error",
        }
    }
}

#[derive(Serialize)]
struct ErrorBody {
    error: &'static str,
    message: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = ErrorBody { error: self.category(), message: self.to_string() };
        (self.status(), Json(body)).into_response()
    }
}

pub type Result<T> = std::result::Result<T, ApiError>;

/// Shared handles for request handlers.
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn TupleStore>,
    pub cache: Option<Arc<dyn DecisionCache>>,
    pub checker: Arc<Checker>,
    pub zookies: Arc<ZookieMint>,
    pub config: Arc<Config>,
}

impl AppState {
    pub fn new(
        store: Arc<dyn TupleStore>,
        cache: Option<Arc<dyn DecisionCache>>,
        checker: Arc<Checker>,
        config: Arc<Config>,
    ) -> Self {
        Self { store, cache, checker, zookies: Arc::new(ZookieMint::new()), config }
    }

    /// The per-request deadline.
    pub fn deadline(&self) -> Duration {
        Duration::from_millis(self.config.server.request_timeout_ms)
    }
}

/// Run a handler body under the request deadline. Expiry maps to a
/// retriable 408, never to a deny; dropping the inner future cancels any
/// in-flight store and cache calls.
pub(crate) async fn with_deadline<T>(
    deadline: Duration,
    work: impl std::future::Future<Output = Result<T>>,
) -> Result<T> {
    tokio::time::timeout(deadline, work).await.map_err(|_| ApiError::Timeout)?
}

/// Create the API router.
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health::health_handler))
        .route("/api/v1/check", post(handlers::check::check_handler))
        .route("/api/v1/write", post(handlers::write::write_handler))
        .route("/api/v1/read", post(handlers::read::read_handler))
        .route("/api/v1/batch_check", post(handlers::batch::batch_check_handler))
        .route(
            "/api/v1/subjects/{user_type}/{user_id}/tuples",
            get(handlers::debug::subject_tuples_handler),
        )
        .route(
            "/api/v1/objects/{namespace}/{object_id}/tuples",
            get(handlers::debug::object_tuples_handler),
        )
        .with_state(state)
        .layer(
            CorsLayer::new()
                .allow_origin(tower_http::cors::Any)
                .allow_methods(tower_http::cors::Any)
                .allow_headers(tower_http::cors::Any),
        )
        .layer(CompressionLayer::new())
}

/// Waits for SIGTERM or SIGINT and initiates graceful shutdown.
async fn shutdown_signal() {
    use tokio::signal;

    let ctrl_c = async {
        signal::ctrl_c().await.expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("received SIGINT, initiating graceful shutdown");
        }
        _ = terminate => {
            info!("received SIGTERM, initiating graceful shutdown");
        }
    }
}

/// Start the API server and serve until shutdown.
pub async fn serve(state: AppState) -> anyhow::Result<()> {
    let addr = format!("{}:{}", state.config.server.host, state.config.server.port);
    let app = create_router(state);

    info!(%addr, "starting API server");
    let listener = tokio::net::TcpListener::bind(&addr).await?;

    axum::serve(listener, app).with_graceful_shutdown(shutdown_signal()).await?;

    Ok(())
}
