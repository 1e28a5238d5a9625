//! Liveness endpoint.

use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use serde::Serialize;

use gatekeep_store::MetricsSnapshot;

use crate::AppState;

#[derive(Serialize)]
struct HealthBody {
    status: &'static str,
    store: &'static str,
    cache: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    store_metrics: Option<MetricsSnapshot>,
}

/// GET /health
///
/// Reports component liveness; an unreachable store degrades the whole
/// service to 503 since no decision can be made without it.
pub async fn health_handler(State(state): State<AppState>) -> impl IntoResponse {
    let store_ok = state.store.ping().await.is_ok();

    let cache_status = match &state.cache {
        Some(cache) => {
            if cache.ping().await.is_ok() {
                "ok"
            } else {
                // A dead cache degrades checks to pure misses but the
                // engine still answers.
                "degraded"
            }
        },
        None => "disabled",
    };

    let (status, code) = if store_ok {
        ("ok", StatusCode::OK)
    } else {
        ("degraded", StatusCode::SERVICE_UNAVAILABLE)
    };

    let body = HealthBody {
        status,
        store: if store_ok { "ok" } else { "unreachable" },
        cache: cache_status,
        store_metrics: state.store.metrics(),
    };

    (code, Json(body))
}
