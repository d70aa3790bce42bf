//! Health check endpoint.

use std::sync::Arc;

use axum::Json;
use axum::extract::State;
use axum::http::StatusCode;
use index_store::IndexStore;
use serde::Serialize;

use crate::AppState;

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub items: Option<usize>,
}

/// GET /health: reports whether the index store answers.
pub async fn check<S: IndexStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
) -> (StatusCode, Json<HealthResponse>) {
    let probe = match state.store.ping().await {
        Ok(()) => state.store.count().await,
        Err(err) => Err(err),
    };

    match probe {
        Ok(items) => (
            StatusCode::OK,
            Json(HealthResponse {
                status: "ok",
                items: Some(items),
            }),
        ),
        Err(err) => {
            tracing::warn!(error = %err, "health check failed");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(HealthResponse {
                    status: "unavailable",
                    items: None,
                }),
            )
        }
    }
}
