//! Development ingress publishing raw events onto the in-process broker.
//!
//! Payloads are not inspected here; the consumer validates them and drops
//! the ones it cannot apply.

use std::sync::Arc;

use axum::Json;
use axum::body::Bytes;
use axum::extract::State;
use axum::http::StatusCode;
use contracts::{BookAdded, IntegrationEvent, StockChanged};
use index_store::IndexStore;
use serde::Serialize;

use crate::AppState;
use crate::error::ApiError;

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PublishedResponse {
    pub message_id: String,
    pub queue: &'static str,
}

async fn publish<S: IndexStore>(
    state: &AppState<S>,
    queue: &'static str,
    body: Bytes,
) -> Result<(StatusCode, Json<PublishedResponse>), ApiError> {
    let message_id = state.broker.publish(queue, body.to_vec()).await?;
    Ok((
        StatusCode::ACCEPTED,
        Json(PublishedResponse {
            message_id: message_id.to_string(),
            queue,
        }),
    ))
}

/// POST /events/book-added
#[tracing::instrument(skip(state, body), fields(bytes = body.len()))]
pub async fn book_added<S: IndexStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    body: Bytes,
) -> Result<(StatusCode, Json<PublishedResponse>), ApiError> {
    publish(&state, BookAdded::QUEUE, body).await
}

/// POST /events/stock-changed
#[tracing::instrument(skip(state, body), fields(bytes = body.len()))]
pub async fn stock_changed<S: IndexStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    body: Bytes,
) -> Result<(StatusCode, Json<PublishedResponse>), ApiError> {
    publish(&state, StockChanged::QUEUE, body).await
}
