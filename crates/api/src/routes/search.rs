//! Book search endpoint.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Query, State};
use index_store::IndexStore;
use projections::search::{DEFAULT_PAGE, DEFAULT_PAGE_SIZE};
use projections::{SearchRequest, SearchResponse};
use serde::Deserialize;

use crate::AppState;
use crate::error::ApiError;

/// Raw query string. Numbers are parsed by hand so that bad input gets the
/// same JSON error body as out-of-range input.
#[derive(Debug, Deserialize)]
pub struct SearchParams {
    pub query: Option<String>,
    pub page: Option<String>,
    pub size: Option<String>,
}

impl SearchParams {
    fn into_request(self) -> Result<SearchRequest, ApiError> {
        Ok(SearchRequest {
            query: self.query,
            page: parse_number("page", self.page, DEFAULT_PAGE)?,
            size: parse_number("size", self.size, DEFAULT_PAGE_SIZE)?,
        })
    }
}

fn parse_number(name: &str, raw: Option<String>, default: u32) -> Result<u32, ApiError> {
    match raw.as_deref().map(str::trim) {
        None | Some("") => Ok(default),
        Some(raw) => raw
            .parse()
            .map_err(|_| ApiError::BadRequest(format!("{name} must be a positive integer, got `{raw}`"))),
    }
}

/// GET /api/search/books: paginated title search.
#[tracing::instrument(skip(state))]
pub async fn books<S: IndexStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Query(params): Query<SearchParams>,
) -> Result<Json<SearchResponse>, ApiError> {
    let request = params.into_request()?;
    let response = state.query_engine.search(&request).await?;
    Ok(Json(response))
}
