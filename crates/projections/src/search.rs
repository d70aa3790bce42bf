//! Paginated title search over the index.

use std::time::Instant;

use common::ItemId;
use index_store::{IndexStore, IndexStoreError, IndexedItem};
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const DEFAULT_PAGE: u32 = 1;
pub const DEFAULT_PAGE_SIZE: u32 = 20;
pub const MAX_PAGE_SIZE: u32 = 100;

/// Errors returned by [`QueryEngine::search`].
#[derive(Debug, Error)]
pub enum SearchError {
    /// The request violates the pagination bounds.
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// The index could not be read.
    #[error("Index store unavailable: {0}")]
    StoreUnavailable(#[from] IndexStoreError),
}

/// A search request. Pages are 1-based.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchRequest {
    pub query: Option<String>,
    pub page: u32,
    pub size: u32,
}

impl SearchRequest {
    /// Creates a request for the first page with the default page size.
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: Some(query.into()),
            ..Self::default()
        }
    }

    pub fn page(mut self, page: u32) -> Self {
        self.page = page;
        self
    }

    pub fn size(mut self, size: u32) -> Self {
        self.size = size;
        self
    }

    /// Checks the pagination bounds.
    pub fn validate(&self) -> Result<(), SearchError> {
        if self.page < 1 {
            return Err(SearchError::InvalidArgument(format!(
                "page must be at least 1, got {}",
                self.page
            )));
        }
        if !(1..=MAX_PAGE_SIZE).contains(&self.size) {
            return Err(SearchError::InvalidArgument(format!(
                "size must be between 1 and {MAX_PAGE_SIZE}, got {}",
                self.size
            )));
        }
        Ok(())
    }

    /// Trimmed, lowercased query; `None` matches everything.
    fn needle(&self) -> Option<String> {
        self.query
            .as_deref()
            .map(str::trim)
            .filter(|q| !q.is_empty())
            .map(str::to_lowercase)
    }
}

impl Default for SearchRequest {
    fn default() -> Self {
        Self {
            query: None,
            page: DEFAULT_PAGE,
            size: DEFAULT_PAGE_SIZE,
        }
    }
}

/// One matching index record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchHit {
    pub item_id: ItemId,
    pub title: String,
    pub stock_count: u32,
    pub condition: Option<String>,
}

impl From<IndexedItem> for SearchHit {
    fn from(item: IndexedItem) -> Self {
        Self {
            item_id: item.item_id,
            title: item.title,
            stock_count: item.stock_count,
            condition: item.condition,
        }
    }
}

/// One page of search results.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchResponse {
    pub results: Vec<SearchHit>,
    /// Number of matches across all pages.
    pub total_count: usize,
    pub page: u32,
    pub size: u32,
}

/// Answers title searches from a point-in-time snapshot of the index.
#[derive(Clone)]
pub struct QueryEngine<S: IndexStore> {
    store: S,
}

impl<S: IndexStore> QueryEngine<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    /// Returns the underlying store.
    pub fn store(&self) -> &S {
        &self.store
    }

    /// Finds items whose title contains the query, ignoring case.
    ///
    /// Results keep the snapshot order. A page past the last match is
    /// empty, not an error.
    #[tracing::instrument(skip(self, request), fields(query = ?request.query, page = request.page, size = request.size))]
    pub async fn search(&self, request: &SearchRequest) -> Result<SearchResponse, SearchError> {
        let started = Instant::now();
        let response = self.run(request).await;

        let outcome = match &response {
            Ok(_) => "ok",
            Err(SearchError::InvalidArgument(_)) => "invalid",
            Err(SearchError::StoreUnavailable(_)) => "unavailable",
        };
        metrics::counter!("search_requests_total", "outcome" => outcome).increment(1);
        metrics::histogram!("search_duration_seconds").record(started.elapsed().as_secs_f64());

        response
    }

    async fn run(&self, request: &SearchRequest) -> Result<SearchResponse, SearchError> {
        request.validate()?;

        let snapshot = self.store.list_all().await?;
        let needle = request.needle();
        let matches: Vec<IndexedItem> = snapshot
            .into_iter()
            .filter(|item| match &needle {
                Some(needle) => item.title.to_lowercase().contains(needle.as_str()),
                None => true,
            })
            .collect();

        let total_count = matches.len();
        let offset = (request.page as usize - 1).saturating_mul(request.size as usize);
        let results: Vec<SearchHit> = matches
            .into_iter()
            .skip(offset)
            .take(request.size as usize)
            .map(SearchHit::from)
            .collect();

        tracing::debug!(total_count, returned = results.len(), "search complete");

        Ok(SearchResponse {
            results,
            total_count,
            page: request.page,
            size: request.size,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::seeder::BootstrapSeeder;
    use index_store::{FieldUpdates, InMemoryIndexStore};

    async fn seeded_engine() -> QueryEngine<InMemoryIndexStore> {
        let store = InMemoryIndexStore::new();
        BootstrapSeeder::new(store.clone()).run().await.unwrap();
        QueryEngine::new(store)
    }

    #[tokio::test]
    async fn matches_title_case_insensitively() {
        let engine = seeded_engine().await;

        let response = engine.search(&SearchRequest::new("algorithms")).await.unwrap();

        assert_eq!(response.total_count, 2);
        let titles: Vec<_> = response.results.iter().map(|h| h.title.as_str()).collect();
        assert_eq!(
            titles,
            vec!["Introduction to Algorithms", "Data Structures and Algorithms"]
        );
    }

    #[tokio::test]
    async fn blank_query_matches_everything() {
        let engine = seeded_engine().await;

        let absent = engine.search(&SearchRequest::default()).await.unwrap();
        let blank = engine.search(&SearchRequest::new("   ")).await.unwrap();

        assert_eq!(absent.total_count, 10);
        assert_eq!(blank.total_count, 10);
        assert_eq!(absent.results.len(), 10);
    }

    #[tokio::test]
    async fn query_is_trimmed() {
        let engine = seeded_engine().await;
        let response = engine.search(&SearchRequest::new("  clean code ")).await.unwrap();
        assert_eq!(response.total_count, 1);
        assert_eq!(response.results[0].item_id.as_str(), "ISBN-003");
    }

    #[tokio::test]
    async fn paginates_over_matches() {
        let engine = seeded_engine().await;

        let first = engine.search(&SearchRequest::default().size(5)).await.unwrap();
        let second = engine.search(&SearchRequest::default().page(2).size(5)).await.unwrap();
        let past_end = engine.search(&SearchRequest::default().page(3).size(5)).await.unwrap();

        assert_eq!(first.results.len(), 5);
        assert_eq!(first.results[0].item_id.as_str(), "ISBN-001");
        assert_eq!(second.results[0].item_id.as_str(), "ISBN-006");
        assert!(past_end.results.is_empty());
        assert_eq!(past_end.total_count, 10);
        assert_eq!((past_end.page, past_end.size), (3, 5));
    }

    #[tokio::test]
    async fn reflects_latest_stock() {
        let engine = seeded_engine().await;
        engine
            .store()
            .upsert_fields(&ItemId::new("ISBN-003"), FieldUpdates::new().stock_count(20))
            .await
            .unwrap();

        let response = engine.search(&SearchRequest::new("Clean")).await.unwrap();

        assert_eq!(response.results[0].stock_count, 20);
    }

    #[tokio::test]
    async fn rejects_out_of_range_pagination() {
        let engine = seeded_engine().await;

        for request in [
            SearchRequest::default().page(0),
            SearchRequest::default().size(0),
            SearchRequest::default().size(MAX_PAGE_SIZE + 1),
        ] {
            assert!(matches!(
                engine.search(&request).await,
                Err(SearchError::InvalidArgument(_))
            ));
        }
        assert!(engine.search(&SearchRequest::default().size(MAX_PAGE_SIZE)).await.is_ok());
    }

    #[tokio::test]
    async fn huge_page_does_not_overflow() {
        let engine = seeded_engine().await;
        let response = engine
            .search(&SearchRequest::default().page(u32::MAX).size(MAX_PAGE_SIZE))
            .await
            .unwrap();
        assert!(response.results.is_empty());
    }

    #[test]
    fn hit_serializes_camel_case() {
        let hit = SearchHit::from(
            IndexedItem::new("ISBN-001")
                .with_title("Introduction to Algorithms")
                .with_stock(5),
        );
        let json = serde_json::to_value(&hit).unwrap();
        assert_eq!(json["itemId"], "ISBN-001");
        assert_eq!(json["stockCount"], 5);
        assert!(json["condition"].is_null());
    }
}
