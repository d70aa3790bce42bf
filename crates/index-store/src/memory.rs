use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use common::ItemId;
use tokio::sync::RwLock;

use crate::{
    FieldUpdates, IndexedItem, Result, WriteOutcome,
    store::{IndexStore, validate_item_id},
};

/// Records in insertion order plus a key index into them.
///
/// Records are never removed, so positions stay valid.
#[derive(Default)]
struct IndexState {
    records: Vec<IndexedItem>,
    positions: HashMap<ItemId, usize>,
}

impl IndexState {
    fn get_mut(&mut self, item_id: &ItemId) -> Option<&mut IndexedItem> {
        let pos = *self.positions.get(item_id)?;
        self.records.get_mut(pos)
    }

    fn insert(&mut self, item: IndexedItem) {
        self.positions.insert(item.item_id.clone(), self.records.len());
        self.records.push(item);
    }
}

/// In-memory index store for tests and for running without Redis.
///
/// Every read-modify-write of a record happens under one write lock, so
/// concurrent upserts to the same item never interleave. `list_all`
/// returns records in the order they were first created.
#[derive(Clone, Default)]
pub struct InMemoryIndexStore {
    state: Arc<RwLock<IndexState>>,
}

impl InMemoryIndexStore {
    /// Creates a new empty in-memory index store.
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl IndexStore for InMemoryIndexStore {
    async fn get(&self, item_id: &ItemId) -> Result<Option<IndexedItem>> {
        let state = self.state.read().await;
        Ok(state
            .positions
            .get(item_id)
            .and_then(|&pos| state.records.get(pos))
            .cloned())
    }

    async fn upsert_fields(
        &self,
        item_id: &ItemId,
        updates: FieldUpdates,
    ) -> Result<WriteOutcome> {
        validate_item_id(item_id)?;

        let mut state = self.state.write().await;

        if let Some(item) = state.get_mut(item_id) {
            let stock_skipped = item.apply(&updates);
            return Ok(WriteOutcome {
                created: false,
                stock_skipped,
            });
        }

        let mut item = IndexedItem::new(item_id.clone());
        let stock_skipped = item.apply(&updates);
        state.insert(item);

        Ok(WriteOutcome {
            created: true,
            stock_skipped,
        })
    }

    async fn insert_if_absent(&self, item: IndexedItem) -> Result<bool> {
        validate_item_id(&item.item_id)?;

        let mut state = self.state.write().await;
        if state.positions.contains_key(&item.item_id) {
            return Ok(false);
        }
        state.insert(item);
        Ok(true)
    }

    async fn list_all(&self) -> Result<Vec<IndexedItem>> {
        Ok(self.state.read().await.records.clone())
    }

    async fn count(&self) -> Result<usize> {
        Ok(self.state.read().await.records.len())
    }

    async fn ping(&self) -> Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn id(raw: &str) -> ItemId {
        ItemId::new(raw)
    }

    #[tokio::test]
    async fn get_missing_returns_none() {
        let store = InMemoryIndexStore::new();
        assert!(store.get(&id("ISBN-404")).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn upsert_creates_with_defaults() {
        let store = InMemoryIndexStore::new();

        let outcome = store
            .upsert_fields(&id("ISBN-1"), FieldUpdates::new().stock_count(5))
            .await
            .unwrap();

        assert!(outcome.created);
        let item = store.get(&id("ISBN-1")).await.unwrap().unwrap();
        assert_eq!(item.title, "");
        assert_eq!(item.stock_count, 5);
        assert_eq!(item.condition, None);
    }

    #[tokio::test]
    async fn upsert_merges_into_existing_record() {
        let store = InMemoryIndexStore::new();
        store
            .upsert_fields(
                &id("ISBN-1"),
                FieldUpdates::new()
                    .title("Clean Code")
                    .condition(Some("new".into())),
            )
            .await
            .unwrap();

        let outcome = store
            .upsert_fields(&id("ISBN-1"), FieldUpdates::new().stock_count(20))
            .await
            .unwrap();

        assert!(!outcome.created);
        let item = store.get(&id("ISBN-1")).await.unwrap().unwrap();
        assert_eq!(item.title, "Clean Code");
        assert_eq!(item.condition.as_deref(), Some("new"));
        assert_eq!(item.stock_count, 20);
    }

    #[tokio::test]
    async fn upsert_rejects_blank_id() {
        let store = InMemoryIndexStore::new();
        let result = store
            .upsert_fields(&id(" "), FieldUpdates::new().stock_count(1))
            .await;
        assert!(matches!(result, Err(crate::IndexStoreError::InvalidKey(_))));
        assert_eq!(store.count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn guarded_upsert_reports_stale_stock() {
        let store = InMemoryIndexStore::new();
        let newer = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();
        let older = Utc.with_ymd_and_hms(2024, 5, 1, 11, 0, 0).unwrap();

        store
            .upsert_fields(
                &id("ISBN-1"),
                FieldUpdates::new().stock_count(8).stock_as_of(newer),
            )
            .await
            .unwrap();
        let outcome = store
            .upsert_fields(
                &id("ISBN-1"),
                FieldUpdates::new().stock_count(2).stock_as_of(older),
            )
            .await
            .unwrap();

        assert!(outcome.stock_skipped);
        assert_eq!(store.get(&id("ISBN-1")).await.unwrap().unwrap().stock_count, 8);
    }

    #[tokio::test]
    async fn insert_if_absent_does_not_overwrite() {
        let store = InMemoryIndexStore::new();
        store
            .upsert_fields(&id("ISBN-1"), FieldUpdates::new().stock_count(42))
            .await
            .unwrap();

        let inserted = store
            .insert_if_absent(IndexedItem::new("ISBN-1").with_title("Seed").with_stock(1))
            .await
            .unwrap();

        assert!(!inserted);
        let item = store.get(&id("ISBN-1")).await.unwrap().unwrap();
        assert_eq!(item.stock_count, 42);
        assert_eq!(item.title, "");
    }

    #[tokio::test]
    async fn list_all_preserves_insertion_order() {
        let store = InMemoryIndexStore::new();
        for raw in ["ISBN-3", "ISBN-1", "ISBN-2"] {
            store
                .upsert_fields(&id(raw), FieldUpdates::new().title(raw))
                .await
                .unwrap();
        }
        // Updating an existing record must not move it.
        store
            .upsert_fields(&id("ISBN-3"), FieldUpdates::new().stock_count(1))
            .await
            .unwrap();

        let ids: Vec<_> = store
            .list_all()
            .await
            .unwrap()
            .into_iter()
            .map(|i| i.item_id.to_string())
            .collect();
        assert_eq!(ids, vec!["ISBN-3", "ISBN-1", "ISBN-2"]);
    }

    #[tokio::test]
    async fn concurrent_upserts_keep_one_record_per_id() {
        let store = InMemoryIndexStore::new();

        let mut handles = Vec::new();
        for n in 0..50u32 {
            let store = store.clone();
            handles.push(tokio::spawn(async move {
                store
                    .upsert_fields(&ItemId::new("ISBN-HOT"), FieldUpdates::new().stock_count(n))
                    .await
                    .unwrap()
            }));
        }
        let mut created = 0;
        for handle in handles {
            if handle.await.unwrap().created {
                created += 1;
            }
        }

        assert_eq!(created, 1);
        assert_eq!(store.count().await.unwrap(), 1);
    }
}
