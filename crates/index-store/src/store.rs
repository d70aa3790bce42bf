use async_trait::async_trait;
use common::ItemId;

use crate::{FieldUpdates, IndexStoreError, IndexedItem, Result, WriteOutcome};

/// Core trait for index store backends.
///
/// A store holds one field-addressable record per item. Every operation is
/// scoped to a single record and is atomic for that record; nothing is
/// atomic across records. Implementations are cheap `Clone` handles and must
/// be safe to share between consumer workers, the seeder, and query callers.
#[async_trait]
pub trait IndexStore: Send + Sync {
    /// Fetches one record. Returns None if the item was never seen.
    async fn get(&self, item_id: &ItemId) -> Result<Option<IndexedItem>>;

    /// Writes the fields present in `updates`, creating the record with
    /// default values if it does not exist.
    ///
    /// The whole update is one atomic write for this record. When the update
    /// carries a stock guard, the stock part is skipped if the stored stock is
    /// newer; other fields are written regardless.
    async fn upsert_fields(&self, item_id: &ItemId, updates: FieldUpdates)
    -> Result<WriteOutcome>;

    /// Stores `item` only if no record exists for its id.
    ///
    /// Returns true if the record was written. The existence check and the
    /// write are a single atomic operation.
    async fn insert_if_absent(&self, item: IndexedItem) -> Result<bool>;

    /// Returns every record.
    ///
    /// This is a snapshot assembled record by record. Backends that cannot
    /// read all records atomically may return a mix of states from before and
    /// after a concurrent write.
    async fn list_all(&self) -> Result<Vec<IndexedItem>>;

    /// Returns the number of records.
    async fn count(&self) -> Result<usize>;

    /// Checks that the backing store is reachable.
    async fn ping(&self) -> Result<()>;
}

/// Rejects item ids that cannot address a record.
pub fn validate_item_id(item_id: &ItemId) -> Result<()> {
    if item_id.is_blank() {
        return Err(IndexStoreError::InvalidKey(item_id.to_string()));
    }
    if item_id.as_str().chars().any(char::is_control) {
        return Err(IndexStoreError::InvalidKey(item_id.to_string()));
    }
    Ok(())
}
