//! Projects `StockChanged` events into index records.

use async_trait::async_trait;
use contracts::{IntegrationEvent, StockChanged};
use index_store::{FieldUpdates, IndexStore, WriteOutcome};

use crate::Result;
use crate::projection::{Projection, StockPolicy};

/// Overwrites the stock count of an item, creating the record if this is
/// the first event seen for it.
#[derive(Clone)]
pub struct StockChangedProjection<S: IndexStore> {
    store: S,
    policy: StockPolicy,
}

impl<S: IndexStore> StockChangedProjection<S> {
    /// Creates a projection writing to `store`.
    pub fn new(store: S, policy: StockPolicy) -> Self {
        Self { store, policy }
    }

    /// Applies one decoded event.
    #[tracing::instrument(skip(self, event), fields(item_id = %event.item_id))]
    pub async fn apply(&self, event: &StockChanged) -> Result<WriteOutcome> {
        let updates = self
            .policy
            .guard(FieldUpdates::new().stock_count(event.new_stock), event.timestamp);

        let outcome = self.store.upsert_fields(&event.item_id, updates).await?;

        if outcome.stock_skipped {
            tracing::info!(
                new_stock = event.new_stock,
                timestamp = %event.timestamp,
                "ignoring stale stock update"
            );
            metrics::counter!("projector_stale_stock_ignored_total", "event_type" => StockChanged::EVENT_TYPE)
                .increment(1);
        } else {
            tracing::debug!(
                created = outcome.created,
                new_stock = event.new_stock,
                changed_by = %event.changed_by,
                "stock updated"
            );
        }

        Ok(outcome)
    }
}

#[async_trait]
impl<S: IndexStore + Clone + 'static> Projection for StockChangedProjection<S> {
    fn name(&self) -> &'static str {
        "StockChangedProjection"
    }

    fn queue(&self) -> &'static str {
        StockChanged::QUEUE
    }

    async fn handle(&self, payload: &[u8]) -> Result<()> {
        let event: StockChanged = contracts::decode(payload)?;
        self.apply(&event).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{DateTime, TimeZone, Utc};
    use common::ItemId;
    use index_store::InMemoryIndexStore;

    fn at(hour: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 1, hour, 0, 0).unwrap()
    }

    fn stock_changed(new_stock: u32, timestamp: DateTime<Utc>) -> StockChanged {
        StockChanged {
            schema_version: 1,
            item_id: ItemId::new("X"),
            new_stock,
            changed_by: "WarehouseService".to_string(),
            timestamp,
        }
    }

    #[tokio::test]
    async fn stock_before_book_creates_placeholder_record() {
        let store = InMemoryIndexStore::new();
        let projection = StockChangedProjection::new(store.clone(), StockPolicy::default());

        let outcome = projection.apply(&stock_changed(5, at(10))).await.unwrap();

        assert!(outcome.created);
        let item = store.get(&ItemId::new("X")).await.unwrap().unwrap();
        assert_eq!(item.stock_count, 5);
        assert_eq!(item.title, "");
        assert_eq!(item.condition, None);
    }

    #[tokio::test]
    async fn redelivery_is_idempotent() {
        let store = InMemoryIndexStore::new();
        let projection = StockChangedProjection::new(store.clone(), StockPolicy::default());
        let event = stock_changed(5, at(10));

        projection.apply(&event).await.unwrap();
        let outcome = projection.apply(&event).await.unwrap();

        assert!(!outcome.stock_skipped);
        assert_eq!(store.get(&event.item_id).await.unwrap().unwrap().stock_count, 5);
    }

    #[tokio::test]
    async fn monotonic_policy_rejects_out_of_order_update() {
        let store = InMemoryIndexStore::new();
        let projection = StockChangedProjection::new(store.clone(), StockPolicy::LastTimestampWins);

        projection.apply(&stock_changed(3, at(12))).await.unwrap();
        let outcome = projection.apply(&stock_changed(9, at(11))).await.unwrap();

        assert!(outcome.stock_skipped);
        assert_eq!(store.get(&ItemId::new("X")).await.unwrap().unwrap().stock_count, 3);
    }

    #[tokio::test]
    async fn last_applied_policy_lets_stale_update_win() {
        let store = InMemoryIndexStore::new();
        let projection = StockChangedProjection::new(store.clone(), StockPolicy::LastAppliedWins);

        projection.apply(&stock_changed(3, at(12))).await.unwrap();
        let outcome = projection.apply(&stock_changed(9, at(11))).await.unwrap();

        assert!(!outcome.stock_skipped);
        assert_eq!(store.get(&ItemId::new("X")).await.unwrap().unwrap().stock_count, 9);
    }

    #[tokio::test]
    async fn handle_rejects_negative_stock() {
        let store = InMemoryIndexStore::new();
        let projection = StockChangedProjection::new(store.clone(), StockPolicy::default());

        let err = projection
            .handle(br#"{"itemId":"X","newStock":-1,"timestamp":"2024-05-01T10:00:00Z"}"#)
            .await
            .unwrap_err();

        assert!(matches!(err, crate::ProjectionError::MalformedEvent(_)));
        assert!(store.get(&ItemId::new("X")).await.unwrap().is_none());
    }
}
