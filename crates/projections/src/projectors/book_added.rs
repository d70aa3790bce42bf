//! Projects `BookAdded` events into index records.

use async_trait::async_trait;
use contracts::{BookAdded, IntegrationEvent};
use index_store::{FieldUpdates, IndexStore, WriteOutcome};

use crate::Result;
use crate::projection::{Projection, StockPolicy};

/// Writes title, condition and initial stock for each catalog addition.
///
/// All three fields are overwritten, never incremented, so a redelivered
/// event leaves the record unchanged.
#[derive(Clone)]
pub struct BookAddedProjection<S: IndexStore> {
    store: S,
    policy: StockPolicy,
}

impl<S: IndexStore> BookAddedProjection<S> {
    /// Creates a projection writing to `store`.
    pub fn new(store: S, policy: StockPolicy) -> Self {
        Self { store, policy }
    }

    /// Applies one decoded event.
    #[tracing::instrument(skip(self, event), fields(item_id = %event.item_id))]
    pub async fn apply(&self, event: &BookAdded) -> Result<WriteOutcome> {
        let updates = FieldUpdates::new()
            .title(event.title.as_str())
            .condition(event.condition_tag())
            .stock_count(event.initial_stock);
        let updates = self.policy.guard(updates, event.timestamp);

        let outcome = self.store.upsert_fields(&event.item_id, updates).await?;

        if outcome.stock_skipped {
            tracing::info!(
                initial_stock = event.initial_stock,
                "newer stock already indexed, keeping it"
            );
            metrics::counter!("projector_stale_stock_ignored_total", "event_type" => BookAdded::EVENT_TYPE)
                .increment(1);
        }
        tracing::debug!(created = outcome.created, title = %event.title, "book indexed");

        Ok(outcome)
    }
}

#[async_trait]
impl<S: IndexStore + Clone + 'static> Projection for BookAddedProjection<S> {
    fn name(&self) -> &'static str {
        "BookAddedProjection"
    }

    fn queue(&self) -> &'static str {
        BookAdded::QUEUE
    }

    async fn handle(&self, payload: &[u8]) -> Result<()> {
        let event: BookAdded = contracts::decode(payload)?;
        self.apply(&event).await?;
        Ok(())
    }
}
