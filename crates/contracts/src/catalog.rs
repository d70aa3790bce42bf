//! Catalog integration events.

use chrono::{DateTime, Utc};
use common::ItemId;
use serde::{Deserialize, Serialize};

use crate::event::{IntegrationEvent, default_schema_version, timestamp};

/// A book was listed in the catalog.
///
/// Emitted once per catalog addition by the listing service. Delivery is
/// at-least-once, so consumers see duplicates.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BookAdded {
    /// Declared schema version.
    #[serde(default = "default_schema_version")]
    pub schema_version: u16,

    #[serde(alias = "isbn")]
    pub item_id: ItemId,

    pub title: String,

    #[serde(default)]
    pub author: String,

    #[serde(default)]
    pub publisher: String,

    #[serde(default, deserialize_with = "timestamp::deserialize_opt")]
    pub publication_date: Option<DateTime<Utc>>,

    /// Listing price in the seller's currency.
    #[serde(default)]
    pub price: f64,

    #[serde(default)]
    pub seller_id: String,

    /// Quantity available at listing time.
    #[serde(alias = "stockQuantity")]
    pub initial_stock: u32,

    #[serde(deserialize_with = "timestamp::deserialize")]
    pub timestamp: DateTime<Utc>,
}

impl BookAdded {
    /// Derives the short condition tag shown next to search results.
    ///
    /// Joins author and publisher as `"author - publisher"`, falling back to
    /// whichever side is present. Returns `None` when both are blank.
    pub fn condition_tag(&self) -> Option<String> {
        let author = self.author.trim();
        let publisher = self.publisher.trim();
        match (author.is_empty(), publisher.is_empty()) {
            (false, false) => Some(format!("{author} - {publisher}")),
            (false, true) => Some(author.to_string()),
            (true, false) => Some(publisher.to_string()),
            (true, true) => None,
        }
    }
}

impl IntegrationEvent for BookAdded {
    const EVENT_TYPE: &'static str = "BookAdded";
    const QUEUE: &'static str = "catalog.book-added";

    fn item_id(&self) -> &ItemId {
        &self.item_id
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        self.timestamp
    }

    fn schema_version(&self) -> u16 {
        self.schema_version
    }
}

/// The warehouse recorded a new stock level for an item.
///
/// Emitted on every stock mutation. There is no ordering guarantee against
/// other `StockChanged` events or against the `BookAdded` for the same item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StockChanged {
    #[serde(default = "default_schema_version")]
    pub schema_version: u16,

    #[serde(alias = "isbn")]
    pub item_id: ItemId,

    #[serde(alias = "newStockQuantity")]
    pub new_stock: u32,

    /// Name of the producing service or operator.
    #[serde(default)]
    pub changed_by: String,

    #[serde(deserialize_with = "timestamp::deserialize")]
    pub timestamp: DateTime<Utc>,
}

impl IntegrationEvent for StockChanged {
    const EVENT_TYPE: &'static str = "StockChanged";
    const QUEUE: &'static str = "catalog.stock-changed";

    fn item_id(&self) -> &ItemId {
        &self.item_id
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        self.timestamp
    }

    fn schema_version(&self) -> u16 {
        self.schema_version
    }
}

/// Any catalog event the index consumes.
#[derive(Debug, Clone, PartialEq)]
pub enum CatalogEvent {
    BookAdded(BookAdded),
    StockChanged(StockChanged),
}

impl CatalogEvent {
    /// Returns the queue the event is delivered on.
    pub fn queue(&self) -> &'static str {
        match self {
            CatalogEvent::BookAdded(_) => BookAdded::QUEUE,
            CatalogEvent::StockChanged(_) => StockChanged::QUEUE,
        }
    }

    /// Serializes the event to its wire representation.
    pub fn to_payload(&self) -> serde_json::Result<Vec<u8>> {
        match self {
            CatalogEvent::BookAdded(e) => serde_json::to_vec(e),
            CatalogEvent::StockChanged(e) => serde_json::to_vec(e),
        }
    }
}

impl From<BookAdded> for CatalogEvent {
    fn from(event: BookAdded) -> Self {
        CatalogEvent::BookAdded(event)
    }
}

impl From<StockChanged> for CatalogEvent {
    fn from(event: StockChanged) -> Self {
        CatalogEvent::StockChanged(event)
    }
}
