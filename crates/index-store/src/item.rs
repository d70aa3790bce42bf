use chrono::{DateTime, TimeZone, Utc};
use common::ItemId;
use serde::{Deserialize, Serialize};

/// One record of the search index.
///
/// A record exists once any event for its `item_id` has been applied.
/// Fields nobody has written yet hold their defaults: empty title, zero
/// stock, no condition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexedItem {
    /// Unique key of the record.
    pub item_id: ItemId,

    /// Display title, matched by substring search.
    pub title: String,

    /// Last known quantity.
    pub stock_count: u32,

    /// Short condition tag, if known.
    pub condition: Option<String>,

    /// Timestamp of the event that last set `stock_count`, when the writer
    /// supplied one. Truncated to millisecond precision.
    pub stock_as_of: Option<DateTime<Utc>>,
}

impl IndexedItem {
    /// Creates a record with default field values.
    pub fn new(item_id: impl Into<ItemId>) -> Self {
        Self {
            item_id: item_id.into(),
            title: String::new(),
            stock_count: 0,
            condition: None,
            stock_as_of: None,
        }
    }

    /// Sets the title.
    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = title.into();
        self
    }

    /// Sets the stock count.
    pub fn with_stock(mut self, stock_count: u32) -> Self {
        self.stock_count = stock_count;
        self
    }

    /// Sets the condition tag. Empty tags are stored as absent.
    pub fn with_condition(mut self, condition: impl Into<String>) -> Self {
        self.condition = normalize_condition(Some(condition.into()));
        self
    }

    /// Applies a partial update in place.
    ///
    /// Returns `true` if the stock write was rejected because the stored
    /// stock is newer than the update's `stock_as_of` guard.
    pub fn apply(&mut self, updates: &FieldUpdates) -> bool {
        if let Some(title) = &updates.title {
            self.title.clone_from(title);
        }
        if let Some(condition) = &updates.condition {
            self.condition.clone_from(condition);
        }

        let Some(stock) = updates.stock_count else {
            return false;
        };
        match (updates.stock_as_of, self.stock_as_of) {
            (Some(guard), Some(stored)) if guard < stored => true,
            (Some(guard), _) => {
                self.stock_count = stock;
                self.stock_as_of = Some(guard);
                false
            }
            (None, _) => {
                self.stock_count = stock;
                false
            }
        }
    }
}

/// A partial update of an [`IndexedItem`].
///
/// Only fields that are set are written; everything else keeps its stored
/// value (or its default when the record is new).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FieldUpdates {
    pub(crate) title: Option<String>,
    pub(crate) stock_count: Option<u32>,
    pub(crate) condition: Option<Option<String>>,
    pub(crate) stock_as_of: Option<DateTime<Utc>>,
}

impl FieldUpdates {
    /// Creates an empty update.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the title.
    pub fn title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    /// Sets the stock count.
    pub fn stock_count(mut self, stock_count: u32) -> Self {
        self.stock_count = Some(stock_count);
        self
    }

    /// Sets or clears the condition tag. An empty tag clears it.
    pub fn condition(mut self, condition: Option<String>) -> Self {
        self.condition = Some(normalize_condition(condition));
        self
    }

    /// Makes the stock write conditional on `as_of` not being older than
    /// the timestamp stored with the current stock count.
    ///
    /// Has no effect unless a stock count is also set.
    pub fn stock_as_of(mut self, as_of: DateTime<Utc>) -> Self {
        self.stock_as_of = Some(truncate_to_millis(as_of));
        self
    }

    /// Returns true if no field is set.
    pub fn is_empty(&self) -> bool {
        self.title.is_none() && self.stock_count.is_none() && self.condition.is_none()
    }

    /// Returns the title update, if any.
    pub fn title_value(&self) -> Option<&str> {
        self.title.as_deref()
    }

    /// Returns the stock update, if any.
    pub fn stock_value(&self) -> Option<u32> {
        self.stock_count
    }

    /// Returns the stock guard, if any.
    pub fn stock_guard(&self) -> Option<DateTime<Utc>> {
        self.stock_as_of
    }
}

/// Result of a single [`upsert_fields`](crate::IndexStore::upsert_fields) call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WriteOutcome {
    /// The record did not exist before this write.
    pub created: bool,

    /// The stock part of the update was rejected as stale.
    pub stock_skipped: bool,
}

fn normalize_condition(condition: Option<String>) -> Option<String> {
    condition.filter(|c| !c.trim().is_empty())
}

/// Epoch milliseconds, the resolution both backends compare guards at.
pub(crate) fn to_millis(ts: DateTime<Utc>) -> i64 {
    ts.timestamp_millis()
}

pub(crate) fn from_millis(ms: i64) -> Option<DateTime<Utc>> {
    Utc.timestamp_millis_opt(ms).single()
}

fn truncate_to_millis(ts: DateTime<Utc>) -> DateTime<Utc> {
    from_millis(to_millis(ts)).unwrap_or(ts)
}
