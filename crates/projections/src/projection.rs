//! Core projection trait and stock ordering policy.

use std::str::FromStr;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use index_store::FieldUpdates;

use crate::Result;

/// How concurrent stock writes for one item are ordered.
///
/// Stock events for the same item may arrive out of order. With
/// `LastTimestampWins` every stock write carries its event timestamp and the
/// store rejects writes older than the stored one. `LastAppliedWins` writes
/// unconditionally, so a late stale event regresses the stock count.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum StockPolicy {
    #[default]
    LastTimestampWins,
    LastAppliedWins,
}

impl StockPolicy {
    /// Attaches the stock guard to `updates` when this policy needs one.
    pub fn guard(self, updates: FieldUpdates, occurred_at: DateTime<Utc>) -> FieldUpdates {
        match self {
            StockPolicy::LastTimestampWins => updates.stock_as_of(occurred_at),
            StockPolicy::LastAppliedWins => updates,
        }
    }

    /// Configuration name of the policy.
    pub fn as_str(&self) -> &'static str {
        match self {
            StockPolicy::LastTimestampWins => "last-timestamp",
            StockPolicy::LastAppliedWins => "last-applied",
        }
    }
}

impl std::fmt::Display for StockPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for StockPolicy {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "last-timestamp" | "last_timestamp" | "timestamp" => Ok(StockPolicy::LastTimestampWins),
            "last-applied" | "last_applied" | "applied" => Ok(StockPolicy::LastAppliedWins),
            other => Err(format!(
                "unknown stock policy `{other}` (expected `last-timestamp` or `last-applied`)"
            )),
        }
    }
}

/// A projection that applies one event type to the index.
///
/// Each projection owns one queue. Consumer workers feed it raw payloads;
/// the projection decodes, validates and applies them. Applying the same
/// payload twice must leave the index as applying it once.
#[async_trait]
pub trait Projection: Send + Sync {
    /// Returns the name of this projection.
    fn name(&self) -> &'static str;

    /// Returns the queue this projection consumes.
    fn queue(&self) -> &'static str;

    /// Decodes `payload` and applies it to the index.
    async fn handle(&self, payload: &[u8]) -> Result<()>;
}
