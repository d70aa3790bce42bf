//! Core integration event trait and payload decoding.

use chrono::{DateTime, Utc};
use common::ItemId;
use serde::{Serialize, de::DeserializeOwned};

use crate::{ContractError, Result};

/// Schema version understood by this consumer.
pub const CURRENT_SCHEMA_VERSION: u16 = 1;

/// Trait for integration events published by the write side.
///
/// Integration events are immutable facts about a single catalog item.
/// Every event is routed to its own queue so each type can be consumed
/// independently of the others.
pub trait IntegrationEvent: Serialize + DeserializeOwned + Send + Sync + Clone {
    /// Event type name, used in logs and metric labels.
    const EVENT_TYPE: &'static str;

    /// Queue this event type is delivered on.
    const QUEUE: &'static str;

    /// The item the event refers to.
    fn item_id(&self) -> &ItemId;

    /// When the producer recorded the fact.
    fn occurred_at(&self) -> DateTime<Utc>;

    /// Schema version declared by the producer.
    fn schema_version(&self) -> u16;

    /// Checks invariants serde cannot express.
    fn validate(&self) -> Result<()> {
        check_envelope(self)
    }
}

/// Checks the invariants shared by every event type: a supported schema
/// version and a non-blank item id.
pub fn check_envelope<E: IntegrationEvent>(event: &E) -> Result<()> {
    if event.schema_version() != CURRENT_SCHEMA_VERSION {
        return Err(ContractError::UnsupportedVersion {
            event_type: E::EVENT_TYPE,
            version: event.schema_version(),
            expected: CURRENT_SCHEMA_VERSION,
        });
    }
    if event.item_id().is_blank() {
        return Err(ContractError::BlankField {
            event_type: E::EVENT_TYPE,
            field: "itemId",
        });
    }
    Ok(())
}

/// Decodes and validates a JSON payload as event `E`.
pub fn decode<E: IntegrationEvent>(payload: &[u8]) -> Result<E> {
    let event: E = serde_json::from_slice(payload).map_err(|source| ContractError::Json {
        event_type: E::EVENT_TYPE,
        source,
    })?;
    event.validate()?;
    Ok(event)
}

pub(crate) fn default_schema_version() -> u16 {
    CURRENT_SCHEMA_VERSION
}

/// Serde helpers for producer timestamps.
///
/// Producers are not consistent about offsets: some send RFC 3339 with `Z`,
/// others a bare `2024-05-01T10:00:00` meaning UTC.
pub(crate) mod timestamp {
    use chrono::{DateTime, NaiveDateTime, Utc};
    use serde::{Deserialize, Deserializer};

    pub fn parse(raw: &str) -> Option<DateTime<Utc>> {
        if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
            return Some(ts.with_timezone(&Utc));
        }
        NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f")
            .ok()
            .map(|naive| naive.and_utc())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<DateTime<Utc>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        parse(&raw).ok_or_else(|| serde::de::Error::custom(format!("invalid timestamp `{raw}`")))
    }

    pub fn deserialize_opt<'de, D>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error>
    where
        D: Deserializer<'de>,
    {
        match Option::<String>::deserialize(deserializer)? {
            None => Ok(None),
            Some(raw) if raw.trim().is_empty() => Ok(None),
            Some(raw) => parse(&raw)
                .map(Some)
                .ok_or_else(|| serde::de::Error::custom(format!("invalid timestamp `{raw}`"))),
        }
    }
}
