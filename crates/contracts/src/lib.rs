//! Integration event contracts consumed by the catalog search index.
//!
//! This crate defines the wire shape of the events the write side publishes:
//! - [`IntegrationEvent`] trait shared by every event type
//! - [`BookAdded`] and [`StockChanged`] payloads
//! - [`decode`] for parsing and validating raw payloads

pub mod catalog;
pub mod error;
pub mod event;

pub use catalog::{BookAdded, CatalogEvent, StockChanged};
pub use error::{ContractError, Result};
pub use event::{CURRENT_SCHEMA_VERSION, IntegrationEvent, check_envelope, decode};
