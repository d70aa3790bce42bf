//! Shared types for the catalog search index.

pub mod types;

pub use types::ItemId;
