//! Read-side projection and query engine for the catalog search index.
//!
//! This crate turns catalog integration events into index records and
//! answers searches over them:
//! - [`Projection`] implementations for `BookAdded` and `StockChanged`
//! - [`ConsumerWorker`] and [`ProjectorSupervisor`] driving projections from a [`MessageSource`]
//! - [`InMemoryBroker`] for in-process at-least-once delivery
//! - [`BootstrapSeeder`] populating an empty index at startup
//! - [`QueryEngine`] for paginated, case-insensitive title search

pub mod broker;
pub mod consumer;
pub mod error;
pub mod projection;
pub mod projectors;
pub mod search;
pub mod seeder;

pub use broker::{
    BrokerError, Delivery, InMemoryBroker, Message, MessageSource, QueueConsumer,
    RedeliveryBackoff,
};
pub use consumer::{ConsumerWorker, ProjectorSupervisor, WorkerStats};
pub use error::{ProjectionError, Result};
pub use projection::{Projection, StockPolicy};
pub use projectors::{BookAddedProjection, StockChangedProjection};
pub use search::{QueryEngine, SearchError, SearchHit, SearchRequest, SearchResponse};
pub use seeder::{BootstrapSeeder, SeedOutcome, reference_dataset};
