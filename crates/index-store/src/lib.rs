pub mod error;
pub mod item;
pub mod memory;
pub mod redis_store;
pub mod store;

pub use common::ItemId;
pub use error::{IndexStoreError, Result};
pub use item::{FieldUpdates, IndexedItem, WriteOutcome};
pub use memory::InMemoryIndexStore;
pub use redis_store::RedisIndexStore;
pub use store::IndexStore;
