//! Event projectors writing into the search index.

pub mod book_added;
pub mod stock_changed;

pub use book_added::BookAddedProjection;
pub use stock_changed::StockChangedProjection;
