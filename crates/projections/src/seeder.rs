//! One-shot bootstrap of an empty index with a reference catalog.

use index_store::{IndexStore, IndexedItem};

use crate::Result;

/// Result of a seeder run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SeedOutcome {
    /// The index already held records; nothing was written.
    Skipped { existing: usize },
    /// The index was empty. `skipped` counts items a live event created
    /// while seeding was in progress.
    Seeded { inserted: usize, skipped: usize },
}

/// The fixed catalog written into an empty index.
pub fn reference_dataset() -> Vec<IndexedItem> {
    [
        ("ISBN-001", "Introduction to Algorithms", "new", 5),
        ("ISBN-002", "Design Patterns", "used", 3),
        ("ISBN-003", "Clean Code", "new", 10),
        ("ISBN-004", "Database Systems", "used", 2),
        ("ISBN-005", "Artificial Intelligence: A Modern Approach", "new", 8),
        ("ISBN-006", "Computer Networks", "used", 6),
        ("ISBN-007", "Operating System Concepts", "new", 4),
        ("ISBN-008", "Data Structures and Algorithms", "used", 7),
        ("ISBN-009", "Machine Learning", "new", 12),
        ("ISBN-010", "Software Engineering", "used", 1),
    ]
    .into_iter()
    .map(|(id, title, condition, stock)| {
        IndexedItem::new(id)
            .with_title(title)
            .with_condition(condition)
            .with_stock(stock)
    })
    .collect()
}

/// Seeds an empty index so the search surface has data from the start.
pub struct BootstrapSeeder<S: IndexStore> {
    store: S,
    dataset: Vec<IndexedItem>,
}

impl<S: IndexStore> BootstrapSeeder<S> {
    /// Creates a seeder writing [`reference_dataset`] to `store`.
    pub fn new(store: S) -> Self {
        Self::with_dataset(store, reference_dataset())
    }

    /// Creates a seeder writing a custom dataset.
    pub fn with_dataset(store: S, dataset: Vec<IndexedItem>) -> Self {
        Self { store, dataset }
    }

    /// Seeds the index if, and only if, it is empty.
    ///
    /// Every write is insert-if-absent, so an item a live event created in
    /// the meantime is left untouched.
    #[tracing::instrument(skip(self), fields(items = self.dataset.len()))]
    pub async fn run(&self) -> Result<SeedOutcome> {
        let existing = self.store.count().await?;
        if existing > 0 {
            tracing::info!(existing, "index already populated, skipping seed");
            return Ok(SeedOutcome::Skipped { existing });
        }

        let mut inserted = 0;
        let mut skipped = 0;
        for item in &self.dataset {
            if self.store.insert_if_absent(item.clone()).await? {
                inserted += 1;
                metrics::counter!("seeder_items_inserted_total").increment(1);
            } else {
                tracing::debug!(item_id = %item.item_id, "item created concurrently, not seeding");
                skipped += 1;
            }
        }

        tracing::info!(inserted, skipped, "index seeded");
        Ok(SeedOutcome::Seeded { inserted, skipped })
    }
}
