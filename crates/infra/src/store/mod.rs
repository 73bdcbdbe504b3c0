//! Persistence abstractions for ingredients, stock batches, and the damage ledger.
//!
//! Handles are injected into the service explicitly; nothing here keeps
//! process-wide state. Every write to a batch's remaining quantity is a
//! single atomic decrement-with-floor-check: [`BatchStore::apply_reduction`]
//! on its own, or [`DamageLedger::record_damage`] together with the audit
//! entry that explains it.

pub mod in_memory;
pub mod postgres;

pub use in_memory::InMemoryStockStore;
pub use postgres::PostgresStockStore;

use async_trait::async_trait;

use larder_core::{BatchId, IngredientId};
use larder_stock::{DamageEntry, Ingredient, StockBatch, total_remaining};

use crate::error::StockResult;

/// Read access to the ingredient catalog (owned by ingredient management).
#[async_trait]
pub trait IngredientCatalog: Send + Sync {
    /// Fails with `NotFound` if the ingredient does not exist.
    async fn get_ingredient(&self, ingredient_id: IngredientId) -> StockResult<Ingredient>;

    /// All ingredients, ordered by name.
    async fn list_ingredients(&self) -> StockResult<Vec<Ingredient>>;
}

/// Source of truth for per-batch quantities.
#[async_trait]
pub trait BatchStore: Send + Sync {
    /// Record a stock receipt. The ingredient must exist and the batch id must be new.
    async fn insert_batch(&self, batch: StockBatch) -> StockResult<()>;

    /// Fresh read of one batch.
    async fn get_batch(&self, batch_id: BatchId) -> StockResult<Option<StockBatch>>;

    /// Batches of one ingredient, oldest-expiring first.
    ///
    /// Fails with `NotFound` if the ingredient does not exist.
    async fn list_batches(&self, ingredient_id: IngredientId) -> StockResult<Vec<StockBatch>>;

    /// Sum of remaining quantity across the ingredient's batches (0 if none).
    async fn total_remaining(&self, ingredient_id: IngredientId) -> StockResult<i64> {
        let batches = self.list_batches(ingredient_id).await?;
        Ok(total_remaining(&batches))
    }

    /// Atomically decrement `quantity_remaining` by `amount`.
    ///
    /// - `InvalidAmount` if `amount <= 0`
    /// - `NotFound` if the batch does not exist
    /// - `InsufficientStock` if `amount` exceeds the remaining quantity at the
    ///   moment of application
    ///
    /// Failed reductions are never retried here.
    async fn apply_reduction(&self, batch_id: BatchId, amount: i64) -> StockResult<StockBatch>;
}

/// Append-only audit ledger of damage write-offs.
///
/// Entries are only ever written together with the reduction they describe.
#[async_trait]
pub trait DamageLedger: Send + Sync {
    /// Reduce the entry's batch by `quantity_damaged` and append the entry,
    /// as one unit of work.
    ///
    /// Fails with the same errors as [`BatchStore::apply_reduction`], or with
    /// `Validation` when the entry id is already recorded. On any failure
    /// neither the batch nor the ledger changes.
    async fn record_damage(&self, entry: DamageEntry) -> StockResult<StockBatch>;

    /// Entries recorded against an ingredient, oldest first.
    async fn entries_for_ingredient(
        &self,
        ingredient_id: IngredientId,
    ) -> StockResult<Vec<DamageEntry>>;
}
