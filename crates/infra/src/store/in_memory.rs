use std::collections::HashMap;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use async_trait::async_trait;

use larder_core::{BatchId, DomainError, Entity, IngredientId};
use larder_stock::{DamageEntry, Ingredient, StockBatch};

use super::{BatchStore, DamageLedger, IngredientCatalog};
use crate::error::{StockError, StockResult};

/// In-memory catalog, batch store, and ledger for tests/dev.
///
/// Reductions run entirely under the batch write lock, which gives the same
/// decrement-with-floor-check atomicity the Postgres store gets from a
/// conditional `UPDATE`. Damage recording holds the batch and ledger write
/// locks together, standing in for the Postgres transaction. No lock is held
/// across an `.await`.
#[derive(Debug, Default)]
pub struct InMemoryStockStore {
    ingredients: RwLock<HashMap<IngredientId, Ingredient>>,
    batches: RwLock<HashMap<BatchId, StockBatch>>,
    ledger: RwLock<Vec<DamageEntry>>,
}

impl InMemoryStockStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn arc() -> Arc<Self> {
        Arc::new(Self::new())
    }

    /// Register (or replace) a catalog entry. Stands in for ingredient management.
    pub fn upsert_ingredient(&self, ingredient: Ingredient) -> StockResult<()> {
        let mut map = write(&self.ingredients)?;
        map.insert(ingredient.id(), ingredient);
        Ok(())
    }

    fn has_ingredient(&self, ingredient_id: IngredientId) -> StockResult<bool> {
        Ok(read(&self.ingredients)?.contains_key(&ingredient_id))
    }
}

fn read<T>(lock: &RwLock<T>) -> StockResult<RwLockReadGuard<'_, T>> {
    lock.read().map_err(|_| StockError::storage("lock poisoned"))
}

fn write<T>(lock: &RwLock<T>) -> StockResult<RwLockWriteGuard<'_, T>> {
    lock.write().map_err(|_| StockError::storage("lock poisoned"))
}

fn reduce_in(
    batches: &mut HashMap<BatchId, StockBatch>,
    batch_id: BatchId,
    amount: i64,
) -> StockResult<StockBatch> {
    if amount <= 0 {
        return Err(DomainError::invalid_amount(format!("reduction must be positive (got {amount})")).into());
    }

    let batch = batches
        .get_mut(&batch_id)
        .ok_or_else(|| DomainError::not_found(format!("batch {batch_id}")))?;
    batch.reduce(amount)?;
    Ok(batch.clone())
}

#[async_trait]
impl IngredientCatalog for InMemoryStockStore {
    async fn get_ingredient(&self, ingredient_id: IngredientId) -> StockResult<Ingredient> {
        read(&self.ingredients)?
            .get(&ingredient_id)
            .cloned()
            .ok_or_else(|| DomainError::not_found(format!("ingredient {ingredient_id}")).into())
    }

    async fn list_ingredients(&self) -> StockResult<Vec<Ingredient>> {
        let mut all: Vec<Ingredient> = read(&self.ingredients)?.values().cloned().collect();
        all.sort_by(|a, b| a.name().cmp(b.name()).then_with(|| a.id().cmp(&b.id())));
        Ok(all)
    }
}

#[async_trait]
impl BatchStore for InMemoryStockStore {
    async fn insert_batch(&self, batch: StockBatch) -> StockResult<()> {
        if !self.has_ingredient(batch.ingredient_id())? {
            return Err(DomainError::not_found(format!("ingredient {}", batch.ingredient_id())).into());
        }

        let mut map = write(&self.batches)?;
        if map.contains_key(&batch.id()) {
            return Err(DomainError::validation(format!("batch {} already exists", batch.id())).into());
        }
        map.insert(batch.id(), batch);
        Ok(())
    }

    async fn get_batch(&self, batch_id: BatchId) -> StockResult<Option<StockBatch>> {
        Ok(read(&self.batches)?.get(&batch_id).cloned())
    }

    async fn list_batches(&self, ingredient_id: IngredientId) -> StockResult<Vec<StockBatch>> {
        if !self.has_ingredient(ingredient_id)? {
            return Err(DomainError::not_found(format!("ingredient {ingredient_id}")).into());
        }

        let mut batches: Vec<StockBatch> = read(&self.batches)?
            .values()
            .filter(|b| b.ingredient_id() == ingredient_id)
            .cloned()
            .collect();
        batches.sort_by_key(StockBatch::expiry_order_key);
        Ok(batches)
    }

    async fn apply_reduction(&self, batch_id: BatchId, amount: i64) -> StockResult<StockBatch> {
        let mut map = write(&self.batches)?;
        reduce_in(&mut map, batch_id, amount)
    }
}

#[async_trait]
impl DamageLedger for InMemoryStockStore {
    async fn record_damage(&self, entry: DamageEntry) -> StockResult<StockBatch> {
        // Batches before ledger, everywhere both are held.
        let mut batches = write(&self.batches)?;
        let mut ledger = write(&self.ledger)?;

        if ledger.iter().any(|e| e.id == entry.id) {
            return Err(DomainError::validation(format!("damage entry {} already recorded", entry.id)).into());
        }

        let batch = reduce_in(&mut batches, entry.batch_id, entry.quantity_damaged)?;
        ledger.push(entry);
        Ok(batch)
    }

    async fn entries_for_ingredient(
        &self,
        ingredient_id: IngredientId,
    ) -> StockResult<Vec<DamageEntry>> {
        Ok(read(&self.ledger)?
            .iter()
            .filter(|e| e.ingredient_id == ingredient_id)
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use larder_core::{CategoryId, DamageEntryId, UserId};

    fn date(m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, m, d).unwrap()
    }

    fn seeded() -> (InMemoryStockStore, Ingredient) {
        let store = InMemoryStockStore::new();
        let tomato = Ingredient::new(IngredientId::new(), "Tomato", CategoryId::new(), "kg", 4, 3)
            .unwrap();
        store.upsert_ingredient(tomato.clone()).unwrap();
        (store, tomato)
    }

    fn receive(ingredient: &Ingredient, expires_on: NaiveDate, qty: i64) -> StockBatch {
        StockBatch::receive(BatchId::new(), ingredient.id(), date(1, 1), expires_on, qty).unwrap()
    }

    #[tokio::test]
    async fn list_batches_orders_by_expiry_ascending() {
        let (store, tomato) = seeded();
        let late = receive(&tomato, date(3, 1), 5);
        let early = receive(&tomato, date(1, 15), 5);
        let middle = receive(&tomato, date(2, 1), 5);
        for b in [&late, &early, &middle] {
            store.insert_batch(b.clone()).await.unwrap();
        }

        let listed: Vec<_> = store
            .list_batches(tomato.id())
            .await
            .unwrap()
            .iter()
            .map(|b| b.id())
            .collect();
        assert_eq!(listed, vec![early.id(), middle.id(), late.id()]);
    }

    #[tokio::test]
    async fn list_batches_for_unknown_ingredient_is_not_found() {
        let store = InMemoryStockStore::new();
        let err = store.list_batches(IngredientId::new()).await.unwrap_err();
        assert_eq!(err.kind(), "not_found");
    }

    #[tokio::test]
    async fn insert_rejects_unknown_ingredient_and_duplicate_batch() {
        let (store, tomato) = seeded();
        let stray = Ingredient::new(IngredientId::new(), "Stray", CategoryId::new(), "kg", 0, 0)
            .unwrap();
        let err = store.insert_batch(receive(&stray, date(2, 1), 1)).await.unwrap_err();
        assert_eq!(err.kind(), "not_found");

        let b = receive(&tomato, date(2, 1), 1);
        store.insert_batch(b.clone()).await.unwrap();
        let err = store.insert_batch(b).await.unwrap_err();
        assert_eq!(err.kind(), "validation");
    }

    #[tokio::test]
    async fn total_remaining_sums_batches_and_defaults_to_zero() {
        let (store, tomato) = seeded();
        assert_eq!(store.total_remaining(tomato.id()).await.unwrap(), 0);

        let a = receive(&tomato, date(2, 1), 7);
        let b = receive(&tomato, date(2, 5), 3);
        store.insert_batch(a.clone()).await.unwrap();
        store.insert_batch(b).await.unwrap();
        store.apply_reduction(a.id(), 2).await.unwrap();

        assert_eq!(store.total_remaining(tomato.id()).await.unwrap(), 8);
    }

    #[tokio::test]
    async fn apply_reduction_enforces_floor_and_positive_amount() {
        let (store, tomato) = seeded();
        let b = receive(&tomato, date(2, 1), 5);
        store.insert_batch(b.clone()).await.unwrap();

        let updated = store.apply_reduction(b.id(), 5).await.unwrap();
        assert_eq!(updated.quantity_remaining(), 0);

        let err = store.apply_reduction(b.id(), 1).await.unwrap_err();
        assert_eq!(err, StockError::Domain(DomainError::insufficient(1, 0)));

        let err = store.apply_reduction(b.id(), 0).await.unwrap_err();
        assert_eq!(err.kind(), "invalid_amount");

        let err = store.apply_reduction(BatchId::new(), 1).await.unwrap_err();
        assert_eq!(err.kind(), "not_found");

        // Exhausted batches are retained.
        assert!(store.get_batch(b.id()).await.unwrap().is_some());
    }

    fn damage(batch: &StockBatch, qty: i64) -> DamageEntry {
        DamageEntry {
            id: DamageEntryId::new(),
            batch_id: batch.id(),
            ingredient_id: batch.ingredient_id(),
            quantity_damaged: qty,
            quantity_requested: qty,
            reason: "spilled".to_string(),
            recorded_by: UserId::new(),
            recorded_at: chrono::Utc::now(),
        }
    }

    #[tokio::test]
    async fn ledger_filters_by_ingredient_in_record_order() {
        let (store, tomato) = seeded();
        let basil = Ingredient::new(IngredientId::new(), "Basil", CategoryId::new(), "g", 0, 2)
            .unwrap();
        store.upsert_ingredient(basil.clone()).unwrap();

        let t = receive(&tomato, date(2, 1), 10);
        let b = receive(&basil, date(2, 1), 10);
        store.insert_batch(t.clone()).await.unwrap();
        store.insert_batch(b.clone()).await.unwrap();

        store.record_damage(damage(&t, 1)).await.unwrap();
        store.record_damage(damage(&b, 2)).await.unwrap();
        let after = store.record_damage(damage(&t, 3)).await.unwrap();
        assert_eq!(after.quantity_remaining(), 6);

        let qty: Vec<_> = store
            .entries_for_ingredient(tomato.id())
            .await
            .unwrap()
            .iter()
            .map(|e| e.quantity_damaged)
            .collect();
        assert_eq!(qty, vec![1, 3]);
    }

    #[tokio::test]
    async fn failed_damage_write_leaves_batch_and_ledger_untouched() {
        let (store, tomato) = seeded();
        let b = receive(&tomato, date(2, 1), 10);
        store.insert_batch(b.clone()).await.unwrap();

        let entry = damage(&b, 4);
        store.record_damage(entry.clone()).await.unwrap();

        // Re-recording the same entry must not reduce the batch a second time.
        let err = store.record_damage(entry).await.unwrap_err();
        assert_eq!(err.kind(), "validation");

        // Over-claim fails on the batch; nothing is appended.
        let err = store.record_damage(damage(&b, 7)).await.unwrap_err();
        assert_eq!(err.kind(), "insufficient_stock");

        let err = store
            .record_damage(DamageEntry { batch_id: BatchId::new(), ..damage(&b, 1) })
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "not_found");

        assert_eq!(store.get_batch(b.id()).await.unwrap().unwrap().quantity_remaining(), 6);
        assert_eq!(store.entries_for_ingredient(tomato.id()).await.unwrap().len(), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_reductions_never_go_below_zero() {
        let (store, tomato) = seeded();
        let store = Arc::new(store);
        let b = receive(&tomato, date(2, 1), 10);
        store.insert_batch(b.clone()).await.unwrap();

        let tasks: Vec<_> = (0..24)
            .map(|_| {
                let store = store.clone();
                let id = b.id();
                tokio::spawn(async move { store.apply_reduction(id, 1).await })
            })
            .collect();

        let mut applied = 0;
        let mut refused = 0;
        for task in tasks {
            match task.await.unwrap() {
                Ok(batch) => {
                    assert!(batch.quantity_remaining() >= 0);
                    applied += 1;
                }
                Err(err) => {
                    assert_eq!(err.kind(), "insufficient_stock");
                    refused += 1;
                }
            }
        }

        assert_eq!(applied, 10);
        assert_eq!(refused, 14);
        assert_eq!(store.total_remaining(tomato.id()).await.unwrap(), 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_damage_keeps_one_entry_per_reduction() {
        let (store, tomato) = seeded();
        let store = Arc::new(store);
        let b = receive(&tomato, date(2, 1), 9);
        store.insert_batch(b.clone()).await.unwrap();

        let tasks: Vec<_> = (0..12)
            .map(|_| {
                let store = store.clone();
                let entry = damage(&b, 2);
                tokio::spawn(async move { store.record_damage(entry).await })
            })
            .collect();
        for task in tasks {
            let _ = task.await.unwrap();
        }

        let entries = store.entries_for_ingredient(tomato.id()).await.unwrap();
        let written_off: i64 = entries.iter().map(|e| e.quantity_damaged).sum();
        let remaining = store.get_batch(b.id()).await.unwrap().unwrap().quantity_remaining();
        assert_eq!(entries.len(), 4);
        assert_eq!(remaining, 1);
        assert_eq!(written_off + remaining, 9);
    }
}
