//! Warning aggregation across the whole catalog.

use std::sync::Arc;

use chrono::NaiveDate;
use tracing::{debug, instrument};

use larder_core::Entity;
use larder_stock::{IngredientStock, StockWarningSet, derive_warnings};

use crate::error::StockResult;
use crate::store::{BatchStore, IngredientCatalog};

/// Reads every ingredient and its batches, then derives warnings for one
/// reference date. Results are never cached.
pub struct WarningAggregator {
    catalog: Arc<dyn IngredientCatalog>,
    batches: Arc<dyn BatchStore>,
}

impl WarningAggregator {
    pub fn new(catalog: Arc<dyn IngredientCatalog>, batches: Arc<dyn BatchStore>) -> Self {
        Self { catalog, batches }
    }

    #[instrument(skip(self), fields(reference = %reference), err)]
    pub async fn collect(&self, reference: NaiveDate) -> StockResult<StockWarningSet> {
        let ingredients = self.catalog.list_ingredients().await?;

        let mut stock = Vec::with_capacity(ingredients.len());
        for ingredient in ingredients {
            let batches = self.batches.list_batches(ingredient.id()).await?;
            stock.push(IngredientStock { ingredient, batches });
        }

        let set = derive_warnings(&stock, reference);
        debug!(
            ingredients = stock.len(),
            low_stock = set.low_stock.len(),
            expiring = set.expiring.len(),
            expired = set.expired.len(),
            "stock warnings derived"
        );
        Ok(set)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use larder_core::{BatchId, CategoryId, IngredientId};
    use larder_stock::{Ingredient, StockBatch};

    use crate::store::InMemoryStockStore;

    fn date(m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, m, d).unwrap()
    }

    async fn seed(
        store: &InMemoryStockStore,
        name: &str,
        minimum: i64,
        lead: i64,
        lots: &[(NaiveDate, NaiveDate, i64, i64)],
    ) -> Ingredient {
        let ingredient =
            Ingredient::new(IngredientId::new(), name, CategoryId::new(), "kg", minimum, lead)
                .unwrap();
        store.upsert_ingredient(ingredient.clone()).unwrap();
        for &(received_on, expires_on, received, remaining) in lots {
            let b = StockBatch::restore(
                BatchId::new(),
                ingredient.id(),
                received_on,
                expires_on,
                received,
                remaining,
            )
            .unwrap();
            store.insert_batch(b).await.unwrap();
        }
        ingredient
    }

    #[tokio::test]
    async fn collects_low_stock_and_expiring_across_ingredients() {
        let store = InMemoryStockStore::arc();
        seed(&store, "Chicken Breast", 5, 7, &[(date(6, 1), date(8, 1), 10, 3)]).await;
        let milk = seed(&store, "Milk", 0, 7, &[(date(6, 1), date(6, 12), 20, 20)]).await;
        seed(&store, "Rice", 1, 7, &[(date(6, 1), date(12, 1), 20, 20)]).await;

        let aggregator = WarningAggregator::new(store.clone(), store.clone());
        let set = aggregator.collect(date(6, 10)).await.unwrap();

        assert_eq!(set.low_stock.len(), 1);
        assert_eq!(set.low_stock[0].name, "Chicken Breast");
        assert_eq!(set.low_stock[0].total_remaining, 3);
        assert_eq!(set.low_stock[0].unit, "kg");

        assert_eq!(set.expiring.len(), 1);
        assert_eq!(set.expiring[0].ingredient_id, milk.id());
        assert_eq!(set.expiring[0].days_until_expiry, 2);
        assert!(set.expired.is_empty());
    }

    #[tokio::test]
    async fn empty_catalog_yields_empty_set() {
        let store = InMemoryStockStore::arc();
        let set = WarningAggregator::new(store.clone(), store)
            .collect(date(1, 1))
            .await
            .unwrap();
        assert!(set.is_empty());
    }

    #[tokio::test]
    async fn reference_before_all_receipts_with_healthy_stock_is_quiet() {
        let store = InMemoryStockStore::arc();
        seed(&store, "Flour", 5, 14, &[(date(6, 1), date(12, 31), 10, 10)]).await;
        seed(&store, "Sugar", 2, 14, &[(date(5, 1), date(11, 30), 2, 2)]).await;

        let set = WarningAggregator::new(store.clone(), store)
            .collect(date(1, 1))
            .await
            .unwrap();
        assert!(set.is_empty());
    }
}
