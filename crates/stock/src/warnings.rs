//! Low-stock and expiry warnings derived from current batch state.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use larder_core::{BatchId, Entity, IngredientId};

use crate::batch::{StockBatch, total_remaining};
use crate::ingredient::Ingredient;

/// An ingredient together with all of its batches, as read for one evaluation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IngredientStock {
    pub ingredient: Ingredient,
    pub batches: Vec<StockBatch>,
}

impl IngredientStock {
    pub fn total_remaining(&self) -> i64 {
        total_remaining(&self.batches)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LowStockWarning {
    pub ingredient_id: IngredientId,
    pub name: String,
    pub total_remaining: i64,
    pub unit: String,
    pub minimum_stock: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExpiringBatchWarning {
    pub ingredient_id: IngredientId,
    pub name: String,
    pub batch_id: BatchId,
    pub expires_on: NaiveDate,
    pub quantity_remaining: i64,
    /// Negative for batches already past expiry.
    pub days_until_expiry: i64,
}

/// Warnings for one evaluation. Recomputed per request; never cached.
///
/// All collections are always present; an empty set means "no warnings".
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockWarningSet {
    #[serde(default)]
    pub low_stock: Vec<LowStockWarning>,
    #[serde(default)]
    pub expiring: Vec<ExpiringBatchWarning>,
    #[serde(default)]
    pub expired: Vec<ExpiringBatchWarning>,
}

impl StockWarningSet {
    pub fn is_empty(&self) -> bool {
        self.low_stock.is_empty() && self.expiring.is_empty() && self.expired.is_empty()
    }

    pub fn len(&self) -> usize {
        self.low_stock.len() + self.expiring.len() + self.expired.len()
    }
}

/// Scan ingredients in the given order and collect warnings as of `reference`.
///
/// - low stock: total remaining strictly below the ingredient's minimum
/// - expiring: batches with stock and `0 <= days_until_expiry <= lead days`
/// - expired: batches with stock and `days_until_expiry < 0`
pub fn derive_warnings<'a>(
    stock: impl IntoIterator<Item = &'a IngredientStock>,
    reference: NaiveDate,
) -> StockWarningSet {
    let mut set = StockWarningSet::default();

    for entry in stock {
        let ingredient = &entry.ingredient;

        let total = entry.total_remaining();
        if total < ingredient.minimum_stock() {
            set.low_stock.push(LowStockWarning {
                ingredient_id: ingredient.id(),
                name: ingredient.name().to_string(),
                total_remaining: total,
                unit: ingredient.unit().to_string(),
                minimum_stock: ingredient.minimum_stock(),
            });
        }

        for batch in entry.batches.iter().filter(|b| !b.is_exhausted()) {
            let days = batch.days_until_expiry(reference);
            if days > ingredient.expiry_warning_days() {
                continue;
            }

            let warning = ExpiringBatchWarning {
                ingredient_id: ingredient.id(),
                name: ingredient.name().to_string(),
                batch_id: batch.id(),
                expires_on: batch.expires_on(),
                quantity_remaining: batch.quantity_remaining(),
                days_until_expiry: days,
            };

            if days < 0 {
                set.expired.push(warning);
            } else {
                set.expiring.push(warning);
            }
        }
    }

    set
}

#[cfg(test)]
mod tests {
    use super::*;
    use larder_core::CategoryId;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn ingredient(name: &str, unit: &str, minimum: i64, lead: i64) -> Ingredient {
        Ingredient::new(IngredientId::new(), name, CategoryId::new(), unit, minimum, lead).unwrap()
    }

    fn lot(
        ingredient: &Ingredient,
        received_on: NaiveDate,
        expires_on: NaiveDate,
        received: i64,
        remaining: i64,
    ) -> StockBatch {
        StockBatch::restore(
            BatchId::new(),
            ingredient.id(),
            received_on,
            expires_on,
            received,
            remaining,
        )
        .unwrap()
    }

    #[test]
    fn chicken_breast_below_threshold_is_low_stock() {
        let chicken = ingredient("Chicken Breast", "kg", 5, 7);
        let batches = vec![lot(&chicken, date(2024, 6, 1), date(2024, 7, 1), 10, 3)];
        let stock = vec![IngredientStock {
            ingredient: chicken.clone(),
            batches,
        }];

        let set = derive_warnings(&stock, date(2024, 6, 2));

        assert_eq!(set.low_stock.len(), 1);
        let w = &set.low_stock[0];
        assert_eq!(w.name, "Chicken Breast");
        assert_eq!(w.total_remaining, 3);
        assert_eq!(w.unit, "kg");
        assert!(set.expiring.is_empty());
    }

    #[test]
    fn batch_expiring_in_two_days_is_flagged() {
        let milk = ingredient("Milk", "l", 0, 7);
        let today = date(2024, 6, 10);
        let b = lot(&milk, date(2024, 6, 1), date(2024, 6, 12), 20, 20);
        let batch_id = b.id();
        let stock = vec![IngredientStock {
            ingredient: milk,
            batches: vec![b],
        }];

        let set = derive_warnings(&stock, today);

        assert_eq!(set.expiring.len(), 1);
        assert_eq!(set.expiring[0].batch_id, batch_id);
        assert_eq!(set.expiring[0].days_until_expiry, 2);
        assert!(set.low_stock.is_empty());
    }

    #[test]
    fn window_bounds_are_inclusive() {
        let cream = ingredient("Cream", "l", 0, 3);
        let today = date(2024, 6, 10);
        let stock = vec![IngredientStock {
            batches: vec![
                lot(&cream, date(2024, 6, 1), date(2024, 6, 10), 5, 5),
                lot(&cream, date(2024, 6, 1), date(2024, 6, 13), 5, 5),
                lot(&cream, date(2024, 6, 1), date(2024, 6, 14), 5, 5),
            ],
            ingredient: cream,
        }];

        let set = derive_warnings(&stock, today);
        let days: Vec<_> = set.expiring.iter().map(|w| w.days_until_expiry).collect();
        assert_eq!(days, vec![0, 3]);
    }

    #[test]
    fn past_expiry_batches_are_reported_separately() {
        let eggs = ingredient("Eggs", "pcs", 0, 5);
        let stock = vec![IngredientStock {
            batches: vec![lot(&eggs, date(2024, 5, 1), date(2024, 6, 1), 30, 12)],
            ingredient: eggs,
        }];

        let set = derive_warnings(&stock, date(2024, 6, 4));
        assert!(set.expiring.is_empty());
        assert_eq!(set.expired.len(), 1);
        assert_eq!(set.expired[0].days_until_expiry, -3);
    }

    #[test]
    fn exhausted_batches_never_warn_about_expiry() {
        let basil = ingredient("Basil", "g", 0, 5);
        let stock = vec![IngredientStock {
            batches: vec![
                lot(&basil, date(2024, 6, 1), date(2024, 6, 3), 100, 0),
                lot(&basil, date(2024, 5, 1), date(2024, 5, 20), 100, 0),
            ],
            ingredient: basil,
        }];

        let set = derive_warnings(&stock, date(2024, 6, 2));
        assert!(set.is_empty());
    }

    #[test]
    fn well_stocked_future_batches_produce_no_warnings() {
        let rice = ingredient("Rice", "kg", 10, 14);
        let flour = ingredient("Flour", "kg", 5, 30);
        let stock = vec![
            IngredientStock {
                batches: vec![lot(&rice, date(2024, 6, 1), date(2025, 6, 1), 50, 40)],
                ingredient: rice,
            },
            IngredientStock {
                batches: vec![lot(&flour, date(2024, 6, 5), date(2025, 1, 1), 5, 5)],
                ingredient: flour,
            },
        ];

        // Earlier than every received date.
        let set = derive_warnings(&stock, date(2024, 1, 1));
        assert!(set.is_empty());
        assert_eq!(set.len(), 0);
    }

    #[test]
    fn ingredient_without_batches_counts_zero_stock() {
        let salt = ingredient("Salt", "kg", 1, 0);
        let stock = vec![IngredientStock {
            ingredient: salt,
            batches: vec![],
        }];

        let set = derive_warnings(&stock, date(2024, 1, 1));
        assert_eq!(set.low_stock.len(), 1);
        assert_eq!(set.low_stock[0].total_remaining, 0);
    }
}
