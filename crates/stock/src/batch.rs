use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use larder_core::{BatchId, DomainError, DomainResult, Entity, IngredientId};

/// A discrete lot of one ingredient, received on one date with one expiry date.
///
/// `quantity_remaining` only ever decreases. An exhausted batch (remaining 0)
/// is kept for audit history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockBatch {
    id: BatchId,
    ingredient_id: IngredientId,
    received_on: NaiveDate,
    expires_on: NaiveDate,
    quantity_received: i64,
    quantity_remaining: i64,
}

impl StockBatch {
    /// New batch from a stock receipt: everything received is still on hand.
    pub fn receive(
        id: BatchId,
        ingredient_id: IngredientId,
        received_on: NaiveDate,
        expires_on: NaiveDate,
        quantity_received: i64,
    ) -> DomainResult<Self> {
        if quantity_received < 1 {
            return Err(DomainError::invalid_amount(
                "received quantity must be at least 1",
            ));
        }
        if expires_on < received_on {
            return Err(DomainError::validation(
                "expiry date cannot precede received date",
            ));
        }

        Ok(Self {
            id,
            ingredient_id,
            received_on,
            expires_on,
            quantity_received,
            quantity_remaining: quantity_received,
        })
    }

    /// Rebuild a batch from persisted state.
    ///
    /// Receipt rules still hold, plus `0 <= remaining <= received`.
    pub fn restore(
        id: BatchId,
        ingredient_id: IngredientId,
        received_on: NaiveDate,
        expires_on: NaiveDate,
        quantity_received: i64,
        quantity_remaining: i64,
    ) -> DomainResult<Self> {
        let mut batch = Self::receive(id, ingredient_id, received_on, expires_on, quantity_received)?;
        if quantity_remaining < 0 || quantity_remaining > quantity_received {
            return Err(DomainError::validation(format!(
                "batch {id}: remaining {quantity_remaining} outside 0..={quantity_received}"
            )));
        }

        batch.quantity_remaining = quantity_remaining;
        Ok(batch)
    }

    pub fn ingredient_id(&self) -> IngredientId {
        self.ingredient_id
    }

    pub fn received_on(&self) -> NaiveDate {
        self.received_on
    }

    pub fn expires_on(&self) -> NaiveDate {
        self.expires_on
    }

    pub fn quantity_received(&self) -> i64 {
        self.quantity_received
    }

    pub fn quantity_remaining(&self) -> i64 {
        self.quantity_remaining
    }

    pub fn is_exhausted(&self) -> bool {
        self.quantity_remaining == 0
    }

    /// Whole calendar days from `reference` to expiry; negative once expired.
    pub fn days_until_expiry(&self, reference: NaiveDate) -> i64 {
        (self.expires_on - reference).num_days()
    }

    /// Decrement with floor check. State is untouched on error.
    pub fn reduce(&mut self, amount: i64) -> DomainResult<()> {
        if amount <= 0 {
            return Err(DomainError::invalid_amount(format!(
                "reduction must be positive (got {amount})"
            )));
        }
        if amount > self.quantity_remaining {
            return Err(DomainError::insufficient(amount, self.quantity_remaining));
        }

        self.quantity_remaining -= amount;
        Ok(())
    }

    /// Sort key for oldest-expiring-first listings.
    ///
    /// Received date and id break ties so listings are stable across stores.
    pub fn expiry_order_key(&self) -> (NaiveDate, NaiveDate, BatchId) {
        (self.expires_on, self.received_on, self.id)
    }
}

impl Entity for StockBatch {
    type Id = BatchId;

    fn id(&self) -> Self::Id {
        self.id
    }
}

/// Sum of remaining quantity across batches (0 for none).
pub fn total_remaining<'a>(batches: impl IntoIterator<Item = &'a StockBatch>) -> i64 {
    batches.into_iter().map(|b| b.quantity_remaining).sum()
}
