//! `StockService`: the only entry point external callers use.
//!
//! Callers hand over raw identifiers (route params, form fields, session
//! values); the service coerces them into key types, attaches the acting
//! user from the caller's session, and delegates to the batch store, the
//! damage recorder, and the warning aggregator. "Today" always comes from the
//! injected clock.

use std::sync::Arc;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use tracing::{instrument, warn};

use larder_core::{BatchId, DomainError, DomainResult, IngredientId, UserId};
use larder_stock::{DamageEntry, DamageLine, DamagePolicy, DroppedLine, StockBatch, StockWarningSet};

use crate::clock::{Clock, SystemClock};
use crate::config::StockConfig;
use crate::damage::{DamageReceipt, DamageRecorder};
use crate::error::StockResult;
use crate::store::{BatchStore, DamageLedger, InMemoryStockStore, IngredientCatalog, PostgresStockStore};
use crate::warnings::WarningAggregator;

/// A damaged quantity as it arrives: a JSON number or raw form text.
///
/// Coerced per line, so one unreadable quantity does not sink the whole body.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum QuantityInput {
    Whole(i64),
    Fractional(f64),
    Text(String),
}

impl QuantityInput {
    /// Whole-unit quantity, or `InvalidAmount`. Sign is checked later.
    pub fn coerce(&self) -> DomainResult<i64> {
        match self {
            QuantityInput::Whole(n) => Ok(*n),
            QuantityInput::Fractional(f) if f.fract() == 0.0 && f.abs() < i64::MAX as f64 => {
                Ok(*f as i64)
            }
            QuantityInput::Fractional(f) => Err(DomainError::invalid_amount(format!(
                "damaged quantity must be a whole number (got {f})"
            ))),
            QuantityInput::Text(raw) => raw.trim().parse().map_err(|_| {
                DomainError::invalid_amount(format!("damaged quantity is not a number: {raw:?}"))
            }),
        }
    }
}

impl From<i64> for QuantityInput {
    fn from(value: i64) -> Self {
        QuantityInput::Whole(value)
    }
}

impl From<&str> for QuantityInput {
    fn from(value: &str) -> Self {
        QuantityInput::Text(value.to_string())
    }
}

impl From<String> for QuantityInput {
    fn from(value: String) -> Self {
        QuantityInput::Text(value)
    }
}

/// A damage claim line as submitted by the UI, before coercion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DamageLineInput {
    pub batch_id: String,
    #[serde(default)]
    pub quantity_damaged: Option<QuantityInput>,
    #[serde(default)]
    pub reason: Option<String>,
}

impl DamageLineInput {
    pub fn new(batch_id: impl Into<String>, quantity_damaged: impl Into<QuantityInput>) -> Self {
        Self {
            batch_id: batch_id.into(),
            quantity_damaged: Some(quantity_damaged.into()),
            reason: None,
        }
    }

    pub fn with_reason(mut self, reason: impl Into<String>) -> Self {
        self.reason = Some(reason.into());
        self
    }

    /// Quantity first, then batch id, matching the order lines are validated in.
    fn coerce(&self) -> DomainResult<DamageLine> {
        let quantity_damaged = self
            .quantity_damaged
            .as_ref()
            .ok_or_else(|| DomainError::invalid_amount("damaged quantity is required"))?
            .coerce()?;
        let batch_id: BatchId = self.batch_id.parse()?;

        Ok(DamageLine {
            batch_id,
            quantity_damaged,
            reason: self.reason.clone(),
        })
    }
}

pub struct StockService {
    catalog: Arc<dyn IngredientCatalog>,
    batches: Arc<dyn BatchStore>,
    ledger: Arc<dyn DamageLedger>,
    clock: Arc<dyn Clock>,
    recorder: DamageRecorder,
    aggregator: WarningAggregator,
}

impl StockService {
    pub fn new(
        catalog: Arc<dyn IngredientCatalog>,
        batches: Arc<dyn BatchStore>,
        ledger: Arc<dyn DamageLedger>,
        clock: Arc<dyn Clock>,
        config: &StockConfig,
    ) -> Self {
        let recorder = DamageRecorder::new(
            batches.clone(),
            ledger.clone(),
            clock.clone(),
            config.damage_policy,
        );
        let aggregator = WarningAggregator::new(catalog.clone(), batches.clone());

        Self {
            catalog,
            batches,
            ledger,
            clock,
            recorder,
            aggregator,
        }
    }

    /// Wire every collaborator to one in-memory store.
    pub fn in_memory(
        store: Arc<InMemoryStockStore>,
        clock: Arc<dyn Clock>,
        config: &StockConfig,
    ) -> Self {
        Self::new(store.clone(), store.clone(), store, clock, config)
    }

    /// Wire every collaborator to one Postgres store, using the system clock.
    pub fn postgres(store: PostgresStockStore, config: &StockConfig) -> Self {
        let store = Arc::new(store);
        Self::new(
            store.clone(),
            store.clone(),
            store,
            Arc::new(SystemClock),
            config,
        )
    }

    pub fn damage_policy(&self) -> DamagePolicy {
        self.recorder.policy()
    }

    /// Batches of one ingredient, oldest-expiring first.
    #[instrument(skip(self), err)]
    pub async fn list_batches_for_ingredient(&self, ingredient_id: &str) -> StockResult<Vec<StockBatch>> {
        let ingredient_id: IngredientId = ingredient_id.parse()?;
        self.catalog.get_ingredient(ingredient_id).await?;
        self.batches.list_batches(ingredient_id).await
    }

    /// Record damage on behalf of the session user.
    ///
    /// A missing, blank, or malformed session identity is `Unauthenticated`.
    /// Lines whose quantity or batch id cannot be read are treated like any
    /// other invalid line: dropped under the clamp policy, failing the
    /// submission (`InvalidAmount` / `InvalidId`) under the reject policy.
    #[instrument(skip(self, lines), fields(lines = lines.len()), err)]
    pub async fn submit_damage(
        &self,
        session_user: Option<&str>,
        lines: Vec<DamageLineInput>,
    ) -> StockResult<DamageReceipt> {
        let actor = session_user
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .and_then(|s| s.parse::<UserId>().ok())
            .ok_or(DomainError::Unauthenticated)?;

        let mut coerced = Vec::with_capacity(lines.len());
        let mut positions = Vec::with_capacity(lines.len());
        let mut dropped = Vec::new();

        for (idx, input) in lines.iter().enumerate() {
            match input.coerce() {
                Ok(line) => {
                    coerced.push(line);
                    positions.push(idx);
                }
                Err(err) => match self.recorder.policy() {
                    DamagePolicy::Reject => return Err(err.into()),
                    DamagePolicy::Clamp => {
                        warn!(line = idx, batch_id = %input.batch_id, kind = err.kind(), "damage line dropped: unreadable input");
                        dropped.push(DroppedLine::new(idx, &err));
                    }
                },
            }
        }

        let mut receipt = self.recorder.record(Some(actor), coerced).await?;

        // Recorder positions are relative to the coerced lines.
        for line in &mut receipt.dropped {
            if let Some(&original) = positions.get(line.line) {
                line.line = original;
            }
        }
        receipt.dropped.extend(dropped);
        receipt.dropped.sort_by_key(|d| d.line);

        Ok(receipt)
    }

    /// Current warnings as of `reference`, or the clock's today.
    pub async fn warnings(&self, reference: Option<NaiveDate>) -> StockResult<StockWarningSet> {
        let reference = reference.unwrap_or_else(|| self.clock.today());
        self.aggregator.collect(reference).await
    }

    /// Damage audit history of one ingredient, oldest first.
    #[instrument(skip(self), err)]
    pub async fn damage_history(&self, ingredient_id: &str) -> StockResult<Vec<DamageEntry>> {
        let ingredient_id: IngredientId = ingredient_id.parse()?;
        self.catalog.get_ingredient(ingredient_id).await?;
        self.ledger.entries_for_ingredient(ingredient_id).await
    }
}
