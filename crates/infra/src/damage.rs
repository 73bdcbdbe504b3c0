//! Damage submission pipeline.
//!
//! ```text
//! actor check ─▶ plan every line (fresh reads, policy) ─▶ apply in order
//!                                                         └─ DamageLedger::record_damage
//!                                                            (reduction + entry, one unit)
//! ```
//!
//! Planning happens before any mutation and tracks earlier lines against the
//! same batch, so an ordinary validation failure never leaves partial state.
//! A reduction that loses a race with another writer at apply time fails
//! with `InsufficientStock` and is not retried; lines applied before it stay
//! applied, each with its ledger entry. There is no cross-line transaction,
//! but a line's reduction never lands without its entry.

use std::collections::HashMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{info, instrument, warn};

use larder_core::{BatchId, DomainError, UserId};
use larder_stock::{DamageEntry, DamageLine, DamagePolicy, DroppedLine, PlannedDamage, StockBatch, plan_damage_line};

use crate::clock::Clock;
use crate::error::StockResult;
use crate::store::{BatchStore, DamageLedger};

/// Outcome of an accepted damage submission.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DamageReceipt {
    pub applied: usize,
    pub entries: Vec<DamageEntry>,
    /// Lines discarded under the clamp policy, by submission position.
    #[serde(default)]
    pub dropped: Vec<DroppedLine>,
}

pub struct DamageRecorder {
    batches: Arc<dyn BatchStore>,
    ledger: Arc<dyn DamageLedger>,
    clock: Arc<dyn Clock>,
    policy: DamagePolicy,
}

impl DamageRecorder {
    pub fn new(
        batches: Arc<dyn BatchStore>,
        ledger: Arc<dyn DamageLedger>,
        clock: Arc<dyn Clock>,
        policy: DamagePolicy,
    ) -> Self {
        Self {
            batches,
            ledger,
            clock,
            policy,
        }
    }

    pub fn policy(&self) -> DamagePolicy {
        self.policy
    }

    /// Validate and apply a submission from one acting user.
    ///
    /// Fails with `Unauthenticated` when `actor` is absent and with
    /// `EmptySubmission` when no line survives validation; in both cases
    /// nothing is mutated.
    #[instrument(skip(self, lines), fields(policy = %self.policy, lines = lines.len()), err)]
    pub async fn record(
        &self,
        actor: Option<UserId>,
        lines: Vec<DamageLine>,
    ) -> StockResult<DamageReceipt> {
        let actor = actor.ok_or(DomainError::Unauthenticated)?;

        let (planned, dropped) = self.plan(&lines).await?;
        if planned.is_empty() {
            warn!(dropped = dropped.len(), "damage submission had no eligible lines");
            return Err(DomainError::EmptySubmission.into());
        }

        let recorded_at = self.clock.now();
        let mut entries = Vec::with_capacity(planned.len());
        for plan in &planned {
            let entry = DamageEntry::record(plan, actor, recorded_at);
            let batch = self.ledger.record_damage(entry.clone()).await?;

            info!(
                batch_id = %plan.batch_id,
                ingredient_id = %plan.ingredient_id,
                quantity = plan.quantity,
                requested = plan.quantity_requested,
                remaining = batch.quantity_remaining(),
                recorded_by = %actor,
                "damage applied"
            );
            entries.push(entry);
        }

        Ok(DamageReceipt {
            applied: entries.len(),
            entries,
            dropped,
        })
    }

    /// Validate every line in order against fresh batch reads.
    ///
    /// Each batch is read once per submission; accepted lines are deducted
    /// from the working copy so later lines see what earlier lines will take.
    async fn plan(&self, lines: &[DamageLine]) -> StockResult<(Vec<PlannedDamage>, Vec<DroppedLine>)> {
        let mut working: HashMap<BatchId, Option<StockBatch>> = HashMap::new();
        let mut planned = Vec::with_capacity(lines.len());
        let mut dropped = Vec::new();

        for (idx, line) in lines.iter().enumerate() {
            if !working.contains_key(&line.batch_id) {
                let fresh = self.batches.get_batch(line.batch_id).await?;
                working.insert(line.batch_id, fresh);
            }
            let current = working.get_mut(&line.batch_id).and_then(Option::as_mut);

            match plan_damage_line(line, current.as_deref(), self.policy) {
                Ok(plan) => {
                    if let Some(batch) = current {
                        batch.reduce(plan.quantity)?;
                    }
                    if plan.was_clamped() {
                        warn!(
                            line = idx,
                            batch_id = %plan.batch_id,
                            requested = plan.quantity_requested,
                            clamped_to = plan.quantity,
                            "damage quantity clamped to remaining stock"
                        );
                    }
                    planned.push(plan);
                }
                Err(err) => match self.policy {
                    DamagePolicy::Reject => return Err(err.into()),
                    DamagePolicy::Clamp => {
                        warn!(line = idx, batch_id = %line.batch_id, kind = err.kind(), "damage line dropped");
                        dropped.push(DroppedLine::new(idx, &err));
                    }
                },
            }
        }

        Ok((planned, dropped))
    }
}
