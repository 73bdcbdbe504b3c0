//! Damage write-offs: claim lines, validation policy, and audit entries.

use core::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use larder_core::{BatchId, DamageEntryId, DomainError, DomainResult, Entity, IngredientId, UserId};

use crate::batch::StockBatch;

/// Reason recorded when a claim line carries none.
pub const DEFAULT_DAMAGE_REASON: &str = "No reason provided";

/// How invalid claim lines are treated.
///
/// `Clamp` keeps the legacy behavior: a line asking for more than the batch
/// holds is cut down to what remains, and lines that cannot be applied at
/// all are dropped. `Reject` fails the whole submission on the first invalid
/// line instead.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DamagePolicy {
    #[default]
    Clamp,
    Reject,
}

impl DamagePolicy {
    pub fn as_str(self) -> &'static str {
        match self {
            DamagePolicy::Clamp => "clamp",
            DamagePolicy::Reject => "reject",
        }
    }
}

impl core::fmt::Display for DamagePolicy {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DamagePolicy {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "clamp" => Ok(DamagePolicy::Clamp),
            "reject" => Ok(DamagePolicy::Reject),
            other => Err(DomainError::validation(format!(
                "damage policy must be one of: clamp, reject (got {other:?})"
            ))),
        }
    }
}

/// One claim line of a damage submission.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DamageLine {
    pub batch_id: BatchId,
    pub quantity_damaged: i64,
    #[serde(default)]
    pub reason: Option<String>,
}

/// A validated line, ready to be applied.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlannedDamage {
    pub batch_id: BatchId,
    pub ingredient_id: IngredientId,
    pub quantity_requested: i64,
    /// Amount to write off; below `quantity_requested` only when clamped.
    pub quantity: i64,
    pub reason: String,
}

impl PlannedDamage {
    pub fn was_clamped(&self) -> bool {
        self.quantity < self.quantity_requested
    }
}

/// A submission line that the clamp policy discarded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DroppedLine {
    /// Zero-based position in the submission.
    pub line: usize,
    pub kind: String,
    pub message: String,
}

impl DroppedLine {
    pub fn new(line: usize, error: &DomainError) -> Self {
        Self {
            line,
            kind: error.kind().to_string(),
            message: error.to_string(),
        }
    }
}

/// Blank or absent reasons become [`DEFAULT_DAMAGE_REASON`].
pub fn normalize_reason(reason: Option<&str>) -> String {
    match reason.map(str::trim) {
        Some(r) if !r.is_empty() => r.to_string(),
        _ => DEFAULT_DAMAGE_REASON.to_string(),
    }
}

/// Validate one claim line against the batch's current state.
///
/// `batch` must be a fresh read. Errors carry the failure kind; whether an
/// error drops the line or aborts the submission is the caller's decision.
pub fn plan_damage_line(
    line: &DamageLine,
    batch: Option<&StockBatch>,
    policy: DamagePolicy,
) -> DomainResult<PlannedDamage> {
    if line.quantity_damaged <= 0 {
        return Err(DomainError::invalid_amount(format!(
            "damaged quantity must be a positive integer (got {})",
            line.quantity_damaged
        )));
    }

    let batch = batch.ok_or_else(|| DomainError::not_found(format!("batch {}", line.batch_id)))?;
    if batch.id() != line.batch_id {
        return Err(DomainError::not_found(format!("batch {}", line.batch_id)));
    }

    let remaining = batch.quantity_remaining();
    let quantity = if line.quantity_damaged <= remaining {
        line.quantity_damaged
    } else {
        match policy {
            DamagePolicy::Clamp if remaining > 0 => remaining,
            _ => return Err(DomainError::insufficient(line.quantity_damaged, remaining)),
        }
    };

    Ok(PlannedDamage {
        batch_id: line.batch_id,
        ingredient_id: batch.ingredient_id(),
        quantity_requested: line.quantity_damaged,
        quantity,
        reason: normalize_reason(line.reason.as_deref()),
    })
}

/// Append-only audit record of one applied damage line.
///
/// `ingredient_id` is stored alongside `batch_id` so history stays readable
/// even if the batch record is purged.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DamageEntry {
    pub id: DamageEntryId,
    pub batch_id: BatchId,
    pub ingredient_id: IngredientId,
    pub quantity_damaged: i64,
    pub quantity_requested: i64,
    pub reason: String,
    pub recorded_by: UserId,
    pub recorded_at: DateTime<Utc>,
}

impl DamageEntry {
    pub fn record(planned: &PlannedDamage, recorded_by: UserId, recorded_at: DateTime<Utc>) -> Self {
        Self {
            id: DamageEntryId::new(),
            batch_id: planned.batch_id,
            ingredient_id: planned.ingredient_id,
            quantity_damaged: planned.quantity,
            quantity_requested: planned.quantity_requested,
            reason: planned.reason.clone(),
            recorded_by,
            recorded_at,
        }
    }
}

impl Entity for DamageEntry {
    type Id = DamageEntryId;

    fn id(&self) -> Self::Id {
        self.id
    }
}
