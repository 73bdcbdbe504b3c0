//! Ingredient stock domain module.
//!
//! Batch-level stock rules (receipt, reduction, damage planning, warning
//! derivation), implemented purely as deterministic domain logic (no IO, no
//! HTTP, no storage).

pub mod batch;
pub mod damage;
pub mod ingredient;
pub mod warnings;

pub use batch::{StockBatch, total_remaining};
pub use damage::{
    DEFAULT_DAMAGE_REASON, DamageEntry, DamageLine, DamagePolicy, DroppedLine, PlannedDamage,
    normalize_reason, plan_damage_line,
};
pub use ingredient::Ingredient;
pub use warnings::{
    ExpiringBatchWarning, IngredientStock, LowStockWarning, StockWarningSet, derive_warnings,
};
