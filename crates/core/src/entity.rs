//! Entity trait: records tracked by identity rather than by value.
//!
//! Ingredients and stock batches change over time (renames, reductions) but
//! remain the same record; audit entries reference them by id only.

/// Entity marker + minimal interface.
pub trait Entity {
    /// Strongly-typed entity identifier.
    type Id: Copy + Eq + core::hash::Hash + core::fmt::Debug;

    /// Returns the entity identifier.
    fn id(&self) -> Self::Id;

    /// Two snapshots describe the same record when their ids match,
    /// regardless of how their attributes have diverged.
    fn same_identity(&self, other: &Self) -> bool {
        self.id() == other.id()
    }
}
