//! Role Differ.
//!
//! Computes which directory group memberships must be added and removed to
//! move an identity from its stored baseline to its live role set.

use std::collections::BTreeSet;

use crate::model::RoleName;

/// Result of diffing a live role set against a baseline.
///
/// Sets are ordered so that mutations are applied in a deterministic order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RoleDiff {
    /// Roles held live but missing from the baseline.
    pub to_add: BTreeSet<RoleName>,
    /// Roles in the baseline that are no longer held.
    pub to_remove: BTreeSet<RoleName>,
}

impl RoleDiff {
    /// Whether the two sets were already equal.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.to_add.is_empty() && self.to_remove.is_empty()
    }
}

/// `to_add = live - baseline`, `to_remove = baseline - live`.
#[must_use]
pub fn diff(live: &BTreeSet<RoleName>, baseline: &BTreeSet<RoleName>) -> RoleDiff {
    RoleDiff {
        to_add: live.difference(baseline).cloned().collect(),
        to_remove: baseline.difference(live).cloned().collect(),
    }
}
