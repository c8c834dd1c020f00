//! Quota Policy.

use std::collections::{BTreeSet, HashMap};

use crate::ids::RoleId;
use crate::model::Quota;

/// Maximum quota among `roles`.
///
/// Roles without an entry in `table` carry no quota; `None` means the
/// identity holds no role with a configured quota.
#[must_use]
pub fn max_quota(roles: &BTreeSet<RoleId>, table: &HashMap<RoleId, Quota>) -> Option<Quota> {
    roles.iter().filter_map(|id| table.get(id).copied()).max()
}
