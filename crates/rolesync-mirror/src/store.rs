//! The mirror interface consumed by the engine.

use std::collections::{BTreeSet, HashMap};

use async_trait::async_trait;
use rolesync_core::{IdentityId, Profile, Quota, RoleId, RoleName};

use crate::error::MirrorResult;

/// Last-synced state of every identity, plus the role catalogue.
#[async_trait]
pub trait MirrorStore: Send + Sync {
    /// Role names last written as the identity's baseline. Empty for an
    /// unknown identity.
    async fn get_baseline_roles(&self, identity: IdentityId) -> MirrorResult<BTreeSet<RoleName>>;

    /// Replace the identity's baseline.
    async fn set_baseline_roles(
        &self,
        identity: IdentityId,
        roles: &BTreeSet<RoleName>,
    ) -> MirrorResult<()>;

    /// Stored username and email. An empty `email` means none is stored.
    async fn get_profile(&self, identity: IdentityId) -> MirrorResult<Option<Profile>>;

    /// Create the identity's record if absent. Returns whether it was
    /// created; an existing record is left untouched.
    async fn ensure_profile(&self, identity: IdentityId, profile: &Profile) -> MirrorResult<bool>;

    /// Record the current name of a role.
    async fn upsert_role_name(&self, role: RoleId, name: &str) -> MirrorResult<()>;

    /// Every known role id with its last recorded name.
    async fn get_all_role_names(&self) -> MirrorResult<HashMap<RoleId, RoleName>>;

    /// Roles that carry a configured quota.
    async fn get_role_quotas(&self) -> MirrorResult<HashMap<RoleId, Quota>>;
}
