//! POSIX Policy.
//!
//! Tier classification is driven by two configured role ids, never by role
//! names. Uid derivation sits behind [`UidAllocator`] so that an allocator
//! with collision detection can replace the hash-based default.

use sha2::{Digest, Sha256};
use std::collections::BTreeSet;

use crate::ids::RoleId;
use crate::model::{PosixProfile, Tier};

/// Default gid of the member tier.
pub const DEFAULT_MEMBER_GID: u32 = 10000;

/// Default gid of the root tier.
pub const DEFAULT_ROOT_GID: u32 = 10001;

/// Assigns uid numbers to usernames that have none yet.
pub trait UidAllocator: Send + Sync {
    /// Derive a uid for `username`. Must be deterministic.
    fn allocate(&self, username: &str) -> u32;
}

/// `base + (stable_hash(username) mod range)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HashUidAllocator {
    pub base: u32,
    pub range: u32,
}

impl Default for HashUidAllocator {
    fn default() -> Self {
        Self {
            base: 10000,
            range: 1000,
        }
    }
}

impl UidAllocator for HashUidAllocator {
    fn allocate(&self, username: &str) -> u32 {
        let digest = Sha256::digest(username.as_bytes());
        let mut prefix = [0u8; 8];
        prefix.copy_from_slice(&digest[..8]);
        let hash = u64::from_be_bytes(prefix);
        let range = u64::from(self.range.max(1));
        // Bounded by `range`, which is itself a u32.
        self.base.saturating_add((hash % range) as u32)
    }
}

/// Fixed tier configuration: which role ids grant which tier, and the
/// attributes a tiered identity receives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PosixPolicy {
    pub root_role_id: RoleId,
    pub member_role_id: RoleId,
    pub root_gid: u32,
    pub member_gid: u32,
    pub home_root: String,
    pub login_shell: String,
}

impl PosixPolicy {
    pub fn new(root_role_id: impl Into<RoleId>, member_role_id: impl Into<RoleId>) -> Self {
        Self {
            root_role_id: root_role_id.into(),
            member_role_id: member_role_id.into(),
            root_gid: DEFAULT_ROOT_GID,
            member_gid: DEFAULT_MEMBER_GID,
            home_root: "/home".to_string(),
            login_shell: "/bin/bash".to_string(),
        }
    }

    #[must_use]
    pub fn with_gids(mut self, root_gid: u32, member_gid: u32) -> Self {
        self.root_gid = root_gid;
        self.member_gid = member_gid;
        self
    }

    #[must_use]
    pub fn with_home_root(mut self, home_root: impl Into<String>) -> Self {
        self.home_root = home_root.into();
        self
    }

    #[must_use]
    pub fn with_login_shell(mut self, shell: impl Into<String>) -> Self {
        self.login_shell = shell.into();
        self
    }

    /// Root wins over Member when both role ids are held.
    #[must_use]
    pub fn classify(&self, roles: &BTreeSet<RoleId>) -> Tier {
        if roles.contains(&self.root_role_id) {
            Tier::Root
        } else if roles.contains(&self.member_role_id) {
            Tier::Member
        } else {
            Tier::None
        }
    }

    /// Gid of a tier, `None` for [`Tier::None`].
    #[must_use]
    pub fn gid_for(&self, tier: Tier) -> Option<u32> {
        match tier {
            Tier::Root => Some(self.root_gid),
            Tier::Member => Some(self.member_gid),
            Tier::None => None,
        }
    }

    /// Target POSIX profile for `username` at `tier`.
    ///
    /// `existing_uid` is kept when the entry already has one; otherwise the
    /// allocator derives it.
    pub fn profile(
        &self,
        tier: Tier,
        username: &str,
        existing_uid: Option<u32>,
        allocator: &dyn UidAllocator,
    ) -> Option<PosixProfile> {
        let gid_number = self.gid_for(tier)?;
        let uid_number = existing_uid.unwrap_or_else(|| allocator.allocate(username));
        Some(PosixProfile {
            uid_number,
            gid_number,
            home_directory: format!("{}/{}", self.home_root.trim_end_matches('/'), username),
            login_shell: self.login_shell.clone(),
        })
    }
}
