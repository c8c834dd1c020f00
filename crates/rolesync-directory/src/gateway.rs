//! The idempotent directory primitives the reconciliation engine consumes.

use async_trait::async_trait;
use rolesync_core::{PosixProfile, Profile, Quota};

use crate::error::DirectoryResult;

/// Result of an `ensure_*` call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnsureOutcome {
    /// The entry was missing and has been created.
    Created,
    /// The entry was already present; nothing was written to it.
    Existed,
}

impl EnsureOutcome {
    pub fn created(self) -> bool {
        self == EnsureOutcome::Created
    }
}

/// Result of a membership edit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MembershipChange {
    Changed,
    /// Member already present (add) or already absent (remove).
    Unchanged,
}

/// Directory operations used by reconciliation.
///
/// Every method is idempotent. Connection-level failures are reported as
/// errors for which [`DirectoryError::is_connection`] holds; anything else
/// concerns only the targeted entry.
///
/// [`DirectoryError::is_connection`]: crate::DirectoryError::is_connection
#[async_trait]
pub trait DirectoryGateway: Send + Sync {
    /// Create the `users` and `groups` containers under the base DN.
    async fn ensure_structure(&self) -> DirectoryResult<()>;

    /// Create the placeholder entry that is a member of every group.
    async fn ensure_placeholder(&self) -> DirectoryResult<EnsureOutcome>;

    /// Create the person entry for `profile` if absent. An existing entry
    /// is never modified.
    async fn ensure_entry(&self, profile: &Profile) -> DirectoryResult<EnsureOutcome>;

    /// Create the group with only the placeholder as member, or make sure
    /// an existing group still contains the placeholder.
    async fn ensure_group(&self, group: &str) -> DirectoryResult<EnsureOutcome>;

    /// Add `username` to `group`. Adding an existing member is a no-op.
    async fn add_member(&self, group: &str, username: &str) -> DirectoryResult<MembershipChange>;

    /// Remove `username` from `group`. Removing a non-member is a no-op and
    /// the placeholder is never removed.
    async fn remove_member(&self, group: &str, username: &str)
        -> DirectoryResult<MembershipChange>;

    /// Rename a group in place, keeping its members.
    async fn rename_group(&self, old_name: &str, new_name: &str) -> DirectoryResult<()>;

    /// Current `uidNumber` of the entry, if any.
    async fn uid_number(&self, username: &str) -> DirectoryResult<Option<u32>>;

    /// Add the POSIX object classes if missing and overwrite the four
    /// POSIX attributes.
    async fn set_posix_attributes(
        &self,
        username: &str,
        posix: &PosixProfile,
    ) -> DirectoryResult<()>;

    /// Remove the POSIX attributes and object classes that are present.
    async fn clear_posix_attributes(&self, username: &str) -> DirectoryResult<()>;

    /// Overwrite the quota attribute.
    async fn set_quota(&self, username: &str, quota: Quota) -> DirectoryResult<()>;
}
