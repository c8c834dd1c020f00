//! Role rename propagation.
//!
//! Renames are keyed by stable role id: the mirror's `(id -> name)` map is
//! the reference for what a role was called. A rename moves the directory
//! group in place (members preserved), records the new name in the mirror
//! and emits one `(0, old, new)` notification.
//!
//! Baselines in the mirror reference role rows, so renaming the row
//! renames the role in every identity's baseline at once; no per-identity
//! pass is needed.

use std::sync::Arc;

use rolesync_core::{Role, RoleId};
use rolesync_directory::{DirectoryError, DirectoryGateway};
use rolesync_mirror::MirrorStore;
use tokio::sync::{RwLock, RwLockReadGuard};
use tracing::{debug, info, instrument, warn};

use crate::error::{ReconcileError, ReconcileResult};
use crate::notify::{Notification, NotificationSink};

/// Applies role renames.
///
/// Renames take the write side of one lock, so concurrent reconciliations
/// that observe the same new name rename once. Reconciliations hold the
/// read side ([`RoleRenamer::stable_names`]) so no rename lands while one
/// is running with the names it started from.
pub struct RoleRenamer {
    directory: Arc<dyn DirectoryGateway>,
    mirror: Arc<dyn MirrorStore>,
    notifier: Arc<dyn NotificationSink>,
    lock: RwLock<()>,
}

impl RoleRenamer {
    pub fn new(
        directory: Arc<dyn DirectoryGateway>,
        mirror: Arc<dyn MirrorStore>,
        notifier: Arc<dyn NotificationSink>,
    ) -> Self {
        Self {
            directory,
            mirror,
            notifier,
            lock: RwLock::new(()),
        }
    }

    /// Block renames until the guard is dropped.
    pub async fn stable_names(&self) -> RwLockReadGuard<'_, ()> {
        self.lock.read().await
    }

    /// Apply an announced rename. Returns whether anything changed.
    ///
    /// When the mirror already records `new_name` for the role the rename
    /// was applied earlier (for example by detection) and this is a no-op.
    #[instrument(skip(self), fields(role_id = %role_id))]
    pub async fn rename(
        &self,
        role_id: RoleId,
        old_name: &str,
        new_name: &str,
    ) -> ReconcileResult<bool> {
        let _guard = self.lock.write().await;

        let known = self.mirror.get_all_role_names().await?;
        if known.get(&role_id).is_some_and(|name| name == new_name) || old_name == new_name {
            debug!(new = %new_name, "Rename already applied");
            return Ok(false);
        }

        let old_name = known.get(&role_id).map_or(old_name, String::as_str);
        self.apply(role_id, old_name, new_name).await?;
        Ok(true)
    }

    /// Compare `roles` against the mirror's names and apply every rename
    /// found. Roles the mirror has never seen are left for reconciliation
    /// to record. Returns the number of renames applied; stops at the first
    /// rename that fails.
    #[instrument(skip(self, roles), fields(roles = roles.len()))]
    pub async fn detect(&self, roles: &[Role]) -> ReconcileResult<usize> {
        let _guard = self.lock.write().await;

        let known = self.mirror.get_all_role_names().await?;
        let mut applied = 0;

        for role in roles.iter().filter(|r| !r.is_default) {
            let Some(old_name) = known.get(&role.id) else {
                continue;
            };
            if *old_name == role.name {
                continue;
            }
            info!(role_id = %role.id, old = %old_name, new = %role.name, "Role rename detected");
            self.apply(role.id, old_name, &role.name).await?;
            applied += 1;
        }

        Ok(applied)
    }

    /// Caller holds `self.lock` for writing.
    ///
    /// The mirror keeps the old name unless the directory rename went
    /// through (or there was no group to rename), so a failed rename is
    /// detected again on the next event.
    async fn apply(&self, role_id: RoleId, old_name: &str, new_name: &str) -> ReconcileResult<()> {
        match self.directory.rename_group(old_name, new_name).await {
            Ok(()) => {}
            Err(DirectoryError::NotFound { .. }) => {
                debug!(old = %old_name, "No directory group to rename");
            }
            Err(e) => {
                warn!(
                    old = %old_name,
                    new = %new_name,
                    error = %e,
                    code = e.error_code(),
                    "Directory group rename failed; mirror keeps the old name"
                );
                return Err(ReconcileError::Directory(e));
            }
        }

        self.mirror.upsert_role_name(role_id, new_name).await?;

        let notification = Notification::renamed(old_name, new_name);
        if let Err(e) = self.notifier.notify(&notification).await {
            warn!(error = %e, "Rename notification failed");
        }

        info!(role_id = %role_id, old = %old_name, new = %new_name, "Role renamed");
        Ok(())
    }
}
