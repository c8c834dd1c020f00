//! Reconciliation Engine
//!
//! Converges one identity's directory state onto its live role set:
//!
//! 1. resolve username and email (mirror, else display name / synthesized)
//! 2. ensure the identity's entry
//! 3. ensure the placeholder entry
//! 4. diff live roles against the mirror baseline
//! 5. apply removals, one role at a time
//! 6. apply additions, one role at a time
//! 7. overwrite POSIX attributes for the live tier
//! 8. overwrite the quota
//! 9. write the new baseline
//!
//! A connection-level failure at any step returns early with the baseline
//! untouched. A rejected per-role mutation skips that role only and keeps
//! it out of the new baseline, so the next reconciliation retries it.

use std::collections::BTreeSet;
use std::sync::Arc;

use rolesync_core::{
    diff, max_quota, HashUidAllocator, Member, PosixPolicy, Profile, Quota, RoleName, Tier,
    UidAllocator,
};
use rolesync_directory::{DirectoryError, DirectoryGateway};
use rolesync_mirror::MirrorStore;
use serde::Serialize;
use tracing::{debug, error, info, instrument, warn};

use crate::error::{ReconcileError, ReconcileResult};
use crate::notify::{Notification, NotificationSink};

/// Engine configuration.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub posix: PosixPolicy,

    /// Domain of synthesized addresses for identities without a stored email.
    pub mail_domain: String,
}

/// Outcome of one reconciliation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ReconcileReport {
    pub identity: u64,
    pub username: String,
    pub added: BTreeSet<RoleName>,
    pub removed: BTreeSet<RoleName>,
    pub failed_additions: BTreeSet<RoleName>,
    pub failed_removals: BTreeSet<RoleName>,
    pub tier: Tier,
    pub quota: Quota,
    /// False when the POSIX or quota write was rejected.
    pub attributes_applied: bool,
    /// The baseline after this reconciliation.
    pub baseline: BTreeSet<RoleName>,
    /// Whether the stored baseline differed and was rewritten.
    pub baseline_changed: bool,
}

impl ReconcileReport {
    /// Whether every role transition went through.
    pub fn is_complete(&self) -> bool {
        self.failed_additions.is_empty() && self.failed_removals.is_empty()
    }
}

/// Per-identity reconciliation against a directory and a mirror.
pub struct ReconciliationEngine {
    directory: Arc<dyn DirectoryGateway>,
    mirror: Arc<dyn MirrorStore>,
    notifier: Arc<dyn NotificationSink>,
    uid_allocator: Arc<dyn UidAllocator>,
    config: EngineConfig,
}

impl ReconciliationEngine {
    pub fn new(
        directory: Arc<dyn DirectoryGateway>,
        mirror: Arc<dyn MirrorStore>,
        notifier: Arc<dyn NotificationSink>,
        config: EngineConfig,
    ) -> Self {
        Self {
            directory,
            mirror,
            notifier,
            uid_allocator: Arc::new(HashUidAllocator::default()),
            config,
        }
    }

    /// Replace the hash-based uid allocator.
    #[must_use]
    pub fn with_uid_allocator(mut self, allocator: Arc<dyn UidAllocator>) -> Self {
        self.uid_allocator = allocator;
        self
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Reconcile one identity. See the module docs for the step order.
    #[instrument(skip(self, member), fields(identity = %member.id))]
    pub async fn reconcile(&self, member: &Member) -> ReconcileResult<ReconcileReport> {
        // Step 1
        let profile = self.resolve_profile(member).await?;
        let username = profile.username.clone();

        // Steps 2 and 3: everything below depends on both entries.
        self.directory
            .ensure_entry(&profile)
            .await
            .map_err(|e| abort("ensure_entry", e))?;
        self.directory
            .ensure_placeholder()
            .await
            .map_err(|e| abort("ensure_placeholder", e))?;

        // Step 4
        let baseline = self.mirror.get_baseline_roles(member.id).await?;
        let live = member.live_role_names();
        let role_diff = diff(&live, &baseline);

        let mut report = ReconcileReport {
            identity: member.id.get(),
            username: username.clone(),
            ..ReconcileReport::default()
        };

        if role_diff.is_empty() {
            debug!(roles = live.len(), "Role set unchanged");
        }

        // Step 5: removals strictly before additions.
        for role in &role_diff.to_remove {
            match self.directory.remove_member(role, &username).await {
                Ok(_) => {
                    info!(role = %role, username = %username, "Role removed");
                    report.removed.insert(role.clone());
                    self.emit(Notification::removed(member.id, role)).await;
                }
                Err(e) if e.is_connection() => return Err(abort("remove_member", e)),
                Err(e) => {
                    warn!(role = %role, error = %e, code = e.error_code(), "Role removal failed; skipped");
                    report.failed_removals.insert(role.clone());
                }
            }
        }

        // Step 6
        for role in &role_diff.to_add {
            match self.add_role(role, &username).await {
                Ok(()) => {
                    info!(role = %role, username = %username, "Role added");
                    report.added.insert(role.clone());
                    self.emit(Notification::added(member.id, role)).await;
                }
                Err(e) if e.is_connection() => return Err(abort("add_member", e)),
                Err(e) => {
                    warn!(role = %role, error = %e, code = e.error_code(), "Role addition failed; skipped");
                    report.failed_additions.insert(role.clone());
                }
            }
        }

        // Steps 7 and 8 read the live role ids, not the directory.
        let live_ids = member.live_role_ids();
        report.tier = self.config.posix.classify(&live_ids);
        let posix_ok = self.apply_posix(report.tier, &username).await?;

        let quotas = self.mirror.get_role_quotas().await?;
        report.quota = max_quota(&live_ids, &quotas).unwrap_or_default();
        let quota_ok = match self.directory.set_quota(&username, report.quota).await {
            Ok(()) => true,
            Err(e) if e.is_connection() => return Err(abort("set_quota", e)),
            Err(e) => {
                warn!(error = %e, "Quota write failed");
                false
            }
        };
        report.attributes_applied = posix_ok && quota_ok;

        // Step 9. Roles the mirror already names are left to the renamer.
        let known = self.mirror.get_all_role_names().await?;
        for role in member.live_roles().filter(|r| !known.contains_key(&r.id)) {
            self.mirror.upsert_role_name(role.id, &role.name).await?;
        }
        self.mirror.ensure_profile(member.id, &profile).await?;

        let new_baseline: BTreeSet<RoleName> = live
            .difference(&report.failed_additions)
            .chain(report.failed_removals.iter())
            .cloned()
            .collect();

        if new_baseline != baseline {
            self.mirror
                .set_baseline_roles(member.id, &new_baseline)
                .await?;
            report.baseline_changed = true;
        }
        report.baseline = new_baseline;

        info!(
            username = %report.username,
            added = report.added.len(),
            removed = report.removed.len(),
            failed = report.failed_additions.len() + report.failed_removals.len(),
            tier = %report.tier,
            quota = %report.quota,
            "Reconciliation finished"
        );

        Ok(report)
    }

    /// Directory username and email for `member`, read fresh on every call.
    async fn resolve_profile(&self, member: &Member) -> ReconcileResult<Profile> {
        let stored = self.mirror.get_profile(member.id).await?;

        let username = stored
            .as_ref()
            .map(|p| p.username.clone())
            .unwrap_or_else(|| member.display_name.clone());

        let email = stored
            .map(|p| p.email)
            .filter(|e| !e.trim().is_empty())
            .unwrap_or_else(|| format!("{username}@{}", self.config.mail_domain));

        Ok(Profile { username, email })
    }

    async fn add_role(&self, role: &str, username: &str) -> Result<(), DirectoryError> {
        self.directory.ensure_group(role).await?;
        self.directory.add_member(role, username).await?;
        Ok(())
    }

    /// Overwrite or clear the POSIX attributes. `Ok(false)` when the
    /// directory rejected the write.
    async fn apply_posix(&self, tier: Tier, username: &str) -> ReconcileResult<bool> {
        let result = if tier.has_posix() {
            self.set_posix(tier, username).await
        } else {
            self.directory.clear_posix_attributes(username).await
        };

        match result {
            Ok(()) => Ok(true),
            Err(e) if e.is_connection() => Err(abort("posix", e)),
            Err(e) => {
                warn!(tier = %tier, error = %e, "POSIX update failed");
                Ok(false)
            }
        }
    }

    async fn set_posix(&self, tier: Tier, username: &str) -> Result<(), DirectoryError> {
        let existing_uid = self.directory.uid_number(username).await?;
        let Some(profile) =
            self.config
                .posix
                .profile(tier, username, existing_uid, self.uid_allocator.as_ref())
        else {
            return self.directory.clear_posix_attributes(username).await;
        };
        self.directory.set_posix_attributes(username, &profile).await
    }

    async fn emit(&self, notification: Notification) {
        if let Err(e) = self.notifier.notify(&notification).await {
            warn!(
                subject = %notification.subject,
                old = %notification.old,
                new = %notification.new,
                error = %e,
                "Notification failed"
            );
        }
    }
}

fn abort(step: &str, err: DirectoryError) -> ReconcileError {
    error!(step, error = %err, code = err.error_code(), "Reconciliation aborted");
    ReconcileError::Directory(err)
}

