//! Shared in-memory backends for engine tests.

#![allow(dead_code)]

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use rolesync_core::{
    IdentityId, Member, PosixPolicy, PosixProfile, Profile, Quota, Role, RoleId, RoleName,
};
use rolesync_directory::{
    DirectoryError, DirectoryGateway, DirectoryResult, EnsureOutcome, MembershipChange,
};
use rolesync_engine::{
    EngineConfig, Notification, NotificationSink, NotifyError, ReconciliationEngine, RoleRenamer,
};
use rolesync_mirror::{MirrorError, MirrorResult, MirrorStore};

pub const PLACEHOLDER: &str = "nobody_001";
pub const ROOT_ROLE: u64 = 1_412_179_886_277_263_460;
pub const MEMBER_ROLE: u64 = 1_412_179_766_466_969_661;

// =============================================================================
// Directory
// =============================================================================

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FakeEntry {
    pub email: String,
    pub posix: Option<PosixProfile>,
    pub quota: Option<Quota>,
}

#[derive(Default)]
struct DirectoryState {
    entries: BTreeMap<String, FakeEntry>,
    groups: BTreeMap<String, BTreeSet<String>>,
}

/// Directory held in memory, with injectable failures.
#[derive(Default)]
pub struct FakeDirectory {
    state: Mutex<DirectoryState>,
    down: AtomicBool,
    reject_groups: Mutex<HashSet<String>>,
    disconnect_groups: Mutex<HashSet<String>>,
    reject_posix: AtomicBool,
    delay_ms: AtomicUsize,
    mutations: AtomicUsize,
    attribute_writes: AtomicUsize,
    calls: Mutex<Vec<String>>,
    active: Mutex<HashMap<String, usize>>,
    max_active_total: AtomicUsize,
    max_active_per_identity: AtomicUsize,
}

impl FakeDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every call fails with a connection error.
    pub fn set_down(&self, down: bool) {
        self.down.store(down, Ordering::SeqCst);
    }

    /// Membership edits of `group` are rejected (mutation failure).
    pub fn reject_group(&self, group: &str) {
        self.reject_groups.lock().unwrap().insert(group.to_string());
    }

    pub fn allow_group(&self, group: &str) {
        self.reject_groups.lock().unwrap().remove(group);
    }

    /// Membership edits of `group` fail with a connection error.
    pub fn disconnect_on_group(&self, group: &str) {
        self.disconnect_groups.lock().unwrap().insert(group.to_string());
    }

    pub fn reject_posix(&self) {
        self.reject_posix.store(true, Ordering::SeqCst);
    }

    pub fn with_delay(self, delay: Duration) -> Self {
        self.delay_ms
            .store(delay.as_millis() as usize, Ordering::SeqCst);
        self
    }

    pub fn seed_entry(&self, username: &str, entry: FakeEntry) {
        self.state
            .lock()
            .unwrap()
            .entries
            .insert(username.to_string(), entry);
    }

    pub fn seed_group(&self, group: &str, members: &[&str]) {
        self.state.lock().unwrap().groups.insert(
            group.to_string(),
            members.iter().map(|m| (*m).to_string()).collect(),
        );
    }

    pub fn entry(&self, username: &str) -> Option<FakeEntry> {
        self.state.lock().unwrap().entries.get(username).cloned()
    }

    pub fn members(&self, group: &str) -> Option<BTreeSet<String>> {
        self.state.lock().unwrap().groups.get(group).cloned()
    }

    pub fn group_names(&self) -> Vec<String> {
        self.state.lock().unwrap().groups.keys().cloned().collect()
    }

    /// Structural changes: entries, groups, memberships, renames.
    pub fn mutations(&self) -> usize {
        self.mutations.load(Ordering::SeqCst)
    }

    /// POSIX and quota writes.
    pub fn attribute_writes(&self) -> usize {
        self.attribute_writes.load(Ordering::SeqCst)
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    /// Highest number of reconciliations seen between `ensure_entry` and
    /// `set_quota` at the same time.
    pub fn max_active_total(&self) -> usize {
        self.max_active_total.load(Ordering::SeqCst)
    }

    pub fn max_active_per_identity(&self) -> usize {
        self.max_active_per_identity.load(Ordering::SeqCst)
    }

    async fn enter(&self, call: String) -> DirectoryResult<()> {
        let delay = self.delay_ms.load(Ordering::SeqCst);
        if delay > 0 {
            tokio::time::sleep(Duration::from_millis(delay as u64)).await;
        }
        self.calls.lock().unwrap().push(call);
        if self.down.load(Ordering::SeqCst) {
            return Err(DirectoryError::connection_failed("directory down"));
        }
        Ok(())
    }

    fn check_group(&self, group: &str) -> DirectoryResult<()> {
        if self.disconnect_groups.lock().unwrap().contains(group) {
            return Err(DirectoryError::ConnectionTimeout { timeout_secs: 10 });
        }
        if self.reject_groups.lock().unwrap().contains(group) {
            return Err(DirectoryError::OperationFailed {
                message: format!("modify of {group} rejected"),
                code: Some(50),
            });
        }
        Ok(())
    }

    fn mutated(&self) {
        self.mutations.fetch_add(1, Ordering::SeqCst);
    }

    fn begin(&self, username: &str) {
        let mut active = self.active.lock().unwrap();
        *active.entry(username.to_string()).or_default() += 1;
        let per_identity = active[username];
        let total: usize = active.values().sum();
        self.max_active_per_identity
            .fetch_max(per_identity, Ordering::SeqCst);
        self.max_active_total.fetch_max(total, Ordering::SeqCst);
    }

    fn end(&self, username: &str) {
        let mut active = self.active.lock().unwrap();
        if let Some(count) = active.get_mut(username) {
            *count = count.saturating_sub(1);
        }
    }
}

fn not_found(what: &str) -> DirectoryError {
    DirectoryError::NotFound {
        dn: what.to_string(),
    }
}

#[async_trait]
impl DirectoryGateway for FakeDirectory {
    async fn ensure_structure(&self) -> DirectoryResult<()> {
        self.enter("ensure_structure".to_string()).await
    }

    async fn ensure_placeholder(&self) -> DirectoryResult<EnsureOutcome> {
        self.enter("ensure_placeholder".to_string()).await?;
        let mut state = self.state.lock().unwrap();
        if state.entries.contains_key(PLACEHOLDER) {
            return Ok(EnsureOutcome::Existed);
        }
        state
            .entries
            .insert(PLACEHOLDER.to_string(), FakeEntry::default());
        self.mutated();
        Ok(EnsureOutcome::Created)
    }

    async fn ensure_entry(&self, profile: &Profile) -> DirectoryResult<EnsureOutcome> {
        self.enter(format!("ensure_entry:{}", profile.username))
            .await?;
        self.begin(&profile.username);
        let mut state = self.state.lock().unwrap();
        if state.entries.contains_key(&profile.username) {
            return Ok(EnsureOutcome::Existed);
        }
        state.entries.insert(
            profile.username.clone(),
            FakeEntry {
                email: profile.email.clone(),
                ..FakeEntry::default()
            },
        );
        self.mutated();
        Ok(EnsureOutcome::Created)
    }

    async fn ensure_group(&self, group: &str) -> DirectoryResult<EnsureOutcome> {
        self.enter(format!("ensure_group:{group}")).await?;
        self.check_group(group)?;
        let mut state = self.state.lock().unwrap();
        match state.groups.get_mut(group) {
            Some(members) => {
                if members.insert(PLACEHOLDER.to_string()) {
                    self.mutated();
                }
                Ok(EnsureOutcome::Existed)
            }
            None => {
                state.groups.insert(
                    group.to_string(),
                    BTreeSet::from([PLACEHOLDER.to_string()]),
                );
                self.mutated();
                Ok(EnsureOutcome::Created)
            }
        }
    }

    async fn add_member(&self, group: &str, username: &str) -> DirectoryResult<MembershipChange> {
        self.enter(format!("add_member:{username}:{group}")).await?;
        self.check_group(group)?;
        let mut state = self.state.lock().unwrap();
        let members = state.groups.get_mut(group).ok_or_else(|| not_found(group))?;
        if members.insert(username.to_string()) {
            self.mutated();
            Ok(MembershipChange::Changed)
        } else {
            Ok(MembershipChange::Unchanged)
        }
    }

    async fn remove_member(
        &self,
        group: &str,
        username: &str,
    ) -> DirectoryResult<MembershipChange> {
        self.enter(format!("remove_member:{username}:{group}"))
            .await?;
        self.check_group(group)?;
        if username == PLACEHOLDER {
            return Ok(MembershipChange::Unchanged);
        }
        let mut state = self.state.lock().unwrap();
        let members = state.groups.get_mut(group).ok_or_else(|| not_found(group))?;
        if !members.contains(username) {
            return Ok(MembershipChange::Unchanged);
        }
        members.insert(PLACEHOLDER.to_string());
        members.remove(username);
        self.mutated();
        Ok(MembershipChange::Changed)
    }

    async fn rename_group(&self, old_name: &str, new_name: &str) -> DirectoryResult<()> {
        self.enter(format!("rename_group:{old_name}:{new_name}"))
            .await?;
        let mut state = self.state.lock().unwrap();
        if state.groups.contains_key(new_name) {
            return Err(DirectoryError::AlreadyExists {
                dn: new_name.to_string(),
            });
        }
        let members = state
            .groups
            .remove(old_name)
            .ok_or_else(|| not_found(old_name))?;
        state.groups.insert(new_name.to_string(), members);
        self.mutated();
        Ok(())
    }

    async fn uid_number(&self, username: &str) -> DirectoryResult<Option<u32>> {
        self.enter(format!("uid_number:{username}")).await?;
        let state = self.state.lock().unwrap();
        let entry = state.entries.get(username).ok_or_else(|| not_found(username))?;
        Ok(entry.posix.as_ref().map(|p| p.uid_number))
    }

    async fn set_posix_attributes(
        &self,
        username: &str,
        posix: &PosixProfile,
    ) -> DirectoryResult<()> {
        self.enter(format!("set_posix:{username}")).await?;
        if self.reject_posix.load(Ordering::SeqCst) {
            return Err(DirectoryError::operation_failed("objectClassViolation"));
        }
        let mut state = self.state.lock().unwrap();
        let entry = state
            .entries
            .get_mut(username)
            .ok_or_else(|| not_found(username))?;
        entry.posix = Some(posix.clone());
        self.attribute_writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn clear_posix_attributes(&self, username: &str) -> DirectoryResult<()> {
        self.enter(format!("clear_posix:{username}")).await?;
        let mut state = self.state.lock().unwrap();
        let entry = state
            .entries
            .get_mut(username)
            .ok_or_else(|| not_found(username))?;
        entry.posix = None;
        self.attribute_writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn set_quota(&self, username: &str, quota: Quota) -> DirectoryResult<()> {
        let result = self.enter(format!("set_quota:{username}")).await;
        self.end(username);
        result?;
        let mut state = self.state.lock().unwrap();
        let entry = state
            .entries
            .get_mut(username)
            .ok_or_else(|| not_found(username))?;
        entry.quota = Some(quota);
        self.attribute_writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

// =============================================================================
// Mirror
// =============================================================================

#[derive(Default)]
struct MirrorState {
    baselines: HashMap<IdentityId, BTreeSet<RoleName>>,
    profiles: HashMap<IdentityId, Profile>,
    role_names: HashMap<RoleId, RoleName>,
    quotas: HashMap<RoleId, Quota>,
}

/// Mirror held in memory. Renaming a role renames it in every baseline,
/// as the relational mirror does through its role rows.
#[derive(Default)]
pub struct FakeMirror {
    state: Mutex<MirrorState>,
    down: AtomicBool,
    baseline_writes: AtomicUsize,
}

impl FakeMirror {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_down(&self, down: bool) {
        self.down.store(down, Ordering::SeqCst);
    }

    pub fn seed_baseline(&self, identity: u64, roles: &[&str]) {
        self.state
            .lock()
            .unwrap()
            .baselines
            .insert(IdentityId::new(identity), names(roles));
    }

    pub fn seed_profile(&self, identity: u64, username: &str, email: &str) {
        self.state.lock().unwrap().profiles.insert(
            IdentityId::new(identity),
            Profile {
                username: username.to_string(),
                email: email.to_string(),
            },
        );
    }

    pub fn seed_role(&self, role: u64, name: &str, quota: Option<u64>) {
        let mut state = self.state.lock().unwrap();
        state.role_names.insert(RoleId::new(role), name.to_string());
        if let Some(mb) = quota {
            state.quotas.insert(RoleId::new(role), Quota::megabytes(mb));
        }
    }

    pub fn baseline(&self, identity: u64) -> BTreeSet<RoleName> {
        self.state
            .lock()
            .unwrap()
            .baselines
            .get(&IdentityId::new(identity))
            .cloned()
            .unwrap_or_default()
    }

    pub fn profile(&self, identity: u64) -> Option<Profile> {
        self.state
            .lock()
            .unwrap()
            .profiles
            .get(&IdentityId::new(identity))
            .cloned()
    }

    pub fn role_name(&self, role: u64) -> Option<RoleName> {
        self.state
            .lock()
            .unwrap()
            .role_names
            .get(&RoleId::new(role))
            .cloned()
    }

    pub fn baseline_writes(&self) -> usize {
        self.baseline_writes.load(Ordering::SeqCst)
    }

    fn check(&self) -> MirrorResult<()> {
        if self.down.load(Ordering::SeqCst) {
            return Err(MirrorError::ConnectionFailed(sqlx::Error::PoolTimedOut));
        }
        Ok(())
    }
}

#[async_trait]
impl MirrorStore for FakeMirror {
    async fn get_baseline_roles(&self, identity: IdentityId) -> MirrorResult<BTreeSet<RoleName>> {
        self.check()?;
        Ok(self
            .state
            .lock()
            .unwrap()
            .baselines
            .get(&identity)
            .cloned()
            .unwrap_or_default())
    }

    async fn set_baseline_roles(
        &self,
        identity: IdentityId,
        roles: &BTreeSet<RoleName>,
    ) -> MirrorResult<()> {
        self.check()?;
        let mut state = self.state.lock().unwrap();
        if !state.profiles.contains_key(&identity) {
            return Err(MirrorError::NotFound(format!("identity {identity}")));
        }
        state.baselines.insert(identity, roles.clone());
        self.baseline_writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn get_profile(&self, identity: IdentityId) -> MirrorResult<Option<Profile>> {
        self.check()?;
        Ok(self.state.lock().unwrap().profiles.get(&identity).cloned())
    }

    async fn ensure_profile(&self, identity: IdentityId, profile: &Profile) -> MirrorResult<bool> {
        self.check()?;
        let mut state = self.state.lock().unwrap();
        if state.profiles.contains_key(&identity) {
            return Ok(false);
        }
        state.profiles.insert(identity, profile.clone());
        Ok(true)
    }

    async fn upsert_role_name(&self, role: RoleId, name: &str) -> MirrorResult<()> {
        self.check()?;
        let mut state = self.state.lock().unwrap();
        if let Some(old) = state.role_names.insert(role, name.to_string()) {
            if old != name {
                for baseline in state.baselines.values_mut() {
                    if baseline.remove(&old) {
                        baseline.insert(name.to_string());
                    }
                }
            }
        }
        Ok(())
    }

    async fn get_all_role_names(&self) -> MirrorResult<HashMap<RoleId, RoleName>> {
        self.check()?;
        Ok(self.state.lock().unwrap().role_names.clone())
    }

    async fn get_role_quotas(&self) -> MirrorResult<HashMap<RoleId, Quota>> {
        self.check()?;
        Ok(self.state.lock().unwrap().quotas.clone())
    }
}

// =============================================================================
// Notification sink
// =============================================================================

/// Records every notification attempt; optionally fails them all.
#[derive(Default)]
pub struct RecordingSink {
    sent: Mutex<Vec<Notification>>,
    failing: AtomicBool,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing() -> Self {
        let sink = Self::default();
        sink.failing.store(true, Ordering::SeqCst);
        sink
    }

    pub fn sent(&self) -> Vec<Notification> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait]
impl NotificationSink for RecordingSink {
    async fn notify(&self, notification: &Notification) -> Result<(), NotifyError> {
        self.sent.lock().unwrap().push(notification.clone());
        if self.failing.load(Ordering::SeqCst) {
            return Err(NotifyError::NonZeroExit {
                status: Some(255),
                stderr: "PHP Fatal error".to_string(),
            });
        }
        Ok(())
    }
}

// =============================================================================
// Builders
// =============================================================================

pub struct Harness {
    pub directory: Arc<FakeDirectory>,
    pub mirror: Arc<FakeMirror>,
    pub sink: Arc<RecordingSink>,
}

impl Harness {
    pub fn new() -> Self {
        Self::with(FakeDirectory::new(), RecordingSink::new())
    }

    pub fn with(directory: FakeDirectory, sink: RecordingSink) -> Self {
        Self {
            directory: Arc::new(directory),
            mirror: Arc::new(FakeMirror::new()),
            sink: Arc::new(sink),
        }
    }

    pub fn engine(&self) -> ReconciliationEngine {
        ReconciliationEngine::new(
            self.directory.clone(),
            self.mirror.clone(),
            self.sink.clone(),
            EngineConfig {
                posix: PosixPolicy::new(ROOT_ROLE, MEMBER_ROLE),
                mail_domain: "example.com".to_string(),
            },
        )
    }

    pub fn renamer(&self) -> RoleRenamer {
        RoleRenamer::new(
            self.directory.clone(),
            self.mirror.clone(),
            self.sink.clone(),
        )
    }
}

pub fn names(roles: &[&str]) -> BTreeSet<RoleName> {
    roles.iter().map(|r| (*r).to_string()).collect()
}

/// Member with roles given as `(id, name)`.
pub fn member(id: u64, display_name: &str, roles: &[(u64, &str)]) -> Member {
    roles
        .iter()
        .fold(Member::new(id, display_name), |m, (role_id, name)| {
            m.with_role(Role::new(*role_id, *name))
        })
}

pub fn everyone() -> Role {
    Role {
        id: RoleId::new(1),
        name: "@everyone".to_string(),
        is_default: true,
    }
}
