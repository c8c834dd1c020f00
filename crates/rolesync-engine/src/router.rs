//! Event Router
//!
//! Single dispatch loop over lifecycle events. Each event is mapped to
//! per-identity reconciliations without blocking the loop:
//!
//! - reconciliations of one identity run strictly one after another, in
//!   arrival order, each against the baseline left by the previous one
//! - different identities run concurrently, bounded by a semaphore
//! - on shutdown nothing new starts, in-flight reconciliations finish and
//!   queued ones are dropped (the next bulk sync re-derives them)
//!
//! Every queued reconciliation carries the sequence number of the event
//! that produced it. A rename seen after that event rewrites the role name
//! before the reconciliation runs, so a queued snapshot never brings back
//! a name that has since been renamed away.

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::future::Future;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use rolesync_core::{IdentityId, Member, RoleId};
use tokio::sync::{mpsc, Notify, Semaphore};
use tracing::{debug, error, info, instrument, warn};

use crate::events::LifecycleEvent;
use crate::reconcile::ReconciliationEngine;
use crate::rename::RoleRenamer;

/// Router configuration.
#[derive(Debug, Clone)]
pub struct RouterConfig {
    /// Maximum reconciliations running at once.
    pub concurrency: usize,
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self { concurrency: 4 }
    }
}

/// Dispatches lifecycle events to the reconciliation engine.
#[derive(Clone)]
pub struct EventRouter {
    inner: Arc<Inner>,
}

struct Inner {
    engine: Arc<ReconciliationEngine>,
    renamer: Arc<RoleRenamer>,
    semaphore: Arc<Semaphore>,
    concurrency: usize,

    /// Identities with a running drain task, and what is queued behind it.
    queues: Mutex<HashMap<IdentityId, VecDeque<Pending>>>,

    /// Latest known name of each renamed role, with the sequence number of
    /// the event it was learned from.
    renames: Mutex<HashMap<RoleId, (u64, String)>>,
    seq: AtomicU64,

    /// Last known state of every member, for roster-less bulk syncs.
    roster: Mutex<BTreeMap<IdentityId, Member>>,

    shutdown: AtomicBool,
    busy: AtomicUsize,
    idle: Notify,
}

/// A member snapshot waiting for reconciliation.
struct Pending {
    seq: u64,
    member: Member,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl Inner {
    fn next_seq(&self) -> u64 {
        self.seq.fetch_add(1, Ordering::SeqCst)
    }

    /// Remember `name` for `role_id` unless a later event already named it.
    fn record_name(&self, role_id: RoleId, seq: u64, name: &str) {
        let mut renames = lock(&self.renames);
        match renames.get(&role_id) {
            Some((known, _)) if *known > seq => {}
            _ => {
                renames.insert(role_id, (seq, name.to_string()));
            }
        }
    }

    /// Apply names learned after `pending` was queued. Returns whether any
    /// role name changed.
    fn refresh(&self, pending: &mut Pending) -> bool {
        let renames = lock(&self.renames);
        let mut changed = false;
        for role in &mut pending.member.roles {
            if let Some((seq, name)) = renames.get(&role.id) {
                if *seq > pending.seq && role.name != *name {
                    debug!(role_id = %role.id, stale = %role.name, name = %name, "Queued role name refreshed");
                    role.name.clone_from(name);
                    changed = true;
                }
            }
        }
        changed
    }
}

impl EventRouter {
    pub fn new(
        engine: Arc<ReconciliationEngine>,
        renamer: Arc<RoleRenamer>,
        config: RouterConfig,
    ) -> Self {
        let concurrency = config.concurrency.max(1);
        Self {
            inner: Arc::new(Inner {
                engine,
                renamer,
                semaphore: Arc::new(Semaphore::new(concurrency)),
                concurrency,
                queues: Mutex::new(HashMap::new()),
                renames: Mutex::new(HashMap::new()),
                seq: AtomicU64::new(0),
                roster: Mutex::new(BTreeMap::new()),
                shutdown: AtomicBool::new(false),
                busy: AtomicUsize::new(0),
                idle: Notify::new(),
            }),
        }
    }

    /// Run the dispatch loop until the channel closes or `shutdown`
    /// resolves, then shut down gracefully.
    #[instrument(skip_all, fields(concurrency = self.inner.concurrency))]
    pub async fn run<F>(&self, mut events: mpsc::Receiver<LifecycleEvent>, shutdown: F)
    where
        F: Future<Output = ()> + Send,
    {
        info!("Starting event router");
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                () = &mut shutdown => {
                    info!("Router shutdown requested, stopping dispatch loop");
                    break;
                }
                event = events.recv() => match event {
                    Some(event) => self.dispatch(event),
                    None => {
                        info!("Event channel closed");
                        break;
                    }
                },
            }
        }

        events.close();
        self.shutdown().await;
    }

    /// Handle one event. Never waits on I/O.
    pub fn dispatch(&self, event: LifecycleEvent) {
        if self.is_shutdown() {
            debug!(kind = event.kind(), "Router shutting down, event dropped");
            return;
        }

        debug!(kind = event.kind(), "Dispatching event");

        match event {
            LifecycleEvent::MemberJoined { member }
            | LifecycleEvent::MemberRolesChanged { member, .. } => {
                lock(&self.inner.roster).insert(member.id, member.clone());
                self.enqueue(member);
            }
            LifecycleEvent::RoleRenamed {
                role_id,
                old_name,
                new_name,
            } => {
                let seq = self.inner.next_seq();
                self.inner.record_name(role_id, seq, &new_name);
                self.rename_in_roster(role_id, &new_name);
                self.spawn_rename(role_id, old_name, new_name);
            }
            LifecycleEvent::BulkSync { members } => self.bulk_sync(members),
        }
    }

    /// Queue a reconciliation for `member` behind any in flight for the
    /// same identity.
    pub fn enqueue(&self, member: Member) {
        if self.is_shutdown() {
            return;
        }

        let pending = Pending {
            seq: self.inner.next_seq(),
            member,
        };

        {
            let mut queues = lock(&self.inner.queues);
            if let Some(queue) = queues.get_mut(&pending.member.id) {
                debug!(identity = %pending.member.id, queued = queue.len() + 1, "Identity busy, queued");
                queue.push_back(pending);
                return;
            }
            queues.insert(pending.member.id, VecDeque::new());
        }

        self.inner.busy.fetch_add(1, Ordering::SeqCst);
        let inner = Arc::clone(&self.inner);
        tokio::spawn(async move {
            drain(&inner, pending).await;
            if inner.busy.fetch_sub(1, Ordering::SeqCst) == 1 {
                inner.idle.notify_waiters();
            }
        });
    }

    /// Reconcile every non-bot member. An empty list re-reconciles the last
    /// known roster, which is empty until the bridge has sent a full one.
    fn bulk_sync(&self, members: Vec<Member>) {
        let requested = members.len();
        let members: Vec<Member> = {
            let mut roster = lock(&self.inner.roster);
            if !members.is_empty() {
                *roster = members.into_iter().map(|m| (m.id, m)).collect();
            }
            roster.values().filter(|m| !m.bot).cloned().collect()
        };

        if requested == 0 && members.is_empty() {
            warn!("Bulk sync without members and no roster known yet; nothing reconciled");
            return;
        }

        info!(members = members.len(), "Bulk sync");
        for member in members {
            self.enqueue(member);
        }
    }

    fn rename_in_roster(&self, role_id: RoleId, new_name: &str) {
        let mut roster = lock(&self.inner.roster);
        for member in roster.values_mut() {
            for role in member.roles.iter_mut().filter(|r| r.id == role_id) {
                role.name = new_name.to_string();
            }
        }
    }

    fn spawn_rename(&self, role_id: RoleId, old_name: String, new_name: String) {
        self.inner.busy.fetch_add(1, Ordering::SeqCst);
        let inner = Arc::clone(&self.inner);
        tokio::spawn(async move {
            if let Ok(_permit) = Arc::clone(&inner.semaphore).acquire_owned().await {
                if let Err(e) = inner.renamer.rename(role_id, &old_name, &new_name).await {
                    error!(role_id = %role_id, error = %e, "Role rename failed");
                }
            }
            if inner.busy.fetch_sub(1, Ordering::SeqCst) == 1 {
                inner.idle.notify_waiters();
            }
        });
    }

    /// Number of identities with a reconciliation running or queued.
    pub fn busy_identities(&self) -> usize {
        lock(&self.inner.queues).len()
    }

    /// Wait until no reconciliation or rename is running or queued.
    pub async fn wait_idle(&self) {
        loop {
            let notified = self.inner.idle.notified();
            if self.inner.busy.load(Ordering::SeqCst) == 0 {
                return;
            }
            notified.await;
        }
    }

    /// Stop accepting work and wait for in-flight reconciliations.
    pub async fn shutdown(&self) {
        if self.inner.shutdown.swap(true, Ordering::SeqCst) {
            return;
        }

        info!("Waiting for in-flight reconciliations to complete...");
        let permits = u32::try_from(self.inner.concurrency).unwrap_or(u32::MAX);
        match self.inner.semaphore.acquire_many(permits).await {
            Ok(_all) => self.inner.semaphore.close(),
            Err(_) => warn!("Semaphore already closed"),
        }
        info!("Event router stopped");
    }

    pub fn is_shutdown(&self) -> bool {
        self.inner.shutdown.load(Ordering::SeqCst)
    }
}

/// Reconcile `first`, then everything queued behind it for that identity.
async fn drain(inner: &Inner, first: Pending) {
    let id = first.member.id;
    let mut next = Some(first);

    while let Some(mut pending) = next.take() {
        let Ok(permit) = Arc::clone(&inner.semaphore).acquire_owned().await else {
            break;
        };
        if inner.shutdown.load(Ordering::SeqCst) {
            drop(permit);
            break;
        }

        process(inner, &mut pending).await;
        drop(permit);

        next = {
            let mut queues = lock(&inner.queues);
            let next = queues.get_mut(&id).and_then(VecDeque::pop_front);
            if next.is_none() {
                queues.remove(&id);
            }
            next
        };
    }

    let dropped = lock(&inner.queues).remove(&id).map_or(0, |q| q.len());
    if dropped > 0 {
        info!(identity = %id, dropped, "Queued reconciliations dropped on shutdown");
    }
}

#[instrument(skip_all, fields(identity = %pending.member.id))]
async fn process(inner: &Inner, pending: &mut Pending) {
    // Renames and reconciliations exclude each other; retry when a rename
    // lands between detection and taking the shared side.
    let report = loop {
        inner.refresh(pending);

        match inner.renamer.detect(&pending.member.roles).await {
            Ok(0) => {}
            Ok(renamed) => {
                info!(renamed, "Applied role renames before reconciliation");
                for role in pending.member.live_roles() {
                    inner.record_name(role.id, pending.seq, &role.name);
                }
            }
            Err(e) => {
                warn!(
                    error = %e,
                    code = e.error_code(),
                    "Rename detection failed, reconciliation deferred"
                );
                return;
            }
        }

        let _names = inner.renamer.stable_names().await;
        if inner.refresh(pending) {
            continue;
        }
        break inner.engine.reconcile(&pending.member).await;
    };

    match report {
        Ok(report) if report.is_complete() => {
            debug!(username = %report.username, "Identity in sync");
        }
        Ok(report) => warn!(
            username = %report.username,
            failed_additions = ?report.failed_additions,
            failed_removals = ?report.failed_removals,
            "Reconciliation incomplete, failed transitions will be retried"
        ),
        Err(e) => error!(
            error = %e,
            code = e.error_code(),
            connection = e.is_connection(),
            "Reconciliation aborted, baseline unchanged"
        ),
    }
}
