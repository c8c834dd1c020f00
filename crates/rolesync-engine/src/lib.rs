//! rolesync Reconciliation Engine
//!
//! Keeps the directory convergent with the live role assignments of the
//! membership source, using the mirror as the last-synced baseline.
//!
//! # Modules
//!
//! - [`reconcile`] - per-identity reconciliation ([`ReconciliationEngine`])
//! - [`rename`] - role rename propagation ([`RoleRenamer`])
//! - [`router`] - lifecycle event dispatch with per-identity serialization
//! - [`events`] - the lifecycle event types
//! - [`notify`] - transition notifications to an external hook
//!
//! # Failure handling
//!
//! | Failure | Effect |
//! |---|---|
//! | directory or mirror unreachable | reconciliation aborted, baseline untouched |
//! | one role add/remove rejected | role skipped and kept out of the new baseline |
//! | notification hook failed | logged only |

pub mod error;
pub mod events;
pub mod notify;
pub mod reconcile;
pub mod rename;
pub mod router;

pub use error::{ReconcileError, ReconcileResult};
pub use events::LifecycleEvent;
pub use notify::{
    LogOnlyNotifier, Notification, NotificationSink, NotifyError, ScriptNotifier, RENAME_SUBJECT,
};
pub use reconcile::{EngineConfig, ReconcileReport, ReconciliationEngine};
pub use rename::RoleRenamer;
pub use router::{EventRouter, RouterConfig};
