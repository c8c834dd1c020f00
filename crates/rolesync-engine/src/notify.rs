//! Notification Sink
//!
//! Every role transition is reported to an external hook as three string
//! arguments: subject, old value, new value. Delivery is best-effort: the
//! engine logs failures and never retries or consults the outcome.

use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use rolesync_core::IdentityId;
use thiserror::Error;
use tokio::process::Command;
use tracing::{debug, info, instrument, warn};

/// Subject used for role renames, which concern no single identity.
pub const RENAME_SUBJECT: &str = "0";

/// Notification errors.
#[derive(Debug, Error)]
pub enum NotifyError {
    /// The hook process could not be started.
    #[error("failed to spawn {program}: {source}")]
    SpawnFailed {
        program: String,
        #[source]
        source: std::io::Error,
    },

    /// The hook exited unsuccessfully.
    #[error("hook exited with status {status:?}: {stderr}")]
    NonZeroExit { status: Option<i32>, stderr: String },

    /// The hook did not finish in time and was killed.
    #[error("hook timed out after {timeout_secs} seconds")]
    Timeout { timeout_secs: u64 },
}

/// One transition as passed to the hook.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    pub subject: String,
    pub old: String,
    pub new: String,
}

impl Notification {
    /// `(identity, "", role)`.
    pub fn added(identity: IdentityId, role: &str) -> Self {
        Self {
            subject: identity.to_string(),
            old: String::new(),
            new: role.to_string(),
        }
    }

    /// `(identity, role, "")`.
    pub fn removed(identity: IdentityId, role: &str) -> Self {
        Self {
            subject: identity.to_string(),
            old: role.to_string(),
            new: String::new(),
        }
    }

    /// `(0, old, new)`.
    pub fn renamed(old_name: &str, new_name: &str) -> Self {
        Self {
            subject: RENAME_SUBJECT.to_string(),
            old: old_name.to_string(),
            new: new_name.to_string(),
        }
    }
}

/// Receiver of transition notifications.
#[async_trait]
pub trait NotificationSink: Send + Sync {
    async fn notify(&self, notification: &Notification) -> Result<(), NotifyError>;
}

/// Sink used when no hook is configured: transitions are only logged.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogOnlyNotifier;

#[async_trait]
impl NotificationSink for LogOnlyNotifier {
    async fn notify(&self, n: &Notification) -> Result<(), NotifyError> {
        info!(subject = %n.subject, old = %n.old, new = %n.new, "Role transition");
        Ok(())
    }
}

/// Runs `[interpreter] <script> <subject> <old> <new>` per transition.
#[derive(Debug, Clone)]
pub struct ScriptNotifier {
    script: PathBuf,
    interpreter: Option<String>,
    timeout: Duration,
}

impl ScriptNotifier {
    /// A leading `~/` in `script` is expanded to the home directory.
    pub fn new(script: impl AsRef<str>) -> Self {
        Self {
            script: expand_home(script.as_ref()),
            interpreter: None,
            timeout: Duration::from_secs(30),
        }
    }

    /// Run the script through an interpreter such as `php`.
    #[must_use]
    pub fn with_interpreter(mut self, interpreter: impl Into<String>) -> Self {
        self.interpreter = Some(interpreter.into());
        self
    }

    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn script(&self) -> &Path {
        &self.script
    }

    fn command(&self, n: &Notification) -> Command {
        let mut command = match &self.interpreter {
            Some(interpreter) => {
                let mut c = Command::new(interpreter);
                c.arg(&self.script);
                c
            }
            None => Command::new(&self.script),
        };
        command
            .arg(&n.subject)
            .arg(&n.old)
            .arg(&n.new)
            .kill_on_drop(true);
        command
    }
}

#[async_trait]
impl NotificationSink for ScriptNotifier {
    #[instrument(skip(self, n), fields(subject = %n.subject, old = %n.old, new = %n.new))]
    async fn notify(&self, n: &Notification) -> Result<(), NotifyError> {
        let program = self
            .interpreter
            .clone()
            .unwrap_or_else(|| self.script.display().to_string());

        let output = tokio::time::timeout(self.timeout, self.command(n).output())
            .await
            .map_err(|_| NotifyError::Timeout {
                timeout_secs: self.timeout.as_secs(),
            })?
            .map_err(|source| NotifyError::SpawnFailed { program, source })?;

        let stdout = String::from_utf8_lossy(&output.stdout);
        let stderr = String::from_utf8_lossy(&output.stderr);

        if !stdout.trim().is_empty() {
            debug!(stdout = %stdout.trim(), "Hook output");
        }

        if !output.status.success() {
            return Err(NotifyError::NonZeroExit {
                status: output.status.code(),
                stderr: stderr.trim().to_string(),
            });
        }

        if !stderr.trim().is_empty() {
            warn!(stderr = %stderr.trim(), "Hook wrote to stderr");
        }

        info!(status = ?output.status.code(), "Hook executed");
        Ok(())
    }
}

fn expand_home(path: &str) -> PathBuf {
    match (path.strip_prefix("~/"), std::env::var_os("HOME")) {
        (Some(rest), Some(home)) => PathBuf::from(home).join(rest),
        _ => PathBuf::from(path),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_notification_shapes() {
        let id = IdentityId::new(7);
        assert_eq!(
            Notification::added(id, "editors"),
            Notification {
                subject: "7".to_string(),
                old: String::new(),
                new: "editors".to_string()
            }
        );
        assert_eq!(Notification::removed(id, "editors").old, "editors");
        assert_eq!(Notification::removed(id, "editors").new, "");
        assert_eq!(Notification::renamed("a", "b").subject, "0");
    }

    #[test]
    fn test_expand_home() {
        std::env::set_var("HOME", "/home/rolesync");
        assert_eq!(
            expand_home("~/hooks/role_hook.php"),
            PathBuf::from("/home/rolesync/hooks/role_hook.php")
        );
        assert_eq!(expand_home("/opt/hook"), PathBuf::from("/opt/hook"));
    }

    #[tokio::test]
    async fn test_successful_hook() {
        let sink = ScriptNotifier::new("true");
        assert!(sink.notify(&Notification::renamed("a", "b")).await.is_ok());
    }

    #[tokio::test]
    async fn test_failing_hook_reports_status() {
        let sink = ScriptNotifier::new("false");
        let err = sink
            .notify(&Notification::added(IdentityId::new(1), "x"))
            .await
            .unwrap_err();
        assert!(matches!(err, NotifyError::NonZeroExit { status: Some(1), .. }));
    }

    #[tokio::test]
    async fn test_missing_hook_is_spawn_failure() {
        let sink = ScriptNotifier::new("/nonexistent/rolesync-hook");
        let err = sink
            .notify(&Notification::added(IdentityId::new(1), "x"))
            .await
            .unwrap_err();
        assert!(matches!(err, NotifyError::SpawnFailed { .. }));
    }

    #[tokio::test]
    async fn test_interpreter_receives_script_and_arguments() {
        // `sh -c <script> <subject> <old> <new>` binds $0..$2 to the arguments.
        let sink = ScriptNotifier::new("-c").with_interpreter("sh");
        let ok = sink
            .notify(&Notification {
                subject: "test \"$0\" = 7 && test \"$1\" = old && test -z \"$2\"".to_string(),
                old: "7".to_string(),
                new: "old".to_string(),
            })
            .await;
        assert!(ok.is_ok(), "{ok:?}");
    }

    #[tokio::test]
    async fn test_log_only_never_fails() {
        assert!(LogOnlyNotifier
            .notify(&Notification::renamed("a", "b"))
            .await
            .is_ok());
    }
}
