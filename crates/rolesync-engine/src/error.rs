//! Reconciliation errors.
//!
//! Only failures that abort a whole reconciliation surface here. Per-role
//! mutation failures and notification failures are logged and recorded in
//! the [`ReconcileReport`](crate::ReconcileReport) instead.

use rolesync_directory::DirectoryError;
use rolesync_mirror::MirrorError;
use thiserror::Error;

/// Reasons a reconciliation was aborted before writing the baseline.
#[derive(Debug, Error)]
pub enum ReconcileError {
    /// The directory was unusable, or a prerequisite entry could not be
    /// ensured.
    #[error("directory failure: {0}")]
    Directory(#[from] DirectoryError),

    /// The mirror could not be read or written.
    #[error("mirror failure: {0}")]
    Mirror(#[from] MirrorError),
}

impl ReconcileError {
    /// Whether a backend was unreachable (as opposed to one entry being
    /// rejected). Both are retried by the next reconciliation.
    pub fn is_connection(&self) -> bool {
        match self {
            ReconcileError::Directory(e) => e.is_connection(),
            ReconcileError::Mirror(_) => true,
        }
    }

    /// Get an error code for classification.
    pub fn error_code(&self) -> &'static str {
        match self {
            ReconcileError::Directory(e) => e.error_code(),
            ReconcileError::Mirror(e) => e.error_code(),
        }
    }
}

/// Result type for reconciliation.
pub type ReconcileResult<T> = Result<T, ReconcileError>;
