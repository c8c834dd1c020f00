//! Error types for the rolesync-mirror crate.

use thiserror::Error;

/// Mirror store errors.
#[derive(Debug, Error)]
pub enum MirrorError {
    /// The database could not be reached or the pool gave up.
    #[error("Mirror connection failed: {0}")]
    ConnectionFailed(#[source] sqlx::Error),

    /// A query failed against a reachable database.
    #[error("Mirror query failed: {0}")]
    QueryFailed(#[source] sqlx::Error),

    /// A row the operation depends on does not exist.
    #[error("Not found: {0}")]
    NotFound(String),
}

impl MirrorError {
    /// Check if this error indicates a connection problem.
    #[must_use]
    pub fn is_connection(&self) -> bool {
        matches!(self, MirrorError::ConnectionFailed(_))
    }

    /// Get an error code for classification.
    #[must_use]
    pub fn error_code(&self) -> &'static str {
        match self {
            MirrorError::ConnectionFailed(_) => "MIRROR_CONNECTION_FAILED",
            MirrorError::QueryFailed(_) => "MIRROR_QUERY_FAILED",
            MirrorError::NotFound(_) => "MIRROR_NOT_FOUND",
        }
    }
}

impl From<sqlx::Error> for MirrorError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::Io(_)
            | sqlx::Error::Tls(_)
            | sqlx::Error::Protocol(_)
            | sqlx::Error::PoolTimedOut
            | sqlx::Error::PoolClosed
            | sqlx::Error::WorkerCrashed => MirrorError::ConnectionFailed(err),
            other => MirrorError::QueryFailed(other),
        }
    }
}

/// Result type for mirror operations.
pub type MirrorResult<T> = Result<T, MirrorError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pool_errors_are_connection_level() {
        assert!(MirrorError::from(sqlx::Error::PoolTimedOut).is_connection());
        assert!(MirrorError::from(sqlx::Error::PoolClosed).is_connection());
        assert!(MirrorError::from(sqlx::Error::Protocol("eof".to_string())).is_connection());
        assert!(MirrorError::from(sqlx::Error::Io(std::io::Error::new(
            std::io::ErrorKind::ConnectionRefused,
            "refused"
        )))
        .is_connection());
    }

    #[test]
    fn test_row_errors_are_query_level() {
        let err = MirrorError::from(sqlx::Error::RowNotFound);
        assert!(!err.is_connection());
        assert_eq!(err.error_code(), "MIRROR_QUERY_FAILED");
    }

    #[test]
    fn test_error_display_not_found() {
        let err = MirrorError::NotFound("identity 7".to_string());
        assert_eq!(err.to_string(), "Not found: identity 7");
    }
}
