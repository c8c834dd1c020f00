//! Directory gateway error types
//!
//! Errors are split into connection-level failures (the directory cannot be
//! used at all; the caller must abort) and mutation failures (one specific
//! operation was rejected by a reachable directory).

use thiserror::Error;

/// LDAP result codes the gateway interprets.
pub mod rc {
    pub const SUCCESS: u32 = 0;
    pub const NO_SUCH_ATTRIBUTE: u32 = 16;
    pub const ATTRIBUTE_OR_VALUE_EXISTS: u32 = 20;
    pub const NO_SUCH_OBJECT: u32 = 32;
    pub const INVALID_CREDENTIALS: u32 = 49;
    pub const BUSY: u32 = 51;
    pub const UNAVAILABLE: u32 = 52;
    pub const ALREADY_EXISTS: u32 = 68;
    pub const OTHER: u32 = 80;
}

/// Error that can occur during directory operations.
#[derive(Debug, Error)]
pub enum DirectoryError {
    /// Failed to establish or keep a connection to the directory.
    #[error("connection failed: {message}")]
    ConnectionFailed {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// The directory did not answer in time.
    #[error("connection timeout after {timeout_secs} seconds")]
    ConnectionTimeout { timeout_secs: u64 },

    /// Bind was rejected.
    #[error("authentication failed: invalid credentials")]
    AuthenticationFailed,

    /// Target entry does not exist.
    #[error("object not found: {dn}")]
    NotFound { dn: String },

    /// Entry already exists (create conflict).
    #[error("object already exists: {dn}")]
    AlreadyExists { dn: String },

    /// The directory rejected a specific operation.
    #[error("operation failed: {message}")]
    OperationFailed {
        message: String,
        /// LDAP result code, when the directory produced one.
        code: Option<u32>,
    },

    /// Gateway configuration is invalid.
    #[error("invalid configuration: {message}")]
    InvalidConfiguration { message: String },

    /// A directory value could not be interpreted.
    #[error("invalid data: {message}")]
    InvalidData { message: String },
}

impl DirectoryError {
    /// Whether the directory itself is unusable (unreachable, timed out or
    /// rejecting our credentials). Reconciliation must abort on these.
    pub fn is_connection(&self) -> bool {
        matches!(
            self,
            DirectoryError::ConnectionFailed { .. }
                | DirectoryError::ConnectionTimeout { .. }
                | DirectoryError::AuthenticationFailed
        )
    }

    /// Get an error code for classification.
    pub fn error_code(&self) -> &'static str {
        match self {
            DirectoryError::ConnectionFailed { .. } => "CONNECTION_FAILED",
            DirectoryError::ConnectionTimeout { .. } => "CONNECTION_TIMEOUT",
            DirectoryError::AuthenticationFailed => "AUTH_FAILED",
            DirectoryError::NotFound { .. } => "OBJECT_NOT_FOUND",
            DirectoryError::AlreadyExists { .. } => "OBJECT_EXISTS",
            DirectoryError::OperationFailed { .. } => "OPERATION_FAILED",
            DirectoryError::InvalidConfiguration { .. } => "INVALID_CONFIG",
            DirectoryError::InvalidData { .. } => "INVALID_DATA",
        }
    }

    /// Create a connection failed error.
    pub fn connection_failed(message: impl Into<String>) -> Self {
        DirectoryError::ConnectionFailed {
            message: message.into(),
            source: None,
        }
    }

    /// Create a connection failed error with source.
    pub fn connection_failed_with_source(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        DirectoryError::ConnectionFailed {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Create an operation failed error.
    pub fn operation_failed(message: impl Into<String>) -> Self {
        DirectoryError::OperationFailed {
            message: message.into(),
            code: None,
        }
    }

    /// Map a non-success LDAP result code for an operation on `dn`.
    pub fn from_result_code(code: u32, text: &str, operation: &str, dn: &str) -> Self {
        match code {
            rc::NO_SUCH_OBJECT => DirectoryError::NotFound { dn: dn.to_string() },
            rc::ALREADY_EXISTS => DirectoryError::AlreadyExists { dn: dn.to_string() },
            rc::INVALID_CREDENTIALS => DirectoryError::AuthenticationFailed,
            rc::BUSY | rc::UNAVAILABLE | rc::OTHER => DirectoryError::connection_failed(format!(
                "LDAP {operation} on {dn} failed with code {code}: {text}"
            )),
            _ => DirectoryError::OperationFailed {
                message: format!("LDAP {operation} on {dn} failed with code {code}: {text}"),
                code: Some(code),
            },
        }
    }
}

/// Result type for directory operations.
pub type DirectoryResult<T> = Result<T, DirectoryError>;
