//! Directory gateway configuration
//!
//! Connection settings plus the fixed layout rolesync maintains under the
//! base DN: `ou=users` for person entries and `ou=groups` for one
//! `groupOfNames` entry per role.

use serde::{Deserialize, Serialize};

use crate::error::{DirectoryError, DirectoryResult};
use crate::escape::escape_dn_value;

/// Configuration for the LDAP gateway.
#[derive(Clone, Serialize, Deserialize)]
pub struct DirectoryConfig {
    /// Server address: `ldap://host:port`, `ldaps://host:port` or a bare host.
    pub server: String,

    /// Bind DN for authentication (e.g., "cn=admin,dc=example,dc=org").
    pub bind_dn: String,

    /// Bind password.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bind_password: Option<String>,

    /// Base DN under which users and groups are maintained.
    pub base_dn: String,

    /// Use STARTTLS upgrade on plain LDAP connection.
    #[serde(default)]
    pub use_starttls: bool,

    /// Connect and per-operation timeout.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// Object classes of created user entries.
    #[serde(default = "default_user_object_classes")]
    pub user_object_classes: Vec<String>,

    /// Attribute holding the storage quota.
    #[serde(default = "default_quota_attribute")]
    pub quota_attribute: String,

    /// `uid` of the reserved placeholder member of every group.
    #[serde(default = "default_placeholder_uid")]
    pub placeholder_uid: String,
}

impl std::fmt::Debug for DirectoryConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DirectoryConfig")
            .field("server", &self.server)
            .field("bind_dn", &self.bind_dn)
            .field(
                "bind_password",
                &self.bind_password.as_ref().map(|_| "***REDACTED***"),
            )
            .field("base_dn", &self.base_dn)
            .field("use_starttls", &self.use_starttls)
            .field("timeout_secs", &self.timeout_secs)
            .field("user_object_classes", &self.user_object_classes)
            .field("quota_attribute", &self.quota_attribute)
            .field("placeholder_uid", &self.placeholder_uid)
            .finish()
    }
}

/// Base DN used when none is configured.
pub const DEFAULT_BASE_DN: &str = "dc=yetanotherprojecttosavetheworld,dc=org";

fn default_timeout_secs() -> u64 {
    10
}

/// `chimeraPerson` carries the quota attribute in the target schema.
pub fn default_user_object_classes() -> Vec<String> {
    vec![
        "top".to_string(),
        "person".to_string(),
        "organizationalPerson".to_string(),
        "inetOrgPerson".to_string(),
        "chimeraPerson".to_string(),
    ]
}

fn default_quota_attribute() -> String {
    "quota".to_string()
}

fn default_placeholder_uid() -> String {
    "nobody_001".to_string()
}

impl DirectoryConfig {
    /// Create a new config with required fields.
    pub fn new(
        server: impl Into<String>,
        base_dn: impl Into<String>,
        bind_dn: impl Into<String>,
    ) -> Self {
        Self {
            server: server.into(),
            bind_dn: bind_dn.into(),
            bind_password: None,
            base_dn: base_dn.into(),
            use_starttls: false,
            timeout_secs: default_timeout_secs(),
            user_object_classes: default_user_object_classes(),
            quota_attribute: default_quota_attribute(),
            placeholder_uid: default_placeholder_uid(),
        }
    }

    /// Set bind password.
    pub fn with_password(mut self, password: impl Into<String>) -> Self {
        self.bind_password = Some(password.into());
        self
    }

    /// Enable STARTTLS.
    #[must_use]
    pub fn with_starttls(mut self) -> Self {
        self.use_starttls = true;
        self
    }

    /// Validate required fields.
    pub fn validate(&self) -> DirectoryResult<()> {
        if self.server.trim().is_empty() {
            return Err(DirectoryError::InvalidConfiguration {
                message: "server is required".to_string(),
            });
        }

        if self.base_dn.trim().is_empty() {
            return Err(DirectoryError::InvalidConfiguration {
                message: "base_dn is required".to_string(),
            });
        }

        if self.bind_dn.trim().is_empty() {
            return Err(DirectoryError::InvalidConfiguration {
                message: "bind_dn is required".to_string(),
            });
        }

        if self.use_starttls && self.url().starts_with("ldaps://") {
            return Err(DirectoryError::InvalidConfiguration {
                message: "cannot use both LDAPS and STARTTLS".to_string(),
            });
        }

        if self.placeholder_uid.trim().is_empty() {
            return Err(DirectoryError::InvalidConfiguration {
                message: "placeholder_uid must not be empty".to_string(),
            });
        }

        Ok(())
    }

    /// Get the LDAP URL, defaulting the scheme for bare hosts.
    #[must_use]
    pub fn url(&self) -> String {
        let server = self.server.trim();
        if server.starts_with("ldap://") || server.starts_with("ldaps://") {
            server.to_string()
        } else {
            format!("ldap://{server}")
        }
    }

    /// `ou=users,<base>`.
    #[must_use]
    pub fn users_dn(&self) -> String {
        format!("ou=users,{}", self.base_dn)
    }

    /// `ou=groups,<base>`.
    #[must_use]
    pub fn groups_dn(&self) -> String {
        format!("ou=groups,{}", self.base_dn)
    }

    /// DN of a user entry.
    #[must_use]
    pub fn user_dn(&self, username: &str) -> String {
        format!("uid={},{}", escape_dn_value(username), self.users_dn())
    }

    /// DN of a role group.
    #[must_use]
    pub fn group_dn(&self, group: &str) -> String {
        format!("cn={},{}", escape_dn_value(group), self.groups_dn())
    }

    /// DN of the placeholder entry.
    #[must_use]
    pub fn placeholder_dn(&self) -> String {
        self.user_dn(&self.placeholder_uid)
    }
}
