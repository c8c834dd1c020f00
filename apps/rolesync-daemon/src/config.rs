//! Daemon configuration loaded from environment variables.
//!
//! Fail-fast: required variables must be present and valid, or the daemon
//! exits before connecting to anything.

use std::env;
use std::net::SocketAddr;
use std::str::FromStr;

use rolesync_core::{HashUidAllocator, PosixPolicy};
use rolesync_directory::{DirectoryConfig, DEFAULT_BASE_DN};
use rolesync_mirror::MySqlConnectOptions;
use thiserror::Error;

/// Default tier role ids.
pub const DEFAULT_ROOT_ROLE_ID: u64 = 1_412_179_886_277_263_460;
pub const DEFAULT_MEMBER_ROLE_ID: u64 = 1_412_179_766_466_969_661;

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingVar(String),

    #[error("Invalid value for {var}: {message}")]
    InvalidValue { var: String, message: String },
}

/// Mirror database connection settings.
#[derive(Clone)]
pub struct MirrorConfig {
    pub options: MySqlConnectOptions,
    pub max_connections: u32,
}

/// External notification hook.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HookConfig {
    pub script: String,
    pub interpreter: Option<String>,
}

/// Complete daemon configuration.
#[derive(Clone)]
pub struct Config {
    pub directory: DirectoryConfig,
    pub mirror: MirrorConfig,
    pub posix: PosixPolicy,
    pub uid_allocator: HashUidAllocator,
    pub mail_domain: String,
    pub hook: Option<HookConfig>,
    pub lifecycle_token: String,
    pub listen_addr: SocketAddr,
    pub concurrency: usize,
    pub rust_log: String,
}

impl std::fmt::Debug for Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Config")
            .field("directory", &self.directory)
            .field("mirror_max_connections", &self.mirror.max_connections)
            .field("posix", &self.posix)
            .field("uid_allocator", &self.uid_allocator)
            .field("mail_domain", &self.mail_domain)
            .field("hook", &self.hook)
            .field("lifecycle_token", &"***REDACTED***")
            .field("listen_addr", &self.listen_addr)
            .field("concurrency", &self.concurrency)
            .field("rust_log", &self.rust_log)
            .finish()
    }
}

impl Config {
    /// Load configuration from the environment.
    ///
    /// # Required Variables
    ///
    /// - `LDAP_SERVER`, `LDAP_USER`, `LDAP_PASSWORD`
    /// - `DATABASE_URL`, or `MYSQL_HOST`, `MYSQL_USER`, `MYSQL_PASSWORD`
    ///   and `MYSQL_DATABASE`
    /// - `LIFECYCLE_TOKEN`
    pub fn from_env() -> Result<Self, ConfigError> {
        // Load .env file if present (development only)
        let _ = dotenvy::dotenv();

        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Load configuration through `lookup`. Empty values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let vars = Vars(lookup);

        // Directory
        let server = vars.required("LDAP_SERVER")?;
        let bind_dn = vars.required("LDAP_USER")?;
        let bind_password = vars.required("LDAP_PASSWORD")?;
        let base_dn = vars.or("LDAP_BASE_DN", DEFAULT_BASE_DN);

        let mut directory = DirectoryConfig::new(server, base_dn, bind_dn).with_password(bind_password);
        if vars.parse_or("LDAP_STARTTLS", false)? {
            directory = directory.with_starttls();
        }
        directory.timeout_secs = vars.parse_or("LDAP_TIMEOUT_SECS", directory.timeout_secs)?;
        if directory.timeout_secs == 0 {
            return Err(invalid("LDAP_TIMEOUT_SECS", "must be at least 1"));
        }
        if let Some(classes) = vars.get("LDAP_USER_OBJECT_CLASSES") {
            directory.user_object_classes = split_list(&classes);
        }
        if let Some(attribute) = vars.get("LDAP_QUOTA_ATTRIBUTE") {
            directory.quota_attribute = attribute;
        }
        directory
            .validate()
            .map_err(|e| invalid("LDAP_SERVER", &e.to_string()))?;

        // Mirror
        let options = match vars.get("DATABASE_URL") {
            Some(url) => MySqlConnectOptions::from_str(&url)
                .map_err(|e| invalid("DATABASE_URL", &e.to_string()))?,
            None => MySqlConnectOptions::new()
                .host(&vars.required("MYSQL_HOST")?)
                .port(vars.parse_or("MYSQL_PORT", 3306u16)?)
                .username(&vars.required("MYSQL_USER")?)
                .password(&vars.required("MYSQL_PASSWORD")?)
                .database(&vars.required("MYSQL_DATABASE")?),
        };
        let mirror = MirrorConfig {
            options,
            max_connections: vars.parse_or("MYSQL_MAX_CONNECTIONS", 5u32)?.max(1),
        };

        // POSIX
        let posix = PosixPolicy::new(
            vars.parse_or("POSIX_ROOT_ROLE_ID", DEFAULT_ROOT_ROLE_ID)?,
            vars.parse_or("POSIX_MEMBER_ROLE_ID", DEFAULT_MEMBER_ROLE_ID)?,
        );
        let posix = PosixPolicy {
            root_gid: vars.parse_or("POSIX_ROOT_GID", posix.root_gid)?,
            member_gid: vars.parse_or("POSIX_MEMBER_GID", posix.member_gid)?,
            home_root: vars.or("POSIX_HOME_ROOT", &posix.home_root),
            login_shell: vars.or("POSIX_LOGIN_SHELL", &posix.login_shell),
            ..posix
        };
        if posix.root_role_id == posix.member_role_id {
            return Err(invalid(
                "POSIX_MEMBER_ROLE_ID",
                "must differ from POSIX_ROOT_ROLE_ID",
            ));
        }

        let defaults = HashUidAllocator::default();
        let uid_allocator = HashUidAllocator {
            base: vars.parse_or("POSIX_UID_BASE", defaults.base)?,
            range: vars.parse_or("POSIX_UID_RANGE", defaults.range)?,
        };
        if uid_allocator.range == 0 {
            return Err(invalid("POSIX_UID_RANGE", "must be at least 1"));
        }

        // Notifications
        let hook = vars.get("ROLE_HOOK").map(|script| HookConfig {
            script,
            interpreter: vars.get("ROLE_HOOK_INTERPRETER"),
        });

        // Ingest and routing
        let lifecycle_token = vars.required("LIFECYCLE_TOKEN")?;
        let listen_addr = vars.parse_or(
            "LISTEN_ADDR",
            SocketAddr::from(([0, 0, 0, 0], 8090)),
        )?;
        let concurrency: usize = vars.parse_or("SYNC_CONCURRENCY", 4)?;
        if concurrency == 0 {
            return Err(invalid("SYNC_CONCURRENCY", "must be at least 1"));
        }

        Ok(Self {
            directory,
            mirror,
            posix,
            uid_allocator,
            mail_domain: vars.or("MAIL_DOMAIN", "example.com"),
            hook,
            lifecycle_token,
            listen_addr,
            concurrency,
            rust_log: vars.or("RUST_LOG", "info"),
        })
    }
}

struct Vars<F>(F);

impl<F> Vars<F>
where
    F: Fn(&str) -> Option<String>,
{
    fn get(&self, name: &str) -> Option<String> {
        (self.0)(name)
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
    }

    fn required(&self, name: &str) -> Result<String, ConfigError> {
        self.get(name)
            .ok_or_else(|| ConfigError::MissingVar(name.to_string()))
    }

    fn or(&self, name: &str, default: &str) -> String {
        self.get(name).unwrap_or_else(|| default.to_string())
    }

    fn parse_or<T>(&self, name: &str, default: T) -> Result<T, ConfigError>
    where
        T: FromStr,
        T::Err: std::fmt::Display,
    {
        match self.get(name) {
            Some(raw) => raw.parse().map_err(|e: T::Err| invalid(name, &e.to_string())),
            None => Ok(default),
        }
    }
}

fn invalid(var: &str, message: &str) -> ConfigError {
    ConfigError::InvalidValue {
        var: var.to_string(),
        message: message.to_string(),
    }
}

fn split_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}
