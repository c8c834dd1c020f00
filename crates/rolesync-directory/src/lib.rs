//! rolesync Directory Gateway
//!
//! Idempotent LDAP primitives for the reconciliation engine.
//!
//! # Layout
//!
//! Everything lives under one base DN:
//!
//! - `ou=users,<base>` holds one `uid=<username>` person entry per identity
//!   plus the placeholder entry
//! - `ou=groups,<base>` holds one `groupOfNames` entry `cn=<role>` per role
//!
//! `groupOfNames` requires at least one `member`, so every group always
//! contains the placeholder. Creating a group adds it, removing members
//! never takes it out.
//!
//! # Error classification
//!
//! [`DirectoryError::is_connection`] separates failures that make the
//! directory unusable from failures of one operation. Duplicate adds and
//! missing removes are not errors at all.

pub mod config;
pub mod error;
pub mod escape;
pub mod gateway;
pub mod ldap;
pub mod locks;

pub use config::{DirectoryConfig, DEFAULT_BASE_DN};
pub use error::{DirectoryError, DirectoryResult};
pub use gateway::{DirectoryGateway, EnsureOutcome, MembershipChange};
pub use ldap::LdapDirectory;
pub use locks::GroupLocks;
