//! rolesync Core Library
//!
//! Shared types and the pure policies of the reconciliation engine.
//!
//! # Modules
//!
//! - [`ids`] - Strongly typed platform identifiers (IdentityId, RoleId)
//! - [`model`] - Live membership types (Member, Role) and derived attributes
//! - [`diff`] - Role Differ: live vs. baseline role sets
//! - [`posix`] - POSIX Policy: tier classification and uid derivation
//! - [`quota`] - Quota Policy: maximum applicable storage quota
//!
//! Nothing in this crate performs I/O.
//!
//! # Example
//!
//! ```
//! use std::collections::BTreeSet;
//! use rolesync_core::diff::diff;
//!
//! let live: BTreeSet<String> = ["B", "C"].iter().map(|s| s.to_string()).collect();
//! let baseline: BTreeSet<String> = ["A", "B"].iter().map(|s| s.to_string()).collect();
//!
//! let d = diff(&live, &baseline);
//! assert!(d.to_add.contains("C"));
//! assert!(d.to_remove.contains("A"));
//! ```

pub mod diff;
pub mod ids;
pub mod model;
pub mod posix;
pub mod quota;

pub use diff::{diff, RoleDiff};
pub use ids::{IdentityId, ParseIdError, RoleId};
pub use model::{Member, PosixProfile, Profile, Quota, Role, RoleName, Tier};
pub use posix::{HashUidAllocator, PosixPolicy, UidAllocator};
pub use quota::max_quota;
