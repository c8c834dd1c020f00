//! rolesync Mirror Store
//!
//! The relational record of what was last synchronized: per-identity role
//! baselines, identity profiles and the role catalogue (names and quotas).
//!
//! The engine only depends on the [`MirrorStore`] trait; [`MySqlMirror`]
//! is the production implementation.

pub mod error;
pub mod mysql;
pub mod store;

pub use error::{MirrorError, MirrorResult};
pub use mysql::MySqlMirror;
pub use store::MirrorStore;

pub use sqlx::mysql::MySqlConnectOptions;
