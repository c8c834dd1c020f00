//! MySQL-backed [`MirrorStore`].
//!
//! Works against the existing tables (schema management is not ours):
//!
//! - `users (id, discord_id, name, email)`
//! - `roles (id, role_id, name, quota)`, `role_id` unique, `quota` in MB, nullable
//! - `user_roles (user_id, role_id)` referencing `users.id` and `roles.id`
//!
//! Baselines are stored by name. Role names are not unique, so a name held
//! by several roles rows links to the oldest of them (lowest `roles.id`).

use std::collections::{BTreeSet, HashMap};
use std::time::Duration;

use async_trait::async_trait;
use rolesync_core::{IdentityId, Profile, Quota, RoleId, RoleName};
use sqlx::mysql::{MySqlConnectOptions, MySqlPool, MySqlPoolOptions};
use tracing::{debug, info, instrument, warn};

use crate::error::{MirrorError, MirrorResult};
use crate::store::MirrorStore;

/// Links one baseline role, by name, to the oldest roles row carrying it.
const LINK_BASELINE_ROLE: &str = r"
    INSERT IGNORE INTO user_roles (user_id, role_id)
    SELECT ?, id FROM roles WHERE name = ?
    ORDER BY id
    LIMIT 1
";

/// Mirror store over a MySQL connection pool.
#[derive(Debug, Clone)]
pub struct MySqlMirror {
    pool: MySqlPool,
}

impl MySqlMirror {
    /// Connect a pool and verify it with one round trip.
    pub async fn connect(
        options: MySqlConnectOptions,
        max_connections: u32,
        acquire_timeout: Duration,
    ) -> MirrorResult<Self> {
        let pool = MySqlPoolOptions::new()
            .max_connections(max_connections.max(1))
            .acquire_timeout(acquire_timeout)
            .connect_with(options)
            .await
            .map_err(MirrorError::ConnectionFailed)?;

        sqlx::query("SELECT 1")
            .execute(&pool)
            .await
            .map_err(MirrorError::ConnectionFailed)?;

        info!(max_connections, "Mirror pool connected");
        Ok(Self { pool })
    }

    /// Wrap an existing pool.
    pub fn from_pool(pool: MySqlPool) -> Self {
        Self { pool }
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }

    async fn user_row_id(&self, identity: IdentityId) -> MirrorResult<Option<i64>> {
        let row: Option<(i64,)> =
            sqlx::query_as("SELECT CAST(id AS SIGNED) FROM users WHERE discord_id = ?")
                .bind(identity.get())
                .fetch_optional(&self.pool)
                .await?;
        Ok(row.map(|(id,)| id))
    }
}

#[async_trait]
impl MirrorStore for MySqlMirror {
    #[instrument(skip(self), fields(identity = %identity))]
    async fn get_baseline_roles(&self, identity: IdentityId) -> MirrorResult<BTreeSet<RoleName>> {
        let rows: Vec<(String,)> = sqlx::query_as(
            r"
            SELECT r.name FROM roles r
            JOIN user_roles ur ON r.id = ur.role_id
            JOIN users u ON u.id = ur.user_id
            WHERE u.discord_id = ?
            ",
        )
        .bind(identity.get())
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(|(name,)| name).collect())
    }

    #[instrument(skip(self, roles), fields(identity = %identity, count = roles.len()))]
    async fn set_baseline_roles(
        &self,
        identity: IdentityId,
        roles: &BTreeSet<RoleName>,
    ) -> MirrorResult<()> {
        let user_id = self
            .user_row_id(identity)
            .await?
            .ok_or_else(|| MirrorError::NotFound(format!("identity {identity}")))?;

        let mut tx = self.pool.begin().await?;

        sqlx::query("DELETE FROM user_roles WHERE user_id = ?")
            .bind(user_id)
            .execute(&mut *tx)
            .await?;

        for name in roles {
            let inserted = sqlx::query(LINK_BASELINE_ROLE)
                .bind(user_id)
                .bind(name)
                .execute(&mut *tx)
                .await?
                .rows_affected();

            if inserted == 0 {
                warn!(role = %name, "Baseline role has no roles row; skipped");
            }
        }

        tx.commit().await?;
        debug!("Baseline written");
        Ok(())
    }

    #[instrument(skip(self), fields(identity = %identity))]
    async fn get_profile(&self, identity: IdentityId) -> MirrorResult<Option<Profile>> {
        let row: Option<(Option<String>, Option<String>)> =
            sqlx::query_as("SELECT name, email FROM users WHERE discord_id = ?")
                .bind(identity.get())
                .fetch_optional(&self.pool)
                .await?;

        Ok(row.and_then(|(name, email)| {
            let username = name.filter(|n| !n.trim().is_empty())?;
            Some(Profile {
                username,
                email: email.unwrap_or_default(),
            })
        }))
    }

    #[instrument(skip(self, profile), fields(identity = %identity, username = %profile.username))]
    async fn ensure_profile(&self, identity: IdentityId, profile: &Profile) -> MirrorResult<bool> {
        let created = sqlx::query(
            r"
            INSERT INTO users (discord_id, name, email)
            SELECT ?, ?, ? FROM DUAL
            WHERE NOT EXISTS (SELECT 1 FROM users WHERE discord_id = ?)
            ",
        )
        .bind(identity.get())
        .bind(&profile.username)
        .bind(&profile.email)
        .bind(identity.get())
        .execute(&self.pool)
        .await?
        .rows_affected()
            > 0;

        if created {
            info!("Mirror identity record created");
        }
        Ok(created)
    }

    #[instrument(skip(self))]
    async fn upsert_role_name(&self, role: RoleId, name: &str) -> MirrorResult<()> {
        sqlx::query("INSERT INTO roles (role_id, name) VALUES (?, ?) ON DUPLICATE KEY UPDATE name = ?")
            .bind(role.get())
            .bind(name)
            .bind(name)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    #[instrument(skip(self))]
    async fn get_all_role_names(&self) -> MirrorResult<HashMap<RoleId, RoleName>> {
        let rows: Vec<(u64, String)> =
            sqlx::query_as("SELECT CAST(role_id AS UNSIGNED), name FROM roles")
                .fetch_all(&self.pool)
                .await?;

        Ok(rows
            .into_iter()
            .map(|(id, name)| (RoleId::new(id), name))
            .collect())
    }

    #[instrument(skip(self))]
    async fn get_role_quotas(&self) -> MirrorResult<HashMap<RoleId, Quota>> {
        let rows: Vec<(u64, i64)> = sqlx::query_as(
            "SELECT CAST(role_id AS UNSIGNED), CAST(quota AS SIGNED) FROM roles WHERE quota IS NOT NULL",
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .filter_map(|(id, mb)| {
                let mb = u64::try_from(mb).ok()?;
                Some((RoleId::new(id), Quota::megabytes(mb)))
            })
            .collect())
    }
}
