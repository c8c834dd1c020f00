//! Live membership model and derived directory attributes.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt::{Display, Formatter};

use crate::ids::{IdentityId, RoleId};

/// Role names are the directory group names.
pub type RoleName = String;

/// A role as reported by the live membership source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Role {
    /// Stable role id.
    pub id: RoleId,

    /// Current role name (mutable on the platform).
    pub name: RoleName,

    /// The platform's implicit everyone-role. Never synchronized.
    #[serde(default)]
    pub is_default: bool,
}

impl Role {
    pub fn new(id: impl Into<RoleId>, name: impl Into<RoleName>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            is_default: false,
        }
    }
}

/// A member of the live membership source together with its current roles.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Member {
    /// Stable identity id.
    pub id: IdentityId,

    /// Platform display name; the directory username when the mirror has none.
    pub display_name: String,

    /// Automated accounts are skipped by bulk sync.
    #[serde(default)]
    pub bot: bool,

    /// All roles the member currently holds, including the default role.
    #[serde(default)]
    pub roles: Vec<Role>,
}

impl Member {
    pub fn new(id: impl Into<IdentityId>, display_name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            display_name: display_name.into(),
            bot: false,
            roles: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_role(mut self, role: Role) -> Self {
        self.roles.push(role);
        self
    }

    /// Roles that take part in synchronization (the default role excluded).
    pub fn live_roles(&self) -> impl Iterator<Item = &Role> {
        self.roles.iter().filter(|r| !r.is_default)
    }

    /// Names of the live roles.
    #[must_use]
    pub fn live_role_names(&self) -> BTreeSet<RoleName> {
        self.live_roles().map(|r| r.name.clone()).collect()
    }

    /// Ids of the live roles.
    #[must_use]
    pub fn live_role_ids(&self) -> BTreeSet<RoleId> {
        self.live_roles().map(|r| r.id).collect()
    }
}

/// Identity profile as stored in the mirror.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Profile {
    pub username: String,
    pub email: String,
}

/// POSIX tier derived from role membership.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Tier {
    #[default]
    None,
    Member,
    Root,
}

impl Tier {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Tier::None => "none",
            Tier::Member => "member",
            Tier::Root => "root",
        }
    }

    /// Whether this tier carries a POSIX profile.
    #[must_use]
    pub fn has_posix(&self) -> bool {
        !matches!(self, Tier::None)
    }
}

impl Display for Tier {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// POSIX login attributes of a directory entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PosixProfile {
    pub uid_number: u32,
    pub gid_number: u32,
    pub home_directory: String,
    pub login_shell: String,
}

/// Storage quota in megabytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Quota(pub u64);

impl Quota {
    #[must_use]
    pub const fn megabytes(mb: u64) -> Self {
        Self(mb)
    }

    /// Directory attribute value, e.g. `"512MB"`.
    #[must_use]
    pub fn to_attribute_value(&self) -> String {
        format!("{}MB", self.0)
    }
}

impl Display for Quota {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}MB", self.0)
    }
}
