//! Lifecycle events consumed by the [`EventRouter`](crate::EventRouter).

use rolesync_core::{Member, Role, RoleId};
use serde::{Deserialize, Serialize};

/// A signal from the live membership source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum LifecycleEvent {
    /// A member joined; reconcile it.
    MemberJoined { member: Member },

    /// A member's roles changed. `member.roles` holds the roles after the
    /// change; the previous roles are informational only since the diff is
    /// taken against the mirror baseline.
    MemberRolesChanged {
        member: Member,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        before_roles: Option<Vec<Role>>,
    },

    /// A role was renamed on the platform.
    RoleRenamed {
        role_id: RoleId,
        old_name: String,
        new_name: String,
    },

    /// Reconcile every member. An empty list re-reconciles the last known
    /// roster.
    BulkSync {
        #[serde(default)]
        members: Vec<Member>,
    },
}

impl LifecycleEvent {
    pub fn kind(&self) -> &'static str {
        match self {
            LifecycleEvent::MemberJoined { .. } => "member_joined",
            LifecycleEvent::MemberRolesChanged { .. } => "member_roles_changed",
            LifecycleEvent::RoleRenamed { .. } => "role_renamed",
            LifecycleEvent::BulkSync { .. } => "bulk_sync",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deserialize_roles_changed() {
        let json = r#"{
            "type": "member_roles_changed",
            "member": {
                "id": "1412179000000000001",
                "display_name": "alice",
                "roles": [{"id": "42", "name": "editors"}]
            }
        }"#;
        let event: LifecycleEvent = serde_json::from_str(json).unwrap();
        match event {
            LifecycleEvent::MemberRolesChanged {
                member,
                before_roles,
            } => {
                assert_eq!(member.id.get(), 1_412_179_000_000_000_001);
                assert_eq!(member.roles[0].id, RoleId::new(42));
                assert!(before_roles.is_none());
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_deserialize_rename_and_bulk() {
        let rename: LifecycleEvent = serde_json::from_str(
            r#"{"type": "role_renamed", "role_id": 42, "old_name": "editors", "new_name": "contributors"}"#,
        )
        .unwrap();
        assert_eq!(rename.kind(), "role_renamed");

        let bulk: LifecycleEvent = serde_json::from_str(r#"{"type": "bulk_sync"}"#).unwrap();
        assert_eq!(bulk, LifecycleEvent::BulkSync { members: vec![] });
    }

    #[test]
    fn test_unknown_type_is_rejected() {
        assert!(serde_json::from_str::<LifecycleEvent>(r#"{"type": "member_left"}"#).is_err());
    }
}
