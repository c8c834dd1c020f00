//! LDAP implementation of [`DirectoryGateway`] on top of `ldap3`.
//!
//! The bound connection is cached and shared by all operations; any
//! transport error drops it so the next call reconnects. Membership edits
//! take the per-group lock from [`GroupLocks`].

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use ldap3::{Ldap, LdapConnAsync, LdapConnSettings, LdapError, LdapResult, Mod, Scope, SearchEntry};
use rolesync_core::{PosixProfile, Profile, Quota};
use tokio::sync::RwLock;
use tracing::{debug, info, instrument, warn};

use crate::config::DirectoryConfig;
use crate::error::{rc, DirectoryError, DirectoryResult};
use crate::escape::{dn_eq, escape_dn_value};
use crate::gateway::{DirectoryGateway, EnsureOutcome, MembershipChange};
use crate::locks::GroupLocks;

/// Auxiliary object classes carrying the POSIX login attributes.
pub const POSIX_OBJECT_CLASSES: [&str; 2] = ["posixAccount", "shadowAccount"];

/// The four POSIX attributes set and cleared together.
pub const POSIX_ATTRIBUTES: [&str; 4] = ["uidNumber", "gidNumber", "homeDirectory", "loginShell"];

const PLACEHOLDER_CN: &str = "Nobody";
const PLACEHOLDER_SN: &str = "Placeholder";
const PLACEHOLDER_MAIL: &str = "nobody@example.com";

type Attrs = Vec<(String, HashSet<String>)>;

/// Directory gateway backed by an LDAP server.
pub struct LdapDirectory {
    config: DirectoryConfig,

    /// Cached bound connection (lazily initialized).
    connection: Arc<RwLock<Option<Ldap>>>,

    group_locks: GroupLocks,
}

impl LdapDirectory {
    /// Create a gateway. No connection is made until the first operation.
    pub fn new(config: DirectoryConfig) -> DirectoryResult<Self> {
        config.validate()?;

        Ok(Self {
            config,
            connection: Arc::new(RwLock::new(None)),
            group_locks: GroupLocks::new(),
        })
    }

    pub fn config(&self) -> &DirectoryConfig {
        &self.config
    }

    fn timeout(&self) -> Duration {
        Duration::from_secs(self.config.timeout_secs)
    }

    /// Get the cached connection, connecting and binding if necessary.
    async fn connection(&self) -> DirectoryResult<Ldap> {
        {
            let guard = self.connection.read().await;
            if let Some(ref ldap) = *guard {
                return Ok(ldap.clone());
            }
        }

        let mut guard = self.connection.write().await;
        if let Some(ref ldap) = *guard {
            return Ok(ldap.clone());
        }

        let ldap = self.connect().await?;
        *guard = Some(ldap.clone());
        Ok(ldap)
    }

    async fn connect(&self) -> DirectoryResult<Ldap> {
        let url = self.config.url();

        debug!(url = %url, "Connecting to LDAP server");

        let settings = LdapConnSettings::new()
            .set_conn_timeout(self.timeout())
            .set_starttls(self.config.use_starttls);

        let (conn, mut ldap) = LdapConnAsync::with_settings(settings, &url)
            .await
            .map_err(|e| self.transport_error("connect", &url, e))?;

        tokio::spawn(async move {
            if let Err(e) = conn.drive().await {
                warn!(error = %e, "LDAP connection driver error");
            }
        });

        let bind_dn = &self.config.bind_dn;
        let bind_password = self.config.bind_password.as_deref().unwrap_or("");

        debug!(bind_dn = %bind_dn, "Performing LDAP bind");

        let result = ldap
            .with_timeout(self.timeout())
            .simple_bind(bind_dn, bind_password)
            .await
            .map_err(|e| self.transport_error("bind", bind_dn, e))?;

        if result.rc == rc::INVALID_CREDENTIALS {
            return Err(DirectoryError::AuthenticationFailed);
        }
        if result.rc != rc::SUCCESS {
            return Err(DirectoryError::connection_failed(format!(
                "LDAP bind failed with code {}: {}",
                result.rc, result.text
            )));
        }

        info!(url = %url, "LDAP connection established");

        Ok(ldap)
    }

    /// Unbind and drop the cached connection.
    pub async fn close(&self) {
        let ldap = self.connection.write().await.take();
        if let Some(mut ldap) = ldap {
            if let Err(e) = ldap.unbind().await {
                debug!(error = %e, "LDAP unbind failed");
            }
        }
    }

    async fn invalidate(&self) {
        if self.connection.write().await.take().is_some() {
            debug!("Dropped cached LDAP connection");
        }
    }

    fn transport_error(&self, operation: &str, dn: &str, err: LdapError) -> DirectoryError {
        match err {
            LdapError::Timeout { .. } => DirectoryError::ConnectionTimeout {
                timeout_secs: self.config.timeout_secs,
            },
            other => DirectoryError::connection_failed_with_source(
                format!("LDAP {operation} on {dn} failed"),
                other,
            ),
        }
    }

    /// Turn a transport result into a directory result, dropping the cached
    /// connection on failure.
    async fn check_transport<T>(
        &self,
        result: Result<T, LdapError>,
        operation: &str,
        dn: &str,
    ) -> DirectoryResult<T> {
        match result {
            Ok(value) => Ok(value),
            Err(e) => {
                self.invalidate().await;
                Err(self.transport_error(operation, dn, e))
            }
        }
    }

    async fn fail(&self, result: &LdapResult, operation: &str, dn: &str) -> DirectoryError {
        let err = DirectoryError::from_result_code(result.rc, &result.text, operation, dn);
        if err.is_connection() {
            self.invalidate().await;
        }
        err
    }

    /// Read one entry by DN. `None` when it does not exist.
    async fn read_entry(&self, dn: &str, attrs: &[&str]) -> DirectoryResult<Option<SearchEntry>> {
        let mut ldap = self.connection().await?;
        let result = ldap
            .with_timeout(self.timeout())
            .search(dn, Scope::Base, "(objectClass=*)", attrs.to_vec())
            .await;
        let result = self.check_transport(result, "search", dn).await?;

        match result.1.rc {
            rc::SUCCESS => Ok(result.0.into_iter().next().map(SearchEntry::construct)),
            rc::NO_SUCH_OBJECT => Ok(None),
            _ => Err(self.fail(&result.1, "search", dn).await),
        }
    }

    /// Add an entry, treating "already exists" as success.
    async fn add_entry(&self, dn: &str, attrs: Attrs) -> DirectoryResult<EnsureOutcome> {
        let mut ldap = self.connection().await?;
        let result = ldap.with_timeout(self.timeout()).add(dn, attrs).await;
        let result = self.check_transport(result, "add", dn).await?;

        match result.rc {
            rc::SUCCESS => Ok(EnsureOutcome::Created),
            rc::ALREADY_EXISTS => Ok(EnsureOutcome::Existed),
            _ => Err(self.fail(&result, "add", dn).await),
        }
    }

    /// Apply modifications and return the raw result code for the caller
    /// to interpret codes it tolerates.
    async fn modify_entry(&self, dn: &str, mods: Vec<Mod<String>>) -> DirectoryResult<LdapResult> {
        let mut ldap = self.connection().await?;
        let result = ldap.with_timeout(self.timeout()).modify(dn, mods).await;
        self.check_transport(result, "modify", dn).await
    }

    async fn modify_strict(&self, dn: &str, mods: Vec<Mod<String>>) -> DirectoryResult<()> {
        let result = self.modify_entry(dn, mods).await?;
        if result.rc != rc::SUCCESS {
            return Err(self.fail(&result, "modify", dn).await);
        }
        Ok(())
    }
}

impl std::fmt::Debug for LdapDirectory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LdapDirectory")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl DirectoryGateway for LdapDirectory {
    #[instrument(skip(self), fields(base_dn = %self.config.base_dn))]
    async fn ensure_structure(&self) -> DirectoryResult<()> {
        for (ou, dn) in [
            ("users", self.config.users_dn()),
            ("groups", self.config.groups_dn()),
        ] {
            let outcome = self.add_entry(&dn, organizational_unit_attributes(ou)).await?;
            if outcome.created() {
                info!(dn = %dn, "Created organizational unit");
            } else {
                debug!(dn = %dn, "Organizational unit already exists");
            }
        }
        Ok(())
    }

    #[instrument(skip(self))]
    async fn ensure_placeholder(&self) -> DirectoryResult<EnsureOutcome> {
        let dn = self.config.placeholder_dn();
        let outcome = self
            .add_entry(&dn, placeholder_attributes(&self.config))
            .await?;
        if outcome.created() {
            info!(dn = %dn, "Created placeholder entry");
        }
        Ok(outcome)
    }

    #[instrument(skip(self, profile), fields(username = %profile.username))]
    async fn ensure_entry(&self, profile: &Profile) -> DirectoryResult<EnsureOutcome> {
        let dn = self.config.user_dn(&profile.username);
        let outcome = self
            .add_entry(&dn, user_attributes(&self.config, profile))
            .await?;
        match outcome {
            EnsureOutcome::Created => info!(dn = %dn, "Created directory entry"),
            EnsureOutcome::Existed => debug!(dn = %dn, "Directory entry already exists"),
        }
        Ok(outcome)
    }

    #[instrument(skip(self))]
    async fn ensure_group(&self, group: &str) -> DirectoryResult<EnsureOutcome> {
        let _guard = self.group_locks.lock(group).await;
        let dn = self.config.group_dn(group);
        let placeholder = self.config.placeholder_dn();

        let Some(entry) = self.read_entry(&dn, &["member"]).await? else {
            let outcome = self
                .add_entry(&dn, group_attributes(group, &placeholder))
                .await?;
            if outcome.created() {
                info!(dn = %dn, "Created group");
            }
            return Ok(outcome);
        };

        if !contains_dn(attribute_values(&entry, "member"), &placeholder) {
            let result = self
                .modify_entry(&dn, vec![Mod::Add("member".to_string(), set_of(&placeholder))])
                .await?;
            match result.rc {
                rc::SUCCESS => info!(dn = %dn, "Restored placeholder membership"),
                rc::ATTRIBUTE_OR_VALUE_EXISTS => {}
                _ => return Err(self.fail(&result, "modify", &dn).await),
            }
        }

        Ok(EnsureOutcome::Existed)
    }

    #[instrument(skip(self))]
    async fn add_member(&self, group: &str, username: &str) -> DirectoryResult<MembershipChange> {
        let _guard = self.group_locks.lock(group).await;
        let dn = self.config.group_dn(group);
        let user_dn = self.config.user_dn(username);

        let result = self
            .modify_entry(&dn, vec![Mod::Add("member".to_string(), set_of(&user_dn))])
            .await?;

        match result.rc {
            rc::SUCCESS => {
                info!(group = %group, username = %username, "Added group member");
                Ok(MembershipChange::Changed)
            }
            rc::ATTRIBUTE_OR_VALUE_EXISTS => {
                debug!(group = %group, username = %username, "Already a group member");
                Ok(MembershipChange::Unchanged)
            }
            _ => Err(self.fail(&result, "modify", &dn).await),
        }
    }

    #[instrument(skip(self))]
    async fn remove_member(
        &self,
        group: &str,
        username: &str,
    ) -> DirectoryResult<MembershipChange> {
        let _guard = self.group_locks.lock(group).await;
        let dn = self.config.group_dn(group);
        let placeholder = self.config.placeholder_dn();
        let user_dn = self.config.user_dn(username);

        if dn_eq(&user_dn, &placeholder) {
            warn!(group = %group, "Refusing to remove the placeholder from a group");
            return Ok(MembershipChange::Unchanged);
        }

        let entry = self
            .read_entry(&dn, &["member"])
            .await?
            .ok_or_else(|| DirectoryError::NotFound { dn: dn.clone() })?;

        let Some(mods) = member_removal_mods(attribute_values(&entry, "member"), &user_dn, &placeholder)
        else {
            debug!(group = %group, username = %username, "Not a group member");
            return Ok(MembershipChange::Unchanged);
        };

        let result = self.modify_entry(&dn, mods).await?;
        match result.rc {
            rc::SUCCESS => {
                info!(group = %group, username = %username, "Removed group member");
                Ok(MembershipChange::Changed)
            }
            rc::NO_SUCH_ATTRIBUTE => {
                debug!(group = %group, username = %username, "Member already removed");
                Ok(MembershipChange::Unchanged)
            }
            _ => Err(self.fail(&result, "modify", &dn).await),
        }
    }

    #[instrument(skip(self))]
    async fn rename_group(&self, old_name: &str, new_name: &str) -> DirectoryResult<()> {
        // Lock both names in a fixed order so concurrent renames cannot deadlock.
        let (first, second) = if old_name.to_lowercase() <= new_name.to_lowercase() {
            (old_name, new_name)
        } else {
            (new_name, old_name)
        };
        let _first = self.group_locks.lock(first).await;
        let _second = if first.eq_ignore_ascii_case(second) {
            None
        } else {
            Some(self.group_locks.lock(second).await)
        };

        let dn = self.config.group_dn(old_name);
        let new_rdn = format!("cn={}", escape_dn_value(new_name));

        let mut ldap = self.connection().await?;
        let result = ldap
            .with_timeout(self.timeout())
            .modifydn(&dn, &new_rdn, true, None)
            .await;
        let result = self.check_transport(result, "modifydn", &dn).await?;

        if result.rc != rc::SUCCESS {
            return Err(self.fail(&result, "modifydn", &dn).await);
        }

        info!(old = %old_name, new = %new_name, "Renamed group");
        Ok(())
    }

    #[instrument(skip(self))]
    async fn uid_number(&self, username: &str) -> DirectoryResult<Option<u32>> {
        let dn = self.config.user_dn(username);
        let entry = self
            .read_entry(&dn, &["uidNumber"])
            .await?
            .ok_or_else(|| DirectoryError::NotFound { dn: dn.clone() })?;

        attribute_values(&entry, "uidNumber")
            .first()
            .map(|raw| {
                raw.trim().parse::<u32>().map_err(|_| DirectoryError::InvalidData {
                    message: format!("uidNumber '{raw}' of {dn} is not a number"),
                })
            })
            .transpose()
    }

    #[instrument(skip(self, posix), fields(uid = posix.uid_number, gid = posix.gid_number))]
    async fn set_posix_attributes(
        &self,
        username: &str,
        posix: &PosixProfile,
    ) -> DirectoryResult<()> {
        let dn = self.config.user_dn(username);
        let entry = self
            .read_entry(&dn, &["objectClass"])
            .await?
            .ok_or_else(|| DirectoryError::NotFound { dn: dn.clone() })?;

        let mods = posix_mods(attribute_values(&entry, "objectClass"), posix);
        self.modify_strict(&dn, mods).await?;

        info!(username = %username, "POSIX attributes set");
        Ok(())
    }

    #[instrument(skip(self))]
    async fn clear_posix_attributes(&self, username: &str) -> DirectoryResult<()> {
        let dn = self.config.user_dn(username);
        let mut wanted = vec!["objectClass"];
        wanted.extend(POSIX_ATTRIBUTES);

        let entry = self
            .read_entry(&dn, &wanted)
            .await?
            .ok_or_else(|| DirectoryError::NotFound { dn: dn.clone() })?;

        let mods = clear_posix_mods(&entry.attrs);
        if mods.is_empty() {
            debug!(username = %username, "No POSIX attributes to clear");
            return Ok(());
        }

        self.modify_strict(&dn, mods).await?;
        info!(username = %username, "POSIX attributes cleared");
        Ok(())
    }

    #[instrument(skip(self), fields(quota = %quota))]
    async fn set_quota(&self, username: &str, quota: Quota) -> DirectoryResult<()> {
        let dn = self.config.user_dn(username);
        let mods = vec![Mod::Replace(
            self.config.quota_attribute.clone(),
            set_of(&quota.to_attribute_value()),
        )];
        self.modify_strict(&dn, mods).await?;
        debug!(username = %username, "Quota written");
        Ok(())
    }
}

fn set_of(value: &str) -> HashSet<String> {
    HashSet::from([value.to_string()])
}

fn strings(values: &[&str]) -> HashSet<String> {
    values.iter().map(|v| (*v).to_string()).collect()
}

/// Values of an attribute, matching the name case-insensitively.
fn attribute_values<'a>(entry: &'a SearchEntry, name: &str) -> &'a [String] {
    find_attribute(&entry.attrs, name)
        .map(|(_, values)| values.as_slice())
        .unwrap_or(&[])
}

fn find_attribute<'a>(
    attrs: &'a HashMap<String, Vec<String>>,
    name: &str,
) -> Option<(&'a String, &'a Vec<String>)> {
    attrs.iter().find(|(key, _)| key.eq_ignore_ascii_case(name))
}

fn contains_dn(values: &[String], dn: &str) -> bool {
    values.iter().any(|v| dn_eq(v, dn))
}

fn organizational_unit_attributes(ou: &str) -> Attrs {
    vec![
        ("objectClass".to_string(), strings(&["top", "organizationalUnit"])),
        ("ou".to_string(), set_of(ou)),
    ]
}

fn placeholder_attributes(config: &DirectoryConfig) -> Attrs {
    vec![
        (
            "objectClass".to_string(),
            config.user_object_classes.iter().cloned().collect(),
        ),
        ("cn".to_string(), set_of(PLACEHOLDER_CN)),
        ("sn".to_string(), set_of(PLACEHOLDER_SN)),
        ("givenName".to_string(), set_of(PLACEHOLDER_CN)),
        ("uid".to_string(), set_of(&config.placeholder_uid)),
        ("mail".to_string(), set_of(PLACEHOLDER_MAIL)),
    ]
}

fn user_attributes(config: &DirectoryConfig, profile: &Profile) -> Attrs {
    vec![
        (
            "objectClass".to_string(),
            config.user_object_classes.iter().cloned().collect(),
        ),
        ("cn".to_string(), set_of(&profile.username)),
        ("sn".to_string(), set_of(&profile.username)),
        ("givenName".to_string(), set_of(&profile.username)),
        ("uid".to_string(), set_of(&profile.username)),
        ("mail".to_string(), set_of(&profile.email)),
    ]
}

fn group_attributes(group: &str, placeholder_dn: &str) -> Attrs {
    vec![
        ("objectClass".to_string(), strings(&["top", "groupOfNames"])),
        ("cn".to_string(), set_of(group)),
        ("member".to_string(), set_of(placeholder_dn)),
    ]
}

/// Modifications removing `user_dn` from a group with `members`.
///
/// `None` when the user is not a member. The placeholder is re-added in
/// the same modify when it went missing, so the group is never left empty.
fn member_removal_mods(
    members: &[String],
    user_dn: &str,
    placeholder_dn: &str,
) -> Option<Vec<Mod<String>>> {
    let stored = members.iter().find(|m| dn_eq(m, user_dn))?;

    let mut mods = Vec::with_capacity(2);
    if !contains_dn(members, placeholder_dn) {
        mods.push(Mod::Add("member".to_string(), set_of(placeholder_dn)));
    }
    mods.push(Mod::Delete("member".to_string(), set_of(stored)));
    Some(mods)
}

/// Add missing POSIX classes and overwrite the four attributes.
fn posix_mods(object_classes: &[String], posix: &PosixProfile) -> Vec<Mod<String>> {
    let missing: HashSet<String> = POSIX_OBJECT_CLASSES
        .iter()
        .filter(|class| !object_classes.iter().any(|c| c.eq_ignore_ascii_case(class)))
        .map(|class| (*class).to_string())
        .collect();

    let mut mods = Vec::with_capacity(5);
    if !missing.is_empty() {
        mods.push(Mod::Add("objectClass".to_string(), missing));
    }
    mods.push(Mod::Replace(
        "uidNumber".to_string(),
        set_of(&posix.uid_number.to_string()),
    ));
    mods.push(Mod::Replace(
        "gidNumber".to_string(),
        set_of(&posix.gid_number.to_string()),
    ));
    mods.push(Mod::Replace(
        "homeDirectory".to_string(),
        set_of(&posix.home_directory),
    ));
    mods.push(Mod::Replace("loginShell".to_string(), set_of(&posix.login_shell)));
    mods
}

/// Delete whichever POSIX attributes and classes are present.
fn clear_posix_mods(attrs: &HashMap<String, Vec<String>>) -> Vec<Mod<String>> {
    let mut mods: Vec<Mod<String>> = POSIX_ATTRIBUTES
        .iter()
        .filter_map(|name| find_attribute(attrs, name))
        .filter(|(_, values)| !values.is_empty())
        .map(|(key, _)| Mod::Delete(key.clone(), HashSet::new()))
        .collect();

    let classes = find_attribute(attrs, "objectClass")
        .map(|(_, values)| values.as_slice())
        .unwrap_or(&[]);
    let present: HashSet<String> = classes
        .iter()
        .filter(|c| POSIX_OBJECT_CLASSES.iter().any(|p| c.eq_ignore_ascii_case(p)))
        .cloned()
        .collect();
    if !present.is_empty() {
        mods.push(Mod::Delete("objectClass".to_string(), present));
    }

    mods
}

#[cfg(test)]
mod tests {
    use super::*;

    const PLACEHOLDER: &str = "uid=nobody_001,ou=users,dc=example,dc=org";
    const ALICE: &str = "uid=alice,ou=users,dc=example,dc=org";

    fn config() -> DirectoryConfig {
        DirectoryConfig::new("ldap://localhost", "dc=example,dc=org", "cn=admin,dc=example,dc=org")
    }

    fn attr<'a>(attrs: &'a Attrs, name: &str) -> &'a HashSet<String> {
        &attrs.iter().find(|(k, _)| k == name).unwrap().1
    }

    fn profile() -> PosixProfile {
        PosixProfile {
            uid_number: 10042,
            gid_number: 10001,
            home_directory: "/home/alice".to_string(),
            login_shell: "/bin/bash".to_string(),
        }
    }

    #[test]
    fn test_new_rejects_invalid_config() {
        let mut c = config();
        c.bind_dn = String::new();
        assert!(LdapDirectory::new(c).is_err());
        assert!(LdapDirectory::new(config()).is_ok());
    }

    #[test]
    fn test_user_attributes() {
        let attrs = user_attributes(
            &config(),
            &Profile {
                username: "alice".to_string(),
                email: "alice@example.com".to_string(),
            },
        );
        assert!(attr(&attrs, "objectClass").contains("chimeraPerson"));
        assert!(attr(&attrs, "uid").contains("alice"));
        assert!(attr(&attrs, "sn").contains("alice"));
        assert!(attr(&attrs, "mail").contains("alice@example.com"));
    }

    #[test]
    fn test_placeholder_attributes() {
        let attrs = placeholder_attributes(&config());
        assert!(attr(&attrs, "uid").contains("nobody_001"));
        assert!(attr(&attrs, "cn").contains("Nobody"));
        assert!(attr(&attrs, "sn").contains("Placeholder"));
    }

    #[test]
    fn test_new_group_holds_only_placeholder() {
        let attrs = group_attributes("editors", PLACEHOLDER);
        let members = attr(&attrs, "member");
        assert_eq!(members.len(), 1);
        assert!(members.contains(PLACEHOLDER));
        assert!(attr(&attrs, "objectClass").contains("groupOfNames"));
    }

    #[test]
    fn test_removal_of_non_member_is_none() {
        let members = vec![PLACEHOLDER.to_string()];
        assert!(member_removal_mods(&members, ALICE, PLACEHOLDER).is_none());
    }

    #[test]
    fn test_removal_keeps_placeholder() {
        let members = vec![PLACEHOLDER.to_string(), ALICE.to_string()];
        let mods = member_removal_mods(&members, ALICE, PLACEHOLDER).unwrap();
        assert_eq!(mods.len(), 1);
        assert!(matches!(&mods[0], Mod::Delete(attr, values) if attr == "member" && values.contains(ALICE)));
    }

    #[test]
    fn test_removal_restores_missing_placeholder_first() {
        let members = vec!["uid=Alice, ou=users, dc=example, dc=org".to_string()];
        let mods = member_removal_mods(&members, ALICE, PLACEHOLDER).unwrap();
        assert_eq!(mods.len(), 2);
        assert!(matches!(&mods[0], Mod::Add(_, values) if values.contains(PLACEHOLDER)));
        // The stored spelling is deleted, not our normalized one.
        assert!(matches!(&mods[1], Mod::Delete(_, values)
            if values.contains("uid=Alice, ou=users, dc=example, dc=org")));
    }

    #[test]
    fn test_posix_mods_adds_only_missing_classes() {
        let classes = vec!["top".to_string(), "inetOrgPerson".to_string(), "PosixAccount".to_string()];
        let mods = posix_mods(&classes, &profile());
        assert_eq!(mods.len(), 5);
        match &mods[0] {
            Mod::Add(attr, values) => {
                assert_eq!(attr, "objectClass");
                assert_eq!(values.len(), 1);
                assert!(values.contains("shadowAccount"));
            }
            _ => panic!("expected objectClass add"),
        }
        assert!(matches!(&mods[1], Mod::Replace(a, v) if a == "uidNumber" && v.contains("10042")));
        assert!(matches!(&mods[2], Mod::Replace(a, v) if a == "gidNumber" && v.contains("10001")));
    }

    #[test]
    fn test_posix_mods_with_all_classes_present() {
        let classes = vec!["posixAccount".to_string(), "shadowAccount".to_string()];
        let mods = posix_mods(&classes, &profile());
        assert_eq!(mods.len(), 4);
        assert!(mods.iter().all(|m| matches!(m, Mod::Replace(..))));
    }

    #[test]
    fn test_clear_posix_mods_only_present_values() {
        let attrs = HashMap::from([
            (
                "objectClass".to_string(),
                vec!["top".to_string(), "posixAccount".to_string()],
            ),
            ("uidNumber".to_string(), vec!["10042".to_string()]),
            ("loginShell".to_string(), vec!["/bin/bash".to_string()]),
        ]);
        let mods = clear_posix_mods(&attrs);
        assert_eq!(mods.len(), 3);
        assert!(mods.iter().any(|m| matches!(m, Mod::Delete(a, _) if a == "uidNumber")));
        assert!(mods.iter().any(|m| matches!(m, Mod::Delete(a, _) if a == "loginShell")));
        assert!(mods.iter().any(|m| matches!(m, Mod::Delete(a, v)
            if a == "objectClass" && v.len() == 1 && v.contains("posixAccount"))));
    }

    #[test]
    fn test_clear_posix_mods_noop_when_absent() {
        let attrs = HashMap::from([("objectClass".to_string(), vec!["top".to_string()])]);
        assert!(clear_posix_mods(&attrs).is_empty());
    }
}
