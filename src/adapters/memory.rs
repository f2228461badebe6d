//! `--dry-run` 與測試用的行程內目錄。
//!
//! 工作流程用到的行為比照 AD：容器要先存在才能搜尋或建立物件，
//! 新帳號一律先停用，搬移帳號時一併改寫群組裡的成員 DN。

use crate::config::DirectorySettings;
use crate::domain::dn::{is_within, split_rdn};
use crate::domain::model::{
    GroupRecord, UserFilter, UserRecord, UAC_ACCOUNT_DISABLE, UAC_NORMAL_ACCOUNT,
};
use crate::domain::ports::{DirectoryConnector, DirectorySession};
use crate::utils::error::{AdError, Result};
use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::debug;

#[derive(Debug, Default)]
struct DirectoryState {
    container: String,
    containers: Vec<String>,
    users: Vec<UserRecord>,
    groups: Vec<GroupRecord>,
    passwords: HashMap<String, String>,
    denied_groups: HashSet<String>,
    reject_bind: bool,
    plain_transport: bool,
    failing_password_writes: usize,
    failing_moves: usize,
    opened: usize,
    closed: usize,
    membership_changes: usize,
}

impl DirectoryState {
    fn has_container(&self, dn: &str) -> bool {
        self.containers.iter().any(|c| c.eq_ignore_ascii_case(dn))
    }

    fn user_index(&self, dn: &str) -> Option<usize> {
        self.users
            .iter()
            .position(|u| u.distinguished_name.eq_ignore_ascii_case(dn))
    }

    fn group_index(&self, dn: &str) -> Option<usize> {
        self.groups
            .iter()
            .position(|g| g.distinguished_name.eq_ignore_ascii_case(dn))
    }
}

/// 共用狀態；clone 出來的實例看到同一份目錄
#[derive(Debug, Clone, Default)]
pub struct InMemoryDirectory {
    state: Arc<Mutex<DirectoryState>>,
}

impl InMemoryDirectory {
    pub fn new(container: impl Into<String>) -> Self {
        let container = container.into();
        let state = DirectoryState {
            containers: vec![container.clone()],
            container,
            ..Default::default()
        };
        Self {
            state: Arc::new(Mutex::new(state)),
        }
    }

    /// 只有設定中的 container 與各 OU，沒有任何帳號
    pub fn from_settings(settings: &DirectorySettings) -> Self {
        [
            &settings.default_ou,
            &settings.temp_users_ou,
            &settings.disabled_ou,
            &settings.contractors_ou,
        ]
        .into_iter()
        .fold(Self::new(settings.container.clone()), |dir, ou| {
            dir.with_ou(ou.clone())
        })
    }

    fn state(&self) -> MutexGuard<'_, DirectoryState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn with_ou(self, dn: impl Into<String>) -> Self {
        let dn = dn.into();
        {
            let mut state = self.state();
            if !state.has_container(&dn) {
                state.containers.push(dn);
            }
        }
        self
    }

    /// 帳號所在的 OU 會一併登記
    pub fn with_user(self, mut user: UserRecord) -> Self {
        {
            let mut state = self.state();
            let (_, parent) = split_rdn(&user.distinguished_name);
            if !parent.is_empty() && !state.has_container(parent) {
                state.containers.push(parent.to_string());
            }
            user.account_control = user.effective_account_control();
            user.groups.clear();
            state.users.push(user);
        }
        self
    }

    pub fn with_group(self, name: &str, dn: &str, member_dns: &[&str]) -> Self {
        {
            let mut group = GroupRecord::new(name, dn);
            group.members = member_dns.iter().map(|m| m.to_string()).collect();
            self.state().groups.push(group);
        }
        self
    }

    /// 對這個群組的成員異動一律回傳權限不足
    pub fn deny_membership_changes(self, group_name: &str) -> Self {
        self.state()
            .denied_groups
            .insert(group_name.to_ascii_lowercase());
        self
    }

    pub fn reject_bind(self) -> Self {
        self.state().reject_bind = true;
        self
    }

    /// 模擬未加密的 ldap:// 連線，密碼寫入一律被拒
    pub fn without_secure_transport(self) -> Self {
        self.state().plain_transport = true;
        self
    }

    /// 接下來 `count` 次密碼寫入回傳密碼原則錯誤
    pub fn fail_password_writes(self, count: usize) -> Self {
        self.state().failing_password_writes = count;
        self
    }

    /// 接下來 `count` 次搬移回傳權限不足
    pub fn fail_moves(self, count: usize) -> Self {
        self.state().failing_moves = count;
        self
    }

    pub fn user(&self, sam_account_name: &str) -> Option<UserRecord> {
        self.state()
            .users
            .iter()
            .find(|u| u.sam_account_name.eq_ignore_ascii_case(sam_account_name))
            .cloned()
    }

    pub fn group_names_of(&self, sam_account_name: &str) -> Vec<String> {
        let state = self.state();
        let Some(user) = state
            .users
            .iter()
            .find(|u| u.sam_account_name.eq_ignore_ascii_case(sam_account_name))
        else {
            return Vec::new();
        };
        state
            .groups
            .iter()
            .filter(|g| g.has_member(&user.distinguished_name))
            .map(|g| g.name.clone())
            .collect()
    }

    pub fn password_of(&self, sam_account_name: &str) -> Option<String> {
        let state = self.state();
        let user = state
            .users
            .iter()
            .find(|u| u.sam_account_name.eq_ignore_ascii_case(sam_account_name))?;
        state
            .passwords
            .get(&user.distinguished_name.to_ascii_lowercase())
            .cloned()
    }

    /// (opened, closed)
    pub fn sessions(&self) -> (usize, usize) {
        let state = self.state();
        (state.opened, state.closed)
    }

    pub fn membership_changes(&self) -> usize {
        self.state().membership_changes
    }
}

#[async_trait]
impl DirectoryConnector for InMemoryDirectory {
    type Session = InMemorySession;

    async fn open(&self, search_base: Option<&str>) -> Result<InMemorySession> {
        let mut state = self.state();
        if state.reject_bind {
            return Err(AdError::AuthenticationError {
                user: "service account".to_string(),
            });
        }

        let base = search_base.unwrap_or(&state.container).to_string();
        if !state.has_container(&base) {
            return Err(AdError::InvalidSearchBaseError { dn: base });
        }

        state.opened += 1;
        debug!(base = %base, "In-memory session opened");
        Ok(InMemorySession {
            state: Arc::clone(&self.state),
            base,
            closed: false,
        })
    }
}

#[derive(Debug)]
pub struct InMemorySession {
    state: Arc<Mutex<DirectoryState>>,
    base: String,
    closed: bool,
}

impl InMemorySession {
    fn state(&self) -> MutexGuard<'_, DirectoryState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn change_membership(&self, group: &GroupRecord, user_dn: &str, add: bool) -> Result<()> {
        let operation = if add {
            "add member to"
        } else {
            "remove member from"
        };
        let mut state = self.state();

        if state.denied_groups.contains(&group.name.to_ascii_lowercase()) {
            return Err(AdError::write(operation, &group.name, "insufficient access rights"));
        }
        let index = state
            .group_index(&group.distinguished_name)
            .ok_or_else(|| AdError::write(operation, &group.name, "no such object"))?;

        let target = &mut state.groups[index];
        match (add, target.has_member(user_dn)) {
            (true, true) => {
                return Err(AdError::write(operation, &group.name, "value already present"))
            }
            (false, false) => {
                return Err(AdError::write(operation, &group.name, "no such attribute value"))
            }
            (true, false) => target.members.push(user_dn.to_string()),
            (false, true) => target.members.retain(|m| !m.eq_ignore_ascii_case(user_dn)),
        }

        state.membership_changes += 1;
        Ok(())
    }
}

#[async_trait]
impl DirectorySession for InMemorySession {
    fn search_base(&self) -> &str {
        &self.base
    }

    async fn search(&mut self, filter: &UserFilter) -> Result<Vec<UserRecord>> {
        let state = self.state();
        Ok(state
            .users
            .iter()
            .filter(|u| is_within(&u.distinguished_name, &self.base) && filter.matches(u))
            .cloned()
            .collect())
    }

    async fn find_by_identity(&mut self, sam_account_name: &str) -> Result<Option<UserRecord>> {
        let state = self.state();
        Ok(state
            .users
            .iter()
            .find(|u| {
                is_within(&u.distinguished_name, &self.base)
                    && u.sam_account_name.eq_ignore_ascii_case(sam_account_name)
            })
            .cloned())
    }

    async fn find_by_dn(&mut self, dn: &str) -> Result<Option<UserRecord>> {
        let state = self.state();
        Ok(state.user_index(dn).map(|i| state.users[i].clone()))
    }

    async fn find_group(&mut self, name: &str) -> Result<Option<GroupRecord>> {
        let state = self.state();
        Ok(state
            .groups
            .iter()
            .find(|g| g.name.eq_ignore_ascii_case(name))
            .cloned())
    }

    async fn groups_of(&mut self, user: &UserRecord) -> Result<Vec<GroupRecord>> {
        let state = self.state();
        Ok(state
            .groups
            .iter()
            .filter(|g| g.has_member(&user.distinguished_name))
            .cloned()
            .collect())
    }

    async fn create(&mut self, user: &UserRecord) -> Result<()> {
        let mut state = self.state();
        let target = user.sam_account_name.as_str();

        let (_, parent) = split_rdn(&user.distinguished_name);
        if !state.has_container(parent) {
            return Err(AdError::write("create", target, "no such object"));
        }
        let duplicate = state.user_index(&user.distinguished_name).is_some()
            || state
                .users
                .iter()
                .any(|u| u.sam_account_name.eq_ignore_ascii_case(target));
        if duplicate {
            return Err(AdError::write("create", target, "object already exists"));
        }

        let mut created = user.clone();
        created.enabled = false;
        created.account_control = UAC_NORMAL_ACCOUNT | UAC_ACCOUNT_DISABLE;
        created.groups.clear();
        state.users.push(created);
        Ok(())
    }

    async fn save(&mut self, user: &UserRecord) -> Result<()> {
        let mut state = self.state();
        let index = state
            .user_index(&user.distinguished_name)
            .ok_or_else(|| AdError::write("update", &user.sam_account_name, "no such object"))?;

        let stored = &mut state.users[index];
        stored.notes = user.notes.clone();
        stored.enabled = user.enabled;
        stored.account_control = user.effective_account_control();
        stored.company = user.company.clone();
        stored.department = user.department.clone();
        stored.title = user.title.clone();
        stored.phone_number = user.phone_number.clone();
        Ok(())
    }

    fn supports_password_write(&self) -> bool {
        !self.state().plain_transport
    }

    async fn set_password(&mut self, user_dn: &str, password: &str) -> Result<()> {
        let mut state = self.state();
        if state.plain_transport {
            return Err(AdError::write(
                "set password on",
                user_dn,
                "the directory only accepts password changes over LDAPS or StartTLS",
            ));
        }
        if state.user_index(user_dn).is_none() {
            return Err(AdError::write("set password on", user_dn, "no such object"));
        }
        if state.failing_password_writes > 0 {
            state.failing_password_writes -= 1;
            return Err(AdError::write(
                "set password on",
                user_dn,
                "password does not meet the policy",
            ));
        }
        if password.is_empty() {
            return Err(AdError::write(
                "set password on",
                user_dn,
                "password does not meet the policy",
            ));
        }
        state
            .passwords
            .insert(user_dn.to_ascii_lowercase(), password.to_string());
        Ok(())
    }

    async fn move_to(&mut self, user_dn: &str, new_parent: &str) -> Result<String> {
        let mut state = self.state();
        if !state.has_container(new_parent) {
            return Err(AdError::write("move", user_dn, "no such object"));
        }
        let index = state
            .user_index(user_dn)
            .ok_or_else(|| AdError::write("move", user_dn, "no such object"))?;
        if state.failing_moves > 0 {
            state.failing_moves -= 1;
            return Err(AdError::write("move", user_dn, "insufficient access rights"));
        }

        let (rdn, _) = split_rdn(user_dn);
        let new_dn = format!("{},{}", rdn, new_parent);

        state.users[index].distinguished_name = new_dn.clone();
        for group in state.groups.iter_mut() {
            for member in group.members.iter_mut() {
                if member.eq_ignore_ascii_case(user_dn) {
                    *member = new_dn.clone();
                }
            }
        }
        if let Some(password) = state.passwords.remove(&user_dn.to_ascii_lowercase()) {
            state.passwords.insert(new_dn.to_ascii_lowercase(), password);
        }
        Ok(new_dn)
    }

    async fn add_member(&mut self, group: &GroupRecord, user_dn: &str) -> Result<()> {
        self.change_membership(group, user_dn, true)
    }

    async fn remove_member(&mut self, group: &GroupRecord, user_dn: &str) -> Result<()> {
        self.change_membership(group, user_dn, false)
    }

    async fn delete(&mut self, dn: &str) -> Result<()> {
        let mut state = self.state();
        let index = state
            .user_index(dn)
            .ok_or_else(|| AdError::write("delete", dn, "no such object"))?;

        state.users.remove(index);
        state.passwords.remove(&dn.to_ascii_lowercase());
        for group in state.groups.iter_mut() {
            group.members.retain(|m| !m.eq_ignore_ascii_case(dn));
        }
        Ok(())
    }

    async fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        self.state().closed += 1;
        debug!(base = %self.base, "In-memory session closed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const CONTAINER: &str = "DC=corp,DC=example,DC=com";
    const STAFF: &str = "OU=Staff,DC=corp,DC=example,DC=com";
    const DISABLED: &str = "OU=Disabled,DC=corp,DC=example,DC=com";

    fn directory() -> InMemoryDirectory {
        InMemoryDirectory::new(CONTAINER)
            .with_ou(DISABLED)
            .with_user(UserRecord::new(
                format!("CN=Jane Doe,{}", STAFF),
                "jdoe",
                "Jane",
                "Doe",
            ))
            .with_group(
                "Finance-Team",
                "CN=Finance-Team,OU=Groups,DC=corp,DC=example,DC=com",
                &["CN=Jane Doe,OU=Staff,DC=corp,DC=example,DC=com"],
            )
    }

    #[tokio::test]
    async fn test_open_unknown_base_is_invalid() {
        let dir = directory();
        let err = dir.open(Some("OU=Nowhere,DC=corp")).await.unwrap_err();
        assert!(matches!(err, AdError::InvalidSearchBaseError { .. }));
        assert_eq!(dir.sessions(), (0, 0));
    }

    #[tokio::test]
    async fn test_move_rewrites_group_members() {
        let dir = directory();
        let mut session = dir.open(None).await.unwrap();

        let new_dn = session
            .move_to("CN=Jane Doe,OU=Staff,DC=corp,DC=example,DC=com", DISABLED)
            .await
            .unwrap();
        session.close().await;
        session.close().await;

        assert_eq!(new_dn, format!("CN=Jane Doe,{}", DISABLED));
        assert_eq!(dir.group_names_of("jdoe"), vec!["Finance-Team"]);
        assert_eq!(dir.sessions(), (1, 1));
    }

    #[tokio::test]
    async fn test_create_starts_disabled_and_rejects_duplicates() {
        let dir = directory();
        let mut session = dir.open(None).await.unwrap();

        let user = UserRecord::new(format!("CN=John Roe,{}", STAFF), "jroe", "John", "Roe");
        session.create(&user).await.unwrap();
        assert!(!dir.user("jroe").unwrap().enabled);

        let err = session.create(&user).await.unwrap_err();
        assert_eq!(err.to_string(), "Failed to create 'jroe': object already exists");
        session.close().await;
    }

    #[tokio::test]
    async fn test_delete_removes_user_and_memberships() {
        let dir = directory();
        let mut session = dir.open(None).await.unwrap();

        session
            .delete("CN=Jane Doe,OU=Staff,DC=corp,DC=example,DC=com")
            .await
            .unwrap();
        let again = session
            .delete("CN=Jane Doe,OU=Staff,DC=corp,DC=example,DC=com")
            .await;
        session.close().await;

        assert!(dir.user("jdoe").is_none());
        assert!(again.is_err());
        let state = dir.state();
        assert!(state.groups[0].members.is_empty());
    }

    #[tokio::test]
    async fn test_injected_move_failures_are_consumed() {
        let dir = directory().fail_moves(1);
        let mut session = dir.open(None).await.unwrap();

        let first = session
            .move_to("CN=Jane Doe,OU=Staff,DC=corp,DC=example,DC=com", DISABLED)
            .await;
        let second = session
            .move_to("CN=Jane Doe,OU=Staff,DC=corp,DC=example,DC=com", DISABLED)
            .await;
        session.close().await;

        assert!(first.is_err());
        assert_eq!(second.unwrap(), format!("CN=Jane Doe,{}", DISABLED));
    }

    #[tokio::test]
    async fn test_plain_transport_refuses_passwords() {
        let dir = directory().without_secure_transport();
        let mut session = dir.open(None).await.unwrap();

        assert!(!session.supports_password_write());
        let result = session
            .set_password("CN=Jane Doe,OU=Staff,DC=corp,DC=example,DC=com", "Secret1!")
            .await;
        session.close().await;

        assert!(result.is_err());
        assert!(dir.password_of("jdoe").is_none());
    }

    #[tokio::test]
    async fn test_denied_group_rejects_membership_changes() {
        let dir = directory().deny_membership_changes("finance-team");
        let mut session = dir.open(None).await.unwrap();

        let group = session.find_group("Finance-Team").await.unwrap().unwrap();
        let result = session
            .remove_member(&group, "CN=Jane Doe,OU=Staff,DC=corp,DC=example,DC=com")
            .await;
        session.close().await;

        assert!(result.is_err());
        assert_eq!(dir.membership_changes(), 0);
    }
}
