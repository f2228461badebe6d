//! 以 `ldap3` 實作的 Active Directory adapter。
//!
//! 一個 `LdapSession` 對應一條已 bind 的連線。搜尋一律帶分頁控制，
//! 超過伺服器上限的 OU 也能完整讀回。密碼寫入 `unicodePwd`，
//! AD 只在 LDAPS 或 StartTLS 上接受。

use crate::config::DirectorySettings;
use crate::domain::dn::{rdn_value, split_rdn};
use crate::domain::model::{
    GroupRecord, UserFilter, UserRecord, UAC_ACCOUNT_DISABLE, UAC_NORMAL_ACCOUNT,
};
use crate::domain::ports::{DirectoryConnector, DirectorySession};
use crate::utils::error::{AdError, Result};
use async_trait::async_trait;
use ldap3::adapters::{Adapter, EntriesOnly, PagedResults};
use ldap3::{
    ldap_escape, Ldap, LdapConnAsync, LdapConnSettings, LdapResult, Mod, Scope, SearchEntry,
};
use std::collections::HashSet;
use std::fmt;
use std::time::Duration;
use tracing::{debug, info, warn};

pub const SEARCH_PAGE_SIZE: i32 = 1000;

const RC_SUCCESS: u32 = 0;
const RC_CONSTRAINT_VIOLATION: u32 = 19;
const RC_ATTRIBUTE_OR_VALUE_EXISTS: u32 = 20;
const RC_NO_SUCH_OBJECT: u32 = 32;
const RC_INVALID_DN_SYNTAX: u32 = 34;
const RC_INVALID_CREDENTIALS: u32 = 49;
const RC_INSUFFICIENT_ACCESS: u32 = 50;
const RC_UNWILLING_TO_PERFORM: u32 = 53;
const RC_ENTRY_ALREADY_EXISTS: u32 = 68;

const USER_CLASS_FILTER: &str = "(objectCategory=person)(objectClass=user)";
const ENABLED_FILTER: &str = "(!(userAccountControl:1.2.840.113556.1.4.803:=2))";
const DISABLED_FILTER: &str = "(userAccountControl:1.2.840.113556.1.4.803:=2)";

const USER_ATTRIBUTES: &[&str] = &[
    "sAMAccountName",
    "givenName",
    "sn",
    "company",
    "department",
    "title",
    "telephoneNumber",
    "mail",
    "info",
    "userAccountControl",
    "userPrincipalName",
];

const GROUP_ATTRIBUTES: &[&str] = &["cn", "sAMAccountName", "member"];

/// 連線設定；每次 `open` 建立一條新連線
#[derive(Clone)]
pub struct LdapDirectory {
    url: String,
    bind_dn: String,
    bind_password: String,
    default_base: String,
    connect_timeout: Duration,
    use_starttls: bool,
    secure: bool,
}

impl LdapDirectory {
    pub fn from_settings(settings: &DirectorySettings) -> Self {
        Self {
            url: settings.ldap_url(),
            bind_dn: settings.bind_identity(),
            bind_password: settings.service_password.clone(),
            default_base: settings.container.clone(),
            connect_timeout: Duration::from_secs(settings.connection.connect_timeout_secs),
            use_starttls: settings.connection.use_starttls,
            secure: settings.uses_tls(),
        }
    }

    async fn connect(&self) -> Result<Ldap> {
        debug!(url = %self.url, "Connecting to directory server");

        let conn_settings = LdapConnSettings::new()
            .set_conn_timeout(self.connect_timeout)
            .set_starttls(self.use_starttls);

        let (conn, mut ldap) = LdapConnAsync::with_settings(conn_settings, &self.url)
            .await
            .map_err(|e| AdError::ConnectionError {
                message: format!("cannot reach {}: {}", self.url, e),
            })?;

        // 連線 driver 要在背景持續跑
        tokio::spawn(async move {
            if let Err(e) = conn.drive().await {
                warn!(error = %e, "LDAP connection driver error");
            }
        });

        debug!(bind_dn = %self.bind_dn, "Performing LDAP bind");
        let result = ldap
            .simple_bind(&self.bind_dn, &self.bind_password)
            .await
            .map_err(|e| AdError::ConnectionError {
                message: format!("bind as {} failed: {}", self.bind_dn, e),
            })?;

        if result.rc != RC_SUCCESS {
            if let Err(e) = ldap.unbind().await {
                debug!(error = %e, "Unbind after failed bind");
            }
            if result.rc == RC_INVALID_CREDENTIALS {
                return Err(AdError::AuthenticationError {
                    user: self.bind_dn.clone(),
                });
            }
            return Err(AdError::ConnectionError {
                message: format!("bind failed with code {}: {}", result.rc, result.text),
            });
        }

        Ok(ldap)
    }
}

impl fmt::Debug for LdapDirectory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LdapDirectory")
            .field("url", &self.url)
            .field("bind_dn", &self.bind_dn)
            .field("default_base", &self.default_base)
            .field("secure", &self.secure)
            .finish()
    }
}

#[async_trait]
impl DirectoryConnector for LdapDirectory {
    type Session = LdapSession;

    async fn open(&self, search_base: Option<&str>) -> Result<LdapSession> {
        let ldap = self.connect().await?;
        let mut session = LdapSession {
            ldap,
            base: search_base.unwrap_or(&self.default_base).to_string(),
            secure: self.secure,
            closed: false,
        };

        if let Err(e) = session.verify_base().await {
            session.close().await;
            return Err(e);
        }

        info!(base = %session.base, "LDAP session opened");
        Ok(session)
    }
}

pub struct LdapSession {
    ldap: Ldap,
    base: String,
    secure: bool,
    closed: bool,
}

impl LdapSession {
    async fn verify_base(&mut self) -> Result<()> {
        let result = self
            .ldap
            .search(&self.base, Scope::Base, "(objectClass=*)", vec!["objectClass"])
            .await?;

        match result.1.rc {
            RC_SUCCESS => Ok(()),
            RC_NO_SUCH_OBJECT | RC_INVALID_DN_SYNTAX => Err(AdError::InvalidSearchBaseError {
                dn: self.base.clone(),
            }),
            rc => Err(AdError::SearchError {
                message: format!("checking {} returned code {}: {}", self.base, rc, result.1.text),
            }),
        }
    }

    /// 以固定頁大小讀完所有結果；referral 會被略過
    async fn paged_search(
        &mut self,
        base: &str,
        scope: Scope,
        filter: &str,
        attrs: &[&str],
    ) -> Result<Vec<SearchEntry>> {
        debug!(base = %base, filter = %filter, "Searching directory");

        let base_object = matches!(scope, Scope::Base);
        let attrs: Vec<String> = attrs.iter().map(|a| a.to_string()).collect();
        let adapters: Vec<Box<dyn Adapter<_, _>>> = vec![
            Box::new(EntriesOnly::new()),
            Box::new(PagedResults::new(SEARCH_PAGE_SIZE)),
        ];

        let mut stream = self
            .ldap
            .streaming_search_with(adapters, base, scope, filter, attrs)
            .await?;

        let mut entries = Vec::new();
        while let Some(entry) = stream.next().await? {
            entries.push(SearchEntry::construct(entry));
        }

        let result = stream.finish().await;
        match result.rc {
            RC_SUCCESS => Ok(entries),
            RC_NO_SUCH_OBJECT => {
                if base_object {
                    Ok(Vec::new())
                } else {
                    Err(AdError::InvalidSearchBaseError {
                        dn: base.to_string(),
                    })
                }
            }
            rc => Err(AdError::SearchError {
                message: format!("search under {} returned code {}: {}", base, rc, result.text),
            }),
        }
    }

    async fn search_groups(&mut self, filter: &str) -> Result<Vec<GroupRecord>> {
        let base = self.base.clone();
        let entries = self
            .paged_search(&base, Scope::Subtree, filter, GROUP_ATTRIBUTES)
            .await?;
        Ok(entries.iter().map(entry_to_group).collect())
    }

    async fn modify_member(
        &mut self,
        group: &GroupRecord,
        user_dn: &str,
        add: bool,
    ) -> Result<()> {
        let values = HashSet::from([user_dn.to_string()]);
        let (operation, change) = if add {
            ("add member to", Mod::Add("member".to_string(), values))
        } else {
            ("remove member from", Mod::Delete("member".to_string(), values))
        };

        let result = self
            .ldap
            .modify(&group.distinguished_name, vec![change])
            .await?;
        check_write(&result, operation, &group.name)
    }
}

#[async_trait]
impl DirectorySession for LdapSession {
    fn search_base(&self) -> &str {
        &self.base
    }

    async fn search(&mut self, filter: &UserFilter) -> Result<Vec<UserRecord>> {
        let base = self.base.clone();
        let entries = self
            .paged_search(&base, Scope::Subtree, &build_user_filter(filter), USER_ATTRIBUTES)
            .await?;
        Ok(entries.iter().map(entry_to_user).collect())
    }

    async fn find_by_identity(&mut self, sam_account_name: &str) -> Result<Option<UserRecord>> {
        let base = self.base.clone();
        let entries = self
            .paged_search(
                &base,
                Scope::Subtree,
                &identity_filter(sam_account_name),
                USER_ATTRIBUTES,
            )
            .await?;
        Ok(entries.first().map(entry_to_user))
    }

    async fn find_by_dn(&mut self, dn: &str) -> Result<Option<UserRecord>> {
        let filter = format!("(&{})", USER_CLASS_FILTER);
        let entries = self
            .paged_search(dn, Scope::Base, &filter, USER_ATTRIBUTES)
            .await?;
        Ok(entries.first().map(entry_to_user))
    }

    async fn find_group(&mut self, name: &str) -> Result<Option<GroupRecord>> {
        let escaped = ldap_escape(name);
        let filter = format!(
            "(&(objectClass=group)(|(cn={})(sAMAccountName={})))",
            escaped, escaped
        );
        Ok(self.search_groups(&filter).await?.into_iter().next())
    }

    /// 只比對 `member`，不含 primary group 與巢狀群組
    async fn groups_of(&mut self, user: &UserRecord) -> Result<Vec<GroupRecord>> {
        let filter = format!(
            "(&(objectClass=group)(member={}))",
            ldap_escape(user.distinguished_name.as_str())
        );
        self.search_groups(&filter).await
    }

    async fn create(&mut self, user: &UserRecord) -> Result<()> {
        let result = self
            .ldap
            .add(&user.distinguished_name, new_user_attributes(user))
            .await?;
        check_write(&result, "create", &user.sam_account_name)
    }

    async fn save(&mut self, user: &UserRecord) -> Result<()> {
        let mods = vec![
            replace("info", &user.notes),
            replace(
                "userAccountControl",
                &user.effective_account_control().to_string(),
            ),
            replace("company", &user.company),
            replace("department", &user.department),
            replace("title", &user.title),
            replace("telephoneNumber", &user.phone_number),
        ];

        let result = self.ldap.modify(&user.distinguished_name, mods).await?;
        check_write(&result, "update", &user.sam_account_name)
    }

    fn supports_password_write(&self) -> bool {
        self.secure
    }

    async fn set_password(&mut self, user_dn: &str, password: &str) -> Result<()> {
        if !self.secure {
            return Err(AdError::write(
                "set password on",
                user_dn,
                "the directory only accepts password changes over LDAPS or StartTLS",
            ));
        }

        let encoded = encode_ad_password(password)?;
        let mods = vec![Mod::Replace(
            b"unicodePwd".to_vec(),
            HashSet::from([encoded]),
        )];
        let result = self.ldap.modify(user_dn, mods).await?;
        check_write(&result, "set password on", user_dn)
    }

    async fn move_to(&mut self, user_dn: &str, new_parent: &str) -> Result<String> {
        let (rdn, _) = split_rdn(user_dn);
        let result = self
            .ldap
            .modifydn(user_dn, rdn, true, Some(new_parent))
            .await?;
        check_write(&result, "move", user_dn)?;

        let new_dn = format!("{},{}", rdn, new_parent);
        debug!(from = %user_dn, to = %new_dn, "Object moved");
        Ok(new_dn)
    }

    async fn add_member(&mut self, group: &GroupRecord, user_dn: &str) -> Result<()> {
        self.modify_member(group, user_dn, true).await
    }

    async fn remove_member(&mut self, group: &GroupRecord, user_dn: &str) -> Result<()> {
        self.modify_member(group, user_dn, false).await
    }

    async fn delete(&mut self, dn: &str) -> Result<()> {
        let result = self.ldap.delete(dn).await?;
        check_write(&result, "delete", dn)?;
        debug!(dn = %dn, "Object deleted");
        Ok(())
    }

    async fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        if let Err(e) = self.ldap.unbind().await {
            warn!(error = %e, "Error during LDAP unbind");
        }
        debug!(base = %self.base, "LDAP session closed");
    }
}

/// 帳號類別加上啟用狀態與屬性條件，值一律跳脫
pub fn build_user_filter(filter: &UserFilter) -> String {
    let mut parts = String::from(USER_CLASS_FILTER);
    match filter.enabled {
        Some(true) => parts.push_str(ENABLED_FILTER),
        Some(false) => parts.push_str(DISABLED_FILTER),
        None => {}
    }
    if let Some((property, value)) = &filter.attribute {
        parts.push_str(&format!(
            "({}={})",
            property.ldap_attribute(),
            ldap_escape(value.as_str())
        ));
    }
    format!("(&{})", parts)
}

pub fn identity_filter(sam_account_name: &str) -> String {
    format!(
        "(&{}(sAMAccountName={}))",
        USER_CLASS_FILTER,
        ldap_escape(sam_account_name)
    )
}

/// 引號包住後轉成 UTF-16LE，這是 unicodePwd 要求的格式
pub fn encode_ad_password(password: &str) -> Result<Vec<u8>> {
    if password.is_empty() {
        return Err(AdError::ValidationError {
            message: "Password cannot be empty".to_string(),
        });
    }

    let quoted = format!("\"{password}\"");
    Ok(quoted.encode_utf16().flat_map(u16::to_le_bytes).collect())
}

fn replace(attribute: &str, value: &str) -> Mod<String> {
    let values = if value.is_empty() {
        HashSet::new()
    } else {
        HashSet::from([value.to_string()])
    };
    Mod::Replace(attribute.to_string(), values)
}

fn single(name: &str, value: &str) -> (String, HashSet<String>) {
    (name.to_string(), HashSet::from([value.to_string()]))
}

fn new_user_attributes(user: &UserRecord) -> Vec<(String, HashSet<String>)> {
    let mut attrs = vec![
        (
            "objectClass".to_string(),
            ["top", "person", "organizationalPerson", "user"]
                .into_iter()
                .map(str::to_string)
                .collect::<HashSet<String>>(),
        ),
        single("cn", &rdn_value(&user.distinguished_name)),
        single("sAMAccountName", &user.sam_account_name),
        single("givenName", &user.given_name),
        single("sn", &user.surname),
        single("displayName", &user.display_name()),
        single("userPrincipalName", &user.user_principal_name),
        // 建立時一律停用，設定密碼後才啟用
        single(
            "userAccountControl",
            &(UAC_NORMAL_ACCOUNT | UAC_ACCOUNT_DISABLE).to_string(),
        ),
    ];

    let optional = [
        ("company", &user.company),
        ("department", &user.department),
        ("title", &user.title),
        ("telephoneNumber", &user.phone_number),
        ("mail", &user.email),
        ("info", &user.notes),
    ];
    for (name, value) in optional {
        if !value.is_empty() {
            attrs.push(single(name, value));
        }
    }
    attrs
}

/// 把寫入結果碼轉成 `DirectoryWriteError`
fn check_write(result: &LdapResult, operation: &str, target: &str) -> Result<()> {
    let message = match result.rc {
        RC_SUCCESS => return Ok(()),
        RC_ENTRY_ALREADY_EXISTS => "object already exists".to_string(),
        RC_INSUFFICIENT_ACCESS => "insufficient access rights".to_string(),
        RC_NO_SUCH_OBJECT => "no such object".to_string(),
        RC_ATTRIBUTE_OR_VALUE_EXISTS => "value already present".to_string(),
        RC_CONSTRAINT_VIOLATION | RC_UNWILLING_TO_PERFORM => {
            format!("rejected by server ({}): {}", result.rc, result.text)
        }
        rc => format!("server returned code {}: {}", rc, result.text),
    };
    Err(AdError::write(operation, target, message))
}

/// 屬性不存在或有多個值時回傳空字串
fn single_value(entry: &SearchEntry, name: &str) -> String {
    entry
        .attrs
        .iter()
        .find(|(key, _)| key.eq_ignore_ascii_case(name))
        .and_then(|(_, values)| match values.as_slice() {
            [value] => Some(value.clone()),
            _ => None,
        })
        .unwrap_or_default()
}

fn multi_value(entry: &SearchEntry, name: &str) -> Vec<String> {
    entry
        .attrs
        .iter()
        .find(|(key, _)| key.eq_ignore_ascii_case(name))
        .map(|(_, values)| values.clone())
        .unwrap_or_default()
}

pub fn entry_to_user(entry: &SearchEntry) -> UserRecord {
    let account_control = single_value(entry, "userAccountControl")
        .parse::<u32>()
        .unwrap_or(UAC_NORMAL_ACCOUNT);

    let mut user = UserRecord::new(
        entry.dn.clone(),
        single_value(entry, "sAMAccountName"),
        single_value(entry, "givenName"),
        single_value(entry, "sn"),
    );
    user.company = single_value(entry, "company");
    user.department = single_value(entry, "department");
    user.title = single_value(entry, "title");
    user.phone_number = single_value(entry, "telephoneNumber");
    user.email = single_value(entry, "mail");
    user.notes = single_value(entry, "info");
    user.user_principal_name = single_value(entry, "userPrincipalName");
    user.account_control = account_control;
    user.enabled = account_control & UAC_ACCOUNT_DISABLE == 0;
    user
}

pub fn entry_to_group(entry: &SearchEntry) -> GroupRecord {
    let name = [
        single_value(entry, "sAMAccountName"),
        single_value(entry, "cn"),
    ]
    .into_iter()
    .find(|n| !n.is_empty())
    .unwrap_or_else(|| rdn_value(&entry.dn));

    let mut group = GroupRecord::new(name, entry.dn.clone());
    group.members = multi_value(entry, "member");
    group
}
