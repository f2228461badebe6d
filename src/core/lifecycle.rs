use crate::config::DirectorySettings;
use crate::core::connection;
use crate::domain::dn::{build_user_dn, is_within};
use crate::domain::model::{sort_by_surname, GroupRecord, NewUser, UserRecord};
use crate::domain::notes::{append_line, lines, stamp, Clock, SystemClock};
use crate::domain::ports::{DirectoryConnector, DirectorySession};
use crate::utils::error::{AdError, Result};
use crate::utils::validation::validate_non_empty_string;
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

const DISABLED_NOTE: &str = "Account disabled";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DisableStatus {
    Disabled,
    /// 帳號原本就是停用狀態，沒有做任何修改
    AlreadyDisabled,
}

#[derive(Debug, Clone)]
pub struct DisableOutcome {
    pub status: DisableStatus,
    /// 處理後的帳號；`notes` 即完整紀錄
    pub user: UserRecord,
    pub removed: Vec<String>,
    pub failed: Vec<String>,
}

/// 會修改目錄的帳號工作流程。
///
/// 每個操作都會在 notes 附加一行帶時間戳記的紀錄，這是唯一的稽核軌跡。
/// 每個操作開一個 session，不論成功、提早返回或失敗都會關閉。
pub struct UserLifecycleService<D: DirectoryConnector, C: Clock = SystemClock> {
    connector: D,
    settings: Arc<DirectorySettings>,
    clock: C,
}

impl<D: DirectoryConnector> UserLifecycleService<D> {
    pub fn new(connector: D, settings: Arc<DirectorySettings>) -> Self {
        Self {
            connector,
            settings,
            clock: SystemClock,
        }
    }
}

impl<D: DirectoryConnector, C: Clock> UserLifecycleService<D, C> {
    pub fn with_clock<C2: Clock>(self, clock: C2) -> UserLifecycleService<D, C2> {
        UserLifecycleService {
            connector: self.connector,
            settings: self.settings,
            clock,
        }
    }

    /// 在暫存 OU 建立帳號、設定密碼並啟用。密碼或啟用失敗時刪除新物件再回報錯誤。
    #[instrument(skip(self, new_user, password), fields(sam = %new_user.sam_account_name))]
    pub async fn create_user(&self, new_user: &NewUser, password: &str) -> Result<UserRecord> {
        validate_new_user(new_user, password)?;

        let temp_ou = &self.settings.temp_users_ou;
        if !connection::validate_ou(&self.connector, temp_ou).await {
            return Err(AdError::InvalidSearchBaseError {
                dn: temp_ou.clone(),
            });
        }

        let mut session = self.connector.open(None).await?;
        let result = self.create_in(&mut session, new_user, password).await;
        session.close().await;
        result
    }

    async fn create_in(
        &self,
        session: &mut D::Session,
        new_user: &NewUser,
        password: &str,
    ) -> Result<UserRecord> {
        let sam = new_user.sam_account_name.trim();

        // 密碼寫不進去就不要建立物件
        if !session.supports_password_write() {
            return Err(AdError::write(
                "create",
                sam,
                "password changes need an LDAPS or StartTLS connection",
            ));
        }

        if session.find_by_identity(sam).await?.is_some() {
            return Err(AdError::write(
                "create",
                sam,
                "an account with this username already exists",
            ));
        }

        let display_name = format!("{} {}", new_user.given_name.trim(), new_user.surname.trim());
        let dn = build_user_dn(&display_name, &self.settings.temp_users_ou)?;

        let mut user = UserRecord::new(
            dn,
            sam,
            new_user.given_name.trim(),
            new_user.surname.trim(),
        );
        user.company = new_user.company.clone().unwrap_or_default();
        user.department = new_user.department.clone().unwrap_or_default();
        user.title = new_user.title.clone().unwrap_or_default();
        user.phone_number = new_user.phone_number.clone().unwrap_or_default();
        user.user_principal_name = self.settings.user_principal_name(sam);
        append_line(&mut user.notes, &stamp(&self.clock, "Account created"));

        // 目錄要求先有密碼才能啟用
        user.enabled = false;
        session.create(&user).await?;

        if let Err(e) = activate(session, &mut user, password).await {
            warn!("❌ Activating {} failed, removing the new object: {}", sam, e);
            if let Err(cleanup) = session.delete(&user.distinguished_name).await {
                warn!(
                    "❌ Could not remove {}, delete it by hand before retrying: {}",
                    user.distinguished_name, cleanup
                );
            }
            return Err(e);
        }

        info!(
            "✅ Created {} ({}) at {}",
            user.sam_account_name, user.user_principal_name, user.distinguished_name
        );
        Ok(user)
    }

    /// 停用帳號：清理群組後移到停用 OU。已停用的帳號不做任何修改，
    /// 上次中途失敗、還留在原 OU 的帳號則接著完成群組清理與搬移。
    #[instrument(skip(self))]
    pub async fn disable_user(&self, sam_account_name: &str) -> Result<DisableOutcome> {
        let mut session = self.connector.open(None).await?;
        let result = self.disable_in(&mut session, sam_account_name).await;
        session.close().await;
        result
    }

    async fn disable_in(
        &self,
        session: &mut D::Session,
        sam_account_name: &str,
    ) -> Result<DisableOutcome> {
        let mut user = find_user(session, sam_account_name).await?;
        let disabled_ou = &self.settings.disabled_ou;
        let resuming = is_unfinished_disable(&user, disabled_ou);

        if !user.enabled && !resuming {
            info!("{} is already disabled, nothing to do", user.sam_account_name);
            return Ok(DisableOutcome {
                status: DisableStatus::AlreadyDisabled,
                user,
                removed: Vec::new(),
                failed: Vec::new(),
            });
        }

        // 目的地不存在就不要動帳號
        if !connection::validate_ou(&self.connector, disabled_ou).await {
            return Err(AdError::InvalidSearchBaseError {
                dn: disabled_ou.clone(),
            });
        }

        if resuming {
            info!(
                "🔍 Resuming unfinished disable of {} at {}",
                user.sam_account_name, user.distinguished_name
            );
        } else {
            user.enabled = false;
            append_line(&mut user.notes, &stamp(&self.clock, DISABLED_NOTE));
            session.save(&user).await?;
        }

        let groups = session.groups_of(&user).await?;
        let (removed, failed, remaining) = self.prune_groups(session, &mut user, groups).await;

        session.save(&user).await?;

        // 最後才搬移，群組移除在原位置已完成
        let new_dn = session
            .move_to(&user.distinguished_name, disabled_ou)
            .await?;
        user.distinguished_name = new_dn;
        user.groups = remaining;

        if failed.is_empty() {
            info!(
                "✅ Disabled {} and removed {} group memberships",
                user.sam_account_name,
                removed.len()
            );
        } else {
            warn!(
                "Disabled {} but {} group removals failed: {}",
                user.sam_account_name,
                failed.len(),
                failed.join(", ")
            );
        }

        Ok(DisableOutcome {
            status: DisableStatus::Disabled,
            user,
            removed,
            failed,
        })
    }

    /// 單一群組移除失敗只記錄，繼續處理其他群組
    async fn prune_groups(
        &self,
        session: &mut D::Session,
        user: &mut UserRecord,
        groups: Vec<GroupRecord>,
    ) -> (Vec<String>, Vec<String>, Vec<String>) {
        let mut removed = Vec::new();
        let mut failed = Vec::new();
        let mut remaining = Vec::new();

        for group in groups {
            if self.settings.keeps_group(&group.name) {
                debug!("Keeping membership in {}", group.name);
                remaining.push(group.name);
                continue;
            }

            match session
                .remove_member(&group, &user.distinguished_name)
                .await
            {
                Ok(()) => {
                    append_line(
                        &mut user.notes,
                        &stamp(&self.clock, &format!("Removed from group: {}", group.name)),
                    );
                    removed.push(group.name);
                }
                Err(e) => {
                    warn!("❌ Could not remove {} from {}: {}", user.sam_account_name, group.name, e);
                    append_line(
                        &mut user.notes,
                        &stamp(
                            &self.clock,
                            &format!("Failed to remove from group: {} ({})", group.name, e),
                        ),
                    );
                    remaining.push(group.name.clone());
                    failed.push(group.name);
                }
            }
        }

        (removed, failed, remaining)
    }

    /// 附加文字到 notes，不會截斷原有內容
    #[instrument(skip(self, text))]
    pub async fn update_notes(&self, sam_account_name: &str, text: &str) -> Result<UserRecord> {
        if text.trim().is_empty() {
            return Err(AdError::ValidationError {
                message: "Note text cannot be empty".to_string(),
            });
        }

        let mut session = self.connector.open(None).await?;
        let result = self.update_notes_in(&mut session, sam_account_name, text).await;
        session.close().await;
        result
    }

    async fn update_notes_in(
        &self,
        session: &mut D::Session,
        sam_account_name: &str,
        text: &str,
    ) -> Result<UserRecord> {
        let mut user = find_user(session, sam_account_name).await?;

        append_line(&mut user.notes, text.trim_end());
        session.save(&user).await?;

        info!("📝 Notes updated for {}", user.sam_account_name);
        Ok(user)
    }

    /// 帳號與其直接所屬群組（`groups` 已填入）
    #[instrument(skip(self))]
    pub async fn user_groups(&self, sam_account_name: &str) -> Result<UserRecord> {
        let mut session = self.connector.open(None).await?;
        let result = self.user_groups_in(&mut session, sam_account_name).await;
        session.close().await;
        result
    }

    async fn user_groups_in(
        &self,
        session: &mut D::Session,
        sam_account_name: &str,
    ) -> Result<UserRecord> {
        let mut user = find_user(session, sam_account_name).await?;

        let mut names: Vec<String> = session
            .groups_of(&user)
            .await?
            .into_iter()
            .map(|g| g.name)
            .collect();
        names.sort_by_key(|n| n.to_lowercase());
        user.groups = names;
        Ok(user)
    }

    /// 已經是成員時回傳 false，不做修改
    #[instrument(skip(self))]
    pub async fn add_user_to_group(&self, sam_account_name: &str, group_name: &str) -> Result<bool> {
        let mut session = self.connector.open(None).await?;
        let result = self
            .add_to_group_in(&mut session, sam_account_name, group_name)
            .await;
        session.close().await;
        result
    }

    async fn add_to_group_in(
        &self,
        session: &mut D::Session,
        sam_account_name: &str,
        group_name: &str,
    ) -> Result<bool> {
        let mut user = find_user(session, sam_account_name).await?;
        let group = session
            .find_group(group_name)
            .await?
            .ok_or_else(|| AdError::group_not_found(group_name))?;

        if group.has_member(&user.distinguished_name) {
            debug!("{} is already a member of {}", user.sam_account_name, group.name);
            return Ok(false);
        }

        session
            .add_member(&group, &user.distinguished_name)
            .await?;
        append_line(
            &mut user.notes,
            &stamp(&self.clock, &format!("Added to group: {}", group.name)),
        );
        session.save(&user).await?;

        info!("✅ Added {} to {}", user.sam_account_name, group.name);
        Ok(true)
    }

    /// 群組成員中的使用者帳號，依姓氏排序；非使用者物件略過
    #[instrument(skip(self))]
    pub async fn group_members(&self, group_name: &str) -> Result<(GroupRecord, Vec<UserRecord>)> {
        let mut session = self.connector.open(None).await?;
        let result = self.group_members_in(&mut session, group_name).await;
        session.close().await;
        result
    }

    async fn group_members_in(
        &self,
        session: &mut D::Session,
        group_name: &str,
    ) -> Result<(GroupRecord, Vec<UserRecord>)> {
        let group = session
            .find_group(group_name)
            .await?
            .ok_or_else(|| AdError::group_not_found(group_name))?;

        let mut users = Vec::with_capacity(group.members.len());
        for member_dn in &group.members {
            match session.find_by_dn(member_dn).await? {
                Some(user) => users.push(user),
                None => debug!("Skipping non-user member {}", member_dn),
            }
        }
        sort_by_surname(&mut users);
        Ok((group, users))
    }
}

async fn find_user<S: DirectorySession>(session: &mut S, sam_account_name: &str) -> Result<UserRecord> {
    session
        .find_by_identity(sam_account_name)
        .await?
        .ok_or_else(|| AdError::user_not_found(sam_account_name))
}

async fn activate<S: DirectorySession>(
    session: &mut S,
    user: &mut UserRecord,
    password: &str,
) -> Result<()> {
    session
        .set_password(&user.distinguished_name, password)
        .await?;
    user.enabled = true;
    session.save(user).await
}

/// 已由本程式停用、但還沒搬進停用 OU 的帳號，代表上次停用中途失敗
fn is_unfinished_disable(user: &UserRecord, disabled_ou: &str) -> bool {
    let marker = format!(" - {}", DISABLED_NOTE);
    !user.enabled
        && !is_within(&user.distinguished_name, disabled_ou)
        && lines(&user.notes).any(|line| line.ends_with(&marker))
}

fn validate_new_user(new_user: &NewUser, password: &str) -> Result<()> {
    let required = [
        ("first name", new_user.given_name.as_str()),
        ("last name", new_user.surname.as_str()),
        ("username", new_user.sam_account_name.as_str()),
    ];
    for (field, value) in required {
        validate_non_empty_string(field, value).map_err(|_| AdError::ValidationError {
            message: format!("{} cannot be empty", field),
        })?;
    }

    if new_user.sam_account_name.trim().chars().count() > 20 {
        return Err(AdError::ValidationError {
            message: "username must be at most 20 characters".to_string(),
        });
    }

    if password.is_empty() {
        return Err(AdError::ValidationError {
            message: "password cannot be empty".to_string(),
        });
    }
    Ok(())
}
