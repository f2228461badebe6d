use crate::config::DirectorySettings;
use crate::core::connection;
use crate::domain::model::{sort_by_surname, SearchProperty, UserFilter, UserRecord};
use crate::domain::ports::{DirectoryConnector, DirectorySession};
use crate::utils::error::Result;
use std::sync::Arc;
use tracing::{debug, info, instrument};

/// 唯讀查詢。所有清單都依姓氏遞增排序。
pub struct DirectoryQueryService<D: DirectoryConnector> {
    connector: D,
    settings: Arc<DirectorySettings>,
}

impl<D: DirectoryConnector> DirectoryQueryService<D> {
    pub fn new(connector: D, settings: Arc<DirectorySettings>) -> Self {
        Self {
            connector,
            settings,
        }
    }

    pub async fn validate_ou(&self, dn: &str) -> bool {
        connection::validate_ou(&self.connector, dn).await
    }

    /// 沒有 `include_disabled` 時只回傳啟用中的帳號。空 OU 回傳空清單。
    #[instrument(skip(self))]
    pub async fn users_in_ou(&self, ou: &str, include_disabled: bool) -> Result<Vec<UserRecord>> {
        let filter = if include_disabled {
            UserFilter::any()
        } else {
            UserFilter::enabled_only()
        };
        self.search_in(Some(ou), &filter).await
    }

    pub async fn default_ou_users(&self) -> Result<Vec<UserRecord>> {
        self.users_in_ou(&self.settings.default_ou, false).await
    }

    pub async fn contractors(&self) -> Result<Vec<UserRecord>> {
        self.users_in_ou(&self.settings.contractors_ou, false).await
    }

    /// 整個 container 內已停用的帳號
    #[instrument(skip(self))]
    pub async fn disabled_users(&self) -> Result<Vec<UserRecord>> {
        self.search_in(Some(self.settings.container.as_str()), &UserFilter::disabled_only())
            .await
    }

    /// 找不到回傳 None
    #[instrument(skip(self))]
    pub async fn find_by_identity(&self, sam_account_name: &str) -> Result<Option<UserRecord>> {
        let mut session = self.connector.open(Some(self.settings.container.as_str())).await?;
        let result = session.find_by_identity(sam_account_name).await;
        session.close().await;

        let found = result?;
        debug!(found = found.is_some(), "Identity lookup finished");
        Ok(found)
    }

    #[instrument(skip(self))]
    pub async fn find_by_attribute(
        &self,
        property: SearchProperty,
        value: &str,
    ) -> Result<Vec<UserRecord>> {
        self.search_in(
            Some(self.settings.container.as_str()),
            &UserFilter::by_attribute(property, value),
        )
        .await
    }

    async fn search_in(&self, base: Option<&str>, filter: &UserFilter) -> Result<Vec<UserRecord>> {
        let mut session = self.connector.open(base).await?;
        let result = session.search(filter).await;
        session.close().await;

        let mut users = result?;
        sort_by_surname(&mut users);

        info!(
            "🔍 Found {} users under {}",
            users.len(),
            base.unwrap_or(&self.settings.container)
        );
        Ok(users)
    }
}
