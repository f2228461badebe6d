use crate::domain::model::{GroupRecord, UserFilter, UserRecord};
use crate::utils::error::Result;
use async_trait::async_trait;

/// 建立已認證的目錄連線。每個工作流程各自開一個 session，結束時必須 `close`。
#[async_trait]
pub trait DirectoryConnector: Send + Sync {
    type Session: DirectorySession;

    /// `search_base` 為 None 時使用設定中的 container。
    ///
    /// 帳密被拒回傳 `AuthenticationError`，search base 不存在回傳 `InvalidSearchBaseError`。
    async fn open(&self, search_base: Option<&str>) -> Result<Self::Session>;
}

/// 一條已 bind 的連線，所有搜尋都限定在 `search_base()` 之下。
#[async_trait]
pub trait DirectorySession: Send {
    fn search_base(&self) -> &str;

    /// 分頁搜尋並全部讀完才回傳，順序即目錄回傳順序
    async fn search(&mut self, filter: &UserFilter) -> Result<Vec<UserRecord>>;

    async fn find_by_identity(&mut self, sam_account_name: &str) -> Result<Option<UserRecord>>;

    async fn find_by_dn(&mut self, dn: &str) -> Result<Option<UserRecord>>;

    async fn find_group(&mut self, name: &str) -> Result<Option<GroupRecord>>;

    /// 使用者直接所屬的群組
    async fn groups_of(&mut self, user: &UserRecord) -> Result<Vec<GroupRecord>>;

    /// 以 `user.distinguished_name` 新增物件，新物件一律先停用，啟用交給 `save`
    async fn create(&mut self, user: &UserRecord) -> Result<()>;

    /// 寫回可變欄位（啟用狀態、notes、延伸屬性）
    async fn save(&mut self, user: &UserRecord) -> Result<()>;

    /// 目前連線能否寫入密碼；AD 只在加密連線上接受 `unicodePwd`
    fn supports_password_write(&self) -> bool;

    async fn set_password(&mut self, user_dn: &str, password: &str) -> Result<()>;

    /// 移到另一個容器，回傳新的 DN
    async fn move_to(&mut self, user_dn: &str, new_parent: &str) -> Result<String>;

    async fn add_member(&mut self, group: &GroupRecord, user_dn: &str) -> Result<()>;

    async fn remove_member(&mut self, group: &GroupRecord, user_dn: &str) -> Result<()>;

    /// 刪除物件，只用來撤回建立到一半的帳號
    async fn delete(&mut self, dn: &str) -> Result<()>;

    /// 釋放連線；失敗只記錄，不回傳錯誤
    async fn close(&mut self);
}

/// 互動輸入來源，讓工作流程可以用腳本化輸入測試
pub trait PromptProvider {
    fn ask_line(&mut self, prompt: &str) -> Result<String>;

    /// 密碼輸入；預設行為與一般輸入相同
    fn ask_secret(&mut self, prompt: &str) -> Result<String> {
        self.ask_line(prompt)
    }
}
