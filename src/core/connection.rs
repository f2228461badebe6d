use crate::domain::ports::{DirectoryConnector, DirectorySession};
use tracing::debug;

/// 確認 OU 存在且可以 bind。失敗只回傳 false，不回傳錯誤；探測用的連線一定會關閉。
pub async fn validate_ou<D: DirectoryConnector>(connector: &D, dn: &str) -> bool {
    match connector.open(Some(dn)).await {
        Ok(mut session) => {
            session.close().await;
            true
        }
        Err(e) => {
            debug!("OU check failed for {}: {}", dn, e);
            false
        }
    }
}
