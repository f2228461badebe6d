use crate::domain::model::UserRecord;
use crate::utils::error::Result;
use crate::utils::validation::validate_path;
use serde::Serialize;
use std::path::Path;
use tracing::info;

/// 匯出檔的一列，欄位名稱即 CSV 標頭
#[derive(Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
struct ExportRow<'a> {
    sam_account_name: &'a str,
    given_name: &'a str,
    surname: &'a str,
    email: &'a str,
    company: &'a str,
    department: &'a str,
    title: &'a str,
    phone_number: &'a str,
    enabled: bool,
    distinguished_name: &'a str,
}

impl<'a> From<&'a UserRecord> for ExportRow<'a> {
    fn from(user: &'a UserRecord) -> Self {
        Self {
            sam_account_name: &user.sam_account_name,
            given_name: &user.given_name,
            surname: &user.surname,
            email: &user.email,
            company: &user.company,
            department: &user.department,
            title: &user.title,
            phone_number: &user.phone_number,
            enabled: user.enabled,
            distinguished_name: &user.distinguished_name,
        }
    }
}

/// 依傳入順序寫出，既有檔案會被覆寫。回傳寫出的筆數。
pub fn export_users_csv(path: &Path, users: &[UserRecord]) -> Result<usize> {
    validate_path("export_path", &path.to_string_lossy())?;

    let mut writer = csv::Writer::from_path(path)?;
    for user in users {
        writer.serialize(ExportRow::from(user))?;
    }
    writer.flush()?;

    info!("📝 Exported {} users to {}", users.len(), path.display());
    Ok(users.len())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_export_writes_header_and_rows() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("users.csv");

        let mut jane = UserRecord::new("CN=Doe\\, Jane,OU=Staff,DC=corp", "jdoe", "Jane", "Doe");
        jane.company = "Acme".to_string();
        let bob = UserRecord::new("CN=Bob Ray,OU=Staff,DC=corp", "bray", "Bob", "Ray")
            .with_enabled(false);

        let written = export_users_csv(&path, &[jane, bob]).unwrap();
        assert_eq!(written, 2);

        let content = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(
            lines[0],
            "SamAccountName,GivenName,Surname,Email,Company,Department,Title,PhoneNumber,Enabled,DistinguishedName"
        );
        assert_eq!(lines[1], "jdoe,Jane,Doe,,Acme,,,,true,\"CN=Doe\\, Jane,OU=Staff,DC=corp\"");
        assert!(lines[2].starts_with("bray,Bob,Ray,"));
        assert!(lines[2].contains(",false,"));
    }

    #[test]
    fn test_export_empty_list_writes_nothing_but_succeeds() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("empty.csv");

        assert_eq!(export_users_csv(&path, &[]).unwrap(), 0);
        assert!(path.exists());
    }
}
