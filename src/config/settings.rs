use crate::utils::error::{AdError, Result};
use crate::utils::validation::{
    validate_distinguished_name, validate_ldap_url, validate_non_empty_string, validate_range,
    validate_substituted, Validate,
};
use regex::Regex;
use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;
use std::path::Path;

const DEFAULT_LDAP_PORT: u16 = 389;

/// 程式啟動時載入一次的目錄設定，之後不再變動
#[derive(Clone, Serialize, Deserialize)]
pub struct DirectorySettings {
    #[serde(alias = "server-name")]
    pub server_name: String,
    #[serde(default, alias = "ldap-path")]
    pub ldap_path: Option<String>,
    pub container: String,
    #[serde(alias = "default-ou")]
    pub default_ou: String,
    #[serde(alias = "temp-users-ou")]
    pub temp_users_ou: String,
    #[serde(alias = "disabled-ou")]
    pub disabled_ou: String,
    #[serde(alias = "contractors-ou")]
    pub contractors_ou: String,
    #[serde(alias = "domain-suffix")]
    pub domain_suffix: String,
    #[serde(alias = "service-user")]
    pub service_user: String,
    #[serde(alias = "service-password")]
    pub service_password: String,
    /// 停用帳號時保留的群組；可寫成 "Domain Users;VPN-Access" 或 TOML 陣列
    #[serde(
        default,
        alias = "groups-to-keep",
        deserialize_with = "deserialize_group_list"
    )]
    pub groups_to_keep: Vec<String>,
    #[serde(default)]
    pub connection: ConnectionSettings,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectionSettings {
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,
    #[serde(default)]
    pub use_starttls: bool,
}

impl Default for ConnectionSettings {
    fn default() -> Self {
        Self {
            connect_timeout_secs: default_connect_timeout(),
            use_starttls: false,
        }
    }
}

fn default_connect_timeout() -> u64 {
    10
}

#[derive(Deserialize)]
#[serde(untagged)]
enum GroupList {
    Delimited(String),
    List(Vec<String>),
}

fn deserialize_group_list<'de, D>(deserializer: D) -> std::result::Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let groups = match GroupList::deserialize(deserializer)? {
        GroupList::Delimited(raw) => parse_group_list(&raw),
        GroupList::List(items) => items
            .iter()
            .map(|g| g.trim().to_string())
            .filter(|g| !g.is_empty())
            .collect(),
    };
    Ok(groups)
}

/// 以分號分隔的群組清單，順序保留、空白項目略過
pub fn parse_group_list(raw: &str) -> Vec<String> {
    raw.split(';')
        .map(str::trim)
        .filter(|g| !g.is_empty())
        .map(str::to_string)
        .collect()
}

impl DirectorySettings {
    /// 從 TOML 檔案載入設定
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(&path).map_err(|e| AdError::ConfigError {
            message: format!("cannot read {}: {}", path.as_ref().display(), e),
        })?;
        Self::from_toml_str(&content)
    }

    /// 從 TOML 字串解析設定
    pub fn from_toml_str(content: &str) -> Result<Self> {
        // 先處理環境變數替換，密碼通常由環境變數提供
        let processed_content = Self::substitute_env_vars(content)?;

        toml::from_str(&processed_content).map_err(|e| AdError::ConfigValidationError {
            field: "toml_parsing".to_string(),
            message: format!("TOML parsing error: {}", e),
        })
    }

    /// 替換環境變數 (例如 ${ADCMD_SERVICE_PASSWORD})
    fn substitute_env_vars(content: &str) -> Result<String> {
        let re = Regex::new(r"\$\{([^}]+)\}").map_err(|e| AdError::ConfigError {
            message: format!("invalid substitution pattern: {}", e),
        })?;

        let result = re.replace_all(content, |caps: &regex::Captures| {
            let var_name = &caps[1];
            std::env::var(var_name).unwrap_or_else(|_| format!("${{{}}}", var_name))
        });

        Ok(result.to_string())
    }

    pub fn validate_config(&self) -> Result<()> {
        match self.ldap_path.as_deref() {
            Some(path) => validate_ldap_url("ldap_path", path)?,
            None if self.server_name.trim().is_empty() => {
                return Err(AdError::MissingConfigError {
                    field: "server_name or ldap_path".to_string(),
                });
            }
            None => {}
        }

        validate_distinguished_name("container", &self.container)?;
        validate_distinguished_name("default_ou", &self.default_ou)?;
        validate_distinguished_name("temp_users_ou", &self.temp_users_ou)?;
        validate_distinguished_name("disabled_ou", &self.disabled_ou)?;
        validate_distinguished_name("contractors_ou", &self.contractors_ou)?;

        if !self.domain_suffix.starts_with('@') || self.domain_suffix.len() < 2 {
            return Err(AdError::InvalidConfigValueError {
                field: "domain_suffix".to_string(),
                value: self.domain_suffix.clone(),
                reason: "Expected a UPN suffix such as @corp.example.com".to_string(),
            });
        }

        validate_non_empty_string("service_user", &self.service_user)?;
        validate_substituted("service_user", &self.service_user)?;
        validate_non_empty_string("service_password", &self.service_password)?;
        validate_substituted("service_password", &self.service_password)?;

        validate_range(
            "connection.connect_timeout_secs",
            self.connection.connect_timeout_secs,
            1,
            300,
        )?;

        Ok(())
    }

    /// 有設定 ldap_path 就用它，否則 ldap://<server_name>:389
    pub fn ldap_url(&self) -> String {
        match self.ldap_path.as_deref().map(str::trim) {
            Some(path) if !path.is_empty() => path.to_string(),
            _ => format!("ldap://{}:{}", self.server_name, DEFAULT_LDAP_PORT),
        }
    }

    pub fn uses_tls(&self) -> bool {
        self.ldap_url().to_ascii_lowercase().starts_with("ldaps://") || self.connection.use_starttls
    }

    /// DN 或 UPN 原樣使用；單純帳號名稱補上網域後綴
    pub fn bind_identity(&self) -> String {
        let user = self.service_user.trim();
        if user.contains('=') || user.contains('@') || user.contains('\\') {
            user.to_string()
        } else {
            format!("{}{}", user, self.domain_suffix)
        }
    }

    pub fn user_principal_name(&self, sam_account_name: &str) -> String {
        format!("{}{}", sam_account_name, self.domain_suffix)
    }

    pub fn keeps_group(&self, group_name: &str) -> bool {
        self.groups_to_keep
            .iter()
            .any(|g| g.eq_ignore_ascii_case(group_name))
    }
}

impl Validate for DirectorySettings {
    fn validate(&self) -> Result<()> {
        self.validate_config()
    }
}

// 密碼不進日誌
impl fmt::Debug for DirectorySettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DirectorySettings")
            .field("server_name", &self.server_name)
            .field("ldap_path", &self.ldap_path)
            .field("container", &self.container)
            .field("default_ou", &self.default_ou)
            .field("temp_users_ou", &self.temp_users_ou)
            .field("disabled_ou", &self.disabled_ou)
            .field("contractors_ou", &self.contractors_ou)
            .field("domain_suffix", &self.domain_suffix)
            .field("service_user", &self.service_user)
            .field("service_password", &"***")
            .field("groups_to_keep", &self.groups_to_keep)
            .field("connection", &self.connection)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    const BASIC: &str = r#"
server_name = "dc01.corp.example.com"
container = "DC=corp,DC=example,DC=com"
default_ou = "OU=Staff,DC=corp,DC=example,DC=com"
temp_users_ou = "OU=Temp,DC=corp,DC=example,DC=com"
disabled_ou = "OU=Disabled,DC=corp,DC=example,DC=com"
contractors_ou = "OU=Contractors,DC=corp,DC=example,DC=com"
domain_suffix = "@corp.example.com"
service_user = "svc-adcmd"
service_password = "s3cret"
groups_to_keep = "Domain Users; VPN-Access;"
"#;

    #[test]
    fn test_parse_basic_settings() {
        let settings = DirectorySettings::from_toml_str(BASIC).unwrap();

        assert_eq!(settings.server_name, "dc01.corp.example.com");
        assert_eq!(settings.groups_to_keep, vec!["Domain Users", "VPN-Access"]);
        assert_eq!(settings.connection.connect_timeout_secs, 10);
        assert_eq!(settings.ldap_url(), "ldap://dc01.corp.example.com:389");
        assert_eq!(settings.bind_identity(), "svc-adcmd@corp.example.com");
        assert!(settings.validate().is_ok());
    }

    #[test]
    fn test_groups_to_keep_as_array_and_dashed_keys() {
        let content = BASIC
            .replace(
                "groups_to_keep = \"Domain Users; VPN-Access;\"",
                "groups-to-keep = [\"Domain Users\", \"VPN-Access\"]",
            )
            .replace("default_ou", "default-ou");
        let settings = DirectorySettings::from_toml_str(&content).unwrap();
        assert_eq!(settings.groups_to_keep, vec!["Domain Users", "VPN-Access"]);
        assert!(settings.keeps_group("vpn-access"));
        assert!(!settings.keeps_group("Finance-Team"));
    }

    #[test]
    fn test_env_var_substitution() {
        std::env::set_var("ADCMD_TEST_SERVICE_PASSWORD", "from-env");

        let content = BASIC.replace("\"s3cret\"", "\"${ADCMD_TEST_SERVICE_PASSWORD}\"");
        let settings = DirectorySettings::from_toml_str(&content).unwrap();
        assert_eq!(settings.service_password, "from-env");

        std::env::remove_var("ADCMD_TEST_SERVICE_PASSWORD");
    }

    #[test]
    fn test_unset_env_var_fails_validation() {
        let content = BASIC.replace("\"s3cret\"", "\"${ADCMD_TEST_UNSET_VARIABLE}\"");
        let settings = DirectorySettings::from_toml_str(&content).unwrap();
        assert!(settings.validate().is_err());
    }

    #[test]
    fn test_validation_rejects_bad_values() {
        let content = BASIC.replace("\"@corp.example.com\"", "\"corp.example.com\"");
        let settings = DirectorySettings::from_toml_str(&content).unwrap();
        assert!(settings.validate().is_err());

        let content = format!("ldap_path = \"https://dc01\"\n{}", BASIC);
        let settings = DirectorySettings::from_toml_str(&content).unwrap();
        assert!(settings.validate().is_err());

        let content = BASIC.replace("\"dc01.corp.example.com\"", "\"\"");
        let settings = DirectorySettings::from_toml_str(&content).unwrap();
        assert!(matches!(
            settings.validate(),
            Err(AdError::MissingConfigError { .. })
        ));
    }

    #[test]
    fn test_ldaps_path_enables_tls() {
        let content = format!("ldap_path = \"ldaps://dc01.corp.example.com:636\"\n{}", BASIC);
        let settings = DirectorySettings::from_toml_str(&content).unwrap();
        assert_eq!(settings.ldap_url(), "ldaps://dc01.corp.example.com:636");
        assert!(settings.uses_tls());
    }

    #[test]
    fn test_debug_redacts_password() {
        let settings = DirectorySettings::from_toml_str(BASIC).unwrap();
        let rendered = format!("{:?}", settings);
        assert!(!rendered.contains("s3cret"));
    }

    #[test]
    fn test_settings_from_file() {
        let mut temp_file = NamedTempFile::new().unwrap();
        temp_file.write_all(BASIC.as_bytes()).unwrap();

        let settings = DirectorySettings::from_file(temp_file.path()).unwrap();
        assert_eq!(settings.contractors_ou, "OU=Contractors,DC=corp,DC=example,DC=com");
    }
}
