use std::fmt;
use thiserror::Error;

/// 目錄物件種類，用於 NotFound 訊息
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ObjectKind {
    User,
    Group,
}

impl fmt::Display for ObjectKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ObjectKind::User => write!(f, "User"),
            ObjectKind::Group => write!(f, "Group"),
        }
    }
}

#[derive(Error, Debug)]
pub enum AdError {
    #[error("Authentication failed for service account '{user}'")]
    AuthenticationError { user: String },

    #[error("{dn} is not a valid OU")]
    InvalidSearchBaseError { dn: String },

    #[error("{kind} '{identity}' was not found")]
    NotFoundError { kind: ObjectKind, identity: String },

    #[error("Failed to {operation} '{target}': {message}")]
    DirectoryWriteError {
        operation: String,
        target: String,
        message: String,
    },

    #[error("Connection to directory server failed: {message}")]
    ConnectionError { message: String },

    #[error("Directory protocol error: {0}")]
    LdapError(#[from] ldap3::LdapError),

    #[error("Directory search failed: {message}")]
    SearchError { message: String },

    #[error("Configuration error: {message}")]
    ConfigError { message: String },

    #[error("Missing configuration value: {field}")]
    MissingConfigError { field: String },

    #[error("Invalid configuration value for {field} ('{value}'): {reason}")]
    InvalidConfigValueError {
        field: String,
        value: String,
        reason: String,
    },

    #[error("Configuration validation failed for {field}: {message}")]
    ConfigValidationError { field: String, message: String },

    #[error("Validation error: {message}")]
    ValidationError { message: String },

    #[error("Input error: {message}")]
    PromptError { message: String },

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("CSV export error: {0}")]
    CsvError(#[from] csv::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    Authentication,
    Directory,
    Configuration,
    Input,
    System,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ErrorSeverity {
    /// 資訊性結果，例如找不到帳號
    Low,
    Medium,
    High,
    Critical,
}

impl ErrorSeverity {
    pub fn exit_code(&self) -> i32 {
        match self {
            ErrorSeverity::Low => 0,      // 資訊，視為成功
            ErrorSeverity::Medium => 2,   // 輸入錯誤
            ErrorSeverity::High => 1,     // 操作失敗
            ErrorSeverity::Critical => 3, // 認證或連線失敗
        }
    }
}

impl AdError {
    pub fn write(
        operation: impl Into<String>,
        target: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        AdError::DirectoryWriteError {
            operation: operation.into(),
            target: target.into(),
            message: message.into(),
        }
    }

    pub fn user_not_found(identity: impl Into<String>) -> Self {
        AdError::NotFoundError {
            kind: ObjectKind::User,
            identity: identity.into(),
        }
    }

    pub fn group_not_found(identity: impl Into<String>) -> Self {
        AdError::NotFoundError {
            kind: ObjectKind::Group,
            identity: identity.into(),
        }
    }

    pub fn category(&self) -> ErrorCategory {
        match self {
            AdError::AuthenticationError { .. } => ErrorCategory::Authentication,
            AdError::InvalidSearchBaseError { .. }
            | AdError::NotFoundError { .. }
            | AdError::DirectoryWriteError { .. }
            | AdError::ConnectionError { .. }
            | AdError::LdapError(_)
            | AdError::SearchError { .. } => ErrorCategory::Directory,
            AdError::ConfigError { .. }
            | AdError::MissingConfigError { .. }
            | AdError::InvalidConfigValueError { .. }
            | AdError::ConfigValidationError { .. } => ErrorCategory::Configuration,
            AdError::ValidationError { .. } | AdError::PromptError { .. } => ErrorCategory::Input,
            AdError::IoError(_) | AdError::CsvError(_) => ErrorCategory::System,
        }
    }

    pub fn severity(&self) -> ErrorSeverity {
        match self {
            AdError::InvalidSearchBaseError { .. } | AdError::NotFoundError { .. } => {
                ErrorSeverity::Low
            }
            AdError::ValidationError { .. } | AdError::PromptError { .. } => ErrorSeverity::Medium,
            AdError::AuthenticationError { .. }
            | AdError::ConnectionError { .. }
            | AdError::LdapError(_) => ErrorSeverity::Critical,
            _ => ErrorSeverity::High,
        }
    }

    /// 是否為「回報即可」的結果，不算執行失敗
    pub fn is_informational(&self) -> bool {
        self.severity() == ErrorSeverity::Low
    }

    pub fn recovery_suggestion(&self) -> &'static str {
        match self {
            AdError::AuthenticationError { .. } => {
                "Check service_user and service_password in the configuration file"
            }
            AdError::InvalidSearchBaseError { .. } => {
                "Check the distinguished name, e.g. OU=Staff,DC=corp,DC=example,DC=com"
            }
            AdError::NotFoundError { .. } => "Check the spelling of the account or group name",
            AdError::DirectoryWriteError { .. } => {
                "Verify the service account has write permission on the target object"
            }
            AdError::ConnectionError { .. } | AdError::LdapError(_) => {
                "Verify server_name / ldap_path and that the domain controller is reachable"
            }
            AdError::SearchError { .. } => "Retry the search or narrow the search base",
            AdError::ConfigError { .. }
            | AdError::MissingConfigError { .. }
            | AdError::InvalidConfigValueError { .. }
            | AdError::ConfigValidationError { .. } => {
                "Review the configuration file and referenced environment variables"
            }
            AdError::ValidationError { .. } | AdError::PromptError { .. } => {
                "Re-run the command and provide every requested value"
            }
            AdError::IoError(_) | AdError::CsvError(_) => {
                "Check file permissions and free disk space"
            }
        }
    }

    pub fn user_friendly_message(&self) -> String {
        match self {
            AdError::AuthenticationError { user } => {
                format!("The directory rejected the credentials of '{}'", user)
            }
            AdError::ConnectionError { .. } | AdError::LdapError(_) => {
                "Could not talk to the directory server".to_string()
            }
            AdError::MissingConfigError { field } => {
                format!("Configuration value '{}' is required", field)
            }
            other => other.to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, AdError>;
