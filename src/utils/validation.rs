use crate::domain::dn::components;
use crate::utils::error::{AdError, Result};
use url::Url;

pub trait Validate {
    fn validate(&self) -> Result<()>;
}

/// LDAP 連線字串只接受 ldap:// 與 ldaps://
pub fn validate_ldap_url(field_name: &str, url_str: &str) -> Result<()> {
    if url_str.is_empty() {
        return Err(AdError::InvalidConfigValueError {
            field: field_name.to_string(),
            value: url_str.to_string(),
            reason: "URL cannot be empty".to_string(),
        });
    }

    match Url::parse(url_str) {
        Ok(url) => match url.scheme() {
            "ldap" | "ldaps" => {
                if url.host_str().map(str::is_empty).unwrap_or(true) {
                    return Err(AdError::InvalidConfigValueError {
                        field: field_name.to_string(),
                        value: url_str.to_string(),
                        reason: "URL has no host".to_string(),
                    });
                }
                Ok(())
            }
            scheme => Err(AdError::InvalidConfigValueError {
                field: field_name.to_string(),
                value: url_str.to_string(),
                reason: format!("Unsupported URL scheme: {}", scheme),
            }),
        },
        Err(e) => Err(AdError::InvalidConfigValueError {
            field: field_name.to_string(),
            value: url_str.to_string(),
            reason: format!("Invalid URL format: {}", e),
        }),
    }
}

pub fn validate_path(field_name: &str, path: &str) -> Result<()> {
    if path.is_empty() {
        return Err(AdError::InvalidConfigValueError {
            field: field_name.to_string(),
            value: path.to_string(),
            reason: "Path cannot be empty".to_string(),
        });
    }

    if path.contains('\0') {
        return Err(AdError::InvalidConfigValueError {
            field: field_name.to_string(),
            value: path.to_string(),
            reason: "Path contains null bytes".to_string(),
        });
    }

    Ok(())
}

pub fn validate_non_empty_string(field_name: &str, value: &str) -> Result<()> {
    if value.trim().is_empty() {
        return Err(AdError::InvalidConfigValueError {
            field: field_name.to_string(),
            value: value.to_string(),
            reason: "Value cannot be empty or whitespace-only".to_string(),
        });
    }
    Ok(())
}

/// `${VAR}` 沒有被環境變數替換時會原樣留下
pub fn validate_substituted(field_name: &str, value: &str) -> Result<()> {
    if value.contains("${") {
        return Err(AdError::InvalidConfigValueError {
            field: field_name.to_string(),
            value: value.to_string(),
            reason: "Referenced environment variable is not set".to_string(),
        });
    }
    Ok(())
}

/// 類 DN 字串：至少要有一個 `名稱=值` 組成
pub fn validate_distinguished_name(field_name: &str, value: &str) -> Result<()> {
    validate_non_empty_string(field_name, value)?;

    // 跳脫的逗號屬於值的一部分
    let well_formed = components(value).into_iter().all(|component| {
        component
            .split_once('=')
            .map(|(attr, val)| !attr.trim().is_empty() && !val.trim().is_empty())
            .unwrap_or(false)
    });

    if !well_formed {
        return Err(AdError::InvalidConfigValueError {
            field: field_name.to_string(),
            value: value.to_string(),
            reason: "Expected a distinguished name such as OU=Staff,DC=corp,DC=example,DC=com"
                .to_string(),
        });
    }
    Ok(())
}

pub fn validate_range<T: PartialOrd + std::fmt::Display + Copy>(
    field_name: &str,
    value: T,
    min: T,
    max: T,
) -> Result<()> {
    if value < min || value > max {
        return Err(AdError::InvalidConfigValueError {
            field: field_name.to_string(),
            value: value.to_string(),
            reason: format!("Value must be between {} and {}", min, max),
        });
    }
    Ok(())
}
