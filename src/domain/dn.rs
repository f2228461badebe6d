//! DN 工具：組新帳號的 `CN=...,<ou>`、搬移時拆出第一段 RDN、判斷是否在某個 OU 之下。

use crate::utils::error::{AdError, Result};

/// 組出 `CN=<display_name>,<parent_ou>`，CN 依 RFC 4514 跳脫
pub fn build_user_dn(display_name: &str, parent_ou: &str) -> Result<String> {
    if display_name.trim().is_empty() {
        return Err(AdError::ValidationError {
            message: "Display name cannot be empty for DN construction".to_string(),
        });
    }
    if parent_ou.trim().is_empty() {
        return Err(AdError::ValidationError {
            message: "Target OU cannot be empty for DN construction".to_string(),
        });
    }

    Ok(format!("CN={},{}", escape_dn_value(display_name), parent_ou))
}

pub fn escape_dn_value(value: &str) -> String {
    let last = value.chars().count().saturating_sub(1);
    let mut result = String::with_capacity(value.len());
    for (i, c) in value.chars().enumerate() {
        match c {
            '"' | '+' | ',' | ';' | '<' | '>' | '\\' | '=' => {
                result.push('\\');
                result.push(c);
            }
            '#' if i == 0 => {
                result.push('\\');
                result.push(c);
            }
            ' ' if i == 0 || i == last => {
                result.push('\\');
                result.push(c);
            }
            _ => result.push(c),
        }
    }
    result
}

/// `CN=Doe\, Jane,OU=Staff,DC=corp` 拆成 (`CN=Doe\, Jane`, `OU=Staff,DC=corp`)。
///
/// 跳脫的逗號留在 RDN 內；只有一段時 parent 為空字串。
pub fn split_rdn(dn: &str) -> (&str, &str) {
    let mut escaped = false;
    for (i, c) in dn.char_indices() {
        match c {
            '\\' if !escaped => escaped = true,
            ',' if !escaped => return (dn[..i].trim(), dn[i + 1..].trim()),
            _ => escaped = false,
        }
    }
    (dn.trim(), "")
}

/// 依未跳脫的逗號切開每一段 RDN，空段保留，交給呼叫端判斷
pub fn components(dn: &str) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut start = 0;
    let mut escaped = false;
    for (i, c) in dn.char_indices() {
        match c {
            '\\' if !escaped => escaped = true,
            ',' if !escaped => {
                parts.push(dn[start..i].trim());
                start = i + 1;
            }
            _ => escaped = false,
        }
    }
    parts.push(dn[start..].trim());
    parts
}

/// 第一段 RDN 還原跳脫後的值，例如 `CN=Finance-Team,OU=Groups,...` 得到 `Finance-Team`
pub fn rdn_value(dn: &str) -> String {
    let (rdn, _) = split_rdn(dn);
    let raw = rdn.split_once('=').map(|(_, v)| v).unwrap_or(rdn);

    let mut value = String::with_capacity(raw.len());
    let mut escaped = false;
    for c in raw.chars() {
        if c == '\\' && !escaped {
            escaped = true;
            continue;
        }
        escaped = false;
        value.push(c);
    }
    value
}

/// `dn` 等於 `base` 或位於其下，不分大小寫
pub fn is_within(dn: &str, base: &str) -> bool {
    let dn = dn.to_ascii_lowercase();
    let base = base.to_ascii_lowercase();
    dn == base || dn.ends_with(&format!(",{}", base))
}
