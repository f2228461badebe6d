use serde::{Deserialize, Serialize};

/// userAccountControl: ACCOUNTDISABLE
pub const UAC_ACCOUNT_DISABLE: u32 = 0x2;
/// userAccountControl: NORMAL_ACCOUNT
pub const UAC_NORMAL_ACCOUNT: u32 = 0x200;

/// 目錄中 `user` 物件的快照。
///
/// 延伸屬性（company、department 等）在目錄裡不存在或有多個值時一律是空字串。
/// `groups` 只有成員查詢才會填入，一般搜尋結果為空。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserRecord {
    pub distinguished_name: String,
    pub sam_account_name: String,
    pub given_name: String,
    pub surname: String,
    pub company: String,
    pub department: String,
    pub title: String,
    pub phone_number: String,
    pub email: String,
    pub notes: String,
    pub enabled: bool,
    pub user_principal_name: String,
    pub groups: Vec<String>,
    /// 原始 userAccountControl，寫回時保留其他旗標
    pub account_control: u32,
}

impl UserRecord {
    pub fn new(
        distinguished_name: impl Into<String>,
        sam_account_name: impl Into<String>,
        given_name: impl Into<String>,
        surname: impl Into<String>,
    ) -> Self {
        Self {
            distinguished_name: distinguished_name.into(),
            sam_account_name: sam_account_name.into(),
            given_name: given_name.into(),
            surname: surname.into(),
            company: String::new(),
            department: String::new(),
            title: String::new(),
            phone_number: String::new(),
            email: String::new(),
            notes: String::new(),
            enabled: true,
            user_principal_name: String::new(),
            groups: Vec::new(),
            account_control: UAC_NORMAL_ACCOUNT,
        }
    }

    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    pub fn with_notes(mut self, notes: impl Into<String>) -> Self {
        self.notes = notes.into();
        self
    }

    pub fn display_name(&self) -> String {
        format!("{} {}", self.given_name, self.surname)
            .trim()
            .to_string()
    }

    /// 依 enabled 欄位算出要寫回的 userAccountControl
    pub fn effective_account_control(&self) -> u32 {
        if self.enabled {
            self.account_control & !UAC_ACCOUNT_DISABLE
        } else {
            self.account_control | UAC_ACCOUNT_DISABLE
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupRecord {
    pub name: String,
    pub distinguished_name: String,
    /// 成員的 DN
    pub members: Vec<String>,
}

impl GroupRecord {
    pub fn new(name: impl Into<String>, distinguished_name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            distinguished_name: distinguished_name.into(),
            members: Vec::new(),
        }
    }

    pub fn has_member(&self, dn: &str) -> bool {
        self.members.iter().any(|m| m.eq_ignore_ascii_case(dn))
    }
}

/// 建立帳號時由使用者提供的資料
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NewUser {
    pub given_name: String,
    pub surname: String,
    pub sam_account_name: String,
    pub company: Option<String>,
    pub department: Option<String>,
    pub title: Option<String>,
    pub phone_number: Option<String>,
}

impl NewUser {
    pub fn new(
        given_name: impl Into<String>,
        surname: impl Into<String>,
        sam_account_name: impl Into<String>,
    ) -> Self {
        Self {
            given_name: given_name.into(),
            surname: surname.into(),
            sam_account_name: sam_account_name.into(),
            ..Default::default()
        }
    }
}

/// 可用來搜尋帳號的屬性
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchProperty {
    FirstName,
    LastName,
    Email,
    Department,
    Company,
}

impl SearchProperty {
    pub fn ldap_attribute(&self) -> &'static str {
        match self {
            SearchProperty::FirstName => "givenName",
            SearchProperty::LastName => "sn",
            SearchProperty::Email => "mail",
            SearchProperty::Department => "department",
            SearchProperty::Company => "company",
        }
    }

    pub fn value_of<'a>(&self, user: &'a UserRecord) -> &'a str {
        match self {
            SearchProperty::FirstName => &user.given_name,
            SearchProperty::LastName => &user.surname,
            SearchProperty::Email => &user.email,
            SearchProperty::Department => &user.department,
            SearchProperty::Company => &user.company,
        }
    }
}

/// 搜尋條件；搜尋範圍由 session 的 search base 決定
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UserFilter {
    /// None 代表不論啟用狀態
    pub enabled: Option<bool>,
    pub attribute: Option<(SearchProperty, String)>,
}

impl UserFilter {
    pub fn any() -> Self {
        Self::default()
    }

    pub fn enabled_only() -> Self {
        Self {
            enabled: Some(true),
            attribute: None,
        }
    }

    pub fn disabled_only() -> Self {
        Self {
            enabled: Some(false),
            attribute: None,
        }
    }

    pub fn by_attribute(property: SearchProperty, value: impl Into<String>) -> Self {
        Self {
            enabled: None,
            attribute: Some((property, value.into())),
        }
    }

    pub fn matches(&self, user: &UserRecord) -> bool {
        if let Some(enabled) = self.enabled {
            if user.enabled != enabled {
                return false;
            }
        }
        match &self.attribute {
            Some((property, value)) => property.value_of(user).eq_ignore_ascii_case(value),
            None => true,
        }
    }
}

/// 依姓氏遞增排序；穩定排序，同姓保留目錄回傳順序
pub fn sort_by_surname(users: &mut [UserRecord]) {
    users.sort_by(|a, b| a.surname.cmp(&b.surname));
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_effective_account_control_keeps_other_flags() {
        let mut user = UserRecord::new("CN=A,DC=x", "a", "A", "A");
        user.account_control = UAC_NORMAL_ACCOUNT | 0x10000; // DONT_EXPIRE_PASSWORD
        user.enabled = false;
        assert_eq!(
            user.effective_account_control(),
            UAC_NORMAL_ACCOUNT | 0x10000 | UAC_ACCOUNT_DISABLE
        );
        user.enabled = true;
        assert_eq!(user.effective_account_control(), UAC_NORMAL_ACCOUNT | 0x10000);
    }

    #[test]
    fn test_sort_by_surname_is_stable() {
        let mut users = vec![
            UserRecord::new("CN=1", "z1", "Zed", "Smith"),
            UserRecord::new("CN=2", "a1", "Ann", "Brown"),
            UserRecord::new("CN=3", "z2", "Amy", "Smith"),
        ];
        sort_by_surname(&mut users);
        let order: Vec<&str> = users.iter().map(|u| u.sam_account_name.as_str()).collect();
        assert_eq!(order, vec!["a1", "z1", "z2"]);
    }

    #[test]
    fn test_filter_matches() {
        let mut user = UserRecord::new("CN=1", "jdoe", "Jane", "Doe").with_enabled(false);
        user.department = "Finance".to_string();

        assert!(UserFilter::any().matches(&user));
        assert!(UserFilter::disabled_only().matches(&user));
        assert!(!UserFilter::enabled_only().matches(&user));
        assert!(UserFilter::by_attribute(SearchProperty::Department, "finance").matches(&user));
        assert!(!UserFilter::by_attribute(SearchProperty::Company, "Acme").matches(&user));
    }
}
