#![allow(dead_code)]

use adcmd::domain::model::UserRecord;
use adcmd::domain::notes::FixedClock;
use adcmd::{
    CommandRunner, DirectoryQueryService, DirectorySettings, InMemoryDirectory, ScriptedPrompt,
    UserLifecycleService,
};
use chrono::NaiveDate;
use std::sync::Arc;

pub const CONTAINER: &str = "DC=corp,DC=example,DC=com";
pub const STAFF_OU: &str = "OU=Staff,DC=corp,DC=example,DC=com";
pub const TEMP_OU: &str = "OU=Temp,DC=corp,DC=example,DC=com";
pub const DISABLED_OU: &str = "OU=Disabled,DC=corp,DC=example,DC=com";
pub const CONTRACTORS_OU: &str = "OU=Contractors,DC=corp,DC=example,DC=com";
pub const GROUPS_OU: &str = "OU=Groups,DC=corp,DC=example,DC=com";

pub const JDOE_DN: &str = "CN=Jane Doe,OU=Staff,DC=corp,DC=example,DC=com";
pub const ASMITH_DN: &str = "CN=Alice Smith,OU=Staff,DC=corp,DC=example,DC=com";

pub const NOW: &str = "2026-10-16 09:30:00";

pub fn settings() -> Arc<DirectorySettings> {
    let content = format!(
        r#"
server_name = "dc01.corp.example.com"
ldap_path = "ldaps://dc01.corp.example.com:636"
container = "{CONTAINER}"
default_ou = "{STAFF_OU}"
temp_users_ou = "{TEMP_OU}"
disabled_ou = "{DISABLED_OU}"
contractors_ou = "{CONTRACTORS_OU}"
domain_suffix = "@corp.example.com"
service_user = "svc-adcmd"
service_password = "s3cret"
groups_to_keep = "Domain Users;VPN-Access"
"#
    );
    Arc::new(DirectorySettings::from_toml_str(&content).unwrap())
}

pub fn clock() -> FixedClock {
    FixedClock(
        NaiveDate::from_ymd_opt(2026, 10, 16)
            .unwrap()
            .and_hms_opt(9, 30, 0)
            .unwrap(),
    )
}

fn user(ou: &str, sam: &str, given: &str, surname: &str) -> UserRecord {
    UserRecord::new(format!("CN={} {},{}", given, surname, ou), sam, given, surname)
}

/// Staff: Doe, Smith, Brown (disabled), Adams, Smithers.
/// Contractors: Kim Contra, Xavier Old (disabled).
/// jdoe is in Domain Users, VPN-Access and Finance-Team.
pub fn directory() -> InMemoryDirectory {
    let mut jdoe = user(STAFF_OU, "jdoe", "Jane", "Doe");
    jdoe.department = "Finance".to_string();
    jdoe.notes = "2026-01-02 08:00:00 - Account created".to_string();

    let mut zsmith = user(STAFF_OU, "zsmith", "Zoe", "Smith");
    zsmith.company = "Acme".to_string();

    InMemoryDirectory::from_settings(&settings())
        .with_ou(GROUPS_OU)
        .with_user(jdoe)
        .with_user(user(STAFF_OU, "asmith", "Alice", "Smith"))
        .with_user(user(STAFF_OU, "bbrown", "Bob", "Brown").with_enabled(false))
        .with_user(user(STAFF_OU, "cadams", "Carl", "Adams"))
        .with_user(zsmith)
        .with_user(user(CONTRACTORS_OU, "kcontra", "Kim", "Contra"))
        .with_user(user(CONTRACTORS_OU, "xold", "Xavier", "Old").with_enabled(false))
        .with_group(
            "Domain Users",
            "CN=Domain Users,OU=Groups,DC=corp,DC=example,DC=com",
            &[JDOE_DN, ASMITH_DN],
        )
        .with_group(
            "VPN-Access",
            "CN=VPN-Access,OU=Groups,DC=corp,DC=example,DC=com",
            &[JDOE_DN],
        )
        .with_group(
            "Finance-Team",
            "CN=Finance-Team,OU=Groups,DC=corp,DC=example,DC=com",
            &[
                JDOE_DN,
                ASMITH_DN,
                "CN=Finance Printers,OU=Groups,DC=corp,DC=example,DC=com",
            ],
        )
}

pub fn query(dir: &InMemoryDirectory) -> DirectoryQueryService<InMemoryDirectory> {
    DirectoryQueryService::new(dir.clone(), settings())
}

pub fn lifecycle(dir: &InMemoryDirectory) -> UserLifecycleService<InMemoryDirectory, FixedClock> {
    UserLifecycleService::new(dir.clone(), settings()).with_clock(clock())
}

pub fn runner(
    dir: &InMemoryDirectory,
    answers: &[&str],
) -> CommandRunner<InMemoryDirectory, FixedClock, ScriptedPrompt, Vec<u8>> {
    CommandRunner::new(
        query(dir),
        lifecycle(dir),
        ScriptedPrompt::new(answers.iter().copied()),
        Vec::new(),
    )
}

pub fn assert_sessions_balanced(dir: &InMemoryDirectory) {
    let (opened, closed) = dir.sessions();
    assert_eq!(opened, closed, "every opened session must be closed");
}

pub fn surnames(users: &[UserRecord]) -> Vec<&str> {
    users.iter().map(|u| u.surname.as_str()).collect()
}
