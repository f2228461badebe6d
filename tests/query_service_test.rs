mod common;

use adcmd::domain::model::SearchProperty;
use adcmd::{AdError, DirectoryQueryService, InMemoryDirectory};
use common::*;

#[tokio::test]
async fn test_users_in_ou_returns_enabled_users_sorted_by_surname() {
    let dir = directory();
    let users = query(&dir).users_in_ou(STAFF_OU, false).await.unwrap();

    assert_eq!(surnames(&users), vec!["Adams", "Doe", "Smith", "Smith"]);
    // same surname keeps directory order
    assert_eq!(users[2].sam_account_name, "asmith");
    assert_eq!(users[3].sam_account_name, "zsmith");
    assert!(users.iter().all(|u| u.enabled));
    assert_sessions_balanced(&dir);
}

#[tokio::test]
async fn test_users_in_ou_can_include_disabled() {
    let dir = directory();
    let users = query(&dir).users_in_ou(STAFF_OU, true).await.unwrap();

    assert_eq!(surnames(&users), vec!["Adams", "Brown", "Doe", "Smith", "Smith"]);
    assert!(!users[1].enabled);
}

#[tokio::test]
async fn test_empty_ou_returns_empty_list() {
    let dir = directory();
    let users = query(&dir).users_in_ou(TEMP_OU, true).await.unwrap();

    assert!(users.is_empty());
    assert_sessions_balanced(&dir);
}

#[tokio::test]
async fn test_unknown_ou_is_invalid_search_base() {
    let dir = directory();
    let err = query(&dir)
        .users_in_ou("OU=Nowhere,DC=corp,DC=example,DC=com", false)
        .await
        .unwrap_err();

    match &err {
        AdError::InvalidSearchBaseError { dn } => {
            assert_eq!(dn, "OU=Nowhere,DC=corp,DC=example,DC=com")
        }
        other => panic!("unexpected error: {other:?}"),
    }
    assert!(err.is_informational());
    assert_sessions_balanced(&dir);
}

#[tokio::test]
async fn test_default_ou_and_contractors() {
    let dir = directory();
    let service = query(&dir);

    let staff = service.default_ou_users().await.unwrap();
    assert_eq!(staff.len(), 4);

    let contractors = service.contractors().await.unwrap();
    assert_eq!(surnames(&contractors), vec!["Contra"]);
    assert_sessions_balanced(&dir);
}

#[tokio::test]
async fn test_disabled_users_searches_whole_container() {
    let dir = directory();
    let users = query(&dir).disabled_users().await.unwrap();

    assert_eq!(surnames(&users), vec!["Brown", "Old"]);
    assert!(users.iter().all(|u| !u.enabled));
}

#[tokio::test]
async fn test_find_by_identity() -> anyhow::Result<()> {
    let dir = directory();
    let service = query(&dir);

    assert!(service.find_by_identity("nonexistent").await?.is_none());

    let user = service.find_by_identity("JDOE").await?.expect("jdoe exists");
    assert_eq!(user.distinguished_name, JDOE_DN);
    assert_eq!(user.department, "Finance");

    assert_sessions_balanced(&dir);
    Ok(())
}

#[tokio::test]
async fn test_find_by_attribute() -> anyhow::Result<()> {
    let dir = directory();
    let service = query(&dir);

    let finance = service
        .find_by_attribute(SearchProperty::Department, "finance")
        .await?;
    assert_eq!(surnames(&finance), vec!["Doe"]);

    let smiths = service
        .find_by_attribute(SearchProperty::LastName, "Smith")
        .await?;
    assert_eq!(smiths.len(), 2);

    let none = service
        .find_by_attribute(SearchProperty::Company, "Globex")
        .await?;
    assert!(none.is_empty());
    Ok(())
}

#[tokio::test]
async fn test_validate_ou() {
    let dir = directory();
    let service = query(&dir);

    assert!(service.validate_ou(DISABLED_OU).await);
    assert!(!service.validate_ou("OU=Missing,DC=corp,DC=example,DC=com").await);
    assert_sessions_balanced(&dir);
}

#[tokio::test]
async fn test_rejected_bind_is_critical() {
    let dir = directory().reject_bind();
    let service = DirectoryQueryService::new(dir.clone(), settings());

    let err = service.default_ou_users().await.unwrap_err();
    assert!(matches!(err, AdError::AuthenticationError { .. }));
    assert_eq!(err.severity().exit_code(), 3);
    assert_eq!(dir.sessions(), (0, 0));
}

#[tokio::test]
async fn test_surnames_non_decreasing_for_every_listing() {
    let dir = directory();
    let service = query(&dir);

    let listings = vec![
        service.users_in_ou(CONTAINER, true).await.unwrap(),
        service.users_in_ou(STAFF_OU, false).await.unwrap(),
        service.disabled_users().await.unwrap(),
        service.contractors().await.unwrap(),
    ];
    for users in listings {
        assert!(users.windows(2).all(|w| w[0].surname <= w[1].surname));
    }
}

#[tokio::test]
async fn test_dry_run_directory_has_configured_ous_only() {
    let dir = InMemoryDirectory::from_settings(&settings());
    let service = query(&dir);

    assert!(service.validate_ou(CONTRACTORS_OU).await);
    assert!(service.default_ou_users().await.unwrap().is_empty());
    assert!(!service.validate_ou(GROUPS_OU).await);
}
