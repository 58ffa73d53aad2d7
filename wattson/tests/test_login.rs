mod common;

use common::mock_server::WattsonMock;
use wattson::session::SessionState;
use wattson::types::{Credential, Identity};
use wattson::Error;

#[tokio::test]
async fn test_login_valid() {
    let mock = WattsonMock::start().await;
    mock.mount_fixture("auth/login_valid.json").await;

    let harness = mock.signed_out();
    let signed_in = harness.client.login("alice", "correct-horse").await.unwrap();

    assert_eq!(signed_in.credential, Credential::new("tok1"));
    assert_eq!(signed_in.identity, Identity::new("alice"));
    // The gateway only reports the credential; the session is untouched.
    assert_eq!(harness.session.state(), SessionState::Unauthenticated);
}

#[tokio::test]
async fn test_login_sends_username_and_password() {
    let mock = WattsonMock::start().await;
    mock.mount_fixture("auth/login_valid.json").await;

    let harness = mock.signed_out();
    harness.client.login("alice", "correct-horse").await.unwrap();

    let requests = mock.server.received_requests().await.unwrap();
    let body: serde_json::Value = serde_json::from_slice(&requests[0].body).unwrap();
    assert_eq!(
        body,
        serde_json::json!({"username": "alice", "password": "correct-horse"})
    );
}

#[tokio::test]
async fn test_login_invalid_credentials_surface_detail() {
    let mock = WattsonMock::start().await;
    mock.mount_fixture("auth/login_invalid.json").await;

    let harness = mock.signed_out();
    let err = harness.client.login("alice", "wrong").await.unwrap_err();

    assert_eq!(err.status(), Some(401));
    assert_eq!(
        err.message(),
        "No active account found with the given credentials"
    );
}

#[tokio::test]
async fn test_login_without_access_token_fails() {
    let mock = WattsonMock::start().await;
    mock.mount_fixture("auth/login_missing_access.json").await;

    let harness = mock.signed_out();
    let err = harness.client.login("alice", "correct-horse").await.unwrap_err();

    assert!(matches!(err, Error::Decode { .. }));
    assert_eq!(err.message(), "Login failed. Please check your credentials.");
}

#[tokio::test]
async fn test_failed_login_keeps_existing_session() {
    let mock = WattsonMock::start().await;
    mock.mount_fixture("auth/login_invalid.json").await;

    let harness = mock.signed_in("tok1", "alice");
    harness.client.login("bob", "wrong").await.unwrap_err();

    assert!(harness.session.state().is_authenticated());
}

#[tokio::test]
async fn test_login_requires_both_fields() {
    let mock = WattsonMock::start().await;
    let harness = mock.signed_out();

    let err = harness.client.login("", "secret").await.unwrap_err();
    assert_eq!(err.message(), "Username is required");
    let err = harness.client.login("alice", "").await.unwrap_err();
    assert_eq!(err.message(), "Password is required");
}
