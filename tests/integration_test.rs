// Integration tests for credhub-auth
//
// These tests drive a full session (config store, auth strategy, dispatcher)
// against a mock auth server and credential API.

use mockito::{Matcher, Server, ServerGuard};
use reqwest::Method;
use serde_json::json;

use credhub_auth::{
    auth::{GrantCredentials, DEFAULT_CLIENT_ID, REVOKED},
    config::{ConfigStore, HttpSettings, ServerTarget},
    dispatcher::ApiRequest,
    error::ClientError,
    replay::Payload,
    repository::{CredentialRepository, JsonRepository},
    session::Session,
};

// ==================================================================================================
// Test Helpers
// ==================================================================================================

const EXPIRED: &str = r#"{"error":"access_token_expired","error_description":"Access token expired"}"#;

/// Config store in a temp dir pointing both API and auth server at the mock
fn store_for(server: &ServerGuard, access_token: &str, refresh_token: &str) -> (tempfile::TempDir, ConfigStore) {
    let dir = tempfile::tempdir().expect("tempdir");
    let store = ConfigStore::new(dir.path());
    store
        .save(&ServerTarget {
            api_url: server.url(),
            auth_url: server.url(),
            access_token: access_token.to_string(),
            refresh_token: refresh_token.to_string(),
            ..Default::default()
        })
        .expect("save config");
    (dir, store)
}

// ==================================================================================================
// Login
// ==================================================================================================

#[tokio::test]
async fn test_password_login_sets_tokens() {
    let mut server = Server::new_async().await;
    let token = server
        .mock("POST", "/oauth/token")
        .match_body(Matcher::AllOf(vec![
            Matcher::UrlEncoded("grant_type".into(), "password".into()),
            Matcher::UrlEncoded("username".into(), "u".into()),
            Matcher::UrlEncoded("password".into(), "p".into()),
        ]))
        .with_status(200)
        .with_body(r#"{"access_token":"AT1","refresh_token":"RT1"}"#)
        .expect(1)
        .create_async()
        .await;

    let (_dir, store) = store_for(&server, "", "");
    let mut session = Session::open_for_login(
        store.clone(),
        &HttpSettings::default(),
        GrantCredentials::user("u", "p"),
    )
    .unwrap();

    session.auth().login().await.unwrap();
    session.persist().await.unwrap();

    token.assert_async().await;
    let creds = session.auth().credentials().await;
    assert_eq!(creds.access_token.as_deref(), Some("AT1"));
    assert_eq!(creds.refresh_token.as_deref(), Some("RT1"));

    let target = store.load().unwrap();
    assert_eq!(target.access_token, "AT1");
    assert_eq!(target.refresh_token, "RT1");
}

// ==================================================================================================
// Refresh and replay
// ==================================================================================================

#[tokio::test]
async fn test_expired_token_refresh_and_replay() {
    let mut server = Server::new_async().await;
    let first = server
        .mock("GET", "/api/v1/data")
        .match_query(Matcher::UrlEncoded("name".into(), "/db/password".into()))
        .match_header("authorization", "Bearer AT1")
        .with_status(401)
        .with_body(EXPIRED)
        .expect(1)
        .create_async()
        .await;
    let refresh = server
        .mock("POST", "/oauth/token")
        .match_body(Matcher::AllOf(vec![
            Matcher::UrlEncoded("grant_type".into(), "refresh_token".into()),
            Matcher::UrlEncoded("refresh_token".into(), "RT1".into()),
            Matcher::UrlEncoded("client_id".into(), DEFAULT_CLIENT_ID.into()),
        ]))
        .with_status(200)
        .with_body(r#"{"access_token":"AT2","refresh_token":"RT2"}"#)
        .expect(1)
        .create_async()
        .await;
    let replay = server
        .mock("GET", "/api/v1/data")
        .match_query(Matcher::UrlEncoded("name".into(), "/db/password".into()))
        .match_header("authorization", "Bearer AT2")
        .with_status(200)
        .with_body(r#"{"data":[{"id":"9","name":"/db/password","type":"password","value":"p4ss"}]}"#)
        .expect(1)
        .create_async()
        .await;

    let (_dir, store) = store_for(&server, "AT1", "RT1");
    let mut session = Session::open(
        store.clone(),
        &HttpSettings::default(),
        GrantCredentials::default_client(),
    )
    .unwrap();

    let credential = session
        .dispatcher()
        .execute(
            ApiRequest::get("/api/v1/data").query("name", "/db/password"),
            "/db/password",
            &CredentialRepository,
        )
        .await
        .unwrap();
    session.persist().await.unwrap();

    first.assert_async().await;
    refresh.assert_async().await;
    replay.assert_async().await;
    assert_eq!(credential.value, json!("p4ss"));
    assert_eq!(
        session.auth().credentials().await.access_token.as_deref(),
        Some("AT2")
    );
    assert_eq!(store.load().unwrap().refresh_token, "RT2");
}

#[tokio::test]
async fn test_persistent_expiry_sends_exactly_twice() {
    let mut server = Server::new_async().await;
    let resource = server
        .mock("POST", "/api/v1/data")
        .with_status(401)
        .with_body(EXPIRED)
        .expect(2)
        .create_async()
        .await;
    let refresh = server
        .mock("POST", "/oauth/token")
        .with_status(200)
        .with_body(r#"{"access_token":"AT2","refresh_token":"RT2"}"#)
        .expect(1)
        .create_async()
        .await;

    let (_dir, store) = store_for(&server, "AT1", "RT1");
    let session = Session::open(
        store,
        &HttpSettings::default(),
        GrantCredentials::default_client(),
    )
    .unwrap();

    let err = session
        .dispatcher()
        .execute(
            ApiRequest::new(Method::POST, "/api/v1/data")
                .payload(Payload::Json(json!({"name": "/x", "type": "password"}))),
            "/x",
            &JsonRepository,
        )
        .await
        .unwrap_err();

    resource.assert_async().await;
    refresh.assert_async().await;
    assert!(matches!(err, ClientError::AuthExpired(m) if m == "Access token expired"));
}

#[tokio::test]
async fn test_stream_payload_replayed_byte_for_byte() {
    let payload: &[u8] = b"{\"name\":\"/cert\",\"type\":\"certificate\",\"value\":{\"ca\":\"-----BEGIN\"}}";
    let expected = String::from_utf8(payload.to_vec()).unwrap();

    let mut server = Server::new_async().await;
    let first = server
        .mock("PUT", "/api/v1/data")
        .match_header("authorization", "Bearer AT1")
        .match_body(Matcher::Exact(expected.clone()))
        .with_status(401)
        .with_body(EXPIRED)
        .expect(1)
        .create_async()
        .await;
    server
        .mock("POST", "/oauth/token")
        .with_status(200)
        .with_body(r#"{"access_token":"AT2"}"#)
        .create_async()
        .await;
    let replay = server
        .mock("PUT", "/api/v1/data")
        .match_header("authorization", "Bearer AT2")
        .match_body(Matcher::Exact(expected))
        .with_status(200)
        .with_body(r#"{"id":"c1","name":"/cert","type":"certificate","value":{}}"#)
        .expect(1)
        .create_async()
        .await;

    let (_dir, store) = store_for(&server, "AT1", "RT1");
    let session = Session::open(
        store,
        &HttpSettings::default(),
        GrantCredentials::default_client(),
    )
    .unwrap();

    let reader = tokio_test::io::Builder::new()
        .read(&payload[..20])
        .read(&payload[20..])
        .build();
    let credential = session
        .dispatcher()
        .execute(
            ApiRequest::new(Method::PUT, "/api/v1/data").payload(Payload::Reader(Box::new(reader))),
            "/cert",
            &CredentialRepository,
        )
        .await
        .unwrap();

    first.assert_async().await;
    replay.assert_async().await;
    assert_eq!(credential.id, "c1");
}

#[tokio::test]
async fn test_permission_denied_is_not_retried() {
    let mut server = Server::new_async().await;
    let resource = server
        .mock("GET", "/api/v1/data/abc")
        .with_status(403)
        .with_body(r#"{"error":"The request could not be completed because the credential does not exist or you do not have sufficient authorization."}"#)
        .expect(1)
        .create_async()
        .await;
    let token = server
        .mock("POST", Matcher::Any)
        .expect(0)
        .create_async()
        .await;

    let (_dir, store) = store_for(&server, "AT1", "RT1");
    let session = Session::open(
        store,
        &HttpSettings::default(),
        GrantCredentials::default_client(),
    )
    .unwrap();

    let err = session
        .dispatcher()
        .execute(ApiRequest::get("/api/v1/data/abc"), "abc", &CredentialRepository)
        .await
        .unwrap_err();

    resource.assert_async().await;
    token.assert_async().await;
    assert!(matches!(err, ClientError::Server { status: 403, .. }));
}

// ==================================================================================================
// Logout
// ==================================================================================================

#[tokio::test]
async fn test_logout_when_revoked_sends_nothing() {
    let mut server = Server::new_async().await;
    let delete = server
        .mock("DELETE", Matcher::Any)
        .expect(0)
        .create_async()
        .await;

    let (_dir, store) = store_for(&server, REVOKED, REVOKED);
    let mut session = Session::open(
        store.clone(),
        &HttpSettings::default(),
        GrantCredentials::default_client(),
    )
    .unwrap();

    session.auth().logout().await;
    session.persist().await.unwrap();

    delete.assert_async().await;
    let target = store.load().unwrap();
    assert_eq!(target.access_token, REVOKED);
    assert_eq!(target.refresh_token, REVOKED);
}

// ==================================================================================================
// Pre-flight
// ==================================================================================================

#[tokio::test]
async fn test_no_target_sends_nothing() {
    let mut server = Server::new_async().await;
    let token = server
        .mock("POST", Matcher::Any)
        .expect(0)
        .create_async()
        .await;
    let resource = server
        .mock("GET", Matcher::Any)
        .expect(0)
        .create_async()
        .await;

    let dir = tempfile::tempdir().unwrap();
    let store = ConfigStore::new(dir.path());
    store
        .save(&ServerTarget {
            auth_url: server.url(),
            ..Default::default()
        })
        .unwrap();

    let session = Session::open(
        store,
        &HttpSettings::default(),
        GrantCredentials::user("u", "p"),
    )
    .unwrap();

    let err = session
        .dispatcher()
        .execute(ApiRequest::get("/api/v1/data"), "/a", &CredentialRepository)
        .await
        .unwrap_err();

    token.assert_async().await;
    resource.assert_async().await;
    assert!(matches!(err, ClientError::NoTargetConfigured));
}
