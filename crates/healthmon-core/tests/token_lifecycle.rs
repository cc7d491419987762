// Refresh, retry and sign-out behaviour of an authenticated session

use std::sync::Arc;

use async_trait::async_trait;
use futures::future::join_all;
use healthmon_core::api::{ApiError, Method};
use healthmon_core::auth::{keys, AuthError, CredentialStore, MemoryStore, StoreError};
use serde_json::json;
use wiremock::matchers::{body_partial_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

mod common;

use common::{config_for, session, signed_in_session, BrowserScript, ScriptedBrowser};

async fn mount_refresh(server: &MockServer, response: ResponseTemplate, expected_calls: u64) {
    Mock::given(method("POST"))
        .and(path("/oauth2/token"))
        .and(body_partial_json(json!({
            "grant_type": "refresh_token",
            "refresh_token": "RT1",
        })))
        .respond_with(response)
        .expect(expected_calls)
        .mount(server)
        .await;
}

async fn mount_participant_for(server: &MockServer, token: &str, status: u16) {
    Mock::given(method("GET"))
        .and(path("/v1/participants/me"))
        .and(header("Authorization", format!("Bearer {}", token).as_str()))
        .respond_with(ResponseTemplate::new(status).set_body_json(json!({ "id": "P1" })))
        .mount(server)
        .await;
}

#[tokio::test]
async fn unauthorized_call_refreshes_and_retries_once() {
    let server = MockServer::start().await;
    mount_participant_for(&server, "AT1", 401).await;
    mount_participant_for(&server, "AT2", 200).await;
    mount_refresh(
        &server,
        ResponseTemplate::new(200).set_body_json(json!({ "access_token": "AT2" })),
        1,
    )
    .await;

    let (session, store) = signed_in_session(&server).await;

    let value = session
        .call_api("/participants/me", Method::GET, None)
        .await
        .expect("retry should succeed");
    assert_eq!(value["id"], "P1");

    let credential = session.credential().unwrap();
    assert_eq!(credential.access_token, "AT2");
    assert_eq!(credential.refresh_token.as_deref(), Some("RT1"));

    let stored = store.snapshot();
    assert_eq!(stored.get(keys::AUTH_TOKEN).map(String::as_str), Some("AT2"));
    assert_eq!(stored.get(keys::REFRESH_TOKEN).map(String::as_str), Some("RT1"));
    assert_eq!(stored.get(keys::PARTICIPANT_ID).map(String::as_str), Some("P1"));
}

#[tokio::test]
async fn concurrent_unauthorized_calls_share_one_refresh() {
    let server = MockServer::start().await;
    mount_participant_for(&server, "AT1", 401).await;
    mount_participant_for(&server, "AT2", 200).await;
    mount_refresh(
        &server,
        ResponseTemplate::new(200).set_body_json(json!({
            "access_token": "AT2",
            "refresh_token": "RT2",
        })),
        1,
    )
    .await;

    let (session, store) = signed_in_session(&server).await;

    let calls = (0..5).map(|_| {
        let session = Arc::clone(&session);
        async move { session.call_api("/participants/me", Method::GET, None).await }
    });
    let results = join_all(calls).await;

    assert!(results.iter().all(|r| r.is_ok()), "results: {results:?}");
    assert_eq!(session.credential().unwrap().access_token, "AT2");
    assert_eq!(
        store.snapshot().get(keys::REFRESH_TOKEN).map(String::as_str),
        Some("RT2")
    );
}

#[tokio::test]
async fn second_unauthorized_is_returned_without_looping() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v1/participants/me"))
        .respond_with(ResponseTemplate::new(401))
        .expect(2)
        .mount(&server)
        .await;
    mount_refresh(
        &server,
        ResponseTemplate::new(200).set_body_json(json!({ "access_token": "AT2" })),
        1,
    )
    .await;

    let (session, _store) = signed_in_session(&server).await;

    let err = session
        .call_api("/participants/me", Method::GET, None)
        .await
        .unwrap_err();
    assert!(matches!(err, AuthError::Api(ApiError::Unauthorized)), "got {err:?}");
}

#[tokio::test]
async fn refresh_failure_clears_session() {
    let server = MockServer::start().await;
    mount_participant_for(&server, "AT1", 401).await;
    mount_refresh(
        &server,
        ResponseTemplate::new(400).set_body_json(json!({ "error": "invalid_grant" })),
        1,
    )
    .await;

    let (session, store) = signed_in_session(&server).await;

    let err = session
        .call_api("/participants/me", Method::GET, None)
        .await
        .unwrap_err();
    assert!(matches!(err, AuthError::RefreshFailed(_)), "got {err:?}");
    assert!(err.requires_reauthentication());
    assert!(session.get_session().is_none());
    assert!(store.snapshot().is_empty());
}

#[tokio::test]
async fn unauthorized_without_refresh_token_keeps_session() {
    let server = MockServer::start().await;
    mount_participant_for(&server, "AT1", 401).await;
    mount_refresh(&server, ResponseTemplate::new(200), 0).await;

    let store = Arc::new(MemoryStore::with_entries([
        (keys::AUTH_TOKEN, "AT1"),
        (keys::PARTICIPANT_ID, "P1"),
    ]));
    let session = session(
        config_for(&server),
        Arc::clone(&store),
        ScriptedBrowser::new(BrowserScript::Dismiss),
    );
    session.initialize().await;

    let err = session
        .call_api("/participants/me", Method::GET, None)
        .await
        .unwrap_err();
    assert!(matches!(err, AuthError::NoRefreshToken), "got {err:?}");
    assert!(session.is_authenticated());
    assert_eq!(store.snapshot().len(), 2);
}

#[tokio::test]
async fn expiring_token_is_refreshed_before_the_request() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v1/participants/me"))
        .and(header("Authorization", "Bearer AT1"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;
    mount_participant_for(&server, "AT2", 200).await;
    mount_refresh(
        &server,
        ResponseTemplate::new(200).set_body_json(json!({
            "access_token": "AT2",
            "expires_in": 3600,
        })),
        1,
    )
    .await;

    let store = Arc::new(MemoryStore::with_entries([
        (keys::AUTH_TOKEN, "AT1"),
        (keys::REFRESH_TOKEN, "RT1"),
        (keys::PARTICIPANT_ID, "P1"),
        (keys::TOKEN_EXPIRES_AT, "2020-01-01T00:00:00Z"),
    ]));
    let session = session(
        config_for(&server),
        Arc::clone(&store),
        ScriptedBrowser::new(BrowserScript::Dismiss),
    );
    session.initialize().await;

    let participant = session.participant().await.unwrap();
    assert_eq!(participant.identity().participant_id, "P1");

    let credential = session.credential().unwrap();
    assert!(!credential.needs_refresh());
    assert!(store.snapshot().contains_key(keys::TOKEN_EXPIRES_AT));
}

#[tokio::test]
async fn explicit_refresh_replaces_access_token() {
    let server = MockServer::start().await;
    mount_refresh(
        &server,
        ResponseTemplate::new(200).set_body_json(json!({ "access_token": "AT2" })),
        1,
    )
    .await;

    let (session, store) = signed_in_session(&server).await;
    session.refresh_auth_token().await.unwrap();

    assert_eq!(session.credential().unwrap().access_token, "AT2");
    assert_eq!(
        store.snapshot().get(keys::AUTH_TOKEN).map(String::as_str),
        Some("AT2")
    );
}

/// Store whose writes to one key fail, as a full disk or locked keychain would.
struct FailingWrites {
    inner: MemoryStore,
    failing_key: &'static str,
}

#[async_trait]
impl CredentialStore for FailingWrites {
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        self.inner.get(key).await
    }

    async fn set(&self, key: &str, value: &str) -> Result<(), StoreError> {
        if key == self.failing_key {
            return Err(StoreError::Io(std::io::Error::other("disk full")));
        }
        self.inner.set(key, value).await
    }

    async fn delete(&self, key: &str) -> Result<(), StoreError> {
        self.inner.delete(key).await
    }
}

#[tokio::test]
async fn refreshed_tokens_that_cannot_be_stored_end_the_session() {
    let server = MockServer::start().await;
    mount_refresh(
        &server,
        ResponseTemplate::new(200).set_body_json(json!({
            "access_token": "AT2",
            "refresh_token": "RT2",
        })),
        1,
    )
    .await;

    let store = Arc::new(FailingWrites {
        inner: MemoryStore::with_entries([
            (keys::AUTH_TOKEN, "AT1"),
            (keys::REFRESH_TOKEN, "RT1"),
            (keys::PARTICIPANT_ID, "P1"),
        ]),
        failing_key: keys::REFRESH_TOKEN,
    });
    let session = Arc::new(
        healthmon_core::AuthSession::new(
            config_for(&server),
            store.clone(),
            ScriptedBrowser::new(BrowserScript::Dismiss),
        )
        .unwrap(),
    );
    session.initialize().await;

    let err = session.refresh_auth_token().await.unwrap_err();
    assert!(matches!(err, AuthError::Store(_)), "got {err:?}");
    assert!(session.get_session().is_none());
    assert!(session.credential().is_none());

    // No new access token left beside the rotated-out refresh token
    let stored = store.inner.snapshot();
    assert!(!stored.contains_key(keys::AUTH_TOKEN));
    assert!(!stored.contains_key(keys::REFRESH_TOKEN));
}

#[tokio::test]
async fn sign_out_then_get_session_is_none() {
    let server = MockServer::start().await;
    let (session, store) = signed_in_session(&server).await;
    assert!(session.is_authenticated());

    session.sign_out().await.unwrap();
    assert!(session.get_session().is_none());
    assert!(store.snapshot().is_empty());

    let err = session
        .call_api("/participants/me", Method::GET, None)
        .await
        .unwrap_err();
    assert!(matches!(err, AuthError::NotAuthenticated));

    session.sign_out().await.unwrap();
}
