// Shared fixtures for session integration tests

#![allow(dead_code)]

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use healthmon_core::auth::{keys, AuthBrowser, AuthSession, BrowserOutcome, MemoryStore};
use healthmon_core::Config;
use url::Url;
use wiremock::MockServer;

pub const CALLBACK: &str = "healthmonitor://oauth/callback";

/// How the scripted browser answers an authorization session.
#[derive(Clone)]
pub enum BrowserScript {
    /// Redirect with `code` and the state found in the authorization URL.
    EchoState { code: Option<String> },
    /// Redirect with a fixed (forged) state.
    ForgedState { code: String, state: String },
    /// Redirect without any state parameter.
    NoState { code: String },
    /// Redirect carrying an OAuth error.
    Denied,
    Dismiss,
    Fail(String),
}

pub struct ScriptedBrowser {
    script: BrowserScript,
    delay: Option<Duration>,
    opened: Mutex<Vec<Url>>,
}

impl ScriptedBrowser {
    pub fn new(script: BrowserScript) -> Arc<Self> {
        Arc::new(Self {
            script,
            delay: None,
            opened: Mutex::new(Vec::new()),
        })
    }

    /// Like `echo`, but the user takes `delay` to finish signing in.
    pub fn echo_after(code: &str, delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            script: BrowserScript::EchoState {
                code: Some(code.to_string()),
            },
            delay: Some(delay),
            opened: Mutex::new(Vec::new()),
        })
    }

    pub fn echo(code: &str) -> Arc<Self> {
        Self::new(BrowserScript::EchoState {
            code: Some(code.to_string()),
        })
    }

    pub fn opened(&self) -> Vec<Url> {
        self.opened.lock().unwrap().clone()
    }
}

#[async_trait]
impl AuthBrowser for ScriptedBrowser {
    async fn open_auth_session(&self, url: &Url, callback_uri: &str) -> BrowserOutcome {
        self.opened.lock().unwrap().push(url.clone());
        assert_eq!(callback_uri, CALLBACK);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        let mut params: Vec<(String, String)> = Vec::new();
        match &self.script {
            BrowserScript::EchoState { code } => {
                if let Some(code) = code {
                    params.push(("code".into(), code.clone()));
                }
                if let Some((_, state)) = url.query_pairs().find(|(k, _)| k == "state") {
                    params.push(("state".into(), state.into_owned()));
                }
            }
            BrowserScript::ForgedState { code, state } => {
                params.push(("code".into(), code.clone()));
                params.push(("state".into(), state.clone()));
            }
            BrowserScript::NoState { code } => params.push(("code".into(), code.clone())),
            BrowserScript::Denied => {
                if let Some((_, state)) = url.query_pairs().find(|(k, _)| k == "state") {
                    params.push(("state".into(), state.into_owned()));
                }
                params.push(("error".into(), "access_denied".into()));
                params.push(("error_description".into(), "User declined".into()));
            }
            BrowserScript::Dismiss => return BrowserOutcome::Dismissed,
            BrowserScript::Fail(message) => return BrowserOutcome::Error(message.clone()),
        }

        BrowserOutcome::Success(Url::parse_with_params(CALLBACK, &params).unwrap())
    }
}

pub fn config_for(server: &MockServer) -> Config {
    Config {
        auth_url: Some(format!("{}/oauth2/authorize", server.uri())),
        token_url: Some(format!("{}/oauth2/token", server.uri())),
        api_base_url: Some(format!("{}/v1", server.uri())),
        connect_settle_secs: 0,
        ..Config::default()
    }
}

pub fn session(
    config: Config,
    store: Arc<MemoryStore>,
    browser: Arc<ScriptedBrowser>,
) -> Arc<AuthSession> {
    Arc::new(AuthSession::new(config, store, browser).expect("session should build"))
}

/// A store holding a signed-in session with tokens AT1/RT1 for participant P1.
pub fn signed_in_store() -> Arc<MemoryStore> {
    Arc::new(MemoryStore::with_entries([
        (keys::AUTH_TOKEN, "AT1"),
        (keys::REFRESH_TOKEN, "RT1"),
        (keys::PARTICIPANT_ID, "P1"),
    ]))
}

/// Session restored from `signed_in_store`.
pub async fn signed_in_session(server: &MockServer) -> (Arc<AuthSession>, Arc<MemoryStore>) {
    let store = signed_in_store();
    let session = session(
        config_for(server),
        Arc::clone(&store),
        ScriptedBrowser::new(BrowserScript::Dismiss),
    );
    session.initialize().await;
    (session, store)
}
