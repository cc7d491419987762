//! The session manager shared by every screen.
//!
//! `AuthSession` owns the access/refresh tokens and the participant identity.
//! It runs the authorization-code flow, persists the result, refreshes on
//! expiry or 401 and issues authenticated resource calls.
//!
//! All writes to the credential go through `write_lock`. A caller that saw a
//! 401 with token T refreshes only if the current token is still T, so
//! concurrent 401s collapse into a single refresh and every caller retries with
//! the same new token.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use chrono::{DateTime, Utc};
use reqwest::Method;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::{debug, info, warn};
use url::Url;

use crate::api::{ApiClient, ApiError};
use crate::config::{AuthStrategy, Config};
use crate::models::{
    AuthorizeResponse, DateRange, ExternalAccountLink, FitbitData, ParticipantResponse,
    FITBIT_DAILY_RESOURCE, FITBIT_HEART_RATE_RESOURCE,
};
use crate::utils::redact_token;

use super::browser::{AuthBrowser, BrowserOutcome};
use super::credentials::{keys, CredentialStore};
use super::error::{AuthError, StoreError};
use super::oauth::{authorization_url, RedirectParams, TokenEndpoint};
use super::provision::{generate_user_identifier, ParticipantProvisioner};
use super::session::{
    Credential, ParticipantIdentity, PendingAuthorization, SessionData, SessionStatus,
};

const PARTICIPANT_ENDPOINT: &str = "/participants/me";
const EXTERNAL_ACCOUNTS_ENDPOINT: &str = "/participants/me/externalaccounts";
const RESOURCES_ENDPOINT: &str = "/participants/me/resources";

/// Default window for `fitbit_data` when the caller has no preference.
pub const DEFAULT_FITBIT_DAYS: u32 = 7;

pub struct AuthSession {
    config: Config,
    api: ApiClient,
    tokens: TokenEndpoint,
    provisioner: Option<ParticipantProvisioner>,
    store: Arc<dyn CredentialStore>,
    browser: Arc<dyn AuthBrowser>,
    data: RwLock<SessionData>,
    pending: Mutex<Option<PendingAuthorization>>,
    write_lock: tokio::sync::Mutex<()>,
    authorizing: AtomicBool,
    refreshing: AtomicBool,
}

impl AuthSession {
    pub fn new(
        config: Config,
        store: Arc<dyn CredentialStore>,
        browser: Arc<dyn AuthBrowser>,
    ) -> Result<Self, AuthError> {
        let api = ApiClient::new(config.api_base(), config.request_timeout())?;
        let tokens = TokenEndpoint::new(
            api.clone(),
            config.token_endpoint(),
            config.client_id.clone(),
            config.redirect_uri.clone(),
        );
        let provisioner = match &config.strategy {
            AuthStrategy::Oauth2 => None,
            AuthStrategy::ParticipantToken { function_url } => {
                Some(ParticipantProvisioner::new(api.clone(), function_url.clone()))
            }
        };

        Ok(Self {
            config,
            api,
            tokens,
            provisioner,
            store,
            browser,
            data: RwLock::new(SessionData::default()),
            pending: Mutex::new(None),
            write_lock: tokio::sync::Mutex::new(()),
            authorizing: AtomicBool::new(false),
            refreshing: AtomicBool::new(false),
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    // ===== Session state =====

    /// Load the persisted session into memory. Never touches the network.
    /// A store failure leaves the manager signed out.
    pub async fn initialize(&self) {
        match self.load_persisted().await {
            Ok(data) => {
                info!(
                    token = data.access_token().is_some(),
                    participant = ?data.participant.as_ref().map(|p| &p.participant_id),
                    "Loaded stored session"
                );
                *self.write_data() = data;
            }
            Err(e) => {
                warn!(error = %e, "Failed to load stored credentials");
                *self.write_data() = SessionData::default();
            }
        }
    }

    /// The signed-in participant, if both identity and access token are present.
    pub fn get_session(&self) -> Option<ParticipantIdentity> {
        self.read_data().session()
    }

    pub fn is_authenticated(&self) -> bool {
        self.get_session().is_some()
    }

    /// Snapshot of the current credential, e.g. to show time until expiry.
    pub fn credential(&self) -> Option<Credential> {
        self.read_data().credential.clone()
    }

    pub fn status(&self) -> SessionStatus {
        if self.authorizing.load(Ordering::SeqCst) {
            SessionStatus::Authorizing
        } else if self.refreshing.load(Ordering::SeqCst) {
            SessionStatus::Refreshing
        } else if self.is_authenticated() {
            SessionStatus::Authenticated
        } else {
            SessionStatus::SignedOut
        }
    }

    // ===== Authentication =====

    /// Sign in using the configured strategy. Every failure comes back as a value.
    ///
    /// Only one sign-in runs at a time; a second call while one is in flight
    /// fails with `AlreadyAuthorizing` and leaves the first untouched.
    pub async fn authenticate(&self) -> Result<ParticipantIdentity, AuthError> {
        let Some(_authorizing) = FlagGuard::try_raise(&self.authorizing) else {
            debug!("Sign-in already in progress");
            return Err(AuthError::AlreadyAuthorizing);
        };
        info!(strategy = ?self.config.strategy, "Starting authentication");

        let result = match self.config.strategy {
            AuthStrategy::Oauth2 => self.authenticate_oauth().await,
            AuthStrategy::ParticipantToken { .. } => self.authenticate_participant_token().await,
        };

        match &result {
            Ok(identity) => info!(participant = %identity.participant_id, "Authenticated"),
            Err(AuthError::Dismissed) => info!("Authentication dismissed by user"),
            Err(e) => warn!(error = %e, "Authentication failed"),
        }
        result
    }

    async fn authenticate_oauth(&self) -> Result<ParticipantIdentity, AuthError> {
        let pending = PendingAuthorization::generate();
        let state = pending.state.clone();
        *self.pending_lock() = Some(pending);

        let result = self.run_authorization(&state).await;

        // The nonce is single-use whatever happened
        self.pending_lock().take();
        if let Err(e) = self.store.delete(keys::OAUTH_STATE).await {
            warn!(error = %e, "Failed to clear stored authorization state");
        }
        result
    }

    async fn run_authorization(&self, state: &str) -> Result<ParticipantIdentity, AuthError> {
        self.store.set(keys::OAUTH_STATE, state).await?;

        let url = authorization_url(
            &self.config.authorize_url(),
            &self.config.client_id,
            &self.config.redirect_uri,
            state,
        )?;
        debug!(url = %url, "Opening authorization session");

        let redirect = match self
            .browser
            .open_auth_session(&url, &self.config.redirect_uri)
            .await
        {
            BrowserOutcome::Success(url) => url,
            BrowserOutcome::Dismissed => return Err(AuthError::Dismissed),
            BrowserOutcome::Error(e) => return Err(AuthError::Browser(e)),
        };

        let params = RedirectParams::parse(&redirect);
        self.verify_state(params.state.as_deref())?;

        if let Some(error) = params.error {
            return Err(AuthError::AuthorizationDenied(
                params.error_description.unwrap_or(error),
            ));
        }
        let code = params.code.ok_or(AuthError::MissingCode)?;

        let credential = self.tokens.exchange_code(&code).await?.into_credential(None);
        let participant = self.fetch_participant(&credential.access_token).await?;
        let identity = participant.identity();

        self.commit(credential, identity.clone()).await?;
        Ok(identity)
    }

    /// Match the returned state against the pending nonce and invalidate it.
    fn verify_state(&self, returned: Option<&str>) -> Result<(), AuthError> {
        let pending = self.pending_lock().take().ok_or(AuthError::StateMismatch)?;

        match returned {
            Some(state) if pending.matches(state) => Ok(()),
            Some(_) => Err(AuthError::StateMismatch),
            None if !self.config.require_state_echo => {
                debug!("Authorization server did not echo state; accepting");
                Ok(())
            }
            None => Err(AuthError::StateMismatch),
        }
    }

    async fn authenticate_participant_token(&self) -> Result<ParticipantIdentity, AuthError> {
        let provisioner = self.provisioner.as_ref().ok_or_else(|| {
            AuthError::Config("Participant token strategy has no provisioning URL".to_string())
        })?;

        let user_identifier = match self.store.get(keys::USER_IDENTIFIER).await? {
            Some(existing) => existing,
            None => {
                let created = generate_user_identifier();
                self.store.set(keys::USER_IDENTIFIER, &created).await?;
                created
            }
        };

        let (credential, identity) = provisioner.provision(&user_identifier).await?;
        debug!(access_token = %redact_token(&credential.access_token), "Received participant token");

        self.commit(credential, identity.clone()).await?;
        Ok(identity)
    }

    async fn fetch_participant(&self, token: &str) -> Result<ParticipantResponse, AuthError> {
        let value = self
            .api
            .request(Method::GET, PARTICIPANT_ENDPOINT, token, None)
            .await?;
        decode(value)
    }

    // ===== Token lifecycle =====

    /// Exchange the refresh token for a new access token.
    /// On failure the session is cleared and `RefreshFailed` returned.
    pub async fn refresh_auth_token(&self) -> Result<(), AuthError> {
        let _guard = self.write_lock.lock().await;
        self.refresh_locked().await.map(|_| ())
    }

    /// Clear memory and every persisted key. Safe to call when signed out.
    pub async fn sign_out(&self) -> Result<(), AuthError> {
        let _guard = self.write_lock.lock().await;
        self.clear_locked().await?;
        info!("Signed out");
        Ok(())
    }

    /// Refresh unless another caller already replaced `stale`.
    async fn refresh_if_current(&self, stale: &str) -> Result<String, AuthError> {
        let _guard = self.write_lock.lock().await;

        let current = self.read_data().access_token().map(str::to_string);
        match current {
            None => Err(AuthError::NotAuthenticated),
            Some(current) if current != stale => {
                debug!("Token already refreshed by a concurrent caller");
                Ok(current)
            }
            Some(_) => self.refresh_locked().await,
        }
    }

    /// Caller must hold `write_lock`.
    async fn refresh_locked(&self) -> Result<String, AuthError> {
        let (refresh_token, participant) = {
            let data = self.read_data();
            (
                data.credential.as_ref().and_then(|c| c.refresh_token.clone()),
                data.participant.clone(),
            )
        };
        let refresh_token = refresh_token.ok_or(AuthError::NoRefreshToken)?;
        let _refreshing = FlagGuard::raise(&self.refreshing);

        match self.tokens.refresh(&refresh_token).await {
            Ok(tokens) => {
                let credential = tokens.into_credential(Some(refresh_token));
                let access_token = credential.access_token.clone();
                let data = SessionData {
                    credential: Some(credential),
                    participant,
                };

                // Never publish tokens the store does not hold
                if let Err(e) = self.persist(&data).await {
                    warn!(error = %e, "Failed to store refreshed tokens; clearing session");
                    if let Err(clear_err) = self.clear_locked().await {
                        warn!(error = %clear_err, "Failed to clear credentials after store failure");
                    }
                    return Err(e.into());
                }
                *self.write_data() = data;
                info!(access_token = %redact_token(&access_token), "Access token refreshed");
                Ok(access_token)
            }
            Err(e) => {
                warn!(error = %e, "Token refresh failed; clearing session");
                if let Err(store_err) = self.clear_locked().await {
                    warn!(error = %store_err, "Failed to clear credentials after refresh failure");
                }
                Err(AuthError::RefreshFailed(e))
            }
        }
    }

    /// Persist a fresh session, then publish it in memory.
    async fn commit(
        &self,
        credential: Credential,
        participant: ParticipantIdentity,
    ) -> Result<(), AuthError> {
        let _guard = self.write_lock.lock().await;
        let data = SessionData {
            credential: Some(credential),
            participant: Some(participant),
        };

        if let Err(e) = self.persist(&data).await {
            // Never leave a half-written session behind
            self.erase_persisted().await;
            return Err(e.into());
        }
        *self.write_data() = data;
        Ok(())
    }

    async fn clear_locked(&self) -> Result<(), StoreError> {
        *self.write_data() = SessionData::default();
        self.pending_lock().take();

        let mut first_error = None;
        for key in keys::SESSION_KEYS {
            if let Err(e) = self.store.delete(key).await {
                warn!(key, error = %e, "Failed to delete stored credential");
                first_error.get_or_insert(e);
            }
        }
        first_error.map_or(Ok(()), Err)
    }

    async fn erase_persisted(&self) {
        for key in keys::SESSION_KEYS {
            if let Err(e) = self.store.delete(key).await {
                warn!(key, error = %e, "Failed to delete stored credential");
            }
        }
    }

    async fn persist(&self, data: &SessionData) -> Result<(), StoreError> {
        if let Some(ref credential) = data.credential {
            self.store
                .set(keys::AUTH_TOKEN, &credential.access_token)
                .await?;
            match credential.refresh_token {
                Some(ref refresh) => self.store.set(keys::REFRESH_TOKEN, refresh).await?,
                None => self.store.delete(keys::REFRESH_TOKEN).await?,
            }
            match credential.expires_at {
                Some(at) => {
                    self.store
                        .set(keys::TOKEN_EXPIRES_AT, &at.to_rfc3339())
                        .await?
                }
                None => self.store.delete(keys::TOKEN_EXPIRES_AT).await?,
            }
        }
        if let Some(ref participant) = data.participant {
            self.store
                .set(keys::PARTICIPANT_ID, &participant.participant_id)
                .await?;
        }
        Ok(())
    }

    async fn load_persisted(&self) -> Result<SessionData, StoreError> {
        let access_token = self.store.get(keys::AUTH_TOKEN).await?;
        let refresh_token = self.store.get(keys::REFRESH_TOKEN).await?;
        let participant_id = self.store.get(keys::PARTICIPANT_ID).await?;
        let expires_at = self
            .store
            .get(keys::TOKEN_EXPIRES_AT)
            .await?
            .and_then(|raw| DateTime::parse_from_rfc3339(&raw).ok())
            .map(|at| at.with_timezone(&Utc));

        Ok(SessionData {
            credential: access_token.map(|access_token| Credential {
                access_token,
                refresh_token,
                expires_at,
            }),
            participant: participant_id.map(ParticipantIdentity::new),
        })
    }

    // ===== Authenticated calls =====

    /// Issue a bearer-authenticated request against the resource API.
    ///
    /// A 401 triggers at most one refresh and one retry; a second 401 is returned.
    pub async fn call_api(
        &self,
        endpoint: &str,
        method: Method,
        data: Option<&Value>,
    ) -> Result<Value, AuthError> {
        let mut token = self
            .read_data()
            .access_token()
            .map(str::to_string)
            .ok_or(AuthError::NotAuthenticated)?;

        if self.should_refresh_proactively() {
            debug!("Access token near expiry; refreshing before request");
            token = self.refresh_if_current(&token).await?;
        }

        match self.api.request(method.clone(), endpoint, &token, data).await {
            Err(ApiError::Unauthorized) => {
                debug!(endpoint, "Received 401; refreshing and retrying once");
                let fresh = self.refresh_if_current(&token).await?;
                Ok(self.api.request(method, endpoint, &fresh, data).await?)
            }
            other => Ok(other?),
        }
    }

    fn should_refresh_proactively(&self) -> bool {
        self.read_data()
            .credential
            .as_ref()
            .map(|c| c.needs_refresh() && c.refresh_token.is_some())
            .unwrap_or(false)
    }

    pub async fn participant(&self) -> Result<ParticipantResponse, AuthError> {
        decode(self.call_api(PARTICIPANT_ENDPOINT, Method::GET, None).await?)
    }

    /// Link status for one provider. A 404 means the account was never linked.
    pub async fn external_account_status(
        &self,
        provider: &str,
    ) -> Result<ExternalAccountLink, AuthError> {
        self.require_session()?;
        let endpoint = format!("{}/{}", EXTERNAL_ACCOUNTS_ENDPOINT, path_segment(provider));

        match self.call_api(&endpoint, Method::GET, None).await {
            Ok(value) => {
                let mut link: ExternalAccountLink = decode(value)?;
                if link.provider.is_empty() {
                    link.provider = provider.to_string();
                }
                Ok(link)
            }
            Err(AuthError::Api(ApiError::NotFound(_))) => {
                debug!(provider, "No external account on record");
                Ok(ExternalAccountLink::disconnected(provider))
            }
            Err(e) => Err(e),
        }
    }

    pub async fn external_accounts(&self) -> Result<Vec<ExternalAccountLink>, AuthError> {
        self.require_session()?;
        match self
            .call_api(EXTERNAL_ACCOUNTS_ENDPOINT, Method::GET, None)
            .await?
        {
            Value::Null => Ok(Vec::new()),
            value => decode(value),
        }
    }

    /// Link a third-party account (e.g. Fitbit) through the provider's own
    /// authorization page, then re-query its status.
    ///
    /// The returned link reflects the server's view after the settle delay;
    /// callers check `is_connected()`.
    pub async fn connect_external_account(
        &self,
        provider: &str,
    ) -> Result<ExternalAccountLink, AuthError> {
        self.require_session()?;
        info!(provider, "Connecting external account");

        let endpoint = format!(
            "{}/{}/authorize",
            EXTERNAL_ACCOUNTS_ENDPOINT,
            path_segment(provider)
        );
        let authorize: AuthorizeResponse =
            decode(self.call_api(&endpoint, Method::GET, None).await?)?;
        let url = Url::parse(&authorize.url).map_err(|e| {
            ApiError::InvalidResponse(format!("Bad provider authorization URL: {}", e))
        })?;

        match self
            .browser
            .open_auth_session(&url, &self.config.redirect_uri)
            .await
        {
            BrowserOutcome::Success(_) => debug!(provider, "Provider redirect received"),
            BrowserOutcome::Dismissed => debug!(provider, "Provider session dismissed"),
            BrowserOutcome::Error(e) => return Err(AuthError::Browser(e)),
        }

        let settle = self.config.connect_settle_delay();
        if !settle.is_zero() {
            tokio::time::sleep(settle).await;
        }

        let link = self.external_account_status(provider).await?;
        if link.is_connected() {
            info!(provider, "External account connected");
        } else {
            warn!(provider, status = link.status.as_str(), "External account not connected");
        }
        Ok(link)
    }

    /// `GET /participants/me/resources/{name}?startDate&endDate`
    pub async fn query_resource<T: DeserializeOwned>(
        &self,
        resource_name: &str,
        range: DateRange,
    ) -> Result<T, AuthError> {
        self.require_session()?;
        let endpoint = format!("{}/{}", RESOURCES_ENDPOINT, path_segment(resource_name));
        let query = range.to_query();
        decode(self.call_api(&endpoint, Method::GET, Some(&query)).await?)
    }

    /// Daily activity and heart-rate series for the last `days` days.
    pub async fn fitbit_data(&self, days: u32) -> Result<FitbitData, AuthError> {
        let range = DateRange::last_days(days);
        debug!(start = %range.start, end = %range.end, "Fetching Fitbit data");

        let daily = self.query_resource(FITBIT_DAILY_RESOURCE, range).await?;
        let heart_rate = self.query_resource(FITBIT_HEART_RATE_RESOURCE, range).await?;
        let data = FitbitData { heart_rate, daily };

        info!(
            heart_rate = data.heart_rate.len(),
            daily = data.daily.len(),
            "Retrieved Fitbit data"
        );
        Ok(data)
    }

    fn require_session(&self) -> Result<ParticipantIdentity, AuthError> {
        self.get_session().ok_or(AuthError::NotAuthenticated)
    }

    // ===== Lock helpers =====

    fn read_data(&self) -> RwLockReadGuard<'_, SessionData> {
        self.data.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write_data(&self) -> RwLockWriteGuard<'_, SessionData> {
        self.data.write().unwrap_or_else(PoisonError::into_inner)
    }

    fn pending_lock(&self) -> MutexGuard<'_, Option<PendingAuthorization>> {
        self.pending.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Raises a status flag for the lifetime of the guard.
struct FlagGuard<'a>(&'a AtomicBool);

impl<'a> FlagGuard<'a> {
    fn raise(flag: &'a AtomicBool) -> Self {
        flag.store(true, Ordering::SeqCst);
        Self(flag)
    }

    /// Raise the flag only if nobody holds it.
    fn try_raise(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .ok()
            .map(|_| Self(flag))
    }
}

impl Drop for FlagGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

fn decode<T: DeserializeOwned>(value: Value) -> Result<T, AuthError> {
    serde_json::from_value(value)
        .map_err(|e| AuthError::Api(ApiError::InvalidResponse(e.to_string())))
}

fn path_segment(raw: &str) -> String {
    url::form_urlencoded::byte_serialize(raw.as_bytes()).collect()
}
