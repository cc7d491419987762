use chrono::{DateTime, Duration, Utc};
use rand::distributions::Alphanumeric;
use rand::Rng;
use serde::{Deserialize, Serialize};

/// Buffer time before expiry to trigger refresh (5 minutes)
const TOKEN_REFRESH_BUFFER_MINUTES: i64 = 5;

/// How long an authorization round trip may take before its state is rejected.
const PENDING_AUTHORIZATION_TTL_MINUTES: i64 = 10;

/// Length of the CSRF state nonce. 43 alphanumeric chars is ~256 bits.
const STATE_NONCE_LENGTH: usize = 43;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credential {
    pub access_token: String,
    pub refresh_token: Option<String>,
    pub expires_at: Option<DateTime<Utc>>,
}

impl Credential {
    pub fn new(access_token: impl Into<String>, refresh_token: Option<String>) -> Self {
        Self {
            access_token: access_token.into(),
            refresh_token,
            expires_at: None,
        }
    }

    /// Set expiry from an `expires_in` seconds value as returned by token endpoints.
    pub fn with_expires_in(mut self, expires_in: Option<i64>) -> Self {
        self.expires_at = expires_in.map(|secs| Utc::now() + Duration::seconds(secs));
        self
    }

    pub fn is_expired(&self) -> bool {
        self.expires_at.map(|at| Utc::now() > at).unwrap_or(false)
    }

    /// Check if the token will expire soon and should be refreshed
    pub fn needs_refresh(&self) -> bool {
        self.expires_at
            .map(|at| Utc::now() > at - Duration::minutes(TOKEN_REFRESH_BUFFER_MINUTES))
            .unwrap_or(false)
    }

    /// Get minutes remaining until expiry (for display)
    pub fn minutes_until_expiry(&self) -> Option<i64> {
        self.expires_at
            .map(|at| (at - Utc::now()).num_minutes().max(0))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS))]
#[cfg_attr(feature = "ts", ts(export))]
pub struct ParticipantIdentity {
    #[serde(rename = "participantID")]
    pub participant_id: String,
}

impl ParticipantIdentity {
    pub fn new(participant_id: impl Into<String>) -> Self {
        Self {
            participant_id: participant_id.into(),
        }
    }
}

/// CSRF nonce for one authorize-and-redirect round trip.
#[derive(Debug, Clone)]
pub struct PendingAuthorization {
    pub state: String,
    pub created_at: DateTime<Utc>,
}

impl PendingAuthorization {
    pub fn generate() -> Self {
        Self {
            state: generate_state_nonce(),
            created_at: Utc::now(),
        }
    }

    pub fn is_expired(&self) -> bool {
        Utc::now() > self.created_at + Duration::minutes(PENDING_AUTHORIZATION_TTL_MINUTES)
    }

    /// Compare a returned state against this nonce in constant time.
    pub fn matches(&self, returned: &str) -> bool {
        !self.is_expired() && constant_time_eq(self.state.as_bytes(), returned.as_bytes())
    }
}

/// Coarse session state for display.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS))]
#[cfg_attr(feature = "ts", ts(export))]
pub enum SessionStatus {
    SignedOut,
    Authorizing,
    Authenticated,
    Refreshing,
}

/// In-memory session fields owned by `AuthSession`.
#[derive(Debug, Clone, Default)]
pub(crate) struct SessionData {
    pub credential: Option<Credential>,
    pub participant: Option<ParticipantIdentity>,
}

impl SessionData {
    /// Identity is only valid alongside an access token.
    pub fn session(&self) -> Option<ParticipantIdentity> {
        match (&self.credential, &self.participant) {
            (Some(cred), Some(participant)) if !cred.access_token.is_empty() => {
                Some(participant.clone())
            }
            _ => None,
        }
    }

    pub fn access_token(&self) -> Option<&str> {
        self.credential
            .as_ref()
            .map(|c| c.access_token.as_str())
            .filter(|t| !t.is_empty())
    }
}

pub fn generate_state_nonce() -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(STATE_NONCE_LENGTH)
        .map(char::from)
        .collect()
}

fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}
