use thiserror::Error;

use crate::api::ApiError;

/// Failures of the secure credential store.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Keychain error: {0}")]
    Keyring(#[from] keyring::Error),

    #[error("Vault I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Vault encryption error: {0}")]
    Crypto(String),

    #[error("Vault serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Everything `AuthSession` can report to the UI.
#[derive(Error, Debug)]
pub enum AuthError {
    #[error("Not authenticated")]
    NotAuthenticated,

    #[error("Authorization state did not match - possible forged redirect")]
    StateMismatch,

    #[error("Authorization redirect did not include a code")]
    MissingCode,

    #[error("Authorization was denied: {0}")]
    AuthorizationDenied(String),

    #[error("Authorization was dismissed")]
    Dismissed,

    #[error("Another sign-in is already in progress")]
    AlreadyAuthorizing,

    #[error("Browser session failed: {0}")]
    Browser(String),

    #[error("No refresh token available")]
    NoRefreshToken,

    #[error("Token refresh failed, please sign in again: {0}")]
    RefreshFailed(#[source] ApiError),

    #[error("Participant provisioning failed: {0}")]
    Provisioning(String),

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error(transparent)]
    Api(#[from] ApiError),

    #[error("Credential store error: {0}")]
    Store(#[from] StoreError),
}

impl AuthError {
    /// Whether the UI should drop the user back to the sign-in screen.
    pub fn requires_reauthentication(&self) -> bool {
        matches!(
            self,
            AuthError::NotAuthenticated
                | AuthError::NoRefreshToken
                | AuthError::RefreshFailed(_)
                | AuthError::Api(ApiError::Unauthorized)
        )
    }

    /// HTTP status behind this error, when there was one.
    pub fn status(&self) -> Option<u16> {
        match self {
            AuthError::Api(e) | AuthError::RefreshFailed(e) => e.status(),
            _ => None,
        }
    }
}
