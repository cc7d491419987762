//! Authentication module for MyDataHelps participant sessions.
//!
//! This module provides:
//! - `AuthSession`: the session manager (authorization-code flow, token
//!   persistence, single-flight refresh, authenticated resource calls)
//! - `CredentialStore`: secure key-value persistence, backed by the OS keychain
//!   (`KeyringStore`), an encrypted file (`EncryptedFileStore`) or memory
//! - `AuthBrowser`: the system-browser collaborator, with `LinkBrowser` built on
//!   the deep-link `RedirectHub`

pub mod browser;
pub mod credentials;
pub mod encrypted;
pub mod error;
pub mod manager;
pub mod oauth;
pub mod provision;
pub mod redirect;
pub mod session;

pub use browser::{AuthBrowser, BrowserOutcome, LinkBrowser, UrlLauncher};
pub use credentials::{keys, CredentialStore, KeyringStore, MemoryStore};
pub use encrypted::EncryptedFileStore;
pub use error::{AuthError, StoreError};
pub use manager::{AuthSession, DEFAULT_FITBIT_DAYS};
pub use redirect::{RedirectEvent, RedirectHub, RedirectListener};
pub use session::{Credential, ParticipantIdentity, PendingAuthorization, SessionStatus};
