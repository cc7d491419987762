//! Session and data-access core for the health monitor app.
//!
//! The crate owns everything the screens need to talk to MyDataHelps:
//!
//! - `auth`: the `AuthSession` manager (OAuth2 authorization-code flow, token
//!   persistence, single-flight refresh), credential stores and redirect plumbing
//! - `api`: HTTP request helpers and status-code error mapping
//! - `models`: participant, external account and Fitbit resource types
//! - `cache`: offline snapshot of the last Fitbit data pull
//! - `config`: project, environment and endpoint configuration
//!
//! The UI layer constructs one `AuthSession` at its composition root and shares
//! it by `Arc` with every call site.

pub mod api;
pub mod auth;
pub mod cache;
pub mod config;
pub mod models;
pub mod utils;

pub use auth::{AuthError, AuthSession};
pub use config::Config;
