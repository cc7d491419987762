//! REST client module for the MyDataHelps API.
//!
//! This module provides the `ApiClient` used by the session manager to reach
//! the token endpoint, the participant provisioning function and the
//! bearer-authenticated resource API.
//!
//! Non-success statuses are mapped to `ApiError` so that callers can react to
//! 401 (refresh) and 404 (missing account link) specifically.

pub mod client;
pub mod error;

pub use client::ApiClient;
pub use reqwest::Method;
pub use error::ApiError;
