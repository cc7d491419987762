//! Local caching module for offline data access.
//!
//! This module provides the `CacheManager` for keeping the last Fitbit pull on
//! disk so the dashboard has something to show before the network answers.
//! Snapshots are JSON files considered stale after 60 minutes.
//!
//! Credentials and account-link status are never cached here.

pub mod manager;

pub use manager::{CacheManager, CachedData};
