//! Data models for MyDataHelps entities.
//!
//! This module contains the data structures returned by the resource API:
//!
//! - `ParticipantResponse`: the signed-in participant (`/participants/me`)
//! - `ExternalAccountLink`, `AccountStatus`: provider link state (e.g. Fitbit)
//! - `FitbitDailyData`, `FitbitHeartRateData`, `FitbitData`: Fitbit resources
//! - `DateRange`: the `startDate`/`endDate` window for resource queries

pub mod account;
pub mod fitbit;
pub mod participant;
pub mod resource;

pub use account::{AccountStatus, AuthorizeResponse, ExternalAccountLink};
pub use fitbit::{FitbitDailyData, FitbitData, FitbitHeartRateData};
pub use participant::ParticipantResponse;
pub use resource::{DateRange, FITBIT_DAILY_RESOURCE, FITBIT_HEART_RATE_RESOURCE};
