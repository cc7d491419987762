use serde::{Deserialize, Serialize};

/// Link state of a third-party account as reported by the platform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS))]
#[cfg_attr(feature = "ts", ts(export))]
#[serde(from = "String")]
pub enum AccountStatus {
    Connected,
    Disconnected,
    Pending,
}

impl AccountStatus {
    /// Map a server status string. Anything unrecognised is still in progress.
    pub fn from_api(status: &str) -> Self {
        match status.trim().to_ascii_lowercase().as_str() {
            "connected" => AccountStatus::Connected,
            "disconnected" | "notfound" | "not_found" | "deleted" | "unauthorized" => {
                AccountStatus::Disconnected
            }
            _ => AccountStatus::Pending,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            AccountStatus::Connected => "Connected",
            AccountStatus::Disconnected => "Disconnected",
            AccountStatus::Pending => "Pending",
        }
    }
}

impl From<String> for AccountStatus {
    fn from(value: String) -> Self {
        Self::from_api(&value)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS))]
#[cfg_attr(feature = "ts", ts(export))]
pub struct ExternalAccountLink {
    #[serde(default)]
    pub provider: String,
    pub status: AccountStatus,
}

impl ExternalAccountLink {
    pub fn new(provider: impl Into<String>, status: AccountStatus) -> Self {
        Self {
            provider: provider.into(),
            status,
        }
    }

    pub fn disconnected(provider: impl Into<String>) -> Self {
        Self::new(provider, AccountStatus::Disconnected)
    }

    pub fn is_connected(&self) -> bool {
        self.status == AccountStatus::Connected
    }
}

/// Reply from `/participants/me/externalaccounts/{provider}/authorize`.
#[derive(Debug, Clone, Deserialize)]
pub struct AuthorizeResponse {
    #[serde(alias = "authorizationUrl", alias = "authorizeUrl")]
    pub url: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_from_api() {
        assert_eq!(AccountStatus::from_api("Connected"), AccountStatus::Connected);
        assert_eq!(AccountStatus::from_api("connected"), AccountStatus::Connected);
        assert_eq!(AccountStatus::from_api("Disconnected"), AccountStatus::Disconnected);
        assert_eq!(AccountStatus::from_api("fetchingData"), AccountStatus::Pending);
        assert_eq!(AccountStatus::from_api(""), AccountStatus::Pending);
    }

    #[test]
    fn test_parse_account_list() {
        let json = r#"[{"provider":"Fitbit","status":"Connected"},{"provider":"Garmin","status":"Unauthorized"}]"#;
        let accounts: Vec<ExternalAccountLink> = serde_json::from_str(json).unwrap();
        assert_eq!(accounts.len(), 2);
        assert!(accounts[0].is_connected());
        assert_eq!(accounts[1].status, AccountStatus::Disconnected);
    }

    #[test]
    fn test_authorize_response_aliases() {
        let a: AuthorizeResponse =
            serde_json::from_str(r#"{"authorizationUrl":"https://fitbit.example/auth"}"#).unwrap();
        let b: AuthorizeResponse =
            serde_json::from_str(r#"{"url":"https://fitbit.example/auth"}"#).unwrap();
        assert_eq!(a.url, b.url);
    }
}
