//! OAuth2 authorization-code and refresh-token grants.

use serde::{Deserialize, Serialize};
use tracing::debug;
use url::Url;

use crate::api::{ApiClient, ApiError};
use crate::utils::redact_token;

use super::error::AuthError;
use super::session::Credential;

#[derive(Debug, Clone, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default)]
    pub expires_in: Option<i64>,
    #[serde(default)]
    pub token_type: Option<String>,
}

impl TokenResponse {
    /// Build the credential to store. A refresh response that omits
    /// `refresh_token` keeps the previous one.
    pub fn into_credential(self, previous_refresh: Option<String>) -> Credential {
        Credential::new(self.access_token, self.refresh_token.or(previous_refresh))
            .with_expires_in(self.expires_in)
    }
}

#[derive(Debug, Serialize)]
#[serde(tag = "grant_type", rename_all = "snake_case")]
enum TokenRequest<'a> {
    AuthorizationCode {
        code: &'a str,
        client_id: &'a str,
        redirect_uri: &'a str,
    },
    RefreshToken {
        refresh_token: &'a str,
        client_id: &'a str,
    },
}

/// Query parameters carried by the authorization redirect.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct RedirectParams {
    pub code: Option<String>,
    pub state: Option<String>,
    pub error: Option<String>,
    pub error_description: Option<String>,
}

impl RedirectParams {
    pub fn parse(url: &Url) -> Self {
        let mut params = Self::default();
        for (key, value) in url.query_pairs() {
            let value = value.into_owned();
            match key.as_ref() {
                "code" if !value.is_empty() => params.code = Some(value),
                "state" if !value.is_empty() => params.state = Some(value),
                "error" => params.error = Some(value),
                "error_description" => params.error_description = Some(value),
                _ => {}
            }
        }
        params
    }
}

/// Build the browser URL for the authorization-code grant.
pub fn authorization_url(
    authorize_url: &str,
    client_id: &str,
    redirect_uri: &str,
    state: &str,
) -> Result<Url, AuthError> {
    let mut url = Url::parse(authorize_url)
        .map_err(|e| AuthError::Config(format!("Invalid authorization URL '{}': {}", authorize_url, e)))?;

    url.query_pairs_mut()
        .append_pair("client_id", client_id)
        .append_pair("redirect_uri", redirect_uri)
        .append_pair("response_type", "code")
        .append_pair("state", state);

    Ok(url)
}

/// Client for the project's token endpoint.
#[derive(Clone)]
pub struct TokenEndpoint {
    api: ApiClient,
    token_url: String,
    client_id: String,
    redirect_uri: String,
}

impl TokenEndpoint {
    pub fn new(
        api: ApiClient,
        token_url: impl Into<String>,
        client_id: impl Into<String>,
        redirect_uri: impl Into<String>,
    ) -> Self {
        Self {
            api,
            token_url: token_url.into(),
            client_id: client_id.into(),
            redirect_uri: redirect_uri.into(),
        }
    }

    pub async fn exchange_code(&self, code: &str) -> Result<TokenResponse, ApiError> {
        debug!("Exchanging authorization code for tokens");
        let request = TokenRequest::AuthorizationCode {
            code,
            client_id: &self.client_id,
            redirect_uri: &self.redirect_uri,
        };
        let tokens: TokenResponse = self.api.post_json(&self.token_url, &request).await?;
        debug!(access_token = %redact_token(&tokens.access_token), "Received tokens");
        Ok(tokens)
    }

    pub async fn refresh(&self, refresh_token: &str) -> Result<TokenResponse, ApiError> {
        debug!(refresh_token = %redact_token(refresh_token), "Refreshing access token");
        let request = TokenRequest::RefreshToken {
            refresh_token,
            client_id: &self.client_id,
        };
        self.api.post_json(&self.token_url, &request).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_authorization_url_carries_required_params() {
        let url = authorization_url(
            "https://mydatahelps.org/projects/A4117C8D/oauth2/authorize",
            "client-1",
            "healthmonitor://oauth/callback",
            "xyz",
        )
        .unwrap();

        let pairs: Vec<(String, String)> = url.query_pairs().into_owned().collect();
        assert!(pairs.contains(&("client_id".into(), "client-1".into())));
        assert!(pairs.contains(&("redirect_uri".into(), "healthmonitor://oauth/callback".into())));
        assert!(pairs.contains(&("response_type".into(), "code".into())));
        assert!(pairs.contains(&("state".into(), "xyz".into())));
    }

    #[test]
    fn test_authorization_url_rejects_garbage() {
        assert!(matches!(
            authorization_url("not a url", "c", "r", "s"),
            Err(AuthError::Config(_))
        ));
    }

    #[test]
    fn test_redirect_params_parse() {
        let url = Url::parse("healthmonitor://oauth/callback?code=abc123&state=xyz").unwrap();
        let params = RedirectParams::parse(&url);
        assert_eq!(params.code.as_deref(), Some("abc123"));
        assert_eq!(params.state.as_deref(), Some("xyz"));
        assert!(params.error.is_none());

        let empty = Url::parse("healthmonitor://oauth/callback?code=&state=").unwrap();
        assert_eq!(RedirectParams::parse(&empty), RedirectParams::default());

        let denied = Url::parse(
            "healthmonitor://oauth/callback?error=access_denied&error_description=User%20declined",
        )
        .unwrap();
        let params = RedirectParams::parse(&denied);
        assert_eq!(params.error.as_deref(), Some("access_denied"));
        assert_eq!(params.error_description.as_deref(), Some("User declined"));
    }

    #[test]
    fn test_token_request_wire_shape() {
        let body = serde_json::to_value(TokenRequest::AuthorizationCode {
            code: "abc123",
            client_id: "client-1",
            redirect_uri: "healthmonitor://oauth/callback",
        })
        .unwrap();
        assert_eq!(body["grant_type"], "authorization_code");
        assert_eq!(body["code"], "abc123");

        let body = serde_json::to_value(TokenRequest::RefreshToken {
            refresh_token: "RT1",
            client_id: "client-1",
        })
        .unwrap();
        assert_eq!(body["grant_type"], "refresh_token");
        assert_eq!(body["refresh_token"], "RT1");
        assert!(body.get("redirect_uri").is_none());
    }

    #[test]
    fn test_refresh_response_keeps_previous_refresh_token() {
        let response: TokenResponse = serde_json::from_str(r#"{"access_token":"AT2"}"#).unwrap();
        let cred = response.into_credential(Some("RT1".to_string()));
        assert_eq!(cred.access_token, "AT2");
        assert_eq!(cred.refresh_token.as_deref(), Some("RT1"));
        assert!(cred.expires_at.is_none());
    }
}
