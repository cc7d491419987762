//! HTTP client for the MyDataHelps endpoints.
//!
//! `ApiClient` carries the shared connection pool and the resource API base URL.
//! It knows nothing about tokens beyond attaching the one it is handed; refresh
//! and retry policy belong to `AuthSession`.

use std::time::Duration;

use reqwest::{header, Client, Method};
use serde::{de::DeserializeOwned, Serialize};
use serde_json::Value;
use tracing::debug;

use super::ApiError;

/// API client for MyDataHelps.
/// Clone is cheap - reqwest::Client uses Arc internally for connection pooling.
#[derive(Clone)]
pub struct ApiClient {
    client: Client,
    base_url: String,
}

impl ApiClient {
    /// Create a new API client rooted at `base_url`
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self, ApiError> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Resolve an endpoint against the base URL. Absolute URLs pass through.
    pub fn endpoint_url(&self, endpoint: &str) -> String {
        if endpoint.starts_with("http://") || endpoint.starts_with("https://") {
            endpoint.to_string()
        } else if endpoint.starts_with('/') {
            format!("{}{}", self.base_url, endpoint)
        } else {
            format!("{}/{}", self.base_url, endpoint)
        }
    }

    /// Issue a bearer-authenticated request against the resource API.
    ///
    /// For GET, `data` (a JSON object) becomes the query string; for every other
    /// method it is sent as the JSON body. An empty response body yields `Value::Null`.
    pub async fn request(
        &self,
        method: Method,
        endpoint: &str,
        token: &str,
        data: Option<&Value>,
    ) -> Result<Value, ApiError> {
        let url = self.endpoint_url(endpoint);
        debug!(method = %method, url = %url, "Sending API request");

        let mut builder = self
            .client
            .request(method.clone(), &url)
            .bearer_auth(token)
            .header(header::ACCEPT, "application/json");

        if let Some(data) = data {
            if method == Method::GET {
                builder = builder.query(&Self::query_pairs(data));
            } else {
                builder = builder.json(data);
            }
        }

        let response = builder.send().await?;
        let response = Self::check_response(response).await?;
        Self::read_json(response).await
    }

    /// POST a JSON body without authentication and decode the JSON reply.
    /// Used for the token endpoint and the participant provisioning function.
    pub async fn post_json<T: DeserializeOwned, B: Serialize + ?Sized>(
        &self,
        url: &str,
        body: &B,
    ) -> Result<T, ApiError> {
        debug!(url = %url, "Sending unauthenticated POST");

        let response = self
            .client
            .post(url)
            .header(header::ACCEPT, "application/json")
            .json(body)
            .send()
            .await?;

        let response = Self::check_response(response).await?;
        let text = response.text().await?;
        serde_json::from_str(&text)
            .map_err(|e| ApiError::InvalidResponse(format!("{} from {}", e, url)))
    }

    /// Check if response is successful, returning an error with body if not.
    async fn check_response(response: reqwest::Response) -> Result<reqwest::Response, ApiError> {
        if response.status().is_success() {
            Ok(response)
        } else {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            Err(ApiError::from_status(status, &body))
        }
    }

    async fn read_json(response: reqwest::Response) -> Result<Value, ApiError> {
        let text = response.text().await?;
        if text.trim().is_empty() {
            return Ok(Value::Null);
        }
        serde_json::from_str(&text).map_err(|e| ApiError::InvalidResponse(e.to_string()))
    }

    fn query_pairs(data: &Value) -> Vec<(String, String)> {
        match data {
            Value::Object(map) => map
                .iter()
                .filter(|(_, v)| !v.is_null())
                .map(|(k, v)| {
                    let value = match v {
                        Value::String(s) => s.clone(),
                        other => other.to_string(),
                    };
                    (k.clone(), value)
                })
                .collect(),
            _ => Vec::new(),
        }
    }
}
