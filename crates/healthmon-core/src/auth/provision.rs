//! Client side of the participant provisioning function.
//!
//! The function (deployed separately) signs a short-lived service JWT, finds or
//! creates the participant for `userIdentifier` and returns a participant access
//! token. This module only speaks its HTTP contract.

use rand::distributions::Alphanumeric;
use rand::Rng;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::api::ApiClient;

use super::error::AuthError;
use super::session::{Credential, ParticipantIdentity};

const USER_IDENTIFIER_PREFIX: &str = "user-";
const USER_IDENTIFIER_SUFFIX_LEN: usize = 8;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ProvisionRequest<'a> {
    user_identifier: &'a str,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ProvisionResponse {
    #[serde(default)]
    success: bool,
    #[serde(default)]
    participant_id: Option<String>,
    #[serde(default)]
    access_token: Option<String>,
    #[serde(default)]
    error: Option<String>,
}

pub fn generate_user_identifier() -> String {
    let suffix: String = rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(USER_IDENTIFIER_SUFFIX_LEN)
        .map(|b| char::from(b).to_ascii_lowercase())
        .collect();
    format!("{}{}", USER_IDENTIFIER_PREFIX, suffix)
}

pub struct ParticipantProvisioner {
    api: ApiClient,
    function_url: String,
}

impl ParticipantProvisioner {
    pub fn new(api: ApiClient, function_url: impl Into<String>) -> Self {
        Self {
            api,
            function_url: function_url.into(),
        }
    }

    /// Request a participant token for `user_identifier`.
    pub async fn provision(
        &self,
        user_identifier: &str,
    ) -> Result<(Credential, ParticipantIdentity), AuthError> {
        debug!(user = %user_identifier, "Requesting participant token");

        let response: ProvisionResponse = self
            .api
            .post_json(&self.function_url, &ProvisionRequest { user_identifier })
            .await?;

        if !response.success {
            return Err(AuthError::Provisioning(
                response
                    .error
                    .unwrap_or_else(|| "Provisioning function reported failure".to_string()),
            ));
        }

        match (response.access_token, response.participant_id) {
            (Some(token), Some(participant)) if !token.is_empty() && !participant.is_empty() => {
                Ok((
                    Credential::new(token, None),
                    ParticipantIdentity::new(participant),
                ))
            }
            _ => Err(AuthError::Provisioning(
                "Response missing accessToken or participantId".to_string(),
            )),
        }
    }
}
