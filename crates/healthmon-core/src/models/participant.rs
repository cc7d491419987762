use serde::{Deserialize, Serialize};

use crate::auth::ParticipantIdentity;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Demographics {
    pub first_name: Option<String>,
    pub last_name: Option<String>,
}

/// `GET /participants/me`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParticipantResponse {
    #[serde(alias = "participantID", alias = "participantId")]
    pub id: String,
    #[serde(default)]
    pub participant_identifier: Option<String>,
    #[serde(default)]
    pub demographics: Option<Demographics>,
}

impl ParticipantResponse {
    pub fn identity(&self) -> ParticipantIdentity {
        ParticipantIdentity::new(self.id.clone())
    }

    pub fn display_name(&self) -> Option<String> {
        let d = self.demographics.as_ref()?;
        match (&d.first_name, &d.last_name) {
            (Some(first), Some(last)) => Some(format!("{} {}", first, last)),
            (Some(first), None) => Some(first.clone()),
            (None, Some(last)) => Some(last.clone()),
            (None, None) => None,
        }
    }
}
