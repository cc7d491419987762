//! Application configuration management.
//!
//! This module handles loading and saving the client configuration: the
//! MyDataHelps project, environment, OAuth client registration, endpoint
//! overrides and the authentication strategy.
//!
//! Configuration is stored at `~/.config/healthmon/config.json`. Any field may
//! be overridden from `HEALTHMON_*` environment variables.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

/// Application name used for config/cache directory paths
const APP_NAME: &str = "healthmon";

/// Config file name
const CONFIG_FILE: &str = "config.json";

const DEFAULT_PROJECT_ID: &str = "A4117C8D";
const DEFAULT_CLIENT_ID: &str = "MyDataHelps.A4117C8D.farmsafeapp";
const DEFAULT_REDIRECT_URI: &str = "healthmonitor://oauth/callback";

const PRODUCTION_API_BASE_URL: &str = "https://api.mydatahelps.org/v1";
const SANDBOX_API_BASE_URL: &str = "https://api-sandbox.mydatahelps.org/v1";
const AUTH_HOST: &str = "https://mydatahelps.org";

/// Delay between an external-account redirect and the status re-query.
/// The platform takes a moment to record a freshly linked account.
const DEFAULT_CONNECT_SETTLE_SECS: u64 = 2;

/// HTTP request timeout in seconds.
const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    #[default]
    Production,
    Sandbox,
}

impl Environment {
    pub fn api_base_url(&self) -> &'static str {
        match self {
            Environment::Production => PRODUCTION_API_BASE_URL,
            Environment::Sandbox => SANDBOX_API_BASE_URL,
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "production" | "prod" => Some(Environment::Production),
            "sandbox" => Some(Environment::Sandbox),
            _ => None,
        }
    }
}

/// How `AuthSession::authenticate` obtains tokens.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AuthStrategy {
    /// Browser-based authorization-code grant against the project's OAuth2 server.
    #[default]
    Oauth2,
    /// Participant access token issued by a provisioning function.
    ParticipantToken { function_url: String },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub project_id: String,
    pub environment: Environment,
    pub client_id: String,
    pub redirect_uri: String,
    pub auth_url: Option<String>,
    pub token_url: Option<String>,
    pub api_base_url: Option<String>,
    pub strategy: AuthStrategy,
    /// When false, a redirect that carries no `state` is accepted.
    pub require_state_echo: bool,
    pub connect_settle_secs: u64,
    pub request_timeout_secs: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            project_id: DEFAULT_PROJECT_ID.to_string(),
            environment: Environment::default(),
            client_id: DEFAULT_CLIENT_ID.to_string(),
            redirect_uri: DEFAULT_REDIRECT_URI.to_string(),
            auth_url: None,
            token_url: None,
            api_base_url: None,
            strategy: AuthStrategy::default(),
            require_state_echo: true,
            connect_settle_secs: DEFAULT_CONNECT_SETTLE_SECS,
            request_timeout_secs: DEFAULT_REQUEST_TIMEOUT_SECS,
        }
    }
}

impl Config {
    pub fn load() -> Result<Self> {
        let path = Self::config_path()?;
        if path.exists() {
            let contents = std::fs::read_to_string(&path)
                .with_context(|| format!("Failed to read config file {}", path.display()))?;
            serde_json::from_str(&contents).context("Failed to parse config file")
        } else {
            Ok(Self::default())
        }
    }

    pub fn save(&self) -> Result<()> {
        let path = Self::config_path()?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let contents = serde_json::to_string_pretty(self)?;
        std::fs::write(path, contents)?;
        Ok(())
    }

    /// Overlay `HEALTHMON_*` environment variables onto this config.
    pub fn apply_env(&mut self) -> Result<()> {
        self.apply_vars(|key| std::env::var(key).ok())
    }

    fn apply_vars(&mut self, var: impl Fn(&str) -> Option<String>) -> Result<()> {
        if let Some(v) = var("HEALTHMON_PROJECT_ID") {
            self.project_id = v;
        }
        if let Some(v) = var("HEALTHMON_ENVIRONMENT") {
            self.environment = Environment::parse(&v)
                .ok_or_else(|| anyhow::anyhow!("Unknown environment '{}'", v))?;
        }
        if let Some(v) = var("HEALTHMON_CLIENT_ID") {
            self.client_id = v;
        }
        if let Some(v) = var("HEALTHMON_REDIRECT_URI") {
            self.redirect_uri = v;
        }
        if let Some(v) = var("HEALTHMON_AUTH_URL") {
            self.auth_url = Some(v);
        }
        if let Some(v) = var("HEALTHMON_TOKEN_URL") {
            self.token_url = Some(v);
        }
        if let Some(v) = var("HEALTHMON_API_BASE_URL") {
            self.api_base_url = Some(v);
        }
        if let Some(v) = var("HEALTHMON_PROVISION_URL") {
            self.strategy = AuthStrategy::ParticipantToken { function_url: v };
        }
        if let Some(v) = var("HEALTHMON_REQUIRE_STATE_ECHO") {
            self.require_state_echo = v
                .parse()
                .with_context(|| format!("HEALTHMON_REQUIRE_STATE_ECHO must be true or false, got '{}'", v))?;
        }
        if let Some(v) = var("HEALTHMON_CONNECT_SETTLE_SECS") {
            self.connect_settle_secs = v
                .parse()
                .with_context(|| format!("HEALTHMON_CONNECT_SETTLE_SECS must be a number, got '{}'", v))?;
        }
        Ok(())
    }

    pub fn authorize_url(&self) -> String {
        self.auth_url.clone().unwrap_or_else(|| {
            format!("{}/projects/{}/oauth2/authorize", AUTH_HOST, self.project_id)
        })
    }

    pub fn token_endpoint(&self) -> String {
        self.token_url
            .clone()
            .unwrap_or_else(|| format!("{}/projects/{}/oauth2/token", AUTH_HOST, self.project_id))
    }

    pub fn api_base(&self) -> String {
        self.api_base_url
            .clone()
            .unwrap_or_else(|| self.environment.api_base_url().to_string())
            .trim_end_matches('/')
            .to_string()
    }

    pub fn connect_settle_delay(&self) -> Duration {
        Duration::from_secs(self.connect_settle_secs)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    fn config_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not find config directory"))?;
        Ok(config_dir.join(APP_NAME).join(CONFIG_FILE))
    }

    pub fn cache_dir(&self) -> Result<PathBuf> {
        let cache_dir = dirs::cache_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not find cache directory"))?;
        Ok(cache_dir.join(APP_NAME).join(&self.project_id))
    }
}
