//! Agent configuration parsing, environment overrides, and validation.
//!
//! Sources, highest precedence first:
//!
//! 1. environment: `SRC_ACCESS_TOKEN`, `SRC_ENDPOINT`, `CODY_AGENT_REQUEST_TIMEOUT`
//! 2. an optional TOML file (`--config`)
//! 3. built-in defaults

use std::collections::HashMap;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use reqwest::Url;
use serde::Deserialize;
use tracing::debug;

use crate::protocol::StaticEditor;
use crate::{AppError, Result};

/// Environment variable holding the Sourcegraph access token.
pub const ENV_ACCESS_TOKEN: &str = "SRC_ACCESS_TOKEN";
/// Environment variable holding the Sourcegraph endpoint.
pub const ENV_ENDPOINT: &str = "SRC_ENDPOINT";
/// Environment variable holding the outbound request timeout in seconds.
pub const ENV_REQUEST_TIMEOUT: &str = "CODY_AGENT_REQUEST_TIMEOUT";

/// Endpoint used when neither the file nor the environment names one.
pub const DEFAULT_SERVER_ENDPOINT: &str = "https://sourcegraph.sourcegraph.com";

/// Server identity returned from `initialize` by default.
pub const DEFAULT_SERVER_NAME: &str = "cody-agent";

/// Configuration for one agent process.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(default, rename_all = "snake_case")]
pub struct AgentConfig {
    /// Sourcegraph access token; required.
    pub access_token: String,
    /// Sourcegraph instance URL.
    pub server_endpoint: String,
    /// Workspace root reported by the editor proxy without a round trip.
    pub workspace_root: Option<PathBuf>,
    /// Extra headers sent with every completions request.
    pub custom_headers: HashMap<String, String>,
    /// Outbound request timeout; 0 waits until the response or disconnect.
    pub request_timeout_seconds: u64,
    /// Name returned from `initialize`.
    pub server_name: String,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            access_token: String::new(),
            server_endpoint: DEFAULT_SERVER_ENDPOINT.to_owned(),
            workspace_root: None,
            custom_headers: HashMap::new(),
            request_timeout_seconds: 0,
            server_name: DEFAULT_SERVER_NAME.to_owned(),
        }
    }
}

impl AgentConfig {
    /// Build the effective configuration: file (if any), then environment,
    /// then validation.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if the file cannot be read or parsed, an
    /// environment value is malformed, or validation fails.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(path) => Self::load_from_path(path)?,
            None => Self::default(),
        };
        config.apply_env()?;
        config.validate()?;
        Ok(config)
    }

    /// Parse a TOML file without applying the environment or validating.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if the file cannot be read or contains
    /// invalid TOML.
    pub fn load_from_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = fs::read_to_string(path).map_err(|err| {
            AppError::Config(format!("failed to read config {}: {err}", path.display()))
        })?;
        Self::from_toml_str(&raw)
    }

    /// Parse configuration from a TOML string.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` on invalid TOML.
    pub fn from_toml_str(raw: &str) -> Result<Self> {
        Ok(toml::from_str(raw)?)
    }

    /// Overlay values present in the process environment.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if `CODY_AGENT_REQUEST_TIMEOUT` is not a
    /// whole number of seconds.
    pub fn apply_env(&mut self) -> Result<()> {
        if let Ok(token) = env::var(ENV_ACCESS_TOKEN) {
            debug!("config: access token taken from environment");
            self.access_token = token;
        }
        if let Ok(endpoint) = env::var(ENV_ENDPOINT) {
            debug!(endpoint, "config: endpoint taken from environment");
            self.server_endpoint = endpoint;
        }
        if let Ok(raw) = env::var(ENV_REQUEST_TIMEOUT) {
            self.request_timeout_seconds = raw.trim().parse().map_err(|err| {
                AppError::Config(format!("{ENV_REQUEST_TIMEOUT} must be seconds: {err}"))
            })?;
        }
        Ok(())
    }

    /// Check required values and normalise paths.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if the access token is missing, the
    /// endpoint is not an http(s) URL, or the workspace root does not exist.
    pub fn validate(&mut self) -> Result<()> {
        if self.access_token.trim().is_empty() {
            return Err(AppError::Config(format!(
                "access token is required (set {ENV_ACCESS_TOKEN})"
            )));
        }

        self.endpoint_url()?;

        if self.server_name.trim().is_empty() {
            return Err(AppError::Config("server_name must not be empty".into()));
        }

        if let Some(root) = &self.workspace_root {
            let canonical = root
                .canonicalize()
                .map_err(|err| AppError::Config(format!("workspace_root invalid: {err}")))?;
            self.workspace_root = Some(canonical);
        }

        Ok(())
    }

    /// Parsed server endpoint.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if the endpoint is not an http(s) URL.
    pub fn endpoint_url(&self) -> Result<Url> {
        let url = Url::parse(&self.server_endpoint).map_err(|err| {
            AppError::Config(format!(
                "server_endpoint `{}` is not a valid URL: {err}",
                self.server_endpoint
            ))
        })?;
        match url.scheme() {
            "http" | "https" => Ok(url),
            other => Err(AppError::Config(format!(
                "server_endpoint must use http or https, not `{other}`"
            ))),
        }
    }

    /// Outbound request timeout, `None` when disabled.
    #[must_use]
    pub fn request_timeout(&self) -> Option<Duration> {
        (self.request_timeout_seconds > 0).then(|| Duration::from_secs(self.request_timeout_seconds))
    }

    /// Static editor facts served without a round trip.
    #[must_use]
    pub fn static_editor(&self) -> StaticEditor {
        StaticEditor {
            workspace_root: self
                .workspace_root
                .as_ref()
                .map(|root| root.to_string_lossy().into_owned()),
        }
    }
}
