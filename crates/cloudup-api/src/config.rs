//! HTTP client configuration.

use serde::{Deserialize, Serialize};

/// User agent sent when none is configured.
pub const DEFAULT_USER_AGENT: &str = concat!("cloudup/", env!("CARGO_PKG_VERSION"));

/// Connection settings for the storage server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Base URL of the storage API, without a trailing slash.
    pub server_url: String,

    /// Bearer token for the `Authorization` header.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub auth_token: Option<String>,

    /// Overrides [`DEFAULT_USER_AGENT`].
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_agent: Option<String>,
}

impl ClientConfig {
    pub fn new(server_url: impl Into<String>) -> Self {
        Self {
            server_url: server_url.into(),
            ..Self::default()
        }
    }

    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.auth_token = Some(token.into());
        self
    }

    /// The configured user agent, or the default.
    pub fn user_agent(&self) -> &str {
        self.user_agent.as_deref().unwrap_or(DEFAULT_USER_AGENT)
    }
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            server_url: "http://localhost:3000/api".to_string(),
            auth_token: None,
            user_agent: None,
        }
    }
}
