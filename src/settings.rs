//! On-disk configuration for the cloudup CLI.

use std::path::{Path, PathBuf};

use color_eyre::eyre::{Context, Result, bail};
use serde::{Deserialize, Serialize};

use cloudup_api::ClientConfig;
use cloudup_core::UploadConfig;

/// Contents of `config.toml`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub client: ClientConfig,
    pub upload: UploadConfig,
}

impl Settings {
    /// Get the default config file path.
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|d| d.join("cloudup").join("config.toml"))
    }

    /// Load settings from `path`, or from the default location.
    ///
    /// An explicit path must exist. A missing default file yields defaults.
    pub fn load(path: Option<&Path>) -> Result<(Self, Option<PathBuf>)> {
        let (path, required) = match path {
            Some(path) => (Some(path.to_path_buf()), true),
            None => (Self::default_path(), false),
        };

        let Some(path) = path else {
            return Ok((Self::default(), None));
        };
        if !required && !path.exists() {
            return Ok((Self::default(), Some(path)));
        }

        let content = std::fs::read_to_string(&path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        let settings = Self::parse(&content)
            .with_context(|| format!("Invalid configuration in {}", path.display()))?;
        Ok((settings, Some(path)))
    }

    /// Parse and validate TOML settings.
    pub fn parse(content: &str) -> Result<Self> {
        let settings: Self = toml::from_str(content)?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn validate(&self) -> Result<()> {
        if self.upload.concurrency == 0 {
            bail!("upload.concurrency must be at least 1");
        }
        if self.upload.read_page_size == 0 {
            bail!("upload.read_page_size must be at least 1");
        }
        if self.client.server_url.trim().is_empty() {
            bail!("client.server_url is empty");
        }
        Ok(())
    }

    /// Apply command-line overrides on top of the file settings.
    pub fn with_overrides(mut self, server: Option<String>, token: Option<String>) -> Self {
        if let Some(server) = server {
            self.client.server_url = server;
        }
        if let Some(token) = token {
            self.client = self.client.with_token(token);
        }
        self
    }

    /// Render as TOML with the token masked.
    pub fn to_display_toml(&self) -> Result<String> {
        let mut shown = self.clone();
        if shown.client.auth_token.is_some() {
            shown.client.auth_token = Some("********".to_string());
        }
        Ok(toml::to_string_pretty(&shown)?)
    }
}
