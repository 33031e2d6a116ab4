//! Upload configuration.

use std::time::Duration;

use derive_builder::Builder;
use serde::{Deserialize, Serialize};

/// Configuration for an upload session.
#[derive(Debug, Clone, PartialEq, Eq, Builder, Serialize, Deserialize)]
#[builder(setter(into), build_fn(validate = "Self::validate"))]
pub struct UploadConfig {
    /// Number of transfers per batch.
    #[builder(default = "3")]
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,

    /// How long the success phase is shown before reverting to idle.
    #[builder(default = "3000")]
    #[serde(default = "default_success_display_ms")]
    pub success_display_ms: u64,

    /// Maximum entries returned by one directory read during drop traversal.
    #[builder(default = "100")]
    #[serde(default = "default_read_page_size")]
    pub read_page_size: usize,

    /// File name patterns to skip during folder and drop traversal (glob syntax).
    #[builder(default)]
    #[serde(default)]
    pub ignore_patterns: Vec<String>,
}

fn default_concurrency() -> usize {
    3
}

fn default_success_display_ms() -> u64 {
    3000
}

fn default_read_page_size() -> usize {
    100
}

impl UploadConfigBuilder {
    fn validate(&self) -> Result<(), String> {
        if self.concurrency == Some(0) {
            return Err("Concurrency must be at least 1".to_string());
        }
        if self.read_page_size == Some(0) {
            return Err("Read page size must be at least 1".to_string());
        }
        Ok(())
    }
}

impl UploadConfig {
    /// Create a new config builder.
    pub fn builder() -> UploadConfigBuilder {
        UploadConfigBuilder::default()
    }

    /// Success display window as a duration.
    pub fn success_display(&self) -> Duration {
        Duration::from_millis(self.success_display_ms)
    }

    /// Batch width, never less than one.
    pub fn batch_width(&self) -> usize {
        self.concurrency.max(1)
    }
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            concurrency: default_concurrency(),
            success_display_ms: default_success_display_ms(),
            read_page_size: default_read_page_size(),
            ignore_patterns: Vec::new(),
        }
    }
}
