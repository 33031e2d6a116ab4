//! Progress aggregation for an upload run.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use cloudup_core::FileId;

/// Bytes sent so far for one file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProgressUpdate {
    pub file: FileId,
    pub bytes_sent: u64,
}

/// Per-file byte counts folded into one percentage.
///
/// Owned by the scheduler for a single run and only mutated from its loop.
#[derive(Debug, Clone, Default)]
pub struct UploadProgressState {
    per_file: HashMap<FileId, u64>,
    total_bytes: u64,
    sent_bytes: u64,
    percent: u8,
}

impl UploadProgressState {
    /// Start tracking a run of `total_bytes`.
    pub fn new(total_bytes: u64) -> Self {
        Self {
            total_bytes,
            ..Default::default()
        }
    }

    /// Apply an update. Returns the new percentage when it changed.
    ///
    /// A file's count never goes backwards, so the percentage is
    /// non-decreasing for the life of the run.
    pub fn apply(&mut self, update: ProgressUpdate) -> Option<u8> {
        let current = self.per_file.entry(update.file).or_insert(0);
        if update.bytes_sent <= *current {
            return None;
        }
        self.sent_bytes += update.bytes_sent - *current;
        *current = update.bytes_sent;

        let percent = self.compute_percent();
        if percent == self.percent {
            return None;
        }
        self.percent = percent;
        Some(percent)
    }

    fn compute_percent(&self) -> u8 {
        if self.total_bytes == 0 {
            return 0;
        }
        let ratio = self.sent_bytes as f64 / self.total_bytes as f64;
        (ratio * 100.0).round().clamp(0.0, 100.0) as u8
    }

    /// Current percentage, 0 to 100.
    pub fn percent(&self) -> u8 {
        self.percent
    }

    /// Sum of bytes sent across all files.
    pub fn sent_bytes(&self) -> u64 {
        self.sent_bytes
    }

    pub fn total_bytes(&self) -> u64 {
        self.total_bytes
    }

    /// Bytes sent for one file.
    pub fn file_bytes(&self, file: FileId) -> u64 {
        self.per_file.get(&file).copied().unwrap_or(0)
    }
}

/// Result of a run that settled without failure or cancellation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunSummary {
    /// Number of files transferred.
    pub files: usize,
    /// Total bytes transferred.
    pub bytes: u64,
    /// Number of batches executed.
    pub batches: usize,
    /// Remote base path.
    pub destination: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl RunSummary {
    /// Wall-clock duration of the run.
    pub fn elapsed(&self) -> std::time::Duration {
        (self.finished_at - self.started_at)
            .to_std()
            .unwrap_or_default()
    }

    /// Human-readable one-line summary.
    pub fn summary(&self) -> String {
        let noun = if self.files == 1 { "file" } else { "files" };
        format!("Uploaded {} {} to {}", self.files, noun, self.destination)
    }
}
