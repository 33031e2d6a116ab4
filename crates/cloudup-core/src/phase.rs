//! The upload state machine's phases.

use serde::{Deserialize, Serialize};

use crate::ConflictDecision;

/// Current state of an upload session.
///
/// ```text
/// Idle --submit--> Selecting --conflict--> ConflictPending --resolve--> Uploading
/// Idle --submit--> Selecting --no conflict--> Uploading
/// Uploading --settled--> Success --timer--> Idle
/// Uploading --cancel--> Idle
/// Uploading --failure--> Error --dismiss--> Idle
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "phase", rename_all = "snake_case")]
pub enum UploadPhase {
    #[default]
    Idle,
    /// A selection was made and is being checked for conflicts.
    Selecting,
    /// Waiting on the user to resolve a folder collision.
    ConflictPending(ConflictDecision),
    /// Transfers are running.
    Uploading { percent: u8 },
    /// Every batch settled without failure.
    Success,
    /// A transfer failed; dismiss to return to idle.
    Error { message: String },
}

impl UploadPhase {
    /// Short lowercase name, used in logs.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Selecting => "selecting",
            Self::ConflictPending(_) => "conflict_pending",
            Self::Uploading { .. } => "uploading",
            Self::Success => "success",
            Self::Error { .. } => "error",
        }
    }

    pub fn is_idle(&self) -> bool {
        matches!(self, Self::Idle)
    }

    /// Whether a selection or transfer is in progress.
    pub fn is_busy(&self) -> bool {
        matches!(self, Self::Selecting | Self::Uploading { .. })
    }

    /// The pending conflict, if any.
    pub fn conflict(&self) -> Option<&ConflictDecision> {
        match self {
            Self::ConflictPending(decision) => Some(decision),
            _ => None,
        }
    }
}

impl std::fmt::Display for UploadPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Idle => write!(f, "Idle"),
            Self::Selecting => write!(f, "Checking destination"),
            Self::ConflictPending(d) => write!(f, "\"{}\" already exists", d.folder_name),
            Self::Uploading { percent } => write!(f, "Uploading {percent}%"),
            Self::Success => write!(f, "Upload complete"),
            Self::Error { message } => write!(f, "Upload failed: {message}"),
        }
    }
}
