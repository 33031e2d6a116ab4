//! Events broadcast by the orchestrator.

use cloudup_core::{ConflictDecision, UploadPhase};

use crate::progress::RunSummary;

/// Something observers of an upload session may react to.
///
/// `Completed`, `Failed` and `Cancelled` are the hooks for cosmetic side
/// effects such as sounds or notifications.
#[derive(Debug, Clone)]
pub enum UploadEvent {
    /// The phase changed.
    PhaseChanged(UploadPhase),
    /// Aggregate progress moved.
    Progress { percent: u8 },
    /// An existing folder collides with the selection.
    ConflictDetected(ConflictDecision),
    /// Every file was uploaded.
    Completed(RunSummary),
    /// A transfer failed and the run stopped.
    Failed { message: String },
    /// The session was cancelled, aborting this many transfers.
    Cancelled { aborted: usize },
}
