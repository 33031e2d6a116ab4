//! Upload orchestration engine for cloudup.
//!
//! This crate turns a [`PendingUpload`](cloudup_core::PendingUpload) into
//! backend transfers:
//!
//! - **Conflict detection** before any bytes move ([`detect_conflict`])
//! - **Batched transfers** with a fixed concurrency width ([`UploadScheduler`])
//! - **Aggregated progress** across every file of a run ([`UploadProgressState`])
//! - **Atomic cancellation** of every in-flight request ([`CancellationController`])
//! - **One state machine** tying it together ([`UploadOrchestrator`])
//!
//! The backend is reached through the [`StorageBackend`] trait so the
//! engine runs the same against HTTP or an in-memory fake.

mod cancel;
mod conflict;
mod event;
mod orchestrator;
mod progress;
mod scheduler;
mod transport;

pub use cancel::CancellationController;
pub use conflict::{candidate_folder_name, detect_conflict, folder_collides, validate_folder_name};
pub use event::UploadEvent;
pub use orchestrator::{RunOutcome, UploadOrchestrator};
pub use progress::{ProgressUpdate, RunSummary, UploadProgressState};
pub use scheduler::{ScheduleOutcome, UploadPlan, UploadScheduler, join_remote_path};
pub use transport::{ProgressReporter, StorageBackend, TransferSignal, UploadRequest};

/// Default channel buffer size for upload events.
pub const EVENT_CHANNEL_SIZE: usize = 100;
