//! Core types for cloudup.
//!
//! This crate provides the data model shared by the upload pipeline:
//! selected entries, conflict decisions, the upload phase state machine,
//! configuration and error types.

mod config;
mod conflict;
mod entry;
mod error;
mod phase;

pub use config::{UploadConfig, UploadConfigBuilder};
pub use conflict::{ConflictAction, ConflictDecision};
pub use entry::{FileId, PendingUpload, UploadEntry};
pub use error::{BackendError, ScanError, ScanWarning, UploadError, WarningKind};
pub use phase::UploadPhase;
