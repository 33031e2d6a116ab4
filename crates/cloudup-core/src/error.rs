//! Error types for selection, backend calls and the upload session.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors that can occur while building a selection.
#[derive(Debug, Error)]
pub enum ScanError {
    /// Permission denied for a path.
    #[error("Permission denied: {path}")]
    PermissionDenied { path: PathBuf },

    /// Path not found.
    #[error("Path not found: {path}")]
    NotFound { path: PathBuf },

    /// Generic I/O error.
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A directory was given where a file was expected.
    #[error("Not a file: {path}")]
    NotAFile { path: PathBuf },

    /// A file was given where a directory was expected.
    #[error("Not a directory: {path}")]
    NotADirectory { path: PathBuf },

    /// An ignore pattern failed to compile.
    #[error("Invalid ignore pattern '{pattern}': {message}")]
    InvalidPattern { pattern: String, message: String },
}

impl ScanError {
    /// Create an I/O error with path context.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        let path = path.into();
        match source.kind() {
            std::io::ErrorKind::PermissionDenied => Self::PermissionDenied { path },
            std::io::ErrorKind::NotFound => Self::NotFound { path },
            _ => Self::Io { path, source },
        }
    }
}

/// Kind of traversal warning.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum WarningKind {
    /// Permission was denied.
    PermissionDenied,
    /// Error reading a directory.
    ReadError,
    /// Error reading metadata.
    MetadataError,
}

/// Non-fatal warning encountered during traversal.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanWarning {
    /// Path where the warning occurred.
    pub path: PathBuf,
    /// Human-readable message.
    pub message: String,
    /// Kind of warning.
    pub kind: WarningKind,
}

impl ScanWarning {
    /// Create a new warning.
    pub fn new(path: impl Into<PathBuf>, message: impl Into<String>, kind: WarningKind) -> Self {
        Self {
            path: path.into(),
            message: message.into(),
            kind,
        }
    }

    /// Create a warning from a traversal error.
    pub fn from_error(error: &ScanError) -> Self {
        match error {
            ScanError::PermissionDenied { path } => Self::new(
                path,
                format!("Permission denied: {}", path.display()),
                WarningKind::PermissionDenied,
            ),
            ScanError::Io { path, source } => {
                Self::new(path, format!("Read error: {source}"), WarningKind::ReadError)
            }
            ScanError::NotFound { path }
            | ScanError::NotAFile { path }
            | ScanError::NotADirectory { path } => {
                Self::new(path, error.to_string(), WarningKind::MetadataError)
            }
            ScanError::InvalidPattern { .. } => {
                Self::new(PathBuf::new(), error.to_string(), WarningKind::ReadError)
            }
        }
    }
}

/// Errors reported by the storage backend collaborator.
#[derive(Debug, Clone, Error)]
pub enum BackendError {
    /// The transfer was aborted on purpose.
    #[error("Request cancelled")]
    Cancelled,

    /// The server answered with a non-success status.
    #[error("Server returned {status}: {message}")]
    Status { status: u16, message: String },

    /// The request could not be sent or the connection dropped.
    #[error("Connection failed: {0}")]
    Connection(String),

    /// The local source could not be read.
    #[error("Failed to read {path}: {message}")]
    Source { path: PathBuf, message: String },

    /// The response body did not have the expected shape.
    #[error("Invalid response: {0}")]
    InvalidResponse(String),
}

impl BackendError {
    /// Whether this error is the transport's cancellation signal.
    pub fn is_cancellation(&self) -> bool {
        matches!(self, Self::Cancelled)
    }
}

/// Errors returned by the upload session's operations.
///
/// Transfer failures are not errors here: they become the error phase.
#[derive(Debug, Error)]
pub enum UploadError {
    /// Nothing was selected.
    #[error("No files selected")]
    EmptySelection,

    /// A selection is being checked or uploaded.
    #[error("An upload is already in progress")]
    Busy,

    /// A conflict operation was called with no conflict pending.
    #[error("No folder conflict is pending")]
    NoPendingConflict,

    /// The rename target is not a usable folder name.
    #[error("Invalid folder name '{name}': {reason}")]
    InvalidFolderName { name: String, reason: String },

    /// The rename target also exists at the destination.
    #[error("'{name}' also exists. Please choose another name")]
    RenameCollision { name: String },
}
