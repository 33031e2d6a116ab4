//! The storage backend collaborator and per-transfer handles.

use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use cloudup_core::{BackendError, ConflictAction, FileId};

use crate::cancel::CancellationController;
use crate::progress::ProgressUpdate;

/// One file transfer as sent to the backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadRequest {
    /// Identity within the run, for progress accounting.
    pub file: FileId,
    /// Local file to stream.
    pub source: PathBuf,
    /// File name sent with the content.
    pub file_name: String,
    /// Size in bytes.
    pub size: u64,
    /// Remote folder the file lands in.
    pub folder_path: String,
    /// How the backend should treat an existing folder.
    pub conflict_action: Option<ConflictAction>,
    /// Replacement top-level folder name for a rename.
    pub custom_name: Option<String>,
}

/// Remote storage operations the upload engine depends on.
pub trait StorageBackend: Send + Sync {
    /// Whether a folder named `name` exists directly under `parent_path`.
    fn folder_exists(
        &self,
        name: &str,
        parent_path: &str,
    ) -> impl Future<Output = Result<bool, BackendError>> + Send;

    /// Transfer one file, reporting bytes sent through `progress`.
    ///
    /// Implementations must stop promptly once `signal` is aborted and return
    /// [`BackendError::Cancelled`].
    fn upload_file(
        &self,
        request: UploadRequest,
        progress: ProgressReporter,
        signal: TransferSignal,
    ) -> impl Future<Output = Result<(), BackendError>> + Send;
}

impl<B: StorageBackend> StorageBackend for Arc<B> {
    fn folder_exists(
        &self,
        name: &str,
        parent_path: &str,
    ) -> impl Future<Output = Result<bool, BackendError>> + Send {
        (**self).folder_exists(name, parent_path)
    }

    fn upload_file(
        &self,
        request: UploadRequest,
        progress: ProgressReporter,
        signal: TransferSignal,
    ) -> impl Future<Output = Result<(), BackendError>> + Send {
        (**self).upload_file(request, progress, signal)
    }
}

/// Abort handle for a single in-flight transfer.
#[derive(Debug, Clone)]
pub struct TransferSignal {
    pub(crate) id: u64,
    token: CancellationToken,
}

impl TransferSignal {
    pub(crate) fn new(id: u64, token: CancellationToken) -> Self {
        Self { id, token }
    }

    /// A signal not tied to any controller, for driving a backend directly.
    pub fn detached() -> Self {
        Self::new(0, CancellationToken::new())
    }

    /// Abort this transfer.
    pub fn abort(&self) {
        self.token.cancel();
    }

    pub fn is_aborted(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Resolves once the transfer is aborted.
    pub async fn aborted(&self) {
        self.token.cancelled().await
    }

    /// The underlying token, for transports that select on it.
    pub fn token(&self) -> &CancellationToken {
        &self.token
    }
}

/// Reports bytes sent for one file back to the scheduler.
///
/// Reports are dropped once the run is cancelled.
#[derive(Debug, Clone)]
pub struct ProgressReporter {
    file: FileId,
    size: u64,
    tx: mpsc::UnboundedSender<ProgressUpdate>,
    controller: Option<CancellationController>,
}

impl ProgressReporter {
    pub(crate) fn new(
        file: FileId,
        size: u64,
        tx: mpsc::UnboundedSender<ProgressUpdate>,
        controller: CancellationController,
    ) -> Self {
        Self {
            file,
            size,
            tx,
            controller: Some(controller),
        }
    }

    /// A reporter feeding a fresh channel, for driving a backend directly.
    pub fn channel(file: FileId, size: u64) -> (Self, mpsc::UnboundedReceiver<ProgressUpdate>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let reporter = Self {
            file,
            size,
            tx,
            controller: None,
        };
        (reporter, rx)
    }

    /// Size of the file being transferred.
    pub fn size(&self) -> u64 {
        self.size
    }

    /// Record the total bytes sent so far for this file.
    pub fn report(&self, bytes_sent: u64) {
        if self.controller.as_ref().is_some_and(|c| c.is_cancelled()) {
            return;
        }
        let _ = self.tx.send(ProgressUpdate {
            file: self.file,
            bytes_sent: bytes_sent.min(self.size),
        });
    }
}
