//! Batched concurrent transfers.
//!
//! Entries are split into batches of a fixed width. Transfers inside a batch
//! run concurrently; the next batch starts only after every transfer of the
//! current one has settled, which bounds the number of open requests.

use chrono::Utc;
use futures::future::join_all;
use tokio::sync::mpsc;

use cloudup_core::{BackendError, ConflictAction, FileId, PendingUpload, UploadEntry};

use crate::cancel::CancellationController;
use crate::progress::{ProgressUpdate, RunSummary, UploadProgressState};
use crate::transport::{ProgressReporter, StorageBackend, UploadRequest};

/// Join a relative folder onto a remote base path without doubling slashes.
pub fn join_remote_path(base: &str, relative: &str) -> String {
    let relative = relative.trim_matches('/');
    if relative.is_empty() {
        return base.to_string();
    }
    if base.is_empty() || base == "/" {
        format!("/{relative}")
    } else {
        format!("{}/{relative}", base.trim_end_matches('/'))
    }
}

/// Everything needed to transfer a resolved selection.
#[derive(Debug, Clone)]
pub struct UploadPlan {
    /// The entries to send.
    pub selection: PendingUpload,
    /// Remote base path.
    pub destination: String,
    /// Conflict resolution passed on to the backend.
    pub action: Option<ConflictAction>,
    /// Replacement for the leading folder segment of every entry.
    pub rename_to: Option<String>,
}

impl UploadPlan {
    pub fn new(selection: PendingUpload, destination: impl Into<String>) -> Self {
        Self {
            selection,
            destination: destination.into(),
            action: None,
            rename_to: None,
        }
    }

    pub fn with_action(mut self, action: Option<ConflictAction>) -> Self {
        self.action = action;
        self
    }

    pub fn with_rename(mut self, rename_to: Option<String>) -> Self {
        self.rename_to = rename_to;
        self
    }

    /// Remote folder an entry lands in.
    ///
    /// With a rename in effect, only the first segment of the entry's relative
    /// directory is replaced; the destination base is never touched.
    pub fn folder_for(&self, entry: &UploadEntry) -> String {
        let dir = entry.relative_dir();
        match (&self.rename_to, dir.split_once('/')) {
            (_, _) if dir.is_empty() => self.destination.clone(),
            (Some(new_name), Some((_, rest))) => {
                join_remote_path(&self.destination, &format!("{new_name}/{rest}"))
            }
            (Some(new_name), None) => join_remote_path(&self.destination, new_name),
            (None, _) => join_remote_path(&self.destination, dir),
        }
    }

    /// Build the backend request for one entry.
    pub fn request_for(&self, file: FileId, entry: &UploadEntry) -> UploadRequest {
        UploadRequest {
            file,
            source: entry.source.clone(),
            file_name: entry.file_name().to_string(),
            size: entry.size,
            folder_path: self.folder_for(entry),
            conflict_action: self.action,
            custom_name: self.rename_to.clone(),
        }
    }
}

/// How a scheduled run ended.
#[derive(Debug, Clone)]
pub enum ScheduleOutcome {
    /// Every batch settled successfully.
    Completed(RunSummary),
    /// The run was cancelled; later batches never started.
    Cancelled,
    /// A transfer failed. Earlier batches stay uploaded.
    Failed(BackendError),
}

/// Runs an [`UploadPlan`] in sequential batches of concurrent transfers.
#[derive(Debug, Clone, Copy)]
pub struct UploadScheduler {
    width: usize,
}

impl UploadScheduler {
    /// Create a scheduler with the given batch width (at least one).
    pub fn new(width: usize) -> Self {
        Self {
            width: width.max(1),
        }
    }

    pub fn width(&self) -> usize {
        self.width
    }

    /// Transfer every entry of `plan`.
    ///
    /// `on_progress` receives the aggregate percentage whenever it changes.
    pub async fn run<B, F>(
        &self,
        backend: &B,
        plan: &UploadPlan,
        controller: &CancellationController,
        mut on_progress: F,
    ) -> ScheduleOutcome
    where
        B: StorageBackend,
        F: FnMut(u8) + Send,
    {
        let started_at = Utc::now();
        let entries: Vec<(FileId, &UploadEntry)> = plan.selection.iter().collect();
        let mut state = UploadProgressState::new(plan.selection.total_bytes());
        let (tx, mut rx) = mpsc::unbounded_channel::<ProgressUpdate>();
        let mut batches = 0;

        let mut apply = |update: ProgressUpdate, state: &mut UploadProgressState| {
            if controller.is_cancelled() {
                return;
            }
            if let Some(percent) = state.apply(update) {
                on_progress(percent);
            }
        };

        for (index, batch) in entries.chunks(self.width).enumerate() {
            if controller.is_cancelled() {
                tracing::debug!(batch = index, "cancelled before batch start");
                return ScheduleOutcome::Cancelled;
            }

            tracing::debug!(batch = index, files = batch.len(), "starting batch");

            let transfers = batch.iter().map(|&(file, entry)| {
                let request = plan.request_for(file, entry);
                let signal = controller.register();
                let reporter = ProgressReporter::new(file, entry.size, tx.clone(), controller.clone());
                async move {
                    tracing::debug!(file = %request.file_name, folder = %request.folder_path, "transfer started");
                    let result = backend.upload_file(request, reporter, signal.clone()).await;
                    controller.release(&signal);
                    result
                }
            });

            let settled = join_all(transfers);
            tokio::pin!(settled);

            let results = loop {
                tokio::select! {
                    results = &mut settled => break results,
                    Some(update) = rx.recv() => apply(update, &mut state),
                }
            };
            while let Ok(update) = rx.try_recv() {
                apply(update, &mut state);
            }
            batches += 1;

            let mut aborted = false;
            let mut failure = None;
            for result in results {
                match result {
                    Ok(()) => {}
                    Err(err) if err.is_cancellation() => aborted = true,
                    Err(err) => {
                        failure.get_or_insert(err);
                    }
                }
            }

            if controller.is_cancelled() || (aborted && failure.is_none()) {
                return ScheduleOutcome::Cancelled;
            }
            if let Some(err) = failure {
                tracing::debug!(batch = index, "batch failed: {err}");
                return ScheduleOutcome::Failed(err);
            }
        }

        if controller.is_cancelled() {
            return ScheduleOutcome::Cancelled;
        }

        ScheduleOutcome::Completed(RunSummary {
            files: plan.selection.len(),
            bytes: plan.selection.total_bytes(),
            batches,
            destination: plan.destination.clone(),
            started_at,
            finished_at: Utc::now(),
        })
    }
}
