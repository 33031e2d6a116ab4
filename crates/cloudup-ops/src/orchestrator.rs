//! The upload session state machine.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::sync::broadcast;

use cloudup_core::{
    ConflictAction, ConflictDecision, PendingUpload, UploadConfig, UploadError, UploadPhase,
};

use crate::cancel::CancellationController;
use crate::conflict::{detect_conflict, folder_collides, validate_folder_name};
use crate::event::UploadEvent;
use crate::progress::RunSummary;
use crate::scheduler::{ScheduleOutcome, UploadPlan, UploadScheduler};
use crate::transport::StorageBackend;
use crate::EVENT_CHANNEL_SIZE;

type UploadedCallback = Arc<dyn Fn() + Send + Sync>;

/// How a call into the orchestrator left the session.
#[derive(Debug, Clone)]
pub enum RunOutcome {
    /// Every file was uploaded.
    Completed(RunSummary),
    /// The destination already has the folder; a decision is needed.
    ConflictPending(ConflictDecision),
    /// The session was cancelled before or during the transfer.
    Cancelled,
    /// A transfer failed; the session is in the error phase.
    Failed { message: String },
}

#[derive(Debug, Default)]
struct Session {
    phase: UploadPhase,
    pending: Option<PendingUpload>,
    destination: String,
    /// Bumped by every new selection and every cancel, so stale work can
    /// tell it no longer owns the session.
    generation: u64,
    /// Controller of the latest run. Replaced, never reset, when a run starts.
    controller: CancellationController,
}

/// Drives one upload session from selection to a terminal phase.
///
/// Cloning shares the session, so one clone can [`cancel`](Self::cancel)
/// while another is awaiting [`submit`](Self::submit).
pub struct UploadOrchestrator<B> {
    backend: Arc<B>,
    config: UploadConfig,
    session: Arc<Mutex<Session>>,
    events: broadcast::Sender<UploadEvent>,
    on_uploaded: Option<UploadedCallback>,
}

impl<B> Clone for UploadOrchestrator<B> {
    fn clone(&self) -> Self {
        Self {
            backend: Arc::clone(&self.backend),
            config: self.config.clone(),
            session: Arc::clone(&self.session),
            events: self.events.clone(),
            on_uploaded: self.on_uploaded.clone(),
        }
    }
}

impl<B: StorageBackend> UploadOrchestrator<B> {
    /// Create an orchestrator over a backend.
    pub fn new(backend: B, config: UploadConfig) -> Self {
        Self::with_shared_backend(Arc::new(backend), config)
    }

    /// Create an orchestrator over a backend that is shared elsewhere.
    pub fn with_shared_backend(backend: Arc<B>, config: UploadConfig) -> Self {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_SIZE);
        Self {
            backend,
            config,
            session: Arc::new(Mutex::new(Session::default())),
            events,
            on_uploaded: None,
        }
    }

    /// Register the callback that refreshes the directory listing after a
    /// successful run.
    pub fn with_on_uploaded(mut self, callback: impl Fn() + Send + Sync + 'static) -> Self {
        self.on_uploaded = Some(Arc::new(callback));
        self
    }

    /// Subscribe to session events.
    pub fn subscribe(&self) -> broadcast::Receiver<UploadEvent> {
        self.events.subscribe()
    }

    pub fn config(&self) -> &UploadConfig {
        &self.config
    }

    /// Controller of the latest run.
    pub fn controller(&self) -> CancellationController {
        self.session().controller.clone()
    }

    /// Snapshot of the current phase.
    pub fn phase(&self) -> UploadPhase {
        self.session().phase.clone()
    }

    /// Snapshot of the pending selection.
    pub fn pending(&self) -> Option<PendingUpload> {
        self.session().pending.clone()
    }

    fn session(&self) -> MutexGuard<'_, Session> {
        self.session.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn emit(&self, event: UploadEvent) {
        // No subscribers is fine.
        let _ = self.events.send(event);
    }

    fn set_phase(&self, session: &mut Session, phase: UploadPhase) {
        if session.phase == phase {
            return;
        }
        tracing::debug!(from = session.phase.name(), to = phase.name(), "phase change");
        session.phase = phase.clone();
        self.emit(UploadEvent::PhaseChanged(phase));
    }

    /// Submit a new selection for upload to `destination`.
    ///
    /// Replaces any previous selection. Returns once the run reaches a
    /// terminal phase, or early with [`RunOutcome::ConflictPending`] when the
    /// implied top-level folder already exists.
    pub async fn submit(
        &self,
        selection: PendingUpload,
        destination: impl Into<String>,
    ) -> Result<RunOutcome, UploadError> {
        if selection.is_empty() {
            return Err(UploadError::EmptySelection);
        }
        let destination = destination.into();

        let generation = {
            let mut session = self.session();
            if session.phase.is_busy() {
                return Err(UploadError::Busy);
            }
            session.generation += 1;
            session.pending = Some(selection.clone());
            session.destination = destination.clone();
            self.set_phase(&mut session, UploadPhase::Selecting);
            session.generation
        };

        tracing::info!(
            files = selection.len(),
            bytes = selection.total_bytes(),
            destination = %destination,
            "selection submitted"
        );

        if let Some(decision) = detect_conflict(&*self.backend, &selection, &destination).await {
            {
                let mut session = self.session();
                if session.generation != generation {
                    return Ok(RunOutcome::Cancelled);
                }
                self.set_phase(&mut session, UploadPhase::ConflictPending(decision.clone()));
            }
            self.emit(UploadEvent::ConflictDetected(decision.clone()));
            return Ok(RunOutcome::ConflictPending(decision));
        }

        self.start_upload(generation, None, None).await
    }

    /// Resolve a pending conflict.
    ///
    /// `Merge` and `Replace` start the upload. `Rename` only opens the rename
    /// prompt; follow up with [`rename`](Self::rename).
    pub async fn resolve(&self, action: ConflictAction) -> Result<RunOutcome, UploadError> {
        if action == ConflictAction::Rename {
            return self.request_rename().map(RunOutcome::ConflictPending);
        }

        let generation = {
            let mut session = self.session();
            let Some(decision) = session.phase.conflict().cloned() else {
                return Err(UploadError::NoPendingConflict);
            };
            let decision = ConflictDecision {
                action: Some(action),
                ..decision
            };
            self.set_phase(&mut session, UploadPhase::ConflictPending(decision));
            session.generation
        };

        tracing::info!(%action, "conflict resolved");
        self.start_upload(generation, Some(action), None).await
    }

    /// Move the pending conflict to the rename prompt.
    pub fn request_rename(&self) -> Result<ConflictDecision, UploadError> {
        self.update_decision(Some(ConflictAction::Rename))
    }

    /// Leave the rename prompt and return to the three choices.
    pub fn back_to_choices(&self) -> Result<ConflictDecision, UploadError> {
        self.update_decision(None)
    }

    fn update_decision(&self, action: Option<ConflictAction>) -> Result<ConflictDecision, UploadError> {
        let mut session = self.session();
        let Some(decision) = session.phase.conflict().cloned() else {
            return Err(UploadError::NoPendingConflict);
        };
        let decision = ConflictDecision {
            action,
            rename_to: None,
            ..decision
        };
        self.set_phase(&mut session, UploadPhase::ConflictPending(decision.clone()));
        Ok(decision)
    }

    /// Upload under a new top-level folder name.
    ///
    /// The new name is checked against the destination first. If it also
    /// exists, [`UploadError::RenameCollision`] is returned and the session
    /// stays at the rename prompt.
    pub async fn rename(&self, new_name: &str) -> Result<RunOutcome, UploadError> {
        let new_name = new_name.trim();

        let (generation, destination) = {
            let mut session = self.session();
            let Some(decision) = session.phase.conflict().cloned() else {
                return Err(UploadError::NoPendingConflict);
            };
            validate_folder_name(new_name).map_err(|reason| UploadError::InvalidFolderName {
                name: new_name.to_string(),
                reason,
            })?;
            if !decision.is_renaming() {
                let decision = ConflictDecision {
                    action: Some(ConflictAction::Rename),
                    ..decision
                };
                self.set_phase(&mut session, UploadPhase::ConflictPending(decision));
            }
            (session.generation, session.destination.clone())
        };

        if folder_collides(&*self.backend, new_name, &destination).await {
            if self.session().generation != generation {
                return Ok(RunOutcome::Cancelled);
            }
            tracing::info!(folder = new_name, "rename target also exists");
            return Err(UploadError::RenameCollision {
                name: new_name.to_string(),
            });
        }

        {
            let mut session = self.session();
            if session.generation != generation {
                return Ok(RunOutcome::Cancelled);
            }
            if let Some(decision) = session.phase.conflict().cloned() {
                let decision = ConflictDecision {
                    rename_to: Some(new_name.to_string()),
                    ..decision
                };
                self.set_phase(&mut session, UploadPhase::ConflictPending(decision));
            }
        }

        self.start_upload(
            generation,
            Some(ConflictAction::Rename),
            Some(new_name.to_string()),
        )
        .await
    }

    /// Cancel whatever the session is doing and return to idle.
    ///
    /// Aborts every in-flight transfer exactly once. Safe to call at any time.
    pub fn cancel(&self) {
        let (was_active, controller) = {
            let mut session = self.session();
            session.generation += 1;
            session.pending = None;
            let was_active = matches!(
                session.phase,
                UploadPhase::Selecting | UploadPhase::ConflictPending(_) | UploadPhase::Uploading { .. }
            );
            self.set_phase(&mut session, UploadPhase::Idle);
            (was_active, session.controller.clone())
        };

        let aborted = controller.cancel();
        if was_active {
            tracing::info!(aborted, "upload cancelled");
            self.emit(UploadEvent::Cancelled { aborted });
        }
    }

    /// Leave the error phase. Returns whether there was an error to dismiss.
    pub fn dismiss_error(&self) -> bool {
        let mut session = self.session();
        if !matches!(session.phase, UploadPhase::Error { .. }) {
            return false;
        }
        session.pending = None;
        self.set_phase(&mut session, UploadPhase::Idle);
        true
    }

    async fn start_upload(
        &self,
        generation: u64,
        action: Option<ConflictAction>,
        rename_to: Option<String>,
    ) -> Result<RunOutcome, UploadError> {
        let (plan, controller) = {
            let mut session = self.session();
            if session.generation != generation {
                return Ok(RunOutcome::Cancelled);
            }
            if !matches!(
                session.phase,
                UploadPhase::Selecting | UploadPhase::ConflictPending(_)
            ) {
                return Err(UploadError::Busy);
            }
            let Some(selection) = session.pending.clone() else {
                return Err(UploadError::EmptySelection);
            };
            session.controller = CancellationController::new();
            self.set_phase(&mut session, UploadPhase::Uploading { percent: 0 });
            let plan = UploadPlan::new(selection, session.destination.clone())
                .with_action(action)
                .with_rename(rename_to);
            (plan, session.controller.clone())
        };

        let scheduler = UploadScheduler::new(self.config.batch_width());
        tracing::info!(
            files = plan.selection.len(),
            width = scheduler.width(),
            action = ?plan.action,
            "upload started"
        );

        let outcome = scheduler
            .run(&*self.backend, &plan, &controller, |percent| {
                self.record_progress(generation, percent)
            })
            .await;

        Ok(self.finish(generation, outcome))
    }

    fn record_progress(&self, generation: u64, percent: u8) {
        let mut session = self.session();
        if session.generation != generation {
            return;
        }
        if let UploadPhase::Uploading { percent: current } = &mut session.phase {
            *current = percent;
            self.emit(UploadEvent::Progress { percent });
        }
    }

    fn finish(&self, generation: u64, outcome: ScheduleOutcome) -> RunOutcome {
        match outcome {
            ScheduleOutcome::Completed(summary) => {
                {
                    let mut session = self.session();
                    if session.generation != generation {
                        return RunOutcome::Cancelled;
                    }
                    session.pending = None;
                    self.set_phase(&mut session, UploadPhase::Success);
                }

                tracing::info!(
                    files = summary.files,
                    bytes = summary.bytes,
                    elapsed_ms = summary.elapsed().as_millis() as u64,
                    "upload complete"
                );
                self.emit(UploadEvent::Completed(summary.clone()));
                if let Some(callback) = &self.on_uploaded {
                    callback();
                }
                self.schedule_idle(generation);
                RunOutcome::Completed(summary)
            }
            ScheduleOutcome::Cancelled => {
                let mut session = self.session();
                if session.generation == generation {
                    // Aborted by the transport rather than by `cancel`.
                    session.pending = None;
                    self.set_phase(&mut session, UploadPhase::Idle);
                    self.emit(UploadEvent::Cancelled { aborted: 0 });
                }
                RunOutcome::Cancelled
            }
            ScheduleOutcome::Failed(err) => {
                let message = err.to_string();
                let mut session = self.session();
                if session.generation != generation {
                    return RunOutcome::Cancelled;
                }
                tracing::error!("upload failed: {message}");
                self.set_phase(
                    &mut session,
                    UploadPhase::Error {
                        message: message.clone(),
                    },
                );
                self.emit(UploadEvent::Failed {
                    message: message.clone(),
                });
                RunOutcome::Failed { message }
            }
        }
    }

    /// Revert the success phase to idle after the display window.
    fn schedule_idle(&self, generation: u64) {
        let Ok(handle) = tokio::runtime::Handle::try_current() else {
            return;
        };
        let session = Arc::clone(&self.session);
        let events = self.events.clone();
        let delay = self.config.success_display();

        handle.spawn(async move {
            tokio::time::sleep(delay).await;
            let mut session = session.lock().unwrap_or_else(PoisonError::into_inner);
            if session.generation == generation && session.phase == UploadPhase::Success {
                session.phase = UploadPhase::Idle;
                let _ = events.send(UploadEvent::PhaseChanged(UploadPhase::Idle));
            }
        });
    }
}
