use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::Notify;

use cloudup_core::{
    BackendError, ConflictAction, FileId, PendingUpload, UploadConfig, UploadEntry, UploadError,
    UploadPhase,
};
use cloudup_ops::{
    detect_conflict, ProgressReporter, RunOutcome, StorageBackend, TransferSignal, UploadEvent, UploadOrchestrator,
    UploadRequest,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Step {
    Start(FileId),
    End(FileId),
}

/// In-memory backend that records every call.
#[derive(Default)]
struct FakeBackend {
    existing: HashSet<String>,
    fail_exists: bool,
    fail_files: HashSet<String>,
    hang_files: HashSet<String>,
    /// Transfers that ignore abort and finish only once `stall_gate` opens.
    stall_files: HashSet<String>,
    stall_gate: Notify,
    /// Existence checks for these names wait on `exists_gate`.
    gated_names: HashSet<String>,
    exists_gate: Notify,
    exists_waiting: AtomicUsize,
    requests: Mutex<Vec<UploadRequest>>,
    steps: Mutex<Vec<Step>>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
    aborted: AtomicUsize,
}

impl FakeBackend {
    fn with_existing(names: &[&str]) -> Self {
        Self {
            existing: names.iter().map(|n| n.to_string()).collect(),
            ..Default::default()
        }
    }

    fn requests(&self) -> Vec<UploadRequest> {
        self.requests.lock().unwrap().clone()
    }

    fn steps(&self) -> Vec<Step> {
        self.steps.lock().unwrap().clone()
    }

    fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::SeqCst)
    }
}

impl StorageBackend for FakeBackend {
    async fn folder_exists(&self, name: &str, _parent_path: &str) -> Result<bool, BackendError> {
        if self.gated_names.contains(name) {
            self.exists_waiting.fetch_add(1, Ordering::SeqCst);
            self.exists_gate.notified().await;
        }
        if self.fail_exists {
            return Err(BackendError::Connection("unreachable".into()));
        }
        Ok(self.existing.contains(name))
    }

    async fn upload_file(
        &self,
        request: UploadRequest,
        progress: ProgressReporter,
        signal: TransferSignal,
    ) -> Result<(), BackendError> {
        self.requests.lock().unwrap().push(request.clone());
        self.steps.lock().unwrap().push(Step::Start(request.file));
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);

        let result = if self.hang_files.contains(&request.file_name) {
            signal.aborted().await;
            self.aborted.fetch_add(1, Ordering::SeqCst);
            Err(BackendError::Cancelled)
        } else if self.stall_files.contains(&request.file_name) {
            self.stall_gate.notified().await;
            Ok(())
        } else {
            for step in 1..=4 {
                tokio::task::yield_now().await;
                progress.report(request.size * step / 4);
            }
            if self.fail_files.contains(&request.file_name) {
                Err(BackendError::Status {
                    status: 500,
                    message: "disk full".into(),
                })
            } else {
                Ok(())
            }
        };

        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        self.steps.lock().unwrap().push(Step::End(request.file));
        result
    }
}

fn selection(paths: &[&str]) -> PendingUpload {
    paths
        .iter()
        .map(|p| UploadEntry::new(format!("/local/{p}"), *p, 100))
        .collect()
}

fn flat(count: usize) -> PendingUpload {
    let names: Vec<String> = (0..count).map(|i| format!("f{i}.txt")).collect();
    let refs: Vec<&str> = names.iter().map(String::as_str).collect();
    selection(&refs)
}

fn orchestrator(backend: &Arc<FakeBackend>) -> UploadOrchestrator<FakeBackend> {
    UploadOrchestrator::with_shared_backend(Arc::clone(backend), UploadConfig::default())
}

fn drain(rx: &mut tokio::sync::broadcast::Receiver<UploadEvent>) -> Vec<UploadEvent> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}

async fn wait_until(mut condition: impl FnMut() -> bool) {
    for _ in 0..10_000 {
        if condition() {
            return;
        }
        tokio::task::yield_now().await;
    }
    panic!("condition never became true");
}

#[tokio::test]
async fn test_flat_upload_completes() {
    let backend = Arc::new(FakeBackend::default());
    let refreshed = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&refreshed);
    let orch = orchestrator(&backend).with_on_uploaded(move || {
        counter.fetch_add(1, Ordering::SeqCst);
    });

    let outcome = orch.submit(flat(4), "/docs").await.unwrap();

    let RunOutcome::Completed(summary) = outcome else {
        panic!("expected completion, got {outcome:?}");
    };
    assert_eq!(summary.files, 4);
    assert_eq!(summary.bytes, 400);
    assert_eq!(summary.batches, 2);
    assert_eq!(orch.phase(), UploadPhase::Success);
    assert!(orch.pending().is_none());
    assert_eq!(refreshed.load(Ordering::SeqCst), 1);

    let requests = backend.requests();
    assert_eq!(requests.len(), 4);
    assert!(requests.iter().all(|r| r.folder_path == "/docs"));
    assert!(requests.iter().all(|r| r.conflict_action.is_none() && r.custom_name.is_none()));
}

#[tokio::test]
async fn test_progress_is_monotonic() {
    let backend = Arc::new(FakeBackend::default());
    let orch = orchestrator(&backend);
    let mut rx = orch.subscribe();

    orch.submit(flat(7), "/").await.unwrap();

    let percents: Vec<u8> = drain(&mut rx)
        .into_iter()
        .filter_map(|e| match e {
            UploadEvent::Progress { percent } => Some(percent),
            _ => None,
        })
        .collect();

    assert!(!percents.is_empty());
    assert!(percents.windows(2).all(|w| w[0] <= w[1]));
    assert_eq!(percents.last(), Some(&100));
}

#[tokio::test]
async fn test_concurrency_is_bounded() {
    let backend = Arc::new(FakeBackend::default());
    let orch = orchestrator(&backend);

    orch.submit(flat(8), "/").await.unwrap();

    assert_eq!(backend.max_in_flight.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn test_batches_run_in_order() {
    let backend = Arc::new(FakeBackend::default());
    let orch = orchestrator(&backend);

    orch.submit(flat(8), "/").await.unwrap();

    let steps = backend.steps();
    let batch_of = |id: FileId| id.0 / 3;
    for (i, step) in steps.iter().enumerate() {
        if let Step::Start(started) = step {
            // Every transfer of earlier batches has already ended.
            let ended_before: HashSet<FileId> = steps[..i]
                .iter()
                .filter_map(|s| match s {
                    Step::End(id) => Some(*id),
                    Step::Start(_) => None,
                })
                .collect();
            for earlier in (0..8).map(FileId).filter(|id| batch_of(*id) < batch_of(*started)) {
                assert!(ended_before.contains(&earlier), "{started:?} began before {earlier:?} settled");
            }
        }
    }
}

#[tokio::test]
async fn test_no_conflict_goes_straight_to_upload() {
    let backend = Arc::new(FakeBackend::with_existing(&["Other"]));
    let orch = orchestrator(&backend);
    let mut rx = orch.subscribe();

    let outcome = orch.submit(selection(&["A/x.txt", "A/y.txt"]), "/").await.unwrap();
    assert!(matches!(outcome, RunOutcome::Completed(_)));

    let events = drain(&mut rx);
    assert!(!events.iter().any(|e| matches!(
        e,
        UploadEvent::ConflictDetected(_) | UploadEvent::PhaseChanged(UploadPhase::ConflictPending(_))
    )));
    assert_eq!(backend.requests()[0].folder_path, "/A");
}

#[tokio::test]
async fn test_conflict_then_merge() {
    let backend = Arc::new(FakeBackend::with_existing(&["A"]));
    let orch = orchestrator(&backend);

    let outcome = orch.submit(selection(&["A/x.txt"]), "/dest").await.unwrap();
    let RunOutcome::ConflictPending(decision) = outcome else {
        panic!("expected a conflict");
    };
    assert_eq!(decision.folder_name, "A");
    assert!(decision.action.is_none());
    assert!(backend.requests().is_empty());
    assert!(matches!(orch.phase(), UploadPhase::ConflictPending(_)));

    let outcome = orch.resolve(ConflictAction::Merge).await.unwrap();
    assert!(matches!(outcome, RunOutcome::Completed(_)));

    let requests = backend.requests();
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].folder_path, "/dest/A");
    assert_eq!(requests[0].conflict_action, Some(ConflictAction::Merge));
}

#[tokio::test]
async fn test_replace_sends_action() {
    let backend = Arc::new(FakeBackend::with_existing(&["A"]));
    let orch = orchestrator(&backend);

    orch.submit(selection(&["A/x.txt"]), "/").await.unwrap();
    orch.resolve(ConflictAction::Replace).await.unwrap();

    assert_eq!(backend.requests()[0].conflict_action, Some(ConflictAction::Replace));
}

#[tokio::test]
async fn test_rename_substitutes_leading_segment() {
    let backend = Arc::new(FakeBackend::with_existing(&["A"]));
    let orch = orchestrator(&backend);

    orch.submit(selection(&["A/x.txt", "A/sub/y.txt"]), "/dest").await.unwrap();
    let decision = orch.request_rename().unwrap();
    assert!(decision.is_renaming());

    let outcome = orch.rename("  B ").await.unwrap();
    assert!(matches!(outcome, RunOutcome::Completed(_)));

    let mut folders: Vec<_> = backend
        .requests()
        .into_iter()
        .map(|r| (r.file_name, r.folder_path, r.custom_name, r.conflict_action))
        .collect();
    folders.sort_by(|a, b| a.0.cmp(&b.0));

    assert_eq!(
        folders,
        vec![
            ("x.txt".into(), "/dest/B".into(), Some("B".into()), Some(ConflictAction::Rename)),
            ("y.txt".into(), "/dest/B/sub".into(), Some("B".into()), Some(ConflictAction::Rename)),
        ]
    );
}

#[tokio::test]
async fn test_rename_collision_stays_at_prompt() {
    let backend = Arc::new(FakeBackend::with_existing(&["A", "B"]));
    let orch = orchestrator(&backend);

    orch.submit(selection(&["A/x.txt"]), "/").await.unwrap();
    orch.request_rename().unwrap();

    let err = orch.rename("B").await.unwrap_err();
    assert!(matches!(err, UploadError::RenameCollision { ref name } if name == "B"));
    assert!(backend.requests().is_empty());
    assert!(orch.phase().conflict().is_some_and(|d| d.is_renaming()));

    let outcome = orch.rename("C").await.unwrap();
    assert!(matches!(outcome, RunOutcome::Completed(_)));
    assert_eq!(backend.requests()[0].folder_path, "/C");
}

#[tokio::test]
async fn test_rename_rejects_blank_name() {
    let backend = Arc::new(FakeBackend::with_existing(&["A"]));
    let orch = orchestrator(&backend);

    orch.submit(selection(&["A/x.txt"]), "/").await.unwrap();
    let err = orch.rename("   ").await.unwrap_err();
    assert!(matches!(err, UploadError::InvalidFolderName { .. }));
    assert!(matches!(orch.phase(), UploadPhase::ConflictPending(_)));
}

#[tokio::test]
async fn test_rename_without_conflict_is_rejected_before_validation() {
    let backend = Arc::new(FakeBackend::default());
    let orch = orchestrator(&backend);

    let err = orch.rename("").await.unwrap_err();
    assert!(matches!(err, UploadError::NoPendingConflict));
    let err = orch.rename("Fine").await.unwrap_err();
    assert!(matches!(err, UploadError::NoPendingConflict));
}

#[tokio::test]
async fn test_cancel_during_rename_target_check() {
    let backend = Arc::new(FakeBackend {
        existing: ["A", "B"].into_iter().map(String::from).collect(),
        gated_names: ["B".to_string()].into_iter().collect(),
        ..Default::default()
    });
    let orch = orchestrator(&backend);

    orch.submit(selection(&["A/x.txt"]), "/").await.unwrap();
    let rename = tokio::spawn({
        let orch = orch.clone();
        async move { orch.rename("B").await }
    });
    wait_until(|| backend.exists_waiting.load(Ordering::SeqCst) == 1).await;

    orch.cancel();
    backend.exists_gate.notify_one();

    let outcome = rename.await.unwrap().unwrap();
    assert!(matches!(outcome, RunOutcome::Cancelled));
    assert_eq!(orch.phase(), UploadPhase::Idle);
    assert!(backend.requests().is_empty());
}

#[tokio::test]
async fn test_back_to_choices() {
    let backend = Arc::new(FakeBackend::with_existing(&["A"]));
    let orch = orchestrator(&backend);

    orch.submit(selection(&["A/x.txt"]), "/").await.unwrap();
    orch.resolve(ConflictAction::Rename).await.unwrap();
    assert!(orch.phase().conflict().is_some_and(|d| d.is_renaming()));

    let decision = orch.back_to_choices().unwrap();
    assert!(decision.action.is_none());
}

#[tokio::test]
async fn test_failed_existence_check_proceeds() {
    let backend = Arc::new(FakeBackend {
        fail_exists: true,
        ..Default::default()
    });
    let orch = orchestrator(&backend);

    let outcome = orch.submit(selection(&["A/x.txt"]), "/").await.unwrap();
    assert!(matches!(outcome, RunOutcome::Completed(_)));
}

#[tokio::test]
async fn test_zip_name_inference() {
    let backend = Arc::new(FakeBackend::with_existing(&["Photos"]));
    let orch = orchestrator(&backend);

    let outcome = orch.submit(selection(&["Photos.zip"]), "/").await.unwrap();
    assert!(matches!(outcome, RunOutcome::ConflictPending(ref d) if d.folder_name == "Photos"));
    orch.cancel();

    let outcome = orch.submit(selection(&["Photos.zip", "notes.txt"]), "/").await.unwrap();
    assert!(matches!(outcome, RunOutcome::Completed(_)));
}

#[tokio::test]
async fn test_cancel_aborts_in_flight_and_skips_later_batches() {
    let backend = Arc::new(FakeBackend {
        hang_files: ["f1.txt", "f2.txt"].into_iter().map(String::from).collect(),
        ..Default::default()
    });
    let orch = orchestrator(&backend);

    let run = tokio::spawn({
        let orch = orch.clone();
        async move { orch.submit(flat(6), "/").await }
    });

    wait_until(|| backend.in_flight() == 2 && backend.steps().contains(&Step::End(FileId(0)))).await;
    orch.cancel();

    let outcome = run.await.unwrap().unwrap();
    assert!(matches!(outcome, RunOutcome::Cancelled));
    assert_eq!(orch.phase(), UploadPhase::Idle);
    assert!(orch.pending().is_none());
    assert_eq!(backend.requests().len(), 3);
    assert_eq!(backend.aborted.load(Ordering::SeqCst), 2);
    assert_eq!(orch.controller().in_flight(), 0);
}

#[tokio::test]
async fn test_stale_run_stays_cancelled_after_a_new_run_starts() {
    let backend = Arc::new(FakeBackend {
        stall_files: ["f0.txt", "f1.txt", "f2.txt"].into_iter().map(String::from).collect(),
        ..Default::default()
    });
    let orch = orchestrator(&backend);

    let stale = tokio::spawn({
        let orch = orch.clone();
        async move { orch.submit(flat(6), "/").await }
    });
    wait_until(|| backend.in_flight() == 3).await;

    let stale_controller = orch.controller();
    orch.cancel();
    assert!(stale_controller.is_cancelled());

    let outcome = orch.submit(selection(&["g.txt"]), "/").await.unwrap();
    assert!(matches!(outcome, RunOutcome::Completed(_)));
    assert!(!orch.controller().is_cancelled());
    assert!(stale_controller.is_cancelled());

    // The stale batch now settles cleanly; its later batches must not start.
    backend.stall_gate.notify_waiters();
    let outcome = stale.await.unwrap().unwrap();
    assert!(matches!(outcome, RunOutcome::Cancelled));

    let names: Vec<String> = backend.requests().into_iter().map(|r| r.file_name).collect();
    assert_eq!(names, vec!["f0.txt", "f1.txt", "f2.txt", "g.txt"]);
}

#[tokio::test]
async fn test_cancel_during_existence_check() {
    let backend = Arc::new(FakeBackend {
        existing: ["A".to_string()].into_iter().collect(),
        gated_names: ["A".to_string()].into_iter().collect(),
        ..Default::default()
    });
    let orch = orchestrator(&backend);

    let run = tokio::spawn({
        let orch = orch.clone();
        async move { orch.submit(selection(&["A/x.txt"]), "/").await }
    });
    wait_until(|| orch.phase() == UploadPhase::Selecting).await;

    orch.cancel();
    backend.exists_gate.notify_one();

    let outcome = run.await.unwrap().unwrap();
    assert!(matches!(outcome, RunOutcome::Cancelled));
    assert_eq!(orch.phase(), UploadPhase::Idle);
    assert!(backend.requests().is_empty());
}

#[tokio::test]
async fn test_cancel_twice_is_harmless() {
    let backend = Arc::new(FakeBackend::default());
    let orch = orchestrator(&backend);

    orch.cancel();
    orch.cancel();
    assert_eq!(orch.phase(), UploadPhase::Idle);
}

#[tokio::test]
async fn test_cancel_during_conflict() {
    let backend = Arc::new(FakeBackend::with_existing(&["A"]));
    let orch = orchestrator(&backend);

    orch.submit(selection(&["A/x.txt"]), "/").await.unwrap();
    orch.cancel();

    assert_eq!(orch.phase(), UploadPhase::Idle);
    assert!(orch.pending().is_none());
    let err = orch.resolve(ConflictAction::Merge).await.unwrap_err();
    assert!(matches!(err, UploadError::NoPendingConflict));
}

#[tokio::test]
async fn test_failure_stops_run_and_can_be_dismissed() {
    let backend = Arc::new(FakeBackend {
        fail_files: ["f1.txt".to_string()].into_iter().collect(),
        ..Default::default()
    });
    let orch = orchestrator(&backend);
    let mut rx = orch.subscribe();

    let outcome = orch.submit(flat(6), "/").await.unwrap();
    assert!(matches!(outcome, RunOutcome::Failed { ref message } if message.contains("disk full")));
    assert!(matches!(orch.phase(), UploadPhase::Error { .. }));
    // The failing batch settled, the next one never started.
    assert_eq!(backend.requests().len(), 3);
    assert!(orch.pending().is_some());
    assert!(drain(&mut rx).iter().any(|e| matches!(e, UploadEvent::Failed { .. })));

    assert!(orch.dismiss_error());
    assert_eq!(orch.phase(), UploadPhase::Idle);
    assert!(orch.pending().is_none());
    assert!(!orch.dismiss_error());
}

#[tokio::test]
async fn test_submit_while_uploading_is_busy() {
    let backend = Arc::new(FakeBackend {
        hang_files: ["f0.txt".to_string()].into_iter().collect(),
        ..Default::default()
    });
    let orch = orchestrator(&backend);

    let run = tokio::spawn({
        let orch = orch.clone();
        async move { orch.submit(flat(1), "/").await }
    });
    wait_until(|| backend.in_flight() == 1).await;

    let err = orch.submit(flat(1), "/").await.unwrap_err();
    assert!(matches!(err, UploadError::Busy));

    orch.cancel();
    assert!(matches!(run.await.unwrap().unwrap(), RunOutcome::Cancelled));
}

#[tokio::test]
async fn test_empty_selection_is_rejected() {
    let backend = Arc::new(FakeBackend::default());
    let orch = orchestrator(&backend);

    let err = orch.submit(PendingUpload::default(), "/").await.unwrap_err();
    assert!(matches!(err, UploadError::EmptySelection));
    assert_eq!(orch.phase(), UploadPhase::Idle);
}

#[tokio::test(start_paused = true)]
async fn test_success_reverts_to_idle() {
    let backend = Arc::new(FakeBackend::default());
    let orch = orchestrator(&backend);

    orch.submit(flat(1), "/").await.unwrap();
    assert_eq!(orch.phase(), UploadPhase::Success);

    tokio::time::sleep(Duration::from_millis(2900)).await;
    assert_eq!(orch.phase(), UploadPhase::Success);

    tokio::time::sleep(Duration::from_millis(200)).await;
    tokio::task::yield_now().await;
    assert_eq!(orch.phase(), UploadPhase::Idle);
}

#[tokio::test]
async fn test_detect_conflict_directly() {
    let backend = FakeBackend::with_existing(&["Album"]);

    let decision = detect_conflict(&backend, &selection(&["Album/a.jpg"]), "/").await;
    assert_eq!(decision.map(|d| d.folder_name).as_deref(), Some("Album"));

    assert!(detect_conflict(&backend, &selection(&["Other/a.jpg"]), "/").await.is_none());
    assert!(detect_conflict(&backend, &selection(&["a.jpg"]), "/").await.is_none());
}

#[tokio::test]
async fn test_zip_rename_sends_custom_name() {
    let backend = Arc::new(FakeBackend::with_existing(&["Photos"]));
    let orch = orchestrator(&backend);

    orch.submit(selection(&["Photos.zip"]), "/docs").await.unwrap();
    orch.rename("Photos 2024").await.unwrap();

    let requests = backend.requests();
    assert_eq!(requests[0].folder_path, "/docs");
    assert_eq!(requests[0].custom_name.as_deref(), Some("Photos 2024"));
    assert_eq!(requests[0].conflict_action, Some(ConflictAction::Rename));
}
