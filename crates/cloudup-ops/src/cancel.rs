//! Cancellation of every in-flight transfer at once.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio_util::sync::CancellationToken;

use crate::transport::TransferSignal;

#[derive(Debug, Default)]
struct ControllerInner {
    cancelled: AtomicBool,
    next_id: AtomicU64,
    handles: Mutex<HashMap<u64, CancellationToken>>,
}

/// Tracks the abort handles of in-flight transfers and cancels them together.
///
/// One controller covers one run; once cancelled it stays cancelled. The
/// flag is checked before each batch starts and inside every progress
/// report. Cloning shares the same state.
#[derive(Debug, Clone, Default)]
pub struct CancellationController {
    inner: Arc<ControllerInner>,
}

impl CancellationController {
    pub fn new() -> Self {
        Self::default()
    }

    fn handles(&self) -> MutexGuard<'_, HashMap<u64, CancellationToken>> {
        self.inner
            .handles
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Whether the run was cancelled.
    pub fn is_cancelled(&self) -> bool {
        self.inner.cancelled.load(Ordering::SeqCst)
    }

    /// Register a transfer and hand back its abort handle.
    ///
    /// Registering after cancellation yields an already-aborted handle.
    pub fn register(&self) -> TransferSignal {
        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed) + 1;
        let token = CancellationToken::new();
        let mut handles = self.handles();
        if self.is_cancelled() {
            token.cancel();
        } else {
            handles.insert(id, token.clone());
        }
        TransferSignal::new(id, token)
    }

    /// Forget a transfer that has settled.
    pub fn release(&self, signal: &TransferSignal) {
        self.handles().remove(&signal.id);
    }

    /// Number of registered transfers not yet settled.
    pub fn in_flight(&self) -> usize {
        self.handles().len()
    }

    /// Set the flag and abort every outstanding transfer exactly once.
    ///
    /// Returns how many transfers were aborted. Calling this with nothing in
    /// flight only sets the flag.
    pub fn cancel(&self) -> usize {
        let drained: Vec<_> = {
            let mut handles = self.handles();
            self.inner.cancelled.store(true, Ordering::SeqCst);
            handles.drain().map(|(_, token)| token).collect()
        };

        for token in &drained {
            token.cancel();
        }
        drained.len()
    }
}
