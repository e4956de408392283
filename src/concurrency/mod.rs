//! Cancellation and the bounded worker pool used by stack generation

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{mpsc, Arc, Mutex};

use crate::errors::{recover, EngineError, EngineResult};

/// Shared cancellation flag. Clones observe the same flag.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    cancelled: Arc<AtomicBool>,
}

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation of everything watching this token
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    /// Fail with [`EngineError::Cancelled`] once cancellation was requested
    pub fn check(&self) -> EngineResult<()> {
        if self.is_cancelled() {
            Err(EngineError::Cancelled)
        } else {
            Ok(())
        }
    }
}

/// First error reported by any worker; later errors are dropped
#[derive(Debug, Default)]
struct FirstError {
    failed: AtomicBool,
    error: Mutex<Option<EngineError>>,
}

impl FirstError {
    fn report(&self, error: EngineError) {
        let mut slot = self.error.lock().unwrap_or_else(|p| p.into_inner());
        if slot.is_none() {
            *slot = Some(error);
            self.failed.store(true, Ordering::SeqCst);
        }
    }

    fn has_failed(&self) -> bool {
        self.failed.load(Ordering::SeqCst)
    }

    fn take(self) -> Option<EngineError> {
        self.error.into_inner().unwrap_or_else(|p| p.into_inner())
    }
}

/// Runs jobs on at most `size` threads.
///
/// Jobs are handed out through a channel. Once a job fails or the token is
/// cancelled, workers stop picking up new jobs. A failure also cancels the
/// token, so jobs already running see it at their next check and any child
/// process they wait on is killed.
#[derive(Debug, Clone)]
pub struct WorkerPool {
    size: usize,
    cancel: CancellationToken,
}

impl WorkerPool {
    pub fn new(size: usize, cancel: CancellationToken) -> Self {
        Self {
            size: size.max(1),
            cancel,
        }
    }

    pub fn size(&self) -> usize {
        self.size
    }

    /// Run `job` for every item and wait for all of them. Returns the first
    /// error encountered, or [`EngineError::Cancelled`] if the token fired.
    pub fn run<T, F>(&self, items: Vec<T>, job: F) -> EngineResult<()>
    where
        T: Send,
        F: Fn(T) -> EngineResult<()> + Sync,
    {
        if items.is_empty() {
            return Ok(());
        }

        let workers = self.size.min(items.len());
        tracing::debug!(workers, jobs = items.len(), "starting worker pool");

        let (sender, receiver) = mpsc::channel();
        for item in items {
            // The receiver is alive until the end of this function
            let _ = sender.send(item);
        }
        drop(sender);

        let receiver = Mutex::new(receiver);
        let first_error = FirstError::default();

        std::thread::scope(|scope| {
            for _ in 0..workers {
                scope.spawn(|| loop {
                    if first_error.has_failed() || self.cancel.is_cancelled() {
                        break;
                    }
                    let next = {
                        let rx = receiver.lock().unwrap_or_else(|p| p.into_inner());
                        rx.recv()
                    };
                    let Ok(item) = next else {
                        break;
                    };
                    if let Err(err) = recover("running a worker job", || job(item)) {
                        first_error.report(err);
                        self.cancel.cancel();
                    }
                });
            }
        });

        if let Some(err) = first_error.take() {
            return Err(err);
        }
        self.cancel.check()
    }
}
