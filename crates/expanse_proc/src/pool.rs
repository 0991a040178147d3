//! A fixed-size pool of helper processes for one execution environment.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use parking_lot::{Mutex, MutexGuard};

use crate::cancel::CancellationToken;
use crate::environment::{ExecutionEnvironment, HelperCommand};
use crate::error::WorkerError;
use crate::worker::Worker;

/// Long-lived expansion workers sharing one helper command line.
///
/// Workers are started lazily, one slot at a time, and restarted on the next
/// request after they crash. A request holds its slot for its whole
/// duration; concurrent requests spread over the free slots.
pub struct ProcMacroServerPool {
    environment: ExecutionEnvironment,
    command: HelperCommand,
    timeout: Duration,
    slots: Vec<Mutex<Option<Worker>>>,
    next: AtomicUsize,
}

impl ProcMacroServerPool {
    /// Creates a pool, or returns `None` if the helper executable is missing.
    ///
    /// No process is started until the first request.
    pub fn try_create(
        environment: ExecutionEnvironment,
        command: HelperCommand,
        timeout: Duration,
        size: usize,
    ) -> Option<Self> {
        if !command.is_available() {
            tracing::warn!(
                program = %command.program.display(),
                %environment,
                "proc macro helper executable not found"
            );
            return None;
        }
        let size = size.max(1);
        tracing::debug!(%environment, size, "created proc macro worker pool");
        Some(Self {
            environment,
            command,
            timeout,
            slots: (0..size).map(|_| Mutex::new(None)).collect(),
            next: AtomicUsize::new(0),
        })
    }

    /// The environment this pool's workers run in.
    pub fn environment(&self) -> ExecutionEnvironment {
        self.environment
    }

    /// The per-request timeout.
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Number of slots.
    pub fn size(&self) -> usize {
        self.slots.len()
    }

    /// Number of slots currently holding a started worker.
    pub fn live_workers(&self) -> usize {
        self.slots
            .iter()
            .filter_map(|slot| slot.try_lock())
            .filter(|guard| guard.is_some())
            .count()
    }

    /// Sends a serialized call to a worker and returns the serialized result.
    pub fn expand(&self, payload: &[u8]) -> Result<Vec<u8>, WorkerError> {
        self.expand_cancellable(payload, &CancellationToken::new())
    }

    /// Like [`expand`](Self::expand), but gives up as soon as `cancel` is set.
    pub fn expand_cancellable(
        &self,
        payload: &[u8],
        cancel: &CancellationToken,
    ) -> Result<Vec<u8>, WorkerError> {
        let mut slot = self.acquire_slot();

        if slot.as_mut().is_some_and(|w| !w.is_alive()) {
            tracing::debug!(environment = %self.environment, "replacing dead proc macro worker");
            *slot = None;
        }
        let worker = match slot.take() {
            Some(worker) => worker,
            None => Worker::spawn(&self.command)?,
        };
        let worker = slot.insert(worker);

        let result = worker.request(payload, self.timeout, cancel);
        if let Err(err) = &result {
            match err {
                WorkerError::ProcessAborted { .. } | WorkerError::Io(_) => {
                    tracing::warn!(environment = %self.environment, error = %err, "proc macro worker failed");
                    *slot = None;
                }
                // The worker is still busy with the abandoned request.
                WorkerError::Timeout { .. } | WorkerError::Cancelled => {
                    tracing::debug!(environment = %self.environment, error = %err, "discarding proc macro worker");
                    *slot = None;
                }
                WorkerError::ServerSide(_)
                | WorkerError::ExecutableNotFound(_)
                | WorkerError::CantRunExpander(_) => {}
            }
        }
        result
    }

    /// Stops every worker. Later requests start fresh processes.
    pub fn shutdown(&self) {
        for slot in &self.slots {
            slot.lock().take();
        }
    }

    fn acquire_slot(&self) -> MutexGuard<'_, Option<Worker>> {
        let start = self.next.fetch_add(1, Ordering::Relaxed);
        let len = self.slots.len();
        for offset in 0..len {
            if let Some(guard) = self.slots[(start + offset) % len].try_lock() {
                return guard;
            }
        }
        self.slots[start % len].lock()
    }
}

impl Drop for ProcMacroServerPool {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_helper_yields_no_pool() {
        let command = HelperCommand::local("/no/such/helper-binary", vec![]);
        let pool = ProcMacroServerPool::try_create(
            ExecutionEnvironment::Local,
            command,
            Duration::from_secs(1),
            2,
        );
        assert!(pool.is_none());
    }

    #[cfg(unix)]
    #[test]
    fn crashed_worker_is_replaced() {
        let command = HelperCommand::local("/bin/sh", vec!["-c".to_string(), "exit 3".to_string()]);
        let pool = ProcMacroServerPool::try_create(
            ExecutionEnvironment::Local,
            command,
            Duration::from_secs(5),
            1,
        )
        .unwrap();
        assert_eq!(pool.live_workers(), 0);

        for _ in 0..2 {
            let err = pool.expand(b"payload").unwrap_err();
            assert!(matches!(
                err,
                WorkerError::ProcessAborted { .. } | WorkerError::Io(_)
            ));
            assert_eq!(pool.live_workers(), 0);
        }
    }

    #[cfg(unix)]
    #[test]
    fn timed_out_worker_is_discarded() {
        let command = HelperCommand::local(
            "/bin/sh",
            vec!["-c".to_string(), "cat > /dev/null".to_string()],
        );
        let pool = ProcMacroServerPool::try_create(
            ExecutionEnvironment::Local,
            command,
            Duration::from_millis(50),
            1,
        )
        .unwrap();
        for _ in 0..2 {
            let err = pool.expand(b"payload").unwrap_err();
            assert_eq!(err, WorkerError::Timeout { timeout_ms: 50 });
            assert_eq!(pool.live_workers(), 0);
        }
    }

    #[cfg(unix)]
    #[test]
    fn cancelled_worker_is_discarded() {
        let command = HelperCommand::local(
            "/bin/sh",
            vec!["-c".to_string(), "cat > /dev/null".to_string()],
        );
        let pool = ProcMacroServerPool::try_create(
            ExecutionEnvironment::Local,
            command,
            Duration::from_secs(5),
            1,
        )
        .unwrap();
        let cancel = CancellationToken::new();
        cancel.cancel();
        let err = pool.expand_cancellable(b"payload", &cancel).unwrap_err();
        assert_eq!(err, WorkerError::Cancelled);
        assert_eq!(pool.live_workers(), 0);
    }

    #[test]
    fn size_is_at_least_one() {
        let exe = std::env::current_exe().unwrap();
        let pool = ProcMacroServerPool::try_create(
            ExecutionEnvironment::Local,
            HelperCommand::local(exe, vec![]),
            Duration::from_secs(1),
            0,
        )
        .unwrap();
        assert_eq!(pool.size(), 1);
        assert_eq!(pool.environment(), ExecutionEnvironment::Local);
    }
}
