//! Error types for procedural macro workers.

/// Why a request to an out-of-process expansion worker failed.
///
/// Every variant except [`WorkerError::ServerSide`] describes a failure of
/// the transport or the process rather than of the macro itself, so a later
/// request with the same input may well succeed.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum WorkerError {
    /// The worker ran the macro and reported an error.
    #[error("procedural macro error: {0}")]
    ServerSide(String),

    /// No response arrived within the configured wall-clock timeout.
    #[error("expansion timed out after {timeout_ms} ms")]
    Timeout {
        /// The timeout that expired, in milliseconds.
        timeout_ms: u64,
    },

    /// The worker process exited while a request was in flight.
    #[error("worker process exited unexpectedly (exit code {exit_code:?})")]
    ProcessAborted {
        /// Exit code, if the process exited normally.
        exit_code: Option<i32>,
    },

    /// Reading from or writing to the worker failed.
    #[error("worker I/O failure: {0}")]
    Io(String),

    /// The helper executable does not exist.
    #[error("helper executable not found: {0}")]
    ExecutableNotFound(String),

    /// The helper executable exists but could not be started.
    #[error("failed to start helper process: {0}")]
    CantRunExpander(String),

    /// The caller abandoned the request.
    #[error("expansion request was cancelled")]
    Cancelled,
}
