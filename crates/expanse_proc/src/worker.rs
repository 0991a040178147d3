//! A single long-lived helper process.
//!
//! Requests are written to the child's stdin; a reader thread forwards every
//! response frame from its stdout into a channel. The waiting side matches
//! responses by id, so an answer to a request that timed out or was
//! cancelled is silently dropped when it eventually arrives.

use std::io::{self, BufReader, BufWriter};
use std::process::{Child, ChildStdin};
use std::thread;
use std::time::{Duration, Instant};

use crossbeam::channel::{self, Receiver, RecvTimeoutError};

use crate::cancel::CancellationToken;
use crate::environment::HelperCommand;
use crate::error::WorkerError;
use crate::protocol::{read_frame, write_frame, RequestFrame, ResponseBody, ResponseFrame};

/// How often a waiting request re-checks its cancellation token.
const POLL_INTERVAL: Duration = Duration::from_millis(25);

/// How long to wait for an exit status after the child closed its output.
const EXIT_GRACE: Duration = Duration::from_millis(200);

/// A running helper process and its response channel.
pub struct Worker {
    child: Child,
    stdin: BufWriter<ChildStdin>,
    responses: Receiver<ResponseFrame>,
    next_id: u64,
}

impl Worker {
    /// Starts a helper process.
    ///
    /// A missing executable is reported as [`WorkerError::ExecutableNotFound`];
    /// any other failure to start as [`WorkerError::CantRunExpander`].
    pub fn spawn(command: &HelperCommand) -> Result<Self, WorkerError> {
        if !command.is_available() {
            return Err(WorkerError::ExecutableNotFound(
                command.program.display().to_string(),
            ));
        }

        let mut child = command.to_command().spawn().map_err(|e| {
            if e.kind() == io::ErrorKind::NotFound {
                WorkerError::ExecutableNotFound(command.program.display().to_string())
            } else {
                WorkerError::CantRunExpander(e.to_string())
            }
        })?;

        let (stdin, stdout) = match (child.stdin.take(), child.stdout.take()) {
            (Some(stdin), Some(stdout)) => (stdin, stdout),
            _ => {
                let _ = child.kill();
                let _ = child.wait();
                return Err(WorkerError::CantRunExpander(
                    "helper stdio was not captured".to_string(),
                ));
            }
        };

        let (tx, rx) = channel::unbounded();
        let reader = thread::Builder::new()
            .name("expanse-proc-reader".to_string())
            .spawn(move || {
                let mut stdout = BufReader::new(stdout);
                loop {
                    match read_frame::<_, ResponseFrame>(&mut stdout) {
                        Ok(Some(frame)) => {
                            if tx.send(frame).is_err() {
                                break;
                            }
                        }
                        Ok(None) => break,
                        Err(e) => {
                            tracing::debug!(error = %e, "worker output stream failed");
                            break;
                        }
                    }
                }
            });
        if let Err(e) = reader {
            let _ = child.kill();
            let _ = child.wait();
            return Err(WorkerError::CantRunExpander(e.to_string()));
        }

        tracing::debug!(pid = child.id(), program = %command.program.display(), "started proc macro worker");

        Ok(Self {
            child,
            stdin: BufWriter::new(stdin),
            responses: rx,
            next_id: 0,
        })
    }

    /// Sends one request and waits for its response.
    ///
    /// Any error other than [`WorkerError::ServerSide`] leaves the worker
    /// unusable: after a timeout or cancellation it may still be busy with
    /// the abandoned request.
    pub fn request(
        &mut self,
        payload: &[u8],
        timeout: Duration,
        cancel: &CancellationToken,
    ) -> Result<Vec<u8>, WorkerError> {
        let id = self.next_id;
        self.next_id += 1;

        let frame = RequestFrame {
            id,
            payload: payload.to_vec(),
        };
        if let Err(e) = write_frame(&mut self.stdin, &frame) {
            return Err(match self.exit_status() {
                Some(err) => err,
                None => WorkerError::Io(e.to_string()),
            });
        }

        let deadline = Instant::now() + timeout;
        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return Err(WorkerError::Timeout {
                    timeout_ms: u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX),
                });
            }
            if cancel.is_cancelled() {
                return Err(WorkerError::Cancelled);
            }

            match self.responses.recv_timeout(remaining.min(POLL_INTERVAL)) {
                Ok(frame) if frame.id == id => {
                    return match frame.body {
                        ResponseBody::Ok(bytes) => Ok(bytes),
                        ResponseBody::Err(message) => Err(WorkerError::ServerSide(message)),
                    };
                }
                Ok(stale) => {
                    tracing::trace!(id = stale.id, "dropping response to abandoned request");
                }
                Err(RecvTimeoutError::Timeout) => {}
                Err(RecvTimeoutError::Disconnected) => {
                    return Err(self.exit_status().unwrap_or_else(|| {
                        WorkerError::Io("worker closed its output stream".to_string())
                    }));
                }
            }
        }
    }

    /// Returns `true` if the process has not exited.
    pub fn is_alive(&mut self) -> bool {
        matches!(self.child.try_wait(), Ok(None))
    }

    /// Waits briefly for the child to exit and reports how it ended.
    fn exit_status(&mut self) -> Option<WorkerError> {
        let deadline = Instant::now() + EXIT_GRACE;
        loop {
            match self.child.try_wait() {
                Ok(Some(status)) => {
                    return Some(WorkerError::ProcessAborted {
                        exit_code: status.code(),
                    })
                }
                Ok(None) if Instant::now() < deadline => thread::sleep(Duration::from_millis(5)),
                Ok(None) => return None,
                Err(e) => return Some(WorkerError::Io(e.to_string())),
            }
        }
    }
}

impl Drop for Worker {
    fn drop(&mut self) {
        if let Ok(None) = self.child.try_wait() {
            let _ = self.child.kill();
        }
        let _ = self.child.wait();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_executable_is_reported() {
        let command = HelperCommand::local("/no/such/helper-binary", vec![]);
        match Worker::spawn(&command) {
            Err(WorkerError::ExecutableNotFound(path)) => {
                assert!(path.contains("helper-binary"));
            }
            Err(other) => panic!("unexpected error: {other}"),
            Ok(_) => panic!("spawn should fail"),
        }
    }

    #[cfg(unix)]
    #[test]
    fn helper_that_exits_is_aborted() {
        let command = HelperCommand::local("/bin/sh", vec!["-c".to_string(), "exit 7".to_string()]);
        let mut worker = Worker::spawn(&command).unwrap();
        let err = worker
            .request(b"x", Duration::from_secs(5), &CancellationToken::new())
            .unwrap_err();
        assert!(
            matches!(
                err,
                WorkerError::ProcessAborted { exit_code: Some(7) } | WorkerError::Io(_)
            ),
            "unexpected error: {err:?}"
        );
        assert!(!worker.is_alive());
    }

    #[cfg(unix)]
    #[test]
    fn silent_helper_times_out_and_stays_alive() {
        // `cat > /dev/null` reads requests forever and never answers.
        let command = HelperCommand::local(
            "/bin/sh",
            vec!["-c".to_string(), "cat > /dev/null".to_string()],
        );
        let mut worker = Worker::spawn(&command).unwrap();
        let err = worker
            .request(b"x", Duration::from_millis(100), &CancellationToken::new())
            .unwrap_err();
        assert_eq!(err, WorkerError::Timeout { timeout_ms: 100 });
        assert!(worker.is_alive());
    }

    #[cfg(unix)]
    #[test]
    fn cancelled_request_returns_promptly() {
        let command = HelperCommand::local(
            "/bin/sh",
            vec!["-c".to_string(), "cat > /dev/null".to_string()],
        );
        let mut worker = Worker::spawn(&command).unwrap();
        let token = CancellationToken::new();
        token.cancel();
        let started = Instant::now();
        let err = worker
            .request(b"x", Duration::from_secs(30), &token)
            .unwrap_err();
        assert_eq!(err, WorkerError::Cancelled);
        assert!(started.elapsed() < Duration::from_secs(5));
        assert!(worker.is_alive());
    }
}
