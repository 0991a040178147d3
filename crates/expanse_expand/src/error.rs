//! Error types for macro expansion.

use expanse_proc::{ProcMacroKind, WorkerError};
use serde::{Deserialize, Serialize};

/// Why the declarative expander could not produce an expansion.
///
/// All of these are deterministic functions of the definition and the call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, thiserror::Error)]
pub enum DeclMacroExpansionError {
    /// The macro rules do not parse.
    #[error("invalid macro definition: {0}")]
    DefSyntax(String),

    /// The call body does not form valid token trees.
    #[error("invalid macro call: {0}")]
    CallSyntax(String),

    /// No rule matched the call body.
    #[error("no rules expected this input: {0}")]
    Matching(String),

    /// The expansion grew past the configured size limit.
    #[error("macro expansion is larger than {limit} bytes")]
    TooLargeExpansion {
        /// The limit, in bytes.
        limit: usize,
    },

    /// Repetitions were nested deeper than the configured limit.
    #[error("macro repetitions nested deeper than {limit}")]
    DepthLimitExceeded {
        /// The depth limit.
        limit: usize,
    },
}

/// Why a procedural macro expansion failed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, thiserror::Error)]
pub enum ProcMacroExpansionError {
    /// The macro itself reported an error.
    #[error("{message}")]
    ServerSideError {
        /// The macro's message.
        message: String,
    },

    /// The helper did not answer in time.
    #[error("procedural macro expansion timed out after {timeout_ms} ms")]
    Timeout {
        /// The timeout that expired.
        timeout_ms: u64,
    },

    /// The helper process died during the request.
    #[error("procedural macro expander process exited unexpectedly (exit code {exit_code:?})")]
    ProcessAborted {
        /// Exit code, if any.
        exit_code: Option<i32>,
    },

    /// Communicating with the helper failed.
    #[error("I/O error while talking to the procedural macro expander: {message}")]
    IoExceptionThrown {
        /// Underlying error.
        message: String,
    },

    /// The helper exists but could not be started.
    #[error("can't run procedural macro expander: {message}")]
    CantRunExpander {
        /// Underlying error.
        message: String,
    },

    /// The helper executable is missing.
    #[error("procedural macro expander executable not found")]
    ExecutableNotFound,

    /// Procedural macro expansion is switched off.
    #[error("procedural macro expansion is disabled")]
    ProcMacroExpansionIsDisabled,

    /// The caller cancelled the request.
    #[error("procedural macro expansion was cancelled")]
    Cancelled,
}

impl From<WorkerError> for ProcMacroExpansionError {
    fn from(err: WorkerError) -> Self {
        match err {
            WorkerError::ServerSide(message) => ProcMacroExpansionError::ServerSideError { message },
            WorkerError::Timeout { timeout_ms } => ProcMacroExpansionError::Timeout { timeout_ms },
            WorkerError::ProcessAborted { exit_code } => {
                ProcMacroExpansionError::ProcessAborted { exit_code }
            }
            WorkerError::Io(message) => ProcMacroExpansionError::IoExceptionThrown { message },
            WorkerError::ExecutableNotFound(_) => ProcMacroExpansionError::ExecutableNotFound,
            WorkerError::CantRunExpander(message) => {
                ProcMacroExpansionError::CantRunExpander { message }
            }
            WorkerError::Cancelled => ProcMacroExpansionError::Cancelled,
        }
    }
}

/// An expansion failure from either backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, thiserror::Error)]
pub enum MacroExpansionError {
    /// Declarative expander failure.
    #[error(transparent)]
    Decl(#[from] DeclMacroExpansionError),
    /// Procedural expander failure.
    #[error(transparent)]
    Proc(#[from] ProcMacroExpansionError),
}

impl MacroExpansionError {
    /// Returns `true` if the error is a stable function of its inputs, so a
    /// stored copy is as good as recomputing.
    ///
    /// Declarative errors and errors reported by the macro itself are stable.
    /// Timeouts, crashes, I/O trouble, a missing or disabled helper, and
    /// cancellation depend on the machine and the moment.
    pub fn can_cache_error(&self) -> bool {
        match self {
            MacroExpansionError::Decl(_) => true,
            MacroExpansionError::Proc(err) => {
                matches!(err, ProcMacroExpansionError::ServerSideError { .. })
            }
        }
    }

    /// Returns `true` if the outcome may be written to the store at all.
    /// A cancelled request never produced an outcome.
    pub fn is_storable(&self) -> bool {
        !matches!(
            self,
            MacroExpansionError::Proc(ProcMacroExpansionError::Cancelled)
        )
    }
}

/// Why the expansion of a particular call could not be obtained.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GetMacroExpansionError {
    /// Macro expansion is switched off.
    #[error("macro expansion is disabled")]
    MacroExpansionIsDisabled,

    /// The call cannot be handed to this kind of macro.
    #[error("invalid macro call: {0}")]
    MacroCallSyntax(String),

    /// The definition could not be parsed.
    #[error("invalid macro definition: {0}")]
    MacroDefSyntax(String),

    /// No definition was found for the called name.
    #[error("unresolved macro `{0}`")]
    Unresolved(String),

    /// The procedural macro's library has not been built.
    #[error("procedural macro library for `{0}` is not built")]
    NoProcMacroArtifact(String),

    /// A procedural macro was invoked as a different kind than it declares.
    #[error("{def_kind} procedural macro invoked as {call_kind}")]
    UnmatchedProcMacroKind {
        /// How the call site invokes the macro.
        call_kind: ProcMacroKind,
        /// How the macro is declared.
        def_kind: ProcMacroKind,
    },

    /// The expander ran and failed.
    #[error(transparent)]
    ExpansionError(#[from] MacroExpansionError),
}

impl GetMacroExpansionError {
    /// A message fit for showing next to the call site.
    pub fn to_user_viewable_message(&self) -> String {
        match self {
            GetMacroExpansionError::MacroExpansionIsDisabled => {
                "macro expansion is disabled".to_string()
            }
            GetMacroExpansionError::MacroCallSyntax(msg) => {
                format!("there is an error in the macro call syntax: {msg}")
            }
            GetMacroExpansionError::MacroDefSyntax(msg) => {
                format!("there is an error in the macro definition syntax: {msg}")
            }
            GetMacroExpansionError::Unresolved(name) => {
                format!("macro `{name}` can't be resolved")
            }
            GetMacroExpansionError::NoProcMacroArtifact(name) => format!(
                "the procedural macro `{name}` is not compiled successfully"
            ),
            GetMacroExpansionError::UnmatchedProcMacroKind {
                call_kind,
                def_kind,
            } => format!(
                "`{def_kind}` procedural macro can't be called as `{call_kind}`"
            ),
            GetMacroExpansionError::ExpansionError(err) => match err {
                MacroExpansionError::Decl(DeclMacroExpansionError::Matching(msg)) => {
                    format!("can't expand the macro: no rule matched the input ({msg})")
                }
                MacroExpansionError::Decl(DeclMacroExpansionError::TooLargeExpansion { .. }) => {
                    "can't expand the macro: the expansion is too large".to_string()
                }
                MacroExpansionError::Decl(other) => format!("can't expand the macro: {other}"),
                MacroExpansionError::Proc(ProcMacroExpansionError::ServerSideError { message }) => {
                    format!("a procedural macro error occurred:\n{message}")
                }
                MacroExpansionError::Proc(ProcMacroExpansionError::ProcMacroExpansionIsDisabled) => {
                    "procedural macro expansion is disabled".to_string()
                }
                MacroExpansionError::Proc(ProcMacroExpansionError::ExecutableNotFound) => {
                    "the procedural macro expander executable is not found".to_string()
                }
                MacroExpansionError::Proc(other) => {
                    format!("procedural macro expansion failed: {other}")
                }
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deterministic_errors_are_cacheable() {
        let decl: MacroExpansionError = DeclMacroExpansionError::Matching("x".to_string()).into();
        assert!(decl.can_cache_error());
        let server: MacroExpansionError = ProcMacroExpansionError::ServerSideError {
            message: "boom".to_string(),
        }
        .into();
        assert!(server.can_cache_error());
    }

    #[test]
    fn transient_errors_are_not_cacheable() {
        for err in [
            ProcMacroExpansionError::Timeout { timeout_ms: 10 },
            ProcMacroExpansionError::ProcessAborted { exit_code: None },
            ProcMacroExpansionError::IoExceptionThrown {
                message: "pipe".to_string(),
            },
            ProcMacroExpansionError::CantRunExpander {
                message: "denied".to_string(),
            },
            ProcMacroExpansionError::ExecutableNotFound,
            ProcMacroExpansionError::ProcMacroExpansionIsDisabled,
            ProcMacroExpansionError::Cancelled,
        ] {
            assert!(!MacroExpansionError::from(err).can_cache_error());
        }
    }

    #[test]
    fn only_cancellation_is_unstorable() {
        assert!(!MacroExpansionError::from(ProcMacroExpansionError::Cancelled).is_storable());
        assert!(
            MacroExpansionError::from(ProcMacroExpansionError::Timeout { timeout_ms: 1 })
                .is_storable()
        );
    }

    #[test]
    fn worker_errors_map_one_to_one() {
        assert_eq!(
            ProcMacroExpansionError::from(WorkerError::Timeout { timeout_ms: 5 }),
            ProcMacroExpansionError::Timeout { timeout_ms: 5 }
        );
        assert_eq!(
            ProcMacroExpansionError::from(WorkerError::ExecutableNotFound("x".to_string())),
            ProcMacroExpansionError::ExecutableNotFound
        );
        assert_eq!(
            ProcMacroExpansionError::from(WorkerError::ServerSide("bad".to_string())),
            ProcMacroExpansionError::ServerSideError {
                message: "bad".to_string()
            }
        );
    }

    #[test]
    fn user_messages() {
        let err = GetMacroExpansionError::UnmatchedProcMacroKind {
            call_kind: ProcMacroKind::FunctionLike,
            def_kind: ProcMacroKind::Derive,
        };
        assert_eq!(
            err.to_user_viewable_message(),
            "`derive` procedural macro can't be called as `function-like`"
        );
        let err = GetMacroExpansionError::from(MacroExpansionError::from(
            ProcMacroExpansionError::ServerSideError {
                message: "oops".to_string(),
            },
        ));
        assert!(err.to_user_viewable_message().ends_with("oops"));
        assert_eq!(
            GetMacroExpansionError::MacroExpansionIsDisabled.to_user_viewable_message(),
            "macro expansion is disabled"
        );
    }
}
