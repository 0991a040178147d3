//! Out-of-process procedural macro expansion.
//!
//! Procedural macros run in long-lived helper processes so that a crashing or
//! hanging macro cannot take the host down. This crate owns the framed wire
//! protocol, single [`Worker`] processes, the per-environment
//! [`ProcMacroServerPool`], the process-wide [`ProcMacroApplicationService`],
//! and the helper-side [`serve`] loop.

#![warn(missing_docs)]

pub mod cancel;
pub mod environment;
pub mod error;
pub mod pool;
pub mod protocol;
pub mod serve;
pub mod service;
pub mod worker;

pub use cancel::CancellationToken;
pub use environment::{ExecutionEnvironment, HelperCommand};
pub use error::WorkerError;
pub use pool::ProcMacroServerPool;
pub use protocol::{ExpansionTask, ProcMacroKind};
pub use serve::serve;
pub use service::{PoolUnavailable, ProcMacroApplicationService};
pub use worker::Worker;
