//! Execution environments and the command line used to start a helper.

use std::path::PathBuf;
use std::process::{Command, Stdio};

/// Where helper processes run. Each environment gets its own worker pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ExecutionEnvironment {
    /// Directly on this machine.
    Local,
    /// Through a launcher command (a VM, container, or remote host).
    Remote,
}

impl std::fmt::Display for ExecutionEnvironment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ExecutionEnvironment::Local => f.write_str("local"),
            ExecutionEnvironment::Remote => f.write_str("remote"),
        }
    }
}

/// Fully resolved command line for starting one helper process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HelperCommand {
    /// Launcher prefix; empty for local execution.
    pub launcher: Vec<String>,
    /// The helper executable.
    pub program: PathBuf,
    /// Arguments passed to the helper.
    pub args: Vec<String>,
}

impl HelperCommand {
    /// A command that runs `program` directly.
    pub fn local(program: impl Into<PathBuf>, args: Vec<String>) -> Self {
        Self {
            launcher: Vec::new(),
            program: program.into(),
            args,
        }
    }

    /// A command that runs `program` through `launcher`.
    pub fn remote(launcher: Vec<String>, program: impl Into<PathBuf>, args: Vec<String>) -> Self {
        Self {
            launcher,
            program: program.into(),
            args,
        }
    }

    /// Returns `false` only when the helper is known to be missing.
    ///
    /// Through a launcher the program lives on another system and cannot be
    /// checked from here.
    pub fn is_available(&self) -> bool {
        !self.launcher.is_empty() || self.program.is_file()
    }

    /// Builds a [`Command`] with piped stdin/stdout and discarded stderr.
    pub fn to_command(&self) -> Command {
        let mut cmd = match self.launcher.split_first() {
            Some((first, rest)) => {
                let mut cmd = Command::new(first);
                cmd.args(rest).arg(&self.program);
                cmd
            }
            None => Command::new(&self.program),
        };
        cmd.args(&self.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::null());
        cmd
    }
}
