// src/types.rs

use std::fmt;

use serde::{Deserialize, Serialize};

/// Identifier of a command definition.
pub type CommandId = String;

/// Identifier of a command group.
pub type GroupId = String;

/// Identifier of a project.
pub type ProjectId = String;

/// Run state of a command as seen by callers.
///
/// A command is `Running` exactly while a running instance exists for it in
/// the coordinator; it goes back to `Idle` when the process exits, whether
/// naturally, after a stop request, or because reading its output failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum CommandStatus {
    #[default]
    Idle,
    Running,
}

impl fmt::Display for CommandStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CommandStatus::Idle => f.write_str("idle"),
            CommandStatus::Running => f.write_str("running"),
        }
    }
}

/// Which pipe an output line came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LogStream {
    Stdout,
    Stderr,
}

/// How a running instance ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitOutcome {
    /// The process exited on its own with this code.
    Exited(i32),
    /// The process was terminated by a signal (stop request or external).
    Signalled,
    /// Supervision failed (output read error or wait error); the process was
    /// killed and the instance torn down.
    Aborted,
}

impl ExitOutcome {
    pub fn success(&self) -> bool {
        matches!(self, ExitOutcome::Exited(0))
    }
}

impl fmt::Display for ExitOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExitOutcome::Exited(code) => write!(f, "exited with code {code}"),
            ExitOutcome::Signalled => f.write_str("terminated by signal"),
            ExitOutcome::Aborted => f.write_str("aborted"),
        }
    }
}
