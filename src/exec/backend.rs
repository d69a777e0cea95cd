// src/exec/backend.rs

//! Pluggable process backend abstraction.
//!
//! - `ShellBackend` (in [`super::shell`]) is the implementation used in
//!   production.
//! - Tests provide their own `ProcessBackend` that scripts output lines,
//!   refuses to spawn selected commands, and exits on demand.

use std::ffi::OsString;
use std::fmt::Debug;
use std::future::Future;
use std::io;
use std::path::PathBuf;
use std::pin::Pin;
use std::sync::Arc;

use tokio::sync::mpsc;

use crate::types::{CommandId, ExitOutcome, LogStream};

/// Everything needed to launch one command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaunchSpec {
    pub command_id: CommandId,
    /// Shell text passed to the platform shell.
    pub command_line: String,
    /// Absolute, already checked to exist.
    pub working_dir: PathBuf,
    /// Variables set on top of the inherited environment.
    pub env: Vec<(String, OsString)>,
}

/// One decoded line of output, without its line terminator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputLine {
    pub stream: LogStream,
    pub line: String,
}

/// A line, or the read error that ended a stream.
pub type OutputMessage = io::Result<OutputLine>;

/// Resolves when the process has exited and been reaped.
pub type ExitFuture = Pin<Box<dyn Future<Output = io::Result<ExitOutcome>> + Send>>;

/// Signals a spawned process.
///
/// Both operations are idempotent: signalling a process that already
/// exited returns `Ok(())`.
pub trait ProcessControl: Send + Sync + Debug {
    /// Ask the process (and everything it spawned) to terminate.
    fn terminate(&self) -> io::Result<()>;

    /// Forcefully kill the process (and everything it spawned).
    fn kill(&self) -> io::Result<()>;
}

/// A launched process as seen by its supervisor.
pub struct SpawnedProcess {
    pub pid: Option<u32>,
    /// Closes once both output streams reached EOF.
    pub output: mpsc::Receiver<OutputMessage>,
    pub exit: ExitFuture,
    pub control: Arc<dyn ProcessControl>,
}

impl Debug for SpawnedProcess {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SpawnedProcess")
            .field("pid", &self.pid)
            .field("control", &self.control)
            .finish_non_exhaustive()
    }
}

/// Trait abstracting how commands are launched.
pub trait ProcessBackend: Send + Sync + Debug {
    /// Launch the command and return as soon as it is running.
    ///
    /// Failing to launch (missing shell, unusable directory, ...) is
    /// reported here, synchronously.
    fn spawn(&self, spec: &LaunchSpec) -> io::Result<SpawnedProcess>;
}
