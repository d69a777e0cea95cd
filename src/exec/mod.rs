// src/exec/mod.rs

//! Process execution layer.
//!
//! This module is responsible for actually launching command processes and
//! exposing their output and exit to the coordinator.
//!
//! - [`backend`] provides the `ProcessBackend` trait and the types a spawned
//!   process is described with. The coordinator only talks to this trait, so
//!   tests can swap in a fake implementation.
//! - [`shell`] is the production backend: the platform shell through
//!   `tokio::process`, piped output, its own process group on Unix.
//! - [`env`] resolves working directories and the merged `PATH`.

pub mod backend;
pub mod env;
pub mod shell;

pub use backend::{
    ExitFuture, LaunchSpec, OutputLine, OutputMessage, ProcessBackend, ProcessControl,
    SpawnedProcess,
};
pub use shell::ShellBackend;
