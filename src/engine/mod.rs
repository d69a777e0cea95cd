// src/engine/mod.rs

//! Execution engine.
//!
//! This module ties together:
//! - the command registry (what can be run)
//! - the process backend (how it is launched)
//! - per-instance supervision (output, error patterns, stop escalation)
//! - group fan-out
//!
//! The public surface is [`ExecutionCoordinator`]; [`supervisor`] holds the
//! per-instance loop and [`group`] the fan-out report type.

pub mod coordinator;
pub mod group;
pub mod supervisor;

use std::time::Duration;

pub use coordinator::{ExecutionCoordinator, SharedRegistry};
pub use group::GroupReport;

/// How long a stopped command gets between SIGTERM and SIGKILL.
pub const DEFAULT_STOP_GRACE: Duration = Duration::from_secs(3);

/// How long output is still read after the shell itself exited.
pub const DEFAULT_DRAIN_TIMEOUT: Duration = Duration::from_millis(500);

/// Timing knobs for running instances.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CoordinatorOptions {
    pub stop_grace: Duration,
    pub drain_timeout: Duration,
}

impl Default for CoordinatorOptions {
    fn default() -> Self {
        Self {
            stop_grace: DEFAULT_STOP_GRACE,
            drain_timeout: DEFAULT_DRAIN_TIMEOUT,
        }
    }
}
