// src/engine/supervisor.rs

//! Per-instance supervision loop.
//!
//! One supervisor task runs for every started command. It:
//! - forwards output lines to the pattern watcher and the log multiplexer
//! - arms the SIGKILL deadline once a stop was requested
//! - kills the process if its output can no longer be read
//! - returns the final [`ExitOutcome`] once the process exited and its
//!   output was drained (bounded by `drain_timeout`)
//! - terminates, then kills, whatever the shell left behind holding the
//!   output open
//!
//! Publishing `ProcessFinished` and deregistering the instance is left to
//! the coordinator, which owns the instance table.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Notify;
use tokio::time::{Instant, sleep_until};
use tracing::{debug, info, trace, warn};

use crate::events::EventBus;
use crate::exec::{OutputLine, ProcessControl, SpawnedProcess};
use crate::logs::LogMultiplexer;
use crate::types::{CommandId, ExitOutcome};
use crate::watch::PatternWatcher;

/// Everything a supervisor needs for one running instance.
pub(crate) struct SupervisedRun {
    pub command_id: CommandId,
    pub run_id: u64,
    pub process: SpawnedProcess,
    pub watcher: PatternWatcher,
    pub mux: LogMultiplexer,
    pub bus: EventBus,
    pub stop: Arc<Notify>,
    pub stop_grace: Duration,
    pub drain_timeout: Duration,
}

pub(crate) async fn supervise(run: SupervisedRun) -> ExitOutcome {
    let SupervisedRun {
        command_id,
        run_id,
        process,
        watcher,
        mux,
        bus,
        stop,
        stop_grace,
        drain_timeout,
    } = run;
    let SpawnedProcess {
        mut output,
        mut exit,
        control,
        ..
    } = process;

    let sink = LineSink {
        command_id: &command_id,
        watcher: &watcher,
        mux: &mux,
        bus: &bus,
    };

    let mut output_open = true;
    let mut aborted = false;
    let mut kill_deadline: Option<Instant> = None;
    let mut killed = false;

    let outcome = loop {
        tokio::select! {
            msg = output.recv(), if output_open => match msg {
                Some(Ok(line)) => sink.accept(line),
                Some(Err(e)) => {
                    warn!(command = %command_id, run_id, error = %e, "output read failed; killing process");
                    aborted = true;
                    force_kill(&*control, &command_id, run_id);
                    killed = true;
                }
                None => output_open = false,
            },

            res = &mut exit => {
                break match res {
                    Ok(_) if aborted => ExitOutcome::Aborted,
                    Ok(outcome) => outcome,
                    Err(e) => {
                        warn!(command = %command_id, run_id, error = %e, "waiting for process failed");
                        force_kill(&*control, &command_id, run_id);
                        ExitOutcome::Aborted
                    }
                };
            }

            _ = stop.notified(), if kill_deadline.is_none() => {
                debug!(command = %command_id, run_id, grace = ?stop_grace, "stop requested; arming kill deadline");
                kill_deadline = Some(Instant::now() + stop_grace);
            }

            _ = sleep_until(kill_deadline.unwrap_or_else(Instant::now)), if kill_deadline.is_some() && !killed => {
                info!(command = %command_id, run_id, "grace period elapsed; killing process");
                force_kill(&*control, &command_id, run_id);
                killed = true;
            }
        }
    };

    // Processes the shell left behind may still hold the pipes open. They
    // belong to the instance: drain them briefly, then stop the group.
    let (mut phase, mut deadline) = match kill_deadline {
        Some(_) if killed => (Leftovers::Terminating, Instant::now() + drain_timeout),
        Some(at) => (Leftovers::Terminating, at),
        None => (Leftovers::Draining, Instant::now() + drain_timeout),
    };
    while output_open {
        tokio::select! {
            msg = output.recv() => match msg {
                Some(Ok(line)) => sink.accept(line),
                Some(Err(_)) => {}
                None => output_open = false,
            },

            // The coordinator already signalled the group.
            _ = stop.notified(), if phase == Leftovers::Draining => {
                phase = Leftovers::Terminating;
                deadline = Instant::now() + stop_grace;
            }

            _ = sleep_until(deadline) => match phase {
                Leftovers::Draining => {
                    debug!(command = %command_id, run_id, "output still open after exit; terminating leftover processes");
                    if let Err(e) = control.terminate() {
                        warn!(command = %command_id, run_id, error = %e, "failed to terminate leftover processes");
                    }
                    phase = Leftovers::Terminating;
                    deadline = Instant::now() + stop_grace;
                }
                Leftovers::Terminating => {
                    info!(command = %command_id, run_id, "leftover processes still running; killing process group");
                    force_kill(&*control, &command_id, run_id);
                    break;
                }
            },
        }
    }

    outcome
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Leftovers {
    Draining,
    Terminating,
}

struct LineSink<'a> {
    command_id: &'a str,
    watcher: &'a PatternWatcher,
    mux: &'a LogMultiplexer,
    bus: &'a EventBus,
}

impl LineSink<'_> {
    fn accept(&self, line: OutputLine) {
        trace!(command = %self.command_id, stream = ?line.stream, "{}", line.line);
        if let Some(event) = self.watcher.check(&line.line) {
            self.bus.publish(event);
        }
        self.mux.append(self.command_id, line.line);
    }
}

fn force_kill(control: &dyn ProcessControl, command_id: &str, run_id: u64) {
    if let Err(e) = control.kill() {
        warn!(command = %command_id, run_id, error = %e, "failed to kill process");
    }
}
