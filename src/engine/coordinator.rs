// src/engine/coordinator.rs

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

use parking_lot::{Mutex, RwLock};
use tokio::sync::{Notify, watch};
use tracing::{debug, info, warn};

use crate::engine::CoordinatorOptions;
use crate::engine::group::{GroupReport, fan_out};
use crate::engine::supervisor::{SupervisedRun, supervise};
use crate::errors::{GomanderError, Result};
use crate::events::{Event, EventBus};
use crate::exec::{ProcessBackend, ProcessControl, env};
use crate::logs::LogMultiplexer;
use crate::registry::{Command, CommandGroup, CommandRegistry};
use crate::types::{CommandId, CommandStatus, ExitOutcome};
use crate::watch::PatternWatcher;

/// The open project's registry, shared between the coordinator and the
/// application facade.
pub type SharedRegistry = Arc<Mutex<CommandRegistry>>;

struct RunningInstance {
    run_id: u64,
    pid: Option<u32>,
    started_at: Instant,
    control: Arc<dyn ProcessControl>,
    stop: Arc<Notify>,
    stopping: bool,
}

impl fmt::Debug for RunningInstance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RunningInstance")
            .field("run_id", &self.run_id)
            .field("pid", &self.pid)
            .field("started_at", &self.started_at)
            .field("stopping", &self.stopping)
            .finish_non_exhaustive()
    }
}

/// Snapshot of a running instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InstanceInfo {
    pub run_id: u64,
    pub pid: Option<u32>,
    pub started_at: Instant,
    pub stopping: bool,
}

#[derive(Debug)]
struct Inner {
    registry: SharedRegistry,
    // Lock order: `running` before `registry`.
    running: Mutex<HashMap<CommandId, RunningInstance>>,
    running_count: watch::Sender<usize>,
    backend: Arc<dyn ProcessBackend>,
    mux: LogMultiplexer,
    bus: EventBus,
    extra_paths: RwLock<Vec<String>>,
    options: CoordinatorOptions,
    next_run_id: AtomicU64,
}

/// Starts, stops and tracks the processes of one open project.
///
/// At most one instance exists per command id. Every successful start is
/// followed by exactly one `ProcessFinished` event, published after the
/// instance's remaining output was flushed and after its status went back
/// to idle.
#[derive(Debug, Clone)]
pub struct ExecutionCoordinator {
    inner: Arc<Inner>,
}

impl ExecutionCoordinator {
    pub fn new(
        registry: SharedRegistry,
        backend: Arc<dyn ProcessBackend>,
        mux: LogMultiplexer,
        bus: EventBus,
        options: CoordinatorOptions,
    ) -> Self {
        let (running_count, _) = watch::channel(0);
        Self {
            inner: Arc::new(Inner {
                registry,
                running: Mutex::new(HashMap::new()),
                running_count,
                backend,
                mux,
                bus,
                extra_paths: RwLock::new(Vec::new()),
                options,
                next_run_id: AtomicU64::new(1),
            }),
        }
    }

    pub fn registry(&self) -> &SharedRegistry {
        &self.inner.registry
    }

    pub fn options(&self) -> CoordinatorOptions {
        self.inner.options
    }

    /// `PATH` entries appended for every subsequent launch.
    pub fn set_extra_paths(&self, paths: Vec<String>) {
        *self.inner.extra_paths.write() = paths;
    }

    // ---- execution -------------------------------------------------------

    /// Launch a command.
    ///
    /// Must be called from within a tokio runtime.
    pub fn start_command(&self, id: &str) -> Result<()> {
        let mut running = self.inner.running.lock();
        if running.contains_key(id) {
            return Err(GomanderError::AlreadyRunning(id.to_string()));
        }

        let (command, base_dir) = {
            let registry = self.inner.registry.lock();
            let command = registry.command(id)?.clone();
            (command, registry.base_dir().to_path_buf())
        };
        let spec = env::launch_spec(&command, &base_dir, &self.inner.extra_paths.read())?;

        self.inner.mux.clear(id);
        let process = self
            .inner
            .backend
            .spawn(&spec)
            .map_err(|source| GomanderError::Spawn {
                command_id: id.to_string(),
                source,
            })?;

        let run_id = self.inner.next_run_id.fetch_add(1, Ordering::Relaxed);
        let stop = Arc::new(Notify::new());
        running.insert(
            id.to_string(),
            RunningInstance {
                run_id,
                pid: process.pid,
                started_at: Instant::now(),
                control: process.control.clone(),
                stop: stop.clone(),
                stopping: false,
            },
        );
        self.inner.running_count.send_replace(running.len());
        drop(running);

        info!(command = %id, name = %command.name, run_id, pid = ?process.pid, "command started");
        self.inner.bus.publish(Event::ProcessStarted { id: id.to_string() });

        let run = SupervisedRun {
            command_id: id.to_string(),
            run_id,
            process,
            watcher: PatternWatcher::new(id, &command.error_patterns),
            mux: self.inner.mux.clone(),
            bus: self.inner.bus.clone(),
            stop,
            stop_grace: self.inner.options.stop_grace,
            drain_timeout: self.inner.options.drain_timeout,
        };
        let inner = self.inner.clone();
        let command_id = id.to_string();
        tokio::spawn(async move {
            let outcome = supervise(run).await;
            inner.finish(&command_id, run_id, outcome);
        });

        Ok(())
    }

    /// Ask a running command to stop.
    ///
    /// Sends SIGTERM to its process group and arms the SIGKILL deadline.
    /// Returns once the signal is issued; stopping an idle or already
    /// stopping command is a no-op.
    pub fn stop_command(&self, id: &str) -> Result<()> {
        let mut running = self.inner.running.lock();
        let Some(instance) = running.get_mut(id) else {
            debug!(command = %id, "stop requested for idle command");
            return Ok(());
        };
        if instance.stopping {
            return Ok(());
        }
        instance.stopping = true;
        instance.stop.notify_one();

        info!(command = %id, run_id = instance.run_id, "stopping command");
        if let Err(e) = instance.control.terminate() {
            warn!(command = %id, run_id = instance.run_id, error = %e, "failed to signal process; killing");
            if let Err(e) = instance.control.kill() {
                warn!(command = %id, run_id = instance.run_id, error = %e, "failed to kill process");
            }
        }
        Ok(())
    }

    /// Stop every running command.
    pub fn stop_all(&self) {
        for id in self.running_ids() {
            if let Err(e) = self.stop_command(&id) {
                warn!(command = %id, error = %e, "failed to stop command");
            }
        }
    }

    /// Resolves once no instance is running.
    pub async fn wait_idle(&self) {
        let mut rx = self.inner.running_count.subscribe();
        if rx.wait_for(|count| *count == 0).await.is_err() {
            debug!("running count channel closed while waiting for idle");
        }
    }

    pub async fn run_command_group(&self, group_id: &str) -> Result<GroupReport> {
        let members = self.group_members(group_id)?;
        let this = self.clone();
        let start = move |id: CommandId| this.start_command(&id);
        Ok(fan_out(
            group_id,
            members,
            |id| self.status(id) != CommandStatus::Running,
            start,
        )
        .await)
    }

    pub async fn stop_command_group(&self, group_id: &str) -> Result<GroupReport> {
        let members = self.group_members(group_id)?;
        let this = self.clone();
        let stop = move |id: CommandId| this.stop_command(&id);
        Ok(fan_out(
            group_id,
            members,
            |id| self.status(id) == CommandStatus::Running,
            stop,
        )
        .await)
    }

    fn group_members(&self, group_id: &str) -> Result<Vec<CommandId>> {
        Ok(self.inner.registry.lock().group(group_id)?.command_ids.clone())
    }

    // ---- status ----------------------------------------------------------

    pub fn status(&self, id: &str) -> CommandStatus {
        if self.inner.running.lock().contains_key(id) {
            CommandStatus::Running
        } else {
            CommandStatus::Idle
        }
    }

    /// Status of every command of the project.
    pub fn statuses(&self) -> BTreeMap<CommandId, CommandStatus> {
        let running = self.inner.running.lock();
        let registry = self.inner.registry.lock();
        registry
            .commands()
            .into_keys()
            .map(|id| {
                let status = if running.contains_key(&id) {
                    CommandStatus::Running
                } else {
                    CommandStatus::Idle
                };
                (id, status)
            })
            .collect()
    }

    pub fn running_ids(&self) -> Vec<CommandId> {
        let mut ids: Vec<_> = self.inner.running.lock().keys().cloned().collect();
        ids.sort();
        ids
    }

    pub fn instance(&self, id: &str) -> Option<InstanceInfo> {
        self.inner.running.lock().get(id).map(|i| InstanceInfo {
            run_id: i.run_id,
            pid: i.pid,
            started_at: i.started_at,
            stopping: i.stopping,
        })
    }

    // ---- guarded registry mutations ---------------------------------------

    /// Edit a command; changing how a running command is launched is `Busy`.
    pub fn edit_command(&self, command: Command) -> Result<Command> {
        let running = self.inner.running.lock();
        let mut registry = self.inner.registry.lock();
        if running.contains_key(&command.id) && registry.command(&command.id)?.launch_differs(&command) {
            return Err(GomanderError::Busy(format!(
                "command '{}' is running; stop it before changing how it is launched",
                command.name
            )));
        }
        registry.edit_command(command)
    }

    pub fn remove_command(&self, id: &str) -> Result<Command> {
        let running = self.inner.running.lock();
        if running.contains_key(id) {
            return Err(GomanderError::Busy(format!(
                "command '{id}' is running; stop it before deleting it"
            )));
        }
        let removed = self.inner.registry.lock().remove_command(id)?;
        drop(running);
        self.inner.mux.forget(id);
        Ok(removed)
    }

    pub fn delete_command_group(&self, group_id: &str) -> Result<CommandGroup> {
        let running = self.inner.running.lock();
        let mut registry = self.inner.registry.lock();
        let group = registry.group(group_id)?;
        if let Some(busy) = group.command_ids.iter().find(|id| running.contains_key(*id)) {
            return Err(GomanderError::Busy(format!(
                "member '{busy}' of group '{}' is running; stop the group before deleting it",
                group.name
            )));
        }
        let removed = registry.delete_group(group_id)?;
        drop(registry);
        drop(running);
        self.inner.bus.publish(Event::CommandGroupDeleted {
            id: group_id.to_string(),
        });
        Ok(removed)
    }
}

impl Inner {
    // Runs on the supervisor task once the instance is done.
    fn finish(&self, id: &str, run_id: u64, outcome: ExitOutcome) {
        self.mux.flush_command(id);
        {
            let mut running = self.running.lock();
            if running.get(id).is_some_and(|i| i.run_id == run_id) {
                running.remove(id);
            }
            self.running_count.send_replace(running.len());
        }
        info!(command = %id, run_id, ?outcome, "command finished");
        self.bus.publish(Event::ProcessFinished {
            id: id.to_string(),
            outcome,
        });
    }
}
