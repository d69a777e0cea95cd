// src/app.rs

//! Application facade.
//!
//! [`App`] is the request/response surface a frontend (or the CLI) talks to.
//! It owns the user config, the project store, the log multiplexer and the
//! event bus, and at most one open project session (a registry plus its
//! [`ExecutionCoordinator`]).

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::config::{ConfigStore, UserConfig};
use crate::engine::{CoordinatorOptions, ExecutionCoordinator, GroupReport};
use crate::errors::{GomanderError, Result};
use crate::events::EventBus;
use crate::exec::{ProcessBackend, ShellBackend};
use crate::fs::{FileSystem, RealFileSystem};
use crate::logs::{DEFAULT_BATCH_INTERVAL, LogBatch, LogMultiplexer};
use crate::project::{Project, ProjectStore, ProjectSummary};
use crate::registry::{Command, CommandGroup, CommandRegistry};
use crate::types::{CommandId, CommandStatus, GroupId};

/// How the application is wired.
#[derive(Debug, Clone)]
pub struct AppSettings {
    pub data_dir: PathBuf,
    pub fs: Arc<dyn FileSystem>,
    pub backend: Arc<dyn ProcessBackend>,
    pub coordinator: CoordinatorOptions,
    pub batch_interval: Duration,
}

impl AppSettings {
    /// Production wiring rooted at `data_dir`.
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
            fs: Arc::new(RealFileSystem),
            backend: Arc::new(ShellBackend::new()),
            coordinator: CoordinatorOptions::default(),
            batch_interval: DEFAULT_BATCH_INTERVAL,
        }
    }

    pub fn with_fs(mut self, fs: Arc<dyn FileSystem>) -> Self {
        self.fs = fs;
        self
    }

    pub fn with_backend(mut self, backend: Arc<dyn ProcessBackend>) -> Self {
        self.backend = backend;
        self
    }

    pub fn with_coordinator_options(mut self, options: CoordinatorOptions) -> Self {
        self.coordinator = options;
        self
    }

    pub fn with_batch_interval(mut self, interval: Duration) -> Self {
        self.batch_interval = interval;
        self
    }
}

/// A command or group named by id or name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Target {
    Command(Command),
    Group(CommandGroup),
}

#[derive(Debug)]
pub struct App {
    projects: ProjectStore,
    config_store: ConfigStore,
    config: Mutex<UserConfig>,
    backend: Arc<dyn ProcessBackend>,
    options: CoordinatorOptions,
    bus: EventBus,
    mux: LogMultiplexer,
    flusher: JoinHandle<()>,
    session: Mutex<Option<ExecutionCoordinator>>,
}

impl App {
    /// Load the user config and start the log flusher.
    ///
    /// Must be called from within a tokio runtime.
    pub fn new(settings: AppSettings) -> Result<Self> {
        let config_store = ConfigStore::new(settings.fs.clone(), &settings.data_dir);
        let config = config_store.load()?;
        let bus = EventBus::new();
        let mux = LogMultiplexer::new(config.log_line_limit, bus.clone());
        let flusher = mux.spawn_flusher(settings.batch_interval);

        info!(data_dir = %settings.data_dir.display(), "gomander initialised");
        Ok(Self {
            projects: ProjectStore::new(settings.fs, &settings.data_dir),
            config_store,
            config: Mutex::new(config),
            backend: settings.backend,
            options: settings.coordinator,
            bus,
            mux,
            flusher,
            session: Mutex::new(None),
        })
    }

    pub fn events(&self) -> &EventBus {
        &self.bus
    }

    fn coordinator(&self) -> Result<ExecutionCoordinator> {
        self.session.lock().clone().ok_or(GomanderError::NoProjectOpen)
    }

    fn with_registry<T>(&self, f: impl FnOnce(&mut CommandRegistry) -> Result<T>) -> Result<T> {
        let coordinator = self.coordinator()?;
        let mut registry = coordinator.registry().lock();
        f(&mut *registry)
    }

    // ---- commands --------------------------------------------------------

    pub fn get_commands(&self) -> Result<BTreeMap<CommandId, Command>> {
        self.with_registry(|r| Ok(r.commands()))
    }

    pub fn add_command(&self, command: Command) -> Result<Command> {
        self.with_registry(|r| r.add_command(command))
    }

    pub fn edit_command(&self, command: Command) -> Result<Command> {
        self.coordinator()?.edit_command(command)
    }

    pub fn remove_command(&self, id: &str) -> Result<Command> {
        self.coordinator()?.remove_command(id)
    }

    pub fn duplicate_command(&self, id: &str, group_id: Option<&str>) -> Result<Command> {
        self.with_registry(|r| r.duplicate_command(id, group_id))
    }

    pub fn reorder_commands(&self, ids: &[CommandId]) -> Result<()> {
        self.with_registry(|r| r.reorder_commands(ids))
    }

    /// Look up a command, then a group, by id or name.
    pub fn resolve_target(&self, id_or_name: &str) -> Result<Target> {
        self.with_registry(|r| {
            if let Some(command) = r.find_command(id_or_name) {
                return Ok(Target::Command(command.clone()));
            }
            if let Some(group) = r.find_group(id_or_name) {
                return Ok(Target::Group(group.clone()));
            }
            Err(GomanderError::NotFound {
                kind: "Command or group",
                id: id_or_name.to_string(),
            })
        })
    }

    // ---- groups ----------------------------------------------------------

    /// Groups sorted by position.
    pub fn get_command_groups(&self) -> Result<Vec<CommandGroup>> {
        self.with_registry(|r| Ok(r.groups()))
    }

    pub fn create_command_group(&self, group: CommandGroup) -> Result<CommandGroup> {
        self.with_registry(|r| r.create_group(group))
    }

    pub fn update_command_group(&self, group: CommandGroup) -> Result<CommandGroup> {
        self.with_registry(|r| r.update_group(group))
    }

    pub fn delete_command_group(&self, id: &str) -> Result<CommandGroup> {
        self.coordinator()?.delete_command_group(id)
    }

    pub fn reorder_command_groups(&self, ids: &[GroupId]) -> Result<()> {
        self.with_registry(|r| r.reorder_groups(ids))
    }

    pub fn remove_command_from_command_group(
        &self,
        command_id: &str,
        group_id: &str,
    ) -> Result<CommandGroup> {
        self.with_registry(|r| r.remove_command_from_group(command_id, group_id))
    }

    pub async fn run_command_group(&self, id: &str) -> Result<GroupReport> {
        self.coordinator()?.run_command_group(id).await
    }

    pub async fn stop_command_group(&self, id: &str) -> Result<GroupReport> {
        self.coordinator()?.stop_command_group(id).await
    }

    // ---- execution -------------------------------------------------------

    pub fn run_command(&self, id: &str) -> Result<()> {
        self.coordinator()?.start_command(id)
    }

    pub fn stop_command(&self, id: &str) -> Result<()> {
        self.coordinator()?.stop_command(id)
    }

    pub fn command_status(&self, id: &str) -> Result<CommandStatus> {
        let coordinator = self.coordinator()?;
        coordinator.registry().lock().command(id)?;
        Ok(coordinator.status(id))
    }

    pub fn command_statuses(&self) -> Result<BTreeMap<CommandId, CommandStatus>> {
        Ok(self.coordinator()?.statuses())
    }

    /// Buffered lines of a command, oldest first.
    pub fn command_logs(&self, id: &str) -> Vec<String> {
        self.mux.lines(id)
    }

    pub fn clear_command_logs(&self, id: &str) {
        self.mux.clear(id);
    }

    pub fn subscribe_logs(&self, id: &str) -> broadcast::Receiver<LogBatch> {
        self.mux.subscribe(id)
    }

    // ---- user config -----------------------------------------------------

    pub fn get_user_config(&self) -> UserConfig {
        self.config.lock().clone()
    }

    /// Persist `cfg` and apply it: the log cap takes effect immediately,
    /// `PATH` entries on the next launch.
    pub fn save_user_config(&self, cfg: UserConfig) -> Result<()> {
        self.config_store.save(&cfg)?;
        self.mux.set_line_limit(cfg.log_line_limit);
        if let Some(coordinator) = self.session.lock().as_ref() {
            coordinator.set_extra_paths(cfg.extra_paths());
        }
        *self.config.lock() = cfg;
        Ok(())
    }

    fn update_config(&self, f: impl FnOnce(&mut UserConfig)) -> Result<()> {
        let mut next = self.get_user_config();
        f(&mut next);
        self.config_store.save(&next)?;
        *self.config.lock() = next;
        Ok(())
    }

    // ---- projects --------------------------------------------------------

    pub fn create_project(&self, name: &str, working_directory: &Path) -> Result<Project> {
        let project = Project::new(name, working_directory);
        self.projects.save(&project)?;
        info!(project = %project.id, name = %project.name, "project created");
        Ok(project)
    }

    pub fn get_available_projects(&self) -> Result<Vec<ProjectSummary>> {
        self.projects.list()
    }

    pub fn get_current_project(&self) -> Option<Project> {
        let coordinator = self.session.lock().clone()?;
        let project = coordinator.registry().lock().project().clone();
        Some(project)
    }

    /// Open a project, closing the current one first.
    ///
    /// Opening the project that is already open is a no-op.
    pub async fn open_project(&self, id: &str) -> Result<Project> {
        if let Some(current) = self.get_current_project() {
            if current.id == id {
                return Ok(current);
            }
        }

        let project = self.projects.load(id)?;
        self.update_config(|c| c.last_opened_project_id = Some(id.to_string()))?;
        self.close_session().await;

        let registry = CommandRegistry::new(project.clone(), self.projects.clone());
        let coordinator = ExecutionCoordinator::new(
            Arc::new(Mutex::new(registry)),
            self.backend.clone(),
            self.mux.clone(),
            self.bus.clone(),
            self.options,
        );
        coordinator.set_extra_paths(self.config.lock().extra_paths());
        *self.session.lock() = Some(coordinator);

        info!(project = %project.id, name = %project.name, "project opened");
        Ok(project)
    }

    /// Reopen the project recorded in the user config, if it still exists.
    pub async fn restore_last_project(&self) -> Result<Option<Project>> {
        let Some(id) = self.get_user_config().last_opened_project_id else {
            return Ok(None);
        };
        if !self.projects.exists(&id) {
            warn!(project = %id, "last opened project no longer exists");
            return Ok(None);
        }
        self.open_project(&id).await.map(Some)
    }

    /// Stop everything and close the open project.
    pub async fn close_project(&self) -> Result<()> {
        self.close_session().await;
        self.update_config(|c| c.last_opened_project_id = None)
    }

    async fn close_session(&self) {
        let Some(coordinator) = self.session.lock().take() else {
            return;
        };
        coordinator.stop_all();
        let options = coordinator.options();
        let limit = options.stop_grace + options.drain_timeout + Duration::from_secs(1);
        if tokio::time::timeout(limit, coordinator.wait_idle()).await.is_err() {
            warn!(running = ?coordinator.running_ids(), "commands still running after close");
        }

        let registry = coordinator.registry().lock();
        for id in registry.commands().keys() {
            self.mux.forget(id);
        }
        info!(project = %registry.project_id(), "project closed");
    }

    pub fn edit_project(&self, id: &str, name: &str, working_directory: &Path) -> Result<Project> {
        let open = self.session.lock().clone();
        if let Some(coordinator) = open {
            let mut registry = coordinator.registry().lock();
            if registry.project_id() == id {
                registry.edit_project(name, working_directory)?;
                return Ok(registry.project().clone());
            }
        }

        let mut project = self.projects.load(id)?;
        project.name = name.to_string();
        project.working_directory = working_directory.to_path_buf();
        self.projects.save(&project)?;
        Ok(project)
    }

    /// Delete a project file. The open project may only be deleted while
    /// none of its commands run; it is closed first.
    pub async fn delete_project(&self, id: &str) -> Result<()> {
        if !self.projects.exists(id) {
            return Err(GomanderError::project_not_found(id));
        }

        let open = self.session.lock().clone();
        if let Some(coordinator) = open {
            let is_open = coordinator.registry().lock().project_id() == id;
            if is_open {
                if !coordinator.running_ids().is_empty() {
                    return Err(GomanderError::Busy(format!(
                        "project '{id}' has running commands"
                    )));
                }
                self.close_session().await;
            }
        }

        self.projects.delete(id)?;
        if self.get_user_config().last_opened_project_id.as_deref() == Some(id) {
            self.update_config(|c| c.last_opened_project_id = None)?;
        }
        Ok(())
    }

    pub fn export_project(&self, id: &str, path: &Path) -> Result<()> {
        self.projects.export(id, path)
    }

    /// Parse and validate a project file without importing it.
    pub fn get_project_to_import(&self, path: &Path) -> Result<Project> {
        self.projects.read_import(path)
    }

    /// Import a project file under fresh ids.
    pub fn import_project(&self, path: &Path, name: Option<&str>) -> Result<Project> {
        self.projects.import(path, name)
    }

    /// Ask every running command of the open project to stop.
    pub fn stop_all(&self) {
        if let Some(coordinator) = self.session.lock().as_ref() {
            coordinator.stop_all();
        }
    }

    /// Stop everything and wait for the processes to go away.
    pub async fn shutdown(&self) {
        self.close_session().await;
        self.mux.flush();
    }
}

impl Drop for App {
    fn drop(&mut self) {
        self.flusher.abort();
        if let Some(coordinator) = self.session.get_mut().as_ref() {
            coordinator.stop_all();
        }
    }
}
