// src/lib.rs

pub mod app;
pub mod cli;
pub mod config;
pub mod engine;
pub mod errors;
pub mod events;
pub mod exec;
pub mod fs;
pub mod logging;
pub mod logs;
pub mod project;
pub mod registry;
pub mod types;
pub mod watch;

use std::collections::{HashMap, HashSet};

use anyhow::{Context, Result, bail};
use tracing::{debug, error, info, warn};

use crate::app::{App, AppSettings, Target};
use crate::cli::{CliArgs, CliCommand};
use crate::config::default_data_dir;
use crate::events::{Event, EventKind};
use crate::project::Project;
use crate::types::CommandId;

/// High-level entry point used by `main.rs`.
///
/// This wires together:
/// - data directory and user config
/// - project selection
/// - the headless `list` / `run` commands
/// - Ctrl-C handling
pub async fn run(args: CliArgs) -> Result<()> {
    let data_dir = args.data_dir.clone().unwrap_or_else(default_data_dir);
    debug!(data_dir = %data_dir.display(), "using data directory");
    let app = App::new(AppSettings::new(&data_dir))
        .with_context(|| format!("initialising gomander in {}", data_dir.display()))?;

    let result = match args.command {
        CliCommand::List { project } => list(&app, project.as_deref()).await,
        CliCommand::Run { project, targets } => run_targets(&app, project.as_deref(), &targets).await,
    };
    app.shutdown().await;
    result
}

/// Open the project named by `selector` (id or name), else the last opened
/// one, else the only one there is.
async fn select_project(app: &App, selector: Option<&str>) -> Result<Project> {
    let available = app.get_available_projects()?;

    if let Some(selector) = selector {
        let Some(summary) = available
            .iter()
            .find(|p| p.id == selector)
            .or_else(|| available.iter().find(|p| p.name == selector))
        else {
            bail!("no project with id or name '{selector}'");
        };
        return Ok(app.open_project(&summary.id).await?);
    }

    if let Some(project) = app.restore_last_project().await? {
        return Ok(project);
    }
    match available.as_slice() {
        [only] => Ok(app.open_project(&only.id).await?),
        [] => bail!("no projects found"),
        _ => bail!("several projects found; pick one with --project"),
    }
}

async fn list(app: &App, selector: Option<&str>) -> Result<()> {
    if selector.is_none() {
        println!("projects:");
        for p in app.get_available_projects()? {
            println!("  - {} ({})  {}", p.name, p.id, p.working_directory.display());
        }
        return Ok(());
    }

    let project = select_project(app, selector).await?;
    println!("project {} ({})", project.name, project.id);
    println!("  working directory: {}", project.working_directory.display());

    let mut commands: Vec<_> = app.get_commands()?.into_values().collect();
    commands.sort_by_key(|c| c.position);
    println!();
    println!("commands ({}):", commands.len());
    for c in &commands {
        println!("  - {} ({})", c.name, c.id);
        println!("      cmd: {}", c.command);
        if !c.working_directory.is_empty() {
            println!("      dir: {}", c.working_directory);
        }
        if !c.error_patterns.is_empty() {
            println!("      error patterns: {:?}", c.error_patterns);
        }
    }

    let names: HashMap<&str, &str> = commands
        .iter()
        .map(|c| (c.id.as_str(), c.name.as_str()))
        .collect();
    let groups = app.get_command_groups()?;
    println!();
    println!("groups ({}):", groups.len());
    for g in &groups {
        let members: Vec<&str> = g
            .command_ids
            .iter()
            .map(|id| names.get(id.as_str()).copied().unwrap_or(id.as_str()))
            .collect();
        println!("  - {} ({}): {}", g.name, g.id, members.join(", "));
    }
    Ok(())
}

async fn run_targets(app: &App, selector: Option<&str>, targets: &[String]) -> Result<()> {
    let project = select_project(app, selector).await?;
    info!(project = %project.name, ?targets, "running targets");

    let names: HashMap<CommandId, String> = project
        .commands
        .iter()
        .map(|c| (c.id.clone(), c.name.clone()))
        .collect();
    let name_of = |id: &str| names.get(id).cloned().unwrap_or_else(|| id.to_string());

    // Subscribe before starting so no early line is missed.
    let mut events = app.events().subscribe_to(&[
        EventKind::NewLogEntry,
        EventKind::ProcessFinished,
        EventKind::CommandFailed,
    ]);

    let mut started: HashSet<CommandId> = HashSet::new();
    let mut failures = 0usize;
    for target in targets {
        match app.resolve_target(target)? {
            Target::Command(command) => match app.run_command(&command.id) {
                Ok(()) => {
                    started.insert(command.id);
                }
                Err(e) => {
                    error!(command = %command.name, error = %e, "failed to start command");
                    failures += 1;
                }
            },
            Target::Group(group) => {
                let report = app.run_command_group(&group.id).await?;
                for (id, e) in &report.failures {
                    error!(group = %group.name, command = %name_of(id), error = %e, "failed to start group member");
                }
                failures += report.failures.len();
                started.extend(report.affected);
            }
        }
    }

    if started.is_empty() {
        bail!("nothing was started");
    }

    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);
    let mut stopping = false;

    while !started.is_empty() {
        tokio::select! {
            event = events.recv() => match event {
                Some(Event::NewLogEntry { id, line }) => println!("[{}] {}", name_of(&id), line),
                Some(Event::CommandFailed { id, line, patterns }) => {
                    warn!(command = %name_of(&id), ?patterns, "error pattern matched: {line}");
                }
                Some(Event::ProcessFinished { id, outcome }) => {
                    if started.remove(&id) {
                        info!(command = %name_of(&id), %outcome, "command finished");
                    }
                }
                Some(_) => {}
                None => break,
            },

            res = &mut ctrl_c, if !stopping => {
                stopping = true;
                match res {
                    Ok(()) => {
                        info!("Ctrl-C received; stopping commands");
                        app.stop_all();
                    }
                    Err(e) => warn!(error = %e, "failed to listen for Ctrl-C"),
                }
            }
        }
    }

    if failures > 0 {
        bail!("{failures} command(s) failed to start");
    }
    Ok(())
}
