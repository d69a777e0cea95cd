#![allow(dead_code)]

use std::path::Path;

use gomander::project::Project;
use gomander::registry::{Command, CommandGroup};

/// Builder for `Project` to simplify test setup.
///
/// Command and group ids are their names, which keeps assertions readable.
pub struct ProjectBuilder {
    project: Project,
}

impl ProjectBuilder {
    pub fn new(name: &str) -> Self {
        Self {
            project: Project::new(name, std::env::temp_dir()),
        }
    }

    pub fn id(mut self, id: &str) -> Self {
        self.project.id = id.to_string();
        for c in &mut self.project.commands {
            c.project_id = id.to_string();
        }
        for g in &mut self.project.command_groups {
            g.project_id = id.to_string();
        }
        self
    }

    pub fn working_directory(mut self, dir: impl AsRef<Path>) -> Self {
        self.project.working_directory = dir.as_ref().to_path_buf();
        self
    }

    pub fn with_command(mut self, command: CommandBuilder) -> Self {
        let mut command = command.build();
        command.project_id = self.project.id.clone();
        command.position = self.project.commands.len() as u32;
        self.project.commands.push(command);
        self
    }

    /// Shorthand for a command whose id and name are both `name`.
    pub fn command(self, name: &str, cmd: &str) -> Self {
        self.with_command(CommandBuilder::new(name, cmd))
    }

    pub fn group(mut self, name: &str, members: &[&str]) -> Self {
        let mut group = CommandGroup::new(
            self.project.id.clone(),
            name,
            members.iter().map(|m| m.to_string()).collect(),
        );
        group.id = name.to_string();
        group.position = self.project.command_groups.len() as u32;
        self.project.command_groups.push(group);
        self
    }

    pub fn build(self) -> Project {
        self.project
            .validate()
            .expect("Failed to build valid project from builder");
        self.project
    }
}

/// Builder for `Command`.
pub struct CommandBuilder {
    command: Command,
}

impl CommandBuilder {
    pub fn new(name: &str, cmd: &str) -> Self {
        let mut command = Command::new("", name, cmd);
        command.id = name.to_string();
        Self { command }
    }

    pub fn id(mut self, id: &str) -> Self {
        self.command.id = id.to_string();
        self
    }

    pub fn working_directory(mut self, dir: &str) -> Self {
        self.command.working_directory = dir.to_string();
        self
    }

    pub fn error_pattern(mut self, pattern: &str) -> Self {
        self.command.error_patterns.push(pattern.to_string());
        self
    }

    pub fn link(mut self, link: &str) -> Self {
        self.command.link = Some(link.to_string());
        self
    }

    pub fn build(self) -> Command {
        self.command
    }
}

/// A scratch data directory, removed when the guard drops.
pub fn data_dir() -> tempfile::TempDir {
    tempfile::TempDir::new().expect("create temp data dir")
}
