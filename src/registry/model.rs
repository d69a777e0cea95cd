// src/registry/model.rs

use serde::{Deserialize, Serialize};

use crate::errors::{GomanderError, Result};
use crate::types::{CommandId, GroupId, ProjectId};

/// A named, persisted shell invocation.
///
/// ```toml
/// [[commands]]
/// id = "b3e9..."
/// project_id = "6f1c..."
/// name = "api"
/// command = "cargo run -p api"
/// working_directory = "services/api"
/// position = 0
/// error_patterns = ["panicked at", "error\\["]
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Command {
    pub id: CommandId,

    #[serde(default)]
    pub project_id: ProjectId,

    pub name: String,

    /// Shell text, executed through the platform shell.
    pub command: String,

    /// Relative to the project's working directory, or absolute.
    #[serde(default)]
    pub working_directory: String,

    /// Ordering index among the project's commands.
    #[serde(default)]
    pub position: u32,

    /// Regular expressions flagging a failure when an output line matches.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub error_patterns: Vec<String>,

    /// Informational URL shown next to the command.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub link: Option<String>,
}

impl Command {
    /// New command with a fresh id; position is assigned by the registry.
    pub fn new(
        project_id: impl Into<ProjectId>,
        name: impl Into<String>,
        command: impl Into<String>,
    ) -> Self {
        Self {
            id: new_id(),
            project_id: project_id.into(),
            name: name.into(),
            command: command.into(),
            working_directory: String::new(),
            position: 0,
            error_patterns: Vec::new(),
            link: None,
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(GomanderError::Validation(format!(
                "command '{}' has an empty name",
                self.id
            )));
        }
        if self.command.trim().is_empty() {
            return Err(GomanderError::Validation(format!(
                "command '{}' has an empty command line",
                self.name
            )));
        }
        Ok(())
    }

    /// Whether `other` changes anything that affects how the process is
    /// launched.
    pub fn launch_differs(&self, other: &Command) -> bool {
        self.command != other.command || self.working_directory != other.working_directory
    }
}

/// A named, ordered set of command references.
///
/// Member order is execution and display order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandGroup {
    pub id: GroupId,

    #[serde(default)]
    pub project_id: ProjectId,

    pub name: String,

    #[serde(default)]
    pub position: u32,

    #[serde(default)]
    pub command_ids: Vec<CommandId>,
}

impl CommandGroup {
    pub fn new(
        project_id: impl Into<ProjectId>,
        name: impl Into<String>,
        command_ids: Vec<CommandId>,
    ) -> Self {
        Self {
            id: new_id(),
            project_id: project_id.into(),
            name: name.into(),
            position: 0,
            command_ids,
        }
    }

    pub fn contains(&self, command_id: &str) -> bool {
        self.command_ids.iter().any(|id| id == command_id)
    }
}

/// Items ordered by an explicit `position`.
pub trait Positioned {
    fn id(&self) -> &str;
    fn position(&self) -> u32;
    fn set_position(&mut self, position: u32);
}

impl Positioned for Command {
    fn id(&self) -> &str {
        &self.id
    }

    fn position(&self) -> u32 {
        self.position
    }

    fn set_position(&mut self, position: u32) {
        self.position = position;
    }
}

impl Positioned for CommandGroup {
    fn id(&self) -> &str {
        &self.id
    }

    fn position(&self) -> u32 {
        self.position
    }

    fn set_position(&mut self, position: u32) {
        self.position = position;
    }
}

/// Generate a fresh opaque identifier.
pub fn new_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blank_name_or_command_is_invalid() {
        let mut cmd = Command::new("p", " ", "echo hi");
        assert!(matches!(cmd.validate(), Err(GomanderError::Validation(_))));
        cmd.name = "hi".to_string();
        assert!(cmd.validate().is_ok());
        cmd.command = "\t".to_string();
        assert!(matches!(cmd.validate(), Err(GomanderError::Validation(_))));
    }

    #[test]
    fn only_command_and_directory_affect_launch() {
        let cmd = Command::new("p", "web", "npm start");
        let mut renamed = cmd.clone();
        renamed.name = "frontend".to_string();
        renamed.error_patterns = vec!["ERR!".to_string()];
        assert!(!cmd.launch_differs(&renamed));

        let mut moved = cmd.clone();
        moved.working_directory = "web".to_string();
        assert!(cmd.launch_differs(&moved));
    }
}
