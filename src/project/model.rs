// src/project/model.rs

use std::collections::HashSet;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::errors::{GomanderError, Result};
use crate::registry::model::{Command, CommandGroup, new_id};
use crate::types::ProjectId;

/// A project file.
///
/// `working_directory` is the base directory that relative command
/// directories are resolved against.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Project {
    pub id: ProjectId,
    pub name: String,
    pub working_directory: PathBuf,

    #[serde(default)]
    pub commands: Vec<Command>,

    #[serde(default)]
    pub command_groups: Vec<CommandGroup>,
}

/// What `get_available_projects` returns: enough to pick one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProjectSummary {
    pub id: ProjectId,
    pub name: String,
    pub working_directory: PathBuf,
}

impl Project {
    pub fn new(name: impl Into<String>, working_directory: impl Into<PathBuf>) -> Self {
        Self {
            id: new_id(),
            name: name.into(),
            working_directory: working_directory.into(),
            commands: Vec::new(),
            command_groups: Vec::new(),
        }
    }

    pub fn summary(&self) -> ProjectSummary {
        ProjectSummary {
            id: self.id.clone(),
            name: self.name.clone(),
            working_directory: self.working_directory.clone(),
        }
    }

    /// Check the project's own fields and every cross reference.
    ///
    /// - the id is usable as a file name
    /// - command and group ids are unique
    /// - every command and group belongs to this project
    /// - every group member refers to an existing command, at most once
    pub fn validate(&self) -> Result<()> {
        validate_project_id(&self.id)?;
        if self.name.trim().is_empty() {
            return Err(GomanderError::Validation(format!(
                "project '{}' has an empty name",
                self.id
            )));
        }

        let mut command_ids = HashSet::new();
        for cmd in &self.commands {
            cmd.validate()?;
            if !command_ids.insert(cmd.id.as_str()) {
                return Err(GomanderError::Validation(format!(
                    "duplicate command id '{}'",
                    cmd.id
                )));
            }
            if cmd.project_id != self.id {
                return Err(GomanderError::Validation(format!(
                    "command '{}' belongs to project '{}', not '{}'",
                    cmd.name, cmd.project_id, self.id
                )));
            }
        }

        let mut group_ids = HashSet::new();
        for group in &self.command_groups {
            if group.name.trim().is_empty() {
                return Err(GomanderError::Validation(format!(
                    "command group '{}' has an empty name",
                    group.id
                )));
            }
            if !group_ids.insert(group.id.as_str()) {
                return Err(GomanderError::Validation(format!(
                    "duplicate command group id '{}'",
                    group.id
                )));
            }
            if group.project_id != self.id {
                return Err(GomanderError::Validation(format!(
                    "command group '{}' belongs to project '{}', not '{}'",
                    group.name, group.project_id, self.id
                )));
            }
            let mut members = HashSet::new();
            for member in &group.command_ids {
                if !command_ids.contains(member.as_str()) {
                    return Err(GomanderError::Validation(format!(
                        "command group '{}' references unknown command '{}'",
                        group.name, member
                    )));
                }
                if !members.insert(member.as_str()) {
                    return Err(GomanderError::Validation(format!(
                        "command group '{}' lists command '{}' twice",
                        group.name, member
                    )));
                }
            }
        }

        Ok(())
    }

    /// Give the project, its commands and its groups fresh ids, keeping group
    /// membership intact. Used when importing.
    pub fn with_fresh_ids(mut self) -> Self {
        let project_id = new_id();
        let mut remap = std::collections::HashMap::new();

        for cmd in &mut self.commands {
            let fresh = new_id();
            remap.insert(cmd.id.clone(), fresh.clone());
            cmd.id = fresh;
            cmd.project_id = project_id.clone();
        }
        for group in &mut self.command_groups {
            group.id = new_id();
            group.project_id = project_id.clone();
            for member in &mut group.command_ids {
                if let Some(fresh) = remap.get(member) {
                    *member = fresh.clone();
                }
            }
        }

        self.id = project_id;
        self
    }
}

/// Project ids double as file names.
pub fn validate_project_id(id: &str) -> Result<()> {
    let ok = !id.is_empty()
        && id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
    if ok {
        Ok(())
    } else {
        Err(GomanderError::Validation(format!(
            "invalid project id '{id}' (allowed: ASCII letters, digits, '-' and '_')"
        )))
    }
}
