// src/registry/mod.rs

//! Catalog of the open project's commands and command groups.
//!
//! Every mutation is computed on a copy of the project, written through the
//! [`ProjectStore`], and only then swapped in. A failed save therefore leaves
//! the in-memory catalog exactly as it was, so callers can roll back
//! optimistic UI state safely.
//!
//! The registry knows nothing about running processes; guards such as
//! "cannot delete a running command" live in the coordinator.

pub mod model;

use std::collections::{BTreeMap, HashSet};
use std::path::Path;

use tracing::{debug, info};

use crate::errors::{GomanderError, Result};
use crate::project::{Project, ProjectStore};
use crate::types::{CommandId, GroupId};
use crate::watch::report_invalid_patterns;

pub use model::{Command, CommandGroup, Positioned, new_id};

const COPY_SUFFIX: &str = " (copy)";

#[derive(Debug)]
pub struct CommandRegistry {
    project: Project,
    store: ProjectStore,
}

impl CommandRegistry {
    /// Wrap an already loaded (or freshly created) project.
    pub fn new(project: Project, store: ProjectStore) -> Self {
        Self { project, store }
    }

    pub fn project(&self) -> &Project {
        &self.project
    }

    pub fn project_id(&self) -> &str {
        &self.project.id
    }

    /// Base directory for relative command working directories.
    pub fn base_dir(&self) -> &Path {
        &self.project.working_directory
    }

    /// Replace project-level metadata (name, base directory).
    pub fn edit_project(&mut self, name: &str, working_directory: &Path) -> Result<()> {
        let mut next = self.project.clone();
        next.name = name.to_string();
        next.working_directory = working_directory.to_path_buf();
        self.commit(next)
    }

    // ------------------------------------------------------------------
    // Commands
    // ------------------------------------------------------------------

    pub fn commands(&self) -> BTreeMap<CommandId, Command> {
        self.project
            .commands
            .iter()
            .map(|c| (c.id.clone(), c.clone()))
            .collect()
    }

    /// Commands sorted by position.
    pub fn ordered_commands(&self) -> Vec<&Command> {
        let mut cmds: Vec<&Command> = self.project.commands.iter().collect();
        cmds.sort_by_key(|c| c.position);
        cmds
    }

    pub fn command(&self, id: &str) -> Result<&Command> {
        self.project
            .commands
            .iter()
            .find(|c| c.id == id)
            .ok_or_else(|| GomanderError::command_not_found(id))
    }

    /// Find a command by exact id, then by case-insensitive name.
    pub fn find_command(&self, id_or_name: &str) -> Option<&Command> {
        self.project
            .commands
            .iter()
            .find(|c| c.id == id_or_name)
            .or_else(|| {
                self.project
                    .commands
                    .iter()
                    .find(|c| c.name.eq_ignore_ascii_case(id_or_name))
            })
    }

    /// Add a command at the end of the order.
    ///
    /// An empty id is replaced by a fresh one; the project id is always set
    /// to the open project.
    pub fn add_command(&mut self, mut command: Command) -> Result<Command> {
        if command.id.trim().is_empty() {
            command.id = new_id();
        }
        if self.project.commands.iter().any(|c| c.id == command.id) {
            return Err(GomanderError::Validation(format!(
                "command id '{}' already exists",
                command.id
            )));
        }
        command.project_id = self.project.id.clone();
        command.position = next_position(&self.project.commands);
        command.validate()?;

        let mut next = self.project.clone();
        next.commands.push(command.clone());
        self.commit(next)?;
        report_invalid_patterns(&command.id, &command.error_patterns);
        info!(command = %command.id, name = %command.name, "command added");
        Ok(command)
    }

    /// Replace a command's editable fields. Id, project and position are
    /// kept from the stored command.
    pub fn edit_command(&mut self, command: Command) -> Result<Command> {
        command.validate()?;
        let mut next = self.project.clone();
        let slot = next
            .commands
            .iter_mut()
            .find(|c| c.id == command.id)
            .ok_or_else(|| GomanderError::command_not_found(&command.id))?;

        slot.name = command.name;
        slot.command = command.command;
        slot.working_directory = command.working_directory;
        slot.error_patterns = command.error_patterns;
        slot.link = command.link;
        let edited = slot.clone();

        self.commit(next)?;
        report_invalid_patterns(&edited.id, &edited.error_patterns);
        debug!(command = %edited.id, "command edited");
        Ok(edited)
    }

    /// Delete a command and drop it from every group that lists it.
    pub fn remove_command(&mut self, id: &str) -> Result<Command> {
        let removed = self.command(id)?.clone();
        let mut next = self.project.clone();
        next.commands.retain(|c| c.id != id);
        for group in &mut next.command_groups {
            group.command_ids.retain(|member| member != id);
        }
        normalize_positions(&mut next.commands);
        self.commit(next)?;
        info!(command = %id, "command removed");
        Ok(removed)
    }

    /// Copy a command under a new id with a `" (copy)"` name suffix.
    ///
    /// With a group id, the copy is also inserted into that group right
    /// after the original (or at the end if the original is not a member).
    pub fn duplicate_command(&mut self, id: &str, group_id: Option<&str>) -> Result<Command> {
        let original = self.command(id)?.clone();
        let mut copy = original.clone();
        copy.id = new_id();
        copy.name = format!("{}{COPY_SUFFIX}", original.name);
        copy.position = next_position(&self.project.commands);

        let mut next = self.project.clone();
        if let Some(group_id) = group_id {
            let group = next
                .command_groups
                .iter_mut()
                .find(|g| g.id == group_id)
                .ok_or_else(|| GomanderError::group_not_found(group_id))?;
            match group.command_ids.iter().position(|m| m == id) {
                Some(idx) => group.command_ids.insert(idx + 1, copy.id.clone()),
                None => group.command_ids.push(copy.id.clone()),
            }
        }
        next.commands.push(copy.clone());
        self.commit(next)?;
        info!(command = %id, copy = %copy.id, "command duplicated");
        Ok(copy)
    }

    pub fn reorder_commands(&mut self, ids: &[CommandId]) -> Result<()> {
        let mut next = self.project.clone();
        apply_order(&mut next.commands, ids, "Command")?;
        self.commit(next)?;
        debug!(count = ids.len(), "commands reordered");
        Ok(())
    }

    // ------------------------------------------------------------------
    // Command groups
    // ------------------------------------------------------------------

    /// Groups sorted by position.
    pub fn groups(&self) -> Vec<CommandGroup> {
        let mut groups = self.project.command_groups.clone();
        groups.sort_by_key(|g| g.position);
        groups
    }

    pub fn group(&self, id: &str) -> Result<&CommandGroup> {
        self.project
            .command_groups
            .iter()
            .find(|g| g.id == id)
            .ok_or_else(|| GomanderError::group_not_found(id))
    }

    /// Find a group by exact id, then by case-insensitive name.
    pub fn find_group(&self, id_or_name: &str) -> Option<&CommandGroup> {
        self.project
            .command_groups
            .iter()
            .find(|g| g.id == id_or_name)
            .or_else(|| {
                self.project
                    .command_groups
                    .iter()
                    .find(|g| g.name.eq_ignore_ascii_case(id_or_name))
            })
    }

    /// Create a group at the end of the order. It needs at least one member.
    pub fn create_group(&mut self, mut group: CommandGroup) -> Result<CommandGroup> {
        if group.id.trim().is_empty() {
            group.id = new_id();
        }
        if self.project.command_groups.iter().any(|g| g.id == group.id) {
            return Err(GomanderError::Validation(format!(
                "command group id '{}' already exists",
                group.id
            )));
        }
        group.project_id = self.project.id.clone();
        group.position = next_position(&self.project.command_groups);
        self.check_members(&group)?;

        let mut next = self.project.clone();
        next.command_groups.push(group.clone());
        self.commit(next)?;
        info!(group = %group.id, name = %group.name, members = group.command_ids.len(), "command group created");
        Ok(group)
    }

    /// Replace a group's name and member list.
    pub fn update_group(&mut self, group: CommandGroup) -> Result<CommandGroup> {
        self.check_members(&group)?;
        let mut next = self.project.clone();
        let slot = next
            .command_groups
            .iter_mut()
            .find(|g| g.id == group.id)
            .ok_or_else(|| GomanderError::group_not_found(&group.id))?;
        slot.name = group.name;
        slot.command_ids = group.command_ids;
        let updated = slot.clone();

        self.commit(next)?;
        debug!(group = %updated.id, "command group updated");
        Ok(updated)
    }

    /// Delete a group. Its member commands are untouched.
    pub fn delete_group(&mut self, id: &str) -> Result<CommandGroup> {
        let removed = self.group(id)?.clone();
        let mut next = self.project.clone();
        next.command_groups.retain(|g| g.id != id);
        normalize_positions(&mut next.command_groups);
        self.commit(next)?;
        info!(group = %id, "command group deleted");
        Ok(removed)
    }

    pub fn reorder_groups(&mut self, ids: &[GroupId]) -> Result<()> {
        let mut next = self.project.clone();
        apply_order(&mut next.command_groups, ids, "Command group")?;
        self.commit(next)?;
        debug!(count = ids.len(), "command groups reordered");
        Ok(())
    }

    /// Drop one member from a group.
    ///
    /// Removing the last member is refused with `LastGroupMember`; deleting
    /// the group is the way to get rid of it.
    pub fn remove_command_from_group(
        &mut self,
        command_id: &str,
        group_id: &str,
    ) -> Result<CommandGroup> {
        self.command(command_id)?;
        let group = self.group(group_id)?;
        if !group.contains(command_id) {
            return Err(GomanderError::Validation(format!(
                "command '{command_id}' is not a member of group '{group_id}'"
            )));
        }
        if group.command_ids.len() == 1 {
            return Err(GomanderError::LastGroupMember {
                command_id: command_id.to_string(),
                group_id: group_id.to_string(),
            });
        }

        let mut next = self.project.clone();
        let slot = next
            .command_groups
            .iter_mut()
            .find(|g| g.id == group_id)
            .ok_or_else(|| GomanderError::group_not_found(group_id))?;
        slot.command_ids.retain(|m| m != command_id);
        let updated = slot.clone();

        self.commit(next)?;
        debug!(group = %group_id, command = %command_id, "command removed from group");
        Ok(updated)
    }

    fn check_members(&self, group: &CommandGroup) -> Result<()> {
        if group.name.trim().is_empty() {
            return Err(GomanderError::Validation(
                "command group name must not be empty".to_string(),
            ));
        }
        if group.command_ids.is_empty() {
            return Err(GomanderError::Validation(format!(
                "command group '{}' needs at least one command",
                group.name
            )));
        }
        let mut seen = HashSet::new();
        for member in &group.command_ids {
            self.command(member)?;
            if !seen.insert(member.as_str()) {
                return Err(GomanderError::Validation(format!(
                    "command '{}' listed twice in group '{}'",
                    member, group.name
                )));
            }
        }
        Ok(())
    }

    /// Persist `next`, then make it current.
    fn commit(&mut self, next: Project) -> Result<()> {
        self.store.save(&next)?;
        self.project = next;
        Ok(())
    }
}

fn next_position<T: Positioned>(items: &[T]) -> u32 {
    items
        .iter()
        .map(|i| i.position() + 1)
        .max()
        .unwrap_or(0)
}

/// Give positions `0..n` to the listed ids in order; unlisted items follow
/// in their previous relative order.
fn apply_order<T: Positioned>(items: &mut [T], ids: &[String], kind: &'static str) -> Result<()> {
    let mut seen = HashSet::new();
    for id in ids {
        if !seen.insert(id.as_str()) {
            return Err(GomanderError::Validation(format!(
                "{kind} '{id}' appears twice in the new order"
            )));
        }
        if !items.iter().any(|i| i.id() == id) {
            return Err(GomanderError::NotFound {
                kind,
                id: id.clone(),
            });
        }
    }

    let mut rest: Vec<(u32, String)> = items
        .iter()
        .filter(|i| !seen.contains(i.id()))
        .map(|i| (i.position(), i.id().to_string()))
        .collect();
    rest.sort();

    let order: Vec<&str> = ids
        .iter()
        .map(String::as_str)
        .chain(rest.iter().map(|(_, id)| id.as_str()))
        .collect();

    for item in items.iter_mut() {
        if let Some(pos) = order.iter().position(|id| *id == item.id()) {
            item.set_position(pos as u32);
        }
    }
    Ok(())
}

/// Close gaps left by a deletion, keeping relative order.
fn normalize_positions<T: Positioned>(items: &mut [T]) {
    let mut order: Vec<(u32, String)> = items
        .iter()
        .map(|i| (i.position(), i.id().to_string()))
        .collect();
    order.sort();
    for item in items.iter_mut() {
        if let Some(pos) = order.iter().position(|(_, id)| id == item.id()) {
            item.set_position(pos as u32);
        }
    }
}
