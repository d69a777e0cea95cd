// src/exec/env.rs

use std::ffi::OsString;
use std::path::{Path, PathBuf};

use crate::errors::{GomanderError, Result};
use crate::exec::backend::LaunchSpec;
use crate::registry::Command;

/// Resolve a command's working directory against the project base.
///
/// Empty means the base itself; absolute paths are used unchanged.
pub fn resolve_working_dir(base: &Path, dir: &str) -> PathBuf {
    let dir = dir.trim();
    if dir.is_empty() {
        return base.to_path_buf();
    }
    let path = Path::new(dir);
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        base.join(path)
    }
}

/// System `PATH` followed by the configured extra entries.
pub fn merged_path(system: Option<OsString>, extra: &[String]) -> Result<OsString> {
    let mut parts: Vec<PathBuf> = system
        .map(|p| std::env::split_paths(&p).collect())
        .unwrap_or_default();
    for entry in extra {
        let entry = entry.trim();
        if entry.is_empty() {
            continue;
        }
        let path = PathBuf::from(entry);
        if !parts.contains(&path) {
            parts.push(path);
        }
    }
    std::env::join_paths(parts)
        .map_err(|e| GomanderError::Validation(format!("invalid environment path: {e}")))
}

/// Build the launch description for `command`.
///
/// The working directory must exist; otherwise this is a `Validation`
/// error and nothing is spawned.
pub fn launch_spec(command: &Command, base_dir: &Path, extra_paths: &[String]) -> Result<LaunchSpec> {
    let working_dir = resolve_working_dir(base_dir, &command.working_directory);
    if !working_dir.is_dir() {
        return Err(GomanderError::Validation(format!(
            "working directory of '{}' does not exist: {}",
            command.name,
            working_dir.display()
        )));
    }

    let path = merged_path(std::env::var_os("PATH"), extra_paths)?;
    Ok(LaunchSpec {
        command_id: command.id.clone(),
        command_line: command.command.clone(),
        working_dir,
        env: vec![("PATH".to_string(), path)],
    })
}
