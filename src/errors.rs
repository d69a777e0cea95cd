// src/errors.rs

//! Crate-wide error type and result alias.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum GomanderError {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("{kind} not found: {id}")]
    NotFound { kind: &'static str, id: String },

    #[error("Command is already running: {0}")]
    AlreadyRunning(String),

    #[error("Busy: {0}")]
    Busy(String),

    #[error("Command '{command_id}' is the last member of group '{group_id}'; delete the group instead")]
    LastGroupMember { command_id: String, group_id: String },

    #[error("Failed to spawn command '{command_id}': {source}")]
    Spawn {
        command_id: String,
        #[source]
        source: std::io::Error,
    },

    #[error("No project is open")]
    NoProjectOpen,

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("TOML parsing error: {0}")]
    TomlError(#[from] toml::de::Error),

    #[error("TOML serialization error: {0}")]
    TomlSerError(#[from] toml::ser::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl GomanderError {
    pub fn command_not_found(id: impl Into<String>) -> Self {
        GomanderError::NotFound {
            kind: "Command",
            id: id.into(),
        }
    }

    pub fn group_not_found(id: impl Into<String>) -> Self {
        GomanderError::NotFound {
            kind: "Command group",
            id: id.into(),
        }
    }

    pub fn project_not_found(id: impl Into<String>) -> Self {
        GomanderError::NotFound {
            kind: "Project",
            id: id.into(),
        }
    }
}

pub use anyhow::Error;
pub type Result<T> = std::result::Result<T, GomanderError>;
