// src/config/model.rs

use serde::{Deserialize, Serialize};

/// Lines kept per command when the config does not say otherwise.
pub const DEFAULT_LOG_LINE_LIMIT: usize = 100;

/// Process-wide settings, stored as `config.toml` in the data directory.
///
/// ```toml
/// last_opened_project_id = "6f1c..."
/// log_line_limit = 500
/// locale = "en"
///
/// [[environment_paths]]
/// id = "a1b2..."
/// path = "/opt/node/bin"
/// ```
///
/// Every field is optional in the file and falls back to its default.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct UserConfig {
    /// Project reopened at startup, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_opened_project_id: Option<String>,

    /// Extra directories appended to `PATH` for every spawned command.
    pub environment_paths: Vec<EnvironmentPath>,

    /// Maximum number of buffered log lines per command.
    pub log_line_limit: usize,

    pub locale: String,
}

impl Default for UserConfig {
    fn default() -> Self {
        Self {
            last_opened_project_id: None,
            environment_paths: Vec::new(),
            log_line_limit: DEFAULT_LOG_LINE_LIMIT,
            locale: "en".to_string(),
        }
    }
}

impl UserConfig {
    /// The configured extra `PATH` entries, in order.
    pub fn extra_paths(&self) -> Vec<String> {
        self.environment_paths
            .iter()
            .map(|p| p.path.clone())
            .collect()
    }
}

/// An extra directory merged into a spawned process's `PATH`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnvironmentPath {
    pub id: String,
    pub path: String,
}

impl EnvironmentPath {
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            path: path.into(),
        }
    }
}
