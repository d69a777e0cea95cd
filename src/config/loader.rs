// src/config/loader.rs

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{debug, info};

use crate::config::model::UserConfig;
use crate::config::validate::validate_user_config;
use crate::errors::Result;
use crate::fs::FileSystem;

const CONFIG_FILE_NAME: &str = "config.toml";

/// Reads and writes `config.toml` inside the data directory.
#[derive(Debug, Clone)]
pub struct ConfigStore {
    fs: Arc<dyn FileSystem>,
    path: PathBuf,
}

impl ConfigStore {
    pub fn new(fs: Arc<dyn FileSystem>, data_dir: impl AsRef<Path>) -> Self {
        Self {
            fs,
            path: data_dir.as_ref().join(CONFIG_FILE_NAME),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the user config.
    ///
    /// A missing file yields `UserConfig::default()`; an unreadable or
    /// invalid file is an error.
    pub fn load(&self) -> Result<UserConfig> {
        if !self.fs.exists(&self.path) {
            debug!(path = %self.path.display(), "no user config yet; using defaults");
            return Ok(UserConfig::default());
        }

        let contents = self.fs.read_to_string(&self.path)?;
        let cfg: UserConfig = toml::from_str(&contents)?;
        validate_user_config(&cfg)?;
        Ok(cfg)
    }

    /// Validate and persist the user config.
    pub fn save(&self, cfg: &UserConfig) -> Result<()> {
        validate_user_config(cfg)?;
        let contents = toml::to_string_pretty(cfg)?;
        self.fs.write(&self.path, contents.as_bytes())?;
        info!(path = %self.path.display(), "user config saved");
        Ok(())
    }
}

/// Helper to resolve the default data directory.
///
/// `GOMANDER_HOME` wins when set; otherwise `$HOME/.gomander`
/// (`%USERPROFILE%` on Windows), falling back to `.gomander` in the current
/// directory.
pub fn default_data_dir() -> PathBuf {
    if let Ok(dir) = std::env::var("GOMANDER_HOME") {
        if !dir.trim().is_empty() {
            return PathBuf::from(dir);
        }
    }
    let home = std::env::var_os("HOME").or_else(|| std::env::var_os("USERPROFILE"));
    match home {
        Some(home) => PathBuf::from(home).join(".gomander"),
        None => PathBuf::from(".gomander"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::model::EnvironmentPath;
    use crate::errors::GomanderError;
    use crate::fs::mock::MockFileSystem;

    #[test]
    fn missing_file_yields_defaults() {
        let fs = Arc::new(MockFileSystem::new());
        let store = ConfigStore::new(fs, "/data");
        assert_eq!(store.load().unwrap(), UserConfig::default());
    }

    #[test]
    fn save_then_load_keeps_values() {
        let fs = Arc::new(MockFileSystem::new());
        let store = ConfigStore::new(fs.clone(), "/data");
        let cfg = UserConfig {
            last_opened_project_id: Some("p1".to_string()),
            environment_paths: vec![EnvironmentPath::new("/opt/tools/bin")],
            log_line_limit: 3,
            locale: "es".to_string(),
        };
        store.save(&cfg).unwrap();
        assert!(fs.contents("/data/config.toml").is_some());
        assert_eq!(store.load().unwrap(), cfg);
    }

    #[test]
    fn partial_file_fills_in_defaults() {
        let fs = Arc::new(MockFileSystem::new());
        fs.add_file("/data/config.toml", "log_line_limit = 42\n");
        let cfg = ConfigStore::new(fs, "/data").load().unwrap();
        assert_eq!(cfg.log_line_limit, 42);
        assert_eq!(cfg.locale, "en");
        assert!(cfg.environment_paths.is_empty());
    }

    #[test]
    fn malformed_file_is_a_toml_error() {
        let fs = Arc::new(MockFileSystem::new());
        fs.add_file("/data/config.toml", "log_line_limit = \"many\"\n");
        let err = ConfigStore::new(fs, "/data").load().unwrap_err();
        assert!(matches!(err, GomanderError::TomlError(_)));
    }
}
