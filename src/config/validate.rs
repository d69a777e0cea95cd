// src/config/validate.rs

use std::collections::HashSet;

use crate::config::model::UserConfig;
use crate::errors::{GomanderError, Result};

/// Check a `UserConfig` before it is saved or applied.
pub fn validate_user_config(cfg: &UserConfig) -> Result<()> {
    if cfg.log_line_limit == 0 {
        return Err(GomanderError::Validation(
            "log_line_limit must be >= 1 (got 0)".to_string(),
        ));
    }

    if cfg.locale.trim().is_empty() {
        return Err(GomanderError::Validation(
            "locale must not be empty".to_string(),
        ));
    }

    let mut seen = HashSet::new();
    for entry in &cfg.environment_paths {
        if entry.path.trim().is_empty() {
            return Err(GomanderError::Validation(format!(
                "environment path '{}' is empty",
                entry.id
            )));
        }
        if !seen.insert(entry.id.as_str()) {
            return Err(GomanderError::Validation(format!(
                "duplicate environment path id '{}'",
                entry.id
            )));
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::model::EnvironmentPath;

    #[test]
    fn default_config_is_valid() {
        assert!(validate_user_config(&UserConfig::default()).is_ok());
    }

    #[test]
    fn zero_line_limit_is_rejected() {
        let cfg = UserConfig {
            log_line_limit: 0,
            ..UserConfig::default()
        };
        match validate_user_config(&cfg) {
            Err(GomanderError::Validation(msg)) => assert!(msg.contains("log_line_limit")),
            other => panic!("expected Validation error, got {other:?}"),
        }
    }

    #[test]
    fn blank_environment_path_is_rejected() {
        let cfg = UserConfig {
            environment_paths: vec![EnvironmentPath::new("  ")],
            ..UserConfig::default()
        };
        assert!(matches!(
            validate_user_config(&cfg),
            Err(GomanderError::Validation(_))
        ));
    }
}
