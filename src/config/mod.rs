// src/config/mod.rs

//! User configuration for gomander.
//!
//! Responsibilities:
//! - Define the TOML-backed `UserConfig` model (`model.rs`).
//! - Load and save it through the [`FileSystem`](crate::fs::FileSystem) seam (`loader.rs`).
//! - Validate values such as the log line limit (`validate.rs`).

pub mod loader;
pub mod model;
pub mod validate;

pub use loader::{ConfigStore, default_data_dir};
pub use model::{DEFAULT_LOG_LINE_LIMIT, EnvironmentPath, UserConfig};
pub use validate::validate_user_config;
