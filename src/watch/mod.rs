// src/watch/mod.rs

//! Output watching: flags failure patterns in command output.
//!
//! [`patterns`] compiles a command's `error_patterns` once per running
//! instance and checks every line against them. Invalid patterns are
//! reported when the command is saved.

pub mod patterns;

pub use patterns::{InvalidPattern, PatternWatcher, invalid_patterns, report_invalid_patterns};
