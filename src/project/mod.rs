// src/project/mod.rs

//! Projects: the persistence scope for commands and command groups.
//!
//! - [`model`] defines `Project` and its referential validation.
//! - [`store`] reads and writes one TOML file per project and handles
//!   export / import.

pub mod model;
pub mod store;

pub use model::{Project, ProjectSummary};
pub use store::ProjectStore;
