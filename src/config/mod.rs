// src/config/mod.rs

//! Configuration loading and validation.
//!
//! Responsibilities:
//! - Define the TOML-backed data model (`model.rs`).
//! - Load a config file from disk (`loader.rs`).
//! - Validate paths, ports, thresholds and timeouts (`validate.rs`).

pub mod loader;
pub mod model;
pub mod validate;

pub use loader::{default_config_path, find_project_root, load_and_validate, load_from_path, load_or_default};
pub use model::{
    BuildSection, CommandsSection, DeployConfig, DeploySection, DepsSection, HealthSection,
    RawDeployConfig, RuntimeSection, SetupSection,
};
pub use validate::validate_config;
