// src/config/validate.rs

use std::path::{Component, Path};

use crate::config::model::{DeployConfig, RawDeployConfig, parse_version};
use crate::errors::{DeployError, Result};

impl TryFrom<RawDeployConfig> for DeployConfig {
    type Error = crate::errors::DeployError;

    fn try_from(raw: RawDeployConfig) -> std::result::Result<Self, Self::Error> {
        validate_raw_config(&raw)?;
        Ok(DeployConfig::new_unchecked(raw))
    }
}

/// Validate an already-built config (used by callers that construct one
/// directly rather than loading it).
pub fn validate_config(cfg: &RawDeployConfig) -> Result<()> {
    validate_raw_config(cfg)
}

fn validate_raw_config(cfg: &RawDeployConfig) -> Result<()> {
    validate_runtime(cfg)?;
    validate_build(cfg)?;
    validate_ports(cfg)?;
    validate_health(cfg)?;
    validate_timeouts(cfg)?;
    Ok(())
}

fn validate_runtime(cfg: &RawDeployConfig) -> Result<()> {
    if cfg.runtime.python.trim().is_empty() {
        return Err(config_error("[runtime].python must not be empty"));
    }
    if parse_version(&cfg.runtime.min_version).is_none() {
        return Err(DeployError::ConfigError(format!(
            "[runtime].min_version '{}' is not a version like \"3.8\"",
            cfg.runtime.min_version
        )));
    }
    ensure_relative("[runtime].venv_dir", &cfg.runtime.venv_dir)?;
    Ok(())
}

fn validate_build(cfg: &RawDeployConfig) -> Result<()> {
    // Removed on rollback; must stay inside the project root.
    ensure_relative("[build].output_dir", &cfg.build.output_dir)?;
    for dir in &cfg.build.source_dirs {
        if dir == &cfg.build.output_dir {
            return Err(DeployError::ConfigError(format!(
                "[build].source_dirs contains the output directory '{dir}'"
            )));
        }
    }
    Ok(())
}

fn validate_ports(cfg: &RawDeployConfig) -> Result<()> {
    let all = cfg.deploy.ports.iter().chain(cfg.health.ports.iter());
    for port in all {
        if *port == 0 {
            return Err(config_error("ports must be in 1..=65535 (got 0)"));
        }
    }
    Ok(())
}

fn validate_health(cfg: &RawDeployConfig) -> Result<()> {
    let t = cfg.health.pass_threshold;
    if !(t > 0.0 && t <= 1.0) {
        return Err(DeployError::ConfigError(format!(
            "[health].pass_threshold must be in (0, 1] (got {t})"
        )));
    }
    Ok(())
}

fn validate_timeouts(cfg: &RawDeployConfig) -> Result<()> {
    let timeouts = [
        ("[commands].timeout_secs", cfg.commands.timeout_secs),
        ("[setup].venv_timeout_secs", cfg.setup.venv_timeout_secs),
        ("[deps].install_timeout_secs", cfg.deps.install_timeout_secs),
        ("[deploy].startup_timeout_secs", cfg.deploy.startup_timeout_secs),
    ];
    for (name, value) in timeouts {
        if value == 0 {
            return Err(DeployError::ConfigError(format!(
                "{name} must be >= 1 (got 0)"
            )));
        }
    }
    Ok(())
}

fn ensure_relative(name: &str, value: &str) -> Result<()> {
    let path = Path::new(value);
    let escapes = path.components().any(|c| {
        matches!(
            c,
            Component::ParentDir | Component::RootDir | Component::Prefix(_)
        )
    });
    let is_root = path.components().all(|c| matches!(c, Component::CurDir));
    if value.trim().is_empty() || escapes || is_root {
        return Err(DeployError::ConfigError(format!(
            "{name} must be a relative path inside the project root (got '{value}')"
        )));
    }
    Ok(())
}

fn config_error(msg: &str) -> DeployError {
    DeployError::ConfigError(msg.to_string())
}
