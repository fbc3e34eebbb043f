// src/config/loader.rs

use std::fs;
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::config::model::{DeployConfig, RawDeployConfig};
use crate::errors::Result;

/// File name looked up in the project root.
pub const CONFIG_FILE_NAME: &str = "deploy.toml";

/// Load a configuration file and return the raw, unvalidated config.
///
/// This only performs TOML deserialization. Use [`load_and_validate`] for the
/// semantic checks.
pub fn load_from_path(path: impl AsRef<Path>) -> Result<RawDeployConfig> {
    let path = path.as_ref();
    let contents = fs::read_to_string(path)?;

    let mut config: RawDeployConfig = toml::from_str(&contents)?;
    config.table = toml::from_str(&contents)?;

    Ok(config)
}

/// Load a configuration file from path and run validation.
pub fn load_and_validate(path: impl AsRef<Path>) -> Result<DeployConfig> {
    let raw_config = load_from_path(&path)?;
    let config = DeployConfig::try_from(raw_config)?;
    Ok(config)
}

/// Like [`load_and_validate`], but a missing file yields the defaults.
///
/// The config file is optional; a file that exists but does not parse or
/// validate is still an error.
pub fn load_or_default(path: impl AsRef<Path>) -> Result<DeployConfig> {
    let path = path.as_ref();
    if !path.exists() {
        debug!(path = %path.display(), "no config file; using defaults");
        return Ok(DeployConfig::default());
    }
    load_and_validate(path)
}

/// Default config location for a project root.
pub fn default_config_path(project_root: &Path) -> PathBuf {
    project_root.join(CONFIG_FILE_NAME)
}

/// Walk up from `start` looking for a directory that contains
/// `deploy.toml`. Falls back to `start` itself.
pub fn find_project_root(start: &Path) -> PathBuf {
    start
        .ancestors()
        .find(|dir| dir.join(CONFIG_FILE_NAME).is_file())
        .unwrap_or(start)
        .to_path_buf()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = load_or_default(dir.path().join("deploy.toml")).unwrap();
        assert_eq!(cfg.build.output_dir, "dist");
    }

    #[test]
    fn project_root_found_from_nested_dir() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join(CONFIG_FILE_NAME), "").unwrap();
        let nested = dir.path().join("a").join("b");
        fs::create_dir_all(&nested).unwrap();

        assert_eq!(find_project_root(&nested), dir.path());
    }
}
