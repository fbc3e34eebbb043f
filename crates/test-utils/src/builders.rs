#![allow(dead_code)]

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use autodeploy::config::{DeployConfig, RawDeployConfig};
use autodeploy::engine::{DeployContext, Services};
use autodeploy::exec::CommandRunner;
use autodeploy::platform::Platform;
use tempfile::TempDir;

use crate::fake_runner::FakeCommandRunner;

/// Builder for `DeployConfig` to simplify test setup.
///
/// Starts from the defaults with no ports, no health URL and a short
/// startup timeout, so nothing touches the network unless a test asks.
pub struct ConfigBuilder {
    config: RawDeployConfig,
}

impl ConfigBuilder {
    pub fn new() -> Self {
        let mut config = RawDeployConfig::default();
        config.deploy.ports = Vec::new();
        config.deploy.health_url = None;
        config.deploy.startup_timeout_secs = 1;
        config.deploy.probe_interval_ms = 50;
        config.health.ports = Vec::new();
        config.health.probe_timeout_ms = 200;
        Self { config }
    }

    /// Ports the service listens on, for both the startup probe and the
    /// health check.
    pub fn ports(mut self, ports: &[u16]) -> Self {
        self.config.deploy.ports = ports.to_vec();
        self.config.health.ports = ports.to_vec();
        self
    }

    pub fn health_url(mut self, url: &str) -> Self {
        self.config.deploy.health_url = Some(url.to_string());
        self
    }

    pub fn pass_threshold(mut self, threshold: f64) -> Self {
        self.config.health.pass_threshold = threshold;
        self
    }

    pub fn json_file(mut self, path: &str) -> Self {
        self.config.health.json_files.push(path.to_string());
        self
    }

    pub fn critical_packages(mut self, packages: &[&str]) -> Self {
        self.config.deps.critical_packages = packages.iter().map(|p| p.to_string()).collect();
        self
    }

    pub fn source_dirs(mut self, dirs: &[&str]) -> Self {
        self.config.build.source_dirs = dirs.iter().map(|d| d.to_string()).collect();
        self
    }

    pub fn build_command(mut self, line: &str) -> Self {
        self.config.build.commands.push(line.to_string());
        self
    }

    /// Arbitrary edits for fields without a dedicated method.
    pub fn with(mut self, edit: impl FnOnce(&mut RawDeployConfig)) -> Self {
        edit(&mut self.config);
        self
    }

    pub fn raw(self) -> RawDeployConfig {
        self.config
    }

    pub fn build(self) -> DeployConfig {
        DeployConfig::try_from(self.config).expect("Failed to build valid config from builder")
    }
}

impl Default for ConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// A throwaway project root with the usual files of a small Flask-style
/// service.
pub struct TestProject {
    dir: TempDir,
}

impl TestProject {
    /// Empty project directory.
    pub fn empty() -> Self {
        Self {
            dir: tempfile::tempdir().expect("create temp project"),
        }
    }

    /// Project with `requirements.txt`, `app.py`, a `src/` package and a
    /// virtualenv interpreter already in place.
    pub fn standard() -> Self {
        let project = Self::empty();
        project
            .write("requirements.txt", "flask\nrequests\n")
            .write("app.py", "print('hello')\n")
            .write("src/service/__init__.py", "")
            .write("src/service/routes.py", "ROUTES = []\n")
            .with_venv();
        project
    }

    pub fn root(&self) -> &Path {
        self.dir.path()
    }

    pub fn path(&self, relative: &str) -> PathBuf {
        self.dir.path().join(relative)
    }

    /// Write a file, creating parent directories.
    pub fn write(&self, relative: &str, contents: &str) -> &Self {
        let path = self.path(relative);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).expect("create parent dirs");
        }
        fs::write(&path, contents).expect("write project file");
        self
    }

    pub fn read(&self, relative: &str) -> String {
        fs::read_to_string(self.path(relative)).expect("read project file")
    }

    /// Create the virtualenv interpreter at the default location for this
    /// platform, so environment setup skips venv creation.
    pub fn with_venv(&self) -> &Self {
        let python = Platform::detect().venv_python(&self.path("venv"));
        if let Some(parent) = python.parent() {
            fs::create_dir_all(parent).expect("create venv bin dir");
        }
        fs::write(&python, "").expect("write venv interpreter");
        self
    }

    pub fn context(&self) -> DeployContext {
        DeployContext::new(self.root())
    }
}

/// `Services` wired to a fake runner. The runner is returned too, for
/// inspection after the run.
pub fn fake_services(config: DeployConfig) -> (Services, Arc<FakeCommandRunner>) {
    fake_services_with(config, FakeCommandRunner::new())
}

pub fn fake_services_with(
    config: DeployConfig,
    runner: FakeCommandRunner,
) -> (Services, Arc<FakeCommandRunner>) {
    let runner = Arc::new(runner);
    let services = Services::new(
        Arc::clone(&runner) as Arc<dyn CommandRunner>,
        config,
        Platform::detect(),
    );
    (services, runner)
}
