// src/modules/install_deps.rs

//! Dependency installation into the virtualenv.

use std::path::Path;
use std::time::Duration;

use serde_json::json;
use tracing::{error, info, warn};

use crate::engine::{DeployContext, DeployModule, Services};
use crate::errors::Result;
use crate::exec::{BoxFuture, CommandRunner, CommandSpec};

use super::{short_timeout, venv_python};

pub struct InstallDeps {
    services: Services,
}

impl InstallDeps {
    pub const NAME: &'static str = "install_deps";

    pub fn new(services: Services) -> Self {
        Self { services }
    }

    async fn check(&self, ctx: &DeployContext) -> Result<bool> {
        let python = venv_python(ctx, &self.services);
        if !python.is_file() {
            warn!(module = Self::NAME, python = %python.display(), "virtualenv interpreter missing");
            return Ok(false);
        }

        let manifest = ctx.path(&self.services.config.deps.manifest);
        if !manifest.is_file() {
            warn!(module = Self::NAME, manifest = %manifest.display(), "dependency manifest missing");
            return Ok(false);
        }

        Ok(true)
    }

    async fn run(&self, ctx: &mut DeployContext) -> Result<bool> {
        let cfg = &self.services.config;
        let python = venv_python(ctx, &self.services);
        let install_timeout = Duration::from_secs(cfg.deps.install_timeout_secs);

        let manifest = ctx.path(&cfg.deps.manifest);
        if !self.pip_install(&python, &manifest, ctx.project_root(), install_timeout).await? {
            error!(module = Self::NAME, manifest = %manifest.display(), "dependency installation failed");
            return Ok(false);
        }

        let mut optional_installed = false;
        if let Some(ref optional) = cfg.deps.optional_manifest {
            let optional = ctx.path(optional);
            if optional.is_file() {
                optional_installed = match self
                    .pip_install(&python, &optional, ctx.project_root(), install_timeout)
                    .await
                {
                    Ok(true) => true,
                    Ok(false) => {
                        warn!(module = Self::NAME, manifest = %optional.display(), "optional dependencies failed to install");
                        false
                    }
                    Err(e) => {
                        warn!(module = Self::NAME, manifest = %optional.display(), error = %e, "optional dependency install errored");
                        false
                    }
                };
            }
        }

        let missing = missing_imports(
            self.services.runner.as_ref(),
            &python,
            &cfg.deps.critical_packages,
            short_timeout(cfg),
        )
        .await?;
        if !missing.is_empty() {
            error!(module = Self::NAME, ?missing, "critical packages not importable");
            return Ok(false);
        }

        ctx.set_artifact(
            "dependencies",
            json!({
                "manifest": cfg.deps.manifest,
                "optional_installed": optional_installed,
                "verified": cfg.deps.critical_packages,
            }),
        );
        Ok(true)
    }

    async fn pip_install(
        &self,
        python: &Path,
        manifest: &Path,
        cwd: &Path,
        timeout: Duration,
    ) -> Result<bool> {
        let spec = CommandSpec::new(python.to_string_lossy())
            .args(["-m", "pip", "install", "-r"])
            .arg(manifest.to_string_lossy())
            .current_dir(cwd)
            .timeout(timeout);
        let out = self.services.runner.run(&spec).await?;
        if out.success() {
            info!(module = Self::NAME, manifest = %manifest.display(), "installed dependencies");
        } else {
            warn!(module = Self::NAME, stderr = %out.stderr.trim(), "pip install failed");
        }
        Ok(out.success())
    }
}

/// Packages from `packages` that `python -c "import <pkg>"` cannot import.
pub(crate) async fn missing_imports(
    runner: &dyn CommandRunner,
    python: &Path,
    packages: &[String],
    timeout: Duration,
) -> Result<Vec<String>> {
    let mut missing = Vec::new();
    for package in packages {
        let spec = CommandSpec::new(python.to_string_lossy())
            .arg("-c")
            .arg(format!("import {package}"))
            .timeout(timeout);
        let out = runner.run(&spec).await?;
        if !out.success() {
            missing.push(package.clone());
        }
    }
    Ok(missing)
}

impl DeployModule for InstallDeps {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn check_prerequisites<'a>(&'a self, ctx: &'a DeployContext) -> BoxFuture<'a, Result<bool>> {
        Box::pin(self.check(ctx))
    }

    fn execute<'a>(&'a mut self, ctx: &'a mut DeployContext) -> BoxFuture<'a, Result<bool>> {
        Box::pin(self.run(ctx))
    }

    fn rollback<'a>(&'a mut self, _ctx: &'a DeployContext) -> BoxFuture<'a, Result<bool>> {
        // Installed packages stay.
        Box::pin(async { Ok(true) })
    }
}
