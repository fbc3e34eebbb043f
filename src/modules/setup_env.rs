// src/modules/setup_env.rs

//! Runtime environment setup: interpreter check, virtualenv, working dirs.

use std::fs;
use std::time::Duration;

use anyhow::Context;
use serde_json::json;
use tracing::{info, warn};

use crate::config::model::parse_version;
use crate::engine::context::{BACKUP_DIR, LOG_DIR};
use crate::engine::{DeployContext, DeployModule, Services};
use crate::errors::Result;
use crate::exec::{BoxFuture, CommandSpec};

use super::{short_timeout, venv_dir, venv_python};

pub struct SetupEnv {
    services: Services,
}

impl SetupEnv {
    pub const NAME: &'static str = "setup_env";

    pub fn new(services: Services) -> Self {
        Self { services }
    }

    async fn check(&self, ctx: &DeployContext) -> Result<bool> {
        let cfg = &self.services.config;

        let probe = CommandSpec::new(&cfg.runtime.python)
            .arg("--version")
            .timeout(short_timeout(cfg));
        let out = self.services.runner.run(&probe).await?;
        if !out.success() {
            warn!(module = Self::NAME, python = %cfg.runtime.python, "interpreter version probe failed");
            return Ok(false);
        }

        let found = parse_version(out.first_line());
        let floor = parse_version(&cfg.runtime.min_version);
        match (found, floor) {
            (Some(found), Some(floor)) if found >= floor => {
                info!(module = Self::NAME, version = %out.first_line(), "interpreter version ok");
            }
            _ => {
                warn!(
                    module = Self::NAME,
                    found = %out.first_line(),
                    required = %cfg.runtime.min_version,
                    "interpreter too old or version unreadable"
                );
                return Ok(false);
            }
        }

        let missing: Vec<&String> = cfg
            .setup
            .required_paths
            .iter()
            .filter(|p| !ctx.path(p.as_str()).exists())
            .collect();
        if !missing.is_empty() {
            warn!(module = Self::NAME, ?missing, "required paths missing");
            return Ok(false);
        }

        Ok(true)
    }

    async fn run(&self, ctx: &mut DeployContext) -> Result<bool> {
        let cfg = &self.services.config;
        let venv = venv_dir(ctx, cfg);
        let python = venv_python(ctx, &self.services);

        if python.exists() {
            info!(module = Self::NAME, venv = %venv.display(), "virtualenv already present");
        } else {
            let create = CommandSpec::new(&cfg.runtime.python)
                .args(["-m", "venv"])
                .arg(venv.to_string_lossy())
                .current_dir(ctx.project_root())
                .timeout(Duration::from_secs(cfg.setup.venv_timeout_secs));
            let out = self.services.runner.run(&create).await?;
            if !out.success() || !python.exists() {
                warn!(module = Self::NAME, stderr = %out.stderr.trim(), "virtualenv creation failed");
                return Ok(false);
            }
            info!(module = Self::NAME, venv = %venv.display(), "virtualenv created");
        }

        if cfg.get_or("setup.upgrade_pip", true) {
            let upgrade = CommandSpec::new(python.to_string_lossy())
                .args(["-m", "pip", "install", "--upgrade", "pip"])
                .current_dir(ctx.project_root())
                .timeout(Duration::from_secs(cfg.deps.install_timeout_secs));
            let out = self.services.runner.run(&upgrade).await?;
            if !out.success() {
                // Not fatal.
                warn!(module = Self::NAME, stderr = %out.stderr.trim(), "pip upgrade failed");
            }
        }

        let mut created = Vec::new();
        let dirs = cfg
            .setup
            .work_dirs
            .iter()
            .map(String::as_str)
            .chain([LOG_DIR, BACKUP_DIR]);
        for dir in dirs {
            let path = ctx.path(dir);
            fs::create_dir_all(&path).with_context(|| format!("creating {}", path.display()))?;
            created.push(dir.to_string());
        }

        ctx.set_artifact(
            "environment",
            json!({
                "platform": self.services.platform.family,
                "venv": venv,
                "python": python,
                "work_dirs": created,
            }),
        );
        Ok(true)
    }
}

impl DeployModule for SetupEnv {
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
        Box::pin(async {
            info!(module = Self::NAME, "leaving environment in place");
            Ok(true)
        })
    }
}
