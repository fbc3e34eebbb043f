// src/modules/deploy_app.rs

//! Launch the application as a detached service and wait for it to come up.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Context;
use serde_json::json;
use tokio::time::Instant;
use tracing::{error, info, warn};

use crate::engine::{DeployContext, DeployModule, Services};
use crate::errors::Result;
use crate::exec::{BoxFuture, CommandSpec};
use crate::probe;

use super::{runtime_python, venv_dir};

/// Log file (inside `logs/deploy`) receiving the service's output.
pub const SERVICE_LOG: &str = "service.log";

pub struct DeployApp {
    services: Services,
    started_pid: Option<u32>,
}

impl DeployApp {
    pub const NAME: &'static str = "deploy_app";

    pub fn new(services: Services) -> Self {
        Self {
            services,
            started_pid: None,
        }
    }

    /// PID of the service launched by this instance, if any.
    pub fn started_pid(&self) -> Option<u32> {
        self.started_pid
    }

    fn pid_file(&self, ctx: &DeployContext) -> PathBuf {
        ctx.path(&self.services.config.deploy.pid_file)
    }

    async fn check(&self, ctx: &DeployContext) -> Result<bool> {
        let entry = ctx.path(&self.services.config.deploy.entry_point);
        if !entry.is_file() {
            warn!(module = Self::NAME, entry = %entry.display(), "entry point missing");
            return Ok(false);
        }
        Ok(true)
    }

    async fn run(&mut self, ctx: &mut DeployContext) -> Result<bool> {
        let cfg = self.services.config.clone();
        let pid_file = self.pid_file(ctx);

        self.stop_previous(&pid_file, &cfg.deploy.ports).await;

        let venv = venv_dir(ctx, &cfg);
        let python = runtime_python(ctx, &self.services);
        let entry = ctx.path(&cfg.deploy.entry_point);
        let platform = self.services.platform;

        let bin_dir = venv.join(platform.venv_bin_dir());
        let path_var = match std::env::var("PATH") {
            Ok(existing) if !existing.is_empty() => format!(
                "{}{}{}",
                bin_dir.display(),
                platform.path_list_separator(),
                existing
            ),
            _ => bin_dir.display().to_string(),
        };

        let spec = CommandSpec::new(python.to_string_lossy())
            .arg(entry.to_string_lossy())
            .current_dir(ctx.project_root())
            .env("VIRTUAL_ENV", venv.to_string_lossy())
            .env("PATH", path_var)
            .env("PYTHONUNBUFFERED", "1");
        let log_file = ctx.log_dir().join(SERVICE_LOG);

        let pid = self.services.runner.spawn_detached(&spec, &log_file).await?;
        self.started_pid = Some(pid);
        write_pids(&pid_file, &[pid])?;
        info!(module = Self::NAME, pid, "service launched");

        let healthy = self.wait_until_up(&cfg.deploy.ports, cfg.deploy.health_url.as_deref()).await;

        ctx.set_artifact(
            "deployment",
            json!({
                "pid": pid,
                "ports": cfg.deploy.ports,
                "health_url": cfg.deploy.health_url,
                "healthy": healthy,
                "log_file": log_file,
            }),
        );

        if !healthy {
            error!(
                module = Self::NAME,
                pid,
                timeout_secs = cfg.deploy.startup_timeout_secs,
                "service did not come up in time"
            );
        }
        Ok(healthy)
    }

    /// Stop services recorded by an earlier deployment, and anything still
    /// holding the expected ports.
    async fn stop_previous(&self, pid_file: &Path, ports: &[u16]) {
        let runner = &self.services.runner;

        for pid in read_pids(pid_file) {
            match runner.terminate(pid).await {
                Ok(true) => info!(module = Self::NAME, pid, "stopped previous service"),
                Ok(false) => {}
                Err(e) => warn!(module = Self::NAME, pid, error = %e, "failed to stop previous service"),
            }
        }

        for &port in ports {
            let pids = match runner.pids_on_port(port).await {
                Ok(pids) => pids,
                Err(e) => {
                    warn!(module = Self::NAME, port, error = %e, "port lookup failed");
                    continue;
                }
            };
            for pid in pids {
                info!(module = Self::NAME, port, pid, "stopping process holding port");
                if let Err(e) = runner.terminate(pid).await {
                    warn!(module = Self::NAME, pid, error = %e, "failed to stop process");
                }
            }
        }

        if pid_file.exists() {
            if let Err(e) = fs::remove_file(pid_file) {
                warn!(module = Self::NAME, error = %e, "could not remove stale pid file");
            }
        }
    }

    /// Poll ports and the health endpoint until both answer or the startup
    /// timeout runs out.
    async fn wait_until_up(&self, ports: &[u16], health_url: Option<&str>) -> bool {
        let deploy = &self.services.config.deploy;
        let probe_timeout = Duration::from_millis(self.services.config.health.probe_timeout_ms);
        let interval = Duration::from_millis(deploy.probe_interval_ms);
        let deadline = Instant::now() + Duration::from_secs(deploy.startup_timeout_secs);

        loop {
            let closed = probe::closed_ports(ports, probe_timeout).await;
            let healthy = match health_url {
                Some(url) if closed.is_empty() => probe::http_healthy(url, probe_timeout).await,
                Some(_) => false,
                None => true,
            };
            if closed.is_empty() && healthy {
                info!(module = Self::NAME, ?ports, "service is up");
                return true;
            }
            if Instant::now() >= deadline {
                warn!(module = Self::NAME, ?closed, healthy, "startup probe gave up");
                return false;
            }
            tokio::time::sleep(interval).await;
        }
    }

    async fn undo(&mut self, ctx: &DeployContext) -> Result<bool> {
        let pid_file = self.pid_file(ctx);
        let mut pids = read_pids(&pid_file);
        if let Some(pid) = self.started_pid.take() {
            if !pids.contains(&pid) {
                pids.push(pid);
            }
        }

        let mut ok = true;
        for pid in pids {
            match self.services.runner.terminate(pid).await {
                Ok(_) => info!(module = Self::NAME, pid, "terminated service"),
                Err(e) => {
                    warn!(module = Self::NAME, pid, error = %e, "failed to terminate service");
                    ok = false;
                }
            }
        }

        if pid_file.exists() {
            fs::remove_file(&pid_file)
                .with_context(|| format!("removing {}", pid_file.display()))?;
        }
        Ok(ok)
    }
}

impl DeployModule for DeployApp {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn check_prerequisites<'a>(&'a self, ctx: &'a DeployContext) -> BoxFuture<'a, Result<bool>> {
        Box::pin(self.check(ctx))
    }

    fn execute<'a>(&'a mut self, ctx: &'a mut DeployContext) -> BoxFuture<'a, Result<bool>> {
        Box::pin(self.run(ctx))
    }

    fn rollback<'a>(&'a mut self, ctx: &'a DeployContext) -> BoxFuture<'a, Result<bool>> {
        Box::pin(self.undo(ctx))
    }
}

/// PIDs recorded in `path`. A missing or unreadable file is an empty list.
pub fn read_pids(path: &Path) -> Vec<u32> {
    let Ok(text) = fs::read_to_string(path) else {
        return Vec::new();
    };
    match serde_json::from_str(&text) {
        Ok(pids) => pids,
        Err(e) => {
            warn!(path = %path.display(), error = %e, "ignoring malformed pid file");
            Vec::new()
        }
    }
}

pub fn write_pids(path: &Path, pids: &[u32]) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).with_context(|| format!("creating {}", parent.display()))?;
    }
    fs::write(path, serde_json::to_string(pids)?)
        .with_context(|| format!("writing {}", path.display()))?;
    Ok(())
}
