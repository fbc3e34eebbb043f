// src/modules/mod.rs

//! Concrete deployment modules and the task → module factory.
//!
//! Every module receives a [`Services`] bundle at construction and reads
//! its settings from the shared [`DeployConfig`].

pub mod build_app;
pub mod deploy_app;
pub mod health_check;
pub mod install_deps;
pub mod setup_env;

use std::path::PathBuf;
use std::time::Duration;

pub use build_app::BuildApp;
pub use deploy_app::DeployApp;
pub use health_check::{CheckResult, HealthCheck, HealthSummary};
pub use install_deps::InstallDeps;
pub use setup_env::SetupEnv;

use crate::cli::Task;
use crate::config::DeployConfig;
use crate::engine::{DeployContext, DeployModule, Services};

/// The closed set of modules this tool knows how to run.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum ModuleKind {
    SetupEnv,
    InstallDeps,
    BuildApp,
    DeployApp,
    HealthCheck,
}

impl ModuleKind {
    /// Pipeline order for a full deployment.
    pub const ALL: [ModuleKind; 5] = [
        ModuleKind::SetupEnv,
        ModuleKind::InstallDeps,
        ModuleKind::BuildApp,
        ModuleKind::DeployApp,
        ModuleKind::HealthCheck,
    ];

    pub fn name(self) -> &'static str {
        match self {
            ModuleKind::SetupEnv => SetupEnv::NAME,
            ModuleKind::InstallDeps => InstallDeps::NAME,
            ModuleKind::BuildApp => BuildApp::NAME,
            ModuleKind::DeployApp => DeployApp::NAME,
            ModuleKind::HealthCheck => HealthCheck::NAME,
        }
    }

    pub fn create(self, services: &Services) -> Box<dyn DeployModule> {
        let services = services.clone();
        match self {
            ModuleKind::SetupEnv => Box::new(SetupEnv::new(services)),
            ModuleKind::InstallDeps => Box::new(InstallDeps::new(services)),
            ModuleKind::BuildApp => Box::new(BuildApp::new(services)),
            ModuleKind::DeployApp => Box::new(DeployApp::new(services)),
            ModuleKind::HealthCheck => Box::new(HealthCheck::new(services)),
        }
    }

    /// Modules a task operates on, in pipeline order. `verify` and
    /// `rollback` cover the full pipeline.
    pub fn for_task(task: Task) -> Vec<ModuleKind> {
        match task {
            Task::Full | Task::Verify | Task::Rollback => Self::ALL.to_vec(),
            Task::Setup => vec![ModuleKind::SetupEnv],
            Task::Deps => vec![ModuleKind::InstallDeps],
            Task::Health => vec![ModuleKind::HealthCheck],
        }
    }
}

/// Instantiate the modules for `task`, dropping the health check when
/// `skip_health` is set.
pub fn modules_for_task(
    task: Task,
    services: &Services,
    skip_health: bool,
) -> Vec<Box<dyn DeployModule>> {
    ModuleKind::for_task(task)
        .into_iter()
        .filter(|kind| !(skip_health && *kind == ModuleKind::HealthCheck))
        .map(|kind| kind.create(services))
        .collect()
}

/// Timeout for short commands such as version and import probes.
pub(crate) fn short_timeout(cfg: &DeployConfig) -> Duration {
    Duration::from_secs(cfg.commands.timeout_secs)
}

pub(crate) fn venv_dir(ctx: &DeployContext, cfg: &DeployConfig) -> PathBuf {
    ctx.path(&cfg.runtime.venv_dir)
}

pub(crate) fn venv_python(ctx: &DeployContext, services: &Services) -> PathBuf {
    services
        .platform
        .venv_python(&venv_dir(ctx, &services.config))
}

/// The virtualenv interpreter when it exists, else the configured system one.
pub(crate) fn runtime_python(ctx: &DeployContext, services: &Services) -> PathBuf {
    let venv = venv_python(ctx, services);
    if venv.is_file() {
        venv
    } else {
        PathBuf::from(&services.config.runtime.python)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn task_mapping_follows_pipeline_order() {
        let names = |task| -> Vec<&str> {
            ModuleKind::for_task(task)
                .into_iter()
                .map(ModuleKind::name)
                .collect()
        };
        assert_eq!(
            names(Task::Full),
            vec!["setup_env", "install_deps", "build_app", "deploy_app", "health_check"]
        );
        assert_eq!(names(Task::Setup), vec!["setup_env"]);
        assert_eq!(names(Task::Deps), vec!["install_deps"]);
        assert_eq!(names(Task::Health), vec!["health_check"]);
        assert_eq!(names(Task::Verify), names(Task::Full));
        assert_eq!(names(Task::Rollback), names(Task::Full));
    }
}
