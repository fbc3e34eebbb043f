// src/engine/module.rs

//! The three-phase module contract and the driver that sequences it.

use std::path::PathBuf;
use std::sync::Arc;

use tracing::{error, info, warn};

use super::context::DeployContext;
use super::step::StepGuard;
use crate::config::DeployConfig;
use crate::errors::Result;
use crate::exec::{BoxFuture, CommandRunner};
use crate::platform::Platform;
use crate::types::DeployStatus;

/// Shared services handed to every module at construction time.
#[derive(Clone)]
pub struct Services {
    pub runner: Arc<dyn CommandRunner>,
    pub config: Arc<DeployConfig>,
    pub platform: Platform,
}

impl Services {
    pub fn new(runner: Arc<dyn CommandRunner>, config: DeployConfig, platform: Platform) -> Self {
        Self {
            runner,
            config: Arc::new(config),
            platform,
        }
    }
}

impl std::fmt::Debug for Services {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Services")
            .field("platform", &self.platform)
            .finish_non_exhaustive()
    }
}

/// One deployment concern.
///
/// Implementations provide the three phases; [`run_module`] is the only
/// place they are sequenced. `Ok(false)` and `Err` from `execute` are
/// handled identically.
pub trait DeployModule: Send {
    /// Stable name used in the audit trail and logs.
    fn name(&self) -> &'static str;

    /// Paths the orchestrator snapshots before this module runs.
    fn backup_targets(&self, _ctx: &DeployContext) -> Vec<PathBuf> {
        Vec::new()
    }

    /// Read-only validation. Must not change the environment.
    fn check_prerequisites<'a>(&'a self, ctx: &'a DeployContext) -> BoxFuture<'a, Result<bool>>;

    /// The side-effecting work.
    fn execute<'a>(&'a mut self, ctx: &'a mut DeployContext) -> BoxFuture<'a, Result<bool>>;

    /// Best-effort undo. Must tolerate partial or absent state and be safe
    /// to call repeatedly.
    fn rollback<'a>(&'a mut self, ctx: &'a DeployContext) -> BoxFuture<'a, Result<bool>>;
}

/// Drive one module through check -> execute -> (rollback), recording the
/// outcome in the context's audit trail.
///
/// Returns `true` only if execute succeeded. A failed or faulted execute is
/// always followed by a rollback attempt, and the result is `false`
/// whatever the rollback outcome.
pub async fn run_module(module: &mut dyn DeployModule, ctx: &mut DeployContext) -> bool {
    let name = module.name();
    let mut step = StepGuard::begin(ctx, name);

    match module.check_prerequisites(step.ctx()).await {
        Ok(true) => {}
        Ok(false) => {
            warn!(module = name, "prerequisite check failed");
            step.finish(DeployStatus::Failed, "prerequisite check failed");
            return false;
        }
        Err(e) => {
            warn!(module = name, error = %e, "prerequisite check errored");
            step.finish(
                DeployStatus::Failed,
                format!("prerequisite check failed: {e}"),
            );
            return false;
        }
    }

    let failure = match module.execute(step.ctx()).await {
        Ok(true) => {
            step.finish(DeployStatus::Success, "completed");
            return true;
        }
        Ok(false) => "execution failed".to_string(),
        Err(e) => {
            error!(module = name, error = ?e, "execution fault");
            format!("execution fault: {e}")
        }
    };
    step.finish(DeployStatus::Failed, failure);

    rollback_module(module, ctx).await;
    false
}

/// Invoke a module's rollback and record the outcome as its own step.
/// Returns whether the rollback succeeded.
pub async fn rollback_module(module: &mut dyn DeployModule, ctx: &mut DeployContext) -> bool {
    let name = module.name();
    info!(module = name, "rolling back module");
    let mut step = StepGuard::begin(ctx, name);

    let outcome = module.rollback(step.ctx()).await;
    match outcome {
        Ok(true) => {
            step.finish(DeployStatus::RolledBack, "rollback completed");
            true
        }
        Ok(false) => {
            step.finish(DeployStatus::Failed, "rollback failed");
            false
        }
        Err(e) => {
            error!(module = name, error = ?e, "rollback fault");
            step.finish(DeployStatus::Failed, format!("rollback failed: {e}"));
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::DeployError;

    /// Module whose phases return scripted results and count calls.
    struct Scripted {
        check: bool,
        execute: Option<bool>,
        rollback: bool,
        rollbacks: usize,
    }

    impl DeployModule for Scripted {
        fn name(&self) -> &'static str {
            "scripted"
        }

        fn check_prerequisites<'a>(&'a self, _ctx: &'a DeployContext) -> BoxFuture<'a, Result<bool>> {
            let check = self.check;
            Box::pin(async move { Ok(check) })
        }

        fn execute<'a>(&'a mut self, _ctx: &'a mut DeployContext) -> BoxFuture<'a, Result<bool>> {
            let execute = self.execute;
            Box::pin(async move {
                execute.ok_or_else(|| DeployError::ConfigError("boom".into()))
            })
        }

        fn rollback<'a>(&'a mut self, _ctx: &'a DeployContext) -> BoxFuture<'a, Result<bool>> {
            self.rollbacks += 1;
            let rollback = self.rollback;
            Box::pin(async move { Ok(rollback) })
        }
    }

    fn statuses(ctx: &DeployContext) -> Vec<DeployStatus> {
        ctx.steps().iter().map(|s| s.status).collect()
    }

    #[tokio::test]
    async fn prerequisite_failure_skips_execute_and_rollback() {
        let mut ctx = DeployContext::new("/tmp/x");
        let mut m = Scripted { check: false, execute: Some(true), rollback: true, rollbacks: 0 };
        assert!(!run_module(&mut m, &mut ctx).await);
        assert_eq!(statuses(&ctx), vec![DeployStatus::Failed]);
        assert_eq!(m.rollbacks, 0);
    }

    #[tokio::test]
    async fn fault_and_reported_failure_both_roll_back() {
        for execute in [Some(false), None] {
            let mut ctx = DeployContext::new("/tmp/x");
            let mut m = Scripted { check: true, execute, rollback: true, rollbacks: 0 };
            assert!(!run_module(&mut m, &mut ctx).await);
            assert_eq!(m.rollbacks, 1);
            assert_eq!(
                statuses(&ctx),
                vec![DeployStatus::Failed, DeployStatus::RolledBack]
            );
        }
    }

    #[tokio::test]
    async fn failed_rollback_is_recorded_but_result_is_still_false() {
        let mut ctx = DeployContext::new("/tmp/x");
        let mut m = Scripted { check: true, execute: Some(false), rollback: false, rollbacks: 0 };
        assert!(!run_module(&mut m, &mut ctx).await);
        assert_eq!(statuses(&ctx), vec![DeployStatus::Failed, DeployStatus::Failed]);
        assert_eq!(ctx.steps()[1].message, "rollback failed");
    }

    #[tokio::test]
    async fn success_records_single_step() {
        let mut ctx = DeployContext::new("/tmp/x");
        let mut m = Scripted { check: true, execute: Some(true), rollback: true, rollbacks: 0 };
        assert!(run_module(&mut m, &mut ctx).await);
        assert_eq!(statuses(&ctx), vec![DeployStatus::Success]);
    }
}
