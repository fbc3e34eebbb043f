// src/engine/orchestrator.rs

//! Sequential, fail-fast module pipeline with rollback.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tracing::{error, info, warn};

use super::context::DeployContext;
use super::module::{DeployModule, rollback_module, run_module};
use super::step::StepGuard;
use crate::backup::RollbackManager;
use crate::errors::Result;
use crate::types::DeployStatus;

/// Owns the rollback manager and drives modules in order.
#[derive(Debug)]
pub struct DeployCore {
    rollback: RollbackManager,
    interrupt: Arc<AtomicBool>,
    interrupted: bool,
}

impl DeployCore {
    pub fn new(rollback: RollbackManager) -> Self {
        Self {
            rollback,
            interrupt: Arc::new(AtomicBool::new(false)),
            interrupted: false,
        }
    }

    /// Flag checked between modules. Setting it stops the run at the next
    /// checkpoint without rolling back.
    pub fn interrupt_handle(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.interrupt)
    }

    /// Whether the last run stopped because of the interrupt flag.
    pub fn was_interrupted(&self) -> bool {
        self.interrupted
    }

    pub fn rollback_manager(&self) -> &RollbackManager {
        &self.rollback
    }

    /// Drop the records and archives of earlier runs. Called before a full
    /// deployment; partial tasks append to the existing ledger.
    pub fn reset_ledger(&mut self) -> Result<()> {
        self.rollback.clear()
    }

    /// Run every module in order.
    ///
    /// Before each module its backup targets are snapshotted. The first
    /// failure rolls back this run's snapshots (newest first) and returns `false`
    /// without touching the remaining modules. Never returns an error: the
    /// outcome is the boolean plus the context's steps and status.
    pub async fn run_all(
        &mut self,
        ctx: &mut DeployContext,
        modules: &mut [Box<dyn DeployModule>],
    ) -> bool {
        ctx.set_status(DeployStatus::Running);
        self.interrupted = false;
        let first_record = self.rollback.records().len();

        let total = modules.len();
        for (index, module) in modules.iter_mut().enumerate() {
            if self.check_interrupt(ctx) {
                return false;
            }

            info!(module = module.name(), index = index + 1, total, "running module");

            let ok = self.checkpoint(ctx, module.as_mut())
                && run_module(module.as_mut(), ctx).await;
            if !ok {
                error!(module = module.name(), "module failed; rolling back deployment");
                self.rollback_run(ctx, first_record);
                return false;
            }
        }

        ctx.set_status(DeployStatus::Success);
        info!(total, "all modules completed");
        true
    }

    /// Prerequisite-only pass: one step per module, nothing is executed.
    pub async fn verify(
        &mut self,
        ctx: &mut DeployContext,
        modules: &[Box<dyn DeployModule>],
    ) -> bool {
        ctx.set_status(DeployStatus::Running);
        let mut all_ok = true;

        for module in modules {
            let name = module.name();
            let mut step = StepGuard::begin(ctx, name);
            match module.check_prerequisites(step.ctx()).await {
                Ok(true) => step.finish(DeployStatus::Success, "prerequisites satisfied"),
                Ok(false) => {
                    all_ok = false;
                    step.finish(DeployStatus::Failed, "prerequisite check failed");
                }
                Err(e) => {
                    all_ok = false;
                    step.finish(
                        DeployStatus::Failed,
                        format!("prerequisite check failed: {e}"),
                    );
                }
            }
        }

        ctx.set_status(if all_ok {
            DeployStatus::Success
        } else {
            DeployStatus::Failed
        });
        all_ok
    }

    /// Explicit rollback of a previous run: every module's rollback in
    /// reverse order, then the persisted backups newest first.
    pub async fn rollback_from_ledger(
        &mut self,
        ctx: &mut DeployContext,
        modules: &mut [Box<dyn DeployModule>],
    ) -> bool {
        ctx.set_status(DeployStatus::RollingBack);
        let ledger = RollbackManager::load(self.rollback.backup_dir());

        let mut all_ok = true;
        for module in modules.iter_mut().rev() {
            all_ok &= rollback_module(module.as_mut(), ctx).await;
        }

        let step = StepGuard::begin(ctx, "restore_backups");
        match ledger {
            Ok(loaded) => self.rollback = loaded,
            Err(e) => {
                error!(error = %e, "could not read backup ledger");
                step.finish(DeployStatus::Failed, format!("could not read backup ledger: {e}"));
                ctx.set_status(DeployStatus::Failed);
                return false;
            }
        }
        let restored = self.rollback.rollback_all();
        let count = self.rollback.records().len();
        if restored {
            step.finish(
                DeployStatus::RolledBack,
                format!("restored {count} backup(s)"),
            );
        } else {
            step.finish(DeployStatus::Failed, "one or more backups could not be restored");
        }
        all_ok &= restored;

        ctx.set_status(if all_ok {
            DeployStatus::RolledBack
        } else {
            DeployStatus::Failed
        });
        all_ok
    }

    fn check_interrupt(&mut self, ctx: &mut DeployContext) -> bool {
        if !self.interrupt.load(Ordering::SeqCst) {
            return false;
        }
        warn!("interrupt requested; stopping before next module");
        self.interrupted = true;
        StepGuard::begin(ctx, "interrupt").finish(
            DeployStatus::Failed,
            "interrupted by operator; run rollback task to restore backups",
        );
        ctx.set_status(DeployStatus::Failed);
        true
    }

    /// Snapshot the module's targets. A failed snapshot fails the module.
    fn checkpoint(&mut self, ctx: &mut DeployContext, module: &mut dyn DeployModule) -> bool {
        let name = module.name();
        let description = format!("before {name}");
        for target in module.backup_targets(ctx) {
            if let Err(e) = self.rollback.backup(&target, &description) {
                error!(module = name, target = %target.display(), error = %e, "backup failed");
                StepGuard::begin(ctx, name).finish(
                    DeployStatus::Failed,
                    format!("backup of {} failed: {e}", target.display()),
                );
                return false;
            }
        }
        true
    }

    fn rollback_run(&mut self, ctx: &mut DeployContext, first_record: usize) {
        ctx.set_status(DeployStatus::RollingBack);
        if self.rollback.rollback_since(first_record) {
            ctx.set_status(DeployStatus::RolledBack);
        } else {
            error!("rollback incomplete; some backups could not be restored");
            ctx.set_status(DeployStatus::Failed);
        }
    }
}
