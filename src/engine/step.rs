// src/engine/step.rs

//! Scoped step timer.

use std::time::Instant;

use chrono::Local;
use tracing::{info, warn};

use super::context::{DeployContext, StepRecord};
use crate::types::DeployStatus;

/// Guard for one step of the audit trail.
///
/// Created when a step starts (logged as `running`) and holding the context
/// for the step's duration. [`StepGuard::finish`] appends the terminal
/// record with its duration; a guard dropped without finishing (for example
/// because the enclosing future was cancelled) appends a `failed` record
/// with the message `interrupted`.
pub struct StepGuard<'a> {
    ctx: &'a mut DeployContext,
    name: String,
    started: Instant,
    finished: bool,
}

impl<'a> StepGuard<'a> {
    pub fn begin(ctx: &'a mut DeployContext, name: impl Into<String>) -> Self {
        let name = name.into();
        info!(step = %name, status = %DeployStatus::Running, "step started");
        Self {
            ctx,
            name,
            started: Instant::now(),
            finished: false,
        }
    }

    /// The context, reborrowed for the phase being run inside this step.
    pub fn ctx(&mut self) -> &mut DeployContext {
        self.ctx
    }

    pub fn finish(mut self, status: DeployStatus, message: impl Into<String>) {
        self.record(status, message.into());
    }

    fn record(&mut self, status: DeployStatus, message: String) {
        let duration_ms = u64::try_from(self.started.elapsed().as_millis()).unwrap_or(u64::MAX);
        if status == DeployStatus::Failed {
            warn!(step = %self.name, %status, duration_ms, message = %message, "step finished");
        } else {
            info!(step = %self.name, %status, duration_ms, message = %message, "step finished");
        }
        self.ctx.push_step(StepRecord {
            name: self.name.clone(),
            status,
            message,
            timestamp: Local::now(),
            duration_ms,
        });
        self.finished = true;
    }
}

impl Drop for StepGuard<'_> {
    fn drop(&mut self) {
        if !self.finished {
            self.record(DeployStatus::Failed, "interrupted".to_string());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn finish_records_exactly_one_step() {
        let mut ctx = DeployContext::new("/tmp/x");
        StepGuard::begin(&mut ctx, "build_app").finish(DeployStatus::Success, "done");
        assert_eq!(ctx.steps().len(), 1);
        assert_eq!(ctx.steps()[0].status, DeployStatus::Success);
        assert_eq!(ctx.steps()[0].message, "done");
    }

    #[test]
    fn dropped_guard_records_interrupted() {
        let mut ctx = DeployContext::new("/tmp/x");
        {
            let _step = StepGuard::begin(&mut ctx, "deploy_app");
        }
        assert_eq!(ctx.steps().len(), 1);
        assert_eq!(ctx.steps()[0].status, DeployStatus::Failed);
        assert_eq!(ctx.steps()[0].message, "interrupted");
    }
}
