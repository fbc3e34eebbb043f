// src/modules/health_check.rs

//! Post-deployment health battery with a lenient aggregate pass policy.

use std::fs;
use std::time::Duration;

use serde::Serialize;
use tracing::{info, warn};

use crate::engine::{DeployContext, DeployModule, Services};
use crate::errors::Result;
use crate::exec::{BoxFuture, CommandSpec};
use crate::probe;

use super::install_deps::missing_imports;
use super::{runtime_python, short_timeout};

/// Outcome of one check in the battery.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CheckResult {
    pub name: String,
    pub passed: bool,
    pub detail: String,
}

impl CheckResult {
    fn new(name: &str, passed: bool, detail: impl Into<String>) -> Self {
        Self {
            name: name.to_string(),
            passed,
            detail: detail.into(),
        }
    }
}

/// Aggregate of a health battery run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HealthSummary {
    pub total: usize,
    pub passed: usize,
    pub failed: usize,
    pub percentage: f64,
    pub threshold: f64,
    /// Overall verdict.
    pub healthy: bool,
    pub checks: Vec<CheckResult>,
}

impl HealthSummary {
    /// Healthy when every check passed, or when the pass ratio reaches
    /// `threshold`. An empty battery is healthy.
    pub fn evaluate(checks: Vec<CheckResult>, threshold: f64) -> Self {
        let total = checks.len();
        let passed = checks.iter().filter(|c| c.passed).count();
        let failed = total - passed;
        let ratio = if total == 0 {
            1.0
        } else {
            passed as f64 / total as f64
        };
        let healthy = failed == 0 || ratio + f64::EPSILON >= threshold;
        Self {
            total,
            passed,
            failed,
            percentage: (ratio * 1000.0).round() / 10.0,
            threshold,
            healthy,
            checks,
        }
    }
}

pub struct HealthCheck {
    services: Services,
}

impl HealthCheck {
    pub const NAME: &'static str = "health_check";

    pub fn new(services: Services) -> Self {
        Self { services }
    }

    async fn check(&self, ctx: &DeployContext) -> Result<bool> {
        let runtime = self.check_runtime(ctx).await;
        if !runtime.passed {
            warn!(module = Self::NAME, detail = %runtime.detail, "runtime did not answer version probe");
        }
        Ok(runtime.passed)
    }

    async fn run(&self, ctx: &mut DeployContext) -> Result<bool> {
        let checks = vec![
            self.check_runtime(ctx).await,
            self.check_imports(ctx).await,
            self.check_paths(ctx),
            self.check_ports().await,
            self.check_json(ctx),
        ];

        for c in &checks {
            if c.passed {
                info!(module = Self::NAME, check = %c.name, detail = %c.detail, "check passed");
            } else {
                warn!(module = Self::NAME, check = %c.name, detail = %c.detail, "check failed");
            }
        }

        let summary = HealthSummary::evaluate(checks, self.services.config.health.pass_threshold);
        info!(
            module = Self::NAME,
            passed = summary.passed,
            total = summary.total,
            percentage = summary.percentage,
            healthy = summary.healthy,
            "health battery finished"
        );

        let healthy = summary.healthy;
        ctx.set_artifact("health_check", serde_json::to_value(&summary)?);
        Ok(healthy)
    }

    // Runner errors fail the check, not the battery.
    async fn check_runtime(&self, ctx: &DeployContext) -> CheckResult {
        let python = runtime_python(ctx, &self.services);
        let spec = CommandSpec::new(python.to_string_lossy())
            .arg("--version")
            .timeout(short_timeout(&self.services.config));
        match self.services.runner.run(&spec).await {
            Ok(out) => CheckResult::new("runtime", out.success(), out.first_line()),
            Err(e) => CheckResult::new("runtime", false, e.to_string()),
        }
    }

    async fn check_imports(&self, ctx: &DeployContext) -> CheckResult {
        let packages = self.services.config.health_imports();
        let python = runtime_python(ctx, &self.services);
        let missing = missing_imports(
            self.services.runner.as_ref(),
            &python,
            packages,
            short_timeout(&self.services.config),
        )
        .await;
        match missing {
            Ok(missing) if missing.is_empty() => {
                CheckResult::new("imports", true, format!("{} package(s) importable", packages.len()))
            }
            Ok(missing) => {
                CheckResult::new("imports", false, format!("not importable: {}", missing.join(", ")))
            }
            Err(e) => CheckResult::new("imports", false, e.to_string()),
        }
    }

    fn check_paths(&self, ctx: &DeployContext) -> CheckResult {
        let missing: Vec<&str> = self
            .services
            .config
            .health
            .required_paths
            .iter()
            .map(String::as_str)
            .filter(|p| !ctx.path(p).exists())
            .collect();
        if missing.is_empty() {
            CheckResult::new("required_paths", true, "all present")
        } else {
            CheckResult::new("required_paths", false, format!("missing: {}", missing.join(", ")))
        }
    }

    async fn check_ports(&self) -> CheckResult {
        let health = &self.services.config.health;
        let timeout = Duration::from_millis(health.probe_timeout_ms);
        let closed = probe::closed_ports(&health.ports, timeout).await;
        if closed.is_empty() {
            CheckResult::new("ports", true, format!("{} port(s) reachable", health.ports.len()))
        } else {
            let list: Vec<String> = closed.iter().map(u16::to_string).collect();
            CheckResult::new("ports", false, format!("unreachable: {}", list.join(", ")))
        }
    }

    fn check_json(&self, ctx: &DeployContext) -> CheckResult {
        let mut problems = Vec::new();
        for file in &self.services.config.health.json_files {
            let path = ctx.path(file);
            match fs::read_to_string(&path) {
                Ok(text) => {
                    if let Err(e) = serde_json::from_str::<serde_json::Value>(&text) {
                        problems.push(format!("{file}: {e}"));
                    }
                }
                Err(e) => problems.push(format!("{file}: {e}")),
            }
        }
        if problems.is_empty() {
            CheckResult::new("json_config", true, "all valid")
        } else {
            CheckResult::new("json_config", false, problems.join("; "))
        }
    }
}

impl DeployModule for HealthCheck {
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
        Box::pin(async { Ok(true) })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn battery(passing: usize, total: usize) -> Vec<CheckResult> {
        (0..total)
            .map(|i| CheckResult::new(&format!("c{i}"), i < passing, ""))
            .collect()
    }

    #[test]
    fn threshold_is_inclusive() {
        assert!(HealthSummary::evaluate(battery(5, 5), 0.8).healthy);
        assert!(HealthSummary::evaluate(battery(4, 5), 0.8).healthy);
        assert!(!HealthSummary::evaluate(battery(3, 5), 0.8).healthy);
        assert!(!HealthSummary::evaluate(battery(4, 5), 1.0).healthy);
    }

    #[test]
    fn summary_counts() {
        let s = HealthSummary::evaluate(battery(2, 3), 0.5);
        assert_eq!((s.total, s.passed, s.failed), (3, 2, 1));
        assert_eq!(s.percentage, 66.7);
        assert!(HealthSummary::evaluate(Vec::new(), 0.8).healthy);
    }
}
