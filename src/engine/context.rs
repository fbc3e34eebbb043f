// src/engine/context.rs

//! Mutable record of one deployment run.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::Context;
use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::info;

use crate::errors::Result;
use crate::types::DeployStatus;

/// Directory holding rollback archives, relative to the project root.
pub const BACKUP_DIR: &str = "backup/deploy";
/// Directory holding run and service logs, relative to the project root.
pub const LOG_DIR: &str = "logs/deploy";
/// Default result file name.
pub const DEFAULT_RESULT_FILE: &str = "deploy_result.json";

/// One entry of the audit trail.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepRecord {
    pub name: String,
    pub status: DeployStatus,
    pub message: String,
    pub timestamp: DateTime<Local>,
    #[serde(default)]
    pub duration_ms: u64,
}

/// State of an in-progress deployment, shared in turn by every module and
/// the orchestrator.
///
/// `steps` is append-only. `status` is only changed by the orchestrator.
#[derive(Debug, Clone)]
pub struct DeployContext {
    project_root: PathBuf,
    start_time: DateTime<Local>,
    end_time: Option<DateTime<Local>>,
    status: DeployStatus,
    steps: Vec<StepRecord>,
    artifacts: BTreeMap<String, Value>,
}

impl DeployContext {
    pub fn new(project_root: impl Into<PathBuf>) -> Self {
        Self {
            project_root: project_root.into(),
            start_time: Local::now(),
            end_time: None,
            status: DeployStatus::Pending,
            steps: Vec::new(),
            artifacts: BTreeMap::new(),
        }
    }

    pub fn project_root(&self) -> &Path {
        &self.project_root
    }

    /// Resolve a project-relative path.
    pub fn path(&self, relative: impl AsRef<Path>) -> PathBuf {
        self.project_root.join(relative)
    }

    pub fn backup_dir(&self) -> PathBuf {
        self.path(BACKUP_DIR)
    }

    pub fn log_dir(&self) -> PathBuf {
        self.path(LOG_DIR)
    }

    pub fn start_time(&self) -> DateTime<Local> {
        self.start_time
    }

    pub fn end_time(&self) -> Option<DateTime<Local>> {
        self.end_time
    }

    pub fn status(&self) -> DeployStatus {
        self.status
    }

    pub(crate) fn set_status(&mut self, status: DeployStatus) {
        if self.status != status {
            info!(from = %self.status, to = %status, "deployment status changed");
            self.status = status;
        }
    }

    pub fn steps(&self) -> &[StepRecord] {
        &self.steps
    }

    pub(crate) fn push_step(&mut self, step: StepRecord) {
        self.steps.push(step);
    }

    pub fn artifacts(&self) -> &BTreeMap<String, Value> {
        &self.artifacts
    }

    pub fn artifact(&self, key: &str) -> Option<&Value> {
        self.artifacts.get(key)
    }

    /// Store a named artifact for later reporting. Later writes to the same
    /// key replace earlier ones.
    pub fn set_artifact(&mut self, key: impl Into<String>, value: Value) {
        self.artifacts.insert(key.into(), value);
    }

    /// Stamp the end time. Called once the run is over.
    pub fn finish(&mut self) {
        self.end_time = Some(Local::now());
    }

    /// Snapshot of the run. A `rollback` task counts as successful when
    /// everything was rolled back.
    pub fn report(&self, task: &str) -> DeployReport {
        DeployReport {
            project_root: self.project_root.clone(),
            start_time: self.start_time,
            end_time: self.end_time,
            status: self.status,
            steps: self.steps.clone(),
            artifacts: self.artifacts.clone(),
            task: task.to_string(),
            success: self.status == DeployStatus::Success
                || (task == "rollback" && self.status == DeployStatus::RolledBack),
        }
    }

    /// Serialize the run into `path` as pretty JSON.
    pub fn write_report(&self, path: &Path, task: &str) -> Result<()> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)
                    .with_context(|| format!("creating {}", parent.display()))?;
            }
        }
        let json = serde_json::to_string_pretty(&self.report(task))?;
        fs::write(path, json).with_context(|| format!("writing result file {}", path.display()))?;
        info!(path = %path.display(), "wrote deployment result");
        Ok(())
    }
}

/// Serialized form of a finished run (the result file).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeployReport {
    pub project_root: PathBuf,
    pub start_time: DateTime<Local>,
    pub end_time: Option<DateTime<Local>>,
    pub status: DeployStatus,
    pub steps: Vec<StepRecord>,
    pub artifacts: BTreeMap<String, Value>,
    pub task: String,
    pub success: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn report_round_trips_through_json() {
        let dir = tempfile::tempdir().unwrap();
        let mut ctx = DeployContext::new(dir.path());
        ctx.set_status(DeployStatus::Success);
        ctx.set_artifact("build_manifest", json!("dist/build_manifest.json"));
        ctx.finish();

        let out = dir.path().join("out").join("deploy_result.json");
        ctx.write_report(&out, "full").unwrap();

        let text = fs::read_to_string(&out).unwrap();
        let value: Value = serde_json::from_str(&text).unwrap();
        for key in [
            "project_root",
            "start_time",
            "end_time",
            "status",
            "steps",
            "artifacts",
            "task",
            "success",
        ] {
            assert!(value.get(key).is_some(), "missing key {key}");
        }
        assert_eq!(value["status"], "success");
        assert_eq!(value["success"], true);
        assert_eq!(value["task"], "full");
    }

    #[test]
    fn layout_paths_are_under_root() {
        let ctx = DeployContext::new("/srv/app");
        assert_eq!(ctx.backup_dir(), Path::new("/srv/app/backup/deploy"));
        assert_eq!(ctx.log_dir(), Path::new("/srv/app/logs/deploy"));
    }
}
