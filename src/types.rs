use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Lifecycle status shared by the deployment run and the individual steps in
/// its audit log.
///
/// The run moves `Pending -> Running -> {Success | RollingBack}` and, from
/// `RollingBack`, to `RolledBack` or `Failed`. Steps only ever carry the
/// terminal variants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeployStatus {
    Pending,
    Running,
    Success,
    Failed,
    RollingBack,
    RolledBack,
}

impl Default for DeployStatus {
    fn default() -> Self {
        DeployStatus::Pending
    }
}

impl DeployStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            DeployStatus::Pending => "pending",
            DeployStatus::Running => "running",
            DeployStatus::Success => "success",
            DeployStatus::Failed => "failed",
            DeployStatus::RollingBack => "rolling_back",
            DeployStatus::RolledBack => "rolled_back",
        }
    }

    /// Whether a step with this status counts as a pass in the CLI summary.
    pub fn is_ok(self) -> bool {
        matches!(self, DeployStatus::Success | DeployStatus::RolledBack)
    }
}

impl fmt::Display for DeployStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DeployStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "pending" => Ok(DeployStatus::Pending),
            "running" => Ok(DeployStatus::Running),
            "success" => Ok(DeployStatus::Success),
            "failed" => Ok(DeployStatus::Failed),
            "rolling_back" => Ok(DeployStatus::RollingBack),
            "rolled_back" => Ok(DeployStatus::RolledBack),
            other => Err(format!("invalid deploy status: {other}")),
        }
    }
}

/// What a backup record snapshots.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackupKind {
    /// A single file copied byte-for-byte.
    File,
    /// A directory tree stored as a zip archive.
    Directory,
}
