// src/engine/mod.rs

//! Deployment orchestration engine.
//!
//! - [`context`]: the per-run record (status, audit trail, artifacts) and
//!   its serialized report.
//! - [`step`]: the scoped step timer that writes the audit trail.
//! - [`module`]: the `DeployModule` contract and the `run_module` driver.
//! - [`orchestrator`]: `DeployCore`, the fail-fast pipeline with
//!   backup checkpoints and rollback.

pub mod context;
pub mod module;
pub mod orchestrator;
pub mod step;

pub use context::{DeployContext, DeployReport, StepRecord};
pub use module::{DeployModule, Services, rollback_module, run_module};
pub use orchestrator::DeployCore;
pub use step::StepGuard;
