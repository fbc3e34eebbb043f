// src/exec/mod.rs

//! Process execution layer.
//!
//! - [`backend`] defines the `CommandRunner` trait and the command/output
//!   value types that modules build and inspect.
//! - [`command`] provides `TokioCommandRunner`, the production runner using
//!   `tokio::process::Command` with timeouts, detached launches and
//!   PID/port based process control.

pub mod backend;
pub mod command;

pub use backend::{BoxFuture, CommandOutput, CommandRunner, CommandSpec};
pub use command::TokioCommandRunner;
