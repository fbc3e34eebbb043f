// src/exec/backend.rs

//! Pluggable command runner abstraction.
//!
//! Modules talk to a `CommandRunner` instead of spawning processes
//! themselves. Production code uses [`TokioCommandRunner`]; tests swap in a
//! fake that records invocations and returns scripted output.
//!
//! [`TokioCommandRunner`]: super::command::TokioCommandRunner

use std::future::Future;
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::time::Duration;

use crate::errors::Result;
use crate::platform::Platform;

/// Boxed future returned by [`CommandRunner`] methods.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// A process invocation: program, arguments, working directory, extra
/// environment and a timeout.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandSpec {
    pub program: String,
    pub args: Vec<String>,
    pub cwd: Option<PathBuf>,
    pub env: Vec<(String, String)>,
    pub timeout: Duration,
}

impl CommandSpec {
    pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(120);

    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            cwd: None,
            env: Vec::new(),
            timeout: Self::DEFAULT_TIMEOUT,
        }
    }

    /// Run a command line through the platform shell.
    pub fn shell(platform: &Platform, line: &str) -> Self {
        let (shell, flag) = platform.shell();
        Self::new(shell).arg(flag).arg(line)
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn current_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.cwd = Some(dir.into());
        self
    }

    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.push((key.into(), value.into()));
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Human-readable command line for logs and messages.
    pub fn display(&self) -> String {
        let mut out = self.program.clone();
        for arg in &self.args {
            out.push(' ');
            if arg.contains(' ') {
                out.push('"');
                out.push_str(arg);
                out.push('"');
            } else {
                out.push_str(arg);
            }
        }
        out
    }
}

/// Captured result of a finished process.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    /// `None` when the process was terminated by a signal.
    pub exit_code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.exit_code == Some(0)
    }

    /// Convenience constructor for a successful run with the given stdout.
    pub fn ok(stdout: impl Into<String>) -> Self {
        Self {
            exit_code: Some(0),
            stdout: stdout.into(),
            stderr: String::new(),
        }
    }

    /// Convenience constructor for a failed run.
    pub fn failed(code: i32, stderr: impl Into<String>) -> Self {
        Self {
            exit_code: Some(code),
            stdout: String::new(),
            stderr: stderr.into(),
        }
    }

    /// First non-empty line of stdout, falling back to stderr. Some
    /// interpreters print their version on stderr.
    pub fn first_line(&self) -> &str {
        self.stdout
            .lines()
            .chain(self.stderr.lines())
            .map(str::trim)
            .find(|l| !l.is_empty())
            .unwrap_or("")
    }
}

/// Trait abstracting process execution and process control.
pub trait CommandRunner: Send + Sync {
    /// Run a process to completion, capturing its output.
    ///
    /// Exceeding `spec.timeout` kills the process and yields
    /// [`DeployError::CommandTimeout`](crate::errors::DeployError::CommandTimeout).
    fn run<'a>(&'a self, spec: &'a CommandSpec) -> BoxFuture<'a, Result<CommandOutput>>;

    /// Launch a long-lived process detached from this one, sending its
    /// stdout/stderr to `log_file`. Returns the PID.
    fn spawn_detached<'a>(
        &'a self,
        spec: &'a CommandSpec,
        log_file: &'a Path,
    ) -> BoxFuture<'a, Result<u32>>;

    /// Terminate a process. `Ok(false)` means there was nothing to
    /// terminate.
    fn terminate(&self, pid: u32) -> BoxFuture<'_, Result<bool>>;

    /// PIDs of processes listening on the given TCP port.
    fn pids_on_port(&self, port: u16) -> BoxFuture<'_, Result<Vec<u32>>>;
}
