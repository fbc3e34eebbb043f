// src/exec/command.rs

//! Production command runner built on `tokio::process::Command`.

use std::fs::OpenOptions;
use std::process::Stdio;
use std::time::Duration;

use anyhow::{Context, anyhow};
use tokio::process::Command;
use tracing::{debug, info, warn};

use crate::errors::{DeployError, Result};
use crate::platform::Platform;

use super::backend::{BoxFuture, CommandOutput, CommandRunner, CommandSpec};

/// How long a terminated process gets to exit before it is killed.
const TERMINATE_GRACE: Duration = Duration::from_secs(3);

/// Runs real OS processes.
#[derive(Debug, Clone)]
pub struct TokioCommandRunner {
    platform: Platform,
}

impl TokioCommandRunner {
    pub fn new(platform: Platform) -> Self {
        Self { platform }
    }

    fn build(spec: &CommandSpec) -> Command {
        let mut cmd = Command::new(&spec.program);
        cmd.args(&spec.args);
        if let Some(ref dir) = spec.cwd {
            cmd.current_dir(dir);
        }
        for (key, value) in &spec.env {
            cmd.env(key, value);
        }
        cmd
    }

    async fn run_inner(&self, spec: &CommandSpec) -> Result<CommandOutput> {
        let cmd_line = spec.display();
        info!(cmd = %cmd_line, timeout_secs = spec.timeout.as_secs(), "running command");

        let mut cmd = Self::build(spec);
        cmd.stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let child = cmd
            .spawn()
            .with_context(|| format!("spawning '{cmd_line}'"))?;

        // On timeout the child is dropped and killed via kill_on_drop.
        let output = match tokio::time::timeout(spec.timeout, child.wait_with_output()).await {
            Ok(res) => res.with_context(|| format!("waiting for '{cmd_line}'"))?,
            Err(_) => {
                warn!(cmd = %cmd_line, "command timed out; killed");
                return Err(DeployError::CommandTimeout {
                    command: cmd_line,
                    secs: spec.timeout.as_secs(),
                });
            }
        };

        let result = CommandOutput {
            exit_code: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        };

        debug!(
            cmd = %cmd_line,
            exit_code = ?result.exit_code,
            stdout = %result.stdout.trim_end(),
            stderr = %result.stderr.trim_end(),
            "command finished"
        );

        Ok(result)
    }

    async fn spawn_detached_inner(
        &self,
        spec: &CommandSpec,
        log_file: &std::path::Path,
    ) -> Result<u32> {
        if let Some(parent) = log_file.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("creating log dir {}", parent.display()))?;
        }
        let out = OpenOptions::new()
            .create(true)
            .append(true)
            .open(log_file)
            .with_context(|| format!("opening service log {}", log_file.display()))?;
        let err = out.try_clone().context("duplicating service log handle")?;

        let mut cmd = Self::build(spec);
        cmd.stdin(Stdio::null())
            .stdout(Stdio::from(out))
            .stderr(Stdio::from(err))
            .kill_on_drop(false);

        #[cfg(unix)]
        cmd.process_group(0);

        #[cfg(windows)]
        {
            const DETACHED_PROCESS: u32 = 0x0000_0008;
            const CREATE_NEW_PROCESS_GROUP: u32 = 0x0000_0200;
            cmd.creation_flags(DETACHED_PROCESS | CREATE_NEW_PROCESS_GROUP);
        }

        let cmd_line = spec.display();
        let child = cmd
            .spawn()
            .with_context(|| format!("launching '{cmd_line}'"))?;
        let pid = child
            .id()
            .ok_or_else(|| anyhow!("launched '{cmd_line}' but it exited immediately"))?;

        info!(cmd = %cmd_line, pid, log = %log_file.display(), "launched detached process");
        Ok(pid)
    }

    async fn terminate_inner(&self, pid: u32) -> Result<bool> {
        if self.platform.is_windows() {
            let spec = CommandSpec::new("taskkill").args(["/PID", &pid.to_string(), "/T", "/F"]);
            let out = self.run_inner(&spec).await?;
            return Ok(out.success());
        }

        let pid_str = pid.to_string();
        let term = self
            .run_inner(&CommandSpec::new("kill").args(["-TERM", pid_str.as_str()]))
            .await?;
        if !term.success() {
            debug!(pid, "no such process");
            return Ok(false);
        }

        let deadline = tokio::time::Instant::now() + TERMINATE_GRACE;
        while tokio::time::Instant::now() < deadline {
            let alive = self
                .run_inner(&CommandSpec::new("kill").args(["-0", pid_str.as_str()]))
                .await?;
            if !alive.success() {
                return Ok(true);
            }
            tokio::time::sleep(Duration::from_millis(200)).await;
        }

        warn!(pid, "process ignored SIGTERM; sending SIGKILL");
        let kill = self
            .run_inner(&CommandSpec::new("kill").args(["-KILL", pid_str.as_str()]))
            .await?;
        Ok(kill.success())
    }

    async fn pids_on_port_inner(&self, port: u16) -> Result<Vec<u32>> {
        let spec = if self.platform.is_windows() {
            CommandSpec::new("netstat").args(["-ano", "-p", "tcp"])
        } else {
            CommandSpec::new("lsof").args(["-t", &format!("-iTCP:{port}"), "-sTCP:LISTEN"])
        };

        let out = match self.run_inner(&spec).await {
            Ok(out) => out,
            Err(e) => {
                // Best effort.
                warn!(port, error = %e, "could not look up processes on port");
                return Ok(Vec::new());
            }
        };

        Ok(if self.platform.is_windows() {
            parse_netstat_pids(&out.stdout, port)
        } else {
            parse_lsof_pids(&out.stdout)
        })
    }
}

impl CommandRunner for TokioCommandRunner {
    fn run<'a>(&'a self, spec: &'a CommandSpec) -> BoxFuture<'a, Result<CommandOutput>> {
        Box::pin(self.run_inner(spec))
    }

    fn spawn_detached<'a>(
        &'a self,
        spec: &'a CommandSpec,
        log_file: &'a std::path::Path,
    ) -> BoxFuture<'a, Result<u32>> {
        Box::pin(self.spawn_detached_inner(spec, log_file))
    }

    fn terminate(&self, pid: u32) -> BoxFuture<'_, Result<bool>> {
        Box::pin(self.terminate_inner(pid))
    }

    fn pids_on_port(&self, port: u16) -> BoxFuture<'_, Result<Vec<u32>>> {
        Box::pin(self.pids_on_port_inner(port))
    }
}

/// `lsof -t` prints one PID per line.
fn parse_lsof_pids(stdout: &str) -> Vec<u32> {
    let mut pids: Vec<u32> = stdout
        .lines()
        .filter_map(|l| l.trim().parse().ok())
        .collect();
    pids.sort_unstable();
    pids.dedup();
    pids
}

/// Pick the PID column from `netstat -ano` rows listening on `port`.
fn parse_netstat_pids(stdout: &str, port: u16) -> Vec<u32> {
    let suffix = format!(":{port}");
    let mut pids: Vec<u32> = stdout
        .lines()
        .filter_map(|line| {
            let cols: Vec<&str> = line.split_whitespace().collect();
            if cols.len() < 5 || !cols[3].eq_ignore_ascii_case("LISTENING") {
                return None;
            }
            if !cols[1].ends_with(&suffix) {
                return None;
            }
            cols[4].parse().ok()
        })
        .collect();
    pids.sort_unstable();
    pids.dedup();
    pids
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lsof_output_is_deduplicated() {
        assert_eq!(parse_lsof_pids("123\n456\n123\n\n"), vec![123, 456]);
    }

    #[test]
    fn netstat_rows_filtered_by_port_and_state() {
        let out = "\
  Proto  Local Address          Foreign Address        State           PID
  TCP    0.0.0.0:5000           0.0.0.0:0              LISTENING       4242
  TCP    0.0.0.0:50000          0.0.0.0:0              LISTENING       1111
  TCP    127.0.0.1:5000         127.0.0.1:61000        ESTABLISHED     4242
";
        assert_eq!(parse_netstat_pids(out, 5000), vec![4242]);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn timeout_is_reported_as_error() {
        let runner = TokioCommandRunner::new(Platform::detect());
        let spec = CommandSpec::new("sleep")
            .arg("5")
            .timeout(Duration::from_millis(100));
        let err = runner.run(&spec).await.unwrap_err();
        assert!(matches!(err, DeployError::CommandTimeout { .. }));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn captures_stdout_and_exit_code() {
        let runner = TokioCommandRunner::new(Platform::detect());
        let spec = CommandSpec::shell(&Platform::detect(), "echo hello; exit 3");
        let out = runner.run(&spec).await.unwrap();
        assert_eq!(out.exit_code, Some(3));
        assert_eq!(out.stdout.trim(), "hello");
    }
}
