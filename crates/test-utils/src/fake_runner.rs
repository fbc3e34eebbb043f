use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use autodeploy::errors::{DeployError, Result};
use autodeploy::exec::{BoxFuture, CommandOutput, CommandRunner, CommandSpec};

/// Canned reply for commands whose display line contains a pattern.
#[derive(Debug, Clone)]
enum Reply {
    Output(CommandOutput),
    Timeout,
}

#[derive(Debug, Default)]
struct State {
    rules: Vec<(String, Reply)>,
    calls: Vec<CommandSpec>,
    spawned: Vec<(CommandSpec, PathBuf)>,
    terminated: Vec<u32>,
    port_pids: HashMap<u16, Vec<u32>>,
    next_pid: u32,
}

/// A fake command runner that:
/// - records every command it is asked to run
/// - answers with scripted output (latest matching rule wins)
/// - succeeds with `Python 3.11.4` on stdout when no rule matches
/// - hands out fake PIDs for detached spawns and records terminations.
#[derive(Debug)]
pub struct FakeCommandRunner {
    state: Mutex<State>,
}

impl FakeCommandRunner {
    pub const DEFAULT_STDOUT: &'static str = "Python 3.11.4";
    pub const FIRST_PID: u32 = 4242;

    pub fn new() -> Self {
        Self {
            state: Mutex::new(State {
                next_pid: Self::FIRST_PID,
                ..State::default()
            }),
        }
    }

    /// Reply with `output` to commands containing `pattern`.
    pub fn respond(self, pattern: &str, output: CommandOutput) -> Self {
        self.state
            .lock()
            .unwrap()
            .rules
            .push((pattern.to_string(), Reply::Output(output)));
        self
    }

    /// Make commands containing `pattern` exit with status 1.
    pub fn fail(self, pattern: &str) -> Self {
        self.respond(pattern, CommandOutput::failed(1, format!("scripted failure: {pattern}")))
    }

    /// Make commands containing `pattern` time out.
    pub fn time_out(self, pattern: &str) -> Self {
        self.state
            .lock()
            .unwrap()
            .rules
            .push((pattern.to_string(), Reply::Timeout));
        self
    }

    /// PIDs reported as listening on `port`.
    pub fn with_port_pids(self, port: u16, pids: Vec<u32>) -> Self {
        self.state.lock().unwrap().port_pids.insert(port, pids);
        self
    }

    /// Display lines of every `run` call so far, in order.
    pub fn calls(&self) -> Vec<String> {
        self.state
            .lock()
            .unwrap()
            .calls
            .iter()
            .map(CommandSpec::display)
            .collect()
    }

    /// Number of `run` calls whose display line contains `pattern`.
    pub fn count(&self, pattern: &str) -> usize {
        self.calls().iter().filter(|c| c.contains(pattern)).count()
    }

    pub fn ran(&self, pattern: &str) -> bool {
        self.count(pattern) > 0
    }

    /// Detached spawns with their log file.
    pub fn spawned(&self) -> Vec<(CommandSpec, PathBuf)> {
        self.state.lock().unwrap().spawned.clone()
    }

    pub fn terminated(&self) -> Vec<u32> {
        self.state.lock().unwrap().terminated.clone()
    }

    fn reply_for(&self, spec: &CommandSpec) -> Reply {
        let line = spec.display();
        let mut state = self.state.lock().unwrap();
        state.calls.push(spec.clone());
        state
            .rules
            .iter()
            .rev()
            .find(|(pattern, _)| line.contains(pattern.as_str()))
            .map(|(_, reply)| reply.clone())
            .unwrap_or_else(|| Reply::Output(CommandOutput::ok(Self::DEFAULT_STDOUT)))
    }
}

impl Default for FakeCommandRunner {
    fn default() -> Self {
        Self::new()
    }
}

impl CommandRunner for FakeCommandRunner {
    fn run<'a>(&'a self, spec: &'a CommandSpec) -> BoxFuture<'a, Result<CommandOutput>> {
        let reply = self.reply_for(spec);
        Box::pin(async move {
            match reply {
                Reply::Output(out) => Ok(out),
                Reply::Timeout => Err(DeployError::CommandTimeout {
                    command: spec.display(),
                    secs: spec.timeout.as_secs(),
                }),
            }
        })
    }

    fn spawn_detached<'a>(
        &'a self,
        spec: &'a CommandSpec,
        log_file: &'a Path,
    ) -> BoxFuture<'a, Result<u32>> {
        let mut state = self.state.lock().unwrap();
        let pid = state.next_pid;
        state.next_pid += 1;
        state.spawned.push((spec.clone(), log_file.to_path_buf()));
        Box::pin(async move { Ok(pid) })
    }

    fn terminate(&self, pid: u32) -> BoxFuture<'_, Result<bool>> {
        self.state.lock().unwrap().terminated.push(pid);
        Box::pin(async { Ok(true) })
    }

    fn pids_on_port(&self, port: u16) -> BoxFuture<'_, Result<Vec<u32>>> {
        let pids = self
            .state
            .lock()
            .unwrap()
            .port_pids
            .get(&port)
            .cloned()
            .unwrap_or_default();
        Box::pin(async move { Ok(pids) })
    }
}
