// src/cli.rs

//! CLI argument parsing using `clap`.

use std::path::PathBuf;

use clap::{Parser, ValueEnum};

/// Command-line arguments for `autodeploy`.
#[derive(Debug, Clone, Parser)]
#[command(
    name = "autodeploy",
    version,
    about = "Deploy a Python web service: environment, dependencies, build, launch, health.",
    long_about = None
)]
pub struct CliArgs {
    /// Which part of the pipeline to run.
    #[arg(long, value_enum, default_value_t = Task::Full)]
    pub task: Task,

    /// Project root. Defaults to the nearest ancestor of the current
    /// directory containing `deploy.toml`, else the current directory.
    #[arg(long, value_name = "PATH")]
    pub project_root: Option<PathBuf>,

    /// Config file (TOML). Default: `<root>/deploy.toml`; a missing file
    /// means built-in defaults.
    #[arg(long, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Where to write the result JSON. Default: `<root>/deploy_result.json`.
    #[arg(long, value_name = "PATH")]
    pub output: Option<PathBuf>,

    /// Leave the health check out of the module list.
    #[arg(long)]
    pub skip_health: bool,

    /// Shorthand for `--log-level debug`.
    #[arg(short, long)]
    pub verbose: bool,

    /// Logging level (error, warn, info, debug, trace).
    ///
    /// If omitted, `--verbose`, `AUTODEPLOY_LOG` or a default level is used.
    #[arg(long, value_enum, value_name = "LEVEL")]
    pub log_level: Option<LogLevel>,
}

/// Pipeline selection.
#[derive(Debug, Copy, Clone, PartialEq, Eq, ValueEnum)]
pub enum Task {
    Full,
    Setup,
    Deps,
    Health,
    Verify,
    Rollback,
}

impl Task {
    pub fn as_str(self) -> &'static str {
        match self {
            Task::Full => "full",
            Task::Setup => "setup",
            Task::Deps => "deps",
            Task::Health => "health",
            Task::Verify => "verify",
            Task::Rollback => "rollback",
        }
    }
}

impl std::fmt::Display for Task {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Log level as exposed on the CLI.
#[derive(Debug, Copy, Clone, PartialEq, Eq, ValueEnum)]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

/// Convenience wrapper around `CliArgs::parse()`.
pub fn parse() -> CliArgs {
    CliArgs::parse()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_to_full_deployment() {
        let args = CliArgs::try_parse_from(["autodeploy"]).unwrap();
        assert_eq!(args.task, Task::Full);
        assert!(!args.skip_health);
        assert!(args.project_root.is_none());
    }

    #[test]
    fn parses_task_and_flags() {
        let args = CliArgs::try_parse_from([
            "autodeploy",
            "--task",
            "rollback",
            "--project-root",
            "/srv/app",
            "--skip-health",
            "--verbose",
            "--log-level",
            "trace",
        ])
        .unwrap();
        assert_eq!(args.task, Task::Rollback);
        assert_eq!(args.project_root, Some(PathBuf::from("/srv/app")));
        assert!(args.skip_health && args.verbose);
        assert_eq!(args.log_level, Some(LogLevel::Trace));

        assert!(CliArgs::try_parse_from(["autodeploy", "--task", "nope"]).is_err());
    }
}
