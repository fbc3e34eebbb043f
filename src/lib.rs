// src/lib.rs

pub mod backup;
pub mod cli;
pub mod config;
pub mod engine;
pub mod errors;
pub mod exec;
pub mod logging;
pub mod modules;
pub mod platform;
pub mod probe;
pub mod types;

use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use anyhow::{Context, Result};
use tracing::{error, info, warn};

use crate::backup::RollbackManager;
use crate::cli::{CliArgs, Task};
use crate::config::{default_config_path, find_project_root, load_or_default};
use crate::engine::context::DEFAULT_RESULT_FILE;
use crate::engine::{DeployContext, DeployCore, Services};
use crate::exec::TokioCommandRunner;
use crate::modules::modules_for_task;
use crate::platform::Platform;
use crate::types::DeployStatus;

/// Exit code for a run stopped by Ctrl-C.
pub const EXIT_INTERRUPTED: i32 = 130;

/// Project root from `--project-root`, else detected from the current
/// directory. An explicit root must be an existing directory.
pub fn resolve_project_root(args: &CliArgs) -> Result<PathBuf> {
    match args.project_root {
        Some(ref root) => {
            if !root.is_dir() {
                anyhow::bail!("project root {} is not a directory", root.display());
            }
            Ok(root.clone())
        }
        None => {
            let cwd = std::env::current_dir().context("reading current directory")?;
            Ok(find_project_root(&cwd))
        }
    }
}

/// High-level entry point used by `main.rs`. Returns the process exit code.
///
/// This wires together:
/// - project root and config resolution
/// - the module list for the selected task
/// - the orchestrator and its rollback manager
/// - Ctrl-C handling
/// - the result file and the console summary
pub async fn run(args: CliArgs) -> Result<i32> {
    let root = resolve_project_root(&args)?;
    let config_path = args
        .config
        .clone()
        .unwrap_or_else(|| default_config_path(&root));
    let cfg = load_or_default(&config_path)
        .with_context(|| format!("loading {}", config_path.display()))?;

    let platform = Platform::detect();
    let services = Services::new(
        Arc::new(TokioCommandRunner::new(platform)),
        cfg,
        platform,
    );

    let mut ctx = DeployContext::new(&root);
    let mut core = DeployCore::new(open_ledger(&ctx, args.task));
    if args.task == Task::Full {
        if let Err(e) = core.reset_ledger() {
            warn!(error = %e, "could not reset backup ledger");
        }
    }
    let mut modules = modules_for_task(args.task, &services, args.skip_health);

    info!(
        task = %args.task,
        root = %root.display(),
        modules = modules.len(),
        "starting deployment task"
    );

    spawn_interrupt_listener(core.interrupt_handle());

    let ok = match args.task {
        Task::Verify => core.verify(&mut ctx, &modules).await,
        Task::Rollback => core.rollback_from_ledger(&mut ctx, &mut modules).await,
        _ => core.run_all(&mut ctx, &mut modules).await,
    };
    ctx.finish();

    let output = args
        .output
        .clone()
        .unwrap_or_else(|| root.join(DEFAULT_RESULT_FILE));
    let report_written = match ctx.write_report(&output, args.task.as_str()) {
        Ok(()) => true,
        Err(e) => {
            error!(error = %e, output = %output.display(), "could not write result file");
            false
        }
    };

    print_summary(&ctx, args.task);

    let code = if core.was_interrupted() {
        EXIT_INTERRUPTED
    } else if ok && report_written {
        0
    } else {
        1
    };
    Ok(code)
}

/// Ledger the run appends to. The rollback task reloads it itself.
fn open_ledger(ctx: &DeployContext, task: Task) -> RollbackManager {
    if task == Task::Rollback {
        return RollbackManager::new(ctx.backup_dir());
    }
    RollbackManager::load(ctx.backup_dir()).unwrap_or_else(|e| {
        warn!(error = %e, "could not read backup ledger; starting a new one");
        RollbackManager::new(ctx.backup_dir())
    })
}

/// First Ctrl-C asks the orchestrator to stop before the next module; a
/// second one exits immediately.
fn spawn_interrupt_listener(flag: Arc<AtomicBool>) {
    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "failed to listen for Ctrl+C");
            return;
        }
        warn!("interrupt received; finishing current module");
        flag.store(true, Ordering::SeqCst);

        if tokio::signal::ctrl_c().await.is_ok() {
            eprintln!("second interrupt; exiting");
            std::process::exit(EXIT_INTERRUPTED);
        }
    });
}

fn print_summary(ctx: &DeployContext, task: Task) {
    println!();
    println!("autodeploy {task}: {}", ctx.project_root().display());
    for step in ctx.steps() {
        let mark = if step.status.is_ok() { "✓" } else { "✗" };
        println!(
            "  {mark} {:<16} {:<12} {} ({} ms)",
            step.name,
            step.status.as_str(),
            step.message,
            step.duration_ms
        );
    }
    let overall = match ctx.status() {
        DeployStatus::Success => "SUCCESS",
        DeployStatus::RolledBack if task == Task::Rollback => "ROLLED BACK",
        DeployStatus::RolledBack => "FAILED (rolled back)",
        _ => "FAILED",
    };
    println!("status: {overall}");
}
