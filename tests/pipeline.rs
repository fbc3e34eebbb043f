use std::fs;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use autodeploy::backup::RollbackManager;
use autodeploy::engine::{DeployContext, DeployCore, DeployModule, DeployReport};
use autodeploy::errors::Result;
use autodeploy::exec::BoxFuture;
use autodeploy::modules::{BuildApp, HealthCheck, InstallDeps, SetupEnv};
use autodeploy::types::DeployStatus;
use autodeploy_test_utils::builders::fake_services;
use autodeploy_test_utils::{ConfigBuilder, TestProject, init_tracing};

/// Module whose execute returns a fixed outcome and optionally raises the
/// interrupt flag.
struct Fixed {
    name: &'static str,
    outcome: bool,
    trip: Option<Arc<AtomicBool>>,
}

impl Fixed {
    fn new(name: &'static str, outcome: bool) -> Self {
        Self {
            name,
            outcome,
            trip: None,
        }
    }
}

impl DeployModule for Fixed {
    fn name(&self) -> &'static str {
        self.name
    }

    fn check_prerequisites<'a>(&'a self, _ctx: &'a DeployContext) -> BoxFuture<'a, Result<bool>> {
        Box::pin(async { Ok(true) })
    }

    fn execute<'a>(&'a mut self, _ctx: &'a mut DeployContext) -> BoxFuture<'a, Result<bool>> {
        if let Some(ref flag) = self.trip {
            flag.store(true, Ordering::SeqCst);
        }
        let outcome = self.outcome;
        Box::pin(async move { Ok(outcome) })
    }

    fn rollback<'a>(&'a mut self, _ctx: &'a DeployContext) -> BoxFuture<'a, Result<bool>> {
        Box::pin(async { Ok(true) })
    }
}

fn core_for(ctx: &DeployContext) -> DeployCore {
    DeployCore::new(RollbackManager::new(ctx.backup_dir()))
}

#[tokio::test]
async fn fresh_project_setup_deps_health_all_succeed() {
    init_tracing();
    let project = TestProject::standard();
    let (services, runner) = fake_services(ConfigBuilder::new().build());

    let mut modules: Vec<Box<dyn DeployModule>> = vec![
        Box::new(SetupEnv::new(services.clone())),
        Box::new(InstallDeps::new(services.clone())),
        Box::new(HealthCheck::new(services.clone())),
    ];
    let mut ctx = project.context();
    let mut core = core_for(&ctx);

    assert!(core.run_all(&mut ctx, &mut modules).await);
    assert_eq!(ctx.status(), DeployStatus::Success);

    let steps = ctx.steps();
    assert_eq!(steps.len(), 3);
    assert!(steps.iter().all(|s| s.status == DeployStatus::Success));
    let names: Vec<&str> = steps.iter().map(|s| s.name.as_str()).collect();
    assert_eq!(names, vec!["setup_env", "install_deps", "health_check"]);

    assert!(runner.ran("pip install -r"));
    assert!(ctx.artifact("environment").is_some());
    assert!(ctx.artifact("health_check").is_some());
    assert!(project.path("logs/deploy").is_dir());
}

#[tokio::test]
async fn missing_manifest_stops_before_build() {
    init_tracing();
    let project = TestProject::standard();
    fs::remove_file(project.path("requirements.txt")).unwrap();
    let (services, runner) = fake_services(ConfigBuilder::new().build());

    let mut modules: Vec<Box<dyn DeployModule>> = vec![
        Box::new(InstallDeps::new(services.clone())),
        Box::new(BuildApp::new(services.clone())),
    ];
    let mut ctx = project.context();
    let mut core = core_for(&ctx);

    assert!(!core.run_all(&mut ctx, &mut modules).await);

    let steps = ctx.steps();
    assert_eq!(steps.len(), 1);
    assert_eq!(steps[0].name, "install_deps");
    assert_eq!(steps[0].status, DeployStatus::Failed);
    assert_eq!(steps[0].message, "prerequisite check failed");

    assert!(!project.path("dist").exists(), "build must not run");
    assert!(!runner.ran("pip install"));
    assert_eq!(ctx.status(), DeployStatus::RolledBack);
}

#[tokio::test]
async fn later_failure_restores_earlier_build_output() {
    init_tracing();
    let project = TestProject::standard();
    project.write("dist/old.txt", "v1");
    let (services, _runner) = fake_services(ConfigBuilder::new().build());

    let mut modules: Vec<Box<dyn DeployModule>> = vec![
        Box::new(BuildApp::new(services.clone())),
        Box::new(Fixed::new("deploy_app", false)),
        Box::new(Fixed::new("never_runs", true)),
    ];
    let mut ctx = project.context();
    let mut core = core_for(&ctx);

    assert!(!core.run_all(&mut ctx, &mut modules).await);
    assert_eq!(ctx.status(), DeployStatus::RolledBack);

    // The previous output is back and the new build is gone.
    assert_eq!(project.read("dist/old.txt"), "v1");
    assert!(!project.path("dist/build_manifest.json").exists());

    let names: Vec<(&str, DeployStatus)> = ctx
        .steps()
        .iter()
        .map(|s| (s.name.as_str(), s.status))
        .collect();
    assert_eq!(
        names,
        vec![
            ("build_app", DeployStatus::Success),
            ("deploy_app", DeployStatus::Failed),
            ("deploy_app", DeployStatus::RolledBack),
        ]
    );
    assert_eq!(core.rollback_manager().records().len(), 1);
}

#[tokio::test]
async fn interrupt_stops_before_next_module_without_rollback() {
    init_tracing();
    let project = TestProject::empty();
    let mut ctx = project.context();
    let mut core = core_for(&ctx);

    let mut first = Fixed::new("first", true);
    first.trip = Some(core.interrupt_handle());
    let mut modules: Vec<Box<dyn DeployModule>> =
        vec![Box::new(first), Box::new(Fixed::new("second", true))];

    assert!(!core.run_all(&mut ctx, &mut modules).await);
    assert!(core.was_interrupted());
    assert_eq!(ctx.status(), DeployStatus::Failed);

    let names: Vec<&str> = ctx.steps().iter().map(|s| s.name.as_str()).collect();
    assert_eq!(names, vec!["first", "interrupt"]);
}

#[tokio::test]
async fn verify_checks_without_executing() {
    init_tracing();
    let project = TestProject::standard();
    let (services, runner) = fake_services(ConfigBuilder::new().build());
    let modules: Vec<Box<dyn DeployModule>> = vec![
        Box::new(SetupEnv::new(services.clone())),
        Box::new(BuildApp::new(services.clone())),
    ];
    let mut ctx = project.context();
    let mut core = core_for(&ctx);

    assert!(core.verify(&mut ctx, &modules).await);
    assert_eq!(ctx.steps().len(), 2);
    assert!(!project.path("dist").exists());
    assert!(!runner.ran("pip"));
}

#[tokio::test]
async fn rollback_task_replays_ledger_from_disk() {
    init_tracing();
    let project = TestProject::standard();
    project.write("dist/index.html", "previous");
    let (services, _runner) = fake_services(ConfigBuilder::new().build());

    // A full run leaves the ledger behind.
    {
        let mut modules: Vec<Box<dyn DeployModule>> =
            vec![Box::new(BuildApp::new(services.clone()))];
        let mut ctx = project.context();
        let mut core = core_for(&ctx);
        assert!(core.run_all(&mut ctx, &mut modules).await);
        assert!(!project.path("dist/index.html").exists());
    }

    // A fresh process rolls it back.
    let mut modules: Vec<Box<dyn DeployModule>> = vec![Box::new(BuildApp::new(services))];
    let mut ctx = project.context();
    let mut core = core_for(&ctx);
    assert!(core.rollback_from_ledger(&mut ctx, &mut modules).await);

    assert_eq!(ctx.status(), DeployStatus::RolledBack);
    assert_eq!(project.read("dist/index.html"), "previous");
    let last = ctx.steps().last().unwrap();
    assert_eq!(last.name, "restore_backups");
    assert_eq!(last.message, "restored 1 backup(s)");
}

#[tokio::test]
async fn partial_run_keeps_earlier_ledger() {
    init_tracing();
    let project = TestProject::standard();
    project.write("dist/index.html", "previous");
    let (services, _runner) = fake_services(ConfigBuilder::new().build());

    {
        let mut modules: Vec<Box<dyn DeployModule>> =
            vec![Box::new(BuildApp::new(services.clone()))];
        let mut ctx = project.context();
        let mut core = core_for(&ctx);
        assert!(core.run_all(&mut ctx, &mut modules).await);
    }
    project.write("dist/index.html", "built");

    // A later failing partial task neither forgets nor replays that record.
    let mut ctx = project.context();
    let mut core = DeployCore::new(RollbackManager::load(ctx.backup_dir()).unwrap());
    let mut modules: Vec<Box<dyn DeployModule>> = vec![Box::new(Fixed::new("health", false))];
    assert!(!core.run_all(&mut ctx, &mut modules).await);
    assert_eq!(ctx.status(), DeployStatus::RolledBack);
    assert_eq!(project.read("dist/index.html"), "built");

    let reloaded = RollbackManager::load(ctx.backup_dir()).unwrap();
    assert_eq!(reloaded.records().len(), 1);
}

#[tokio::test]
async fn reset_ledger_drops_records_and_archives() {
    init_tracing();
    let project = TestProject::standard();
    project.write("dist/index.html", "previous");
    let (services, _runner) = fake_services(ConfigBuilder::new().build());
    let mut modules: Vec<Box<dyn DeployModule>> = vec![Box::new(BuildApp::new(services))];
    let mut ctx = project.context();
    let mut core = core_for(&ctx);
    assert!(core.run_all(&mut ctx, &mut modules).await);

    let archive = core.rollback_manager().records()[0].backup.clone();
    assert!(archive.is_file());

    core.reset_ledger().unwrap();
    assert!(core.rollback_manager().records().is_empty());
    assert!(!archive.exists());
    assert!(RollbackManager::load(ctx.backup_dir()).unwrap().records().is_empty());
}

#[tokio::test]
async fn unreadable_ledger_fails_the_rollback_task() {
    init_tracing();
    let project = TestProject::empty();
    project.write("backup/deploy/ledger.json", "not a ledger {");
    let mut ctx = project.context();
    let mut core = core_for(&ctx);
    let mut modules: Vec<Box<dyn DeployModule>> = vec![Box::new(Fixed::new("only", true))];

    assert!(!core.rollback_from_ledger(&mut ctx, &mut modules).await);
    assert_eq!(ctx.status(), DeployStatus::Failed);
    let last = ctx.steps().last().unwrap();
    assert_eq!(last.name, "restore_backups");
    assert_eq!(last.status, DeployStatus::Failed);
    assert!(last.message.starts_with("could not read backup ledger"));
    assert!(!ctx.report("rollback").success);
}

#[tokio::test]
async fn result_file_carries_the_run() {
    init_tracing();
    let project = TestProject::empty();
    let mut ctx = project.context();
    let mut core = core_for(&ctx);
    let mut modules: Vec<Box<dyn DeployModule>> = vec![Box::new(Fixed::new("only", true))];

    assert!(core.run_all(&mut ctx, &mut modules).await);
    ctx.finish();
    let out = project.path("reports/result.json");
    ctx.write_report(&out, "full").unwrap();

    let report: DeployReport = serde_json::from_str(&fs::read_to_string(&out).unwrap()).unwrap();
    assert!(report.success);
    assert_eq!(report.task, "full");
    assert_eq!(report.status, DeployStatus::Success);
    assert_eq!(report.steps.len(), 1);
    assert!(report.end_time.is_some());

    let raw: serde_json::Value = serde_json::from_str(&fs::read_to_string(&out).unwrap()).unwrap();
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
        assert!(raw.get(key).is_some(), "missing {key}");
    }
    assert_eq!(raw["steps"][0]["status"], "success");
}
