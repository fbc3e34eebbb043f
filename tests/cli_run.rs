use autodeploy::cli::CliArgs;
use autodeploy::{resolve_project_root, run};
use autodeploy_test_utils::{TestProject, init_tracing};
use clap::Parser;

fn args(extra: &[&str]) -> CliArgs {
    let mut argv = vec!["autodeploy"];
    argv.extend_from_slice(extra);
    CliArgs::try_parse_from(argv).unwrap()
}

#[tokio::test]
async fn unwritable_result_file_fails_the_run() {
    init_tracing();
    let project = TestProject::empty();
    let root = project.root().to_string_lossy().into_owned();

    // Nothing to run, so only the result file decides the exit code.
    let ok = args(&["--task", "health", "--skip-health", "--project-root", &root]);
    assert_eq!(run(ok).await.unwrap(), 0);
    assert!(project.path("deploy_result.json").is_file());

    let blocked = args(&[
        "--task",
        "health",
        "--skip-health",
        "--project-root",
        &root,
        "--output",
        &root,
    ]);
    assert_eq!(run(blocked).await.unwrap(), 1);
}

#[test]
fn missing_project_root_is_rejected_without_creating_it() {
    let project = TestProject::empty();
    let missing = project.path("typo/app");
    let missing_str = missing.to_string_lossy().into_owned();

    let err = resolve_project_root(&args(&["--project-root", &missing_str])).unwrap_err();
    assert!(err.to_string().contains("not a directory"));
    assert!(!project.path("typo").exists());
}
