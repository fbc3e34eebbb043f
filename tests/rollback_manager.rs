use std::fs;
use std::path::Path;

use autodeploy::backup::RollbackManager;
use autodeploy::errors::DeployError;
use autodeploy::types::BackupKind;
use autodeploy_test_utils::{TestProject, init_tracing};
use walkdir::WalkDir;

fn snapshot(dir: &Path) -> Vec<(String, Vec<u8>)> {
    WalkDir::new(dir)
        .sort_by_file_name()
        .into_iter()
        .map(|e| e.unwrap())
        .filter(|e| e.file_type().is_file())
        .map(|e| {
            let rel = e.path().strip_prefix(dir).unwrap().to_string_lossy().into_owned();
            (rel, fs::read(e.path()).unwrap())
        })
        .collect()
}

#[test]
fn nonexistent_source_is_not_an_error() {
    init_tracing();
    let project = TestProject::empty();
    let mut mgr = RollbackManager::new(project.path("backup/deploy"));

    assert!(mgr.backup(&project.path("nope"), "missing").unwrap().is_none());
    assert!(mgr.records().is_empty());
    assert!(mgr.rollback_all());
}

#[test]
fn directory_round_trip_is_byte_identical() {
    init_tracing();
    let project = TestProject::empty();
    project
        .write("site/index.html", "<h1>v1</h1>")
        .write("site/assets/app.js", "console.log(1)")
        .write("site/assets/deep/data.bin", "\u{0}\u{1}\u{2}binary");
    fs::create_dir_all(project.path("site/empty")).unwrap();
    let before = snapshot(&project.path("site"));

    let mut mgr = RollbackManager::new(project.path("backup/deploy"));
    let record = mgr.backup(&project.path("site"), "before build").unwrap().unwrap().clone();
    assert_eq!(record.kind, BackupKind::Directory);
    assert!(record.backup.extension().is_some_and(|e| e == "zip"));

    fs::remove_dir_all(project.path("site/assets")).unwrap();
    project.write("site/index.html", "<h1>v2</h1>").write("site/new.txt", "new");

    mgr.restore(&record).unwrap();
    assert_eq!(snapshot(&project.path("site")), before);
    assert!(project.path("site/empty").is_dir());

    // Restoring again is harmless.
    mgr.restore(&record).unwrap();
    assert_eq!(snapshot(&project.path("site")), before);
}

#[test]
fn rollback_all_restores_newest_first() {
    init_tracing();
    let project = TestProject::empty();
    project.write("settings.ini", "original");

    let mut mgr = RollbackManager::new(project.path("backup/deploy"));
    mgr.backup(&project.path("settings.ini"), "first").unwrap();
    project.write("settings.ini", "intermediate");
    mgr.backup(&project.path("settings.ini"), "second").unwrap();
    project.write("settings.ini", "final");

    assert!(mgr.rollback_all());
    // Oldest snapshot is applied last, so it wins.
    assert_eq!(project.read("settings.ini"), "original");
}

#[test]
fn missing_backup_is_reported_and_others_still_restore() {
    init_tracing();
    let project = TestProject::empty();
    project.write("a.txt", "a1").write("b.txt", "b1");

    let mut mgr = RollbackManager::new(project.path("backup/deploy"));
    let a = mgr.backup(&project.path("a.txt"), "a").unwrap().unwrap().clone();
    mgr.backup(&project.path("b.txt"), "b").unwrap();

    project.write("a.txt", "a2").write("b.txt", "b2");
    fs::remove_file(&a.backup).unwrap();

    match mgr.restore(&a) {
        Err(DeployError::BackupMissing { source_path, .. }) => {
            assert_eq!(source_path, project.path("a.txt"));
        }
        other => panic!("Expected BackupMissing, got: {:?}", other),
    }

    assert!(!mgr.rollback_all());
    assert_eq!(project.read("b.txt"), "b1");
    assert_eq!(project.read("a.txt"), "a2");
}

#[test]
fn file_restore_recreates_deleted_source() {
    init_tracing();
    let project = TestProject::empty();
    project.write("conf/app.json", "{\"debug\": false}");

    let mut mgr = RollbackManager::new(project.path("backup/deploy"));
    mgr.backup(&project.path("conf/app.json"), "config").unwrap();
    fs::remove_dir_all(project.path("conf")).unwrap();

    assert!(mgr.rollback_all());
    assert_eq!(project.read("conf/app.json"), "{\"debug\": false}");
}
