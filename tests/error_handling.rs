// tests/error_handling.rs

use std::io::Write;
use tempfile::NamedTempFile;
use autodeploy::config::{load_and_validate, load_or_default};
use autodeploy::errors::DeployError;

fn config_file(contents: &str) -> NamedTempFile {
    let mut file = NamedTempFile::new().unwrap();
    write!(file, "{contents}").unwrap();
    file
}

#[test]
fn test_threshold_out_of_range_returns_config_error() {
    let file = config_file(
        r#"
[health]
pass_threshold = 1.5
"#,
    );

    match load_and_validate(file.path()) {
        Err(DeployError::ConfigError(msg)) => {
            assert!(msg.contains("pass_threshold"));
            assert!(msg.contains("1.5"));
        }
        Err(e) => panic!("Expected ConfigError, got: {:?}", e),
        Ok(_) => panic!("Expected error, got Ok"),
    }
}

#[test]
fn test_zero_port_returns_config_error() {
    let file = config_file(
        r#"
[deploy]
ports = [8080, 0]
"#,
    );

    match load_and_validate(file.path()) {
        Err(DeployError::ConfigError(msg)) => assert!(msg.contains("ports")),
        Err(e) => panic!("Expected ConfigError, got: {:?}", e),
        Ok(_) => panic!("Expected error, got Ok"),
    }
}

#[test]
fn test_bad_min_version_returns_config_error() {
    let file = config_file(
        r#"
[runtime]
min_version = "three"
"#,
    );

    match load_and_validate(file.path()) {
        Err(DeployError::ConfigError(msg)) => assert!(msg.contains("three")),
        Err(e) => panic!("Expected ConfigError, got: {:?}", e),
        Ok(_) => panic!("Expected error, got Ok"),
    }
}

#[test]
fn test_output_dir_escaping_root_is_rejected() {
    for bad in ["../elsewhere", "/var/www", ".", ""] {
        let file = config_file(&format!("[build]\noutput_dir = \"{bad}\"\n"));
        assert!(
            matches!(load_and_validate(file.path()), Err(DeployError::ConfigError(_))),
            "output_dir '{bad}' should be rejected"
        );
    }
}

#[test]
fn test_invalid_toml_returns_toml_error() {
    let file = config_file("[deploy\nports = ");

    match load_or_default(file.path()) {
        Err(DeployError::TomlError(_)) => {}
        Err(e) => panic!("Expected TomlError, got: {:?}", e),
        Ok(_) => panic!("Expected error, got Ok"),
    }
}

#[test]
fn test_dotted_lookup_and_defaults() {
    let file = config_file(
        r#"
[setup]
upgrade_pip = false

[deploy]
ports = [8000, 8001]

[extra]
owner = "ops"
"#,
    );
    let cfg = load_and_validate(file.path()).unwrap();

    assert_eq!(cfg.deploy.ports, vec![8000, 8001]);
    assert!(!cfg.get_or("setup.upgrade_pip", true));
    assert_eq!(cfg.get_or("extra.owner", String::new()), "ops");
    assert_eq!(cfg.get_or("extra.missing", 7_i64), 7);
    assert_eq!(cfg.get_or("deploy.ports", Vec::<u16>::new()), vec![8000, 8001]);
    assert!(cfg.lookup("deploy.ports.nested").is_none());

    // Untouched sections keep their defaults.
    assert_eq!(cfg.build.output_dir, "dist");
    assert_eq!(cfg.health.pass_threshold, 0.8);
}
