// src/config/model.rs

use std::sync::OnceLock;

use regex::Regex;
use serde::Deserialize;
use serde::de::DeserializeOwned;

/// Configuration as read from `deploy.toml`, before validation.
///
/// ```toml
/// [runtime]
/// python = "python3"
/// venv_dir = "venv"
/// min_version = "3.8"
///
/// [deps]
/// manifest = "requirements.txt"
/// critical_packages = ["flask", "requests"]
///
/// [build]
/// source_dirs = ["src", "templates"]
/// output_dir = "dist"
///
/// [deploy]
/// entry_point = "app.py"
/// ports = [5000]
/// health_url = "http://127.0.0.1:5000/health"
/// ```
///
/// Every section is optional and has working defaults.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawDeployConfig {
    #[serde(default)]
    pub runtime: RuntimeSection,

    #[serde(default)]
    pub setup: SetupSection,

    #[serde(default)]
    pub deps: DepsSection,

    #[serde(default)]
    pub build: BuildSection,

    #[serde(default)]
    pub deploy: DeploySection,

    #[serde(default)]
    pub health: HealthSection,

    #[serde(default)]
    pub commands: CommandsSection,

    /// The whole document as a generic table, kept for dotted-key lookups.
    #[serde(skip)]
    pub table: toml::Table,
}

/// Validated configuration. Only constructed through
/// `DeployConfig::try_from(RawDeployConfig)`.
#[derive(Debug, Clone)]
pub struct DeployConfig {
    pub runtime: RuntimeSection,
    pub setup: SetupSection,
    pub deps: DepsSection,
    pub build: BuildSection,
    pub deploy: DeploySection,
    pub health: HealthSection,
    pub commands: CommandsSection,
    table: toml::Table,
}

impl DeployConfig {
    pub(crate) fn new_unchecked(raw: RawDeployConfig) -> Self {
        Self {
            runtime: raw.runtime,
            setup: raw.setup,
            deps: raw.deps,
            build: raw.build,
            deploy: raw.deploy,
            health: raw.health,
            commands: raw.commands,
            table: raw.table,
        }
    }

    /// Look up a value by dotted key, e.g. `"deploy.ports"`.
    pub fn lookup(&self, dotted: &str) -> Option<&toml::Value> {
        let mut parts = dotted.split('.');
        let first = parts.next()?;
        let mut current = self.table.get(first)?;
        for part in parts {
            current = current.as_table()?.get(part)?;
        }
        Some(current)
    }

    /// Dotted-key lookup with a default for absent or mistyped values.
    pub fn get_or<T: DeserializeOwned>(&self, dotted: &str, default: T) -> T {
        match self.lookup(dotted) {
            Some(value) => value.clone().try_into().unwrap_or(default),
            None => default,
        }
    }

    /// Packages the health check imports: `[health].imports` if set,
    /// otherwise the critical dependency set.
    pub fn health_imports(&self) -> &[String] {
        self.health
            .imports
            .as_deref()
            .unwrap_or(&self.deps.critical_packages)
    }
}

impl Default for DeployConfig {
    fn default() -> Self {
        Self::new_unchecked(RawDeployConfig::default())
    }
}

/// `[runtime]` section.
#[derive(Debug, Clone, Deserialize)]
pub struct RuntimeSection {
    /// System interpreter used to create the virtualenv.
    #[serde(default = "default_python")]
    pub python: String,

    /// Virtualenv directory, relative to the project root.
    #[serde(default = "default_venv_dir")]
    pub venv_dir: String,

    /// Minimum interpreter version, e.g. `"3.8"`.
    #[serde(default = "default_min_version")]
    pub min_version: String,
}

fn default_python() -> String {
    if cfg!(windows) { "python" } else { "python3" }.to_string()
}

fn default_venv_dir() -> String {
    "venv".to_string()
}

fn default_min_version() -> String {
    "3.8".to_string()
}

impl Default for RuntimeSection {
    fn default() -> Self {
        Self {
            python: default_python(),
            venv_dir: default_venv_dir(),
            min_version: default_min_version(),
        }
    }
}

/// `[setup]` section.
#[derive(Debug, Clone, Deserialize)]
pub struct SetupSection {
    /// Top-level paths that must exist before anything is set up.
    #[serde(default = "default_setup_required_paths")]
    pub required_paths: Vec<String>,

    /// Working directories created during setup.
    #[serde(default = "default_work_dirs")]
    pub work_dirs: Vec<String>,

    #[serde(default = "default_venv_timeout_secs")]
    pub venv_timeout_secs: u64,
}

fn default_setup_required_paths() -> Vec<String> {
    vec!["requirements.txt".to_string()]
}

fn default_work_dirs() -> Vec<String> {
    vec!["logs".to_string(), "data".to_string()]
}

fn default_venv_timeout_secs() -> u64 {
    300
}

impl Default for SetupSection {
    fn default() -> Self {
        Self {
            required_paths: default_setup_required_paths(),
            work_dirs: default_work_dirs(),
            venv_timeout_secs: default_venv_timeout_secs(),
        }
    }
}

/// `[deps]` section.
#[derive(Debug, Clone, Deserialize)]
pub struct DepsSection {
    #[serde(default = "default_manifest")]
    pub manifest: String,

    /// Installed after the main manifest when present. A failure here is
    /// only a warning.
    #[serde(default = "default_optional_manifest")]
    pub optional_manifest: Option<String>,

    /// Packages that must be importable after installation.
    #[serde(default = "default_critical_packages")]
    pub critical_packages: Vec<String>,

    #[serde(default = "default_install_timeout_secs")]
    pub install_timeout_secs: u64,
}

fn default_manifest() -> String {
    "requirements.txt".to_string()
}

fn default_optional_manifest() -> Option<String> {
    Some("requirements-optional.txt".to_string())
}

fn default_critical_packages() -> Vec<String> {
    vec!["flask".to_string(), "requests".to_string()]
}

fn default_install_timeout_secs() -> u64 {
    900
}

impl Default for DepsSection {
    fn default() -> Self {
        Self {
            manifest: default_manifest(),
            optional_manifest: default_optional_manifest(),
            critical_packages: default_critical_packages(),
            install_timeout_secs: default_install_timeout_secs(),
        }
    }
}

/// `[build]` section.
#[derive(Debug, Clone, Deserialize)]
pub struct BuildSection {
    /// Source directories copied into the output directory.
    #[serde(default = "default_source_dirs")]
    pub source_dirs: Vec<String>,

    /// Static asset directory; skipped when absent on disk.
    #[serde(default = "default_static_dir")]
    pub static_dir: Option<String>,

    /// Output directory. Cleared on every build and removed on rollback.
    #[serde(default = "default_output_dir")]
    pub output_dir: String,

    /// Shell commands run in the project root before copying, e.g.
    /// `"npm run build"`.
    #[serde(default)]
    pub commands: Vec<String>,
}

fn default_source_dirs() -> Vec<String> {
    vec!["src".to_string()]
}

fn default_static_dir() -> Option<String> {
    Some("static".to_string())
}

fn default_output_dir() -> String {
    "dist".to_string()
}

impl Default for BuildSection {
    fn default() -> Self {
        Self {
            source_dirs: default_source_dirs(),
            static_dir: default_static_dir(),
            output_dir: default_output_dir(),
            commands: Vec::new(),
        }
    }
}

/// `[deploy]` section.
#[derive(Debug, Clone, Deserialize)]
pub struct DeploySection {
    /// Script launched with the virtualenv interpreter.
    #[serde(default = "default_entry_point")]
    pub entry_point: String,

    /// Ports the service is expected to listen on.
    #[serde(default = "default_ports")]
    pub ports: Vec<u16>,

    /// Health endpoint probed after startup; `None` skips the probe.
    #[serde(default = "default_health_url")]
    pub health_url: Option<String>,

    #[serde(default = "default_startup_timeout_secs")]
    pub startup_timeout_secs: u64,

    #[serde(default = "default_probe_interval_ms")]
    pub probe_interval_ms: u64,

    /// JSON list of service PIDs, relative to the project root.
    #[serde(default = "default_pid_file")]
    pub pid_file: String,
}

fn default_entry_point() -> String {
    "app.py".to_string()
}

fn default_ports() -> Vec<u16> {
    vec![5000]
}

fn default_health_url() -> Option<String> {
    Some("http://127.0.0.1:5000/health".to_string())
}

fn default_startup_timeout_secs() -> u64 {
    30
}

fn default_probe_interval_ms() -> u64 {
    500
}

fn default_pid_file() -> String {
    "run/service.pids".to_string()
}

impl Default for DeploySection {
    fn default() -> Self {
        Self {
            entry_point: default_entry_point(),
            ports: default_ports(),
            health_url: default_health_url(),
            startup_timeout_secs: default_startup_timeout_secs(),
            probe_interval_ms: default_probe_interval_ms(),
            pid_file: default_pid_file(),
        }
    }
}

/// `[health]` section.
#[derive(Debug, Clone, Deserialize)]
pub struct HealthSection {
    #[serde(default = "default_health_required_paths")]
    pub required_paths: Vec<String>,

    #[serde(default = "default_ports")]
    pub ports: Vec<u16>,

    /// JSON files that must exist and parse.
    #[serde(default)]
    pub json_files: Vec<String>,

    /// Packages to import; falls back to `[deps].critical_packages`.
    #[serde(default)]
    pub imports: Option<Vec<String>>,

    /// Fraction of checks that must pass when not all of them do.
    #[serde(default = "default_pass_threshold")]
    pub pass_threshold: f64,

    #[serde(default = "default_probe_timeout_ms")]
    pub probe_timeout_ms: u64,
}

fn default_health_required_paths() -> Vec<String> {
    vec!["requirements.txt".to_string(), "app.py".to_string()]
}

fn default_pass_threshold() -> f64 {
    0.8
}

fn default_probe_timeout_ms() -> u64 {
    1000
}

impl Default for HealthSection {
    fn default() -> Self {
        Self {
            required_paths: default_health_required_paths(),
            ports: default_ports(),
            json_files: Vec::new(),
            imports: None,
            pass_threshold: default_pass_threshold(),
            probe_timeout_ms: default_probe_timeout_ms(),
        }
    }
}

/// `[commands]` section.
#[derive(Debug, Clone, Deserialize)]
pub struct CommandsSection {
    /// Timeout for short commands (version probes, imports, pip upgrade).
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_timeout_secs() -> u64 {
    120
}

impl Default for CommandsSection {
    fn default() -> Self {
        Self {
            timeout_secs: default_timeout_secs(),
        }
    }
}

/// Extract a `(major, minor, patch)` version from text such as `"3.8"` or
/// `"Python 3.11.4"`. A missing patch component is `0`.
pub fn parse_version(text: &str) -> Option<(u32, u32, u32)> {
    static RE: OnceLock<Regex> = OnceLock::new();
    let re = RE.get_or_init(|| {
        Regex::new(r"(\d+)\.(\d+)(?:\.(\d+))?").expect("version regex is valid")
    });

    let caps = re.captures(text)?;
    let major = caps.get(1)?.as_str().parse().ok()?;
    let minor = caps.get(2)?.as_str().parse().ok()?;
    let patch = caps
        .get(3)
        .and_then(|m| m.as_str().parse().ok())
        .unwrap_or(0);
    Some((major, minor, patch))
}
