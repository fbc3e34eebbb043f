// src/platform.rs

//! OS family detection and the shell/path conventions derived from it.

use std::path::{Path, PathBuf};

use serde::Serialize;

/// Operating-system family the deployment runs on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum OsFamily {
    Windows,
    Linux,
    MacOs,
}

/// Platform conventions used when building commands and paths.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Platform {
    pub family: OsFamily,
}

impl Platform {
    /// Detect the platform this binary was built for.
    pub fn detect() -> Self {
        Self::from_os_name(std::env::consts::OS)
    }

    /// Map an `std::env::consts::OS` style name to a platform. Unknown unix
    /// flavours are treated as linux.
    pub fn from_os_name(os: &str) -> Self {
        let family = match os {
            "windows" => OsFamily::Windows,
            "macos" | "ios" => OsFamily::MacOs,
            _ => OsFamily::Linux,
        };
        Self { family }
    }

    pub fn is_windows(&self) -> bool {
        self.family == OsFamily::Windows
    }

    /// Shell program and flag used to run a command line.
    pub fn shell(&self) -> (&'static str, &'static str) {
        if self.is_windows() {
            ("cmd", "/C")
        } else {
            ("sh", "-c")
        }
    }

    /// Name of the directory holding executables inside a virtualenv.
    pub fn venv_bin_dir(&self) -> &'static str {
        if self.is_windows() { "Scripts" } else { "bin" }
    }

    pub fn exe_suffix(&self) -> &'static str {
        if self.is_windows() { ".exe" } else { "" }
    }

    /// Separator used in `PATH`-like environment variables.
    pub fn path_list_separator(&self) -> char {
        if self.is_windows() { ';' } else { ':' }
    }

    /// Path to the python interpreter inside the given virtualenv.
    pub fn venv_python(&self, venv_dir: &Path) -> PathBuf {
        venv_dir
            .join(self.venv_bin_dir())
            .join(format!("python{}", self.exe_suffix()))
    }
}

impl Default for Platform {
    fn default() -> Self {
        Self::detect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn windows_conventions() {
        let p = Platform::from_os_name("windows");
        assert_eq!(p.family, OsFamily::Windows);
        assert_eq!(p.shell(), ("cmd", "/C"));
        assert_eq!(p.path_list_separator(), ';');
        assert_eq!(
            p.venv_python(Path::new("venv")),
            Path::new("venv").join("Scripts").join("python.exe")
        );
    }

    #[test]
    fn unix_conventions() {
        let mac = Platform::from_os_name("macos");
        assert_eq!(mac.family, OsFamily::MacOs);

        let linux = Platform::from_os_name("freebsd");
        assert_eq!(linux.family, OsFamily::Linux);
        assert_eq!(linux.shell(), ("sh", "-c"));
        assert_eq!(
            linux.venv_python(Path::new("venv")),
            Path::new("venv").join("bin").join("python")
        );
    }
}
