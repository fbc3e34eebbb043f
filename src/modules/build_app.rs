// src/modules/build_app.rs

//! Assemble the output directory from sources and static assets.

use std::fs::{self, File};
use std::io;
use std::path::{Path, PathBuf};

use anyhow::Context;
use chrono::Local;
use serde::Serialize;
use serde_json::json;
use tracing::{debug, info, warn};
use walkdir::WalkDir;

use crate::engine::{DeployContext, DeployModule, Services};
use crate::errors::Result;
use crate::exec::{BoxFuture, CommandSpec};

use super::short_timeout;

/// File written into the output directory listing every built file.
pub const MANIFEST_FILE: &str = "build_manifest.json";

/// One file of the build output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ManifestEntry {
    /// Path relative to the output directory, `/`-separated.
    pub path: String,
    pub size: u64,
    pub blake3: String,
}

pub struct BuildApp {
    services: Services,
}

impl BuildApp {
    pub const NAME: &'static str = "build_app";

    pub fn new(services: Services) -> Self {
        Self { services }
    }

    fn output_dir(&self, ctx: &DeployContext) -> PathBuf {
        ctx.path(&self.services.config.build.output_dir)
    }

    async fn check(&self, ctx: &DeployContext) -> Result<bool> {
        let missing: Vec<&String> = self
            .services
            .config
            .build
            .source_dirs
            .iter()
            .filter(|d| !ctx.path(d.as_str()).is_dir())
            .collect();
        if !missing.is_empty() {
            warn!(module = Self::NAME, ?missing, "source directories missing");
            return Ok(false);
        }
        Ok(true)
    }

    async fn run(&self, ctx: &mut DeployContext) -> Result<bool> {
        let cfg = &self.services.config;

        for line in &cfg.build.commands {
            let spec = CommandSpec::shell(&self.services.platform, line)
                .current_dir(ctx.project_root())
                .timeout(short_timeout(cfg));
            let out = self.services.runner.run(&spec).await?;
            if !out.success() {
                warn!(module = Self::NAME, cmd = %line, stderr = %out.stderr.trim(), "build command failed");
                return Ok(false);
            }
        }

        let out_dir = self.output_dir(ctx);
        if out_dir.exists() {
            fs::remove_dir_all(&out_dir)
                .with_context(|| format!("clearing {}", out_dir.display()))?;
        }
        fs::create_dir_all(&out_dir).with_context(|| format!("creating {}", out_dir.display()))?;

        for dir in &cfg.build.source_dirs {
            let src = ctx.path(dir);
            let copied = copy_tree(&src, &out_dir.join(dir_name(&src)))?;
            info!(module = Self::NAME, source = %dir, files = copied, "copied sources");
        }

        if let Some(ref static_dir) = cfg.build.static_dir {
            let src = ctx.path(static_dir);
            if src.is_dir() {
                let copied = copy_tree(&src, &out_dir.join(dir_name(&src)))?;
                info!(module = Self::NAME, files = copied, "copied static assets");
            } else {
                debug!(module = Self::NAME, dir = %static_dir, "no static assets");
            }
        }

        let entries = build_manifest(&out_dir)?;
        let total_bytes: u64 = entries.iter().map(|e| e.size).sum();
        let manifest_path = out_dir.join(MANIFEST_FILE);
        let manifest = json!({
            "generated_at": Local::now(),
            "output_dir": cfg.build.output_dir,
            "total_files": entries.len(),
            "total_bytes": total_bytes,
            "files": entries,
        });
        fs::write(&manifest_path, serde_json::to_string_pretty(&manifest)?)
            .with_context(|| format!("writing {}", manifest_path.display()))?;

        info!(
            module = Self::NAME,
            files = entries.len(),
            bytes = total_bytes,
            "build output ready"
        );
        ctx.set_artifact("build_manifest", json!(manifest_path));
        ctx.set_artifact(
            "build",
            json!({
                "output_dir": out_dir,
                "total_files": entries.len(),
                "total_bytes": total_bytes,
            }),
        );
        Ok(true)
    }

    async fn undo(&self, ctx: &DeployContext) -> Result<bool> {
        let out_dir = self.output_dir(ctx);
        if out_dir.exists() {
            fs::remove_dir_all(&out_dir)
                .with_context(|| format!("removing {}", out_dir.display()))?;
            info!(module = Self::NAME, dir = %out_dir.display(), "removed build output");
        }
        Ok(true)
    }
}

impl DeployModule for BuildApp {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn backup_targets(&self, ctx: &DeployContext) -> Vec<PathBuf> {
        vec![self.output_dir(ctx)]
    }

    fn check_prerequisites<'a>(&'a self, ctx: &'a DeployContext) -> BoxFuture<'a, Result<bool>> {
        Box::pin(self.check(ctx))
    }

    fn execute<'a>(&'a mut self, ctx: &'a mut DeployContext) -> BoxFuture<'a, Result<bool>> {
        Box::pin(self.run(ctx))
    }

    fn rollback<'a>(&'a mut self, ctx: &'a DeployContext) -> BoxFuture<'a, Result<bool>> {
        Box::pin(self.undo(ctx))
    }
}

fn dir_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "root".to_string())
}

/// Copy a directory tree, following symlinks. Returns the number of files
/// copied. A broken link or unreadable file aborts the copy.
pub fn copy_tree(src: &Path, dest: &Path) -> Result<usize> {
    let mut files = 0;
    for entry in WalkDir::new(src).follow_links(true).sort_by_file_name() {
        let entry = entry.map_err(io::Error::from)?;
        let relative = entry
            .path()
            .strip_prefix(src)
            .with_context(|| format!("{} escapes {}", entry.path().display(), src.display()))?;
        let target = dest.join(relative);

        if entry.file_type().is_dir() {
            fs::create_dir_all(&target)
                .with_context(|| format!("creating {}", target.display()))?;
        } else {
            fs::copy(entry.path(), &target).with_context(|| {
                format!("copying {} to {}", entry.path().display(), target.display())
            })?;
            files += 1;
        }
    }
    Ok(files)
}

/// Every file under `dir` with its size and blake3 hash, sorted by path.
pub fn build_manifest(dir: &Path) -> Result<Vec<ManifestEntry>> {
    let mut entries = Vec::new();
    for entry in WalkDir::new(dir).sort_by_file_name() {
        let entry = entry.map_err(io::Error::from)?;
        if !entry.file_type().is_file() {
            continue;
        }
        let relative = entry
            .path()
            .strip_prefix(dir)
            .with_context(|| format!("{} escapes {}", entry.path().display(), dir.display()))?;

        let mut hasher = blake3::Hasher::new();
        let mut file = File::open(entry.path())
            .with_context(|| format!("opening {}", entry.path().display()))?;
        let size = io::copy(&mut file, &mut hasher)?;

        entries.push(ManifestEntry {
            path: relative
                .components()
                .map(|c| c.as_os_str().to_string_lossy())
                .collect::<Vec<_>>()
                .join("/"),
            size,
            blake3: hasher.finalize().to_hex().to_string(),
        });
    }
    Ok(entries)
}
