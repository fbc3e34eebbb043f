// src/backup/mod.rs

//! Snapshots taken before mutation, and their restoration.
//!
//! [`RollbackManager`] keeps its records in call order and mirrors them to
//! `ledger.json` in the backup directory, so a later process can replay them
//! with [`RollbackManager::load`].

pub mod archive;

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::Context;
use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};

use crate::errors::{DeployError, Result};
use crate::types::BackupKind;

/// File name of the persisted record list inside the backup directory.
pub const LEDGER_FILE: &str = "ledger.json";

/// One snapshot. Never mutated after creation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BackupRecord {
    /// Original path.
    pub source: PathBuf,
    /// Archive (directories) or copy (files).
    pub backup: PathBuf,
    pub kind: BackupKind,
    pub description: String,
    pub timestamp: DateTime<Local>,
}

#[derive(Debug)]
pub struct RollbackManager {
    backup_dir: PathBuf,
    records: Vec<BackupRecord>,
}

impl RollbackManager {
    pub fn new(backup_dir: impl Into<PathBuf>) -> Self {
        Self {
            backup_dir: backup_dir.into(),
            records: Vec::new(),
        }
    }

    /// Reload a manager from the ledger in `backup_dir`. A missing ledger
    /// yields an empty manager.
    pub fn load(backup_dir: impl Into<PathBuf>) -> Result<Self> {
        let backup_dir = backup_dir.into();
        let ledger = backup_dir.join(LEDGER_FILE);
        let records = if ledger.is_file() {
            let text = fs::read_to_string(&ledger)
                .with_context(|| format!("reading {}", ledger.display()))?;
            serde_json::from_str(&text)?
        } else {
            Vec::new()
        };
        debug!(count = records.len(), ledger = %ledger.display(), "loaded backup ledger");
        Ok(Self { backup_dir, records })
    }

    pub fn backup_dir(&self) -> &Path {
        &self.backup_dir
    }

    pub fn records(&self) -> &[BackupRecord] {
        &self.records
    }

    /// Forget all records, delete the archives they point at and reset the
    /// ledger.
    pub fn clear(&mut self) -> Result<()> {
        for record in self.records.drain(..) {
            match fs::remove_file(&record.backup) {
                Ok(()) => debug!(backup = %record.backup.display(), "removed old backup"),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => {
                    warn!(backup = %record.backup.display(), error = %e, "could not remove old backup")
                }
            }
        }
        self.persist()
    }

    /// Snapshot `source`.
    ///
    /// A source that does not exist is not an error: there is nothing to
    /// protect, so no record is created and `Ok(None)` is returned.
    pub fn backup(&mut self, source: &Path, description: &str) -> Result<Option<&BackupRecord>> {
        if !source.exists() {
            debug!(source = %source.display(), "nothing to back up");
            return Ok(None);
        }

        fs::create_dir_all(&self.backup_dir)
            .with_context(|| format!("creating {}", self.backup_dir.display()))?;

        let timestamp = Local::now();
        let kind = if source.is_dir() {
            BackupKind::Directory
        } else {
            BackupKind::File
        };
        let backup = self.backup_path(source, kind, &timestamp);

        match kind {
            BackupKind::Directory => {
                let entries = archive::pack_dir(source, &backup)?;
                debug!(entries, archive = %backup.display(), "archived directory");
            }
            BackupKind::File => {
                fs::copy(source, &backup).with_context(|| {
                    format!("copying {} to {}", source.display(), backup.display())
                })?;
            }
        }

        info!(
            source = %source.display(),
            backup = %backup.display(),
            description,
            "backup created"
        );

        self.records.push(BackupRecord {
            source: source.to_path_buf(),
            backup,
            kind,
            description: description.to_string(),
            timestamp,
        });
        self.persist()?;
        Ok(self.records.last())
    }

    /// Put a snapshot back in place. Safe to repeat.
    pub fn restore(&self, record: &BackupRecord) -> Result<()> {
        if !record.backup.exists() {
            return Err(DeployError::BackupMissing {
                source_path: record.source.clone(),
                backup: record.backup.clone(),
            });
        }

        match record.kind {
            BackupKind::File => {
                if let Some(parent) = record.source.parent() {
                    fs::create_dir_all(parent)?;
                }
                if record.source.is_dir() {
                    fs::remove_dir_all(&record.source)?;
                }
                fs::copy(&record.backup, &record.source).with_context(|| {
                    format!("restoring {}", record.source.display())
                })?;
            }
            BackupKind::Directory => restore_directory(record)?,
        }

        info!(source = %record.source.display(), "restored from backup");
        Ok(())
    }

    /// Restore every record, newest first.
    ///
    /// Keeps going past failures so as much state as possible is recovered;
    /// returns `true` only if every restore succeeded.
    pub fn rollback_all(&self) -> bool {
        self.rollback_since(0)
    }

    /// Like [`rollback_all`](Self::rollback_all), limited to the records at
    /// index `start` and later.
    pub fn rollback_since(&self, start: usize) -> bool {
        let records = self.records.get(start..).unwrap_or_default();
        info!(count = records.len(), "restoring backups in reverse order");
        let mut all_ok = true;
        for record in records.iter().rev() {
            if let Err(e) = self.restore(record) {
                error!(source = %record.source.display(), error = %e, "restore failed");
                all_ok = false;
            }
        }
        all_ok
    }

    fn backup_path(&self, source: &Path, kind: BackupKind, timestamp: &DateTime<Local>) -> PathBuf {
        let stem: String = source
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "root".to_string())
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '.' { c } else { '_' })
            .collect();
        let ext = match kind {
            BackupKind::Directory => "zip",
            BackupKind::File => "bak",
        };
        self.backup_dir.join(format!(
            "{:03}_{}_{}.{}",
            self.records.len() + 1,
            stem,
            timestamp.format("%Y%m%d_%H%M%S_%3f"),
            ext
        ))
    }

    fn persist(&self) -> Result<()> {
        if !self.backup_dir.exists() && self.records.is_empty() {
            return Ok(());
        }
        fs::create_dir_all(&self.backup_dir)?;
        let ledger = self.backup_dir.join(LEDGER_FILE);
        let json = serde_json::to_string_pretty(&self.records)?;
        fs::write(&ledger, json).with_context(|| format!("writing {}", ledger.display()))?;
        Ok(())
    }
}

/// Extract into a sibling staging directory, then swap it in.
fn restore_directory(record: &BackupRecord) -> Result<()> {
    let source = &record.source;
    let name = source
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "restore".to_string());
    let staging = source.with_file_name(format!(".{name}.restore-tmp"));

    if staging.exists() {
        fs::remove_dir_all(&staging)?;
    }
    if let Err(e) = archive::unpack(&record.backup, &staging) {
        let _ = fs::remove_dir_all(&staging);
        return Err(e);
    }

    if source.is_dir() {
        fs::remove_dir_all(source)
            .with_context(|| format!("removing {} before restore", source.display()))?;
    } else if source.exists() {
        warn!(source = %source.display(), "replacing file with restored directory");
        fs::remove_file(source)?;
    }
    fs::rename(&staging, source)
        .with_context(|| format!("moving restored tree into {}", source.display()))?;
    Ok(())
}
