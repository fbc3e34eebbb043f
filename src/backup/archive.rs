// src/backup/archive.rs

//! Directory archives for backups.

use std::fs::{self, File};
use std::io::{self, Write};
use std::path::Path;

use anyhow::Context;
use tracing::debug;
use walkdir::WalkDir;
use zip::write::SimpleFileOptions;

use crate::errors::Result;

/// Pack `source_dir` into a deflate-compressed zip at `destination`.
///
/// Entries are stored in sorted order with `/` separators; empty
/// directories are kept. Symlinks are skipped. Returns the number of
/// entries written.
pub fn pack_dir(source_dir: &Path, destination: &Path) -> Result<usize> {
    let file = File::create(destination)
        .with_context(|| format!("creating archive {}", destination.display()))?;
    let mut zip = zip::ZipWriter::new(file);
    let base_options =
        SimpleFileOptions::default().compression_method(zip::CompressionMethod::Deflated);

    let mut count = 0;
    for entry in WalkDir::new(source_dir).min_depth(1).sort_by_file_name() {
        let entry = entry.map_err(io::Error::from)?;
        let relative = entry
            .path()
            .strip_prefix(source_dir)
            .with_context(|| format!("{} escapes {}", entry.path().display(), source_dir.display()))?;
        let name = archive_name(relative);
        let options = with_mode(base_options, &entry);

        let file_type = entry.file_type();
        if file_type.is_dir() {
            zip.add_directory(format!("{name}/"), options)?;
        } else if file_type.is_file() {
            zip.start_file(name, options)?;
            let mut input = File::open(entry.path())
                .with_context(|| format!("reading {}", entry.path().display()))?;
            io::copy(&mut input, &mut zip)?;
        } else {
            debug!(path = %entry.path().display(), "skipping non-regular entry in backup");
            continue;
        }
        count += 1;
    }

    let mut inner = zip.finish()?;
    inner.flush()?;
    Ok(count)
}

/// Extract `archive` into `destination`, which is created if missing.
pub fn unpack(archive: &Path, destination: &Path) -> Result<()> {
    fs::create_dir_all(destination)
        .with_context(|| format!("creating {}", destination.display()))?;
    let file =
        File::open(archive).with_context(|| format!("opening archive {}", archive.display()))?;
    let mut zip = zip::ZipArchive::new(file)?;
    zip.extract(destination)?;
    Ok(())
}

fn archive_name(relative: &Path) -> String {
    relative
        .components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}

#[cfg(unix)]
fn with_mode(options: SimpleFileOptions, entry: &walkdir::DirEntry) -> SimpleFileOptions {
    use std::os::unix::fs::PermissionsExt;
    match entry.metadata() {
        Ok(meta) => options.unix_permissions(meta.permissions().mode() & 0o7777),
        Err(_) => options,
    }
}

#[cfg(not(unix))]
fn with_mode(options: SimpleFileOptions, _entry: &walkdir::DirEntry) -> SimpleFileOptions {
    options
}
