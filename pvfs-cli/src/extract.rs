use std::io::Write;
use std::path::{Component, Path, PathBuf};

use filetime::FileTime;
use pvfs::{EntryRef, Vfs};
use tracing::{debug, warn};

use crate::error::{Error, Result};
use crate::utils;

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ExtractReport {
    pub written: usize,
    pub failed: usize,
    pub bytes: u64,
}

/// `cat`: raw bytes to stdout
pub fn cat(vfs: &Vfs, path: &str) -> Result<()> {
    let path = utils::full_path(vfs, Some(path));
    let bytes = vfs.read_all_bytes(&path)?;
    let stdout = std::io::stdout();
    let mut out = stdout.lock();
    out.write_all(&bytes)?;
    out.flush()?;
    Ok(())
}

/// `extract`: write one file, or a whole directory, under `destination`
pub fn extract(vfs: &Vfs, path: &str, destination: &Path) -> Result<ExtractReport> {
    let path = utils::full_path(vfs, Some(path));
    let entry = utils::resolve_any(vfs, &path)?;
    std::fs::create_dir_all(destination)?;

    let mut report = ExtractReport::default();
    if entry.is_file() {
        let output = destination.join(safe_relative_path(entry.name()));
        let bytes = entry.read_all_bytes()?;
        write_file(&output, &bytes, archive_mtime(&entry))?;
        report.written += 1;
        report.bytes += bytes.len() as u64;
    } else {
        let root = destination.join(safe_relative_path(entry.name()));
        extract_directory(&entry, &entry.path(), &root, &mut report)?;
    }

    println!(
        "Extracted {} files ({} bytes) to {}.",
        report.written,
        report.bytes,
        destination.display()
    );
    if report.failed > 0 {
        return Err(Error::Generic(format!(
            "{} files could not be extracted",
            report.failed
        )));
    }
    Ok(report)
}

/// Containers are preloaded one outer archive at a time and released after
fn extract_directory(
    dir: &EntryRef,
    base: &str,
    root: &Path,
    report: &mut ExtractReport,
) -> Result<()> {
    if dir.parent().is_none() {
        for child in dir.children().filter(|child| child.is_directory()) {
            extract_directory(&child, base, root, report)?;
        }
        return Ok(());
    }

    let preload = dir.preload(true)?;
    debug!(container = %dir.path(), loaded = preload.loaded, failed = preload.failed, "preloaded");
    let mtime = archive_mtime(dir);

    let tree = dir.tree();
    for id in tree.files(dir.id(), true)? {
        let file = EntryRef::new(std::sync::Arc::clone(tree), id);
        let file_path = file.path();
        let relative = file_path.get(base.len()..).unwrap_or_else(|| file.name());
        let output = root.join(safe_relative_path(relative));
        match file.read_all_bytes() {
            Ok(bytes) => {
                write_file(&output, &bytes, mtime)?;
                report.written += 1;
                report.bytes += bytes.len() as u64;
            }
            Err(e) => {
                warn!(file = %file_path, error = %e, "cannot extract");
                report.failed += 1;
            }
        }
    }

    dir.unload(true)?;
    Ok(())
}

fn write_file(output: &Path, bytes: &[u8], mtime: Option<FileTime>) -> Result<()> {
    if let Some(parent) = output.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(output, bytes)?;
    if let Some(mtime) = mtime {
        filetime::set_file_mtime(output, mtime)?;
    }
    Ok(())
}

/// Modification time of the outer archive on disk holding `entry`
fn archive_mtime(entry: &EntryRef) -> Option<FileTime> {
    let mut current = entry.clone();
    loop {
        if let Some(path) = current
            .entry()
            .as_directory()
            .and_then(|dir| dir.archive_path.as_ref())
        {
            let metadata = std::fs::metadata(path).ok()?;
            return Some(FileTime::from_last_modification_time(&metadata));
        }
        current = current.parent()?;
    }
}

/// Archive names never escape the destination
fn safe_relative_path(name: &str) -> PathBuf {
    Path::new(name)
        .components()
        .filter_map(|component| match component {
            Component::Normal(part) => Some(part),
            _ => None,
        })
        .collect()
}
