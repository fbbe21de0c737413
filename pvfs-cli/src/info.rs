use chrono::SecondsFormat;
use pvfs::Vfs;

use crate::error::{Error, Result};

pub fn show(vfs: &Vfs) -> Result<()> {
    let summary = vfs
        .summary()
        .ok_or_else(|| Error::Generic("nothing is mounted".to_string()))?;
    let stats = vfs.stats()?;

    println!("Mount\n-----");
    println!("  Source: {}", vfs.source_directory().display());
    println!("  Prefix: {}", vfs.mount_prefix());
    println!(
        "  Mounted at: {}",
        summary.mounted_at.to_rfc3339_opts(SecondsFormat::Secs, true)
    );
    println!("  Archives: {}", summary.archives);
    println!("  Skipped archives: {}", summary.skipped);
    println!("  Nested containers: {}", summary.nested);
    println!("  Files: {}", summary.files);
    println!("\nCache\n-----");
    println!("  Directories: {}", stats.directories);
    println!("  Cached files: {} of {}", stats.cached_files, stats.files);
    println!("  Cached bytes: {}", stats.cached_bytes);
    Ok(())
}
