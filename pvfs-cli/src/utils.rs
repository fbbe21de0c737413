use std::path::Path;

use pvfs::{EntryRef, Vfs, VfsConfig};
use tracing_subscriber::EnvFilter;

use crate::error::{Error, Result};

/// Log to stderr. `RUST_LOG` wins over `--debug`.
pub fn initialize_tracing_from_args(matches: &clap::ArgMatches) {
    let level = if matches.is_present("debug") {
        "debug"
    } else {
        "warn"
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

pub fn load_config(matches: &clap::ArgMatches) -> Result<VfsConfig> {
    match matches.value_of("config") {
        Some(path) => Ok(VfsConfig::from_file(path)?),
        None => Ok(VfsConfig::default()),
    }
}

/// Mount the folder named by `--path` on this thread
pub fn mount_from_args(matches: &clap::ArgMatches) -> Result<Vfs> {
    let path = matches
        .value_of("path")
        .ok_or_else(|| Error::CliInputError("--path is required.".to_string()))?;
    if !Path::new(path).is_dir() {
        return Err(Error::NotFound(format!("data folder {}", path)));
    }
    let vfs = Vfs::new(load_config(matches)?);
    vfs.mount_blocking(matches.value_of("prefix").unwrap_or(""), path)
        .ok_or_else(|| Error::Generic("mount was superseded".to_string()))?;
    Ok(vfs)
}

/// Paths may be given relative to the mount root
pub fn full_path(vfs: &Vfs, path: Option<&str>) -> String {
    let prefix = vfs.mount_prefix();
    match path {
        None => prefix,
        Some(path) if path.starts_with("//") => path.to_string(),
        Some(path) => format!("{}{}", prefix, path.trim_start_matches('/')),
    }
}

/// Resolve a path naming either kind of entry, with or without a trailing `/`
pub fn resolve_any(vfs: &Vfs, path: &str) -> Result<EntryRef> {
    match vfs.resolve(path) {
        Err(pvfs::Error::NotAFile(_)) => Ok(vfs.resolve(&format!("{}/", path))?),
        other => Ok(other?),
    }
}

pub fn human_size(size: u32) -> String {
    if size == pvfs::UNSET_SIZE {
        "-".to_string()
    } else {
        size.to_string()
    }
}
