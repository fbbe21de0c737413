//! Preload / unload
//! ----------------
//!
//! `preload` decodes every file of a container in one pass over its data block and
//! keeps the bytes on the `FileEntry`; `unload` drops them again. Opening a cached
//! file shares the buffer instead of decoding. Memory is returned once the last
//! open stream over an unloaded buffer is dropped.
use std::collections::HashMap;
use std::io::Cursor;
use std::sync::Arc;

use tracing::{debug, warn};

use crate::decode::{self, ReadMode, Source, Span};
use crate::entry::{Entry, EntryId, Tree};
use crate::error::Result;

/// Bytes of one file, either shared with the cache or decoded for this caller
#[derive(Debug, Clone)]
pub enum FileBytes {
    Shared(Arc<[u8]>),
    Owned(Vec<u8>),
}

impl FileBytes {
    pub fn len(&self) -> usize {
        self.as_ref().len()
    }

    pub fn is_empty(&self) -> bool {
        self.as_ref().is_empty()
    }

    pub fn into_vec(self) -> Vec<u8> {
        match self {
            FileBytes::Shared(bytes) => bytes.to_vec(),
            FileBytes::Owned(bytes) => bytes,
        }
    }
}

impl AsRef<[u8]> for FileBytes {
    fn as_ref(&self) -> &[u8] {
        match self {
            FileBytes::Shared(bytes) => bytes,
            FileBytes::Owned(bytes) => bytes,
        }
    }
}

/// Read-only stream over a file's bytes
pub type FileStream = Cursor<FileBytes>;

/// Tally of a preload over one or more containers
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct PreloadReport {
    pub loaded: usize,
    pub failed: usize,
    pub bytes: u64,
}

impl PreloadReport {
    pub fn merge(&mut self, other: PreloadReport) {
        self.loaded += other.loaded;
        self.failed += other.failed;
        self.bytes += other.bytes;
    }

    pub fn is_complete(&self) -> bool {
        self.failed == 0
    }
}

impl Tree {
    pub fn file_bytes(&self, id: EntryId) -> Result<FileBytes> {
        match self.file(id)?.cached() {
            Some(bytes) => Ok(FileBytes::Shared(bytes)),
            None => Ok(FileBytes::Owned(self.decode_file(id)?)),
        }
    }

    pub fn open(&self, id: EntryId) -> Result<FileStream> {
        Ok(Cursor::new(self.file_bytes(id)?))
    }

    pub fn read_all_bytes(&self, id: EntryId) -> Result<Vec<u8>> {
        Ok(self.file_bytes(id)?.into_vec())
    }

    /// Cache the bytes of every file directly under `dir`, and under its nested
    /// containers when `recursive`. Failures are logged and counted, never returned;
    /// the error case is reserved for `dir` not being a directory.
    pub fn preload(&self, dir: EntryId, recursive: bool) -> Result<PreloadReport> {
        let directory = self.directory(dir)?;
        let mut report = PreloadReport::default();

        if self.is_root(dir) {
            if recursive {
                for &child in &directory.children {
                    report.merge(self.preload(child, true)?);
                }
            }
            return Ok(report);
        }

        debug!(container = %self.path_of(dir), recursive, "preloading");
        match self.container_source(dir) {
            Ok(source) => report.merge(self.preload_from(dir, recursive, source)),
            Err(e) => {
                warn!(container = %self.path_of(dir), error = %e, "cannot read container");
                report.failed += self.count_files(dir, recursive);
            }
        }
        Ok(report)
    }

    fn preload_from(&self, dir: EntryId, recursive: bool, source: Source) -> PreloadReport {
        let mut report = PreloadReport::default();
        let directory = match self.get(dir).as_directory() {
            Some(directory) => directory,
            None => return report,
        };
        let layout = directory.layout();

        // Nested containers ride along in the same pass unless their bytes can be
        // addressed in place.
        let targets: Vec<EntryId> = directory
            .children
            .iter()
            .copied()
            .filter(|&child| match self.get(child) {
                Entry::File(_) => true,
                Entry::Directory(_) => recursive && layout.mode() != ReadMode::Plain,
            })
            .collect();
        let spans: Vec<(Span, &str)> = targets
            .iter()
            .map(|&id| (self.get(id).span(), self.get(id).name()))
            .collect();

        let mut decoded: HashMap<EntryId, Result<Vec<u8>>> =
            match decode::read_spans(&source, &layout, &spans) {
                Ok(results) => targets.into_iter().zip(results).collect(),
                Err(e) => {
                    warn!(container = %self.path_of(dir), error = %e, "cannot decode container");
                    report.failed += self.count_files(dir, recursive);
                    return report;
                }
            };

        for &child in &directory.children {
            match self.get(child) {
                Entry::File(file) => match decoded.remove(&child) {
                    Some(Ok(bytes)) => {
                        report.loaded += 1;
                        report.bytes += bytes.len() as u64;
                        file.store(Arc::from(bytes));
                    }
                    Some(Err(e)) => {
                        warn!(file = %self.path_of(child), error = %e, "failed to preload");
                        report.failed += 1;
                    }
                    None => {}
                },
                Entry::Directory(nested) if recursive => {
                    let nested_source = match layout.mode() {
                        ReadMode::Plain => Ok(source.window(
                            layout.data_block_offset.saturating_add(nested.info.data_offset),
                        )),
                        _ => match decoded.remove(&child) {
                            Some(Ok(bytes)) => Ok(Source::memory(bytes)),
                            Some(Err(e)) => Err(e),
                            None => self.container_source(child),
                        },
                    };
                    match nested_source {
                        Ok(nested_source) => {
                            report.merge(self.preload_from(child, true, nested_source))
                        }
                        Err(e) => {
                            warn!(container = %self.path_of(child), error = %e, "cannot read container");
                            report.failed += self.count_files(child, true);
                        }
                    }
                }
                Entry::Directory(_) => {}
            }
        }
        report
    }

    fn count_files(&self, dir: EntryId, recursive: bool) -> usize {
        self.files(dir, recursive).map_or(0, |files| files.len())
    }

    /// Drop cached bytes under `dir`; returns how many files were released.
    pub fn unload(&self, dir: EntryId, recursive: bool) -> Result<usize> {
        let directory = self.directory(dir)?;
        let mut released = 0;
        for &child in &directory.children {
            match self.get(child) {
                Entry::File(file) => {
                    if file.release().is_some() {
                        released += 1;
                    }
                }
                Entry::Directory(_) if recursive => released += self.unload(child, true)?,
                Entry::Directory(_) => {}
            }
        }
        Ok(released)
    }
}
