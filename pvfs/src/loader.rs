//! Builds the mounted tree from a directory of outer archives.
//!
//! Only tables of contents are read here. For a compressed archive one forward
//! pass over the data block decodes each nested container only as far as its
//! table reaches; the payloads stay encoded until a file is read or preloaded.
use std::path::{Path, PathBuf};
use std::time::Instant;

use chrono::{DateTime, Utc};
use serde_derive::Serialize;
use tracing::{debug, info, warn};

use crate::config::VfsConfig;
use crate::decode::{self, ReadMode, Source, Span, SpanPrefix};
use crate::entry::{DirectoryEntry, Entry, EntryId, FileEntry, Tree};
use crate::error::Result;
use crate::packfile::PackfileIndex;

/// What a mount found
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MountSummary {
    pub archives: usize,
    pub skipped: usize,
    pub nested: usize,
    pub files: usize,
    pub mounted_at: DateTime<Utc>,
}

struct ArchivePlan {
    name: String,
    path: PathBuf,
    index: PackfileIndex,
    /// Parallel to `index.entries`; set for entries indexed as nested containers
    nested: Vec<Option<PackfileIndex>>,
}

/// Outer archives in `dir`, sorted by file name
pub fn list_archives(dir: &Path, config: &VfsConfig) -> Result<Vec<PathBuf>> {
    let mut archives = Vec::new();
    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        if !entry.file_type()?.is_file() {
            continue;
        }
        if config.is_archive(&entry.file_name().to_string_lossy()) {
            archives.push(entry.path());
        }
    }
    archives.sort_by_key(|path| path.file_name().map(|name| name.to_os_string()));
    Ok(archives)
}

/// Build a tree for `dir`. Archives that cannot be read are logged and left out;
/// an unreadable directory yields an empty tree.
pub fn load_tree(dir: &Path, prefix: &str, config: &VfsConfig) -> (Tree, MountSummary) {
    let started = Instant::now();
    let mut tree = Tree::new(prefix);
    let mut summary = MountSummary {
        archives: 0,
        skipped: 0,
        nested: 0,
        files: 0,
        mounted_at: Utc::now(),
    };

    let archives = list_archives(dir, config).unwrap_or_else(|e| {
        warn!(directory = %dir.display(), error = %e, "cannot list data folder");
        Vec::new()
    });

    for path in archives {
        let plan = match index_archive(&path, config) {
            Ok(plan) => plan,
            Err(e) => {
                warn!(archive = %path.display(), error = %e, "skipping archive");
                summary.skipped += 1;
                continue;
            }
        };
        match insert_archive(&mut tree, plan, &mut summary) {
            Ok(()) => summary.archives += 1,
            Err(e) => {
                warn!(archive = %path.display(), error = %e, "skipping archive");
                summary.skipped += 1;
            }
        }
    }

    summary.mounted_at = Utc::now();
    info!(
        directory = %dir.display(),
        archives = summary.archives,
        skipped = summary.skipped,
        nested = summary.nested,
        files = summary.files,
        elapsed_ms = started.elapsed().as_millis() as u64,
        "mounted data folder"
    );
    (tree, summary)
}

fn index_archive(path: &Path, config: &VfsConfig) -> Result<ArchivePlan> {
    let source = Source::disk(path);
    let index = PackfileIndex::read(source.open()?)?;
    let layout = decode::BlockLayout {
        compressed: index.compressed,
        condensed: index.condensed,
        data_block_offset: index.data_block_offset,
        data_block_size: index.data_block_size,
        data_block_size_compressed: index.data_block_size_compressed,
    };

    let positions: Vec<usize> = index
        .entries
        .iter()
        .enumerate()
        .filter(|(_, entry)| config.is_nested_container(&entry.name))
        .map(|(position, _)| position)
        .collect();

    let mut nested: Vec<Option<PackfileIndex>> = vec![None; index.entries.len()];
    let tables: Vec<Result<PackfileIndex>> = match layout.mode() {
        ReadMode::Plain => positions
            .iter()
            .map(|&position| {
                let entry = &index.entries[position];
                let offset = layout.data_block_offset.saturating_add(entry.data_offset);
                PackfileIndex::read(SpanPrefix::new(source.window(offset).open()?, entry.size))
            })
            .collect(),
        _ => {
            let spans: Vec<(Span, &str)> = positions
                .iter()
                .map(|&position| {
                    let entry = &index.entries[position];
                    (
                        Span {
                            data_offset: entry.data_offset,
                            size: entry.size,
                        },
                        entry.name.as_str(),
                    )
                })
                .collect();
            decode::scan_span_prefixes(&source, &layout, &spans, |prefix| {
                PackfileIndex::read(prefix)
            })?
        }
    };

    for (position, table) in positions.into_iter().zip(tables) {
        match table {
            Ok(table) => nested[position] = Some(table),
            Err(e) => warn!(
                archive = %path.display(),
                container = %index.entries[position].name,
                error = %e,
                "cannot index nested container, keeping it as a plain file"
            ),
        }
    }

    debug!(
        archive = %path.display(),
        files = index.entries.len(),
        compressed = index.compressed,
        condensed = index.condensed,
        "indexed archive"
    );

    Ok(ArchivePlan {
        name: path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default(),
        path: path.to_path_buf(),
        index,
        nested,
    })
}

fn insert_archive(tree: &mut Tree, plan: ArchivePlan, summary: &mut MountSummary) -> Result<()> {
    let archive = tree.push(
        EntryId::ROOT,
        Entry::Directory(DirectoryEntry::archive(plan.name, &plan.path, &plan.index)),
    )?;

    for (entry, nested) in plan.index.entries.iter().zip(plan.nested) {
        match nested {
            Some(table) => {
                let container = tree.push(
                    archive,
                    Entry::Directory(DirectoryEntry::nested(archive, entry, &table)),
                )?;
                summary.nested += 1;
                for file in &table.entries {
                    tree.push(container, Entry::File(FileEntry::from_packfile(container, file)))?;
                    summary.files += 1;
                }
            }
            None => {
                tree.push(archive, Entry::File(FileEntry::from_packfile(archive, entry)))?;
                summary.files += 1;
            }
        }
    }
    Ok(())
}
