//! Entries
//! -------
//!
//! The mounted tree is an arena: every node lives in `Tree::entries` and refers to
//! its parent and children by `EntryId`. Index 0 is the synthetic root standing for
//! the mounted directory; its children are the outer archives, whose children are
//! files and nested containers.
//!
//! The shape of a `Tree` never changes after it is built. The only mutable state is
//! the cached payload of each `FileEntry`, guarded by its own lock.
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::RwLock;

use crate::cache::{FileStream, PreloadReport};
use crate::decode::{BlockLayout, Span};
use crate::error::{Error, Result};
use crate::packfile::{PackfileEntry, PackfileIndex};

/// Marks an offset that does not apply to an entry (e.g. the data block of a file)
pub const UNSET_OFFSET: u64 = u64::MAX;
/// Marks a size that does not apply to an entry (e.g. the size of an outer archive)
pub const UNSET_SIZE: u32 = u32::MAX;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EntryId(u32);

impl EntryId {
    pub const ROOT: EntryId = EntryId(0);

    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// Fields shared by files and directories
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntryInfo {
    pub name: String,
    pub parent: Option<EntryId>,
    /// Start of this entry's own data block within its byte source (directories only)
    pub data_block_offset: u64,
    /// Start of this entry's bytes within the parent's decoded data block
    pub data_offset: u64,
    pub size: u32,
    pub compressed_size: u32,
}

#[derive(Debug)]
pub struct FileEntry {
    pub info: EntryInfo,
    cached: RwLock<Option<Arc<[u8]>>>,
}

impl FileEntry {
    pub fn new(info: EntryInfo) -> FileEntry {
        FileEntry {
            info,
            cached: RwLock::new(None),
        }
    }

    pub(crate) fn from_packfile(parent: EntryId, entry: &PackfileEntry) -> FileEntry {
        FileEntry::new(EntryInfo {
            name: entry.name.clone(),
            parent: Some(parent),
            data_block_offset: UNSET_OFFSET,
            data_offset: entry.data_offset,
            size: entry.size,
            compressed_size: entry.compressed_size,
        })
    }

    pub fn cached(&self) -> Option<Arc<[u8]>> {
        self.cached.read().clone()
    }

    pub fn is_cached(&self) -> bool {
        self.cached.read().is_some()
    }

    pub(crate) fn store(&self, bytes: Arc<[u8]>) {
        *self.cached.write() = Some(bytes);
    }

    pub(crate) fn release(&self) -> Option<Arc<[u8]>> {
        self.cached.write().take()
    }
}

#[derive(Debug, Clone)]
pub struct DirectoryEntry {
    pub info: EntryInfo,
    /// In archive table order
    pub children: Vec<EntryId>,
    pub compressed: bool,
    pub condensed: bool,
    pub data_block_size: u64,
    pub data_block_size_compressed: u64,
    /// Backing file on disk; set for outer archives only
    pub archive_path: Option<PathBuf>,
}

impl DirectoryEntry {
    fn root() -> DirectoryEntry {
        DirectoryEntry {
            info: EntryInfo {
                name: String::new(),
                parent: None,
                data_block_offset: UNSET_OFFSET,
                data_offset: UNSET_OFFSET,
                size: UNSET_SIZE,
                compressed_size: UNSET_SIZE,
            },
            children: Vec::new(),
            compressed: false,
            condensed: false,
            data_block_size: 0,
            data_block_size_compressed: 0,
            archive_path: None,
        }
    }

    pub(crate) fn archive(name: String, path: &Path, index: &PackfileIndex) -> DirectoryEntry {
        DirectoryEntry {
            info: EntryInfo {
                name,
                parent: Some(EntryId::ROOT),
                data_block_offset: index.data_block_offset,
                data_offset: UNSET_OFFSET,
                size: UNSET_SIZE,
                compressed_size: UNSET_SIZE,
            },
            children: Vec::new(),
            compressed: index.compressed,
            condensed: index.condensed,
            data_block_size: index.data_block_size,
            data_block_size_compressed: index.data_block_size_compressed,
            archive_path: Some(path.to_path_buf()),
        }
    }

    pub(crate) fn nested(
        parent: EntryId,
        entry: &PackfileEntry,
        index: &PackfileIndex,
    ) -> DirectoryEntry {
        DirectoryEntry {
            info: EntryInfo {
                name: entry.name.clone(),
                parent: Some(parent),
                data_block_offset: index.data_block_offset,
                data_offset: entry.data_offset,
                size: entry.size,
                compressed_size: entry.compressed_size,
            },
            children: Vec::new(),
            compressed: index.compressed,
            condensed: index.condensed,
            data_block_size: index.data_block_size,
            data_block_size_compressed: index.data_block_size_compressed,
            archive_path: None,
        }
    }

    pub fn compacted(&self) -> bool {
        self.compressed && self.condensed
    }

    pub fn layout(&self) -> BlockLayout {
        BlockLayout {
            compressed: self.compressed,
            condensed: self.condensed,
            data_block_offset: self.info.data_block_offset,
            data_block_size: self.data_block_size,
            data_block_size_compressed: self.data_block_size_compressed,
        }
    }
}

/// Represents a node of the tree, either a File or a Directory.
#[derive(Debug)]
pub enum Entry {
    File(FileEntry),
    Directory(DirectoryEntry),
}

impl Entry {
    pub fn info(&self) -> &EntryInfo {
        match self {
            Entry::File(file) => &file.info,
            Entry::Directory(dir) => &dir.info,
        }
    }

    pub fn name(&self) -> &str {
        &self.info().name
    }

    pub fn parent(&self) -> Option<EntryId> {
        self.info().parent
    }

    pub fn is_file(&self) -> bool {
        matches!(self, Entry::File(_))
    }

    pub fn is_directory(&self) -> bool {
        matches!(self, Entry::Directory(_))
    }

    pub fn as_file(&self) -> Option<&FileEntry> {
        match self {
            Entry::File(file) => Some(file),
            Entry::Directory(_) => None,
        }
    }

    pub fn as_directory(&self) -> Option<&DirectoryEntry> {
        match self {
            Entry::Directory(dir) => Some(dir),
            Entry::File(_) => None,
        }
    }

    /// Location of this entry's bytes within its parent's data block
    pub fn span(&self) -> Span {
        let info = self.info();
        Span {
            data_offset: info.data_offset,
            size: info.size,
        }
    }
}

/// The arena holding one mounted tree
#[derive(Debug)]
pub struct Tree {
    prefix: String,
    entries: Vec<Entry>,
}

impl Tree {
    pub fn new(prefix: &str) -> Tree {
        Tree {
            prefix: prefix.to_string(),
            entries: vec![Entry::Directory(DirectoryEntry::root())],
        }
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    pub fn root(&self) -> EntryId {
        EntryId::ROOT
    }

    pub fn is_root(&self, id: EntryId) -> bool {
        id == EntryId::ROOT
    }

    /// Number of entries below the root
    pub fn len(&self) -> usize {
        self.entries.len() - 1
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Ids are only handed out by this tree, so lookups cannot miss.
    pub fn get(&self, id: EntryId) -> &Entry {
        &self.entries[id.index()]
    }

    pub fn entries(&self) -> impl Iterator<Item = (EntryId, &Entry)> {
        self.entries
            .iter()
            .enumerate()
            .map(|(index, entry)| (EntryId(index as u32), entry))
    }

    pub fn directory(&self, id: EntryId) -> Result<&DirectoryEntry> {
        self.get(id)
            .as_directory()
            .ok_or_else(|| Error::NotADirectory(self.path_of(id)))
    }

    pub fn file(&self, id: EntryId) -> Result<&FileEntry> {
        self.get(id)
            .as_file()
            .ok_or_else(|| Error::NotAFile(self.path_of(id)))
    }

    /// Append `entry` as the last child of `parent`
    pub(crate) fn push(&mut self, parent: EntryId, entry: Entry) -> Result<EntryId> {
        let id = EntryId(u32::try_from(self.entries.len())?);
        match self.entries.get_mut(parent.index()) {
            Some(Entry::Directory(dir)) => dir.children.push(id),
            _ => return Err(Error::NotADirectory(self.path_of(parent))),
        }
        self.entries.push(entry);
        Ok(id)
    }

    /// Case-insensitive lookup among the direct children of `dir`
    pub fn find_child(&self, dir: EntryId, name: &str) -> Option<EntryId> {
        let dir = self.get(dir).as_directory()?;
        dir.children
            .iter()
            .copied()
            .find(|&child| self.get(child).name().eq_ignore_ascii_case(name))
    }

    /// Full VFS path of an entry; directories end with `/`
    pub fn path_of(&self, id: EntryId) -> String {
        let mut names = Vec::new();
        let mut current = Some(id);
        while let Some(node) = current {
            if self.is_root(node) {
                break;
            }
            let entry = self.get(node);
            names.push(entry.name());
            current = entry.parent();
        }
        names.reverse();

        let mut path = self.prefix.clone();
        path.push_str(&names.join("/"));
        if !names.is_empty() && self.get(id).is_directory() {
            path.push('/');
        }
        path
    }

    /// Every file under `dir`, depth first in table order
    pub fn files(&self, dir: EntryId, recursive: bool) -> Result<Vec<EntryId>> {
        let mut out = Vec::new();
        self.collect_files(dir, recursive, &mut out)?;
        Ok(out)
    }

    fn collect_files(&self, dir: EntryId, recursive: bool, out: &mut Vec<EntryId>) -> Result<()> {
        for &child in &self.directory(dir)?.children {
            match self.get(child) {
                Entry::File(_) => out.push(child),
                Entry::Directory(_) if recursive => self.collect_files(child, true, out)?,
                Entry::Directory(_) => {}
            }
        }
        Ok(())
    }

    pub fn stats(&self) -> TreeStats {
        let mut stats = TreeStats::default();
        for (id, entry) in self.entries() {
            match entry {
                Entry::Directory(_) if self.is_root(id) => {}
                Entry::Directory(_) => stats.directories += 1,
                Entry::File(file) => {
                    stats.files += 1;
                    if let Some(bytes) = file.cached() {
                        stats.cached_files += 1;
                        stats.cached_bytes += bytes.len() as u64;
                    }
                }
            }
        }
        stats
    }
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct TreeStats {
    pub directories: usize,
    pub files: usize,
    pub cached_files: usize,
    pub cached_bytes: u64,
}

/// A handle on one entry of a mounted tree.
///
/// The handle keeps its tree alive, so it stays valid after a re-mount replaces
/// the tree it came from.
#[derive(Clone)]
pub struct EntryRef {
    tree: Arc<Tree>,
    id: EntryId,
}

impl EntryRef {
    pub fn new(tree: Arc<Tree>, id: EntryId) -> EntryRef {
        EntryRef { tree, id }
    }

    pub fn id(&self) -> EntryId {
        self.id
    }

    pub fn tree(&self) -> &Arc<Tree> {
        &self.tree
    }

    pub fn entry(&self) -> &Entry {
        self.tree.get(self.id)
    }

    pub fn name(&self) -> &str {
        self.entry().name()
    }

    pub fn is_file(&self) -> bool {
        self.entry().is_file()
    }

    pub fn is_directory(&self) -> bool {
        self.entry().is_directory()
    }

    pub fn size(&self) -> u32 {
        self.entry().info().size
    }

    pub fn compressed_size(&self) -> u32 {
        self.entry().info().compressed_size
    }

    pub fn data_offset(&self) -> u64 {
        self.entry().info().data_offset
    }

    pub fn parent(&self) -> Option<EntryRef> {
        self.entry()
            .parent()
            .map(|parent| EntryRef::new(Arc::clone(&self.tree), parent))
    }

    /// Children in table order; empty for files
    pub fn children(&self) -> Children {
        Children {
            tree: Arc::clone(&self.tree),
            dir: self.id,
            position: 0,
        }
    }

    pub fn path(&self) -> String {
        self.tree.path_of(self.id)
    }

    pub fn is_cached(&self) -> bool {
        self.entry().as_file().is_some_and(FileEntry::is_cached)
    }

    pub fn open(&self) -> Result<FileStream> {
        self.tree.open(self.id)
    }

    pub fn read_all_bytes(&self) -> Result<Vec<u8>> {
        self.tree.read_all_bytes(self.id)
    }

    pub fn read_all_text(&self) -> Result<String> {
        Ok(String::from_utf8(self.read_all_bytes()?)?)
    }

    pub fn preload(&self, recursive: bool) -> Result<PreloadReport> {
        self.tree.preload(self.id, recursive)
    }

    pub fn unload(&self, recursive: bool) -> Result<usize> {
        self.tree.unload(self.id, recursive)
    }
}

impl PartialEq for EntryRef {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.tree, &other.tree) && self.id == other.id
    }
}

impl Eq for EntryRef {}

impl fmt::Debug for EntryRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EntryRef")
            .field("id", &self.id)
            .field("path", &self.path())
            .finish()
    }
}

/// Iterator over a directory's children. Each call to `EntryRef::children`
/// starts over from the first child.
#[derive(Clone)]
pub struct Children {
    tree: Arc<Tree>,
    dir: EntryId,
    position: usize,
}

impl Iterator for Children {
    type Item = EntryRef;

    fn next(&mut self) -> Option<EntryRef> {
        let dir = self.tree.get(self.dir).as_directory()?;
        let child = *dir.children.get(self.position)?;
        self.position += 1;
        Some(EntryRef::new(Arc::clone(&self.tree), child))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = self
            .tree
            .get(self.dir)
            .as_directory()
            .map_or(0, |dir| dir.children.len().saturating_sub(self.position));
        (remaining, Some(remaining))
    }
}

impl ExactSizeIterator for Children {}
