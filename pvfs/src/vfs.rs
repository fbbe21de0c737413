//! The mount service
//! -----------------
//!
//! `Vfs` owns the current tree and answers path queries against it. Mounting
//! builds a brand new tree (on a background thread with `mount`) and swaps it in
//! under one lock, so queries running during a mount keep using the tree they
//! started with. When two mounts overlap, the last one started wins and the
//! other's tree is discarded.
//!
//! ```rust,no_run
//! use pvfs::{Vfs, VfsConfig};
//!
//! fn main() -> pvfs::Result<()> {
//!     let vfs = Vfs::new(VfsConfig::default());
//!     vfs.mount_blocking("//data/", "/games/rfg/data");
//!     for entry in vfs.enumerate("//data/misc.vpp_pc/")? {
//!         println!("{} ({} bytes)", entry.name(), entry.size());
//!     }
//!     let text = vfs.read_all_text("//data/misc.vpp_pc/readme.txt")?;
//!     println!("{text}");
//!     Ok(())
//! }
//! ```
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use parking_lot::{Mutex, RwLock};
use tracing::{debug, info};

use crate::cache::{FileStream, PreloadReport};
use crate::config::VfsConfig;
use crate::entry::{Children, EntryRef, Tree, TreeStats};
use crate::error::{Error, Result};
use crate::loader::{self, MountSummary};
use crate::path;

type Listener = Box<dyn Fn(&MountSummary) + Send + Sync>;

#[derive(Default)]
struct MountState {
    tree: Option<Arc<Tree>>,
    mount_prefix: String,
    source_directory: PathBuf,
    summary: Option<MountSummary>,
}

pub struct Vfs {
    config: VfsConfig,
    state: RwLock<MountState>,
    generation: AtomicU64,
    loading: AtomicBool,
    listeners: Mutex<Vec<Listener>>,
}

impl Vfs {
    pub fn new(config: VfsConfig) -> Vfs {
        Vfs {
            config,
            state: RwLock::new(MountState::default()),
            generation: AtomicU64::new(0),
            loading: AtomicBool::new(false),
            listeners: Mutex::new(Vec::new()),
        }
    }

    pub fn config(&self) -> &VfsConfig {
        &self.config
    }

    /// Register a callback fired after every completed mount
    pub fn on_data_folder_changed<F>(&self, listener: F)
    where
        F: Fn(&MountSummary) + Send + Sync + 'static,
    {
        self.listeners.lock().push(Box::new(listener));
    }

    /// Mount `source_directory` on a background thread. The handle yields `None`
    /// when a later mount superseded this one. An empty prefix selects the
    /// configured one.
    pub fn mount<P: AsRef<Path>>(
        self: &Arc<Self>,
        prefix: &str,
        source_directory: P,
    ) -> JoinHandle<Option<MountSummary>> {
        let (generation, prefix) = self.begin_mount(prefix, source_directory.as_ref());
        let directory = source_directory.as_ref().to_path_buf();
        let vfs = Arc::clone(self);
        thread::spawn(move || vfs.finish_mount(generation, &prefix, &directory))
    }

    /// Mount on the calling thread
    pub fn mount_blocking<P: AsRef<Path>>(
        &self,
        prefix: &str,
        source_directory: P,
    ) -> Option<MountSummary> {
        let (generation, prefix) = self.begin_mount(prefix, source_directory.as_ref());
        self.finish_mount(generation, &prefix, source_directory.as_ref())
    }

    fn begin_mount(&self, prefix: &str, source_directory: &Path) -> (u64, String) {
        let prefix = if prefix.is_empty() {
            path::normalize_prefix(&self.config.mount_prefix)
        } else {
            path::normalize_prefix(prefix)
        };
        let mut state = self.state.write();
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        self.loading.store(true, Ordering::SeqCst);
        *state = MountState {
            tree: None,
            mount_prefix: prefix.clone(),
            source_directory: source_directory.to_path_buf(),
            summary: None,
        };
        info!(directory = %source_directory.display(), prefix = %prefix, "mounting data folder");
        (generation, prefix)
    }

    fn finish_mount(&self, generation: u64, prefix: &str, directory: &Path) -> Option<MountSummary> {
        let (tree, summary) = loader::load_tree(directory, prefix, &self.config);
        {
            let mut state = self.state.write();
            if self.generation.load(Ordering::SeqCst) != generation {
                debug!(directory = %directory.display(), "discarding superseded mount");
                return None;
            }
            state.tree = Some(Arc::new(tree));
            state.summary = Some(summary.clone());
            self.loading.store(false, Ordering::SeqCst);
        }
        for listener in self.listeners.lock().iter() {
            listener(&summary);
        }
        Some(summary)
    }

    /// A mount completed and no other is in progress
    pub fn ready(&self) -> bool {
        self.state.read().tree.is_some() && !self.loading()
    }

    pub fn loading(&self) -> bool {
        self.loading.load(Ordering::SeqCst)
    }

    pub fn mount_prefix(&self) -> String {
        self.state.read().mount_prefix.clone()
    }

    pub fn source_directory(&self) -> PathBuf {
        self.state.read().source_directory.clone()
    }

    pub fn summary(&self) -> Option<MountSummary> {
        self.state.read().summary.clone()
    }

    /// The current tree
    pub fn tree(&self) -> Result<Arc<Tree>> {
        self.state.read().tree.clone().ok_or(Error::NotMounted)
    }

    pub fn root(&self) -> Result<EntryRef> {
        let tree = self.tree()?;
        let root = tree.root();
        Ok(EntryRef::new(tree, root))
    }

    pub fn resolve(&self, path: &str) -> Result<EntryRef> {
        path::resolve(&self.tree()?, path)
    }

    pub fn exists(&self, path: &str) -> bool {
        self.resolve(path).is_ok()
    }

    /// Children of a directory in archive table order
    pub fn enumerate(&self, path: &str) -> Result<Children> {
        let entry = self.directory(path)?;
        Ok(entry.children())
    }

    /// Every file under a directory, depth first in table order
    pub fn files(&self, path: &str, recursive: bool) -> Result<Vec<EntryRef>> {
        let entry = self.directory(path)?;
        let tree = Arc::clone(entry.tree());
        Ok(tree
            .files(entry.id(), recursive)?
            .into_iter()
            .map(|id| EntryRef::new(Arc::clone(&tree), id))
            .collect())
    }

    pub fn open(&self, path: &str) -> Result<FileStream> {
        self.file(path)?.open()
    }

    pub fn read_all_bytes(&self, path: &str) -> Result<Vec<u8>> {
        self.file(path)?.read_all_bytes()
    }

    pub fn read_all_text(&self, path: &str) -> Result<String> {
        self.file(path)?.read_all_text()
    }

    pub fn preload(&self, path: &str, recursive: bool) -> Result<PreloadReport> {
        self.directory(path)?.preload(recursive)
    }

    pub fn unload(&self, path: &str, recursive: bool) -> Result<usize> {
        self.directory(path)?.unload(recursive)
    }

    pub fn stats(&self) -> Result<TreeStats> {
        Ok(self.tree()?.stats())
    }

    fn file(&self, path: &str) -> Result<EntryRef> {
        let entry = self.resolve(path)?;
        if entry.is_file() {
            Ok(entry)
        } else {
            Err(Error::NotAFile(path.to_string()))
        }
    }

    fn directory(&self, path: &str) -> Result<EntryRef> {
        let entry = self.resolve(path)?;
        if entry.is_directory() {
            Ok(entry)
        } else {
            Err(Error::NotADirectory(path.to_string()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    #[test]
    fn test_queries_before_mount() {
        let vfs = Vfs::new(VfsConfig::default());
        assert!(!vfs.ready());
        assert!(!vfs.loading());
        assert!(matches!(vfs.resolve("//data/"), Err(Error::NotMounted)));
        assert!(!vfs.exists("//data/"));
        assert!(matches!(vfs.stats(), Err(Error::NotMounted)));
    }

    #[test]
    fn test_mount_missing_directory_is_ready_and_empty() {
        let vfs = Vfs::new(VfsConfig::default());
        let summary = vfs
            .mount_blocking("//data", "/nonexistent/pvfs/test/dir")
            .unwrap();
        assert_eq!(summary.archives, 0);
        assert!(vfs.ready());
        assert_eq!(vfs.mount_prefix(), "//data/");
        assert_eq!(vfs.enumerate("//data/").unwrap().count(), 0);
    }

    #[test]
    fn test_listener_fires_per_mount() {
        let vfs = Arc::new(Vfs::new(VfsConfig::default()));
        let fired = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&fired);
        vfs.on_data_folder_changed(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        vfs.mount("", "/nonexistent/a").join().unwrap();
        vfs.mount("", "/nonexistent/b").join().unwrap();
        assert_eq!(fired.load(Ordering::SeqCst), 2);
        assert_eq!(vfs.source_directory(), PathBuf::from("/nonexistent/b"));
    }

    #[test]
    fn test_superseded_mount_is_discarded() {
        let vfs = Vfs::new(VfsConfig::default());
        let (first, prefix) = vfs.begin_mount("//a/", Path::new("/nonexistent/a"));
        let (second, _) = vfs.begin_mount("//b/", Path::new("/nonexistent/b"));
        assert!(vfs
            .finish_mount(first, &prefix, Path::new("/nonexistent/a"))
            .is_none());
        assert!(vfs.loading());
        assert!(!vfs.ready());
        assert!(vfs
            .finish_mount(second, "//b/", Path::new("/nonexistent/b"))
            .is_some());
        assert!(vfs.ready());
        assert_eq!(vfs.mount_prefix(), "//b/");
    }
}
