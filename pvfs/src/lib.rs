//! Packfile virtual file system
//! ============================
//!
//! Presents a directory of packfile archives, and the containers nested inside
//! them, as one read-only tree of directories and files:
//!
//! ```text
//! //data/                         mounted directory (root)
//! +-- misc.vpp_pc/                outer archive
//! |   +-- readme.txt              file
//! |   L-- terr01_l0.str2_pc/      nested container
//! |       L-- terr01_l0.cchk_pc   file
//! L-- ...
//! ```
//!
//! Archives are stored plain, stream-compressed or compacted; `decode` hides the
//! difference behind one read path, and `cache` trades memory for speed by keeping
//! decoded files around between `preload` and `unload`.
pub mod cache;
pub mod config;
pub mod decode;
pub mod entry;
pub mod error;
pub mod loader;
pub mod packfile;
pub mod path;
pub mod vfs;

pub use cache::{FileBytes, FileStream, PreloadReport};
pub use config::VfsConfig;
pub use decode::{BlockLayout, ReadMode};
pub use entry::{
    Children, DirectoryEntry, Entry, EntryId, EntryRef, FileEntry, Tree, TreeStats, UNSET_OFFSET,
    UNSET_SIZE,
};
pub use error::{Error, Result};
pub use loader::MountSummary;
pub use vfs::Vfs;
