//! Path grammar: `{mount_prefix}{segment}/{segment}/.../{name}`.
//!
//! Segments match case-insensitively. A trailing `/` asks for a directory, no
//! trailing `/` asks for a file; every intermediate segment must be a directory.
use std::sync::Arc;

use crate::entry::{EntryRef, Tree};
use crate::error::{Error, Result};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VfsPath<'a> {
    pub segments: Vec<&'a str>,
    /// The path ended with `/` (or named the mount root)
    pub directory: bool,
}

/// Force a trailing `/` on a mount prefix
pub fn normalize_prefix(prefix: &str) -> String {
    if prefix.ends_with('/') {
        prefix.to_string()
    } else {
        format!("{prefix}/")
    }
}

fn strip_prefix_ignore_case<'a>(path: &'a str, prefix: &str) -> Option<&'a str> {
    let head = path.get(..prefix.len())?;
    if head.eq_ignore_ascii_case(prefix) {
        path.get(prefix.len()..)
    } else {
        None
    }
}

pub fn parse<'a>(prefix: &str, path: &'a str) -> Result<VfsPath<'a>> {
    let rest = match strip_prefix_ignore_case(path, prefix) {
        Some(rest) => rest,
        None if path.eq_ignore_ascii_case(prefix.trim_end_matches('/')) => "",
        None => return Err(Error::NotFound(path.to_string())),
    };
    Ok(VfsPath {
        segments: rest.split('/').filter(|s| !s.is_empty()).collect(),
        directory: rest.is_empty() || rest.ends_with('/'),
    })
}

/// Walk `tree` from its root, one linear scan per segment
pub fn resolve(tree: &Arc<Tree>, path: &str) -> Result<EntryRef> {
    let parsed = parse(tree.prefix(), path)?;
    let mut current = tree.root();

    for (i, segment) in parsed.segments.iter().enumerate() {
        let child = tree
            .find_child(current, segment)
            .ok_or_else(|| Error::NotFound(path.to_string()))?;
        let is_directory = tree.get(child).is_directory();
        let is_last = i + 1 == parsed.segments.len();

        if !is_directory && (!is_last || parsed.directory) {
            return Err(Error::NotADirectory(path.to_string()));
        }
        if is_last && is_directory && !parsed.directory {
            return Err(Error::NotAFile(path.to_string()));
        }
        current = child;
    }

    if parsed.segments.is_empty() && !parsed.directory {
        return Err(Error::NotAFile(path.to_string()));
    }
    Ok(EntryRef::new(Arc::clone(tree), current))
}
