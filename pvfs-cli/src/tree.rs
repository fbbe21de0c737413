use pvfs::{EntryRef, Vfs};

use crate::error::Result;
use crate::utils;

fn entry_line(entry: &EntryRef) -> String {
    let (kind, name) = if entry.is_directory() {
        ('d', format!("{}/", entry.name()))
    } else {
        ('-', entry.name().to_string())
    };
    format!(
        "{} {:>10} {:>10}  {}",
        kind,
        utils::human_size(entry.size()),
        utils::human_size(entry.compressed_size()),
        name
    )
}

/// `ls`: one line per child in archive order
pub fn list(vfs: &Vfs, path: Option<&str>) -> Result<()> {
    let path = directory_path(vfs, path);
    for entry in vfs.enumerate(&path)? {
        println!("{}", entry_line(&entry));
    }
    Ok(())
}

/// `tree`: every entry under a directory, indented by depth
pub fn show(vfs: &Vfs, path: Option<&str>) -> Result<()> {
    let path = directory_path(vfs, path);
    let root = vfs.resolve(&path)?;
    println!("{}", root.path());
    render_tree(&root, 1);
    Ok(())
}

fn render_tree(dir: &EntryRef, depth: usize) {
    for entry in dir.children() {
        if entry.is_directory() {
            println!("{}{}/", "  ".repeat(depth), entry.name());
            render_tree(&entry, depth + 1);
        } else {
            println!(
                "{}{} ({} bytes)",
                "  ".repeat(depth),
                entry.name(),
                entry.size()
            );
        }
    }
}

fn directory_path(vfs: &Vfs, path: Option<&str>) -> String {
    let mut path = utils::full_path(vfs, path);
    if !path.ends_with('/') {
        path.push('/');
    }
    path
}
