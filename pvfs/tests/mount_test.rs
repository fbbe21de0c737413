mod common;

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use common::*;
use pvfs::{Error, Vfs, VfsConfig};

fn mounted() -> (tempfile::TempDir, Vfs) {
    let dir = standard_fixture();
    let vfs = Vfs::new(VfsConfig::default());
    vfs.mount_blocking(PREFIX, dir.path()).unwrap();
    (dir, vfs)
}

fn names(vfs: &Vfs, path: &str) -> Vec<String> {
    vfs.enumerate(path)
        .unwrap()
        .map(|entry| entry.name().to_string())
        .collect()
}

#[test]
fn test_mount_summary() {
    let (dir, vfs) = mounted();
    let summary = vfs.summary().unwrap();
    assert_eq!(summary.archives, 3);
    assert_eq!(summary.skipped, 0);
    // level, props, 2 x zone, 2 x packed
    assert_eq!(summary.nested, 6);
    assert_eq!(summary.files, 1 + 6 + 2 + 2 * (2 + 6 + 6));
    assert!(vfs.ready());
    assert!(!vfs.loading());
    assert_eq!(vfs.mount_prefix(), PREFIX);
    assert_eq!(vfs.source_directory(), dir.path());
}

#[test]
fn test_archives_in_file_name_order() {
    let (_dir, vfs) = mounted();
    assert_eq!(
        names(&vfs, "//data/"),
        vec!["compacted.vpp_pc", "plain.vpp_pc", "streamed.vpp_pc"]
    );
}

#[test]
fn test_non_archives_are_ignored() {
    let (_dir, vfs) = mounted();
    assert!(!vfs.exists("//data/unrelated.txt"));
}

#[test]
fn test_table_order_preserved() {
    let (_dir, vfs) = mounted();
    assert_eq!(
        names(&vfs, "//data/plain.vpp_pc/"),
        vec!["readme.txt", "blob.bin", "zone.str2_pc", "packed.str2_pc"]
    );
    for path in [
        "//data/plain.vpp_pc/zone.str2_pc/",
        "//data/plain.vpp_pc/packed.str2_pc/",
        "//data/streamed.vpp_pc/zone.str2_pc/",
        "//data/compacted.vpp_pc/level.str2_pc/",
    ] {
        assert_eq!(names(&vfs, path), nested_names(), "{path}");
    }
}

#[test]
fn test_enumerate_is_restartable() {
    let (_dir, vfs) = mounted();
    let children = vfs.enumerate("//data/streamed.vpp_pc/").unwrap();
    assert_eq!(children.len(), 4);
    let first: Vec<_> = children.clone().collect();
    let second: Vec<_> = children.collect();
    assert_eq!(first, second);
}

#[test]
fn test_lookup_ignores_case() {
    let (_dir, vfs) = mounted();
    let entry = vfs.resolve("//data/Plain.VPP_PC/").unwrap();
    assert_eq!(entry.name(), "plain.vpp_pc");
    assert!(entry.is_directory());

    let entry = vfs.resolve("//DATA/plain.vpp_pc/ZONE.str2_pc/beta.CPEG_PC").unwrap();
    assert_eq!(entry.name(), "Beta.cpeg_pc");
    assert_eq!(
        entry.path(),
        "//data/plain.vpp_pc/zone.str2_pc/Beta.cpeg_pc"
    );
}

#[test]
fn test_directory_and_file_paths() {
    let (_dir, vfs) = mounted();
    let root = vfs.root().unwrap();
    assert_eq!(root.path(), "//data/");
    assert_eq!(vfs.resolve("//data/").unwrap(), root);
    assert_eq!(vfs.resolve("//data").unwrap(), root);

    let nested = vfs.resolve("//data/streamed.vpp_pc/zone.str2_pc/").unwrap();
    assert_eq!(nested.path(), "//data/streamed.vpp_pc/zone.str2_pc/");
    let parent = nested.parent().unwrap();
    assert_eq!(parent.name(), "streamed.vpp_pc");
    assert_eq!(parent.parent().unwrap(), root);
    assert!(root.parent().is_none());
}

#[test]
fn test_wrong_kind_errors() {
    let (_dir, vfs) = mounted();
    assert!(matches!(
        vfs.resolve("//data/plain.vpp_pc"),
        Err(Error::NotAFile(_))
    ));
    assert!(matches!(
        vfs.resolve("//data/plain.vpp_pc/readme.txt/"),
        Err(Error::NotADirectory(_))
    ));
    assert!(matches!(
        vfs.resolve("//data/plain.vpp_pc/readme.txt/more.txt"),
        Err(Error::NotADirectory(_))
    ));
    assert!(matches!(
        vfs.open("//data/plain.vpp_pc/zone.str2_pc/"),
        Err(Error::NotAFile(_))
    ));
    assert!(matches!(
        vfs.enumerate("//data/plain.vpp_pc/readme.txt"),
        Err(Error::NotADirectory(_))
    ));
}

#[test]
fn test_missing_paths() {
    let (_dir, vfs) = mounted();
    for path in [
        "//data/missing.vpp_pc/",
        "//data/plain.vpp_pc/missing.txt",
        "//elsewhere/plain.vpp_pc/",
    ] {
        assert!(!vfs.exists(path), "{path}");
        let err = vfs.resolve(path).unwrap_err();
        assert!(matches!(err, Error::NotFound(_)), "{path}: {err}");
        assert!(err.is_lookup());
    }
}

#[test]
fn test_entry_metadata() {
    let (_dir, vfs) = mounted();
    let plain = vfs.resolve("//data/plain.vpp_pc/blob.bin").unwrap();
    assert_eq!(plain.size(), 3000);
    assert_eq!(plain.compressed_size(), common::NOT_COMPRESSED);

    let streamed = vfs.resolve("//data/streamed.vpp_pc/blob.bin").unwrap();
    assert_eq!(streamed.size(), 3000);
    assert_eq!(streamed.compressed_size(), zlib(&blob()).len() as u32);

    let root = vfs.root().unwrap();
    assert_eq!(root.size(), pvfs::UNSET_SIZE);
    assert_eq!(root.data_offset(), pvfs::UNSET_OFFSET);
}

#[test]
fn test_files_listing() {
    let (_dir, vfs) = mounted();
    let direct: Vec<_> = vfs
        .files("//data/compacted.vpp_pc/", false)
        .unwrap()
        .iter()
        .map(|entry| entry.name().to_string())
        .collect();
    assert_eq!(direct, vec!["notes.txt"]);

    let all = vfs.files("//data/compacted.vpp_pc/", true).unwrap();
    assert_eq!(all.len(), 1 + 6 + 2);
    assert_eq!(all[1].name(), "zeta.cchk_pc");
    assert_eq!(all.last().unwrap().name(), "prop_b.txt");

    assert_eq!(vfs.files("//data/", false).unwrap().len(), 0);
}

#[test]
fn test_stats() {
    let (_dir, vfs) = mounted();
    let stats = vfs.stats().unwrap();
    assert_eq!(stats.directories, 3 + 6);
    assert_eq!(stats.files, vfs.summary().unwrap().files);
    assert_eq!(stats.cached_files, 0);
    assert_eq!(stats.cached_bytes, 0);
}

#[test]
fn test_corrupt_archive_is_skipped() {
    let dir = standard_fixture();
    std::fs::write(dir.path().join("broken.vpp_pc"), b"definitely not a packfile").unwrap();
    let mut bad_version = PackfileBuilder::new(Packing::Plain)
        .file("a.txt", b"a")
        .build();
    bad_version[4] = 9;
    std::fs::write(dir.path().join("future.vpp_pc"), bad_version).unwrap();

    let vfs = Vfs::new(VfsConfig::default());
    let summary = vfs.mount_blocking(PREFIX, dir.path()).unwrap();
    assert_eq!(summary.archives, 3);
    assert_eq!(summary.skipped, 2);
    assert!(!vfs.exists("//data/broken.vpp_pc/"));
    assert!(!vfs.exists("//data/future.vpp_pc/"));
    assert_eq!(
        vfs.read_all_text("//data/plain.vpp_pc/readme.txt").unwrap(),
        README
    );
}

#[test]
fn test_unreadable_nested_container_stays_a_file() {
    let dir = tempfile::tempdir().unwrap();
    PackfileBuilder::new(Packing::Streamed)
        .file("fake.str2_pc", b"not a container")
        .file("real.txt", b"real")
        .write_to(&dir.path().join("misc.vpp_pc"));

    let vfs = Vfs::new(VfsConfig::default());
    let summary = vfs.mount_blocking(PREFIX, dir.path()).unwrap();
    assert_eq!(summary.nested, 0);
    assert_eq!(summary.files, 2);
    let fake = vfs.resolve("//data/misc.vpp_pc/fake.str2_pc").unwrap();
    assert!(fake.is_file());
    assert_eq!(fake.read_all_bytes().unwrap(), b"not a container");
}

#[test]
fn test_nested_table_indexed_without_decoding_payload() {
    let zone = PackfileBuilder::new(Packing::Plain)
        .file("a.txt", b"inside zone")
        .build();
    let props = PackfileBuilder::new(Packing::Plain)
        .files(&prop_files())
        .build();

    for packing in [Packing::Plain, Packing::Streamed, Packing::Compacted] {
        let dir = tempfile::tempdir().unwrap();
        PackfileBuilder::new(packing)
            .file("zone.str2_pc", &zone)
            .file("props.str2_pc", &props)
            .file("after.txt", b"after")
            .declare_size("zone.str2_pc", zone.len() as u32 + 4096)
            .write_to(&dir.path().join("misc.vpp_pc"));

        let vfs = Vfs::new(VfsConfig::default());
        let summary = vfs.mount_blocking(PREFIX, dir.path()).unwrap();
        assert_eq!(summary.nested, 2, "{packing:?}");
        assert_eq!(summary.files, 1 + 1 + 2, "{packing:?}");
        assert!(
            vfs.resolve("//data/misc.vpp_pc/zone.str2_pc/").unwrap().is_directory(),
            "{packing:?}"
        );
        assert!(vfs.exists("//data/misc.vpp_pc/zone.str2_pc/a.txt"), "{packing:?}");
        assert_eq!(
            vfs.read_all_text("//data/misc.vpp_pc/props.str2_pc/prop_a.txt").unwrap(),
            "first prop",
            "{packing:?}"
        );
        assert_eq!(
            vfs.read_all_text("//data/misc.vpp_pc/after.txt").unwrap(),
            "after",
            "{packing:?}"
        );
    }
}

#[test]
fn test_empty_folder_mounts_ready() {
    let dir = tempfile::tempdir().unwrap();
    let vfs = Vfs::new(VfsConfig::default());
    let summary = vfs.mount_blocking(PREFIX, dir.path()).unwrap();
    assert_eq!(summary.archives, 0);
    assert!(vfs.ready());
    assert_eq!(vfs.enumerate("//data/").unwrap().count(), 0);
    assert_eq!(vfs.stats().unwrap().files, 0);
}

#[test]
fn test_custom_prefix_and_extensions() {
    let dir = tempfile::tempdir().unwrap();
    let inner = PackfileBuilder::new(Packing::Plain)
        .file("x.txt", b"x")
        .build();
    PackfileBuilder::new(Packing::Plain)
        .file("inner.pak", &inner)
        .write_to(&dir.path().join("outer.PACK"));

    let config: VfsConfig = serde_json::from_str(
        r#"{ "mountPrefix": "//game", "archiveExtensions": ["pack"], "nestedExtensions": ["pak"] }"#,
    )
    .unwrap();
    let vfs = Vfs::new(config);
    vfs.mount_blocking("", dir.path()).unwrap();
    assert_eq!(vfs.mount_prefix(), "//game/");
    assert_eq!(
        vfs.read_all_text("//game/outer.PACK/inner.pak/x.txt").unwrap(),
        "x"
    );
}

#[test]
fn test_background_mount_notifies() {
    let dir = standard_fixture();
    let vfs = Arc::new(Vfs::new(VfsConfig::default()));
    let seen = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&seen);
    vfs.on_data_folder_changed(move |summary| {
        counter.fetch_add(summary.archives, Ordering::SeqCst);
    });

    let summary = vfs.mount(PREFIX, dir.path()).join().unwrap().unwrap();
    assert_eq!(summary.archives, 3);
    assert_eq!(seen.load(Ordering::SeqCst), 3);
    assert!(vfs.ready());
}

#[test]
fn test_remount_replaces_tree() {
    let (_dir, vfs) = mounted();
    let old = vfs.resolve("//data/plain.vpp_pc/readme.txt").unwrap();

    let other = tempfile::tempdir().unwrap();
    PackfileBuilder::new(Packing::Plain)
        .file("only.txt", b"only")
        .write_to(&other.path().join("solo.vpp_pc"));
    vfs.mount_blocking("//other/", other.path()).unwrap();

    assert!(!vfs.exists("//data/plain.vpp_pc/readme.txt"));
    assert_eq!(names(&vfs, "//other/"), vec!["solo.vpp_pc"]);
    // handles into the previous tree keep working
    assert_eq!(old.read_all_text().unwrap(), README);
}
