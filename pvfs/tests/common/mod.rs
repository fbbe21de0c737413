//! Synthetic packfiles for integration tests.
//!
//! `standard_fixture` writes this data folder:
//!
//! ```text
//! compacted.vpp_pc   compressed + condensed
//!   notes.txt
//!   level.str2_pc    compressed + condensed   nested_files()
//!   props.str2_pc    plain                    prop_a.txt, prop_b.txt
//! plain.vpp_pc       plain
//!   readme.txt
//!   blob.bin
//!   zone.str2_pc     plain                    nested_files()
//!   packed.str2_pc   compressed + condensed   nested_files()
//! streamed.vpp_pc    compressed
//!   readme.txt
//!   blob.bin
//!   zone.str2_pc     compressed               nested_files()
//!   packed.str2_pc   compressed + condensed   nested_files()
//! unrelated.txt      not an archive
//! ```
#![allow(dead_code)]

use std::collections::HashMap;
use std::io::Write;
use std::path::Path;

use byteorder::{LittleEndian, WriteBytesExt};
use flate2::write::ZlibEncoder;
use flate2::Compression;
use tempfile::TempDir;

pub const SECTOR: usize = 2048;
pub const SIGNATURE: u32 = 0x5189_0ACE;
pub const NOT_COMPRESSED: u32 = 0xFFFF_FFFF;
pub const PREFIX: &str = "//data/";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Packing {
    Plain,
    Streamed,
    Compacted,
}

impl Packing {
    fn compressed(self) -> bool {
        self != Packing::Plain
    }

    fn condensed(self) -> bool {
        self == Packing::Compacted
    }

    fn flags(self) -> u32 {
        let mut flags = 0;
        if self.compressed() {
            flags |= 0x1;
        }
        if self.condensed() {
            flags |= 0x2;
        }
        flags
    }
}

pub fn zlib(data: &[u8]) -> Vec<u8> {
    let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(data).unwrap();
    encoder.finish().unwrap()
}

fn pad(buffer: &mut Vec<u8>) {
    let rem = buffer.len() % SECTOR;
    if rem != 0 {
        buffer.resize(buffer.len() + SECTOR - rem, 0);
    }
}

/// Deterministic, mildly compressible content
pub fn content(seed: u32, len: usize) -> Vec<u8> {
    (0..len as u32)
        .map(|i| ((i / 3).wrapping_mul(31).wrapping_add(seed * 17) % 251) as u8)
        .collect()
}

pub struct PackfileBuilder {
    packing: Packing,
    files: Vec<(String, Vec<u8>)>,
    declared_sizes: HashMap<String, u32>,
}

impl PackfileBuilder {
    pub fn new(packing: Packing) -> Self {
        PackfileBuilder {
            packing,
            files: Vec::new(),
            declared_sizes: HashMap::new(),
        }
    }

    pub fn file(mut self, name: &str, bytes: &[u8]) -> Self {
        self.files.push((name.to_string(), bytes.to_vec()));
        self
    }

    pub fn files(mut self, files: &[(&str, Vec<u8>)]) -> Self {
        for (name, bytes) in files {
            self.files.push((name.to_string(), bytes.clone()));
        }
        self
    }

    /// Record a size in the table that differs from the stored bytes
    pub fn declare_size(mut self, name: &str, size: u32) -> Self {
        self.declared_sizes.insert(name.to_string(), size);
        self
    }

    /// The decoded data block and each file's offset in it
    pub fn data_block(&self) -> (Vec<u8>, Vec<u64>) {
        let mut block = Vec::new();
        let mut offsets = Vec::new();
        for (_, bytes) in &self.files {
            if !self.packing.condensed() {
                pad(&mut block);
            }
            offsets.push(block.len() as u64);
            block.extend_from_slice(bytes);
        }
        (block, offsets)
    }

    pub fn build(&self) -> Vec<u8> {
        let (block, offsets) = self.data_block();
        let stored = if self.packing.compressed() {
            zlib(&block)
        } else {
            block.clone()
        };

        let mut names = Vec::new();
        let mut directory = Vec::new();
        for ((name, bytes), offset) in self.files.iter().zip(&offsets) {
            let size = self
                .declared_sizes
                .get(name)
                .copied()
                .unwrap_or(bytes.len() as u32);
            let compressed_size = if self.packing.compressed() {
                zlib(bytes).len() as u32
            } else {
                NOT_COMPRESSED
            };
            for value in [
                names.len() as u32,
                0,
                *offset as u32,
                0,
                size,
                compressed_size,
                0,
            ] {
                directory.write_u32::<LittleEndian>(value).unwrap();
            }
            names.extend_from_slice(name.as_bytes());
            names.push(0);
        }

        let mut out = Vec::new();
        out.write_u32::<LittleEndian>(SIGNATURE).unwrap();
        out.write_u32::<LittleEndian>(3).unwrap();
        out.resize(332, 0);
        let compressed_size = if self.packing.compressed() {
            stored.len() as u32
        } else {
            NOT_COMPRESSED
        };
        for value in [
            self.packing.flags(),
            0,
            self.files.len() as u32,
            0,
            directory.len() as u32,
            names.len() as u32,
            block.len() as u32,
            compressed_size,
        ] {
            out.write_u32::<LittleEndian>(value).unwrap();
        }
        pad(&mut out);
        out.extend_from_slice(&directory);
        pad(&mut out);
        out.extend_from_slice(&names);
        pad(&mut out);
        out.extend_from_slice(&stored);

        let total = out.len() as u32;
        out[344..348].copy_from_slice(&total.to_le_bytes());
        out
    }

    pub fn write_to(&self, path: &Path) {
        std::fs::write(path, self.build()).unwrap();
    }
}

/// Six files whose table order is not alphabetical
pub fn nested_files() -> Vec<(&'static str, Vec<u8>)> {
    vec![
        ("zeta.cchk_pc", content(1, 2500)),
        ("alpha.gpeg_pc", content(2, 700)),
        ("mid.txt", b"nested text file\n".to_vec()),
        ("Beta.cpeg_pc", content(3, 4100)),
        ("omega.rfgzone_pc", content(4, 64)),
        ("delta.asm_pc", content(5, 1)),
    ]
}

pub fn nested_names() -> Vec<&'static str> {
    nested_files().into_iter().map(|(name, _)| name).collect()
}

pub fn blob() -> Vec<u8> {
    content(9, 3000)
}

pub const README: &str = "outer archive readme";
pub const NOTES: &str = "compacted notes";

pub fn prop_files() -> Vec<(&'static str, Vec<u8>)> {
    vec![
        ("prop_a.txt", b"first prop".to_vec()),
        ("prop_b.txt", content(7, 900)),
    ]
}

pub fn standard_fixture() -> TempDir {
    let dir = tempfile::tempdir().unwrap();
    write_standard_fixture(dir.path());
    dir
}

pub fn write_standard_fixture(dir: &Path) {
    let nested = nested_files();
    let compacted_level = PackfileBuilder::new(Packing::Compacted).files(&nested).build();
    let plain_zone = PackfileBuilder::new(Packing::Plain).files(&nested).build();
    let streamed_zone = PackfileBuilder::new(Packing::Streamed).files(&nested).build();
    let props = PackfileBuilder::new(Packing::Plain).files(&prop_files()).build();

    PackfileBuilder::new(Packing::Compacted)
        .file("notes.txt", NOTES.as_bytes())
        .file("level.str2_pc", &compacted_level)
        .file("props.str2_pc", &props)
        .write_to(&dir.join("compacted.vpp_pc"));

    PackfileBuilder::new(Packing::Plain)
        .file("readme.txt", README.as_bytes())
        .file("blob.bin", &blob())
        .file("zone.str2_pc", &plain_zone)
        .file("packed.str2_pc", &compacted_level)
        .write_to(&dir.join("plain.vpp_pc"));

    PackfileBuilder::new(Packing::Streamed)
        .file("readme.txt", README.as_bytes())
        .file("blob.bin", &blob())
        .file("zone.str2_pc", &streamed_zone)
        .file("packed.str2_pc", &compacted_level)
        .write_to(&dir.join("streamed.vpp_pc"));

    std::fs::write(dir.join("unrelated.txt"), b"not an archive").unwrap();
}
