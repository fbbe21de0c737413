//! Packfile table of contents
//! --------------------------
//!
//! Both outer archives and the containers nested inside them share one layout.
//! Only the table of contents is read here; payload bytes are left to
//! `crate::decode`.
//!
//! ```ascii
//! header (one 2048-byte sector, little-endian)
//!   +0    signature                  ce 0a 89 51
//!   +4    version (3)                03 00 00 00
//!   +8    short name                 65 bytes, ignored
//!   +73   path name                  256 bytes, ignored
//!   +332  flags                      bit0 compressed, bit1 condensed
//!   +336  reserved                   4 bytes
//!   +340  file count                 4 bytes
//!   +344  archive size               4 bytes
//!   +348  directory block size       4 bytes
//!   +352  filename block size        4 bytes
//!   +356  data size                  4 bytes (decoded size of the data block)
//!   +360  compressed data size       4 bytes (ff ff ff ff when not compressed)
//!
//! directory block (starts at 2048), file count records of 28 bytes:
//!   name offset | reserved | data offset | name hash | size | compressed size | reserved
//!
//! filename block (next sector boundary), NUL-terminated names
//! data block (next sector boundary)
//! ```
//!
//! Data offsets are positions in the *decoded* data block.
use std::io::{ErrorKind, Read, Seek, SeekFrom};

use byteorder::{LittleEndian, ReadBytesExt};

use crate::error::{Error, Result};

pub const SIGNATURE: u32 = 0x5189_0ACE;
pub const VERSION: u32 = 3;
pub const SECTOR_SIZE: u64 = 2048;
pub const FLAG_COMPRESSED: u32 = 0x1;
pub const FLAG_CONDENSED: u32 = 0x2;
pub const NOT_COMPRESSED: u32 = 0xFFFF_FFFF;
pub const ENTRY_RECORD_SIZE: u64 = 28;
pub const FLAGS_OFFSET: u64 = 332;

const MAX_FILE_COUNT: u32 = 1 << 20;
const MAX_FILENAME_BLOCK: u32 = 64 << 20;

/// PackRead provides the primitive reads used by the packfile layout
pub trait PackRead: Read {
    /// Read a 32-bit unsigned integer (little-endian)
    fn read_pack_u32(&mut self) -> Result<u32> {
        self.read_u32::<LittleEndian>().map_err(truncated_table)
    }

    /// Read `len` raw bytes
    fn read_pack_bytes(&mut self, len: usize) -> Result<Vec<u8>> {
        let mut buffer = vec![0u8; len];
        self.read_exact(&mut buffer).map_err(truncated_table)?;
        Ok(buffer)
    }
}

impl<R: Read> PackRead for R {}

fn truncated_table(error: std::io::Error) -> Error {
    if error.kind() == ErrorKind::UnexpectedEof {
        Error::InvalidFormat("table of contents extends past end of archive".to_string())
    } else {
        Error::Io(error)
    }
}

/// Round `value` up to the next multiple of `alignment`
pub fn align(value: u64, alignment: u64) -> u64 {
    match value % alignment {
        0 => value,
        rem => value + (alignment - rem),
    }
}

/// One logical file listed in a packfile's table
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackfileEntry {
    pub name: String,
    pub data_offset: u64,
    pub size: u32,
    /// Only meaningful when the packfile is compressed
    pub compressed_size: u32,
}

/// PackfileIndex is the parsed table of contents of one packfile
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackfileIndex {
    pub compressed: bool,
    pub condensed: bool,
    /// Position of the data block relative to the start of the packfile
    pub data_block_offset: u64,
    pub data_block_size: u64,
    pub data_block_size_compressed: u64,
    /// Logical files in table order
    pub entries: Vec<PackfileEntry>,
}

impl PackfileIndex {
    /// Parse the table of contents. Positions are relative to offset 0 of `reader`.
    pub fn read<R: Read + Seek>(mut reader: R) -> Result<PackfileIndex> {
        reader.seek(SeekFrom::Start(0))?;
        let signature = reader.read_pack_u32()?;
        if signature != SIGNATURE {
            return Err(Error::InvalidFormat(format!(
                "bad packfile signature {signature:#010x}"
            )));
        }
        let version = reader.read_pack_u32()?;
        if version != VERSION {
            return Err(Error::InvalidFormat(format!(
                "unsupported packfile version {version}"
            )));
        }

        reader.seek(SeekFrom::Start(FLAGS_OFFSET))?;
        let flags = reader.read_pack_u32()?;
        let _reserved = reader.read_pack_u32()?;
        let file_count = reader.read_pack_u32()?;
        let _archive_size = reader.read_pack_u32()?;
        let directory_block_size = reader.read_pack_u32()?;
        let filename_block_size = reader.read_pack_u32()?;
        let data_size = reader.read_pack_u32()?;
        let compressed_data_size = reader.read_pack_u32()?;

        if file_count > MAX_FILE_COUNT {
            return Err(Error::InvalidFormat(format!(
                "implausible file count {file_count}"
            )));
        }
        if u64::from(file_count) * ENTRY_RECORD_SIZE > u64::from(directory_block_size) {
            return Err(Error::InvalidFormat(format!(
                "directory block of {directory_block_size} bytes cannot hold {file_count} records"
            )));
        }
        if filename_block_size > MAX_FILENAME_BLOCK {
            return Err(Error::InvalidFormat(format!(
                "implausible filename block size {filename_block_size}"
            )));
        }

        reader.seek(SeekFrom::Start(SECTOR_SIZE))?;
        let mut records = Vec::with_capacity(file_count as usize);
        for _ in 0..file_count {
            let name_offset = reader.read_pack_u32()?;
            let _reserved = reader.read_pack_u32()?;
            let data_offset = reader.read_pack_u32()?;
            let _name_hash = reader.read_pack_u32()?;
            let size = reader.read_pack_u32()?;
            let compressed_size = reader.read_pack_u32()?;
            let _reserved = reader.read_pack_u32()?;
            records.push((name_offset, data_offset, size, compressed_size));
        }

        let filename_block_offset = SECTOR_SIZE + align(u64::from(directory_block_size), SECTOR_SIZE);
        reader.seek(SeekFrom::Start(filename_block_offset))?;
        let names = reader.read_pack_bytes(filename_block_size as usize)?;

        let mut entries = Vec::with_capacity(records.len());
        for (name_offset, data_offset, size, compressed_size) in records {
            entries.push(PackfileEntry {
                name: read_name(&names, name_offset)?,
                data_offset: u64::from(data_offset),
                size,
                compressed_size,
            });
        }

        let compressed = flags & FLAG_COMPRESSED != 0;
        let data_block_size_compressed = if compressed && compressed_data_size != NOT_COMPRESSED {
            u64::from(compressed_data_size)
        } else {
            u64::from(data_size)
        };

        Ok(PackfileIndex {
            compressed,
            condensed: flags & FLAG_CONDENSED != 0,
            data_block_offset: filename_block_offset
                + align(u64::from(filename_block_size), SECTOR_SIZE),
            data_block_size: u64::from(data_size),
            data_block_size_compressed,
            entries,
        })
    }
}

fn read_name(names: &[u8], offset: u32) -> Result<String> {
    let start = offset as usize;
    if start >= names.len() {
        return Err(Error::InvalidFormat(format!(
            "name offset {offset} outside filename block"
        )));
    }
    let tail = &names[start..];
    let end = tail.iter().position(|&b| b == 0).unwrap_or(tail.len());
    Ok(String::from_utf8(tail[..end].to_vec())?)
}
