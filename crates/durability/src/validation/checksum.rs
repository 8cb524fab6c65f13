//! CRC32 over the data section.
//!
//! The checksum is the IEEE CRC32 (`crc32fast`) of every byte after the
//! header's `data_offset`. Files are hashed in fixed-size blocks so the file
//! size is not bounded by memory.

use crc32fast::Hasher;
use std::io::{self, Read, Seek, SeekFrom};
use vellum_core::limits::CHECKSUM_BLOCK_SIZE;

/// CRC32 of an in-memory byte slice.
pub fn checksum(data: &[u8]) -> u32 {
    crc32fast::hash(data)
}

/// CRC32 of everything from `data_offset` to the end of `reader`.
pub fn data_section_checksum<R: Read + Seek>(reader: &mut R, data_offset: u64) -> io::Result<u32> {
    reader.seek(SeekFrom::Start(data_offset))?;
    let mut hasher = Hasher::new();
    let mut block = vec![0u8; CHECKSUM_BLOCK_SIZE];
    loop {
        match reader.read(&mut block) {
            Ok(0) => break,
            Ok(n) => hasher.update(&block[..n]),
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(hasher.finalize())
}
