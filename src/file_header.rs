use std::io;

use bitflags::bitflags;
use log::debug;

use crate::err::{DecodeResult, EvtxError, Result};
use crate::utils::ByteCursor;

pub const FILE_MAGIC: &[u8; 8] = b"ElfFile\x00";

/// The file header owns the first 4096 bytes of the file.
pub const FILE_HEADER_BLOCK_SIZE: usize = 4096;

/// Only the first 120 bytes of the header participate in its checksum.
pub(crate) const FILE_HEADER_CHECKSUMMED_LEN: usize = 120;

bitflags! {
    /// File header flags.
    ///
    /// Unknown bits are retained, logs written by newer OS builds set bits
    /// this crate does not interpret.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct HeaderFlags: u32 {
        /// The log was not closed cleanly; header totals may lag the chunks.
        const DIRTY = 0x1;
        /// The log reached its maximum size and stopped accepting records.
        const FULL = 0x2;
    }
}

#[derive(Debug, PartialEq, Eq, Clone)]
pub struct EvtxFileHeader {
    pub first_chunk_number: u64,
    pub last_chunk_number: u64,
    pub next_record_id: u64,
    pub header_size: u32,
    pub minor_version: u16,
    pub major_version: u16,
    pub header_block_size: u16,
    pub chunk_count: u16,
    pub flags: HeaderFlags,
    // Checksum is of the first 120 bytes of the header.
    pub checksum: u32,
}

impl EvtxFileHeader {
    /// Parse the header out of the leading 4096-byte block.
    pub fn from_block(block: &[u8]) -> Result<EvtxFileHeader> {
        let magic: [u8; 8] = match block.get(..8).and_then(|s| s.try_into().ok()) {
            Some(magic) => magic,
            None => return Err(Self::too_short(block.len())),
        };

        if &magic != FILE_MAGIC {
            return Err(EvtxError::InvalidFileSignature { magic });
        }

        Self::parse_fields(block).map_err(|_| Self::too_short(block.len()))
    }

    fn too_short(len: usize) -> EvtxError {
        EvtxError::FailedToReadHeaderBlock {
            source: io::Error::new(
                io::ErrorKind::UnexpectedEof,
                format!("file header block is {len} bytes, expected at least 128"),
            ),
        }
    }

    fn parse_fields(block: &[u8]) -> DecodeResult<EvtxFileHeader> {
        let mut cursor = ByteCursor::with_pos(block, 8)?;

        let first_chunk_number = cursor.u64_named("file.first_chunk_number")?;
        let last_chunk_number = cursor.u64_named("file.last_chunk_number")?;
        let next_record_id = cursor.u64_named("file.next_record_id")?;
        let header_size = cursor.u32_named("file.header_size")?;
        let minor_version = cursor.u16_named("file.minor_version")?;
        let major_version = cursor.u16_named("file.major_version")?;
        let header_block_size = cursor.u16_named("file.header_block_size")?;
        let chunk_count = cursor.u16_named("file.chunk_count")?;

        // unused
        cursor.advance(76, "file.padding")?;

        let flags = HeaderFlags::from_bits_retain(cursor.u32_named("file.flags")?);
        let checksum = cursor.u32_named("file.checksum")?;

        if major_version != 3 {
            debug!("unexpected evtx major version {major_version} (expected 3)");
        }

        Ok(EvtxFileHeader {
            first_chunk_number,
            last_chunk_number,
            next_record_id,
            header_size,
            minor_version,
            major_version,
            header_block_size,
            chunk_count,
            flags,
            checksum,
        })
    }

    /// Header stub used for files that carry an all-zero header block.
    ///
    /// Logging services create the file and zero the first block before any
    /// event is written, so such a file is an empty log, not a corrupt one.
    pub(crate) fn empty_placeholder() -> EvtxFileHeader {
        EvtxFileHeader {
            first_chunk_number: 0,
            last_chunk_number: 0,
            next_record_id: 1,
            header_size: 128,
            minor_version: 1,
            major_version: 3,
            header_block_size: FILE_HEADER_BLOCK_SIZE as u16,
            chunk_count: 0,
            flags: HeaderFlags::empty(),
            checksum: 0,
        }
    }

    pub fn is_dirty(&self) -> bool {
        self.flags.contains(HeaderFlags::DIRTY)
    }

    pub fn is_full(&self) -> bool {
        self.flags.contains(HeaderFlags::FULL)
    }

    /// Check the stored CRC32 against the checksummed prefix of `block`.
    pub(crate) fn validate_checksum(&self, block: &[u8]) -> bool {
        match block.get(..FILE_HEADER_CHECKSUMMED_LEN) {
            Some(prefix) => crc32fast::hash(prefix) == self.checksum,
            None => false,
        }
    }
}

/// A header block written but never populated: the magic position is zeroed
/// and at most a few stray bytes (a trailing sentinel) are set anywhere in
/// the block.
pub(crate) fn is_empty_placeholder(block: &[u8]) -> bool {
    block.len() >= 8
        && block[..8].iter().all(|&b| b == 0)
        && block.iter().filter(|&&b| b != 0).count() <= 8
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn sample_header_block() -> Vec<u8> {
        let mut block = vec![0u8; FILE_HEADER_BLOCK_SIZE];
        block[0..8].copy_from_slice(FILE_MAGIC);
        block[8..16].copy_from_slice(&0u64.to_le_bytes());
        block[16..24].copy_from_slice(&25u64.to_le_bytes());
        block[24..32].copy_from_slice(&2226u64.to_le_bytes());
        block[32..36].copy_from_slice(&128u32.to_le_bytes());
        block[36..38].copy_from_slice(&1u16.to_le_bytes());
        block[38..40].copy_from_slice(&3u16.to_le_bytes());
        block[40..42].copy_from_slice(&4096u16.to_le_bytes());
        block[42..44].copy_from_slice(&26u16.to_le_bytes());
        block[120..124].copy_from_slice(&1u32.to_le_bytes());
        let checksum = crc32fast::hash(&block[..FILE_HEADER_CHECKSUMMED_LEN]);
        block[124..128].copy_from_slice(&checksum.to_le_bytes());
        block
    }

    #[test]
    fn parses_header_fields() {
        let block = sample_header_block();
        let header = EvtxFileHeader::from_block(&block).unwrap();

        assert_eq!(
            header,
            EvtxFileHeader {
                first_chunk_number: 0,
                last_chunk_number: 25,
                next_record_id: 2226,
                header_size: 128,
                minor_version: 1,
                major_version: 3,
                header_block_size: 4096,
                chunk_count: 26,
                flags: HeaderFlags::DIRTY,
                checksum: crc32fast::hash(&block[..120]),
            }
        );
        assert!(header.is_dirty());
        assert!(!header.is_full());
        assert!(header.validate_checksum(&block));
    }

    #[test]
    fn rejects_wrong_magic() {
        let mut block = sample_header_block();
        block[0] = b'X';

        match EvtxFileHeader::from_block(&block) {
            Err(EvtxError::InvalidFileSignature { magic }) => assert_eq!(magic[0], b'X'),
            other => panic!("expected InvalidFileSignature, got {other:?}"),
        }
    }

    #[test]
    fn short_block_is_a_read_failure() {
        let block = sample_header_block();
        assert!(matches!(
            EvtxFileHeader::from_block(&block[..64]),
            Err(EvtxError::FailedToReadHeaderBlock { .. })
        ));
    }

    #[test]
    fn unknown_flag_bits_are_retained() {
        let mut block = sample_header_block();
        block[120..124].copy_from_slice(&0x8000_0003u32.to_le_bytes());

        let header = EvtxFileHeader::from_block(&block).unwrap();
        assert!(header.is_dirty());
        assert!(header.is_full());
        assert_eq!(header.flags.bits(), 0x8000_0003);
    }

    #[test]
    fn checksum_mismatch_is_detectable() {
        let mut block = sample_header_block();
        block[124..128].copy_from_slice(&0xdead_beefu32.to_le_bytes());

        let header = EvtxFileHeader::from_block(&block).unwrap();
        assert!(!header.validate_checksum(&block));
    }

    #[test]
    fn zeroed_block_is_an_empty_placeholder() {
        let block = vec![0u8; FILE_HEADER_BLOCK_SIZE];
        assert!(is_empty_placeholder(&block));

        // A trailing sentinel does not change the verdict.
        let mut with_sentinel = vec![0u8; FILE_HEADER_BLOCK_SIZE];
        with_sentinel[FILE_HEADER_BLOCK_SIZE - 4..].copy_from_slice(&0xffff_ffffu32.to_le_bytes());
        assert!(is_empty_placeholder(&with_sentinel));

        let real = sample_header_block();
        assert!(!is_empty_placeholder(&real));
    }
}
