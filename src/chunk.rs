use std::fmt::{self, Debug, Formatter};

use crate::err::{DecodeError, DecodeResult};
use crate::utils::ByteCursor;

pub const CHUNK_MAGIC: &[u8; 8] = b"ElfChnk\x00";

/// Chunks are fixed 64KiB blocks laid out back to back after the file header.
pub const CHUNK_SIZE: usize = 65536;

/// The chunk header occupies the first 512 bytes of each chunk; event records
/// start right after it.
pub const CHUNK_HEADER_SIZE: usize = 512;

pub(crate) struct ChunkHeader {
    pub first_event_record_number: u64,
    pub last_event_record_number: u64,
    pub first_event_record_id: u64,
    pub last_event_record_id: u64,
    pub header_size: u32,
    pub last_event_record_data_offset: u32,
    pub free_space_offset: u32,
    pub events_checksum: u32,
    pub header_chunk_checksum: u32,
    strings_offsets: [u32; 64],
    template_offsets: [u32; 32],
}

impl Debug for ChunkHeader {
    fn fmt(&self, fmt: &mut Formatter<'_>) -> fmt::Result {
        fmt.debug_struct("ChunkHeader")
            .field("first_event_record_number", &self.first_event_record_number)
            .field("last_event_record_number", &self.last_event_record_number)
            .field("first_event_record_id", &self.first_event_record_id)
            .field("last_event_record_id", &self.last_event_record_id)
            .field("free_space_offset", &self.free_space_offset)
            .field("header_chunk_checksum", &self.header_chunk_checksum)
            .finish()
    }
}

impl ChunkHeader {
    pub(crate) fn from_block(data: &[u8]) -> DecodeResult<ChunkHeader> {
        let mut cursor = ByteCursor::new(data);

        let magic = cursor.array::<8>("chunk.magic")?;
        if &magic != CHUNK_MAGIC {
            return Err(DecodeError::InvalidChunkMagic { magic });
        }

        let first_event_record_number = cursor.u64_named("chunk.first_event_record_number")?;
        let last_event_record_number = cursor.u64_named("chunk.last_event_record_number")?;
        let first_event_record_id = cursor.u64_named("chunk.first_event_record_id")?;
        let last_event_record_id = cursor.u64_named("chunk.last_event_record_id")?;

        let header_size = cursor.u32_named("chunk.header_size")?;
        let last_event_record_data_offset = cursor.u32_named("chunk.last_event_record_data_offset")?;
        let free_space_offset = cursor.u32_named("chunk.free_space_offset")?;
        let events_checksum = cursor.u32_named("chunk.events_checksum")?;

        // Reserved, then flags (neither is interpreted).
        cursor.advance(68, "chunk.reserved")?;

        let header_chunk_checksum = cursor.u32_named("chunk.header_chunk_checksum")?;

        let mut strings_offsets = [0u32; 64];
        for slot in strings_offsets.iter_mut() {
            *slot = cursor.u32_named("chunk.strings_offsets")?;
        }

        let mut template_offsets = [0u32; 32];
        for slot in template_offsets.iter_mut() {
            *slot = cursor.u32_named("chunk.template_offsets")?;
        }

        Ok(ChunkHeader {
            first_event_record_number,
            last_event_record_number,
            first_event_record_id,
            last_event_record_id,
            header_size,
            last_event_record_data_offset,
            free_space_offset,
            events_checksum,
            header_chunk_checksum,
            strings_offsets,
            template_offsets,
        })
    }

    pub(crate) fn strings_offsets(&self) -> &[u32; 64] {
        &self.strings_offsets
    }

    pub(crate) fn template_offsets(&self) -> &[u32; 32] {
        &self.template_offsets
    }

    /// The checksummed header span is bytes 0..120 plus 128..512 (the common
    /// string and template offset tables are covered, the checksum field and
    /// the four bytes before it are not).
    pub(crate) fn validate_header_checksum(&self, data: &[u8]) -> bool {
        if data.len() < CHUNK_HEADER_SIZE {
            return false;
        }

        let mut hasher = crc32fast::Hasher::new();
        hasher.update(&data[..120]);
        hasher.update(&data[128..CHUNK_HEADER_SIZE]);
        hasher.finalize() == self.header_chunk_checksum
    }

    /// The event data checksum covers bytes 512..`free_space_offset`.
    pub(crate) fn validate_data_checksum(&self, data: &[u8]) -> bool {
        let end = self.free_space_offset as usize;
        if end < CHUNK_HEADER_SIZE || end > data.len() {
            return false;
        }

        crc32fast::hash(&data[CHUNK_HEADER_SIZE..end]) == self.events_checksum
    }

    /// End of the record area within `data`.
    ///
    /// `free_space_offset` bounds the scan when it is plausible; a corrupted
    /// header falls back to scanning the full chunk and letting record
    /// resynchronization sort the bytes out.
    pub(crate) fn scan_end(&self, data_len: usize) -> usize {
        let end = self.free_space_offset as usize;
        if end >= CHUNK_HEADER_SIZE && end <= data_len {
            end
        } else {
            data_len
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn sample_chunk_block() -> Vec<u8> {
        let mut data = vec![0u8; CHUNK_SIZE];
        data[0..8].copy_from_slice(CHUNK_MAGIC);
        data[8..16].copy_from_slice(&1u64.to_le_bytes());
        data[16..24].copy_from_slice(&91u64.to_le_bytes());
        data[24..32].copy_from_slice(&1u64.to_le_bytes());
        data[32..40].copy_from_slice(&91u64.to_le_bytes());
        data[40..44].copy_from_slice(&128u32.to_le_bytes());
        data[44..48].copy_from_slice(&64928u32.to_le_bytes());
        data[48..52].copy_from_slice(&65376u32.to_le_bytes());

        // Some record bytes so the data checksum has something to cover.
        for (i, byte) in data[CHUNK_HEADER_SIZE..65376].iter_mut().enumerate() {
            *byte = (i % 251) as u8;
        }

        let events_checksum = crc32fast::hash(&data[CHUNK_HEADER_SIZE..65376]);
        data[52..56].copy_from_slice(&events_checksum.to_le_bytes());

        let mut hasher = crc32fast::Hasher::new();
        hasher.update(&data[..120]);
        hasher.update(&data[128..CHUNK_HEADER_SIZE]);
        let header_checksum = hasher.finalize();
        data[124..128].copy_from_slice(&header_checksum.to_le_bytes());

        data
    }

    #[test]
    fn parses_chunk_header_fields() {
        let data = sample_chunk_block();
        let header = ChunkHeader::from_block(&data).unwrap();

        assert_eq!(header.first_event_record_number, 1);
        assert_eq!(header.last_event_record_number, 91);
        assert_eq!(header.first_event_record_id, 1);
        assert_eq!(header.last_event_record_id, 91);
        assert_eq!(header.header_size, 128);
        assert_eq!(header.last_event_record_data_offset, 64928);
        assert_eq!(header.free_space_offset, 65376);
        assert_eq!(header.strings_offsets().len(), 64);
        assert_eq!(header.template_offsets().len(), 32);
    }

    #[test]
    fn validates_both_checksums() {
        let data = sample_chunk_block();
        let header = ChunkHeader::from_block(&data).unwrap();

        assert!(header.validate_header_checksum(&data));
        assert!(header.validate_data_checksum(&data));
    }

    #[test]
    fn detects_flipped_record_byte() {
        let mut data = sample_chunk_block();
        data[1000] ^= 0xff;

        let header = ChunkHeader::from_block(&data).unwrap();
        assert!(header.validate_header_checksum(&data));
        assert!(!header.validate_data_checksum(&data));
    }

    #[test]
    fn rejects_wrong_magic() {
        let mut data = sample_chunk_block();
        data[0] = b'x';

        assert!(matches!(
            ChunkHeader::from_block(&data),
            Err(DecodeError::InvalidChunkMagic { .. })
        ));
    }

    #[test]
    fn implausible_free_space_offset_widens_scan_to_chunk_end() {
        let mut data = sample_chunk_block();
        data[48..52].copy_from_slice(&0xffff_ffffu32.to_le_bytes());

        let header = ChunkHeader::from_block(&data).unwrap();
        assert_eq!(header.scan_end(data.len()), data.len());
        assert!(!header.validate_data_checksum(&data));
    }
}
