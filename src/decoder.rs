//! The top level decode loop: validate the file header, then walk 64 KiB
//! chunk strides, scanning each for records. Only header validation and
//! opening the input can fail; everything past that degrades instead.

use std::fs::File;
use std::io::{self, BufReader, Cursor, Read, Seek, SeekFrom};
use std::path::Path;

use log::{debug, info, warn};
use serde::Serialize;

use crate::chunk::{ChunkHeader, CHUNK_HEADER_SIZE, CHUNK_SIZE};
use crate::err::{EvtxError, Result};
use crate::file_header::{is_empty_placeholder, EvtxFileHeader, FILE_HEADER_BLOCK_SIZE};
use crate::progress::{CancelToken, ParseProgress, ProgressTracker};
use crate::record::EventRecord;
use crate::record_scanner::{scan_chunk, ParseJob};
use crate::settings::ParseSettings;

/// Upper bound on chunk strides walked in one file. The header's 16-bit
/// chunk count can claim far more than any real log holds.
const MAX_CHUNK_ITERATIONS: usize = 10_000;

pub trait ReadSeek: Read + Seek {
    fn tell(&mut self) -> io::Result<u64> {
        self.stream_position()
    }
}

impl<T: Read + Seek> ReadSeek for T {}

/// Degradation counters for one decode run.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct DecodeStats {
    pub total_chunks: usize,
    pub chunks_processed: usize,
    pub chunks_skipped: usize,
    pub checksum_mismatches: usize,
    /// Records whose fields came from the heuristic pass because the
    /// structured decode failed.
    pub recovered_records: usize,
    pub warnings: usize,
    pub cancelled: bool,
}

/// Everything one decode run produced. `records` is valid even for a
/// cancelled or degraded run; `stats` says how complete it is.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DecodeOutput {
    pub records: Vec<EventRecord>,
    pub stats: DecodeStats,
}

#[derive(Debug)]
pub struct EvtxDecoder<T: ReadSeek> {
    input: T,
    header: EvtxFileHeader,
    header_checksum_ok: bool,
    settings: ParseSettings,
}

impl EvtxDecoder<BufReader<File>> {
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        Self::from_path_with_settings(path, ParseSettings::default())
    }

    pub fn from_path_with_settings(
        path: impl AsRef<Path>,
        settings: ParseSettings,
    ) -> Result<Self> {
        let path = path.as_ref();
        let file = File::open(path).map_err(|source| EvtxError::FailedToOpenFile {
            source,
            path: path.to_path_buf(),
        })?;
        let input = BufReader::with_capacity(settings.io_buffer_size(), file);
        Self::from_read_seek(input, settings)
    }
}

impl EvtxDecoder<Cursor<Vec<u8>>> {
    pub fn from_buffer(buffer: Vec<u8>) -> Result<Self> {
        Self::from_buffer_with_settings(buffer, ParseSettings::default())
    }

    pub fn from_buffer_with_settings(buffer: Vec<u8>, settings: ParseSettings) -> Result<Self> {
        Self::from_read_seek(Cursor::new(buffer), settings)
    }
}

impl<T: ReadSeek> EvtxDecoder<T> {
    /// Read and validate the header block. This is the one place a parse
    /// can fail outright: a header that neither carries the magic nor looks
    /// like an unwritten empty log is rejected.
    pub fn from_read_seek(mut input: T, settings: ParseSettings) -> Result<Self> {
        let mut block = Vec::with_capacity(FILE_HEADER_BLOCK_SIZE);
        (&mut input)
            .take(FILE_HEADER_BLOCK_SIZE as u64)
            .read_to_end(&mut block)
            .map_err(|source| EvtxError::FailedToReadHeaderBlock { source })?;

        let (header, header_checksum_ok) = if is_empty_placeholder(&block) {
            debug!("header block is an unwritten placeholder, treating as an empty log");
            (EvtxFileHeader::empty_placeholder(), true)
        } else {
            let header = EvtxFileHeader::from_block(&block)?;
            let checksum_ok = header.validate_checksum(&block);
            (header, checksum_ok)
        };

        debug!("file header: {header:?}");
        if header.is_dirty() {
            debug!("log was not closed cleanly; chunk totals may lag the data");
        }

        Ok(EvtxDecoder {
            input,
            header,
            header_checksum_ok,
            settings,
        })
    }

    pub fn header(&self) -> &EvtxFileHeader {
        &self.header
    }

    /// Decode the whole file with no progress reporting or cancellation.
    pub fn decode(&mut self) -> DecodeOutput {
        self.decode_with(|_| {}, &CancelToken::new())
    }

    /// Decode the file, reporting progress at the configured interval and
    /// polling `cancel` between chunk reads. Cancellation returns normally
    /// with the records decoded so far.
    pub fn decode_with<F>(&mut self, mut on_progress: F, cancel: &CancelToken) -> DecodeOutput
    where
        F: FnMut(&ParseProgress),
    {
        let total_chunks = self.header.chunk_count as usize;
        let mut job = ParseJob::new(&self.settings);
        job.stats.total_chunks = total_chunks;

        if self.settings.should_validate_checksums() && !self.header_checksum_ok {
            warn!("file header checksum does not match its stored value");
            job.stats.checksum_mismatches += 1;
            job.stats.warnings += 1;
        }
        if total_chunks > MAX_CHUNK_ITERATIONS {
            warn!("header claims {total_chunks} chunks, walking at most {MAX_CHUNK_ITERATIONS}");
            job.stats.warnings += 1;
        }

        let mut records: Vec<EventRecord> = Vec::new();
        let mut tracker =
            ProgressTracker::new(total_chunks, self.settings.progress_event_interval());
        let limit = self.settings.event_limit();
        let mut buffer = vec![0_u8; CHUNK_SIZE];
        let mut strides_walked = 0_usize;

        for chunk_number in 0..total_chunks.min(MAX_CHUNK_ITERATIONS) {
            if cancel.is_cancelled() {
                info!("cancelled after {chunk_number} of {total_chunks} chunks");
                job.stats.cancelled = true;
                break;
            }
            if let Some(limit) = limit {
                if records.len() >= limit {
                    debug!("event limit of {limit} reached, stopping");
                    break;
                }
            }

            let stride_start = (FILE_HEADER_BLOCK_SIZE + chunk_number * CHUNK_SIZE) as u64;
            if let Err(error) = self.input.seek(SeekFrom::Start(stride_start)) {
                warn!("seek to chunk {chunk_number} failed: {error}");
                job.stats.warnings += 1;
                break;
            }

            let filled = match read_full(&mut self.input, &mut buffer) {
                Ok(filled) => filled,
                Err(error) => {
                    warn!("read of chunk {chunk_number} failed: {error}");
                    job.stats.warnings += 1;
                    break;
                }
            };
            if filled == 0 {
                debug!("file ends before chunk {chunk_number}");
                break;
            }
            strides_walked = chunk_number + 1;
            if filled < CHUNK_HEADER_SIZE {
                warn!("chunk {chunk_number} is cut short at {filled} bytes, dropping it");
                job.stats.chunks_skipped += 1;
                job.stats.warnings += 1;
                continue;
            }

            let data = &buffer[..filled];
            match ChunkHeader::from_block(data) {
                Err(error) => {
                    warn!("chunk {chunk_number}: {error}; skipping its byte range");
                    job.stats.chunks_skipped += 1;
                    job.stats.warnings += 1;
                }
                Ok(chunk_header) => {
                    if self.settings.should_validate_checksums() {
                        if !chunk_header.validate_header_checksum(data) {
                            warn!("chunk {chunk_number} header checksum mismatch, skipping it");
                            job.stats.checksum_mismatches += 1;
                            job.stats.chunks_skipped += 1;
                            job.stats.warnings += 1;
                            continue;
                        }
                        // Record magics re-frame the data, so a stale data
                        // CRC (routine in dirty logs) only warns.
                        if !chunk_header.validate_data_checksum(data) {
                            warn!("chunk {chunk_number} event data checksum mismatch");
                            job.stats.checksum_mismatches += 1;
                            job.stats.warnings += 1;
                        }
                    }

                    scan_chunk(data, &chunk_header, &mut job, &mut records);
                    job.stats.chunks_processed += 1;
                }
            }

            if tracker.is_report_due(records.len()) {
                on_progress(&tracker.snapshot(strides_walked, records.len()));
            }
        }

        if let Some(limit) = limit {
            records.truncate(limit);
        }
        on_progress(&tracker.snapshot(strides_walked, records.len()));

        DecodeOutput {
            records,
            stats: job.stats,
        }
    }
}

/// Fill as much of `buffer` as the input has left.
fn read_full(input: &mut impl Read, buffer: &mut [u8]) -> io::Result<usize> {
    let mut filled = 0;
    while filled < buffer.len() {
        match input.read(&mut buffer[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(error) if error.kind() == io::ErrorKind::Interrupted => continue,
            Err(error) => return Err(error),
        }
    }
    Ok(filled)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::file_header::FILE_MAGIC;
    use crate::record_scanner::RECORD_MAGIC;
    use pretty_assertions::assert_eq;

    const EPOCH_FILETIME: u64 = 116_444_736_000_000_000;
    const EMPTY_FRAGMENT: [u8; 5] = [0x0f, 0x01, 0x01, 0x00, 0x00];

    fn file_header_block(chunk_count: u16) -> Vec<u8> {
        let mut block = vec![0_u8; FILE_HEADER_BLOCK_SIZE];
        block[0..8].copy_from_slice(FILE_MAGIC);
        block[24..32].copy_from_slice(&1_u64.to_le_bytes());
        block[32..36].copy_from_slice(&128_u32.to_le_bytes());
        block[36..38].copy_from_slice(&1_u16.to_le_bytes());
        block[38..40].copy_from_slice(&3_u16.to_le_bytes());
        block[40..42].copy_from_slice(&4096_u16.to_le_bytes());
        block[42..44].copy_from_slice(&chunk_count.to_le_bytes());
        let checksum = crc32fast::hash(&block[..120]);
        block[124..128].copy_from_slice(&checksum.to_le_bytes());
        block
    }

    fn push_record(data: &mut Vec<u8>, record_id: u64, payload: &[u8]) {
        let size = (28 + payload.len()) as u32;
        data.extend_from_slice(&RECORD_MAGIC);
        data.extend_from_slice(&size.to_le_bytes());
        data.extend_from_slice(&record_id.to_le_bytes());
        data.extend_from_slice(&EPOCH_FILETIME.to_le_bytes());
        data.extend_from_slice(payload);
        data.extend_from_slice(&size.to_le_bytes());
    }

    /// A chunk carrying `record_ids`, padded to the full stride, with both
    /// CRCs filled in.
    fn chunk_block(record_ids: &[u64]) -> Vec<u8> {
        let mut data = vec![0_u8; CHUNK_HEADER_SIZE];
        data[0..8].copy_from_slice(b"ElfChnk\x00");
        data[40..44].copy_from_slice(&128_u32.to_le_bytes());
        for &record_id in record_ids {
            push_record(&mut data, record_id, &EMPTY_FRAGMENT);
        }

        let free_space_offset = data.len() as u32;
        data[48..52].copy_from_slice(&free_space_offset.to_le_bytes());

        let events_checksum = crc32fast::hash(&data[CHUNK_HEADER_SIZE..]);
        data[52..56].copy_from_slice(&events_checksum.to_le_bytes());

        let mut hasher = crc32fast::Hasher::new();
        hasher.update(&data[..120]);
        hasher.update(&data[128..CHUNK_HEADER_SIZE]);
        data[124..128].copy_from_slice(&hasher.finalize().to_le_bytes());

        data.resize(CHUNK_SIZE, 0);
        data
    }

    #[test]
    fn wrong_file_magic_is_fatal() {
        let mut block = file_header_block(0);
        block[0] = b'X';

        assert!(matches!(
            EvtxDecoder::from_buffer(block),
            Err(EvtxError::InvalidFileSignature { .. })
        ));
    }

    #[test]
    fn empty_placeholder_decodes_to_nothing() {
        let mut last_percent = 0.0;
        let mut decoder = EvtxDecoder::from_buffer(vec![0_u8; 64]).unwrap();
        let output = decoder.decode_with(|p| last_percent = p.percent_done, &CancelToken::new());

        assert_eq!(output.records.len(), 0);
        assert_eq!(output.stats.total_chunks, 0);
        assert_eq!(last_percent, 100.0);
    }

    #[test]
    fn decodes_records_across_chunks() {
        let mut file = file_header_block(2);
        file.extend(chunk_block(&[1, 2]));
        file.extend(chunk_block(&[3]));

        let mut decoder = EvtxDecoder::from_buffer(file).unwrap();
        let output = decoder.decode();

        assert_eq!(
            output.records.iter().map(|r| r.record_id).collect::<Vec<_>>(),
            vec![1, 2, 3]
        );
        assert_eq!(output.stats.chunks_processed, 2);
        assert_eq!(output.stats.chunks_skipped, 0);
        assert!(!output.stats.cancelled);
    }

    #[test]
    fn a_truncated_final_chunk_is_still_scanned() {
        let mut file = file_header_block(1);
        let chunk = chunk_block(&[1]);
        file.extend_from_slice(&chunk[..CHUNK_HEADER_SIZE + 64]);

        let mut decoder = EvtxDecoder::from_buffer(file).unwrap();
        let output = decoder.decode();

        assert_eq!(output.records.len(), 1);
    }

    #[test]
    fn corrupt_chunk_magic_skips_one_stride() {
        let mut file = file_header_block(3);
        file.extend(chunk_block(&[1]));
        let mut corrupt = chunk_block(&[2]);
        corrupt[0] = b'X';
        file.extend(corrupt);
        file.extend(chunk_block(&[3]));

        let mut decoder = EvtxDecoder::from_buffer(file).unwrap();
        let output = decoder.decode();

        assert_eq!(
            output.records.iter().map(|r| r.record_id).collect::<Vec<_>>(),
            vec![1, 3]
        );
        assert_eq!(output.stats.chunks_skipped, 1);
        assert!(output.stats.warnings >= 1);
    }

    #[test]
    fn header_crc_mismatch_skips_the_chunk_when_validating() {
        let mut file = file_header_block(1);
        let mut chunk = chunk_block(&[1]);
        chunk[16] ^= 0xff; // inside the checksummed span
        file.extend(chunk);

        let settings = ParseSettings::new().validate_checksums(true);
        let mut decoder = EvtxDecoder::from_buffer_with_settings(file, settings).unwrap();
        let output = decoder.decode();

        assert_eq!(output.records.len(), 0);
        assert_eq!(output.stats.checksum_mismatches, 1);
        assert_eq!(output.stats.chunks_skipped, 1);
    }

    #[test]
    fn valid_crcs_pass_validation() {
        let mut file = file_header_block(1);
        file.extend(chunk_block(&[1, 2]));

        let settings = ParseSettings::new().validate_checksums(true);
        let mut decoder = EvtxDecoder::from_buffer_with_settings(file, settings).unwrap();
        let output = decoder.decode();

        assert_eq!(output.records.len(), 2);
        assert_eq!(output.stats.checksum_mismatches, 0);
    }

    #[test]
    fn event_limit_stops_the_walk() {
        let mut file = file_header_block(2);
        file.extend(chunk_block(&[1, 2]));
        file.extend(chunk_block(&[3]));

        let settings = ParseSettings::new().max_events(1);
        let mut decoder = EvtxDecoder::from_buffer_with_settings(file, settings).unwrap();
        let output = decoder.decode();

        assert_eq!(output.records.len(), 1);
        assert_eq!(output.records[0].record_id, 1);
    }

    #[test]
    fn pre_cancelled_run_returns_empty_and_flags_it() {
        let mut file = file_header_block(1);
        file.extend(chunk_block(&[1]));

        let cancel = CancelToken::new();
        cancel.cancel();

        let mut decoder = EvtxDecoder::from_buffer(file).unwrap();
        let output = decoder.decode_with(|_| {}, &cancel);

        assert_eq!(output.records.len(), 0);
        assert!(output.stats.cancelled);
    }
}
