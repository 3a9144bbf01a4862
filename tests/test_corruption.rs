
use fixtures::*;

use evtx_decode::{EvtxDecoder, EvtxError, ParseSettings};
use jiff::Timestamp;
use pretty_assertions::assert_eq;

fn record_ids(output: &evtx_decode::DecodeOutput) -> Vec<u64> {
    output.records.iter().map(|r| r.record_id).collect()
}

#[test]
fn a_wrong_signature_fails_before_any_chunk_io() {
    ensure_env_logger_initialized();
    let mut file = EvtxFileBuilder::new()
        .chunk(ChunkBuilder::new().record(1, write_empty_fragment).finish())
        .finish();
    file[0] = b'X';

    match EvtxDecoder::from_buffer(file) {
        Err(EvtxError::InvalidFileSignature { magic }) => assert_eq!(magic[0], b'X'),
        other => panic!("expected InvalidFileSignature, got {other:?}"),
    }
}

#[test]
fn an_unwritten_placeholder_is_an_empty_log() {
    ensure_env_logger_initialized();
    let mut decoder = EvtxDecoder::from_buffer(empty_placeholder_file()).unwrap();
    let output = decoder.decode();
    assert_eq!(output.records.len(), 0);
    assert_eq!(output.stats.total_chunks, 0);

    // A trailing sentinel written by the logging service does not change
    // the verdict.
    let mut with_sentinel = empty_placeholder_file();
    let len = with_sentinel.len();
    with_sentinel[len - 4..].copy_from_slice(&0xffff_ffffu32.to_le_bytes());
    let mut decoder = EvtxDecoder::from_buffer(with_sentinel).unwrap();
    assert_eq!(decoder.decode().records.len(), 0);
}

#[test]
fn garbage_between_records_is_resynchronized() {
    ensure_env_logger_initialized();
    let file = EvtxFileBuilder::new()
        .chunk(
            ChunkBuilder::new()
                .record(1, write_empty_fragment)
                .raw_bytes(&[0xab; 32])
                .record(2, write_empty_fragment)
                .finish(),
        )
        .finish();

    let mut decoder = EvtxDecoder::from_buffer(file).unwrap();
    let output = decoder.decode();

    assert_eq!(record_ids(&output), vec![1, 2]);
}

#[test]
fn a_corrupt_chunk_magic_costs_only_its_own_records() {
    ensure_env_logger_initialized();
    let mut corrupt = ChunkBuilder::new().record(2, write_empty_fragment).finish();
    corrupt[0] = b'X';

    let file = EvtxFileBuilder::new()
        .chunk(ChunkBuilder::new().record(1, write_empty_fragment).finish())
        .chunk(corrupt)
        .chunk(ChunkBuilder::new().record(3, write_empty_fragment).finish())
        .finish();

    let mut decoder = EvtxDecoder::from_buffer(file).unwrap();
    let output = decoder.decode();

    assert_eq!(record_ids(&output), vec![1, 3]);
    assert_eq!(output.stats.chunks_skipped, 1);
    assert_eq!(output.stats.chunks_processed, 2);
    assert!(output.stats.warnings >= 1);
}

#[test]
fn an_oversized_declared_size_abandons_only_that_chunks_tail() {
    ensure_env_logger_initialized();
    let mut bogus_frame = RECORD_MAGIC.to_vec();
    bogus_frame.extend_from_slice(&0x00ff_ffffu32.to_le_bytes());
    bogus_frame.extend_from_slice(&[0u8; 24]);

    let file = EvtxFileBuilder::new()
        .chunk(
            ChunkBuilder::new()
                .record(1, write_empty_fragment)
                .raw_bytes(&bogus_frame)
                .record(2, write_empty_fragment) // unreachable behind the bogus frame
                .finish(),
        )
        .chunk(ChunkBuilder::new().record(9, write_empty_fragment).finish())
        .finish();

    let mut decoder = EvtxDecoder::from_buffer(file).unwrap();
    let output = decoder.decode();

    assert_eq!(record_ids(&output), vec![1, 9]);
    assert!(output.stats.warnings >= 1);
}

#[test]
fn a_zero_declared_size_is_stepped_over() {
    ensure_env_logger_initialized();
    let mut stub = RECORD_MAGIC.to_vec();
    stub.extend_from_slice(&0u32.to_le_bytes());

    let file = EvtxFileBuilder::new()
        .chunk(
            ChunkBuilder::new()
                .record(1, write_empty_fragment)
                .raw_bytes(&stub)
                .record(2, write_empty_fragment)
                .finish(),
        )
        .finish();

    let mut decoder = EvtxDecoder::from_buffer(file).unwrap();
    let output = decoder.decode();

    assert_eq!(record_ids(&output), vec![1, 2]);
    assert!(output.stats.warnings >= 1);
}

#[test]
fn a_bogus_timestamp_degrades_to_the_epoch() {
    ensure_env_logger_initialized();
    let file = EvtxFileBuilder::new()
        .chunk(
            ChunkBuilder::new()
                .record_at_time(1, u64::MAX, write_empty_fragment)
                .finish(),
        )
        .finish();

    let mut decoder = EvtxDecoder::from_buffer(file).unwrap();
    let output = decoder.decode();

    assert_eq!(output.records.len(), 1);
    assert_eq!(output.records[0].timestamp, Timestamp::UNIX_EPOCH);
    assert!(output.stats.warnings >= 1);
}

#[test]
fn an_undecodable_payload_is_recovered_heuristically() {
    ensure_env_logger_initialized();
    // Not binary XML at all, but carries a known event id pattern, a level
    // byte in the usual slot and a recognizable channel string.
    let mut payload = vec![0x41u8, 0x00, 0x00, 0x00];
    payload.extend("Security".encode_utf16().flat_map(u16::to_le_bytes));
    payload.extend_from_slice(&[0x00, 0x00]);
    payload.push(2);
    payload.extend_from_slice(&[0x00, 0x00, 0x00]);
    payload.extend_from_slice(&4624u32.to_le_bytes());

    let file = EvtxFileBuilder::new()
        .chunk(ChunkBuilder::new().record_raw(1, &payload).finish())
        .finish();

    let mut decoder = EvtxDecoder::from_buffer(file).unwrap();
    let output = decoder.decode();

    assert_eq!(output.records.len(), 1);
    assert_eq!(output.stats.recovered_records, 1);
    assert_eq!(output.records[0].event_id, 4624);
    assert_eq!(output.records[0].level, 2);
    assert_eq!(output.records[0].channel, "Security");
    assert_eq!(output.records[0].provider, "Unknown");
}

#[test]
fn a_stale_data_crc_only_warns_when_validating() {
    ensure_env_logger_initialized();
    let mut chunk = ChunkBuilder::new()
        .record(1, write_empty_fragment)
        .record(2, write_empty_fragment)
        .finish();
    // Flip the last payload byte of record 2: each record frames 33 bytes,
    // its payload starts 24 bytes in and runs 5.
    let flip_at = CHUNK_HEADER_SIZE + 33 + 24 + 4;
    chunk[flip_at] ^= 0xff;

    let file = EvtxFileBuilder::new().chunk(chunk).finish();

    let settings = ParseSettings::new().validate_checksums(true);
    let mut decoder = EvtxDecoder::from_buffer_with_settings(file.clone(), settings).unwrap();
    let output = decoder.decode();

    // The stale CRC is reported, but record magics still frame the data:
    // record 1 decodes and record 2 comes back through the heuristics.
    assert_eq!(record_ids(&output), vec![1, 2]);
    assert_eq!(output.stats.checksum_mismatches, 1);
    assert_eq!(output.stats.chunks_skipped, 0);
    assert_eq!(output.stats.recovered_records, 1);

    // With validation off (the default) the mismatch is not even counted.
    let mut decoder = EvtxDecoder::from_buffer(file).unwrap();
    let output = decoder.decode();
    assert_eq!(record_ids(&output), vec![1, 2]);
    assert_eq!(output.stats.checksum_mismatches, 0);
}

#[test]
fn a_header_crc_failure_skips_the_chunk_but_not_its_neighbors() {
    ensure_env_logger_initialized();
    let mut corrupt = ChunkBuilder::new().record(1, write_empty_fragment).finish();
    corrupt[16] ^= 0xff; // inside the checksummed header span

    let file = EvtxFileBuilder::new()
        .chunk(corrupt)
        .chunk(ChunkBuilder::new().record(2, write_empty_fragment).finish())
        .finish();

    let settings = ParseSettings::new().validate_checksums(true);
    let mut decoder = EvtxDecoder::from_buffer_with_settings(file, settings).unwrap();
    let output = decoder.decode();

    assert_eq!(record_ids(&output), vec![2]);
    assert_eq!(output.stats.chunks_skipped, 1);
    assert_eq!(output.stats.checksum_mismatches, 1);
}

#[test]
fn an_inflated_chunk_count_is_bounded_by_the_actual_file() {
    ensure_env_logger_initialized();
    let mut file = EvtxFileBuilder::new()
        .chunk(ChunkBuilder::new().record(1, write_empty_fragment).finish())
        .finish();
    // Claim far more chunks than the file holds, with a consistent checksum.
    file[42..44].copy_from_slice(&20_000u16.to_le_bytes());
    let checksum = crc32fast::hash(&file[..120]);
    file[124..128].copy_from_slice(&checksum.to_le_bytes());

    let mut decoder = EvtxDecoder::from_buffer(file).unwrap();
    let output = decoder.decode();

    assert_eq!(record_ids(&output), vec![1]);
    assert_eq!(output.stats.total_chunks, 20_000);
    assert_eq!(output.stats.chunks_processed, 1);
    assert!(output.stats.warnings >= 1);
}
