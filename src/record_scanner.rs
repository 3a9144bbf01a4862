//! The per-chunk record scan. Walks a chunk's payload from the end of its
//! header, resynchronizing on the record magic after corruption, and turns
//! every framed record into an [`EventRecord`], falling back to heuristic
//! extraction when the structured decode gives out.

use std::rc::Rc;

use encoding::EncodingRef;
use jiff::Timestamp;
use log::{debug, trace, warn};

use crate::binxml::assemble::{assemble_tree, expand_tokens, XmlNode};
use crate::binxml::deserializer::read_tokens;
use crate::binxml::name::NameCache;
use crate::binxml::tokens::read_template_definition;
use crate::binxml::BinXmlContext;
use crate::chunk::{ChunkHeader, CHUNK_HEADER_SIZE};
use crate::decoder::DecodeStats;
use crate::err::{DecodeError, DecodeResult};
use crate::fallback;
use crate::message;
use crate::record::{populate_from_tree, EventRecord};
use crate::settings::ParseSettings;
use crate::template_cache::TemplateCache;
use crate::utils::{filetime_to_timestamp, read_sig, read_u32_le, read_u64_le, read_u8, ByteCursor};
use crate::xml_output::render_xml;

pub(crate) const RECORD_MAGIC: [u8; 4] = [0x2a, 0x2a, 0x00, 0x00];

const RECORD_HEADER_SIZE: usize = 24;

/// Header plus the trailing copy of the size; nothing smaller frames a
/// record.
const MIN_RECORD_SIZE: u32 = 28;

/// Runaway guard. A healthy chunk holds a few hundred records at most.
const MAX_RECORDS_PER_CHUNK: usize = 10_000;

/// Hop cap when walking one template table chain. A corrupt next pointer
/// could otherwise loop the walk.
const MAX_TEMPLATE_CHAIN: usize = 32;

/// State that spans all chunks of one file parse.
pub(crate) struct ParseJob {
    pub(crate) templates: TemplateCache,
    pub(crate) known_computer: Option<String>,
    pub(crate) ansi_codec: EncodingRef,
    pub(crate) metadata_only: bool,
    pub(crate) stats: DecodeStats,
}

impl ParseJob {
    pub(crate) fn new(settings: &ParseSettings) -> Self {
        ParseJob {
            templates: TemplateCache::new(),
            known_computer: None,
            ansi_codec: settings.get_ansi_codec(),
            metadata_only: settings.is_metadata_only(),
            stats: DecodeStats::default(),
        }
    }
}

/// Scan one chunk's payload and append every record it frames.
///
/// Corruption never aborts the scan: unrecognized bytes are stepped over
/// four bytes at a time until the next record magic, and a declared size
/// pointing past the payload end abandons the remainder of the chunk.
pub(crate) fn scan_chunk(
    data: &[u8],
    header: &ChunkHeader,
    job: &mut ParseJob,
    records: &mut Vec<EventRecord>,
) {
    let mut names = NameCache::new();
    names.populate(data, header.strings_offsets());
    seed_templates(data, header, &mut names, job);

    let scan_end = header.scan_end(data.len());
    let mut offset = CHUNK_HEADER_SIZE;
    let mut produced = 0_usize;

    while offset < scan_end {
        if produced >= MAX_RECORDS_PER_CHUNK {
            warn!("more than {MAX_RECORDS_PER_CHUNK} records in one chunk, stopping the scan");
            job.stats.warnings += 1;
            break;
        }

        let Some(magic) = read_sig(data, offset) else {
            break;
        };
        if magic != RECORD_MAGIC {
            offset += 4;
            continue;
        }

        let Some(size) = read_u32_le(data, offset + 4) else {
            break;
        };
        if size < MIN_RECORD_SIZE {
            debug!("record candidate at {offset} declares {size} bytes, too small to frame");
            job.stats.warnings += 1;
            offset += 4;
            continue;
        }

        let record_end = offset + size as usize;
        if record_end > scan_end {
            warn!(
                "record at {offset} declares {size} bytes, past the chunk payload; dropping the tail"
            );
            job.stats.warnings += 1;
            break;
        }

        let (Some(record_id), Some(filetime)) =
            (read_u64_le(data, offset + 8), read_u64_le(data, offset + 16))
        else {
            break;
        };

        let timestamp = match filetime_to_timestamp(filetime) {
            Ok(timestamp) => timestamp,
            Err(_) => {
                warn!("record {record_id} carries an undecodable timestamp {filetime:#x}");
                job.stats.warnings += 1;
                Timestamp::UNIX_EPOCH
            }
        };

        if read_u32_le(data, record_end - 4) != Some(size) {
            debug!("record {record_id}: trailing size copy does not match {size}");
        }

        let payload_start = offset + RECORD_HEADER_SIZE;
        let payload_len = size as usize - MIN_RECORD_SIZE as usize;
        let payload = &data[payload_start..payload_start + payload_len];

        let mut record = EventRecord::new(record_id, timestamp);
        let mut structured_ok = false;

        match decode_structured(data, payload_start, payload_len, &mut names, job) {
            Ok(roots) => {
                structured_ok = true;
                populate_from_tree(&mut record, &roots, job.metadata_only);
                if !job.metadata_only {
                    match render_xml(&roots) {
                        Ok(xml) => record.xml = xml,
                        Err(error) => {
                            debug!("record {record_id}: XML output failed: {error}");
                            job.stats.warnings += 1;
                        }
                    }
                }
            }
            Err(error) => {
                warn!("record {record_id}: structured decode failed: {error}");
                job.stats.warnings += 1;
                job.stats.recovered_records += 1;
            }
        }

        let missing = record.event_id == 0
            || record.provider.is_empty()
            || record.channel.is_empty()
            || record.computer.is_empty();
        if missing {
            let found = fallback::extract(payload, &mut job.known_computer);
            if record.event_id == 0 {
                if let Some(event_id) = found.event_id {
                    record.event_id = event_id;
                }
            }
            if !structured_ok {
                if let Some(level) = found.level {
                    record.level = level;
                }
            }
            if record.provider.is_empty() {
                if let Some(provider) = found.provider {
                    record.provider = provider;
                }
            }
            if record.channel.is_empty() {
                if let Some(channel) = found.channel {
                    record.channel = channel;
                }
            }
            if record.computer.is_empty() {
                if let Some(computer) = found.computer {
                    record.computer = computer;
                }
            }
        }

        if job.known_computer.is_none() && !record.computer.is_empty() {
            job.known_computer = Some(record.computer.clone());
        }
        for field in [
            &mut record.provider,
            &mut record.channel,
            &mut record.computer,
        ] {
            if field.is_empty() {
                field.push_str("Unknown");
            }
        }

        if !job.metadata_only {
            record.message = message::synthesize(record.event_id, &record.event_data);
        }

        trace!(
            "record {record_id} decoded with {} event data fields",
            record.event_data.len()
        );
        records.push(record);
        produced += 1;
        offset = record_end;
    }
}

/// Parse the definitions the chunk's template table points at, ahead of the
/// record walk.
///
/// Table slots head chains linked through each definition's next pointer.
/// With the cache seeded, a record whose back reference is unreadable can
/// still resolve its template, and a corrupt entry costs its own chain only.
fn seed_templates(data: &[u8], header: &ChunkHeader, names: &mut NameCache, job: &mut ParseJob) {
    let ansi_codec = job.ansi_codec;

    for &slot in header.template_offsets() {
        let mut offset = slot as usize;
        let mut hops = 0;

        while offset >= CHUNK_HEADER_SIZE && hops < MAX_TEMPLATE_CHAIN {
            hops += 1;
            let next = read_u32_le(data, offset).unwrap_or(0);

            let Ok(mut cursor) = ByteCursor::with_pos(data, offset) else {
                break;
            };
            let mut ctx = BinXmlContext::new(names, &mut job.templates, ansi_codec);
            match read_template_definition(&mut cursor, &mut ctx) {
                Ok(definition) => {
                    // The identifier an instance carries matches the leading
                    // field of the definition guid.
                    let template_id = read_u32_le(data, offset + 4).unwrap_or(0);
                    trace!("template table entry {template_id:#x} at {offset}");
                    job.templates.insert(template_id, Rc::new(definition));
                }
                Err(error) => {
                    debug!("template table entry at {offset} did not parse: {error}");
                    break;
                }
            }

            offset = next as usize;
        }
    }
}

/// Recognized payload openers: fragment header, template instance,
/// processing instruction target. Anything else goes to the heuristics.
fn decode_structured(
    data: &[u8],
    payload_start: usize,
    payload_len: usize,
    names: &mut NameCache,
    job: &mut ParseJob,
) -> DecodeResult<Vec<XmlNode>> {
    if payload_len == 0 {
        return Err(DecodeError::Truncated {
            what: "record payload",
            offset: payload_start as u64,
            need: 1,
            have: 0,
        });
    }
    let Some(leading) = read_u8(data, payload_start) else {
        return Err(DecodeError::Truncated {
            what: "record payload",
            offset: payload_start as u64,
            need: 1,
            have: 0,
        });
    };
    if !matches!(leading, 0x0f | 0x0c | 0x0a) {
        return Err(DecodeError::NotBinXml {
            leading,
            offset: payload_start as u64,
        });
    }

    let mut cursor = ByteCursor::with_pos(data, payload_start)?;
    let ansi_codec = job.ansi_codec;
    let mut ctx = BinXmlContext::new(names, &mut job.templates, ansi_codec);
    let tokens = read_tokens(&mut cursor, &mut ctx, Some(payload_len))?;
    Ok(assemble_tree(expand_tokens(tokens)))
}
