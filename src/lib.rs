//! A fault tolerant decoder for Windows Event Log (`.evtx`) files.
//!
//! Corrupted input is the expected case, not the exception: chunks with bad
//! headers are skipped a stride at a time, the record scanner resynchronizes
//! on the record magic after damaged regions, and records the structured
//! binary XML decoder cannot handle are recovered heuristically instead of
//! dropped. Only a bad file signature or an unopenable path fails a parse;
//! everything else degrades and is tallied in the returned statistics.
//!
//! ```no_run
//! use evtx_decode::EvtxDecoder;
//!
//! fn main() -> evtx_decode::Result<()> {
//!     let mut decoder = EvtxDecoder::from_path("Security.evtx")?;
//!     let output = decoder.decode();
//!
//!     for record in &output.records {
//!         println!(
//!             "{} [{}] {}: {}",
//!             record.timestamp,
//!             record.level_name(),
//!             record.provider,
//!             record.message.as_deref().unwrap_or("-")
//!         );
//!     }
//!     println!("{} warnings", output.stats.warnings);
//!     Ok(())
//! }
//! ```

mod binxml;
mod chunk;
mod decoder;
mod err;
mod fallback;
mod file_header;
mod guid;
mod message;
mod progress;
mod record;
mod record_scanner;
mod settings;
mod sid;
mod template_cache;
mod utils;
mod xml_output;

pub use crate::chunk::CHUNK_SIZE;
pub use crate::decoder::{DecodeOutput, DecodeStats, EvtxDecoder, ReadSeek};
pub use crate::err::{EvtxError, Result};
pub use crate::file_header::{EvtxFileHeader, HeaderFlags, FILE_HEADER_BLOCK_SIZE, FILE_MAGIC};
pub use crate::progress::{CancelToken, ParseProgress};
pub use crate::record::EventRecord;
pub use crate::settings::ParseSettings;
