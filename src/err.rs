use std::io;
use std::path::PathBuf;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, EvtxError>;

/// Result alias used by the internal decode machinery.
pub type DecodeResult<T> = std::result::Result<T, DecodeError>;

/// Fatal errors.
///
/// These are the only errors that cross the public API. Everything that goes
/// wrong after the file header block has been validated is degraded to a
/// warning and a statistics counter instead of failing the parse.
#[derive(Debug, Error)]
pub enum EvtxError {
    #[error("Failed to open file {}: {source}", path.display())]
    FailedToOpenFile { source: io::Error, path: PathBuf },

    #[error("Failed to read the file header block: {source}")]
    FailedToReadHeaderBlock { source: io::Error },

    #[error("Invalid EVTX file header magic, expected `ElfFile0`, found `{magic:2X?}`")]
    InvalidFileSignature { magic: [u8; 8] },
}

/// Recoverable errors raised while decoding chunks, records and binary XML.
///
/// Callers react by skipping the affected structure (a chunk, a record, or a
/// single value), so none of these variants ever surface through the public
/// API.
#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("Offset {offset}: tried to read {need} bytes for {what}, but only {have} are available")]
    Truncated {
        what: &'static str,
        offset: u64,
        need: usize,
        have: usize,
    },

    #[error("Invalid EVTX chunk header magic, expected `ElfChnk0`, found `{magic:2X?}`")]
    InvalidChunkMagic { magic: [u8; 8] },

    #[error("Offset {offset}: tried to read an invalid byte `{value:#04x}` as binxml token")]
    InvalidToken { value: u8, offset: u64 },

    #[error("Offset {offset}: record payload does not open with a binxml structure (leading byte `{leading:#04x}`)")]
    NotBinXml { leading: u8, offset: u64 },

    #[error("Offset {offset}: failed to decode UTF-16 string")]
    MalformedUtf16 { offset: u64 },

    #[error("Failed to decode ansi string (used encoding scheme {encoding_used}): {inner_message}")]
    AnsiDecode {
        encoding_used: &'static str,
        inner_message: String,
    },

    #[error("Value is not a valid date time")]
    InvalidDateTime,

    #[error("Binxml nesting exceeds {limit} levels")]
    NestingTooDeep { limit: u8 },

    #[error("Writing to XML failed with: {message}")]
    XmlOutput { message: String },
}
