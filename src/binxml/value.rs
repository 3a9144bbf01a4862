use std::borrow::Cow;
use std::fmt::Write;

use encoding::DecoderTrap;
use jiff::Timestamp;
use log::{trace, warn};
use serde_json::{Value as JsonValue, json};

use crate::binxml::BinXmlContext;
use crate::binxml::deserializer::read_tokens;
use crate::binxml::tokens::BinXmlToken;
use crate::err::{DecodeError, DecodeResult};
use crate::guid::Guid;
use crate::sid::Sid;
use crate::utils::{ByteCursor, filetime_to_timestamp, format_utc_timestamp, systime_from_bytes};

/// Wire type tags, as they appear in value tokens and substitution
/// descriptors.
#[derive(Debug, PartialOrd, PartialEq, Eq, Clone, Copy)]
pub enum BinXmlValueType {
    Null,
    String,
    AnsiString,
    Int8,
    UInt8,
    Int16,
    UInt16,
    Int32,
    UInt32,
    Int64,
    UInt64,
    Real32,
    Real64,
    Bool,
    Binary,
    Guid,
    SizeT,
    FileTime,
    SysTime,
    Sid,
    HexInt32,
    HexInt64,
    EvtHandle,
    BinXml,
    EvtXml,
    StringArray,
    AnsiStringArray,
    Int8Array,
    UInt8Array,
    Int16Array,
    UInt16Array,
    Int32Array,
    UInt32Array,
    Int64Array,
    UInt64Array,
    Real32Array,
    Real64Array,
    BoolArray,
    BinaryArray,
    GuidArray,
    SizeTArray,
    FileTimeArray,
    SysTimeArray,
    SidArray,
    HexInt32Array,
    HexInt64Array,
}

impl BinXmlValueType {
    pub fn from_u8(byte: u8) -> Option<BinXmlValueType> {
        match byte {
            0x00 => Some(BinXmlValueType::Null),
            0x01 => Some(BinXmlValueType::String),
            0x02 => Some(BinXmlValueType::AnsiString),
            0x03 => Some(BinXmlValueType::Int8),
            0x04 => Some(BinXmlValueType::UInt8),
            0x05 => Some(BinXmlValueType::Int16),
            0x06 => Some(BinXmlValueType::UInt16),
            0x07 => Some(BinXmlValueType::Int32),
            0x08 => Some(BinXmlValueType::UInt32),
            0x09 => Some(BinXmlValueType::Int64),
            0x0a => Some(BinXmlValueType::UInt64),
            0x0b => Some(BinXmlValueType::Real32),
            0x0c => Some(BinXmlValueType::Real64),
            0x0d => Some(BinXmlValueType::Bool),
            0x0e => Some(BinXmlValueType::Binary),
            0x0f => Some(BinXmlValueType::Guid),
            0x10 => Some(BinXmlValueType::SizeT),
            0x11 => Some(BinXmlValueType::FileTime),
            0x12 => Some(BinXmlValueType::SysTime),
            0x13 => Some(BinXmlValueType::Sid),
            0x14 => Some(BinXmlValueType::HexInt32),
            0x15 => Some(BinXmlValueType::HexInt64),
            0x20 => Some(BinXmlValueType::EvtHandle),
            0x21 => Some(BinXmlValueType::BinXml),
            0x23 => Some(BinXmlValueType::EvtXml),
            0x81 => Some(BinXmlValueType::StringArray),
            0x82 => Some(BinXmlValueType::AnsiStringArray),
            0x83 => Some(BinXmlValueType::Int8Array),
            0x84 => Some(BinXmlValueType::UInt8Array),
            0x85 => Some(BinXmlValueType::Int16Array),
            0x86 => Some(BinXmlValueType::UInt16Array),
            0x87 => Some(BinXmlValueType::Int32Array),
            0x88 => Some(BinXmlValueType::UInt32Array),
            0x89 => Some(BinXmlValueType::Int64Array),
            0x8a => Some(BinXmlValueType::UInt64Array),
            0x8b => Some(BinXmlValueType::Real32Array),
            0x8c => Some(BinXmlValueType::Real64Array),
            0x8d => Some(BinXmlValueType::BoolArray),
            0x8e => Some(BinXmlValueType::BinaryArray),
            0x8f => Some(BinXmlValueType::GuidArray),
            0x90 => Some(BinXmlValueType::SizeTArray),
            0x91 => Some(BinXmlValueType::FileTimeArray),
            0x92 => Some(BinXmlValueType::SysTimeArray),
            0x93 => Some(BinXmlValueType::SidArray),
            0x94 => Some(BinXmlValueType::HexInt32Array),
            0x95 => Some(BinXmlValueType::HexInt64Array),
            _ => None,
        }
    }
}

/// One decoded value.
///
/// Every variant is producible by the decoder; there is no catch-all for
/// bytes we could not make sense of. Unrecognized or undecodable data becomes
/// [`BinXmlValue::Null`] at decode time.
#[derive(Debug, PartialOrd, PartialEq, Clone)]
pub enum BinXmlValue {
    Null,
    String(String),
    AnsiString(String),
    Int8(i8),
    UInt8(u8),
    Int16(i16),
    UInt16(u16),
    Int32(i32),
    UInt32(u32),
    Int64(i64),
    UInt64(u64),
    Real32(f32),
    Real64(f64),
    Bool(bool),
    Binary(Vec<u8>),
    Guid(Guid),
    FileTime(Timestamp),
    SysTime(Timestamp),
    Sid(Sid),
    HexInt32(u32),
    HexInt64(u64),
    /// A nested binxml fragment, parsed in place and expanded during
    /// assembly.
    BinXml(Vec<BinXmlToken>),
    StringArray(Vec<String>),
    Int8Array(Vec<i8>),
    UInt8Array(Vec<u8>),
    Int16Array(Vec<i16>),
    UInt16Array(Vec<u16>),
    Int32Array(Vec<i32>),
    UInt32Array(Vec<u32>),
    Int64Array(Vec<i64>),
    UInt64Array(Vec<u64>),
    Real32Array(Vec<f32>),
    Real64Array(Vec<f64>),
    BoolArray(Vec<bool>),
    GuidArray(Vec<Guid>),
    FileTimeArray(Vec<Timestamp>),
    SysTimeArray(Vec<Timestamp>),
    SidArray(Vec<Sid>),
    HexInt32Array(Vec<u32>),
    HexInt64Array(Vec<u64>),
}

impl BinXmlValue {
    /// Read a type tag byte, then the value it announces.
    ///
    /// Used for inline value tokens, where no external size descriptor
    /// exists.
    pub(crate) fn read(
        cursor: &mut ByteCursor<'_>,
        ctx: &mut BinXmlContext<'_>,
        size: Option<u16>,
    ) -> DecodeResult<BinXmlValue> {
        let tag_offset = cursor.position();
        let tag = cursor.u8_named("value.type")?;
        Self::read_tagged(tag, tag_offset, cursor, ctx, size)
    }

    /// Decode a value whose type tag was supplied externally (a substitution
    /// descriptor).
    pub(crate) fn read_tagged(
        tag: u8,
        tag_offset: u64,
        cursor: &mut ByteCursor<'_>,
        ctx: &mut BinXmlContext<'_>,
        size: Option<u16>,
    ) -> DecodeResult<BinXmlValue> {
        match BinXmlValueType::from_u8(tag) {
            Some(value_type) => Self::read_typed(&value_type, cursor, ctx, size),
            None => {
                warn!(
                    "unrecognized value type `{tag:#04x}` at offset {tag_offset}; emitting null"
                );
                Self::skip_opaque(cursor, size)?;
                Ok(BinXmlValue::Null)
            }
        }
    }

    /// Consume the declared size (clamped to the buffer) of a value we do not
    /// decode, so the next offset stays valid.
    fn skip_opaque(cursor: &mut ByteCursor<'_>, size: Option<u16>) -> DecodeResult<()> {
        if let Some(sz) = size {
            let skip = usize::from(sz).min(cursor.remaining());
            cursor.advance(skip, "value.opaque")?;
        }
        Ok(())
    }

    pub(crate) fn read_typed(
        value_type: &BinXmlValueType,
        cursor: &mut ByteCursor<'_>,
        ctx: &mut BinXmlContext<'_>,
        size: Option<u16>,
    ) -> DecodeResult<BinXmlValue> {
        trace!(
            "Offset `0x{offset:08x} ({offset}): {value_type:?}, {size:?}",
            offset = cursor.position(),
        );

        let value = match (value_type, size) {
            (BinXmlValueType::Null, _) => BinXmlValue::Null,

            (BinXmlValueType::String, Some(sz)) => {
                let sz_bytes = usize::from(sz);
                let s = if sz_bytes == 0 {
                    None
                } else if sz_bytes % 2 != 0 {
                    return Err(DecodeError::MalformedUtf16 {
                        offset: cursor.position(),
                    });
                } else {
                    cursor.utf16_by_char_count(sz_bytes / 2, "string_value")?
                };
                BinXmlValue::String(s.unwrap_or_default())
            }
            (BinXmlValueType::String, None) => {
                let s = cursor.len_prefixed_utf16_string(false, "string_value")?;
                BinXmlValue::String(s.unwrap_or_default())
            }

            (BinXmlValueType::AnsiString, Some(sz)) => {
                let raw = cursor.take_bytes(usize::from(sz), "ansi_string_value")?;
                BinXmlValue::AnsiString(decode_ansi(ctx, raw)?)
            }
            (BinXmlValueType::AnsiString, None) => {
                let len = cursor.u16_named("ansi_string_len")? as usize;
                let raw = cursor.take_bytes(len, "ansi_string_value")?;
                BinXmlValue::AnsiString(decode_ansi(ctx, raw)?)
            }

            (BinXmlValueType::Int8, _) => BinXmlValue::Int8(cursor.i8_named("i8")?),
            (BinXmlValueType::UInt8, _) => BinXmlValue::UInt8(cursor.u8_named("u8")?),
            (BinXmlValueType::Int16, _) => BinXmlValue::Int16(cursor.i16_named("i16")?),
            (BinXmlValueType::UInt16, _) => BinXmlValue::UInt16(cursor.u16_named("u16")?),
            (BinXmlValueType::Int32, _) => BinXmlValue::Int32(cursor.i32_named("i32")?),
            (BinXmlValueType::UInt32, _) => BinXmlValue::UInt32(cursor.u32_named("u32")?),
            (BinXmlValueType::Int64, _) => BinXmlValue::Int64(cursor.i64_named("i64")?),
            (BinXmlValueType::UInt64, _) => BinXmlValue::UInt64(cursor.u64_named("u64")?),
            (BinXmlValueType::Real32, _) => BinXmlValue::Real32(cursor.f32_named("f32")?),
            (BinXmlValueType::Real64, _) => BinXmlValue::Real64(cursor.f64_named("f64")?),

            (BinXmlValueType::Bool, _) => {
                let raw = cursor.i32_named("bool")?;
                BinXmlValue::Bool(normalize_bool(raw, cursor.position()))
            }

            (BinXmlValueType::Binary, Some(sz)) => {
                BinXmlValue::Binary(cursor.take_bytes(usize::from(sz), "binary")?.to_vec())
            }
            (BinXmlValueType::Binary, None) => {
                let len = cursor.u16_named("binary_len")? as usize;
                BinXmlValue::Binary(cursor.take_bytes(len, "binary")?.to_vec())
            }

            (BinXmlValueType::Guid, _) => BinXmlValue::Guid(Guid::read(cursor)?),

            (BinXmlValueType::SizeT, Some(4)) => BinXmlValue::HexInt32(cursor.u32_named("sizet32")?),
            (BinXmlValueType::SizeT, Some(8)) => BinXmlValue::HexInt64(cursor.u64_named("sizet64")?),
            // Pointer-width values without a believable size: prefer 64-bit
            // when enough bytes remain.
            (BinXmlValueType::SizeT, None) => {
                if cursor.remaining() >= 8 {
                    BinXmlValue::HexInt64(cursor.u64_named("sizet64")?)
                } else {
                    BinXmlValue::HexInt32(cursor.u32_named("sizet32")?)
                }
            }

            (BinXmlValueType::FileTime, _) => {
                BinXmlValue::FileTime(filetime_to_timestamp(cursor.u64_named("filetime")?)?)
            }
            (BinXmlValueType::SysTime, _) => {
                let bytes = cursor.array::<16>("systime")?;
                BinXmlValue::SysTime(systime_from_bytes(&bytes)?)
            }
            (BinXmlValueType::Sid, _) => BinXmlValue::Sid(Sid::read(cursor)?),

            (BinXmlValueType::HexInt32, _) => BinXmlValue::HexInt32(cursor.u32_named("hex32")?),
            (BinXmlValueType::HexInt64, _) => BinXmlValue::HexInt64(cursor.u64_named("hex64")?),

            (BinXmlValueType::BinXml, size) => {
                let payload_len = match size {
                    Some(sz) => usize::from(sz),
                    None => cursor.u16_named("binxml_payload_len")? as usize,
                };
                if payload_len > cursor.remaining() {
                    return Err(DecodeError::Truncated {
                        what: "binxml_payload",
                        offset: cursor.position(),
                        need: payload_len,
                        have: cursor.remaining(),
                    });
                }

                let end = cursor.pos() + payload_len;
                let tokens = if payload_len == 0 {
                    Vec::new()
                } else {
                    read_tokens(cursor, ctx, Some(payload_len))?
                };
                // The fragment is framed by its length, not its tokens.
                cursor.set_pos(end, "binxml_payload")?;
                BinXmlValue::BinXml(tokens)
            }

            (BinXmlValueType::StringArray, Some(sz)) => {
                let end = cursor.pos().saturating_add(usize::from(sz));
                let mut items = Vec::new();
                while cursor.pos() < end {
                    items.push(cursor.null_terminated_utf16_string("string_array")?);
                }
                BinXmlValue::StringArray(items)
            }
            (BinXmlValueType::StringArray, None) => {
                let count = cursor.u16_named("string_array_count")? as usize;
                let mut items = Vec::with_capacity(count);
                for _ in 0..count {
                    items.push(
                        cursor
                            .len_prefixed_utf16_string(false, "string_array")?
                            .unwrap_or_default(),
                    );
                }
                BinXmlValue::StringArray(items)
            }

            (BinXmlValueType::Int8Array, Some(sz)) => BinXmlValue::Int8Array(
                cursor.read_sized_vec(sz, 1, |c| c.i8_named("i8_array"))?,
            ),
            (BinXmlValueType::UInt8Array, Some(sz)) => {
                BinXmlValue::UInt8Array(cursor.take_bytes(usize::from(sz), "u8_array")?.to_vec())
            }
            (BinXmlValueType::Int16Array, Some(sz)) => BinXmlValue::Int16Array(
                cursor.read_sized_vec(sz, 2, |c| c.i16_named("i16_array"))?,
            ),
            (BinXmlValueType::UInt16Array, Some(sz)) => BinXmlValue::UInt16Array(
                cursor.read_sized_vec(sz, 2, |c| c.u16_named("u16_array"))?,
            ),
            (BinXmlValueType::Int32Array, Some(sz)) => BinXmlValue::Int32Array(
                cursor.read_sized_vec(sz, 4, |c| c.i32_named("i32_array"))?,
            ),
            (BinXmlValueType::UInt32Array, Some(sz)) => BinXmlValue::UInt32Array(
                cursor.read_sized_vec(sz, 4, |c| c.u32_named("u32_array"))?,
            ),
            (BinXmlValueType::Int64Array, Some(sz)) => BinXmlValue::Int64Array(
                cursor.read_sized_vec(sz, 8, |c| c.i64_named("i64_array"))?,
            ),
            (BinXmlValueType::UInt64Array, Some(sz)) => BinXmlValue::UInt64Array(
                cursor.read_sized_vec(sz, 8, |c| c.u64_named("u64_array"))?,
            ),
            (BinXmlValueType::Real32Array, Some(sz)) => BinXmlValue::Real32Array(
                cursor.read_sized_vec(sz, 4, |c| c.f32_named("f32_array"))?,
            ),
            (BinXmlValueType::Real64Array, Some(sz)) => BinXmlValue::Real64Array(
                cursor.read_sized_vec(sz, 8, |c| c.f64_named("f64_array"))?,
            ),
            (BinXmlValueType::BoolArray, Some(sz)) => {
                BinXmlValue::BoolArray(cursor.read_sized_vec(sz, 4, |c| {
                    let offset = c.position();
                    Ok(normalize_bool(c.i32_named("bool_array")?, offset))
                })?)
            }
            (BinXmlValueType::GuidArray, Some(sz)) => {
                BinXmlValue::GuidArray(cursor.read_sized_vec(sz, 16, Guid::read)?)
            }
            (BinXmlValueType::FileTimeArray, Some(sz)) => {
                BinXmlValue::FileTimeArray(cursor.read_sized_vec(sz, 8, |c| {
                    filetime_to_timestamp(c.u64_named("filetime_array")?)
                })?)
            }
            (BinXmlValueType::SysTimeArray, Some(sz)) => {
                BinXmlValue::SysTimeArray(cursor.read_sized_vec(sz, 16, |c| {
                    let bytes = c.array::<16>("systime_array")?;
                    systime_from_bytes(&bytes)
                })?)
            }
            // SIDs are variable width; the element size is only a capacity hint.
            (BinXmlValueType::SidArray, Some(sz)) => {
                BinXmlValue::SidArray(cursor.read_sized_vec(sz, 8, Sid::read)?)
            }
            (BinXmlValueType::HexInt32Array, Some(sz)) => BinXmlValue::HexInt32Array(
                cursor.read_sized_vec(sz, 4, |c| c.u32_named("hex32_array"))?,
            ),
            (BinXmlValueType::HexInt64Array, Some(sz)) => BinXmlValue::HexInt64Array(
                cursor.read_sized_vec(sz, 8, |c| c.u64_named("hex64_array"))?,
            ),

            // Handles, EvtXml payloads and arrays without a size descriptor
            // carry no representable data.
            (other, size) => {
                warn!(
                    "value type {other:?} (size {size:?}) at offset {} has no decoded representation; emitting null",
                    cursor.position()
                );
                Self::skip_opaque(cursor, size)?;
                BinXmlValue::Null
            }
        };

        Ok(value)
    }
}

fn normalize_bool(raw: i32, offset: u64) -> bool {
    match raw {
        0 => false,
        1 => true,
        other => {
            warn!(
                "invalid boolean value {} at offset {}; treating as {}",
                other,
                offset,
                other != 0
            );
            other != 0
        }
    }
}

fn decode_ansi(ctx: &BinXmlContext<'_>, raw: &[u8]) -> DecodeResult<String> {
    // Filter embedded NUL bytes (historical behavior).
    let filtered: Vec<u8> = raw.iter().copied().filter(|&b| b != 0).collect();
    ctx.ansi_codec
        .decode(&filtered, DecoderTrap::Strict)
        .map_err(|m| DecodeError::AnsiDecode {
            encoding_used: ctx.ansi_codec.name(),
            inner_message: m.to_string(),
        })
}

fn to_delimited_list<N: ToString>(ns: &[N]) -> String {
    ns.iter()
        .map(ToString::to_string)
        .collect::<Vec<String>>()
        .join(",")
}

fn bytes_as_hex(bytes: &[u8]) -> String {
    bytes
        .iter()
        .fold(String::with_capacity(bytes.len() * 2), |mut acc, &b| {
            let _ = write!(acc, "{b:02X}");
            acc
        })
}

impl From<&BinXmlValue> for JsonValue {
    fn from(value: &BinXmlValue) -> Self {
        match value {
            BinXmlValue::Null => JsonValue::Null,
            BinXmlValue::String(s) => json!(s),
            BinXmlValue::AnsiString(s) => json!(s),
            BinXmlValue::Int8(num) => json!(num),
            BinXmlValue::UInt8(num) => json!(num),
            BinXmlValue::Int16(num) => json!(num),
            BinXmlValue::UInt16(num) => json!(num),
            BinXmlValue::Int32(num) => json!(num),
            BinXmlValue::UInt32(num) => json!(num),
            BinXmlValue::Int64(num) => json!(num),
            BinXmlValue::UInt64(num) => json!(num),
            BinXmlValue::Real32(num) => json!(num),
            BinXmlValue::Real64(num) => json!(num),
            BinXmlValue::Bool(b) => json!(b),
            BinXmlValue::Binary(bytes) => json!(bytes_as_hex(bytes)),
            BinXmlValue::Guid(guid) => json!(guid.to_string()),
            BinXmlValue::FileTime(tm) => json!(format_utc_timestamp(tm)),
            BinXmlValue::SysTime(tm) => json!(format_utc_timestamp(tm)),
            BinXmlValue::Sid(sid) => json!(sid.to_string()),
            BinXmlValue::HexInt32(v) => json!(format!("0x{v:x}")),
            BinXmlValue::HexInt64(v) => json!(format!("0x{v:x}")),
            // Expanded before conversion; an unexpanded fragment has no
            // useful JSON shape.
            BinXmlValue::BinXml(_) => JsonValue::Null,
            BinXmlValue::StringArray(items) => json!(items),
            BinXmlValue::Int8Array(numbers) => json!(numbers),
            BinXmlValue::UInt8Array(numbers) => json!(numbers),
            BinXmlValue::Int16Array(numbers) => json!(numbers),
            BinXmlValue::UInt16Array(numbers) => json!(numbers),
            BinXmlValue::Int32Array(numbers) => json!(numbers),
            BinXmlValue::UInt32Array(numbers) => json!(numbers),
            BinXmlValue::Int64Array(numbers) => json!(numbers),
            BinXmlValue::UInt64Array(numbers) => json!(numbers),
            BinXmlValue::Real32Array(numbers) => json!(numbers),
            BinXmlValue::Real64Array(numbers) => json!(numbers),
            BinXmlValue::BoolArray(bools) => json!(bools),
            BinXmlValue::GuidArray(guids) => {
                json!(guids.iter().map(Guid::to_string).collect::<Vec<String>>())
            }
            BinXmlValue::FileTimeArray(filetimes) => json!(
                filetimes
                    .iter()
                    .map(format_utc_timestamp)
                    .collect::<Vec<String>>()
            ),
            BinXmlValue::SysTimeArray(systimes) => json!(
                systimes
                    .iter()
                    .map(format_utc_timestamp)
                    .collect::<Vec<String>>()
            ),
            BinXmlValue::SidArray(sids) => {
                json!(sids.iter().map(Sid::to_string).collect::<Vec<String>>())
            }
            BinXmlValue::HexInt32Array(values) => json!(
                values
                    .iter()
                    .map(|v| format!("0x{v:x}"))
                    .collect::<Vec<String>>()
            ),
            BinXmlValue::HexInt64Array(values) => json!(
                values
                    .iter()
                    .map(|v| format!("0x{v:x}"))
                    .collect::<Vec<String>>()
            ),
        }
    }
}

impl BinXmlValue {
    pub fn as_cow_str(&self) -> Cow<'_, str> {
        match self {
            BinXmlValue::Null => Cow::Borrowed(""),
            BinXmlValue::String(s) => Cow::Borrowed(s.as_str()),
            BinXmlValue::AnsiString(s) => Cow::Borrowed(s.as_str()),
            BinXmlValue::Int8(num) => Cow::Owned(num.to_string()),
            BinXmlValue::UInt8(num) => Cow::Owned(num.to_string()),
            BinXmlValue::Int16(num) => Cow::Owned(num.to_string()),
            BinXmlValue::UInt16(num) => Cow::Owned(num.to_string()),
            BinXmlValue::Int32(num) => Cow::Owned(num.to_string()),
            BinXmlValue::UInt32(num) => Cow::Owned(num.to_string()),
            BinXmlValue::Int64(num) => Cow::Owned(num.to_string()),
            BinXmlValue::UInt64(num) => Cow::Owned(num.to_string()),
            BinXmlValue::Real32(num) => Cow::Owned(num.to_string()),
            BinXmlValue::Real64(num) => Cow::Owned(num.to_string()),
            BinXmlValue::Bool(b) => Cow::Owned(b.to_string()),
            BinXmlValue::Binary(bytes) => Cow::Owned(bytes_as_hex(bytes)),
            BinXmlValue::Guid(guid) => Cow::Owned(guid.to_string()),
            BinXmlValue::FileTime(tm) => Cow::Owned(format_utc_timestamp(tm)),
            BinXmlValue::SysTime(tm) => Cow::Owned(format_utc_timestamp(tm)),
            BinXmlValue::Sid(sid) => Cow::Owned(sid.to_string()),
            BinXmlValue::HexInt32(v) => Cow::Owned(format!("0x{v:x}")),
            BinXmlValue::HexInt64(v) => Cow::Owned(format!("0x{v:x}")),
            BinXmlValue::BinXml(_) => Cow::Borrowed(""),
            BinXmlValue::StringArray(items) => Cow::Owned(items.join(",")),
            BinXmlValue::Int8Array(numbers) => Cow::Owned(to_delimited_list(numbers)),
            BinXmlValue::UInt8Array(numbers) => Cow::Owned(to_delimited_list(numbers)),
            BinXmlValue::Int16Array(numbers) => Cow::Owned(to_delimited_list(numbers)),
            BinXmlValue::UInt16Array(numbers) => Cow::Owned(to_delimited_list(numbers)),
            BinXmlValue::Int32Array(numbers) => Cow::Owned(to_delimited_list(numbers)),
            BinXmlValue::UInt32Array(numbers) => Cow::Owned(to_delimited_list(numbers)),
            BinXmlValue::Int64Array(numbers) => Cow::Owned(to_delimited_list(numbers)),
            BinXmlValue::UInt64Array(numbers) => Cow::Owned(to_delimited_list(numbers)),
            BinXmlValue::Real32Array(numbers) => Cow::Owned(to_delimited_list(numbers)),
            BinXmlValue::Real64Array(numbers) => Cow::Owned(to_delimited_list(numbers)),
            BinXmlValue::BoolArray(bools) => Cow::Owned(to_delimited_list(bools)),
            BinXmlValue::GuidArray(guids) => Cow::Owned(to_delimited_list(guids)),
            BinXmlValue::FileTimeArray(filetimes) => Cow::Owned(
                filetimes
                    .iter()
                    .map(format_utc_timestamp)
                    .collect::<Vec<String>>()
                    .join(","),
            ),
            BinXmlValue::SysTimeArray(systimes) => Cow::Owned(
                systimes
                    .iter()
                    .map(format_utc_timestamp)
                    .collect::<Vec<String>>()
                    .join(","),
            ),
            BinXmlValue::SidArray(sids) => Cow::Owned(to_delimited_list(sids)),
            BinXmlValue::HexInt32Array(values) => Cow::Owned(
                values
                    .iter()
                    .map(|v| format!("0x{v:x}"))
                    .collect::<Vec<String>>()
                    .join(","),
            ),
            BinXmlValue::HexInt64Array(values) => Cow::Owned(
                values
                    .iter()
                    .map(|v| format!("0x{v:x}"))
                    .collect::<Vec<String>>()
                    .join(","),
            ),
        }
    }
}
