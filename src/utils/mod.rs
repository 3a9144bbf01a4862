mod bytes;
mod time;

pub(crate) use self::bytes::{ByteCursor, read_sig, read_u8, read_u32_le, read_u64_le};
pub(crate) use self::time::{filetime_to_timestamp, format_utc_timestamp, systime_from_bytes};
