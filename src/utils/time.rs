use jiff::{Timestamp, civil::DateTime, tz::Offset};

use crate::err::{DecodeError, DecodeResult};

/// Seconds between 1601-01-01 (FILETIME epoch) and 1970-01-01 (Unix epoch).
const WINDOWS_TO_UNIX_SECS: i64 = 11_644_473_600;

/// Convert a Windows FILETIME (100ns ticks since 1601-01-01) to a [`Timestamp`].
#[inline]
pub(crate) fn filetime_to_timestamp(filetime: u64) -> DecodeResult<Timestamp> {
    let secs = (filetime / 10_000_000) as i64 - WINDOWS_TO_UNIX_SECS;
    let nanos = ((filetime % 10_000_000) * 100) as i32;
    Timestamp::new(secs, nanos).map_err(|_| DecodeError::InvalidDateTime)
}

/// Convert a Windows SYSTEMTIME (eight little-endian `u16` fields) to a
/// [`Timestamp`].
pub(crate) fn systime_from_bytes(bytes: &[u8; 16]) -> DecodeResult<Timestamp> {
    let year = i32::from(u16::from_le_bytes([bytes[0], bytes[1]]));
    let month = u32::from(u16::from_le_bytes([bytes[2], bytes[3]]));
    let _day_of_week = u16::from_le_bytes([bytes[4], bytes[5]]);
    let day = u32::from(u16::from_le_bytes([bytes[6], bytes[7]]));
    let hour = u32::from(u16::from_le_bytes([bytes[8], bytes[9]]));
    let minute = u32::from(u16::from_le_bytes([bytes[10], bytes[11]]));
    let second = u32::from(u16::from_le_bytes([bytes[12], bytes[13]]));
    let milliseconds = u32::from(u16::from_le_bytes([bytes[14], bytes[15]]));

    // The entire value is unset. By convention, use the "1601-01-01T00:00:00.0000000Z" timestamp.
    if year == 0
        && month == 0
        && day == 0
        && hour == 0
        && minute == 0
        && second == 0
        && milliseconds == 0
    {
        return filetime_to_timestamp(0);
    }

    let year = i16::try_from(year).map_err(|_| DecodeError::InvalidDateTime)?;
    let month = i8::try_from(month).map_err(|_| DecodeError::InvalidDateTime)?;
    let day = i8::try_from(day).map_err(|_| DecodeError::InvalidDateTime)?;
    let hour = i8::try_from(hour).map_err(|_| DecodeError::InvalidDateTime)?;
    let minute = i8::try_from(minute).map_err(|_| DecodeError::InvalidDateTime)?;
    let second = i8::try_from(second).map_err(|_| DecodeError::InvalidDateTime)?;
    let nanos =
        i32::try_from(milliseconds * 1_000_000).map_err(|_| DecodeError::InvalidDateTime)?;

    let dt = DateTime::new(year, month, day, hour, minute, second, nanos)
        .map_err(|_| DecodeError::InvalidDateTime)?;
    Offset::UTC
        .to_timestamp(dt)
        .map_err(|_| DecodeError::InvalidDateTime)
}

#[inline]
fn push_2_digits(out: &mut String, value: u8) {
    out.push(char::from(b'0' + (value / 10) % 10));
    out.push(char::from(b'0' + value % 10));
}

#[inline]
fn push_4_digits(out: &mut String, value: u16) {
    out.push(char::from(b'0' + ((value / 1000) % 10) as u8));
    out.push(char::from(b'0' + ((value / 100) % 10) as u8));
    out.push(char::from(b'0' + ((value / 10) % 10) as u8));
    out.push(char::from(b'0' + (value % 10) as u8));
}

#[inline]
fn push_6_digits(out: &mut String, value: u32) {
    let mut div = 100_000;
    for _ in 0..6 {
        out.push(char::from(b'0' + ((value / div) % 10) as u8));
        div /= 10;
    }
}

/// Render a timestamp as `YYYY-MM-DDTHH:MM:SS.ffffffZ` (microsecond
/// precision, UTC), the shape Event Viewer uses for `TimeCreated`.
pub(crate) fn format_utc_timestamp(timestamp: &Timestamp) -> String {
    let dt = Offset::UTC.to_datetime(*timestamp);
    let micros = (dt.subsec_nanosecond() / 1_000) as u32;

    let mut out = String::with_capacity(27);
    push_4_digits(&mut out, dt.year() as u16);
    out.push('-');
    push_2_digits(&mut out, dt.month() as u8);
    out.push('-');
    push_2_digits(&mut out, dt.day() as u8);
    out.push('T');
    push_2_digits(&mut out, dt.hour() as u8);
    out.push(':');
    push_2_digits(&mut out, dt.minute() as u8);
    out.push(':');
    push_2_digits(&mut out, dt.second() as u8);
    out.push('.');
    push_6_digits(&mut out, micros);
    out.push('Z');
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn filetime_zero_is_windows_epoch() {
        let ts = filetime_to_timestamp(0).unwrap();
        assert_eq!(format_utc_timestamp(&ts), "1601-01-01T00:00:00.000000Z");
    }

    #[test]
    fn filetime_of_unix_epoch() {
        let ts = filetime_to_timestamp(116_444_736_000_000_000).unwrap();
        assert_eq!(format_utc_timestamp(&ts), "1970-01-01T00:00:00.000000Z");
    }

    #[test]
    fn filetime_keeps_sub_second_ticks() {
        // 2019-03-29T04:51:11.5398086Z from a real security log.
        let ts = filetime_to_timestamp(132_001_470_715_398_086).unwrap();
        assert_eq!(format_utc_timestamp(&ts), "2019-03-29T04:51:11.539808Z");
    }

    #[test]
    fn zeroed_systime_maps_to_windows_epoch() {
        let ts = systime_from_bytes(&[0u8; 16]).unwrap();
        assert_eq!(format_utc_timestamp(&ts), "1601-01-01T00:00:00.000000Z");
    }

    #[test]
    fn systime_fields_are_little_endian_u16() {
        let mut bytes = [0u8; 16];
        bytes[0..2].copy_from_slice(&2020u16.to_le_bytes());
        bytes[2..4].copy_from_slice(&5u16.to_le_bytes());
        bytes[4..6].copy_from_slice(&3u16.to_le_bytes()); // day of week, ignored
        bytes[6..8].copy_from_slice(&13u16.to_le_bytes());
        bytes[8..10].copy_from_slice(&7u16.to_le_bytes());
        bytes[10..12].copy_from_slice(&42u16.to_le_bytes());
        bytes[12..14].copy_from_slice(&9u16.to_le_bytes());
        bytes[14..16].copy_from_slice(&250u16.to_le_bytes());

        let ts = systime_from_bytes(&bytes).unwrap();
        assert_eq!(format_utc_timestamp(&ts), "2020-05-13T07:42:09.250000Z");
    }

    #[test]
    fn out_of_range_systime_is_rejected() {
        let mut bytes = [0u8; 16];
        bytes[0..2].copy_from_slice(&2020u16.to_le_bytes());
        bytes[2..4].copy_from_slice(&13u16.to_le_bytes()); // month 13

        assert!(matches!(
            systime_from_bytes(&bytes),
            Err(DecodeError::InvalidDateTime)
        ));
    }
}
