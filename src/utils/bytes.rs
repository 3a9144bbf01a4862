//! Byte-slice utilities for bounds-oriented parsing.
//!
//! Two layers:
//! - free `read_*` helpers returning `Option<T>`, for probing at fixed offsets
//!   (record resynchronization, header field peeks);
//! - [`ByteCursor`], a slice/offset cursor whose reads advance on success and
//!   map failures to [`DecodeError::Truncated`] with the offset and a short
//!   description of what was being read.
//!
//! All numeric reads are little-endian.

use crate::err::{DecodeError, DecodeResult};

/// Read `N` raw bytes at `offset`. `None` if the range is out of bounds.
pub(crate) fn read_array<const N: usize>(buf: &[u8], offset: usize) -> Option<[u8; N]> {
    let end = offset.checked_add(N)?;
    let bytes: [u8; N] = buf.get(offset..end)?.try_into().ok()?;
    Some(bytes)
}

/// Read a single byte at `offset`.
pub(crate) fn read_u8(buf: &[u8], offset: usize) -> Option<u8> {
    buf.get(offset).copied()
}

/// Read a 4-byte signature at `offset` (record magic style).
pub(crate) fn read_sig(buf: &[u8], offset: usize) -> Option<[u8; 4]> {
    read_array::<4>(buf, offset)
}

/// Read a `u16` (little-endian) at `offset`.
pub(crate) fn read_u16_le(buf: &[u8], offset: usize) -> Option<u16> {
    Some(u16::from_le_bytes(read_array::<2>(buf, offset)?))
}

/// Read a `u32` (little-endian) at `offset`.
pub(crate) fn read_u32_le(buf: &[u8], offset: usize) -> Option<u32> {
    Some(u32::from_le_bytes(read_array::<4>(buf, offset)?))
}

/// Read a `u64` (little-endian) at `offset`.
pub(crate) fn read_u64_le(buf: &[u8], offset: usize) -> Option<u64> {
    Some(u64::from_le_bytes(read_array::<8>(buf, offset)?))
}

#[inline]
fn truncated(what: &'static str, offset: usize, need: usize, len: usize) -> DecodeError {
    DecodeError::Truncated {
        what,
        offset: offset as u64,
        need,
        have: len.saturating_sub(offset),
    }
}

fn slice_r<'a>(
    buf: &'a [u8],
    offset: usize,
    len: usize,
    what: &'static str,
) -> DecodeResult<&'a [u8]> {
    let end = offset
        .checked_add(len)
        .ok_or_else(|| truncated(what, offset, len, buf.len()))?;
    buf.get(offset..end)
        .ok_or_else(|| truncated(what, offset, len, buf.len()))
}

/// Decode UTF-16LE bytes strictly. `None` if the data contains unpaired
/// surrogates.
pub(crate) fn decode_utf16le(bytes: &[u8]) -> Option<String> {
    let units: Vec<u16> = bytes
        .chunks_exact(2)
        .map(|pair| u16::from_le_bytes([pair[0], pair[1]]))
        .collect();
    String::from_utf16(&units).ok()
}

/// A lightweight cursor over an immutable byte slice.
///
/// This is the slice/offset equivalent of `Cursor<&[u8]>`, intended for
/// parsing data that is already in memory with explicit bounds and offset
/// control. All reads are little-endian and advance the cursor on success.
#[derive(Clone, Copy, Debug)]
pub(crate) struct ByteCursor<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> ByteCursor<'a> {
    #[inline]
    pub(crate) fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    #[inline]
    pub(crate) fn with_pos(buf: &'a [u8], pos: usize) -> DecodeResult<Self> {
        // pos == len is EOF, pos > len is an error.
        let _ = slice_r(buf, pos, 0, "cursor.position")?;
        Ok(Self { buf, pos })
    }

    #[inline]
    pub(crate) fn buf(&self) -> &'a [u8] {
        self.buf
    }

    #[inline]
    pub(crate) fn pos(&self) -> usize {
        self.pos
    }

    #[inline]
    pub(crate) fn position(&self) -> u64 {
        self.pos as u64
    }

    #[inline]
    pub(crate) fn remaining(&self) -> usize {
        self.buf.len().saturating_sub(self.pos)
    }

    #[inline]
    pub(crate) fn set_pos(&mut self, pos: usize, what: &'static str) -> DecodeResult<()> {
        let _ = slice_r(self.buf, pos, 0, what)?;
        self.pos = pos;
        Ok(())
    }

    #[inline]
    pub(crate) fn advance(&mut self, n: usize, what: &'static str) -> DecodeResult<()> {
        let new_pos = self
            .pos
            .checked_add(n)
            .ok_or_else(|| truncated(what, self.pos, n, self.buf.len()))?;
        self.set_pos(new_pos, what)
    }

    #[inline]
    pub(crate) fn take_bytes(&mut self, len: usize, what: &'static str) -> DecodeResult<&'a [u8]> {
        let out = slice_r(self.buf, self.pos, len, what)?;
        self.pos += len;
        Ok(out)
    }

    #[inline]
    pub(crate) fn array<const N: usize>(&mut self, what: &'static str) -> DecodeResult<[u8; N]> {
        let v = read_array::<N>(self.buf, self.pos)
            .ok_or_else(|| truncated(what, self.pos, N, self.buf.len()))?;
        self.pos += N;
        Ok(v)
    }

    #[inline]
    pub(crate) fn u8(&mut self) -> DecodeResult<u8> {
        self.u8_named("u8")
    }

    #[inline]
    pub(crate) fn u8_named(&mut self, what: &'static str) -> DecodeResult<u8> {
        let b = read_u8(self.buf, self.pos).ok_or_else(|| truncated(what, self.pos, 1, self.buf.len()))?;
        self.pos += 1;
        Ok(b)
    }

    #[inline]
    pub(crate) fn u16(&mut self) -> DecodeResult<u16> {
        self.u16_named("u16")
    }

    #[inline]
    pub(crate) fn u16_named(&mut self, what: &'static str) -> DecodeResult<u16> {
        let v = read_u16_le(self.buf, self.pos)
            .ok_or_else(|| truncated(what, self.pos, 2, self.buf.len()))?;
        self.pos += 2;
        Ok(v)
    }

    #[inline]
    pub(crate) fn u32(&mut self) -> DecodeResult<u32> {
        self.u32_named("u32")
    }

    #[inline]
    pub(crate) fn u32_named(&mut self, what: &'static str) -> DecodeResult<u32> {
        let v = read_u32_le(self.buf, self.pos)
            .ok_or_else(|| truncated(what, self.pos, 4, self.buf.len()))?;
        self.pos += 4;
        Ok(v)
    }

    #[inline]
    pub(crate) fn u64(&mut self) -> DecodeResult<u64> {
        self.u64_named("u64")
    }

    #[inline]
    pub(crate) fn u64_named(&mut self, what: &'static str) -> DecodeResult<u64> {
        let v = read_u64_le(self.buf, self.pos)
            .ok_or_else(|| truncated(what, self.pos, 8, self.buf.len()))?;
        self.pos += 8;
        Ok(v)
    }

    #[inline]
    pub(crate) fn i8_named(&mut self, what: &'static str) -> DecodeResult<i8> {
        Ok(self.u8_named(what)? as i8)
    }

    #[inline]
    pub(crate) fn i16_named(&mut self, what: &'static str) -> DecodeResult<i16> {
        Ok(self.u16_named(what)? as i16)
    }

    #[inline]
    pub(crate) fn i32_named(&mut self, what: &'static str) -> DecodeResult<i32> {
        Ok(self.u32_named(what)? as i32)
    }

    #[inline]
    pub(crate) fn i64_named(&mut self, what: &'static str) -> DecodeResult<i64> {
        Ok(self.u64_named(what)? as i64)
    }

    #[inline]
    pub(crate) fn f32_named(&mut self, what: &'static str) -> DecodeResult<f32> {
        Ok(f32::from_le_bytes(self.array::<4>(what)?))
    }

    #[inline]
    pub(crate) fn f64_named(&mut self, what: &'static str) -> DecodeResult<f64> {
        Ok(f64::from_le_bytes(self.array::<8>(what)?))
    }

    /// Read a sized array encoded as "`size_bytes` bytes of consecutive
    /// elements": elements are read until at least `size_bytes` bytes have
    /// been consumed since the start of this call.
    ///
    /// `elem_bytes` is only used for capacity preallocation.
    pub(crate) fn read_sized_vec<T>(
        &mut self,
        size_bytes: u16,
        elem_bytes: usize,
        mut read_one: impl FnMut(&mut Self) -> DecodeResult<T>,
    ) -> DecodeResult<Vec<T>> {
        let size_usize = usize::from(size_bytes);
        if size_usize == 0 {
            return Ok(Vec::new());
        }

        let start = self.pos;
        let mut out = Vec::with_capacity(size_usize / elem_bytes.max(1));
        while (self.pos - start) < size_usize {
            out.push(read_one(self)?);
        }
        Ok(out)
    }

    /// Read `char_count` UTF-16 code units (little-endian), decoding up to the
    /// first NUL code unit if one is present.
    pub(crate) fn utf16_by_char_count(
        &mut self,
        char_count: usize,
        what: &'static str,
    ) -> DecodeResult<Option<String>> {
        if char_count == 0 {
            return Ok(None);
        }

        let byte_len = char_count
            .checked_mul(2)
            .ok_or_else(|| truncated(what, self.pos, usize::MAX, self.buf.len()))?;
        let start = self.pos;
        let bytes = self.take_bytes(byte_len, what)?;

        let mut end = bytes.len();
        for (idx, pair) in bytes.chunks_exact(2).enumerate() {
            if pair[0] == 0 && pair[1] == 0 {
                end = idx * 2;
                break;
            }
        }

        decode_utf16le(&bytes[..end])
            .map(Some)
            .ok_or(DecodeError::MalformedUtf16 { offset: start as u64 })
    }

    /// Read a `u16` length prefix (number of UTF-16 code units), then that many
    /// code units. Optionally reads and discards a trailing NUL code unit.
    pub(crate) fn len_prefixed_utf16_string(
        &mut self,
        is_null_terminated: bool,
        what: &'static str,
    ) -> DecodeResult<Option<String>> {
        let char_count = self.u16_named(what)? as usize;
        let s = self.utf16_by_char_count(char_count, what)?;
        if is_null_terminated {
            let _ = self.u16_named(what)?;
        }
        Ok(s)
    }

    /// Read UTF-16 code units until a NUL (0x0000) code unit is encountered.
    pub(crate) fn null_terminated_utf16_string(
        &mut self,
        what: &'static str,
    ) -> DecodeResult<String> {
        let start = self.pos;
        loop {
            let cu = read_u16_le(self.buf, self.pos)
                .ok_or_else(|| truncated(what, self.pos, 2, self.buf.len()))?;
            self.pos += 2;
            if cu == 0 {
                break;
            }
        }

        let end = self.pos.saturating_sub(2);
        decode_utf16le(&self.buf[start..end])
            .ok_or(DecodeError::MalformedUtf16 { offset: start as u64 })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn cursor_reads_advance_in_order() {
        let buf = [0x01_u8, 0x02, 0x03, 0x04, 0x05, 0x06, 0x07];
        let mut c = ByteCursor::new(&buf);

        assert_eq!(c.u8().unwrap(), 0x01);
        assert_eq!(c.u16().unwrap(), 0x0302);
        assert_eq!(c.u32().unwrap(), 0x0706_0504);
        assert_eq!(c.pos(), 7);
    }

    #[test]
    fn cursor_truncated_read_reports_offset_and_need() {
        let buf = [0xff_u8, 0xff];
        let mut c = ByteCursor::new(&buf);

        match c.u32_named("chunk.free_space_offset") {
            Err(DecodeError::Truncated {
                what,
                offset,
                need,
                have,
            }) => {
                assert_eq!(what, "chunk.free_space_offset");
                assert_eq!(offset, 0);
                assert_eq!(need, 4);
                assert_eq!(have, 2);
            }
            other => panic!("expected Truncated, got {other:?}"),
        }
    }

    #[test]
    fn utf16_read_stops_at_embedded_nul() {
        // "ab\0cd" as UTF-16LE code units.
        let buf = [0x61, 0x00, 0x62, 0x00, 0x00, 0x00, 0x63, 0x00, 0x64, 0x00];
        let mut c = ByteCursor::new(&buf);

        let s = c.utf16_by_char_count(5, "test string").unwrap();
        assert_eq!(s.as_deref(), Some("ab"));
        // The cursor still consumed all five code units.
        assert_eq!(c.pos(), 10);
    }

    #[test]
    fn len_prefixed_utf16_with_terminator() {
        let mut buf = vec![0x03, 0x00];
        buf.extend_from_slice(&[0x45, 0x00, 0x76, 0x00, 0x74, 0x00]);
        buf.extend_from_slice(&[0x00, 0x00]);

        let mut c = ByteCursor::new(&buf);
        let s = c.len_prefixed_utf16_string(true, "pi data").unwrap();
        assert_eq!(s.as_deref(), Some("Evt"));
        assert_eq!(c.pos(), buf.len());
    }

    #[test]
    fn unpaired_surrogate_is_malformed() {
        // Lone high surrogate 0xd800.
        let buf = [0x00, 0xd8, 0x41, 0x00];
        let mut c = ByteCursor::new(&buf);

        assert!(matches!(
            c.utf16_by_char_count(2, "test string"),
            Err(DecodeError::MalformedUtf16 { offset: 0 })
        ));
    }
}
