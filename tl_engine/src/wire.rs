// Copyright 2026 the TL Engine Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Word-aligned little-endian cursor primitives.
//!
//! Every scalar occupies whole 32-bit words; 64-bit values take two words. Strings use TL
//! framing:
//! - `len < 254`: one length byte, the data, then zero padding so that the length byte plus data
//!   fill a whole number of words.
//! - `254 <= len < 2^24`: the escape byte `254`, a 3-byte little-endian length, the data, then
//!   zero padding to the next word boundary.
//!
//! A leading `255` is never valid.

use alloc::vec::Vec;
use core::fmt;

/// Largest length that uses the single-byte string header.
pub const SHORT_STRING_LIMIT: usize = 254;

/// Strings of this many bytes or more cannot be framed.
pub const MAX_STRING_LEN: usize = 1 << 24;

const LONG_STRING_MARKER: u8 = 254;
const INVALID_STRING_MARKER: u8 = 255;

/// Errors produced while reading wire data.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum DecodeError {
    /// The buffer ended before the value did.
    UnexpectedEof,
    /// A string started with the reserved `255` byte.
    BadStringPrefix,
}

impl fmt::Display for DecodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnexpectedEof => write!(f, "unexpected end of wire data"),
            Self::BadStringPrefix => write!(f, "invalid string length prefix 255"),
        }
    }
}

impl core::error::Error for DecodeError {}

/// Errors produced while writing wire data.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum EncodeError {
    /// The string is too large for the 24-bit length header.
    StringTooLong {
        /// Length of the rejected string in bytes.
        len: usize,
    },
}

impl fmt::Display for EncodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::StringTooLong { len } => {
                write!(f, "string of {len} bytes exceeds the {MAX_STRING_LEN} byte limit")
            }
        }
    }
}

impl core::error::Error for EncodeError {}

/// Rounds `len` up to a whole number of words.
#[inline]
#[must_use]
pub const fn padded_len(len: usize) -> usize {
    (len + 3) & !3
}

/// Number of bytes a string of `len` bytes occupies on the wire, header and padding included.
#[inline]
#[must_use]
pub const fn encoded_string_len(len: usize) -> usize {
    if len < SHORT_STRING_LIMIT {
        padded_len(len + 1)
    } else {
        padded_len(len + 4)
    }
}

/// Forward-only reader over a borrowed response or schema buffer.
///
/// The position can be rewound with [`WireReader::set_position`]; that is how constructor
/// dispatch backtracks after a failed alternative.
#[derive(Clone, Debug)]
pub struct WireReader<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> WireReader<'a> {
    /// Creates a reader positioned at the start of `bytes`.
    #[must_use]
    pub const fn new(bytes: &'a [u8]) -> Self {
        Self { bytes, pos: 0 }
    }

    /// Current byte offset.
    #[inline]
    #[must_use]
    pub const fn position(&self) -> usize {
        self.pos
    }

    /// Moves the cursor to `pos`, clamped to the end of the buffer.
    #[inline]
    pub fn set_position(&mut self, pos: usize) {
        self.pos = pos.min(self.bytes.len());
    }

    /// Bytes left to read.
    #[inline]
    #[must_use]
    pub const fn remaining(&self) -> usize {
        self.bytes.len().saturating_sub(self.pos)
    }

    /// Whole words left to read.
    #[inline]
    #[must_use]
    pub const fn remaining_words(&self) -> usize {
        self.remaining() / 4
    }

    /// Returns `true` once every byte has been consumed.
    #[inline]
    #[must_use]
    pub const fn is_at_end(&self) -> bool {
        self.pos >= self.bytes.len()
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8], DecodeError> {
        let end = self.pos.checked_add(n).ok_or(DecodeError::UnexpectedEof)?;
        let out = self
            .bytes
            .get(self.pos..end)
            .ok_or(DecodeError::UnexpectedEof)?;
        self.pos = end;
        Ok(out)
    }

    fn take_array<const N: usize>(&mut self) -> Result<[u8; N], DecodeError> {
        let mut out = [0_u8; N];
        out.copy_from_slice(self.take(N)?);
        Ok(out)
    }

    /// Reads one signed word.
    pub fn read_i32(&mut self) -> Result<i32, DecodeError> {
        Ok(i32::from_le_bytes(self.take_array()?))
    }

    /// Reads one unsigned word (used for magic tags).
    pub fn read_u32(&mut self) -> Result<u32, DecodeError> {
        Ok(u32::from_le_bytes(self.take_array()?))
    }

    /// Reads a two-word signed integer.
    pub fn read_i64(&mut self) -> Result<i64, DecodeError> {
        Ok(i64::from_le_bytes(self.take_array()?))
    }

    /// Reads a two-word IEEE-754 double.
    pub fn read_f64(&mut self) -> Result<f64, DecodeError> {
        Ok(f64::from_le_bytes(self.take_array()?))
    }

    /// Reads a framed string and returns its payload bytes.
    pub fn read_string(&mut self) -> Result<&'a [u8], DecodeError> {
        let start = self.pos;
        let first = *self.bytes.get(start).ok_or(DecodeError::UnexpectedEof)?;
        let (header, len) = match first {
            INVALID_STRING_MARKER => return Err(DecodeError::BadStringPrefix),
            LONG_STRING_MARKER => {
                let [a, b, c] = self
                    .bytes
                    .get(start + 1..start + 4)
                    .and_then(|h| <[u8; 3]>::try_from(h).ok())
                    .ok_or(DecodeError::UnexpectedEof)?;
                (4, usize::from(a) | usize::from(b) << 8 | usize::from(c) << 16)
            }
            short => (1, usize::from(short)),
        };
        if self.remaining() < padded_len(header + len) {
            return Err(DecodeError::UnexpectedEof);
        }
        let data = self
            .bytes
            .get(start + header..start + header + len)
            .ok_or(DecodeError::UnexpectedEof)?;
        self.pos = start + padded_len(header + len);
        Ok(data)
    }
}

/// Growable output buffer for store programs.
#[derive(Clone, Debug, Default)]
pub struct WireWriter {
    bytes: Vec<u8>,
}

impl WireWriter {
    /// Creates an empty writer.
    #[must_use]
    pub const fn new() -> Self {
        Self { bytes: Vec::new() }
    }

    /// Creates an empty writer with room for `capacity` bytes.
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            bytes: Vec::with_capacity(capacity),
        }
    }

    /// Bytes written so far.
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    /// Returns `true` if nothing has been written.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Discards everything written after `len`.
    #[inline]
    pub fn truncate(&mut self, len: usize) {
        self.bytes.truncate(len);
    }

    /// Discards all output, keeping the allocation.
    #[inline]
    pub fn clear(&mut self) {
        self.bytes.clear();
    }

    /// Appends one signed word.
    pub fn write_i32(&mut self, v: i32) {
        self.bytes.extend_from_slice(&v.to_le_bytes());
    }

    /// Appends one unsigned word.
    pub fn write_u32(&mut self, v: u32) {
        self.bytes.extend_from_slice(&v.to_le_bytes());
    }

    /// Appends a two-word signed integer.
    pub fn write_i64(&mut self, v: i64) {
        self.bytes.extend_from_slice(&v.to_le_bytes());
    }

    /// Appends a two-word double.
    pub fn write_f64(&mut self, v: f64) {
        self.bytes.extend_from_slice(&v.to_le_bytes());
    }

    /// Appends a framed string.
    pub fn write_string(&mut self, data: &[u8]) -> Result<(), EncodeError> {
        let len = data.len();
        if len >= MAX_STRING_LEN {
            return Err(EncodeError::StringTooLong { len });
        }
        let header = if let Ok(short) = u8::try_from(len)
            && len < SHORT_STRING_LIMIT
        {
            self.bytes.push(short);
            1
        } else {
            let wide = u32::try_from(len).map_err(|_| EncodeError::StringTooLong { len })?;
            let [a, b, c, _] = wide.to_le_bytes();
            self.bytes.extend_from_slice(&[LONG_STRING_MARKER, a, b, c]);
            4
        };
        self.bytes.extend_from_slice(data);
        let pad = padded_len(header + len) - (header + len);
        self.bytes.resize(self.bytes.len() + pad, 0);
        Ok(())
    }

    /// Borrows the bytes written so far.
    #[inline]
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Consumes the writer and returns its buffer.
    #[inline]
    #[must_use]
    pub fn into_bytes(self) -> Vec<u8> {
        self.bytes
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::vec;

    #[test]
    fn words_are_little_endian() {
        let mut w = WireWriter::new();
        w.write_i32(-2);
        w.write_i64(0x0102_0304_0506_0708);
        assert_eq!(
            w.as_bytes(),
            &[0xfe, 0xff, 0xff, 0xff, 8, 7, 6, 5, 4, 3, 2, 1]
        );

        let bytes = w.into_bytes();
        let mut r = WireReader::new(&bytes);
        assert_eq!(r.read_i32().unwrap(), -2);
        assert_eq!(r.read_i64().unwrap(), 0x0102_0304_0506_0708);
        assert!(r.is_at_end());
    }

    #[test]
    fn short_string_pads_with_length_byte() {
        let mut w = WireWriter::new();
        w.write_string(b"abc").unwrap();
        assert_eq!(w.as_bytes(), b"\x03abc");

        let mut w = WireWriter::new();
        w.write_string(b"abcd").unwrap();
        assert_eq!(w.as_bytes(), b"\x04abcd\0\0\0");

        let mut w = WireWriter::new();
        w.write_string(b"").unwrap();
        assert_eq!(w.as_bytes(), &[0, 0, 0, 0]);
    }

    #[test]
    fn long_string_uses_escape_header() {
        let data = vec![7_u8; 300];
        let mut w = WireWriter::new();
        w.write_string(&data).unwrap();
        assert_eq!(w.len(), 304);
        assert_eq!(&w.as_bytes()[..4], &[254, 0x2c, 0x01, 0x00]);
        assert_eq!(w.len(), encoded_string_len(300));

        let bytes = w.into_bytes();
        let mut r = WireReader::new(&bytes);
        assert_eq!(r.read_string().unwrap(), &data[..]);
        assert!(r.is_at_end());
    }

    #[test]
    fn boundary_lengths_round_trip() {
        for len in [253_usize, 254, 255, 1021] {
            let data = vec![b'x'; len];
            let mut w = WireWriter::new();
            w.write_string(&data).unwrap();
            assert_eq!(w.len() % 4, 0, "len {len} must stay word aligned");
            assert_eq!(w.len(), encoded_string_len(len));
            let bytes = w.into_bytes();
            let mut r = WireReader::new(&bytes);
            assert_eq!(r.read_string().unwrap().len(), len);
            assert!(r.is_at_end());
        }
    }

    #[test]
    fn rejects_reserved_prefix_and_truncation() {
        let mut r = WireReader::new(&[255, 0, 0, 0]);
        assert_eq!(r.read_string(), Err(DecodeError::BadStringPrefix));

        let mut r = WireReader::new(&[5, b'a', b'b', b'c']);
        assert_eq!(r.read_string(), Err(DecodeError::UnexpectedEof));
        assert_eq!(r.position(), 0);

        let mut r = WireReader::new(&[1, 2, 3]);
        assert_eq!(r.read_i32(), Err(DecodeError::UnexpectedEof));
    }

    #[test]
    fn oversized_string_is_rejected() {
        let data = vec![0_u8; MAX_STRING_LEN];
        let mut w = WireWriter::new();
        assert_eq!(
            w.write_string(&data),
            Err(EncodeError::StringTooLong { len: MAX_STRING_LEN })
        );
    }
}
