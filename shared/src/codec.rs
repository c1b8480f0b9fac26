//! Binary wire codec
//!
//! Every payload travels inside an envelope of the form
//! `[type:u8][len:u32 LE][payload]`. Payload fields are written with
//! [`PayloadWriter`] and read back with [`PayloadReader`]:
//!
//! - integers and floats are little-endian
//! - booleans are a single byte
//! - strings are `[u32 len][UTF-8 bytes]`
//! - lists are `[u32 count][items]`

use bytes::{Buf, BufMut, BytesMut};
use thiserror::Error;

/// Size of the `[type][len]` envelope header in bytes
pub const HEADER_LEN: usize = 5;

/// Upper bound on a single payload, well above anything a datagram can carry
pub const MAX_PAYLOAD_LEN: usize = 64 * 1024;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CodecError {
    #[error("malformed packet: {0}")]
    MalformedPacket(String),
}

impl CodecError {
    fn truncated(what: &str, needed: usize, remaining: usize) -> Self {
        CodecError::MalformedPacket(format!(
            "truncated {}: needed {} bytes, {} remaining",
            what, needed, remaining
        ))
    }
}

/// Wraps `payload` in an envelope, appending to `buf`
pub fn encode_into(buf: &mut BytesMut, packet_type: u8, payload: &[u8]) {
    buf.reserve(HEADER_LEN + payload.len());
    buf.put_u8(packet_type);
    buf.put_u32_le(payload.len() as u32);
    buf.put_slice(payload);
}

/// Wraps `payload` in a freshly allocated envelope
pub fn encode(packet_type: u8, payload: &[u8]) -> Vec<u8> {
    let mut buf = BytesMut::with_capacity(HEADER_LEN + payload.len());
    encode_into(&mut buf, packet_type, payload);
    buf.to_vec()
}

/// Splits an envelope into its type byte and payload slice
///
/// Trailing bytes past the declared length are ignored. A declared length
/// larger than the buffer is a [`CodecError::MalformedPacket`].
pub fn decode(bytes: &[u8]) -> Result<(u8, &[u8]), CodecError> {
    if bytes.len() < HEADER_LEN {
        return Err(CodecError::truncated("envelope header", HEADER_LEN, bytes.len()));
    }

    let packet_type = bytes[0];
    let declared = u32::from_le_bytes([bytes[1], bytes[2], bytes[3], bytes[4]]) as usize;
    let available = bytes.len() - HEADER_LEN;

    if declared > available || declared > MAX_PAYLOAD_LEN {
        return Err(CodecError::MalformedPacket(format!(
            "declared length {} exceeds buffer of {} bytes",
            declared, available
        )));
    }

    Ok((packet_type, &bytes[HEADER_LEN..HEADER_LEN + declared]))
}

/// Appends payload fields to a buffer
pub struct PayloadWriter<'a> {
    buf: &'a mut BytesMut,
}

impl<'a> PayloadWriter<'a> {
    pub fn new(buf: &'a mut BytesMut) -> Self {
        Self { buf }
    }

    pub fn u8(&mut self, value: u8) -> &mut Self {
        self.buf.put_u8(value);
        self
    }

    pub fn bool(&mut self, value: bool) -> &mut Self {
        self.buf.put_u8(value as u8);
        self
    }

    pub fn u32(&mut self, value: u32) -> &mut Self {
        self.buf.put_u32_le(value);
        self
    }

    pub fn u64(&mut self, value: u64) -> &mut Self {
        self.buf.put_u64_le(value);
        self
    }

    pub fn f32(&mut self, value: f32) -> &mut Self {
        self.buf.put_f32_le(value);
        self
    }

    pub fn string(&mut self, value: &str) -> &mut Self {
        self.buf.put_u32_le(value.len() as u32);
        self.buf.put_slice(value.as_bytes());
        self
    }

    /// Writes a list count followed by each element via `item`
    pub fn list<T>(&mut self, items: &[T], mut item: impl FnMut(&mut Self, &T)) -> &mut Self {
        self.buf.put_u32_le(items.len() as u32);
        for value in items {
            item(self, value);
        }
        self
    }
}

/// Reads payload fields with bounds checking
///
/// Every read fails with [`CodecError::MalformedPacket`] instead of
/// panicking when the payload is shorter than the layout requires.
pub struct PayloadReader<'a> {
    buf: &'a [u8],
}

impl<'a> PayloadReader<'a> {
    pub fn new(buf: &'a [u8]) -> Self {
        Self { buf }
    }

    pub fn remaining(&self) -> usize {
        self.buf.remaining()
    }

    fn need(&self, what: &str, len: usize) -> Result<(), CodecError> {
        if self.buf.remaining() < len {
            Err(CodecError::truncated(what, len, self.buf.remaining()))
        } else {
            Ok(())
        }
    }

    pub fn u8(&mut self) -> Result<u8, CodecError> {
        self.need("u8", 1)?;
        Ok(self.buf.get_u8())
    }

    pub fn bool(&mut self) -> Result<bool, CodecError> {
        self.need("bool", 1)?;
        Ok(self.buf.get_u8() != 0)
    }

    pub fn u32(&mut self) -> Result<u32, CodecError> {
        self.need("u32", 4)?;
        Ok(self.buf.get_u32_le())
    }

    pub fn u64(&mut self) -> Result<u64, CodecError> {
        self.need("u64", 8)?;
        Ok(self.buf.get_u64_le())
    }

    pub fn f32(&mut self) -> Result<f32, CodecError> {
        self.need("f32", 4)?;
        Ok(self.buf.get_f32_le())
    }

    pub fn string(&mut self) -> Result<String, CodecError> {
        let len = self.u32()? as usize;
        self.need("string", len)?;
        let buf: &'a [u8] = self.buf;
        let (head, tail) = buf.split_at(len);
        let value = std::str::from_utf8(head)
            .map_err(|e| CodecError::MalformedPacket(format!("invalid UTF-8 string: {}", e)))?
            .to_string();
        self.buf = tail;
        Ok(value)
    }

    /// Reads a list count and then each element via `item`
    ///
    /// The count is checked against the remaining bytes (every element is at
    /// least `min_item_len` long) before anything is allocated.
    pub fn list<T>(
        &mut self,
        min_item_len: usize,
        mut item: impl FnMut(&mut Self) -> Result<T, CodecError>,
    ) -> Result<Vec<T>, CodecError> {
        let count = self.u32()? as usize;
        self.need("list", count.saturating_mul(min_item_len.max(1)))?;
        let mut items = Vec::with_capacity(count);
        for _ in 0..count {
            items.push(item(self)?);
        }
        Ok(items)
    }
}
