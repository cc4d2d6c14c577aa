use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::config::WireLimits;
use crate::error::DecodeError;

/// A u64 needs at most ten 7-bit groups.
const MAX_VINT_BYTES: usize = 10;

/// Append-only byte sink for wire encoding.
///
/// Writes are infallible; the buffer grows as needed.
#[derive(Debug, Default)]
pub struct StreamOutput {
    buf: BytesMut,
}

impl StreamOutput {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            buf: BytesMut::with_capacity(capacity),
        }
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.buf
    }

    /// Consume the sink, returning the encoded bytes.
    pub fn freeze(self) -> Bytes {
        self.buf.freeze()
    }

    pub fn write_u8(&mut self, value: u8) {
        self.buf.put_u8(value);
    }

    pub fn write_bool(&mut self, value: bool) {
        self.buf.put_u8(u8::from(value));
    }

    /// Unsigned LEB128: low 7 bits first, high bit marks continuation.
    #[allow(clippy::cast_possible_truncation)] // masked to 7 bits
    pub fn write_vint(&mut self, mut value: u64) {
        while value >= 0x80 {
            self.buf.put_u8(((value & 0x7f) as u8) | 0x80);
            value >>= 7;
        }
        self.buf.put_u8(value as u8);
    }

    pub fn write_len(&mut self, len: usize) {
        self.write_vint(len as u64);
    }

    /// Length-prefixed raw bytes.
    pub fn write_byte_block(&mut self, bytes: &[u8]) {
        self.write_len(bytes.len());
        self.buf.put_slice(bytes);
    }

    /// Length-prefixed UTF-8 string.
    pub fn write_string(&mut self, value: &str) {
        self.write_byte_block(value.as_bytes());
    }

    /// Presence flag, then the value when present.
    pub fn write_optional<T: ?Sized>(
        &mut self,
        value: Option<&T>,
        write: impl FnOnce(&mut Self, &T),
    ) {
        match value {
            Some(v) => {
                self.write_bool(true);
                write(self, v);
            }
            None => self.write_bool(false),
        }
    }

    pub fn write_optional_string(&mut self, value: Option<&str>) {
        self.write_optional(value, Self::write_string);
    }
}

/// Bounds-checked reader over an immutable byte buffer.
///
/// Every read either consumes exactly the bytes it needs or fails without
/// producing a value. Slices handed out by [`read_byte_block`](Self::read_byte_block)
/// share the underlying allocation.
#[derive(Debug, Clone)]
pub struct StreamInput {
    buf: Bytes,
    limits: WireLimits,
}

impl StreamInput {
    pub fn new(buf: impl Into<Bytes>) -> Self {
        Self::with_limits(buf, WireLimits::default())
    }

    pub fn with_limits(buf: impl Into<Bytes>, limits: WireLimits) -> Self {
        Self {
            buf: buf.into(),
            limits,
        }
    }

    pub fn limits(&self) -> &WireLimits {
        &self.limits
    }

    pub fn remaining(&self) -> usize {
        self.buf.remaining()
    }

    pub fn is_empty(&self) -> bool {
        !self.buf.has_remaining()
    }

    fn ensure(&self, needed: usize) -> Result<(), DecodeError> {
        let remaining = self.buf.remaining();
        if remaining < needed {
            return Err(DecodeError::Truncated { needed, remaining });
        }
        Ok(())
    }

    pub fn read_u8(&mut self) -> Result<u8, DecodeError> {
        self.ensure(1)?;
        Ok(self.buf.get_u8())
    }

    pub fn read_bool(&mut self) -> Result<bool, DecodeError> {
        match self.read_u8()? {
            0 => Ok(false),
            1 => Ok(true),
            other => Err(DecodeError::malformed(format!(
                "invalid boolean byte {other:#04x}"
            ))),
        }
    }

    pub fn read_vint(&mut self) -> Result<u64, DecodeError> {
        let mut value = 0u64;
        for i in 0..MAX_VINT_BYTES {
            let byte = self.read_u8()?;
            // Only the lowest bit of the tenth group fits in a u64.
            if i == MAX_VINT_BYTES - 1 && byte > 0x01 {
                return Err(DecodeError::malformed("vint overflows 64 bits"));
            }
            value |= u64::from(byte & 0x7f) << (7 * i);
            if byte & 0x80 == 0 {
                return Ok(value);
            }
        }
        Err(DecodeError::malformed("vint overflows 64 bits"))
    }

    /// Read a vint count and reject it when it exceeds `max`.
    pub fn read_count(&mut self, max: usize, what: &str) -> Result<usize, DecodeError> {
        let raw = self.read_vint()?;
        match usize::try_from(raw) {
            Ok(n) if n <= max => Ok(n),
            _ => Err(DecodeError::malformed(format!(
                "{what} {raw} exceeds limit {max}"
            ))),
        }
    }

    pub fn read_len(&mut self) -> Result<usize, DecodeError> {
        let max = self.limits.max_field_len;
        self.read_count(max, "field length")
    }

    pub fn read_byte_block(&mut self) -> Result<Bytes, DecodeError> {
        let len = self.read_len()?;
        self.ensure(len)?;
        Ok(self.buf.split_to(len))
    }

    pub fn read_string(&mut self) -> Result<String, DecodeError> {
        let block = self.read_byte_block()?;
        std::str::from_utf8(&block)
            .map(str::to_owned)
            .map_err(|e| DecodeError::malformed(format!("invalid utf-8 in string: {e}")))
    }

    pub fn read_optional<T>(
        &mut self,
        read: impl FnOnce(&mut Self) -> Result<T, DecodeError>,
    ) -> Result<Option<T>, DecodeError> {
        if self.read_bool()? {
            read(self).map(Some)
        } else {
            Ok(None)
        }
    }

    pub fn read_optional_string(&mut self) -> Result<Option<String>, DecodeError> {
        self.read_optional(Self::read_string)
    }
}
