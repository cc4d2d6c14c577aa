use bytes::Bytes;

use crate::config::WireLimits;
use crate::error::DecodeError;
use crate::stream::{StreamInput, StreamOutput};

/// Binary wire contract for values that cross a process boundary.
///
/// Field order is the format: there is no versioning, so any change to what
/// `write_to` emits is a breaking change for every reader.
pub trait WireCodec: Sized {
    fn write_to(&self, out: &mut StreamOutput);

    /// Read exactly one value. Never yields a partially populated value.
    ///
    /// # Errors
    /// Returns `DecodeError::Truncated` if the input ends early and
    /// `DecodeError::Malformed` if the bytes do not fit the format.
    fn read_from(input: &mut StreamInput) -> Result<Self, DecodeError>;

    /// Encode into a fresh buffer.
    fn to_bytes(&self) -> Bytes {
        let mut out = StreamOutput::new();
        self.write_to(&mut out);
        out.freeze()
    }

    /// Decode a buffer holding exactly one value, using default limits.
    ///
    /// # Errors
    /// Fails as [`read_from`](Self::read_from) does, and with `Malformed` if
    /// bytes are left over.
    fn from_bytes(bytes: impl Into<Bytes>) -> Result<Self, DecodeError> {
        Self::from_bytes_with_limits(bytes, WireLimits::default())
    }

    /// Decode a buffer holding exactly one value.
    ///
    /// # Errors
    /// See [`from_bytes`](Self::from_bytes).
    fn from_bytes_with_limits(
        bytes: impl Into<Bytes>,
        limits: WireLimits,
    ) -> Result<Self, DecodeError> {
        let mut input = StreamInput::with_limits(bytes, limits);
        let value = Self::read_from(&mut input)?;
        if !input.is_empty() {
            return Err(DecodeError::Malformed(format!(
                "{} trailing bytes after value",
                input.remaining()
            )));
        }
        Ok(value)
    }
}
