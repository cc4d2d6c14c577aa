use thiserror::Error;

/// Raised when wire bytes are inconsistent with the expected format.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
    #[error("unexpected end of input: needed {needed} bytes, {remaining} remaining")]
    Truncated { needed: usize, remaining: usize },

    #[error("malformed input: {0}")]
    Malformed(String),
}

impl DecodeError {
    pub(crate) fn malformed(msg: impl Into<String>) -> Self {
        Self::Malformed(msg.into())
    }

    pub fn is_truncated(&self) -> bool {
        matches!(self, Self::Truncated { .. })
    }
}
