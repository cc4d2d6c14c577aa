use ingest_wire::DecodeError;

/// Errors for decoding a batch of step results.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TraceDecodeError {
    #[error("invalid trace header: {0}")]
    Header(#[source] DecodeError),

    #[error("step result {index} failed to decode: {source}")]
    Step {
        index: usize,
        #[source]
        source: DecodeError,
    },

    #[error("{0} trailing bytes after trace")]
    TrailingBytes(usize),
}

impl TraceDecodeError {
    /// Position of the record that failed, if a record failed.
    pub fn index(&self) -> Option<usize> {
        match self {
            Self::Step { index, .. } => Some(*index),
            Self::Header(_) | Self::TrailingBytes(_) => None,
        }
    }
}
