/// Frames an error cause chain may hold. Reports are capped to this when built
/// so that anything encoded decodes under the default limits.
pub const MAX_CAUSE_DEPTH: usize = 32;

/// Bounds applied while decoding untrusted wire bytes.
///
/// Writers do not check these: a string longer than `max_field_len` encodes
/// fine and is only rejected by a reader configured with the smaller bound.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct WireLimits {
    /// Maximum byte length of a single string or byte block.
    pub max_field_len: usize,
    /// Maximum number of frames in an error cause chain.
    pub max_cause_depth: usize,
    /// Maximum number of step results in one simulation trace.
    pub max_trace_len: usize,
    /// Maximum nesting of arrays and objects in a document source, counting
    /// the source object itself.
    pub max_document_depth: usize,
}

impl Default for WireLimits {
    fn default() -> Self {
        Self {
            max_field_len: 16 * 1_048_576, // 16MB
            max_cause_depth: MAX_CAUSE_DEPTH,
            max_trace_len: 4096,
            max_document_depth: 512,
        }
    }
}
