use std::fmt;

use serde_json::{Map, Value};

use crate::codec::WireCodec;
use crate::config::MAX_CAUSE_DEPTH;
use crate::error::DecodeError;
use crate::render::{Render, RenderOptions};
use crate::stream::{StreamInput, StreamOutput};

/// Type assigned to frames captured from `std::error::Error::source`.
pub const SOURCE_ERROR_TYPE: &str = "source_error";

/// Transportable description of an error raised by a processing step.
///
/// Carries a type name, a human readable reason, an optional stack trace and
/// the chain of causes. Equality is structural across the whole chain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorReport {
    error_type: String,
    reason: String,
    stack_trace: Option<String>,
    caused_by: Option<Box<ErrorReport>>,
}

impl ErrorReport {
    pub fn new(error_type: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            error_type: error_type.into(),
            reason: reason.into(),
            stack_trace: None,
            caused_by: None,
        }
    }

    /// Capture `err` and its `source()` chain.
    ///
    /// Sources carry no type name of their own and are tagged
    /// [`SOURCE_ERROR_TYPE`]. The chain is cut at [`MAX_CAUSE_DEPTH`] frames.
    pub fn from_error(error_type: impl Into<String>, err: &dyn std::error::Error) -> Self {
        let sources: Vec<String> = std::iter::successors(err.source(), |e| e.source())
            .take(MAX_CAUSE_DEPTH - 1)
            .map(ToString::to_string)
            .collect();
        let caused_by = sources.into_iter().rev().fold(None, |inner, reason| {
            Some(Box::new(Self {
                error_type: SOURCE_ERROR_TYPE.to_string(),
                reason,
                stack_trace: None,
                caused_by: inner,
            }))
        });
        Self {
            error_type: error_type.into(),
            reason: err.to_string(),
            stack_trace: None,
            caused_by,
        }
    }

    #[must_use]
    pub fn with_stack_trace(mut self, stack_trace: impl Into<String>) -> Self {
        self.stack_trace = Some(stack_trace.into());
        self
    }

    /// Set the direct cause, replacing any existing one.
    ///
    /// The resulting chain holds at most [`MAX_CAUSE_DEPTH`] frames; the
    /// innermost causes past that are dropped.
    #[must_use]
    pub fn with_cause(mut self, cause: ErrorReport) -> Self {
        let mut frames = cause.into_frames();
        frames.truncate(MAX_CAUSE_DEPTH - 1);
        self.caused_by = link(frames).map(Box::new);
        self
    }

    /// Detach every frame of the chain, outermost first.
    fn into_frames(self) -> Vec<ErrorReport> {
        let mut frames = Vec::new();
        let mut next = Some(self);
        while let Some(mut frame) = next {
            next = frame.caused_by.take().map(|cause| *cause);
            frames.push(frame);
        }
        frames
    }

    pub fn error_type(&self) -> &str {
        &self.error_type
    }

    pub fn reason(&self) -> &str {
        &self.reason
    }

    pub fn stack_trace(&self) -> Option<&str> {
        self.stack_trace.as_deref()
    }

    pub fn caused_by(&self) -> Option<&ErrorReport> {
        self.caused_by.as_deref()
    }

    /// This report followed by each cause, outermost first.
    pub fn chain(&self) -> impl Iterator<Item = &ErrorReport> {
        std::iter::successors(Some(self), |r| r.caused_by())
    }

    pub fn root_cause(&self) -> &ErrorReport {
        self.chain().last().unwrap_or(self)
    }
}

impl fmt::Display for ErrorReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.error_type, self.reason)
    }
}

impl std::error::Error for ErrorReport {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.caused_by
            .as_deref()
            .map(|c| c as &(dyn std::error::Error + 'static))
    }
}

// Wire: frame count, then (type, reason, stack?) per frame, outermost first.
// Read iteratively so hostile input cannot drive recursion.
impl WireCodec for ErrorReport {
    fn write_to(&self, out: &mut StreamOutput) {
        out.write_len(self.chain().count());
        for frame in self.chain() {
            out.write_string(&frame.error_type);
            out.write_string(&frame.reason);
            out.write_optional_string(frame.stack_trace.as_deref());
        }
    }

    fn read_from(input: &mut StreamInput) -> Result<Self, DecodeError> {
        let max = input.limits().max_cause_depth;
        let depth = input.read_count(max, "error cause depth")?;
        if depth == 0 {
            return Err(DecodeError::Malformed("error report has no frames".into()));
        }

        let mut frames = Vec::with_capacity(depth);
        for _ in 0..depth {
            let error_type = input.read_string()?;
            let reason = input.read_string()?;
            let stack_trace = input.read_optional_string()?;
            frames.push(Self {
                error_type,
                reason,
                stack_trace,
                caused_by: None,
            });
        }

        link(frames).ok_or_else(|| DecodeError::Malformed("error report has no frames".into()))
    }
}

/// Chain detached frames back together, outermost first.
fn link(frames: Vec<ErrorReport>) -> Option<ErrorReport> {
    frames.into_iter().rev().reduce(|inner, mut outer| {
        outer.caused_by = Some(Box::new(inner));
        outer
    })
}

impl Render for ErrorReport {
    fn render(&self, sink: &mut Map<String, Value>, options: &RenderOptions) {
        sink.insert("type".into(), Value::String(self.error_type.clone()));
        sink.insert("reason".into(), Value::String(self.reason.clone()));
        if let Some(cause) = self.caused_by() {
            sink.insert("caused_by".into(), cause.to_json(options));
        }
        if options.error_trace
            && let Some(trace) = &self.stack_trace
        {
            sink.insert("stack_trace".into(), Value::String(trace.clone()));
        }
    }
}
