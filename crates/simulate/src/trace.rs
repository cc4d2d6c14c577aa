use bytes::Bytes;
use ingest_wire::{
    ErrorReport, Render, RenderOptions, StreamInput, StreamOutput, WireCodec, WireLimits,
};
use serde_json::{Map, Value};

use crate::document::IngestDocument;
use crate::error::TraceDecodeError;
use crate::outcome::StepResult;

pub const STEP_RESULTS_FIELD: &str = "step_results";

/// Ordered per-step results of one simulated pipeline run.
#[derive(Debug, Clone, PartialEq)]
pub struct SimulationTrace<D = IngestDocument, E = ErrorReport> {
    results: Vec<StepResult<D, E>>,
}

impl<D, E> Default for SimulationTrace<D, E> {
    fn default() -> Self {
        Self {
            results: Vec::new(),
        }
    }
}

impl<D, E> SimulationTrace<D, E> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, result: StepResult<D, E>) {
        self.results.push(result);
    }

    pub fn len(&self) -> usize {
        self.results.len()
    }

    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, StepResult<D, E>> {
        self.results.iter()
    }

    pub fn results(&self) -> &[StepResult<D, E>] {
        &self.results
    }

    pub fn into_results(self) -> Vec<StepResult<D, E>> {
        self.results
    }

    pub fn first_failure(&self) -> Option<&StepResult<D, E>> {
        self.results.iter().find(|r| r.is_failure())
    }

    pub fn failures(&self) -> impl Iterator<Item = &StepResult<D, E>> {
        self.results.iter().filter(|r| r.is_failure())
    }

    /// Document left by the last step, if no step failed.
    pub fn final_document(&self) -> Option<&D> {
        if self.first_failure().is_some() {
            return None;
        }
        self.results.last().and_then(StepResult::document)
    }
}

// Wire: result count, then each result in order.
impl<D: WireCodec, E: WireCodec> SimulationTrace<D, E> {
    pub fn write_to(&self, out: &mut StreamOutput) {
        out.write_len(self.results.len());
        for result in &self.results {
            result.write_to(out);
        }
    }

    /// Decode a whole trace, stopping at the first record that fails.
    ///
    /// # Errors
    /// Returns `TraceDecodeError::Header` for a bad count and
    /// `TraceDecodeError::Step` naming the index of the first bad record.
    pub fn read_from(input: &mut StreamInput) -> Result<Self, TraceDecodeError> {
        let max = input.limits().max_trace_len;
        let count = input
            .read_count(max, "trace length")
            .map_err(TraceDecodeError::Header)?;

        let mut results = Vec::with_capacity(count);
        for index in 0..count {
            match StepResult::<D, E>::read_from(input) {
                Ok(result) => results.push(result),
                Err(source) => {
                    tracing::warn!(
                        index,
                        decoded = results.len(),
                        error = %source,
                        "failed to decode step result"
                    );
                    return Err(TraceDecodeError::Step { index, source });
                }
            }
        }
        Ok(Self { results })
    }

    pub fn to_bytes(&self) -> Bytes {
        let mut out = StreamOutput::new();
        self.write_to(&mut out);
        out.freeze()
    }

    /// Decode a buffer holding exactly one trace.
    ///
    /// # Errors
    /// See [`read_from`](Self::read_from); leftover bytes are
    /// `TraceDecodeError::TrailingBytes`.
    pub fn from_bytes(
        bytes: impl Into<Bytes>,
        limits: WireLimits,
    ) -> Result<Self, TraceDecodeError> {
        let mut input = StreamInput::with_limits(bytes, limits);
        let trace = Self::read_from(&mut input)?;
        if !input.is_empty() {
            return Err(TraceDecodeError::TrailingBytes(input.remaining()));
        }
        Ok(trace)
    }
}

impl<D, E> From<Vec<StepResult<D, E>>> for SimulationTrace<D, E> {
    fn from(results: Vec<StepResult<D, E>>) -> Self {
        Self { results }
    }
}

impl<D, E> FromIterator<StepResult<D, E>> for SimulationTrace<D, E> {
    fn from_iter<I: IntoIterator<Item = StepResult<D, E>>>(iter: I) -> Self {
        Self {
            results: iter.into_iter().collect(),
        }
    }
}

impl<D, E> IntoIterator for SimulationTrace<D, E> {
    type Item = StepResult<D, E>;
    type IntoIter = std::vec::IntoIter<StepResult<D, E>>;

    fn into_iter(self) -> Self::IntoIter {
        self.results.into_iter()
    }
}

impl<'a, D, E> IntoIterator for &'a SimulationTrace<D, E> {
    type Item = &'a StepResult<D, E>;
    type IntoIter = std::slice::Iter<'a, StepResult<D, E>>;

    fn into_iter(self) -> Self::IntoIter {
        self.results.iter()
    }
}

impl<D: Render, E: Render> Render for SimulationTrace<D, E> {
    fn render(&self, sink: &mut Map<String, Value>, options: &RenderOptions) {
        let rendered: Vec<Value> = self.results.iter().map(|r| r.to_json(options)).collect();
        sink.insert(STEP_RESULTS_FIELD.to_string(), Value::Array(rendered));
    }
}

impl<D: Render, E: Render> serde::Serialize for SimulationTrace<D, E> {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serde::Serialize::serialize(&self.to_json(&RenderOptions::default()), serializer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ingest_wire::DecodeError;
    use serde_json::json;

    fn doc(value: Value) -> IngestDocument {
        IngestDocument::from_value(value).unwrap()
    }

    fn sample() -> SimulationTrace {
        let mut trace = SimulationTrace::new();
        trace.push(StepResult::success("set_field", doc(json!({"a": 1}))));
        trace.push(StepResult::failure(
            "convert",
            ErrorReport::new("illegal_argument_exception", "field [b] not present"),
        ));
        trace.push(StepResult::success_empty("drop"));
        trace
    }

    #[test]
    fn round_trip() {
        let trace = sample();
        let back = <SimulationTrace>::from_bytes(trace.to_bytes(), WireLimits::default()).unwrap();
        assert_eq!(back, trace);
        assert_eq!(back.len(), 3);
    }

    #[test]
    fn empty_trace_round_trip() {
        let trace = <SimulationTrace>::new();
        assert_eq!(&trace.to_bytes()[..], &[0]);
        let back = <SimulationTrace>::from_bytes(trace.to_bytes(), WireLimits::default()).unwrap();
        assert!(back.is_empty());
    }

    #[test]
    fn reports_index_of_first_bad_record() {
        let bytes = sample().to_bytes();
        // drop the trailing payload flag of the third record
        let cut = bytes.slice(..bytes.len() - 1);
        let err = <SimulationTrace>::from_bytes(cut, WireLimits::default()).unwrap_err();
        assert_eq!(err.index(), Some(2));
        assert!(matches!(
            err,
            TraceDecodeError::Step {
                index: 2,
                source: DecodeError::Truncated { .. }
            }
        ));
    }

    #[test]
    fn count_over_limit_is_header_error() {
        let limits = WireLimits {
            max_trace_len: 2,
            ..WireLimits::default()
        };
        let err = <SimulationTrace>::from_bytes(sample().to_bytes(), limits).unwrap_err();
        assert!(matches!(err, TraceDecodeError::Header(DecodeError::Malformed(_))));
        assert_eq!(err.index(), None);
    }

    #[test]
    fn trailing_bytes_rejected() {
        let mut bytes = sample().to_bytes().to_vec();
        bytes.extend_from_slice(&[0, 0]);
        let err = <SimulationTrace>::from_bytes(bytes, WireLimits::default()).unwrap_err();
        assert_eq!(err, TraceDecodeError::TrailingBytes(2));
    }

    #[test]
    fn failure_queries() {
        let trace = sample();
        assert_eq!(trace.first_failure().unwrap().step_id().as_str(), "convert");
        assert_eq!(trace.failures().count(), 1);
        assert!(trace.final_document().is_none());

        let clean: SimulationTrace = vec![
            StepResult::success("one", doc(json!({"a": 1}))),
            StepResult::success("two", doc(json!({"a": 2}))),
        ]
        .into();
        assert_eq!(clean.final_document().unwrap().field("a"), Some(&json!(2)));
    }

    #[test]
    fn render_lists_results_in_order() {
        let rendered = sample().to_json(&RenderOptions::default());
        assert_eq!(
            rendered,
            json!({
                "step_results": [
                    {"step_id": "set_field", "a": 1},
                    {
                        "step_id": "convert",
                        "type": "illegal_argument_exception",
                        "reason": "field [b] not present"
                    },
                    {"step_id": "drop"}
                ]
            })
        );
    }

    #[test]
    fn collects_from_iterator() {
        let trace: SimulationTrace = sample().into_iter().filter(|r| r.is_success()).collect();
        assert_eq!(trace.len(), 2);
        let ids: Vec<&str> = (&trace).into_iter().map(|r| r.step_id().as_str()).collect();
        assert_eq!(ids, ["set_field", "drop"]);
    }
}
