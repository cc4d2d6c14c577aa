use ingest_wire::{
    DecodeError, ErrorReport, Render, RenderOptions, StreamInput, StreamOutput, WireCodec,
};
use serde_json::{Map, Value};

use crate::document::{DocumentPayload, IngestDocument};
use crate::ids::StepId;

/// Output member naming the step. Wins over any spliced member of the same name.
pub const STEP_ID_FIELD: &str = "step_id";

/// What happened when a step ran: a transformed document or the raised error.
#[derive(Debug, Clone, PartialEq)]
pub enum StepOutcome<D = IngestDocument, E = ErrorReport> {
    Success(DocumentPayload<D>),
    Failure(E),
}

/// Outcome of one step during a pipeline simulation, keyed by step id.
///
/// Immutable once built. A failure here is data about the step, not an error
/// of this type: it encodes, decodes and renders like any success.
#[derive(Debug, Clone, PartialEq)]
pub struct StepResult<D = IngestDocument, E = ErrorReport> {
    step_id: StepId,
    outcome: StepOutcome<D, E>,
}

impl<D, E> StepResult<D, E> {
    pub fn new(step_id: impl Into<StepId>, outcome: StepOutcome<D, E>) -> Self {
        Self {
            step_id: step_id.into(),
            outcome,
        }
    }

    pub fn success(step_id: impl Into<StepId>, document: D) -> Self {
        Self::new(step_id, StepOutcome::Success(DocumentPayload::wrap(Some(document))))
    }

    /// Successful step whose document payload is absent.
    pub fn success_empty(step_id: impl Into<StepId>) -> Self {
        Self::new(step_id, StepOutcome::Success(DocumentPayload::empty()))
    }

    pub fn failure(step_id: impl Into<StepId>, error: E) -> Self {
        Self::new(step_id, StepOutcome::Failure(error))
    }

    pub fn step_id(&self) -> &StepId {
        &self.step_id
    }

    pub fn outcome(&self) -> &StepOutcome<D, E> {
        &self.outcome
    }

    /// The document, if the step succeeded and produced one.
    pub fn document(&self) -> Option<&D> {
        match &self.outcome {
            StepOutcome::Success(payload) => payload.document(),
            StepOutcome::Failure(_) => None,
        }
    }

    pub fn error(&self) -> Option<&E> {
        match &self.outcome {
            StepOutcome::Success(_) => None,
            StepOutcome::Failure(error) => Some(error),
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self.outcome, StepOutcome::Success(_))
    }

    pub fn is_failure(&self) -> bool {
        matches!(self.outcome, StepOutcome::Failure(_))
    }

    pub fn into_parts(self) -> (StepId, StepOutcome<D, E>) {
        (self.step_id, self.outcome)
    }
}

// Wire: step id, failure flag, then exactly one of error or document payload.
impl<D: WireCodec, E: WireCodec> WireCodec for StepResult<D, E> {
    fn write_to(&self, out: &mut StreamOutput) {
        out.write_string(self.step_id.as_str());
        match &self.outcome {
            StepOutcome::Failure(error) => {
                out.write_bool(true);
                error.write_to(out);
            }
            StepOutcome::Success(payload) => {
                out.write_bool(false);
                payload.write_to(out);
            }
        }
        tracing::trace!(
            step_id = %self.step_id,
            failed = self.is_failure(),
            "encoded step result"
        );
    }

    fn read_from(input: &mut StreamInput) -> Result<Self, DecodeError> {
        let step_id = StepId::from(input.read_string()?);
        let outcome = if input.read_bool()? {
            StepOutcome::Failure(E::read_from(input)?)
        } else {
            StepOutcome::Success(DocumentPayload::read_from(input)?)
        };
        tracing::trace!(
            step_id = %step_id,
            failed = matches!(outcome, StepOutcome::Failure(_)),
            "decoded step result"
        );
        Ok(Self { step_id, outcome })
    }
}

impl<D: Render, E: Render> Render for StepResult<D, E> {
    fn render(&self, sink: &mut Map<String, Value>, options: &RenderOptions) {
        let mut body = Map::new();
        match &self.outcome {
            StepOutcome::Success(payload) => payload.render(&mut body, options),
            StepOutcome::Failure(error) => error.render(&mut body, options),
        }

        sink.insert(
            STEP_ID_FIELD.to_string(),
            Value::String(self.step_id.as_str().to_string()),
        );
        for (name, value) in body {
            if name != STEP_ID_FIELD {
                sink.insert(name, value);
            }
        }
    }
}

/// Serializes as the rendered object with default options.
impl<D: Render, E: Render> serde::Serialize for StepResult<D, E> {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serde::Serialize::serialize(&self.to_json(&RenderOptions::default()), serializer)
    }
}
