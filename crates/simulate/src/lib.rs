pub mod document;
pub mod error;
pub mod ids;
pub mod outcome;
pub mod trace;

pub use document::{DocumentPayload, IngestDocument, MetadataField};
pub use error::TraceDecodeError;
pub use ids::StepId;
pub use outcome::{STEP_ID_FIELD, StepOutcome, StepResult};
pub use trace::{STEP_RESULTS_FIELD, SimulationTrace};

pub use ingest_wire::{
    DecodeError, ErrorReport, MAX_CAUSE_DEPTH, Render, RenderOptions, StreamInput, StreamOutput,
    WireCodec, WireLimits,
};
