mod codec;
mod config;
mod error;
mod render;
mod report;
mod stream;

pub use codec::WireCodec;
pub use config::{MAX_CAUSE_DEPTH, WireLimits};
pub use error::DecodeError;
pub use render::{Render, RenderOptions};
pub use report::{ErrorReport, SOURCE_ERROR_TYPE};
pub use stream::{StreamInput, StreamOutput};
