use serde_json::{Map, Value};

/// Knobs for structured rendering, typically taken from request parameters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct RenderOptions {
    /// Include captured stack traces in rendered errors.
    pub error_trace: bool,
}

/// Structured rendering into an object the caller owns.
///
/// Implementors splice their members into `sink` rather than nesting under a
/// key of their own, so several values can share one output object.
pub trait Render {
    fn render(&self, sink: &mut Map<String, Value>, options: &RenderOptions);

    /// Render into a fresh JSON object.
    fn to_json(&self, options: &RenderOptions) -> Value {
        let mut sink = Map::new();
        self.render(&mut sink, options);
        Value::Object(sink)
    }
}
