use std::collections::BTreeMap;

use ingest_wire::{DecodeError, Render, RenderOptions, StreamInput, StreamOutput, WireCodec};
use serde::Deserialize;
use serde_json::{Map, Value};

/// Metadata carried alongside a document's source.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, serde::Serialize, serde::Deserialize,
)]
pub enum MetadataField {
    #[serde(rename = "_index")]
    Index,
    #[serde(rename = "_type")]
    Type,
    #[serde(rename = "_id")]
    Id,
    #[serde(rename = "_routing")]
    Routing,
    #[serde(rename = "_parent")]
    Parent,
    #[serde(rename = "_timestamp")]
    Timestamp,
    #[serde(rename = "_ttl")]
    Ttl,
}

impl MetadataField {
    pub const ALL: [Self; 7] = [
        Self::Index,
        Self::Type,
        Self::Id,
        Self::Routing,
        Self::Parent,
        Self::Timestamp,
        Self::Ttl,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Index => "_index",
            Self::Type => "_type",
            Self::Id => "_id",
            Self::Routing => "_routing",
            Self::Parent => "_parent",
            Self::Timestamp => "_timestamp",
            Self::Ttl => "_ttl",
        }
    }

    pub fn parse(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|f| f.as_str() == name)
    }
}

impl std::fmt::Display for MetadataField {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Document state as seen by a pipeline step: metadata plus a JSON source.
///
/// Sources nested deeper than `WireLimits::max_document_depth` encode but are
/// rejected on decode.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct IngestDocument {
    metadata: BTreeMap<MetadataField, String>,
    source: Map<String, Value>,
}

impl IngestDocument {
    pub fn new(source: Map<String, Value>) -> Self {
        Self {
            metadata: BTreeMap::new(),
            source,
        }
    }

    /// Build from a JSON value; `None` unless it is an object.
    pub fn from_value(value: Value) -> Option<Self> {
        match value {
            Value::Object(source) => Some(Self::new(source)),
            _ => None,
        }
    }

    #[must_use]
    pub fn with_metadata(mut self, field: MetadataField, value: impl Into<String>) -> Self {
        self.metadata.insert(field, value.into());
        self
    }

    pub fn metadata(&self, field: MetadataField) -> Option<&str> {
        self.metadata.get(&field).map(String::as_str)
    }

    pub fn set_metadata(&mut self, field: MetadataField, value: impl Into<String>) {
        self.metadata.insert(field, value.into());
    }

    pub fn source(&self) -> &Map<String, Value> {
        &self.source
    }

    pub fn field(&self, name: &str) -> Option<&Value> {
        self.source.get(name)
    }

    /// Insert or replace a top-level source field, returning the old value.
    pub fn set_field(&mut self, name: impl Into<String>, value: impl Into<Value>) -> Option<Value> {
        self.source.insert(name.into(), value.into())
    }

    pub fn remove_field(&mut self, name: &str) -> Option<Value> {
        self.source.shift_remove(name)
    }
}

impl WireCodec for IngestDocument {
    fn write_to(&self, out: &mut StreamOutput) {
        out.write_len(self.metadata.len());
        for (field, value) in &self.metadata {
            out.write_string(field.as_str());
            out.write_string(value);
        }
        // A map with string keys always serializes.
        let source = serde_json::to_vec(&self.source).unwrap_or_default();
        out.write_byte_block(&source);
    }

    fn read_from(input: &mut StreamInput) -> Result<Self, DecodeError> {
        let count = input.read_count(MetadataField::ALL.len(), "metadata field count")?;
        let mut metadata = BTreeMap::new();
        for _ in 0..count {
            let name = input.read_string()?;
            let field = MetadataField::parse(&name)
                .ok_or_else(|| DecodeError::Malformed(format!("unknown metadata field {name}")))?;
            let value = input.read_string()?;
            if metadata.insert(field, value).is_some() {
                return Err(DecodeError::Malformed(format!(
                    "duplicate metadata field {field}"
                )));
            }
        }

        let block = input.read_byte_block()?;
        let max_depth = input.limits().max_document_depth;
        let depth = json_depth(&block);
        if depth > max_depth {
            return Err(DecodeError::Malformed(format!(
                "document nesting {depth} exceeds limit {max_depth}"
            )));
        }

        // Depth is bounded above, so serde_json's own recursion cap can go.
        let mut de = serde_json::Deserializer::from_slice(&block);
        de.disable_recursion_limit();
        let source = Map::<String, Value>::deserialize(&mut de)
            .and_then(|source| de.end().map(|()| source))
            .map_err(|e| DecodeError::Malformed(format!("invalid document source: {e}")))?;

        Ok(Self { metadata, source })
    }
}

/// Deepest array/object nesting in JSON text, scanned without recursion.
fn json_depth(json: &[u8]) -> usize {
    let (mut depth, mut max) = (0usize, 0usize);
    let (mut in_string, mut escaped) = (false, false);
    for &b in json {
        if in_string {
            match (escaped, b) {
                (true, _) => escaped = false,
                (false, b'\\') => escaped = true,
                (false, b'"') => in_string = false,
                _ => {}
            }
            continue;
        }
        match b {
            b'"' => in_string = true,
            b'[' | b'{' => {
                depth += 1;
                max = max.max(depth);
            }
            b']' | b'}' => depth = depth.saturating_sub(1),
            _ => {}
        }
    }
    max
}

// Metadata first, then source. A set metadata field wins over a source field
// of the same name.
impl Render for IngestDocument {
    fn render(&self, sink: &mut Map<String, Value>, _options: &RenderOptions) {
        for (field, value) in &self.metadata {
            sink.insert(field.as_str().to_string(), Value::String(value.clone()));
        }
        for (name, value) in &self.source {
            let shadowed =
                MetadataField::parse(name).is_some_and(|f| self.metadata.contains_key(&f));
            if !shadowed {
                sink.insert(name.clone(), value.clone());
            }
        }
    }
}

/// Container for a possibly absent document.
///
/// Absence is a payload state, not an outcome: an empty payload still belongs
/// to a successful step.
#[derive(Debug, Clone, PartialEq)]
pub struct DocumentPayload<D = IngestDocument>(Option<D>);

impl<D> DocumentPayload<D> {
    pub fn wrap(document: Option<D>) -> Self {
        Self(document)
    }

    pub fn empty() -> Self {
        Self(None)
    }

    pub fn document(&self) -> Option<&D> {
        self.0.as_ref()
    }

    pub fn into_document(self) -> Option<D> {
        self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_none()
    }
}

impl<D> Default for DocumentPayload<D> {
    fn default() -> Self {
        Self::empty()
    }
}

impl<D> From<Option<D>> for DocumentPayload<D> {
    fn from(document: Option<D>) -> Self {
        Self::wrap(document)
    }
}

// Presence flag, then the document.
impl<D: WireCodec> WireCodec for DocumentPayload<D> {
    fn write_to(&self, out: &mut StreamOutput) {
        out.write_optional(self.0.as_ref(), |out, doc| doc.write_to(out));
    }

    fn read_from(input: &mut StreamInput) -> Result<Self, DecodeError> {
        input.read_optional(D::read_from).map(Self)
    }
}

impl<D: Render> Render for DocumentPayload<D> {
    fn render(&self, sink: &mut Map<String, Value>, options: &RenderOptions) {
        if let Some(doc) = &self.0 {
            doc.render(sink, options);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use serde_json::json;

    fn doc() -> IngestDocument {
        IngestDocument::from_value(json!({"a": 1, "tags": ["x", "y"]}))
            .unwrap()
            .with_metadata(MetadataField::Index, "logs")
            .with_metadata(MetadataField::Id, "1")
    }

    #[test]
    fn field_access() {
        let mut d = doc();
        assert_eq!(d.field("a"), Some(&json!(1)));
        assert_eq!(d.set_field("a", 2), Some(json!(1)));
        assert_eq!(d.remove_field("tags"), Some(json!(["x", "y"])));
        assert_eq!(d.source().len(), 1);
        assert_eq!(d.metadata(MetadataField::Index), Some("logs"));
        assert_eq!(d.metadata(MetadataField::Type), None);
    }

    #[test]
    fn from_value_requires_object() {
        assert!(IngestDocument::from_value(json!([1, 2])).is_none());
        assert!(IngestDocument::from_value(json!({})).is_some());
    }

    #[test]
    fn metadata_names_parse_back() {
        for field in MetadataField::ALL {
            assert_eq!(MetadataField::parse(field.as_str()), Some(field));
            let json = serde_json::to_string(&field).unwrap();
            assert_eq!(json, format!("\"{field}\""));
        }
        assert_eq!(MetadataField::parse("_source"), None);
    }

    #[test]
    fn wire_round_trip() {
        let d = doc();
        assert_eq!(IngestDocument::from_bytes(d.to_bytes()).unwrap(), d);
    }

    #[test]
    fn awkward_floats_round_trip_exactly() {
        let floats = [
            1.0715660391465826e-75,
            0.1 + 0.2,
            f64::MIN_POSITIVE,
            f64::MAX,
            -2.2250738585072014e-308,
            5e-324,
            123_456_789.123_456_78,
        ];
        for f in floats {
            let d = IngestDocument::from_value(json!({"f": f})).unwrap();
            let back = IngestDocument::from_bytes(d.to_bytes()).unwrap();
            assert_eq!(back.field("f").and_then(Value::as_f64), Some(f), "{f:e}");
        }
    }

    fn nested_arrays(depth: usize) -> Value {
        (0..depth).fold(json!(1), |inner, _| Value::Array(vec![inner]))
    }

    #[test]
    fn deep_nesting_round_trips() {
        let d = IngestDocument::from_value(json!({"deep": nested_arrays(200)})).unwrap();
        assert_eq!(IngestDocument::from_bytes(d.to_bytes()).unwrap(), d);
    }

    #[test]
    fn nesting_over_limit_is_malformed() {
        let d = IngestDocument::from_value(json!({"deep": nested_arrays(20)})).unwrap();
        let limits = ingest_wire::WireLimits {
            max_document_depth: 20,
            ..ingest_wire::WireLimits::default()
        };
        let err = IngestDocument::from_bytes_with_limits(d.to_bytes(), limits).unwrap_err();
        assert_eq!(
            err,
            DecodeError::Malformed("document nesting 21 exceeds limit 20".to_string())
        );
    }

    #[test]
    fn hostile_nesting_is_rejected_without_parsing() {
        let mut out = StreamOutput::new();
        out.write_len(0);
        out.write_byte_block(&vec![b'['; 100_000]);
        let err = IngestDocument::from_bytes(out.freeze()).unwrap_err();
        assert!(matches!(err, DecodeError::Malformed(_)));
    }

    #[test]
    fn depth_scan_ignores_brackets_in_strings() {
        assert_eq!(json_depth(br#"{"a":"[[[{\"}]","b":[{}]}"#), 3);
        assert_eq!(json_depth(b"{}"), 1);
    }

    #[test]
    fn trailing_json_is_malformed() {
        let mut out = StreamOutput::new();
        out.write_len(0);
        out.write_byte_block(b"{} {}");
        let err = IngestDocument::from_bytes(out.freeze()).unwrap_err();
        assert!(matches!(err, DecodeError::Malformed(_)));
    }

    #[test]
    fn metadata_wins_over_same_named_source_field() {
        let d = IngestDocument::from_value(json!({"_index": "spoofed", "_id": "kept", "a": 1}))
            .unwrap()
            .with_metadata(MetadataField::Index, "logs");
        assert_eq!(
            d.to_json(&RenderOptions::default()),
            json!({"_index": "logs", "_id": "kept", "a": 1})
        );
    }

    #[test]
    fn unknown_metadata_is_malformed() {
        let mut out = StreamOutput::new();
        out.write_len(1);
        out.write_string("_version");
        out.write_string("3");
        out.write_byte_block(b"{}");
        let err = IngestDocument::from_bytes(out.freeze()).unwrap_err();
        assert_eq!(
            err,
            DecodeError::Malformed("unknown metadata field _version".to_string())
        );
    }

    #[test]
    fn duplicate_metadata_is_malformed() {
        let mut out = StreamOutput::new();
        out.write_len(2);
        for _ in 0..2 {
            out.write_string("_id");
            out.write_string("1");
        }
        out.write_byte_block(b"{}");
        let err = IngestDocument::from_bytes(out.freeze()).unwrap_err();
        assert!(matches!(err, DecodeError::Malformed(_)));
    }

    #[test]
    fn non_object_source_is_malformed() {
        let mut out = StreamOutput::new();
        out.write_len(0);
        out.write_byte_block(b"[1,2]");
        let err = IngestDocument::from_bytes(out.freeze()).unwrap_err();
        assert!(matches!(err, DecodeError::Malformed(_)));
    }

    #[test]
    fn render_splices_metadata_and_source() {
        let rendered = doc().to_json(&RenderOptions::default());
        assert_eq!(
            rendered,
            json!({"_index": "logs", "_id": "1", "a": 1, "tags": ["x", "y"]})
        );
    }

    #[test]
    fn empty_payload_encodes_as_absent_flag() {
        let payload: DocumentPayload = DocumentPayload::empty();
        assert_eq!(&payload.to_bytes()[..], &[0]);
        let back = DocumentPayload::<IngestDocument>::from_bytes(Bytes::from_static(&[0])).unwrap();
        assert!(back.is_empty());
        assert_eq!(payload.to_json(&RenderOptions::default()), json!({}));
    }

    #[test]
    fn payload_round_trip() {
        let payload = DocumentPayload::wrap(Some(doc()));
        let back = DocumentPayload::<IngestDocument>::from_bytes(payload.to_bytes()).unwrap();
        assert_eq!(back.document(), Some(&doc()));
        assert_eq!(back.into_document(), Some(doc()));
    }
}
