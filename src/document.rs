//! The unit of data flowing through the pipeline.
//!
//! A [`Document`] is an unordered field map of arbitrary shape. Documents are
//! treated as immutable across stage boundaries: the transform stage produces
//! new documents rather than mutating its input.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

/// One structured record flowing through the pipeline.
///
/// Wraps a JSON value; payloads are usually objects, but the pipeline does
/// not require it (replayed bulk-action lines are documents too).
///
/// # Examples
///
/// ```
/// use docflux::document::Document;
/// use serde_json::json;
///
/// let doc = Document::new(json!({"user": "kimchy", "active": true}));
/// let names: Vec<&str> = doc.field_names().collect();
/// assert_eq!(names, vec!["active", "user"]);
/// ```
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Document(Value);

impl Document {
    pub fn new(value: Value) -> Self {
        Self(value)
    }

    pub fn as_value(&self) -> &Value {
        &self.0
    }

    pub fn into_value(self) -> Value {
        self.0
    }

    /// The top-level field map, if the payload is an object.
    pub fn fields(&self) -> Option<&Map<String, Value>> {
        self.0.as_object()
    }

    /// Iterate over top-level field names. Empty for non-object payloads.
    pub fn field_names(&self) -> impl Iterator<Item = &str> {
        self.fields().into_iter().flat_map(|m| m.keys().map(String::as_str))
    }

    /// Serialized size of this document, used for flow-control accounting.
    ///
    /// The estimate is the compact JSON encoding length; the bulk wire
    /// representation adds only newline framing on top of that.
    pub fn estimated_bytes(&self) -> usize {
        serde_json::to_vec(&self.0).map(|b| b.len()).unwrap_or(0)
    }
}

impl From<Value> for Document {
    fn from(value: Value) -> Self {
        Self(value)
    }
}

impl fmt::Display for Document {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
