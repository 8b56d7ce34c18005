//! Per-field extraction results shared by every document extractor.

use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Confidence {
    High,
    Unsure,
}

/// One extracted field as reported by the model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldExtraction {
    pub visible: bool,
    pub value: String,
    pub confidence: Confidence,
}

impl FieldExtraction {
    pub fn high(value: impl Into<String>) -> Self {
        Self {
            visible: true,
            value: value.into(),
            confidence: Confidence::High,
        }
    }

    pub fn unsure(value: impl Into<String>) -> Self {
        Self {
            visible: true,
            value: value.into(),
            confidence: Confidence::Unsure,
        }
    }
}

/// JSON schema for an object whose properties are all `FieldExtraction`s.
pub(crate) fn fields_schema(names: &[&str]) -> Value {
    let field = json!({
        "type": "object",
        "properties": {
            "visible": { "type": "boolean" },
            "value": { "type": "string" },
            "confidence": { "type": "string", "enum": ["high", "unsure"] }
        },
        "required": ["visible", "value", "confidence"]
    });

    let properties: Map<String, Value> = names
        .iter()
        .map(|name| (name.to_string(), field.clone()))
        .collect();

    json!({
        "type": "object",
        "properties": properties,
        "required": names,
    })
}

/// True when any field in an extracted-data map was marked `unsure`.
///
/// Entries that are not field objects (or carry no confidence) are ignored.
pub fn any_unsure(fields: &Map<String, Value>) -> bool {
    fields
        .values()
        .filter_map(|v| v.get("confidence"))
        .any(|c| c.as_str() == Some("unsure"))
}
