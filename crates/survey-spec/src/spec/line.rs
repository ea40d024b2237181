use std::borrow::Cow;

use schemars::{JsonSchema, Schema, SchemaGenerator, json_schema};
use serde::de::Error as _;
use serde::ser::SerializeSeq;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;

/// Kind tag of a structured line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum LineKind {
    Text,
    Likert,
    Img,
}

/// One line of page content.
///
/// Authored either as a bare string (a paragraph) or as an array
/// `[kind, text]` / `[kind, text, field_id]`.
#[derive(Debug, Clone, PartialEq)]
pub enum LineItem {
    Text(String),
    Field {
        kind: LineKind,
        text: String,
        field_id: Option<String>,
    },
}

impl LineItem {
    fn from_value(value: Value) -> Result<Self, String> {
        match value {
            Value::String(text) => Ok(LineItem::Text(text)),
            Value::Array(items) if (2..=3).contains(&items.len()) => {
                let mut items = items.into_iter();
                let kind_value = items.next().unwrap_or_default();
                let kind: LineKind = serde_json::from_value(kind_value.clone())
                    .map_err(|_| format!("unknown line kind: {kind_value}"))?;
                let text = match items.next() {
                    Some(Value::String(text)) => text,
                    other => return Err(format!("line text must be a string, got {other:?}")),
                };
                let field_id = match items.next() {
                    None | Some(Value::Null) => None,
                    Some(Value::String(id)) => Some(id),
                    Some(other) => return Err(format!("line field id must be a string, got {other}")),
                };
                if kind == LineKind::Likert && field_id.is_none() {
                    return Err(format!("likert line '{text}' needs a field id"));
                }
                Ok(LineItem::Field {
                    kind,
                    text,
                    field_id,
                })
            }
            other => Err(format!(
                "line must be a string or a [kind, text, field_id] array, got {other}"
            )),
        }
    }
}

impl<'de> Deserialize<'de> for LineItem {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = Value::deserialize(deserializer)?;
        LineItem::from_value(value).map_err(D::Error::custom)
    }
}

impl Serialize for LineItem {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            LineItem::Text(text) => serializer.serialize_str(text),
            LineItem::Field {
                kind,
                text,
                field_id,
            } => {
                let len = if field_id.is_some() { 3 } else { 2 };
                let mut seq = serializer.serialize_seq(Some(len))?;
                seq.serialize_element(kind)?;
                seq.serialize_element(text)?;
                if let Some(field_id) = field_id {
                    seq.serialize_element(field_id)?;
                }
                seq.end()
            }
        }
    }
}

impl JsonSchema for LineItem {
    fn schema_name() -> Cow<'static, str> {
        "LineItem".into()
    }

    fn json_schema(_generator: &mut SchemaGenerator) -> Schema {
        json_schema!({
            "oneOf": [
                { "type": "string" },
                {
                    "type": "array",
                    "prefixItems": [
                        { "enum": ["text", "likert", "img"] },
                        { "type": "string" },
                        { "type": "string" }
                    ],
                    "minItems": 2,
                    "maxItems": 3
                }
            ]
        })
    }
}
