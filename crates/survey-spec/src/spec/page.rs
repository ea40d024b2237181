use schemars::JsonSchema;
use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

use crate::spec::line::LineItem;

/// How a page lets the respondent move on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum ContinueKind {
    End,
    #[default]
    Next,
    Choice,
}

/// Single-column page.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct PlainPage {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pid: Option<String>,
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub vars: Map<String, Value>,
    #[serde(default)]
    pub lines: Vec<LineItem>,
    #[serde(rename = "continue", default)]
    pub continuation: ContinueKind,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub values: Vec<String>,
}

/// Page with a left and right column above a full-width bottom region.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct TwoColumnPage {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pid: Option<String>,
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub vars: Map<String, Value>,
    #[serde(default)]
    pub left: Vec<LineItem>,
    #[serde(default)]
    pub right: Vec<LineItem>,
    #[serde(default)]
    pub bottom: Vec<LineItem>,
    #[serde(rename = "continue", default)]
    pub continuation: ContinueKind,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub values: Vec<String>,
}

/// Repeats its child pages once per integer in `[from, to)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct EachBlock {
    /// Loop variable name (template).
    pub name: String,
    /// Inclusive lower bound: an integer or a template rendering to one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub from: Option<Value>,
    /// Exclusive upper bound: an integer or a template rendering to one.
    pub to: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name_next: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name_prev: Option<String>,
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub vars: Map<String, Value>,
    pub pages: Vec<PageNodeRaw>,
}

/// A node of the authored page tree. Nodes without a `type` are plain pages.
#[derive(Debug, Clone, PartialEq, Serialize, JsonSchema)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum PageNodeRaw {
    Plain(PlainPage),
    #[serde(rename = "twocolumn")]
    TwoColumn(TwoColumnPage),
    Each(EachBlock),
}

impl<'de> Deserialize<'de> for PageNodeRaw {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = Value::deserialize(deserializer)?;
        let kind = match value.get("type") {
            None => "plain".to_string(),
            Some(Value::String(kind)) => kind.clone(),
            Some(other) => return Err(D::Error::custom(format!("page type must be a string, got {other}"))),
        };
        match kind.as_str() {
            "plain" => serde_json::from_value(value)
                .map(PageNodeRaw::Plain)
                .map_err(D::Error::custom),
            "twocolumn" => serde_json::from_value(value)
                .map(PageNodeRaw::TwoColumn)
                .map_err(D::Error::custom),
            "each" => serde_json::from_value(value)
                .map(PageNodeRaw::Each)
                .map_err(D::Error::custom),
            other => Err(D::Error::custom(format!("unknown page type: '{other}'"))),
        }
    }
}
