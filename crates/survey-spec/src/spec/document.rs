use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::error::SurveyError;
use crate::spec::page::PageNodeRaw;

/// Top-level survey specification as authored on disk.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct SurveyDocument {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    /// Base URL the survey is served under.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub urlbase: Option<String>,
    pub pages: Vec<PageNodeRaw>,
}

impl SurveyDocument {
    pub fn from_json(text: &str) -> Result<Self, SurveyError> {
        serde_json::from_str(text).map_err(|err| SurveyError::InvalidSpec(err.to_string()))
    }

    pub fn from_value(value: serde_json::Value) -> Result<Self, SurveyError> {
        serde_json::from_value(value).map_err(|err| SurveyError::InvalidSpec(err.to_string()))
    }

    /// JSON Schema describing the authoring format.
    pub fn json_schema() -> serde_json::Value {
        serde_json::to_value(schemars::schema_for!(SurveyDocument)).unwrap_or_default()
    }
}
