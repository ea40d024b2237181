use std::path::PathBuf;

use thiserror::Error;

use crate::template::TemplateError;

/// Failures raised while loading, validating, or rendering a survey.
#[derive(Debug, Error)]
pub enum SurveyError {
    /// Malformed or unrecognized node, page type, continuation, line kind,
    /// or non-integer loop bound.
    #[error("invalid survey spec: {0}")]
    InvalidSpec(String),
    #[error(transparent)]
    Template(#[from] TemplateError),
    #[error("page index {index} is out of range (survey has {len} pages)")]
    OutOfRange { index: usize, len: usize },
    #[error("asset not found: {}", .0.display())]
    MissingAsset(PathBuf),
    #[error("duplicate page id '{pid}' at pages {first} and {second}")]
    DuplicatePageId {
        pid: String,
        first: usize,
        second: usize,
    },
    #[error("survey has no terminal page (no page with continue \"end\")")]
    MissingTerminalPage,
    #[error("page {index} failed to render: {source}")]
    Page {
        index: usize,
        #[source]
        source: Box<SurveyError>,
    },
}

impl SurveyError {
    /// Returns the innermost error, skipping page annotations.
    pub fn root(&self) -> &SurveyError {
        match self {
            SurveyError::Page { source, .. } => source.root(),
            other => other,
        }
    }

    pub fn is_unresolved_variable(&self) -> bool {
        matches!(
            self.root(),
            SurveyError::Template(TemplateError::UnresolvedVariable { .. })
        )
    }
}
