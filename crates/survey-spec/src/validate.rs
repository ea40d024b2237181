use std::collections::HashMap;

use tracing::{debug, warn};

use crate::answers::RespondentDocument;
use crate::assets::AssetRegistry;
use crate::error::SurveyError;
use crate::render::render_page;
use crate::survey::SurveySpec;

/// Session id used while dry-running a survey.
pub const DRY_RUN_TOKEN: &str = "dry-run";
const DRY_RUN_URL: &str = "?pix=0&token=dry-run";

/// Summary of a successful dry run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DryRunReport {
    /// Rendered page id per page index.
    pub page_ids: Vec<String>,
    /// Index of the first page that ends the survey.
    pub terminal_index: usize,
}

impl DryRunReport {
    /// Pages after the first terminal page; respondents never reach them.
    pub fn unreachable(&self) -> std::ops::Range<usize> {
        self.terminal_index + 1..self.page_ids.len()
    }
}

/// Renders every page once against an empty respondent document.
///
/// Fails on the first page that does not render, on a page id used twice
/// before the survey ends, and on a survey without a terminal page.
pub fn dry_run(spec: &SurveySpec, assets: &AssetRegistry) -> Result<DryRunReport, SurveyError> {
    let empty = RespondentDocument::new();
    let mut page_ids = Vec::with_capacity(spec.len());
    let mut seen: HashMap<String, usize> = HashMap::new();
    let mut terminal_index = None;

    for index in 0..spec.len() {
        let rendered = render_page(spec, index, DRY_RUN_URL, DRY_RUN_TOKEN, &empty, assets)
            .map_err(|source| SurveyError::Page {
                index,
                source: Box::new(source),
            })?;
        debug!(index, page_id = %rendered.page_id, "dry-run rendered page");

        if terminal_index.is_none() {
            if let Some(first) = seen.insert(rendered.page_id.clone(), index) {
                return Err(SurveyError::DuplicatePageId {
                    pid: rendered.page_id,
                    first,
                    second: index,
                });
            }
            if rendered.terminal {
                terminal_index = Some(index);
            }
        }
        page_ids.push(rendered.page_id);
    }

    let terminal_index = terminal_index.ok_or(SurveyError::MissingTerminalPage)?;
    let report = DryRunReport {
        page_ids,
        terminal_index,
    };
    if !report.unreachable().is_empty() {
        warn!(
            unreachable = report.unreachable().len(),
            terminal_index, "pages after the first terminal page are never shown"
        );
    }
    Ok(report)
}
