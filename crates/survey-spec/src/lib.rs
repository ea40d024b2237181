#![allow(missing_docs)]

pub mod answers;
pub mod assets;
pub mod error;
pub mod flatten;
pub mod render;
pub mod spec;
pub mod survey;
pub mod template;
pub mod validate;

pub use answers::{RespondentDocument, merge, project};
pub use assets::{AssetRegistry, content_type};
pub use error::SurveyError;
pub use flatten::flatten;
pub use render::{RenderedPage, render_live_page, render_page};
pub use spec::{ContinueKind, EachBlock, LineItem, LineKind, PageNodeRaw, SurveyDocument};
pub use survey::{Continuation, Page, PageBody, SurveySpec};
pub use template::{TemplateError, Vars};
pub use validate::{DryRunReport, dry_run};

/// Parses, flattens, and dry-runs a survey document in one step.
pub fn load(
    text: &str,
    assets: &AssetRegistry,
) -> Result<(SurveySpec, DryRunReport), SurveyError> {
    let document = SurveyDocument::from_json(text)?;
    let spec = flatten(&document)?;
    let report = dry_run(&spec, assets)?;
    Ok((spec, report))
}
