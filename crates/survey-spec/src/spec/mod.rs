pub mod document;
pub mod line;
pub mod page;

pub use document::SurveyDocument;
pub use line::{LineItem, LineKind};
pub use page::{ContinueKind, EachBlock, PageNodeRaw, PlainPage, TwoColumnPage};
