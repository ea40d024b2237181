use crate::error::SurveyError;
use crate::spec::LineItem;
use crate::template::Vars;

/// Default survey title when the document does not set one.
pub const DEFAULT_TITLE: &str = "Survey";

/// Content regions of a flattened page.
#[derive(Debug, Clone, PartialEq)]
pub enum PageBody {
    Plain {
        lines: Vec<LineItem>,
    },
    TwoColumn {
        left: Vec<LineItem>,
        right: Vec<LineItem>,
        bottom: Vec<LineItem>,
    },
}

impl PageBody {
    /// All lines of the page in rendering order.
    pub fn lines(&self) -> impl Iterator<Item = &LineItem> {
        let regions: Vec<&Vec<LineItem>> = match self {
            PageBody::Plain { lines } => vec![lines],
            PageBody::TwoColumn {
                left,
                right,
                bottom,
            } => vec![left, right, bottom],
        };
        regions.into_iter().flatten()
    }
}

/// Footer control of a page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Continuation {
    /// Terminal page without any control.
    End,
    /// Single advance button that records no answer.
    Next,
    /// One submit button per label; the pressed label is recorded.
    Choice(Vec<String>),
}

impl Continuation {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Continuation::End)
    }
}

/// A fully expanded page carrying its own variable bindings.
#[derive(Debug, Clone, PartialEq)]
pub struct Page {
    /// Page id template.
    pub pid: String,
    pub vars: Vars,
    pub body: PageBody,
    pub continuation: Continuation,
}

/// Immutable, ordered page sequence produced by the flattener.
#[derive(Debug, Clone, PartialEq)]
pub struct SurveySpec {
    pub title: String,
    pub url_base: Option<String>,
    pages: Vec<Page>,
}

impl SurveySpec {
    pub fn new(title: String, url_base: Option<String>, pages: Vec<Page>) -> Self {
        Self {
            title,
            url_base,
            pages,
        }
    }

    pub fn pages(&self) -> &[Page] {
        &self.pages
    }

    pub fn len(&self) -> usize {
        self.pages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pages.is_empty()
    }

    pub fn page(&self, index: usize) -> Result<&Page, SurveyError> {
        self.pages.get(index).ok_or(SurveyError::OutOfRange {
            index,
            len: self.pages.len(),
        })
    }
}
