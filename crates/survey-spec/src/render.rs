use std::sync::LazyLock;

use handlebars::{Handlebars, html_escape};
use serde_json::{Value, json};
use tracing::warn;

use crate::answers::{
    self, NEXT_FIELD, PAGE_ID_FIELD, RESPONSE_FIELD, RespondentDocument, current_key,
};
use crate::assets::AssetRegistry;
use crate::error::SurveyError;
use crate::spec::{LineItem, LineKind};
use crate::survey::{Continuation, Page, PageBody, SurveySpec};
use crate::template::{self, Vars};

/// Variable holding the respondent's session id.
pub const TOKEN_VAR: &str = "token";

/// Values offered by a likert scale, left to right.
pub const LIKERT_RANGE: std::ops::RangeInclusive<i64> = -2..=2;

/// Image source emitted when a live page refers to a file that is not there.
/// Registered aliases always carry a numeric prefix, so it never resolves.
pub const MISSING_IMAGE_ALIAS: &str = "missing";

const PAGE_TEMPLATE: &str = "page";

const PAGE_SHELL: &str = r#"<!DOCTYPE html>
<html>
<head>
    <meta charset="utf-8">
    <title>{{title}}</title>
    <style>
        * {
            box-sizing: border-box;
            font-family: "Helvetica Neue",Helvetica,Arial,sans-serif;
            font-size: 16px;
            line-height: 1.42857143;
        }
    </style>
</head>
<body style="height: 100vh; width: 100vw; margin: 0; padding: 0;">
    <div style="display: flex; align-items: center; justify-content: center; height: 100%; flex-direction: column;">
        <div style="flex-grow: 0; flex-shrink: 0;">
            <form id="main_form" action="{{action}}" method="post">
            {{{content}}}
            <input type="hidden" value="{{page_id}}" name="{{page_id_field}}">
            </form>
        </div>
        <div style="flex-grow: 0.5; flex-shrink: 1;">
        </div>
    </div>
    <script>
        {{#unless terminal}}
        window.onbeforeunload = (e) => {
            e.returnValue = "Data you have entered might not be saved. Continue closing?";
            return e.returnValue;
        };
        {{/unless}}
        document.getElementById("main_form").onsubmit = () => {
            window.onbeforeunload = null;
        };
    </script>
</body>
</html>
"#;

static SHELL: LazyLock<Handlebars<'static>> = LazyLock::new(|| {
    let mut handlebars = Handlebars::new();
    handlebars.set_strict_mode(true);
    handlebars
        .register_template_string(PAGE_TEMPLATE, PAGE_SHELL)
        .expect("page shell template is valid");
    handlebars
});

/// Output of rendering a single page.
#[derive(Debug, Clone, PartialEq)]
pub struct RenderedPage {
    pub markup: String,
    pub page_id: String,
    /// The page has no continuation control; the survey ends here.
    pub terminal: bool,
}

/// What a page does with an image line whose file does not exist.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum MissingImage {
    Fail,
    Placeholder,
}

/// Renders page `index` of `spec` for one respondent.
///
/// `navigation_url` becomes the form action. The respondent's earlier answers
/// for this page id are exposed to templates as `cur/<pid>/<field>`. A missing
/// image file fails the page with [`SurveyError::MissingAsset`].
pub fn render_page(
    spec: &SurveySpec,
    index: usize,
    navigation_url: &str,
    session_id: &str,
    doc: &RespondentDocument,
    assets: &AssetRegistry,
) -> Result<RenderedPage, SurveyError> {
    render(spec, index, navigation_url, session_id, doc, assets, MissingImage::Fail)
}

/// Like [`render_page`], but a missing image file only breaks that image:
/// its `src` points at [`MISSING_IMAGE_ALIAS`] and a warning is logged.
pub fn render_live_page(
    spec: &SurveySpec,
    index: usize,
    navigation_url: &str,
    session_id: &str,
    doc: &RespondentDocument,
    assets: &AssetRegistry,
) -> Result<RenderedPage, SurveyError> {
    render(
        spec,
        index,
        navigation_url,
        session_id,
        doc,
        assets,
        MissingImage::Placeholder,
    )
}

fn render(
    spec: &SurveySpec,
    index: usize,
    navigation_url: &str,
    session_id: &str,
    doc: &RespondentDocument,
    assets: &AssetRegistry,
    missing: MissingImage,
) -> Result<RenderedPage, SurveyError> {
    let page = spec.page(index)?;
    let vars = page_vars(page, session_id, doc)?;
    let page_id = page_id(page, session_id)?;

    let mut content = match &page.body {
        PageBody::Plain { lines } => render_lines(lines, &page_id, &vars, assets, missing)?,
        PageBody::TwoColumn {
            left,
            right,
            bottom,
        } => format!(
            r#"<div style="display: flex; flex-direction: row; align-items: flex-start;">
                <div style="flex: 1 1 0; padding: 0 1em;">{}</div>
                <div style="flex: 1 1 0; padding: 0 1em;">{}</div>
            </div>
            <div>{}</div>"#,
            render_lines(left, &page_id, &vars, assets, missing)?,
            render_lines(right, &page_id, &vars, assets, missing)?,
            render_lines(bottom, &page_id, &vars, assets, missing)?,
        ),
    };
    content.push_str(&render_footer(&page.continuation, &vars)?);

    let terminal = page.continuation.is_terminal();
    let data = json!({
        "title": template::render(&spec.title, &vars)?,
        "action": navigation_url,
        "content": content,
        "page_id": page_id,
        "page_id_field": PAGE_ID_FIELD,
        "terminal": terminal,
    });
    let markup = SHELL
        .render(PAGE_TEMPLATE, &data)
        .map_err(|err| SurveyError::InvalidSpec(format!("page shell failed to render: {err}")))?;

    Ok(RenderedPage {
        markup,
        page_id,
        terminal,
    })
}

/// Renders the page id of `page` for the given session.
pub fn page_id(page: &Page, session_id: &str) -> Result<String, SurveyError> {
    let vars = base_vars(page, session_id);
    Ok(template::render(&page.pid, &vars)?)
}

fn base_vars(page: &Page, session_id: &str) -> Vars {
    let mut vars = page.vars.clone();
    vars.insert(TOKEN_VAR.into(), Value::String(session_id.to_string()));
    vars
}

/// Effective variable mapping of a page: its captured bindings, the session
/// token, defaults for its own input controls, and the respondent's stored
/// answers for this page id.
pub fn page_vars(
    page: &Page,
    session_id: &str,
    doc: &RespondentDocument,
) -> Result<Vars, SurveyError> {
    let mut vars = base_vars(page, session_id);
    let page_id = template::render(&page.pid, &vars)?;

    for line in page.body.lines() {
        if let LineItem::Field {
            kind: LineKind::Likert,
            field_id: Some(field_id),
            ..
        } = line
        {
            let field = template::render(field_id, &vars)?;
            vars.insert(current_key(&page_id, &field), Value::from(0));
        }
    }
    if let Continuation::Choice(_) = page.continuation {
        vars.insert(
            current_key(&page_id, RESPONSE_FIELD),
            Value::String(String::new()),
        );
    }

    vars.extend(answers::project(doc, &page_id));
    Ok(vars)
}

fn render_lines(
    lines: &[LineItem],
    page_id: &str,
    vars: &Vars,
    assets: &AssetRegistry,
    missing: MissingImage,
) -> Result<String, SurveyError> {
    let mut content = String::new();
    for line in lines {
        content.push_str(&render_line(line, page_id, vars, assets, missing)?);
    }
    Ok(content)
}

fn render_line(
    line: &LineItem,
    page_id: &str,
    vars: &Vars,
    assets: &AssetRegistry,
    missing: MissingImage,
) -> Result<String, SurveyError> {
    let (kind, text, field_id) = match line {
        LineItem::Text(text) => {
            return Ok(format!("<p>{}</p>", template::render(text, vars)?));
        }
        LineItem::Field {
            kind,
            text,
            field_id,
        } => (*kind, text, field_id),
    };
    let text = template::render(text, vars)?;

    match kind {
        LineKind::Text => Ok(format!("<p>{text}</p>")),
        LineKind::Img => {
            let alias = match assets.register(&text) {
                Ok(alias) => alias,
                Err(SurveyError::MissingAsset(path)) if missing == MissingImage::Placeholder => {
                    warn!(page_id, path = %path.display(), "image file is missing");
                    MISSING_IMAGE_ALIAS.to_string()
                }
                Err(err) => return Err(err),
            };
            Ok(format!(
                r#"<img src="img/{}" style="display: block; margin: 0 auto;">"#,
                html_escape(&alias)
            ))
        }
        LineKind::Likert => {
            let field_id = field_id.as_deref().ok_or_else(|| {
                SurveyError::InvalidSpec(format!("likert line '{text}' needs a field id"))
            })?;
            let field = template::render(field_id, vars)?;
            let selected = vars
                .get(&current_key(page_id, &field))
                .and_then(likert_value)
                .unwrap_or(0);
            Ok(format!(
                r#"<p>{text}</p><p style="text-align: center; white-space: nowrap;">{}</p>"#,
                likert_scale(&field, selected)
            ))
        }
    }
}

fn likert_value(value: &Value) -> Option<i64> {
    let value = match value {
        Value::Number(num) => num.as_i64()?,
        Value::String(text) => text.trim().parse().ok()?,
        _ => return None,
    };
    LIKERT_RANGE.contains(&value).then_some(value)
}

fn likert_scale(field: &str, selected: i64) -> String {
    let name = html_escape(field);
    LIKERT_RANGE
        .map(|value| {
            let checked = if value == selected {
                r#" checked="checked""#
            } else {
                ""
            };
            format!(
                r#"
                <input id="{name}_{value}" name="{name}" type="radio" value="{value}"{checked}>
                <label for="{name}_{value}">{value}</label>"#
            )
        })
        .collect()
}

fn render_footer(continuation: &Continuation, vars: &Vars) -> Result<String, SurveyError> {
    let mut footer =
        String::from(r#"<p></p><p style="text-align: center; white-space: nowrap;">"#);
    match continuation {
        Continuation::End => {}
        Continuation::Next => footer.push_str(&format!(
            r#"<input type="submit" name="{NEXT_FIELD}" value="Next">"#
        )),
        Continuation::Choice(values) => {
            for value in values {
                let label = template::render(value, vars)?;
                footer.push_str(&format!(
                    r#"<input type="submit" name="{RESPONSE_FIELD}" value="{}">"#,
                    html_escape(&label)
                ));
            }
        }
    }
    footer.push_str("</p>");
    Ok(footer)
}
