use serde_json::Value;

use crate::error::SurveyError;
use crate::spec::{ContinueKind, EachBlock, PageNodeRaw, SurveyDocument};
use crate::survey::{Continuation, DEFAULT_TITLE, Page, PageBody, SurveySpec};
use crate::template::{self, Vars};

/// Expands the authored page tree into the linear page sequence.
///
/// Pages appear in depth-first declaration order. `each` blocks repeat their
/// children once per loop value, and every emitted page captures the
/// variables of all enclosing scopes, with inner bindings taking precedence.
pub fn flatten(document: &SurveyDocument) -> Result<SurveySpec, SurveyError> {
    let mut pages = Vec::new();
    expand(&document.pages, &Vars::new(), &mut pages)?;
    let title = document
        .title
        .clone()
        .unwrap_or_else(|| DEFAULT_TITLE.to_string());
    Ok(SurveySpec::new(title, document.urlbase.clone(), pages))
}

fn expand(nodes: &[PageNodeRaw], scope: &Vars, out: &mut Vec<Page>) -> Result<(), SurveyError> {
    for node in nodes {
        match node {
            PageNodeRaw::Plain(page) => {
                let body = PageBody::Plain {
                    lines: page.lines.clone(),
                };
                let continuation = continuation(page.continuation, &page.values)?;
                push_page(out, page.pid.as_deref(), scope, &page.vars, body, continuation);
            }
            PageNodeRaw::TwoColumn(page) => {
                let body = PageBody::TwoColumn {
                    left: page.left.clone(),
                    right: page.right.clone(),
                    bottom: page.bottom.clone(),
                };
                let continuation = continuation(page.continuation, &page.values)?;
                push_page(out, page.pid.as_deref(), scope, &page.vars, body, continuation);
            }
            PageNodeRaw::Each(block) => expand_each(block, scope, out)?,
        }
    }
    Ok(())
}

fn push_page(
    out: &mut Vec<Page>,
    pid: Option<&str>,
    scope: &Vars,
    local: &Vars,
    body: PageBody,
    continuation: Continuation,
) {
    let pid = match pid {
        Some(pid) => pid.to_string(),
        None => format!("p{}", out.len()),
    };
    out.push(Page {
        pid,
        vars: merge_scope(scope, local),
        body,
        continuation,
    });
}

fn expand_each(block: &EachBlock, scope: &Vars, out: &mut Vec<Page>) -> Result<(), SurveyError> {
    let local = merge_scope(scope, &block.vars);
    let name = loop_name(&block.name, &local)?;
    let name_next = block
        .name_next
        .as_deref()
        .map(|name| loop_name(name, &local))
        .transpose()?;
    let name_prev = block
        .name_prev
        .as_deref()
        .map(|name| loop_name(name, &local))
        .transpose()?;

    let from = match &block.from {
        Some(from) => bound(from, &local, "from")?,
        None => 0,
    };
    let to = bound(&block.to, &local, "to")?;

    for ix in from..to {
        let mut child = local.clone();
        child.insert(name.clone(), Value::from(ix));
        if let Some(next) = &name_next {
            child.insert(next.clone(), Value::from(ix + 1));
        }
        if let Some(prev) = &name_prev {
            let before = ix.checked_sub(1).ok_or_else(|| {
                SurveyError::InvalidSpec(format!(
                    "each block '{name}' has no previous value for {ix}"
                ))
            })?;
            child.insert(prev.clone(), Value::from(before));
        }
        expand(&block.pages, &child, out)?;
    }
    Ok(())
}

fn merge_scope(scope: &Vars, local: &Vars) -> Vars {
    let mut merged = scope.clone();
    merged.extend(local.iter().map(|(key, value)| (key.clone(), value.clone())));
    merged
}

fn loop_name(template: &str, vars: &Vars) -> Result<String, SurveyError> {
    let name = template::render(template, vars)?;
    if name.is_empty() {
        return Err(SurveyError::InvalidSpec(format!(
            "each block name '{template}' renders to an empty string"
        )));
    }
    Ok(name)
}

fn bound(value: &Value, vars: &Vars, which: &str) -> Result<i64, SurveyError> {
    match value {
        Value::Number(num) => num.as_i64().ok_or_else(|| {
            SurveyError::InvalidSpec(format!("each bound '{which}' must be an integer, got {num}"))
        }),
        Value::String(text) => {
            let rendered = template::render(text, vars)?;
            rendered.trim().parse::<i64>().map_err(|_| {
                SurveyError::InvalidSpec(format!(
                    "each bound '{which}' must render to an integer, got '{rendered}'"
                ))
            })
        }
        other => Err(SurveyError::InvalidSpec(format!(
            "each bound '{which}' must be an integer or template, got {other}"
        ))),
    }
}

fn continuation(kind: ContinueKind, values: &[String]) -> Result<Continuation, SurveyError> {
    match kind {
        ContinueKind::End => Ok(Continuation::End),
        ContinueKind::Next => Ok(Continuation::Next),
        ContinueKind::Choice if values.is_empty() => Err(SurveyError::InvalidSpec(
            "continue \"choice\" needs at least one entry in values".into(),
        )),
        ContinueKind::Choice => Ok(Continuation::Choice(values.to_vec())),
    }
}
