use std::sync::LazyLock;

use regex::Regex;
use serde_json::{Map, Value};
use thiserror::Error;

/// Flat variable mapping used when rendering templates.
pub type Vars = Map<String, Value>;

/// Widest padding a format spec may request.
pub const MAX_FORMAT_WIDTH: usize = 4096;

static PLACEHOLDER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\{\{|\}\}|\{([^{}]*)\}|[{}]").expect("placeholder pattern is valid")
});

static FORMAT_SPEC: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?P<align>[<>^])?(?P<zero>0)?(?P<width>[0-9]+)?(?P<kind>[ds])?$")
        .expect("format spec pattern is valid")
});

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TemplateError {
    #[error("unresolved variable '{name}' in template '{template}'")]
    UnresolvedVariable { name: String, template: String },
    #[error("malformed template '{template}': {reason}")]
    Syntax { template: String, reason: String },
    #[error("unsupported format spec '{spec}' for variable '{name}'")]
    InvalidFormat { name: String, spec: String },
}

/// Renders `{name}` placeholders in `template` against `vars`.
///
/// `{{` and `}}` produce literal braces. A placeholder may carry a format
/// suffix (`{i:02}`, `{label:>8}`) and may address nested values either by
/// a dotted path (`{user.name}`) or by key (`{user[name]}`) when the full
/// key is not bound directly.
pub fn render(template: &str, vars: &Vars) -> Result<String, TemplateError> {
    let mut out = String::with_capacity(template.len());
    let mut last = 0;

    for captures in PLACEHOLDER.captures_iter(template) {
        let whole = captures.get(0).expect("group 0 always matches");
        out.push_str(&template[last..whole.start()]);
        last = whole.end();

        match whole.as_str() {
            "{{" => out.push('{'),
            "}}" => out.push('}'),
            "{" | "}" => {
                return Err(TemplateError::Syntax {
                    template: template.to_string(),
                    reason: format!("unmatched '{}' at offset {}", whole.as_str(), whole.start()),
                });
            }
            _ => {
                let field = captures.get(1).map(|m| m.as_str()).unwrap_or_default();
                out.push_str(&render_field(field, template, vars)?);
            }
        }
    }

    out.push_str(&template[last..]);
    Ok(out)
}

fn render_field(field: &str, template: &str, vars: &Vars) -> Result<String, TemplateError> {
    let (name, spec) = match field.split_once(':') {
        Some((name, spec)) => (name, Some(spec)),
        None => (field, None),
    };
    if name.is_empty() {
        return Err(TemplateError::Syntax {
            template: template.to_string(),
            reason: "empty placeholder".into(),
        });
    }

    let value = lookup(vars, name).ok_or_else(|| TemplateError::UnresolvedVariable {
        name: name.to_string(),
        template: template.to_string(),
    })?;
    let text = value_to_display(value);

    match spec {
        Some(spec) if !spec.is_empty() => apply_format(name, spec, value, text),
        _ => Ok(text),
    }
}

/// Finds `name` in `vars`, falling back to nested navigation for dotted or
/// keyed names.
pub fn lookup<'a>(vars: &'a Vars, name: &str) -> Option<&'a Value> {
    if let Some(value) = vars.get(name) {
        return Some(value);
    }

    let segments = split_path(name)?;
    let (first, rest) = segments.split_first()?;
    let mut current = vars.get(*first)?;
    for segment in rest {
        current = match current {
            Value::Object(map) => map.get(*segment)?,
            Value::Array(items) => items.get(segment.parse::<usize>().ok()?)?,
            _ => return None,
        };
    }
    Some(current)
}

fn split_path(name: &str) -> Option<Vec<&str>> {
    if !name.contains('.') && !name.contains('[') {
        return None;
    }
    let mut segments = Vec::new();
    for part in name.split('.') {
        let mut rest = part;
        match rest.find('[') {
            Some(open) => {
                segments.push(&rest[..open]);
                rest = &rest[open..];
                while let Some(stripped) = rest.strip_prefix('[') {
                    let close = stripped.find(']')?;
                    segments.push(&stripped[..close]);
                    rest = &stripped[close + 1..];
                }
                if !rest.is_empty() {
                    return None;
                }
            }
            None => segments.push(rest),
        }
    }
    if segments.iter().any(|segment| segment.is_empty()) {
        return None;
    }
    Some(segments)
}

fn apply_format(
    name: &str,
    spec: &str,
    value: &Value,
    text: String,
) -> Result<String, TemplateError> {
    let invalid = || TemplateError::InvalidFormat {
        name: name.to_string(),
        spec: spec.to_string(),
    };
    let captures = FORMAT_SPEC.captures(spec).ok_or_else(invalid)?;

    if captures.name("kind").map(|m| m.as_str()) == Some("d") && !value.is_i64() && !value.is_u64()
    {
        return Err(invalid());
    }

    let width = match captures.name("width") {
        Some(width) => width.as_str().parse::<usize>().map_err(|_| invalid())?,
        None => 0,
    };
    if width > MAX_FORMAT_WIDTH {
        return Err(invalid());
    }
    let len = text.chars().count();
    if len >= width {
        return Ok(text);
    }
    let pad = width - len;

    if captures.name("zero").is_some() && captures.name("align").is_none() {
        let (sign, digits) = match text.strip_prefix('-') {
            Some(digits) => ("-", digits),
            None => ("", text.as_str()),
        };
        return Ok(format!("{sign}{}{digits}", "0".repeat(pad)));
    }

    let fill = if captures.name("zero").is_some() { '0' } else { ' ' };
    let fill = |count: usize| fill.to_string().repeat(count);
    let default_align = if value.is_number() { ">" } else { "<" };
    let align = captures.name("align").map_or(default_align, |m| m.as_str());
    Ok(match align {
        ">" => format!("{}{text}", fill(pad)),
        "^" => format!("{}{text}{}", fill(pad / 2), fill(pad - pad / 2)),
        _ => format!("{text}{}", fill(pad)),
    })
}

/// Stringifies a bound value the way it appears in rendered text.
pub fn value_to_display(value: &Value) -> String {
    match value {
        Value::String(text) => text.clone(),
        Value::Null => String::new(),
        Value::Bool(flag) => flag.to_string(),
        Value::Number(num) => num.to_string(),
        other => other.to_string(),
    }
}
