use serde_json::{Map, Value};

use crate::template::Vars;

/// Nested per-respondent answer state, keyed at the top level by page id.
pub type RespondentDocument = Map<String, Value>;

/// Hidden form field carrying the id of the submitted page.
pub const PAGE_ID_FIELD: &str = "_pid";
/// Field recording the label of the pressed choice button.
pub const RESPONSE_FIELD: &str = "_res";
/// Fields with this prefix carry no answer data.
pub const NOOP_PREFIX: &str = "__";
/// Name of the advance button on `next` pages.
pub const NEXT_FIELD: &str = "__next";
/// Namespace under which a page's own answers are exposed to templates.
pub const CURRENT_PREFIX: &str = "cur";

/// Merges one submitted page into `doc`.
///
/// Each field lands at `<page_id>/<field>`, with `/` separating nested
/// levels. Only the written leaves change; resubmitting the same fields is a
/// no-op.
pub fn merge<'a>(
    doc: &'a mut RespondentDocument,
    page_id: &str,
    fields: &Map<String, Value>,
) -> &'a mut RespondentDocument {
    for (key, value) in fields {
        if key == PAGE_ID_FIELD || key.starts_with(NOOP_PREFIX) {
            continue;
        }
        let path = format!("{page_id}/{key}");
        insert_path(doc, &segments(&path), value.clone());
    }
    doc
}

/// Assigns `value` at `path`, creating intermediate mappings as needed.
pub fn insert_path(map: &mut Map<String, Value>, path: &[&str], value: Value) {
    let Some((head, rest)) = path.split_first() else {
        return;
    };
    if rest.is_empty() {
        map.insert((*head).to_string(), value);
        return;
    }
    let entry = map
        .entry((*head).to_string())
        .or_insert_with(|| Value::Object(Map::new()));
    if !entry.is_object() {
        *entry = Value::Object(Map::new());
    }
    if let Value::Object(child) = entry {
        insert_path(child, rest, value);
    }
}

/// Reads the value stored at `path`, if any.
pub fn get_path<'a>(map: &'a Map<String, Value>, path: &str) -> Option<&'a Value> {
    let segments = segments(path);
    let (last, parents) = segments.split_last()?;
    let mut current = map;
    for segment in parents {
        current = current.get(*segment)?.as_object()?;
    }
    current.get(*last)
}

/// Flattens the subtree stored under `page_id` into `cur/<page_id>/<path>`
/// keys.
pub fn project(doc: &RespondentDocument, page_id: &str) -> Vars {
    let mut out = Vars::new();
    let prefix = current_key(page_id, "");
    match get_path(doc, page_id) {
        Some(Value::Object(subtree)) => flatten_into(&mut out, &prefix, subtree),
        Some(scalar) => {
            out.insert(prefix, scalar.clone());
        }
        None => {}
    }
    out
}

/// Template key under which the answer to `field` on `page_id` is exposed.
pub fn current_key(page_id: &str, field: &str) -> String {
    let mut parts = vec![CURRENT_PREFIX];
    parts.extend(segments(page_id));
    parts.extend(segments(field));
    parts.join("/")
}

fn flatten_into(out: &mut Vars, prefix: &str, map: &Map<String, Value>) {
    for (key, value) in map {
        let key = format!("{prefix}/{key}");
        match value {
            Value::Object(child) => flatten_into(out, &key, child),
            other => {
                out.insert(key, other.clone());
            }
        }
    }
}

fn segments(path: &str) -> Vec<&str> {
    path.split('/').filter(|segment| !segment.is_empty()).collect()
}
