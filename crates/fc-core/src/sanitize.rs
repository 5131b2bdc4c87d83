//! String sanitization applied before a document leaves the process.
//!
//! Every string in the document graph, object keys included, passes through a
//! [`Sanitizer`] before it is written to storage or packed into a share link.

use crate::model::{Document, ModelError};
use serde_json::{Map, Value};

/// Strips unsafe content from a single string.
pub trait Sanitizer {
    fn clean(&self, input: &str) -> String;
}

/// Default sanitizer: removes markup tags (inline `on*=` handlers go with
/// them), `javascript:` / `vbscript:` / `data:text/html` schemes and control
/// characters (newline and tab are kept). A `<` that does not open a tag is
/// ordinary text.
#[derive(Debug, Clone, Copy, Default)]
pub struct MarkupSanitizer;

const BLOCKED_SCHEMES: [&str; 3] = ["javascript:", "vbscript:", "data:text/html"];

impl Sanitizer for MarkupSanitizer {
    fn clean(&self, input: &str) -> String {
        let mut out = strip_tags(input);
        out.retain(|c| !c.is_control() || c == '\n' || c == '\t');

        for scheme in BLOCKED_SCHEMES {
            out = remove_ascii_case_insensitive(&out, scheme);
        }
        out
    }
}

/// Drop `<tag ...>`, `</tag>` and `<!...>` spans. A tag starts with `<`
/// directly followed by a letter, `/` or `!`, and ends at the next `>`
/// with no `<` in between.
fn strip_tags(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    let mut rest = input;
    while let Some(open) = rest.find('<') {
        out.push_str(&rest[..open]);
        let after = &rest[open + 1..];
        let opens_tag = after
            .chars()
            .next()
            .is_some_and(|c| c.is_ascii_alphabetic() || c == '/' || c == '!');
        match after.find(['<', '>']) {
            Some(close) if opens_tag && after[close..].starts_with('>') => {
                rest = &after[close + 1..];
            }
            _ => {
                out.push('<');
                rest = after;
            }
        }
    }
    out.push_str(rest);
    out
}

fn remove_ascii_case_insensitive(haystack: &str, needle: &str) -> String {
    let lower = haystack.to_ascii_lowercase();
    let mut out = String::with_capacity(haystack.len());
    let mut cursor = 0;
    while let Some(found) = lower[cursor..].find(needle) {
        let start = cursor + found;
        out.push_str(&haystack[cursor..start]);
        cursor = start + needle.len();
    }
    out.push_str(&haystack[cursor..]);
    out
}

/// Recursively sanitize every string value and object key.
pub fn sanitize_value(value: &Value, sanitizer: &dyn Sanitizer) -> Value {
    match value {
        Value::String(s) => Value::String(sanitizer.clean(s)),
        Value::Array(items) => Value::Array(
            items
                .iter()
                .map(|item| sanitize_value(item, sanitizer))
                .collect(),
        ),
        Value::Object(map) => {
            let mut out = Map::with_capacity(map.len());
            for (key, item) in map {
                out.insert(sanitizer.clean(key), sanitize_value(item, sanitizer));
            }
            Value::Object(out)
        }
        other => other.clone(),
    }
}

/// Sanitize a whole document by round-tripping it through its JSON form.
pub fn sanitize_document(doc: &Document, sanitizer: &dyn Sanitizer) -> Result<Document, ModelError> {
    let value = serde_json::to_value(doc)?;
    let clean = sanitize_value(&value, sanitizer);
    Ok(serde_json::from_value(clean)?)
}
