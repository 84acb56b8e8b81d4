//! Locating JSON documents inside fetched content.

use adledger_browser::unwrap_json_envelope;
use serde_json::Value;

use crate::error::ParseMiss;

/// Parse the content as a JSON document, bare or `<pre>`-wrapped.
pub(crate) fn json_document(content: &str) -> Result<Value, ParseMiss> {
    let json = unwrap_json_envelope(content)
        .ok_or_else(|| ParseMiss::NoMatch("content is not a JSON document".to_string()))?;
    Ok(serde_json::from_str(&json)?)
}

/// Parse the object literal assigned to `marker` in an inline script,
/// e.g. `window.__APOLLO_STATE__ = {...};`.
pub(crate) fn assigned_object(content: &str, marker: &str) -> Result<Value, ParseMiss> {
    let at = content
        .find(marker)
        .ok_or_else(|| ParseMiss::NoMatch(format!("{marker} not present")))?;
    let rest = &content[at + marker.len()..];
    let open = rest
        .find('{')
        .ok_or_else(|| ParseMiss::Malformed(format!("{marker} has no object")))?;
    let literal = balanced_object(&rest[open..])
        .ok_or_else(|| ParseMiss::Malformed(format!("{marker} object is unterminated")))?;
    Ok(serde_json::from_str(literal)?)
}

/// The prefix of `text` (which starts with `{`) up to its matching `}`.
fn balanced_object(text: &str) -> Option<&str> {
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (i, c) in text.char_indices() {
        if in_string {
            match c {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match c {
            '"' => in_string = true,
            '{' => depth += 1,
            '}' => {
                depth = depth.checked_sub(1)?;
                if depth == 0 {
                    return Some(&text[..=i]);
                }
            }
            _ => {}
        }
    }
    None
}

/// String field by any of several names, trimmed and non-empty.
pub(crate) fn str_field<'a>(value: &'a Value, names: &[&str]) -> Option<&'a str> {
    names
        .iter()
        .filter_map(|name| value.get(*name))
        .filter_map(Value::as_str)
        .map(str::trim)
        .find(|s| !s.is_empty())
}

/// Identifier that may be serialised as a string or a number.
pub(crate) fn id_field(value: &Value, names: &[&str]) -> Option<String> {
    names.iter().filter_map(|name| value.get(*name)).find_map(|v| match v {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    })
}
