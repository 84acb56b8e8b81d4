//! Response validation for fetched documents.

/// Anything shorter than this is an error page or an empty body.
pub const MIN_CONTENT_BYTES: usize = 10;

/// Decide whether fetched content is usable.
///
/// Returns `None` for a non-2xx status, empty or sub-10-byte content, or
/// HTML where JSON was expected. For JSON fetches the returned text is the
/// JSON document itself, unwrapped from the browser's `<pre>` viewer.
pub fn validate_content(status: Option<u16>, content: &str, expect_json: bool) -> Option<String> {
    if let Some(status) = status {
        if !(200..300).contains(&status) {
            tracing::debug!("Rejecting response with HTTP {}", status);
            return None;
        }
    }

    if content.trim().len() < MIN_CONTENT_BYTES {
        tracing::debug!("Rejecting response with {} bytes", content.len());
        return None;
    }

    if expect_json {
        let json = unwrap_json_envelope(content);
        if json.is_none() {
            tracing::debug!("Expected JSON but received markup");
        }
        return json;
    }

    Some(content.to_string())
}

/// Extract a JSON document from raw content.
///
/// Chromium renders JSON responses inside `<html><body><pre>…</pre>`, with
/// the text HTML-escaped. Bare JSON is returned as-is.
pub fn unwrap_json_envelope(content: &str) -> Option<String> {
    let trimmed = content.trim_start_matches('\u{feff}').trim();
    if looks_like_json(trimmed) {
        return Some(trimmed.to_string());
    }

    let lower = trimmed.to_ascii_lowercase();
    let open = lower.find("<pre")?;
    let body_start = open + lower[open..].find('>')? + 1;
    let body_end = body_start + lower[body_start..].find("</pre>")?;

    let inner = decode_entities(trimmed[body_start..body_end].trim());
    looks_like_json(&inner).then_some(inner)
}

fn looks_like_json(text: &str) -> bool {
    (text.starts_with('{') && text.ends_with('}')) || (text.starts_with('[') && text.ends_with(']'))
}

fn decode_entities(text: &str) -> String {
    text.replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&nbsp;", " ")
        .replace("&amp;", "&")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rejects_non_success_status() {
        let body = r#"{"result": {"place": {"list": []}}}"#;
        assert!(validate_content(Some(403), body, true).is_none());
        assert!(validate_content(Some(500), body, false).is_none());
        assert!(validate_content(Some(200), body, true).is_some());
    }

    #[test]
    fn test_rejects_short_content() {
        assert!(validate_content(Some(200), "", false).is_none());
        assert!(validate_content(Some(200), "   {}   ", true).is_none());
        assert!(validate_content(None, "<html/>", false).is_none());
    }

    #[test]
    fn test_rejects_html_when_json_expected() {
        let html = "<html><body><div class=\"captcha\">verify you are human</div></body></html>";
        assert!(validate_content(Some(200), html, true).is_none());
        assert!(validate_content(Some(200), html, false).is_some());
    }

    #[test]
    fn test_unwraps_pre_envelope() {
        let wrapped = r#"<html><head></head><body><pre style="word-wrap: break-word;">{"q":"a &amp; b","n":1}</pre></body></html>"#;
        let json = validate_content(Some(200), wrapped, true).expect("json");
        assert_eq!(json, r#"{"q":"a & b","n":1}"#);
    }

    #[test]
    fn test_bare_json_passthrough() {
        assert_eq!(
            unwrap_json_envelope("  [1, 2, 3]\n").as_deref(),
            Some("[1, 2, 3]")
        );
        assert!(unwrap_json_envelope("<pre>not json</pre>").is_none());
    }
}
