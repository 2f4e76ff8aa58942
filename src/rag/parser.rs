//! Tolerant parsing of model JSON replies.
//!
//! Models wrap JSON in markdown fences, add comments, leave trailing
//! commas, or truncate output mid-array. Parsing runs a fixed ladder of
//! strategies from strict to increasingly forgiving, and gives up to an
//! empty list rather than failing the batch.
use std::sync::LazyLock;

use regex::Regex;
use serde_json::Value;
use tracing::{debug, warn};

static FENCE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"```(?:json)?").unwrap_or_else(|e| panic!("invalid regex: {e}")));

static FIELDS_ARRAY: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#""fields"\s*:\s*(\[[\s\S]*?\])"#).unwrap_or_else(|e| panic!("invalid regex: {e}"))
});

static LINE_COMMENT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?m)^\s*//[^\n]*$").unwrap_or_else(|e| panic!("invalid regex: {e}"))
});

static TRAILING_COMMA: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r",\s*([}\]])").unwrap_or_else(|e| panic!("invalid regex: {e}")));

/// Parse a model reply into a list of field-entry objects.
///
/// Accepts a bare array, an object with a `fields` or `results` array, or
/// a single object (wrapped into a one-element list). Returns an empty
/// list when nothing parseable is found.
#[must_use]
pub fn parse_field_entries(text: &str) -> Vec<Value> {
    let Some(value) = extract_json(text) else {
        warn!("no parseable JSON found in model reply ({} chars)", text.len());
        return Vec::new();
    };

    match value {
        Value::Array(items) => items,
        Value::Object(ref map) => {
            for key in ["fields", "results"] {
                if let Some(Value::Array(items)) = map.get(key) {
                    return items.clone();
                }
            }
            vec![value]
        }
        _ => Vec::new(),
    }
}

/// Extract a JSON value from free text, trying strategies in order.
fn extract_json(text: &str) -> Option<Value> {
    let unfenced = FENCE.replace_all(text, "");
    let candidate = find_json_substring(&unfenced)?;
    let cleaned = clean_json(candidate);

    // 1. Strict parse
    if let Ok(v) = serde_json::from_str::<Value>(&cleaned) {
        return Some(v);
    }

    // 2. Close unbalanced delimiters (truncated output)
    let repaired = repair_truncation(&cleaned);
    if let Ok(v) = serde_json::from_str::<Value>(&repaired) {
        debug!("recovered truncated JSON reply");
        return Some(v);
    }

    // 3. Single-quoted strings
    let requoted = cleaned.replace('\'', "\"");
    if let Ok(v) = serde_json::from_str::<Value>(&requoted) {
        debug!("recovered single-quoted JSON reply");
        return Some(v);
    }

    // 4. Salvage just the fields array
    if let Some(caps) = FIELDS_ARRAY.captures(&cleaned) {
        if let Ok(v) = serde_json::from_str::<Value>(&caps[1]) {
            debug!("salvaged fields array from malformed reply");
            return Some(v);
        }
    }

    None
}

/// Locate the outermost `{..}` or `[..]` block, whichever opens first.
fn find_json_substring(text: &str) -> Option<&str> {
    let mut openers: Vec<(usize, char)> = Vec::new();
    if let Some(i) = text.find('{') {
        openers.push((i, '}'));
    }
    if let Some(i) = text.find('[') {
        openers.push((i, ']'));
    }
    openers.sort_by_key(|(i, _)| *i);

    for (start, close) in openers {
        if let Some(end) = text.rfind(close) {
            if end > start {
                return Some(&text[start..=end]);
            }
        }
    }
    // Truncated output may lack a closer entirely; take everything from
    // the first opener and let the repair step close it.
    let start = text.find(['{', '['])?;
    Some(&text[start..])
}

/// Strip comments and trailing commas, and replace raw newlines outside
/// string literals with spaces.
fn clean_json(text: &str) -> String {
    let no_comments = LINE_COMMENT.replace_all(text, "");
    let no_trailing = TRAILING_COMMA.replace_all(&no_comments, "$1");

    let mut out = String::with_capacity(no_trailing.len());
    let mut in_string = false;
    let mut escaped = false;
    for c in no_trailing.chars() {
        if escaped {
            escaped = false;
            out.push(c);
            continue;
        }
        match c {
            '\\' if in_string => {
                escaped = true;
                out.push(c);
            }
            '"' => {
                in_string = !in_string;
                out.push(c);
            }
            '\n' | '\r' if !in_string => out.push(' '),
            _ => out.push(c),
        }
    }
    out
}

/// Append closers for any delimiters left open outside string literals.
fn repair_truncation(text: &str) -> String {
    let mut stack = Vec::new();
    let mut in_string = false;
    let mut escaped = false;

    for c in text.chars() {
        if escaped {
            escaped = false;
            continue;
        }
        match c {
            '\\' if in_string => escaped = true,
            '"' => in_string = !in_string,
            '{' if !in_string => stack.push('}'),
            '[' if !in_string => stack.push(']'),
            '}' | ']' if !in_string => {
                stack.pop();
            }
            _ => {}
        }
    }

    let mut repaired = text.trim_end().trim_end_matches(',').to_string();
    if in_string {
        repaired.push('"');
    }
    while let Some(closer) = stack.pop() {
        repaired.push(closer);
    }
    repaired
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strict_object_with_fields() {
        let entries =
            parse_field_entries(r#"{"fields": [{"id": "1.1", "value": "yes"}]}"#);
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0]["id"], "1.1");
    }

    #[test]
    fn test_bare_array() {
        let entries = parse_field_entries(r#"[{"id": "a"}, {"id": "b"}]"#);
        assert_eq!(entries.len(), 2);
    }

    #[test]
    fn test_bare_array_with_surrounding_prose() {
        let entries =
            parse_field_entries(r#"Voici les champs : [{"id": "a"}, {"id": "b"}] voilà."#);
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0]["id"], "a");
    }

    #[test]
    fn test_single_object_wrapped() {
        let entries = parse_field_entries(r#"{"id": "1.1", "value": 3}"#);
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0]["value"], 3);
    }

    #[test]
    fn test_markdown_fences_stripped() {
        let text = "Voici le résultat:\n```json\n{\"fields\": [{\"id\": \"1\"}]}\n```";
        let entries = parse_field_entries(text);
        assert_eq!(entries.len(), 1);
    }

    #[test]
    fn test_trailing_commas_removed() {
        let entries = parse_field_entries(r#"{"fields": [{"id": "1",},],}"#);
        assert_eq!(entries.len(), 1);
    }

    #[test]
    fn test_truncated_reply_repaired() {
        let text = r#"{"fields": [{"id": "1.1", "value": "partial"#;
        let entries = parse_field_entries(text);
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0]["id"], "1.1");
    }

    #[test]
    fn test_single_quotes_recovered() {
        let entries = parse_field_entries("{'fields': [{'id': '1'}]}");
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0]["id"], "1");
    }

    #[test]
    fn test_results_key_accepted() {
        let entries = parse_field_entries(r#"{"results": [{"id": "x"}]}"#);
        assert_eq!(entries.len(), 1);
    }

    #[test]
    fn test_garbage_yields_empty() {
        assert!(parse_field_entries("no json here at all").is_empty());
        assert!(parse_field_entries("").is_empty());
    }

    #[test]
    fn test_newlines_inside_strings_preserved() {
        let entries = parse_field_entries("{\"fields\": [{\"id\": \"1\",\n\"value\": \"a b\"}]}");
        assert_eq!(entries[0]["value"], "a b");
    }
}
