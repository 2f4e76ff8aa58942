//! Checkbox field discovery and value normalization.
//!
//! XFA checkboxes store their state as the literal strings `On` and
//! `Off`. Writing anything else silently unchecks the box in most
//! viewers, so values destined for checkbox fields are mapped onto that
//! vocabulary before filling.
use tracing::debug;
use xmltree::{Element, XMLNode};

use super::{MAX_DEPTH, XfaError};

/// Element names that frame the data tree but never appear in field paths.
const FRAMING_NAMES: [&str; 2] = ["datasets", "data"];

const TRUTHY: [&str; 7] = ["on", "true", "1", "yes", "y", "x", "checked"];
const FALSY: [&str; 6] = ["off", "false", "0", "no", "n", ""];

/// Scan the datasets XML for checkbox fields.
///
/// A checkbox is a leaf element whose text is exactly `On` or `Off`.
/// Returns their paths in document order, first occurrence only.
pub fn discover_checkbox_paths(xml: &str) -> Result<Vec<String>, XfaError> {
    let root = Element::parse(xml.as_bytes())?;
    let mut paths = Vec::new();
    let mut stack = Vec::new();
    walk(&root, &mut stack, &mut paths, 0);
    debug!("discovered {} checkbox fields", paths.len());
    Ok(paths)
}

fn walk(node: &Element, stack: &mut Vec<String>, out: &mut Vec<String>, depth: usize) {
    if depth > MAX_DEPTH {
        return;
    }
    stack.push(node.name.clone());

    let child_elements: Vec<&Element> = node
        .children
        .iter()
        .filter_map(|c| match c {
            XMLNode::Element(el) => Some(el),
            _ => None,
        })
        .collect();

    if child_elements.is_empty() {
        let text = node.get_text().unwrap_or_default();
        let trimmed = text.trim();
        if trimmed == "On" || trimmed == "Off" {
            let path = stack
                .iter()
                .filter(|name| !FRAMING_NAMES.contains(&name.as_str()))
                .cloned()
                .collect::<Vec<_>>()
                .join("/");
            if !path.is_empty() && !out.contains(&path) {
                out.push(path);
            }
        }
    } else {
        for child in child_elements {
            walk(child, stack, out, depth + 1);
        }
    }

    stack.pop();
}

/// Map a free-form value onto the checkbox vocabulary.
///
/// `On` and `Off` pass through verbatim; anything else is matched
/// case-insensitively against the truthy and falsy word lists, with
/// `Off` as the default for unrecognized input.
#[must_use]
pub fn to_on_off(value: &str) -> String {
    if value == "On" || value == "Off" {
        return value.to_string();
    }
    let lower = value.trim().to_lowercase();
    if TRUTHY.contains(&lower.as_str()) {
        return "On".to_string();
    }
    if !FALSY.contains(&lower.as_str()) {
        debug!("unrecognized checkbox value '{value}', defaulting to Off");
    }
    "Off".to_string()
}

/// Rewrite values targeting checkbox paths onto the `On`/`Off`
/// vocabulary. Values for other paths are untouched.
pub fn normalize_checkboxes(values: &mut [(String, String)], checkbox_paths: &[String]) {
    for (path, value) in values.iter_mut() {
        if checkbox_paths.iter().any(|p| p == path) {
            let normalized = to_on_off(value);
            if normalized != *value {
                debug!("normalized checkbox {path}: '{value}' -> '{normalized}'");
                *value = normalized;
            }
        }
    }
}
