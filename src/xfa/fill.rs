//! Path-addressed value updates in the datasets XML.
//!
//! Fields are addressed by slash-separated local-name paths like
//! `form1/Page1/PatientName`. The first path segment is matched anywhere
//! in the tree; each following segment descends through direct children
//! only. Namespace prefixes are ignored throughout.
use std::collections::HashMap;
use std::io::Cursor;

use tracing::{debug, warn};
use xmltree::{Element, XMLNode};

use super::{MAX_DEPTH, XfaError};

/// Find the child-index trail of the first element matching `path`.
///
/// Returns indices to follow from `root` through `children`, or `None`
/// when no element matches. An empty path never matches.
pub(crate) fn locate(root: &Element, path: &str) -> Option<Vec<usize>> {
    let segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();
    let (first, rest) = segments.split_first()?;

    // Candidates for the first segment come from the whole tree, in
    // document order.
    let mut candidates = Vec::new();
    collect_named(root, first, &mut Vec::new(), &mut candidates, 0);

    'candidate: for trail in candidates {
        let mut current = trail.clone();
        for segment in rest {
            let node = node_at(root, &current)?;
            let Some(child_idx) = node.children.iter().position(|child| {
                matches!(child, XMLNode::Element(el) if el.name == *segment)
            }) else {
                continue 'candidate;
            };
            current.push(child_idx);
        }
        return Some(current);
    }
    None
}

/// Collect trails of every element named `name`, pre-order, root included.
fn collect_named(
    node: &Element,
    name: &str,
    trail: &mut Vec<usize>,
    out: &mut Vec<Vec<usize>>,
    depth: usize,
) {
    if depth > MAX_DEPTH {
        return;
    }
    if node.name == name {
        out.push(trail.clone());
    }
    for (i, child) in node.children.iter().enumerate() {
        if let XMLNode::Element(el) = child {
            trail.push(i);
            collect_named(el, name, trail, out, depth + 1);
            trail.pop();
        }
    }
}

fn node_at<'a>(root: &'a Element, trail: &[usize]) -> Option<&'a Element> {
    let mut current = root;
    for &i in trail {
        current = match current.children.get(i) {
            Some(XMLNode::Element(el)) => el,
            _ => return None,
        };
    }
    Some(current)
}

fn node_at_mut<'a>(root: &'a mut Element, trail: &[usize]) -> Option<&'a mut Element> {
    let mut current = root;
    for &i in trail {
        current = match current.children.get_mut(i) {
            Some(XMLNode::Element(el)) => el,
            _ => return None,
        };
    }
    Some(current)
}

/// Find the first element matching a slash-separated path.
#[must_use]
pub fn find<'a>(root: &'a Element, path: &str) -> Option<&'a Element> {
    locate(root, path).and_then(|trail| node_at(root, &trail))
}

/// Replace the element's text content, keeping any element children.
fn set_text(element: &mut Element, value: &str) {
    element
        .children
        .retain(|c| !matches!(c, XMLNode::Text(_) | XMLNode::CData(_)));
    element.children.push(XMLNode::Text(value.to_string()));
}

/// Coerce a value per the declared type hint before writing it.
///
/// Only the exact hints `"bool"` and `"int"` coerce; anything else,
/// including `"boolean"` and `"checkbox"`, passes the value through
/// unchanged so that checkbox `On`/`Off` states survive intact.
fn coerce_value(value: &str, kind: &str) -> String {
    match kind {
        "bool" => {
            if matches!(value, "1" | "true" | "True") {
                "1".to_string()
            } else {
                "0".to_string()
            }
        }
        "int" => value
            .parse::<i64>()
            .map_or_else(|_| value.to_string(), |n| n.to_string()),
        _ => value.to_string(),
    }
}

/// Write values into the datasets XML and return the serialized bytes.
///
/// `values` pairs field paths with the strings to write; `type_hints`
/// optionally maps paths to declared types for [`coerce_value`]. Paths
/// that resolve to nothing are skipped with a warning. With `overwrite`
/// false, fields that already hold non-blank text are left alone.
pub fn update_datasets(
    xml: &str,
    values: &[(String, String)],
    type_hints: &HashMap<String, String>,
    overwrite: bool,
) -> Result<Vec<u8>, XfaError> {
    let mut root = Element::parse(xml.as_bytes())?;
    let mut updated = 0usize;

    for (path, value) in values {
        let Some(trail) = locate(&root, path) else {
            warn!("field path not found in datasets: {path}");
            continue;
        };
        // locate only returns trails that resolve
        let Some(element) = node_at_mut(&mut root, &trail) else {
            continue;
        };

        if !overwrite {
            let existing = element.get_text().unwrap_or_default();
            if !existing.trim().is_empty() {
                debug!("field {path} already filled, skipping");
                continue;
            }
        }

        let coerced = match type_hints.get(path) {
            Some(kind) => coerce_value(value, kind),
            None => value.clone(),
        };
        set_text(element, &coerced);
        updated += 1;
    }

    debug!("updated {updated} of {} fields", values.len());

    let mut out = Cursor::new(Vec::new());
    root.write(&mut out)?;
    Ok(out.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"<xfa:datasets xmlns:xfa="http://www.xfa.org/schema/xfa-data/1.0/">
  <xfa:data>
    <form1>
      <Page1>
        <PatientName>old name</PatientName>
        <VisitDate/>
      </Page1>
      <Smoker>Off</Smoker>
    </form1>
  </xfa:data>
</xfa:datasets>"#;

    fn parse(xml: &str) -> Element {
        Element::parse(xml.as_bytes()).unwrap()
    }

    fn hints() -> HashMap<String, String> {
        HashMap::new()
    }

    #[test]
    fn test_find_descends_by_path() {
        let root = parse(SAMPLE);
        let el = find(&root, "form1/Page1/PatientName").unwrap();
        assert_eq!(el.get_text().unwrap(), "old name");
    }

    #[test]
    fn test_find_first_segment_matches_anywhere() {
        let root = parse(SAMPLE);
        // Page1 is nested under form1 but matches as a first segment
        let el = find(&root, "Page1/VisitDate").unwrap();
        assert_eq!(el.name, "VisitDate");
    }

    #[test]
    fn test_find_missing_returns_none() {
        let root = parse(SAMPLE);
        assert!(find(&root, "form1/NoSuchField").is_none());
        assert!(find(&root, "").is_none());
    }

    #[test]
    fn test_update_overwrites_value() {
        let out = update_datasets(
            SAMPLE,
            &[("form1/Page1/PatientName".to_string(), "Jean".to_string())],
            &hints(),
            true,
        )
        .unwrap();
        let root = parse(&String::from_utf8(out).unwrap());
        let el = find(&root, "form1/Page1/PatientName").unwrap();
        assert_eq!(el.get_text().unwrap(), "Jean");
    }

    #[test]
    fn test_update_skips_filled_without_overwrite() {
        let out = update_datasets(
            SAMPLE,
            &[("form1/Page1/PatientName".to_string(), "Jean".to_string())],
            &hints(),
            false,
        )
        .unwrap();
        let root = parse(&String::from_utf8(out).unwrap());
        let el = find(&root, "form1/Page1/PatientName").unwrap();
        assert_eq!(el.get_text().unwrap(), "old name");
    }

    #[test]
    fn test_update_fills_empty_without_overwrite() {
        let out = update_datasets(
            SAMPLE,
            &[("form1/Page1/VisitDate".to_string(), "05.03.2024".to_string())],
            &hints(),
            false,
        )
        .unwrap();
        let root = parse(&String::from_utf8(out).unwrap());
        let el = find(&root, "form1/Page1/VisitDate").unwrap();
        assert_eq!(el.get_text().unwrap(), "05.03.2024");
    }

    #[test]
    fn test_update_skips_unresolved_paths() {
        let out = update_datasets(
            SAMPLE,
            &[("form1/Ghost".to_string(), "x".to_string())],
            &hints(),
            true,
        )
        .unwrap();
        // Output still parses; nothing changed
        let root = parse(&String::from_utf8(out).unwrap());
        assert!(find(&root, "form1/Ghost").is_none());
    }

    #[test]
    fn test_bool_hint_coerces() {
        let mut type_hints = HashMap::new();
        type_hints.insert("form1/Smoker".to_string(), "bool".to_string());
        let out = update_datasets(
            SAMPLE,
            &[("form1/Smoker".to_string(), "true".to_string())],
            &type_hints,
            true,
        )
        .unwrap();
        let root = parse(&String::from_utf8(out).unwrap());
        assert_eq!(find(&root, "form1/Smoker").unwrap().get_text().unwrap(), "1");
    }

    #[test]
    fn test_checkbox_hint_does_not_coerce() {
        let mut type_hints = HashMap::new();
        type_hints.insert("form1/Smoker".to_string(), "checkbox".to_string());
        let out = update_datasets(
            SAMPLE,
            &[("form1/Smoker".to_string(), "On".to_string())],
            &type_hints,
            true,
        )
        .unwrap();
        let root = parse(&String::from_utf8(out).unwrap());
        assert_eq!(find(&root, "form1/Smoker").unwrap().get_text().unwrap(), "On");
    }

    #[test]
    fn test_int_hint_normalizes() {
        assert_eq!(coerce_value("042", "int"), "42");
        assert_eq!(coerce_value("abc", "int"), "abc");
        assert_eq!(coerce_value("7", "str"), "7");
    }
}
