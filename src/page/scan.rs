//! The element scanner: turns the live DOM into a numbered catalog.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::{js, Page};
use crate::error::{Result, WebtapError};

/// One entry of the element catalog.
///
/// `index` is unique within a scan and stable until the next scan or
/// navigation; the matching DOM node carries it as a `data-wt-idx` stamp.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Element {
    pub index: usize,
    pub kind: String,
    pub desc: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub href: String,
}

impl fmt::Display for Element {
    /// The one-line catalog format consumed by the calling agent:
    /// `[index] (kind) description -> destination`.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] ({}) {}", self.index, self.kind, self.desc)?;
        if !self.href.is_empty() {
            write!(f, " -> {}", self.href)?;
        }
        Ok(())
    }
}

/// Raw per-element payload produced by the scan script, before indices are
/// assigned on this side.
#[derive(Debug, Deserialize)]
struct RawEntry {
    kind: String,
    #[serde(default)]
    desc: String,
    #[serde(default)]
    href: String,
}

/// Parse the scan script's payload into a catalog.
///
/// The script returns either a JSON array (one object per stamped element,
/// in traversal order) or `{"error": ...}` when the scope selector matched
/// nothing.
pub(crate) fn parse_catalog(payload: Value) -> Result<Vec<Element>> {
    if let Some(err) = payload.get("error").and_then(Value::as_str) {
        return Err(WebtapError::Evaluation(err.to_string()));
    }
    let raw: Vec<RawEntry> = serde_json::from_value(payload)
        .map_err(|e| WebtapError::Evaluation(format!("bad scan payload: {e}")))?;
    Ok(raw
        .into_iter()
        .enumerate()
        .map(|(index, e)| Element {
            index,
            kind: e.kind,
            desc: e.desc,
            href: e.href,
        })
        .collect())
}

/// Render a catalog in the one-line-per-entry text format.
pub fn format_catalog(catalog: &[Element]) -> String {
    catalog
        .iter()
        .map(Element::to_string)
        .collect::<Vec<_>>()
        .join("\n")
}

impl Page {
    /// Scan the page and build a fresh numbered catalog of interactive
    /// elements, replacing any previous one (and its stamps).
    ///
    /// An empty catalog is a valid result, not an error. An unknown scope
    /// selector is an error — the caller asked to scope to something that
    /// is not there.
    pub async fn scan(&self, scope: Option<&str>) -> Result<Vec<Element>> {
        let payload = self.eval_json(&js::scan_js(scope)).await?;
        let catalog = parse_catalog(payload)?;
        log::debug!(
            "scanned {} interactive elements on target {}",
            catalog.len(),
            self.target_id
        );
        Ok(catalog)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parse_assigns_indices_in_order() {
        let payload = json!([
            {"kind": "link", "desc": "Home", "href": "https://example.com/"},
            {"kind": "button", "desc": "Sign In", "href": ""},
            {"kind": "input:text", "desc": "Search", "href": ""},
        ]);
        let catalog = parse_catalog(payload).unwrap();
        assert_eq!(catalog.len(), 3);
        assert_eq!(catalog[0].index, 0);
        assert_eq!(catalog[2].index, 2);
        assert_eq!(catalog[1].kind, "button");
    }

    #[test]
    fn parse_empty_catalog_is_ok() {
        let catalog = parse_catalog(json!([])).unwrap();
        assert!(catalog.is_empty());
    }

    #[test]
    fn parse_error_payload_fails() {
        let err = parse_catalog(json!({"error": "Selector not found: .nope"})).unwrap_err();
        assert!(err.to_string().contains(".nope"));
    }

    #[test]
    fn display_format_with_and_without_href() {
        let link = Element {
            index: 0,
            kind: "link".into(),
            desc: "Docs".into(),
            href: "https://example.com/docs".into(),
        };
        assert_eq!(link.to_string(), "[0] (link) Docs -> https://example.com/docs");

        let button = Element {
            index: 4,
            kind: "button".into(),
            desc: "Submit".into(),
            href: String::new(),
        };
        assert_eq!(button.to_string(), "[4] (button) Submit");
    }

    #[test]
    fn format_catalog_joins_lines() {
        let catalog = vec![
            Element {
                index: 0,
                kind: "button".into(),
                desc: "A".into(),
                href: String::new(),
            },
            Element {
                index: 1,
                kind: "button".into(),
                desc: "B".into(),
                href: String::new(),
            },
        ];
        assert_eq!(format_catalog(&catalog), "[0] (button) A\n[1] (button) B");
    }
}
