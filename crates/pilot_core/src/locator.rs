//! Element location and synthetic interaction.
//!
//! Selector tables are data: each entry is a CSS selector, optionally
//! followed by a `:contains("text")` filter on the rendered text.

use std::collections::HashSet;
use std::sync::OnceLock;

use regex::Regex;

use crate::dom::{Dom, DomEvent, EventKind, NodeId};

/// Tags scanned by [`find_by_text`].
pub const TEXT_SEARCH_TAGS: &[&str] = &[
    "button", "a", "span", "div", "label", "p", "li", "h1", "h2", "h3", "h4", "h5", "h6",
];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SelectorSpec {
    pub css: String,
    pub contains: Option<String>,
}

impl SelectorSpec {
    pub fn parse(raw: &str) -> Self {
        let raw = raw.trim();
        if let Some(caps) = contains_pattern().and_then(|re| re.captures(raw)) {
            let css = caps.get(1).map_or("", |m| m.as_str()).trim();
            let text = caps
                .get(2)
                .or_else(|| caps.get(3))
                .map_or("", |m| m.as_str());
            return Self {
                css: if css.is_empty() { "*".to_string() } else { css.to_string() },
                contains: Some(text.to_string()),
            };
        }
        Self {
            css: raw.to_string(),
            contains: None,
        }
    }

    /// Matching elements, visible or not.
    pub fn matches(&self, dom: &dyn Dom) -> Vec<NodeId> {
        let candidates = dom.query_selector_all(&self.css);
        match &self.contains {
            None => candidates,
            Some(text) => candidates
                .into_iter()
                .filter(|&node| dom.inner_text(node).contains(text.as_str()))
                .collect(),
        }
    }
}

fn contains_pattern() -> Option<&'static Regex> {
    static PATTERN: OnceLock<Option<Regex>> = OnceLock::new();
    PATTERN
        .get_or_init(|| Regex::new(r#"^(.*?):contains\((?:"([^"]*)"|'([^']*)')\)$"#).ok())
        .as_ref()
}

/// First visible element matched by the selectors, tried in order.
pub fn find_element<S: AsRef<str>>(dom: &dyn Dom, selectors: &[S]) -> Option<NodeId> {
    selectors.iter().find_map(|selector| {
        SelectorSpec::parse(selector.as_ref())
            .matches(dom)
            .into_iter()
            .find(|&node| dom.is_visible(node))
    })
}

/// Every visible element matched by any selector, without duplicates.
pub fn find_all<S: AsRef<str>>(dom: &dyn Dom, selectors: &[S]) -> Vec<NodeId> {
    let mut seen = HashSet::new();
    let mut found = Vec::new();
    for selector in selectors {
        for node in SelectorSpec::parse(selector.as_ref()).matches(dom) {
            if dom.is_visible(node) && seen.insert(node) {
                found.push(node);
            }
        }
    }
    found
}

/// Visible elements of the whitelisted tags whose trimmed text equals (or,
/// when `exact` is false, contains) `text`.
pub fn find_by_text(dom: &dyn Dom, text: &str, exact: bool) -> Vec<NodeId> {
    let needle = text.trim();
    if needle.is_empty() {
        return Vec::new();
    }
    let mut seen = HashSet::new();
    let mut found = Vec::new();
    for tag in TEXT_SEARCH_TAGS {
        for node in dom.query_selector_all(tag) {
            if !dom.is_visible(node) || seen.contains(&node) {
                continue;
            }
            let rendered = dom.inner_text(node);
            let rendered = rendered.trim();
            let hit = if exact {
                rendered == needle
            } else {
                rendered.contains(needle)
            };
            if hit {
                seen.insert(node);
                found.push(node);
            }
        }
    }
    found
}

/// Full pointer sequence at the element's center followed by the native
/// click. Returns false when the element is gone.
pub fn simulate_click(dom: &mut dyn Dom, node: NodeId) -> bool {
    if dom.tag_name(node).is_empty() {
        return false;
    }
    dom.scroll_into_view(node);
    let center = dom.bounding_rect(node).center();
    for kind in [
        EventKind::MouseOver,
        EventKind::MouseEnter,
        EventKind::MouseDown,
        EventKind::MouseUp,
        EventKind::Click,
    ] {
        dom.dispatch(node, DomEvent::mouse(kind, center));
    }
    dom.native_click(node);
    true
}

/// Sets a form control's value the way the host page's own change detection
/// expects: focus, native setter, then input/change/keyup.
pub fn simulate_input(dom: &mut dyn Dom, node: NodeId, value: &str) -> bool {
    if dom.tag_name(node).is_empty() {
        return false;
    }
    dom.focus(node);
    dom.set_value_native(node, value);
    for kind in [EventKind::Input, EventKind::Change, EventKind::KeyUp] {
        dom.dispatch(node, DomEvent::plain(kind));
    }
    true
}

#[cfg(test)]
mod tests {
    use super::SelectorSpec;

    #[test]
    fn contains_form_is_split_into_css_and_text() {
        let parsed = SelectorSpec::parse(r#"button.primary:contains("发布")"#);
        assert_eq!(parsed.css, "button.primary");
        assert_eq!(parsed.contains.as_deref(), Some("发布"));
    }

    #[test]
    fn bare_contains_matches_any_element() {
        let parsed = SelectorSpec::parse(":contains('Publish')");
        assert_eq!(parsed.css, "*");
        assert_eq!(parsed.contains.as_deref(), Some("Publish"));
    }

    #[test]
    fn plain_selectors_pass_through() {
        let parsed = SelectorSpec::parse("  div[contenteditable=\"true\"] ");
        assert_eq!(parsed.css, "div[contenteditable=\"true\"]");
        assert_eq!(parsed.contains, None);
    }
}
