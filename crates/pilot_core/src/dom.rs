//! The DOM capability every piece of page logic is written against.
//!
//! Implementations own the page; callers only hold `NodeId`s, which stay
//! valid until the node is detached. Every method degrades to an empty
//! answer for unknown or detached nodes instead of failing.

use serde::{Deserialize, Serialize};

pub type NodeId = usize;

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Rect {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl Rect {
    pub fn new(x: f64, y: f64, width: f64, height: f64) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.width <= 0.0 || self.height <= 0.0
    }

    pub fn center(&self) -> (f64, f64) {
        (self.x + self.width / 2.0, self.y + self.height / 2.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventKind {
    MouseOver,
    MouseEnter,
    MouseDown,
    MouseUp,
    Click,
    Focus,
    Input,
    Change,
    KeyUp,
}

impl EventKind {
    pub fn name(self) -> &'static str {
        match self {
            EventKind::MouseOver => "mouseover",
            EventKind::MouseEnter => "mouseenter",
            EventKind::MouseDown => "mousedown",
            EventKind::MouseUp => "mouseup",
            EventKind::Click => "click",
            EventKind::Focus => "focus",
            EventKind::Input => "input",
            EventKind::Change => "change",
            EventKind::KeyUp => "keyup",
        }
    }
}

/// A synthetic event handed to [`Dom::dispatch`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DomEvent {
    pub kind: EventKind,
    pub client_x: f64,
    pub client_y: f64,
    pub bubbles: bool,
}

impl DomEvent {
    pub fn plain(kind: EventKind) -> Self {
        Self {
            kind,
            client_x: 0.0,
            client_y: 0.0,
            bubbles: true,
        }
    }

    pub fn mouse(kind: EventKind, (client_x, client_y): (f64, f64)) -> Self {
        Self {
            kind,
            client_x,
            client_y,
            // mouseenter is the one mouse event that does not bubble
            bubbles: kind != EventKind::MouseEnter,
        }
    }
}

/// Query and mutation surface of a page.
pub trait Dom {
    /// All elements matching a CSS selector in document order. Invalid
    /// selectors match nothing.
    fn query_selector_all(&self, selector: &str) -> Vec<NodeId>;

    fn query_selector(&self, selector: &str) -> Option<NodeId> {
        self.query_selector_all(selector).into_iter().next()
    }

    /// True when the element is attached, has a non-empty box and neither it
    /// nor an ancestor is `display:none`, `visibility:hidden` or `opacity:0`.
    fn is_visible(&self, node: NodeId) -> bool;

    fn bounding_rect(&self, node: NodeId) -> Rect;

    /// Lowercase tag name; empty for unknown nodes.
    fn tag_name(&self, node: NodeId) -> String;

    fn attribute(&self, node: NodeId, name: &str) -> Option<String>;

    /// Attribute names in source order.
    fn attribute_names(&self, node: NodeId) -> Vec<String>;

    fn set_attribute(&mut self, node: NodeId, name: &str, value: &str);

    fn remove_attribute(&mut self, node: NodeId, name: &str);

    fn parent(&self, node: NodeId) -> Option<NodeId>;

    /// Rendered text: text of visible descendants only.
    fn inner_text(&self, node: NodeId) -> String;

    fn inner_html(&self, node: NodeId) -> String;

    fn outer_html(&self, node: NodeId) -> String;

    fn set_inner_html(&mut self, node: NodeId, html: &str);

    /// Current `value` property of a form control.
    fn value(&self, node: NodeId) -> Option<String>;

    /// Sets the `value` property through the native setter, bypassing
    /// anything the host page wrapped around it.
    fn set_value_native(&mut self, node: NodeId, value: &str);

    fn is_content_editable(&self, node: NodeId) -> bool;

    fn focus(&mut self, node: NodeId);

    fn focused(&self) -> Option<NodeId>;

    fn dispatch(&mut self, node: NodeId, event: DomEvent);

    /// The element's own `click()`.
    fn native_click(&mut self, node: NodeId);

    /// `execCommand("insertHTML")` at the caret of the focused element.
    fn exec_insert_html(&mut self, html: &str) -> bool;

    /// `execCommand("insertText")` at the caret of the focused element.
    fn exec_insert_text(&mut self, text: &str) -> bool;

    fn scroll_into_view(&mut self, node: NodeId);

    fn scroll_by(&mut self, dx: f64, dy: f64);

    fn scroll_position(&self) -> (f64, f64);

    fn location(&self) -> String;

    fn title(&self) -> String;

    fn body(&self) -> Option<NodeId> {
        self.query_selector("body")
    }

    fn viewport(&self) -> (f64, f64);
}

/// Nearest element, starting at `node`, that behaves as a button.
pub fn closest_button(dom: &dyn Dom, node: NodeId) -> Option<NodeId> {
    let mut current = Some(node);
    while let Some(id) = current {
        let tag = dom.tag_name(id);
        let role = dom.attribute(id, "role");
        let input_type = dom.attribute(id, "type").unwrap_or_default();
        if tag == "button"
            || role.as_deref() == Some("button")
            || (tag == "input" && matches!(input_type.as_str(), "button" | "submit"))
        {
            return Some(id);
        }
        current = dom.parent(id);
    }
    None
}

/// Whether the element is a native text form control.
pub fn is_form_control(dom: &dyn Dom, node: NodeId) -> bool {
    matches!(dom.tag_name(node).as_str(), "input" | "textarea")
}
