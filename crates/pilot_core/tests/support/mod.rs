#![allow(dead_code)]

use std::sync::Once;

use pilot_core::{Dom, DomEvent, EventKind, NodeId, Rect};

pub fn init_logging() {
    static INIT: Once = Once::new();
    INIT.call_once(pilot_logging::initialize_for_tests);
}

/// A hand-built page. Nodes answer to their tag name and to whatever extra
/// selector strings the test gives them; no CSS engine involved.
#[derive(Debug, Clone)]
pub struct FakeNode {
    pub tag: String,
    pub attrs: Vec<(String, String)>,
    pub text: String,
    pub html: String,
    pub value: Option<String>,
    pub selectors: Vec<String>,
    pub visible: bool,
    pub editable: bool,
    pub parent: Option<NodeId>,
}

impl FakeNode {
    pub fn new(tag: &str) -> Self {
        let value = matches!(tag, "input" | "textarea").then(String::new);
        Self {
            tag: tag.to_string(),
            attrs: Vec::new(),
            text: String::new(),
            html: String::new(),
            value,
            selectors: Vec::new(),
            visible: true,
            editable: false,
            parent: None,
        }
    }

    pub fn answers(mut self, selector: &str) -> Self {
        self.selectors.push(selector.to_string());
        self
    }

    pub fn attr(mut self, name: &str, value: &str) -> Self {
        self.attrs.push((name.to_string(), value.to_string()));
        self
    }

    pub fn text(mut self, text: &str) -> Self {
        self.text = text.to_string();
        self.html = text.to_string();
        self
    }

    pub fn value(mut self, value: &str) -> Self {
        self.value = Some(value.to_string());
        self
    }

    pub fn editable(mut self) -> Self {
        self.editable = true;
        self
    }

    pub fn hidden(mut self) -> Self {
        self.visible = false;
        self
    }
}

#[derive(Debug, Clone)]
pub struct FakeDom {
    pub nodes: Vec<FakeNode>,
    pub location: String,
    pub title: String,
    pub focused: Option<NodeId>,
    pub events: Vec<(NodeId, EventKind)>,
    pub native_clicks: Vec<NodeId>,
    pub inserted_html: Vec<String>,
    pub inserted_text: Vec<String>,
    pub scroll: (f64, f64),
    /// Bumped by every mutating call.
    pub writes: usize,
}

impl FakeDom {
    pub fn new(location: &str) -> Self {
        let mut dom = Self {
            nodes: Vec::new(),
            location: location.to_string(),
            title: String::new(),
            focused: None,
            events: Vec::new(),
            native_clicks: Vec::new(),
            inserted_html: Vec::new(),
            inserted_text: Vec::new(),
            scroll: (0.0, 0.0),
            writes: 0,
        };
        dom.nodes.push(FakeNode::new("body"));
        dom
    }

    pub fn body_id(&self) -> NodeId {
        0
    }

    pub fn add(&mut self, parent: NodeId, mut node: FakeNode) -> NodeId {
        node.parent = Some(parent);
        self.nodes.push(node);
        self.nodes.len() - 1
    }

    pub fn text_of(&self, node: NodeId) -> &str {
        &self.nodes[node].text
    }

    fn get(&self, node: NodeId) -> Option<&FakeNode> {
        self.nodes.get(node)
    }

    fn answers(&self, node: &FakeNode, selector: &str) -> bool {
        let selector = selector.trim();
        selector == "*"
            || selector == node.tag
            || node.selectors.iter().any(|s| s == selector)
            || (selector == "a[href]" && node.tag == "a" && attr(node, "href").is_some())
            || (selector == "[contenteditable]" && node.editable)
    }

    fn children(&self, node: NodeId) -> impl Iterator<Item = NodeId> + '_ {
        self.nodes
            .iter()
            .enumerate()
            .filter(move |(_, n)| n.parent == Some(node))
            .map(|(id, _)| id)
    }
}

fn attr(node: &FakeNode, name: &str) -> Option<String> {
    node.attrs
        .iter()
        .find(|(n, _)| n == name)
        .map(|(_, v)| v.clone())
}

fn strip_tags(html: &str) -> String {
    let mut out = String::new();
    let mut in_tag = false;
    for c in html.chars() {
        match c {
            '<' => in_tag = true,
            '>' => in_tag = false,
            c if !in_tag => out.push(c),
            _ => {}
        }
    }
    out
}

impl Dom for FakeDom {
    fn query_selector_all(&self, selector: &str) -> Vec<NodeId> {
        self.nodes
            .iter()
            .enumerate()
            .filter(|(_, node)| selector.split(',').any(|part| self.answers(node, part)))
            .map(|(id, _)| id)
            .collect()
    }

    fn is_visible(&self, node: NodeId) -> bool {
        let mut current = Some(node);
        while let Some(id) = current {
            match self.get(id) {
                Some(n) if n.visible => current = n.parent,
                _ => return false,
            }
        }
        true
    }

    fn bounding_rect(&self, node: NodeId) -> Rect {
        if self.is_visible(node) {
            Rect::new(10.0, 20.0 * node as f64, 100.0, 20.0)
        } else {
            Rect::default()
        }
    }

    fn tag_name(&self, node: NodeId) -> String {
        self.get(node).map(|n| n.tag.clone()).unwrap_or_default()
    }

    fn attribute(&self, node: NodeId, name: &str) -> Option<String> {
        self.get(node).and_then(|n| attr(n, name))
    }

    fn attribute_names(&self, node: NodeId) -> Vec<String> {
        self.get(node)
            .map(|n| n.attrs.iter().map(|(name, _)| name.clone()).collect())
            .unwrap_or_default()
    }

    fn set_attribute(&mut self, node: NodeId, name: &str, value: &str) {
        self.writes += 1;
        if let Some(n) = self.nodes.get_mut(node) {
            n.attrs.retain(|(k, _)| k != name);
            n.attrs.push((name.to_string(), value.to_string()));
        }
    }

    fn remove_attribute(&mut self, node: NodeId, name: &str) {
        self.writes += 1;
        if let Some(n) = self.nodes.get_mut(node) {
            n.attrs.retain(|(k, _)| k != name);
        }
    }

    fn parent(&self, node: NodeId) -> Option<NodeId> {
        self.get(node).and_then(|n| n.parent)
    }

    fn inner_text(&self, node: NodeId) -> String {
        if !self.is_visible(node) {
            return String::new();
        }
        let mut text = self.nodes[node].text.clone();
        for child in self.children(node).collect::<Vec<_>>() {
            let child_text = self.inner_text(child);
            if !child_text.is_empty() {
                if !text.is_empty() {
                    text.push('\n');
                }
                text.push_str(&child_text);
            }
        }
        text
    }

    fn inner_html(&self, node: NodeId) -> String {
        self.get(node).map(|n| n.html.clone()).unwrap_or_default()
    }

    fn outer_html(&self, node: NodeId) -> String {
        self.get(node)
            .map(|n| format!("<{0}>{1}</{0}>", n.tag, n.html))
            .unwrap_or_default()
    }

    fn set_inner_html(&mut self, node: NodeId, html: &str) {
        self.writes += 1;
        if let Some(n) = self.nodes.get_mut(node) {
            n.html = html.to_string();
            n.text = strip_tags(html);
        }
    }

    fn value(&self, node: NodeId) -> Option<String> {
        self.get(node).and_then(|n| n.value.clone())
    }

    fn set_value_native(&mut self, node: NodeId, value: &str) {
        self.writes += 1;
        if let Some(n) = self.nodes.get_mut(node) {
            n.value = Some(value.to_string());
        }
    }

    fn is_content_editable(&self, node: NodeId) -> bool {
        self.get(node).is_some_and(|n| n.editable)
    }

    fn focus(&mut self, node: NodeId) {
        if node < self.nodes.len() {
            self.focused = Some(node);
            self.events.push((node, EventKind::Focus));
        }
    }

    fn focused(&self) -> Option<NodeId> {
        self.focused
    }

    fn dispatch(&mut self, node: NodeId, event: DomEvent) {
        self.events.push((node, event.kind));
    }

    fn native_click(&mut self, node: NodeId) {
        self.native_clicks.push(node);
    }

    fn exec_insert_html(&mut self, html: &str) -> bool {
        let Some(node) = self.focused else {
            return false;
        };
        self.writes += 1;
        self.inserted_html.push(html.to_string());
        let n = &mut self.nodes[node];
        n.html.push_str(html);
        n.text.push_str(&strip_tags(html));
        true
    }

    fn exec_insert_text(&mut self, text: &str) -> bool {
        let Some(node) = self.focused else {
            return false;
        };
        self.writes += 1;
        self.inserted_text.push(text.to_string());
        let n = &mut self.nodes[node];
        n.html.push_str(text);
        n.text.push_str(text);
        true
    }

    fn scroll_into_view(&mut self, node: NodeId) {
        self.scroll.1 = self.bounding_rect(node).y;
    }

    fn scroll_by(&mut self, dx: f64, dy: f64) {
        self.scroll.0 += dx;
        self.scroll.1 += dy;
    }

    fn scroll_position(&self) -> (f64, f64) {
        self.scroll
    }

    fn location(&self) -> String {
        self.location.clone()
    }

    fn title(&self) -> String {
        self.title.clone()
    }

    fn viewport(&self) -> (f64, f64) {
        (1280.0, 800.0)
    }
}

/// Zhihu writer page with an empty title textarea and draft editor.
pub fn zhihu_editor() -> (FakeDom, NodeId, NodeId) {
    let mut dom = FakeDom::new("https://zhuanlan.zhihu.com/write");
    let body = dom.body_id();
    let title = dom.add(
        body,
        FakeNode::new("textarea").answers("textarea.WriteIndex-titleInput"),
    );
    let editor = dom.add(
        body,
        FakeNode::new("div")
            .answers(".public-DraftEditor-content")
            .editable(),
    );
    (dom, title, editor)
}
