//! In-memory page model behind the `Dom` capability.
//!
//! Markup is parsed with `scraper` into an arena of nodes so node ids stay
//! stable while the page is edited. Selector queries mirror the arena into a
//! `scraper` tree of the same shape, run the selector there and map the
//! matches back by id. Layout is approximated from inline styles only.

use std::collections::HashMap;

use ego_tree::Tree;
use pilot_core::{Dom, DomEvent, EventKind, MutationBatch, NodeId, Rect};
use pilot_logging::pilot_debug;
use scraper::{ElementRef, Html, Selector};

const NODE_ID_ATTR: &str = "data-pilot-node";
const DOCUMENT: NodeId = 0;
const DEFAULT_WIDTH: f64 = 100.0;
const DEFAULT_HEIGHT: f64 = 20.0;
const DEFAULT_VIEWPORT: (f64, f64) = (1280.0, 800.0);

const VOID_TAGS: &[&str] = &[
    "area", "base", "br", "col", "embed", "hr", "img", "input", "link", "meta", "source", "track",
    "wbr",
];
const RAW_TEXT_TAGS: &[&str] = &["script", "style"];
const NON_RENDERED_TAGS: &[&str] = &[
    "head", "script", "style", "template", "meta", "link", "title", "noscript",
];
const BLOCK_TAGS: &[&str] = &[
    "address", "article", "aside", "blockquote", "div", "dl", "dt", "dd", "fieldset", "figure",
    "footer", "form", "h1", "h2", "h3", "h4", "h5", "h6", "header", "hr", "li", "main", "nav",
    "ol", "p", "pre", "section", "table", "tr", "ul",
];

#[derive(Debug, Clone, PartialEq)]
enum NodeData {
    Document,
    Element {
        tag: String,
        attrs: Vec<(String, String)>,
    },
    Text(String),
    Comment(String),
}

#[derive(Debug, Clone, PartialEq)]
struct Node {
    data: NodeData,
    parent: Option<NodeId>,
    children: Vec<NodeId>,
    /// Live `value` property once something wrote it.
    value: Option<String>,
}

/// An event the page saw, in dispatch order.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PageEvent {
    pub node: NodeId,
    pub kind: EventKind,
    pub client_x: f64,
    pub client_y: f64,
}

#[derive(Debug, Clone)]
pub struct PageDom {
    nodes: Vec<Node>,
    location: String,
    focused: Option<NodeId>,
    scroll: (f64, f64),
    viewport: (f64, f64),
    events: Vec<PageEvent>,
    clicks: Vec<NodeId>,
    pending_mutations: MutationBatch,
}

impl PageDom {
    pub fn parse(html: &str, location: impl Into<String>) -> Self {
        let mut page = Self {
            nodes: vec![Node {
                data: NodeData::Document,
                parent: None,
                children: Vec::new(),
                value: None,
            }],
            location: location.into(),
            focused: None,
            scroll: (0.0, 0.0),
            viewport: DEFAULT_VIEWPORT,
            events: Vec::new(),
            clicks: Vec::new(),
            pending_mutations: MutationBatch::default(),
        };
        let document = Html::parse_document(html);
        for child in document.tree.root().children() {
            page.import(child, DOCUMENT);
        }
        page
    }

    pub fn set_location(&mut self, location: impl Into<String>) {
        self.location = location.into();
    }

    pub fn set_viewport(&mut self, width: f64, height: f64) {
        self.viewport = (width, height);
    }

    /// Appends markup to the end of `parent`, the way a page script would.
    /// Returns the ids of the new top-level nodes.
    pub fn append_html(&mut self, parent: NodeId, html: &str) -> Vec<NodeId> {
        if !self.is_element(parent) {
            return Vec::new();
        }
        let added = self.import_fragment(parent, html);
        self.record(added.len());
        added
    }

    /// Whole document as markup.
    pub fn html(&self) -> String {
        let mut out = String::new();
        for &child in &self.nodes[DOCUMENT].children {
            self.serialize(child, &mut out, false);
        }
        out
    }

    pub fn events(&self) -> &[PageEvent] {
        &self.events
    }

    /// Nodes that received a click since the last call.
    pub fn take_clicks(&mut self) -> Vec<NodeId> {
        std::mem::take(&mut self.clicks)
    }

    /// Mutations since the last call, or `None` when nothing changed.
    pub fn take_mutations(&mut self) -> Option<MutationBatch> {
        let batch = std::mem::take(&mut self.pending_mutations);
        (batch.records > 0).then_some(batch)
    }

    fn import(
        &mut self,
        source: ego_tree::NodeRef<'_, scraper::Node>,
        parent: NodeId,
    ) -> Option<NodeId> {
        let data = match source.value() {
            scraper::Node::Element(element) => NodeData::Element {
                tag: element.name().to_ascii_lowercase(),
                attrs: element
                    .attrs()
                    .map(|(name, value)| (name.to_string(), value.to_string()))
                    .collect(),
            },
            scraper::Node::Text(text) => {
                let content: &str = text;
                NodeData::Text(content.to_string())
            }
            scraper::Node::Comment(comment) => {
                let content: &str = comment;
                NodeData::Comment(content.to_string())
            }
            _ => return None,
        };
        let id = self.nodes.len();
        self.nodes.push(Node {
            data,
            parent: Some(parent),
            children: Vec::new(),
            value: None,
        });
        self.nodes[parent].children.push(id);
        for child in source.children() {
            self.import(child, id);
        }
        Some(id)
    }

    fn import_fragment(&mut self, parent: NodeId, html: &str) -> Vec<NodeId> {
        let fragment = Html::parse_fragment(html);
        let root = fragment.root_element();
        let children: Vec<_> = root.children().collect();
        children
            .into_iter()
            .filter_map(|child| self.import(child, parent))
            .collect()
    }

    /// `scraper` element values for every arena element, keyed by node id.
    /// They come from a parse of the annotated markup; only their tag and
    /// attributes are used, never the tree that parse built.
    fn scraper_elements(&self) -> HashMap<NodeId, scraper::Node> {
        let mut annotated = String::new();
        self.serialize(DOCUMENT, &mut annotated, true);
        let document = Html::parse_document(&annotated);
        document
            .root_element()
            .descendants()
            .filter_map(|node| {
                let id = node.value().as_element()?.attr(NODE_ID_ATTR)?.parse::<NodeId>().ok()?;
                Some((id, node.value().clone()))
            })
            .collect()
    }

    /// Rebuilds the arena's own shape as a `scraper` tree, so selectors see
    /// nesting the HTML parser would have rearranged. `order` receives
    /// `(arena id, tree id)` pairs in document order.
    fn mirror(
        &self,
        node: NodeId,
        parent: ego_tree::NodeId,
        elements: &HashMap<NodeId, scraper::Node>,
        tree: &mut Tree<scraper::Node>,
        order: &mut Vec<(NodeId, ego_tree::NodeId)>,
    ) {
        for &child in &self.nodes[node].children {
            let mut next = parent;
            if let (Some(value), Some(mut target)) = (elements.get(&child), tree.get_mut(parent)) {
                next = target.append(value.clone()).id();
                order.push((child, next));
            }
            self.mirror(child, next, elements, tree, order);
        }
    }

    fn element(&self, node: NodeId) -> Option<(&str, &[(String, String)])> {
        match self.nodes.get(node).map(|n| &n.data) {
            Some(NodeData::Element { tag, attrs }) => Some((tag.as_str(), attrs.as_slice())),
            _ => None,
        }
    }

    fn is_element(&self, node: NodeId) -> bool {
        self.element(node).is_some()
    }

    fn tag(&self, node: NodeId) -> &str {
        self.element(node).map_or("", |(tag, _)| tag)
    }

    fn attr(&self, node: NodeId, name: &str) -> Option<&str> {
        self.element(node).and_then(|(_, attrs)| {
            attrs
                .iter()
                .find(|(key, _)| key.eq_ignore_ascii_case(name))
                .map(|(_, value)| value.as_str())
        })
    }

    fn is_attached(&self, node: NodeId) -> bool {
        let mut current = node;
        loop {
            if current == DOCUMENT {
                return true;
            }
            match self.nodes.get(current).and_then(|n| n.parent) {
                Some(parent) => current = parent,
                None => return false,
            }
        }
    }

    fn style(&self, node: NodeId, property: &str) -> Option<String> {
        let style = self.attr(node, "style")?;
        style.split(';').rev().find_map(|declaration| {
            let (name, value) = declaration.split_once(':')?;
            name.trim()
                .eq_ignore_ascii_case(property)
                .then(|| {
                    value
                        .trim()
                        .trim_end_matches("!important")
                        .trim()
                        .to_ascii_lowercase()
                })
        })
    }

    fn style_px(&self, node: NodeId, property: &str) -> Option<f64> {
        let value = self.style(node, property)?;
        value.trim_end_matches("px").trim().parse().ok()
    }

    /// Hidden by its own markup, ignoring ancestors.
    fn hides_itself(&self, node: NodeId) -> bool {
        let tag = self.tag(node);
        NON_RENDERED_TAGS.contains(&tag)
            || self.attr(node, "hidden").is_some()
            || (tag == "input"
                && self
                    .attr(node, "type")
                    .is_some_and(|t| t.eq_ignore_ascii_case("hidden")))
            || self.style(node, "display").as_deref() == Some("none")
            || matches!(
                self.style(node, "visibility").as_deref(),
                Some("hidden" | "collapse")
            )
            || self
                .style(node, "opacity")
                .and_then(|o| o.parse::<f64>().ok())
                .is_some_and(|o| o <= 0.0)
    }

    fn is_rendered(&self, node: NodeId) -> bool {
        if !self.is_element(node) || !self.is_attached(node) {
            return false;
        }
        let mut current = Some(node);
        while let Some(id) = current {
            if id == DOCUMENT {
                break;
            }
            if self.is_element(id) && self.hides_itself(id) {
                return false;
            }
            current = self.nodes.get(id).and_then(|n| n.parent);
        }
        true
    }

    fn own_rect(&self, node: NodeId) -> Rect {
        Rect::new(
            self.style_px(node, "left").unwrap_or(0.0),
            self.style_px(node, "top").unwrap_or(0.0),
            self.style_px(node, "width").unwrap_or(DEFAULT_WIDTH),
            self.style_px(node, "height").unwrap_or(DEFAULT_HEIGHT),
        )
    }

    fn in_editable_text(&self, node: NodeId) -> bool {
        let mut current = self.nodes.get(node).and_then(|n| n.parent);
        while let Some(id) = current {
            if matches!(self.tag(id), "pre" | "textarea") || self.editable_flag(id) == Some(true) {
                return true;
            }
            current = self.nodes.get(id).and_then(|n| n.parent);
        }
        false
    }

    fn editable_flag(&self, node: NodeId) -> Option<bool> {
        let value = self.attr(node, "contenteditable")?;
        Some(!value.eq_ignore_ascii_case("false"))
    }

    fn collect_text(&self, node: NodeId, out: &mut String) {
        let Some(entry) = self.nodes.get(node) else {
            return;
        };
        match &entry.data {
            NodeData::Text(text) => {
                if self.in_editable_text(node) {
                    out.push_str(text);
                } else {
                    let collapsed = text.split_whitespace().collect::<Vec<_>>().join(" ");
                    if collapsed.is_empty() {
                        return;
                    }
                    let needs_gap = !out.is_empty() && !out.ends_with(' ') && !out.ends_with('\n');
                    if text.starts_with(char::is_whitespace) && needs_gap {
                        out.push(' ');
                    }
                    out.push_str(&collapsed);
                    if text.ends_with(char::is_whitespace) {
                        out.push(' ');
                    }
                }
            }
            NodeData::Element { tag, .. } => {
                if self.hides_itself(node) {
                    return;
                }
                if tag == "br" {
                    out.push('\n');
                    return;
                }
                let block = BLOCK_TAGS.contains(&tag.as_str());
                if block && !out.is_empty() && !out.ends_with('\n') {
                    push_line_break(out);
                }
                for &child in &entry.children {
                    self.collect_text(child, out);
                }
                if block && !out.is_empty() && !out.ends_with('\n') {
                    push_line_break(out);
                }
            }
            NodeData::Document | NodeData::Comment(_) => {}
        }
    }

    fn text_content(&self, node: NodeId) -> String {
        let Some(entry) = self.nodes.get(node) else {
            return String::new();
        };
        match &entry.data {
            NodeData::Text(text) => text.clone(),
            _ => entry
                .children
                .iter()
                .map(|&child| self.text_content(child))
                .collect(),
        }
    }

    fn serialize(&self, node: NodeId, out: &mut String, annotate: bool) {
        let Some(entry) = self.nodes.get(node) else {
            return;
        };
        match &entry.data {
            NodeData::Document => {
                for &child in &entry.children {
                    self.serialize(child, out, annotate);
                }
            }
            NodeData::Text(text) => {
                let raw = entry
                    .parent
                    .is_some_and(|p| RAW_TEXT_TAGS.contains(&self.tag(p)));
                if raw {
                    out.push_str(text);
                } else {
                    escape_into(text, false, out);
                }
            }
            NodeData::Comment(text) => {
                out.push_str("<!--");
                out.push_str(text);
                out.push_str("-->");
            }
            NodeData::Element { tag, attrs } => {
                out.push('<');
                out.push_str(tag);
                for (name, value) in attrs {
                    out.push(' ');
                    out.push_str(name);
                    out.push_str("=\"");
                    escape_into(value, true, out);
                    out.push('"');
                }
                if annotate {
                    out.push_str(&format!(" {NODE_ID_ATTR}=\"{node}\""));
                }
                out.push('>');
                if VOID_TAGS.contains(&tag.as_str()) {
                    return;
                }
                for &child in &entry.children {
                    self.serialize(child, out, annotate);
                }
                out.push_str("</");
                out.push_str(tag);
                out.push('>');
            }
        }
    }

    fn detach_children(&mut self, node: NodeId) -> usize {
        let children = std::mem::take(&mut self.nodes[node].children);
        for &child in &children {
            self.nodes[child].parent = None;
        }
        if self.focused.is_some_and(|f| !self.is_attached(f)) {
            self.focused = None;
        }
        children.len()
    }

    fn record(&mut self, added_nodes: usize) {
        self.pending_mutations.records += 1;
        self.pending_mutations.added_nodes += added_nodes;
    }

    /// The editing host for `execCommand`: the focused element if it is a
    /// form control or sits inside a contenteditable region.
    fn editing_target(&self) -> Option<NodeId> {
        let node = self.focused?;
        (self.is_form_control(node) || self.is_content_editable(node)).then_some(node)
    }

    fn is_form_control(&self, node: NodeId) -> bool {
        matches!(self.tag(node), "input" | "textarea")
    }
}

fn push_line_break(out: &mut String) {
    while out.ends_with(' ') {
        out.pop();
    }
    out.push('\n');
}

fn escape_into(text: &str, attribute: bool, out: &mut String) {
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' if !attribute => out.push_str("&lt;"),
            '>' if !attribute => out.push_str("&gt;"),
            '"' if attribute => out.push_str("&quot;"),
            '\u{a0}' => out.push_str("&nbsp;"),
            other => out.push(other),
        }
    }
}

impl Dom for PageDom {
    fn query_selector_all(&self, selector: &str) -> Vec<NodeId> {
        let parsed = match Selector::parse(selector) {
            Ok(parsed) => parsed,
            Err(err) => {
                pilot_debug!("invalid selector {:?}: {:?}", selector, err);
                return Vec::new();
            }
        };
        let elements = self.scraper_elements();
        let mut tree = Tree::new(scraper::Node::Document);
        let mut order = Vec::new();
        let root = tree.root().id();
        self.mirror(DOCUMENT, root, &elements, &mut tree, &mut order);
        order
            .into_iter()
            .filter(|&(_, mirrored)| {
                tree.get(mirrored)
                    .and_then(ElementRef::wrap)
                    .is_some_and(|element| parsed.matches(&element))
            })
            .map(|(node, _)| node)
            .collect()
    }

    fn is_visible(&self, node: NodeId) -> bool {
        self.is_rendered(node) && !self.own_rect(node).is_empty()
    }

    fn bounding_rect(&self, node: NodeId) -> Rect {
        if !self.is_rendered(node) {
            return Rect::default();
        }
        let rect = self.own_rect(node);
        Rect::new(rect.x - self.scroll.0, rect.y - self.scroll.1, rect.width, rect.height)
    }

    fn tag_name(&self, node: NodeId) -> String {
        self.tag(node).to_string()
    }

    fn attribute(&self, node: NodeId, name: &str) -> Option<String> {
        self.attr(node, name).map(str::to_string)
    }

    fn attribute_names(&self, node: NodeId) -> Vec<String> {
        self.element(node)
            .map(|(_, attrs)| attrs.iter().map(|(name, _)| name.clone()).collect())
            .unwrap_or_default()
    }

    fn set_attribute(&mut self, node: NodeId, name: &str, value: &str) {
        let Some(Node {
            data: NodeData::Element { attrs, .. },
            ..
        }) = self.nodes.get_mut(node)
        else {
            return;
        };
        let name = name.to_ascii_lowercase();
        match attrs.iter_mut().find(|(key, _)| *key == name) {
            Some((_, existing)) => *existing = value.to_string(),
            None => attrs.push((name, value.to_string())),
        }
        self.record(0);
    }

    fn remove_attribute(&mut self, node: NodeId, name: &str) {
        let Some(Node {
            data: NodeData::Element { attrs, .. },
            ..
        }) = self.nodes.get_mut(node)
        else {
            return;
        };
        let before = attrs.len();
        attrs.retain(|(key, _)| !key.eq_ignore_ascii_case(name));
        if attrs.len() != before {
            self.record(0);
        }
    }

    fn parent(&self, node: NodeId) -> Option<NodeId> {
        self.nodes
            .get(node)
            .and_then(|n| n.parent)
            .filter(|&p| self.is_element(p))
    }

    fn inner_text(&self, node: NodeId) -> String {
        if !self.is_rendered(node) {
            return String::new();
        }
        let mut out = String::new();
        if let Some(entry) = self.nodes.get(node) {
            for &child in &entry.children {
                self.collect_text(child, &mut out);
            }
        }
        if self.in_editable_text(node) || self.editable_flag(node) == Some(true) {
            out
        } else {
            out.trim().to_string()
        }
    }

    fn inner_html(&self, node: NodeId) -> String {
        let mut out = String::new();
        if let Some(entry) = self.nodes.get(node) {
            for &child in &entry.children {
                self.serialize(child, &mut out, false);
            }
        }
        out
    }

    fn outer_html(&self, node: NodeId) -> String {
        if !self.is_element(node) {
            return String::new();
        }
        let mut out = String::new();
        self.serialize(node, &mut out, false);
        out
    }

    fn set_inner_html(&mut self, node: NodeId, html: &str) {
        if !self.is_element(node) {
            return;
        }
        self.detach_children(node);
        let added = self.import_fragment(node, html);
        self.record(added.len());
    }

    fn value(&self, node: NodeId) -> Option<String> {
        let entry = self.nodes.get(node)?;
        match self.tag(node) {
            "input" | "select" => entry
                .value
                .clone()
                .or_else(|| Some(self.attr(node, "value").unwrap_or_default().to_string())),
            "textarea" => entry
                .value
                .clone()
                .or_else(|| Some(self.text_content(node))),
            _ => None,
        }
    }

    fn set_value_native(&mut self, node: NodeId, value: &str) {
        if matches!(self.tag(node), "input" | "textarea" | "select") {
            self.nodes[node].value = Some(value.to_string());
        }
    }

    fn is_content_editable(&self, node: NodeId) -> bool {
        let mut current = Some(node);
        while let Some(id) = current {
            if let Some(flag) = self.editable_flag(id) {
                return flag;
            }
            current = self.parent(id);
        }
        false
    }

    fn focus(&mut self, node: NodeId) {
        if !self.is_element(node) || !self.is_attached(node) {
            return;
        }
        self.focused = Some(node);
        self.events.push(PageEvent {
            node,
            kind: EventKind::Focus,
            client_x: 0.0,
            client_y: 0.0,
        });
    }

    fn focused(&self) -> Option<NodeId> {
        self.focused
    }

    fn dispatch(&mut self, node: NodeId, event: DomEvent) {
        if !self.is_element(node) {
            return;
        }
        if event.kind == EventKind::Click {
            self.clicks.push(node);
        }
        self.events.push(PageEvent {
            node,
            kind: event.kind,
            client_x: event.client_x,
            client_y: event.client_y,
        });
    }

    fn native_click(&mut self, node: NodeId) {
        let center = self.bounding_rect(node).center();
        self.dispatch(node, DomEvent::mouse(EventKind::Click, center));
    }

    fn exec_insert_html(&mut self, html: &str) -> bool {
        let Some(target) = self.editing_target() else {
            return false;
        };
        if self.is_form_control(target) {
            let fragment = Html::parse_fragment(html);
            let text: String = fragment.root_element().text().collect();
            return self.exec_insert_text(&text);
        }
        let added = self.import_fragment(target, html);
        self.record(added.len());
        true
    }

    fn exec_insert_text(&mut self, text: &str) -> bool {
        let Some(target) = self.editing_target() else {
            return false;
        };
        if self.is_form_control(target) {
            let mut value = self.value(target).unwrap_or_default();
            value.push_str(text);
            self.nodes[target].value = Some(value);
            return true;
        }
        let id = self.nodes.len();
        self.nodes.push(Node {
            data: NodeData::Text(text.to_string()),
            parent: Some(target),
            children: Vec::new(),
            value: None,
        });
        self.nodes[target].children.push(id);
        self.record(1);
        true
    }

    fn scroll_into_view(&mut self, node: NodeId) {
        if self.is_rendered(node) {
            let rect = self.own_rect(node);
            self.scroll = (self.scroll.0, rect.y.max(0.0));
        }
    }

    fn scroll_by(&mut self, dx: f64, dy: f64) {
        self.scroll = ((self.scroll.0 + dx).max(0.0), (self.scroll.1 + dy).max(0.0));
    }

    fn scroll_position(&self) -> (f64, f64) {
        self.scroll
    }

    fn location(&self) -> String {
        self.location.clone()
    }

    fn title(&self) -> String {
        self.nodes
            .iter()
            .enumerate()
            .find(|(id, _)| self.tag(*id) == "title" && self.is_attached(*id))
            .map(|(id, _)| self.text_content(id).trim().to_string())
            .unwrap_or_default()
    }

    fn body(&self) -> Option<NodeId> {
        self.nodes
            .iter()
            .enumerate()
            .map(|(id, _)| id)
            .find(|&id| self.tag(id) == "body" && self.is_attached(id))
    }

    fn viewport(&self) -> (f64, f64) {
        self.viewport
    }
}
