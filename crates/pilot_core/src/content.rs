//! Editor emptiness, markdown detection and native insertion.

use crate::dom::{is_form_control, Dom, NodeId};
use crate::payload::PublishPayload;

/// Literal placeholder texts target editors render inside empty fields.
pub const PLACEHOLDER_TEXTS: &[&str] = &[
    "请输入标题",
    "请输入文章标题",
    "请输入正文",
    "从这里开始写正文",
    "请在这里输入标题",
    "标题",
    "Title",
    "Enter a title",
    "Start writing...",
    "Write something...",
];

/// Rendered text of an editor, or the value of a form control.
pub fn editor_text(dom: &dyn Dom, node: NodeId) -> String {
    if is_form_control(dom, node) {
        dom.value(node).unwrap_or_default()
    } else {
        dom.inner_text(node)
    }
}

pub fn is_placeholder(text: &str) -> bool {
    let trimmed = text.trim();
    PLACEHOLDER_TEXTS.iter().any(|p| *p == trimmed)
}

pub fn is_editor_empty(dom: &dyn Dom, node: NodeId) -> bool {
    let text = editor_text(dom, node);
    text.trim().is_empty() || is_placeholder(&text)
}

/// Whether `text` carries markdown syntax a rich editor would show literally.
pub fn looks_like_markdown(text: &str) -> bool {
    if text.contains("##") || text.contains("**") || text.contains("```") {
        return true;
    }
    text.lines().any(|line| {
        let line = line.trim_start();
        line.starts_with("- ")
            || line.starts_with("* ")
            || line.starts_with("+ ")
            || line.starts_with('>')
            || ordered_list_marker(line)
    })
}

fn ordered_list_marker(line: &str) -> bool {
    let digits = line.chars().take_while(char::is_ascii_digit).count();
    digits > 0 && line[digits..].starts_with(". ")
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Insertion {
    Html(String),
    Text(String),
}

/// Markdown bodies go in verbatim as plain text, even when rendered HTML
/// exists. Prose takes the rendered HTML when the payload carries it and
/// plain text otherwise; the editor's text equals `content` either way.
pub fn choose_insertion(payload: &PublishPayload) -> Insertion {
    if looks_like_markdown(&payload.content) {
        return Insertion::Text(payload.content.clone());
    }
    match payload.html_content.as_deref() {
        Some(html) if !html.trim().is_empty() => Insertion::Html(html.to_string()),
        _ => Insertion::Text(payload.content.clone()),
    }
}

/// Clears a literal placeholder so insertion does not append to it.
fn clear_placeholder(dom: &mut dyn Dom, node: NodeId) {
    if !is_form_control(dom, node) && is_placeholder(&dom.inner_text(node)) {
        dom.set_inner_html(node, "");
    }
}

pub fn insert_html(dom: &mut dyn Dom, node: NodeId, html: &str) -> bool {
    dom.focus(node);
    dom.exec_insert_html(html)
}

pub fn insert_text(dom: &mut dyn Dom, node: NodeId, text: &str) -> bool {
    dom.focus(node);
    dom.exec_insert_text(text)
}

/// Fills the body editor when it is empty. Returns whether the editor changed.
pub fn fill_content(dom: &mut dyn Dom, editor: NodeId, payload: &PublishPayload) -> bool {
    if !is_editor_empty(dom, editor) {
        return false;
    }
    clear_placeholder(dom, editor);
    match choose_insertion(payload) {
        Insertion::Html(html) => insert_html(dom, editor, &html),
        Insertion::Text(text) => insert_text(dom, editor, &text),
    }
}

/// Fills the title field when it is empty. Form controls go through the
/// native value setter, rich fields through text insertion.
pub fn fill_title(dom: &mut dyn Dom, field: NodeId, title: &str) -> bool {
    if !is_editor_empty(dom, field) {
        return false;
    }
    if is_form_control(dom, field) {
        return crate::locator::simulate_input(dom, field, title);
    }
    clear_placeholder(dom, field);
    insert_text(dom, field, title)
}
