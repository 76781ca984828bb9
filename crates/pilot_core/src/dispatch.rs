//! Fixed table of debug commands a page agent will execute.
//!
//! Every handler reads its arguments from the command's JSON `data` and
//! answers with a JSON value. Anything that needs to wait (a sleep, removing
//! a highlight) is handed back as a [`Deferred`] so the caller owns the timer.

use std::time::Duration;

use serde_json::{json, Map, Value};
use thiserror::Error;

use crate::content::{editor_text, insert_text};
use crate::debug::CommandKind;
use crate::dom::{is_form_control, Dom, NodeId};
use crate::eval::evaluate;
use crate::locator::{find_by_text, simulate_click, simulate_input, SelectorSpec};
use crate::platform;

pub const DEFAULT_QUERY_LIMIT: usize = 20;
pub const MAX_SLEEP_MS: u64 = 30_000;
pub const DEFAULT_HIGHLIGHT_MS: u64 = 2_000;
pub const MAX_HTML_CHARS: usize = 100_000;
const SUMMARY_TEXT_CHARS: usize = 120;
const HIGHLIGHT_STYLE: &str = "outline: 3px solid #ff3b30; outline-offset: 2px;";
const INPUT_SELECTOR: &str = "input, textarea, select, [contenteditable]";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DebugExecError {
    #[error("missing field `{0}`")]
    MissingField(&'static str),
    #[error("no element matches {0}")]
    NotFound(String),
    #[error("invalid data: {0}")]
    InvalidData(String),
    #[error("evaluation failed: {0}")]
    Evaluation(String),
}

/// Work the caller must finish after the handler returned.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Deferred {
    Sleep(Duration),
    ClearHighlight {
        node: NodeId,
        after: Duration,
        previous_style: Option<String>,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct CommandOutput {
    pub value: Value,
    pub deferred: Option<Deferred>,
}

impl CommandOutput {
    fn now(value: Value) -> Self {
        Self {
            value,
            deferred: None,
        }
    }
}

/// Runs one command against the page.
pub fn execute(
    dom: &mut dyn Dom,
    kind: CommandKind,
    data: &Value,
) -> Result<CommandOutput, DebugExecError> {
    match kind {
        CommandKind::Query => query(dom, data).map(CommandOutput::now),
        CommandKind::GetHtml => get_html(dom, data).map(CommandOutput::now),
        CommandKind::SetHtml => set_html(dom, data).map(CommandOutput::now),
        CommandKind::Click => click(dom, data).map(CommandOutput::now),
        CommandKind::SetValue => set_value(dom, data).map(CommandOutput::now),
        CommandKind::Evaluate => {
            let expression = opt_str(data, "expression")
                .or_else(|| opt_str(data, "code"))
                .ok_or(DebugExecError::MissingField("expression"))?;
            let result = evaluate(&*dom, expression).map_err(DebugExecError::Evaluation)?;
            Ok(CommandOutput::now(json!({ "result": result })))
        }
        CommandKind::ListInputs => Ok(CommandOutput::now(list_inputs(&*dom))),
        CommandKind::DescribeElement => {
            let node = first_match(&*dom, str_field(data, "selector")?)?;
            Ok(CommandOutput::now(describe(&*dom, node)))
        }
        CommandKind::Scroll => scroll(dom, data).map(CommandOutput::now),
        CommandKind::Sleep => {
            let ms = opt_u64(data, "ms")
                .or_else(|| opt_u64(data, "duration"))
                .ok_or(DebugExecError::MissingField("ms"))?
                .min(MAX_SLEEP_MS);
            Ok(CommandOutput {
                value: json!({ "slept": ms }),
                deferred: Some(Deferred::Sleep(Duration::from_millis(ms))),
            })
        }
        CommandKind::PageInfo => Ok(CommandOutput::now(page_info(&*dom))),
        CommandKind::FindByText => {
            let text = str_field(data, "text")?;
            let exact = data.get("exact").and_then(Value::as_bool).unwrap_or(false);
            let nodes = find_by_text(&*dom, text, exact);
            Ok(CommandOutput::now(summaries(&*dom, &nodes, DEFAULT_QUERY_LIMIT)))
        }
        CommandKind::Highlight => highlight(dom, data),
    }
}

/// Puts back the style a highlight replaced.
pub fn clear_highlight(dom: &mut dyn Dom, node: NodeId, previous_style: Option<&str>) {
    match previous_style {
        Some(style) => dom.set_attribute(node, "style", style),
        None => dom.remove_attribute(node, "style"),
    }
}

fn query(dom: &dyn Dom, data: &Value) -> Result<Value, DebugExecError> {
    let selector = str_field(data, "selector")?;
    let limit = opt_u64(data, "limit")
        .and_then(|n| usize::try_from(n).ok())
        .unwrap_or(DEFAULT_QUERY_LIMIT);
    let nodes = SelectorSpec::parse(selector).matches(dom);
    Ok(summaries(dom, &nodes, limit))
}

fn get_html(dom: &dyn Dom, data: &Value) -> Result<Value, DebugExecError> {
    let node = match opt_str(data, "selector") {
        Some(selector) => first_match(dom, selector)?,
        None => dom
            .body()
            .ok_or_else(|| DebugExecError::NotFound("body".to_string()))?,
    };
    let outer = data.get("outer").and_then(Value::as_bool).unwrap_or(false);
    let html = if outer {
        dom.outer_html(node)
    } else {
        dom.inner_html(node)
    };
    let total = html.chars().count();
    Ok(json!({
        "html": truncate(&html, MAX_HTML_CHARS),
        "length": total,
        "truncated": total > MAX_HTML_CHARS,
    }))
}

fn set_html(dom: &mut dyn Dom, data: &Value) -> Result<Value, DebugExecError> {
    let node = first_match(&*dom, str_field(data, "selector")?)?;
    let html = str_field(data, "html")?;
    dom.set_inner_html(node, html);
    Ok(json!({ "ok": true, "length": dom.inner_html(node).chars().count() }))
}

fn click(dom: &mut dyn Dom, data: &Value) -> Result<Value, DebugExecError> {
    let selector = str_field(data, "selector")?;
    let node = first_visible_match(&*dom, selector)?;
    let clicked = simulate_click(dom, node);
    Ok(json!({
        "clicked": clicked,
        "tag": dom.tag_name(node),
        "text": truncate(dom.inner_text(node).trim(), SUMMARY_TEXT_CHARS),
    }))
}

fn set_value(dom: &mut dyn Dom, data: &Value) -> Result<Value, DebugExecError> {
    let selector = str_field(data, "selector")?;
    let value = data
        .get("value")
        .ok_or(DebugExecError::MissingField("value"))?;
    let value = match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    };
    let node = first_match(&*dom, selector)?;
    if is_form_control(&*dom, node) {
        simulate_input(dom, node, &value);
    } else if dom.is_content_editable(node) {
        dom.set_inner_html(node, "");
        insert_text(dom, node, &value);
    } else {
        return Err(DebugExecError::InvalidData(format!(
            "{selector} is neither a form control nor editable"
        )));
    }
    Ok(json!({ "value": editor_text(&*dom, node) }))
}

fn list_inputs(dom: &dyn Dom) -> Value {
    let inputs: Vec<Value> = dom
        .query_selector_all(INPUT_SELECTOR)
        .into_iter()
        .enumerate()
        .map(|(index, node)| {
            json!({
                "index": index,
                "node": node,
                "tag": dom.tag_name(node),
                "type": dom.attribute(node, "type"),
                "id": dom.attribute(node, "id"),
                "name": dom.attribute(node, "name"),
                "placeholder": dom.attribute(node, "placeholder"),
                "value": truncate(&editor_text(dom, node), SUMMARY_TEXT_CHARS),
                "contentEditable": dom.is_content_editable(node),
                "visible": dom.is_visible(node),
            })
        })
        .collect();
    json!({ "count": inputs.len(), "inputs": inputs })
}

fn describe(dom: &dyn Dom, node: NodeId) -> Value {
    let attributes: Map<String, Value> = dom
        .attribute_names(node)
        .into_iter()
        .filter_map(|name| {
            dom.attribute(node, &name)
                .map(|value| (name, Value::String(value)))
        })
        .collect();
    let classes: Vec<String> = dom
        .attribute(node, "class")
        .unwrap_or_default()
        .split_whitespace()
        .map(str::to_string)
        .collect();
    json!({
        "node": node,
        "tag": dom.tag_name(node),
        "id": dom.attribute(node, "id"),
        "classes": classes,
        "attributes": attributes,
        "text": truncate(dom.inner_text(node).trim(), 500),
        "value": dom.value(node),
        "visible": dom.is_visible(node),
        "contentEditable": dom.is_content_editable(node),
        "rect": dom.bounding_rect(node),
        "parent": dom.parent(node).map(|p| dom.tag_name(p)),
    })
}

fn scroll(dom: &mut dyn Dom, data: &Value) -> Result<Value, DebugExecError> {
    if let Some(selector) = opt_str(data, "selector") {
        let node = first_match(&*dom, selector)?;
        dom.scroll_into_view(node);
    } else {
        let x = data.get("x").and_then(Value::as_f64).unwrap_or(0.0);
        let y = data.get("y").and_then(Value::as_f64).unwrap_or(0.0);
        if x == 0.0 && y == 0.0 {
            return Err(DebugExecError::MissingField("selector"));
        }
        dom.scroll_by(x, y);
    }
    let (scroll_x, scroll_y) = dom.scroll_position();
    Ok(json!({ "scrollX": scroll_x, "scrollY": scroll_y }))
}

fn page_info(dom: &dyn Dom) -> Value {
    let location = dom.location();
    let (width, height) = dom.viewport();
    let (scroll_x, scroll_y) = dom.scroll_position();
    json!({
        "url": location,
        "title": dom.title(),
        "platform": platform::for_url(&location).map(|p| p.id),
        "viewport": { "width": width, "height": height },
        "scroll": { "x": scroll_x, "y": scroll_y },
        "inputCount": dom.query_selector_all(INPUT_SELECTOR).len(),
        "buttonCount": dom.query_selector_all("button, [role=\"button\"]").len(),
    })
}

fn highlight(dom: &mut dyn Dom, data: &Value) -> Result<CommandOutput, DebugExecError> {
    let node = first_match(&*dom, str_field(data, "selector")?)?;
    let duration = opt_u64(data, "durationMs")
        .unwrap_or(DEFAULT_HIGHLIGHT_MS)
        .min(MAX_SLEEP_MS);
    // A node still carrying an earlier highlight keeps its original style
    // as the one to restore.
    let previous_style = dom
        .attribute(node, "style")
        .map(|style| style.replace(HIGHLIGHT_STYLE, "").trim().trim_end_matches(';').to_string())
        .filter(|style| !style.is_empty());
    let style = match previous_style.as_deref() {
        Some(existing) => format!("{existing}; {HIGHLIGHT_STYLE}"),
        None => HIGHLIGHT_STYLE.to_string(),
    };
    dom.set_attribute(node, "style", &style);
    dom.scroll_into_view(node);
    Ok(CommandOutput {
        value: json!({ "highlighted": true, "node": node, "durationMs": duration }),
        deferred: Some(Deferred::ClearHighlight {
            node,
            after: Duration::from_millis(duration),
            previous_style,
        }),
    })
}

fn summaries(dom: &dyn Dom, nodes: &[NodeId], limit: usize) -> Value {
    let elements: Vec<Value> = nodes
        .iter()
        .take(limit)
        .map(|&node| {
            json!({
                "node": node,
                "tag": dom.tag_name(node),
                "id": dom.attribute(node, "id"),
                "className": dom.attribute(node, "class"),
                "text": truncate(dom.inner_text(node).trim(), SUMMARY_TEXT_CHARS),
                "visible": dom.is_visible(node),
            })
        })
        .collect();
    json!({ "count": nodes.len(), "elements": elements })
}

fn first_match(dom: &dyn Dom, selector: &str) -> Result<NodeId, DebugExecError> {
    SelectorSpec::parse(selector)
        .matches(dom)
        .into_iter()
        .next()
        .ok_or_else(|| DebugExecError::NotFound(selector.to_string()))
}

/// Prefers a visible match but still acts on a hidden one.
fn first_visible_match(dom: &dyn Dom, selector: &str) -> Result<NodeId, DebugExecError> {
    let nodes = SelectorSpec::parse(selector).matches(dom);
    nodes
        .iter()
        .copied()
        .find(|&node| dom.is_visible(node))
        .or_else(|| nodes.first().copied())
        .ok_or_else(|| DebugExecError::NotFound(selector.to_string()))
}

fn str_field<'a>(data: &'a Value, name: &'static str) -> Result<&'a str, DebugExecError> {
    match data.get(name) {
        None | Some(Value::Null) => Err(DebugExecError::MissingField(name)),
        Some(Value::String(s)) => Ok(s),
        Some(other) => Err(DebugExecError::InvalidData(format!(
            "`{name}` must be a string, got {other}"
        ))),
    }
}

fn opt_str<'a>(data: &'a Value, name: &str) -> Option<&'a str> {
    data.get(name).and_then(Value::as_str)
}

fn opt_u64(data: &Value, name: &str) -> Option<u64> {
    data.get(name).and_then(|v| {
        v.as_u64()
            .or_else(|| v.as_f64().filter(|f| *f >= 0.0).map(|f| f as u64))
    })
}

fn truncate(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((cut, _)) => text[..cut].to_string(),
        None => text.to_string(),
    }
}
