mod support;

use std::time::Duration;

use pilot_core::debug::CommandKind;
use pilot_core::dispatch::{clear_highlight, execute, DebugExecError, Deferred, MAX_SLEEP_MS};
use pilot_core::{evaluate, Dom, EventKind};
use pretty_assertions::assert_eq;
use serde_json::json;
use support::{init_logging, FakeDom, FakeNode};

fn page() -> FakeDom {
    let mut dom = FakeDom::new("https://zhuanlan.zhihu.com/write?draft=7");
    dom.title = "写文章".to_string();
    let body = dom.body_id();
    dom.add(
        body,
        FakeNode::new("input")
            .answers("#title")
            .attr("id", "title")
            .attr("placeholder", "请输入标题"),
    );
    dom.add(
        body,
        FakeNode::new("div")
            .answers(".editor")
            .attr("class", "editor rich")
            .editable(),
    );
    dom.add(
        body,
        FakeNode::new("button")
            .answers(".publish")
            .attr("class", "publish")
            .text("发布"),
    );
    dom.add(body, FakeNode::new("button").answers(".publish").hidden().text("发布"));
    dom
}

#[test]
fn query_summarizes_matches_and_respects_limit() {
    init_logging();
    let mut dom = page();
    let output = execute(
        &mut dom,
        CommandKind::Query,
        &json!({"selector": ".publish", "limit": 1}),
    )
    .unwrap();
    assert_eq!(output.value["count"], 2);
    assert_eq!(output.value["elements"].as_array().map(Vec::len), Some(1));
    assert_eq!(output.value["elements"][0]["text"], "发布");
    assert_eq!(output.deferred, None);
}

#[test]
fn click_prefers_the_visible_match() {
    init_logging();
    let mut dom = page();
    let output = execute(&mut dom, CommandKind::Click, &json!({"selector": ".publish"})).unwrap();
    assert_eq!(output.value["clicked"], true);
    assert_eq!(dom.native_clicks, vec![3]);
    let kinds: Vec<EventKind> = dom.events.iter().map(|(_, kind)| *kind).collect();
    assert_eq!(
        kinds,
        vec![
            EventKind::MouseOver,
            EventKind::MouseEnter,
            EventKind::MouseDown,
            EventKind::MouseUp,
            EventKind::Click
        ]
    );
}

#[test]
fn set_value_handles_controls_and_editables() {
    init_logging();
    let mut dom = page();
    let output = execute(
        &mut dom,
        CommandKind::SetValue,
        &json!({"selector": "#title", "value": "Hello"}),
    )
    .unwrap();
    assert_eq!(output.value, json!({"value": "Hello"}));

    let output = execute(
        &mut dom,
        CommandKind::SetValue,
        &json!({"selector": ".editor", "value": "Body text"}),
    )
    .unwrap();
    assert_eq!(output.value, json!({"value": "Body text"}));

    let err = execute(
        &mut dom,
        CommandKind::SetValue,
        &json!({"selector": ".publish", "value": "x"}),
    )
    .unwrap_err();
    assert!(matches!(err, DebugExecError::InvalidData(_)));
}

#[test]
fn missing_elements_and_fields_are_errors() {
    init_logging();
    let mut dom = page();
    assert_eq!(
        execute(&mut dom, CommandKind::Click, &json!({"selector": ".nope"})),
        Err(DebugExecError::NotFound(".nope".to_string()))
    );
    assert_eq!(
        execute(&mut dom, CommandKind::GetHtml, &json!({"selector": ".nope"})),
        Err(DebugExecError::NotFound(".nope".to_string()))
    );
    assert_eq!(
        execute(&mut dom, CommandKind::FindByText, &json!({})),
        Err(DebugExecError::MissingField("text"))
    );
}

#[test]
fn sleep_is_capped_and_deferred() {
    init_logging();
    let mut dom = page();
    let output = execute(&mut dom, CommandKind::Sleep, &json!({"ms": 999_999})).unwrap();
    assert_eq!(output.value, json!({"slept": MAX_SLEEP_MS}));
    assert_eq!(
        output.deferred,
        Some(Deferred::Sleep(Duration::from_millis(MAX_SLEEP_MS)))
    );
}

#[test]
fn highlight_restores_the_previous_style() {
    init_logging();
    let mut dom = page();
    dom.set_attribute(3, "style", "color: red");
    let output = execute(
        &mut dom,
        CommandKind::Highlight,
        &json!({"selector": ".publish", "durationMs": 500}),
    )
    .unwrap();
    let style = dom.attribute(3, "style").unwrap_or_default();
    assert!(style.starts_with("color: red; outline"));

    let Some(Deferred::ClearHighlight {
        node,
        after,
        previous_style,
    }) = output.deferred
    else {
        panic!("highlight must defer its cleanup");
    };
    assert_eq!(after, Duration::from_millis(500));
    clear_highlight(&mut dom, node, previous_style.as_deref());
    assert_eq!(dom.attribute(3, "style").as_deref(), Some("color: red"));
}

fn cleanup(output: pilot_core::dispatch::CommandOutput) -> Option<String> {
    match output.deferred {
        Some(Deferred::ClearHighlight { previous_style, .. }) => previous_style,
        other => panic!("expected a highlight cleanup, got {other:?}"),
    }
}

#[test]
fn overlapping_highlights_restore_the_original_style() {
    init_logging();
    let mut dom = page();
    dom.set_attribute(3, "style", "color: red;");
    let request = json!({"selector": ".publish", "durationMs": 500});

    let first = cleanup(execute(&mut dom, CommandKind::Highlight, &request).unwrap());
    let second = cleanup(execute(&mut dom, CommandKind::Highlight, &request).unwrap());
    assert_eq!(first.as_deref(), Some("color: red"));
    assert_eq!(second, first);
    let style = dom.attribute(3, "style").unwrap_or_default();
    assert_eq!(style.matches("outline:").count(), 1, "{style}");

    clear_highlight(&mut dom, 3, first.as_deref());
    clear_highlight(&mut dom, 3, second.as_deref());
    assert_eq!(dom.attribute(3, "style").as_deref(), Some("color: red"));

    dom.remove_attribute(3, "style");
    let bare_first = cleanup(execute(&mut dom, CommandKind::Highlight, &request).unwrap());
    let bare_second = cleanup(execute(&mut dom, CommandKind::Highlight, &request).unwrap());
    assert_eq!((bare_first, bare_second), (None, None));
    clear_highlight(&mut dom, 3, None);
    assert_eq!(dom.attribute(3, "style"), None);
}

#[test]
fn page_info_and_inputs_describe_the_page() {
    init_logging();
    let mut dom = page();
    let info = execute(&mut dom, CommandKind::PageInfo, &json!({})).unwrap().value;
    assert_eq!(info["platform"], "zhihu");
    assert_eq!(info["title"], "写文章");
    assert_eq!(info["inputCount"], 2);

    let inputs = execute(&mut dom, CommandKind::ListInputs, &json!(null))
        .unwrap()
        .value;
    assert_eq!(inputs["count"], 2);
    assert_eq!(inputs["inputs"][0]["placeholder"], "请输入标题");
    assert_eq!(inputs["inputs"][1]["contentEditable"], true);
}

#[test]
fn describe_element_lists_attributes_and_classes() {
    init_logging();
    let mut dom = page();
    let value = execute(
        &mut dom,
        CommandKind::DescribeElement,
        &json!({"selector": ".editor"}),
    )
    .unwrap()
    .value;
    assert_eq!(value["tag"], "div");
    assert_eq!(value["classes"], json!(["editor", "rich"]));
    assert_eq!(value["attributes"]["class"], "editor rich");
    assert_eq!(value["contentEditable"], true);
}

#[test]
fn scroll_by_offset_or_element() {
    init_logging();
    let mut dom = page();
    let value = execute(&mut dom, CommandKind::Scroll, &json!({"x": 0, "y": 300}))
        .unwrap()
        .value;
    assert_eq!(value["scrollY"], json!(300.0));
    assert_eq!(
        execute(&mut dom, CommandKind::Scroll, &json!({})),
        Err(DebugExecError::MissingField("selector"))
    );
}

#[test]
fn evaluate_walks_document_members() {
    init_logging();
    let mut dom = page();
    assert_eq!(
        evaluate(&dom, "document.querySelectorAll('.publish').length"),
        Ok(json!(2.0))
    );
    assert_eq!(evaluate(&dom, "document.title"), Ok(json!("写文章")));
    assert_eq!(
        evaluate(&dom, "window.location.search"),
        Ok(json!("?draft=7"))
    );
    assert_eq!(
        evaluate(&dom, "document.querySelector('#title').getAttribute('placeholder')"),
        Ok(json!("请输入标题"))
    );
    assert_eq!(
        evaluate(&dom, "document.querySelector('.nope')"),
        Ok(serde_json::Value::Null)
    );

    let output = execute(
        &mut dom,
        CommandKind::Evaluate,
        &json!({"expression": "document.querySelector('.editor').tagName"}),
    )
    .unwrap();
    assert_eq!(output.value, json!({"result": "DIV"}));
}

#[test]
fn deeply_nested_expressions_are_rejected() {
    init_logging();
    let mut dom = page();
    let depth = 50_000;
    let nested = format!("{}document.title{}", "(".repeat(depth), ")".repeat(depth));
    let outcome = execute(&mut dom, CommandKind::Evaluate, &json!({ "expression": nested }));
    assert!(matches!(outcome, Err(DebugExecError::Evaluation(_))));

    let indexed = format!("{}0{}", "document.body.children[".repeat(depth), "]".repeat(depth));
    assert!(evaluate(&dom, &indexed).is_err());

    let shallow = format!("{}document.title{}", "(".repeat(10), ")".repeat(10));
    assert_eq!(evaluate(&dom, &shallow), Ok(json!("写文章")));
}

#[test]
fn evaluate_has_no_other_free_names() {
    init_logging();
    let mut dom = page();
    assert_eq!(
        evaluate(&dom, "fetch('http://evil')"),
        Err("fetch is not defined".to_string())
    );
    assert!(evaluate(&dom, "document.querySelector('.nope').value").is_err());
    assert!(matches!(
        execute(
            &mut dom,
            CommandKind::Evaluate,
            &json!({"expression": "chrome.runtime"})
        ),
        Err(DebugExecError::Evaluation(_))
    ));
}
