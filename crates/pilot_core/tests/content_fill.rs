mod support;

use chrono::Utc;
use pilot_core::content::{fill_content, fill_title, is_editor_empty};
use pilot_core::locator::{find_all, find_by_text, find_element, simulate_click};
use pilot_core::{closest_button, PublishPayload};
use pretty_assertions::assert_eq;
use support::{init_logging, zhihu_editor, FakeDom, FakeNode};

#[test]
fn markdown_body_is_inserted_character_for_character() {
    init_logging();
    let (mut dom, _, editor) = zhihu_editor();
    let content = "## 标题\n\n- **粗体** item\n1. first\n\n```rust\nfn main() {}\n```\n> quote";
    let mut payload = PublishPayload::new("T", content, Utc::now());
    payload.html_content = Some("<h2>标题</h2>".into());

    assert!(fill_content(&mut dom, editor, &payload));
    assert!(dom.inserted_html.is_empty());
    assert_eq!(dom.inserted_text, vec![content.to_string()]);
    assert_eq!(dom.text_of(editor), content);
}

#[test]
fn prose_body_keeps_every_character_through_html() {
    init_logging();
    let (mut dom, _, editor) = zhihu_editor();
    let content = "Rust 让并发更安全。Ownership, borrowing & lifetimes!";
    let mut payload = PublishPayload::new("T", content, Utc::now());
    payload.html_content = Some(format!("<p>{content}</p>"));

    assert!(fill_content(&mut dom, editor, &payload));
    assert_eq!(dom.text_of(editor), content);
}

#[test]
fn prose_without_rendered_html_goes_in_as_text() {
    init_logging();
    let (mut dom, _, editor) = zhihu_editor();
    let content = "Plain notes: 3 < 4 & \"quotes\" stay.\nSecond line.";
    let payload = PublishPayload::new("T", content, Utc::now());

    assert!(fill_content(&mut dom, editor, &payload));
    assert!(dom.inserted_html.is_empty());
    assert_eq!(dom.inserted_text, vec![content.to_string()]);
    assert_eq!(dom.text_of(editor), content);
}

#[test]
fn non_empty_editor_is_not_touched() {
    init_logging();
    let mut dom = FakeDom::new("https://zhuanlan.zhihu.com/write");
    let body = dom.body_id();
    let editor = dom.add(body, FakeNode::new("div").editable().text("already here"));
    let payload = PublishPayload::new("T", "new body", Utc::now());

    assert!(!is_editor_empty(&dom, editor));
    assert!(!fill_content(&mut dom, editor, &payload));
    assert!(!fill_title(&mut dom, editor, "title"));
    assert_eq!(dom.writes, 0);
}

#[test]
fn selector_lists_are_tried_in_order_and_skip_hidden() {
    init_logging();
    let mut dom = FakeDom::new("https://example.com");
    let body = dom.body_id();
    dom.add(body, FakeNode::new("div").answers(".first").hidden());
    let second = dom.add(body, FakeNode::new("div").answers(".second"));
    let also_second = dom.add(body, FakeNode::new("div").answers(".first").answers(".second"));

    assert_eq!(find_element(&dom, &[".first", ".second"]), Some(also_second));
    assert_eq!(find_element(&dom, &[".missing", ".second"]), Some(second));
    assert_eq!(find_all(&dom, &[".second", ".first"]), vec![second, also_second]);
}

#[test]
fn contains_selector_filters_on_rendered_text() {
    init_logging();
    let mut dom = FakeDom::new("https://example.com");
    let body = dom.body_id();
    dom.add(body, FakeNode::new("button").text("保存草稿"));
    let publish = dom.add(body, FakeNode::new("button").text("发布"));

    assert_eq!(
        find_element(&dom, &[r#"button:contains("发布")"#]),
        Some(publish)
    );
    assert_eq!(find_by_text(&dom, "发布", true), vec![publish]);
    assert_eq!(find_by_text(&dom, "   ", false), Vec::<usize>::new());
}

#[test]
fn click_on_nested_label_resolves_to_its_button() {
    init_logging();
    let mut dom = FakeDom::new("https://example.com");
    let body = dom.body_id();
    let button = dom.add(body, FakeNode::new("div").attr("role", "button"));
    let label = dom.add(button, FakeNode::new("span").text("发布"));

    assert_eq!(closest_button(&dom, label), Some(button));
    assert!(simulate_click(&mut dom, button));
    assert!(!simulate_click(&mut dom, 99));
    assert_eq!(dom.native_clicks, vec![button]);
}
