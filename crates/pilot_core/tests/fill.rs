mod support;

use chrono::{DateTime, Duration, Utc};
use pilot_core::platform::ZHIHU;
use pilot_core::{
    payload_key, write_payload, AutoPublishOverride, Dom, EventKind, FillController, FillOutcome,
    FillPhase, FillSettings, MemoryStore, Preferences, PublishPayload, Storage, PAYLOAD_TTL_SECS,
};
use pretty_assertions::assert_eq;
use support::{init_logging, zhihu_editor, FakeDom, FakeNode};

fn now() -> DateTime<Utc> {
    DateTime::from_timestamp(1_700_000_000, 0).unwrap()
}

fn store_with(payload: &PublishPayload) -> MemoryStore {
    let mut store = MemoryStore::new();
    write_payload(&mut store, "zhihu", payload).unwrap();
    store
}

fn started(store: &mut MemoryStore, at: DateTime<Utc>) -> FillController {
    let mut controller = FillController::new(&ZHIHU, FillSettings::default());
    controller.start(store, at).unwrap();
    controller
}

#[test]
fn fresh_payload_fills_title_and_body_then_is_consumed() {
    init_logging();
    let (mut dom, title, editor) = zhihu_editor();
    let mut payload = PublishPayload::new("My title", "Plain prose body.", now());
    payload.html_content = Some("<p>Plain prose body.</p>".into());
    let mut store = store_with(&payload);

    let mut controller = started(&mut store, now());
    assert_eq!(controller.phase(), FillPhase::Polling);

    let FillOutcome::Filled(completion) = controller.tick(&mut dom, &mut store) else {
        panic!("expected a fill on the first tick");
    };
    assert!(completion.title_filled);
    assert!(completion.body_filled);
    assert!(!completion.auto_publish);
    assert_eq!(dom.value(title).as_deref(), Some("My title"));
    assert_eq!(dom.inserted_html, vec!["<p>Plain prose body.</p>".to_string()]);
    assert_eq!(dom.text_of(editor), "Plain prose body.");
    assert_eq!(store.get(&payload_key("zhihu")).unwrap(), None);
    assert_eq!(controller.phase(), FillPhase::Filled);

    // A second tick after completion is a no-op.
    let writes = dom.writes;
    assert_eq!(controller.tick(&mut dom, &mut store), FillOutcome::Inactive);
    assert_eq!(dom.writes, writes);
}

#[test]
fn title_control_receives_native_input_events() {
    init_logging();
    let (mut dom, title, _) = zhihu_editor();
    let mut store = store_with(&PublishPayload::new("T", "body", now()));
    let mut controller = started(&mut store, now());
    controller.tick(&mut dom, &mut store);

    let title_events: Vec<EventKind> = dom
        .events
        .iter()
        .filter(|(node, _)| *node == title)
        .map(|(_, kind)| *kind)
        .collect();
    assert_eq!(
        title_events,
        vec![
            EventKind::Focus,
            EventKind::Input,
            EventKind::Change,
            EventKind::KeyUp
        ]
    );
}

#[test]
fn stale_payload_is_removed_and_never_touches_the_page() {
    init_logging();
    let (mut dom, _, _) = zhihu_editor();
    let mut store = store_with(&PublishPayload::new("Old", "old body", now()));
    let later = now() + Duration::seconds(PAYLOAD_TTL_SECS + 1);

    let mut controller = started(&mut store, later);
    assert_eq!(controller.phase(), FillPhase::Idle);
    assert_eq!(controller.tick(&mut dom, &mut store), FillOutcome::Inactive);

    assert_eq!(dom.writes, 0);
    assert!(dom.events.is_empty());
    assert_eq!(store.get(&payload_key("zhihu")).unwrap(), None);
}

#[test]
fn prefilled_title_is_left_alone() {
    init_logging();
    let mut dom = FakeDom::new("https://zhuanlan.zhihu.com/write");
    let body = dom.body_id();
    let title = dom.add(
        body,
        FakeNode::new("textarea")
            .answers("textarea.WriteIndex-titleInput")
            .value("Existing"),
    );
    dom.add(
        body,
        FakeNode::new("div")
            .answers(".public-DraftEditor-content")
            .editable(),
    );
    let mut store = store_with(&PublishPayload::new("New", "body", now()));

    let mut controller = started(&mut store, now());
    let FillOutcome::Filled(completion) = controller.tick(&mut dom, &mut store) else {
        panic!("expected a fill");
    };
    assert!(!completion.title_filled);
    assert!(completion.body_filled);
    assert_eq!(dom.value(title).as_deref(), Some("Existing"));
}

#[test]
fn placeholder_text_counts_as_empty() {
    init_logging();
    let mut dom = FakeDom::new("https://zhuanlan.zhihu.com/write");
    let body = dom.body_id();
    dom.add(
        body,
        FakeNode::new("textarea").answers("textarea.WriteIndex-titleInput"),
    );
    let editor = dom.add(
        body,
        FakeNode::new("div")
            .answers(".public-DraftEditor-content")
            .editable()
            .text("请输入正文"),
    );
    let mut store = store_with(&PublishPayload::new("T", "Real body", now()));

    let mut controller = started(&mut store, now());
    controller.tick(&mut dom, &mut store);
    assert_eq!(dom.text_of(editor), "Real body");
}

#[test]
fn missing_editor_gives_up_after_exactly_max_attempts() {
    init_logging();
    let mut dom = FakeDom::new("https://zhuanlan.zhihu.com/write");
    let mut store = store_with(&PublishPayload::new("T", "body", now()));
    let mut controller = started(&mut store, now());
    let max = FillSettings::default().max_attempts;

    for attempt in 1..max {
        assert_eq!(
            controller.tick(&mut dom, &mut store),
            FillOutcome::Waiting { attempt }
        );
    }
    assert_eq!(
        controller.tick(&mut dom, &mut store),
        FillOutcome::GaveUp { attempts: max }
    );
    assert_eq!(controller.phase(), FillPhase::GaveUp);
    assert_eq!(controller.tick(&mut dom, &mut store), FillOutcome::Inactive);
    assert_eq!(dom.writes, 0);
}

#[test]
fn editor_appearing_late_is_filled_on_that_tick() {
    init_logging();
    let mut dom = FakeDom::new("https://zhuanlan.zhihu.com/write");
    let mut store = store_with(&PublishPayload::new("T", "body", now()));
    let mut controller = started(&mut store, now());

    assert_eq!(
        controller.tick(&mut dom, &mut store),
        FillOutcome::Waiting { attempt: 1 }
    );
    let body = dom.body_id();
    dom.add(
        body,
        FakeNode::new("textarea").answers("textarea.WriteIndex-titleInput"),
    );
    dom.add(
        body,
        FakeNode::new("div")
            .answers(".public-DraftEditor-content")
            .editable(),
    );
    assert!(matches!(
        controller.tick(&mut dom, &mut store),
        FillOutcome::Filled(_)
    ));
    assert_eq!(controller.attempts(), 2);
}

#[test]
fn hidden_editor_is_not_a_candidate() {
    init_logging();
    let mut dom = FakeDom::new("https://zhuanlan.zhihu.com/write");
    let body = dom.body_id();
    dom.add(
        body,
        FakeNode::new("textarea").answers("textarea.WriteIndex-titleInput"),
    );
    dom.add(
        body,
        FakeNode::new("div")
            .answers(".public-DraftEditor-content")
            .editable()
            .hidden(),
    );
    let mut store = store_with(&PublishPayload::new("T", "body", now()));
    let mut controller = started(&mut store, now());

    assert_eq!(
        controller.tick(&mut dom, &mut store),
        FillOutcome::Waiting { attempt: 1 }
    );
}

#[test]
fn stop_is_idempotent_and_final() {
    init_logging();
    let (mut dom, _, _) = zhihu_editor();
    let mut store = store_with(&PublishPayload::new("T", "body", now()));
    let mut controller = started(&mut store, now());

    controller.stop();
    controller.stop();
    assert_eq!(controller.phase(), FillPhase::Stopped);
    assert_eq!(controller.tick(&mut dom, &mut store), FillOutcome::Inactive);
    assert_eq!(dom.writes, 0);
    // Not consumed, so a later page load can still use it.
    assert!(store.get(&payload_key("zhihu")).unwrap().is_some());
}

#[test]
fn auto_publish_follows_preferences() {
    init_logging();
    let (mut dom, _, _) = zhihu_editor();
    let mut store = store_with(&PublishPayload::new("T", "body", now()));
    let preferences = Preferences {
        auto_publish: AutoPublishOverride::ForceOn,
        ..Preferences::default()
    };
    preferences.save(&mut store).unwrap();

    let mut controller = started(&mut store, now());
    let FillOutcome::Filled(completion) = controller.tick(&mut dom, &mut store) else {
        panic!("expected a fill");
    };
    assert!(completion.auto_publish);
}
