mod support;

use std::sync::Arc;
use std::time::Duration;

use chrono::Duration as ChronoDuration;
use pilot_core::platform::ZHIHU;
use pilot_core::{
    payload_key, write_payload, AutoPublishOverride, Dom, FillPhase, MemoryStore, Preferences,
    PublishPayload, Trigger,
};
use pilot_engine::{
    article_id, ChannelReportSink, PageDom, PageSession, SessionEnd, SessionSettings,
};
use pretty_assertions::assert_eq;
use support::{epoch, has_key, init_logging, shared_page, shared_store, zhihu_page, ManualClock};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

fn store_with_payload(payload: &PublishPayload, force_auto_publish: bool) -> MemoryStore {
    let mut store = MemoryStore::new();
    write_payload(&mut store, "zhihu", payload).unwrap();
    if force_auto_publish {
        Preferences {
            auto_publish: AutoPublishOverride::ForceOn,
            ..Preferences::default()
        }
        .save(&mut store)
        .unwrap();
    }
    store
}

fn settings() -> SessionSettings {
    SessionSettings {
        account: "writer@example.com".to_string(),
        ..SessionSettings::default()
    }
}

#[tokio::test(start_paused = true)]
async fn fills_auto_publishes_and_reports_the_published_link() {
    init_logging();
    let clock = ManualClock::new(epoch());
    let page = shared_page(zhihu_page());
    let mut payload = PublishPayload::new("周报", "Plain prose.", epoch());
    payload.html_content = Some("<p>Plain prose.</p>".to_string());
    let (store, concrete) = shared_store(store_with_payload(&payload, true));
    let (tx, mut reports) = mpsc::unbounded_channel();

    let session = PageSession::new(
        &ZHIHU,
        settings(),
        page.clone(),
        store,
        Arc::new(ChannelReportSink::new(tx)),
    )
    .with_clock(clock.clock());
    let running = tokio::spawn(session.run(CancellationToken::new()));

    tokio::time::sleep(Duration::from_millis(500)).await;
    {
        let mut page = page.lock().unwrap();
        let body = page.body().unwrap();
        page.append_html(
            body,
            r#"<div class="Toast">发布成功 <a href="/p/987654">查看文章</a></div>"#,
        );
    }

    let outcome = running.await.unwrap();
    assert_eq!(outcome.fill, FillPhase::Filled);
    assert!(outcome.auto_published);
    let completion = outcome.completion.expect("completion");
    assert!(completion.title_filled && completion.body_filled);

    let SessionEnd::Reported(detection) = outcome.end else {
        panic!("expected a report, got {:?}", outcome.end);
    };
    assert_eq!(detection.url, "https://zhuanlan.zhihu.com/p/987654");
    assert_eq!(detection.trigger, Trigger::Mutation);
    assert_eq!(detection.title, "周报");
    assert!(!has_key(&concrete, &payload_key("zhihu")));

    let report = reports.recv().await.expect("one report");
    assert_eq!(report.platform, "zhihu");
    assert_eq!(report.account, "writer@example.com");
    assert_eq!(report.articles.len(), 1);
    assert_eq!(report.articles[0].id, article_id(&detection.url));
    assert_eq!(report.articles[0].status, "reported");
    assert_eq!(report.articles[0].publish_time, epoch());
    assert!(reports.try_recv().is_err());
}

#[tokio::test(start_paused = true)]
async fn without_auto_publish_the_button_is_not_touched() {
    init_logging();
    let page = shared_page(zhihu_page());
    let payload = PublishPayload::new("t", "body", epoch());
    let (store, _) = shared_store(store_with_payload(&payload, false));
    let (tx, _reports) = mpsc::unbounded_channel();
    let cancel = CancellationToken::new();

    let session = PageSession::new(
        &ZHIHU,
        settings(),
        page.clone(),
        store,
        Arc::new(ChannelReportSink::new(tx)),
    )
    .with_clock(ManualClock::new(epoch()).clock());
    let running = tokio::spawn(session.run(cancel.clone()));

    tokio::time::sleep(Duration::from_secs(3)).await;
    cancel.cancel();
    let outcome = running.await.unwrap();

    assert_eq!(outcome.fill, FillPhase::Filled);
    assert!(!outcome.auto_published);
    assert_eq!(outcome.end, SessionEnd::Cancelled);
    assert!(page.lock().unwrap().take_clicks().is_empty());
}

#[tokio::test(start_paused = true)]
async fn stale_payload_never_touches_the_page() {
    init_logging();
    let clock = ManualClock::new(epoch());
    let page = shared_page(zhihu_page());
    let before = page.lock().unwrap().html();
    let old = PublishPayload::new("old", "old body", epoch() - ChronoDuration::minutes(6));
    let (store, concrete) = shared_store(store_with_payload(&old, true));
    let (tx, _reports) = mpsc::unbounded_channel();
    let cancel = CancellationToken::new();

    let session = PageSession::new(
        &ZHIHU,
        settings(),
        page.clone(),
        store,
        Arc::new(ChannelReportSink::new(tx)),
    )
    .with_clock(clock.clock());
    let running = tokio::spawn(session.run(cancel.clone()));

    tokio::time::sleep(Duration::from_secs(5)).await;
    cancel.cancel();
    let outcome = running.await.unwrap();

    assert_eq!(outcome.fill, FillPhase::Idle);
    assert_eq!(outcome.completion, None);
    assert_eq!(outcome.end, SessionEnd::Cancelled);
    assert!(!has_key(&concrete, &payload_key("zhihu")));
    let page = page.lock().unwrap();
    assert_eq!(page.html(), before);
    assert!(page.events().is_empty());
}

#[tokio::test(start_paused = true)]
async fn missing_editor_gives_up_after_the_attempt_budget() {
    init_logging();
    let page = shared_page(PageDom::parse(
        "<body><p>loading…</p></body>",
        "https://zhuanlan.zhihu.com/write",
    ));
    let payload = PublishPayload::new("t", "body", epoch());
    let (store, concrete) = shared_store(store_with_payload(&payload, false));
    let (tx, _reports) = mpsc::unbounded_channel();
    let cancel = CancellationToken::new();

    let session = PageSession::new(
        &ZHIHU,
        settings(),
        page,
        store,
        Arc::new(ChannelReportSink::new(tx)),
    )
    .with_clock(ManualClock::new(epoch()).clock());
    let running = tokio::spawn(session.run(cancel.clone()));

    tokio::time::sleep(Duration::from_secs(20)).await;
    cancel.cancel();
    let outcome = running.await.unwrap();

    assert_eq!(outcome.fill, FillPhase::GaveUp);
    assert_eq!(outcome.completion, None);
    // The payload stays put for a later page load to pick up.
    assert!(has_key(&concrete, &payload_key("zhihu")));
}

#[tokio::test(start_paused = true)]
async fn already_published_page_is_caught_by_the_initial_scan() {
    init_logging();
    let page = shared_page(PageDom::parse(
        "<html><head><title>My article</title></head><body><h1>My article</h1></body></html>",
        "https://zhuanlan.zhihu.com/p/555",
    ));
    let (store, _) = shared_store(MemoryStore::new());
    let (tx, mut reports) = mpsc::unbounded_channel();

    let session = PageSession::new(
        &ZHIHU,
        settings(),
        page,
        store,
        Arc::new(ChannelReportSink::new(tx)),
    )
    .with_clock(ManualClock::new(epoch()).clock());
    let outcome = session.run(CancellationToken::new()).await;

    let SessionEnd::Reported(detection) = outcome.end else {
        panic!("expected a report, got {:?}", outcome.end);
    };
    assert_eq!(detection.trigger, Trigger::InitialScan);
    assert_eq!(detection.url, "https://zhuanlan.zhihu.com/p/555");
    assert_eq!(detection.title, "My article");
    assert_eq!(outcome.fill, FillPhase::Idle);
    assert!(reports.recv().await.is_some());
}

#[tokio::test(start_paused = true)]
async fn session_expires_after_its_lifetime() {
    init_logging();
    let (store, _) = shared_store(MemoryStore::new());
    let (tx, _reports) = mpsc::unbounded_channel();
    let session = PageSession::new(
        &ZHIHU,
        SessionSettings {
            max_lifetime: Duration::from_secs(60),
            ..settings()
        },
        shared_page(zhihu_page()),
        store,
        Arc::new(ChannelReportSink::new(tx)),
    );
    let outcome = session.run(CancellationToken::new()).await;
    assert_eq!(outcome.end, SessionEnd::Expired);
}
