#![allow(dead_code)]

use std::sync::{Arc, Mutex, Once};

use chrono::{DateTime, Duration, Utc};
use pilot_core::{MemoryStore, Storage};
use pilot_engine::{Clock, PageDom, SharedPage, SharedStore};

pub fn init_logging() {
    static INIT: Once = Once::new();
    INIT.call_once(pilot_logging::initialize_for_tests);
}

pub const ZHIHU_WRITE_URL: &str = "https://zhuanlan.zhihu.com/write";

/// Column editor as it looks right after load.
pub const ZHIHU_EDITOR_HTML: &str = r#"<!DOCTYPE html>
<html><head><title>写文章 - 知乎</title></head>
<body>
  <div class="WriteIndex">
    <textarea class="WriteIndex-titleInput" placeholder="请输入标题（最多 100 个字）"></textarea>
    <div class="DraftEditor-root">
      <div class="public-DraftEditor-content" contenteditable="true"></div>
    </div>
    <div class="PublishPanel">
      <button class="PublishPanel-triggerButton" type="button">发布</button>
    </div>
  </div>
</body></html>"#;

pub fn zhihu_page() -> PageDom {
    PageDom::parse(ZHIHU_EDITOR_HTML, ZHIHU_WRITE_URL)
}

pub fn shared_page(page: PageDom) -> SharedPage {
    Arc::new(Mutex::new(page))
}

pub fn shared_store(store: MemoryStore) -> (SharedStore, Arc<Mutex<MemoryStore>>) {
    let concrete = Arc::new(Mutex::new(store));
    let shared: SharedStore = concrete.clone();
    (shared, concrete)
}

pub fn epoch() -> DateTime<Utc> {
    DateTime::from_timestamp(1_700_000_000, 0).unwrap()
}

/// A clock that reads whatever the test last set.
#[derive(Clone)]
pub struct ManualClock {
    now: Arc<Mutex<DateTime<Utc>>>,
}

impl ManualClock {
    pub fn new(start: DateTime<Utc>) -> Self {
        Self {
            now: Arc::new(Mutex::new(start)),
        }
    }

    pub fn advance(&self, by: Duration) {
        let mut now = self.now.lock().unwrap();
        *now += by;
    }

    pub fn now(&self) -> DateTime<Utc> {
        *self.now.lock().unwrap()
    }

    pub fn clock(&self) -> Clock {
        let now = self.now.clone();
        Arc::new(move || *now.lock().unwrap())
    }
}

pub fn has_key(store: &Mutex<MemoryStore>, key: &str) -> bool {
    store.lock().unwrap().get(key).unwrap().is_some()
}
