//! Drives one destination page: fill polling, publish detection feeds and
//! the publish report, all on one task so no two page handlers overlap.

use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use pilot_core::locator::{find_element, simulate_click};
use pilot_core::{
    closest_button, DetectorSettings, Dom, FillCompletion, FillController, FillOutcome,
    FillPhase, FillSettings, PlatformProfile, PublishDetection, PublishDetector, Storage,
};
use pilot_logging::{pilot_debug, pilot_info, pilot_warn};
use tokio::time::{interval, sleep, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use crate::page::PageDom;
use crate::report::{PublishReport, ReportSink};
use crate::{system_clock, Clock};

pub type SharedPage = Arc<Mutex<PageDom>>;
pub type SharedStore = Arc<Mutex<dyn Storage>>;

#[derive(Debug, Clone)]
pub struct SessionSettings {
    pub fill: FillSettings,
    pub detector: DetectorSettings,
    /// How often click and mutation feeds are drained.
    pub feed_interval: Duration,
    /// The session ends on its own after this long.
    pub max_lifetime: Duration,
    pub account: String,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            fill: FillSettings::default(),
            detector: DetectorSettings::default(),
            feed_interval: Duration::from_millis(200),
            max_lifetime: Duration::from_secs(30 * 60),
            account: String::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEnd {
    Reported(PublishDetection),
    Cancelled,
    Expired,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionOutcome {
    pub fill: FillPhase,
    pub completion: Option<FillCompletion>,
    pub auto_published: bool,
    pub end: SessionEnd,
}

pub struct PageSession {
    profile: &'static PlatformProfile,
    settings: SessionSettings,
    page: SharedPage,
    store: SharedStore,
    sink: Arc<dyn ReportSink>,
    clock: Clock,
}

pub(crate) fn lock<T: ?Sized>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl PageSession {
    pub fn new(
        profile: &'static PlatformProfile,
        settings: SessionSettings,
        page: SharedPage,
        store: SharedStore,
        sink: Arc<dyn ReportSink>,
    ) -> Self {
        Self {
            profile,
            settings,
            page,
            store,
            sink,
            clock: system_clock(),
        }
    }

    pub fn with_clock(mut self, clock: Clock) -> Self {
        self.clock = clock;
        self
    }

    pub async fn run(self, cancel: CancellationToken) -> SessionOutcome {
        let mut fill = FillController::new(self.profile, self.settings.fill.clone());
        let mut detector = PublishDetector::new(self.profile, self.settings.detector.clone());
        let mut completion = None;
        let mut auto_published = false;

        if let Err(err) = fill.start(&mut *lock(&self.store), (self.clock)()) {
            pilot_warn!("could not read payload for {}: {}", self.profile.id, err);
        }

        let mut fill_timer = interval(self.settings.fill.interval);
        fill_timer.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut feed_timer = interval(self.settings.feed_interval);
        feed_timer.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let initial_scan = sleep(self.settings.detector.initial_scan_delay);
        tokio::pin!(initial_scan);
        let mut scanned = false;
        let lifetime = sleep(self.settings.max_lifetime);
        tokio::pin!(lifetime);

        let end = loop {
            let detection = tokio::select! {
                _ = cancel.cancelled() => break SessionEnd::Cancelled,
                _ = &mut lifetime => break SessionEnd::Expired,
                _ = fill_timer.tick(), if fill.phase() == FillPhase::Polling => {
                    if let Some(done) = self.fill_tick(&mut fill) {
                        auto_published = done.auto_publish && self.auto_publish();
                        completion = Some(done);
                    }
                    None
                }
                _ = feed_timer.tick() => self.drain_feeds(&mut detector),
                _ = &mut initial_scan, if !scanned => {
                    scanned = true;
                    let page = lock(&self.page);
                    detector.initial_scan(&*page, (self.clock)())
                }
            };
            if let Some(detection) = detection {
                self.sink
                    .report(PublishReport::from_detection(&detection, &self.settings.account))
                    .await;
                break SessionEnd::Reported(detection);
            }
        };

        fill.stop();
        pilot_info!("page session for {} ended: {:?}", self.profile.id, end);
        SessionOutcome {
            fill: fill.phase(),
            completion,
            auto_published,
            end,
        }
    }

    fn fill_tick(&self, fill: &mut FillController) -> Option<FillCompletion> {
        let mut page = lock(&self.page);
        let mut store = lock(&self.store);
        match fill.tick(&mut *page, &mut *store) {
            FillOutcome::Filled(done) => Some(done),
            FillOutcome::GaveUp { attempts } => {
                pilot_warn!(
                    "{} editor not found after {} attempts; leaving the page as is",
                    self.profile.id,
                    attempts
                );
                None
            }
            FillOutcome::Waiting { .. } | FillOutcome::Inactive => None,
        }
    }

    fn auto_publish(&self) -> bool {
        let mut page = lock(&self.page);
        match find_element(&*page, self.profile.publish_button_selectors) {
            Some(button) => {
                pilot_info!("auto-publishing on {}", self.profile.id);
                simulate_click(&mut *page, button)
            }
            None => {
                pilot_warn!("auto publish requested but no publish button on {}", self.profile.id);
                false
            }
        }
    }

    fn drain_feeds(&self, detector: &mut PublishDetector) -> Option<PublishDetection> {
        let mut page = lock(&self.page);
        let now = (self.clock)();

        let mut armed = false;
        for node in page.take_clicks() {
            let target = closest_button(&*page, node).unwrap_or(node);
            let text = page.inner_text(target);
            armed |= detector.on_click(&text, now);
        }
        if armed {
            pilot_debug!("{} publish click seen", self.profile.id);
            if let Some(detection) = detector.after_click(&*page, now) {
                return Some(detection);
            }
        }

        let batch = page.take_mutations()?;
        detector.on_mutations(&*page, batch, now)
    }
}
