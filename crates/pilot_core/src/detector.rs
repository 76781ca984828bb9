//! Publish success inference from click and mutation feeds.
//!
//! `Disarmed -> Armed -> {Reported | Disarmed (timeout)}`. A click on a
//! publish button arms the detector; while armed, each mutation batch that
//! added nodes triggers one search for a published signal.

use std::collections::HashSet;

use chrono::{DateTime, Duration, Utc};
use pilot_logging::{pilot_debug, pilot_info, pilot_warn};
use regex::Regex;
use serde::{Deserialize, Serialize};
use url::Url;

use crate::content::editor_text;
use crate::dom::Dom;
use crate::locator::find_element;
use crate::platform::PlatformProfile;

pub const REPORTED_STATUS: &str = "reported";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DetectorSettings {
    pub arm_window: Duration,
    pub initial_scan_delay: std::time::Duration,
}

impl Default for DetectorSettings {
    fn default() -> Self {
        Self {
            arm_window: Duration::minutes(2),
            initial_scan_delay: std::time::Duration::from_secs(2),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Trigger {
    Click,
    Mutation,
    InitialScan,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DetectorPhase {
    Disarmed,
    Armed { since: DateTime<Utc> },
    Reported,
}

/// Summary of one mutation-observer callback.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MutationBatch {
    pub records: usize,
    pub added_nodes: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublishDetection {
    pub platform: String,
    pub title: String,
    pub url: String,
    pub status: String,
    pub trigger: Trigger,
    pub detected_at: DateTime<Utc>,
}

pub struct PublishDetector {
    profile: &'static PlatformProfile,
    pattern: Option<Regex>,
    settings: DetectorSettings,
    phase: DetectorPhase,
    reported_in_window: bool,
    reported_urls: HashSet<String>,
}

impl PublishDetector {
    pub fn new(profile: &'static PlatformProfile, settings: DetectorSettings) -> Self {
        let pattern = profile.published_regex();
        if pattern.is_none() {
            pilot_warn!("published pattern for {} does not compile", profile.id);
        }
        Self {
            profile,
            pattern,
            settings,
            phase: DetectorPhase::Disarmed,
            reported_in_window: false,
            reported_urls: HashSet::new(),
        }
    }

    pub fn phase(&self) -> DetectorPhase {
        self.phase
    }

    pub fn is_armed(&self, now: DateTime<Utc>) -> bool {
        match self.phase {
            DetectorPhase::Armed { since } => now - since <= self.settings.arm_window,
            _ => false,
        }
    }

    /// Click feed: `button_text` is the rendered text of the clicked button.
    /// Returns true when the click armed (or re-armed) the detector.
    pub fn on_click(&mut self, button_text: &str, now: DateTime<Utc>) -> bool {
        if !self.profile.is_publish_label(button_text) {
            return false;
        }
        match self.phase {
            DetectorPhase::Armed { .. } if self.is_armed(now) => {
                pilot_debug!("publish click while armed; restarting window");
            }
            _ => {
                self.reported_in_window = false;
                pilot_info!("publish detector armed by click on {:?}", button_text.trim());
            }
        }
        self.phase = DetectorPhase::Armed { since: now };
        true
    }

    /// Check run shortly after an arming click, for editors that swap to the
    /// published view without adding nodes the observer would see.
    pub fn after_click(&mut self, dom: &dyn Dom, now: DateTime<Utc>) -> Option<PublishDetection> {
        if !self.is_armed(now) || self.reported_in_window {
            return None;
        }
        self.detect(dom, Trigger::Click, now)
    }

    /// Mutation feed. Only batches that added nodes are inspected, and only
    /// inside an armed window.
    pub fn on_mutations(
        &mut self,
        dom: &dyn Dom,
        batch: MutationBatch,
        now: DateTime<Utc>,
    ) -> Option<PublishDetection> {
        if !matches!(self.phase, DetectorPhase::Armed { .. }) {
            return None;
        }
        if !self.is_armed(now) {
            pilot_debug!("publish window for {} expired without a signal", self.profile.id);
            self.phase = DetectorPhase::Disarmed;
            return None;
        }
        if batch.added_nodes == 0 || self.reported_in_window {
            return None;
        }
        self.detect(dom, Trigger::Mutation, now)
    }

    /// One unarmed pass, for pages that were already published when loaded.
    pub fn initial_scan(&mut self, dom: &dyn Dom, now: DateTime<Utc>) -> Option<PublishDetection> {
        if self.phase == DetectorPhase::Reported {
            return None;
        }
        self.detect(dom, Trigger::InitialScan, now)
    }

    fn detect(
        &mut self,
        dom: &dyn Dom,
        trigger: Trigger,
        now: DateTime<Utc>,
    ) -> Option<PublishDetection> {
        let pattern = self.pattern.as_ref()?;
        let candidates = match self.profile.published_finder {
            Some(finder) => finder(dom, pattern),
            None => published_urls(dom, pattern),
        };
        let url = candidates
            .into_iter()
            .find(|url| !self.reported_urls.contains(url))?;
        self.reported_urls.insert(url.clone());
        self.reported_in_window = true;
        self.phase = DetectorPhase::Reported;

        let title = resolve_title(dom, self.profile);
        pilot_info!("{} publish detected ({:?}): {}", self.profile.id, trigger, url);
        Some(PublishDetection {
            platform: self.profile.id.to_string(),
            title,
            url,
            status: REPORTED_STATUS.to_string(),
            trigger,
            detected_at: now,
        })
    }
}

/// Every published URL on the page, best first: the current URL, then
/// on-page anchors resolved against it, then visible text.
pub fn published_urls(dom: &dyn Dom, pattern: &Regex) -> Vec<String> {
    let mut found: Vec<String> = Vec::new();
    let mut push = |url: &str| {
        if !found.iter().any(|seen| seen == url) {
            found.push(url.to_string());
        }
    };

    let location = dom.location();
    if pattern.is_match(&location) {
        push(&location);
    }

    let base = Url::parse(&location).ok();
    for anchor in dom.query_selector_all("a[href]") {
        let Some(href) = dom.attribute(anchor, "href") else {
            continue;
        };
        let absolute = match Url::parse(href.trim()) {
            Ok(url) => Some(url),
            Err(_) => base.as_ref().and_then(|b| b.join(href.trim()).ok()),
        };
        if let Some(m) = absolute.as_ref().and_then(|url| pattern.find(url.as_str())) {
            push(m.as_str());
        }
    }

    if let Some(body) = dom.body() {
        for m in pattern.find_iter(&dom.inner_text(body)) {
            push(m.as_str());
        }
    }
    found
}

fn resolve_title(dom: &dyn Dom, profile: &PlatformProfile) -> String {
    find_element(dom, profile.title_selectors)
        .map(|node| editor_text(dom, node).trim().to_string())
        .filter(|title| !title.is_empty())
        .unwrap_or_else(|| dom.title().trim().to_string())
}
