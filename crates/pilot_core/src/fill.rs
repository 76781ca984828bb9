//! Bounded polling fill of a destination editor.
//!
//! `Idle -> Polling -> {Filled | GaveUp}`; `stop` moves any non-terminal
//! phase to `Stopped`. The caller owns the timer and calls [`FillController::tick`]
//! once per interval.

use std::time::Duration;

use chrono::{DateTime, Utc};
use pilot_logging::{pilot_debug, pilot_error, pilot_info, pilot_warn};

use crate::content::{fill_content, fill_title};
use crate::dom::Dom;
use crate::locator::find_element;
use crate::payload::{read_payload, PayloadRead, Preferences, PublishPayload};
use crate::platform::PlatformProfile;
use crate::store::{payload_key, Storage, StoreError};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FillSettings {
    pub max_attempts: u32,
    pub interval: Duration,
}

impl Default for FillSettings {
    fn default() -> Self {
        Self {
            max_attempts: 15,
            interval: Duration::from_secs(1),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FillPhase {
    Idle,
    Polling,
    Filled,
    GaveUp,
    Stopped,
}

impl FillPhase {
    pub fn is_terminal(self) -> bool {
        matches!(self, FillPhase::Filled | FillPhase::GaveUp | FillPhase::Stopped)
    }
}

/// Handed to the completion callback after a successful pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FillCompletion {
    pub payload: PublishPayload,
    pub auto_publish: bool,
    pub title_filled: bool,
    pub body_filled: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FillOutcome {
    /// Not polling; nothing was attempted.
    Inactive,
    /// Editor not ready yet.
    Waiting { attempt: u32 },
    Filled(FillCompletion),
    GaveUp { attempts: u32 },
}

pub struct FillController {
    profile: &'static PlatformProfile,
    settings: FillSettings,
    phase: FillPhase,
    attempts: u32,
    payload: Option<PublishPayload>,
    auto_publish: bool,
}

impl FillController {
    pub fn new(profile: &'static PlatformProfile, settings: FillSettings) -> Self {
        Self {
            profile,
            settings,
            phase: FillPhase::Idle,
            attempts: 0,
            payload: None,
            auto_publish: false,
        }
    }

    pub fn phase(&self) -> FillPhase {
        self.phase
    }

    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    pub fn settings(&self) -> &FillSettings {
        &self.settings
    }

    /// Loads the pending payload and enters `Polling`. Without a fresh
    /// payload the controller stays `Idle` and never touches the page.
    pub fn start(
        &mut self,
        store: &mut dyn Storage,
        now: DateTime<Utc>,
    ) -> Result<FillPhase, StoreError> {
        if self.phase != FillPhase::Idle {
            return Ok(self.phase);
        }
        let payload = match read_payload(store, self.profile.id, now)? {
            PayloadRead::Fresh(payload) => payload,
            other => {
                pilot_debug!("no payload to fill for {}: {:?}", self.profile.id, other);
                return Ok(self.phase);
            }
        };
        let preferences = Preferences::load(store);
        self.auto_publish =
            preferences.resolve_auto_publish(self.profile.id, self.profile.auto_publish_default);
        self.payload = Some(payload);
        self.phase = FillPhase::Polling;
        pilot_info!(
            "filling {} (auto publish: {}), up to {} attempts",
            self.profile.id,
            self.auto_publish,
            self.settings.max_attempts
        );
        Ok(self.phase)
    }

    /// One fill pass. Counts as an attempt whatever happens.
    pub fn tick(&mut self, dom: &mut dyn Dom, store: &mut dyn Storage) -> FillOutcome {
        if self.phase != FillPhase::Polling {
            return FillOutcome::Inactive;
        }
        self.attempts += 1;

        let title = find_element(&*dom, self.profile.title_selectors);
        let editor = find_element(&*dom, self.profile.editor_selectors);
        let (Some(title), Some(editor)) = (title, editor) else {
            if self.attempts >= self.settings.max_attempts {
                self.phase = FillPhase::GaveUp;
                self.payload = None;
                pilot_error!(
                    "gave up filling {} after {} attempts: editor never became available",
                    self.profile.id,
                    self.attempts
                );
                return FillOutcome::GaveUp {
                    attempts: self.attempts,
                };
            }
            pilot_debug!(
                "{} editor not ready (attempt {}/{})",
                self.profile.id,
                self.attempts,
                self.settings.max_attempts
            );
            return FillOutcome::Waiting {
                attempt: self.attempts,
            };
        };

        let Some(payload) = self.payload.take() else {
            self.phase = FillPhase::Stopped;
            return FillOutcome::Inactive;
        };

        let title_filled = fill_title(dom, title, &payload.title);
        let body_filled = fill_content(dom, editor, &payload);
        if let Err(err) = store.remove(&payload_key(self.profile.id)) {
            pilot_warn!("could not remove consumed payload for {}: {}", self.profile.id, err);
        }
        self.phase = FillPhase::Filled;
        pilot_info!(
            "filled {} on attempt {} (title: {}, body: {})",
            self.profile.id,
            self.attempts,
            title_filled,
            body_filled
        );

        FillOutcome::Filled(FillCompletion {
            payload,
            auto_publish: self.auto_publish,
            title_filled,
            body_filled,
        })
    }

    /// Idempotent; a finished controller stays in its terminal phase.
    pub fn stop(&mut self) {
        if !self.phase.is_terminal() {
            self.phase = FillPhase::Stopped;
            self.payload = None;
        }
    }
}
