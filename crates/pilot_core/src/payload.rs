use std::collections::BTreeMap;

use chrono::{DateTime, Duration, Utc};
use pilot_logging::{pilot_info, pilot_warn};
use serde::{Deserialize, Serialize};

use crate::store::{payload_key, payload_keys, Storage, StoreError, PREFERENCES_KEY};

/// How long a written payload stays applicable.
pub const PAYLOAD_TTL_SECS: i64 = 5 * 60;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PublishPayload {
    pub title: String,
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub html_content: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_images: Option<Vec<String>>,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub created_at: DateTime<Utc>,
}

impl PublishPayload {
    pub fn new(title: impl Into<String>, content: impl Into<String>, created_at: DateTime<Utc>) -> Self {
        Self {
            title: title.into(),
            content: content.into(),
            html_content: None,
            source_url: None,
            source_images: None,
            created_at,
        }
    }

    pub fn is_stale(&self, now: DateTime<Utc>) -> bool {
        now - self.created_at > Duration::seconds(PAYLOAD_TTL_SECS)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PayloadRead {
    Fresh(PublishPayload),
    /// Present but too old; it has been removed.
    Stale,
    /// Present but not a payload; it has been removed.
    Invalid,
    Missing,
}

/// Reads the payload for `platform`, removing it when it is stale or
/// unreadable. A fresh payload stays in storage until it is consumed.
pub fn read_payload(
    store: &mut dyn Storage,
    platform: &str,
    now: DateTime<Utc>,
) -> Result<PayloadRead, StoreError> {
    let key = payload_key(platform);
    let Some(value) = store.get(&key)? else {
        return Ok(PayloadRead::Missing);
    };
    match serde_json::from_value::<PublishPayload>(value) {
        Ok(payload) if payload.is_stale(now) => {
            pilot_info!(
                "discarding stale payload for {} created at {}",
                platform,
                payload.created_at
            );
            store.remove(&key)?;
            Ok(PayloadRead::Stale)
        }
        Ok(payload) => Ok(PayloadRead::Fresh(payload)),
        Err(err) => {
            pilot_warn!("removing unreadable payload for {}: {}", platform, err);
            store.remove(&key)?;
            Ok(PayloadRead::Invalid)
        }
    }
}

pub fn write_payload(
    store: &mut dyn Storage,
    platform: &str,
    payload: &PublishPayload,
) -> Result<(), StoreError> {
    let key = payload_key(platform);
    let value = serde_json::to_value(payload).map_err(|err| StoreError::Corrupt {
        key: key.clone(),
        message: err.to_string(),
    })?;
    store.set(&key, value)
}

/// Removes every stale or unreadable payload in storage; returns how many
/// were dropped.
pub fn sweep_stale_payloads(
    store: &mut dyn Storage,
    now: DateTime<Utc>,
) -> Result<usize, StoreError> {
    let mut removed = 0;
    for (_, platform) in payload_keys(store)? {
        if matches!(
            read_payload(store, &platform, now)?,
            PayloadRead::Stale | PayloadRead::Invalid
        ) {
            removed += 1;
        }
    }
    Ok(removed)
}

/// Global auto-publish switch layered over the per-platform defaults.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AutoPublishOverride {
    ForceOn,
    ForceOff,
    #[default]
    PerPlatform,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Preferences {
    #[serde(default)]
    pub auto_publish: AutoPublishOverride,
    #[serde(default)]
    pub platform_auto_publish: BTreeMap<String, bool>,
}

impl Preferences {
    pub fn load(store: &dyn Storage) -> Self {
        match store.get(PREFERENCES_KEY) {
            Ok(Some(value)) => serde_json::from_value(value).unwrap_or_else(|err| {
                pilot_warn!("ignoring unreadable preferences: {}", err);
                Self::default()
            }),
            Ok(None) => Self::default(),
            Err(err) => {
                pilot_warn!("could not read preferences: {}", err);
                Self::default()
            }
        }
    }

    pub fn save(&self, store: &mut dyn Storage) -> Result<(), StoreError> {
        let value = serde_json::to_value(self).map_err(|err| StoreError::Corrupt {
            key: PREFERENCES_KEY.to_string(),
            message: err.to_string(),
        })?;
        store.set(PREFERENCES_KEY, value)
    }

    pub fn resolve_auto_publish(&self, platform: &str, platform_default: bool) -> bool {
        match self.auto_publish {
            AutoPublishOverride::ForceOn => true,
            AutoPublishOverride::ForceOff => false,
            AutoPublishOverride::PerPlatform => self
                .platform_auto_publish
                .get(platform)
                .copied()
                .unwrap_or(platform_default),
        }
    }
}
