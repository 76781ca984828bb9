//! `pilot.ron`: everything the binary needs to know that is not a flag.
//!
//! Every field has a default, so an empty or missing file is a valid config.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

use pilot_core::{DetectorSettings, FillSettings};
use pilot_engine::{AgentSettings, FetchSettings, SessionSettings};
use pilot_logging::pilot_info;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("could not read config {path:?}: {source}")]
    Read { path: PathBuf, source: io::Error },
    #[error("could not parse config {path:?}: {source}")]
    Parse {
        path: PathBuf,
        source: ron::error::SpannedError,
    },
    #[error("could not encode config: {0}")]
    Encode(#[from] ron::Error),
    #[error("could not write config {path:?}: {source}")]
    Write { path: PathBuf, source: io::Error },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub store_dir: PathBuf,
    pub debug_bind: String,
    pub debug_server_url: String,
    pub report_url: Option<String>,
    pub account: String,
    pub log_level: String,
    pub timings: Timings,
    pub fetch: FetchSettings,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            store_dir: PathBuf::from("./pilot_store"),
            debug_bind: "127.0.0.1:8787".to_string(),
            debug_server_url: "http://127.0.0.1:8787".to_string(),
            report_url: None,
            account: String::new(),
            log_level: "info".to_string(),
            timings: Timings::default(),
            fetch: FetchSettings::default(),
        }
    }
}

/// Timer knobs in plain numbers so the file stays readable.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Timings {
    pub fill_attempts: u32,
    pub fill_interval_ms: u64,
    pub arm_window_secs: i64,
    pub initial_scan_delay_ms: u64,
    pub feed_interval_ms: u64,
    pub session_lifetime_secs: u64,
    pub debug_poll_ms: u64,
    pub http_timeout_secs: u64,
}

impl Default for Timings {
    fn default() -> Self {
        Self {
            fill_attempts: 15,
            fill_interval_ms: 1000,
            arm_window_secs: 120,
            initial_scan_delay_ms: 2000,
            feed_interval_ms: 200,
            session_lifetime_secs: 30 * 60,
            debug_poll_ms: 2000,
            http_timeout_secs: 10,
        }
    }
}

impl AppConfig {
    /// Reads `path`; a file that does not exist yields the defaults.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = match fs::read_to_string(path) {
            Ok(text) => text,
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                pilot_info!("no config at {:?}, using defaults", path);
                return Ok(Self::default());
            }
            Err(source) => {
                return Err(ConfigError::Read {
                    path: path.to_path_buf(),
                    source,
                })
            }
        };
        ron::from_str(&text).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        let text = ron::ser::to_string_pretty(self, ron::ser::PrettyConfig::new())?;
        fs::write(path, text).map_err(|source| ConfigError::Write {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn session_settings(&self) -> SessionSettings {
        let t = &self.timings;
        SessionSettings {
            fill: FillSettings {
                max_attempts: t.fill_attempts,
                interval: Duration::from_millis(t.fill_interval_ms),
            },
            detector: DetectorSettings {
                arm_window: chrono::Duration::seconds(t.arm_window_secs),
                initial_scan_delay: Duration::from_millis(t.initial_scan_delay_ms),
            },
            feed_interval: Duration::from_millis(t.feed_interval_ms),
            max_lifetime: Duration::from_secs(t.session_lifetime_secs),
            account: self.account.clone(),
        }
    }

    pub fn agent_settings(&self) -> AgentSettings {
        AgentSettings {
            server_url: self.debug_server_url.clone(),
            poll_interval: Duration::from_millis(self.timings.debug_poll_ms),
            request_timeout: self.http_timeout(),
        }
    }

    pub fn http_timeout(&self) -> Duration {
        Duration::from_secs(self.timings.http_timeout_secs)
    }
}
