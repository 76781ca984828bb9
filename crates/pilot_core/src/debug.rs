//! Remote debug channel records: sessions, queued commands and results.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

pub const SESSION_CODE_LEN: usize = 6;
/// Session code alphabet without look-alikes (0/O, 1/I).
pub const SESSION_CODE_ALPHABET: &[u8] = b"ABCDEFGHJKLMNPQRSTUVWXYZ23456789";
pub const COMMAND_TTL_SECS: i64 = 5 * 60;
pub const SESSION_STALE_SECS: i64 = 5 * 60;

pub fn is_valid_session_code(code: &str) -> bool {
    code.len() == SESSION_CODE_LEN && code.bytes().all(|b| SESSION_CODE_ALPHABET.contains(&b))
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DebugSession {
    pub code: String,
    pub plugin_info: Value,
    pub is_active: bool,
    pub last_heartbeat: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

impl DebugSession {
    pub fn new(code: String, plugin_info: Value, now: DateTime<Utc>) -> Self {
        Self {
            code,
            plugin_info,
            is_active: true,
            last_heartbeat: now,
            created_at: now,
        }
    }

    /// Active and heard from within the staleness window.
    pub fn is_alive(&self, now: DateTime<Utc>) -> bool {
        self.is_active && now - self.last_heartbeat <= Duration::seconds(SESSION_STALE_SECS)
    }

    pub fn heartbeat(&mut self, now: DateTime<Utc>) {
        self.last_heartbeat = now;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CommandKind {
    Query,
    GetHtml,
    SetHtml,
    Click,
    SetValue,
    Evaluate,
    ListInputs,
    DescribeElement,
    Scroll,
    Sleep,
    PageInfo,
    FindByText,
    Highlight,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CommandStatus {
    Pending,
    Executing,
    Completed,
    Failed,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DebugCommand {
    pub id: String,
    pub session_code: String,
    #[serde(rename = "type")]
    pub kind: CommandKind,
    #[serde(default)]
    pub data: Value,
    pub status: CommandStatus,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ClaimError {
    #[error("command already {0:?}")]
    NotPending(CommandStatus),
    #[error("command expired before it was claimed")]
    Expired,
}

impl DebugCommand {
    pub fn new(
        id: String,
        session_code: String,
        kind: CommandKind,
        data: Value,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            session_code,
            kind,
            data,
            status: CommandStatus::Pending,
            created_at: now,
            expires_at: now + Duration::seconds(COMMAND_TTL_SECS),
        }
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now > self.expires_at
    }

    /// pending -> executing, at most once and never after expiry.
    pub fn claim(&mut self, now: DateTime<Utc>) -> Result<(), ClaimError> {
        if self.status != CommandStatus::Pending {
            return Err(ClaimError::NotPending(self.status));
        }
        if self.is_expired(now) {
            return Err(ClaimError::Expired);
        }
        self.status = CommandStatus::Executing;
        Ok(())
    }

    pub fn resolve(&mut self, result_type: ResultType) {
        self.status = match result_type {
            ResultType::Success => CommandStatus::Completed,
            ResultType::Error => CommandStatus::Failed,
        };
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResultType {
    Success,
    Error,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DebugResult {
    pub command_id: String,
    pub result_type: ResultType,
    pub result_data: Value,
    pub execution_time_ms: u64,
    pub received_at: DateTime<Utc>,
}
