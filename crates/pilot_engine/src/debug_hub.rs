//! Operator-side state of the remote debug channel: sessions, the command
//! queue and results. Everything lives in memory behind one lock.

use std::collections::HashMap;

use chrono::{DateTime, Duration, Utc};
use pilot_core::debug::{
    ClaimError, CommandKind, CommandStatus, DebugCommand, DebugResult, DebugSession, ResultType,
    SESSION_CODE_ALPHABET, SESSION_CODE_LEN,
};
use pilot_logging::{pilot_debug, pilot_info};
use rand::Rng;
use serde::Serialize;
use serde_json::{json, Value};
use thiserror::Error;
use tokio::sync::RwLock;

use crate::{system_clock, Clock};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum HubError {
    #[error("unknown session {0}")]
    UnknownSession(String),
    #[error("session {0} is closed or expired")]
    SessionGone(String),
    #[error("unknown command {0}")]
    UnknownCommand(String),
    #[error("command {command_id} does not belong to session {code}")]
    WrongSession { command_id: String, code: String },
    #[error("command {command_id} is {status:?} and cannot take a result")]
    NotExecuting {
        command_id: String,
        status: CommandStatus,
    },
}

/// A command together with its result, once there is one.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CommandRecord {
    pub command: DebugCommand,
    pub result: Option<DebugResult>,
}

#[derive(Default)]
struct HubState {
    sessions: HashMap<String, DebugSession>,
    commands: HashMap<String, DebugCommand>,
    /// Command ids in creation order.
    order: Vec<String>,
    results: HashMap<String, DebugResult>,
}

impl HubState {
    fn record(&self, command_id: &str) -> Option<CommandRecord> {
        let command = self.commands.get(command_id)?.clone();
        let result = self.results.get(command_id).cloned();
        Some(CommandRecord { command, result })
    }

    /// Forgets sessions silent for longer than `retention`, every command
    /// older than that, and whatever belonged to them.
    fn prune(&mut self, now: DateTime<Utc>, retention: Duration) {
        let before = (self.sessions.len(), self.commands.len());
        self.sessions
            .retain(|_, session| now - session.last_heartbeat <= retention);
        let sessions = &self.sessions;
        self.commands.retain(|_, command| {
            sessions.contains_key(&command.session_code) && now - command.created_at <= retention
        });
        let commands = &self.commands;
        self.results.retain(|id, _| commands.contains_key(id));
        self.order.retain(|id| commands.contains_key(id));
        let dropped = (
            before.0 - self.sessions.len(),
            before.1 - self.commands.len(),
        );
        if dropped != (0, 0) {
            pilot_debug!("pruned {} sessions and {} commands", dropped.0, dropped.1);
        }
    }

    /// Gives unclaimed commands of `code` a terminal error result so they can
    /// never run. With `only_expired` the live ones are left queued.
    fn drop_pending(
        &mut self,
        code: &str,
        now: DateTime<Utc>,
        only_expired: bool,
        reason: &str,
    ) {
        for id in &self.order {
            let Some(command) = self.commands.get_mut(id) else {
                continue;
            };
            let expired = command.status == CommandStatus::Pending
                && command.session_code == code
                && (!only_expired || command.is_expired(now));
            if !expired {
                continue;
            }
            command.resolve(ResultType::Error);
            self.results.insert(
                id.clone(),
                DebugResult {
                    command_id: id.clone(),
                    result_type: ResultType::Error,
                    result_data: json!({ "error": reason }),
                    execution_time_ms: 0,
                    received_at: now,
                },
            );
            pilot_debug!("command {} dropped: {}", id, reason);
        }
    }
}

const EXPIRED_REASON: &str = "command expired before it was claimed";
const CLOSED_REASON: &str = "session closed before the command was claimed";

/// How long a silent session, and any command, is kept for inspection.
pub const RETENTION_SECS: i64 = 60 * 60;

pub struct DebugHub {
    state: RwLock<HubState>,
    clock: Clock,
    retention: Duration,
}

impl Default for DebugHub {
    fn default() -> Self {
        Self::new()
    }
}

impl DebugHub {
    pub fn new() -> Self {
        Self::with_clock(system_clock())
    }

    pub fn with_clock(clock: Clock) -> Self {
        Self {
            state: RwLock::new(HubState::default()),
            clock,
            retention: Duration::seconds(RETENTION_SECS),
        }
    }

    pub fn with_retention(mut self, retention: Duration) -> Self {
        self.retention = retention;
        self
    }

    pub async fn create_session(&self, plugin_info: Value) -> DebugSession {
        let now = (self.clock)();
        let mut state = self.state.write().await;
        state.prune(now, self.retention);
        let code = loop {
            let candidate = generate_code();
            if !state.sessions.contains_key(&candidate) {
                break candidate;
            }
        };
        let session = DebugSession::new(code.clone(), plugin_info, now);
        state.sessions.insert(code.clone(), session.clone());
        pilot_info!("debug session {} registered", code);
        session
    }

    pub async fn create_command(
        &self,
        code: &str,
        kind: CommandKind,
        data: Value,
    ) -> Result<DebugCommand, HubError> {
        let now = (self.clock)();
        let mut state = self.state.write().await;
        let session = state
            .sessions
            .get(code)
            .ok_or_else(|| HubError::UnknownSession(code.to_string()))?;
        if !session.is_alive(now) {
            return Err(HubError::SessionGone(code.to_string()));
        }
        let command = DebugCommand::new(
            uuid::Uuid::new_v4().to_string(),
            code.to_string(),
            kind,
            data,
            now,
        );
        state.order.push(command.id.clone());
        state.commands.insert(command.id.clone(), command.clone());
        pilot_debug!("queued {:?} command {} for {}", kind, command.id, code);
        Ok(command)
    }

    /// Page-side poll: refreshes the heartbeat and claims the oldest pending
    /// command, if any. A claimed command is never handed out again.
    pub async fn poll(&self, code: &str) -> Result<Option<DebugCommand>, HubError> {
        let now = (self.clock)();
        let mut state = self.state.write().await;
        state.prune(now, self.retention);
        let session = state
            .sessions
            .get_mut(code)
            .ok_or_else(|| HubError::UnknownSession(code.to_string()))?;
        if !session.is_active {
            return Err(HubError::SessionGone(code.to_string()));
        }
        session.heartbeat(now);

        state.drop_pending(code, now, true, EXPIRED_REASON);
        let next = state.order.iter().find(|id| {
            state
                .commands
                .get(*id)
                .is_some_and(|c| c.session_code == code && c.status == CommandStatus::Pending)
        });
        let Some(id) = next.cloned() else {
            return Ok(None);
        };
        let Some(command) = state.commands.get_mut(&id) else {
            return Ok(None);
        };
        match command.claim(now) {
            Ok(()) => Ok(Some(command.clone())),
            Err(ClaimError::Expired | ClaimError::NotPending(_)) => Ok(None),
        }
    }

    pub async fn submit_result(
        &self,
        command_id: &str,
        code: &str,
        result_type: ResultType,
        result_data: Value,
        execution_time_ms: u64,
    ) -> Result<CommandRecord, HubError> {
        let now = (self.clock)();
        let mut state = self.state.write().await;
        let command = state
            .commands
            .get_mut(command_id)
            .ok_or_else(|| HubError::UnknownCommand(command_id.to_string()))?;
        if command.session_code != code {
            return Err(HubError::WrongSession {
                command_id: command_id.to_string(),
                code: code.to_string(),
            });
        }
        if command.status != CommandStatus::Executing {
            return Err(HubError::NotExecuting {
                command_id: command_id.to_string(),
                status: command.status,
            });
        }
        command.resolve(result_type);
        let result = DebugResult {
            command_id: command_id.to_string(),
            result_type,
            result_data,
            execution_time_ms,
            received_at: now,
        };
        state.results.insert(command_id.to_string(), result);
        if let Some(session) = state.sessions.get_mut(code) {
            session.heartbeat(now);
        }
        state
            .record(command_id)
            .ok_or_else(|| HubError::UnknownCommand(command_id.to_string()))
    }

    pub async fn result(&self, command_id: &str) -> Result<CommandRecord, HubError> {
        self.state
            .read()
            .await
            .record(command_id)
            .ok_or_else(|| HubError::UnknownCommand(command_id.to_string()))
    }

    /// Sessions heard from within the staleness window.
    pub async fn active_sessions(&self) -> Vec<DebugSession> {
        let now = (self.clock)();
        let state = self.state.read().await;
        let mut sessions: Vec<DebugSession> = state
            .sessions
            .values()
            .filter(|s| s.is_alive(now))
            .cloned()
            .collect();
        sessions.sort_by_key(|s| s.created_at);
        sessions
    }

    pub async fn history(&self, code: &str) -> Result<Vec<CommandRecord>, HubError> {
        let state = self.state.read().await;
        if !state.sessions.contains_key(code) {
            return Err(HubError::UnknownSession(code.to_string()));
        }
        Ok(state
            .order
            .iter()
            .filter(|id| {
                state
                    .commands
                    .get(*id)
                    .is_some_and(|c| c.session_code == code)
            })
            .filter_map(|id| state.record(id))
            .collect())
    }

    pub async fn close_session(&self, code: &str) -> Result<(), HubError> {
        let now = (self.clock)();
        let mut state = self.state.write().await;
        let session = state
            .sessions
            .get_mut(code)
            .ok_or_else(|| HubError::UnknownSession(code.to_string()))?;
        session.is_active = false;
        state.drop_pending(code, now, false, CLOSED_REASON);
        pilot_info!("debug session {} closed", code);
        Ok(())
    }
}

fn generate_code() -> String {
    let mut rng = rand::thread_rng();
    (0..SESSION_CODE_LEN)
        .map(|_| SESSION_CODE_ALPHABET[rng.gen_range(0..SESSION_CODE_ALPHABET.len())] as char)
        .collect()
}
