//! Page-side end of the debug channel: registers the page with a debug
//! server, polls for commands and posts their results.

use std::time::{Duration, Instant};

use pilot_core::debug::{DebugCommand, ResultType};
use pilot_core::dispatch::{self, Deferred};
use pilot_logging::{pilot_debug, pilot_info, pilot_warn};
use reqwest::header::CONTENT_TYPE;
use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};
use thiserror::Error;
use tokio::time::{interval, sleep, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use crate::session::{lock, SharedPage};

#[derive(Debug, Clone)]
pub struct AgentSettings {
    /// Base URL of the debug server, without the `/debug` prefix.
    pub server_url: String,
    pub poll_interval: Duration,
    pub request_timeout: Duration,
}

impl Default for AgentSettings {
    fn default() -> Self {
        Self {
            server_url: "http://127.0.0.1:8787".to_string(),
            poll_interval: Duration::from_secs(2),
            request_timeout: Duration::from_secs(10),
        }
    }
}

#[derive(Debug, Error)]
pub enum AgentError {
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("server answered {status}: {body}")]
    Status { status: u16, body: String },
    #[error("session {0} no longer exists on the server")]
    SessionGone(String),
    #[error("bad response body: {0}")]
    Decode(#[from] serde_json::Error),
}

/// How a finished agent run ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AgentExit {
    pub code: String,
    pub executed: u64,
    /// The server closed the session before the agent was stopped.
    pub closed_by_server: bool,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RegisterResponse {
    verification_code: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PollResponse {
    has_command: bool,
    #[serde(default)]
    command: Option<DebugCommand>,
}

pub struct DebugAgent {
    settings: AgentSettings,
    client: reqwest::Client,
    page: SharedPage,
    plugin_info: Value,
}

impl DebugAgent {
    pub fn new(
        settings: AgentSettings,
        page: SharedPage,
        plugin_info: Value,
    ) -> Result<Self, AgentError> {
        let client = reqwest::Client::builder()
            .timeout(settings.request_timeout)
            .build()?;
        Ok(Self {
            settings,
            client,
            page,
            plugin_info,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/debug/{}", self.settings.server_url.trim_end_matches('/'), path)
    }

    pub async fn register(&self) -> Result<String, AgentError> {
        let body = json!({ "pluginInfo": self.plugin_info });
        let response: RegisterResponse = self
            .send(self.client.post(self.url("session")), Some(&body), None)
            .await?;
        pilot_info!("debug session code: {}", response.verification_code);
        Ok(response.verification_code)
    }

    /// Registers, then polls until `cancel` fires or the server drops the
    /// session. Stopping closes the session server-side.
    pub async fn run(self, cancel: CancellationToken) -> Result<AgentExit, AgentError> {
        let code = self.register().await?;
        let mut exit = AgentExit {
            code: code.clone(),
            executed: 0,
            closed_by_server: false,
        };

        let mut ticker = interval(self.settings.poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {}
            }
            match self.poll(&code).await {
                Ok(Some(command)) => {
                    self.handle(&code, command, &cancel).await;
                    exit.executed += 1;
                }
                Ok(None) => {}
                Err(AgentError::SessionGone(_)) => {
                    pilot_info!("debug session {} closed by the server", code);
                    exit.closed_by_server = true;
                    return Ok(exit);
                }
                Err(err) => pilot_warn!("debug poll failed: {}", err),
            }
        }

        if let Err(err) = self.close(&code).await {
            pilot_warn!("could not close debug session {}: {}", code, err);
        }
        Ok(exit)
    }

    async fn poll(&self, code: &str) -> Result<Option<DebugCommand>, AgentError> {
        let response: PollResponse = self
            .send(self.client.get(self.url(&format!("poll/{code}"))), None, Some(code))
            .await?;
        Ok(response.command.filter(|_| response.has_command))
    }

    async fn handle(&self, code: &str, command: DebugCommand, cancel: &CancellationToken) {
        pilot_debug!("executing {:?} command {}", command.kind, command.id);
        let started = Instant::now();
        let outcome = {
            let mut page = lock(&self.page);
            dispatch::execute(&mut *page, command.kind, &command.data)
        };

        let (result_type, result_data) = match outcome {
            Ok(output) => {
                match output.deferred {
                    Some(Deferred::Sleep(duration)) => {
                        tokio::select! {
                            _ = cancel.cancelled() => {}
                            _ = sleep(duration) => {}
                        }
                    }
                    Some(Deferred::ClearHighlight {
                        node,
                        after,
                        previous_style,
                    }) => {
                        let page = self.page.clone();
                        tokio::spawn(async move {
                            sleep(after).await;
                            let mut page = lock(&page);
                            dispatch::clear_highlight(&mut *page, node, previous_style.as_deref());
                        });
                    }
                    None => {}
                }
                (ResultType::Success, output.value)
            }
            Err(err) => {
                pilot_debug!("command {} failed: {}", command.id, err);
                (ResultType::Error, json!({ "error": err.to_string() }))
            }
        };

        let body = json!({
            "commandId": command.id,
            "code": code,
            "resultType": result_type,
            "resultData": result_data,
            "executionTime": started.elapsed().as_millis() as u64,
        });
        let posted: Result<Value, AgentError> = self
            .send(self.client.post(self.url("result")), Some(&body), Some(code))
            .await;
        if let Err(err) = posted {
            pilot_warn!("result for command {} not delivered: {}", command.id, err);
        }
    }

    async fn close(&self, code: &str) -> Result<(), AgentError> {
        let response = self
            .client
            .delete(self.url(&format!("session/{code}")))
            .send()
            .await?;
        let status = response.status();
        if status.is_success() || status == StatusCode::NOT_FOUND {
            pilot_info!("debug session {} closed", code);
            return Ok(());
        }
        Err(AgentError::Status {
            status: status.as_u16(),
            body: response.text().await.unwrap_or_default(),
        })
    }

    /// Sends `request` with an optional JSON body and decodes a JSON answer.
    /// 404/410 for a request scoped to `session` mean the session is gone.
    async fn send<T: DeserializeOwned>(
        &self,
        request: reqwest::RequestBuilder,
        body: Option<&Value>,
        session: Option<&str>,
    ) -> Result<T, AgentError> {
        let request = match body {
            Some(body) => request
                .header(CONTENT_TYPE, "application/json")
                .body(serde_json::to_vec(body)?),
            None => request,
        };
        let response = request.send().await?;
        let status = response.status();
        if let Some(code) = session {
            if status == StatusCode::NOT_FOUND || status == StatusCode::GONE {
                return Err(AgentError::SessionGone(code.to_string()));
            }
        }
        let bytes = response.bytes().await?;
        if !status.is_success() {
            return Err(AgentError::Status {
                status: status.as_u16(),
                body: String::from_utf8_lossy(&bytes).into_owned(),
            });
        }
        Ok(serde_json::from_slice(&bytes)?)
    }
}
