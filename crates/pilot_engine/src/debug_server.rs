//! HTTP surface of the debug hub.
//!
//! - POST   /debug/session            - register a page, returns its code
//! - POST   /debug/command            - queue a command for a session
//! - GET    /debug/poll/{code}        - claim the next command (heartbeat)
//! - POST   /debug/result             - post a command result
//! - GET    /debug/result/{commandId} - command and result
//! - GET    /debug/sessions           - live sessions
//! - DELETE /debug/session/{code}     - close a session
//! - GET    /debug/history/{code}     - every command of a session

use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    extract::{rejection::JsonRejection, Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{delete, get, post},
    Json, Router,
};
use pilot_core::debug::{CommandKind, ResultType};
use pilot_logging::{pilot_info, pilot_warn};
use serde::Deserialize;
use serde_json::{json, Value};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

use crate::debug_hub::{DebugHub, HubError};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CreateSessionBody {
    #[serde(default)]
    plugin_info: Value,
}

#[derive(Debug, Deserialize)]
struct CreateCommandBody {
    code: String,
    #[serde(rename = "type")]
    kind: CommandKind,
    #[serde(default)]
    data: Value,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ResultBody {
    command_id: String,
    code: String,
    result_type: ResultType,
    #[serde(default)]
    result_data: Value,
    #[serde(default)]
    execution_time: u64,
}

impl IntoResponse for HubError {
    fn into_response(self) -> Response {
        let status = match &self {
            HubError::UnknownSession(_) | HubError::UnknownCommand(_) => StatusCode::NOT_FOUND,
            HubError::SessionGone(_) => StatusCode::GONE,
            HubError::WrongSession { .. } => StatusCode::BAD_REQUEST,
            HubError::NotExecuting { .. } => StatusCode::CONFLICT,
        };
        (status, Json(json!({ "error": self.to_string() }))).into_response()
    }
}

fn bad_request(rejection: JsonRejection) -> Response {
    (
        StatusCode::BAD_REQUEST,
        Json(json!({ "error": rejection.body_text() })),
    )
        .into_response()
}

pub fn router(hub: Arc<DebugHub>) -> Router {
    Router::new()
        .route("/debug/session", post(create_session))
        .route("/debug/session/{code}", delete(close_session))
        .route("/debug/command", post(create_command))
        .route("/debug/poll/{code}", get(poll))
        .route("/debug/result", post(submit_result))
        .route("/debug/result/{command_id}", get(get_result))
        .route("/debug/sessions", get(list_sessions))
        .route("/debug/history/{code}", get(history))
        .with_state(hub)
}

/// Serves the debug surface on `listener` until `cancel` trips.
pub async fn serve(
    listener: TcpListener,
    hub: Arc<DebugHub>,
    cancel: CancellationToken,
) -> std::io::Result<()> {
    let addr: Option<SocketAddr> = listener.local_addr().ok();
    pilot_info!("debug server listening on {:?}", addr);
    axum::serve(listener, router(hub))
        .with_graceful_shutdown(async move { cancel.cancelled().await })
        .await
}

async fn create_session(
    State(hub): State<Arc<DebugHub>>,
    body: Result<Json<CreateSessionBody>, JsonRejection>,
) -> Response {
    let Json(body) = match body {
        Ok(body) => body,
        Err(rejection) => return bad_request(rejection),
    };
    let session = hub.create_session(body.plugin_info).await;
    (
        StatusCode::CREATED,
        Json(json!({ "verificationCode": session.code })),
    )
        .into_response()
}

async fn create_command(
    State(hub): State<Arc<DebugHub>>,
    body: Result<Json<CreateCommandBody>, JsonRejection>,
) -> Response {
    let Json(body) = match body {
        Ok(body) => body,
        Err(rejection) => return bad_request(rejection),
    };
    match hub.create_command(&body.code, body.kind, body.data).await {
        Ok(command) => (
            StatusCode::CREATED,
            Json(json!({ "commandId": command.id })),
        )
            .into_response(),
        Err(err) => err.into_response(),
    }
}

async fn poll(State(hub): State<Arc<DebugHub>>, Path(code): Path<String>) -> Response {
    match hub.poll(&code).await {
        Ok(Some(command)) => Json(json!({ "hasCommand": true, "command": command })).into_response(),
        Ok(None) => Json(json!({ "hasCommand": false })).into_response(),
        Err(err) => err.into_response(),
    }
}

async fn submit_result(
    State(hub): State<Arc<DebugHub>>,
    body: Result<Json<ResultBody>, JsonRejection>,
) -> Response {
    let Json(body) = match body {
        Ok(body) => body,
        Err(rejection) => return bad_request(rejection),
    };
    let submitted = hub
        .submit_result(
            &body.command_id,
            &body.code,
            body.result_type,
            body.result_data,
            body.execution_time,
        )
        .await;
    match submitted {
        Ok(record) => Json(json!(record)).into_response(),
        Err(err) => {
            pilot_warn!("result for {} rejected: {}", body.command_id, err);
            err.into_response()
        }
    }
}

async fn get_result(
    State(hub): State<Arc<DebugHub>>,
    Path(command_id): Path<String>,
) -> Response {
    match hub.result(&command_id).await {
        Ok(record) => Json(json!(record)).into_response(),
        Err(err) => err.into_response(),
    }
}

async fn list_sessions(State(hub): State<Arc<DebugHub>>) -> Response {
    let sessions = hub.active_sessions().await;
    Json(json!({ "count": sessions.len(), "sessions": sessions })).into_response()
}

async fn close_session(State(hub): State<Arc<DebugHub>>, Path(code): Path<String>) -> Response {
    match hub.close_session(&code).await {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(err) => err.into_response(),
    }
}

async fn history(State(hub): State<Arc<DebugHub>>, Path(code): Path<String>) -> Response {
    match hub.history(&code).await {
        Ok(records) => Json(json!({ "code": code, "commands": records })).into_response(),
        Err(err) => err.into_response(),
    }
}
