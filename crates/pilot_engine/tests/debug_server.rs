use std::sync::Arc;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use pilot_engine::debug_server::router;
use pilot_engine::DebugHub;
use pretty_assertions::assert_eq;
use serde_json::{json, Value};
use tower::ServiceExt;

fn app() -> Router {
    router(Arc::new(DebugHub::new()))
}

async fn send(app: &Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    let request = Request::builder().method(method).uri(uri);
    let request = match body {
        Some(body) => request
            .header("content-type", "application/json")
            .body(Body::from(serde_json::to_vec(&body).unwrap())),
        None => request.body(Body::empty()),
    }
    .unwrap();
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, value)
}

async fn register(app: &Router) -> String {
    let (status, body) = send(
        app,
        "POST",
        "/debug/session",
        Some(json!({"pluginInfo": {"version": "2.3.0"}})),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    body["verificationCode"].as_str().unwrap().to_string()
}

#[tokio::test]
async fn fresh_session_polls_empty() {
    let app = app();
    let code = register(&app).await;
    assert_eq!(code.len(), 6);

    let (status, body) = send(&app, "GET", &format!("/debug/poll/{code}"), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({"hasCommand": false}));
}

#[tokio::test]
async fn command_round_trip_through_the_http_surface() {
    let app = app();
    let code = register(&app).await;

    let (status, body) = send(
        &app,
        "POST",
        "/debug/command",
        Some(json!({"code": code, "type": "query", "data": {"selector": "button"}})),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    let command_id = body["commandId"].as_str().unwrap().to_string();

    let (_, polled) = send(&app, "GET", &format!("/debug/poll/{code}"), None).await;
    assert_eq!(polled["hasCommand"], true);
    assert_eq!(polled["command"]["id"], command_id.as_str());
    assert_eq!(polled["command"]["type"], "query");
    assert_eq!(polled["command"]["status"], "executing");
    assert_eq!(polled["command"]["data"], json!({"selector": "button"}));

    let (_, again) = send(&app, "GET", &format!("/debug/poll/{code}"), None).await;
    assert_eq!(again, json!({"hasCommand": false}));

    let result = json!({
        "commandId": command_id,
        "code": code,
        "resultType": "success",
        "resultData": {"count": 1},
        "executionTime": 7
    });
    let (status, _) = send(&app, "POST", "/debug/result", Some(result.clone())).await;
    assert_eq!(status, StatusCode::OK);
    let (status, _) = send(&app, "POST", "/debug/result", Some(result)).await;
    assert_eq!(status, StatusCode::CONFLICT);

    let (status, record) = send(&app, "GET", &format!("/debug/result/{command_id}"), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(record["command"]["status"], "completed");
    assert_eq!(record["result"]["resultType"], "success");
    assert_eq!(record["result"]["resultData"], json!({"count": 1}));
    assert_eq!(record["result"]["executionTimeMs"], 7);

    let (_, history) = send(&app, "GET", &format!("/debug/history/{code}"), None).await;
    assert_eq!(history["commands"].as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn sessions_are_listed_until_closed() {
    let app = app();
    let code = register(&app).await;

    let (_, listed) = send(&app, "GET", "/debug/sessions", None).await;
    assert_eq!(listed["count"], 1);
    assert_eq!(listed["sessions"][0]["code"], code.as_str());
    assert_eq!(listed["sessions"][0]["pluginInfo"], json!({"version": "2.3.0"}));

    let (status, _) = send(&app, "DELETE", &format!("/debug/session/{code}"), None).await;
    assert_eq!(status, StatusCode::NO_CONTENT);
    let (_, listed) = send(&app, "GET", "/debug/sessions", None).await;
    assert_eq!(listed["count"], 0);

    let (status, _) = send(
        &app,
        "POST",
        "/debug/command",
        Some(json!({"code": code, "type": "page_info"})),
    )
    .await;
    assert_eq!(status, StatusCode::GONE);
}

#[tokio::test]
async fn unknown_sessions_and_commands_are_not_found() {
    let app = app();
    let (status, body) = send(&app, "GET", "/debug/poll/ABCDEF", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert!(body["error"].as_str().unwrap().contains("ABCDEF"));

    let (status, _) = send(
        &app,
        "POST",
        "/debug/command",
        Some(json!({"code": "ABCDEF", "type": "click", "data": {}})),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = send(&app, "GET", "/debug/result/missing", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    let (status, _) = send(&app, "DELETE", "/debug/session/ABCDEF", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn malformed_bodies_are_bad_requests() {
    let app = app();
    let code = register(&app).await;

    let request = Request::builder()
        .method("POST")
        .uri("/debug/command")
        .header("content-type", "application/json")
        .body(Body::from("{ not json"))
        .unwrap();
    let response = app.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let (status, _) = send(
        &app,
        "POST",
        "/debug/command",
        Some(json!({"code": code, "type": "teleport"})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = send(&app, "POST", "/debug/result", Some(json!({"code": code}))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}
