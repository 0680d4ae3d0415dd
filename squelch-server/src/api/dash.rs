use std::sync::Arc;
use std::time::Duration;

use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Deserialize;
use serde_json::{json, Value};
use squelch_core::ClientId;
use tracing::{info, warn};

use crate::api::auth::bearer_token;
use crate::app::App;
use crate::session::SessionEvent;

#[derive(Deserialize)]
pub struct LoginBody {
    pub password: String,
}

pub async fn login(State(app): State<Arc<App>>, Json(body): Json<LoginBody>) -> Response {
    match app
        .dash
        .login(&body.password, app.config.dash_password.as_deref())
    {
        Some(token) => Json(json!({ "success": true, "token": token })).into_response(),
        None => unauthorized(),
    }
}

pub async fn logout(State(app): State<Arc<App>>, headers: HeaderMap) -> Json<Value> {
    if let Some(token) = bearer_token(&headers) {
        app.dash.logout(token);
    }
    Json(json!({ "success": true }))
}

pub async fn status(State(app): State<Arc<App>>, headers: HeaderMap) -> Response {
    if let Err(denied) = require_auth(&app, &headers) {
        return denied;
    }
    Json(json!({
        "success": true,
        "uptimeSeconds": app.started_at.elapsed().as_secs(),
        "clients": app.registry.len(),
        "p2pConnections": app.fanout.connected_count(),
        "pushSubscriptions": app.push.len(),
        "memory": { "rssKb": rss_kb() },
    }))
    .into_response()
}

pub async fn clients(State(app): State<Arc<App>>, headers: HeaderMap) -> Response {
    if let Err(denied) = require_auth(&app, &headers) {
        return denied;
    }
    let clients: Vec<Value> = app
        .registry
        .dashboard_rows()
        .into_iter()
        .map(|(id, name, p2p)| {
            json!({ "clientId": id, "displayName": name, "p2pState": p2p })
        })
        .collect();
    Json(json!({ "success": true, "clients": clients })).into_response()
}

pub async fn ptt(State(app): State<Arc<App>>, headers: HeaderMap) -> Response {
    if let Err(denied) = require_auth(&app, &headers) {
        return denied;
    }
    match app.floor.holder() {
        Some(speaker) => Json(json!({
            "success": true,
            "active": true,
            "speaker": speaker.wire_id(),
            "speakerName": app.floor.speaker_name(&speaker),
            "heldMs": app.floor.held_for().unwrap_or_default().as_millis() as u64,
        }))
        .into_response(),
        None => Json(json!({ "success": true, "active": false })).into_response(),
    }
}

pub async fn ptt_release(State(app): State<Arc<App>>, headers: HeaderMap) -> Response {
    if let Err(denied) = require_auth(&app, &headers) {
        return denied;
    }
    app.floor.force_release().await;
    Json(json!({ "success": true })).into_response()
}

pub async fn disconnect_client(
    State(app): State<Arc<App>>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Response {
    if let Err(denied) = require_auth(&app, &headers) {
        return denied;
    }
    let id = ClientId::from(id);
    if app
        .registry
        .post_event(&id, SessionEvent::CloseRequested("dashboard_disconnect"))
        .await
    {
        info!(client = %id, "dashboard disconnect");
        Json(json!({ "success": true })).into_response()
    } else {
        (
            StatusCode::NOT_FOUND,
            Json(json!({ "success": false, "error": "unknown client" })),
        )
            .into_response()
    }
}

/// Write the graceful-exit marker and terminate; the supervisor
/// relaunches us. The reply is flushed before the process exits.
pub async fn restart(State(app): State<Arc<App>>, headers: HeaderMap) -> Response {
    if let Err(denied) = require_auth(&app, &headers) {
        return denied;
    }
    warn!("dashboard restart requested");
    if let Err(e) = std::fs::write(app.config.restart_marker_path(), b"restart\n") {
        warn!("failed to write restart marker: {e}");
    }
    tokio::spawn(async {
        tokio::time::sleep(Duration::from_millis(200)).await;
        std::process::exit(0);
    });
    Json(json!({ "success": true })).into_response()
}

fn require_auth(app: &App, headers: &HeaderMap) -> Result<(), Response> {
    match bearer_token(headers) {
        Some(token) if app.dash.is_valid(token) => Ok(()),
        _ => Err(unauthorized()),
    }
}

fn unauthorized() -> Response {
    (
        StatusCode::UNAUTHORIZED,
        Json(json!({ "success": false, "error": "unauthorized" })),
    )
        .into_response()
}

/// Resident set size from /proc; zero where the file is unavailable.
fn rss_kb() -> u64 {
    let Ok(status) = std::fs::read_to_string("/proc/self/status") else {
        return 0;
    };
    status
        .lines()
        .find_map(|line| {
            line.strip_prefix("VmRSS:")?
                .trim()
                .split_whitespace()
                .next()?
                .parse()
                .ok()
        })
        .unwrap_or(0)
}
