use std::sync::Arc;

use axum::extract::State;
use axum::Json;
use serde_json::{json, Value};

use crate::app::App;

/// External VOX claims the floor to inject radio-side audio. The relay
/// stays untouched; the external device is the transmitter.
pub async fn on(State(app): State<Arc<App>>) -> Json<Value> {
    match app.floor.vox_on().await {
        Ok(()) => Json(json!({ "success": true })),
        Err((speaker, speaker_name)) => Json(json!({
            "success": false,
            "reason": "busy",
            "speaker": speaker,
            "speakerName": speaker_name,
        })),
    }
}

pub async fn off(State(app): State<Arc<App>>) -> Json<Value> {
    app.floor.vox_off().await;
    Json(json!({ "success": true }))
}
