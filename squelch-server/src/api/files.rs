use std::sync::Arc;

use axum::extract::{Query, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Deserialize;
use serde_json::json;

use crate::app::App;

/// The only names the audio endpoint will ever open. Anything else,
/// including anything with a path separator, is rejected before any
/// filesystem access.
static RECORDING_NAME: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(?:rec|web)_\d{8}_\d{6}(?:_[A-Za-z0-9]+)?\.wav$").unwrap());

#[derive(Deserialize)]
pub struct AudioQuery {
    file: String,
}

pub async fn serve_recording(
    State(app): State<Arc<App>>,
    Query(query): Query<AudioQuery>,
) -> Response {
    if !RECORDING_NAME.is_match(&query.file) {
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({ "success": false, "error": "Invalid filename" })),
        )
            .into_response();
    }

    let path = app.config.recordings_dir.join(&query.file);
    match tokio::fs::read(&path).await {
        Ok(bytes) => ([(header::CONTENT_TYPE, "audio/wav")], bytes).into_response(),
        Err(_) => (
            StatusCode::NOT_FOUND,
            Json(json!({ "success": false, "error": "not found" })),
        )
            .into_response(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn whitelist_accepts_recorder_output() {
        for name in [
            "rec_20260802_101500.wav",
            "web_20260802_101500_aaaaaaaa.wav",
            "web_20260802_101500_A1b2C3.wav",
        ] {
            assert!(RECORDING_NAME.is_match(name), "{name} should match");
        }
    }

    #[test]
    fn whitelist_rejects_traversal_and_junk() {
        for name in [
            "../../etc/passwd",
            "web_20260802_101500_aaaaaaaa.wav.exe",
            "web_2026_101500.wav",
            "other_20260802_101500.wav",
            "web_20260802_101500_aa/aa.wav",
            "",
        ] {
            assert!(!RECORDING_NAME.is_match(name), "{name} should not match");
        }
    }
}
