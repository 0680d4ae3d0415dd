use std::time::Instant;

use axum::http::HeaderMap;
use dashmap::DashMap;
use uuid::Uuid;

/// Opaque dashboard session tokens, in-memory only. A process restart
/// invalidates every dashboard session by construction.
pub struct DashSessions {
    tokens: DashMap<String, Instant>,
}

impl DashSessions {
    pub fn new() -> Self {
        Self {
            tokens: DashMap::new(),
        }
    }

    /// Succeeds only when a dashboard password is configured and matches.
    pub fn login(&self, attempt: &str, configured: Option<&str>) -> Option<String> {
        let expected = configured?;
        if attempt != expected {
            return None;
        }
        let token = Uuid::new_v4().simple().to_string();
        self.tokens.insert(token.clone(), Instant::now());
        Some(token)
    }

    pub fn logout(&self, token: &str) {
        self.tokens.remove(token);
    }

    pub fn is_valid(&self, token: &str) -> bool {
        self.tokens.contains_key(token)
    }
}

impl Default for DashSessions {
    fn default() -> Self {
        Self::new()
    }
}

pub fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(axum::http::header::AUTHORIZATION)?
        .to_str()
        .ok()?
        .strip_prefix("Bearer ")
}
