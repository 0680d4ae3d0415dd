use std::collections::HashMap;
use std::path::PathBuf;

use anyhow::{Context, Result};
use parking_lot::Mutex;
use squelch_core::ClientId;
use tracing::warn;

/// Persistent clientId → last-seen display name map, stored as JSON next
/// to the recordings so the external transcriber can label speakers.
/// Updated on every rename and on each floor grant.
pub struct NameStore {
    path: PathBuf,
    map: Mutex<HashMap<String, String>>,
}

impl NameStore {
    pub fn load(path: PathBuf) -> Self {
        let map = match std::fs::read_to_string(&path) {
            Ok(data) => match serde_json::from_str(&data) {
                Ok(map) => map,
                Err(e) => {
                    warn!(path = %path.display(), "client name file unreadable, starting empty: {e}");
                    HashMap::new()
                }
            },
            Err(_) => HashMap::new(),
        };
        Self {
            path,
            map: Mutex::new(map),
        }
    }

    pub fn record(&self, id: &ClientId, display_name: &str) {
        let snapshot = {
            let mut map = self.map.lock();
            let slot = map.entry(id.to_string()).or_default();
            if slot == display_name {
                return;
            }
            *slot = display_name.to_string();
            map.clone()
        };
        if let Err(e) = self.persist(&snapshot) {
            warn!("failed to persist client names: {e:#}");
        }
    }

    pub fn get(&self, id: &ClientId) -> Option<String> {
        self.map.lock().get(id.as_str()).cloned()
    }

    fn persist(&self, map: &HashMap<String, String>) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("create {}", parent.display()))?;
        }
        let tmp = self.path.with_extension("json.tmp");
        let data = serde_json::to_string_pretty(map)?;
        std::fs::write(&tmp, data).with_context(|| format!("write {}", tmp.display()))?;
        std::fs::rename(&tmp, &self.path)
            .with_context(|| format!("rename to {}", self.path.display()))?;
        Ok(())
    }
}
