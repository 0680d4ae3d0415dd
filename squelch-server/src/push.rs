use dashmap::DashMap;
use serde_json::Value;
use squelch_core::ClientId;
use tracing::debug;

/// Web-push subscription table. Deliberately decoupled from session
/// lifetime: entries survive disconnects and are only dropped when the
/// push gateway reports the subscription gone.
pub struct PushStore {
    subs: DashMap<String, Value>,
}

impl PushStore {
    pub fn new() -> Self {
        Self {
            subs: DashMap::new(),
        }
    }

    pub fn subscribe(&self, id: &ClientId, subscription: Value) {
        debug!(client = %id, "push subscription stored");
        self.subs.insert(id.to_string(), subscription);
    }

    /// Called when a delivery gateway rejects the subscription as gone.
    pub fn prune(&self, id: &ClientId) {
        self.subs.remove(id.as_str());
    }

    pub fn len(&self) -> usize {
        self.subs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.subs.is_empty()
    }
}

impl Default for PushStore {
    fn default() -> Self {
        Self::new()
    }
}
