use std::sync::Arc;

use dashmap::DashMap;
use parking_lot::RwLock;
use squelch_core::{ClientId, ClientInfo, Envelope};
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::session::SessionEvent;

/// Everything the rest of the server may do to one connected client:
/// queue outbound envelopes (drained by the socket's writer task) and
/// post events into its session actor.
pub struct ClientHandle {
    outbound: mpsc::Sender<Envelope>,
    events: mpsc::Sender<SessionEvent>,
    display_name: RwLock<String>,
    p2p_state: RwLock<&'static str>,
}

impl ClientHandle {
    pub fn new(
        id: &ClientId,
        outbound: mpsc::Sender<Envelope>,
        events: mpsc::Sender<SessionEvent>,
    ) -> Self {
        Self {
            outbound,
            events,
            display_name: RwLock::new(id.to_string()),
            p2p_state: RwLock::new("none"),
        }
    }
}

/// Owns the clientId → session mapping and the two delivery primitives
/// everything else is built on: `send_to` and `broadcast`.
pub struct Registry {
    clients: DashMap<ClientId, Arc<ClientHandle>>,
}

impl Registry {
    pub fn new() -> Self {
        Self {
            clients: DashMap::new(),
        }
    }

    /// Insert a freshly accepted client and announce it to everyone else.
    pub fn register(&self, id: ClientId, handle: ClientHandle) {
        let display_name = handle.display_name.read().clone();
        self.clients.insert(id.clone(), Arc::new(handle));
        self.broadcast(
            &Envelope::ClientJoined {
                client_id: id.clone(),
                display_name: Some(display_name),
            },
            Some(&id),
        );
    }

    /// Remove the entry; the departure broadcast is the session actor's
    /// job so it lands after the floor has been released.
    pub fn remove(&self, id: &ClientId) -> bool {
        self.clients.remove(id).is_some()
    }

    pub fn contains(&self, id: &ClientId) -> bool {
        self.clients.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.clients.len()
    }

    pub fn is_empty(&self) -> bool {
        self.clients.is_empty()
    }

    /// Best-effort delivery. A full queue means the socket is not
    /// writable and the frame is dropped; audio keeps flowing over RTP.
    pub fn send_to(&self, id: &ClientId, envelope: Envelope) -> bool {
        match self.clients.get(id) {
            Some(handle) => {
                if handle.outbound.try_send(envelope).is_err() {
                    debug!(client = %id, "outbound channel unwritable, frame dropped");
                    false
                } else {
                    true
                }
            }
            None => {
                warn!(client = %id, "send_to unknown client");
                false
            }
        }
    }

    pub fn broadcast(&self, envelope: &Envelope, except: Option<&ClientId>) {
        for entry in self.clients.iter() {
            if Some(entry.key()) == except {
                continue;
            }
            let _ = entry.value().outbound.try_send(envelope.clone());
        }
    }

    pub fn client_list(&self) -> Vec<ClientInfo> {
        self.clients
            .iter()
            .map(|e| ClientInfo {
                client_id: e.key().clone(),
                display_name: e.value().display_name.read().clone(),
            })
            .collect()
    }

    pub fn display_name(&self, id: &ClientId) -> Option<String> {
        self.clients
            .get(id)
            .map(|h| h.display_name.read().clone())
    }

    pub fn set_display_name(&self, id: &ClientId, name: &str) {
        if let Some(handle) = self.clients.get(id) {
            *handle.display_name.write() = name.to_string();
        }
    }

    pub fn set_p2p_state(&self, id: &ClientId, state: &'static str) {
        if let Some(handle) = self.clients.get(id) {
            *handle.p2p_state.write() = state;
        }
    }

    /// `(clientId, displayName, p2pState)` rows for the dashboard.
    pub fn dashboard_rows(&self) -> Vec<(ClientId, String, &'static str)> {
        self.clients
            .iter()
            .map(|e| {
                (
                    e.key().clone(),
                    e.value().display_name.read().clone(),
                    *e.value().p2p_state.read(),
                )
            })
            .collect()
    }

    /// Post an event into a session actor (used by the dashboard's
    /// forced disconnect).
    pub async fn post_event(&self, id: &ClientId, event: SessionEvent) -> bool {
        let sender = match self.clients.get(id) {
            Some(handle) => handle.events.clone(),
            None => return false,
        };
        sender.send(event).await.is_ok()
    }
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}
