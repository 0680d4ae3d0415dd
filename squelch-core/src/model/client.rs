use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Wire id of the server itself (used as `from` on server-originated
/// P2P envelopes and as the server-microphone floor holder).
pub const SERVER_WIRE_ID: &str = "server";

/// Wire id of the external VOX gateway.
pub const EXTERNAL_WIRE_ID: &str = "external";

/// Display name shown for the external VOX gateway.
pub const EXTERNAL_SPEAKER_NAME: &str = "外部デバイス";

/// Short opaque id minted for every accepted client connection.
#[derive(Debug, Serialize, Deserialize, Clone, Hash, Eq, PartialEq)]
pub struct ClientId(pub String);

impl ClientId {
    pub fn mint() -> Self {
        let simple = Uuid::new_v4().simple().to_string();
        Self(simple[..8].to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for ClientId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for ClientId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl fmt::Display for ClientId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Who currently holds the floor. The server microphone and the external
/// VOX gateway use reserved ids that can never collide with a minted
/// [`ClientId`] (those are hex-only and eight characters long).
#[derive(Debug, Clone, Hash, Eq, PartialEq)]
pub enum Speaker {
    Server,
    External,
    Client(ClientId),
}

impl Speaker {
    pub fn wire_id(&self) -> &str {
        match self {
            Speaker::Server => SERVER_WIRE_ID,
            Speaker::External => EXTERNAL_WIRE_ID,
            Speaker::Client(id) => id.as_str(),
        }
    }

    /// True for holders whose audio arrives over a browser session, which
    /// is exactly the set that drives the radio relay and the recorder.
    pub fn is_web_client(&self) -> bool {
        matches!(self, Speaker::Client(_))
    }

    pub fn client_id(&self) -> Option<&ClientId> {
        match self {
            Speaker::Client(id) => Some(id),
            _ => None,
        }
    }
}

impl fmt::Display for Speaker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.wire_id())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn minted_ids_are_short_and_unique() {
        let a = ClientId::mint();
        let b = ClientId::mint();
        assert_eq!(a.as_str().len(), 8);
        assert_ne!(a, b);
    }

    #[test]
    fn reserved_ids_are_not_web_clients() {
        assert!(!Speaker::Server.is_web_client());
        assert!(!Speaker::External.is_web_client());
        assert!(Speaker::Client(ClientId::from("aaaaaaaa")).is_web_client());
    }
}
