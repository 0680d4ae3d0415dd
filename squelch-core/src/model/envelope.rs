use crate::model::client::ClientId;
use crate::model::ice::{CandidateJson, IceServerConfig};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum PttWireState {
    Idle,
    Transmitting,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClientInfo {
    pub client_id: ClientId,
    pub display_name: String,
}

/// One JSON frame on the signaling channel, tagged by its `type` field.
///
/// Both directions share this enum; the server never parses server-only
/// variants out of client frames, it just ignores them.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Envelope {
    /// First frame after accept.
    #[serde(rename = "config", rename_all = "camelCase")]
    Config {
        client_id: ClientId,
        ice_servers: Vec<IceServerConfig>,
        #[serde(skip_serializing_if = "Option::is_none")]
        vapid_public_key: Option<String>,
    },

    #[serde(rename = "offer")]
    Offer { sdp: String },

    #[serde(rename = "answer")]
    Answer { sdp: String },

    #[serde(rename = "ice-candidate")]
    IceCandidate { candidate: CandidateJson },

    #[serde(rename = "request_ice_restart")]
    RequestIceRestart,

    #[serde(rename = "ice_restart_offer")]
    IceRestartOffer { sdp: String },

    #[serde(rename = "ice_restart_answer")]
    IceRestartAnswer { sdp: String },

    #[serde(rename = "p2p_offer")]
    P2pOffer {
        #[serde(skip_serializing_if = "Option::is_none")]
        from: Option<ClientId>,
        #[serde(skip_serializing_if = "Option::is_none")]
        to: Option<ClientId>,
        sdp: String,
    },

    #[serde(rename = "p2p_answer")]
    P2pAnswer {
        #[serde(skip_serializing_if = "Option::is_none")]
        from: Option<ClientId>,
        #[serde(skip_serializing_if = "Option::is_none")]
        to: Option<ClientId>,
        sdp: String,
    },

    #[serde(rename = "p2p_ice_candidate")]
    P2pIceCandidate {
        #[serde(skip_serializing_if = "Option::is_none")]
        from: Option<ClientId>,
        #[serde(skip_serializing_if = "Option::is_none")]
        to: Option<ClientId>,
        candidate: CandidateJson,
    },

    /// Sent once the main peer connection reaches `connected`.
    #[serde(rename = "client_list")]
    ClientList { clients: Vec<ClientInfo> },

    #[serde(rename = "client_joined", rename_all = "camelCase")]
    ClientJoined {
        client_id: ClientId,
        #[serde(skip_serializing_if = "Option::is_none")]
        display_name: Option<String>,
    },

    #[serde(rename = "client_left", rename_all = "camelCase")]
    ClientLeft { client_id: ClientId },

    #[serde(rename = "ptt_request")]
    PttRequest,

    #[serde(rename = "ptt_release")]
    PttRelease,

    #[serde(rename = "ptt_granted", rename_all = "camelCase")]
    PttGranted {
        #[serde(skip_serializing_if = "Option::is_none")]
        speaker: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        speaker_name: Option<String>,
    },

    #[serde(rename = "ptt_denied", rename_all = "camelCase")]
    PttDenied {
        #[serde(skip_serializing_if = "Option::is_none")]
        speaker: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        speaker_name: Option<String>,
    },

    /// Broadcast to everyone after each floor transition. `speaker` is
    /// serialized even when null so clients can clear their UI.
    #[serde(rename = "ptt_status", rename_all = "camelCase")]
    PttStatus {
        state: PttWireState,
        speaker: Option<String>,
        speaker_name: Option<String>,
    },

    #[serde(rename = "set_display_name", rename_all = "camelCase")]
    SetDisplayName { display_name: String },

    #[serde(rename = "push_subscribe")]
    PushSubscribe { subscription: serde_json::Value },

    #[serde(rename = "request_p2p_reconnect")]
    RequestP2pReconnect,
}
