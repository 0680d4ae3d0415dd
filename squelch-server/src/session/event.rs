use bytes::Bytes;
use squelch_core::{CandidateJson, Envelope};
use webrtc::peer_connection::peer_connection_state::RTCPeerConnectionState;

/// Session timers. Each kind carries a token that is bumped on re-arm or
/// cancel, so an expired timer whose token no longer matches is ignored.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerKind {
    /// No `offer` within the configured window after `config` was sent.
    OfferWait = 0,
    /// The 5-second deadline after `request_ice_restart`.
    IceRestart = 1,
    /// The 15-second grace after a P2P connection drops.
    P2pCleanup = 2,
}

pub const TIMER_KINDS: usize = 3;

/// Everything that can reach a session actor's inbox. Peer-connection
/// events carry the generation of the connection that produced them;
/// events from a replaced connection are discarded by the actor.
#[derive(Debug)]
pub enum SessionEvent {
    FromClient(Envelope),

    MainState(u64, RTCPeerConnectionState),
    MainCandidate(u64, CandidateJson),

    P2pState(u64, RTCPeerConnectionState),
    P2pCandidate(u64, CandidateJson),
    /// One Opus payload read off the client's P2P uplink.
    P2pRtp(u64, Bytes),

    Timeout(TimerKind, u64),

    /// Dashboard-initiated close with its reason string.
    CloseRequested(&'static str),
    /// The WebSocket ended (either side).
    TransportClosed,
}
