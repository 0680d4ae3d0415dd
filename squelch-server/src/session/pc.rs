use std::sync::Arc;

use anyhow::Result;
use squelch_core::{CandidateJson, IceServerConfig};
use webrtc::api::interceptor_registry::register_default_interceptors;
use webrtc::api::media_engine::MediaEngine;
use webrtc::api::APIBuilder;
use webrtc::ice_transport::ice_candidate::RTCIceCandidateInit;
use webrtc::ice_transport::ice_server::RTCIceServer;
use webrtc::interceptor::registry::Registry;
use webrtc::peer_connection::configuration::RTCConfiguration;
use webrtc::peer_connection::peer_connection_state::RTCPeerConnectionState;
use webrtc::peer_connection::RTCPeerConnection;

/// Build one peer connection with the advertised ICE servers. Both the
/// main (inbound) and P2P (outbound) legs go through here.
pub(crate) async fn build_peer_connection(
    ice_servers: &[IceServerConfig],
) -> Result<Arc<RTCPeerConnection>> {
    let mut media = MediaEngine::default();
    media.register_default_codecs()?;

    let registry = register_default_interceptors(Registry::new(), &mut media)?;

    let api = APIBuilder::new()
        .with_media_engine(media)
        .with_interceptor_registry(registry)
        .build();

    let config = RTCConfiguration {
        ice_servers: ice_servers
            .iter()
            .map(|s| RTCIceServer {
                urls: s.urls.clone(),
                username: s.username.clone().unwrap_or_default(),
                credential: s.credential.clone().unwrap_or_default(),
                credential_type: Default::default(),
            })
            .collect(),
        ..Default::default()
    };

    Ok(Arc::new(api.new_peer_connection(config).await?))
}

/// Replace every event handler with a no-op. Called before `close` so a
/// late event can never touch a session that is being destroyed.
pub(crate) fn detach_event_handlers(pc: &RTCPeerConnection) {
    pc.on_peer_connection_state_change(Box::new(|_| Box::pin(async {})));
    pc.on_ice_connection_state_change(Box::new(|_| Box::pin(async {})));
    pc.on_ice_gathering_state_change(Box::new(|_| Box::pin(async {})));
    pc.on_ice_candidate(Box::new(|_| Box::pin(async {})));
    pc.on_track(Box::new(|_, _, _| Box::pin(async {})));
}

pub(crate) fn candidate_to_init(c: &CandidateJson) -> RTCIceCandidateInit {
    RTCIceCandidateInit {
        candidate: c.candidate.clone(),
        sdp_mid: c.sdp_mid.clone(),
        sdp_mline_index: c.sdp_mline_index,
        username_fragment: None,
    }
}

pub(crate) fn state_tag(state: RTCPeerConnectionState) -> &'static str {
    match state {
        RTCPeerConnectionState::New => "new",
        RTCPeerConnectionState::Connecting => "connecting",
        RTCPeerConnectionState::Connected => "connected",
        RTCPeerConnectionState::Disconnected => "disconnected",
        RTCPeerConnectionState::Failed => "failed",
        RTCPeerConnectionState::Closed => "closed",
        RTCPeerConnectionState::Unspecified => "unspecified",
    }
}
