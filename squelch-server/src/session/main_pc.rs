use std::sync::Arc;

use anyhow::{Context, Result};
use squelch_core::{CandidateJson, ClientId, IceServerConfig};
use tokio::sync::mpsc;
use tracing::{debug, info};
use webrtc::ice_transport::ice_candidate::RTCIceCandidate;
use webrtc::peer_connection::peer_connection_state::RTCPeerConnectionState;
use webrtc::peer_connection::sdp::session_description::RTCSessionDescription;
use webrtc::peer_connection::RTCPeerConnection;
use webrtc::rtp_transceiver::rtp_codec::RTPCodecType;
use webrtc::rtp_transceiver::rtp_transceiver_direction::RTCRtpTransceiverDirection;
use webrtc::rtp_transceiver::RTCRtpTransceiverInit;

use crate::media::force_opus_mono;
use crate::session::event::SessionEvent;
use crate::session::pc::{build_peer_connection, candidate_to_init, detach_event_handlers};
use crate::session::pending::CandidateQueue;

/// The inbound leg: carries the client's microphone to the server.
/// The client offers, the server answers with Opus forced to mono.
pub struct MainPc {
    pc: Arc<RTCPeerConnection>,
    pub generation: u64,
    queue: CandidateQueue,
}

impl MainPc {
    pub async fn new(
        client_id: &ClientId,
        ice_servers: &[IceServerConfig],
        generation: u64,
        events: mpsc::Sender<SessionEvent>,
    ) -> Result<Self> {
        let pc = build_peer_connection(ice_servers).await?;

        pc.add_transceiver_from_kind(
            RTPCodecType::Audio,
            Some(RTCRtpTransceiverInit {
                direction: RTCRtpTransceiverDirection::Recvonly,
                send_encodings: vec![],
            }),
        )
        .await?;

        let state_tx = events.clone();
        let state_client = client_id.clone();
        pc.on_peer_connection_state_change(Box::new(move |s: RTCPeerConnectionState| {
            let tx = state_tx.clone();
            let client = state_client.clone();
            Box::pin(async move {
                info!(client = %client, state = ?s, "main pc state");
                let _ = tx.send(SessionEvent::MainState(generation, s)).await;
            })
        }));

        let ice_tx = events;
        pc.on_ice_candidate(Box::new(move |c: Option<RTCIceCandidate>| {
            let tx = ice_tx.clone();
            Box::pin(async move {
                let Some(candidate) = c else { return };
                let Ok(init) = candidate.to_json() else { return };
                let json = CandidateJson {
                    candidate: init.candidate,
                    sdp_mid: init.sdp_mid,
                    sdp_mline_index: init.sdp_mline_index,
                };
                let _ = tx
                    .send(SessionEvent::MainCandidate(generation, json))
                    .await;
            })
        }));

        Ok(Self {
            pc,
            generation,
            queue: CandidateQueue::new(),
        })
    }

    /// Apply a remote offer (initial or ICE-restart) and produce the
    /// munged local answer. A `setRemoteDescription` failure here is
    /// fatal for the session.
    pub async fn apply_remote_offer(&mut self, sdp: &str) -> Result<String> {
        let offer = RTCSessionDescription::offer(sdp.to_string())?;
        self.pc
            .set_remote_description(offer)
            .await
            .context("set remote offer")?;

        for candidate in self.queue.drain() {
            if let Err(e) = self.pc.add_ice_candidate(candidate_to_init(&candidate)).await {
                debug!("queued ICE candidate rejected: {e}");
            }
        }

        let answer = self.pc.create_answer(None).await.context("create answer")?;
        let munged = force_opus_mono(&answer.sdp);
        self.pc
            .set_local_description(RTCSessionDescription::answer(munged.clone())?)
            .await
            .context("set local answer")?;
        Ok(munged)
    }

    pub async fn add_candidate(&mut self, candidate: CandidateJson) {
        if let Some(candidate) = self.queue.enqueue_or_pass(candidate) {
            if let Err(e) = self.pc.add_ice_candidate(candidate_to_init(&candidate)).await {
                debug!("ICE candidate rejected: {e}");
            }
        }
    }

    pub async fn close(&self) {
        detach_event_handlers(&self.pc);
        let _ = self.pc.close().await;
    }
}
