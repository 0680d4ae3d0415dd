use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use squelch_core::{CandidateJson, ClientId, IceServerConfig};
use tokio::sync::mpsc;
use tracing::{debug, info};
use webrtc::ice_transport::ice_candidate::RTCIceCandidate;
use webrtc::peer_connection::peer_connection_state::RTCPeerConnectionState;
use webrtc::peer_connection::sdp::session_description::RTCSessionDescription;
use webrtc::peer_connection::RTCPeerConnection;
use webrtc::rtp_transceiver::rtp_codec::RTPCodecType;
use webrtc::track::track_local::TrackLocal;

use crate::media::{force_opus_mono, Fanout};
use crate::session::event::SessionEvent;
use crate::session::pc::{build_peer_connection, candidate_to_init, detach_event_handlers};
use crate::session::pending::CandidateQueue;

/// The outbound leg: the server offers, pushes one audio track carrying
/// whoever holds the floor, and opportunistically receives the client's
/// uplink for recording.
pub struct P2pLink {
    pc: Arc<RTCPeerConnection>,
    pub generation: u64,
    queue: CandidateQueue,
}

impl P2pLink {
    /// Create the connection and produce the local offer, waiting out
    /// ICE gathering up to the configured deadline so the offer carries
    /// the server's host candidates.
    pub async fn connect(
        client_id: &ClientId,
        ice_servers: &[IceServerConfig],
        gathering_timeout: Duration,
        fanout: &Fanout,
        generation: u64,
        events: mpsc::Sender<SessionEvent>,
    ) -> Result<(Self, String)> {
        let pc = build_peer_connection(ice_servers).await?;

        let track = fanout.register(client_id);
        pc.add_track(Arc::clone(&track) as Arc<dyn TrackLocal + Send + Sync>)
            .await
            .context("add outbound audio track")?;

        let state_tx = events.clone();
        let state_client = client_id.clone();
        pc.on_peer_connection_state_change(Box::new(move |s: RTCPeerConnectionState| {
            let tx = state_tx.clone();
            let client = state_client.clone();
            Box::pin(async move {
                info!(client = %client, state = ?s, "p2p pc state");
                let _ = tx.send(SessionEvent::P2pState(generation, s)).await;
            })
        }));

        let ice_tx = events.clone();
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
                let _ = tx.send(SessionEvent::P2pCandidate(generation, json)).await;
            })
        }));

        // The client's uplink. Payloads are pumped into the session inbox
        // with try_send; the actor drops them unless this client holds
        // the floor.
        let rtp_tx = events;
        let track_client = client_id.clone();
        pc.on_track(Box::new(move |track, _receiver, _transceiver| {
            let tx = rtp_tx.clone();
            let client = track_client.clone();
            Box::pin(async move {
                if track.kind() != RTPCodecType::Audio {
                    return;
                }
                debug!(client = %client, "p2p uplink track started");
                tokio::spawn(async move {
                    loop {
                        let (packet, _) = match track.read_rtp().await {
                            Ok(read) => read,
                            Err(e) => {
                                debug!(client = %client, "p2p uplink ended: {e}");
                                break;
                            }
                        };
                        if packet.payload.is_empty() {
                            continue;
                        }
                        let _ = tx.try_send(SessionEvent::P2pRtp(generation, packet.payload));
                    }
                });
            })
        }));

        let offer = pc.create_offer(None).await.context("create p2p offer")?;
        let munged = force_opus_mono(&offer.sdp);
        pc.set_local_description(RTCSessionDescription::offer(munged.clone())?)
            .await
            .context("set local p2p offer")?;

        let mut gathered = pc.gathering_complete_promise().await;
        let _ = tokio::time::timeout(gathering_timeout, gathered.recv()).await;

        let final_sdp = pc
            .local_description()
            .await
            .map(|d| d.sdp)
            .unwrap_or(munged);

        Ok((
            Self {
                pc,
                generation,
                queue: CandidateQueue::new(),
            },
            final_sdp,
        ))
    }

    pub async fn apply_answer(&mut self, sdp: &str) -> Result<()> {
        let answer = RTCSessionDescription::answer(sdp.to_string())?;
        self.pc
            .set_remote_description(answer)
            .await
            .context("set p2p answer")?;
        for candidate in self.queue.drain() {
            if let Err(e) = self.pc.add_ice_candidate(candidate_to_init(&candidate)).await {
                debug!("queued p2p ICE candidate rejected: {e}");
            }
        }
        Ok(())
    }

    pub async fn add_candidate(&mut self, candidate: CandidateJson) {
        if let Some(candidate) = self.queue.enqueue_or_pass(candidate) {
            if let Err(e) = self.pc.add_ice_candidate(candidate_to_init(&candidate)).await {
                debug!("p2p ICE candidate rejected: {e}");
            }
        }
    }

    pub async fn close(&self, fanout: &Fanout, client_id: &ClientId) {
        detach_event_handlers(&self.pc);
        let _ = self.pc.close().await;
        fanout.unregister(client_id);
    }
}
