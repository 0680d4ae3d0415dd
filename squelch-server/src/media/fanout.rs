use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use bytes::Bytes;
use dashmap::DashMap;
use squelch_core::ClientId;
use tokio::sync::Mutex;
use tracing::debug;
use webrtc::api::media_engine::MIME_TYPE_OPUS;
use webrtc::rtp_transceiver::rtp_codec::RTCRtpCodecCapability;
use webrtc::track::track_local::track_local_static_rtp::TrackLocalStaticRTP;
use webrtc::track::track_local::TrackLocalWriter;

use crate::media::rtp::RtpStamper;

struct Outbound {
    track: Arc<TrackLocalStaticRTP>,
    stamper: Mutex<RtpStamper>,
    connected: AtomicBool,
}

/// Table of per-session outbound audio tracks. Whoever currently sources
/// audio (floor holder uplink or the server microphone) is fanned out to
/// every connected track except their own, each track restamped with its
/// own sequence/timestamp/SSRC.
pub struct Fanout {
    tracks: DashMap<ClientId, Arc<Outbound>>,
}

impl Fanout {
    pub fn new() -> Self {
        Self {
            tracks: DashMap::new(),
        }
    }

    /// Create the outbound track for a session's P2P connection. The
    /// returned track is handed to `add_track`; frames start flowing once
    /// the connection is marked connected.
    pub fn register(&self, id: &ClientId) -> Arc<TrackLocalStaticRTP> {
        let track = Arc::new(TrackLocalStaticRTP::new(
            RTCRtpCodecCapability {
                mime_type: MIME_TYPE_OPUS.to_owned(),
                clock_rate: 48_000,
                channels: 2,
                ..Default::default()
            },
            format!("audio-{id}"),
            "squelch".to_owned(),
        ));
        self.tracks.insert(
            id.clone(),
            Arc::new(Outbound {
                track: track.clone(),
                stamper: Mutex::new(RtpStamper::new()),
                connected: AtomicBool::new(false),
            }),
        );
        track
    }

    pub fn unregister(&self, id: &ClientId) {
        self.tracks.remove(id);
    }

    pub fn set_connected(&self, id: &ClientId, connected: bool) {
        if let Some(entry) = self.tracks.get(id) {
            entry.connected.store(connected, Ordering::Relaxed);
        }
    }

    pub fn connected_count(&self) -> usize {
        self.tracks
            .iter()
            .filter(|e| e.connected.load(Ordering::Relaxed))
            .count()
    }

    /// Write one Opus frame to every connected track, except the source's
    /// own (a holder must never hear themselves back).
    pub async fn forward(&self, payload: &Bytes, exclude: Option<&ClientId>) {
        let targets: Vec<Arc<Outbound>> = self
            .tracks
            .iter()
            .filter(|e| {
                e.connected.load(Ordering::Relaxed) && Some(e.key()) != exclude
            })
            .map(|e| e.value().clone())
            .collect();

        for outbound in targets {
            let packet = outbound.stamper.lock().await.packet(payload.clone());
            if let Err(e) = outbound.track.write_rtp(&packet).await {
                debug!("rtp write failed: {e}");
            }
        }
    }
}

impl Default for Fanout {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn forward_skips_disconnected_and_excluded_tracks() {
        let fanout = Fanout::new();
        let a = ClientId::from("aaaaaaaa");
        let b = ClientId::from("bbbbbbbb");
        fanout.register(&a);
        fanout.register(&b);

        assert_eq!(fanout.connected_count(), 0);
        fanout.set_connected(&a, true);
        assert_eq!(fanout.connected_count(), 1);

        // No bindings exist in tests; this only exercises the selection
        // logic and the per-track stamping path.
        fanout
            .forward(&Bytes::from_static(&[0xfc]), Some(&a))
            .await;
        fanout.forward(&Bytes::from_static(&[0xfc]), None).await;

        fanout.unregister(&a);
        assert_eq!(fanout.connected_count(), 0);
    }
}
