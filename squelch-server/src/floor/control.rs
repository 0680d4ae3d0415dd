use std::sync::Arc;
use std::time::Duration;

use squelch_core::{
    ClientId, Envelope, PttWireState, Speaker, EXTERNAL_SPEAKER_NAME,
};
use tracing::info;

use crate::audio::EgressHandle;
use crate::floor::arbiter::{FloorArbiter, FloorRelease, FloorRequest};
use crate::names::NameStore;
use crate::relay::RelayDriver;
use crate::signaling::Registry;

/// Orchestrates every floor transition: the arbiter decides, then the
/// relay, the recorder, the name table and the broadcasts follow, in
/// that order. The requester's reply always goes out before the status
/// broadcast.
pub struct FloorControl {
    arbiter: FloorArbiter,
    relay: RelayDriver,
    registry: Arc<Registry>,
    egress: EgressHandle,
    names: Arc<NameStore>,
}

impl FloorControl {
    pub fn new(
        arbiter: FloorArbiter,
        relay: RelayDriver,
        registry: Arc<Registry>,
        egress: EgressHandle,
        names: Arc<NameStore>,
    ) -> Self {
        Self {
            arbiter,
            relay,
            registry,
            egress,
            names,
        }
    }

    pub fn holder(&self) -> Option<Speaker> {
        self.arbiter.holder()
    }

    pub fn held_for(&self) -> Option<Duration> {
        self.arbiter.held_for()
    }

    pub fn speaker_name(&self, speaker: &Speaker) -> String {
        match speaker {
            Speaker::Server => "Server".to_string(),
            Speaker::External => EXTERNAL_SPEAKER_NAME.to_string(),
            Speaker::Client(id) => self
                .registry
                .display_name(id)
                .or_else(|| self.names.get(id))
                .unwrap_or_else(|| id.to_string()),
        }
    }

    pub fn status_envelope(&self) -> Envelope {
        match self.arbiter.holder() {
            Some(speaker) => Envelope::PttStatus {
                state: PttWireState::Transmitting,
                speaker: Some(speaker.wire_id().to_string()),
                speaker_name: Some(self.speaker_name(&speaker)),
            },
            None => Envelope::PttStatus {
                state: PttWireState::Idle,
                speaker: None,
                speaker_name: None,
            },
        }
    }

    fn broadcast_status(&self) {
        self.registry.broadcast(&self.status_envelope(), None);
    }

    /// `ptt_request` from a web client.
    pub async fn request_web(&self, id: &ClientId) {
        match self.arbiter.request(Speaker::Client(id.clone())) {
            FloorRequest::Granted => {
                let speaker = Speaker::Client(id.clone());
                let name = self.speaker_name(&speaker);
                info!(client = %id, name = %name, "floor granted");

                self.names.record(id, &name);
                self.relay.turn_on();
                self.egress.start_recording(id.clone()).await;

                self.registry.send_to(
                    id,
                    Envelope::PttGranted {
                        speaker: Some(id.to_string()),
                        speaker_name: Some(name),
                    },
                );
                self.broadcast_status();
            }
            FloorRequest::Busy { holder } => {
                self.registry.send_to(
                    id,
                    Envelope::PttDenied {
                        speaker: Some(holder.wire_id().to_string()),
                        speaker_name: Some(self.speaker_name(&holder)),
                    },
                );
            }
        }
    }

    /// `ptt_release` from a web client, and session teardown. A mismatch
    /// with the current holder is silently ignored.
    pub async fn release_web(&self, id: &ClientId) {
        if self.arbiter.release(&Speaker::Client(id.clone())) == FloorRelease::Released {
            info!(client = %id, "floor released");
            self.relay.turn_off();
            self.egress.stop_recording().await;
            self.broadcast_status();
        }
    }

    /// External VOX claim. The relay stays off: the external device is
    /// already transmitting.
    pub async fn vox_on(&self) -> Result<(), (String, String)> {
        match self.arbiter.request(Speaker::External) {
            FloorRequest::Granted => {
                info!("floor granted to external vox");
                self.broadcast_status();
                Ok(())
            }
            FloorRequest::Busy { holder } => Err((
                holder.wire_id().to_string(),
                self.speaker_name(&holder),
            )),
        }
    }

    pub async fn vox_off(&self) {
        if self.arbiter.release(&Speaker::External) == FloorRelease::Released {
            info!("external vox released the floor");
            self.broadcast_status();
        }
    }

    /// Dashboard hard reset: clear the floor whoever holds it, relay off,
    /// recording stopped, playback paused, fresh status to everyone.
    pub async fn force_release(&self) {
        let evicted = self.arbiter.clear();
        if let Some(evicted) = &evicted {
            info!(holder = %evicted, "floor force-released");
        }
        self.relay.turn_off();
        if evicted.as_ref().is_some_and(Speaker::is_web_client) {
            self.egress.stop_recording().await;
        }
        self.egress.pause_playback().await;
        self.broadcast_status();
    }

    /// One pass of the timeout sweep; evicts and applies the release
    /// side effects when the holder has overstayed.
    pub async fn sweep_once(&self) {
        let Some(evicted) = self.arbiter.sweep_timeout() else {
            return;
        };
        info!(holder = %evicted, "floor hold timed out");
        self.relay.turn_off();
        if evicted.is_web_client() {
            self.egress.stop_recording().await;
        }
        self.broadcast_status();
    }

    /// Periodic timeout sweep, once a second while a timeout is set.
    pub fn spawn_sweeper(self: Arc<Self>) {
        let floor = self;
        tokio::spawn(async move {
            let mut tick = tokio::time::interval(Duration::from_secs(1));
            loop {
                tick.tick().await;
                floor.sweep_once().await;
            }
        });
    }
}
