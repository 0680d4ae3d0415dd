use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use squelch_core::{ClientId, Envelope};
use squelch_server::config::{Config, ServerMicMode, SpeakerMode};
use squelch_server::session::{Session, SessionEvent};
use squelch_server::signaling::ClientHandle;
use squelch_server::App;
use tokio::sync::mpsc;

pub const RECV_TIMEOUT: Duration = Duration::from_secs(2);

/// A server configuration pointed at a scratch directory, with every
/// hardware-facing feature disabled.
pub fn test_config(dir: &Path) -> Config {
    Config {
        http_port: 0,
        stun_server: "stun:stun.l.google.com:19302".to_string(),
        ptt_timeout: Duration::ZERO,
        offer_timeout: Duration::from_secs(30),
        ice_gathering_timeout: Duration::from_millis(100),
        enable_local_audio: false,
        enable_server_mic: false,
        server_mic_mode: ServerMicMode::Always,
        mic_device: "default".to_string(),
        speaker_device_id: "0".to_string(),
        speaker_mode: SpeakerMode::PerSession,
        enable_relay: false,
        relay_port: "/dev/null".to_string(),
        relay_baud_rate: 9_600,
        dash_password: Some("hunter2".to_string()),
        vapid_public_key: None,
        vapid_private_key: None,
        vapid_subject: None,
        enable_file_log: false,
        log_retention_days: 7,
        log_dir: dir.join("logs"),
        recordings_dir: dir.join("recordings"),
        recordings_temp_dir: dir.join("recordings_temp"),
    }
}

pub fn test_app(dir: &Path) -> Arc<App> {
    App::build(test_config(dir))
}

/// Stands in for one browser client: captures every envelope the server
/// sends it, and can post events into its session actor when one was
/// spawned.
pub struct TestClient {
    pub id: ClientId,
    pub rx: mpsc::Receiver<Envelope>,
    pub events: mpsc::Sender<SessionEvent>,
    _events_rx: Option<mpsc::Receiver<SessionEvent>>,
}

impl TestClient {
    /// Next envelope, failing the test after a bounded wait.
    pub async fn recv(&mut self) -> Envelope {
        tokio::time::timeout(RECV_TIMEOUT, self.rx.recv())
            .await
            .expect("timed out waiting for envelope")
            .expect("outbound channel closed")
    }

    pub fn drain(&mut self) {
        while self.rx.try_recv().is_ok() {}
    }

    pub async fn expect_silence(&mut self) {
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(
            self.rx.try_recv().is_err(),
            "expected no envelope for {}",
            self.id
        );
    }
}

/// Register a client handle without a session actor behind it.
pub fn connect(app: &Arc<App>, id: &str) -> TestClient {
    let id = ClientId::from(id);
    let (out_tx, out_rx) = mpsc::channel(256);
    let (event_tx, event_rx) = mpsc::channel(64);
    app.registry
        .register(id.clone(), ClientHandle::new(&id, out_tx, event_tx.clone()));
    TestClient {
        id,
        rx: out_rx,
        events: event_tx,
        _events_rx: Some(event_rx),
    }
}

/// Register a client with a live session actor, the way the socket
/// handler wires one up.
pub fn connect_with_actor(app: &Arc<App>, id: &str) -> TestClient {
    let id = ClientId::from(id);
    let (out_tx, out_rx) = mpsc::channel(256);
    let (event_tx, event_rx) = mpsc::channel(64);
    Session::spawn(id.clone(), app.clone(), event_tx.clone(), event_rx);
    app.registry
        .register(id.clone(), ClientHandle::new(&id, out_tx, event_tx.clone()));
    TestClient {
        id,
        rx: out_rx,
        events: event_tx,
        _events_rx: None,
    }
}
