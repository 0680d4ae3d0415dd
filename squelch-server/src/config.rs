use std::path::PathBuf;
use std::time::Duration;

use squelch_core::IceServerConfig;

/// How the local speaker subprocess is managed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpeakerMode {
    /// One long-lived subprocess fed a continuous Ogg stream; the mux
    /// granule keeps rising across floor sessions so the decoder never
    /// resets.
    Persistent,
    /// Spawned on floor grant, killed on release.
    PerSession,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServerMicMode {
    /// Forward mic frames whenever the floor holder is not a real client.
    Always,
    /// Forward mic frames only while the floor is idle.
    Ptt,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub http_port: u16,
    pub stun_server: String,

    /// Maximum floor hold; zero disables the timeout sweep.
    pub ptt_timeout: Duration,
    pub offer_timeout: Duration,
    pub ice_gathering_timeout: Duration,

    pub enable_local_audio: bool,
    pub enable_server_mic: bool,
    pub server_mic_mode: ServerMicMode,
    pub mic_device: String,
    pub speaker_device_id: String,
    pub speaker_mode: SpeakerMode,

    pub enable_relay: bool,
    pub relay_port: String,
    pub relay_baud_rate: u32,

    pub dash_password: Option<String>,

    pub vapid_public_key: Option<String>,
    pub vapid_private_key: Option<String>,
    pub vapid_subject: Option<String>,

    pub enable_file_log: bool,
    pub log_retention_days: u32,
    pub log_dir: PathBuf,

    pub recordings_dir: PathBuf,
    pub recordings_temp_dir: PathBuf,
}

impl Config {
    pub fn from_env() -> Self {
        Self {
            http_port: env_parse("HTTP_PORT", 8080),
            stun_server: env_str("STUN_SERVER", "stun:stun.l.google.com:19302"),
            ptt_timeout: Duration::from_millis(env_parse("PTT_TIMEOUT", 0u64)),
            offer_timeout: Duration::from_millis(env_parse("OFFER_TIMEOUT_MS", 30_000u64)),
            ice_gathering_timeout: Duration::from_millis(env_parse(
                "ICE_GATHERING_TIMEOUT_MS",
                2_500u64,
            )),
            enable_local_audio: env_flag("ENABLE_LOCAL_AUDIO", false),
            enable_server_mic: env_flag("ENABLE_SERVER_MIC", false),
            server_mic_mode: match env_str("SERVER_MIC_MODE", "always").as_str() {
                "ptt" => ServerMicMode::Ptt,
                _ => ServerMicMode::Always,
            },
            mic_device: env_str("MIC_DEVICE", "default"),
            speaker_device_id: env_str("SPEAKER_DEVICE_ID", "0"),
            speaker_mode: if env_flag("USE_PYTHON_AUDIO", false) {
                SpeakerMode::Persistent
            } else {
                SpeakerMode::PerSession
            },
            enable_relay: env_flag("ENABLE_RELAY", false),
            relay_port: env_str("RELAY_PORT", "/dev/ttyUSB0"),
            relay_baud_rate: env_parse("RELAY_BAUD_RATE", 9_600),
            dash_password: env_opt("DASH_PASSWORD"),
            vapid_public_key: env_opt("VAPID_PUBLIC_KEY"),
            vapid_private_key: env_opt("VAPID_PRIVATE_KEY"),
            vapid_subject: env_opt("VAPID_SUBJECT"),
            enable_file_log: env_flag("ENABLE_FILE_LOG", false),
            log_retention_days: env_parse("LOG_RETENTION_DAYS", 7),
            log_dir: PathBuf::from(env_str("LOG_DIR", "logs")),
            recordings_dir: PathBuf::from(env_str("RECORDINGS_DIR", "recordings")),
            recordings_temp_dir: PathBuf::from(env_str("RECORDINGS_TEMP_DIR", "recordings_temp")),
        }
    }

    /// ICE servers advertised to every client in the `config` frame and
    /// used for the server-side peer connections.
    pub fn ice_servers(&self) -> Vec<IceServerConfig> {
        vec![IceServerConfig::stun(self.stun_server.clone())]
    }

    pub fn client_names_path(&self) -> PathBuf {
        self.recordings_dir.join("client_names.json")
    }

    pub fn restart_marker_path(&self) -> PathBuf {
        PathBuf::from("restart.requested")
    }
}

fn env_str(key: &str, default: &str) -> String {
    std::env::var(key)
        .ok()
        .filter(|v| !v.is_empty())
        .unwrap_or_else(|| default.to_string())
}

fn env_opt(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.is_empty())
}

fn env_parse<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn env_flag(key: &str, default: bool) -> bool {
    match std::env::var(key) {
        Ok(v) => matches!(v.as_str(), "1" | "true" | "TRUE" | "yes" | "on"),
        Err(_) => default,
    }
}
