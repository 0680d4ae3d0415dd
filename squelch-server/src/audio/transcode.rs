use std::path::Path;
use std::process::Stdio;

use tokio::process::{Child, Command};

use crate::config::{Config, SpeakerMode};

/// Local microphone → Ogg/Opus on stdout. One 20 ms packet per frame.
pub fn spawn_mic_source(cfg: &Config) -> std::io::Result<Child> {
    Command::new("ffmpeg")
        .args(["-hide_banner", "-loglevel", "error", "-f", "alsa", "-i"])
        .arg(&cfg.mic_device)
        .args([
            "-ac", "1", "-ar", "48000", "-c:a", "libopus", "-b:a", "32k",
            "-frame_duration", "20", "-f", "ogg", "pipe:1",
        ])
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .kill_on_drop(true)
        .spawn()
}

/// Ogg/Opus on stdin → 44.1 kHz mono 16-bit WAV at `output`.
pub fn spawn_recorder(output: &Path) -> std::io::Result<Child> {
    Command::new("ffmpeg")
        .args([
            "-hide_banner", "-loglevel", "error", "-y", "-f", "ogg", "-i", "pipe:0",
            "-ar", "44100", "-ac", "1", "-c:a", "pcm_s16le",
        ])
        .arg(output)
        .stdin(Stdio::piped())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .kill_on_drop(true)
        .spawn()
}

/// Ogg/Opus on stdin → the local speaker. The persistent flavor is the
/// resident helper that survives silences between floor sessions; the
/// per-session flavor is spawned per grant and killed on release.
pub fn spawn_speaker(cfg: &Config) -> std::io::Result<Child> {
    let mut command = match cfg.speaker_mode {
        SpeakerMode::Persistent => {
            let mut c = Command::new("python3");
            c.arg("audio_output.py").arg(&cfg.speaker_device_id);
            c
        }
        SpeakerMode::PerSession => {
            let mut c = Command::new("ffplay");
            c.args([
                "-hide_banner", "-loglevel", "error", "-nodisp", "-f", "ogg", "-i", "pipe:0",
            ]);
            c
        }
    };
    command
        .stdin(Stdio::piped())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .kill_on_drop(true)
        .spawn()
}
