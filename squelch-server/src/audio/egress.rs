use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use bytes::Bytes;
use chrono::Local;
use squelch_core::ClientId;
use tokio::io::AsyncWriteExt;
use tokio::process::{Child, ChildStdin};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::audio::transcode;
use crate::config::{Config, SpeakerMode};
use crate::media::OggMux;

/// Writes into a subprocess pipe never stall the RTP path longer than
/// this; a frame that cannot be written in time is dropped.
const PIPE_WRITE_DEADLINE: Duration = Duration::from_millis(50);

/// Bounded wait for the recorder to drain and exit after stdin closes.
const RECORDER_EXIT_DEADLINE: Duration = Duration::from_secs(5);

/// Persistent-speaker spawn failures inside this window trip a cooldown
/// that disables local playback instead of busy-respawning.
const SPAWN_FAILURE_WINDOW: Duration = Duration::from_secs(60);
const SPAWN_FAILURE_LIMIT: usize = 3;
const SPAWN_COOLDOWN: Duration = Duration::from_secs(300);

enum EgressCommand {
    StartRecording(ClientId),
    Rtp(Bytes),
    StopRecording,
    PausePlayback,
}

/// Cheap clonable entry point into the egress actor.
#[derive(Clone)]
pub struct EgressHandle {
    tx: mpsc::Sender<EgressCommand>,
}

impl EgressHandle {
    pub async fn start_recording(&self, id: ClientId) {
        let _ = self.tx.send(EgressCommand::StartRecording(id)).await;
    }

    pub async fn stop_recording(&self) {
        let _ = self.tx.send(EgressCommand::StopRecording).await;
    }

    pub async fn pause_playback(&self) {
        let _ = self.tx.send(EgressCommand::PausePlayback).await;
    }

    /// Lossy on a full queue; audio must never back up the RTP pump.
    pub fn rtp(&self, payload: Bytes) {
        let _ = self.tx.try_send(EgressCommand::Rtp(payload));
    }
}

/// The playback-and-recording actor. Owns the speaker sink and at most
/// one recording slot; every floor grant to a web client opens a slot,
/// the matching release finalizes it.
pub struct Egress {
    cfg: Arc<Config>,
    speaker: SpeakerSink,
    recording: Option<RecordingSlot>,
}

impl Egress {
    pub fn spawn(cfg: Arc<Config>) -> EgressHandle {
        let (tx, rx) = mpsc::channel(256);
        let egress = Self {
            speaker: SpeakerSink::new(Arc::clone(&cfg)),
            cfg,
            recording: None,
        };
        tokio::spawn(egress.run(rx));
        EgressHandle { tx }
    }

    async fn run(mut self, mut rx: mpsc::Receiver<EgressCommand>) {
        while let Some(command) = rx.recv().await {
            match command {
                EgressCommand::StartRecording(id) => self.start_recording(id).await,
                EgressCommand::Rtp(payload) => self.handle_rtp(&payload).await,
                EgressCommand::StopRecording => self.stop_recording().await,
                EgressCommand::PausePlayback => self.speaker.pause(),
            }
        }
    }

    async fn start_recording(&mut self, id: ClientId) {
        if self.recording.is_some() {
            warn!("recording slot still open on new grant, finalizing first");
            self.stop_recording().await;
        }
        self.speaker.resume();
        match RecordingSlot::create(&self.cfg, &id).await {
            Ok(slot) => {
                info!(client = %id, temp = %slot.temp_path.display(), "recording started");
                self.recording = Some(slot);
            }
            // A crashed encoder costs this session's file only; the next
            // grant spawns a fresh one.
            Err(e) => warn!(client = %id, "recorder unavailable: {e:#}"),
        }
    }

    async fn stop_recording(&mut self) {
        if let Some(slot) = self.recording.take() {
            slot.finalize().await;
        }
        if self.cfg.speaker_mode == SpeakerMode::PerSession {
            self.speaker.kill_child().await;
        }
    }

    async fn handle_rtp(&mut self, packet: &[u8]) {
        self.speaker.write_packet(packet).await;
        if let Some(slot) = self.recording.as_mut() {
            slot.write_packet(packet).await;
        }
    }
}

struct SpeakerFeed {
    child: Child,
    stdin: ChildStdin,
    mux: OggMux,
}

struct SpeakerSink {
    cfg: Arc<Config>,
    feed: Option<SpeakerFeed>,
    failures: Vec<Instant>,
    cooldown_until: Option<Instant>,
    paused: bool,
}

impl SpeakerSink {
    fn new(cfg: Arc<Config>) -> Self {
        Self {
            cfg,
            feed: None,
            failures: Vec::new(),
            cooldown_until: None,
            paused: false,
        }
    }

    fn resume(&mut self) {
        self.paused = false;
    }

    fn pause(&mut self) {
        self.paused = true;
    }

    async fn kill_child(&mut self) {
        if let Some(mut feed) = self.feed.take() {
            drop(feed.stdin);
            let _ = feed.child.kill().await;
        }
    }

    async fn write_packet(&mut self, packet: &[u8]) {
        if !self.cfg.enable_local_audio || self.paused {
            return;
        }
        if let Some(until) = self.cooldown_until {
            if Instant::now() < until {
                return;
            }
            self.cooldown_until = None;
        }

        if self.feed.is_none() {
            match transcode::spawn_speaker(&self.cfg) {
                Ok(mut child) => match child.stdin.take() {
                    Some(stdin) => {
                        self.feed = Some(SpeakerFeed {
                            child,
                            stdin,
                            mux: OggMux::new(rand::random()),
                        });
                    }
                    None => {
                        warn!("speaker subprocess has no stdin");
                        self.record_failure();
                        return;
                    }
                },
                Err(e) => {
                    warn!("speaker spawn failed: {e}");
                    self.record_failure();
                    return;
                }
            }
        }

        let Some(feed) = self.feed.as_mut() else {
            return;
        };
        let mut bytes = Vec::new();
        if !feed.mux.headers_done() {
            bytes.extend_from_slice(&feed.mux.header_pages());
        }
        bytes.extend_from_slice(&feed.mux.audio_page(packet));

        match write_with_deadline(&mut feed.stdin, &bytes).await {
            Ok(true) => {}
            Ok(false) => debug!("speaker pipe slow, frame dropped"),
            Err(e) => {
                warn!("speaker pipe broken: {e}");
                self.kill_child().await;
                self.record_failure();
            }
        }
    }

    fn record_failure(&mut self) {
        let now = Instant::now();
        self.failures
            .retain(|t| now.duration_since(*t) < SPAWN_FAILURE_WINDOW);
        self.failures.push(now);
        if self.failures.len() >= SPAWN_FAILURE_LIMIT {
            warn!(
                "speaker failed {} times, disabling local playback for {}s",
                self.failures.len(),
                SPAWN_COOLDOWN.as_secs()
            );
            self.cooldown_until = Some(now + SPAWN_COOLDOWN);
            self.failures.clear();
        }
    }
}

struct RecordingSlot {
    temp_path: PathBuf,
    final_path: PathBuf,
    child: Child,
    stdin: Option<ChildStdin>,
    mux: OggMux,
    wrote_audio: bool,
}

impl RecordingSlot {
    async fn create(cfg: &Config, id: &ClientId) -> Result<Self> {
        std::fs::create_dir_all(&cfg.recordings_dir)
            .with_context(|| format!("create {}", cfg.recordings_dir.display()))?;
        std::fs::create_dir_all(&cfg.recordings_temp_dir)
            .with_context(|| format!("create {}", cfg.recordings_temp_dir.display()))?;

        let stamp = Local::now().format("%Y%m%d_%H%M%S");
        let temp_path = cfg
            .recordings_temp_dir
            .join(format!("recording_{stamp}_{id}.wav"));
        let final_path = cfg.recordings_dir.join(format!("web_{stamp}_{id}.wav"));

        let mut child = transcode::spawn_recorder(&temp_path).context("spawn recorder")?;
        let stdin = child.stdin.take().context("recorder stdin")?;

        Ok(Self {
            temp_path,
            final_path,
            child,
            stdin: Some(stdin),
            mux: OggMux::new(rand::random()),
            wrote_audio: false,
        })
    }

    async fn write_packet(&mut self, packet: &[u8]) {
        let Some(stdin) = self.stdin.as_mut() else {
            return;
        };
        let mut bytes = Vec::new();
        if !self.mux.headers_done() {
            bytes.extend_from_slice(&self.mux.header_pages());
        }
        bytes.extend_from_slice(&self.mux.audio_page(packet));

        match write_with_deadline(stdin, &bytes).await {
            Ok(true) => self.wrote_audio = true,
            Ok(false) => debug!("recorder pipe slow, frame dropped"),
            Err(e) => {
                warn!("recorder pipe broken: {e}");
                self.stdin = None;
            }
        }
    }

    /// Half-close stdin, wait out the encoder, then move the file into
    /// the recordings directory. An encoder that never exits leaves the
    /// temp file behind for external cleanup.
    async fn finalize(mut self) {
        drop(self.stdin.take());

        let mut child = self.child;
        if tokio::time::timeout(RECORDER_EXIT_DEADLINE, child.wait())
            .await
            .is_err()
        {
            warn!(
                temp = %self.temp_path.display(),
                "recorder did not exit in time, temp file left in place"
            );
            return;
        }

        let has_bytes = std::fs::metadata(&self.temp_path)
            .map(|m| m.len() > 0)
            .unwrap_or(false);
        if self.wrote_audio && has_bytes {
            match finalize_file(&self.temp_path, &self.final_path) {
                Ok(path) => info!(file = %path.display(), "recording saved"),
                Err(e) => warn!("failed to finalize recording: {e:#}"),
            }
        } else {
            let _ = std::fs::remove_file(&self.temp_path);
        }
    }
}

async fn write_with_deadline(stdin: &mut ChildStdin, bytes: &[u8]) -> std::io::Result<bool> {
    match tokio::time::timeout(PIPE_WRITE_DEADLINE, stdin.write_all(bytes)).await {
        Ok(Ok(())) => Ok(true),
        Ok(Err(e)) => Err(e),
        Err(_) => Ok(false),
    }
}

/// Move `temp` to `final_path`, never overwriting: collisions retry with
/// a `-N` suffix. Falls back to copy-and-unlink across filesystems.
fn finalize_file(temp: &Path, final_path: &Path) -> Result<PathBuf> {
    let target = unique_path(final_path);
    if std::fs::rename(temp, &target).is_ok() {
        return Ok(target);
    }
    std::fs::copy(temp, &target).with_context(|| format!("copy to {}", target.display()))?;
    std::fs::remove_file(temp).with_context(|| format!("remove {}", temp.display()))?;
    Ok(target)
}

fn unique_path(path: &Path) -> PathBuf {
    if !path.exists() {
        return path.to_path_buf();
    }
    let stem = path
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("recording");
    let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("wav");
    let dir = path.parent().unwrap_or_else(|| Path::new("."));
    for n in 1.. {
        let candidate = dir.join(format!("{stem}-{n}.{ext}"));
        if !candidate.exists() {
            return candidate;
        }
    }
    unreachable!()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn finalize_moves_and_never_overwrites() {
        let tmp = tempfile::tempdir().unwrap();
        let final_path = tmp.path().join("web_20260101_120000_aaaaaaaa.wav");

        let temp1 = tmp.path().join("t1.wav");
        std::fs::write(&temp1, b"one").unwrap();
        let saved1 = finalize_file(&temp1, &final_path).unwrap();
        assert_eq!(saved1, final_path);
        assert!(!temp1.exists());

        let temp2 = tmp.path().join("t2.wav");
        std::fs::write(&temp2, b"two").unwrap();
        let saved2 = finalize_file(&temp2, &final_path).unwrap();
        assert_eq!(
            saved2.file_name().unwrap().to_str().unwrap(),
            "web_20260101_120000_aaaaaaaa-1.wav"
        );
        assert_eq!(std::fs::read(&final_path).unwrap(), b"one");
        assert_eq!(std::fs::read(&saved2).unwrap(), b"two");
    }

    #[test]
    fn unique_path_counts_upward() {
        let tmp = tempfile::tempdir().unwrap();
        let base = tmp.path().join("web_x.wav");
        std::fs::write(&base, b"a").unwrap();
        std::fs::write(tmp.path().join("web_x-1.wav"), b"b").unwrap();
        assert_eq!(
            unique_path(&base).file_name().unwrap().to_str().unwrap(),
            "web_x-2.wav"
        );
    }
}
