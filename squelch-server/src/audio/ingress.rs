use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use bytes::Bytes;
use squelch_core::Speaker;
use tokio::io::AsyncReadExt;
use tracing::{info, warn};

use crate::app::App;
use crate::audio::transcode;
use crate::config::ServerMicMode;
use crate::media::OggDemux;

const RESPAWN_BACKOFF: Duration = Duration::from_secs(5);

/// Server microphone → every connected P2P track. The subprocess emits
/// Ogg/Opus on stdout; each extracted packet is fanned out unless the
/// gate below suppresses it.
pub fn spawn_ingress(app: Arc<App>) {
    if !app.config.enable_server_mic {
        return;
    }
    tokio::spawn(async move {
        loop {
            match pump_microphone(&app).await {
                Ok(()) => info!("microphone source ended"),
                Err(e) => warn!("microphone source failed: {e:#}"),
            }
            tokio::time::sleep(RESPAWN_BACKOFF).await;
        }
    });
}

async fn pump_microphone(app: &Arc<App>) -> Result<()> {
    let mut child = transcode::spawn_mic_source(&app.config).context("spawn mic source")?;
    let mut stdout = child.stdout.take().context("mic source stdout")?;

    info!(device = %app.config.mic_device, "microphone source started");

    let mut demux = OggDemux::new();
    let mut buf = [0u8; 4096];
    loop {
        let n = stdout.read(&mut buf).await.context("read mic source")?;
        if n == 0 {
            break;
        }
        demux.push(&buf[..n]);
        while let Some(packet) = demux.next_packet() {
            if !mic_gate(app.floor.holder(), app.config.server_mic_mode) {
                continue;
            }
            app.fanout.forward(&Bytes::from(packet), None).await;
        }
    }

    let _ = child.wait().await;
    Ok(())
}

/// Echo suppression and the mic-mode policy in one place. While a real
/// client holds the floor, mic frames are always discarded: the local
/// speaker is playing that client back and would loop into the mic.
fn mic_gate(holder: Option<Speaker>, mode: ServerMicMode) -> bool {
    match holder {
        Some(Speaker::Client(_)) => false,
        None => true,
        Some(Speaker::Server) | Some(Speaker::External) => mode == ServerMicMode::Always,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use squelch_core::ClientId;

    #[test]
    fn gate_always_suppresses_web_holders() {
        let holder = Some(Speaker::Client(ClientId::from("aaaaaaaa")));
        assert!(!mic_gate(holder.clone(), ServerMicMode::Always));
        assert!(!mic_gate(holder, ServerMicMode::Ptt));
    }

    #[test]
    fn ptt_mode_transmits_only_while_idle() {
        assert!(mic_gate(None, ServerMicMode::Ptt));
        assert!(!mic_gate(Some(Speaker::External), ServerMicMode::Ptt));
        assert!(mic_gate(Some(Speaker::External), ServerMicMode::Always));
        assert!(mic_gate(Some(Speaker::Server), ServerMicMode::Always));
    }
}
