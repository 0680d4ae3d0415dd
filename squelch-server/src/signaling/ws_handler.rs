use std::sync::Arc;
use std::time::Duration;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::IntoResponse;
use futures::{SinkExt, StreamExt};
use squelch_core::{ClientId, Envelope};
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use crate::app::App;
use crate::session::{Session, SessionEvent};
use crate::signaling::registry::ClientHandle;

const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(30);

/// Outbound frames queued for a client that has stopped draining its
/// socket; anything past this is dropped rather than buffered.
const OUTBOUND_QUEUE: usize = 256;

pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(app): State<Arc<App>>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, app))
}

async fn handle_socket(socket: WebSocket, app: Arc<App>) {
    let client_id = ClientId::mint();
    info!(client = %client_id, "client connected");

    let (out_tx, mut out_rx) = mpsc::channel::<Envelope>(OUTBOUND_QUEUE);
    let (event_tx, event_rx) = mpsc::channel::<SessionEvent>(256);

    Session::spawn(client_id.clone(), app.clone(), event_tx.clone(), event_rx);
    app.registry.register(
        client_id.clone(),
        ClientHandle::new(&client_id, out_tx, event_tx.clone()),
    );

    app.registry.send_to(
        &client_id,
        Envelope::Config {
            client_id: client_id.clone(),
            ice_servers: app.config.ice_servers(),
            vapid_public_key: app.config.vapid_public_key.clone(),
        },
    );

    let (mut sink, mut stream) = socket.split();
    let mut heartbeat = tokio::time::interval(HEARTBEAT_INTERVAL);
    heartbeat.tick().await;
    let mut heartbeat_alive = true;

    loop {
        tokio::select! {
            outbound = out_rx.recv() => {
                let Some(envelope) = outbound else { break };
                match serde_json::to_string(&envelope) {
                    Ok(json) => {
                        if sink.send(Message::Text(json)).await.is_err() {
                            break;
                        }
                    }
                    Err(e) => error!("envelope serialization failed: {e}"),
                }
            }

            inbound = stream.next() => {
                match inbound {
                    Some(Ok(Message::Text(text))) => {
                        match serde_json::from_str::<Envelope>(&text) {
                            Ok(envelope) => {
                                if event_tx
                                    .send(SessionEvent::FromClient(envelope))
                                    .await
                                    .is_err()
                                {
                                    break;
                                }
                            }
                            // One bad frame never costs the connection.
                            Err(e) => warn!(client = %client_id, "malformed frame dropped: {e}"),
                        }
                    }
                    Some(Ok(Message::Pong(_))) => heartbeat_alive = true,
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        debug!(client = %client_id, "socket error: {e}");
                        break;
                    }
                }
            }

            _ = heartbeat.tick() => {
                if !heartbeat_alive {
                    warn!(client = %client_id, "no pong since last ping, closing");
                    break;
                }
                heartbeat_alive = false;
                if sink.send(Message::Ping(Vec::new())).await.is_err() {
                    break;
                }
            }
        }
    }

    let _ = event_tx.send(SessionEvent::TransportClosed).await;
    info!(client = %client_id, "client disconnected");
}
