mod utils;

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use squelch_core::Envelope;
use squelch_server::{api, App};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use utils::test_app;
use webrtc::api::interceptor_registry::register_default_interceptors;
use webrtc::api::media_engine::MediaEngine;
use webrtc::api::APIBuilder;
use webrtc::interceptor::registry::Registry;
use webrtc::peer_connection::configuration::RTCConfiguration;
use webrtc::peer_connection::offer_answer_options::RTCOfferOptions;
use webrtc::peer_connection::sdp::session_description::RTCSessionDescription;
use webrtc::peer_connection::RTCPeerConnection;
use webrtc::rtp_transceiver::rtp_codec::RTPCodecType;

type WsStream = WebSocketStream<MaybeTlsStream<tokio::net::TcpStream>>;

async fn spawn_server(app: Arc<App>) -> SocketAddr {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let router = api::router(app);
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    addr
}

async fn ws_connect(addr: SocketAddr) -> WsStream {
    let (ws, _) = connect_async(format!("ws://{addr}/ws")).await.unwrap();
    ws
}

async fn ws_send(ws: &mut WsStream, envelope: &Envelope) {
    ws.send(Message::Text(serde_json::to_string(envelope).unwrap()))
        .await
        .unwrap();
}

async fn ws_recv(ws: &mut WsStream) -> Envelope {
    loop {
        let msg = tokio::time::timeout(Duration::from_secs(10), ws.next())
            .await
            .expect("timed out waiting for frame")
            .expect("socket ended")
            .expect("socket error");
        if let Message::Text(text) = msg {
            return serde_json::from_str(&text).unwrap();
        }
    }
}

/// Server host candidates trickle in between the frames the tests care
/// about; skip them.
async fn ws_recv_signal(ws: &mut WsStream) -> Envelope {
    loop {
        match ws_recv(ws).await {
            Envelope::IceCandidate { .. } => continue,
            other => return other,
        }
    }
}

/// A browser-shaped peer: default codecs, one audio transceiver.
async fn client_pc() -> Arc<RTCPeerConnection> {
    let mut media = MediaEngine::default();
    media.register_default_codecs().unwrap();
    let registry = register_default_interceptors(Registry::new(), &mut media).unwrap();
    let api = APIBuilder::new()
        .with_media_engine(media)
        .with_interceptor_registry(registry)
        .build();
    let pc = api
        .new_peer_connection(RTCConfiguration::default())
        .await
        .unwrap();
    pc.add_transceiver_from_kind(RTPCodecType::Audio, None)
        .await
        .unwrap();
    Arc::new(pc)
}

#[tokio::test]
async fn config_is_the_first_frame() {
    let dir = tempfile::tempdir().unwrap();
    let addr = spawn_server(test_app(dir.path())).await;

    let mut ws = ws_connect(addr).await;
    match ws_recv(&mut ws).await {
        Envelope::Config {
            client_id,
            ice_servers,
            vapid_public_key,
        } => {
            assert_eq!(client_id.as_str().len(), 8);
            assert!(!ice_servers.is_empty());
            assert!(vapid_public_key.is_none());
        }
        other => panic!("expected config, got {other:?}"),
    }
}

#[tokio::test]
async fn malformed_frames_do_not_close_the_transport() {
    let dir = tempfile::tempdir().unwrap();
    let addr = spawn_server(test_app(dir.path())).await;

    let mut ws = ws_connect(addr).await;
    let _config = ws_recv(&mut ws).await;

    ws.send(Message::Text("this is not an envelope".to_string()))
        .await
        .unwrap();
    ws.send(Message::Text(r#"{"type":"no_such_type"}"#.to_string()))
        .await
        .unwrap();

    ws_send(
        &mut ws,
        &Envelope::SetDisplayName {
            display_name: "A".to_string(),
        },
    )
    .await;
    ws_send(&mut ws, &Envelope::PttRequest).await;

    match ws_recv_signal(&mut ws).await {
        Envelope::PttGranted { speaker_name, .. } => {
            assert_eq!(speaker_name.as_deref(), Some("A"));
        }
        other => panic!("expected ptt_granted, got {other:?}"),
    }
}

#[tokio::test]
async fn offer_is_answered_with_mono_opus() {
    let dir = tempfile::tempdir().unwrap();
    let addr = spawn_server(test_app(dir.path())).await;

    let mut ws = ws_connect(addr).await;
    let _config = ws_recv(&mut ws).await;

    let pc = client_pc().await;
    let offer = pc.create_offer(None).await.unwrap();
    pc.set_local_description(offer.clone()).await.unwrap();
    ws_send(&mut ws, &Envelope::Offer { sdp: offer.sdp }).await;

    let answer_sdp = match ws_recv_signal(&mut ws).await {
        Envelope::Answer { sdp } => sdp,
        other => panic!("expected answer, got {other:?}"),
    };
    assert!(answer_sdp.contains("stereo=0"));
    assert!(answer_sdp.contains("sprop-stereo=0"));

    // The answer is a valid remote description for the offering side.
    pc.set_remote_description(RTCSessionDescription::answer(answer_sdp).unwrap())
        .await
        .unwrap();
}

#[tokio::test]
async fn ice_restart_offer_is_answered() {
    let dir = tempfile::tempdir().unwrap();
    let addr = spawn_server(test_app(dir.path())).await;

    let mut ws = ws_connect(addr).await;
    let _config = ws_recv(&mut ws).await;

    let pc = client_pc().await;
    let offer = pc.create_offer(None).await.unwrap();
    pc.set_local_description(offer.clone()).await.unwrap();
    ws_send(&mut ws, &Envelope::Offer { sdp: offer.sdp }).await;

    let answer_sdp = match ws_recv_signal(&mut ws).await {
        Envelope::Answer { sdp } => sdp,
        other => panic!("expected answer, got {other:?}"),
    };
    pc.set_remote_description(RTCSessionDescription::answer(answer_sdp).unwrap())
        .await
        .unwrap();

    // Fresh credentials, same session: the restart path must answer too.
    let restart = pc
        .create_offer(Some(RTCOfferOptions {
            ice_restart: true,
            ..Default::default()
        }))
        .await
        .unwrap();
    pc.set_local_description(restart.clone()).await.unwrap();
    ws_send(&mut ws, &Envelope::IceRestartOffer { sdp: restart.sdp }).await;

    match ws_recv_signal(&mut ws).await {
        Envelope::IceRestartAnswer { sdp } => {
            assert!(sdp.contains("stereo=0"));
        }
        other => panic!("expected ice_restart_answer, got {other:?}"),
    }
}

#[tokio::test]
async fn closing_a_socket_broadcasts_departure() {
    let dir = tempfile::tempdir().unwrap();
    let addr = spawn_server(test_app(dir.path())).await;

    let mut a = ws_connect(addr).await;
    let _config_a = ws_recv(&mut a).await;

    let mut b = ws_connect(addr).await;
    let b_id = match ws_recv(&mut b).await {
        Envelope::Config { client_id, .. } => client_id,
        other => panic!("expected config, got {other:?}"),
    };

    match ws_recv(&mut a).await {
        Envelope::ClientJoined { client_id, .. } => assert_eq!(client_id, b_id),
        other => panic!("expected client_joined, got {other:?}"),
    }

    b.close(None).await.unwrap();

    loop {
        match ws_recv(&mut a).await {
            Envelope::ClientLeft { client_id } => {
                assert_eq!(client_id, b_id);
                break;
            }
            Envelope::PttStatus { .. } => continue,
            other => panic!("expected client_left, got {other:?}"),
        }
    }
}
