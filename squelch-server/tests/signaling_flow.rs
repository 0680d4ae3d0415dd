mod utils;

use squelch_core::{ClientId, Envelope, PttWireState, SERVER_WIRE_ID};
use squelch_server::session::SessionEvent;
use utils::{connect, connect_with_actor, test_app};

#[tokio::test]
async fn register_announces_to_others_only() {
    let dir = tempfile::tempdir().unwrap();
    let app = test_app(dir.path());

    let mut a = connect(&app, "aaaaaaaa");
    let mut b = connect(&app, "bbbbbbbb");

    match a.recv().await {
        Envelope::ClientJoined { client_id, .. } => assert_eq!(client_id, b.id),
        other => panic!("expected client_joined, got {other:?}"),
    }
    b.expect_silence().await;

    let list = app.registry.client_list();
    assert_eq!(list.len(), 2);
}

#[tokio::test]
async fn broadcast_skips_the_excluded_client() {
    let dir = tempfile::tempdir().unwrap();
    let app = test_app(dir.path());

    let mut a = connect(&app, "aaaaaaaa");
    let mut b = connect(&app, "bbbbbbbb");
    let mut c = connect(&app, "cccccccc");
    a.drain();
    b.drain();
    c.drain();

    app.registry.broadcast(
        &Envelope::ClientLeft {
            client_id: ClientId::from("zzzzzzzz"),
        },
        Some(&a.id),
    );
    a.expect_silence().await;
    assert!(matches!(b.recv().await, Envelope::ClientLeft { .. }));
    assert!(matches!(c.recv().await, Envelope::ClientLeft { .. }));
}

#[tokio::test]
async fn send_to_unknown_client_reports_failure() {
    let dir = tempfile::tempdir().unwrap();
    let app = test_app(dir.path());
    assert!(!app.registry.send_to(
        &ClientId::from("zzzzzzzz"),
        Envelope::RequestIceRestart
    ));
}

#[tokio::test]
async fn p2p_envelopes_are_relayed_with_rewritten_sender() {
    let dir = tempfile::tempdir().unwrap();
    let app = test_app(dir.path());

    let a = connect_with_actor(&app, "aaaaaaaa");
    let mut b = connect(&app, "bbbbbbbb");
    b.drain();

    a.events
        .send(SessionEvent::FromClient(Envelope::P2pOffer {
            from: None,
            to: Some(b.id.clone()),
            sdp: "v=0".to_string(),
        }))
        .await
        .unwrap();

    match b.recv().await {
        Envelope::P2pOffer { from, to, sdp } => {
            assert_eq!(from, Some(a.id.clone()));
            assert!(to.is_none());
            assert_eq!(sdp, "v=0");
        }
        other => panic!("expected relayed p2p_offer, got {other:?}"),
    }
}

#[tokio::test]
async fn p2p_envelope_for_unknown_target_is_dropped() {
    let dir = tempfile::tempdir().unwrap();
    let app = test_app(dir.path());

    let a = connect_with_actor(&app, "aaaaaaaa");
    let mut b = connect(&app, "bbbbbbbb");
    b.drain();

    a.events
        .send(SessionEvent::FromClient(Envelope::P2pAnswer {
            from: None,
            to: Some(ClientId::from("zzzzzzzz")),
            sdp: "v=0".to_string(),
        }))
        .await
        .unwrap();

    b.expect_silence().await;
}

#[tokio::test]
async fn actor_handles_ptt_and_display_name() {
    let dir = tempfile::tempdir().unwrap();
    let app = test_app(dir.path());

    let mut a = connect_with_actor(&app, "aaaaaaaa");

    a.events
        .send(SessionEvent::FromClient(Envelope::SetDisplayName {
            display_name: "Alice".to_string(),
        }))
        .await
        .unwrap();
    a.events
        .send(SessionEvent::FromClient(Envelope::PttRequest))
        .await
        .unwrap();

    match a.recv().await {
        Envelope::PttGranted { speaker_name, .. } => {
            assert_eq!(speaker_name.as_deref(), Some("Alice"));
        }
        other => panic!("expected ptt_granted, got {other:?}"),
    }
    assert!(matches!(a.recv().await, Envelope::PttStatus { .. }));

    // Renames are persisted for the transcriber.
    assert_eq!(app.names.get(&a.id).as_deref(), Some("Alice"));
}

#[tokio::test]
async fn actor_stores_push_subscriptions() {
    let dir = tempfile::tempdir().unwrap();
    let app = test_app(dir.path());

    let a = connect_with_actor(&app, "aaaaaaaa");
    a.events
        .send(SessionEvent::FromClient(Envelope::PushSubscribe {
            subscription: serde_json::json!({ "endpoint": "https://push.example/x" }),
        }))
        .await
        .unwrap();

    tokio::time::sleep(std::time::Duration::from_millis(100)).await;
    assert_eq!(app.push.len(), 1);
}

#[tokio::test]
async fn transport_close_tears_down_and_releases_floor() {
    let dir = tempfile::tempdir().unwrap();
    let app = test_app(dir.path());

    let a = connect_with_actor(&app, "aaaaaaaa");
    let mut b = connect(&app, "bbbbbbbb");
    b.drain();

    a.events
        .send(SessionEvent::FromClient(Envelope::PttRequest))
        .await
        .unwrap();
    match b.recv().await {
        Envelope::PttStatus { state, .. } => assert_eq!(state, PttWireState::Transmitting),
        other => panic!("expected ptt_status, got {other:?}"),
    }

    a.events.send(SessionEvent::TransportClosed).await.unwrap();

    // Floor release first, then the departure, then the refreshed status.
    match b.recv().await {
        Envelope::PttStatus { state, .. } => assert_eq!(state, PttWireState::Idle),
        other => panic!("expected idle ptt_status, got {other:?}"),
    }
    match b.recv().await {
        Envelope::ClientLeft { client_id } => assert_eq!(client_id, a.id),
        other => panic!("expected client_left, got {other:?}"),
    }
    match b.recv().await {
        Envelope::PttStatus { state, .. } => assert_eq!(state, PttWireState::Idle),
        other => panic!("expected ptt_status, got {other:?}"),
    }

    assert_eq!(app.registry.len(), 1);
    assert_eq!(app.floor.holder(), None);
}

#[tokio::test]
async fn dashboard_disconnect_reaches_the_actor() {
    let dir = tempfile::tempdir().unwrap();
    let app = test_app(dir.path());

    let a = connect_with_actor(&app, "aaaaaaaa");
    let mut b = connect(&app, "bbbbbbbb");
    b.drain();

    assert!(
        app.registry
            .post_event(&a.id, SessionEvent::CloseRequested("dashboard_disconnect"))
            .await
    );
    assert!(matches!(b.recv().await, Envelope::ClientLeft { .. }));
    assert_eq!(app.registry.len(), 1);
}

#[tokio::test]
async fn server_wire_id_never_collides_with_minted_ids() {
    let minted = ClientId::mint();
    assert_ne!(minted.as_str(), SERVER_WIRE_ID);
    assert_eq!(minted.as_str().len(), 8);
}
