use std::sync::Arc;
use std::time::{Duration, Instant};

use squelch_core::{ClientId, Envelope, Speaker, SERVER_WIRE_ID};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use webrtc::peer_connection::peer_connection_state::RTCPeerConnectionState;

use crate::app::App;
use crate::session::event::{SessionEvent, TimerKind, TIMER_KINDS};
use crate::session::main_pc::MainPc;
use crate::session::p2p::P2pLink;
use crate::session::pc::state_tag;

/// Transient `disconnected` right after a successful ICE restart is
/// ignored for this long; the ICE layer oscillates during the handshake.
const ICE_RESTART_COOLDOWN: Duration = Duration::from_secs(10);

/// Deadline for the client to answer `request_ice_restart`.
const ICE_RESTART_DEADLINE: Duration = Duration::from_secs(5);

/// Prompt/offer cycles allowed per disconnect episode.
const ICE_RESTART_MAX_ATTEMPTS: u32 = 5;

/// Grace before a dropped P2P connection is torn down.
const P2P_CLEANUP_GRACE: Duration = Duration::from_secs(15);

/// One actor per connected client. All session state is mutated here, on
/// events posted by the socket task, the peer-connection callbacks and
/// the timers, so the state machines below need no locks.
pub struct Session {
    id: ClientId,
    app: Arc<App>,
    events_tx: mpsc::Sender<SessionEvent>,

    main: Option<MainPc>,
    p2p: Option<P2pLink>,
    next_generation: u64,

    timer_tokens: [u64; TIMER_KINDS],

    ice_restart_episode: bool,
    ice_restart_in_progress: bool,
    ice_restart_attempts: u32,
    ice_restart_success_at: Option<Instant>,

    p2p_connected: bool,
    closing: bool,
}

impl Session {
    pub fn spawn(
        id: ClientId,
        app: Arc<App>,
        events_tx: mpsc::Sender<SessionEvent>,
        events_rx: mpsc::Receiver<SessionEvent>,
    ) {
        let session = Self {
            id,
            app,
            events_tx,
            main: None,
            p2p: None,
            next_generation: 0,
            timer_tokens: [0; TIMER_KINDS],
            ice_restart_episode: false,
            ice_restart_in_progress: false,
            ice_restart_attempts: 0,
            ice_restart_success_at: None,
            p2p_connected: false,
            closing: false,
        };
        tokio::spawn(session.run(events_rx));
    }

    async fn run(mut self, mut events_rx: mpsc::Receiver<SessionEvent>) {
        self.arm_timer(TimerKind::OfferWait, self.app.config.offer_timeout);

        while let Some(event) = events_rx.recv().await {
            self.handle_event(event).await;
            if self.closing {
                break;
            }
        }
        if !self.closing {
            self.teardown("transport_closed").await;
        }
    }

    async fn handle_event(&mut self, event: SessionEvent) {
        match event {
            SessionEvent::FromClient(envelope) => self.handle_envelope(envelope).await,

            SessionEvent::MainState(generation, state) => {
                if self.main.as_ref().map(|m| m.generation) == Some(generation) {
                    self.handle_main_state(state).await;
                }
            }
            SessionEvent::MainCandidate(generation, candidate) => {
                if self.main.as_ref().map(|m| m.generation) == Some(generation) {
                    self.app
                        .registry
                        .send_to(&self.id, Envelope::IceCandidate { candidate });
                }
            }

            SessionEvent::P2pState(generation, state) => {
                if self.p2p.as_ref().map(|p| p.generation) == Some(generation) {
                    self.handle_p2p_state(state).await;
                }
            }
            SessionEvent::P2pCandidate(generation, candidate) => {
                if self.p2p.as_ref().map(|p| p.generation) == Some(generation) {
                    self.app.registry.send_to(
                        &self.id,
                        Envelope::P2pIceCandidate {
                            from: Some(ClientId::from(SERVER_WIRE_ID)),
                            to: None,
                            candidate,
                        },
                    );
                }
            }
            SessionEvent::P2pRtp(generation, payload) => {
                if self.p2p.as_ref().map(|p| p.generation) != Some(generation) {
                    return;
                }
                let holder = self.app.floor.holder();
                if holder.as_ref().and_then(Speaker::client_id) == Some(&self.id) {
                    self.app.egress.rtp(payload.clone());
                    self.app.fanout.forward(&payload, Some(&self.id)).await;
                }
            }

            SessionEvent::Timeout(kind, token) => {
                if self.timer_tokens[kind as usize] == token {
                    self.handle_timeout(kind).await;
                }
            }

            SessionEvent::CloseRequested(reason) => self.teardown(reason).await,
            SessionEvent::TransportClosed => self.teardown("transport_closed").await,
        }
    }

    async fn handle_envelope(&mut self, envelope: Envelope) {
        match envelope {
            Envelope::Offer { sdp } => {
                self.cancel_timer(TimerKind::OfferWait);
                if self.main.is_none() {
                    let generation = self.bump_generation();
                    match MainPc::new(
                        &self.id,
                        &self.app.config.ice_servers(),
                        generation,
                        self.events_tx.clone(),
                    )
                    .await
                    {
                        Ok(pc) => self.main = Some(pc),
                        Err(e) => {
                            warn!(client = %self.id, "main pc setup failed: {e:#}");
                            self.teardown("pc_setup_failed").await;
                            return;
                        }
                    }
                }
                let Some(main) = self.main.as_mut() else {
                    return;
                };
                match main.apply_remote_offer(&sdp).await {
                    Ok(answer) => {
                        self.app
                            .registry
                            .send_to(&self.id, Envelope::Answer { sdp: answer });
                    }
                    Err(e) => {
                        warn!(client = %self.id, "offer rejected: {e:#}");
                        self.teardown("sdp_error").await;
                    }
                }
            }

            Envelope::IceCandidate { candidate } => match self.main.as_mut() {
                Some(main) => main.add_candidate(candidate).await,
                None => debug!(client = %self.id, "candidate before offer, dropped"),
            },

            Envelope::IceRestartOffer { sdp } => {
                if self.main.is_none() {
                    debug!(client = %self.id, "ice_restart_offer without main pc");
                    return;
                }
                self.ice_restart_in_progress = true;
                self.cancel_timer(TimerKind::IceRestart);
                let Some(main) = self.main.as_mut() else {
                    return;
                };
                match main.apply_remote_offer(&sdp).await {
                    Ok(answer) => {
                        self.app
                            .registry
                            .send_to(&self.id, Envelope::IceRestartAnswer { sdp: answer });
                        // The transition can still stall after the answer.
                        self.arm_timer(TimerKind::IceRestart, ICE_RESTART_DEADLINE);
                    }
                    Err(e) => {
                        warn!(client = %self.id, "ice restart offer rejected: {e:#}");
                        self.teardown("sdp_error").await;
                    }
                }
            }

            Envelope::P2pAnswer { to, sdp, .. } => {
                if is_for_server(&to) {
                    if let Some(p2p) = self.p2p.as_mut() {
                        if let Err(e) = p2p.apply_answer(&sdp).await {
                            warn!(client = %self.id, "p2p answer rejected: {e:#}");
                        }
                    }
                } else {
                    self.relay(Envelope::P2pAnswer {
                        from: Some(self.id.clone()),
                        to: None,
                        sdp,
                    }, to);
                }
            }

            Envelope::P2pIceCandidate { to, candidate, .. } => {
                if is_for_server(&to) {
                    if let Some(p2p) = self.p2p.as_mut() {
                        p2p.add_candidate(candidate).await;
                    }
                } else {
                    self.relay(
                        Envelope::P2pIceCandidate {
                            from: Some(self.id.clone()),
                            to: None,
                            candidate,
                        },
                        to,
                    );
                }
            }

            Envelope::P2pOffer { to, sdp, .. } => {
                if is_for_server(&to) {
                    // The server is the offerer on its own P2P leg.
                    debug!(client = %self.id, "unexpected p2p_offer addressed to server");
                } else {
                    self.relay(
                        Envelope::P2pOffer {
                            from: Some(self.id.clone()),
                            to: None,
                            sdp,
                        },
                        to,
                    );
                }
            }

            Envelope::PttRequest => self.app.floor.request_web(&self.id).await,
            Envelope::PttRelease => self.app.floor.release_web(&self.id).await,

            Envelope::SetDisplayName { display_name } => {
                self.app.registry.set_display_name(&self.id, &display_name);
                self.app.names.record(&self.id, &display_name);
            }

            Envelope::PushSubscribe { subscription } => {
                self.app.push.subscribe(&self.id, subscription);
            }

            Envelope::RequestP2pReconnect => {
                info!(client = %self.id, "p2p reconnect requested");
                self.cancel_timer(TimerKind::IceRestart);
                self.cancel_timer(TimerKind::P2pCleanup);
                self.destroy_p2p().await;
                if self.main.is_some() {
                    self.create_p2p().await;
                }
            }

            other => debug!(client = %self.id, envelope = ?other, "unexpected envelope, ignored"),
        }
    }

    async fn handle_main_state(&mut self, state: RTCPeerConnectionState) {
        match state {
            RTCPeerConnectionState::Connected => {
                self.cancel_timer(TimerKind::IceRestart);
                if self.ice_restart_episode || self.ice_restart_in_progress {
                    info!(client = %self.id, attempts = self.ice_restart_attempts, "ice restart succeeded");
                    self.ice_restart_success_at = Some(Instant::now());
                }
                self.ice_restart_episode = false;
                self.ice_restart_in_progress = false;
                self.ice_restart_attempts = 0;

                self.app.registry.send_to(
                    &self.id,
                    Envelope::ClientList {
                        clients: self.app.registry.client_list(),
                    },
                );
                if self.p2p.is_none() {
                    self.create_p2p().await;
                }
            }

            RTCPeerConnectionState::Disconnected => {
                let in_cooldown = self
                    .ice_restart_success_at
                    .is_some_and(|at| at.elapsed() < ICE_RESTART_COOLDOWN);
                if in_cooldown {
                    debug!(client = %self.id, "disconnect inside restart cooldown, ignored");
                    return;
                }
                if self.ice_restart_episode {
                    return;
                }
                self.ice_restart_episode = true;
                self.ice_restart_attempts = 0;
                self.prompt_ice_restart().await;
            }

            RTCPeerConnectionState::Failed | RTCPeerConnectionState::Closed => {
                self.teardown("main_pc_terminal").await;
            }

            _ => {}
        }
    }

    async fn prompt_ice_restart(&mut self) {
        if self.ice_restart_attempts >= ICE_RESTART_MAX_ATTEMPTS {
            warn!(client = %self.id, "ice restart attempts exhausted");
            self.teardown("ice_restart_exhausted").await;
            return;
        }
        self.ice_restart_attempts += 1;
        info!(client = %self.id, attempt = self.ice_restart_attempts, "requesting ice restart");
        self.app
            .registry
            .send_to(&self.id, Envelope::RequestIceRestart);
        self.arm_timer(TimerKind::IceRestart, ICE_RESTART_DEADLINE);
    }

    async fn handle_p2p_state(&mut self, state: RTCPeerConnectionState) {
        self.app.registry.set_p2p_state(&self.id, state_tag(state));
        match state {
            RTCPeerConnectionState::Connected => {
                self.p2p_connected = true;
                self.app.fanout.set_connected(&self.id, true);
                self.cancel_timer(TimerKind::P2pCleanup);
            }
            RTCPeerConnectionState::Disconnected => {
                self.p2p_connected = false;
                self.app.fanout.set_connected(&self.id, false);
                self.arm_timer(TimerKind::P2pCleanup, P2P_CLEANUP_GRACE);
            }
            RTCPeerConnectionState::Failed | RTCPeerConnectionState::Closed => {
                self.destroy_p2p().await;
            }
            _ => {}
        }
    }

    async fn handle_timeout(&mut self, kind: TimerKind) {
        match kind {
            TimerKind::OfferWait => {
                if self.main.is_none() {
                    warn!(client = %self.id, "offer_timeout");
                    self.teardown("offer_timeout").await;
                }
            }
            TimerKind::IceRestart => {
                // Covers both server-prompted episodes and restarts the
                // client initiated on its own.
                if self.ice_restart_episode || self.ice_restart_in_progress {
                    self.ice_restart_in_progress = false;
                    self.ice_restart_episode = true;
                    self.prompt_ice_restart().await;
                }
            }
            TimerKind::P2pCleanup => {
                if !self.p2p_connected {
                    info!(client = %self.id, "p2p cleanup grace expired");
                    self.destroy_p2p().await;
                }
            }
        }
    }

    async fn create_p2p(&mut self) {
        let generation = self.bump_generation();
        match P2pLink::connect(
            &self.id,
            &self.app.config.ice_servers(),
            self.app.config.ice_gathering_timeout,
            &self.app.fanout,
            generation,
            self.events_tx.clone(),
        )
        .await
        {
            Ok((link, offer_sdp)) => {
                self.p2p = Some(link);
                self.p2p_connected = false;
                self.app.registry.send_to(
                    &self.id,
                    Envelope::P2pOffer {
                        from: Some(ClientId::from(SERVER_WIRE_ID)),
                        to: None,
                        sdp: offer_sdp,
                    },
                );
            }
            Err(e) => {
                warn!(client = %self.id, "p2p setup failed: {e:#}");
                self.app.fanout.unregister(&self.id);
            }
        }
    }

    async fn destroy_p2p(&mut self) {
        if let Some(p2p) = self.p2p.take() {
            p2p.close(&self.app.fanout, &self.id).await;
        }
        self.p2p_connected = false;
        self.app.registry.set_p2p_state(&self.id, "closed");
    }

    fn relay(&self, envelope: Envelope, to: Option<ClientId>) {
        let Some(target) = to else { return };
        if !self.app.registry.contains(&target) {
            debug!(client = %self.id, target = %target, "relay target unknown, dropped");
            return;
        }
        self.app.registry.send_to(&target, envelope);
    }

    fn bump_generation(&mut self) -> u64 {
        self.next_generation += 1;
        self.next_generation
    }

    fn arm_timer(&mut self, kind: TimerKind, after: Duration) {
        self.timer_tokens[kind as usize] += 1;
        let token = self.timer_tokens[kind as usize];
        let tx = self.events_tx.clone();
        tokio::spawn(async move {
            tokio::time::sleep(after).await;
            let _ = tx.send(SessionEvent::Timeout(kind, token)).await;
        });
    }

    fn cancel_timer(&mut self, kind: TimerKind) {
        self.timer_tokens[kind as usize] += 1;
    }

    /// Full teardown: floor released first, timers cancelled, handlers
    /// nulled before the peer connections close, then the departure and a
    /// refreshed floor status go out to everyone left.
    async fn teardown(&mut self, reason: &str) {
        if self.closing {
            return;
        }
        self.closing = true;
        info!(client = %self.id, reason, "session teardown");

        self.cancel_timer(TimerKind::OfferWait);
        self.cancel_timer(TimerKind::IceRestart);
        self.cancel_timer(TimerKind::P2pCleanup);

        self.app.floor.release_web(&self.id).await;

        if let Some(main) = self.main.take() {
            main.close().await;
        }
        if let Some(p2p) = self.p2p.take() {
            p2p.close(&self.app.fanout, &self.id).await;
        }
        self.app.fanout.unregister(&self.id);

        self.app.registry.remove(&self.id);
        self.app.registry.broadcast(
            &Envelope::ClientLeft {
                client_id: self.id.clone(),
            },
            None,
        );
        self.app
            .registry
            .broadcast(&self.app.floor.status_envelope(), None);
    }
}

fn is_for_server(to: &Option<ClientId>) -> bool {
    match to {
        Some(id) => id.as_str() == SERVER_WIRE_ID,
        None => true,
    }
}
