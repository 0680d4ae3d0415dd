use std::sync::Arc;
use std::time::Instant;

use crate::api::DashSessions;
use crate::audio::{Egress, EgressHandle};
use crate::config::Config;
use crate::floor::{FloorArbiter, FloorControl};
use crate::media::Fanout;
use crate::names::NameStore;
use crate::push::PushStore;
use crate::relay::RelayDriver;
use crate::signaling::Registry;

/// Everything a session actor or an HTTP handler may reach. One instance
/// per process, shared behind an `Arc`.
pub struct App {
    pub config: Arc<Config>,
    pub registry: Arc<Registry>,
    pub floor: Arc<FloorControl>,
    pub fanout: Arc<Fanout>,
    pub egress: EgressHandle,
    pub push: Arc<PushStore>,
    pub names: Arc<NameStore>,
    pub dash: Arc<DashSessions>,
    pub started_at: Instant,
}

impl App {
    pub fn build(config: Config) -> Arc<Self> {
        let config = Arc::new(config);
        let registry = Arc::new(Registry::new());
        let names = Arc::new(NameStore::load(config.client_names_path()));
        let egress = Egress::spawn(Arc::clone(&config));
        let relay = RelayDriver::open(&config);

        let floor = Arc::new(FloorControl::new(
            FloorArbiter::new(config.ptt_timeout),
            relay,
            Arc::clone(&registry),
            egress.clone(),
            Arc::clone(&names),
        ));

        Arc::new(Self {
            config,
            registry,
            floor,
            fanout: Arc::new(Fanout::new()),
            egress,
            push: Arc::new(PushStore::new()),
            names,
            dash: Arc::new(DashSessions::new()),
            started_at: Instant::now(),
        })
    }
}
