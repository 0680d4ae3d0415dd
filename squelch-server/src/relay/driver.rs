use std::io::Write;
use std::time::Duration;

use parking_lot::Mutex;
use serialport::SerialPort;
use tracing::{info, warn};

use crate::config::Config;

const CMD_ON: &[u8] = b"A1";
const CMD_OFF: &[u8] = b"A0";

/// Drives the USB relay that keys the radio transmitter. The relay board
/// exposes two channels addressed by ASCII commands (`A1`/`A0`, `B1`/`B0`);
/// the floor path only ever keys channel A.
///
/// A port that cannot be opened, or that fails mid-run, degrades the
/// driver to disabled mode: commands become no-ops and audio service
/// continues without the transmitter.
pub struct RelayDriver {
    port: Mutex<Option<Box<dyn SerialPort>>>,
}

impl RelayDriver {
    pub fn open(cfg: &Config) -> Self {
        if !cfg.enable_relay {
            return Self::disabled();
        }
        match serialport::new(&cfg.relay_port, cfg.relay_baud_rate)
            .timeout(Duration::from_millis(500))
            .open()
        {
            Ok(port) => {
                info!(port = %cfg.relay_port, baud = cfg.relay_baud_rate, "relay port open");
                Self {
                    port: Mutex::new(Some(port)),
                }
            }
            Err(e) => {
                warn!(port = %cfg.relay_port, "relay disabled, open failed: {e}");
                Self::disabled()
            }
        }
    }

    pub fn disabled() -> Self {
        Self {
            port: Mutex::new(None),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.port.lock().is_some()
    }

    pub fn turn_on(&self) {
        self.write(CMD_ON);
    }

    pub fn turn_off(&self) {
        self.write(CMD_OFF);
    }

    fn write(&self, cmd: &[u8]) {
        let mut guard = self.port.lock();
        let Some(port) = guard.as_mut() else { return };
        if let Err(e) = port.write_all(cmd).and_then(|_| port.flush()) {
            warn!("relay write failed, disabling relay: {e}");
            *guard = None;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn disabled_driver_ignores_commands() {
        let relay = RelayDriver::disabled();
        assert!(!relay.is_enabled());
        relay.turn_on();
        relay.turn_off();
        assert!(!relay.is_enabled());
    }

    #[test]
    fn missing_port_degrades_instead_of_failing() {
        let mut cfg = Config::from_env();
        cfg.enable_relay = true;
        cfg.relay_port = "/dev/does-not-exist-squelch".to_string();
        let relay = RelayDriver::open(&cfg);
        assert!(!relay.is_enabled());
    }
}
