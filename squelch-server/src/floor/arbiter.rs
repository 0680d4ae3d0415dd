use std::time::{Duration, Instant};

use parking_lot::Mutex;
use squelch_core::Speaker;

#[derive(Debug, PartialEq, Eq)]
pub enum FloorRequest {
    Granted,
    Busy { holder: Speaker },
}

#[derive(Debug, PartialEq, Eq)]
pub enum FloorRelease {
    Released,
    /// The caller was not the holder; stale clients cannot eject the
    /// real speaker.
    Ignored,
}

struct FloorState {
    holder: Option<Speaker>,
    granted_at: Option<Instant>,
}

/// The single-holder mutex over "who is transmitting". Purely in-memory;
/// every caller funnels through the one lock, so grants are totally
/// ordered.
pub struct FloorArbiter {
    state: Mutex<FloorState>,
    /// Zero disables the timeout sweep.
    max_duration: Duration,
}

impl FloorArbiter {
    pub fn new(max_duration: Duration) -> Self {
        Self {
            state: Mutex::new(FloorState {
                holder: None,
                granted_at: None,
            }),
            max_duration,
        }
    }

    pub fn request(&self, who: Speaker) -> FloorRequest {
        let mut state = self.state.lock();
        match &state.holder {
            Some(holder) => FloorRequest::Busy {
                holder: holder.clone(),
            },
            None => {
                state.holder = Some(who);
                state.granted_at = Some(Instant::now());
                FloorRequest::Granted
            }
        }
    }

    pub fn release(&self, who: &Speaker) -> FloorRelease {
        let mut state = self.state.lock();
        if state.holder.as_ref() == Some(who) {
            state.holder = None;
            state.granted_at = None;
            FloorRelease::Released
        } else {
            FloorRelease::Ignored
        }
    }

    /// Unconditional clear; returns the evicted holder if there was one.
    pub fn clear(&self) -> Option<Speaker> {
        let mut state = self.state.lock();
        state.granted_at = None;
        state.holder.take()
    }

    /// Evict the holder once it has overstayed the maximum duration.
    pub fn sweep_timeout(&self) -> Option<Speaker> {
        if self.max_duration.is_zero() {
            return None;
        }
        let mut state = self.state.lock();
        let expired = state
            .granted_at
            .is_some_and(|at| at.elapsed() > self.max_duration);
        if expired {
            state.granted_at = None;
            state.holder.take()
        } else {
            None
        }
    }

    pub fn holder(&self) -> Option<Speaker> {
        self.state.lock().holder.clone()
    }

    pub fn held_for(&self) -> Option<Duration> {
        self.state.lock().granted_at.map(|at| at.elapsed())
    }
}
