use squelch_core::CandidateJson;
use tracing::warn;

/// Sanity cap on candidates buffered before the remote description lands.
const MAX_PENDING: usize = 64;

/// Trickle-ICE candidates that arrive before `setRemoteDescription` are
/// buffered here and drained FIFO once the description is applied.
pub struct CandidateQueue {
    pending: Vec<CandidateJson>,
    remote_set: bool,
}

impl CandidateQueue {
    pub fn new() -> Self {
        Self {
            pending: Vec::new(),
            remote_set: false,
        }
    }

    /// Returns the candidate back when it can be applied immediately,
    /// otherwise buffers it (dropping with a warning past the cap).
    pub fn enqueue_or_pass(&mut self, candidate: CandidateJson) -> Option<CandidateJson> {
        if self.remote_set {
            return Some(candidate);
        }
        if self.pending.len() >= MAX_PENDING {
            warn!("pending ICE candidate queue full, dropping candidate");
            return None;
        }
        self.pending.push(candidate);
        None
    }

    /// Marks the remote description applied and hands back everything
    /// buffered, in arrival order.
    pub fn drain(&mut self) -> Vec<CandidateJson> {
        self.remote_set = true;
        std::mem::take(&mut self.pending)
    }
}

impl Default for CandidateQueue {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn candidate(n: usize) -> CandidateJson {
        CandidateJson {
            candidate: format!("candidate:{n}"),
            sdp_mid: Some("0".into()),
            sdp_mline_index: Some(0),
        }
    }

    #[test]
    fn buffers_until_remote_description_then_passes_through() {
        let mut queue = CandidateQueue::new();
        assert!(queue.enqueue_or_pass(candidate(1)).is_none());
        assert!(queue.enqueue_or_pass(candidate(2)).is_none());

        let drained = queue.drain();
        assert_eq!(drained.len(), 2);
        assert_eq!(drained[0].candidate, "candidate:1");

        assert!(queue.enqueue_or_pass(candidate(3)).is_some());
    }

    #[test]
    fn drops_excess_candidates() {
        let mut queue = CandidateQueue::new();
        for n in 0..MAX_PENDING + 5 {
            queue.enqueue_or_pass(candidate(n));
        }
        assert_eq!(queue.drain().len(), MAX_PENDING);
    }
}
