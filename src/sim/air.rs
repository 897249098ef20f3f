use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// Identifies a simulated node on the air.
pub type NodeId = u32;

/// Longest possible preamble: 4096 symbols at 64 MHz PRF.
const MAX_PREAMBLE_NS: u64 = 4096 * 1_017_630 / 1000;

/// One frame on the air.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transmission {
    pub sender: NodeId,
    pub start_ns: u64,
    pub preamble_end_ns: u64,
    pub end_ns: u64,
    /// Frame as received, FCS included.
    pub frame: Vec<u8>,
}

impl Transmission {
    /// How long the preamble overlaps `[start_ns, end_ns)`.
    pub fn preamble_overlap_ns(&self, start_ns: u64, end_ns: u64) -> u64 {
        end_ns
            .min(self.preamble_end_ns)
            .saturating_sub(start_ns.max(self.start_ns))
    }
}

/// Shared medium: every transmission ever made, ordered by start time.
///
/// There is no propagation delay, path loss or collision model.
#[derive(Debug, Clone, Default)]
pub struct Air {
    log: Arc<Mutex<Vec<Transmission>>>,
}

impl Air {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Vec<Transmission>> {
        self.log.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn transmit(&self, tx: Transmission) {
        let mut log = self.lock();
        let idx = log.partition_point(|t| t.start_ns <= tx.start_ns);
        log.insert(idx, tx);
    }

    pub fn transmissions(&self) -> Vec<Transmission> {
        self.lock().clone()
    }

    pub fn sent_by(&self, sender: NodeId) -> Vec<Transmission> {
        self.lock()
            .iter()
            .filter(|t| t.sender == sender)
            .cloned()
            .collect()
    }

    /// First transmission not sent by `receiver` whose preamble overlaps
    /// `[start_ns, end_ns)` by at least `min_overlap_ns`.
    pub fn preamble_in_window(
        &self,
        receiver: NodeId,
        start_ns: u64,
        end_ns: u64,
        min_overlap_ns: u64,
    ) -> Option<Transmission> {
        let log = self.lock();
        let lo = log.partition_point(|t| t.start_ns + MAX_PREAMBLE_NS < start_ns);
        let hi = log.partition_point(|t| t.start_ns < end_ns);
        log.get(lo..hi)?
            .iter()
            .find(|t| {
                t.sender != receiver && t.preamble_overlap_ns(start_ns, end_ns) >= min_overlap_ns.max(1)
            })
            .cloned()
    }
}
