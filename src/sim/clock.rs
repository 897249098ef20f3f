use crate::platform::Delay;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Virtual time in nanoseconds, shared by a node's radio and delay.
#[derive(Debug, Clone, Default)]
pub struct VirtualClock {
    now_ns: Arc<AtomicU64>,
}

impl VirtualClock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn starting_at(ns: u64) -> Self {
        Self {
            now_ns: Arc::new(AtomicU64::new(ns)),
        }
    }

    pub fn now_ns(&self) -> u64 {
        self.now_ns.load(Ordering::Acquire)
    }

    pub fn now_us(&self) -> u64 {
        self.now_ns() / 1000
    }

    pub fn advance_ns(&self, ns: u64) {
        self.now_ns.fetch_add(ns, Ordering::AcqRel);
    }

    /// Move forward to `ns`. Never moves backwards.
    pub fn advance_to(&self, ns: u64) {
        self.now_ns.fetch_max(ns, Ordering::AcqRel);
    }
}

/// [`Delay`] that advances a [`VirtualClock`] instead of waiting.
///
/// Millisecond sleeps are recorded so tests can inspect them.
#[derive(Debug, Clone)]
pub struct SimDelay {
    clock: VirtualClock,
    sleeps_ms: Vec<u32>,
}

impl SimDelay {
    pub fn new(clock: VirtualClock) -> Self {
        Self {
            clock,
            sleeps_ms: Vec::new(),
        }
    }

    pub fn sleeps(&self) -> &[u32] {
        &self.sleeps_ms
    }
}

impl Delay for SimDelay {
    fn sleep_ms(&mut self, ms: u32) {
        self.sleeps_ms.push(ms);
        self.clock.advance_ns(ms as u64 * 1_000_000);
    }

    fn delay_us(&mut self, us: u32) {
        self.clock.advance_ns(us as u64 * 1000);
    }
}
