//! Diagnostic counters.
//!
//! Counters are plain atomics so the interrupt path can bump them without
//! taking a lock. They only ever count up; [`ListenerCounters::snapshot`]
//! and [`WakerCounters::snapshot`] give a serialisable copy.

use crate::lpl::rendezvous::{DropReason, RendezvousDecision};
use serde::Serialize;
use std::sync::atomic::{AtomicU32, Ordering};

/// Listener statistics.
#[derive(Debug, Default)]
pub struct ListenerCounters {
    /// Wake frames handed to the main loop.
    pub captured: AtomicU32,
    pub addressed: AtomicU32,
    pub not_addressed: AtomicU32,
    /// Captured frames the main loop could not make sense of.
    pub malformed: AtomicU32,
    pub dropped_oversize: AtomicU32,
    pub dropped_wrong_length: AtomicU32,
    pub dropped_signature: AtomicU32,
    /// Interrupts that arrived while the main loop held a captured frame.
    pub dropped_busy: AtomicU32,
    pub rx_errors: AtomicU32,
    pub interactions_sent: AtomicU32,
    pub tx_timeouts: AtomicU32,
}

impl ListenerCounters {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_capture(&self) {
        self.captured.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_decision(&self, decision: RendezvousDecision) {
        match decision {
            RendezvousDecision::AddressedToMe => self.addressed.fetch_add(1, Ordering::Relaxed),
            RendezvousDecision::NotAddressed => self.not_addressed.fetch_add(1, Ordering::Relaxed),
            RendezvousDecision::Malformed => self.malformed.fetch_add(1, Ordering::Relaxed),
        };
    }

    pub fn record_drop(&self, reason: DropReason) {
        let counter = match reason {
            DropReason::Oversize => &self.dropped_oversize,
            DropReason::WrongLength => &self.dropped_wrong_length,
            DropReason::Signature => &self.dropped_signature,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_busy(&self) {
        self.dropped_busy.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_rx_error(&self) {
        self.rx_errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_interaction(&self) {
        self.interactions_sent.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_tx_timeout(&self) {
        self.tx_timeouts.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> ListenerStats {
        ListenerStats {
            captured: self.captured.load(Ordering::Relaxed),
            addressed: self.addressed.load(Ordering::Relaxed),
            not_addressed: self.not_addressed.load(Ordering::Relaxed),
            malformed: self.malformed.load(Ordering::Relaxed),
            dropped_oversize: self.dropped_oversize.load(Ordering::Relaxed),
            dropped_wrong_length: self.dropped_wrong_length.load(Ordering::Relaxed),
            dropped_signature: self.dropped_signature.load(Ordering::Relaxed),
            dropped_busy: self.dropped_busy.load(Ordering::Relaxed),
            rx_errors: self.rx_errors.load(Ordering::Relaxed),
            interactions_sent: self.interactions_sent.load(Ordering::Relaxed),
            tx_timeouts: self.tx_timeouts.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time copy of [`ListenerCounters`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ListenerStats {
    pub captured: u32,
    pub addressed: u32,
    pub not_addressed: u32,
    pub malformed: u32,
    pub dropped_oversize: u32,
    pub dropped_wrong_length: u32,
    pub dropped_signature: u32,
    pub dropped_busy: u32,
    pub rx_errors: u32,
    pub interactions_sent: u32,
    pub tx_timeouts: u32,
}

/// Waker statistics.
#[derive(Debug, Default)]
pub struct WakerCounters {
    pub bursts: AtomicU32,
    pub frames_sent: AtomicU32,
    pub tx_timeouts: AtomicU32,
    /// Bursts answered within the interaction window.
    pub rendezvous: AtomicU32,
    pub missed: AtomicU32,
    /// Responses longer than the maximum standard frame.
    pub oversize_responses: AtomicU32,
}

impl WakerCounters {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_burst(&self) {
        self.bursts.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_frame_sent(&self) {
        self.frames_sent.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_tx_timeout(&self) {
        self.tx_timeouts.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_rendezvous(&self) {
        self.rendezvous.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_missed(&self) {
        self.missed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_oversize_response(&self) {
        self.oversize_responses.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> WakerStats {
        WakerStats {
            bursts: self.bursts.load(Ordering::Relaxed),
            frames_sent: self.frames_sent.load(Ordering::Relaxed),
            tx_timeouts: self.tx_timeouts.load(Ordering::Relaxed),
            rendezvous: self.rendezvous.load(Ordering::Relaxed),
            missed: self.missed.load(Ordering::Relaxed),
            oversize_responses: self.oversize_responses.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time copy of [`WakerCounters`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct WakerStats {
    pub bursts: u32,
    pub frames_sent: u32,
    pub tx_timeouts: u32,
    pub rendezvous: u32,
    pub missed: u32,
    pub oversize_responses: u32,
}
