//! Low-power listening wake/rendezvous for DW1000-class UWB transceivers.
//!
//! A listener keeps its radio in deep sleep and lets the chip sample the
//! air for a few preamble chunks once per period. A waker that wants to
//! talk to it transmits a burst of countdown-tagged wake frames longer than
//! that period; the listener catches one, sleeps out the rest of the burst
//! and answers right after it.
//!
//! The protocol itself ([`lpl`]) only talks to the transceiver through
//! [`radio::RadioDriver`] and to time through [`platform::Delay`], so it
//! runs unchanged against the ESP-IDF platform glue (feature `esp32`) and
//! against the virtual-time simulator in [`sim`].

pub mod lpl;
pub mod mailbox;
pub mod platform;
pub mod radio;
pub mod sim;
pub mod stats;

// Re-export commonly used items
pub use lpl::{
    ConfigError, DutyCycleListener, ListenerConfig, LowPowerListenIsr, RendezvousDecision,
    SleepPlan, SleepScheduler, WakeFrame, WakeSequencer, WakerConfig,
};
pub use platform::{Delay, RadioCell};
pub use radio::{RadioDriver, RadioError, StatusEvents};
pub use stats::{ListenerStats, WakerStats};
