//! Virtual-time simulation of the air and the transceiver.
//!
//! Every node has its own [`VirtualClock`] driven by its own [`SimDelay`];
//! nodes only meet on the shared [`Air`]. A [`Scenario`] runs a waker and a
//! listener against each other one wake cycle at a time, so the whole
//! protocol can be exercised deterministically on the host.
//!
//! # Example
//!
//! ```
//! use uwb_lplisten::sim::{Scenario, SimConfig};
//!
//! let config = SimConfig {
//!     bursts: 2,
//!     listener_phase_us: Some(250_000),
//!     ..Default::default()
//! };
//! let report = Scenario::new(config).unwrap().run().unwrap();
//! assert_eq!(report.cycles.len(), 2);
//! assert!(report.cycles[0].outcome.is_answered());
//! ```

mod air;
mod clock;
mod radio;
mod scenario;

pub use air::{Air, NodeId, Transmission};
pub use clock::{SimDelay, VirtualClock};
pub use radio::{
    SimRadio, SimRegisters, DEFAULT_OSC_DIVISOR, DEFAULT_TX_TURNAROUND_NS, DEFAULT_WAKE_LATENCY_NS,
};
pub use scenario::{CaptureRecord, CycleRecord, Scenario, ScenarioError, SimConfig, SimReport};
