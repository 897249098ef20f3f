//! Low-power listening wake/rendezvous protocol.
//!
//! This module contains:
//! - [`config`]: Protocol constants and node configuration
//! - [`frame`]: Wire format of wake and interaction frames
//! - [`timing`]: Frame airtime and hardware time units
//! - [`scheduler`]: Sleep oscillator calibration and sleep plans
//! - [`duty_cycle`]: The listener's duty-cycle timeline
//! - [`rendezvous`]: Screening and classification of received wake frames
//! - [`listener`]: The sleeping listener (interrupt sink and main loop)
//! - [`waker`]: The active waker

pub mod config;
pub mod duty_cycle;
pub mod frame;
pub mod listener;
pub mod rendezvous;
pub mod scheduler;
pub mod timing;
pub mod waker;

pub use config::{ConfigError, ListenerConfig, WakerConfig};
pub use duty_cycle::{worst_case_period_us, DutyCycleTimeline, ListenerState};
pub use frame::{FrameError, InteractionFrame, PanId, ShortAddress, WakeFrame};
pub use listener::{DutyCycleListener, LowPowerListenIsr, RendezvousReport};
pub use rendezvous::{Disposition, DropReason, RendezvousDecision, RendezvousEvaluator, Screening};
pub use scheduler::{SleepPlan, SleepScheduler};
pub use timing::FrameTiming;
pub use waker::{BurstReport, CycleReport, RendezvousOutcome, WakeSequencer};
