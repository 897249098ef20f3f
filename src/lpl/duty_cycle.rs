//! Listener duty-cycle timeline.
//!
//! Once armed, the transceiver cycles on its own:
//!
//! ```text
//! | DeepSleep ............ | Sniff1 | Snooze | Sniff2 | DeepSleep ...
//! ```
//!
//! A sniff that detects preamble keeps the receiver on to take the frame.
//! The second sniff exists for the case where the first one lands in the
//! gap between two burst frames; the snooze is sized so that the second
//! sniff then falls inside the next preamble.

use super::config::{ListenerConfig, WAKE_FRAME_LEN};
use super::scheduler::{SleepPlan, SleepScheduler};
use super::timing::{inter_frame_spacing_ns, snooze_duration_ns, snooze_ticks_for, sniff_duration_ns, FrameTiming};
use crate::radio::PhyConfig;
use serde::Serialize;

/// Where in the duty cycle the listener is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ListenerState {
    DeepSleep,
    Sniff1,
    Snooze,
    Sniff2,
}

/// Durations of the phases of one duty cycle, in nanoseconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DutyCycleTimeline {
    pub deep_sleep_ns: u64,
    pub sniff_ns: u64,
    pub snooze_ns: u64,
}

impl DutyCycleTimeline {
    /// Timeline produced by a programmed sleep plan.
    pub fn new(scheduler: &SleepScheduler, plan: &SleepPlan, phy: &PhyConfig) -> Self {
        Self {
            deep_sleep_ns: scheduler.ticks_to_us(plan.long_sleep_ticks) * 1000,
            sniff_ns: sniff_duration_ns(phy, plan.preamble_detect_register() + 1),
            snooze_ns: snooze_duration_ns(plan.snooze_ticks),
        }
    }

    pub fn period_ns(&self) -> u64 {
        self.deep_sleep_ns + 2 * self.sniff_ns + self.snooze_ns
    }

    /// State at `offset_ns` from the start of a cycle.
    pub fn state_at(&self, offset_ns: u64) -> ListenerState {
        let t = offset_ns % self.period_ns().max(1);
        let sniff1_end = self.deep_sleep_ns + self.sniff_ns;
        let snooze_end = sniff1_end + self.snooze_ns;
        if t < self.deep_sleep_ns {
            ListenerState::DeepSleep
        } else if t < sniff1_end {
            ListenerState::Sniff1
        } else if t < snooze_end {
            ListenerState::Snooze
        } else {
            ListenerState::Sniff2
        }
    }

    /// Absolute sniff windows `[start, end)` of the cycle starting at `cycle_start_ns`.
    pub fn sniff_windows(&self, cycle_start_ns: u64) -> [(u64, u64); 2] {
        let sniff1 = cycle_start_ns + self.deep_sleep_ns;
        let sniff2 = sniff1 + self.sniff_ns + self.snooze_ns;
        [(sniff1, sniff1 + self.sniff_ns), (sniff2, sniff2 + self.sniff_ns)]
    }
}

/// Longest duty-cycle period a listener with this configuration can have.
///
/// The deep sleep never exceeds the wanted duration, whatever the
/// oscillator calibration, so this bound holds before calibration.
pub fn worst_case_period_us(config: &ListenerConfig) -> u64 {
    let timing = FrameTiming::for_frame(&config.phy, WAKE_FRAME_LEN);
    let ifs_ns = inter_frame_spacing_ns(&config.phy, WAKE_FRAME_LEN, config.frame_time_us);
    let snooze_ns = snooze_duration_ns(snooze_ticks_for(timing.post_preamble_ns() + ifs_ns));
    let sniff_ns = sniff_duration_ns(&config.phy, config.sniff_pacs);
    (config.long_sleep_ms as u64 * 1_000_000 + 2 * sniff_ns + snooze_ns).div_ceil(1000)
}
