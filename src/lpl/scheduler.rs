//! Sleep scheduling against the low-power oscillator.
//!
//! The sleep counter runs off an on-chip RC oscillator whose frequency
//! drifts between parts and with temperature. It is measured against the
//! crystal once per boot (or configuration change) and wanted durations are
//! converted to counter ticks with floor rounding, so the chip never sleeps
//! longer than asked. At 4096 oscillator cycles per tick the actual sleep
//! can be several hundred milliseconds shorter.

use super::config::{ListenerConfig, SLEEP_COUNTER_SHIFT, WAKE_FRAME_LEN, XTAL_FREQ_HZ};
use super::timing::{snooze_span_ns, snooze_ticks_for};
use crate::radio::{RadioDriver, RadioError};
use log::{debug, info};
use serde::Serialize;

/// Register values for one listener duty-cycle configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SleepPlan {
    pub long_sleep_ticks: u16,
    /// Snooze register value (hardware adds one unit).
    pub snooze_ticks: u8,
    /// Sniff length in PACs, as configured.
    pub sniff_pacs: u16,
}

impl SleepPlan {
    /// Preamble detection timeout register value (hardware adds one PAC).
    pub fn preamble_detect_register(&self) -> u16 {
        self.sniff_pacs.saturating_sub(1)
    }

    /// Program the plan into the radio. The radio must be awake.
    pub fn apply<R: RadioDriver + ?Sized>(&self, radio: &mut R) -> Result<(), RadioError> {
        radio.set_sleep_counter(self.long_sleep_ticks)?;
        radio.set_snooze_ticks(self.snooze_ticks)?;
        radio.set_preamble_detect_timeout(self.preamble_detect_register())?;
        Ok(())
    }
}

/// Converts wanted sleep durations into sleep counter ticks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SleepScheduler {
    osc_freq_hz: u32,
}

impl SleepScheduler {
    /// Scheduler for a calibration divisor.
    pub fn from_divisor(divisor: u16) -> Result<Self, RadioError> {
        if divisor == 0 {
            return Err(RadioError::CalibrationFailed);
        }
        Ok(Self {
            osc_freq_hz: (XTAL_FREQ_HZ / 2) / divisor as u32,
        })
    }

    /// Calibrate the low-power oscillator. The radio must be awake at
    /// crystal speed.
    pub fn calibrate<R: RadioDriver + ?Sized>(radio: &mut R) -> Result<Self, RadioError> {
        let divisor = radio.calibrate_sleep_oscillator()?;
        let scheduler = Self::from_divisor(divisor)?;
        info!(
            "Sleep oscillator calibrated: divisor {}, {} Hz",
            divisor, scheduler.osc_freq_hz
        );
        Ok(scheduler)
    }

    pub fn osc_freq_hz(&self) -> u32 {
        self.osc_freq_hz
    }

    /// Sleep counter ticks for a wanted duration, rounded down.
    pub fn compute_ticks(&self, wanted_ms: u32) -> u16 {
        let ticks = (wanted_ms as u64 * self.osc_freq_hz as u64 / 1000) >> SLEEP_COUNTER_SHIFT;
        ticks.min(u16::MAX as u64) as u16
    }

    /// Actual duration of a tick count.
    pub fn ticks_to_us(&self, ticks: u16) -> u64 {
        if self.osc_freq_hz == 0 {
            return 0;
        }
        ((ticks as u64) << SLEEP_COUNTER_SHIFT) * 1_000_000 / self.osc_freq_hz as u64
    }

    /// Derive the duty-cycle registers for a listener configuration.
    pub fn plan(&self, config: &ListenerConfig) -> SleepPlan {
        let snooze_ns = snooze_span_ns(&config.phy, WAKE_FRAME_LEN, config.frame_time_us);
        let plan = SleepPlan {
            long_sleep_ticks: self.compute_ticks(config.long_sleep_ms),
            snooze_ticks: snooze_ticks_for(snooze_ns),
            sniff_pacs: config.sniff_pacs,
        };
        debug!(
            "Sleep plan: {} ticks ({} us), snooze {}, sniff {} PACs",
            plan.long_sleep_ticks,
            self.ticks_to_us(plan.long_sleep_ticks),
            plan.snooze_ticks,
            plan.sniff_pacs
        );
        plan
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sim::{Air, SimRadio, VirtualClock};

    #[test]
    fn test_oscillator_frequency() {
        let scheduler = SleepScheduler::from_divisor(1920).unwrap();
        assert_eq!(scheduler.osc_freq_hz(), 10_000);
    }

    #[test]
    fn test_zero_divisor_fails() {
        assert_eq!(
            SleepScheduler::from_divisor(0),
            Err(RadioError::CalibrationFailed)
        );
    }

    #[test]
    fn test_compute_ticks_floor() {
        let scheduler = SleepScheduler::from_divisor(1920).unwrap();
        // 1500 ms * 10 kHz = 15000 cycles, / 4096 = 3.66 -> 3
        assert_eq!(scheduler.compute_ticks(1500), 3);
        assert_eq!(scheduler.ticks_to_us(3), 1_228_800);
        assert_eq!(scheduler.compute_ticks(0), 0);
    }

    #[test]
    fn test_compute_ticks_monotonic() {
        for divisor in [960u16, 1500, 1920, 2400] {
            let scheduler = SleepScheduler::from_divisor(divisor).unwrap();
            let mut prev = 0;
            for ms in (0..20_000).step_by(7) {
                let ticks = scheduler.compute_ticks(ms);
                assert!(ticks >= prev, "ticks decreased at {} ms", ms);
                prev = ticks;
            }
        }
    }

    #[test]
    fn test_compute_ticks_never_overestimates() {
        for divisor in [960u16, 1500, 1920, 2400] {
            let scheduler = SleepScheduler::from_divisor(divisor).unwrap();
            for ms in (0..20_000).step_by(13) {
                let actual_us = scheduler.ticks_to_us(scheduler.compute_ticks(ms));
                assert!(
                    actual_us <= ms as u64 * 1000,
                    "{} ms slept as {} us",
                    ms,
                    actual_us
                );
            }
        }
    }

    #[test]
    fn test_compute_ticks_saturates() {
        let scheduler = SleepScheduler::from_divisor(1).unwrap();
        assert_eq!(scheduler.compute_ticks(u32::MAX), u16::MAX);
    }

    #[test]
    fn test_default_plan() {
        let scheduler = SleepScheduler::from_divisor(1920).unwrap();
        let plan = scheduler.plan(&ListenerConfig::default());
        assert_eq!(
            plan,
            SleepPlan {
                long_sleep_ticks: 3,
                snooze_ticks: 4,
                sniff_pacs: 3,
            }
        );
        assert_eq!(plan.preamble_detect_register(), 2);
    }

    #[test]
    fn test_calibrate_from_radio() {
        let mut radio = SimRadio::new(1, VirtualClock::new(), Air::new());
        radio.set_osc_divisor(2400);
        let scheduler = SleepScheduler::calibrate(&mut radio).unwrap();
        assert_eq!(scheduler.osc_freq_hz(), 8_000);
    }

    #[test]
    fn test_apply_plan() {
        let mut radio = SimRadio::new(1, VirtualClock::new(), Air::new());
        let plan = SleepPlan {
            long_sleep_ticks: 3,
            snooze_ticks: 4,
            sniff_pacs: 3,
        };
        plan.apply(&mut radio).unwrap();

        let regs = radio.registers();
        assert_eq!(regs.sleep_counter, 3);
        assert_eq!(regs.snooze_ticks, 4);
        assert_eq!(regs.preamble_detect_timeout, 2);
    }
}
