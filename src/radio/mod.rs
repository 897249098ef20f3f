//! Transceiver abstraction for DW1000-class UWB radios.
//!
//! The protocol never touches registers directly. Everything goes through
//! [`RadioDriver`], which a board crate implements on top of its SPI bus and
//! the vendor register layer. The primitive set is what the chip offers for
//! low-power listening: a sleep counter clocked by the low-power oscillator,
//! a snooze counter, the preamble-detection timeout and the low-power
//! listening enable bit.
//!
//! Frames are exchanged without their FCS: [`RadioDriver::write_frame`] takes
//! the MAC frame and the hardware appends the 2-byte CRC, while
//! [`RadioDriver::read_frame_length`] reports the on-air length including it.
//!
//! # Example
//!
//! ```
//! use uwb_lplisten::platform::Delay;
//! use uwb_lplisten::radio::{wait_for_events, RadioDriver, RadioError, StatusEvents};
//!
//! fn send<R: RadioDriver, D: Delay>(radio: &mut R, delay: &mut D, frame: &[u8]) -> Result<(), RadioError> {
//!     radio.write_frame(frame, 0)?;
//!     radio.start_tx()?;
//!     match wait_for_events(radio, delay, StatusEvents::TX_DONE, 10_000)? {
//!         Some(_) => radio.write_status(StatusEvents::TX_DONE),
//!         None => Err(RadioError::Timeout),
//!     }
//! }
//! ```

mod irq;
mod phy;

pub use irq::{run_irq_task, service_irq, EventSink, IrqLine, IrqOutcome, RadioEvent};
pub use phy::{DataRate, PacSize, PhrMode, PhyConfig, Prf, SfdMode};

use crate::lpl::config::STATUS_POLL_INTERVAL_US;
use crate::platform::Delay;
use bitflags::bitflags;
use std::fmt;

bitflags! {
    /// System status register event bits.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct StatusEvents: u32 {
        /// Transmit frame sent.
        const TX_DONE = 0x0000_0080;
        /// PHY header error.
        const RX_PHY_HEADER_ERROR = 0x0000_1000;
        /// Receiver data frame ready with good CRC.
        const RX_GOOD_FRAME = 0x0000_4000;
        /// Receiver FCS error.
        const RX_FCS_ERROR = 0x0000_8000;
        /// Reed Solomon frame sync loss.
        const RX_SYNC_LOSS = 0x0001_0000;
        /// Receive frame wait timeout.
        const RX_FRAME_WAIT_TIMEOUT = 0x0002_0000;
        /// Leading edge detection processing error.
        const RX_LDE_ERROR = 0x0004_0000;
        /// Preamble detection timeout.
        const RX_PREAMBLE_TIMEOUT = 0x0020_0000;
        /// SFD timeout.
        const RX_SFD_TIMEOUT = 0x0400_0000;
        /// Automatic frame filtering rejection.
        const RX_FILTER_REJECT = 0x2000_0000;

        /// All receive timeouts.
        const RX_TIMEOUT = Self::RX_FRAME_WAIT_TIMEOUT.bits() | Self::RX_PREAMBLE_TIMEOUT.bits();
        /// All receive errors.
        const RX_ERROR = Self::RX_PHY_HEADER_ERROR.bits()
            | Self::RX_FCS_ERROR.bits()
            | Self::RX_SYNC_LOSS.bits()
            | Self::RX_SFD_TIMEOUT.bits()
            | Self::RX_FILTER_REJECT.bits()
            | Self::RX_LDE_ERROR.bits();
    }
}

bitflags! {
    /// What the transceiver keeps and does across a sleep/wake cycle.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct SleepMode: u16 {
        /// Enable receiver straight after waking (required for sniffing).
        const RX_ON_WAKE = 0x0002;
        /// Restore the configuration registers on wake.
        const PRESERVE_CONFIG = 0x0040;
        /// Keep the sleep configuration across the wake so the chip can sleep again.
        const PRESERVE_SLEEP = 0x0100;
    }
}

bitflags! {
    /// Wake sources and sleep enable.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct WakeSource: u8 {
        /// Allow the chip to enter sleep.
        const SLEEP_ENABLE = 0x01;
        /// Wake on chip-select assertion.
        const CHIP_SELECT = 0x04;
        /// Wake when the sleep counter expires.
        const SLEEP_COUNTER = 0x08;
    }
}

/// Radio errors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RadioError {
    /// Device did not come up (wrong device ID, PLL lock failure).
    InitFailed,
    /// SPI or register access error reported by the board layer.
    Bus(String),
    /// Operation did not complete in time.
    Timeout,
    /// Low-power oscillator calibration returned an unusable divisor.
    CalibrationFailed,
    /// Operation needs the radio awake at crystal speed but it is sleeping.
    NotAwake,
    /// Frame exceeds the maximum standard frame length.
    FrameTooLong { len: usize, max: usize },
}

impl fmt::Display for RadioError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InitFailed => write!(f, "radio initialisation failed"),
            Self::Bus(msg) => write!(f, "bus error: {}", msg),
            Self::Timeout => write!(f, "radio timeout"),
            Self::CalibrationFailed => write!(f, "sleep oscillator calibration failed"),
            Self::NotAwake => write!(f, "radio is not awake"),
            Self::FrameTooLong { len, max } => {
                write!(f, "frame too long: {} bytes (max {})", len, max)
            }
        }
    }
}

impl std::error::Error for RadioError {}

/// Register-level operations the protocol needs from a transceiver.
///
/// All calls are blocking SPI transactions. Implementations must not sleep
/// for protocol-level durations; only the main loop does that through
/// [`Delay`].
pub trait RadioDriver {
    /// Bring the device up from reset (device ID check, clocks, microcode).
    fn initialise(&mut self) -> Result<(), RadioError>;

    /// Soft reset of the digital core. Configuration is lost.
    fn soft_reset(&mut self) -> Result<(), RadioError>;

    /// Apply the PHY configuration.
    fn configure(&mut self, phy: &PhyConfig) -> Result<(), RadioError>;

    /// Drive the board's RX/TX activity LEDs.
    fn set_leds(&mut self, enable: bool) -> Result<(), RadioError>;

    /// Turn the receiver on immediately.
    fn enable_rx(&mut self) -> Result<(), RadioError>;

    /// Receive frame wait timeout in UWB microseconds; 0 disables it.
    fn set_rx_timeout(&mut self, uus: u16) -> Result<(), RadioError>;

    fn read_status(&mut self) -> Result<StatusEvents, RadioError>;

    /// Clear the given status bits (write-one-to-clear).
    fn write_status(&mut self, clear: StatusEvents) -> Result<(), RadioError>;

    /// Length of the last received frame, including the FCS.
    fn read_frame_length(&mut self) -> Result<usize, RadioError>;

    /// Copy `buf.len()` bytes of the receive buffer starting at `offset`.
    fn read_frame(&mut self, buf: &mut [u8], offset: usize) -> Result<(), RadioError>;

    /// Load a frame (without FCS) into the transmit buffer at `offset` and
    /// set the transmit frame length to `frame.len()` plus the FCS.
    fn write_frame(&mut self, frame: &[u8], offset: usize) -> Result<(), RadioError>;

    /// Start transmitting the loaded frame immediately.
    fn start_tx(&mut self) -> Result<(), RadioError>;

    /// Program the sleep configuration and put the chip to sleep.
    fn enter_sleep(&mut self, mode: SleepMode, wake: WakeSource) -> Result<(), RadioError>;

    /// Wake the chip by holding chip-select low for the length of `dummy`.
    fn wake_via_chip_select(&mut self, dummy: &mut [u8]) -> Result<(), RadioError>;

    /// Measure the low-power oscillator against the crystal.
    ///
    /// Returns the divisor such that `f_lp = (38.4 MHz / 2) / divisor`.
    fn calibrate_sleep_oscillator(&mut self) -> Result<u16, RadioError>;

    /// Sleep counter in units of 4096 low-power oscillator cycles.
    fn set_sleep_counter(&mut self, ticks: u16) -> Result<(), RadioError>;

    /// Snooze time between sniffs in units of 512/19.2 µs. Hardware adds one.
    fn set_snooze_ticks(&mut self, ticks: u8) -> Result<(), RadioError>;

    /// Preamble detection timeout in PACs. Hardware adds one.
    fn set_preamble_detect_timeout(&mut self, pacs: u16) -> Result<(), RadioError>;

    fn set_low_power_listening(&mut self, enable: bool) -> Result<(), RadioError>;
}

/// Poll the status register until any bit of `mask` is set.
///
/// Returns the full status word, or `None` once `timeout_us` has elapsed.
/// The status bits are left for the caller to clear.
pub fn wait_for_events<R, D>(
    radio: &mut R,
    delay: &mut D,
    mask: StatusEvents,
    timeout_us: u32,
) -> Result<Option<StatusEvents>, RadioError>
where
    R: RadioDriver + ?Sized,
    D: Delay + ?Sized,
{
    let mut waited_us = 0u32;
    loop {
        let status = radio.read_status()?;
        if status.intersects(mask) {
            return Ok(Some(status));
        }
        if waited_us >= timeout_us {
            return Ok(None);
        }
        delay.delay_us(STATUS_POLL_INTERVAL_US);
        waited_us = waited_us.saturating_add(STATUS_POLL_INTERVAL_US);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sim::{Air, SimDelay, SimRadio, VirtualClock};

    #[test]
    fn test_composite_masks() {
        assert!(StatusEvents::RX_TIMEOUT.contains(StatusEvents::RX_PREAMBLE_TIMEOUT));
        assert!(StatusEvents::RX_ERROR.contains(StatusEvents::RX_FCS_ERROR));
        assert!(!StatusEvents::RX_ERROR.intersects(StatusEvents::RX_GOOD_FRAME));
        assert!(!StatusEvents::RX_ERROR.intersects(StatusEvents::RX_TIMEOUT));
    }

    #[test]
    fn test_wait_for_events_times_out() {
        let clock = VirtualClock::new();
        let mut radio = SimRadio::new(1, clock.clone(), Air::new());
        let mut delay = SimDelay::new(clock.clone());

        let result = wait_for_events(&mut radio, &mut delay, StatusEvents::TX_DONE, 100).unwrap();
        assert_eq!(result, None);
        assert_eq!(clock.now_us(), 100);
    }

    #[test]
    fn test_wait_for_events_sees_tx_done() {
        let clock = VirtualClock::new();
        let mut radio = SimRadio::new(1, clock.clone(), Air::new());
        let mut delay = SimDelay::new(clock.clone());

        radio.write_frame(&[0u8; 10], 0).unwrap();
        radio.start_tx().unwrap();
        let status = wait_for_events(&mut radio, &mut delay, StatusEvents::TX_DONE, 10_000)
            .unwrap()
            .expect("tx should complete");
        assert!(status.contains(StatusEvents::TX_DONE));
    }

    #[test]
    fn test_error_display() {
        let err = RadioError::FrameTooLong { len: 130, max: 127 };
        assert_eq!(err.to_string(), "frame too long: 130 bytes (max 127)");
    }
}
