//! Protocol constants and node configuration.
//!
//! Wire and timing constants are fixed by the protocol and shared by both
//! roles. [`ListenerConfig`] and [`WakerConfig`] carry what a deployment may
//! tune; both validate before use.

use super::frame::{PanId, ShortAddress};
use super::timing::{max_snooze_ns, snooze_span_ns, uus_to_us};
use crate::radio::PhyConfig;
use log::warn;
use serde::{Deserialize, Serialize};
use std::fmt;

// ==================== Hardware ====================

/// Crystal oscillator frequency.
pub const XTAL_FREQ_HZ: u32 = 38_400_000;

/// The sleep counter counts in units of 2^12 low-power oscillator cycles.
pub const SLEEP_COUNTER_SHIFT: u32 = 12;

/// Maximum standard (non-extended) frame length, FCS included.
pub const MAX_FRAME_LEN: usize = 127;

/// CRC appended by the hardware.
pub const FCS_LEN: usize = 2;

/// Chip-select must be held low this many SPI bytes to wake the chip.
pub const CHIP_SELECT_WAKE_LEN: usize = 600;

/// Status polling granularity for blocking waits.
pub const STATUS_POLL_INTERVAL_US: u32 = 10;

/// How long to wait for a transmission to be confirmed sent.
pub const TX_CONFIRM_TIMEOUT_US: u32 = 10_000;

// ==================== Protocol ====================

/// Wake frame length on air, FCS included.
pub const WAKE_FRAME_LEN: usize = 14;

/// Interaction frame length on air, FCS included.
pub const INTERACTION_FRAME_LEN: usize = 12;

/// Application code of a wake frame.
pub const WAKE_APP_CODE: u8 = 0xE0;

/// Application code of an interaction frame.
pub const INTERACTION_APP_CODE: u8 = 0xE1;

pub const DEFAULT_PAN_ID: PanId = PanId(0xDECA);

/// Waker's short address, "XT" on the wire.
pub const WAKER_ADDRESS: ShortAddress = ShortAddress::from_bytes([b'X', b'T']);

/// Listener's short address, "XR" on the wire.
pub const LISTENER_ADDRESS: ShortAddress = ShortAddress::from_bytes([b'X', b'R']);

/// Wake frame airtime plus inter-frame spacing, as seen by a listener.
pub const WAKE_FRAME_TIME_US: u32 = 1130;

/// Window the waker keeps its receiver open after a burst.
pub const INTERACTION_CEILING_MS: u32 = 50;

/// The same window in UWB microseconds (1 UUS = 512/499.2 µs).
pub const INTERACTION_CEILING_UUS: u16 = 48_750;

/// Largest accepted interaction ceiling.
pub const MAX_INTERACTION_CEILING_MS: u32 = 60_000;

/// Wanted deep-sleep time between sniffs.
pub const LONG_SLEEP_MS: u32 = 1500;

/// Sniff length in PACs (at least three for reliable preamble detection).
pub const SNIFF_PACS: u16 = 3;

/// Frames per wake burst.
pub const WAKE_BURST_FRAMES: u16 = 1350;

/// Pause between wake bursts.
pub const INTER_BURST_DELAY_MS: u32 = 5000;

/// Configuration errors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// Invalid configuration parameter.
    InvalidConfig(&'static str),
    /// The burst is not longer than one listener duty cycle.
    BurstTooShort { burst_us: u64, period_us: u64 },
    /// The waker listens for answers longer than listeners stay away.
    CeilingMismatch { ceiling_us: u64, response_window_us: u64 },
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidConfig(msg) => write!(f, "invalid config: {}", msg),
            Self::BurstTooShort {
                burst_us,
                period_us,
            } => write!(
                f,
                "wake burst of {} us does not cover a listener period of {} us",
                burst_us, period_us
            ),
            Self::CeilingMismatch {
                ceiling_us,
                response_window_us,
            } => write!(
                f,
                "response window of {} us outlasts the listener interaction ceiling of {} us",
                response_window_us, ceiling_us
            ),
        }
    }
}

impl std::error::Error for ConfigError {}

/// Configuration of a sleeping listener node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ListenerConfig {
    pub phy: PhyConfig,
    pub pan_id: PanId,
    /// Our address; a wake frame for it triggers an interaction.
    pub local_address: ShortAddress,
    /// Expected source of wake frames.
    pub waker_address: ShortAddress,
    /// Wanted deep-sleep time. The hardware sleeps at most this long.
    pub long_sleep_ms: u32,
    pub sniff_pacs: u16,
    /// Time between the starts of consecutive wake frames.
    pub frame_time_us: u32,
    pub interaction_ceiling_ms: u32,
    pub tx_timeout_us: u32,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            phy: PhyConfig::default(),
            pan_id: DEFAULT_PAN_ID,
            local_address: LISTENER_ADDRESS,
            waker_address: WAKER_ADDRESS,
            long_sleep_ms: LONG_SLEEP_MS,
            sniff_pacs: SNIFF_PACS,
            frame_time_us: WAKE_FRAME_TIME_US,
            interaction_ceiling_ms: INTERACTION_CEILING_MS,
            tx_timeout_us: TX_CONFIRM_TIMEOUT_US,
        }
    }
}

impl ListenerConfig {
    /// Validate configuration values.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.long_sleep_ms == 0 {
            return Err(ConfigError::InvalidConfig("long_sleep_ms must be > 0"));
        }
        if self.sniff_pacs == 0 {
            return Err(ConfigError::InvalidConfig("sniff_pacs must be > 0"));
        }
        if self.sniff_pacs < SNIFF_PACS {
            warn!(
                "Sniff of {} PACs is below {}, preamble detection will be unreliable",
                self.sniff_pacs, SNIFF_PACS
            );
        }
        if self.frame_time_us == 0 {
            return Err(ConfigError::InvalidConfig("frame_time_us must be > 0"));
        }
        if snooze_span_ns(&self.phy, WAKE_FRAME_LEN, self.frame_time_us) > max_snooze_ns() {
            return Err(ConfigError::InvalidConfig("frame_time_us exceeds snooze range"));
        }
        if self.interaction_ceiling_ms == 0 {
            return Err(ConfigError::InvalidConfig("interaction_ceiling_ms must be > 0"));
        }
        if self.interaction_ceiling_ms > MAX_INTERACTION_CEILING_MS {
            return Err(ConfigError::InvalidConfig(
                "interaction_ceiling_ms exceeds maximum",
            ));
        }
        if self.tx_timeout_us == 0 {
            return Err(ConfigError::InvalidConfig("tx_timeout_us must be > 0"));
        }
        if self.local_address == self.waker_address {
            return Err(ConfigError::InvalidConfig(
                "local_address must differ from waker_address",
            ));
        }
        Ok(())
    }
}

/// Configuration of an active waker node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WakerConfig {
    pub phy: PhyConfig,
    pub pan_id: PanId,
    pub local_address: ShortAddress,
    /// Listener the first burst is addressed to.
    pub target: ShortAddress,
    /// When set, the target alternates with this address after every burst.
    pub alternate_target: Option<ShortAddress>,
    pub frame_count: u16,
    /// Time between the starts of consecutive wake frames.
    pub frame_time_us: u32,
    /// Receive window for the listener's response, in UWB microseconds.
    pub response_timeout_uus: u16,
    pub inter_burst_delay_ms: u32,
    pub tx_timeout_us: u32,
}

impl Default for WakerConfig {
    fn default() -> Self {
        Self {
            phy: PhyConfig::default(),
            pan_id: DEFAULT_PAN_ID,
            local_address: WAKER_ADDRESS,
            target: LISTENER_ADDRESS,
            alternate_target: None,
            frame_count: WAKE_BURST_FRAMES,
            frame_time_us: WAKE_FRAME_TIME_US,
            response_timeout_uus: INTERACTION_CEILING_UUS,
            inter_burst_delay_ms: INTER_BURST_DELAY_MS,
            tx_timeout_us: TX_CONFIRM_TIMEOUT_US,
        }
    }
}

impl WakerConfig {
    /// Validate configuration values.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.frame_count == 0 {
            return Err(ConfigError::InvalidConfig("frame_count must be > 0"));
        }
        if self.frame_time_us == 0 {
            return Err(ConfigError::InvalidConfig("frame_time_us must be > 0"));
        }
        if self.response_timeout_uus == 0 {
            return Err(ConfigError::InvalidConfig("response_timeout_uus must be > 0"));
        }
        if self.tx_timeout_us == 0 {
            return Err(ConfigError::InvalidConfig("tx_timeout_us must be > 0"));
        }
        if self.target == self.local_address {
            return Err(ConfigError::InvalidConfig("target must differ from local_address"));
        }
        Ok(())
    }

    /// Burst duration on air.
    pub fn burst_duration_us(&self) -> u64 {
        self.frame_count as u64 * self.frame_time_us as u64
    }

    /// Smallest frame count whose burst still spans a listener period plus
    /// one whole frame, so at least one sniff lands inside a preamble.
    pub fn min_frame_count(&self, listener_period_us: u64) -> u64 {
        listener_period_us / self.frame_time_us.max(1) as u64 + 2
    }

    /// Receive window after a burst, in microseconds.
    pub fn response_window_us(&self) -> u64 {
        uus_to_us(self.response_timeout_uus as u32)
    }

    /// Check that a listener told to stay away for `ceiling_ms` after a
    /// burst for someone else is still away when our receive window closes.
    pub fn validate_ceiling(&self, ceiling_ms: u32) -> Result<(), ConfigError> {
        let ceiling_us = ceiling_ms as u64 * 1000;
        let response_window_us = self.response_window_us();
        if response_window_us > ceiling_us {
            return Err(ConfigError::CeilingMismatch {
                ceiling_us,
                response_window_us,
            });
        }
        Ok(())
    }

    /// Check that the burst is long enough for a listener with the given
    /// worst-case duty-cycle period.
    pub fn validate_against(&self, listener_period_us: u64) -> Result<(), ConfigError> {
        self.validate()?;
        if (self.frame_count as u64) < self.min_frame_count(listener_period_us) {
            return Err(ConfigError::BurstTooShort {
                burst_us: self.burst_duration_us(),
                period_us: listener_period_us,
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_configs_valid() {
        assert!(ListenerConfig::default().validate().is_ok());
        assert!(WakerConfig::default().validate().is_ok());
    }

    #[test]
    fn test_addresses_on_wire() {
        assert_eq!(WAKER_ADDRESS.0, 0x5458);
        assert_eq!(LISTENER_ADDRESS.0, 0x5258);
    }

    #[test]
    fn test_interaction_ceiling_units_agree() {
        // 48750 UUS * 512 / 499.2 = 50000 us
        assert_eq!(INTERACTION_CEILING_UUS as u64 * 5120 / 4992, 50_000);
        assert_eq!(INTERACTION_CEILING_MS, 50);
    }

    #[test]
    fn test_listener_rejects_zero_sniff() {
        let config = ListenerConfig {
            sniff_pacs: 0,
            ..Default::default()
        };
        assert_eq!(
            config.validate(),
            Err(ConfigError::InvalidConfig("sniff_pacs must be > 0"))
        );
    }

    #[test]
    fn test_listener_short_sniff_only_warns() {
        let config = ListenerConfig {
            sniff_pacs: 1,
            ..Default::default()
        };
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_listener_rejects_unbounded_ceiling() {
        let config = ListenerConfig {
            interaction_ceiling_ms: u32::MAX,
            ..Default::default()
        };
        assert_eq!(
            config.validate(),
            Err(ConfigError::InvalidConfig("interaction_ceiling_ms exceeds maximum"))
        );

        let config = ListenerConfig {
            interaction_ceiling_ms: MAX_INTERACTION_CEILING_MS,
            ..Default::default()
        };
        assert!(config.validate().is_ok());

        let config = ListenerConfig {
            interaction_ceiling_ms: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_listener_frame_time_within_snooze_range() {
        let slow = ListenerConfig {
            frame_time_us: 10_000,
            ..Default::default()
        };
        assert_eq!(
            slow.validate(),
            Err(ConfigError::InvalidConfig("frame_time_us exceeds snooze range"))
        );

        // 7844 us leaves 6_826_564 ns to snooze, the register tops out at 6_826_666
        let longest = ListenerConfig {
            frame_time_us: 7844,
            ..Default::default()
        };
        assert!(longest.validate().is_ok());
        let over = ListenerConfig {
            frame_time_us: 7845,
            ..Default::default()
        };
        assert!(over.validate().is_err());
    }

    #[test]
    fn test_listener_rejects_own_address_as_waker() {
        let config = ListenerConfig {
            waker_address: LISTENER_ADDRESS,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_waker_rejects_empty_burst() {
        let config = WakerConfig {
            frame_count: 0,
            ..Default::default()
        };
        assert_eq!(
            config.validate(),
            Err(ConfigError::InvalidConfig("frame_count must be > 0"))
        );
    }

    #[test]
    fn test_default_burst_covers_default_listener() {
        // 1500 ms sleep + sniff/snooze/sniff stays well under the 1.5255 s burst
        let waker = WakerConfig::default();
        assert_eq!(waker.burst_duration_us(), 1_525_500);
        assert!(waker.validate_against(1_229_000).is_ok());
    }

    #[test]
    fn test_burst_too_short() {
        let waker = WakerConfig {
            frame_count: 100,
            ..Default::default()
        };
        match waker.validate_against(1_500_230) {
            Err(ConfigError::BurstTooShort {
                burst_us,
                period_us,
            }) => {
                assert_eq!(burst_us, 113_000);
                assert_eq!(period_us, 1_500_230);
            }
            other => panic!("expected BurstTooShort, got {:?}", other),
        }
    }

    #[test]
    fn test_response_window_within_ceiling() {
        let waker = WakerConfig::default();
        assert_eq!(waker.response_window_us(), 50_000);
        assert!(waker.validate_ceiling(INTERACTION_CEILING_MS).is_ok());

        match waker.validate_ceiling(40) {
            Err(ConfigError::CeilingMismatch {
                ceiling_us,
                response_window_us,
            }) => {
                assert_eq!(ceiling_us, 40_000);
                assert_eq!(response_window_us, 50_000);
            }
            other => panic!("expected CeilingMismatch, got {:?}", other),
        }
    }

    #[test]
    fn test_min_frame_count() {
        let waker = WakerConfig::default();
        // 1_500_230 / 1130 = 1327, plus the partial frame and the sniffed one
        assert_eq!(waker.min_frame_count(1_500_230), 1329);
        assert!(waker.validate_against(1_500_230).is_ok());
    }

    #[test]
    fn test_config_from_json() {
        let config: WakerConfig =
            serde_json::from_str(r#"{"frame_count": 2000, "alternate_target": 21080}"#).unwrap();
        assert_eq!(config.frame_count, 2000);
        assert_eq!(config.alternate_target, Some(ShortAddress(21080)));
        assert_eq!(config.inter_burst_delay_ms, INTER_BURST_DELAY_MS);
    }
}
