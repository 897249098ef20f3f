//! Physical-layer parameters handed to [`RadioDriver::configure`].
//!
//! The protocol treats these as opaque except where they drive timing:
//! preamble length, PRF, PAC size, SFD mode and data rate all feed the
//! airtime model in [`crate::lpl::timing`].
//!
//! [`RadioDriver::configure`]: super::RadioDriver::configure

use serde::{Deserialize, Serialize};

/// Pulse repetition frequency.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Prf {
    Mhz16,
    Mhz64,
}

impl Prf {
    /// Duration of one preamble symbol in picoseconds.
    pub fn symbol_ps(self) -> u64 {
        match self {
            Self::Mhz16 => 993_590,
            Self::Mhz64 => 1_017_630,
        }
    }
}

/// Preamble acquisition chunk size, in preamble symbols.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PacSize {
    Pac8,
    Pac16,
    Pac32,
    Pac64,
}

impl PacSize {
    pub fn symbols(self) -> u32 {
        match self {
            Self::Pac8 => 8,
            Self::Pac16 => 16,
            Self::Pac32 => 32,
            Self::Pac64 => 64,
        }
    }
}

/// Over-the-air data rate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DataRate {
    Kbps110,
    Kbps850,
    Mbps6_8,
}

impl DataRate {
    /// Duration of one coded payload bit in picoseconds.
    pub fn bit_ps(self) -> u64 {
        match self {
            Self::Kbps110 => 8_205_130,
            Self::Kbps850 => 1_025_640,
            Self::Mbps6_8 => 128_210,
        }
    }
}

/// Start-of-frame delimiter flavour.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SfdMode {
    /// IEEE 802.15.4 standard SFD.
    Standard,
    /// Vendor-specific non-standard SFD (better sensitivity at 850k/6.8M).
    NonStandard,
}

/// PHY header mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PhrMode {
    Standard,
    Extended,
}

/// Complete PHY configuration.
///
/// The default matches the low-power listening demonstration setup: channel 2,
/// 16 MHz PRF, 1024-symbol preamble, PAC 16, preamble code 3, standard SFD,
/// 6.8 Mbps and an SFD timeout of 1017 symbols.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PhyConfig {
    pub channel: u8,
    pub prf: Prf,
    /// Preamble length in symbols (64..=4096).
    pub preamble_symbols: u16,
    pub pac: PacSize,
    pub tx_preamble_code: u8,
    pub rx_preamble_code: u8,
    pub sfd: SfdMode,
    pub data_rate: DataRate,
    pub phr: PhrMode,
    /// SFD detection timeout in symbols (preamble + 1 + SFD length - PAC).
    pub sfd_timeout: u16,
}

impl Default for PhyConfig {
    fn default() -> Self {
        Self {
            channel: 2,
            prf: Prf::Mhz16,
            preamble_symbols: 1024,
            pac: PacSize::Pac16,
            tx_preamble_code: 3,
            rx_preamble_code: 3,
            sfd: SfdMode::Standard,
            data_rate: DataRate::Mbps6_8,
            phr: PhrMode::Standard,
            sfd_timeout: 1024 + 1 + 8 - 16,
        }
    }
}

impl PhyConfig {
    /// Number of preamble symbols in the start-of-frame delimiter.
    pub fn sfd_symbols(&self) -> u32 {
        match (self.sfd, self.data_rate) {
            (_, DataRate::Kbps110) => 64,
            (SfdMode::NonStandard, DataRate::Kbps850) => 16,
            _ => 8,
        }
    }

    /// Duration of one PHY header bit in picoseconds.
    ///
    /// The header is sent at 850 kbps except in 110 kbps mode.
    pub fn phr_bit_ps(&self) -> u64 {
        match self.data_rate {
            DataRate::Kbps110 => DataRate::Kbps110.bit_ps(),
            _ => DataRate::Kbps850.bit_ps(),
        }
    }
}
