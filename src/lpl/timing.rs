//! UWB frame airtime and hardware time units.
//!
//! A frame on air is preamble, SFD, PHY header and the Reed-Solomon coded
//! PSDU. The listener sizes its snooze to cover everything after one
//! preamble up to the start of the next (SFD + PHR + payload + inter-frame
//! spacing), and the waker sizes its burst from the per-frame time.
//!
//! Hardware units used here:
//! - UUS, the UWB microsecond: 512/499.2 µs
//! - snooze unit: 512/19.2 µs (≈26.67 µs), hardware adds one
//! - PAC: preamble acquisition chunk, a fixed number of preamble symbols
//!
//! # Example
//!
//! ```
//! use uwb_lplisten::lpl::timing::FrameTiming;
//! use uwb_lplisten::radio::PhyConfig;
//!
//! let timing = FrameTiming::for_frame(&PhyConfig::default(), 14);
//! println!("14-byte wake frame takes {} us", timing.airtime_ns() / 1000);
//! ```

use crate::radio::PhyConfig;

/// PHY header length in bits.
const PHR_BITS: u64 = 21;

/// Reed-Solomon adds 48 parity bits per block of up to 330 data bits.
const RS_BLOCK_BITS: u64 = 330;
const RS_PARITY_BITS: u64 = 48;

/// Snooze unit is 512/19.2 µs, i.e. 80000/3 ns.
const SNOOZE_UNIT_NS_NUM: u64 = 80_000;
const SNOOZE_UNIT_NS_DEN: u64 = 3;

/// Durations of the parts of one frame on air, in nanoseconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameTiming {
    pub preamble_ns: u64,
    pub sfd_ns: u64,
    pub phr_ns: u64,
    pub payload_ns: u64,
}

impl FrameTiming {
    /// Timing of a frame of `frame_len` bytes, FCS included.
    pub fn for_frame(phy: &PhyConfig, frame_len: usize) -> Self {
        let symbol_ps = phy.prf.symbol_ps();
        let data_bits = frame_len as u64 * 8;
        let coded_bits = data_bits + data_bits.div_ceil(RS_BLOCK_BITS) * RS_PARITY_BITS;

        Self {
            preamble_ns: phy.preamble_symbols as u64 * symbol_ps / 1000,
            sfd_ns: phy.sfd_symbols() as u64 * symbol_ps / 1000,
            phr_ns: PHR_BITS * phy.phr_bit_ps() / 1000,
            payload_ns: coded_bits * phy.data_rate.bit_ps() / 1000,
        }
    }

    /// Total time on air.
    pub fn airtime_ns(&self) -> u64 {
        self.preamble_ns + self.post_preamble_ns()
    }

    /// Time from the end of the preamble to the end of the frame.
    pub fn post_preamble_ns(&self) -> u64 {
        self.sfd_ns + self.phr_ns + self.payload_ns
    }
}

/// Duration of one PAC.
pub fn pac_duration_ns(phy: &PhyConfig) -> u64 {
    phy.pac.symbols() as u64 * phy.prf.symbol_ps() / 1000
}

/// Duration of a sniff of `pacs` PACs.
pub fn sniff_duration_ns(phy: &PhyConfig, pacs: u16) -> u64 {
    pacs as u64 * phy.pac.symbols() as u64 * phy.prf.symbol_ps() / 1000
}

/// Actual snooze for a snooze register value (the hardware adds one unit).
pub fn snooze_duration_ns(ticks: u8) -> u64 {
    (ticks as u64 + 1) * SNOOZE_UNIT_NS_NUM / SNOOZE_UNIT_NS_DEN
}

/// Smallest snooze register value whose actual snooze covers `ns`.
///
/// Saturates at the register maximum.
pub fn snooze_ticks_for(ns: u64) -> u8 {
    let units = (ns * SNOOZE_UNIT_NS_DEN).div_ceil(SNOOZE_UNIT_NS_NUM);
    units.saturating_sub(1).min(u8::MAX as u64) as u8
}

/// Longest snooze the register can express.
pub fn max_snooze_ns() -> u64 {
    snooze_duration_ns(u8::MAX)
}

/// Time a listener must snooze between two sniffs so the second one lands
/// in the preamble of the next burst frame.
pub fn snooze_span_ns(phy: &PhyConfig, frame_len: usize, frame_time_us: u32) -> u64 {
    FrameTiming::for_frame(phy, frame_len).post_preamble_ns()
        + inter_frame_spacing_ns(phy, frame_len, frame_time_us)
}

/// Gap between the end of one burst frame and the start of the next.
pub fn inter_frame_spacing_ns(phy: &PhyConfig, frame_len: usize, frame_time_us: u32) -> u64 {
    let airtime = FrameTiming::for_frame(phy, frame_len).airtime_ns();
    (frame_time_us as u64 * 1000).saturating_sub(airtime)
}

/// UWB microseconds to microseconds, rounded down.
pub fn uus_to_us(uus: u32) -> u64 {
    uus as u64 * 5120 / 4992
}

/// Microseconds to UWB microseconds, rounded down.
pub fn us_to_uus(us: u64) -> u64 {
    us * 4992 / 5120
}
