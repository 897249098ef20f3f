//! IEEE 802.15.4 wire format of wake and interaction frames.
//!
//! Both frames are data frames with 16-bit addressing and PAN ID compression:
//!
//! | Offset | Field | Wake | Interaction |
//! |--------|-------|------|-------------|
//! | 0 | frame control (LE) | `41 88` | `41 88` |
//! | 2 | sequence number | x | x |
//! | 3 | PAN ID (LE) | x | x |
//! | 5 | destination address (LE) | x | x |
//! | 7 | source address (LE) | x | x |
//! | 9 | application code | `E0` | `E1` |
//! | 10 | countdown (LE) | x | |
//!
//! The 2-byte FCS is appended by the hardware on transmit and is part of
//! the received frame, so decoders expect the on-air length.

use super::config::{FCS_LEN, INTERACTION_APP_CODE, INTERACTION_FRAME_LEN, WAKE_APP_CODE, WAKE_FRAME_LEN};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Data frame, 16-bit short addresses, PAN ID compression.
pub const FRAME_CONTROL_DATA: u16 = 0x8841;

pub const SEQ_NO_IDX: usize = 2;
pub const PAN_ID_IDX: usize = 3;
pub const DEST_ADDR_IDX: usize = 5;
pub const SRC_ADDR_IDX: usize = 7;
pub const APP_CODE_IDX: usize = 9;
pub const COUNTDOWN_IDX: usize = 10;

/// PAN identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PanId(pub u16);

/// 16-bit short MAC address.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ShortAddress(pub u16);

impl ShortAddress {
    /// Address from its on-air byte order.
    pub const fn from_bytes(bytes: [u8; 2]) -> Self {
        Self(u16::from_le_bytes(bytes))
    }

    pub const fn to_bytes(self) -> [u8; 2] {
        self.0.to_le_bytes()
    }
}

impl fmt::Display for ShortAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04X}", self.0)
    }
}

impl fmt::Display for PanId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04X}", self.0)
    }
}

/// Frame decode errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameError {
    /// Frame length does not match the expected on-air length.
    WrongLength { expected: usize, actual: usize },
}

impl fmt::Display for FrameError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::WrongLength { expected, actual } => {
                write!(f, "wrong frame length: {} bytes (expected {})", actual, expected)
            }
        }
    }
}

impl std::error::Error for FrameError {}

/// Encode a countdown into its little-endian wire form.
pub fn encode_countdown(countdown: u16) -> [u8; 2] {
    countdown.to_le_bytes()
}

pub fn decode_countdown(bytes: [u8; 2]) -> u16 {
    u16::from_le_bytes(bytes)
}

fn read_u16(frame: &[u8], idx: usize) -> u16 {
    u16::from_le_bytes([frame[idx], frame[idx + 1]])
}

fn check_len(frame: &[u8], expected: usize) -> Result<(), FrameError> {
    if frame.len() != expected {
        return Err(FrameError::WrongLength {
            expected,
            actual: frame.len(),
        });
    }
    Ok(())
}

/// One frame of a wake burst.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WakeFrame {
    pub frame_control: u16,
    pub seq_no: u8,
    pub pan_id: PanId,
    pub dest_addr: ShortAddress,
    pub src_addr: ShortAddress,
    pub app_code: u8,
    /// Frames left in the burst after this one.
    pub countdown: u16,
}

impl WakeFrame {
    /// MAC frame length without FCS.
    pub const PAYLOAD_LEN: usize = WAKE_FRAME_LEN - FCS_LEN;

    pub fn new(pan_id: PanId, dest_addr: ShortAddress, src_addr: ShortAddress) -> Self {
        Self {
            frame_control: FRAME_CONTROL_DATA,
            seq_no: 0,
            pan_id,
            dest_addr,
            src_addr,
            app_code: WAKE_APP_CODE,
            countdown: 0,
        }
    }

    /// Bytes to load into the transmit buffer (the hardware adds the FCS).
    pub fn encode(&self) -> [u8; Self::PAYLOAD_LEN] {
        let mut buf = [0u8; Self::PAYLOAD_LEN];
        buf[..SEQ_NO_IDX].copy_from_slice(&self.frame_control.to_le_bytes());
        buf[SEQ_NO_IDX] = self.seq_no;
        buf[PAN_ID_IDX..DEST_ADDR_IDX].copy_from_slice(&self.pan_id.0.to_le_bytes());
        buf[DEST_ADDR_IDX..SRC_ADDR_IDX].copy_from_slice(&self.dest_addr.to_bytes());
        buf[SRC_ADDR_IDX..APP_CODE_IDX].copy_from_slice(&self.src_addr.to_bytes());
        buf[APP_CODE_IDX] = self.app_code;
        buf[COUNTDOWN_IDX..COUNTDOWN_IDX + 2].copy_from_slice(&encode_countdown(self.countdown));
        buf
    }

    /// Decode a received frame (FCS included).
    ///
    /// Only the length is checked here; whether the frame is one of ours is
    /// up to the caller.
    pub fn decode(frame: &[u8]) -> Result<Self, FrameError> {
        check_len(frame, WAKE_FRAME_LEN)?;
        Ok(Self {
            frame_control: read_u16(frame, 0),
            seq_no: frame[SEQ_NO_IDX],
            pan_id: PanId(read_u16(frame, PAN_ID_IDX)),
            dest_addr: ShortAddress(read_u16(frame, DEST_ADDR_IDX)),
            src_addr: ShortAddress(read_u16(frame, SRC_ADDR_IDX)),
            app_code: frame[APP_CODE_IDX],
            countdown: decode_countdown([frame[COUNTDOWN_IDX], frame[COUNTDOWN_IDX + 1]]),
        })
    }
}

/// Frame a woken listener sends back to the waker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InteractionFrame {
    pub frame_control: u16,
    pub seq_no: u8,
    pub pan_id: PanId,
    pub dest_addr: ShortAddress,
    pub src_addr: ShortAddress,
    pub app_code: u8,
}

impl InteractionFrame {
    pub const PAYLOAD_LEN: usize = INTERACTION_FRAME_LEN - FCS_LEN;

    pub fn new(seq_no: u8, pan_id: PanId, dest_addr: ShortAddress, src_addr: ShortAddress) -> Self {
        Self {
            frame_control: FRAME_CONTROL_DATA,
            seq_no,
            pan_id,
            dest_addr,
            src_addr,
            app_code: INTERACTION_APP_CODE,
        }
    }

    pub fn encode(&self) -> [u8; Self::PAYLOAD_LEN] {
        let mut buf = [0u8; Self::PAYLOAD_LEN];
        buf[..SEQ_NO_IDX].copy_from_slice(&self.frame_control.to_le_bytes());
        buf[SEQ_NO_IDX] = self.seq_no;
        buf[PAN_ID_IDX..DEST_ADDR_IDX].copy_from_slice(&self.pan_id.0.to_le_bytes());
        buf[DEST_ADDR_IDX..SRC_ADDR_IDX].copy_from_slice(&self.dest_addr.to_bytes());
        buf[SRC_ADDR_IDX..APP_CODE_IDX].copy_from_slice(&self.src_addr.to_bytes());
        buf[APP_CODE_IDX] = self.app_code;
        buf
    }

    /// Decode a received frame (FCS included).
    pub fn decode(frame: &[u8]) -> Result<Self, FrameError> {
        check_len(frame, INTERACTION_FRAME_LEN)?;
        Ok(Self {
            frame_control: read_u16(frame, 0),
            seq_no: frame[SEQ_NO_IDX],
            pan_id: PanId(read_u16(frame, PAN_ID_IDX)),
            dest_addr: ShortAddress(read_u16(frame, DEST_ADDR_IDX)),
            src_addr: ShortAddress(read_u16(frame, SRC_ADDR_IDX)),
            app_code: frame[APP_CODE_IDX],
        })
    }
}
