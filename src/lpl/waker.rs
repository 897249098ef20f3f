//! Active waker.
//!
//! A wake cycle is a burst of back-to-back wake frames counting down to
//! zero, a short receive window for the woken listener's answer, and a long
//! pause. The burst has to outlast one listener duty-cycle period so that
//! some sniff lands in one of its preambles; the countdown then tells the
//! listener exactly when the burst ends and the receive window opens.

use super::config::{ConfigError, WakerConfig, MAX_FRAME_LEN};
use super::frame::{InteractionFrame, ShortAddress, WakeFrame};
use super::timing::uus_to_us;
use crate::platform::Delay;
use crate::radio::{wait_for_events, RadioDriver, RadioError, StatusEvents};
use crate::stats::WakerCounters;
use log::{debug, info, warn};
use serde::Serialize;
use std::sync::Arc;

/// Slack on top of the radio's own receive timeout before giving up on it.
const RESPONSE_GUARD_US: u32 = 2_000;

/// Summary of one wake burst.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct BurstReport {
    pub target: ShortAddress,
    pub frames_sent: u16,
    pub first_seq_no: u8,
    /// Frames whose transmission was not confirmed in time.
    pub tx_timeouts: u16,
}

/// What the receive window after a burst produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum RendezvousOutcome {
    /// A frame arrived in the window. `responder` and `seq_no` are filled in
    /// when it decodes as an interaction frame.
    Answered {
        len: usize,
        responder: Option<ShortAddress>,
        seq_no: Option<u8>,
    },
    /// A frame longer than the maximum standard length; ignored.
    Oversize { len: usize },
    /// Timeout or receive error. Carries the raw status bits (0 when the
    /// radio never reported).
    Missed { status: u32 },
}

impl RendezvousOutcome {
    pub fn is_answered(&self) -> bool {
        matches!(self, Self::Answered { .. })
    }
}

/// One full wake cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CycleReport {
    pub burst: BurstReport,
    pub outcome: RendezvousOutcome,
}

/// Wake burst generator.
pub struct WakeSequencer {
    config: WakerConfig,
    frame: WakeFrame,
    target: ShortAddress,
    counters: Arc<WakerCounters>,
    rx_buf: [u8; MAX_FRAME_LEN],
}

impl WakeSequencer {
    pub fn new(config: WakerConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self {
            frame: WakeFrame::new(config.pan_id, config.target, config.local_address),
            target: config.target,
            config,
            counters: Arc::new(WakerCounters::new()),
            rx_buf: [0u8; MAX_FRAME_LEN],
        })
    }

    pub fn config(&self) -> &WakerConfig {
        &self.config
    }

    pub fn counters(&self) -> Arc<WakerCounters> {
        Arc::clone(&self.counters)
    }

    /// Address the next burst goes to.
    pub fn target(&self) -> ShortAddress {
        self.target
    }

    /// Sequence number of the next wake frame.
    pub fn seq_no(&self) -> u8 {
        self.frame.seq_no
    }

    /// Boot configuration. The radio must be initialised.
    pub fn init<R: RadioDriver + ?Sized>(&mut self, radio: &mut R) -> Result<(), RadioError> {
        radio.configure(&self.config.phy)?;
        radio.set_rx_timeout(self.config.response_timeout_uus)?;
        radio.set_leds(true)?;
        info!(
            "Waker {} ready: {} frames per burst, target {}",
            self.config.local_address, self.config.frame_count, self.target
        );
        Ok(())
    }

    /// Transmit one burst, countdown `frame_count - 1` down to 0.
    pub fn run_burst<R, D>(&mut self, radio: &mut R, delay: &mut D) -> Result<BurstReport, RadioError>
    where
        R: RadioDriver + ?Sized,
        D: Delay + ?Sized,
    {
        self.counters.record_burst();
        self.frame.dest_addr = self.target;
        let mut report = BurstReport {
            target: self.target,
            frames_sent: 0,
            first_seq_no: self.frame.seq_no,
            tx_timeouts: 0,
        };

        for countdown in (0..self.config.frame_count).rev() {
            self.frame.countdown = countdown;
            radio.write_frame(&self.frame.encode(), 0)?;
            radio.start_tx()?;

            match wait_for_events(radio, delay, StatusEvents::TX_DONE, self.config.tx_timeout_us)? {
                Some(_) => {
                    radio.write_status(StatusEvents::TX_DONE)?;
                    report.frames_sent += 1;
                    self.counters.record_frame_sent();
                }
                None => {
                    report.tx_timeouts += 1;
                    self.counters.record_tx_timeout();
                    warn!("Wake frame countdown {} not confirmed sent", countdown);
                }
            }
            self.frame.seq_no = self.frame.seq_no.wrapping_add(1);
        }

        info!(
            "Wake burst to {}: {} frames sent, {} unconfirmed",
            report.target, report.frames_sent, report.tx_timeouts
        );
        Ok(report)
    }

    /// Open the receive window and wait for the listener's answer.
    ///
    /// A missing answer is not an error; there is no retry within the cycle.
    pub fn await_response<R, D>(&mut self, radio: &mut R, delay: &mut D) -> Result<RendezvousOutcome, RadioError>
    where
        R: RadioDriver + ?Sized,
        D: Delay + ?Sized,
    {
        radio.enable_rx()?;
        let window_us = uus_to_us(self.config.response_timeout_uus as u32) as u32 + RESPONSE_GUARD_US;
        let events = StatusEvents::RX_GOOD_FRAME | StatusEvents::RX_ERROR | StatusEvents::RX_TIMEOUT;

        let outcome = match wait_for_events(radio, delay, events, window_us)? {
            Some(status) if status.contains(StatusEvents::RX_GOOD_FRAME) => {
                radio.write_status(StatusEvents::RX_GOOD_FRAME)?;
                let len = radio.read_frame_length()?;
                if len > MAX_FRAME_LEN {
                    self.counters.record_oversize_response();
                    warn!("Ignoring {}-byte response", len);
                    RendezvousOutcome::Oversize { len }
                } else {
                    radio.read_frame(&mut self.rx_buf[..len], 0)?;
                    let reply = InteractionFrame::decode(&self.rx_buf[..len]).ok();
                    self.counters.record_rendezvous();
                    match reply {
                        Some(reply) => info!("Rendezvous with {} (seq {})", reply.src_addr, reply.seq_no),
                        None => info!("Rendezvous: {}-byte response", len),
                    }
                    RendezvousOutcome::Answered {
                        len,
                        responder: reply.map(|r| r.src_addr),
                        seq_no: reply.map(|r| r.seq_no),
                    }
                }
            }
            Some(status) => {
                radio.write_status(status & events)?;
                self.counters.record_missed();
                debug!("No response from {} ({:?})", self.target, status);
                RendezvousOutcome::Missed {
                    status: status.bits(),
                }
            }
            None => {
                self.counters.record_missed();
                warn!("Receiver reported nothing within {} us", window_us);
                RendezvousOutcome::Missed { status: 0 }
            }
        };
        Ok(outcome)
    }

    /// Pause until the next burst and move to the next target.
    pub fn end_cycle<D: Delay + ?Sized>(&mut self, delay: &mut D) {
        delay.sleep_ms(self.config.inter_burst_delay_ms);
        self.toggle_target();
    }

    /// Switch to the alternate target, if one is configured.
    pub fn toggle_target(&mut self) {
        if let Some(alternate) = self.config.alternate_target {
            self.target = if self.target == self.config.target {
                alternate
            } else {
                self.config.target
            };
            debug!("Next burst targets {}", self.target);
        }
    }

    /// Burst, receive window and pause.
    pub fn run_cycle<R, D>(&mut self, radio: &mut R, delay: &mut D) -> Result<CycleReport, RadioError>
    where
        R: RadioDriver + ?Sized,
        D: Delay + ?Sized,
    {
        let burst = self.run_burst(radio, delay)?;
        let outcome = self.await_response(radio, delay)?;
        self.end_cycle(delay);
        Ok(CycleReport { burst, outcome })
    }

    /// Wake cycles forever.
    pub fn run<R, D>(&mut self, radio: &mut R, delay: &mut D) -> !
    where
        R: RadioDriver + ?Sized,
        D: Delay + ?Sized,
    {
        loop {
            if let Err(e) = self.run_cycle(radio, delay) {
                warn!("Wake cycle failed: {}", e);
                self.end_cycle(delay);
            }
        }
    }
}
