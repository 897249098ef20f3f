//! Interrupt servicing.
//!
//! The transceiver asserts its IRQ line when a status event fires. The
//! service routine reads the status register, turns it into a
//! [`RadioEvent`] and hands that to an [`EventSink`] synchronously, still on
//! the interrupt path. The sink decides what happens to the radio next.
//!
//! A sink can decline ownership of the radio (see [`EventSink::owns_radio`]).
//! The routine then leaves the chip untouched, status bits included, so the
//! main loop that currently owns it finds the state exactly as it left it.

use super::{RadioDriver, RadioError, StatusEvents};
use crate::lpl::config::MAX_FRAME_LEN;
use crate::platform::RadioCell;
use log::{debug, info, warn};
use std::sync::mpsc::Receiver;

/// Event delivered to an [`EventSink`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RadioEvent<'a> {
    /// A frame with good CRC, as read from the receive buffer (FCS included).
    FrameReceived(&'a [u8]),
    /// A frame longer than the maximum standard length. It was not read.
    FrameOversize(usize),
    /// Receive error or timeout; carries the status bits that fired.
    ReceiveError(StatusEvents),
}

/// Receiver of radio events on the interrupt path.
pub trait EventSink<R: ?Sized> {
    /// Whether the interrupt path currently owns the radio.
    ///
    /// While this returns false the service routine does not touch the
    /// radio and calls [`EventSink::on_deferred`] instead.
    fn owns_radio(&self) -> bool {
        true
    }

    fn on_radio_event(&mut self, radio: &mut R, event: RadioEvent<'_>) -> Result<(), RadioError>;

    /// Called when an interrupt arrives while the sink does not own the radio.
    fn on_deferred(&mut self) {}
}

/// What one invocation of [`service_irq`] did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IrqOutcome {
    /// A receive event was delivered to the sink.
    Delivered,
    /// The sink did not own the radio; nothing was read.
    Deferred,
    /// No receive event was pending.
    Spurious,
}

/// Service one assertion of the IRQ line.
///
/// Good frames are acknowledged in the status register before the sink runs,
/// so a sink that re-enters sleep leaves no stale event behind.
pub fn service_irq<R, S>(radio: &mut R, sink: &mut S) -> Result<IrqOutcome, RadioError>
where
    R: RadioDriver + ?Sized,
    S: EventSink<R> + ?Sized,
{
    if !sink.owns_radio() {
        sink.on_deferred();
        return Ok(IrqOutcome::Deferred);
    }

    let status = radio.read_status()?;

    if status.contains(StatusEvents::RX_GOOD_FRAME) {
        radio.write_status(StatusEvents::RX_GOOD_FRAME)?;
        let len = radio.read_frame_length()?;
        if len > MAX_FRAME_LEN {
            sink.on_radio_event(radio, RadioEvent::FrameOversize(len))?;
        } else {
            let mut buf = [0u8; MAX_FRAME_LEN];
            radio.read_frame(&mut buf[..len], 0)?;
            sink.on_radio_event(radio, RadioEvent::FrameReceived(&buf[..len]))?;
        }
        return Ok(IrqOutcome::Delivered);
    }

    let failed = status & (StatusEvents::RX_ERROR | StatusEvents::RX_TIMEOUT);
    if !failed.is_empty() {
        radio.write_status(failed)?;
        sink.on_radio_event(radio, RadioEvent::ReceiveError(failed))?;
        return Ok(IrqOutcome::Delivered);
    }

    Ok(IrqOutcome::Spurious)
}

/// Source of IRQ line assertions.
pub trait IrqLine {
    /// Block until the line asserts. Returns false once the line is gone.
    fn wait(&mut self) -> bool;
}

impl IrqLine for Receiver<()> {
    fn wait(&mut self) -> bool {
        self.recv().is_ok()
    }
}

/// Interrupt task: service the radio each time the line asserts.
///
/// Runs until the line closes. Driver errors are logged and the task keeps
/// going, since the next assertion may well succeed.
pub fn run_irq_task<R, S, L>(line: &mut L, radio: &RadioCell<R>, sink: &mut S)
where
    R: RadioDriver,
    S: EventSink<R>,
    L: IrqLine + ?Sized,
{
    while line.wait() {
        match radio.with(|r| service_irq(r, sink)) {
            Ok(IrqOutcome::Spurious) => debug!("Spurious radio interrupt"),
            Ok(_) => {}
            Err(e) => warn!("Radio interrupt service failed: {}", e),
        }
    }
    info!("IRQ line closed, interrupt task exiting");
}
