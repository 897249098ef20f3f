//! Sleeping listener.
//!
//! The listener is split along the two execution contexts:
//!
//! - [`LowPowerListenIsr`] is the [`EventSink`] on the interrupt path. It
//!   screens every frame the duty cycle catches. Anything that is not a
//!   wake frame from our waker sends the radio straight back to duty
//!   cycling. A wake frame is posted to the mailbox and the radio is left
//!   idle for the main loop.
//! - [`DutyCycleListener`] is the main loop. It arms the duty cycle at
//!   boot, and for each captured frame sleeps out the rest of the burst,
//!   answers if the burst was for us, and re-arms.
//!
//! The mailbox lease is what hands the radio back and forth: while the main
//! loop holds a captured frame, the interrupt path keeps its hands off.

use super::config::{ConfigError, ListenerConfig, CHIP_SELECT_WAKE_LEN};
use super::duty_cycle::DutyCycleTimeline;
use super::frame::{InteractionFrame, WakeFrame};
use super::rendezvous::{Disposition, RendezvousDecision, RendezvousEvaluator, Screening};
use super::scheduler::{SleepPlan, SleepScheduler};
use crate::mailbox::{mailbox, Lease, MailboxReceiver, MailboxSender};
use crate::platform::{Delay, RadioCell};
use crate::radio::{
    wait_for_events, EventSink, RadioDriver, RadioError, RadioEvent, SleepMode, StatusEvents,
    WakeSource,
};
use crate::stats::ListenerCounters;
use log::{debug, info, warn};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;

/// Sleep configuration for duty cycling: keep config, sniff on wake.
pub const DUTY_CYCLE_SLEEP: SleepMode = SleepMode::PRESERVE_SLEEP
    .union(SleepMode::PRESERVE_CONFIG)
    .union(SleepMode::RX_ON_WAKE);
pub const DUTY_CYCLE_WAKE: WakeSource = WakeSource::SLEEP_COUNTER.union(WakeSource::SLEEP_ENABLE);

/// Sleep configuration while the main loop sleeps out a burst.
pub const MANUAL_SLEEP: SleepMode = SleepMode::PRESERVE_SLEEP.union(SleepMode::PRESERVE_CONFIG);
pub const MANUAL_WAKE: WakeSource = WakeSource::CHIP_SELECT.union(WakeSource::SLEEP_ENABLE);

/// Pending receive events discarded when duty cycling resumes.
const STALE_EVENTS: StatusEvents = StatusEvents::RX_GOOD_FRAME
    .union(StatusEvents::RX_ERROR)
    .union(StatusEvents::RX_TIMEOUT);

/// How long [`DutyCycleListener::run`] waits on the mailbox per iteration.
const IDLE_WAIT: Duration = Duration::from_secs(1);

fn resume_duty_cycle<R: RadioDriver + ?Sized>(radio: &mut R) -> Result<(), RadioError> {
    radio.set_low_power_listening(true)?;
    radio.enter_sleep(DUTY_CYCLE_SLEEP, DUTY_CYCLE_WAKE)
}

/// Interrupt-side half of the listener.
pub struct LowPowerListenIsr {
    evaluator: RendezvousEvaluator,
    outbox: MailboxSender<WakeFrame>,
    counters: Arc<ListenerCounters>,
}

impl<R: RadioDriver + ?Sized> EventSink<R> for LowPowerListenIsr {
    fn owns_radio(&self) -> bool {
        self.outbox.is_vacant()
    }

    fn on_deferred(&mut self) {
        self.counters.record_busy();
        debug!("Radio event while a wake frame is pending, left for the main loop");
    }

    fn on_radio_event(&mut self, radio: &mut R, event: RadioEvent<'_>) -> Result<(), RadioError> {
        let screening = match event {
            RadioEvent::FrameReceived(frame) => self.evaluator.screen(frame),
            RadioEvent::FrameOversize(len) => self.evaluator.reject_oversize(len),
            RadioEvent::ReceiveError(status) => {
                self.counters.record_rx_error();
                debug!("Receive error {:?}, back to duty cycling", status);
                return resume_duty_cycle(radio);
            }
        };

        match screening {
            Screening::Captured(frame) => {
                if self.outbox.try_post(frame).is_err() {
                    // Main loop holds the radio
                    self.counters.record_busy();
                    return Ok(());
                }
                self.counters.record_capture();
                debug!(
                    "Captured wake frame seq {} for {} countdown {}",
                    frame.seq_no, frame.dest_addr, frame.countdown
                );
                Ok(())
            }
            Screening::Dropped { decision, reason } => {
                self.counters.record_drop(reason);
                debug!("Dropped frame ({:?}, {:?})", decision, reason);
                resume_duty_cycle(radio)
            }
        }
    }
}

/// What the main loop did with one captured wake frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RendezvousReport {
    pub disposition: Disposition,
    /// Sequence number of the captured wake frame.
    pub wake_seq_no: u8,
    /// Sequence number of the interaction frame, if one was sent and confirmed.
    pub interaction_seq: Option<u8>,
}

/// Main-loop half of the listener.
pub struct DutyCycleListener {
    config: ListenerConfig,
    evaluator: RendezvousEvaluator,
    inbox: MailboxReceiver<WakeFrame>,
    counters: Arc<ListenerCounters>,
    scheduler: Option<SleepScheduler>,
    plan: Option<SleepPlan>,
    /// Whether the radio is idle at crystal speed and ours to drive.
    radio_awake: bool,
    interaction_seq: u8,
    wake_buf: Vec<u8>,
}

impl DutyCycleListener {
    /// Create the listener and its interrupt-side sink.
    pub fn new(config: ListenerConfig) -> Result<(Self, LowPowerListenIsr), ConfigError> {
        config.validate()?;
        let evaluator = RendezvousEvaluator::new(&config);
        let counters = Arc::new(ListenerCounters::new());
        let (outbox, inbox) = mailbox();

        let listener = Self {
            config,
            evaluator,
            inbox,
            counters: Arc::clone(&counters),
            scheduler: None,
            plan: None,
            radio_awake: true,
            interaction_seq: 0,
            wake_buf: vec![0u8; CHIP_SELECT_WAKE_LEN],
        };
        let isr = LowPowerListenIsr {
            evaluator,
            outbox,
            counters,
        };
        Ok((listener, isr))
    }

    pub fn config(&self) -> &ListenerConfig {
        &self.config
    }

    pub fn counters(&self) -> Arc<ListenerCounters> {
        Arc::clone(&self.counters)
    }

    pub fn sleep_plan(&self) -> Option<SleepPlan> {
        self.plan
    }

    /// Duty-cycle timeline of the current plan.
    pub fn timeline(&self) -> Option<DutyCycleTimeline> {
        match (self.scheduler, self.plan) {
            (Some(scheduler), Some(plan)) => {
                Some(DutyCycleTimeline::new(&scheduler, &plan, &self.config.phy))
            }
            _ => None,
        }
    }

    /// Sequence number the next interaction frame will carry.
    pub fn next_interaction_seq(&self) -> u8 {
        self.interaction_seq
    }

    /// Boot configuration: PHY, sleep plan, then start duty cycling.
    ///
    /// The radio must be initialised and awake.
    pub fn arm<R: RadioDriver + ?Sized>(&mut self, radio: &mut R) -> Result<SleepPlan, RadioError> {
        radio.configure(&self.config.phy)?;
        radio.set_leds(true)?;
        self.radio_awake = true;

        let plan = self.reconfigure(radio)?;
        self.start_duty_cycle(radio)?;
        info!(
            "Listener {} armed: sleep {} ticks, snooze {}, sniff {} PACs",
            self.config.local_address, plan.long_sleep_ticks, plan.snooze_ticks, plan.sniff_pacs
        );
        Ok(plan)
    }

    /// Recalibrate the sleep oscillator and reprogram the sleep plan.
    ///
    /// Only valid while the listener holds the radio awake (before arming,
    /// or between wake-up and re-arm). Otherwise returns
    /// [`RadioError::NotAwake`].
    pub fn reconfigure<R: RadioDriver + ?Sized>(&mut self, radio: &mut R) -> Result<SleepPlan, RadioError> {
        if !self.radio_awake {
            return Err(RadioError::NotAwake);
        }
        let scheduler = SleepScheduler::calibrate(radio)?;
        let plan = scheduler.plan(&self.config);
        plan.apply(radio)?;
        self.scheduler = Some(scheduler);
        self.plan = Some(plan);
        Ok(plan)
    }

    fn start_duty_cycle<R: RadioDriver + ?Sized>(&mut self, radio: &mut R) -> Result<(), RadioError> {
        radio.write_status(STALE_EVENTS)?;
        resume_duty_cycle(radio)?;
        self.radio_awake = false;
        Ok(())
    }

    /// Dispose of a captured frame if there is one.
    pub fn poll<R, D>(&mut self, radio: &mut R, delay: &mut D) -> Result<Option<RendezvousReport>, RadioError>
    where
        R: RadioDriver + ?Sized,
        D: Delay + ?Sized,
    {
        match self.inbox.try_take() {
            Some(lease) => self.dispose(radio, delay, lease).map(Some),
            None => Ok(None),
        }
    }

    /// Wait up to `timeout` for a captured frame and dispose of it.
    pub fn wait_and_dispose<R, D>(
        &mut self,
        radio: &RadioCell<R>,
        delay: &mut D,
        timeout: Duration,
    ) -> Result<Option<RendezvousReport>, RadioError>
    where
        R: RadioDriver,
        D: Delay + ?Sized,
    {
        let Some(lease) = self.inbox.recv_timeout(timeout) else {
            return Ok(None);
        };
        radio.with(|r| self.dispose(r, delay, lease)).map(Some)
    }

    /// Main loop. Never returns.
    pub fn run<R, D>(&mut self, radio: &RadioCell<R>, delay: &mut D) -> !
    where
        R: RadioDriver,
        D: Delay + ?Sized,
    {
        loop {
            match self.wait_and_dispose(radio, delay, IDLE_WAIT) {
                Ok(_) => {}
                Err(e) => {
                    warn!("Wake frame disposition failed: {}", e);
                    if let Err(e) = radio.with(|r| self.recover(r)) {
                        warn!("Failed to resume duty cycling: {}", e);
                    }
                }
            }
        }
    }

    /// Bring the radio back to duty cycling after a failed disposition.
    pub fn recover<R: RadioDriver + ?Sized>(&mut self, radio: &mut R) -> Result<(), RadioError> {
        if let Err(e) = radio.wake_via_chip_select(&mut self.wake_buf) {
            debug!("Chip-select wake during recovery failed: {}", e);
        }
        self.radio_awake = true;
        self.start_duty_cycle(radio)
    }

    fn dispose<R, D>(
        &mut self,
        radio: &mut R,
        delay: &mut D,
        lease: Lease<WakeFrame>,
    ) -> Result<RendezvousReport, RadioError>
    where
        R: RadioDriver + ?Sized,
        D: Delay + ?Sized,
    {
        let frame = *lease;
        self.radio_awake = true;

        let disposition = self.evaluator.evaluate(&frame);
        self.counters.record_decision(disposition.decision);
        debug!(
            "Wake frame seq {} countdown {}: {:?}, sleeping {} ms",
            frame.seq_no, frame.countdown, disposition.decision, disposition.sleep_ms
        );

        radio.enter_sleep(MANUAL_SLEEP, MANUAL_WAKE)?;
        self.radio_awake = false;
        delay.sleep_ms(disposition.sleep_ms);
        radio.wake_via_chip_select(&mut self.wake_buf)?;
        self.radio_awake = true;

        let interaction_seq = match disposition.decision {
            RendezvousDecision::AddressedToMe => self.send_interaction(radio, delay)?,
            _ => None,
        };

        self.start_duty_cycle(radio)?;
        lease.release();

        Ok(RendezvousReport {
            disposition,
            wake_seq_no: frame.seq_no,
            interaction_seq,
        })
    }

    fn send_interaction<R, D>(&mut self, radio: &mut R, delay: &mut D) -> Result<Option<u8>, RadioError>
    where
        R: RadioDriver + ?Sized,
        D: Delay + ?Sized,
    {
        let seq = self.interaction_seq;
        let frame = InteractionFrame::new(
            seq,
            self.config.pan_id,
            self.config.waker_address,
            self.config.local_address,
        );
        radio.write_frame(&frame.encode(), 0)?;
        radio.start_tx()?;

        match wait_for_events(radio, delay, StatusEvents::TX_DONE, self.config.tx_timeout_us)? {
            Some(_) => {
                radio.write_status(StatusEvents::TX_DONE)?;
                self.interaction_seq = seq.wrapping_add(1);
                self.counters.record_interaction();
                info!("Sent interaction frame seq {} to {}", seq, self.config.waker_address);
                Ok(Some(seq))
            }
            None => {
                self.counters.record_tx_timeout();
                warn!(
                    "Interaction frame seq {} not confirmed within {} us",
                    seq, self.config.tx_timeout_us
                );
                Ok(None)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lpl::config::{
        DEFAULT_PAN_ID, INTERACTION_CEILING_MS, LISTENER_ADDRESS, MAX_FRAME_LEN, WAKER_ADDRESS,
    };
    use crate::lpl::frame::ShortAddress;
    use crate::radio::service_irq;
    use crate::sim::{Air, SimDelay, SimRadio, VirtualClock};

    struct Bench {
        radio: SimRadio,
        delay: SimDelay,
        listener: DutyCycleListener,
        isr: LowPowerListenIsr,
        air: Air,
    }

    fn bench() -> Bench {
        let clock = VirtualClock::new();
        let air = Air::new();
        let mut radio = SimRadio::new(2, clock.clone(), air.clone());
        let (mut listener, isr) = DutyCycleListener::new(ListenerConfig::default()).unwrap();
        listener.arm(&mut radio).unwrap();
        Bench {
            radio,
            delay: SimDelay::new(clock),
            listener,
            isr,
            air,
        }
    }

    fn wake_bytes(dest: ShortAddress, countdown: u16) -> Vec<u8> {
        let mut frame = WakeFrame::new(DEFAULT_PAN_ID, dest, WAKER_ADDRESS);
        frame.countdown = countdown;
        let mut bytes = frame.encode().to_vec();
        bytes.extend_from_slice(&[0, 0]);
        bytes
    }

    impl Bench {
        fn receive(&mut self, frame: &[u8]) {
            self.radio.deliver_frame(frame);
            service_irq(&mut self.radio, &mut self.isr).unwrap();
        }

        fn step(&mut self) -> Option<RendezvousReport> {
            self.listener.poll(&mut self.radio, &mut self.delay).unwrap()
        }
    }

    #[test]
    fn test_arm_programs_duty_cycle() {
        let bench = bench();
        let regs = bench.radio.registers();
        assert_eq!(regs.sleep_counter, 3);
        assert_eq!(regs.snooze_ticks, 4);
        assert_eq!(regs.preamble_detect_timeout, 2);
        assert!(regs.low_power_listening);
        assert_eq!(regs.sleep_mode, Some((DUTY_CYCLE_SLEEP, DUTY_CYCLE_WAKE)));
        assert!(bench.radio.is_listening());
        assert_eq!(bench.listener.sleep_plan().map(|p| p.snooze_ticks), Some(4));
    }

    #[test]
    fn test_reconfigure_refused_while_duty_cycling() {
        let mut bench = bench();
        assert_eq!(
            bench.listener.reconfigure(&mut bench.radio),
            Err(RadioError::NotAwake)
        );
    }

    #[test]
    fn test_addressed_frame_sends_one_interaction() {
        let mut bench = bench();
        bench.receive(&wake_bytes(LISTENER_ADDRESS, 100));
        assert!(!bench.radio.is_sleeping());

        let report = bench.step().unwrap();
        assert_eq!(report.disposition.decision, RendezvousDecision::AddressedToMe);
        assert_eq!(report.interaction_seq, Some(0));
        assert_eq!(bench.delay.sleeps(), &[113]);

        let sent = bench.air.sent_by(2);
        assert_eq!(sent.len(), 1);
        let reply = InteractionFrame::decode(&sent[0].frame).unwrap();
        assert_eq!(reply.dest_addr, WAKER_ADDRESS);
        assert_eq!(reply.src_addr, LISTENER_ADDRESS);
        assert_eq!(reply.seq_no, 0);

        assert!(bench.radio.is_listening());
        assert_eq!(bench.listener.counters().snapshot().interactions_sent, 1);
    }

    #[test]
    fn test_interaction_seq_increments_and_wraps() {
        let mut bench = bench();
        bench.listener.interaction_seq = 254;
        let mut seqs = Vec::new();
        for _ in 0..3 {
            bench.receive(&wake_bytes(LISTENER_ADDRESS, 0));
            seqs.push(bench.step().unwrap().interaction_seq.unwrap());
        }
        assert_eq!(seqs, vec![254, 255, 0]);
        assert_eq!(bench.air.sent_by(2).len(), 3);
    }

    #[test]
    fn test_not_addressed_stays_silent() {
        let mut bench = bench();
        bench.receive(&wake_bytes(ShortAddress(0x5200), 100));

        let report = bench.step().unwrap();
        assert_eq!(report.disposition.decision, RendezvousDecision::NotAddressed);
        assert_eq!(report.interaction_seq, None);
        assert!(bench.air.sent_by(2).is_empty());
        assert!(bench.delay.sleeps()[0] >= report.disposition.remaining_ms + INTERACTION_CEILING_MS);
        assert!(bench.radio.is_listening());
    }

    #[test]
    fn test_wrong_length_never_captured() {
        let mut bench = bench();
        let mut frame = wake_bytes(LISTENER_ADDRESS, 5);
        frame.push(0);
        bench.receive(&frame);

        assert!(bench.step().is_none());
        assert!(bench.radio.is_listening());
        let stats = bench.listener.counters().snapshot();
        assert_eq!(stats.dropped_wrong_length, 1);
        assert_eq!(stats.captured, 0);
    }

    #[test]
    fn test_signature_mismatch_dropped() {
        let mut bench = bench();
        let mut frame = wake_bytes(LISTENER_ADDRESS, 5);
        frame[3] = 0x00;
        bench.receive(&frame);

        assert!(bench.step().is_none());
        assert!(bench.radio.is_listening());
        assert_eq!(bench.listener.counters().snapshot().dropped_signature, 1);
    }

    #[test]
    fn test_max_length_frame_classified_oversize_rejected() {
        let mut bench = bench();
        bench.receive(&[0x41; MAX_FRAME_LEN]);
        assert_eq!(bench.radio.frame_reads(), 1);
        bench.receive(&[0x41; MAX_FRAME_LEN + 1]);
        assert_eq!(bench.radio.frame_reads(), 1);

        assert!(bench.radio.is_listening());
        let stats = bench.listener.counters().snapshot();
        assert_eq!(stats.dropped_wrong_length, 1);
        assert_eq!(stats.dropped_oversize, 1);
    }

    #[test]
    fn test_receive_error_resumes() {
        let mut bench = bench();
        bench.radio.deliver_error(StatusEvents::RX_PHY_HEADER_ERROR);
        service_irq(&mut bench.radio, &mut bench.isr).unwrap();

        assert!(bench.radio.is_listening());
        assert_eq!(bench.listener.counters().snapshot().rx_errors, 1);
    }

    #[test]
    fn test_second_frame_while_pending_is_left_alone() {
        let mut bench = bench();
        bench.receive(&wake_bytes(LISTENER_ADDRESS, 50));
        bench.receive(&wake_bytes(LISTENER_ADDRESS, 49));

        let stats = bench.listener.counters().snapshot();
        assert_eq!(stats.captured, 1);
        assert_eq!(stats.dropped_busy, 1);

        let report = bench.step().unwrap();
        assert_eq!(report.disposition.countdown, 50);
        // The pending event was discarded when duty cycling resumed
        assert!(bench.step().is_none());
        assert!(bench.radio.status().is_empty());
    }

    #[test]
    fn test_tx_timeout_counted_and_resumed() {
        let mut bench = bench();
        bench.radio.set_tx_stuck(true);
        bench.receive(&wake_bytes(LISTENER_ADDRESS, 0));

        let report = bench.step().unwrap();
        assert_eq!(report.interaction_seq, None);
        assert_eq!(bench.listener.next_interaction_seq(), 0);
        assert_eq!(bench.listener.counters().snapshot().tx_timeouts, 1);
        assert!(bench.radio.is_listening());
    }

    #[test]
    fn test_recover_rearms() {
        let mut bench = bench();
        bench.radio.enter_sleep(MANUAL_SLEEP, MANUAL_WAKE).unwrap();
        bench.listener.recover(&mut bench.radio).unwrap();
        assert!(bench.radio.is_listening());
    }
}
