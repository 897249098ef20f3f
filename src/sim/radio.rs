use super::air::{Air, NodeId, Transmission};
use super::clock::VirtualClock;
use crate::lpl::config::{FCS_LEN, MAX_FRAME_LEN};
use crate::lpl::duty_cycle::DutyCycleTimeline;
use crate::lpl::scheduler::{SleepPlan, SleepScheduler};
use crate::lpl::timing::{pac_duration_ns, uus_to_us, FrameTiming};
use crate::radio::{PhyConfig, RadioDriver, RadioError, SleepMode, StatusEvents, WakeSource};

/// Calibration divisor of a nominal 10 kHz low-power oscillator.
pub const DEFAULT_OSC_DIVISOR: u16 = 1920;

/// Delay between the start command and the first preamble symbol.
pub const DEFAULT_TX_TURNAROUND_NS: u64 = 60_000;

/// Crystal start-up after a chip-select wake.
pub const DEFAULT_WAKE_LATENCY_NS: u64 = 3_000_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ChipState {
    Idle,
    Transmitting {
        end_ns: Option<u64>,
    },
    Receiving {
        from_ns: u64,
        deadline_ns: Option<u64>,
    },
    Sleeping {
        since_ns: u64,
        wake: WakeSource,
        listening: bool,
    },
}

/// Register values written through [`RadioDriver`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SimRegisters {
    pub phy: Option<PhyConfig>,
    pub leds: bool,
    pub rx_timeout_uus: u16,
    pub sleep_counter: u16,
    pub snooze_ticks: u8,
    pub preamble_detect_timeout: u16,
    pub low_power_listening: bool,
    pub sleep_mode: Option<(SleepMode, WakeSource)>,
}

/// Simulated DW1000-class transceiver.
///
/// Transmissions go onto the shared [`Air`]; reception looks for other
/// nodes' preambles there. A low-power listening chip runs its duty cycle
/// in virtual time through [`SimRadio::run_until_irq`]. The FCS of
/// transmitted frames is left as zero bytes since frames are never
/// corrupted.
#[derive(Debug)]
pub struct SimRadio {
    node: NodeId,
    clock: VirtualClock,
    air: Air,
    phy: PhyConfig,
    regs: SimRegisters,
    state: ChipState,
    status: StatusEvents,
    rx_frame: Vec<u8>,
    tx_frame: Vec<u8>,
    osc_divisor: u16,
    tx_turnaround_ns: u64,
    wake_latency_ns: u64,
    tx_stuck: bool,
    fail_init: bool,
    frame_reads: u32,
    chip_select_wakes: u32,
}

impl SimRadio {
    pub fn new(node: NodeId, clock: VirtualClock, air: Air) -> Self {
        Self {
            node,
            clock,
            air,
            phy: PhyConfig::default(),
            regs: SimRegisters::default(),
            state: ChipState::Idle,
            status: StatusEvents::empty(),
            rx_frame: Vec::new(),
            tx_frame: Vec::new(),
            osc_divisor: DEFAULT_OSC_DIVISOR,
            tx_turnaround_ns: DEFAULT_TX_TURNAROUND_NS,
            wake_latency_ns: DEFAULT_WAKE_LATENCY_NS,
            tx_stuck: false,
            fail_init: false,
            frame_reads: 0,
            chip_select_wakes: 0,
        }
    }

    pub fn node(&self) -> NodeId {
        self.node
    }

    pub fn clock(&self) -> &VirtualClock {
        &self.clock
    }

    pub fn set_osc_divisor(&mut self, divisor: u16) {
        self.osc_divisor = divisor;
    }

    pub fn set_tx_turnaround_ns(&mut self, ns: u64) {
        self.tx_turnaround_ns = ns;
    }

    pub fn set_wake_latency_ns(&mut self, ns: u64) {
        self.wake_latency_ns = ns;
    }

    /// Transmissions never complete while set.
    pub fn set_tx_stuck(&mut self, stuck: bool) {
        self.tx_stuck = stuck;
    }

    /// Make [`RadioDriver::initialise`] fail.
    pub fn set_fail_init(&mut self, fail: bool) {
        self.fail_init = fail;
    }

    pub fn registers(&self) -> SimRegisters {
        self.regs
    }

    /// Status register as is, without advancing the chip.
    pub fn status(&self) -> StatusEvents {
        self.status
    }

    /// Number of receive buffer reads so far.
    pub fn frame_reads(&self) -> u32 {
        self.frame_reads
    }

    pub fn chip_select_wakes(&self) -> u32 {
        self.chip_select_wakes
    }

    pub fn is_sleeping(&self) -> bool {
        matches!(self.state, ChipState::Sleeping { .. })
    }

    /// Asleep and duty cycling on its own.
    pub fn is_listening(&self) -> bool {
        matches!(self.state, ChipState::Sleeping { listening: true, .. })
    }

    /// Pretend a frame with good CRC was just received.
    pub fn deliver_frame(&mut self, frame: &[u8]) {
        self.rx_frame = frame.to_vec();
        self.status |= StatusEvents::RX_GOOD_FRAME;
        self.state = ChipState::Idle;
    }

    /// Pretend reception failed with the given status bits.
    pub fn deliver_error(&mut self, status: StatusEvents) {
        self.status |= status;
        self.state = ChipState::Idle;
    }

    /// Duty-cycle timeline of the programmed registers.
    pub fn timeline(&self) -> Option<DutyCycleTimeline> {
        let scheduler = SleepScheduler::from_divisor(self.osc_divisor).ok()?;
        let plan = SleepPlan {
            long_sleep_ticks: self.regs.sleep_counter,
            snooze_ticks: self.regs.snooze_ticks,
            sniff_pacs: self.regs.preamble_detect_timeout.saturating_add(1),
        };
        Some(DutyCycleTimeline::new(&scheduler, &plan, &self.phy))
    }

    /// Run the low-power listening duty cycle until a sniff catches a
    /// preamble or virtual time reaches `until_ns`.
    ///
    /// On a catch the frame is received to its end, the clock moves there
    /// and the end time is returned; the chip is then idle with
    /// `RX_GOOD_FRAME` set, as the interrupt would find it. Returns `None`
    /// (with the clock at `until_ns`) otherwise, including when the chip
    /// is not duty cycling.
    pub fn run_until_irq(&mut self, until_ns: u64) -> Option<u64> {
        let ChipState::Sleeping {
            since_ns,
            listening: true,
            ..
        } = self.state
        else {
            self.clock.advance_to(until_ns);
            return None;
        };
        let Some(timeline) = self.timeline() else {
            self.clock.advance_to(until_ns);
            return None;
        };
        let period = timeline.period_ns().max(1);
        let pac = pac_duration_ns(&self.phy);
        let now = self.clock.now_ns();

        let mut cycle = now.saturating_sub(since_ns) / period;
        loop {
            let windows = timeline.sniff_windows(since_ns + cycle * period);
            if windows[0].0 >= until_ns {
                break;
            }
            for (start, end) in windows {
                if end <= now {
                    continue;
                }
                if start >= until_ns {
                    break;
                }
                if let Some(tx) = self.air.preamble_in_window(self.node, start, end, pac) {
                    let done = tx.end_ns.max(start);
                    self.clock.advance_to(done);
                    self.receive(tx);
                    return Some(done);
                }
            }
            cycle += 1;
        }

        self.clock.advance_to(until_ns);
        None
    }

    fn receive(&mut self, tx: Transmission) {
        self.rx_frame = tx.frame;
        self.status |= StatusEvents::RX_GOOD_FRAME;
        self.state = ChipState::Idle;
    }

    /// Advance transmit/receive activity to the current virtual time.
    fn update(&mut self) {
        let now = self.clock.now_ns();
        match self.state {
            ChipState::Transmitting {
                end_ns: Some(end_ns),
            } if now >= end_ns => {
                self.status |= StatusEvents::TX_DONE;
                self.state = ChipState::Idle;
            }
            ChipState::Receiving {
                from_ns,
                deadline_ns,
            } => {
                let horizon = deadline_ns.map_or(now, |d| d.min(now));
                let pac = pac_duration_ns(&self.phy);
                match self.air.preamble_in_window(self.node, from_ns, horizon, pac) {
                    Some(tx) if now >= tx.end_ns => self.receive(tx),
                    Some(_) => {}
                    None => {
                        if deadline_ns.is_some_and(|d| now >= d) {
                            self.status |= StatusEvents::RX_FRAME_WAIT_TIMEOUT;
                            self.state = ChipState::Idle;
                        }
                    }
                }
            }
            _ => {}
        }
    }

    fn ensure_awake(&self) -> Result<(), RadioError> {
        if self.is_sleeping() {
            return Err(RadioError::NotAwake);
        }
        Ok(())
    }
}

impl RadioDriver for SimRadio {
    fn initialise(&mut self) -> Result<(), RadioError> {
        if self.fail_init {
            return Err(RadioError::InitFailed);
        }
        self.state = ChipState::Idle;
        Ok(())
    }

    fn soft_reset(&mut self) -> Result<(), RadioError> {
        self.regs = SimRegisters::default();
        self.phy = PhyConfig::default();
        self.status = StatusEvents::empty();
        self.state = ChipState::Idle;
        Ok(())
    }

    fn configure(&mut self, phy: &PhyConfig) -> Result<(), RadioError> {
        self.phy = *phy;
        self.regs.phy = Some(*phy);
        Ok(())
    }

    fn set_leds(&mut self, enable: bool) -> Result<(), RadioError> {
        self.regs.leds = enable;
        Ok(())
    }

    fn enable_rx(&mut self) -> Result<(), RadioError> {
        self.ensure_awake()?;
        let now = self.clock.now_ns();
        let deadline_ns = match self.regs.rx_timeout_uus {
            0 => None,
            uus => Some(now + uus_to_us(uus as u32) * 1000),
        };
        self.state = ChipState::Receiving {
            from_ns: now,
            deadline_ns,
        };
        Ok(())
    }

    fn set_rx_timeout(&mut self, uus: u16) -> Result<(), RadioError> {
        self.regs.rx_timeout_uus = uus;
        Ok(())
    }

    fn read_status(&mut self) -> Result<StatusEvents, RadioError> {
        self.update();
        Ok(self.status)
    }

    fn write_status(&mut self, clear: StatusEvents) -> Result<(), RadioError> {
        self.status.remove(clear);
        Ok(())
    }

    fn read_frame_length(&mut self) -> Result<usize, RadioError> {
        Ok(self.rx_frame.len())
    }

    fn read_frame(&mut self, buf: &mut [u8], offset: usize) -> Result<(), RadioError> {
        let src = self
            .rx_frame
            .get(offset..offset + buf.len())
            .ok_or_else(|| RadioError::Bus("read past end of receive buffer".into()))?;
        buf.copy_from_slice(src);
        self.frame_reads += 1;
        Ok(())
    }

    fn write_frame(&mut self, frame: &[u8], offset: usize) -> Result<(), RadioError> {
        let len = offset + frame.len() + FCS_LEN;
        if len > MAX_FRAME_LEN {
            return Err(RadioError::FrameTooLong {
                len,
                max: MAX_FRAME_LEN,
            });
        }
        self.tx_frame.resize(offset, 0);
        self.tx_frame.extend_from_slice(frame);
        Ok(())
    }

    fn start_tx(&mut self) -> Result<(), RadioError> {
        self.ensure_awake()?;
        if self.tx_stuck {
            self.state = ChipState::Transmitting { end_ns: None };
            return Ok(());
        }

        let mut frame = self.tx_frame.clone();
        frame.extend_from_slice(&[0u8; FCS_LEN]);
        let timing = FrameTiming::for_frame(&self.phy, frame.len());
        let start_ns = self.clock.now_ns() + self.tx_turnaround_ns;
        let end_ns = start_ns + timing.airtime_ns();

        self.air.transmit(Transmission {
            sender: self.node,
            start_ns,
            preamble_end_ns: start_ns + timing.preamble_ns,
            end_ns,
            frame,
        });
        self.state = ChipState::Transmitting {
            end_ns: Some(end_ns),
        };
        Ok(())
    }

    fn enter_sleep(&mut self, mode: SleepMode, wake: WakeSource) -> Result<(), RadioError> {
        let listening = self.regs.low_power_listening
            && mode.contains(SleepMode::RX_ON_WAKE)
            && wake.contains(WakeSource::SLEEP_COUNTER | WakeSource::SLEEP_ENABLE);
        self.regs.sleep_mode = Some((mode, wake));
        self.state = ChipState::Sleeping {
            since_ns: self.clock.now_ns(),
            wake,
            listening,
        };
        Ok(())
    }

    fn wake_via_chip_select(&mut self, dummy: &mut [u8]) -> Result<(), RadioError> {
        if dummy.is_empty() {
            return Err(RadioError::Bus("empty chip-select wake buffer".into()));
        }
        let ChipState::Sleeping { wake, .. } = self.state else {
            return Ok(());
        };
        if !wake.contains(WakeSource::CHIP_SELECT) {
            return Err(RadioError::Bus("chip-select wake not enabled".into()));
        }
        self.clock.advance_ns(self.wake_latency_ns);
        self.state = ChipState::Idle;
        self.chip_select_wakes += 1;
        Ok(())
    }

    fn calibrate_sleep_oscillator(&mut self) -> Result<u16, RadioError> {
        self.ensure_awake()?;
        Ok(self.osc_divisor)
    }

    fn set_sleep_counter(&mut self, ticks: u16) -> Result<(), RadioError> {
        self.regs.sleep_counter = ticks;
        Ok(())
    }

    fn set_snooze_ticks(&mut self, ticks: u8) -> Result<(), RadioError> {
        self.regs.snooze_ticks = ticks;
        Ok(())
    }

    fn set_preamble_detect_timeout(&mut self, pacs: u16) -> Result<(), RadioError> {
        self.regs.preamble_detect_timeout = pacs;
        Ok(())
    }

    fn set_low_power_listening(&mut self, enable: bool) -> Result<(), RadioError> {
        self.regs.low_power_listening = enable;
        Ok(())
    }
}
