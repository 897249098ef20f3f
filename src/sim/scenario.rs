use super::air::Air;
use super::clock::{SimDelay, VirtualClock};
use super::radio::SimRadio;
use crate::lpl::config::{ConfigError, ListenerConfig, WakerConfig};
use crate::lpl::duty_cycle::worst_case_period_us;
use crate::lpl::frame::ShortAddress;
use crate::lpl::listener::{DutyCycleListener, LowPowerListenIsr, RendezvousReport};
use crate::lpl::scheduler::SleepPlan;
use crate::lpl::timing::uus_to_us;
use crate::lpl::waker::{BurstReport, RendezvousOutcome, WakeSequencer};
use crate::radio::{service_irq, RadioDriver, RadioError};
use crate::stats::{ListenerStats, WakerStats};
use log::info;
use serde::{Deserialize, Serialize};
use std::fmt;

const WAKER_NODE: u32 = 1;
const LISTENER_NODE: u32 = 2;

/// How far past the waker's receive window the listener is run.
const WINDOW_SLACK_NS: u64 = 10_000_000;

/// Scenario parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimConfig {
    pub listener: ListenerConfig,
    pub waker: WakerConfig,
    /// Number of wake cycles to run.
    pub bursts: u32,
    /// Offset of the first burst into the listener's duty cycle. `None`
    /// means aligned with the start of a cycle.
    pub listener_phase_us: Option<u64>,
    /// Listener run time before the first burst.
    pub lead_in_ms: u32,
    pub osc_divisor: u16,
    pub tx_turnaround_ns: u64,
    pub wake_latency_us: u32,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            listener: ListenerConfig::default(),
            waker: WakerConfig {
                alternate_target: Some(ShortAddress(0x5200)),
                ..Default::default()
            },
            bursts: 4,
            listener_phase_us: None,
            lead_in_ms: 2000,
            osc_divisor: super::radio::DEFAULT_OSC_DIVISOR,
            tx_turnaround_ns: super::radio::DEFAULT_TX_TURNAROUND_NS,
            wake_latency_us: 3000,
        }
    }
}

/// Errors from setting up or running a scenario.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScenarioError {
    Config(ConfigError),
    Radio(RadioError),
}

impl fmt::Display for ScenarioError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScenarioError::Config(e) => write!(f, "configuration error: {}", e),
            ScenarioError::Radio(e) => write!(f, "radio error: {}", e),
        }
    }
}

impl std::error::Error for ScenarioError {}

impl From<ConfigError> for ScenarioError {
    fn from(e: ConfigError) -> Self {
        ScenarioError::Config(e)
    }
}

impl From<RadioError> for ScenarioError {
    fn from(e: RadioError) -> Self {
        ScenarioError::Radio(e)
    }
}

/// A wake frame the listener captured and disposed of.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CaptureRecord {
    /// Listener time at which the captured frame ended.
    pub captured_at_ns: u64,
    pub report: RendezvousReport,
}

/// One wake cycle as seen from both nodes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CycleRecord {
    pub index: u32,
    pub burst_start_ns: u64,
    /// Waker time at which the last frame was confirmed sent.
    pub burst_end_ns: u64,
    pub burst: BurstReport,
    pub captures: Vec<CaptureRecord>,
    pub outcome: RendezvousOutcome,
}

/// Result of [`Scenario::run`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SimReport {
    pub phase_us: u64,
    pub listener_period_ns: u64,
    pub sleep_plan: Option<SleepPlan>,
    pub cycles: Vec<CycleRecord>,
    pub listener: ListenerStats,
    pub waker: WakerStats,
}

/// One waker and one listener sharing the air.
pub struct Scenario {
    config: SimConfig,
    air: Air,
    waker: WakeSequencer,
    waker_radio: SimRadio,
    waker_delay: SimDelay,
    listener: DutyCycleListener,
    isr: LowPowerListenIsr,
    listener_radio: SimRadio,
    listener_delay: SimDelay,
    cycles_run: u32,
}

impl Scenario {
    /// Boot both nodes. The listener arms at time zero; the waker's first
    /// burst starts `lead_in_ms` plus the configured phase later.
    pub fn new(config: SimConfig) -> Result<Self, ScenarioError> {
        let air = Air::new();
        let phase_us = config.listener_phase_us.unwrap_or(0);

        let mut listener_radio = SimRadio::new(LISTENER_NODE, VirtualClock::new(), air.clone());
        listener_radio.set_osc_divisor(config.osc_divisor);
        listener_radio.set_wake_latency_ns(config.wake_latency_us as u64 * 1000);
        listener_radio.set_tx_turnaround_ns(config.tx_turnaround_ns);

        let waker_clock =
            VirtualClock::starting_at(config.lead_in_ms as u64 * 1_000_000 + phase_us * 1000);
        let mut waker_radio = SimRadio::new(WAKER_NODE, waker_clock, air.clone());
        waker_radio.set_tx_turnaround_ns(config.tx_turnaround_ns);

        Self::with_radios(config, air, listener_radio, waker_radio)
    }

    /// Boot both nodes on radios prepared by the caller. A radio that fails
    /// to initialise is never armed.
    pub fn with_radios(
        config: SimConfig,
        air: Air,
        mut listener_radio: SimRadio,
        mut waker_radio: SimRadio,
    ) -> Result<Self, ScenarioError> {
        config
            .waker
            .validate_against(worst_case_period_us(&config.listener))?;
        config.waker.validate_ceiling(config.listener.interaction_ceiling_ms)?;

        listener_radio.initialise()?;
        let (mut listener, isr) = DutyCycleListener::new(config.listener)?;
        listener.arm(&mut listener_radio)?;

        waker_radio.initialise()?;
        let mut waker = WakeSequencer::new(config.waker)?;
        waker.init(&mut waker_radio)?;

        let listener_delay = SimDelay::new(listener_radio.clock().clone());
        let waker_delay = SimDelay::new(waker_radio.clock().clone());
        Ok(Self {
            config,
            air,
            waker,
            waker_radio,
            waker_delay,
            listener,
            isr,
            listener_radio,
            listener_delay,
            cycles_run: 0,
        })
    }

    pub fn air(&self) -> &Air {
        &self.air
    }

    pub fn listener(&self) -> &DutyCycleListener {
        &self.listener
    }

    pub fn waker(&self) -> &WakeSequencer {
        &self.waker
    }

    pub fn listener_radio(&self) -> &SimRadio {
        &self.listener_radio
    }

    /// One burst, the listener's reaction to it, the receive window and the
    /// inter-burst pause.
    pub fn run_cycle(&mut self) -> Result<CycleRecord, ScenarioError> {
        let waker_clock = self.waker_radio.clock().clone();
        let burst_start_ns = waker_clock.now_ns();
        let burst = self
            .waker
            .run_burst(&mut self.waker_radio, &mut self.waker_delay)?;
        let burst_end_ns = waker_clock.now_ns();

        let horizon = burst_end_ns
            + uus_to_us(self.config.waker.response_timeout_uus as u32) * 1000
            + WINDOW_SLACK_NS;
        let captures = self.run_listener_until(horizon)?;

        let outcome = self
            .waker
            .await_response(&mut self.waker_radio, &mut self.waker_delay)?;
        self.waker.end_cycle(&mut self.waker_delay);

        let record = CycleRecord {
            index: self.cycles_run,
            burst_start_ns,
            burst_end_ns,
            burst,
            captures,
            outcome,
        };
        self.cycles_run += 1;
        info!(
            "Cycle {}: burst to {}, {} capture(s), outcome {:?}",
            record.index,
            record.burst.target,
            record.captures.len(),
            record.outcome
        );
        Ok(record)
    }

    /// Let the listener duty cycle until `horizon_ns` on its own clock,
    /// servicing every interrupt and disposing every capture on the way.
    fn run_listener_until(&mut self, horizon_ns: u64) -> Result<Vec<CaptureRecord>, ScenarioError> {
        let mut captures = Vec::new();
        while self.listener_radio.clock().now_ns() < horizon_ns {
            let Some(captured_at_ns) = self.listener_radio.run_until_irq(horizon_ns) else {
                break;
            };
            service_irq(&mut self.listener_radio, &mut self.isr)?;
            if let Some(report) = self
                .listener
                .poll(&mut self.listener_radio, &mut self.listener_delay)?
            {
                captures.push(CaptureRecord {
                    captured_at_ns,
                    report,
                });
            }
        }
        Ok(captures)
    }

    /// Run the configured number of cycles.
    pub fn run(mut self) -> Result<SimReport, ScenarioError> {
        let mut cycles = Vec::with_capacity(self.config.bursts as usize);
        for _ in 0..self.config.bursts {
            cycles.push(self.run_cycle()?);
        }

        Ok(SimReport {
            phase_us: self.config.listener_phase_us.unwrap_or(0),
            listener_period_ns: self
                .listener
                .timeline()
                .map_or(0, |timeline| timeline.period_ns()),
            sleep_plan: self.listener.sleep_plan(),
            cycles,
            listener: self.listener.counters().snapshot(),
            waker: self.waker.counters().snapshot(),
        })
    }
}
