//! ESP-IDF platform glue.
//!
//! The DW1000 IRQ output is wired to a GPIO; its rising edge notifies the
//! interrupt task, which then services the radio over SPI from task context.

use super::{fatal_halt, Delay, RadioCell};
use crate::lpl::{DutyCycleListener, ListenerConfig, WakeSequencer, WakerConfig};
use crate::radio::{run_irq_task, IrqLine, RadioDriver, RadioError};
use esp_idf_hal::delay::{Ets, FreeRtos, BLOCK};
use esp_idf_hal::gpio::{Input, InputPin, InterruptType, PinDriver};
use esp_idf_hal::peripheral::Peripheral;
use esp_idf_hal::task::notification::Notification;
use log::{error, info, warn};
use std::num::NonZeroU32;
use std::thread;

/// Stack of the interrupt task, which screens frames and logs.
const IRQ_TASK_STACK: usize = 8 * 1024;

/// Apply ESP-IDF runtime patches and install the ESP logger.
pub fn init() {
    esp_idf_sys::link_patches();
    esp_idf_svc::log::EspLogger::initialize_default();
    info!("ESP-IDF initialized");
}

/// FreeRTOS task delay for sleeps, ROM busy-wait for microseconds.
#[derive(Debug, Default, Clone, Copy)]
pub struct EspDelay;

impl Delay for EspDelay {
    fn sleep_ms(&mut self, ms: u32) {
        FreeRtos::delay_ms(ms);
    }

    fn delay_us(&mut self, us: u32) {
        Ets::delay_us(us);
    }
}

/// Radio IRQ line on a GPIO, delivered to the waiting task by notification.
pub struct EspIrqLine<'d, P: InputPin> {
    pin: PinDriver<'d, P, Input>,
    notification: Notification,
}

impl<'d, P: InputPin> EspIrqLine<'d, P> {
    pub fn new(pin: impl Peripheral<P = P> + 'd) -> Result<Self, RadioError> {
        let mut pin = PinDriver::input(pin).map_err(|e| RadioError::Bus(format!("{:?}", e)))?;
        pin.set_interrupt_type(InterruptType::PosEdge)
            .map_err(|e| RadioError::Bus(format!("{:?}", e)))?;

        let notification = Notification::new();
        let notifier = notification.notifier();
        // SAFETY: the callback only posts a task notification, which is ISR safe.
        unsafe {
            pin.subscribe(move || {
                notifier.notify_and_yield(NonZeroU32::MIN);
            })
            .map_err(|e| RadioError::Bus(format!("{:?}", e)))?;
        }
        pin.enable_interrupt()
            .map_err(|e| RadioError::Bus(format!("{:?}", e)))?;

        Ok(Self { pin, notification })
    }
}

impl<P: InputPin> IrqLine for EspIrqLine<'_, P> {
    fn wait(&mut self) -> bool {
        self.notification.wait(BLOCK);
        // The driver disables the interrupt after each edge
        if let Err(e) = self.pin.enable_interrupt() {
            warn!("Failed to re-enable radio IRQ: {:?}", e);
            return false;
        }
        true
    }
}

/// Boot a listener node and run it forever.
///
/// The radio must be freshly reset. Initialisation or arming failure halts
/// the node until it is power cycled.
pub fn run_listener<R, P>(
    mut radio: R,
    irq_pin: impl Peripheral<P = P> + Send + 'static,
    config: ListenerConfig,
) -> !
where
    R: RadioDriver + Send + 'static,
    P: InputPin,
{
    if let Err(e) = radio.initialise() {
        fatal_halt(&format!("Radio initialisation failed: {}", e));
    }
    let (mut listener, mut isr) = match DutyCycleListener::new(config) {
        Ok(parts) => parts,
        Err(e) => fatal_halt(&format!("Invalid listener configuration: {}", e)),
    };
    if let Err(e) = listener.arm(&mut radio) {
        fatal_halt(&format!("Failed to arm listener: {}", e));
    }

    let radio = RadioCell::new(radio);
    let irq_radio = radio.clone();
    let spawned = thread::Builder::new()
        .name("radio-irq".into())
        .stack_size(IRQ_TASK_STACK)
        .spawn(move || match EspIrqLine::new(irq_pin) {
            Ok(mut line) => run_irq_task(&mut line, &irq_radio, &mut isr),
            Err(e) => error!("Failed to set up radio IRQ line: {}", e),
        });
    if let Err(e) = spawned {
        fatal_halt(&format!("Failed to spawn interrupt task: {}", e));
    }

    listener.run(&radio, &mut EspDelay)
}

/// Boot a waker node and run wake cycles forever.
pub fn run_waker<R: RadioDriver>(mut radio: R, config: WakerConfig) -> ! {
    if let Err(e) = radio.initialise() {
        fatal_halt(&format!("Radio initialisation failed: {}", e));
    }
    let mut waker = match WakeSequencer::new(config) {
        Ok(waker) => waker,
        Err(e) => fatal_halt(&format!("Invalid waker configuration: {}", e)),
    };
    if let Err(e) = waker.init(&mut radio) {
        fatal_halt(&format!("Failed to configure waker radio: {}", e));
    }
    waker.run(&mut radio, &mut EspDelay)
}
