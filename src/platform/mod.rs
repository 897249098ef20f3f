//! Platform services the protocol runs on.
//!
//! Two pieces are needed besides the radio itself: a blocking [`Delay`]
//! (the main loop's long sleeps and the µs busy-waits of status polling)
//! and a way to share the radio between the interrupt task and the main
//! loop ([`RadioCell`]).
//!
//! Host builds get [`StdDelay`] and `env_logger`; ESP-IDF builds get the
//! FreeRTOS/ROM delays, the IRQ GPIO line and the ESP logger from
//! [`esp`].

#[cfg(feature = "esp32")]
pub mod esp;
mod host;

pub use host::StdDelay;

use log::{error, warn};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Blocking delays.
pub trait Delay {
    /// Sleep for `ms` milliseconds. Runs to completion.
    fn sleep_ms(&mut self, ms: u32);

    /// Busy-wait for `us` microseconds.
    fn delay_us(&mut self, us: u32);
}

impl<D: Delay + ?Sized> Delay for &mut D {
    fn sleep_ms(&mut self, ms: u32) {
        (**self).sleep_ms(ms)
    }

    fn delay_us(&mut self, us: u32) {
        (**self).delay_us(us)
    }
}

/// Radio shared between the interrupt task and the main loop.
///
/// The lock only makes the sharing sound; which side may drive the radio is
/// decided by the listener's mailbox.
pub struct RadioCell<R> {
    inner: Arc<Mutex<R>>,
}

impl<R> Clone for RadioCell<R> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<R> RadioCell<R> {
    pub fn new(radio: R) -> Self {
        Self {
            inner: Arc::new(Mutex::new(radio)),
        }
    }

    /// Run `f` with exclusive access to the radio.
    pub fn with<T>(&self, f: impl FnOnce(&mut R) -> T) -> T {
        // Handle poisoned mutex - recover by taking the inner value
        let mut guard = match self.inner.lock() {
            Ok(guard) => guard,
            Err(poisoned) => {
                warn!("Radio mutex was poisoned, recovering");
                poisoned.into_inner()
            }
        };
        f(&mut guard)
    }
}

/// Initialise logging for the current platform.
#[cfg(not(feature = "esp32"))]
pub fn init_logging() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
}

/// Initialise ESP-IDF patches and the ESP logger.
#[cfg(feature = "esp32")]
pub fn init_logging() {
    esp::init();
}

/// Halt after an unrecoverable boot failure.
///
/// The device stays here until it is power cycled.
pub fn fatal_halt(msg: &str) -> ! {
    error!("{}", msg);
    loop {
        std::thread::sleep(Duration::from_secs(1));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn test_radio_cell_shared_between_threads() {
        let cell = RadioCell::new(0u32);
        let other = cell.clone();

        let handle = thread::spawn(move || {
            for _ in 0..1000 {
                other.with(|v| *v += 1);
            }
        });
        for _ in 0..1000 {
            cell.with(|v| *v += 1);
        }
        handle.join().unwrap();

        assert_eq!(cell.with(|v| *v), 2000);
    }

    #[test]
    fn test_radio_cell_recovers_from_poison() {
        let cell = RadioCell::new(5u32);
        let other = cell.clone();

        let result = thread::spawn(move || {
            other.with(|_| panic!("driver panicked"));
        })
        .join();
        assert!(result.is_err());

        assert_eq!(cell.with(|v| *v), 5);
    }

    #[test]
    fn test_delay_through_mut_ref() {
        struct Counting(u32);
        impl Delay for Counting {
            fn sleep_ms(&mut self, ms: u32) {
                self.0 += ms * 1000;
            }
            fn delay_us(&mut self, us: u32) {
                self.0 += us;
            }
        }

        let mut delay = Counting(0);
        {
            let mut by_ref = &mut delay;
            by_ref.sleep_ms(2);
            by_ref.delay_us(5);
        }
        assert_eq!(delay.0, 2005);
    }
}
