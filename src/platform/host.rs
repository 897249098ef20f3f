use super::Delay;
use std::thread;
use std::time::{Duration, Instant};

/// Host delay backed by the OS scheduler.
///
/// Microsecond delays spin, since thread sleeps are far coarser than the
/// status polling interval.
#[derive(Debug, Default, Clone, Copy)]
pub struct StdDelay;

impl Delay for StdDelay {
    fn sleep_ms(&mut self, ms: u32) {
        thread::sleep(Duration::from_millis(ms as u64));
    }

    fn delay_us(&mut self, us: u32) {
        let until = Instant::now() + Duration::from_micros(us as u64);
        while Instant::now() < until {
            std::hint::spin_loop();
        }
    }
}
