//! Single-slot handoff from the interrupt path to the main loop.
//!
//! The slot has three states. The interrupt side may only post into an
//! empty slot. The main loop takes the item out as a [`Lease`]; the slot
//! stays occupied until the lease is dropped, which is how the main loop
//! tells the interrupt side it is done with the radio.
//!
//! ```text
//! Empty --try_post--> Full --take--> Leased --drop(lease)--> Empty
//! ```
//!
//! # Example
//!
//! ```
//! use uwb_lplisten::mailbox::mailbox;
//!
//! let (tx, rx) = mailbox::<u16>();
//! assert!(tx.try_post(42).is_ok());
//! assert_eq!(tx.try_post(43), Err(43));
//!
//! let lease = rx.try_take().unwrap();
//! assert_eq!(*lease, 42);
//! assert!(!tx.is_vacant());
//! drop(lease);
//! assert!(tx.is_vacant());
//! ```

use std::ops::Deref;
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

enum Slot<T> {
    Empty,
    Full(T),
    Leased,
}

struct Shared<T> {
    slot: Mutex<Slot<T>>,
    ready: Condvar,
}

impl<T> Shared<T> {
    fn lock(&self) -> MutexGuard<'_, Slot<T>> {
        self.slot.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Create a connected sender/receiver pair.
pub fn mailbox<T>() -> (MailboxSender<T>, MailboxReceiver<T>) {
    let shared = Arc::new(Shared {
        slot: Mutex::new(Slot::Empty),
        ready: Condvar::new(),
    });
    (
        MailboxSender {
            shared: Arc::clone(&shared),
        },
        MailboxReceiver { shared },
    )
}

/// Interrupt side of the mailbox.
pub struct MailboxSender<T> {
    shared: Arc<Shared<T>>,
}

impl<T> MailboxSender<T> {
    /// True when nothing is posted and nothing is leased.
    pub fn is_vacant(&self) -> bool {
        matches!(*self.shared.lock(), Slot::Empty)
    }

    /// Post an item. Hands it back if the slot is not empty.
    pub fn try_post(&self, item: T) -> Result<(), T> {
        let mut slot = self.shared.lock();
        if !matches!(*slot, Slot::Empty) {
            return Err(item);
        }
        *slot = Slot::Full(item);
        drop(slot);
        self.shared.ready.notify_one();
        Ok(())
    }
}

/// Main-loop side of the mailbox.
pub struct MailboxReceiver<T> {
    shared: Arc<Shared<T>>,
}

impl<T> MailboxReceiver<T> {
    /// Take the posted item, if any.
    pub fn try_take(&self) -> Option<Lease<T>> {
        let mut slot = self.shared.lock();
        self.lease_from(&mut slot)
    }

    /// Wait up to `timeout` for an item to be posted.
    pub fn recv_timeout(&self, timeout: Duration) -> Option<Lease<T>> {
        let slot = self.shared.lock();
        let (mut slot, _) = self
            .shared
            .ready
            .wait_timeout_while(slot, timeout, |slot| !matches!(slot, Slot::Full(_)))
            .unwrap_or_else(PoisonError::into_inner);
        self.lease_from(&mut slot)
    }

    fn lease_from(&self, slot: &mut Slot<T>) -> Option<Lease<T>> {
        match std::mem::replace(slot, Slot::Leased) {
            Slot::Full(item) => Some(Lease {
                item,
                shared: Arc::clone(&self.shared),
            }),
            other => {
                *slot = other;
                None
            }
        }
    }
}

/// A taken item. The slot is released when the lease is dropped.
pub struct Lease<T> {
    item: T,
    shared: Arc<Shared<T>>,
}

impl<T> Lease<T> {
    /// Release the slot now.
    pub fn release(self) {}
}

impl<T> Deref for Lease<T> {
    type Target = T;

    fn deref(&self) -> &T {
        &self.item
    }
}

impl<T> Drop for Lease<T> {
    fn drop(&mut self) {
        *self.shared.lock() = Slot::Empty;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;
    use std::time::Instant;

    #[test]
    fn test_single_slot() {
        let (tx, rx) = mailbox();
        assert!(tx.is_vacant());
        assert!(tx.try_post(1u8).is_ok());
        assert_eq!(tx.try_post(2), Err(2));

        let lease = rx.try_take().unwrap();
        assert_eq!(*lease, 1);
        assert!(rx.try_take().is_none());
    }

    #[test]
    fn test_slot_stays_busy_while_leased() {
        let (tx, rx) = mailbox();
        tx.try_post(1u8).unwrap();
        let lease = rx.try_take().unwrap();

        assert!(!tx.is_vacant());
        assert_eq!(tx.try_post(2), Err(2));

        lease.release();
        assert!(tx.is_vacant());
        assert!(tx.try_post(3).is_ok());
        assert_eq!(*rx.try_take().unwrap(), 3);
    }

    #[test]
    fn test_recv_timeout_empty() {
        let (_tx, rx) = mailbox::<u8>();
        let start = Instant::now();
        assert!(rx.recv_timeout(Duration::from_millis(20)).is_none());
        assert!(start.elapsed() >= Duration::from_millis(20));
    }

    #[test]
    fn test_recv_timeout_does_not_return_leased_slot() {
        let (tx, rx) = mailbox();
        tx.try_post(1u8).unwrap();
        let _lease = rx.try_take().unwrap();
        assert!(rx.recv_timeout(Duration::from_millis(5)).is_none());
    }

    #[test]
    fn test_cross_thread_handoff() {
        let (tx, rx) = mailbox();
        let poster = thread::spawn(move || {
            let mut posted = 0;
            let mut value = 0u32;
            while posted < 100 {
                match tx.try_post(value) {
                    Ok(()) => {
                        posted += 1;
                        value += 1;
                    }
                    Err(_) => thread::yield_now(),
                }
            }
        });

        let mut received = Vec::new();
        while received.len() < 100 {
            if let Some(lease) = rx.recv_timeout(Duration::from_secs(5)) {
                received.push(*lease);
            }
        }
        poster.join().unwrap();

        assert_eq!(received, (0..100).collect::<Vec<_>>());
    }
}
