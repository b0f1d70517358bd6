//! A boolean condition variable.

use std::time::Duration;

use parking_lot::{Condvar, Mutex};

/// A settable flag that threads can wait on.
///
/// `wait` returns immediately when the flag is already set, so there is no
/// lost-wakeup window between checking and waiting.
#[derive(Default)]
pub struct Signal {
    value: Mutex<bool>,
    cv: Condvar,
}

impl Signal {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the flag and wake all waiters.
    pub fn set(&self) {
        let mut value = self.value.lock();
        *value = true;
        self.cv.notify_all();
    }

    /// Clear the flag.
    pub fn clear(&self) {
        *self.value.lock() = false;
    }

    /// Test the flag without blocking.
    pub fn is_set(&self) -> bool {
        *self.value.lock()
    }

    /// Wait indefinitely for the flag to be set.
    pub fn wait(&self) {
        let mut value = self.value.lock();
        while !*value {
            self.cv.wait(&mut value);
        }
    }

    /// Wait for the flag with a timeout. Returns whether it was set.
    pub fn wait_timeout(&self, timeout: Duration) -> bool {
        let deadline = std::time::Instant::now() + timeout;
        let mut value = self.value.lock();
        while !*value {
            if self.cv.wait_until(&mut value, deadline).timed_out() {
                return *value;
            }
        }
        true
    }
}
