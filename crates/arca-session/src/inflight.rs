//! The in-flight persist counter.
//!
//! Persisters register on entry and deregister on every exit path (the
//! registration is an RAII guard). Commit and rollback wait for the count
//! to reach zero before touching any object sub-session; rollback's wait is
//! bounded.

use std::sync::{Condvar, Mutex};
use std::time::{Duration, Instant};

/// Counts in-flight persist operations on one session.
#[derive(Debug, Default)]
pub struct InflightCounter {
    count: Mutex<usize>,
    zero: Condvar,
}

impl InflightCounter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an arrival. The returned guard deregisters on drop.
    pub fn register(&self) -> InflightGuard<'_> {
        let mut count = self.count.lock().expect("lock poisoned");
        *count += 1;
        InflightGuard { counter: self }
    }

    /// The current number of registered operations.
    pub fn active(&self) -> usize {
        *self.count.lock().expect("lock poisoned")
    }

    /// Block until the count reaches zero. With a timeout, returns `false`
    /// if the count was still non-zero when the timeout elapsed.
    pub fn await_zero(&self, timeout: Option<Duration>) -> bool {
        let mut count = self.count.lock().expect("lock poisoned");
        match timeout {
            None => {
                while *count > 0 {
                    count = self.zero.wait(count).expect("lock poisoned");
                }
                true
            }
            Some(timeout) => {
                let deadline = Instant::now() + timeout;
                while *count > 0 {
                    let remaining = match deadline.checked_duration_since(Instant::now()) {
                        Some(d) if !d.is_zero() => d,
                        _ => return false,
                    };
                    let (guard, result) = self
                        .zero
                        .wait_timeout(count, remaining)
                        .expect("lock poisoned");
                    count = guard;
                    if result.timed_out() && *count > 0 {
                        return false;
                    }
                }
                true
            }
        }
    }
}

/// RAII registration on an [`InflightCounter`].
#[derive(Debug)]
pub struct InflightGuard<'a> {
    counter: &'a InflightCounter,
}

impl Drop for InflightGuard<'_> {
    fn drop(&mut self) {
        let mut count = self.counter.count.lock().expect("lock poisoned");
        *count -= 1;
        if *count == 0 {
            self.counter.zero.notify_all();
        }
    }
}
