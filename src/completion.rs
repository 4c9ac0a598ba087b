use std::time::Duration;

use parking_lot::{Condvar, Mutex};

/// One-to-one signal between a send buffer and the endpoint transmitting its frame.
///
/// Behaves like a manual-reset event: `signal` sets it, `wait_and_reset` consumes it.
#[derive(Debug, Default)]
pub struct Completion {
    done: Mutex<bool>,
    cond: Condvar,
}

impl Completion {
    pub fn new() -> Completion {
        Completion::default()
    }

    pub fn signal(&self) {
        *self.done.lock() = true;
        self.cond.notify_all();
    }

    #[cfg(test)]
    pub(crate) fn is_signalled(&self) -> bool {
        *self.done.lock()
    }

    /// Wait up to `timeout` for the signal. On success the signal is cleared before returning
    /// true, so only one waiter can observe a given completion.
    pub fn wait_and_reset(&self, timeout: Duration) -> bool {
        let mut done = self.done.lock();
        if !*done {
            self.cond.wait_while_for(&mut done, |done| !*done, timeout);
        }
        if !*done {
            return false;
        }
        *done = false;
        true
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::thread;
    use std::time::{Duration, Instant};

    use super::Completion;

    #[test]
    fn starts_clear() {
        let c = Completion::new();
        assert!(!c.is_signalled());
        assert!(!c.wait_and_reset(Duration::from_millis(10)));
    }

    #[test]
    fn wait_consumes_signal() {
        let c = Completion::new();
        c.signal();

        assert!(c.wait_and_reset(Duration::from_secs(0)));
        assert!(!c.is_signalled());
        assert!(!c.wait_and_reset(Duration::from_secs(0)));
    }

    #[test]
    fn wakes_waiter() {
        let c = Arc::new(Completion::new());

        let c2 = c.clone();
        let waiter = thread::spawn(move || c2.wait_and_reset(Duration::from_secs(10)));

        thread::sleep(Duration::from_millis(50));
        let start = Instant::now();
        c.signal();

        assert!(waiter.join().unwrap());
        assert!(start.elapsed() < Duration::from_secs(5));
    }
}
