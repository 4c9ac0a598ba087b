use std::collections::VecDeque;
use std::time::Duration;

use parking_lot::{Condvar, Mutex};

/// Fixed capacity queue shared between the threads waiting for a free receive buffer and the
/// release path that hands buffers back.
///
/// Poppers block on a condition variable, they never spin. Order is FIFO but callers must not
/// rely on it, every entry is interchangeable.
#[derive(Debug)]
pub struct PendingQueue<T> {
    capacity: usize,
    items: Mutex<VecDeque<T>>,
    not_empty: Condvar,
}

impl<T> PendingQueue<T> {
    pub fn new(capacity: usize) -> PendingQueue<T> {
        PendingQueue {
            capacity,
            items: Mutex::new(VecDeque::with_capacity(capacity)),
            not_empty: Condvar::new(),
        }
    }

    /// Push without waiting for room. The caller is expected to know that room exists, the item
    /// is handed back if it does not.
    #[inline]
    pub fn push_with_haste(&self, item: T) -> Result<(), T> {
        let mut items = self.items.lock();
        if items.len() >= self.capacity {
            return Err(item);
        }
        items.push_back(item);
        drop(items);

        self.not_empty.notify_one();
        Ok(())
    }

    /// Pop an entry if one is queued, without waiting.
    #[inline]
    pub fn pop_with_haste(&self) -> Option<T> {
        self.items.lock().pop_front()
    }

    /// Pop an entry, waiting up to `timeout` for one to show up. Returns None on timeout and
    /// leaves the queue untouched.
    #[inline]
    pub fn pop_with_timed_wait(&self, timeout: Duration) -> Option<T> {
        let mut items = self.items.lock();
        if items.is_empty() {
            self.not_empty
                .wait_while_for(&mut items, |items| items.is_empty(), timeout);
        }
        items.pop_front()
    }

    pub fn len(&self) -> usize {
        self.items.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.lock().is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::thread;
    use std::time::{Duration, Instant};

    use super::PendingQueue;

    #[test]
    fn haste_respects_capacity() {
        let q = PendingQueue::new(2);

        assert_eq!(q.push_with_haste(1), Ok(()));
        assert_eq!(q.push_with_haste(2), Ok(()));
        assert_eq!(q.push_with_haste(3), Err(3));
        assert_eq!(q.len(), 2);
        assert_eq!(q.capacity(), 2);
    }

    #[test]
    fn pop_zero_timeout_on_empty() {
        let q: PendingQueue<usize> = PendingQueue::new(4);

        let start = Instant::now();
        assert_eq!(q.pop_with_timed_wait(Duration::from_secs(0)), None);
        assert!(start.elapsed() < Duration::from_millis(50));
        assert!(q.is_empty());
    }

    #[test]
    fn pop_times_out() {
        let q: PendingQueue<usize> = PendingQueue::new(4);

        let start = Instant::now();
        assert_eq!(q.pop_with_timed_wait(Duration::from_millis(100)), None);
        assert!(start.elapsed() >= Duration::from_millis(100));
        assert_eq!(q.len(), 0);
    }

    #[test]
    fn pop_wakes_on_push() {
        let q = Arc::new(PendingQueue::new(1));

        let q2 = q.clone();
        let popper = thread::spawn(move || q2.pop_with_timed_wait(Duration::from_secs(10)));

        thread::sleep(Duration::from_millis(50));
        let start = Instant::now();
        q.push_with_haste(7usize).unwrap();

        assert_eq!(popper.join().unwrap(), Some(7));
        assert!(start.elapsed() < Duration::from_secs(5));
    }

    #[test]
    fn pop_with_haste_never_waits() {
        let q = PendingQueue::new(2);
        q.push_with_haste(1usize).unwrap();
        q.push_with_haste(2).unwrap();

        assert_eq!(q.pop_with_haste(), Some(1));
        assert_eq!(q.pop_with_haste(), Some(2));

        let start = Instant::now();
        assert_eq!(q.pop_with_haste(), None);
        assert!(start.elapsed() < Duration::from_millis(50));

        // Room freed by popping is usable again.
        assert_eq!(q.push_with_haste(3), Ok(()));
        assert_eq!(q.len(), 1);
    }

    #[test]
    fn concurrent_poppers_share_entries() {
        const THREADS: usize = 8;

        let q = Arc::new(PendingQueue::new(THREADS));
        for i in 0..THREADS / 2 {
            q.push_with_haste(i).unwrap();
        }

        let handles: Vec<_> = (0..THREADS)
            .map(|_| {
                let q = q.clone();
                thread::spawn(move || q.pop_with_timed_wait(Duration::from_millis(200)))
            })
            .collect();

        let got: Vec<usize> = handles
            .into_iter()
            .filter_map(|h| h.join().unwrap())
            .collect();

        assert_eq!(got.len(), THREADS / 2);
        assert!(q.is_empty());
    }
}
