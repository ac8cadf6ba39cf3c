use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};

/// A counting semaphore for plain threads.
///
/// Waiters that acquire and immediately release again let one release wake
/// every thread blocked on the same semaphore in turn.
#[derive(Debug, Default)]
pub struct Semaphore {
    permits: Mutex<usize>,
    condvar: Condvar,
}

impl Semaphore {
    pub fn new(permits: usize) -> Self {
        Self {
            permits: Mutex::new(permits),
            condvar: Condvar::new(),
        }
    }

    /// Blocks until a permit is available and takes it.
    pub fn acquire(&self) {
        let mut permits = self.permits.lock();
        while *permits == 0 {
            self.condvar.wait(&mut permits);
        }
        *permits -= 1;
    }

    pub fn try_acquire(&self) -> bool {
        let mut permits = self.permits.lock();
        if *permits == 0 {
            return false;
        }
        *permits -= 1;
        true
    }

    /// Like [`acquire`](Self::acquire) but gives up after `timeout`.
    pub fn acquire_timeout(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut permits = self.permits.lock();
        while *permits == 0 {
            if self.condvar.wait_until(&mut permits, deadline).timed_out() {
                break;
            }
        }
        if *permits == 0 {
            return false;
        }
        *permits -= 1;
        true
    }

    pub fn release(&self) {
        *self.permits.lock() += 1;
        self.condvar.notify_one();
    }

    pub fn available(&self) -> usize {
        *self.permits.lock()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::thread;

    use super::*;

    #[test]
    fn release_before_acquire() {
        let sem = Semaphore::new(0);
        assert!(!sem.try_acquire());
        sem.release();
        assert!(sem.try_acquire());
        assert!(!sem.acquire_timeout(Duration::from_millis(10)));
    }

    #[test]
    fn one_release_fans_out() {
        let sem = Arc::new(Semaphore::new(0));
        let waiters: Vec<_> = (0..4)
            .map(|_| {
                let sem = sem.clone();
                thread::spawn(move || {
                    sem.acquire();
                    sem.release();
                })
            })
            .collect();

        thread::sleep(Duration::from_millis(20));
        sem.release();
        for waiter in waiters {
            waiter.join().unwrap();
        }
        assert_eq!(sem.available(), 1);
    }
}
