//! Cache-line-aligned atomic counters shared between pipeline worker threads and the
//! consumer thread without locking.

use std::sync::atomic::{AtomicU64, Ordering};

/// A `u64` counter padded to a full cache line so concurrently-updated counters placed next
/// to each other (e.g. `samples_produced` and `samples_dropped` on a shared metrics struct)
/// never false-share.
#[repr(align(64))]
#[derive(Debug, Default)]
pub struct AtomicCounter {
    value: AtomicU64,
}

impl AtomicCounter {
    pub const fn new(initial: u64) -> Self {
        Self {
            value: AtomicU64::new(initial),
        }
    }

    pub fn get(&self) -> u64 {
        self.value.load(Ordering::Relaxed)
    }

    pub fn set(&self, value: u64) {
        self.value.store(value, Ordering::Relaxed);
    }

    pub fn increment(&self) -> u64 {
        self.value.fetch_add(1, Ordering::Relaxed)
    }

    pub fn add(&self, delta: u64) -> u64 {
        self.value.fetch_add(delta, Ordering::Relaxed)
    }

    pub fn sub(&self, delta: u64) -> u64 {
        self.value.fetch_sub(delta, Ordering::Relaxed)
    }
}

/// A cache-line-aligned boolean flag, used for shutdown/abort signaling between the consumer
/// thread and a worker pool.
#[repr(align(64))]
#[derive(Debug)]
pub struct AtomicFlag {
    value: std::sync::atomic::AtomicBool,
}

impl AtomicFlag {
    pub const fn new(initial: bool) -> Self {
        Self {
            value: std::sync::atomic::AtomicBool::new(initial),
        }
    }

    pub fn get(&self) -> bool {
        self.value.load(Ordering::Acquire)
    }

    pub fn set(&self, value: bool) {
        self.value.store(value, Ordering::Release);
    }
}

impl Default for AtomicFlag {
    fn default() -> Self {
        Self::new(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counter_increments() {
        let c = AtomicCounter::new(0);
        assert_eq!(c.increment(), 0);
        assert_eq!(c.increment(), 1);
        assert_eq!(c.get(), 2);
    }

    #[test]
    fn test_counter_add() {
        let c = AtomicCounter::new(10);
        c.add(5);
        assert_eq!(c.get(), 15);
    }

    #[test]
    fn test_counter_sub() {
        let c = AtomicCounter::new(10);
        c.sub(3);
        assert_eq!(c.get(), 7);
    }

    #[test]
    fn test_flag_toggle() {
        let f = AtomicFlag::new(false);
        assert!(!f.get());
        f.set(true);
        assert!(f.get());
    }
}
