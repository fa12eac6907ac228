//! Named worker-thread pool with atomic shutdown signaling, joined on drop.
//!
//! Mirrors the lifecycle of a disk-streaming worker thread: start spawns named threads that
//! run until a shared shutdown flag is set, and the pool's `Drop` sets that flag and blocks
//! joining every handle so no worker ever outlives its owning stream.

use std::sync::Arc;
use std::thread::{self, JoinHandle};

use dataloom_core::lockfree::AtomicFlag;

pub struct WorkerPool {
    shutdown: Arc<AtomicFlag>,
    handles: Vec<JoinHandle<()>>,
}

impl WorkerPool {
    /// Spawn `num_threads` named worker threads, each running `worker_fn(thread_index,
    /// shutdown_flag)` until it returns or the shutdown flag is observed set.
    pub fn start<F>(name_prefix: &str, num_threads: usize, worker_fn: F) -> Self
    where
        F: Fn(usize, Arc<AtomicFlag>) + Send + Sync + 'static,
    {
        let shutdown = Arc::new(AtomicFlag::new(false));
        let worker_fn = Arc::new(worker_fn);
        let handles = (0..num_threads)
            .map(|i| {
                let shutdown = shutdown.clone();
                let worker_fn = worker_fn.clone();
                thread::Builder::new()
                    .name(format!("{name_prefix}-{i}"))
                    .spawn(move || worker_fn(i, shutdown))
                    .expect("failed to spawn dataloom prefetch worker thread")
            })
            .collect();
        Self { shutdown, handles }
    }

    pub fn shutdown_flag(&self) -> Arc<AtomicFlag> {
        self.shutdown.clone()
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        self.shutdown.set(true);
        for handle in self.handles.drain(..) {
            let _ = handle.join();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_workers_run_until_shutdown() {
        let counter = Arc::new(AtomicUsize::new(0));
        let pool = {
            let counter = counter.clone();
            WorkerPool::start("test-worker", 2, move |_i, shutdown| {
                while !shutdown.get() {
                    counter.fetch_add(1, Ordering::Relaxed);
                    std::thread::yield_now();
                }
            })
        };
        std::thread::sleep(std::time::Duration::from_millis(20));
        drop(pool);
        assert!(counter.load(Ordering::Relaxed) > 0);
    }
}
