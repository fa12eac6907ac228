//! Bounded handoff queue between prefetch workers and the consumer.

use std::sync::Arc;

use crossbeam_channel::{bounded, Receiver, Sender};

use crate::metrics::PrefetchMetrics;

/// A bounded multi-producer single-consumer queue, reporting its occupancy to
/// [`PrefetchMetrics`] on every push so the high-water mark stays current.
pub struct BoundedQueue<T> {
    sender: Sender<T>,
    receiver: Receiver<T>,
    metrics: Arc<PrefetchMetrics>,
}

impl<T> BoundedQueue<T> {
    pub fn new(capacity: usize, metrics: Arc<PrefetchMetrics>) -> Self {
        let (sender, receiver) = bounded(capacity);
        Self {
            sender,
            receiver,
            metrics,
        }
    }

    pub fn sender(&self) -> QueueSender<T> {
        QueueSender {
            sender: self.sender.clone(),
            metrics: self.metrics.clone(),
        }
    }

    pub fn receiver(&self) -> Receiver<T> {
        self.receiver.clone()
    }

    /// Drop this queue's own sender handle so the receiver can observe disconnection once
    /// every `QueueSender` clone handed to workers is also dropped.
    pub fn close_own_sender(self) -> Receiver<T> {
        self.receiver
    }
}

/// A cloneable producer handle; each worker thread gets one.
#[derive(Clone)]
pub struct QueueSender<T> {
    sender: Sender<T>,
    metrics: Arc<PrefetchMetrics>,
}

impl<T> QueueSender<T> {
    /// Blocks if the queue is full, providing backpressure against upstream workers.
    pub fn push(&self, value: T) -> bool {
        let sent = self.sender.send(value).is_ok();
        self.metrics.record_queue_len(self.sender.len());
        sent
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_queue_roundtrip_and_high_water() {
        let metrics = Arc::new(PrefetchMetrics::new(1));
        let q = BoundedQueue::new(4, metrics.clone());
        let sender = q.sender();
        let receiver = q.receiver();
        sender.push(1);
        sender.push(2);
        assert_eq!(receiver.recv().unwrap(), 1);
        assert_eq!(receiver.recv().unwrap(), 2);
        assert!(metrics.snapshot().queue_high_water >= 1);
    }

    #[test]
    fn test_disconnect_after_all_senders_dropped() {
        let metrics = Arc::new(PrefetchMetrics::new(1));
        let q = BoundedQueue::<i32>::new(2, metrics);
        let receiver = q.close_own_sender();
        assert!(receiver.recv().is_err());
    }
}
