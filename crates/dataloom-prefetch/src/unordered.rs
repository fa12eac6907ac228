//! `prefetch(prefetch_size, num_threads)` — unordered concurrent prefetch.

use std::sync::Arc;

use parking_lot::Mutex;

use dataloom_core::config::WorkerPoolConfig;
use dataloom_core::{BoxStream, Error, Result, Sample, Stream};
use dataloom_ops::transform::BoxTransform;

use crate::metrics::PrefetchMetrics;
use crate::queue::BoundedQueue;
use crate::worker::WorkerPool;

/// Applies `chain` to `sample` in order; the first failing transform drops the sample (the
/// per-sample-transform failure policy — no error propagates to the consumer for this case).
/// Shared with `ordered_prefetch`, which applies the same chain from its own worker pool.
pub(crate) fn apply_chain(chain: &[BoxTransform], sample: Sample) -> Option<Sample> {
    let mut current = sample;
    for transform in chain {
        match transform.apply(current) {
            Ok(next) => current = next,
            Err(e) => {
                log::debug!("prefetch: dropping sample, transform failed: {e}");
                return None;
            }
        }
    }
    // `sample_transform`'s contract: an empty resulting mapping means the sample is filtered
    // out, equivalent to a failing transform for the purposes of this chain.
    if current.is_empty() {
        None
    } else {
        Some(current)
    }
}

/// The unordered prefetch stream: pops whatever result arrives next from the shared output
/// queue. Disconnection (all worker `Sender`s dropped) means every worker observed upstream
/// end-of-stream and the queue has fully drained.
pub struct UnorderedPrefetchStream {
    receiver: crossbeam_channel::Receiver<Sample>,
    fatal_error: Arc<Mutex<Option<Error>>>,
    metrics: Arc<PrefetchMetrics>,
    _pool: WorkerPool,
    aborted: bool,
}

impl Stream for UnorderedPrefetchStream {
    fn next(&mut self) -> Result<Option<Sample>> {
        if self.aborted {
            return Err(Error::StreamAborted(
                "prefetch stream previously failed".to_string(),
            ));
        }
        match self.receiver.recv() {
            Ok(sample) => {
                self.metrics.record_emitted();
                Ok(Some(sample))
            }
            Err(_disconnected) => {
                if let Some(e) = self.fatal_error.lock().take() {
                    self.aborted = true;
                    return Err(Error::StreamAborted(e.to_string()));
                }
                Ok(None)
            }
        }
    }
}

/// `prefetch(prefetch_size, num_threads)`.
pub fn prefetch(
    upstream: BoxStream,
    chain: Vec<BoxTransform>,
    prefetch_size: usize,
    num_threads: usize,
) -> Result<Box<dyn Stream>> {
    WorkerPoolConfig::new(prefetch_size, num_threads)?;

    let metrics = Arc::new(PrefetchMetrics::new(num_threads as u64));
    let queue = BoundedQueue::new(prefetch_size, metrics.clone());
    let upstream = Arc::new(Mutex::new(upstream));
    let chain = Arc::new(chain);
    let fatal_error = Arc::new(Mutex::new(None));

    let sender = queue.sender();
    let receiver_handle = queue.receiver();
    let stream_metrics = metrics.clone();

    let pool = WorkerPool::start("dataloom-prefetch", num_threads, move |_i, shutdown| {
        loop {
            if shutdown.get() {
                break;
            }
            // Re-check the shutdown flag with the lock held: once a worker observes an
            // unrecoverable upstream error it sets `shutdown` before releasing the lock, so no
            // other worker calls `next()` on an already-failed stream.
            let next_sample = {
                let mut guard = upstream.lock();
                if shutdown.get() {
                    None
                } else {
                    Some(guard.next())
                }
            };
            let next_sample = match next_sample {
                Some(r) => r,
                None => break,
            };
            match next_sample {
                Ok(Some(sample)) => {
                    metrics.sample_processing_started();
                    let processed = apply_chain(&chain, sample);
                    metrics.sample_processing_finished();
                    match processed {
                        Some(out) => {
                            sender.push(out);
                        }
                        None => metrics.record_dropped(),
                    }
                }
                Ok(None) => break,
                Err(e) => {
                    *fatal_error.lock() = Some(e);
                    shutdown.set(true);
                    break;
                }
            }
        }
    });

    Ok(Box::new(UnorderedPrefetchStream {
        receiver: receiver_handle,
        fatal_error,
        metrics: stream_metrics,
        _pool: pool,
        aborted: false,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use dataloom_core::{buffer_from_vector, to_stream, Array, Buffer};
    use std::collections::HashSet;
    use std::sync::Arc as StdArc;

    fn i_of(s: &Sample) -> i32 {
        s.get("i").unwrap().as_slice::<i32>().unwrap()[0]
    }

    #[test]
    fn test_prefetch_emits_every_sample_exactly_once_unordered() {
        let n = 200;
        let buf: StdArc<dyn Buffer> = StdArc::from(buffer_from_vector(
            (0..n).map(|i| Sample::new().with("i", Array::scalar(i))).collect(),
        ));
        let upstream = to_stream(buf);
        let mut s = prefetch(upstream, Vec::new(), 16, 8).unwrap();
        let mut seen = HashSet::new();
        while let Some(sample) = s.next().unwrap() {
            seen.insert(i_of(&sample));
        }
        assert_eq!(seen.len(), n as usize);
        assert_eq!(seen, (0..n).collect());
    }

    #[test]
    fn test_prefetch_rejects_invalid_config() {
        let buf: StdArc<dyn Buffer> = StdArc::from(buffer_from_vector(Vec::new()));
        let upstream = to_stream(buf);
        assert!(prefetch(upstream, Vec::new(), 0, 4).is_err());
    }
}

#[cfg(test)]
mod proptests {
    use super::*;
    use dataloom_core::{buffer_from_vector, to_stream, Array, Buffer};
    use proptest::prelude::*;
    use std::collections::HashSet;
    use std::sync::Arc as StdArc;

    fn i_of(s: &Sample) -> i32 {
        s.get("i").unwrap().as_slice::<i32>().unwrap()[0]
    }

    proptest! {
        /// For any finite upstream of length N and any worker count W / prefetch size P, the
        /// multiset of `prefetch`'s outputs equals the multiset of upstream samples (absent
        /// drops). Order is deliberately not
        /// checked here since `prefetch` makes no ordering guarantee.
        #[test]
        fn prefetch_output_set_matches_upstream_for_any_n_w_p(
            n in 0usize..120,
            num_threads in 1usize..17,
            prefetch_size in 1usize..17,
        ) {
            let buf: StdArc<dyn Buffer> = StdArc::from(buffer_from_vector(
                (0..n as i32).map(|i| Sample::new().with("i", Array::scalar(i))).collect(),
            ));
            let upstream = to_stream(buf);
            let mut s = prefetch(upstream, Vec::new(), prefetch_size, num_threads).unwrap();
            let mut seen = HashSet::new();
            while let Some(sample) = s.next().unwrap() {
                seen.insert(i_of(&sample));
            }
            prop_assert_eq!(seen, (0..n as i32).collect());
        }
    }
}
