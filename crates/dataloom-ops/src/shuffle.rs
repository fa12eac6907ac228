//! Random reordering operators: whole-buffer permutation and streaming reservoir shuffle.

use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use rand_pcg::Pcg64;

use dataloom_core::config::CapacityConfig;
use dataloom_core::{BoxBuffer, BoxStream, Buffer, Result, Sample, Stream};

/// `shuffle()` — buffer variant. Computes a fixed random permutation of `[0, len)` at
/// construction time and serves `get(i)` through it, so repeated reads of the same index are
/// stable within one shuffled buffer's lifetime.
struct ShuffledBuffer {
    inner: BoxBuffer,
    permutation: Vec<usize>,
}

impl Buffer for ShuffledBuffer {
    fn len(&self) -> usize {
        self.inner.len()
    }

    fn get(&self, index: i64) -> Result<Sample> {
        let i = self.resolve_index(index)?;
        self.inner.get(self.permutation[i] as i64)
    }
}

/// `shuffle()` on a [`Buffer`], seeded with `seed` (callers derive this per stream
/// construction, so reproducing a shuffle just means reusing the same seed).
pub fn shuffle_buffer(buffer: BoxBuffer, seed: u64) -> BoxBuffer {
    let mut rng = Pcg64::seed_from_u64(seed);
    let mut permutation: Vec<usize> = (0..buffer.len()).collect();
    permutation.shuffle(&mut rng);
    Box::new(ShuffledBuffer {
        inner: buffer,
        permutation,
    })
}

/// `shuffle(buffer_size)` — stream variant: a reservoir of at most `buffer_size` samples.
/// Each `next()` emits a uniformly random occupied slot and refills it from upstream; once
/// upstream reaches end-of-stream, remaining reservoir slots drain in random order. Every
/// upstream sample is emitted exactly once.
struct ReservoirShuffleStream {
    upstream: BoxStream,
    reservoir: Vec<Sample>,
    capacity: usize,
    upstream_done: bool,
    rng: Pcg64,
}

impl ReservoirShuffleStream {
    fn new(upstream: BoxStream, capacity: usize, seed: u64) -> Self {
        Self {
            upstream,
            reservoir: Vec::with_capacity(capacity),
            capacity,
            upstream_done: false,
            rng: Pcg64::seed_from_u64(seed),
        }
    }

    fn fill(&mut self) -> Result<()> {
        while !self.upstream_done && self.reservoir.len() < self.capacity {
            match self.upstream.next()? {
                Some(sample) => self.reservoir.push(sample),
                None => self.upstream_done = true,
            }
        }
        Ok(())
    }
}

impl Stream for ReservoirShuffleStream {
    fn next(&mut self) -> Result<Option<Sample>> {
        self.fill()?;
        if self.reservoir.is_empty() {
            return Ok(None);
        }
        let slot = self.rng.gen_range(0..self.reservoir.len());
        if self.upstream_done {
            // No replacement available; drain the reservoir in random order via swap-remove.
            return Ok(Some(self.reservoir.swap_remove(slot)));
        }
        let picked = self.reservoir.swap_remove(slot);
        match self.upstream.next()? {
            Some(replacement) => self.reservoir.push(replacement),
            None => self.upstream_done = true,
        }
        Ok(Some(picked))
    }
}

/// `shuffle(buffer_size)` on a [`Stream`]. `buffer_size` must be `>= 1`, validated here rather
/// than left to silently produce an always-empty reservoir — per the invalid-argument
/// contract, this is surfaced at construction, never delayed.
pub fn shuffle_stream(upstream: BoxStream, buffer_size: usize, seed: u64) -> Result<BoxStream> {
    CapacityConfig::new(buffer_size)?;
    Ok(Box::new(ReservoirShuffleStream::new(upstream, buffer_size, seed)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use dataloom_core::{buffer_from_vector, to_stream, Array};
    use std::collections::HashSet;
    use std::sync::Arc;

    fn samples(n: i32) -> Vec<Sample> {
        (0..n).map(|i| Sample::new().with("i", Array::scalar(i))).collect()
    }

    fn i_of(s: &Sample) -> i32 {
        s.get("i").unwrap().as_slice::<i32>().unwrap()[0]
    }

    #[test]
    fn test_shuffle_buffer_is_permutation() {
        let b = shuffle_buffer(buffer_from_vector(samples(20)), 7);
        assert_eq!(b.len(), 20);
        let seen: HashSet<i32> = (0..20).map(|i| i_of(&b.get(i).unwrap())).collect();
        assert_eq!(seen.len(), 20);
        assert_eq!(seen, (0..20).collect());
    }

    #[test]
    fn test_reservoir_shuffle_emits_every_sample_exactly_once() {
        let buf: Arc<dyn Buffer> = Arc::from(buffer_from_vector(samples(50)));
        let upstream = to_stream(buf);
        let mut s = shuffle_stream(upstream, 8, 3).unwrap();
        let mut seen = Vec::new();
        while let Some(sample) = s.next().unwrap() {
            seen.push(i_of(&sample));
        }
        seen.sort();
        assert_eq!(seen, (0..50).collect::<Vec<_>>());
    }

    #[test]
    fn test_reservoir_shuffle_smaller_than_capacity_still_drains() {
        let buf: Arc<dyn Buffer> = Arc::from(buffer_from_vector(samples(3)));
        let upstream = to_stream(buf);
        let mut s = shuffle_stream(upstream, 16, 1).unwrap();
        let mut count = 0;
        while s.next().unwrap().is_some() {
            count += 1;
        }
        assert_eq!(count, 3);
    }

    #[test]
    fn test_reservoir_shuffle_rejects_zero_capacity() {
        let buf: Arc<dyn Buffer> = Arc::from(buffer_from_vector(samples(3)));
        let upstream = to_stream(buf);
        assert!(shuffle_stream(upstream, 0, 1).is_err());
    }
}
