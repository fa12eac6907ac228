//! Fixed-size and dynamic (padding-aware) batching operators.

use dataloom_core::{Array, BoxBuffer, BoxStream, Buffer, Error, Result, Sample};

/// Collect `samples` into one batch sample: for every key present in *every* input sample,
/// stack that key's arrays along a new leading dimension. Keys missing from any sample are
/// dropped from the output, matching `batch(n)`'s "present in all samples" contract.
fn stack_samples(samples: &[Sample]) -> Result<Sample> {
    stack_samples_padding(samples, None)
}

/// Like [`stack_samples`], but if `pad_key` is set, every sample's array at that key is
/// zero-padded along dim 0 up to the longest one in the batch before stacking. This is how
/// `dynamic_batch` reconciles its variable-length selections into one rectangular array: the
/// "padded total data size" the batching algorithm bounds is realized here.
fn stack_samples_padding(samples: &[Sample], pad_key: Option<&str>) -> Result<Sample> {
    let mut out = Sample::new();
    if samples.is_empty() {
        return Ok(out);
    }
    let candidate_keys: Vec<&str> = samples[0].keys().collect();
    for key in candidate_keys {
        if !samples.iter().all(|s| s.contains_key(key)) {
            continue;
        }
        if pad_key == Some(key) {
            let arrays: Vec<&Array> = samples.iter().map(|s| s.get(key).unwrap()).collect();
            let max_len = arrays.iter().map(|a| a.len0()).max().unwrap_or(0);
            let zero = vec![0u8; arrays[0].dtype().elem_size()];
            let padded: Vec<Array> = arrays
                .iter()
                .map(|a| {
                    let extra = max_len - a.len0();
                    if extra == 0 {
                        Ok((*a).clone())
                    } else {
                        a.pad(0, 0, extra, &zero)
                    }
                })
                .collect::<Result<_>>()?;
            let refs: Vec<&Array> = padded.iter().collect();
            out.insert(key.to_string(), Array::stack(&refs)?);
            continue;
        }
        let arrays: Vec<&Array> = samples.iter().map(|s| s.get(key).unwrap()).collect();
        let stacked = Array::stack(&arrays)?;
        out.insert(key.to_string(), stacked);
    }
    Ok(out)
}

/// `batch(n)` — stream variant. Collects `n` upstream samples per call to `next()`; a
/// trailing partial batch at end-of-stream is still emitted.
struct BatchStream {
    upstream: BoxStream,
    n: usize,
}

impl dataloom_core::Stream for BatchStream {
    fn next(&mut self) -> Result<Option<Sample>> {
        let mut collected = Vec::with_capacity(self.n);
        for _ in 0..self.n {
            match self.upstream.next()? {
                Some(sample) => collected.push(sample),
                None => break,
            }
        }
        if collected.is_empty() {
            return Ok(None);
        }
        Ok(Some(stack_samples(&collected)?))
    }
}

/// `batch(n)` on a [`dataloom_core::Stream`].
pub fn batch_stream(upstream: BoxStream, n: usize) -> Result<BoxStream> {
    if n == 0 {
        return Err(Error::InvalidArgument("batch size must be >= 1".to_string()));
    }
    Ok(Box::new(BatchStream { upstream, n }))
}

/// A buffer of batches, each built by stacking `n` consecutive samples of an underlying
/// buffer (trailing partial batch included).
struct BatchedBuffer {
    inner: BoxBuffer,
    n: usize,
    num_batches: usize,
}

impl Buffer for BatchedBuffer {
    fn len(&self) -> usize {
        self.num_batches
    }

    fn get(&self, index: i64) -> Result<Sample> {
        let i = self.resolve_index(index)?;
        let start = i * self.n;
        let end = (start + self.n).min(self.inner.len());
        let mut collected = Vec::with_capacity(end - start);
        for j in start..end {
            collected.push(self.inner.get(j as i64)?);
        }
        stack_samples(&collected)
    }
}

/// `batch(n)` on a [`Buffer`].
pub fn batch_buffer(buffer: BoxBuffer, n: usize) -> Result<BoxBuffer> {
    if n == 0 {
        return Err(Error::InvalidArgument("batch size must be >= 1".to_string()));
    }
    let num_batches = buffer.len().div_ceil(n);
    Ok(Box::new(BatchedBuffer {
        inner: buffer,
        n,
        num_batches,
    }))
}

/// Length along dim 0 of `key` in `sample`, used by `dynamic_batch` to sort/size candidates.
fn length_of(sample: &Sample, key: &str) -> Result<usize> {
    Ok(sample.require(key)?.len0())
}

/// Greedily select a batch from the streaming lookahead window (arbitrary order — it reflects
/// upstream arrival order, not length order) that respects `max_data_size` / `min_data_size`:
/// take the longest available sample to fix `L_max`, then pull shorter samples (shortest-first)
/// while the padded total stays within budget. This is the right rule when all you have is an
/// unsorted window, but it is *not* reused by the buffer variant: with the whole distribution
/// known up front, sweeping contiguous neighbors off the sorted array (see
/// `dynamic_batch_buffer`) keeps far more of a batch's members close to `L_max` and so wastes
/// much less padding. Returns the *indices into `window`* to remove, longest first so removal
/// order doesn't invalidate earlier indices.
fn select_dynamic_batch(
    lengths: &[usize],
    max_data_size: usize,
    min_data_size: usize,
    at_eos: bool,
) -> Option<Vec<usize>> {
    if lengths.is_empty() {
        return None;
    }
    let (longest_idx, &l_max) = lengths
        .iter()
        .enumerate()
        .max_by_key(|(_, &l)| l)
        .expect("non-empty");
    if l_max == 0 {
        return None;
    }
    let target_batch_size = (max_data_size / l_max).max(1);

    let mut candidates: Vec<usize> = (0..lengths.len()).filter(|&i| i != longest_idx).collect();
    candidates.sort_by_key(|&i| lengths[i]);

    let mut selected = vec![longest_idx];
    for &idx in &candidates {
        if selected.len() >= target_batch_size {
            break;
        }
        let prospective_size = (selected.len() + 1) * l_max;
        if prospective_size <= max_data_size {
            selected.push(idx);
        }
    }

    let total = selected.len() * l_max;
    if min_data_size > 0 && total < min_data_size && !at_eos {
        // Wait for more samples unless we're already at end-of-stream.
        return None;
    }

    selected.sort_unstable_by(|a, b| b.cmp(a));
    Some(selected)
}

/// `dynamic_batch(key, max_data_size, min_data_size=0, buffer_size)` — stream variant.
pub struct DynamicBatchStream {
    upstream: BoxStream,
    key: String,
    max_data_size: usize,
    min_data_size: usize,
    buffer_size: usize,
    window: Vec<Sample>,
    lengths: Vec<usize>,
    upstream_done: bool,
}

impl DynamicBatchStream {
    fn fill(&mut self) -> Result<()> {
        while !self.upstream_done && self.window.len() < self.buffer_size {
            match self.upstream.next()? {
                Some(sample) => {
                    let len = length_of(&sample, &self.key)?;
                    self.window.push(sample);
                    self.lengths.push(len);
                }
                None => self.upstream_done = true,
            }
        }
        Ok(())
    }
}

impl dataloom_core::Stream for DynamicBatchStream {
    fn next(&mut self) -> Result<Option<Sample>> {
        loop {
            self.fill()?;
            if self.window.is_empty() {
                return Ok(None);
            }
            match select_dynamic_batch(
                &self.lengths,
                self.max_data_size,
                self.min_data_size,
                self.upstream_done,
            ) {
                Some(indices) => {
                    let mut picked = Vec::with_capacity(indices.len());
                    for idx in indices {
                        picked.push(self.window.remove(idx));
                        self.lengths.remove(idx);
                    }
                    return Ok(Some(stack_samples_padding(&picked, Some(&self.key))?));
                }
                None => {
                    if self.upstream_done {
                        return Ok(None);
                    }
                    // Need more samples before a batch meeting min_data_size can form.
                    self.buffer_size += 1;
                }
            }
        }
    }
}

/// `dynamic_batch(key, max_data_size, min_data_size=0, buffer_size)` on a
/// [`dataloom_core::Stream`].
pub fn dynamic_batch_stream(
    upstream: BoxStream,
    key: impl Into<String>,
    max_data_size: usize,
    min_data_size: usize,
    buffer_size: usize,
) -> Result<BoxStream> {
    if max_data_size == 0 {
        return Err(Error::InvalidArgument("max_data_size must be >= 1".to_string()));
    }
    if buffer_size == 0 {
        return Err(Error::InvalidArgument("buffer_size must be >= 1".to_string()));
    }
    Ok(Box::new(DynamicBatchStream {
        upstream,
        key: key.into(),
        max_data_size,
        min_data_size,
        buffer_size,
        window: Vec::new(),
        lengths: Vec::new(),
        upstream_done: false,
    }))
}

/// `dynamic_batch(key, max_data_size, min_data_size=0)` — buffer variant. Sorts the entire
/// buffer by length once, then sweeps from the longest sample down, taking a contiguous run
/// of `floor(max_data_size / L_max)` samples per batch (`L_max` is the run's own longest
/// member). Unlike the streaming variant, the whole length distribution is known up front, so
/// each batch's members are chosen from among their length-neighbors rather than the
/// window-relative "longest + shortest-available" rule the stream variant needs when it only
/// ever sees an unsorted lookahead buffer — grouping neighbors this way is what keeps the
/// padded waste low (see `DESIGN.md`'s batch.rs entry). `min_data_size` has no effect here:
/// with the full buffer in hand up front there is nothing left to wait for, every sample is
/// placed into exactly one output batch regardless.
pub fn dynamic_batch_buffer(
    buffer: BoxBuffer,
    key: impl Into<String>,
    max_data_size: usize,
    _min_data_size: usize,
) -> Result<BoxBuffer> {
    let key = key.into();
    if max_data_size == 0 {
        return Err(Error::InvalidArgument("max_data_size must be >= 1".to_string()));
    }
    let mut samples = Vec::with_capacity(buffer.len());
    for i in 0..buffer.len() {
        samples.push(buffer.get(i as i64)?);
    }
    let lengths: Vec<usize> = samples
        .iter()
        .map(|s| length_of(s, &key))
        .collect::<Result<_>>()?;
    let mut order: Vec<usize> = (0..samples.len()).collect();
    order.sort_by_key(|&i| lengths[i]);
    let sorted_samples: Vec<Sample> = order.iter().map(|&i| samples[i].clone()).collect();
    let sorted_lengths: Vec<usize> = order.iter().map(|&i| lengths[i]).collect();

    let mut batches = Vec::new();
    let mut end = sorted_samples.len();
    while end > 0 {
        let l_max = sorted_lengths[end - 1];
        if l_max == 0 {
            break;
        }
        let target_batch_size = (max_data_size / l_max).max(1);
        let start = end.saturating_sub(target_batch_size);
        batches.push(stack_samples_padding(&sorted_samples[start..end], Some(&key))?);
        end = start;
    }
    Ok(dataloom_core::buffer_from_vector(batches))
}
