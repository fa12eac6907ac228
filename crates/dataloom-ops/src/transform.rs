//! Stateless per-sample transforms. Each constructor returns an `Arc<dyn Transform>` so the
//! resulting operator can be shared freely across prefetch worker threads.

use std::sync::Arc;

use dataloom_core::{Array, BoxBuffer, BoxStream, Buffer, Error, Result, Sample, Stream};

/// A stateless, per-sample operator. Safe to run concurrently from multiple worker threads
/// since it only ever sees one sample at a time and holds no mutable state of its own.
pub trait Transform: Send + Sync {
    fn apply(&self, sample: Sample) -> Result<Sample>;
}

pub type BoxTransform = Arc<dyn Transform>;

struct FnTransform<F>(F);

impl<F> Transform for FnTransform<F>
where
    F: Fn(Sample) -> Result<Sample> + Send + Sync,
{
    fn apply(&self, sample: Sample) -> Result<Sample> {
        (self.0)(sample)
    }
}

/// Wrap an arbitrary per-sample closure as a [`Transform`]. Exposed so sibling modules (e.g.
/// `window::pad`) can build transforms without duplicating the `FnTransform` plumbing.
pub fn from_fn<F>(f: F) -> BoxTransform
where
    F: Fn(Sample) -> Result<Sample> + Send + Sync + 'static,
{
    Arc::new(FnTransform(f))
}

/// `key_transform(key, fn, out_key?=key)` — replace `key` with `fn(array)`, writing the
/// result to `out_key` (defaulting to `key`). The caller of the returned transform (typically
/// a prefetch worker) is responsible for logging and dropping the sample when `fn` fails, per
/// the per-sample-stateless family's "drop on failure" contract.
pub fn key_transform<F>(key: impl Into<String>, f: F, out_key: Option<String>) -> BoxTransform
where
    F: Fn(&Array) -> Result<Array> + Send + Sync + 'static,
{
    let key = key.into();
    from_fn(move |mut sample: Sample| {
        let out_key = out_key.clone().unwrap_or_else(|| key.clone());
        let array = sample.require(&key)?;
        let transformed = f(array)?;
        sample.insert(out_key, transformed);
        Ok(sample)
    })
}

/// `sample_transform(fn)` — replace the whole sample with `fn(sample)`. If the callback
/// returns an empty sample, the caller should treat this as a filtered-out sample; this
/// transform surfaces that as-is (callers check `Sample::is_empty()` after applying).
pub fn sample_transform<F>(f: F) -> BoxTransform
where
    F: Fn(Sample) -> Result<Sample> + Send + Sync + 'static,
{
    from_fn(f)
}

/// `filter_key(key, remove=false)` — the default (non-removing) half: drop any sample that
/// does not carry `key` at all. Expressed as a transform that fails with [`Error::Coverage`]
/// when `key` is absent, since every transform chain already treats a failing transform as
/// "drop this sample" (see `apply_chain` in `dataloom-prefetch`).
pub fn filter_key_require(key: impl Into<String>) -> BoxTransform {
    let key = key.into();
    from_fn(move |sample: Sample| {
        require_present(&sample, &key)?;
        Ok(sample)
    })
}

/// `filter_key(key, remove=true)` — drops `key` from every sample it appears on, leaving
/// samples that never had it untouched.
pub fn filter_key_remove(key: impl Into<String>) -> BoxTransform {
    let key = key.into();
    from_fn(move |mut sample: Sample| {
        sample.remove(&key);
        Ok(sample)
    })
}

/// `rename(old, new)`.
pub fn rename(old: impl Into<String>, new: impl Into<String>) -> BoxTransform {
    let old = old.into();
    let new = new.into();
    from_fn(move |mut sample: Sample| {
        sample.rename(&old, &new);
        Ok(sample)
    })
}

/// `slice(key, dim, start, end)`.
pub fn slice(key: impl Into<String>, dim: usize, start: usize, end: usize) -> BoxTransform {
    let key = key.into();
    from_fn(move |mut sample: Sample| {
        let sliced = sample.require(&key)?.slice_dim(dim, start, end)?;
        sample.insert(key.clone(), sliced);
        Ok(sample)
    })
}

/// `replace(key, needle, replacement, max_count=-1)`.
pub fn replace(
    key: impl Into<String>,
    needle: impl Into<Vec<u8>>,
    replacement: impl Into<Vec<u8>>,
    max_count: i64,
) -> BoxTransform {
    let key = key.into();
    let needle = needle.into();
    let replacement = replacement.into();
    from_fn(move |mut sample: Sample| {
        let replaced = sample
            .require(&key)?
            .replace_bytes(&needle, &replacement, max_count)?;
        sample.insert(key.clone(), replaced);
        Ok(sample)
    })
}

/// `squeeze(key, dim?)`.
pub fn squeeze(key: impl Into<String>, dim: Option<usize>) -> BoxTransform {
    let key = key.into();
    from_fn(move |mut sample: Sample| {
        let squeezed = sample.require(&key)?.squeeze(dim)?;
        sample.insert(key.clone(), squeezed);
        Ok(sample)
    })
}

/// `shape(key, out_key, dim)`.
pub fn shape_op(key: impl Into<String>, out_key: impl Into<String>, dim: usize) -> BoxTransform {
    let key = key.into();
    let out_key = out_key.into();
    from_fn(move |mut sample: Sample| {
        let size = sample.require(&key)?.dim_size(dim)?;
        sample.insert(out_key.clone(), size);
        Ok(sample)
    })
}

/// Check whether a sample passes the "has this key" predicate used by `filter_key(key)`
/// (the drop-sample half, applied by the stream/buffer adapter, not this module's
/// [`Transform`] values).
pub fn has_key(sample: &Sample, key: &str) -> bool {
    sample.contains_key(key)
}

/// Surface a consistent error when a required key is entirely absent, used by callers that
/// need an explicit error instead of a silent drop (e.g. `batch`'s per-key concatenation).
pub fn require_present(sample: &Sample, key: &str) -> Result<()> {
    if sample.contains_key(key) {
        Ok(())
    } else {
        Err(Error::Coverage(format!("missing key '{key}'")))
    }
}

/// A contiguous, non-shuffled shard of an underlying buffer, indexed `0..shard.len()`.
struct PartitionBuffer {
    inner: BoxBuffer,
    start: usize,
    len: usize,
}

impl Buffer for PartitionBuffer {
    fn len(&self) -> usize {
        self.len
    }

    fn get(&self, index: i64) -> Result<Sample> {
        let i = self.resolve_index(index)?;
        self.inner.get((self.start + i) as i64)
    }
}

/// `partition(index, num_partitions)` — deterministic, non-shuffled sharding of a buffer into
/// `num_partitions` contiguous slices; `index` selects which slice this call returns. Slices
/// are as equal as possible: the first `len % num_partitions` partitions get one extra sample.
pub fn partition(buffer: BoxBuffer, index: usize, num_partitions: usize) -> Result<BoxBuffer> {
    if num_partitions == 0 || index >= num_partitions {
        return Err(Error::InvalidArgument(format!(
            "partition index {index} out of range for {num_partitions} partitions"
        )));
    }
    let total = buffer.len();
    let base = total / num_partitions;
    let remainder = total % num_partitions;
    let start = index * base + index.min(remainder);
    let len = base + if index < remainder { 1 } else { 0 };
    Ok(Box::new(PartitionBuffer {
        inner: buffer,
        start,
        len,
    }))
}

/// Applies `transform` to every sample of a stream run without a prefetch stage, dropping a
/// sample whenever the transform fails or returns an empty mapping — the same failure policy
/// `dataloom-prefetch`'s worker chain applies, just inline on the consumer thread.
struct TransformStream {
    upstream: BoxStream,
    transform: BoxTransform,
}

impl Stream for TransformStream {
    fn next(&mut self) -> Result<Option<Sample>> {
        loop {
            match self.upstream.next()? {
                Some(sample) => match self.transform.apply(sample) {
                    Ok(out) if !out.is_empty() => return Ok(Some(out)),
                    Ok(_) => continue,
                    Err(e) => {
                        log::debug!("dropping sample, transform failed: {e}");
                        continue;
                    }
                },
                None => return Ok(None),
            }
        }
    }
}

/// Wrap `upstream` so every sample passes through `transform` before reaching the consumer.
pub fn apply_to_stream(upstream: BoxStream, transform: BoxTransform) -> BoxStream {
    Box::new(TransformStream { upstream, transform })
}

/// Applies `transform` to a buffer's samples at access time. Unlike the stream variant, a
/// buffer's indexing contract has no notion of "drop" — a failing or emptying transform
/// surfaces its error straight through `get()`.
struct TransformBuffer {
    inner: BoxBuffer,
    transform: BoxTransform,
}

impl Buffer for TransformBuffer {
    fn len(&self) -> usize {
        self.inner.len()
    }

    fn get(&self, index: i64) -> Result<Sample> {
        let sample = self.inner.get(index)?;
        self.transform.apply(sample)
    }
}

/// Wrap `buffer` so every `get(i)` passes its sample through `transform` first.
pub fn apply_to_buffer(buffer: BoxBuffer, transform: BoxTransform) -> BoxBuffer {
    Box::new(TransformBuffer {
        inner: buffer,
        transform,
    })
}
