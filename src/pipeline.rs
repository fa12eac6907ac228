//! The fluent pipeline-builder surface: `PipelineBuffer`/`PipelineStream` chain every operator
//! from `dataloom-core`/`dataloom-ops`/`dataloom-prefetch` the way a fluent handle chains
//! configuration calls onto a running engine.

use std::sync::Arc;

use dataloom_core::{Array, BoxBuffer, BoxStream, Buffer, Result, Sample, Stream};
use dataloom_ops::transform::{self, BoxTransform};

/// A finite, random-access pipeline stage. Per-sample transforms wrap eagerly (buffer
/// indexing has no "drop on failure" concept, so there's nothing to gain by deferring them).
pub struct PipelineBuffer {
    inner: BoxBuffer,
}

/// A forward-only pipeline stage. Stateless per-sample transforms accumulate in `pending`
/// without being applied yet, so a subsequent `.prefetch()`/`.ordered_prefetch()` call can
/// hand the whole chain to its worker pool at once, instead of running it on the consumer
/// thread. Any stateful operator (or a terminal call like `.to_buffer()`/`.next()`) flushes
/// the pending chain inline first.
pub struct PipelineStream {
    upstream: BoxStream,
    pending: Vec<BoxTransform>,
}

impl PipelineBuffer {
    fn wrap(inner: BoxBuffer) -> Self {
        Self { inner }
    }

    pub fn into_inner(self) -> BoxBuffer {
        self.inner
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    pub fn get(&self, index: i64) -> Result<Sample> {
        Ok(self.inner.get(index)?)
    }

    /// `buffer.to_stream()`.
    pub fn to_stream(self) -> PipelineStream {
        let shared: Arc<dyn Buffer> = Arc::from(self.inner);
        PipelineStream {
            upstream: dataloom_core::to_stream(shared),
            pending: Vec::new(),
        }
    }

    /// `shuffle()`, seeded from a process-wide entropy source.
    pub fn shuffle(self) -> Self {
        self.shuffle_seeded(rand::random())
    }

    /// `shuffle()` with a caller-supplied seed, for reproducible runs.
    pub fn shuffle_seeded(self, seed: u64) -> Self {
        Self::wrap(dataloom_ops::shuffle_buffer(self.inner, seed))
    }

    /// `batch(n)`.
    pub fn batch(self, n: usize) -> Result<Self> {
        Ok(Self::wrap(dataloom_ops::batch_buffer(self.inner, n)?))
    }

    /// `dynamic_batch(key, max_data_size, min_data_size=0)`.
    pub fn dynamic_batch(
        self,
        key: impl Into<String>,
        max_data_size: usize,
        min_data_size: usize,
    ) -> Result<Self> {
        Ok(Self::wrap(dataloom_ops::dynamic_batch_buffer(
            self.inner,
            key,
            max_data_size,
            min_data_size,
        )?))
    }

    /// `partition(index, num_partitions)` — deterministic sharding, e.g. across data-parallel
    /// worker ranks.
    pub fn partition(self, index: usize, num_partitions: usize) -> Result<Self> {
        Ok(Self::wrap(transform::partition(
            self.inner,
            index,
            num_partitions,
        )?))
    }

    fn transformed(self, t: BoxTransform) -> Self {
        Self::wrap(transform::apply_to_buffer(self.inner, t))
    }

    pub fn key_transform<F>(self, key: impl Into<String>, f: F, out_key: Option<String>) -> Self
    where
        F: Fn(&Array) -> Result<Array> + Send + Sync + 'static,
    {
        let t = transform::key_transform(key, f, out_key);
        self.transformed(t)
    }

    pub fn sample_transform<F>(self, f: F) -> Self
    where
        F: Fn(Sample) -> Result<Sample> + Send + Sync + 'static,
    {
        self.transformed(transform::sample_transform(f))
    }

    /// `filter_key(key, remove)` — `remove=false` drops samples missing `key` (surfaced as a
    /// [`dataloom_core::Error::Coverage`] from `get()`, since a buffer can't silently shrink
    /// on one call); `remove=true` drops the key from every sample instead.
    pub fn filter_key(self, key: impl Into<String>, remove: bool) -> Self {
        let key = key.into();
        let t = if remove {
            transform::filter_key_remove(key)
        } else {
            transform::filter_key_require(key)
        };
        self.transformed(t)
    }

    pub fn rename(self, old: impl Into<String>, new: impl Into<String>) -> Self {
        self.transformed(transform::rename(old, new))
    }

    pub fn slice(self, key: impl Into<String>, dim: usize, start: usize, end: usize) -> Self {
        self.transformed(transform::slice(key, dim, start, end))
    }

    pub fn replace(
        self,
        key: impl Into<String>,
        needle: impl Into<Vec<u8>>,
        replacement: impl Into<Vec<u8>>,
        max_count: i64,
    ) -> Self {
        self.transformed(transform::replace(key, needle, replacement, max_count))
    }

    pub fn squeeze(self, key: impl Into<String>, dim: Option<usize>) -> Self {
        self.transformed(transform::squeeze(key, dim))
    }

    pub fn shape(self, key: impl Into<String>, out_key: impl Into<String>, dim: usize) -> Self {
        self.transformed(transform::shape_op(key, out_key, dim))
    }
}

impl PipelineStream {
    fn wrap(upstream: BoxStream) -> Self {
        Self {
            upstream,
            pending: Vec::new(),
        }
    }

    /// Apply any accumulated stateless transforms inline (main-thread, drop-on-failure) and
    /// return the resulting plain stream. Every stateful operator and every terminal call
    /// routes through this first.
    fn flush(self) -> BoxStream {
        let mut stream = self.upstream;
        for t in self.pending {
            stream = transform::apply_to_stream(stream, t);
        }
        stream
    }

    pub fn into_inner(self) -> BoxStream {
        self.flush()
    }

    pub fn next(&mut self) -> Result<Option<Sample>> {
        if !self.pending.is_empty() {
            let flushed = std::mem::replace(&mut self.upstream, Box::new(EmptyStream));
            let flushed = PipelineStream {
                upstream: flushed,
                pending: std::mem::take(&mut self.pending),
            }
            .flush();
            self.upstream = flushed;
        }
        Ok(self.upstream.next()?)
    }

    /// `stream.to_buffer()` — drains to end-of-stream and materializes every sample.
    pub fn to_buffer(self) -> Result<PipelineBuffer> {
        Ok(PipelineBuffer::wrap(dataloom_core::to_buffer(
            self.flush(),
        )?))
    }

    /// `shuffle(buffer_size)`, seeded from a process-wide entropy source.
    pub fn shuffle(self, buffer_size: usize) -> Result<Self> {
        self.shuffle_seeded(buffer_size, rand::random())
    }

    pub fn shuffle_seeded(self, buffer_size: usize, seed: u64) -> Result<Self> {
        Ok(Self::wrap(dataloom_ops::shuffle_stream(
            self.flush(),
            buffer_size,
            seed,
        )?))
    }

    /// `batch(n)`.
    pub fn batch(self, n: usize) -> Result<Self> {
        Ok(Self::wrap(dataloom_ops::batch_stream(self.flush(), n)?))
    }

    /// `dynamic_batch(key, max_data_size, min_data_size=0, buffer_size)`.
    pub fn dynamic_batch(
        self,
        key: impl Into<String>,
        max_data_size: usize,
        min_data_size: usize,
        buffer_size: usize,
    ) -> Result<Self> {
        Ok(Self::wrap(dataloom_ops::dynamic_batch_stream(
            self.flush(),
            key,
            max_data_size,
            min_data_size,
            buffer_size,
        )?))
    }

    /// `sliding_window(key, size, stride)`.
    pub fn sliding_window(self, key: impl Into<String>, size: usize, stride: usize) -> Result<Self> {
        Ok(Self::wrap(dataloom_ops::sliding_window(
            self.flush(),
            key,
            size,
            stride,
        )?))
    }

    /// `repeat(n)` (`n = -1` for infinite).
    pub fn repeat(self, n: i64) -> Result<Self> {
        Ok(Self::wrap(dataloom_ops::repeat(self.flush(), n)?))
    }

    /// `prefetch(prefetch_size, num_threads)` — unordered concurrent prefetch; hands the
    /// accumulated stateless-transform chain to the worker pool instead of flushing it inline.
    pub fn prefetch(self, prefetch_size: usize, num_threads: usize) -> Result<Self> {
        Ok(Self::wrap(dataloom_prefetch::prefetch(
            self.upstream,
            self.pending,
            prefetch_size,
            num_threads,
        )?))
    }

    /// `ordered_prefetch(prefetch_size, num_threads)` — order-preserving concurrent prefetch.
    pub fn ordered_prefetch(self, prefetch_size: usize, num_threads: usize) -> Result<Self> {
        Ok(Self::wrap(dataloom_prefetch::ordered_prefetch(
            self.upstream,
            self.pending,
            prefetch_size,
            num_threads,
        )?))
    }

    fn queued(mut self, t: BoxTransform) -> Self {
        self.pending.push(t);
        self
    }

    pub fn key_transform<F>(self, key: impl Into<String>, f: F, out_key: Option<String>) -> Self
    where
        F: Fn(&Array) -> Result<Array> + Send + Sync + 'static,
    {
        let t = transform::key_transform(key, f, out_key);
        self.queued(t)
    }

    pub fn sample_transform<F>(self, f: F) -> Self
    where
        F: Fn(Sample) -> Result<Sample> + Send + Sync + 'static,
    {
        self.queued(transform::sample_transform(f))
    }

    /// `filter_key(key, remove)` — `remove=false` drops samples missing `key`; `remove=true`
    /// drops the key from every sample instead. Both are expressed as queued transforms, so
    /// they ride along with `.prefetch()`/`.ordered_prefetch()` like any other stateless op.
    pub fn filter_key(self, key: impl Into<String>, remove: bool) -> Self {
        let key = key.into();
        let t = if remove {
            transform::filter_key_remove(key)
        } else {
            transform::filter_key_require(key)
        };
        self.queued(t)
    }

    pub fn rename(self, old: impl Into<String>, new: impl Into<String>) -> Self {
        self.queued(transform::rename(old, new))
    }

    pub fn slice(self, key: impl Into<String>, dim: usize, start: usize, end: usize) -> Self {
        self.queued(transform::slice(key, dim, start, end))
    }

    pub fn replace(
        self,
        key: impl Into<String>,
        needle: impl Into<Vec<u8>>,
        replacement: impl Into<Vec<u8>>,
        max_count: i64,
    ) -> Self {
        self.queued(transform::replace(key, needle, replacement, max_count))
    }

    pub fn squeeze(self, key: impl Into<String>, dim: Option<usize>) -> Self {
        self.queued(transform::squeeze(key, dim))
    }

    pub fn shape(self, key: impl Into<String>, out_key: impl Into<String>, dim: usize) -> Self {
        self.queued(transform::shape_op(key, out_key, dim))
    }

    /// `pad(key, dim, left, right, value)` — a stateless per-sample rewrite, queued like the
    /// other transforms above.
    pub fn pad(self, key: impl Into<String>, dim: usize, left: usize, right: usize, value: Vec<u8>) -> Self {
        self.queued(dataloom_ops::pad(key, dim, left, right, value))
    }
}

/// A trivial always-empty stream, used only as a placeholder while `PipelineStream::next`
/// temporarily takes ownership of `self.upstream` to flush the pending chain into it.
struct EmptyStream;

impl Stream for EmptyStream {
    fn next(&mut self) -> Result<Option<Sample>> {
        Ok(None)
    }
}

/// `buffer_from_vector(samples) -> Buffer`.
pub fn buffer_from_vector(samples: Vec<Sample>) -> PipelineBuffer {
    PipelineBuffer::wrap(dataloom_core::buffer_from_vector(samples))
}

/// `stream_from_iterable_factory(() -> Iterator<Sample>) -> Stream`.
pub fn stream_from_iterable_factory<F>(factory: F) -> PipelineStream
where
    F: Fn() -> Box<dyn Iterator<Item = Result<Sample>> + Send> + Send + 'static,
{
    PipelineStream::wrap(Box::new(dataloom_core::stream::FactoryStream::new(factory)))
}

/// `stream_line_reader(path, out_key) -> Stream`.
pub fn stream_line_reader(
    path: impl AsRef<std::path::Path>,
    out_key: impl Into<String>,
) -> Result<PipelineStream> {
    Ok(PipelineStream::wrap(dataloom_ops::stream_line_reader(
        path, out_key,
    )?))
}

/// `files_from_tar(path, nested=false, num_threads=1) -> Buffer`.
pub fn files_from_tar(
    path: impl AsRef<std::path::Path>,
    nested: bool,
    num_threads: usize,
) -> Result<PipelineBuffer> {
    Ok(PipelineBuffer::wrap(dataloom_ops::files_from_tar(
        path,
        nested,
        num_threads,
    )?))
}
