//! `sliding_window` (one sample in, many out) and `pad` (per-sample array padding).

use dataloom_core::{BoxStream, Error, Result, Sample, Stream};

/// `pad(key, dim, left, right, value)`.
pub fn pad(
    key: impl Into<String>,
    dim: usize,
    left: usize,
    right: usize,
    value_bytes: Vec<u8>,
) -> crate::transform::BoxTransform {
    let key = key.into();
    crate::transform::from_fn(move |mut sample: Sample| {
        let padded = sample.require(&key)?.pad(dim, left, right, &value_bytes)?;
        sample.insert(key.clone(), padded);
        Ok(sample)
    })
}

/// `sliding_window(key, size, stride)` — expands one upstream sample into
/// `⌈(L−size)/stride⌉+1` windowed samples (L = length along dim 0 of `key`); yields zero
/// samples if `L < size`. All other keys of the source sample are carried unchanged into
/// every emitted window.
struct SlidingWindowStream {
    upstream: BoxStream,
    key: String,
    size: usize,
    stride: usize,
    pending: std::collections::VecDeque<Sample>,
}

impl SlidingWindowStream {
    fn expand(&self, sample: &Sample) -> Result<Vec<Sample>> {
        let array = sample.require(&self.key)?;
        let len = array.len0();
        if len < self.size {
            return Ok(Vec::new());
        }
        let num_windows = (len - self.size).div_ceil(self.stride) + 1;
        let mut out = Vec::with_capacity(num_windows);
        for w in 0..num_windows {
            let start = w * self.stride;
            let end = (start + self.size).min(len);
            let windowed = array.slice_dim(0, start, end)?;
            let mut s = sample.clone();
            s.insert(self.key.clone(), windowed);
            out.push(s);
        }
        Ok(out)
    }
}

impl Stream for SlidingWindowStream {
    fn next(&mut self) -> Result<Option<Sample>> {
        loop {
            if let Some(s) = self.pending.pop_front() {
                return Ok(Some(s));
            }
            match self.upstream.next()? {
                Some(sample) => {
                    let windows = self.expand(&sample)?;
                    self.pending.extend(windows);
                }
                None => return Ok(None),
            }
        }
    }
}

/// `sliding_window(key, size, stride)` on a [`dataloom_core::Stream`].
pub fn sliding_window(upstream: BoxStream, key: impl Into<String>, size: usize, stride: usize) -> Result<BoxStream> {
    if size == 0 || stride == 0 {
        return Err(Error::InvalidArgument(
            "sliding_window size and stride must be >= 1".to_string(),
        ));
    }
    Ok(Box::new(SlidingWindowStream {
        upstream,
        key: key.into(),
        size,
        stride,
        pending: std::collections::VecDeque::new(),
    }))
}
