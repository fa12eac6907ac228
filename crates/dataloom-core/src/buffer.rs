//! Finite, random-access sample sequences.

use crate::error::{Error, Result};
use crate::sample::Sample;
use crate::stream::{BoxStream, Stream};

/// A finite, random-access sequence of samples with O(1) `len()`/`get()`.
///
/// Negative indices wrap from the end (`i < 0 => len() + i`); an index still out of
/// `[0, len())` after wrapping fails with [`Error::Range`].
pub trait Buffer: Send + Sync {
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Fetch the sample at `index`, which may be negative to index from the end.
    fn get(&self, index: i64) -> Result<Sample>;

    /// Resolve a possibly-negative index into an in-range `usize`, or a [`Error::Range`].
    fn resolve_index(&self, index: i64) -> Result<usize> {
        let len = self.len() as i64;
        let resolved = if index < 0 { len + index } else { index };
        if resolved < 0 || resolved >= len {
            return Err(Error::Range {
                index,
                len: self.len(),
            });
        }
        Ok(resolved as usize)
    }
}

pub type BoxBuffer = Box<dyn Buffer>;

/// A buffer backed directly by an in-memory `Vec<Sample>`. Grounds `buffer_from_vector`.
pub struct VecBuffer {
    samples: Vec<Sample>,
}

impl VecBuffer {
    pub fn new(samples: Vec<Sample>) -> Self {
        Self { samples }
    }
}

impl Buffer for VecBuffer {
    fn len(&self) -> usize {
        self.samples.len()
    }

    fn get(&self, index: i64) -> Result<Sample> {
        let i = self.resolve_index(index)?;
        Ok(self.samples[i].clone())
    }
}

/// `buffer_from_vector(samples) -> Buffer`.
pub fn buffer_from_vector(samples: Vec<Sample>) -> BoxBuffer {
    Box::new(VecBuffer::new(samples))
}

/// Sequential forward-only view over a [`Buffer`], used by `to_stream`.
struct BufferStream {
    buffer: std::sync::Arc<dyn Buffer>,
    next_index: usize,
}

impl Stream for BufferStream {
    fn next(&mut self) -> Result<Option<Sample>> {
        if self.next_index >= self.buffer.len() {
            return Ok(None);
        }
        let sample = self.buffer.get(self.next_index as i64)?;
        self.next_index += 1;
        Ok(Some(sample))
    }

    fn is_restartable(&self) -> bool {
        true
    }

    fn reset(&mut self) -> Result<()> {
        self.next_index = 0;
        Ok(())
    }
}

/// `to_stream(buffer) -> Stream`: a restartable, forward-only view over a buffer's samples
/// in index order.
pub fn to_stream(buffer: std::sync::Arc<dyn Buffer>) -> BoxStream {
    Box::new(BufferStream {
        buffer,
        next_index: 0,
    })
}

/// A buffer materialized by fully draining a stream into memory. Grounds `to_buffer`.
pub struct MaterializedBuffer {
    samples: Vec<Sample>,
}

impl Buffer for MaterializedBuffer {
    fn len(&self) -> usize {
        self.samples.len()
    }

    fn get(&self, index: i64) -> Result<Sample> {
        let i = self.resolve_index(index)?;
        Ok(self.samples[i].clone())
    }
}

/// `to_buffer(stream) -> Buffer`: drains `stream` to end-of-stream and materializes every
/// sample into a random-access buffer. The stream must be finite.
pub fn to_buffer(mut stream: BoxStream) -> Result<BoxBuffer> {
    let mut samples = Vec::new();
    while let Some(sample) = stream.next()? {
        samples.push(sample);
    }
    Ok(Box::new(MaterializedBuffer { samples }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::Array;
    use std::sync::Arc;

    fn sample_with_i(i: i32) -> Sample {
        Sample::new().with("i", Array::scalar(i))
    }

    fn get_i(s: &Sample) -> i32 {
        s.get("i").unwrap().as_slice::<i32>().unwrap()[0]
    }

    fn five_samples() -> BoxBuffer {
        buffer_from_vector((0..5).map(sample_with_i).collect())
    }

    #[test]
    fn test_indexing_forward_and_negative() {
        let b = five_samples();
        assert_eq!(get_i(&b.get(3).unwrap()), 3);
        assert_eq!(get_i(&b.get(-1).unwrap()), 4);
    }

    #[test]
    fn test_out_of_range_is_range_error() {
        let b = five_samples();
        let err = b.get(5).unwrap_err();
        assert!(matches!(err, Error::Range { index: 5, len: 5 }));
    }

    #[test]
    fn test_negative_still_out_of_range() {
        let b = five_samples();
        let err = b.get(-6).unwrap_err();
        assert!(matches!(err, Error::Range { index: -6, len: 5 }));
    }

    #[test]
    fn test_to_stream_then_to_buffer_roundtrip() {
        let b: Arc<dyn Buffer> = Arc::from(five_samples());
        let stream = to_stream(b);
        let materialized = to_buffer(stream).unwrap();
        assert_eq!(materialized.len(), 5);
        assert_eq!(get_i(&materialized.get(0).unwrap()), 0);
        assert_eq!(get_i(&materialized.get(-1).unwrap()), 4);
    }
}
