//! Forward-only, possibly infinite sample iterators.

use crate::error::Result;
use crate::sample::Sample;

/// A single-reader forward iterator of samples.
///
/// `next()` yields `Ok(Some(sample))`, `Ok(None)` at end-of-stream, or `Err` on failure. Once
/// a stream yields `Err`, it is permanently failed — callers must not call `next()` again.
/// A stream built over a restartable source (a [`crate::buffer::Buffer`], a file list, a
/// user-supplied factory) may additionally support [`Stream::reset`]; one built over an
/// inherently single-pass source (e.g. a line reader over a pipe) does not.
pub trait Stream: Send {
    fn next(&mut self) -> Result<Option<Sample>>;

    /// Whether this stream can be rewound to its start via [`Stream::reset`].
    fn is_restartable(&self) -> bool {
        false
    }

    /// Rewind to the start of the stream. Implementations that are not restartable should
    /// return a [`crate::error::Error::StreamAborted`].
    fn reset(&mut self) -> Result<()> {
        Err(crate::error::Error::StreamAborted(
            "stream is not restartable".to_string(),
        ))
    }
}

/// Boxed trait object alias used throughout the operator surface, since each operator wraps
/// its upstream in a new concrete `Stream` implementation.
pub type BoxStream = Box<dyn Stream>;

/// Adapts any `FnMut() -> Result<Option<Sample>>` factory-produced iterator into a `Stream`.
/// Grounds `stream_from_iterable_factory` from the operator surface.
pub struct FactoryStream<F> {
    factory: F,
    inner: Box<dyn Iterator<Item = Result<Sample>> + Send>,
}

impl<F> FactoryStream<F>
where
    F: Fn() -> Box<dyn Iterator<Item = Result<Sample>> + Send> + Send,
{
    pub fn new(factory: F) -> Self {
        let inner = factory();
        Self { factory, inner }
    }
}

impl<F> Stream for FactoryStream<F>
where
    F: Fn() -> Box<dyn Iterator<Item = Result<Sample>> + Send> + Send,
{
    fn next(&mut self) -> Result<Option<Sample>> {
        match self.inner.next() {
            Some(Ok(s)) => Ok(Some(s)),
            Some(Err(e)) => Err(e),
            None => Ok(None),
        }
    }

    fn is_restartable(&self) -> bool {
        true
    }

    fn reset(&mut self) -> Result<()> {
        self.inner = (self.factory)();
        Ok(())
    }
}
