//! `repeat(n)` — replay a restartable source `n` times (`n = -1` means infinite).

use dataloom_core::{BoxStream, Error, Result, Sample, Stream};

/// Replays `source` `n` times end to end, `n < 0` meaning unboundedly. `source` must be
/// restartable ([`Stream::is_restartable`]); a non-restartable source fails immediately with
/// [`Error::InvalidArgument`] since `repeat` could never rewind it after the first pass.
struct RepeatStream {
    source: BoxStream,
    n: i64,
    completed_passes: i64,
}

impl Stream for RepeatStream {
    fn next(&mut self) -> Result<Option<Sample>> {
        loop {
            if self.n >= 0 && self.completed_passes >= self.n {
                return Ok(None);
            }
            match self.source.next()? {
                Some(sample) => return Ok(Some(sample)),
                None => {
                    self.completed_passes += 1;
                    if self.n >= 0 && self.completed_passes >= self.n {
                        return Ok(None);
                    }
                    self.source.reset()?;
                }
            }
        }
    }
}

/// `repeat(n)`. Buffer sources are always restartable (see
/// [`dataloom_core::buffer::to_stream`]), so `repeat` applies to a buffer turned into a
/// stream, producing a (possibly infinite) stream.
pub fn repeat(source: BoxStream, n: i64) -> Result<BoxStream> {
    if !source.is_restartable() {
        return Err(Error::InvalidArgument(
            "repeat requires a restartable source".to_string(),
        ));
    }
    if n == 0 {
        return Err(Error::InvalidArgument("repeat(0) is not meaningful".to_string()));
    }
    Ok(Box::new(RepeatStream {
        source,
        n,
        completed_passes: 0,
    }))
}
