//! Core data model for dataloom pipelines: typed arrays, samples, and the `Buffer`/`Stream`
//! abstractions every operator and prefetch engine builds on.

pub mod buffer;
pub mod config;
pub mod error;
pub mod lockfree;
pub mod sample;
pub mod stream;
pub mod value;

pub use buffer::{buffer_from_vector, to_buffer, to_stream, Buffer, BoxBuffer};
pub use config::{CapacityConfig, WorkerPoolConfig};
pub use error::{Error, Result};
pub use sample::Sample;
pub use stream::{BoxStream, Stream};
pub use value::{Array, DType, Element, Shape};
