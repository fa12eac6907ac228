//! Stateless and stateful operators composed into dataloom pipelines: per-sample transforms,
//! shuffling, batching, windowing, repetition, and filesystem-backed sources.

pub mod batch;
pub mod io_ops;
pub mod repeat;
pub mod shuffle;
pub mod transform;
pub mod window;

pub use batch::{batch_buffer, batch_stream, dynamic_batch_buffer, dynamic_batch_stream};
pub use io_ops::{files_from_tar, stream_line_reader};
pub use repeat::repeat;
pub use shuffle::{shuffle_buffer, shuffle_stream};
pub use transform::{
    apply_to_buffer, apply_to_stream, filter_key_remove, filter_key_require, has_key,
    key_transform, partition, rename, replace, require_present, sample_transform, shape_op,
    slice, squeeze, BoxTransform, Transform,
};
pub use window::{pad, sliding_window};
