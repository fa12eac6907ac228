//! # dataloom - Universal Data-Loading Pipeline
//!
//! A typed sample/array data model plus the `Buffer`/`Stream` abstractions, stateless and
//! stateful pipeline operators, a concurrent prefetch engine, and (with the `tokenize`
//! feature) a tokenizer subsystem, all reachable through one fluent builder.
//!
//! ## Architecture
//!
//! `dataloom` is an umbrella crate that coordinates:
//! - **dataloom-core** - the typed array/sample data model and the `Buffer`/`Stream` traits
//! - **dataloom-ops** - stateless per-sample transforms and stateful stream/buffer operators
//! - **dataloom-prefetch** - the concurrent worker-pool prefetch engine (ordered + unordered)
//! - **dataloom-tokenize** - `CharTrie`, BPE, and maximum-likelihood tokenizers (`tokenize` feature)
//!
//! ## Quick start
//!
//! ```ignore
//! use dataloom::prelude::*;
//!
//! let pipeline = buffer_from_vector(samples)
//!     .to_stream()
//!     .key_transform("pixels", |a| normalize(a), None)
//!     .batch(32)?
//!     .ordered_prefetch(64, 4)?;
//! ```
//!
//! ## Feature flags
//!
//! - `default` = `["tokenize"]`
//! - `tokenize` - `CharTrie`/BPE/maximum-likelihood tokenizers (`dataloom-tokenize`)

pub mod error;
pub mod pipeline;

pub use error::{Error, Result};

pub use dataloom_core::{to_buffer, to_stream};
pub use dataloom_core::{Array, BoxBuffer, BoxStream, Buffer, DType, Element, Sample, Shape, Stream};

pub use dataloom_ops::transform::{BoxTransform, Transform};

pub use pipeline::{files_from_tar, stream_from_iterable_factory, stream_line_reader, PipelineBuffer, PipelineStream};

pub use dataloom_prefetch::{PrefetchMetrics, PrefetchMetricsSnapshot};

#[cfg(feature = "tokenize")]
pub use dataloom_tokenize::{BPEMerges, BpeTokenizer, CharTrie, CoverageFallback, MlTokenizer};

/// Re-exports of the pieces most pipelines need, for a single `use dataloom::prelude::*;`.
pub mod prelude {
    pub use crate::pipeline::{
        buffer_from_vector, files_from_tar, stream_from_iterable_factory, stream_line_reader,
        PipelineBuffer, PipelineStream,
    };
    pub use crate::{Array, DType, Element, Sample, Shape};
    pub use crate::{Error, Result};

    #[cfg(feature = "tokenize")]
    pub use crate::{BPEMerges, BpeTokenizer, CharTrie, CoverageFallback, MlTokenizer};
}
