//! Umbrella error type wrapping every subsystem crate's error.
//!
//! `dataloom-ops`, `dataloom-prefetch`, and (per `DESIGN.md`) `dataloom-tokenize` all reuse
//! `dataloom_core::Error` directly rather than minting their own type, so one transparent
//! variant covers the whole engine.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error(transparent)]
    Core(#[from] dataloom_core::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
