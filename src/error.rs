//! Error type shared by every stage of the thinning pipeline.

use thiserror::Error;

/// Errors raised while validating inputs, building kernels or selecting points.
///
/// All errors are fatal for the call that produced them; nothing is retried internally.
#[derive(Debug, Error)]
pub enum Error {
    #[error("empty input: {0}")]
    EmptyInput(&'static str),

    #[error("shape mismatch: {name} has shape {found:?}, expected {expected:?}")]
    ShapeMismatch {
        name: &'static str,
        found: Vec<usize>,
        expected: Vec<usize>,
    },

    #[error("non-finite value in {0}")]
    NonFinite(&'static str),

    #[error("too few unique samples: {0}")]
    TooFewUniqueSamples(String),

    #[error("unknown preconditioner: {0:?}")]
    UnknownPreconditioner(String),

    #[error("invalid parameter: {0}")]
    InvalidParameter(String),

    #[error("cannot select {requested} points from a sample of size {available}")]
    TooManyPoints { requested: usize, available: usize },

    #[error("kernel evaluation produced an undefined (NaN) value")]
    UndefinedKernelValue,
}

pub type Result<T> = std::result::Result<T, Error>;
