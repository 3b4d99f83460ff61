//! Errors surfaced by the multiplet detection pipeline

use thiserror::Error;

/// Errors that abort a run. Everything recoverable is handled where it
/// occurs: a failed peak lookup is an empty `Option`, a degenerate
/// regression is a `NaN` slope, and index preconditions panic.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum MultiplexError {
    #[error("The labelling is neither SILAC, Dimethyl nor ICPL: {0:?}")]
    MixedLabelling(String),
    #[error("The label {0:?} is unknown")]
    UnknownLabel(String),
    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),
    #[error("Knock-out detection is not supported for multiplets of more than four peptides ({0} samples)")]
    KnockOutArity(usize),
    #[error("No MS1 spectra to process")]
    EmptyInput,
    #[error("Processing was cancelled")]
    Cancelled,
}
