//! Error types for the range-aided particle filter

use thiserror::Error;

/// Failures surfaced by the filter engine.
///
/// Configuration and input-contract errors are fatal to the call that raised them. Numerical
/// degeneracy of the weights is not an error; see [`crate::filter::WeightingOutcome`].
#[derive(Error, Debug, Clone, PartialEq)]
pub enum FilterError {
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    #[error(
        "Measurement vector has {measurements} ranges but {landmarks} landmarks were supplied"
    )]
    InputContractViolation {
        measurements: usize,
        landmarks: usize,
    },

    #[error("Range measurement {index} is not finite ({value})")]
    NonFiniteMeasurement { index: usize, value: f64 },

    #[error("Cannot estimate a pose from an empty particle population")]
    EmptyPopulation,
}

pub type Result<T> = std::result::Result<T, FilterError>;
