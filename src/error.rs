//! Error types for plan construction and execution.

use thiserror::Error;

/// The error type for every fallible wgfft operation.
///
/// Each variant is a stable category; recovery is the caller's
/// responsibility. Bench timeouts are not errors — they are signalled
/// through [`crate::fft::BenchResult::completed_iterations`].
#[derive(Error, Debug)]
pub enum FftError {
    /// Invalid dimensions, unsupported surface/type combination, or options
    /// that violate platform limits. Reported at plan construction.
    #[error("invalid configuration: {0}")]
    Configuration(String),

    /// Synthesized shader source was rejected. The failing parameter record
    /// is logged; nothing is inserted into the program cache.
    #[error("shader compilation failed: {0}")]
    Compilation(String),

    /// Buffer or texture allocation failed.
    #[error("resource allocation failed: {0}")]
    Resource(String),

    /// The caller broke an API contract, e.g. `process` without the aux
    /// input required by an inverse-convolve plan. Output surface contents
    /// are undefined afterwards.
    #[error("contract violation: {0}")]
    ContractViolation(String),
}

pub type Result<T> = std::result::Result<T, FftError>;
