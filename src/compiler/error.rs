use thiserror::Error;

/// Error kinds surfaced by the compiler core. All failures propagate to the
/// caller; partial state stays consistent and a `reset` is required to retry.
#[derive(Debug, Error)]
pub enum Error {
    /// Invariant violation detected during `compile` (missing bound,
    /// inconsistent encoding, infeasible constraint bound, ...).
    #[error("compilation failed: {0}")]
    CompilationFailure(String),

    /// Division by zero or a negative exponent on a pseudo-Boolean function.
    #[error("arithmetic failure: {0}")]
    ArithmeticFailure(String),

    /// Bad encoding parameters: non-positive tolerance, missing or zero bit
    /// budget, inverted integer domain.
    #[error("domain error: {0}")]
    DomainError(String),

    /// A constraint function/set pairing the translator does not handle.
    /// `SourceModel::supports` lets callers avoid this ahead of time.
    #[error("unsupported feature: {0}")]
    UnsupportedFeature(String),

    /// A term of the given degree survived quadratization; the emitted
    /// objective would not be quadratic.
    #[error("quadratization incomplete: degree-{0} term remains")]
    QuadratizationIncomplete(usize),
}

pub type Result<T> = std::result::Result<T, Error>;
