use thiserror::Error;

/// error taxonomy of the whole engine. Every solver returns a typed failure from this
/// enum, never a panic; the convergence failures carry the last known diagnostics so
/// the caller may decide to retry with relaxed tolerances or another EOS
#[derive(Debug, Error)]
pub enum KiDetError {
    #[error("Invalid composition: {0}")]
    InvalidComposition(String),
    #[error("Temperature {temperature} K is outside of the fitted range {range}")]
    OutOfRange { temperature: f64, range: String },
    #[error("{context}: no convergence after {iterations} iterations, last residual {residual:.3e}")]
    NonConvergence {
        context: String,
        iterations: usize,
        residual: f64,
    },
    #[error("Singular Jacobian: {0}")]
    SingularJacobian(String),
    #[error("Unsupported EOS combination: {0}")]
    UnsupportedEosCombination(String),
    #[error("Substance not found: {0}")]
    SubstanceNotFound(String),
    #[error("Missing data: {0}")]
    MissingData(String),
    #[error("Computation cancelled during {0}")]
    Cancelled(String),
    #[error("Deserialization error: {0}")]
    DeserializationError(#[from] serde_json::Error),
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

impl KiDetError {
    /// iteration count and last residual attached to a convergence failure,
    /// None for every other variant
    pub fn diagnostics(&self) -> Option<(usize, f64)> {
        match self {
            KiDetError::NonConvergence {
                iterations,
                residual,
                ..
            } => Some((*iterations, *residual)),
            _ => None,
        }
    }
}
