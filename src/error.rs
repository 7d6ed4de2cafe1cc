use thiserror::Error;

/// Estimation error types
#[derive(Error, Debug, Clone, PartialEq)]
pub enum FusionError {
    /// A matrix that must be inverted or factorised was singular.
    #[error("Numerical error: {0}")]
    Numerical(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

impl FusionError {
    pub(crate) fn invalid(msg: impl Into<String>) -> Self {
        FusionError::InvalidInput(msg.into())
    }

    pub(crate) fn numerical(msg: impl Into<String>) -> Self {
        FusionError::Numerical(msg.into())
    }
}

/// Result type for estimator operations
pub type FusionResult<T> = Result<T, FusionError>;

/// Reject a time step that cannot advance the filter.
pub(crate) fn check_dt(dt: f64) -> FusionResult<()> {
    if dt.is_finite() && dt > 0.0 {
        Ok(())
    } else {
        Err(FusionError::invalid(format!(
            "time step must be positive and finite, got {dt}"
        )))
    }
}
