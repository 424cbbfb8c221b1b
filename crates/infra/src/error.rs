//! Errors surfaced by stock-mutating operations.

use thiserror::Error;

use stockyard_core::FieldErrors;

/// Outcome of a failed transfer or adjustment.
///
/// Every variant means nothing was committed.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StockError {
    /// One or more request fields were rejected, including stock
    /// availability.
    #[error("validation failed: {0}")]
    Validation(FieldErrors),

    /// Transient contention outlasted the retry budget.
    #[error("gave up after {attempts} attempts under contention")]
    Contention { attempts: u32 },

    #[error("deadline exceeded before commit")]
    DeadlineExceeded,

    /// Storage failed in a way retrying will not fix.
    #[error("persistence failure: {0}")]
    Persistence(String),
}

impl StockError {
    pub fn field(field: &str, message: impl Into<String>) -> Self {
        Self::Validation(FieldErrors::single(field, message))
    }
}

impl From<FieldErrors> for StockError {
    fn from(errors: FieldErrors) -> Self {
        Self::Validation(errors)
    }
}
