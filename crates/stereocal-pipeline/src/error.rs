//! Pipeline error taxonomy.

use stereocal_core::ObservationError;
use thiserror::Error;

/// Failures surfaced by the calibration pipeline.
///
/// Every failure carries a human-readable cause and is reported to the
/// immediate caller; nothing is swallowed and nothing retries on its own.
/// Only an unreadable startup configuration is fatal, and that decision
/// belongs to the binary.
#[derive(Debug, Error)]
pub enum CalibError {
    /// Missing or malformed startup configuration.
    #[error("configuration error: {0}")]
    Configuration(String),
    /// An observation pair was not accepted into the store.
    #[error("observation rejected: {0}")]
    ObservationRejected(#[from] ObservationError),
    /// An operation was attempted with insufficient or mismatched data.
    #[error("precondition unmet: {0}")]
    PreconditionUnmet(String),
    /// The underlying numerical solve failed.
    #[error("solve failed: {0}")]
    SolveDivergence(String),
    /// A save or load could not complete; no partial state was applied.
    #[error("persistence error: {0}")]
    Persistence(String),
    /// Depth estimation hit a zero or invalid disparity.
    #[error("degenerate geometry: {0}")]
    DegenerateGeometry(String),
}

impl CalibError {
    pub(crate) fn precondition(msg: impl Into<String>) -> Self {
        CalibError::PreconditionUnmet(msg.into())
    }

    pub(crate) fn persistence(msg: impl Into<String>) -> Self {
        CalibError::Persistence(msg.into())
    }
}
