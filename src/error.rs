//! Error Types
//!
//! Typed failure surface for the aggregation engine. All recoverable
//! conditions are surfaced to the caller; the engine holds no retry logic.

use thiserror::Error;

/// Errors produced by the aggregation engine
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MonitorError {
    /// The requested range does not contain enough valid windows to build a
    /// result. No partial results are returned.
    #[error("not enough valid windows: required {required}, available {available}")]
    NotEnoughValidWindows { required: usize, available: usize },

    /// Programmer error in the arguments of a query or configuration.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// An internal invariant was violated. Surfaced as a distinguishable
    /// error instead of returning garbage.
    #[error("internal inconsistency: {0}")]
    InternalInconsistency(String),
}

/// Result type alias for engine operations
pub type Result<T> = std::result::Result<T, MonitorError>;
