//! Error types for the signal bus.

use thiserror::Error;

/// Main error type for bus operations.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum BusError {
    /// A signal was offered after the bus already carried its terminal signal.
    #[error("signal bus already terminated")]
    Terminated,

    /// `request(0)` is not a valid demand increment.
    #[error("demand must be positive")]
    ZeroDemand,
}

/// Result type for bus operations.
pub type Result<T> = std::result::Result<T, BusError>;
