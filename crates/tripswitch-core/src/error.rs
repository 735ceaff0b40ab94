//! Error types for Tripswitch

/// Result type alias using [`Error`]
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Returned by [`CircuitBreaker::test`](crate::CircuitBreaker::test) while the breaker is open.
///
/// The message, [`NAME`](Self::NAME) and [`CODE`](Self::CODE) are fixed so callers can tell a
/// blocked call apart from a failure of the guarded operation without matching on text.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, thiserror::Error)]
#[error("Circuit breaker is open")]
pub struct BreakerOpenError;

impl BreakerOpenError {
    /// Stable discriminator name
    pub const NAME: &'static str = "CircuitBreakerOpenError";

    /// Stable error code
    pub const CODE: &'static str = "EPERM";

    /// Discriminator name of this error
    pub fn name(&self) -> &'static str {
        Self::NAME
    }

    /// Error code of this error
    pub fn code(&self) -> &'static str {
        Self::CODE
    }
}

/// Main error type for Tripswitch
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Call blocked by an open breaker
    #[error(transparent)]
    BreakerOpen(#[from] BreakerOpenError),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// No breaker registered under the given name
    #[error("Unknown circuit breaker '{0}'")]
    UnknownBreaker(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Whether this error means the call was short-circuited by an open breaker
    pub fn is_breaker_open(&self) -> bool {
        matches!(self, Error::BreakerOpen(_))
    }

    /// Stable error code, if this error kind carries one
    pub fn code(&self) -> Option<&'static str> {
        match self {
            Error::BreakerOpen(e) => Some(e.code()),
            _ => None,
        }
    }
}
