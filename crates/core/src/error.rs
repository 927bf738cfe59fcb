//! The engine-wide error type.
//!
//! One closed enum for every failure the engine reports. Sessions swallow
//! and recover from the network variants; the executor never swallows and
//! carries leg errors into its results, which is why the type is `Clone`.

use thiserror::Error;

/// Engine-wide result alias.
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Clone, Error, PartialEq)]
pub enum Error {
    /// Resolve / connect / TLS / read / write failure.
    #[error("network error: {0}")]
    Network(String),

    #[error("connection timed out")]
    ConnectionTimeout,

    #[error("connection closed")]
    ConnectionClosed,

    /// Non-2xx REST response.
    #[error("api error ({status}): {body}")]
    Api { status: u16, body: String },

    #[error("authentication failed: {0}")]
    AuthenticationFailed(String),

    #[error("rate limited")]
    RateLimited,

    #[error("insufficient balance: {0}")]
    InsufficientBalance(String),

    #[error("order not found: {0}")]
    OrderNotFound(String),

    /// Venue-reported business error.
    #[error("exchange error: {0}")]
    Exchange(String),

    #[error("parse error: {0}")]
    Parse(String),

    #[error("config error: {0}")]
    Config(String),

    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("invalid state: {0}")]
    InvalidState(String),

    #[error("premium {0:.4}% below threshold")]
    PremiumTooLow(f64),

    #[error("risk limit exceeded: {0}")]
    RiskLimitExceeded(String),
}

impl Error {
    /// True for the failures the session layer recovers from by
    /// reconnecting rather than surfacing.
    #[must_use]
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Error::Network(_) | Error::ConnectionClosed | Error::ConnectionTimeout
        )
    }

    #[must_use]
    pub fn parse(msg: impl Into<String>) -> Self {
        Error::Parse(msg.into())
    }

    #[must_use]
    pub fn network(msg: impl Into<String>) -> Self {
        Error::Network(msg.into())
    }

    #[must_use]
    pub fn invalid_request(msg: impl Into<String>) -> Self {
        Error::InvalidRequest(msg.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recoverable_classification() {
        assert!(Error::network("reset").is_recoverable());
        assert!(Error::ConnectionClosed.is_recoverable());
        assert!(Error::ConnectionTimeout.is_recoverable());
        assert!(!Error::AuthenticationFailed("bad key".into()).is_recoverable());
        assert!(!Error::Config("missing".into()).is_recoverable());
    }

    #[test]
    fn test_display_carries_context() {
        let err = Error::Api {
            status: 429,
            body: "slow down".into(),
        };
        assert!(err.to_string().contains("429"));
        assert!(err.to_string().contains("slow down"));
    }
}
