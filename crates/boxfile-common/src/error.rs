//! Common error type shared across the streaming crates for the
//! boundary-level failures none of them owns individually — unknown
//! stream/resource names, malformed requests, internal invariants.
//!
//! Protocol-specific failures (RTSP auth, transport framing, ISO-BMFF box
//! parsing) live in each crate's own `Error` enum; this one covers only the
//! handful of kinds that cut across all of them.

/// Common error type shared across the streaming crates.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The requested stream or resource was not found.
    #[error("not found: {0}")]
    NotFound(String),

    /// The caller is not authenticated.
    #[error("unauthorized")]
    Unauthorized,

    /// The caller does not have permission to access the resource.
    #[error("forbidden")]
    Forbidden,

    /// An I/O operation failed.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Invalid input was provided.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// An internal error occurred.
    #[error("internal error: {0}")]
    Internal(String),
}

impl Error {
    pub fn not_found<S: Into<String>>(msg: S) -> Self {
        Self::NotFound(msg.into())
    }

    pub fn invalid_input<S: Into<String>>(msg: S) -> Self {
        Self::InvalidInput(msg.into())
    }

    pub fn internal<S: Into<String>>(msg: S) -> Self {
        Self::Internal(msg.into())
    }

    /// Builds an `Io` error from a message, for external API errors that
    /// don't originate from a `std::io::Error` directly.
    pub fn io<S: Into<String>>(msg: S) -> Self {
        Self::Io(std::io::Error::other(msg.into()))
    }

    /// Alias for `invalid_input`, for call sites where "validation" reads
    /// better.
    pub fn validation<S: Into<String>>(msg: S) -> Self {
        Self::InvalidInput(msg.into())
    }
}

/// Result type alias using the common `Error` type.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display() {
        assert_eq!(
            Error::not_found("cam1").to_string(),
            "not found: cam1"
        );
        assert_eq!(Error::Unauthorized.to_string(), "unauthorized");
        assert_eq!(Error::Forbidden.to_string(), "forbidden");
        assert_eq!(
            Error::invalid_input("bad range").to_string(),
            "invalid input: bad range"
        );
        assert_eq!(
            Error::internal("unreachable state").to_string(),
            "internal error: unreachable state"
        );
    }

    #[test]
    fn error_from_io() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err = Error::from(io_err);
        assert!(matches!(err, Error::Io(_)));
    }

    #[test]
    fn result_type() {
        fn ok_fn() -> Result<i32> {
            Ok(42)
        }
        assert_eq!(ok_fn().unwrap(), 42);

        fn err_fn() -> Result<i32> {
            Err(Error::Unauthorized)
        }
        assert!(err_fn().is_err());
    }

    #[test]
    fn error_constructors() {
        assert!(matches!(Error::not_found("x"), Error::NotFound(_)));
        assert!(matches!(Error::invalid_input("x"), Error::InvalidInput(_)));
        assert!(matches!(Error::internal("x"), Error::Internal(_)));
        assert!(matches!(Error::validation("x"), Error::InvalidInput(_)));
    }
}
