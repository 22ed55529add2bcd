//! Error types for boxfile-rtp.

use thiserror::Error;

/// Result type for boxfile-rtp operations.
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    /// A sample was handed to a fragmenter that cannot packetize it (e.g.
    /// an empty NAL unit or an AAC frame too large for a 13-bit AU size).
    #[error("cannot fragment sample: {0}")]
    Unfragmentable(String),

    /// The caller asked for a codec this crate has no fragment maker for.
    #[error("unsupported codec: {0}")]
    UnsupportedCodec(String),
}

impl Error {
    pub fn unfragmentable(msg: impl Into<String>) -> Self {
        Self::Unfragmentable(msg.into())
    }

    pub fn unsupported(msg: impl Into<String>) -> Self {
        Self::UnsupportedCodec(msg.into())
    }
}
