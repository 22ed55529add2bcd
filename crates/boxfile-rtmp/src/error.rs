//! Error types for boxfile-rtmp.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    /// A handshake byte, chunk header, or AMF0 value fell outside the small
    /// subset this sink decodes.
    #[error("protocol error: {0}")]
    ProtocolError(String),

    /// The connection's socket failed during a read or write.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// The finished `moov`/sample table failed to serialize via the shared
    /// box codec.
    #[error(transparent)]
    Media(#[from] boxfile_media::Error),
}

impl Error {
    pub fn protocol(msg: impl Into<String>) -> Self {
        Self::ProtocolError(msg.into())
    }
}
