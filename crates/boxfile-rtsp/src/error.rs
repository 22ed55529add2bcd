//! Error types for boxfile-rtsp, realizing the RTSP-specific portion of the
//! error taxonomy (§7): authentication, protocol framing, transport, and
//! play-range validation.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    /// No credentials were presented and the session requires them.
    #[error("authentication required")]
    AuthRequired,

    /// Credentials were presented but did not verify.
    #[error("authentication rejected")]
    AuthRejected,

    /// A malformed request line, missing `CSeq`, or other protocol framing
    /// violation.
    #[error("protocol error: {0}")]
    ProtocolError(String),

    /// The underlying socket failed during a read or write.
    #[error("transport error: {0}")]
    TransportError(String),

    /// An NPT or absolute-clock play range fell outside the file's
    /// duration.
    #[error("invalid range: {0}")]
    InvalidRange(String),

    /// `SETUP`/`PLAY`/`PAUSE`/`TEARDOWN` referenced a session id this
    /// connection never minted.
    #[error("session not found: {0}")]
    SessionNotFound(String),

    /// A box-codec or timeline failure from the underlying reader.
    #[error(transparent)]
    Media(#[from] boxfile_media::Error),

    /// A fragmentation failure from the RTP packetizer.
    #[error(transparent)]
    Rtp(#[from] boxfile_rtp::Error),

    /// The connection's socket failed during a read or write.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    pub fn protocol(msg: impl Into<String>) -> Self {
        Self::ProtocolError(msg.into())
    }

    pub fn transport(msg: impl Into<String>) -> Self {
        Self::TransportError(msg.into())
    }

    pub fn invalid_range(msg: impl Into<String>) -> Self {
        Self::InvalidRange(msg.into())
    }

    pub fn session_not_found(id: impl Into<String>) -> Self {
        Self::SessionNotFound(id.into())
    }
}
