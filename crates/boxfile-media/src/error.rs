//! Error types for boxfile-media.

use std::io;
use thiserror::Error;

/// Result type for boxfile-media operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Error type for boxfile-media operations, realizing the box-codec and
/// timeline portion of the error taxonomy.
#[derive(Debug, Error)]
pub enum Error {
    /// Underlying I/O failure.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// A read ran past the end of the file or past a box's declared size.
    #[error("end of stream: {0}")]
    EndOfStream(String),

    /// A box header or body violated the format (size < header size,
    /// negative payload, truncated descriptor, etc).
    #[error("malformed box: {0}")]
    MalformedBox(String),

    /// A track's handler/codec has no packetizer or segmenter support.
    #[error("unsupported codec: {0}")]
    UnsupportedCodec(String),

    /// The sample cursor has walked off either end of the timeline.
    #[error("samples depleted for track {0}")]
    SamplesDepleted(u32),

    /// Missing required box in an otherwise-parsed tree.
    #[error("missing required box: {0}")]
    MissingBox(&'static str),

    /// Requested segment index does not exist.
    #[error("invalid segment index: {index} (have {max})")]
    InvalidSegmentIndex { index: usize, max: usize },
}

impl Error {
    pub fn end_of_stream(msg: impl Into<String>) -> Self {
        Self::EndOfStream(msg.into())
    }

    pub fn malformed(msg: impl Into<String>) -> Self {
        Self::MalformedBox(msg.into())
    }

    pub fn unsupported(msg: impl Into<String>) -> Self {
        Self::UnsupportedCodec(msg.into())
    }
}
