//! `boxfile-rtp`: RTP payload packetization and interleaved-TCP framing.
//!
//! # Modules
//!
//! - `header` - the 12-byte RTP header, interleaved framing, sequence numbers
//! - `fragment` - per-codec fragment makers (AVC FU-A, HEVC FU, AAC AU-header)
//! - `pacer` - wall-clock pacing with duration-error carry, trick-play rate
//!
//! This crate only emits wire bytes for samples handed to it; it has no
//! notion of a source file or track — that's `boxfile-media`'s `mp4::Mp4File`
//! and `boxfile-rtsp`'s session state machine, which pulls samples and calls
//! into this crate per frame.

pub mod error;
pub mod fragment;
pub mod header;
pub mod pacer;

pub use error::{Error, Result};
pub use fragment::{fragment_avc, fragment_hevc, packetize_aac, Fragment, DEFAULT_CHUNK_SIZE};
pub use header::{RtpHeader, PAYLOAD_TYPE_AUDIO, PAYLOAD_TYPE_VIDEO, VIDEO_CLOCK_RATE};
pub use pacer::{Pacer, TrickPlay};
