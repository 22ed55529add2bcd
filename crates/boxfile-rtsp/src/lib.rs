//! `boxfile-rtsp`: the RTSP session state machine (§4.6) that sits between
//! `boxfile-media`'s file reader and `boxfile-rtp`'s packetizer.
//!
//! # Modules
//!
//! - `request`/`response` - wire-level RTSP message parsing and composition
//! - `auth` - Basic and Digest (MD5, rfc2617) challenge/verify
//! - `sdp` - SDP synthesis for `DESCRIBE`, from `boxfile-media`'s codec boxes
//! - `playrange` - `Range:`/`Scale:` header parsing and the clock mirror
//! - `codec` - maps a track's `stsd` entry onto an RTP payload kind
//! - `session` - the per-connection state machine and timed frame pull
//! - `connection` - the async read/dispatch/interleave loop over one socket
//!
//! This crate owns session lifecycle, authentication, and play-range
//! bookkeeping; it has no listener of its own; the binary that owns the
//! `TcpListener` calls [`connection::serve`] once per accepted connection.

pub mod auth;
pub mod codec;
pub mod connection;
pub mod error;
pub mod playrange;
pub mod request;
pub mod response;
pub mod sdp;
pub mod session;

pub use error::{Error, Result};
pub use session::{Session, SessionState};
