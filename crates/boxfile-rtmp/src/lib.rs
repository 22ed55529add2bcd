//! `boxfile-rtmp`: an RTMP ingest sink (§4.7) that accepts one publisher's
//! handshake, chunk stream, and AMF0 command/media messages, then writes a
//! complete (non-fragmented) MP4 file once the publish ends.
//!
//! # Modules
//!
//! - `handshake` - C0/S0/C1/S1/C2/S2
//! - `chunk` - basic/message header parsing, extended timestamps, reassembly
//! - `amf0` - the small AMF0 value subset commands and metadata use
//! - `command` - `connect`/`publish`/... decode and their `_result`/`onStatus` replies
//! - `control` - `SetChunkSize`/`WindowAcknowledgementSize`/`SetPeerBandwidth`/`UserControl`
//! - `video`/`audio` - FLV tag parsing into AVC NAL runs and AAC frames
//! - `ingest` - the per-publish sample accumulator and MP4 write-out
//! - `moov` - the non-fragmented `moov`/`mdat` writer
//! - `connection` - the async read/dispatch loop over one accepted socket
//!
//! This crate has no listener of its own; the binary that owns the
//! `TcpListener` calls [`connection::serve`] once per accepted connection.

pub mod amf0;
pub mod audio;
pub mod chunk;
pub mod command;
pub mod connection;
pub mod control;
pub mod error;
pub mod handshake;
pub mod ingest;
pub mod moov;
pub mod video;

pub use error::{Error, Result};
pub use ingest::IngestSession;
