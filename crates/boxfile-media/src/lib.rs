//! `boxfile-media`: ISO-BMFF box parsing and timeline reconstruction, fMP4
//! fragment serialization, and segment-map-driven HLS/DASH rendering.
//!
//! # Modules
//!
//! - `mp4` - box tree parsing, typed box bodies, per-track sample timeline
//! - `fmp4` - fragmented MP4 serialization (init segment, moof/mdat)
//! - `segment_map` - keyframe-aligned segment grouping over a parsed file
//! - `hls` - HLS playlist generation (m3u8)
//! - `dash` - DASH MPD generation
//!
//! # Architecture
//!
//! A source file is scanned once: `mp4::Mp4File::open` builds the box tree
//! and per-track sample table, then `segment_map::SegmentMapBuilder` walks
//! the video track's keyframes to group samples into fragments, slaving any
//! audio/text tracks to the same time windows and pre-serializing each
//! fragment's `moof`. Serving a segment or the raw fMP4 stream then needs no
//! further parsing: the `moof` bytes are already built, and sample data is
//! read from the source file at the byte ranges the segment map recorded.

pub mod dash;
pub mod error;
pub mod fmp4;
pub mod hls;
pub mod mp4;
pub mod precompute;
pub mod segment_map;

pub use dash::{AdaptationTrack, MpdBuilder};
pub use error::{Error, Result};
pub use fmp4::{InitSegment, InitSegmentBuilder};
pub use hls::{HlsPlaylist, MasterPlaylist, MediaPlaylist, StreamInfo};
pub use mp4::Mp4File;
pub use precompute::precompute;
pub use segment_map::{Fragment, Segment, SegmentMap, SegmentMapBuilder, TrackRange};
