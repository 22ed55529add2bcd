//! HLS playlist generation.
//!
//! This module generates M3U8 playlists for HLS streaming.

mod playlist;

pub use playlist::{HlsPlaylist, MasterPlaylist, MediaPlaylist, StreamInfo};
