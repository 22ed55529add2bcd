//! Precomputed fMP4 segment boundaries and data ranges for HLS/DASH serving.
//!
//! A segment map is built once, at scan time, from a source file's sample
//! tables: a video track paced by keyframe-aligned cut points, with any
//! number of audio/text tracks slaved to the same time windows. Each
//! resulting segment carries a pre-serialized `moof`+`mdat`-header and the
//! byte ranges in the source file its sample data lives at, so serving a
//! segment needs no re-parsing — just a `moof` write followed by zero-copy
//! reads of the ranges.

mod builder;

pub use builder::SegmentMapBuilder;

/// One track's contribution to a segment.
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize, serde::Deserialize))]
pub struct TrackRange {
    pub track_id: u32,
    pub start_sample: u64,
    pub end_sample: u64,
    pub base_media_decode_time: u64,
    /// Byte ranges in the source file: `(offset, length)`. Contiguous
    /// samples are coalesced into a single range; interleaved files produce
    /// several.
    pub byte_ranges: Vec<(u64, u32)>,
}

impl TrackRange {
    pub fn sample_count(&self) -> u64 {
        self.end_sample - self.start_sample
    }

    pub fn data_size(&self) -> u64 {
        self.byte_ranges.iter().map(|(_, len)| *len as u64).sum()
    }
}

/// One cut of the video pacemaker: a `moof` + `mdat` header plus whichever
/// audio/text tracks have samples in the same keyframe-to-keyframe window.
/// `sequence_number` is assigned once per fragment across the whole file,
/// matching `mfhd.sequence_number` in the `moof` it was built from.
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize, serde::Deserialize))]
pub struct Fragment {
    pub sequence_number: u32,
    pub tracks: Vec<TrackRange>,
    /// Pre-built `moof` + `mdat` header, ready to prepend to the tracks'
    /// sample bytes in the order listed in `tracks`.
    pub moof_data: Vec<u8>,
}

impl Fragment {
    pub fn track(&self, track_id: u32) -> Option<&TrackRange> {
        self.tracks.iter().find(|t| t.track_id == track_id)
    }

    pub fn data_size(&self) -> u64 {
        self.tracks.iter().map(|t| t.data_size()).sum()
    }
}

/// An ordered list of `moof` fragments spanning one HLS/DASH-servable chunk.
/// A segment groups as many keyframe-to-keyframe fragments as it takes to
/// reach the target floor duration; each fragment still gets its own `moof`
/// and `mdat`, so serving a segment means writing each fragment in turn.
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize, serde::Deserialize))]
pub struct Segment {
    pub index: u32,
    pub start_time_secs: f64,
    pub duration_secs: f64,
    pub fragments: Vec<Fragment>,
}

impl Segment {
    pub fn track(&self, track_id: u32) -> Option<&TrackRange> {
        self.fragments.iter().find_map(|f| f.track(track_id))
    }

    pub fn data_size(&self) -> u64 {
        self.fragments.iter().map(|f| f.data_size()).sum()
    }
}

/// Precomputed segment map for fMP4-based streaming.
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize, serde::Deserialize))]
pub struct SegmentMap {
    pub movie_timescale: u32,
    pub duration_secs: f64,
    pub target_duration_secs: f64,
    pub max_segment_duration_secs: f64,
    pub segments: Vec<Segment>,
    pub init_segment: Vec<u8>,
}

impl SegmentMap {
    pub fn builder() -> SegmentMapBuilder {
        SegmentMapBuilder::new()
    }

    pub fn segment_count(&self) -> u32 {
        self.segments.len() as u32
    }

    pub fn get_segment(&self, index: u32) -> Option<&Segment> {
        self.segments.get(index as usize)
    }

    pub fn find_segment_at_time(&self, time_secs: f64) -> Option<u32> {
        for (i, seg) in self.segments.iter().enumerate() {
            if time_secs >= seg.start_time_secs && time_secs < seg.start_time_secs + seg.duration_secs {
                return Some(i as u32);
            }
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn seg(index: u32, start: f64, dur: f64) -> Segment {
        Segment {
            index,
            start_time_secs: start,
            duration_secs: dur,
            fragments: Vec::new(),
        }
    }

    #[test]
    fn find_segment_at_time_locates_containing_window() {
        let map = SegmentMap {
            movie_timescale: 1000,
            duration_secs: 10.0,
            target_duration_secs: 6.0,
            max_segment_duration_secs: 5.0,
            segments: vec![seg(0, 0.0, 5.0), seg(1, 5.0, 5.0)],
            init_segment: Vec::new(),
        };

        assert_eq!(map.find_segment_at_time(0.0), Some(0));
        assert_eq!(map.find_segment_at_time(4.9), Some(0));
        assert_eq!(map.find_segment_at_time(5.0), Some(1));
        assert_eq!(map.find_segment_at_time(10.0), None);
    }
}
