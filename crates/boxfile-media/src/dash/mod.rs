//! DASH MPD XML emitter: a thin view over the same segment vector and
//! header boxes the HLS playlist renders from. No teacher module covers
//! this (the corpus carries no DASH emitter), so it's built as a template
//! in the same hand-rolled `writeln!`-into-`String` style `hls::playlist`
//! uses for its M3U8 text.

use std::fmt::Write;

use crate::segment_map::SegmentMap;

/// Per-track metadata an `AdaptationSet` needs that a `SegmentMap` alone
/// doesn't carry (it only knows sample/byte geometry, not handler type or
/// language).
#[derive(Debug, Clone)]
pub struct AdaptationTrack {
    pub track_id: u32,
    pub mime_type: String,
    pub timescale: u32,
    pub duration: u64,
    pub language: String,
}

impl AdaptationTrack {
    pub fn video(track_id: u32, timescale: u32, duration: u64) -> Self {
        Self {
            track_id,
            mime_type: "video/mp4".to_string(),
            timescale,
            duration,
            language: "und".to_string(),
        }
    }

    pub fn audio(track_id: u32, timescale: u32, duration: u64, language: impl Into<String>) -> Self {
        Self {
            track_id,
            mime_type: "audio/mp4".to_string(),
            timescale,
            duration,
            language: language.into(),
        }
    }

    pub fn text(track_id: u32, timescale: u32, duration: u64, language: impl Into<String>) -> Self {
        Self {
            track_id,
            mime_type: "application/mp4".to_string(),
            timescale,
            duration,
            language: language.into(),
        }
    }
}

/// Builds the `.mpd` XML for one on-demand presentation.
pub struct MpdBuilder {
    name: String,
    tracks: Vec<AdaptationTrack>,
}

impl MpdBuilder {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            tracks: Vec::new(),
        }
    }

    pub fn track(mut self, track: AdaptationTrack) -> Self {
        self.tracks.push(track);
        self
    }

    pub fn render(&self, segment_map: &SegmentMap) -> String {
        let mut out = String::new();

        writeln!(out, r#"<?xml version="1.0" encoding="UTF-8"?>"#).unwrap();
        writeln!(
            out,
            r#"<MPD xmlns="urn:mpeg:dash:schema:mpd:2011" profiles="urn:mpeg:dash:profile:isoff-on-demand:2011" type="static" mediaPresentationDuration="{}" minBufferTime="{:.1}S">"#,
            iso8601_duration(segment_map.duration_secs),
            segment_map.target_duration_secs,
        )
        .unwrap();
        writeln!(
            out,
            r#"  <Period duration="{}">"#,
            iso8601_duration(segment_map.duration_secs)
        )
        .unwrap();

        for track in &self.tracks {
            writeln!(
                out,
                r#"    <AdaptationSet mimeType="{}" lang="{}" segmentAlignment="true">"#,
                track.mime_type, track.language
            )
            .unwrap();
            writeln!(
                out,
                r#"      <SegmentTemplate media="{name}_sn$Number$.m4s" initialization="{name}_init.mp4" startNumber="0" duration="{duration}" timescale="{timescale}" />"#,
                name = self.name,
                duration = track.duration,
                timescale = track.timescale,
            )
            .unwrap();
            writeln!(out, "    </AdaptationSet>").unwrap();
        }

        writeln!(out, "  </Period>").unwrap();
        writeln!(out, "</MPD>").unwrap();

        out
    }
}

/// Renders whole seconds as `PT<N>S`; fractional remainders are truncated
/// since segment-level duration precision lives in `SegmentTemplate`, not
/// here.
fn iso8601_duration(secs: f64) -> String {
    format!("PT{:.3}S", secs.max(0.0))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::segment_map::Segment;

    fn map() -> SegmentMap {
        SegmentMap {
            movie_timescale: 90000,
            duration_secs: 12.0,
            target_duration_secs: 6.0,
            max_segment_duration_secs: 6.0,
            segments: vec![
                Segment {
                    index: 0,
                    start_time_secs: 0.0,
                    duration_secs: 6.0,
                    fragments: Vec::new(),
                },
                Segment {
                    index: 1,
                    start_time_secs: 6.0,
                    duration_secs: 6.0,
                    fragments: Vec::new(),
                },
            ],
            init_segment: Vec::new(),
        }
    }

    #[test]
    fn renders_one_adaptation_set_per_track() {
        let mpd = MpdBuilder::new("movie")
            .track(AdaptationTrack::video(1, 90000, 1_080_000))
            .track(AdaptationTrack::audio(2, 48000, 576_000, "en"))
            .render(&map());

        assert!(mpd.contains("<MPD"));
        assert!(mpd.contains(r#"mimeType="video/mp4""#));
        assert!(mpd.contains(r#"mimeType="audio/mp4""#));
        assert!(mpd.contains("movie_sn$Number$.m4s"));
        assert!(mpd.contains("movie_init.mp4"));
        assert!(mpd.contains(r#"timescale="90000""#));
        assert!(mpd.contains(r#"timescale="48000""#));
    }
}
