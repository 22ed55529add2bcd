//! The per-connection RTSP session state machine (§4.6): directive
//! dispatch, play-range interpretation, and the timed pull from the
//! timeline through the RTP packetizer.

use std::time::{Instant, SystemTime};

use bytes::Bytes;

use boxfile_media::mp4::sample_is_keyframe;
use boxfile_media::mp4::sample_table::SampleInfo;
use boxfile_media::mp4::TrackInfo;
use boxfile_media::Mp4File;
use boxfile_rtp::{Fragment, Pacer, RtpHeader, TrickPlay, PAYLOAD_TYPE_AUDIO, PAYLOAD_TYPE_VIDEO};
use boxfile_common::{Nonce, SessionId};

use crate::auth::AuthConfig;
use crate::codec::{detect_payload_kind, PayloadKind};
use crate::error::{Error, Result};
use crate::playrange::{self, NptRange};
use crate::request::{Method, Request};
use crate::response::Response;
use crate::sdp::{build_sdp, TrackDescription};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Init,
    Described,
    Setup,
    Playing,
    Paused,
    Teardown,
}

/// One track bound to an RTP/interleaved-TCP channel via `SETUP`.
struct TrackStream {
    track_index: usize,
    payload: PayloadKind,
    header: RtpHeader,
    pacer: Pacer,
    rtp_timescale_ratio: f64,
}

/// A single RTSP session bound to one open file. Holds everything §4.6's
/// glossary entry names: content base, session id, the reader, per-track
/// streamers, an optional auth container, and the current play range.
pub struct Session {
    pub content_base: String,
    pub session_id: SessionId,
    pub state: SessionState,
    file: Mp4File,
    streams: Vec<TrackStream>,
    auth: Option<AuthConfig>,
    nonce: Nonce,
    play_range: Option<NptRange>,
    scale: f64,
    started_at: SystemTime,
}

impl Session {
    pub fn is_playing(&self) -> bool {
        self.state == SessionState::Playing
    }

    pub fn new(content_base: impl Into<String>, file: Mp4File, auth: Option<AuthConfig>) -> Self {
        Self {
            content_base: content_base.into(),
            session_id: SessionId::new(),
            state: SessionState::Init,
            file,
            streams: Vec::new(),
            auth,
            nonce: Nonce::new(),
            play_range: None,
            scale: 1.0,
            started_at: SystemTime::now(),
        }
    }

    fn authorize(&self, request: &Request) -> Result<()> {
        let Some(auth) = &self.auth else {
            return Ok(());
        };
        let Some(header) = request.header("authorization") else {
            return Err(Error::AuthRequired);
        };
        let method = match request.method {
            Method::Options => "OPTIONS",
            Method::Describe => "DESCRIBE",
            Method::Setup => "SETUP",
            Method::Play => "PLAY",
            Method::Pause => "PAUSE",
            Method::Teardown => "TEARDOWN",
            Method::GetParameter => "GET_PARAMETER",
        };
        if auth.verify(header, method, &self.nonce) {
            Ok(())
        } else {
            Err(Error::AuthRejected)
        }
    }

    fn unauthorized(&self, request: &Request) -> Response {
        let mut resp = Response::new(401, "Unauthorized").cseq(request.cseq);
        if let Some(auth) = &self.auth {
            for challenge in auth.challenges(&self.nonce) {
                resp = resp.header("WWW-Authenticate", challenge);
            }
        }
        resp
    }

    /// Dispatches one parsed request to the matching directive handler,
    /// applying the authentication challenge uniformly first.
    pub fn handle(&mut self, request: &Request) -> Response {
        if matches!(self.auth, Some(_)) && !matches!(request.method, Method::Options) {
            if let Err(err) = self.authorize(request) {
                return match err {
                    Error::AuthRequired | Error::AuthRejected => self.unauthorized(request),
                    _ => Response::new(500, "Internal Server Error").cseq(request.cseq),
                };
            }
        }
        match request.method {
            Method::Options => self.options(request),
            Method::Describe => self.describe(request),
            Method::Setup => self.setup(request),
            Method::Play => self.play(request),
            Method::Pause => self.pause(request),
            Method::Teardown => self.teardown(request),
            Method::GetParameter => self.get_parameter(request),
        }
    }

    fn options(&self, request: &Request) -> Response {
        Response::ok().cseq(request.cseq).header(
            "Public",
            "OPTIONS, DESCRIBE, SETUP, PLAY, PAUSE, TEARDOWN, GET_PARAMETER",
        )
    }

    fn describe(&mut self, request: &Request) -> Response {
        let client_ip = request
            .header("x-forwarded-for")
            .unwrap_or("0.0.0.0")
            .to_string();
        let descriptions: Vec<TrackDescription<'_>> = self
            .file
            .tracks
            .iter()
            .map(|t| TrackDescription {
                track_id: t.track_id,
                handler_type: t.handler_type,
                stsd: &t.stsd,
            })
            .collect();
        let sdp = build_sdp(&client_ip, &descriptions);
        self.state = SessionState::Described;
        Response::ok()
            .cseq(request.cseq)
            .header("Content-Base", format!("{}/", self.content_base))
            .header("Content-Type", "application/sdp")
            .body(sdp)
    }

    fn setup(&mut self, request: &Request) -> Response {
        let Some(track_id) = request.track_control_id() else {
            return Response::new(400, "Bad Request").cseq(request.cseq);
        };
        let Some(track_index) = self.file.tracks.iter().position(|t| t.track_id == track_id)
        else {
            return Response::new(404, "Not Found").cseq(request.cseq);
        };
        let Some(payload) = detect_payload_kind(&self.file.tracks[track_index].stsd) else {
            return Response::new(415, "Unsupported Media Type").cseq(request.cseq);
        };
        let Some(transport) = request.header("transport") else {
            return Response::new(400, "Bad Request").cseq(request.cseq);
        };
        let Some((rtp_channel, rtcp_channel)) = parse_interleaved_channels(transport) else {
            return Response::new(461, "Unsupported Transport").cseq(request.cseq);
        };

        let timescale = self.file.tracks[track_index].timescale.max(1);
        // Video rides the fixed 90kHz RTP clock; audio's RTP clock is the
        // AAC sample rate, which for an ISO-BMFF AAC track matches its
        // `mdhd` timescale, so the decode-time ticks need no conversion.
        let rtp_timescale_ratio = if payload.is_video() {
            boxfile_rtp::VIDEO_CLOCK_RATE as f64 / timescale as f64
        } else {
            1.0
        };
        let payload_type = if payload.is_video() {
            PAYLOAD_TYPE_VIDEO
        } else {
            PAYLOAD_TYPE_AUDIO
        };
        self.streams.push(TrackStream {
            track_index,
            payload,
            header: RtpHeader::new(payload_type, rtp_channel),
            pacer: Pacer::new(),
            rtp_timescale_ratio,
        });

        self.state = SessionState::Setup;
        Response::ok()
            .cseq(request.cseq)
            .header("Session", self.session_id.as_str().to_string())
            .header(
                "Transport",
                format!("{transport};interleaved={rtp_channel}-{rtcp_channel}"),
            )
    }

    fn play(&mut self, request: &Request) -> Response {
        if self.state != SessionState::Setup && self.state != SessionState::Paused {
            return Response::new(455, "Method Not Valid In This State").cseq(request.cseq);
        }
        if let Some(range) = request.header("range") {
            match NptRange::parse(range) {
                Some(r) => self.play_range = Some(r),
                None => return Response::new(400, "Bad Request").cseq(request.cseq),
            }
        }
        if let Some(scale) = request.header("scale") {
            match playrange::parse_scale(scale) {
                Some(s) => self.scale = s,
                None => return Response::new(400, "Bad Request").cseq(request.cseq),
            }
        }

        let duration_secs = self.file.media_duration_sec();
        let range = self.play_range.unwrap_or(NptRange { start: 0.0, end: None });
        if range.start < 0.0 || range.end.is_some_and(|e| e > duration_secs + f64::EPSILON) {
            return Response::new(400, "Bad Request").cseq(request.cseq);
        }
        // Reverse trick-play starts at the range's end and walks backward;
        // forward play starts at the range's start, as usual.
        let seek_secs = if self.scale < 0.0 {
            range.end.unwrap_or(duration_secs)
        } else {
            range.start
        };
        for stream in &self.streams {
            let index = sample_index_for_time(&self.file.tracks[stream.track_index], seek_secs);
            let _ = self.file.move_to(stream.track_index, index);
        }

        self.state = SessionState::Playing;
        Response::ok()
            .cseq(request.cseq)
            .header("Range", range.format(duration_secs))
            .header("Scale", self.scale.to_string())
            .header("Session", self.session_id.as_str().to_string())
    }

    fn pause(&mut self, request: &Request) -> Response {
        if self.state != SessionState::Playing {
            return Response::new(455, "Method Not Valid In This State").cseq(request.cseq);
        }
        self.state = SessionState::Paused;
        Response::ok()
            .cseq(request.cseq)
            .header("Session", self.session_id.as_str().to_string())
    }

    fn teardown(&mut self, request: &Request) -> Response {
        self.state = SessionState::Teardown;
        Response::ok()
            .cseq(request.cseq)
            .header("Session", self.session_id.as_str().to_string())
    }

    fn get_parameter(&self, request: &Request) -> Response {
        let resp = Response::ok().cseq(request.cseq);
        if request.body.trim() != "position" {
            return resp;
        }
        let Some(stream) = self.streams.iter().find(|s| s.payload.is_video()) else {
            return resp;
        };
        let track = &self.file.tracks[stream.track_index];
        let last_emitted = track.cursor_index().saturating_sub(1);
        let Ok(info) = track.sample_info(last_emitted.min(track.sample_count().saturating_sub(1))) else {
            return resp;
        };
        let position_secs = info.decode_time as f64 / track.timescale.max(1) as f64;
        let position = playrange::offset(self.started_at, position_secs);
        resp.header("Range", playrange::clock_point(position))
    }

    /// Pulls one due frame from whichever track's pacer is ready, fragments
    /// it, and returns the interleaved-TCP-framed RTP packets to write.
    /// Returns an empty vector when nothing is due yet.
    pub fn pull_due_frames(&mut self, now: Instant) -> Result<Vec<Bytes>> {
        if self.state != SessionState::Playing {
            return Ok(Vec::new());
        }
        let trick = TrickPlay {
            scale: self.scale,
            forward: self.scale >= 0.0,
            applicable: self.scale.abs() != 1.0,
        };
        let mut frames = Vec::new();
        for i in 0..self.streams.len() {
            if !self.streams[i].pacer.is_due(now, trick.scale) {
                continue;
            }
            if let Some(packets) = self.pull_one(i, now, trick)? {
                frames.extend(packets);
            }
        }
        Ok(frames)
    }

    fn pull_one(&mut self, stream_index: usize, now: Instant, trick: TrickPlay) -> Result<Option<Vec<Bytes>>> {
        let track_index = self.streams[stream_index].track_index;
        let payload = self.streams[stream_index].payload;

        let (info, bytes) = if trick.forward {
            self.file.next_sample(track_index)?
        } else {
            self.file.move_back(track_index)?
        };

        if !trick.forward {
            let length_size = match payload {
                PayloadKind::Avc { length_size } | PayloadKind::Hevc { length_size } => length_size,
                PayloadKind::Aac => {
                    // Reverse trick-play only applies to the video track;
                    // audio simply stops emitting.
                    return Ok(None);
                }
            };
            if !sample_is_keyframe(payload.is_hevc(), &bytes, length_size) {
                return Ok(None);
            }
        }

        let duration_ticks = self.next_sample_duration(track_index, &info)?;
        let timescale = self.file.tracks[track_index].timescale.max(1);
        let rtp_timescale_ratio = self.streams[stream_index].rtp_timescale_ratio;
        let timestamp = (info.decode_time as f64 * rtp_timescale_ratio) as u32;
        let fragments = make_fragments(payload, &bytes)?;

        let stream = &mut self.streams[stream_index];
        let last = fragments.len().saturating_sub(1);
        let mut packets = Vec::with_capacity(fragments.len());
        for (i, fragment) in fragments.into_iter().enumerate() {
            let marker = i == last && fragment.marker;
            packets.push(stream.header.frame(marker, timestamp, &fragment.payload));
        }
        stream.pacer.record_frame(now, duration_ticks, timescale);
        Ok(Some(packets))
    }

    fn next_sample_duration(&self, track_index: usize, info: &SampleInfo) -> Result<u32> {
        let track = &self.file.tracks[track_index];
        let index = track.cursor_index();
        let next_time = if index < track.sample_count() {
            track.sample_info(index)?.decode_time
        } else {
            info.decode_time
        };
        Ok(next_time.saturating_sub(info.decode_time).max(1) as u32)
    }
}

/// Binary-searches the track's decode-time column for the first sample at
/// or after `start_secs`, following the same "compare consecutive
/// `sample_info` decode times" idiom used to compute per-sample durations.
fn sample_index_for_time(track: &TrackInfo, start_secs: f64) -> u64 {
    let target_ticks = (start_secs * track.timescale as f64).round() as u64;
    let count = track.sample_count();
    if count == 0 {
        return 0;
    }
    let mut lo = 0u64;
    let mut hi = count - 1;
    while lo < hi {
        let mid = lo + (hi - lo) / 2;
        let Ok(info) = track.sample_info(mid) else {
            return lo;
        };
        if info.decode_time < target_ticks {
            lo = mid + 1;
        } else {
            hi = mid;
        }
    }
    lo
}

fn make_fragments(payload: PayloadKind, sample: &[u8]) -> Result<Vec<Fragment>> {
    match payload {
        PayloadKind::Avc { .. } => Ok(boxfile_rtp::fragment_avc(sample, boxfile_rtp::DEFAULT_CHUNK_SIZE)?),
        PayloadKind::Hevc { .. } => Ok(boxfile_rtp::fragment_hevc(sample, boxfile_rtp::DEFAULT_CHUNK_SIZE)?),
        PayloadKind::Aac => Ok(vec![boxfile_rtp::packetize_aac(sample)?]),
    }
}

/// Parses `...;interleaved=<a>-<b>` out of a `Transport:` header value.
fn parse_interleaved_channels(transport: &str) -> Option<(u8, u8)> {
    for field in transport.split(';') {
        if let Some(rest) = field.trim().strip_prefix("interleaved=") {
            let (a, b) = rest.split_once('-')?;
            return Some((a.parse().ok()?, b.parse().ok()?));
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_interleaved_transport() {
        assert_eq!(
            parse_interleaved_channels("RTP/AVP/TCP;unicast;interleaved=0-1"),
            Some((0, 1))
        );
    }

    #[test]
    fn rejects_transport_without_interleaved() {
        assert_eq!(parse_interleaved_channels("RTP/AVP;unicast;client_port=5000-5001"), None);
    }
}
