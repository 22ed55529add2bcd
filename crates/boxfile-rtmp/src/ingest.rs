//! Accumulates one RTMP publish session's metadata, video, and audio
//! samples, then hands them to `moov` once the publisher disconnects
//! (§4.7: ingest sink, write-once to a finished MP4 file).

use std::path::Path;

use boxfile_media::mp4::body::{AvcCBox, EsdsBox};

use crate::audio::AudioTag;
use crate::error::{Error, Result};
use crate::moov::{self, SampleTrack, TrackKind};
use crate::video::VideoTag;

/// MPEG-4 Audio Object Type 2 (AAC LC), the only profile this sink expects
/// a publisher to send.
const AAC_LC: u8 = 2;

const AAC_SAMPLE_RATES: [u32; 13] = [
    96000, 88200, 64000, 48000, 44100, 32000, 24000, 22050, 16000, 12000, 11025, 8000, 7350,
];

struct TrackBuffer {
    /// `(decode_time_ms, payload)` in arrival order.
    samples: Vec<(u32, Vec<u8>)>,
}

impl TrackBuffer {
    fn new() -> Self {
        Self { samples: Vec::new() }
    }

    fn total_bytes(&self) -> usize {
        self.samples.iter().map(|(_, data)| data.len()).sum()
    }
}

/// One publisher's accumulated state, from `publish` through `finish()`.
pub struct IngestSession {
    publishing_name: String,
    avcc: Option<AvcCBox>,
    width: u16,
    height: u16,
    video: TrackBuffer,
    audio_config: Option<(u32, u16)>,
    audio: TrackBuffer,
}

impl IngestSession {
    pub fn new(publishing_name: impl Into<String>) -> Self {
        Self {
            publishing_name: publishing_name.into(),
            avcc: None,
            width: 0,
            height: 0,
            video: TrackBuffer::new(),
            audio_config: None,
            audio: TrackBuffer::new(),
        }
    }

    pub fn publishing_name(&self) -> &str {
        &self.publishing_name
    }

    /// The NAL length-prefix width the AVC sequence header declared, or
    /// `None` before it has arrived. `connection`'s dispatch loop needs
    /// this to parse subsequent video tags.
    pub fn video_length_size(&self) -> Option<u8> {
        self.avcc.as_ref().map(|a| a.length_size_minus_one + 1)
    }

    /// `onMetaData`'s width/height fields, used for the `tkhd`/`stsd` of the
    /// video track until (and unless) the AVC sequence header overrides
    /// them with the encoder's own sample description.
    pub fn on_metadata(&mut self, width: Option<f64>, height: Option<f64>) {
        if let Some(w) = width {
            self.width = w as u16;
        }
        if let Some(h) = height {
            self.height = h as u16;
        }
    }

    pub fn on_video_tag(&mut self, timestamp_ms: u32, tag: VideoTag) -> Result<()> {
        match tag {
            VideoTag::SequenceHeader(record) => {
                self.width = self.width.max(0);
                self.avcc = Some(AvcCBox {
                    configuration_version: record.configuration_version,
                    profile: record.profile_indication,
                    compatibility: record.profile_compatibility,
                    level: record.level_indication,
                    length_size_minus_one: record.length_size - 1,
                    sps: record.sps,
                    pps: record.pps,
                    trailing: Vec::new(),
                });
            }
            VideoTag::Nalus { nalus, .. } => {
                if self.avcc.is_none() {
                    return Err(Error::protocol("video sample arrived before a sequence header"));
                }
                let avcc = self.avcc.as_ref().unwrap();
                let length_size = avcc.length_size_minus_one as usize + 1;
                let mut payload = Vec::new();
                for nalu in &nalus {
                    payload.extend_from_slice(&(nalu.len() as u32).to_be_bytes()[4 - length_size..]);
                    payload.extend_from_slice(nalu);
                }
                self.video.samples.push((timestamp_ms, payload));
            }
        }
        Ok(())
    }

    pub fn on_audio_tag(&mut self, timestamp_ms: u32, tag: AudioTag) -> Result<()> {
        match tag {
            AudioTag::SequenceHeader(config) => {
                self.audio_config = Some(parse_audio_specific_config(&config)?);
            }
            AudioTag::Raw(frame) => {
                if self.audio_config.is_none() {
                    return Err(Error::protocol("audio sample arrived before a sequence header"));
                }
                self.audio.samples.push((timestamp_ms, frame));
            }
        }
        Ok(())
    }

    /// Builds the finished MP4 in memory. Fails only if a track whose
    /// sequence header never arrived has samples buffered, which the
    /// `on_*_tag` calls above already guard against.
    pub fn finish(self) -> Result<Vec<u8>> {
        let mut tracks = Vec::new();
        let mut data_slices: Vec<Vec<u8>> = Vec::new();
        let mut next_track_id = 1u32;

        if !self.video.samples.is_empty() {
            let avcc = self
                .avcc
                .ok_or_else(|| Error::protocol("video samples present without a sequence header"))?;
            let duration = video_duration(&self.video.samples);
            let samples = self
                .video
                .samples
                .iter()
                .map(|(t, data)| (*t, data.len() as u32))
                .collect();
            tracks.push(SampleTrack {
                track_id: next_track_id,
                duration,
                kind: TrackKind::Video { width: self.width, height: self.height, avcc },
                samples,
            });
            next_track_id += 1;
            data_slices.push(self.video.samples.into_iter().flat_map(|(_, d)| d).collect());
        }

        if !self.audio.samples.is_empty() {
            let (sample_rate, channels) = self
                .audio_config
                .ok_or_else(|| Error::protocol("audio samples present without a sequence header"))?;
            let esds = audio_esds(sample_rate, channels);
            let duration = video_duration(&self.audio.samples);
            let samples = self
                .audio
                .samples
                .iter()
                .map(|(t, data)| (*t, data.len() as u32))
                .collect();
            tracks.push(SampleTrack {
                track_id: next_track_id,
                duration,
                kind: TrackKind::Audio { channels, sample_rate, esds },
                samples,
            });
            data_slices.push(self.audio.samples.into_iter().flat_map(|(_, d)| d).collect());
        }

        if tracks.is_empty() {
            return Err(Error::protocol("publish produced no samples"));
        }

        let slices: Vec<&[u8]> = data_slices.iter().map(Vec::as_slice).collect();
        Ok(moov::build(&tracks, &slices))
    }

    /// Bytes of video plus audio samples buffered so far, so a connection
    /// loop can cap how long it keeps a publish session in memory.
    pub fn buffered_bytes(&self) -> usize {
        self.video.total_bytes() + self.audio.total_bytes()
    }
}

/// Track duration as `last_dts + last_sample_duration`, extending the final
/// inter-sample delta the same way `build_stts` does, so `mdhd.duration`
/// matches the sum of the `stts` entries it sits next to.
fn video_duration(samples: &[(u32, Vec<u8>)]) -> u64 {
    let len = samples.len();
    if len == 0 {
        return 0;
    }
    let last_ts = samples[len - 1].0 as u64;
    let last_delta = if len > 1 {
        samples[len - 1].0.saturating_sub(samples[len - 2].0).max(1) as u64
    } else {
        1
    };
    last_ts + last_delta
}

/// Unpacks an AAC `AudioSpecificConfig`'s sampling frequency index and
/// channel configuration, returning `(sample_rate_hz, channel_count)`.
fn parse_audio_specific_config(bytes: &[u8]) -> Result<(u32, u16)> {
    if bytes.len() < 2 {
        return Err(Error::protocol("AudioSpecificConfig too short"));
    }
    let freq_index = ((bytes[0] & 0x07) << 1) | (bytes[1] >> 7);
    let channel_config = (bytes[1] >> 3) & 0x0f;
    let sample_rate = *AAC_SAMPLE_RATES
        .get(freq_index as usize)
        .ok_or_else(|| Error::protocol(format!("unsupported AAC sampling frequency index {freq_index}")))?;
    Ok((sample_rate, channel_config as u16))
}

fn audio_esds(sample_rate: u32, channels: u16) -> EsdsBox {
    let freq_index = AAC_SAMPLE_RATES
        .iter()
        .position(|&r| r == sample_rate)
        .unwrap_or(3) as u8;
    let decoder_specific = vec![
        (AAC_LC << 3) | (freq_index >> 1),
        (freq_index << 7) | ((channels as u8) << 3),
    ];
    EsdsBox {
        es_id: 1,
        stream_priority: 0,
        object_type_id: 0x40,
        stream_type: 0x15,
        buffer_size_db: 0,
        max_bitrate: 0,
        avg_bitrate: 0,
        decoder_specific,
    }
}

/// Writes `data` to a temp file in `dir` and renames it into place at
/// `final_path`, so a reader never observes a partially written file.
pub async fn write_atomically(dir: &Path, final_path: &Path, data: Vec<u8>) -> Result<()> {
    let dir = dir.to_path_buf();
    let final_path = final_path.to_path_buf();
    tokio::task::spawn_blocking(move || -> std::io::Result<()> {
        use std::io::Write;
        let mut file = tempfile::NamedTempFile::new_in(&dir)?;
        file.write_all(&data)?;
        file.flush()?;
        file.persist(&final_path)
            .map_err(|e| e.error)?;
        Ok(())
    })
    .await
    .map_err(|e| Error::protocol(format!("write task panicked: {e}")))??;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::video::AvcDecoderConfigurationRecord;

    fn seq_header() -> AvcDecoderConfigurationRecord {
        AvcDecoderConfigurationRecord {
            configuration_version: 1,
            profile_indication: 0x64,
            profile_compatibility: 0,
            level_indication: 0x1f,
            length_size: 4,
            sps: vec![vec![1, 2, 3]],
            pps: vec![vec![4, 5]],
        }
    }

    #[test]
    fn rejects_video_sample_before_sequence_header() {
        let mut session = IngestSession::new("mystream");
        let err = session
            .on_video_tag(0, VideoTag::Nalus { composition_time: 0, nalus: vec![vec![1, 2]] })
            .unwrap_err();
        assert!(matches!(err, Error::ProtocolError(_)));
    }

    #[test]
    fn finish_builds_mp4_bytes_for_video_only_session() {
        let mut session = IngestSession::new("mystream");
        session.on_metadata(Some(640.0), Some(360.0));
        session.on_video_tag(0, VideoTag::SequenceHeader(seq_header())).unwrap();
        for i in 0..5u32 {
            session
                .on_video_tag(i * 33, VideoTag::Nalus { composition_time: 0, nalus: vec![vec![9, 9, 9]] })
                .unwrap();
        }
        let bytes = session.finish().unwrap();
        assert_eq!(&bytes[4..8], b"ftyp");
    }

    #[test]
    fn parses_aac_sampling_frequency_and_channels() {
        let config = [0x12, 0x10];
        let (rate, channels) = parse_audio_specific_config(&config).unwrap();
        assert_eq!(rate, 44100);
        assert_eq!(channels, 2);
    }

    #[test]
    fn finish_without_any_samples_is_an_error() {
        let session = IngestSession::new("mystream");
        assert!(session.finish().is_err());
    }

    #[test]
    fn video_duration_extends_the_final_inter_sample_delta() {
        // 33ms apart throughout: duration must cover the last frame's own
        // interval (1947 + 33 = 1980), not stop one tick short (1947 + 1).
        let samples: Vec<(u32, Vec<u8>)> = (0..60u32).map(|i| (i * 33, Vec::new())).collect();
        assert_eq!(video_duration(&samples), 1980);
    }

    #[test]
    fn video_duration_of_a_single_sample_is_one_tick() {
        let samples = vec![(0u32, Vec::new())];
        assert_eq!(video_duration(&samples), 1);
    }
}
