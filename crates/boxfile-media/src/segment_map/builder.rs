//! Builds a [`SegmentMap`] from an open [`Mp4File`]: a video pacemaker cut
//! at keyframes no closer than the target duration, with audio/text tracks
//! sliced to the same time windows.

use crate::error::{Error, Result};
use crate::fmp4::{
    FragmentSample, InitSegmentBuilder, MoofBuilder, TrackFragment, TrackKind, TrackSpec,
    VisualCodec,
};
use crate::mp4::body::{CodecConfig, StsdEntry};
use crate::mp4::Mp4File;

use super::{Fragment, Segment, SegmentMap, TrackRange};

pub struct SegmentMapBuilder {
    target_duration_secs: f64,
}

impl SegmentMapBuilder {
    pub fn new() -> Self {
        Self {
            target_duration_secs: 6.0,
        }
    }

    pub fn target_duration(mut self, secs: f64) -> Self {
        self.target_duration_secs = secs;
        self
    }

    pub fn build(self, file: &mut Mp4File) -> Result<SegmentMap> {
        let video_index = file
            .tracks
            .iter()
            .position(|t| t.is_video())
            .ok_or_else(|| Error::malformed("no video track to pace fragments on".into()))?;

        let init_segment = self.build_init_segment(file)?;

        let video_timescale = file.tracks[video_index].timescale;
        let video_count = file.tracks[video_index].sample_count();
        if video_count == 0 {
            return Ok(SegmentMap {
                movie_timescale: file.movie_timescale,
                duration_secs: 0.0,
                target_duration_secs: self.target_duration_secs,
                max_segment_duration_secs: 0.0,
                segments: Vec::new(),
                init_segment,
            });
        }

        let keyframes = self.keyframe_indices(file, video_index)?;
        let boundaries = self.cut_points(file, video_index, video_timescale, &keyframes)?;

        let other_indices: Vec<usize> = (0..file.tracks.len()).filter(|&i| i != video_index).collect();

        let mut segments = Vec::with_capacity(boundaries.len());
        let mut sequence_number = 0u32;
        for (i, &(start, end)) in boundaries.iter().enumerate() {
            let start_time_secs = file.tracks[video_index].sample_info(start)?.decode_time as f64
                / video_timescale.max(1) as f64;
            let end_time_secs = if end < video_count {
                file.tracks[video_index].sample_info(end)?.decode_time as f64
                    / video_timescale.max(1) as f64
            } else {
                file.media_duration_sec()
            };

            // A segment is an ordered list of `moof` fragments: every
            // keyframe-to-keyframe span within `[start, end)` gets its own
            // `moof`+`mdat`, not one merged fragment for the whole span.
            let spans = Self::fragment_spans(start, end, &keyframes);
            let mut fragments = Vec::with_capacity(spans.len());

            for &(span_start, span_end) in &spans {
                let span_start_secs = file.tracks[video_index].sample_info(span_start)?.decode_time as f64
                    / video_timescale.max(1) as f64;
                let span_end_secs = if span_end < video_count {
                    file.tracks[video_index].sample_info(span_end)?.decode_time as f64
                        / video_timescale.max(1) as f64
                } else {
                    file.media_duration_sec()
                };

                let mut track_data = Vec::with_capacity(1 + other_indices.len());

                let (video_range, video_samples) =
                    self.track_range(file, video_index, span_start, span_end, Some(&keyframes))?;
                track_data.push((video_range, video_samples));

                for &idx in &other_indices {
                    let (ts, te) = self.time_window_to_samples(file, idx, span_start_secs, span_end_secs)?;
                    if ts >= te {
                        continue;
                    }
                    let (range, samples) = self.track_range(file, idx, ts, te, None)?;
                    track_data.push((range, samples));
                }

                let track_fragments: Vec<TrackFragment<'_>> = track_data
                    .iter()
                    .map(|(range, samples)| TrackFragment {
                        track_id: range.track_id,
                        base_media_decode_time: range.base_media_decode_time,
                        samples: samples.as_slice(),
                    })
                    .collect();
                let moof_data = MoofBuilder::new(sequence_number).build(&track_fragments);

                fragments.push(Fragment {
                    sequence_number,
                    tracks: track_data.into_iter().map(|(range, _)| range).collect(),
                    moof_data,
                });
                sequence_number += 1;
            }

            segments.push(Segment {
                index: i as u32,
                start_time_secs,
                duration_secs: (end_time_secs - start_time_secs).max(0.0),
                fragments,
            });
        }

        let total_duration = segments.iter().map(|s| s.duration_secs).sum();
        let max_duration = segments.iter().map(|s| s.duration_secs).fold(0.0, f64::max);

        Ok(SegmentMap {
            movie_timescale: file.movie_timescale,
            duration_secs: total_duration,
            target_duration_secs: self.target_duration_secs,
            max_segment_duration_secs: max_duration,
            segments,
            init_segment,
        })
    }

    fn build_init_segment(&self, file: &Mp4File) -> Result<Vec<u8>> {
        let mut builder = InitSegmentBuilder::new(file.movie_timescale);
        for track in &file.tracks {
            let kind = if track.is_video() {
                let entry = track
                    .stsd
                    .entries
                    .iter()
                    .find_map(|e| match e {
                        StsdEntry::Visual(v) => Some(v),
                        _ => None,
                    })
                    .ok_or_else(|| Error::malformed("video track has no visual stsd entry".into()))?;
                let codec = match &entry.config {
                    CodecConfig::Avc(a) => VisualCodec::Avc(a.clone()),
                    CodecConfig::Hvc(h) => VisualCodec::Hvc(h.clone()),
                    _ => return Err(Error::unsupported("video track codec is neither AVC nor HEVC".into())),
                };
                TrackKind::Video {
                    width: entry.width as u32,
                    height: entry.height as u32,
                    codec,
                }
            } else if track.is_audio() {
                let entry = track
                    .stsd
                    .entries
                    .iter()
                    .find_map(|e| match e {
                        StsdEntry::Audio(a) => Some(a),
                        _ => None,
                    })
                    .ok_or_else(|| Error::malformed("audio track has no audio stsd entry".into()))?;
                let esds = match &entry.config {
                    CodecConfig::Esds(e) => e.clone(),
                    _ => return Err(Error::unsupported("audio track is not MPEG-4 AAC (esds)".into())),
                };
                TrackKind::Audio {
                    channels: entry.channel_count,
                    sample_rate: entry.sample_rate >> 16,
                    esds,
                }
            } else {
                TrackKind::Text
            };

            builder = builder.track(TrackSpec {
                track_id: track.track_id,
                timescale: track.timescale,
                duration: track.duration,
                kind,
            });
        }
        Ok(builder.build().data)
    }

    /// Every video sample carrying an AVC IDR or HEVC IRAP slice.
    fn keyframe_indices(&self, file: &mut Mp4File, video_index: usize) -> Result<Vec<u64>> {
        let count = file.tracks[video_index].sample_count();
        let mut out = Vec::new();
        for i in 0..count {
            if file.is_keyframe(video_index, i)? {
                out.push(i);
            }
        }
        if out.is_empty() {
            out.push(0);
        }
        Ok(out)
    }

    /// Groups keyframe-to-keyframe spans into segments no shorter than the
    /// target duration (the last span of the file is never split further).
    fn cut_points(
        &self,
        file: &mut Mp4File,
        video_index: usize,
        video_timescale: u32,
        keyframes: &[u64],
    ) -> Result<Vec<(u64, u64)>> {
        let total = file.tracks[video_index].sample_count();
        let target_ticks = (self.target_duration_secs * video_timescale as f64) as u64;

        let mut boundaries = Vec::new();
        let mut segment_start = 0u64;
        let mut segment_start_time = 0u64;

        for (i, &kf) in keyframes.iter().enumerate() {
            if kf == 0 {
                continue;
            }
            let is_last = i == keyframes.len() - 1;
            let kf_time = file.tracks[video_index].sample_info(kf)?.decode_time;
            if kf_time.saturating_sub(segment_start_time) >= target_ticks {
                boundaries.push((segment_start, kf));
                segment_start = kf;
                segment_start_time = kf_time;
            }
            if is_last && segment_start < total {
                boundaries.push((segment_start, total));
                segment_start = total;
            }
        }
        if segment_start < total {
            boundaries.push((segment_start, total));
        }
        Ok(boundaries)
    }

    /// Splits one segment's `[start, end)` video span into its individual
    /// keyframe-to-keyframe fragments: every keyframe in range starts a new
    /// fragment, which runs until the next keyframe or `end`.
    fn fragment_spans(start: u64, end: u64, keyframes: &[u64]) -> Vec<(u64, u64)> {
        let starts: Vec<u64> = keyframes.iter().copied().filter(|&k| k >= start && k < end).collect();
        let starts = if starts.is_empty() { vec![start] } else { starts };

        starts
            .iter()
            .enumerate()
            .map(|(i, &s)| (s, starts.get(i + 1).copied().unwrap_or(end)))
            .collect()
    }

    /// Binary search over decode times to find the sample index range of
    /// `track_index` overlapping `[start_secs, end_secs)`.
    fn time_window_to_samples(
        &self,
        file: &mut Mp4File,
        track_index: usize,
        start_secs: f64,
        end_secs: f64,
    ) -> Result<(u64, u64)> {
        let timescale = file.tracks[track_index].timescale.max(1) as f64;
        let start_ticks = (start_secs * timescale) as u64;
        let end_ticks = (end_secs * timescale) as u64;
        let count = file.tracks[track_index].sample_count();

        let first = self.lower_bound(file, track_index, count, start_ticks)?;
        let last = self.lower_bound(file, track_index, count, end_ticks)?;
        Ok((first, last))
    }

    fn lower_bound(&self, file: &mut Mp4File, track_index: usize, count: u64, target_ticks: u64) -> Result<u64> {
        let mut lo = 0u64;
        let mut hi = count;
        while lo < hi {
            let mid = lo + (hi - lo) / 2;
            let t = file.tracks[track_index].sample_info(mid)?.decode_time;
            if t < target_ticks {
                lo = mid + 1;
            } else {
                hi = mid;
            }
        }
        Ok(lo)
    }

    /// Reads `[start, end)` of `track_index`, coalescing contiguous sample
    /// data into byte ranges and building the matching `FragmentSample`
    /// list. `keyframes`, if given, marks video sync samples; everything
    /// else (audio, text) is flagged as not depending on another sample.
    fn track_range(
        &self,
        file: &mut Mp4File,
        track_index: usize,
        start: u64,
        end: u64,
        keyframes: Option<&[u64]>,
    ) -> Result<(TrackRange, Vec<FragmentSample>)> {
        let track_id = file.tracks[track_index].track_id;
        let base_media_decode_time = file.tracks[track_index].sample_info(start)?.decode_time;

        let mut byte_ranges: Vec<(u64, u32)> = Vec::new();
        let mut samples = Vec::with_capacity((end - start) as usize);

        for i in start..end {
            let info = file.tracks[track_index].sample_info(i)?;
            if let Some(last) = byte_ranges.last_mut() {
                if last.0 + last.1 as u64 == info.offset {
                    last.1 += info.size;
                } else {
                    byte_ranges.push((info.offset, info.size));
                }
            } else {
                byte_ranges.push((info.offset, info.size));
            }

            let next_time = if i + 1 < end {
                file.tracks[track_index].sample_info(i + 1)?.decode_time
            } else if i + 1 < file.tracks[track_index].sample_count() {
                file.tracks[track_index].sample_info(i + 1)?.decode_time
            } else {
                info.decode_time
            };
            let duration = next_time.saturating_sub(info.decode_time).max(1) as u32;

            let is_keyframe = match keyframes {
                Some(kfs) => kfs.binary_search(&i).is_ok(),
                None => true,
            };

            samples.push(FragmentSample {
                size: info.size,
                duration,
                is_keyframe,
                composition_time_offset: info.composition_offset as i32,
            });
        }

        Ok((
            TrackRange {
                track_id,
                start_sample: start,
                end_sample: end,
                base_media_decode_time,
                byte_ranges,
            },
            samples,
        ))
    }
}

impl Default for SegmentMapBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write as _;

    use bytes::{BufMut, BytesMut};

    use crate::mp4::Mp4File;

    use super::SegmentMapBuilder;

    fn wrap(fourcc: &[u8; 4], body: &[u8]) -> Vec<u8> {
        let mut out = BytesMut::with_capacity(8 + body.len());
        out.put_u32((8 + body.len()) as u32);
        out.put_slice(fourcc);
        out.put_slice(body);
        out.to_vec()
    }

    fn full_header() -> Vec<u8> {
        vec![0, 0, 0, 0]
    }

    /// One AVC video track, 4 samples at a 1000 timescale with a 100-tick
    /// delta each (0.1s apart) and keyframes at samples 0 and 2, laid out
    /// as a single chunk in one `mdat`.
    fn write_fixture() -> tempfile::NamedTempFile {
        let mvhd = {
            let mut b = full_header();
            b.extend([0, 0, 0, 0]); // creation_time
            b.extend([0, 0, 0, 0]); // modification_time
            b.extend(1000u32.to_be_bytes()); // timescale
            b.extend(400u32.to_be_bytes()); // duration
            b.extend(0x0001_0000u32.to_be_bytes()); // rate
            b.extend(0x0100i16.to_be_bytes()); // volume
            b.extend([0u8; 10]); // reserved
            for v in crate::mp4::body::MvhdBox::UNITY_MATRIX {
                b.extend(v.to_be_bytes());
            }
            b.extend([0u8; 24]); // pre_defined[6]
            b.extend(2u32.to_be_bytes()); // next_track_id
            wrap(b"mvhd", &b)
        };

        let tkhd = {
            let mut b = full_header();
            b[3] = 0x07; // enabled | in-movie | in-preview
            b.extend([0, 0, 0, 0]);
            b.extend([0, 0, 0, 0]);
            b.extend(1u32.to_be_bytes()); // track_id
            b.extend([0, 0, 0, 0]); // reserved
            b.extend(400u32.to_be_bytes()); // duration
            b.extend([0u8; 8]); // reserved[2]
            b.extend(0i16.to_be_bytes()); // layer
            b.extend(0i16.to_be_bytes()); // alternate_group
            b.extend(0i16.to_be_bytes()); // volume
            b.extend(0u16.to_be_bytes()); // reserved
            for v in crate::mp4::body::MvhdBox::UNITY_MATRIX {
                b.extend(v.to_be_bytes());
            }
            b.extend(640u32.to_be_bytes()); // width (16.16, but raw u32 is fine here)
            b.extend(480u32.to_be_bytes()); // height
            wrap(b"tkhd", &b)
        };

        let mdhd = {
            let mut b = full_header();
            b.extend([0, 0, 0, 0]);
            b.extend([0, 0, 0, 0]);
            b.extend(1000u32.to_be_bytes()); // timescale
            b.extend(400u32.to_be_bytes()); // duration
            b.extend(0x55c4u16.to_be_bytes()); // language "und"
            b.extend(0u16.to_be_bytes()); // pre_defined
            wrap(b"mdhd", &b)
        };

        let hdlr = {
            let mut b = full_header();
            b.extend([0, 0, 0, 0]); // pre_defined
            b.extend(*b"vide");
            b.extend([0u8; 12]); // reserved[3]
            b.extend(b"VideoHandler\0");
            wrap(b"hdlr", &b)
        };

        let avcc_inner = {
            let mut b = Vec::new();
            b.push(1); // configuration_version
            b.push(0x64); // profile
            b.push(0); // compatibility
            b.push(0x1f); // level
            b.push(0xfc | 0x03); // length_size_minus_one = 3 (4-byte lengths)
            b.push(0xe0 | 1); // num_sps = 1
            b.extend(3u16.to_be_bytes());
            b.extend([0x67, 0x64, 0x00]); // dummy SPS bytes
            b.push(1); // num_pps
            b.extend(2u16.to_be_bytes());
            b.extend([0x68, 0xee]); // dummy PPS bytes
            b
        };
        let avcc = wrap(b"avcC", &avcc_inner);

        let avc1 = {
            let mut b = Vec::new();
            b.extend([0u8; 6]); // reserved
            b.extend(1u16.to_be_bytes()); // data_reference_index
            b.extend([0u8; 16]); // pre_defined + reserved + pre_defined[3]
            b.extend(640u16.to_be_bytes()); // width
            b.extend(480u16.to_be_bytes()); // height
            b.extend(0x0048_0000u32.to_be_bytes()); // horizresolution
            b.extend(0x0048_0000u32.to_be_bytes()); // vertresolution
            b.extend([0u8; 4]); // reserved
            b.extend(1u16.to_be_bytes()); // frame_count
            b.extend([0u8; 32]); // compressorname
            b.extend(0x0018u16.to_be_bytes()); // depth
            b.extend((-1i16).to_be_bytes()); // pre_defined
            b.extend_from_slice(&avcc);
            wrap(b"avc1", &b)
        };

        let stsd = {
            let mut b = full_header();
            b.extend(1u32.to_be_bytes()); // entry count
            b.extend_from_slice(&avc1);
            wrap(b"stsd", &b)
        };

        let stts = {
            let mut b = full_header();
            b.extend(1u32.to_be_bytes()); // entry count
            b.extend(4u32.to_be_bytes()); // sample_count
            b.extend(100u32.to_be_bytes()); // sample_delta
            wrap(b"stts", &b)
        };

        let stsc = {
            let mut b = full_header();
            b.extend(1u32.to_be_bytes()); // entry count
            b.extend(1u32.to_be_bytes()); // first_chunk
            b.extend(4u32.to_be_bytes()); // samples_per_chunk
            b.extend(1u32.to_be_bytes()); // sample_description_index
            wrap(b"stsc", &b)
        };

        let stsz = {
            let mut b = full_header();
            b.extend(0u32.to_be_bytes()); // sample_size (table follows)
            b.extend(4u32.to_be_bytes()); // sample_count
            for _ in 0..4 {
                b.extend(6u32.to_be_bytes());
            }
            wrap(b"stsz", &b)
        };

        // Samples: [len(4)=2][NAL] each, NAL type 5 (IDR) at 0 and 2, type 1
        // elsewhere, laid out contiguously as one chunk.
        let mut mdat_body = Vec::new();
        for nal in [[0x65u8, 0xaa], [0x61, 0xbb], [0x65, 0xcc], [0x61, 0xdd]] {
            mdat_body.extend(2u32.to_be_bytes());
            mdat_body.extend(nal);
        }

        // Laid out: ftyp, moov(...), mdat. stco points at mdat's payload
        // start, which we only know once ftyp+moov's sizes are fixed.
        let ftyp = {
            let mut b = Vec::new();
            b.extend(*b"isom");
            b.extend(0u32.to_be_bytes());
            b.extend(*b"isom");
            wrap(b"ftyp", &b)
        };

        let stbl_without_stco = [stsd, stts, stsc, stsz].concat();

        // moov size excluding stco's own 8-byte placeholder is fixed; build
        // twice isn't needed since stco's own box size doesn't depend on
        // the offset value it carries.
        let stco_len = 8 + 4 + 4 + 4; // header + full header(4) + count(4) + one offset(4)
        let minf_stbl_len_without_stco = 8 /* stbl header */ + stbl_without_stco.len();
        let mdia_len = 8 /* mdia header */ + mdhd.len() + hdlr.len() + 8 /* minf header */ + minf_stbl_len_without_stco + stco_len;
        let trak_len = 8 /* trak header */ + tkhd.len() + mdia_len;
        let moov_len = 8 /* moov header */ + mvhd.len() + trak_len;

        let mdat_offset = ftyp.len() as u64 + moov_len as u64 + 8 /* mdat header */;

        let stco = {
            let mut b = full_header();
            b.extend(1u32.to_be_bytes()); // entry count
            b.extend((mdat_offset as u32).to_be_bytes());
            wrap(b"stco", &b)
        };
        assert_eq!(stco.len(), stco_len);

        let stbl = {
            let mut body = stbl_without_stco;
            body.extend_from_slice(&stco);
            wrap(b"stbl", &body)
        };
        let minf = wrap(b"minf", &stbl);
        let mdia = [mdhd.as_slice(), hdlr.as_slice(), minf.as_slice()].concat();
        let mdia = wrap(b"mdia", &mdia);
        let trak = [tkhd.as_slice(), mdia.as_slice()].concat();
        let trak = wrap(b"trak", &trak);
        let moov = [mvhd.as_slice(), trak.as_slice()].concat();
        let moov = wrap(b"moov", &moov);
        assert_eq!(moov.len(), moov_len);

        let mdat = wrap(b"mdat", &mdat_body);

        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(&ftyp).unwrap();
        file.write_all(&moov).unwrap();
        file.write_all(&mdat).unwrap();
        file.flush().unwrap();
        file
    }

    #[test]
    fn builds_keyframe_aligned_segments_with_prebuilt_moof() {
        let fixture = write_fixture();
        let mut file = Mp4File::open(fixture.path()).unwrap();

        let map = SegmentMapBuilder::new()
            .target_duration(0.15)
            .build(&mut file)
            .unwrap();

        assert!(!map.init_segment.is_empty());
        assert_eq!(map.segments.len(), 2);

        let first = &map.segments[0];
        assert_eq!(first.fragments.len(), 1);
        assert_eq!(first.fragments[0].tracks.len(), 1);
        assert_eq!(first.fragments[0].tracks[0].start_sample, 0);
        assert_eq!(first.fragments[0].tracks[0].end_sample, 2);
        assert_eq!(first.fragments[0].sequence_number, 0);
        assert!((first.start_time_secs - 0.0).abs() < 1e-9);
        assert!((first.duration_secs - 0.2).abs() < 1e-9);
        assert!(!first.fragments[0].moof_data.is_empty());
        assert_eq!(&first.fragments[0].moof_data[4..8], b"moof");

        let second = &map.segments[1];
        assert_eq!(second.fragments[0].tracks[0].start_sample, 2);
        assert_eq!(second.fragments[0].tracks[0].end_sample, 4);
        // sequence_number carries across the whole stream, not per segment.
        assert_eq!(second.fragments[0].sequence_number, 1);
        assert!((second.start_time_secs - 0.2).abs() < 1e-9);

        assert_eq!(map.segment_count(), 2);
        assert_eq!(map.find_segment_at_time(0.25), Some(1));
    }

    #[test]
    fn fragment_spans_splits_keyframe_to_floor_segment_into_one_span_per_keyframe() {
        let keyframes = vec![0, 30, 60, 90, 120, 150];
        let spans = SegmentMapBuilder::fragment_spans(0, 180, &keyframes);
        assert_eq!(
            spans,
            vec![(0, 30), (30, 60), (60, 90), (90, 120), (120, 150), (150, 180)]
        );
    }

    #[test]
    fn fragment_spans_falls_back_to_whole_range_without_a_keyframe_in_it() {
        let keyframes = vec![0, 180];
        let spans = SegmentMapBuilder::fragment_spans(30, 60, &keyframes);
        assert_eq!(spans, vec![(30, 60)]);
    }
}
