//! Movie fragment (`moof` + `mdat` header) serialization.
//!
//! This module only serializes a fragment description it's handed — keyframe
//! alignment, carrying a sample across a fragment boundary, and synthesizing
//! empty text samples are segment-map concerns (`segment_map::builder`), not
//! this writer's.

use bytes::{BufMut, BytesMut};

use crate::mp4::body::{
    MfhdBox, TfdtBox, TfhdBox, TrunBox, TrunSampleEntry, TRUN_DATA_OFFSET_PRESENT,
    TRUN_SAMPLE_COMPOSITION_TIME_OFFSETS_PRESENT, TRUN_SAMPLE_DURATION_PRESENT,
    TRUN_SAMPLE_FLAGS_PRESENT, TRUN_SAMPLE_SIZE_PRESENT,
};
use crate::mp4::BoxType;

/// Not one of the named presence flags in `tfhd` (it's a behavior flag, not
/// a field-presence flag), so it isn't in `body`'s TFHD_* constant set.
const TFHD_DEFAULT_BASE_IS_MOOF: u32 = 0x02_0000;

fn wrap(box_type: BoxType, body: BytesMut) -> BytesMut {
    let mut out = BytesMut::with_capacity(8 + body.len());
    out.put_u32((8 + body.len()) as u32);
    out.put_slice(&box_type.0);
    out.put_slice(&body);
    out
}

/// One sample's worth of `trun` fields, in presentation order within a
/// fragment.
#[derive(Debug, Clone, Copy)]
pub struct FragmentSample {
    pub size: u32,
    pub duration: u32,
    pub is_keyframe: bool,
    pub composition_time_offset: i32,
}

/// `sample_depends_on`/`sample_is_non_sync_sample` bits for `trun`'s packed
/// sample flags field (ISO/IEC 14496-12 §8.8.3.1).
fn sample_flags(is_keyframe: bool) -> u32 {
    if is_keyframe {
        0x0200_0000 // sample_depends_on = 2 (does not depend on others), not-non-sync
    } else {
        0x0101_0000 // sample_depends_on = 1 (depends on others), is-non-sync
    }
}

pub struct TrackFragment<'a> {
    pub track_id: u32,
    pub base_media_decode_time: u64,
    pub samples: &'a [FragmentSample],
}

/// Builds a `moof` covering one or more tracks' fragments, followed by the
/// `mdat` header for their concatenated sample data (video first if present,
/// matching the order the caller must stream bytes in). Doesn't include the
/// sample bytes themselves — those stream separately for zero-copy serving.
pub struct MoofBuilder {
    sequence_number: u32,
}

impl MoofBuilder {
    pub fn new(sequence_number: u32) -> Self {
        Self { sequence_number }
    }

    pub fn build(&self, tracks: &[TrackFragment<'_>]) -> Vec<u8> {
        let mfhd = wrap(BoxType::MFHD, MfhdBox { sequence_number: self.sequence_number }.encode());

        let mut trafs = Vec::with_capacity(tracks.len());
        for t in tracks {
            trafs.push(self.build_traf(t));
        }

        let mut moof_body = BytesMut::new();
        moof_body.put_slice(&mfhd);
        for traf in &trafs {
            moof_body.put_slice(traf);
        }
        let moof = wrap(BoxType::MOOF, moof_body);

        let total_data_size: u64 = tracks
            .iter()
            .flat_map(|t| t.samples.iter())
            .map(|s| s.size as u64)
            .sum();
        let mdat_header_size: u64 = if total_data_size + 8 > u32::MAX as u64 { 16 } else { 8 };

        let mut data_start = moof.len() as u64 + mdat_header_size;
        let mut data_offset_positions = Vec::with_capacity(tracks.len());
        // data_offset_positions[i] is the byte position, within `moof`, of
        // track i's trun.data_offset field; filled in by build_traf below.
        let mut cursor = 8 /* moof box header */ + 16 /* full mfhd box: header + body */;
        for t in tracks {
            let traf_len = traf_header_len();
            // traf_header_len runs through the end of trun's data_offset
            // field; its start is 4 bytes (the field's own width) earlier.
            data_offset_positions.push(cursor + traf_len - 4);
            cursor += traf_len + t.samples.len() * trun_sample_len();
        }

        let mut out = BytesMut::from(&moof[..]);
        for (pos, t) in data_offset_positions.iter().zip(tracks.iter()) {
            let bytes = (data_start as i32).to_be_bytes();
            out[*pos..*pos + 4].copy_from_slice(&bytes);
            let track_size: u64 = t.samples.iter().map(|s| s.size as u64).sum();
            data_start += track_size;
        }

        if total_data_size + 8 > u32::MAX as u64 {
            out.put_u32(1);
            out.put_slice(b"mdat");
            out.put_u64(total_data_size + 16);
        } else {
            out.put_u32((total_data_size + 8) as u32);
            out.put_slice(b"mdat");
        }

        out.to_vec()
    }

    fn build_traf(&self, t: &TrackFragment<'_>) -> BytesMut {
        let tfhd = wrap(
            BoxType::TFHD,
            TfhdBox {
                flags: TFHD_DEFAULT_BASE_IS_MOOF,
                track_id: t.track_id,
                ..Default::default()
            }
            .encode(),
        );

        let tfdt = wrap(
            BoxType::TFDT,
            TfdtBox {
                version: 1,
                base_media_decode_time: t.base_media_decode_time,
            }
            .encode(),
        );

        let flags = TRUN_DATA_OFFSET_PRESENT
            | TRUN_SAMPLE_DURATION_PRESENT
            | TRUN_SAMPLE_SIZE_PRESENT
            | TRUN_SAMPLE_FLAGS_PRESENT
            | TRUN_SAMPLE_COMPOSITION_TIME_OFFSETS_PRESENT;
        let trun = wrap(
            BoxType::TRUN,
            TrunBox {
                flags,
                data_offset: Some(0), // patched by build() once the moof layout is known
                first_sample_flags: None,
                samples: t
                    .samples
                    .iter()
                    .map(|s| TrunSampleEntry {
                        duration: Some(s.duration),
                        size: Some(s.size),
                        flags: Some(sample_flags(s.is_keyframe)),
                        composition_time_offset: Some(s.composition_time_offset),
                    })
                    .collect(),
            }
            .encode(),
        );

        let mut body = BytesMut::new();
        body.put_slice(&tfhd);
        body.put_slice(&tfdt);
        body.put_slice(&trun);
        wrap(BoxType::TRAF, body)
    }
}

/// Fixed length of a `traf` whose `tfhd` carries only the base flags (no
/// optional fields) and whose `tfdt` is version 1: box(8)+tfhd(16)+tfdt(20).
fn traf_header_len() -> usize {
    8 + 16 + 20 + 8 /* trun box header */ + 4 /* trun version/flags */ + 4 /* sample_count */
        + 4 /* data_offset */
}

/// Bytes per sample in a `trun` entry with duration+size+flags+cts present.
fn trun_sample_len() -> usize {
    16
}

#[cfg(test)]
mod tests {
    use super::*;

    fn samples() -> Vec<FragmentSample> {
        vec![
            FragmentSample {
                size: 1000,
                duration: 3000,
                is_keyframe: true,
                composition_time_offset: 0,
            },
            FragmentSample {
                size: 500,
                duration: 3000,
                is_keyframe: false,
                composition_time_offset: 3000,
            },
        ]
    }

    #[test]
    fn single_track_moof_ends_with_mdat_header() {
        let s = samples();
        let frag = TrackFragment {
            track_id: 1,
            base_media_decode_time: 0,
            samples: &s,
        };
        let data = MoofBuilder::new(1).build(&[frag]);
        assert_eq!(&data[4..8], b"moof");
        assert_eq!(&data[data.len() - 4..], b"mdat");
    }

    #[test]
    fn multi_track_data_offsets_are_sequential() {
        let video = samples();
        let audio = vec![FragmentSample {
            size: 200,
            duration: 1024,
            is_keyframe: true,
            composition_time_offset: 0,
        }];
        let data = MoofBuilder::new(7).build(&[
            TrackFragment {
                track_id: 1,
                base_media_decode_time: 0,
                samples: &video,
            },
            TrackFragment {
                track_id: 2,
                base_media_decode_time: 0,
                samples: &audio,
            },
        ]);
        // moof size + 8-byte mdat header is where the video data starts.
        let moof_size = u32::from_be_bytes(data[0..4].try_into().unwrap()) as usize;
        let video_data_offset = i32::from_be_bytes(
            data[find_trun_data_offset(&data, 0)..find_trun_data_offset(&data, 0) + 4]
                .try_into()
                .unwrap(),
        );
        assert_eq!(video_data_offset as usize, moof_size + 8);
    }

    fn find_trun_data_offset(data: &[u8], occurrence: usize) -> usize {
        let mut seen = 0;
        let mut i = 0;
        while i + 4 <= data.len() {
            if &data[i..i + 4] == b"trun" {
                if seen == occurrence {
                    return i + 4 + 4 + 4; // past type, version/flags, sample_count
                }
                seen += 1;
            }
            i += 1;
        }
        panic!("trun not found");
    }
}
