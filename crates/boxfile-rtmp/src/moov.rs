//! Synthesizes a complete (non-fragmented) `moov` plus its `mdat` for the
//! file an ingest session closes out (§4.7). One `trak` per handler type
//! present; samples are laid out contiguously per track, so each track
//! needs only a single `stco`/`stsc` chunk entry.

use bytes::{BufMut, BytesMut};

use boxfile_media::mp4::body::{
    self, AudioSampleEntry, AvcCBox, CodecConfig, DrefBox, DrefEntry, EsdsBox, FtypBox, HdlrBox,
    MdhdBox, MvhdBox, SampleEntryCommon, SmhdBox, StsdBox, StsdEntry, StscBox, StscEntry, StszBox,
    SttsBox, SttsEntry, TkhdBox, VisualSampleEntry, VmhdBox,
};
use boxfile_media::mp4::BoxType;

/// The RTMP millisecond clock doubles as every track's `mdhd`/`mvhd`
/// timescale, so no timestamp rescaling is needed when laying out `stts`.
pub const TIMESCALE: u32 = 1000;

pub struct SampleTrack {
    pub track_id: u32,
    pub duration: u64,
    pub kind: TrackKind,
    /// `(decode_time_ms, size)` for each sample, in emission order.
    pub samples: Vec<(u32, u32)>,
}

pub enum TrackKind {
    Video { width: u16, height: u16, avcc: AvcCBox },
    Audio { channels: u16, sample_rate: u32, esds: EsdsBox },
}

impl SampleTrack {
    fn handler(&self) -> ([u8; 4], &'static str) {
        match self.kind {
            TrackKind::Video { .. } => (*b"vide", "VideoHandler"),
            TrackKind::Audio { .. } => (*b"soun", "SoundHandler"),
        }
    }
}

fn wrap(box_type: BoxType, body: BytesMut) -> BytesMut {
    let mut out = BytesMut::with_capacity(8 + body.len());
    out.put_u32((8 + body.len()) as u32);
    out.put_slice(&box_type.0);
    out.put_slice(&body);
    out
}

/// Builds the finished MP4 byte stream: `ftyp`, `moov`, then one `mdat`
/// holding every track's sample bytes back to back in the order the
/// tracks are given.
pub fn build(tracks: &[SampleTrack], sample_data: &[&[u8]]) -> Vec<u8> {
    let mut chunk_offsets = Vec::with_capacity(tracks.len());
    let mdat_header_len = 8u64;
    let mut offset = mdat_header_len;
    for data in sample_data {
        chunk_offsets.push(offset);
        offset += data.len() as u64;
    }

    let mut out = BytesMut::new();
    out.put_slice(&write_ftyp());
    out.put_slice(&write_moov(tracks, &chunk_offsets));
    out.put_slice(&write_mdat(sample_data));
    out.to_vec()
}

fn write_ftyp() -> BytesMut {
    wrap(
        BoxType::FTYP,
        FtypBox {
            major_brand: *b"isom",
            minor_version: 0x200,
            compatible_brands: vec![*b"isom", *b"iso2", *b"mp41"],
        }
        .encode(),
    )
}

fn write_mdat(sample_data: &[&[u8]]) -> BytesMut {
    let mut body = BytesMut::new();
    for data in sample_data {
        body.put_slice(data);
    }
    wrap(BoxType::MDAT, body)
}

fn write_moov(tracks: &[SampleTrack], chunk_offsets: &[u64]) -> BytesMut {
    let movie_duration = tracks.iter().map(|t| t.duration).max().unwrap_or(0);
    let next_track_id = tracks.iter().map(|t| t.track_id).max().unwrap_or(0) + 1;

    let mvhd = wrap(
        BoxType::MVHD,
        MvhdBox {
            version: 1,
            creation_time: 0,
            modification_time: 0,
            timescale: TIMESCALE,
            duration: movie_duration,
            rate: 0x0001_0000,
            volume: 0x0100,
            matrix: MvhdBox::UNITY_MATRIX,
            next_track_id,
        }
        .encode(),
    );

    let mut body = BytesMut::new();
    body.put_slice(&mvhd);
    for (track, &chunk_offset) in tracks.iter().zip(chunk_offsets) {
        body.put_slice(&write_trak(track, chunk_offset));
    }
    wrap(BoxType::MOOV, body)
}

fn write_trak(track: &SampleTrack, chunk_offset: u64) -> BytesMut {
    let (width, height) = match &track.kind {
        TrackKind::Video { width, height, .. } => (*width, *height),
        _ => (0, 0),
    };
    let tkhd = wrap(
        BoxType::TKHD,
        TkhdBox {
            version: 1,
            flags: 0x0000_07,
            creation_time: 0,
            modification_time: 0,
            track_id: track.track_id,
            duration: track.duration,
            layer: 0,
            alternate_group: 0,
            volume: if matches!(track.kind, TrackKind::Audio { .. }) { 0x0100 } else { 0 },
            matrix: MvhdBox::UNITY_MATRIX,
            width: (width as u32) << 16,
            height: (height as u32) << 16,
        }
        .encode(),
    );

    let mut body = BytesMut::new();
    body.put_slice(&tkhd);
    body.put_slice(&write_mdia(track, chunk_offset));
    wrap(BoxType::TRAK, body)
}

fn write_mdia(track: &SampleTrack, chunk_offset: u64) -> BytesMut {
    let mdhd = wrap(
        BoxType::MDHD,
        MdhdBox {
            version: 1,
            creation_time: 0,
            modification_time: 0,
            timescale: TIMESCALE,
            duration: track.duration,
            language: body::pack_language("und"),
        }
        .encode(),
    );
    let (handler_type, name) = track.handler();
    let hdlr = wrap(
        BoxType::HDLR,
        HdlrBox {
            handler_type,
            name: name.to_string(),
        }
        .encode(),
    );

    let mut b = BytesMut::new();
    b.put_slice(&mdhd);
    b.put_slice(&hdlr);
    b.put_slice(&write_minf(track, chunk_offset));
    wrap(BoxType::MDIA, b)
}

fn write_minf(track: &SampleTrack, chunk_offset: u64) -> BytesMut {
    let media_header = match &track.kind {
        TrackKind::Video { .. } => wrap(
            BoxType::VMHD,
            VmhdBox { graphicsmode: 0, opcolor: [0, 0, 0] }.encode(),
        ),
        TrackKind::Audio { .. } => wrap(BoxType::SMHD, SmhdBox { balance: 0 }.encode()),
    };

    let dinf = wrap(BoxType::DINF, {
        let mut b = BytesMut::new();
        b.put_slice(&wrap(
            BoxType::DREF,
            DrefBox { entries: vec![DrefEntry::self_contained()] }.encode(),
        ));
        b
    });

    let mut b = BytesMut::new();
    b.put_slice(&media_header);
    b.put_slice(&dinf);
    b.put_slice(&write_stbl(track, chunk_offset));
    wrap(BoxType::MINF, b)
}

fn write_stbl(track: &SampleTrack, chunk_offset: u64) -> BytesMut {
    let entry = match &track.kind {
        TrackKind::Video { width, height, avcc } => StsdEntry::Visual(VisualSampleEntry {
            common: SampleEntryCommon { format: BoxType::AVC1, data_reference_index: 1 },
            width: *width,
            height: *height,
            horizresolution: 0x0048_0000,
            vertresolution: 0x0048_0000,
            frame_count: 1,
            compressorname: [0u8; 32],
            depth: 0x0018,
            config: CodecConfig::Avc(avcc.clone()),
            pasp: None,
        }),
        TrackKind::Audio { channels, sample_rate, esds } => StsdEntry::Audio(AudioSampleEntry {
            common: SampleEntryCommon { format: BoxType::MP4A, data_reference_index: 1 },
            channel_count: *channels,
            sample_size: 16,
            sample_rate: sample_rate << 16,
            config: CodecConfig::Esds(esds.clone()),
        }),
    };
    let stsd = wrap(BoxType::STSD, StsdBox { entries: vec![entry] }.encode());
    let stts = wrap(BoxType::STTS, build_stts(track).encode());
    let stsc = wrap(
        BoxType::STSC,
        StscBox {
            entries: vec![StscEntry {
                first_chunk: 1,
                samples_per_chunk: track.samples.len() as u32,
                sample_description_index: 1,
            }],
        }
        .encode(),
    );
    let stsz = wrap(
        BoxType::STSZ,
        StszBox {
            sample_size: 0,
            sample_count: track.samples.len() as u32,
            sizes: track.samples.iter().map(|(_, size)| *size).collect(),
        }
        .encode(),
    );
    let stco = wrap(BoxType::STCO, {
        let mut b = BytesMut::new();
        body::write_full_header(&mut b, 0, 0);
        b.put_u32(1);
        b.put_u32(chunk_offset as u32);
        b
    });

    let mut b = BytesMut::new();
    b.put_slice(&stsd);
    b.put_slice(&stts);
    b.put_slice(&stsc);
    b.put_slice(&stsz);
    b.put_slice(&stco);
    wrap(BoxType::STBL, b)
}

/// Collapses consecutive equal inter-sample deltas into `SttsEntry` runs,
/// the convention every other box builder in this workspace follows.
fn build_stts(track: &SampleTrack) -> SttsBox {
    let mut entries: Vec<SttsEntry> = Vec::new();
    let times: Vec<u32> = track.samples.iter().map(|(t, _)| *t).collect();
    for i in 0..times.len() {
        let delta = if i + 1 < times.len() {
            times[i + 1].saturating_sub(times[i]).max(1)
        } else if i > 0 {
            times[i].saturating_sub(times[i - 1]).max(1)
        } else {
            1
        };
        match entries.last_mut() {
            Some(last) if last.sample_delta == delta => last.sample_count += 1,
            _ => entries.push(SttsEntry { sample_count: 1, sample_delta: delta }),
        }
    }
    SttsBox { entries }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn avcc() -> AvcCBox {
        AvcCBox {
            configuration_version: 1,
            profile: 0x64,
            compatibility: 0,
            level: 0x1f,
            length_size_minus_one: 3,
            sps: vec![vec![1, 2, 3]],
            pps: vec![vec![4, 5]],
            trailing: vec![],
        }
    }

    #[test]
    fn stts_collapses_uniform_deltas() {
        let track = SampleTrack {
            track_id: 1,
            duration: 99,
            kind: TrackKind::Video { width: 640, height: 360, avcc: avcc() },
            samples: vec![(0, 10), (33, 10), (66, 10)],
        };
        let stts = build_stts(&track);
        assert_eq!(stts.entries.len(), 1);
        assert_eq!(stts.entries[0].sample_count, 3);
        assert_eq!(stts.entries[0].sample_delta, 33);
    }

    #[test]
    fn build_produces_ftyp_moov_mdat_in_order() {
        let track = SampleTrack {
            track_id: 1,
            duration: 66,
            kind: TrackKind::Video { width: 640, height: 360, avcc: avcc() },
            samples: vec![(0, 3), (33, 3)],
        };
        let data: &[u8] = &[1, 2, 3, 4, 5, 6];
        let bytes = build(&[track], &[data]);
        assert_eq!(&bytes[4..8], b"ftyp");
        let moov_pos = 4 + u32::from_be_bytes(bytes[0..4].try_into().unwrap()) as usize;
        assert_eq!(&bytes[moov_pos..moov_pos + 4], b"moov");
    }
}
