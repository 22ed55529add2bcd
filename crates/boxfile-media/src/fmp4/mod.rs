//! Fragmented MP4 (fMP4) serialization: the initialization segment (`ftyp` +
//! `moov` with empty sample tables and `mvex`) and the per-fragment
//! `moof`/`mdat` writer.

mod moof;

pub use moof::{FragmentSample, MoofBuilder, TrackFragment};

use bytes::{BufMut, BytesMut};

use crate::mp4::body::{
    self, AudioSampleEntry, AvcCBox, CodecConfig, DrefBox, DrefEntry, EsdsBox, FtypBox, HdlrBox,
    HvcCBox, MdhdBox, MvhdBox, OpaqueSampleEntry, SampleEntryCommon, SmhdBox, StsdBox, StsdEntry,
    StscBox, StszBox, SttsBox, TkhdBox, TrexBox, VisualSampleEntry, VmhdBox,
};
use crate::mp4::BoxType;

/// A fully serialized initialization segment: `ftyp` + `moov`.
#[derive(Debug, Clone)]
pub struct InitSegment {
    pub data: Vec<u8>,
}

fn wrap(box_type: BoxType, body: BytesMut) -> BytesMut {
    let mut out = BytesMut::with_capacity(8 + body.len());
    out.put_u32((8 + body.len()) as u32);
    out.put_slice(&box_type.0);
    out.put_slice(&body);
    out
}

/// The codec configuration a video track carries into its `stsd` entry.
pub enum VisualCodec {
    Avc(AvcCBox),
    Hvc(HvcCBox),
}

pub enum TrackKind {
    Video {
        width: u32,
        height: u32,
        codec: VisualCodec,
    },
    Audio {
        channels: u16,
        sample_rate: u32,
        esds: EsdsBox,
    },
    /// Timed text (e.g. burned-in or WebVTT-derived `tx3g` cues).
    Text,
}

pub struct TrackSpec {
    pub track_id: u32,
    pub timescale: u32,
    /// Duration in this track's own timescale.
    pub duration: u64,
    pub kind: TrackKind,
}

impl TrackSpec {
    fn handler(&self) -> ([u8; 4], &'static str) {
        match self.kind {
            TrackKind::Video { .. } => (*b"vide", "VideoHandler"),
            TrackKind::Audio { .. } => (*b"soun", "SoundHandler"),
            TrackKind::Text => (*b"text", "TextHandler"),
        }
    }
}

/// A minimal but valid `tx3g` sample entry body (reserved + dref index +
/// the fixed text-styling fields muxers commonly emit), no `ftab`.
fn tx3g_body() -> Vec<u8> {
    let mut b = BytesMut::new();
    b.put_u32(0); // reserved[6] lo
    b.put_u16(0); // reserved[6] hi
    b.put_u16(1); // data_reference_index
    b.put_u32(0); // displayFlags
    b.put_u8(0); // horizontal-justification
    b.put_u8(0); // vertical-justification
    b.put_slice(&[0, 0, 0, 0]); // background-color-rgba
    b.put_i16(0); // box.top
    b.put_i16(0); // box.left
    b.put_i16(0); // box.bottom
    b.put_i16(0); // box.right
    b.put_u16(0); // style-record.startChar
    b.put_u16(0); // style-record.endChar
    b.put_u16(1); // style-record.font-ID
    b.put_u8(0); // style-record.face-style-flags
    b.put_u8(18); // style-record.font-size
    b.put_slice(&[255, 255, 255, 255]); // style-record.text-color-rgba
    b.to_vec()
}

/// Builds an init segment from an arbitrary number of tracks: one video
/// pacemaker plus any number of slaved audio/text tracks.
pub struct InitSegmentBuilder {
    movie_timescale: u32,
    tracks: Vec<TrackSpec>,
}

impl InitSegmentBuilder {
    pub fn new(movie_timescale: u32) -> Self {
        Self {
            movie_timescale,
            tracks: Vec::new(),
        }
    }

    pub fn track(mut self, spec: TrackSpec) -> Self {
        self.tracks.push(spec);
        self
    }

    pub fn build(self) -> InitSegment {
        let mut buf = BytesMut::with_capacity(1024);
        buf.put_slice(&self.write_ftyp());
        buf.put_slice(&self.write_moov());
        InitSegment { data: buf.to_vec() }
    }

    fn write_ftyp(&self) -> BytesMut {
        wrap(
            BoxType::FTYP,
            FtypBox {
                major_brand: *b"isom",
                minor_version: 0x200,
                compatible_brands: vec![*b"isom", *b"iso5", *b"dash", *b"mp42"],
            }
            .encode(),
        )
    }

    fn write_moov(&self) -> BytesMut {
        let movie_duration = self
            .tracks
            .iter()
            .map(|t| {
                if t.timescale == 0 {
                    0
                } else {
                    (t.duration as f64 * self.movie_timescale as f64 / t.timescale as f64) as u64
                }
            })
            .max()
            .unwrap_or(0);
        let next_track_id = self.tracks.iter().map(|t| t.track_id).max().unwrap_or(0) + 1;

        let mvhd = wrap(
            BoxType::MVHD,
            MvhdBox {
                version: 1,
                creation_time: 0,
                modification_time: 0,
                timescale: self.movie_timescale,
                duration: movie_duration,
                rate: 0x00010000,
                volume: 0x0100,
                matrix: MvhdBox::UNITY_MATRIX,
                next_track_id,
            }
            .encode(),
        );

        let mut body = BytesMut::new();
        body.put_slice(&mvhd);
        for track in &self.tracks {
            body.put_slice(&self.write_trak(track));
        }
        body.put_slice(&self.write_mvex());

        wrap(BoxType::MOOV, body)
    }

    fn write_trak(&self, track: &TrackSpec) -> BytesMut {
        let (width, height) = match &track.kind {
            TrackKind::Video { width, height, .. } => (*width, *height),
            _ => (0, 0),
        };
        let tkhd = wrap(
            BoxType::TKHD,
            TkhdBox {
                version: 1,
                flags: 0x000007, // enabled | in_movie | in_preview
                creation_time: 0,
                modification_time: 0,
                track_id: track.track_id,
                duration: (track.duration as f64 * self.movie_timescale as f64
                    / track.timescale.max(1) as f64) as u64,
                layer: 0,
                alternate_group: 0,
                volume: if matches!(track.kind, TrackKind::Audio { .. }) {
                    0x0100
                } else {
                    0
                },
                matrix: MvhdBox::UNITY_MATRIX,
                width: width << 16,
                height: height << 16,
            }
            .encode(),
        );

        let mut body = BytesMut::new();
        body.put_slice(&tkhd);
        body.put_slice(&self.write_mdia(track));
        wrap(BoxType::TRAK, body)
    }

    fn write_mdia(&self, track: &TrackSpec) -> BytesMut {
        let mdhd = wrap(
            BoxType::MDHD,
            MdhdBox {
                version: 1,
                creation_time: 0,
                modification_time: 0,
                timescale: track.timescale,
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
        b.put_slice(&self.write_minf(track));
        wrap(BoxType::MDIA, b)
    }

    fn write_minf(&self, track: &TrackSpec) -> BytesMut {
        let media_header = match &track.kind {
            TrackKind::Video { .. } => wrap(
                BoxType::VMHD,
                VmhdBox {
                    graphicsmode: 0,
                    opcolor: [0, 0, 0],
                }
                .encode(),
            ),
            TrackKind::Audio { .. } => {
                wrap(BoxType::SMHD, SmhdBox { balance: 0 }.encode())
            }
            TrackKind::Text => wrap(BoxType::NMHD, {
                let mut b = BytesMut::new();
                body::write_full_header(&mut b, 0, 0);
                b
            }),
        };

        let dinf = wrap(BoxType::DINF, {
            let mut b = BytesMut::new();
            b.put_slice(&wrap(
                BoxType::DREF,
                DrefBox {
                    entries: vec![DrefEntry::self_contained()],
                }
                .encode(),
            ));
            b
        });

        let mut b = BytesMut::new();
        b.put_slice(&media_header);
        b.put_slice(&dinf);
        b.put_slice(&self.write_stbl(track));
        wrap(BoxType::MINF, b)
    }

    fn write_stbl(&self, track: &TrackSpec) -> BytesMut {
        let entry = match &track.kind {
            TrackKind::Video { width, height, codec } => {
                let (format, config) = match codec {
                    VisualCodec::Avc(avcc) => (BoxType::AVC1, CodecConfig::Avc(avcc.clone())),
                    VisualCodec::Hvc(hvcc) => (BoxType::HEV1, CodecConfig::Hvc(hvcc.clone())),
                };
                StsdEntry::Visual(VisualSampleEntry {
                    common: SampleEntryCommon {
                        format,
                        data_reference_index: 1,
                    },
                    width: *width as u16,
                    height: *height as u16,
                    horizresolution: 0x0048_0000,
                    vertresolution: 0x0048_0000,
                    frame_count: 1,
                    compressorname: [0u8; 32],
                    depth: 0x0018,
                    config,
                    pasp: None,
                })
            }
            TrackKind::Audio {
                channels,
                sample_rate,
                esds,
            } => StsdEntry::Audio(AudioSampleEntry {
                common: SampleEntryCommon {
                    format: BoxType::MP4A,
                    data_reference_index: 1,
                },
                channel_count: *channels,
                sample_size: 16,
                sample_rate: sample_rate << 16,
                config: CodecConfig::Esds(esds.clone()),
            }),
            TrackKind::Text => StsdEntry::Opaque(OpaqueSampleEntry {
                common: SampleEntryCommon {
                    format: BoxType::TX3G,
                    data_reference_index: 1,
                },
                raw: tx3g_body(),
            }),
        };

        let stsd = wrap(BoxType::STSD, StsdBox { entries: vec![entry] }.encode());
        let stts = wrap(BoxType::STTS, SttsBox::default().encode());
        let stsc = wrap(BoxType::STSC, StscBox::default().encode());
        let stsz = wrap(BoxType::STSZ, StszBox::default().encode());
        let stco = wrap(BoxType::STCO, {
            let mut b = BytesMut::new();
            body::write_full_header(&mut b, 0, 0);
            b.put_u32(0); // entry count
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

    fn write_mvex(&self) -> BytesMut {
        let mut b = BytesMut::new();
        for track in &self.tracks {
            b.put_slice(&wrap(
                BoxType::TREX,
                TrexBox {
                    track_id: track.track_id,
                    default_sample_description_index: 1,
                    default_sample_duration: 0,
                    default_sample_size: 0,
                    default_sample_flags: 0,
                }
                .encode(),
            ));
        }
        wrap(BoxType::MVEX, b)
    }
}
