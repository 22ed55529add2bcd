//! Maps a track's `stsd` entry onto the RTP payload kind it needs (§4.5,
//! §4.6): which fragment maker to call and how to read NAL length prefixes.

use boxfile_media::mp4::body::{CodecConfig, StsdBox, StsdEntry};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PayloadKind {
    Avc { length_size: u8 },
    Hevc { length_size: u8 },
    Aac,
}

impl PayloadKind {
    pub fn is_hevc(&self) -> bool {
        matches!(self, PayloadKind::Hevc { .. })
    }

    pub fn is_video(&self) -> bool {
        matches!(self, PayloadKind::Avc { .. } | PayloadKind::Hevc { .. })
    }
}

/// Inspects a track's sample description and returns the payload kind this
/// crate knows how to packetize, or `None` for anything else (text, hint,
/// unrecognized visual/audio codecs).
pub fn detect_payload_kind(stsd: &StsdBox) -> Option<PayloadKind> {
    for entry in &stsd.entries {
        match entry {
            StsdEntry::Visual(v) => match &v.config {
                CodecConfig::Avc(avcc) => {
                    return Some(PayloadKind::Avc {
                        length_size: avcc.length_size_minus_one + 1,
                    })
                }
                CodecConfig::Hvc(hvcc) => {
                    return Some(PayloadKind::Hevc {
                        length_size: hvcc.length_size_minus_one + 1,
                    })
                }
                _ => {}
            },
            StsdEntry::Audio(a) => {
                if matches!(a.config, CodecConfig::Esds(_)) {
                    return Some(PayloadKind::Aac);
                }
            }
            StsdEntry::Opaque(_) => {}
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use boxfile_media::mp4::body::{
        AudioSampleEntry, AvcCBox, EsdsBox, SampleEntryCommon, VisualSampleEntry,
    };
    use boxfile_media::mp4::BoxType;

    fn common(format: BoxType) -> SampleEntryCommon {
        SampleEntryCommon {
            format,
            data_reference_index: 1,
        }
    }

    #[test]
    fn detects_avc() {
        let stsd = StsdBox {
            entries: vec![StsdEntry::Visual(VisualSampleEntry {
                common: common(BoxType::AVC1),
                width: 0,
                height: 0,
                horizresolution: 0,
                vertresolution: 0,
                frame_count: 0,
                compressorname: [0; 32],
                depth: 0,
                config: CodecConfig::Avc(AvcCBox {
                    configuration_version: 1,
                    profile: 0x64,
                    compatibility: 0,
                    level: 0x1f,
                    length_size_minus_one: 3,
                    sps: vec![vec![0; 4]],
                    pps: vec![vec![0; 2]],
                    trailing: vec![],
                }),
                pasp: None,
            })],
        };
        assert_eq!(
            detect_payload_kind(&stsd),
            Some(PayloadKind::Avc { length_size: 4 })
        );
    }

    #[test]
    fn detects_aac() {
        let stsd = StsdBox {
            entries: vec![StsdEntry::Audio(AudioSampleEntry {
                common: common(BoxType::MP4A),
                channel_count: 2,
                sample_size: 16,
                sample_rate: 44_100 << 16,
                config: CodecConfig::Esds(EsdsBox {
                    es_id: 1,
                    stream_priority: 0,
                    object_type_id: 0x40,
                    stream_type: 0x15,
                    buffer_size_db: 0,
                    max_bitrate: 0,
                    avg_bitrate: 0,
                    decoder_specific: vec![0x12, 0x10],
                }),
            })],
        };
        assert_eq!(detect_payload_kind(&stsd), Some(PayloadKind::Aac));
    }

    #[test]
    fn opaque_entry_has_no_payload_kind() {
        let stsd = StsdBox::default();
        assert_eq!(detect_payload_kind(&stsd), None);
    }
}
