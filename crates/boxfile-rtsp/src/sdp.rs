//! SDP (rfc4566) synthesis for the DESCRIBE response (§4.6).

use boxfile_media::mp4::body::{CodecConfig, StsdBox, StsdEntry};
use boxfile_rtp::{PAYLOAD_TYPE_AUDIO, PAYLOAD_TYPE_VIDEO, VIDEO_CLOCK_RATE};

/// One track's id and sample description, as needed to emit its `m=` block.
pub struct TrackDescription<'a> {
    pub track_id: u32,
    pub handler_type: [u8; 4],
    pub stsd: &'a StsdBox,
}

/// Builds the full SDP body for a DESCRIBE response: the session-level
/// lines followed by one media block per video/audio track.
pub fn build_sdp(client_ip: &str, tracks: &[TrackDescription<'_>]) -> String {
    let mut sdp = format!(
        "v=0\r\no=- 0 0 IN IP4 {client_ip}\r\ns=No Title\r\nc=IN IP4 0.0.0.0\r\nt=0 0\r\n"
    );
    for track in tracks {
        match &track.handler_type {
            b"vide" => sdp.push_str(&video_media(track.track_id, track.stsd)),
            b"soun" => sdp.push_str(&audio_media(track.track_id, track.stsd)),
            _ => {}
        }
    }
    sdp
}

fn video_media(track_id: u32, stsd: &StsdBox) -> String {
    for entry in &stsd.entries {
        let StsdEntry::Visual(v) = entry else {
            continue;
        };
        match &v.config {
            CodecConfig::Avc(avcc) => {
                let sprop = avcc.sprop_parameter_sets().unwrap_or_default();
                return format!(
                    "m=video 0 RTP/AVP {pt}\r\na=rtpmap:{pt} H264/{rate}\r\na=fmtp:{pt} packetization-mode=1; sprop-parameter-sets={sprop}; profile-level-id={plid}\r\na=control:{track_id}\r\n",
                    pt = PAYLOAD_TYPE_VIDEO,
                    rate = VIDEO_CLOCK_RATE,
                    plid = avcc.profile_level_id(),
                );
            }
            CodecConfig::Hvc(hvcc) => {
                let (vps, sps, pps) = hvcc.sprop_sets();
                let mut params = Vec::new();
                if let Some(v) = vps {
                    params.push(format!("sprop-vps={v}"));
                }
                if let Some(s) = sps {
                    params.push(format!("sprop-sps={s}"));
                }
                if let Some(p) = pps {
                    params.push(format!("sprop-pps={p}"));
                }
                return format!(
                    "m=video 0 RTP/AVP {pt}\r\na=rtpmap:{pt} H265/{rate}\r\na=fmtp:{pt} {params}\r\na=control:{track_id}\r\n",
                    pt = PAYLOAD_TYPE_VIDEO,
                    rate = VIDEO_CLOCK_RATE,
                    params = params.join("; "),
                );
            }
            _ => {}
        }
    }
    String::new()
}

fn audio_media(track_id: u32, stsd: &StsdBox) -> String {
    for entry in &stsd.entries {
        let StsdEntry::Audio(a) = entry else {
            continue;
        };
        if let CodecConfig::Esds(esds) = &a.config {
            let config_hex = hex::encode(&esds.decoder_specific);
            let sample_rate = a.sample_rate >> 16;
            return format!(
                "m=audio 0 RTP/AVP {pt}\r\na=rtpmap:{pt} MPEG4-GENERIC/{sample_rate}/{channels}\r\na=fmtp:{pt} streamtype=5; profile-level-id=1; mode=AAC-hbr; sizelength=13; indexlength=3; indexdeltalength=3; config={config_hex}\r\na=control:{track_id}\r\n",
                pt = PAYLOAD_TYPE_AUDIO,
                channels = a.channel_count,
            );
        }
    }
    String::new()
}

#[cfg(test)]
mod tests {
    use super::*;
    use boxfile_media::mp4::body::{AudioSampleEntry, AvcCBox, EsdsBox, SampleEntryCommon, VisualSampleEntry};
    use boxfile_media::mp4::BoxType;

    fn common(format: BoxType) -> SampleEntryCommon {
        SampleEntryCommon {
            format,
            data_reference_index: 1,
        }
    }

    #[test]
    fn avc_video_block_has_sprop_and_control() {
        let stsd = StsdBox {
            entries: vec![StsdEntry::Visual(VisualSampleEntry {
                common: common(BoxType::AVC1),
                width: 640,
                height: 360,
                horizresolution: 0,
                vertresolution: 0,
                frame_count: 1,
                compressorname: [0; 32],
                depth: 24,
                config: CodecConfig::Avc(AvcCBox {
                    configuration_version: 1,
                    profile: 0x64,
                    compatibility: 0,
                    level: 0x1f,
                    length_size_minus_one: 3,
                    sps: vec![vec![1, 2, 3]],
                    pps: vec![vec![4, 5]],
                    trailing: vec![],
                }),
                pasp: None,
            })],
        };
        let block = video_media(1, &stsd);
        assert!(block.starts_with("m=video 0 RTP/AVP 96\r\n"));
        assert!(block.contains("a=rtpmap:96 H264/90000"));
        assert!(block.contains("sprop-parameter-sets="));
        assert!(block.contains("profile-level-id=64001f"));
        assert!(block.contains("a=control:1"));
    }

    #[test]
    fn aac_audio_block_has_config_hex() {
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
        let block = audio_media(2, &stsd);
        assert!(block.starts_with("m=audio 0 RTP/AVP 97\r\n"));
        assert!(block.contains("MPEG4-GENERIC/44100/2"));
        assert!(block.contains("config=1210"));
        assert!(block.contains("a=control:2"));
    }

    #[test]
    fn session_header_names_client_ip() {
        let sdp = build_sdp("203.0.113.5", &[]);
        assert!(sdp.starts_with("v=0\r\n"));
        assert!(sdp.contains("o=- 0 0 IN IP4 203.0.113.5\r\n"));
    }
}
