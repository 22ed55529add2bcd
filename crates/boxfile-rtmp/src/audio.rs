//! FLV audio tag parsing for the one codec this sink accepts: AAC (§4.7).
//! Mirrors `video.rs`'s split between a sequence header (the AAC
//! `AudioSpecificConfig`, carried straight into `esds.decoder_specific`)
//! and raw frame payloads.

use crate::error::{Error, Result};

const SOUND_FORMAT_AAC: u8 = 10;
const PACKET_TYPE_SEQUENCE_HEADER: u8 = 0;
const PACKET_TYPE_RAW: u8 = 1;

pub enum AudioTag {
    SequenceHeader(Vec<u8>),
    Raw(Vec<u8>),
}

/// Parses one FLV `AUDIODATA` payload.
pub fn parse_audio_tag(data: &[u8]) -> Result<AudioTag> {
    if data.len() < 2 {
        return Err(Error::protocol("FLV audio tag too short"));
    }
    let sound_format = data[0] >> 4;
    if sound_format != SOUND_FORMAT_AAC {
        return Err(Error::protocol(format!("unsupported audio codec id {sound_format}")));
    }
    match data[1] {
        PACKET_TYPE_SEQUENCE_HEADER => Ok(AudioTag::SequenceHeader(data[2..].to_vec())),
        PACKET_TYPE_RAW => Ok(AudioTag::Raw(data[2..].to_vec())),
        other => Err(Error::protocol(format!("unsupported AAC packet type {other}"))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_sequence_header() {
        let tag = vec![0xaf, 0, 0x12, 0x10];
        match parse_audio_tag(&tag).unwrap() {
            AudioTag::SequenceHeader(config) => assert_eq!(config, vec![0x12, 0x10]),
            _ => panic!("expected sequence header"),
        }
    }

    #[test]
    fn parses_raw_frame() {
        let tag = vec![0xaf, 1, 1, 2, 3];
        match parse_audio_tag(&tag).unwrap() {
            AudioTag::Raw(frame) => assert_eq!(frame, vec![1, 2, 3]),
            _ => panic!("expected raw frame"),
        }
    }

    #[test]
    fn rejects_non_aac_format() {
        let tag = vec![0x2f, 0, 0];
        assert!(parse_audio_tag(&tag).is_err());
    }
}
