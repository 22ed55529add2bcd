//! FLV video tag parsing for the one codec this sink accepts: AVC (§4.7).
//! `VideoData::parse` splits a video message into either the sequence
//! header (an `AVCDecoderConfigurationRecord`) or a run of length-prefixed
//! NAL units, the framing `boxfile-media`'s `AvcCBox`/sample reader expect.

use crate::error::{Error, Result};

const CODEC_ID_AVC: u8 = 7;
const PACKET_TYPE_SEQUENCE_HEADER: u8 = 0;
const PACKET_TYPE_NALU: u8 = 1;

/// `AVCDecoderConfigurationRecord` (ISO/IEC 14496-15 §5.2.4.1), parsed out
/// of the first video message a publisher sends.
#[derive(Debug, Clone)]
pub struct AvcDecoderConfigurationRecord {
    pub configuration_version: u8,
    pub profile_indication: u8,
    pub profile_compatibility: u8,
    pub level_indication: u8,
    pub length_size: u8,
    pub sps: Vec<Vec<u8>>,
    pub pps: Vec<Vec<u8>>,
}

impl AvcDecoderConfigurationRecord {
    pub fn parse(data: &[u8]) -> Result<Self> {
        if data.len() < 6 {
            return Err(Error::protocol("AVCDecoderConfigurationRecord too short"));
        }
        let configuration_version = data[0];
        let profile_indication = data[1];
        let profile_compatibility = data[2];
        let level_indication = data[3];
        let length_size = (data[4] & 0x03) + 1;
        let num_sps = data[5] & 0x1f;

        let mut pos = 6;
        let mut sps = Vec::with_capacity(num_sps as usize);
        for _ in 0..num_sps {
            let (unit, next) = read_length_prefixed(data, pos, 2)?;
            sps.push(unit);
            pos = next;
        }
        if pos >= data.len() {
            return Err(Error::protocol("AVCDecoderConfigurationRecord missing PPS count"));
        }
        let num_pps = data[pos];
        pos += 1;
        let mut pps = Vec::with_capacity(num_pps as usize);
        for _ in 0..num_pps {
            let (unit, next) = read_length_prefixed(data, pos, 2)?;
            pps.push(unit);
            pos = next;
        }

        Ok(Self {
            configuration_version,
            profile_indication,
            profile_compatibility,
            level_indication,
            length_size,
            sps,
            pps,
        })
    }
}

fn read_length_prefixed(data: &[u8], pos: usize, size_bytes: usize) -> Result<(Vec<u8>, usize)> {
    if data.len() < pos + size_bytes {
        return Err(Error::protocol("length-prefixed field truncated"));
    }
    let size = match size_bytes {
        2 => u16::from_be_bytes(data[pos..pos + 2].try_into().unwrap()) as usize,
        _ => unreachable!("only 2-byte length prefixes are used by this record"),
    };
    let start = pos + size_bytes;
    if data.len() < start + size {
        return Err(Error::protocol("length-prefixed field truncated"));
    }
    Ok((data[start..start + size].to_vec(), start + size))
}

/// One decoded FLV video tag: either a sequence header or a composition
/// time plus the NAL units it carries.
pub enum VideoTag {
    SequenceHeader(AvcDecoderConfigurationRecord),
    Nalus { composition_time: i32, nalus: Vec<Vec<u8>> },
}

/// Parses one FLV `VIDEODATA` payload. `length_size` is the NAL
/// length-prefix width the sequence header most recently reported; pass
/// `None` before the sequence header has arrived (only valid for a
/// sequence-header message itself).
pub fn parse_video_tag(data: &[u8], length_size: Option<u8>) -> Result<VideoTag> {
    if data.len() < 5 {
        return Err(Error::protocol("FLV video tag too short"));
    }
    let codec_id = data[0] & 0x0f;
    if codec_id != CODEC_ID_AVC {
        return Err(Error::protocol(format!("unsupported video codec id {codec_id}")));
    }
    let packet_type = data[1];
    let composition_time = i32::from_be_bytes([0, data[2], data[3], data[4]]) << 8 >> 8;

    match packet_type {
        PACKET_TYPE_SEQUENCE_HEADER => {
            Ok(VideoTag::SequenceHeader(AvcDecoderConfigurationRecord::parse(&data[5..])?))
        }
        PACKET_TYPE_NALU => {
            let length_size = length_size
                .ok_or_else(|| Error::protocol("NAL unit before AVC sequence header"))?
                as usize;
            let mut nalus = Vec::new();
            let mut pos = 5;
            while pos + length_size <= data.len() {
                let size = read_length(&data[pos..pos + length_size]);
                pos += length_size;
                if pos + size > data.len() {
                    return Err(Error::protocol("NAL unit size exceeds message"));
                }
                nalus.push(data[pos..pos + size].to_vec());
                pos += size;
            }
            Ok(VideoTag::Nalus { composition_time, nalus })
        }
        other => Err(Error::protocol(format!("unsupported AVC packet type {other}"))),
    }
}

fn read_length(bytes: &[u8]) -> usize {
    bytes.iter().fold(0usize, |acc, b| (acc << 8) | *b as usize)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_record() -> Vec<u8> {
        let mut data = vec![1, 0x64, 0x00, 0x1f, 0xff, 0xe1];
        data.extend_from_slice(&3u16.to_be_bytes());
        data.extend_from_slice(&[0xaa, 0xbb, 0xcc]);
        data.push(1);
        data.extend_from_slice(&2u16.to_be_bytes());
        data.extend_from_slice(&[0xdd, 0xee]);
        data
    }

    #[test]
    fn parses_decoder_configuration_record() {
        let record = AvcDecoderConfigurationRecord::parse(&sample_record()).unwrap();
        assert_eq!(record.profile_indication, 0x64);
        assert_eq!(record.length_size, 4);
        assert_eq!(record.sps, vec![vec![0xaa, 0xbb, 0xcc]]);
        assert_eq!(record.pps, vec![vec![0xdd, 0xee]]);
    }

    #[test]
    fn parses_sequence_header_tag() {
        let mut tag = vec![0x17, 0, 0, 0, 0];
        tag.extend_from_slice(&sample_record());
        match parse_video_tag(&tag, None).unwrap() {
            VideoTag::SequenceHeader(record) => assert_eq!(record.sps.len(), 1),
            _ => panic!("expected sequence header"),
        }
    }

    #[test]
    fn parses_nalu_tag_with_four_byte_length_prefix() {
        let mut tag = vec![0x17, 1, 0, 0, 0];
        tag.extend_from_slice(&4u32.to_be_bytes());
        tag.extend_from_slice(&[1, 2, 3, 4]);
        match parse_video_tag(&tag, Some(4)).unwrap() {
            VideoTag::Nalus { nalus, .. } => {
                assert_eq!(nalus, vec![vec![1, 2, 3, 4]]);
            }
            _ => panic!("expected NAL units"),
        }
    }

    #[test]
    fn rejects_nalu_before_sequence_header() {
        let mut tag = vec![0x17, 1, 0, 0, 0];
        tag.extend_from_slice(&[0, 0, 0, 1, 9]);
        assert!(parse_video_tag(&tag, None).is_err());
    }
}
