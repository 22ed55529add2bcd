//! Interleaved RTP framing (rfc7826 §14) and the 12-byte RTP header
//! (rfc3550 §5.1).

use bytes::{BufMut, Bytes, BytesMut};

/// Video RTP payload type (H.264/H.265, dynamic range per the session's SDP).
pub const PAYLOAD_TYPE_VIDEO: u8 = 96;
/// Audio RTP payload type (AAC).
pub const PAYLOAD_TYPE_AUDIO: u8 = 97;
/// RTP clock rate used for H.264/H.265 video.
pub const VIDEO_CLOCK_RATE: u32 = 90_000;

const RTP_VERSION_BYTE: u8 = 0x80; // V=2, P=0, X=0, CC=0
const INTERLEAVED_MAGIC: u8 = 0x24;

/// Per-stream RTP header state: payload type, interleaved channel,
/// synchronization source, and the monotonic sequence counter.
#[derive(Debug, Clone)]
pub struct RtpHeader {
    payload_type: u8,
    channel: u8,
    ssrc: u32,
    sequence: u16,
}

impl RtpHeader {
    /// Builds a header for `payload_type` on interleaved `channel`, with a
    /// random synchronization source fixed for the life of the stream.
    pub fn new(payload_type: u8, channel: u8) -> Self {
        Self::with_ssrc(payload_type, channel, rand::random())
    }

    /// Builds a header with an explicit SSRC, for tests and for sessions
    /// that must echo a caller-chosen value.
    pub fn with_ssrc(payload_type: u8, channel: u8, ssrc: u32) -> Self {
        Self {
            payload_type,
            channel,
            ssrc,
            sequence: 0,
        }
    }

    pub fn channel(&self) -> u8 {
        self.channel
    }

    pub fn ssrc(&self) -> u32 {
        self.ssrc
    }

    pub fn sequence(&self) -> u16 {
        self.sequence
    }

    /// Builds one interleaved frame — `0x24 <channel> <len:16>` followed by
    /// the 12-byte RTP header and `payload` — and advances the sequence
    /// number modulo 2¹⁶. `len` covers the RTP header plus payload, per
    /// rfc7826 §14.
    pub fn frame(&mut self, marker: bool, timestamp: u32, payload: &[u8]) -> Bytes {
        let rtp_len = 12 + payload.len();
        let mut buf = BytesMut::with_capacity(4 + rtp_len);

        buf.put_u8(INTERLEAVED_MAGIC);
        buf.put_u8(self.channel);
        buf.put_u16(rtp_len as u16);

        buf.put_u8(RTP_VERSION_BYTE);
        let marker_pt = (u8::from(marker) << 7) | self.payload_type;
        buf.put_u8(marker_pt);
        buf.put_u16(self.sequence);
        buf.put_u32(timestamp);
        buf.put_u32(self.ssrc);

        buf.put_slice(payload);

        self.sequence = self.sequence.wrapping_add(1);
        buf.freeze()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frame_has_interleaved_prefix_and_rtp_v2() {
        let mut header = RtpHeader::with_ssrc(PAYLOAD_TYPE_VIDEO, 0, 0x1234_5678);
        let frame = header.frame(true, 1000, &[1, 2, 3]);

        assert_eq!(frame[0], 0x24);
        assert_eq!(frame[1], 0x00);
        let len = u16::from_be_bytes([frame[2], frame[3]]);
        assert_eq!(len as usize, 12 + 3);
        assert_eq!(frame[4], 0x80);
        assert_eq!(frame[5], 0x80 | PAYLOAD_TYPE_VIDEO);
        assert_eq!(u16::from_be_bytes([frame[6], frame[7]]), 0);
        assert_eq!(
            u32::from_be_bytes([frame[8], frame[9], frame[10], frame[11]]),
            1000
        );
        assert_eq!(
            u32::from_be_bytes([frame[12], frame[13], frame[14], frame[15]]),
            0x1234_5678
        );
        assert_eq!(&frame[16..], &[1, 2, 3]);
    }

    #[test]
    fn sequence_is_monotonic_and_wraps_mod_2_16() {
        let mut header = RtpHeader::with_ssrc(PAYLOAD_TYPE_VIDEO, 0, 0);
        header.sequence = 0xffff;
        let first = header.frame(false, 0, &[]);
        let second = header.frame(false, 0, &[]);
        assert_eq!(u16::from_be_bytes([first[6], first[7]]), 0xffff);
        assert_eq!(u16::from_be_bytes([second[6], second[7]]), 0);
    }

    #[test]
    fn marker_bit_is_set_only_when_requested() {
        let mut header = RtpHeader::with_ssrc(PAYLOAD_TYPE_AUDIO, 1, 0);
        let unmarked = header.frame(false, 0, &[]);
        let marked = header.frame(true, 0, &[]);
        assert_eq!(unmarked[5], PAYLOAD_TYPE_AUDIO);
        assert_eq!(marked[5], 0x80 | PAYLOAD_TYPE_AUDIO);
    }
}
