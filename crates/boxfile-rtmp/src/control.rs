//! RTMP protocol control messages (§4.7): the handful sent once per
//! connection to open the peer's send window and chunk size.

use bytes::{BufMut, BytesMut};

use crate::chunk::encode_message;

const CONTROL_CHUNK_STREAM_ID: u32 = 2;
const CONTROL_MESSAGE_STREAM_ID: u32 = 0;

const TYPE_SET_CHUNK_SIZE: u8 = 1;
const TYPE_WINDOW_ACK_SIZE: u8 = 5;
const TYPE_SET_PEER_BANDWIDTH: u8 = 6;
const TYPE_USER_CONTROL: u8 = 4;

const LIMIT_TYPE_DYNAMIC: u8 = 2;
const EVENT_STREAM_BEGIN: u16 = 0;

fn control_message(type_id: u8, payload: &[u8], chunk_size: usize) -> bytes::Bytes {
    encode_message(CONTROL_CHUNK_STREAM_ID, CONTROL_MESSAGE_STREAM_ID, type_id, 0, payload, chunk_size)
}

pub fn set_chunk_size(chunk_size: u32) -> bytes::Bytes {
    control_message(TYPE_SET_CHUNK_SIZE, &chunk_size.to_be_bytes(), DEFAULT_ENCODE_CHUNK_SIZE)
}

pub fn window_acknowledgement_size(window_size: u32) -> bytes::Bytes {
    control_message(
        TYPE_WINDOW_ACK_SIZE,
        &window_size.to_be_bytes(),
        DEFAULT_ENCODE_CHUNK_SIZE,
    )
}

pub fn set_peer_bandwidth(window_size: u32) -> bytes::Bytes {
    let mut payload = BytesMut::new();
    payload.put_u32(window_size);
    payload.put_u8(LIMIT_TYPE_DYNAMIC);
    control_message(TYPE_SET_PEER_BANDWIDTH, &payload, DEFAULT_ENCODE_CHUNK_SIZE)
}

/// `StreamBegin` with stream id 0, the event a publisher expects right
/// after `publish` is accepted.
pub fn stream_begin() -> bytes::Bytes {
    let mut payload = BytesMut::new();
    payload.put_u16(EVENT_STREAM_BEGIN);
    payload.put_u32(0);
    control_message(TYPE_USER_CONTROL, &payload, DEFAULT_ENCODE_CHUNK_SIZE)
}

/// Control messages never exceed the protocol's own 128-byte default chunk
/// size, so encoding them never needs the negotiated size.
const DEFAULT_ENCODE_CHUNK_SIZE: usize = crate::chunk::DEFAULT_CHUNK_SIZE;
