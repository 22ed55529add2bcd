//! The small AMF0 subset the ingest sink needs (§4.7): command arguments
//! (`connect`, `publish`, `createStream`) and the `onMetaData` object the
//! publisher sends before the first media message. Not a general AMF0
//! decoder/encoder — unsupported markers return `ProtocolError`.

use bytes::{BufMut, BytesMut};

use crate::error::{Error, Result};

const MARKER_NUMBER: u8 = 0x00;
const MARKER_BOOLEAN: u8 = 0x01;
const MARKER_STRING: u8 = 0x02;
const MARKER_OBJECT: u8 = 0x03;
const MARKER_NULL: u8 = 0x05;
const MARKER_ECMA_ARRAY: u8 = 0x08;
const MARKER_OBJECT_END: u8 = 0x09;

/// One decoded AMF0 value. `Object`/`EcmaArray` keep insertion order since
/// nothing here needs keyed lookup beyond a handful of named fields.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Number(f64),
    Boolean(bool),
    String(String),
    Object(Vec<(String, Value)>),
    Null,
}

impl Value {
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Number(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    /// Looks up a field by name in an `Object`/`EcmaArray` value.
    pub fn get(&self, key: &str) -> Option<&Value> {
        match self {
            Value::Object(fields) => fields.iter().find(|(k, _)| k == key).map(|(_, v)| v),
            _ => None,
        }
    }

    pub fn encode(&self, buf: &mut BytesMut) {
        match self {
            Value::Number(n) => {
                buf.put_u8(MARKER_NUMBER);
                buf.put_f64(*n);
            }
            Value::Boolean(b) => {
                buf.put_u8(MARKER_BOOLEAN);
                buf.put_u8(u8::from(*b));
            }
            Value::String(s) => {
                buf.put_u8(MARKER_STRING);
                encode_utf8_short(buf, s);
            }
            Value::Object(fields) => {
                buf.put_u8(MARKER_OBJECT);
                for (key, value) in fields {
                    encode_utf8_short(buf, key);
                    value.encode(buf);
                }
                buf.put_u16(0);
                buf.put_u8(MARKER_OBJECT_END);
            }
            Value::Null => buf.put_u8(MARKER_NULL),
        }
    }
}

fn encode_utf8_short(buf: &mut BytesMut, s: &str) {
    buf.put_u16(s.len() as u16);
    buf.put_slice(s.as_bytes());
}

/// Decodes one AMF0 value, returning it plus the number of bytes consumed.
pub fn decode(data: &[u8]) -> Result<(Value, usize)> {
    let marker = *data
        .first()
        .ok_or_else(|| Error::protocol("AMF0 value truncated"))?;
    match marker {
        MARKER_NUMBER => {
            need(data, 9)?;
            Ok((
                Value::Number(f64::from_be_bytes(data[1..9].try_into().unwrap())),
                9,
            ))
        }
        MARKER_BOOLEAN => {
            need(data, 2)?;
            Ok((Value::Boolean(data[1] != 0), 2))
        }
        MARKER_STRING => {
            let (s, len) = decode_utf8_short(&data[1..])?;
            Ok((Value::String(s), 1 + len))
        }
        MARKER_OBJECT => decode_object(&data[1..]).map(|(fields, len)| (Value::Object(fields), 1 + len)),
        MARKER_ECMA_ARRAY => {
            need(data, 5)?;
            let (fields, len) = decode_object(&data[5..])?;
            Ok((Value::Object(fields), 5 + len))
        }
        MARKER_NULL => Ok((Value::Null, 1)),
        other => Err(Error::protocol(format!("unsupported AMF0 marker {other:#x}"))),
    }
}

fn decode_object(data: &[u8]) -> Result<(Vec<(String, Value)>, usize)> {
    let mut fields = Vec::new();
    let mut pos = 0;
    loop {
        if data.get(pos) == Some(&0) && data.get(pos + 1) == Some(&0) && data.get(pos + 2) == Some(&MARKER_OBJECT_END)
        {
            pos += 3;
            break;
        }
        let (key, key_len) = decode_utf8_short(&data[pos..])?;
        pos += key_len;
        let (value, value_len) = decode(&data[pos..])?;
        pos += value_len;
        fields.push((key, value));
    }
    Ok((fields, pos))
}

fn decode_utf8_short(data: &[u8]) -> Result<(String, usize)> {
    need(data, 2)?;
    let len = u16::from_be_bytes([data[0], data[1]]) as usize;
    need(data, 2 + len)?;
    let s = String::from_utf8_lossy(&data[2..2 + len]).into_owned();
    Ok((s, 2 + len))
}

fn need(data: &[u8], len: usize) -> Result<()> {
    if data.len() < len {
        Err(Error::protocol("AMF0 value truncated"))
    } else {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_string() {
        let mut buf = BytesMut::new();
        Value::String("connect".to_string()).encode(&mut buf);
        let (value, len) = decode(&buf).unwrap();
        assert_eq!(value, Value::String("connect".to_string()));
        assert_eq!(len, buf.len());
    }

    #[test]
    fn round_trips_number() {
        let mut buf = BytesMut::new();
        Value::Number(3.0).encode(&mut buf);
        let (value, _) = decode(&buf).unwrap();
        assert_eq!(value.as_f64(), Some(3.0));
    }

    #[test]
    fn decodes_object_with_field_lookup() {
        let mut buf = BytesMut::new();
        Value::Object(vec![
            ("duration".to_string(), Value::Number(2.0)),
            ("width".to_string(), Value::Number(640.0)),
        ])
        .encode(&mut buf);
        let (value, len) = decode(&buf).unwrap();
        assert_eq!(len, buf.len());
        assert_eq!(value.get("duration").and_then(Value::as_f64), Some(2.0));
        assert_eq!(value.get("width").and_then(Value::as_f64), Some(640.0));
    }

    #[test]
    fn decodes_ecma_array_as_object() {
        let mut raw = BytesMut::new();
        raw.put_u8(MARKER_ECMA_ARRAY);
        raw.put_u32(1);
        encode_utf8_short(&mut raw, "duration");
        Value::Number(2.0).encode(&mut raw);
        raw.put_u16(0);
        raw.put_u8(MARKER_OBJECT_END);
        let (value, len) = decode(&raw).unwrap();
        assert_eq!(len, raw.len());
        assert_eq!(value.get("duration").and_then(Value::as_f64), Some(2.0));
    }

    #[test]
    fn rejects_unsupported_marker() {
        let err = decode(&[0x0b]).unwrap_err();
        assert!(matches!(err, Error::ProtocolError(_)));
    }
}
