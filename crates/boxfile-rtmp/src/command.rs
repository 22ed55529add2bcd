//! The AMF0 command messages this sink recognizes (§4.7): `connect`,
//! `releaseStream`, `FCPublish`, `createStream`, `_checkbw`, `publish`, and
//! the `_result`/`onStatus` replies it sends back.

use bytes::{Bytes, BytesMut};

use crate::amf0::{self, Value};
use crate::chunk::{encode_message, DEFAULT_CHUNK_SIZE};
use crate::error::{Error, Result};

const COMMAND_CHUNK_STREAM_ID: u32 = 3;
const AMF0_COMMAND_TYPE_ID: u8 = 20;

/// One decoded command message: the command name, its transaction id, and
/// whatever positional arguments followed (the command object, then the
/// optional arguments object `publish`/`connect` carry).
#[derive(Debug, Clone)]
pub struct Command {
    pub name: String,
    pub transaction_id: f64,
    pub args: Vec<Value>,
}

impl Command {
    pub fn decode(data: &[u8]) -> Result<Self> {
        let (name_value, mut pos) = amf0::decode(data)?;
        let name = name_value
            .as_str()
            .ok_or_else(|| Error::protocol("command message missing name"))?
            .to_string();
        let (transaction_value, len) = amf0::decode(&data[pos..])?;
        pos += len;
        let transaction_id = transaction_value
            .as_f64()
            .ok_or_else(|| Error::protocol("command message missing transaction id"))?;

        let mut args = Vec::new();
        while pos < data.len() {
            let (value, len) = amf0::decode(&data[pos..])?;
            pos += len;
            args.push(value);
        }

        Ok(Self { name, transaction_id, args })
    }

    /// The publishing stream name `publish` was invoked with.
    pub fn publishing_name(&self) -> Option<&str> {
        self.args.first().and_then(Value::as_str)
    }
}

fn encode(name: &str, transaction_id: f64, fields: &[Value]) -> Bytes {
    let mut buf = BytesMut::new();
    Value::String(name.to_string()).encode(&mut buf);
    Value::Number(transaction_id).encode(&mut buf);
    for field in fields {
        field.encode(&mut buf);
    }
    encode_message(COMMAND_CHUNK_STREAM_ID, 0, AMF0_COMMAND_TYPE_ID, 0, &buf, DEFAULT_CHUNK_SIZE)
}

/// The `_result` reply to `connect`: server properties plus connect status.
pub fn connect_result(transaction_id: f64) -> Bytes {
    let properties = Value::Object(vec![
        ("fmsVer".to_string(), Value::String("FMS/3,0,1,123".to_string())),
        ("capabilities".to_string(), Value::Number(31.0)),
    ]);
    let information = Value::Object(vec![
        ("level".to_string(), Value::String("status".to_string())),
        ("code".to_string(), Value::String("NetConnection.Connect.Success".to_string())),
        ("description".to_string(), Value::String("Connection succeeded.".to_string())),
    ]);
    encode("_result", transaction_id, &[properties, information])
}

/// A bare `_result` reply with a null command object, used for
/// `releaseStream`/`FCPublish`/`_checkbw` acknowledgements.
pub fn bare_result(transaction_id: f64) -> Bytes {
    encode("_result", transaction_id, &[Value::Null])
}

/// `createStream`'s reply: a null command object plus the new stream id.
pub fn create_stream_result(transaction_id: f64, stream_id: f64) -> Bytes {
    encode("_result", transaction_id, &[Value::Null, Value::Number(stream_id)])
}

/// `onStatus NetStream.Publish.Start`, sent once `publish` is accepted.
pub fn publish_status(publishing_name: &str) -> Bytes {
    let info = Value::Object(vec![
        ("level".to_string(), Value::String("status".to_string())),
        ("code".to_string(), Value::String("NetStream.Publish.Start".to_string())),
        (
            "description".to_string(),
            Value::String(format!("{publishing_name} is now published")),
        ),
    ]);
    encode("onStatus", 0.0, &[Value::Null, info])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chunk::ChunkAssembler;

    #[test]
    fn decodes_publish_command() {
        let mut buf = BytesMut::new();
        Value::String("publish".to_string()).encode(&mut buf);
        Value::Number(0.0).encode(&mut buf);
        Value::Null.encode(&mut buf);
        Value::String("mystream".to_string()).encode(&mut buf);
        Value::String("live".to_string()).encode(&mut buf);

        let command = Command::decode(&buf).unwrap();
        assert_eq!(command.name, "publish");
        assert_eq!(command.publishing_name(), Some("mystream"));
    }

    #[test]
    fn connect_result_round_trips_through_chunk_layer() {
        let encoded = connect_result(1.0);
        let mut assembler = ChunkAssembler::new();
        let messages = assembler.feed(&encoded).unwrap();
        assert_eq!(messages.len(), 1);
        let command = Command::decode(&messages[0].payload).unwrap();
        assert_eq!(command.name, "_result");
        assert_eq!(command.transaction_id, 1.0);
    }
}
