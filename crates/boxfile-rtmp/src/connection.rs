//! Drives one RTMP ingest connection (§4.7): handshake, then a read loop
//! that feeds bytes through the [`crate::chunk::ChunkAssembler`] and
//! dispatches each reassembled message to the command/control/media
//! decoders, mirroring `boxfile-rtsp::connection`'s read-and-dispatch
//! shape for the sibling protocol.

use std::path::PathBuf;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tracing::{debug, info, warn};

use crate::amf0::Value;
use crate::audio::{self, AudioTag};
use crate::chunk::{ChunkAssembler, Message};
use crate::command::{self, Command};
use crate::control;
use crate::error::Result;
use crate::handshake;
use crate::ingest::{self, IngestSession};
use crate::video;

const TYPE_AUDIO: u8 = 8;
const TYPE_VIDEO: u8 = 9;
const TYPE_DATA_AMF0: u8 = 18;
const TYPE_COMMAND_AMF0: u8 = 20;
const TYPE_SET_CHUNK_SIZE: u8 = 1;

const PUBLISH_STREAM_ID: f64 = 1.0;

/// Runs the server side of one publish connection to completion: handshake,
/// command negotiation, and media ingest, finishing with a write of the
/// completed MP4 to `output_dir/<publishing name>.mp4` once the publisher
/// disconnects. Errors encountered after a publish has started still
/// attempt to flush whatever samples were collected before propagating.
pub async fn serve<IO>(mut io: IO, output_dir: PathBuf) -> Result<()>
where
    IO: AsyncRead + AsyncWrite + Unpin,
{
    handshake::perform(&mut io).await?;
    debug!("RTMP handshake complete");

    let mut assembler = ChunkAssembler::new();
    let mut read_buf = vec![0u8; 8192];
    let mut session: Option<IngestSession> = None;

    loop {
        let n = io.read(&mut read_buf).await?;
        if n == 0 {
            break;
        }
        let messages = assembler.feed(&read_buf[..n])?;
        for message in messages {
            handle_message(&mut io, &mut assembler, &mut session, message).await?;
        }
    }

    if let Some(session) = session {
        finish_and_persist(session, &output_dir).await?;
    }
    Ok(())
}

async fn handle_message<IO>(
    io: &mut IO,
    assembler: &mut ChunkAssembler,
    session: &mut Option<IngestSession>,
    message: Message,
) -> Result<()>
where
    IO: AsyncWrite + Unpin,
{
    match message.type_id {
        TYPE_SET_CHUNK_SIZE => {
            if message.payload.len() >= 4 {
                let size = u32::from_be_bytes(message.payload[0..4].try_into().unwrap());
                assembler.set_chunk_size(size as usize);
            }
        }
        TYPE_COMMAND_AMF0 => {
            let command = Command::decode(&message.payload)?;
            handle_command(io, session, &command).await?;
        }
        TYPE_DATA_AMF0 => {
            if let Some(session) = session {
                handle_metadata(session, &message.payload)?;
            }
        }
        TYPE_VIDEO => {
            if let Some(session) = session {
                let length_size = session.video_length_size();
                let tag = video::parse_video_tag(&message.payload, length_size)?;
                session.on_video_tag(message.timestamp, tag)?;
            }
        }
        TYPE_AUDIO => {
            if let Some(session) = session {
                let tag = audio::parse_audio_tag(&message.payload)?;
                session.on_audio_tag(message.timestamp, tag)?;
            }
        }
        _ => {}
    }
    Ok(())
}

async fn handle_command<IO>(
    io: &mut IO,
    session: &mut Option<IngestSession>,
    command: &Command,
) -> Result<()>
where
    IO: AsyncWrite + Unpin,
{
    match command.name.as_str() {
        "connect" => {
            write_all(io, &control::window_acknowledgement_size(2_500_000)).await?;
            write_all(io, &control::set_peer_bandwidth(2_500_000)).await?;
            write_all(io, &control::set_chunk_size(4096)).await?;
            write_all(io, &command::connect_result(command.transaction_id)).await?;
        }
        "releaseStream" | "FCPublish" | "_checkbw" => {
            write_all(io, &command::bare_result(command.transaction_id)).await?;
        }
        "createStream" => {
            write_all(
                io,
                &command::create_stream_result(command.transaction_id, PUBLISH_STREAM_ID),
            )
            .await?;
        }
        "publish" => {
            let name = command
                .publishing_name()
                .unwrap_or("stream")
                .to_string();
            info!(publishing_name = %name, "publish started");
            *session = Some(IngestSession::new(name.clone()));
            write_all(io, &control::stream_begin()).await?;
            write_all(io, &command::publish_status(&name)).await?;
        }
        other => {
            warn!(command = other, "ignoring unrecognized command");
        }
    }
    Ok(())
}

fn handle_metadata(session: &mut IngestSession, payload: &[u8]) -> Result<()> {
    let (name, mut pos) = crate::amf0::decode(payload)?;
    if name.as_str() != Some("@setDataFrame") {
        return Ok(());
    }
    let (_frame_name, len) = crate::amf0::decode(&payload[pos..])?;
    pos += len;
    let (metadata, _) = crate::amf0::decode(&payload[pos..])?;
    session.on_metadata(
        metadata.get("width").and_then(Value::as_f64),
        metadata.get("height").and_then(Value::as_f64),
    );
    Ok(())
}

async fn write_all<IO>(io: &mut IO, bytes: &[u8]) -> Result<()>
where
    IO: AsyncWrite + Unpin,
{
    io.write_all(bytes).await?;
    io.flush().await?;
    Ok(())
}

async fn finish_and_persist(session: IngestSession, output_dir: &std::path::Path) -> Result<()> {
    let name = session.publishing_name().to_string();
    let bytes = session.finish()?;
    let final_path = output_dir.join(format!("{name}.mp4"));
    ingest::write_atomically(output_dir, &final_path, bytes).await?;
    info!(publishing_name = %name, path = %final_path.display(), "publish finished");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::duplex;

    #[tokio::test]
    async fn serve_returns_once_client_closes_without_publishing() {
        let (mut server, mut client) = duplex(8192);
        let server_task = tokio::spawn(async move { serve(server, std::env::temp_dir()).await });

        client.write_all(&[3]).await.unwrap();
        client.write_all(&0u32.to_be_bytes()).await.unwrap();
        client.write_all(&0u32.to_be_bytes()).await.unwrap();
        client.write_all(&vec![0u8; 1528]).await.unwrap();
        client.flush().await.unwrap();

        let mut s0 = [0u8; 1];
        client.read_exact(&mut s0).await.unwrap();
        let mut s1 = [0u8; 4 + 4 + 1528];
        client.read_exact(&mut s1).await.unwrap();
        let mut s2 = [0u8; 4 + 4 + 1528];
        client.read_exact(&mut s2).await.unwrap();

        let s1_time = u32::from_be_bytes(s1[0..4].try_into().unwrap());
        client.write_all(&s1_time.to_be_bytes()).await.unwrap();
        client.write_all(&0u32.to_be_bytes()).await.unwrap();
        client.write_all(&s1[8..]).await.unwrap();
        client.flush().await.unwrap();

        drop(client);
        server_task.await.unwrap().unwrap();
    }
}
