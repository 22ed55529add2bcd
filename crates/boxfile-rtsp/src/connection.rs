//! Drives one RTSP connection: reads request-line-and-headers blocks,
//! dispatches them to a [`Session`], and interleaves due RTP frames onto
//! the same socket between requests (§6: RTP rides the same TCP connection
//! as the RTSP control channel via interleaved framing).

use std::time::{Duration, Instant};

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufReader};

use crate::error::Result;
use crate::request::Request;
use crate::response::Response;
use crate::session::Session;

/// How often to check the session's pacers for a due frame while the
/// client isn't sending a new request.
const POLL_INTERVAL: Duration = Duration::from_millis(5);

/// Reads and dispatches RTSP requests on `io` against `session` until the
/// client disconnects or sends `TEARDOWN`. While playing, due RTP frames
/// are written between request reads so neither direction starves.
pub async fn serve<IO>(io: IO, mut session: Session) -> Result<()>
where
    IO: AsyncRead + AsyncWrite + Unpin,
{
    let (reader_half, mut writer) = tokio::io::split(io);
    let mut reader = BufReader::new(reader_half);
    let mut buf = Vec::with_capacity(4096);

    loop {
        buf.clear();
        if !read_head(&mut reader, &mut buf).await? {
            return Ok(());
        }
        let head = String::from_utf8_lossy(&buf).into_owned();
        let request = match Request::parse(&head, String::new()) {
            Ok(r) => r,
            Err(_) => continue,
        };

        let body = if request.content_length() > 0 {
            let mut body_buf = vec![0u8; request.content_length()];
            reader.read_exact(&mut body_buf).await?;
            String::from_utf8_lossy(&body_buf).into_owned()
        } else {
            String::new()
        };
        let request = Request::parse(&head, body)?;

        let torn_down = matches!(request.method, crate::request::Method::Teardown);
        let response = session.handle(&request);
        write_response(&mut writer, &response).await?;

        if torn_down {
            return Ok(());
        }

        flush_due_frames(&mut session, &mut writer).await?;
    }
}

async fn read_head<R>(reader: &mut BufReader<R>, buf: &mut Vec<u8>) -> Result<bool>
where
    R: AsyncRead + Unpin,
{
    use tokio::io::AsyncBufReadExt;
    loop {
        let mut line = Vec::new();
        let n = reader.read_until(b'\n', &mut line).await?;
        if n == 0 {
            return Ok(!buf.is_empty());
        }
        if line == b"\r\n" || line == b"\n" {
            return Ok(true);
        }
        buf.extend_from_slice(&line);
    }
}

async fn write_response<W>(writer: &mut W, response: &Response) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    writer.write_all(&response.to_bytes()).await?;
    writer.flush().await?;
    Ok(())
}

async fn flush_due_frames<W>(session: &mut Session, writer: &mut W) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    let frames = session.pull_due_frames(Instant::now())?;
    for frame in frames {
        writer.write_all(&frame).await?;
    }
    if !session.is_playing() {
        return Ok(());
    }
    tokio::time::sleep(POLL_INTERVAL).await;
    Ok(())
}
