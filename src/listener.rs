//! Shared RTSP/RTMP port dispatch (§6): one consuming read per accepted
//! connection, then a substring search for the RTSP version marker,
//! mirroring the original implementation's `_guess_protocol` (one `recv`,
//! search, replay the consumed bytes into whichever handler was chosen).

use std::io;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, ReadBuf};
use tokio::net::{TcpListener, TcpStream};
use tracing::warn;

use crate::config::Config;

const SNIFF_BUFFER_SIZE: usize = 2048;
const RTSP_MARKER: &[u8] = b"RTSP/1.";

/// Wraps a socket whose first bytes were already consumed for protocol
/// sniffing: reads drain `prefix` before falling through to `inner`.
pub struct PrefixedStream<IO> {
    prefix: Vec<u8>,
    prefix_pos: usize,
    inner: IO,
}

impl<IO> PrefixedStream<IO> {
    pub fn new(prefix: Vec<u8>, inner: IO) -> Self {
        Self { prefix, prefix_pos: 0, inner }
    }
}

impl<IO: AsyncRead + Unpin> AsyncRead for PrefixedStream<IO> {
    fn poll_read(mut self: Pin<&mut Self>, cx: &mut Context<'_>, buf: &mut ReadBuf<'_>) -> Poll<io::Result<()>> {
        if self.prefix_pos < self.prefix.len() {
            let remaining = self.prefix.len() - self.prefix_pos;
            let n = remaining.min(buf.remaining());
            let start = self.prefix_pos;
            buf.put_slice(&self.prefix[start..start + n]);
            self.prefix_pos += n;
            return Poll::Ready(Ok(()));
        }
        Pin::new(&mut self.inner).poll_read(cx, buf)
    }
}

impl<IO: AsyncWrite + Unpin> AsyncWrite for PrefixedStream<IO> {
    fn poll_write(mut self: Pin<&mut Self>, cx: &mut Context<'_>, buf: &[u8]) -> Poll<io::Result<usize>> {
        Pin::new(&mut self.inner).poll_write(cx, buf)
    }
    fn poll_flush(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.inner).poll_flush(cx)
    }
    fn poll_shutdown(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.inner).poll_shutdown(cx)
    }
}

/// Binds the shared RTSP/RTMP port and dispatches each connection after
/// sniffing its protocol.
pub async fn serve(config: Arc<Config>) -> io::Result<()> {
    let addr = format!("0.0.0.0:{}", config.ports.rtsp);
    let listener = TcpListener::bind(&addr).await?;
    tracing::info!(%addr, "RTSP/RTMP listener bound");

    loop {
        let (stream, peer) = listener.accept().await?;
        let config = config.clone();
        tokio::spawn(async move {
            if let Err(err) = handle_connection(stream, config).await {
                warn!(%peer, error = %err, "connection ended with an error");
            }
        });
    }
}

async fn handle_connection(stream: TcpStream, config: Arc<Config>) -> io::Result<()> {
    let local_addr = stream.local_addr()?;
    let mut stream = stream;
    let mut buf = vec![0u8; SNIFF_BUFFER_SIZE];
    let n = stream.read(&mut buf).await?;
    buf.truncate(n);
    if n == 0 {
        return Ok(());
    }

    if find_subslice(&buf, RTSP_MARKER).is_some() {
        let name = crate::rtsp_server::stream_name_from_sniff(&buf);
        let prefixed = PrefixedStream::new(buf, stream);
        crate::rtsp_server::serve(prefixed, name, local_addr, &config)
            .await
            .map_err(io::Error::other)
    } else {
        let prefixed = PrefixedStream::new(buf, stream);
        boxfile_rtmp::connection::serve(prefixed, config.root.clone())
            .await
            .map_err(io::Error::other)
    }
}

fn find_subslice(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack.windows(needle.len().max(1)).position(|w| w == needle)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn finds_rtsp_marker() {
        assert_eq!(find_subslice(b"OPTIONS rtsp://host/a RTSP/1.0\r\n", RTSP_MARKER), Some(22));
        assert_eq!(find_subslice(b"\x03\x00\x00\x01\x00", RTSP_MARKER), None);
    }
}
