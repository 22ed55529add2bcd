//! Resolves the RTSP target file from a connection's first request line (a
//! [`boxfile_rtsp::session::Session`] needs an already-open file, so the
//! stream name has to come out of the sniff buffer before handing the
//! socket to `boxfile_rtsp::connection::serve`), then drives the connection.

use std::net::SocketAddr;

use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};
use tracing::warn;

use boxfile_media::Mp4File;
use boxfile_rtsp::auth::AuthConfig;
use boxfile_rtsp::connection;
use boxfile_rtsp::response::Response;
use boxfile_rtsp::session::Session;

use crate::config::Config;

/// Pulls the stream name out of the first RTSP request line in a connection's
/// sniff buffer. Every RTSP method, including the first `OPTIONS`, carries
/// the full target URI, so this never needs more than what sniffing already
/// read.
pub fn stream_name_from_sniff(buf: &[u8]) -> Option<String> {
    let text = String::from_utf8_lossy(buf);
    let first_line = text.lines().next()?;
    let uri = first_line.split_whitespace().nth(1)?;
    let name = uri.rsplit('/').next()?;
    if name.is_empty() {
        None
    } else {
        Some(name.to_string())
    }
}

pub async fn serve<IO>(
    mut io: IO,
    name: Option<String>,
    local_addr: SocketAddr,
    config: &Config,
) -> std::io::Result<()>
where
    IO: AsyncRead + AsyncWrite + Unpin,
{
    let Some(name) = name else {
        write_closing_response(&mut io, 400, "Bad Request").await?;
        return Ok(());
    };

    let path = config.root.join(format!("{name}.mp4"));
    let file = match Mp4File::open(&path) {
        Ok(f) => f,
        Err(err) => {
            warn!(path = %path.display(), error = %err, "RTSP target file not found");
            write_closing_response(&mut io, 404, "Not Found").await?;
            return Ok(());
        }
    };

    let auth = build_auth_config(config);
    let content_base = format!("rtsp://{local_addr}/{name}");
    let session = Session::new(content_base, file, auth);

    connection::serve(io, session)
        .await
        .map_err(std::io::Error::other)
}

/// `boxfile_rtsp::auth::AuthConfig` holds one credential with two scheme
/// flags, unlike the HTTP side's independent Basic/Digest credentials;
/// Digest is preferred when both are configured since it's the stronger
/// scheme, and both flags are set so a client may pick either.
fn build_auth_config(config: &Config) -> Option<AuthConfig> {
    let credential = config.digest.as_ref().or(config.basic.as_ref())?;
    Some(AuthConfig {
        realm: credential.realm.clone(),
        username: credential.username.clone(),
        password: credential.password.clone(),
        basic: config.basic.is_some(),
        digest: config.digest.is_some(),
    })
}

async fn write_closing_response<IO>(io: &mut IO, status: u16, reason: &'static str) -> std::io::Result<()>
where
    IO: AsyncWrite + Unpin,
{
    let response = Response::new(status, reason);
    io.write_all(&response.to_bytes()).await?;
    io.flush().await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_name_from_options_request_line() {
        let buf = b"OPTIONS rtsp://192.168.1.1/simple RTSP/1.0\r\nCSeq: 1\r\n\r\n";
        assert_eq!(stream_name_from_sniff(buf), Some("simple".to_string()));
    }

    #[test]
    fn returns_none_for_empty_name() {
        let buf = b"OPTIONS rtsp://192.168.1.1/ RTSP/1.0\r\nCSeq: 1\r\n\r\n";
        assert_eq!(stream_name_from_sniff(buf), None);
    }
}
