//! The HTTP/HLS/DASH front end (§6): one catch-all route per stream name,
//! dispatching on the suffix grammar `boxfile_common::paths` parses, backed
//! by the process-wide `streaming::SegmentCache`.

use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::{Path as AxumPath, State};
use axum::http::{HeaderMap, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::Router;

use boxfile_common::paths::{parse_media_request, MediaRequest};
use boxfile_common::Nonce;

use crate::auth::HttpAuth;
use crate::config::Config;
use crate::streaming::{self, SegmentCache};

pub struct AppState {
    pub config: Config,
    pub cache: SegmentCache,
    pub auth: HttpAuth,
    pub nonce: Nonce,
}

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/{request}", get(serve_media))
        .with_state(state)
}

async fn serve_media(
    State(state): State<Arc<AppState>>,
    AxumPath(segment): AxumPath<String>,
    headers: HeaderMap,
) -> Response {
    if state.auth.is_enabled() {
        if let Some(resp) = check_authorization(&state, &headers, "GET", &segment) {
            return resp;
        }
    }

    let Some((name, request)) = split_name_and_request(&segment) else {
        return (StatusCode::NOT_FOUND, "unrecognized media request").into_response();
    };

    let path = state.config.root.join(format!("{name}.mp4"));
    let cached = match state.cache.get_or_build(&path, state.config.segment_seconds, state.config.cache) {
        Ok(c) => c,
        Err(err) => return map_media_error(err),
    };

    match request {
        MediaRequest::Playlist => {
            // Flat URL grammar (`GET /<name>_sn<N>.m4s`, no nested prefix);
            // an empty base joins with `HlsPlaylist::generate_media`'s
            // leading-slash format string to produce exactly that.
            let playlist = boxfile_media::HlsPlaylist::new("", &name).generate_media(&cached.segment_map);
            (
                [(axum::http::header::CONTENT_TYPE, "application/vnd.apple.mpegurl")],
                playlist,
            )
                .into_response()
        }
        MediaRequest::Mpd => {
            let mut builder = boxfile_media::MpdBuilder::new(&name);
            for track in &cached.adaptation_tracks {
                builder = builder.track(track.clone());
            }
            let mpd = builder.render(&cached.segment_map);
            ([(axum::http::header::CONTENT_TYPE, "application/dash+xml")], mpd).into_response()
        }
        MediaRequest::Init => (
            [(axum::http::header::CONTENT_TYPE, "video/mp4")],
            Bytes::from(cached.segment_map.init_segment.clone()),
        )
            .into_response(),
        MediaRequest::Segment(index) => {
            let Some(segment) = cached.segment_map.segments.get(index as usize) else {
                return (StatusCode::NOT_FOUND, "segment index out of range").into_response();
            };
            match streaming::assemble_segment(&path, segment).await {
                Ok(bytes) => ([(axum::http::header::CONTENT_TYPE, "video/mp4")], bytes).into_response(),
                Err(err) => {
                    tracing::warn!(error = %err, "failed to assemble segment");
                    (StatusCode::INTERNAL_SERVER_ERROR, "failed to read segment").into_response()
                }
            }
        }
    }
}

/// The URL grammar (`<name>.m3u8`, `<name>_init.mp4`, `<name>_sn<N>.m4s`, ...)
/// is flat: the stream name and the request kind share one path segment, so
/// `name` has to be recovered by stripping a known suffix before
/// `parse_media_request` can confirm which kind it is.
fn split_name_and_request(segment: &str) -> Option<(String, MediaRequest)> {
    for suffix in [".m3u8", ".m3u", ".mpd", "_init.mp4"] {
        if let Some(name) = segment.strip_suffix(suffix) {
            if let Some(request) = parse_media_request(name, segment) {
                return Some((name.to_string(), request));
            }
        }
    }
    let rest = segment.strip_suffix(".m4s")?;
    let (name, _) = rest.rsplit_once("_sn")?;
    let request = parse_media_request(name, segment)?;
    Some((name.to_string(), request))
}

fn check_authorization(state: &Arc<AppState>, headers: &HeaderMap, method: &str, uri: &str) -> Option<Response> {
    let authorized = headers
        .get(axum::http::header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|value| state.auth.verify(value, method, uri, &state.nonce));

    if authorized {
        return None;
    }

    let mut response = StatusCode::UNAUTHORIZED.into_response();
    for challenge in state.auth.challenges(&state.nonce) {
        if let Ok(value) = HeaderValue::from_str(&challenge) {
            response.headers_mut().append(axum::http::header::WWW_AUTHENTICATE, value);
        }
    }
    Some(response)
}

/// Maps `boxfile-media`'s parsing/timeline error taxonomy onto HTTP status
/// codes: a missing source file or a track-less segment map reads as 404,
/// box-tree corruption as 501 (the server understood the request but the
/// source isn't something it can serve), everything else as 500.
fn map_media_error(err: boxfile_media::Error) -> Response {
    use boxfile_media::Error;
    match err {
        Error::Io(io_err) if io_err.kind() == std::io::ErrorKind::NotFound => {
            (StatusCode::NOT_FOUND, "file not found").into_response()
        }
        Error::MalformedBox(_) | Error::MissingBox(_) | Error::UnsupportedCodec(_) => {
            (StatusCode::NOT_IMPLEMENTED, err.to_string()).into_response()
        }
        other => (StatusCode::INTERNAL_SERVER_ERROR, other.to_string()).into_response(),
    }
}
