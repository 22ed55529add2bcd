//! Hand-parsed RTSP request line and header subset (rfc7826 §7), scoped to
//! exactly the directives this crate dispatches.

use std::collections::HashMap;

use crate::error::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Options,
    Describe,
    Setup,
    Play,
    Pause,
    Teardown,
    GetParameter,
}

impl Method {
    fn parse(s: &str) -> Option<Self> {
        match s {
            "OPTIONS" => Some(Method::Options),
            "DESCRIBE" => Some(Method::Describe),
            "SETUP" => Some(Method::Setup),
            "PLAY" => Some(Method::Play),
            "PAUSE" => Some(Method::Pause),
            "TEARDOWN" => Some(Method::Teardown),
            "GET_PARAMETER" => Some(Method::GetParameter),
            _ => None,
        }
    }
}

/// One parsed RTSP request: method, request URI, a lowercase-keyed header
/// map, and the raw body (non-empty only for `GET_PARAMETER`'s `position`
/// query in this protocol subset). `CSeq` is pulled out eagerly since every
/// response echoes it.
#[derive(Debug, Clone)]
pub struct Request {
    pub method: Method,
    pub uri: String,
    pub cseq: u64,
    pub body: String,
    headers: HashMap<String, String>,
}

impl Request {
    /// Parses the request-line-and-headers block (`head`, not including the
    /// terminating blank line) plus whatever body bytes followed it, per
    /// the `Content-Length` the headers declared.
    pub fn parse(head: &str, body: String) -> Result<Self> {
        let mut lines = head.split("\r\n");
        let request_line = lines
            .next()
            .filter(|l| !l.is_empty())
            .ok_or_else(|| Error::protocol("empty request"))?;

        let mut tokens = request_line.split_whitespace();
        let method_str = tokens
            .next()
            .ok_or_else(|| Error::protocol("missing method"))?;
        let uri = tokens
            .next()
            .ok_or_else(|| Error::protocol("missing request uri"))?
            .to_string();
        let method = Method::parse(method_str)
            .ok_or_else(|| Error::protocol(format!("unsupported method: {method_str}")))?;

        let mut headers = HashMap::new();
        for line in lines {
            if line.is_empty() {
                continue;
            }
            if let Some((name, value)) = line.split_once(':') {
                headers.insert(name.trim().to_ascii_lowercase(), value.trim().to_string());
            }
        }

        let cseq = headers
            .get("cseq")
            .ok_or_else(|| Error::protocol("missing CSeq"))?
            .parse()
            .map_err(|_| Error::protocol("malformed CSeq"))?;

        Ok(Self {
            method,
            uri,
            cseq,
            body,
            headers,
        })
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(&name.to_ascii_lowercase()).map(String::as_str)
    }

    /// The `Content-Length` the headers declared, 0 if absent or malformed.
    pub fn content_length(&self) -> usize {
        self.header("content-length")
            .and_then(|v| v.parse().ok())
            .unwrap_or(0)
    }

    /// The last path segment of the request URI, used as the `SETUP`
    /// track-control identifier (the SDP's `a=control:<id>`).
    pub fn track_control_id(&self) -> Option<u32> {
        self.uri.rsplit('/').next()?.parse().ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(head: &str) -> Result<Request> {
        Request::parse(head, String::new())
    }

    #[test]
    fn parses_options_request() {
        let req = parse("OPTIONS rtsp://host/stream.mp4 RTSP/1.0\r\nCSeq: 1\r\n").unwrap();
        assert_eq!(req.method, Method::Options);
        assert_eq!(req.cseq, 1);
    }

    #[test]
    fn parses_headers_case_insensitively() {
        let req = parse("DESCRIBE rtsp://host/a.mp4 RTSP/1.0\r\nCSeq: 2\r\nAccept: application/sdp\r\n")
            .unwrap();
        assert_eq!(req.header("accept"), Some("application/sdp"));
        assert_eq!(req.header("ACCEPT"), Some("application/sdp"));
    }

    #[test]
    fn rejects_missing_cseq() {
        let err = parse("OPTIONS rtsp://host/a.mp4 RTSP/1.0\r\n").unwrap_err();
        assert!(matches!(err, Error::ProtocolError(_)));
    }

    #[test]
    fn rejects_unknown_method() {
        let err = parse("FOO rtsp://host/a.mp4 RTSP/1.0\r\nCSeq: 1\r\n").unwrap_err();
        assert!(matches!(err, Error::ProtocolError(_)));
    }

    #[test]
    fn track_control_id_reads_last_path_segment() {
        let req = parse("SETUP rtsp://host/a.mp4/2 RTSP/1.0\r\nCSeq: 3\r\n").unwrap();
        assert_eq!(req.track_control_id(), Some(2));
    }

    #[test]
    fn carries_body_and_content_length() {
        let req = Request::parse(
            "GET_PARAMETER rtsp://host/a.mp4 RTSP/1.0\r\nCSeq: 4\r\nContent-Length: 8\r\n",
            "position".to_string(),
        )
        .unwrap();
        assert_eq!(req.content_length(), 8);
        assert_eq!(req.body, "position");
    }
}
