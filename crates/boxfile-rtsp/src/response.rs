//! RTSP response composition. Every response echoes the request's `CSeq`
//! (§4.6 "User-visible behavior").

/// A response under construction; `cseq`/`header`/`body` consume and return
/// `self` so a response reads as one chained expression at the call site.
pub struct Response {
    pub status_code: u16,
    pub reason: &'static str,
    headers: Vec<(String, String)>,
    body: Vec<u8>,
}

impl Response {
    pub fn new(status_code: u16, reason: &'static str) -> Self {
        Self {
            status_code,
            reason,
            headers: Vec::new(),
            body: Vec::new(),
        }
    }

    pub fn ok() -> Self {
        Self::new(200, "OK")
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    pub fn cseq(self, cseq: u64) -> Self {
        self.header("CSeq", cseq.to_string())
    }

    pub fn body(mut self, body: impl Into<Vec<u8>>) -> Self {
        let bytes = body.into();
        self.headers.push(("Content-Length".to_string(), bytes.len().to_string()));
        self.body = bytes;
        self
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = format!("RTSP/1.0 {} {}\r\n", self.status_code, self.reason).into_bytes();
        for (name, value) in &self.headers {
            out.extend_from_slice(format!("{name}: {value}\r\n").as_bytes());
        }
        out.extend_from_slice(b"\r\n");
        out.extend_from_slice(&self.body);
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn renders_status_line_and_cseq() {
        let bytes = Response::ok().cseq(7).to_bytes();
        let text = String::from_utf8(bytes).unwrap();
        assert!(text.starts_with("RTSP/1.0 200 OK\r\n"));
        assert!(text.contains("CSeq: 7\r\n"));
        assert!(text.ends_with("\r\n\r\n"));
    }

    #[test]
    fn body_sets_content_length() {
        let bytes = Response::ok().cseq(1).body("abc").to_bytes();
        let text = String::from_utf8(bytes).unwrap();
        assert!(text.contains("Content-Length: 3\r\n"));
        assert!(text.ends_with("\r\n\r\nabc"));
    }
}
