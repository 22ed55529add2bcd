//! HTTP Basic/Digest authentication (§7), the same verify/challenge shape
//! `boxfile_rtsp::auth` uses for its control channel, adapted for HTTP's
//! per-request method and URI instead of RTSP's per-session content base.

use std::collections::HashMap;

use base64::{engine::general_purpose::STANDARD, Engine as _};
use md5::{Digest, Md5};

use boxfile_common::Nonce;

use crate::config::AuthCredential;

/// The HTTP front end's configured challenge schemes. Absent if neither
/// `-b/--basic` nor `-d/--digest` was given.
#[derive(Debug, Clone, Default)]
pub struct HttpAuth {
    basic: Option<AuthCredential>,
    digest: Option<AuthCredential>,
}

impl HttpAuth {
    pub fn new(basic: Option<AuthCredential>, digest: Option<AuthCredential>) -> Self {
        Self { basic, digest }
    }

    pub fn is_enabled(&self) -> bool {
        self.basic.is_some() || self.digest.is_some()
    }

    /// `WWW-Authenticate` header values to send on a 401, one per enabled
    /// scheme. There is no per-request nonce minting phase in HTTP the way
    /// RTSP's `SETUP` gives one; callers share a single process-lifetime
    /// `Nonce` across all Digest challenges (see `streaming::AppState`).
    pub fn challenges(&self, nonce: &Nonce) -> Vec<String> {
        let mut out = Vec::new();
        if let Some(basic) = &self.basic {
            out.push(format!("Basic realm=\"{}\"", basic.realm));
        }
        if let Some(digest) = &self.digest {
            out.push(format!(
                "Digest realm=\"{}\", nonce=\"{}\"",
                digest.realm, nonce
            ));
        }
        out
    }

    pub fn verify(&self, header_value: &str, method: &str, uri: &str, nonce: &Nonce) -> bool {
        if let Some(rest) = header_value.strip_prefix("Basic ") {
            self.basic.as_ref().is_some_and(|c| verify_basic(c, rest))
        } else if header_value.starts_with("Digest ") {
            self.digest
                .as_ref()
                .is_some_and(|c| verify_digest(c, header_value, method, uri, nonce))
        } else {
            false
        }
    }
}

fn verify_basic(config: &AuthCredential, encoded: &str) -> bool {
    let Ok(decoded) = STANDARD.decode(encoded.trim()) else {
        return false;
    };
    let Ok(text) = String::from_utf8(decoded) else {
        return false;
    };
    let Some((user, pass)) = text.split_once(':') else {
        return false;
    };
    user == config.username && pass == config.password
}

fn verify_digest(config: &AuthCredential, header_value: &str, method: &str, uri: &str, nonce: &Nonce) -> bool {
    let params = parse_digest_params(header_value);
    let (Some(username), Some(realm), Some(req_nonce), Some(response)) = (
        params.get("username"),
        params.get("realm"),
        params.get("nonce"),
        params.get("response"),
    ) else {
        return false;
    };
    if username != &config.username || realm != &config.realm || req_nonce != nonce.as_str() {
        return false;
    }
    let ha1 = md5_hex(&format!("{}:{}:{}", config.username, config.realm, config.password));
    let ha2 = md5_hex(&format!("{method}:{uri}"));
    let expected = md5_hex(&format!("{ha1}:{req_nonce}:{ha2}"));
    &expected == response
}

fn parse_digest_params(header_value: &str) -> HashMap<String, String> {
    let body = header_value.strip_prefix("Digest ").unwrap_or(header_value);
    body.split(',')
        .filter_map(|kv| {
            let (k, v) = kv.trim().split_once('=')?;
            Some((k.trim().to_string(), v.trim().trim_matches('"').to_string()))
        })
        .collect()
}

fn md5_hex(s: &str) -> String {
    let mut hasher = Md5::new();
    hasher.update(s.as_bytes());
    hex::encode(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn auth() -> HttpAuth {
        HttpAuth::new(
            Some(AuthCredential {
                username: "alice".to_string(),
                password: "secret".to_string(),
                realm: "streamer".to_string(),
            }),
            Some(AuthCredential {
                username: "alice".to_string(),
                password: "secret".to_string(),
                realm: "streamer".to_string(),
            }),
        )
    }

    #[test]
    fn basic_round_trips() {
        let auth = auth();
        let nonce = Nonce::new();
        let header = format!("Basic {}", STANDARD.encode("alice:secret"));
        assert!(auth.verify(&header, "GET", "/simple.m3u8", &nonce));
        let bad = format!("Basic {}", STANDARD.encode("alice:wrong"));
        assert!(!auth.verify(&bad, "GET", "/simple.m3u8", &nonce));
    }

    #[test]
    fn digest_round_trips() {
        let auth = auth();
        let nonce = Nonce::new();
        let ha1 = md5_hex("alice:streamer:secret");
        let ha2 = md5_hex("GET:/simple.m3u8");
        let response = md5_hex(&format!("{ha1}:{}:{ha2}", nonce.as_str()));
        let header = format!(
            "Digest username=\"alice\", realm=\"streamer\", nonce=\"{}\", uri=\"/simple.m3u8\", response=\"{response}\"",
            nonce.as_str(),
        );
        assert!(auth.verify(&header, "GET", "/simple.m3u8", &nonce));
    }

    #[test]
    fn digest_rejects_wrong_nonce() {
        let auth = auth();
        let nonce = Nonce::new();
        let stale = Nonce::new();
        let ha1 = md5_hex("alice:streamer:secret");
        let ha2 = md5_hex("GET:/simple.m3u8");
        let response = md5_hex(&format!("{ha1}:{}:{ha2}", stale.as_str()));
        let header = format!(
            "Digest username=\"alice\", realm=\"streamer\", nonce=\"{}\", uri=\"/simple.m3u8\", response=\"{response}\"",
            stale.as_str(),
        );
        assert!(!auth.verify(&header, "GET", "/simple.m3u8", &nonce));
    }

    #[test]
    fn challenges_list_both_enabled_schemes() {
        let auth = auth();
        let nonce = Nonce::new();
        let challenges = auth.challenges(&nonce);
        assert_eq!(challenges.len(), 2);
        assert!(challenges[0].starts_with("Basic realm="));
        assert!(challenges[1].starts_with("Digest realm="));
    }
}
