//! Basic and Digest (MD5, rfc2617) RTSP authentication.

use std::collections::HashMap;

use base64::{engine::general_purpose::STANDARD, Engine as _};
use md5::{Digest, Md5};

use boxfile_common::Nonce;

/// A single set of credentials an `AuthContainer` accepts, plus which
/// challenge schemes it offers.
#[derive(Debug, Clone)]
pub struct AuthConfig {
    pub realm: String,
    pub username: String,
    pub password: String,
    pub basic: bool,
    pub digest: bool,
}

impl AuthConfig {
    /// `WWW-Authenticate` header values to send on a 401 challenge, one per
    /// enabled scheme. The digest nonce is minted fresh per challenge.
    pub fn challenges(&self, nonce: &Nonce) -> Vec<String> {
        let mut out = Vec::new();
        if self.basic {
            out.push(format!("Basic realm=\"{}\"", self.realm));
        }
        if self.digest {
            out.push(format!(
                "Digest realm=\"{}\", nonce=\"{}\"",
                self.realm, nonce
            ));
        }
        out
    }

    /// Verifies an `Authorization:` header value against either scheme this
    /// config accepts. `method`/`uri` are the request's own, needed for the
    /// digest `HA2` computation.
    pub fn verify(&self, header_value: &str, method: &str, nonce: &Nonce) -> bool {
        if let Some(rest) = header_value.strip_prefix("Basic ") {
            self.basic && verify_basic(self, rest)
        } else if header_value.starts_with("Digest ") {
            self.digest && verify_digest(self, header_value, method, nonce)
        } else {
            false
        }
    }
}

fn verify_basic(config: &AuthConfig, encoded: &str) -> bool {
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

fn verify_digest(config: &AuthConfig, header_value: &str, method: &str, nonce: &Nonce) -> bool {
    let params = parse_digest_params(header_value);
    let (Some(username), Some(realm), Some(req_nonce), Some(uri), Some(response)) = (
        params.get("username"),
        params.get("realm"),
        params.get("nonce"),
        params.get("uri"),
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

    fn config() -> AuthConfig {
        AuthConfig {
            realm: "streamer".to_string(),
            username: "alice".to_string(),
            password: "secret".to_string(),
            basic: true,
            digest: true,
        }
    }

    #[test]
    fn basic_round_trips() {
        let config = config();
        let encoded = STANDARD.encode("alice:secret");
        assert!(verify_basic(&config, &encoded));
        assert!(!verify_basic(&config, &STANDARD.encode("alice:wrong")));
    }

    #[test]
    fn digest_round_trips() {
        let config = config();
        let nonce = Nonce::new();
        let ha1 = md5_hex("alice:streamer:secret");
        let ha2 = md5_hex("PLAY:rtsp://host/a.mp4");
        let response = md5_hex(&format!("{ha1}:{}:{ha2}", nonce.as_str()));
        let header = format!(
            "Digest username=\"alice\", realm=\"streamer\", nonce=\"{}\", uri=\"rtsp://host/a.mp4\", response=\"{response}\"",
            nonce.as_str(),
        );
        assert!(config.verify(&header, "PLAY", &nonce));
    }

    #[test]
    fn digest_rejects_stale_nonce() {
        let config = config();
        let nonce = Nonce::new();
        let stale = Nonce::new();
        let ha1 = md5_hex("alice:streamer:secret");
        let ha2 = md5_hex("PLAY:rtsp://host/a.mp4");
        let response = md5_hex(&format!("{ha1}:{}:{ha2}", stale.as_str()));
        let header = format!(
            "Digest username=\"alice\", realm=\"streamer\", nonce=\"{}\", uri=\"rtsp://host/a.mp4\", response=\"{response}\"",
            stale.as_str(),
        );
        assert!(!config.verify(&header, "PLAY", &nonce));
    }

    #[test]
    fn challenges_list_both_enabled_schemes() {
        let config = config();
        let nonce = Nonce::new();
        let challenges = config.challenges(&nonce);
        assert_eq!(challenges.len(), 2);
        assert!(challenges[0].starts_with("Basic realm="));
        assert!(challenges[1].starts_with("Digest realm="));
    }
}
