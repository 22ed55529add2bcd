//! Base62 token generation: RTSP session ids and Digest nonces, the two
//! short opaque identifiers the wire protocols hand out (§4.6).

use rand::Rng;

const ALPHABET: &[u8] = b"0123456789ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz";

/// A random base62 string of `len` characters.
pub fn base62(len: usize) -> String {
    let mut rng = rand::thread_rng();
    (0..len)
        .map(|_| ALPHABET[rng.gen_range(0..ALPHABET.len())] as char)
        .collect()
}

/// An RTSP session id: 16 base62 characters, minted once on `SETUP`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SessionId(String);

impl SessionId {
    #[must_use]
    pub fn new() -> Self {
        Self(base62(16))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl From<String> for SessionId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A Digest (RFC 2617) auth nonce: 10 base62 characters, minted per session.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Nonce(String);

impl Nonce {
    #[must_use]
    pub fn new() -> Self {
        Self(base62(10))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for Nonce {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for Nonce {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn base62_has_requested_length_and_alphabet() {
        let s = base62(16);
        assert_eq!(s.len(), 16);
        assert!(s.chars().all(|c| c.is_ascii_alphanumeric()));
    }

    #[test]
    fn session_id_is_sixteen_chars() {
        let id = SessionId::new();
        assert_eq!(id.as_str().len(), 16);
    }

    #[test]
    fn nonce_is_ten_chars() {
        let n = Nonce::new();
        assert_eq!(n.as_str().len(), 10);
    }

    #[test]
    fn generated_ids_differ() {
        assert_ne!(SessionId::new(), SessionId::new());
        assert_ne!(Nonce::new(), Nonce::new());
    }
}
