//! `boxfile-common`: the shared error type, base62 id/nonce generation, and
//! media request-path parsing used across the streaming crates.

pub mod error;
pub mod ids;
pub mod paths;

pub use error::{Error, Result};
pub use ids::{Nonce, SessionId};
pub use paths::{handler_type_label, parse_media_request, MediaRequest};
