//! Opaque token primitive.

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use rand::RngCore;
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

/// Number of random bytes behind every generated token (256 bits).
const TOKEN_BYTES: usize = 32;

/// An unguessable token string with its issue time and lifetime.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Token {
    /// URL-safe, unpadded base64 of random bytes.
    pub token: String,
    /// Unix seconds at issue.
    pub auth_at: i64,
    /// Lifetime in seconds.
    pub expires_in: i64,
}

impl Token {
    /// Generates a fresh token valid for `expires_in` seconds from now.
    #[must_use]
    pub fn new(expires_in: i64) -> Self {
        Self {
            token: generate_token(),
            auth_at: now_unix(),
            expires_in,
        }
    }

    /// Wraps an existing token string, stamping it as issued now.
    #[must_use]
    pub fn from_existing(token: impl Into<String>, expires_in: i64) -> Self {
        Self {
            token: token.into(),
            auth_at: now_unix(),
            expires_in,
        }
    }

    /// Absolute expiry in Unix seconds.
    #[must_use]
    pub fn expires_at(&self) -> i64 {
        self.auth_at.saturating_add(self.expires_in)
    }

    /// Returns `true` once `now` has reached the expiry instant.
    #[must_use]
    pub fn is_expired_at(&self, now: i64) -> bool {
        now >= self.expires_at()
    }
}

/// Generates a random, URL-safe, unpadded base64 token.
#[must_use]
pub fn generate_token() -> String {
    let mut bytes = [0u8; TOKEN_BYTES];
    rand::thread_rng().fill_bytes(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}

/// Current time in Unix seconds.
#[must_use]
pub fn now_unix() -> i64 {
    OffsetDateTime::now_utc().unix_timestamp()
}
