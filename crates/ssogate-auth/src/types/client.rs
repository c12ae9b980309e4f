//! Registered client as seen by the engines.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// A client registration.
///
/// `redirect_uri` may hold several URIs joined by the configured separator.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Client {
    /// Client identifier.
    pub id: String,
    /// Shared secret. Empty for public clients.
    #[serde(default)]
    pub secret: String,
    /// Whitelisted redirect URI(s).
    #[serde(default)]
    pub redirect_uri: String,
    /// Opaque data attached by the directory.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_data: Option<serde_json::Value>,
}

impl Client {
    /// Creates a client registration.
    #[must_use]
    pub fn new(
        id: impl Into<String>,
        secret: impl Into<String>,
        redirect_uri: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            secret: secret.into(),
            redirect_uri: redirect_uri.into(),
            user_data: None,
        }
    }

    /// Attaches opaque user data.
    #[must_use]
    pub fn with_user_data(mut self, user_data: serde_json::Value) -> Self {
        self.user_data = Some(user_data);
        self
    }

    /// Returns `true` if the client has no secret.
    #[must_use]
    pub fn is_public(&self) -> bool {
        self.secret.is_empty()
    }

    /// Compares `secret` with the registered secret.
    ///
    /// Both sides are hashed first so the comparison time does not depend on
    /// the length of a matching prefix.
    #[must_use]
    pub fn check_secret(&self, secret: &str) -> bool {
        let expected = Sha256::digest(self.secret.as_bytes());
        let provided = Sha256::digest(secret.as_bytes());
        expected
            .iter()
            .zip(provided.iter())
            .fold(0u8, |acc, (a, b)| acc | (a ^ b))
            == 0
    }
}
