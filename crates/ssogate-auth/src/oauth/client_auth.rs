//! Client credentials presented at the token endpoint.

use base64::Engine;
use base64::engine::general_purpose::STANDARD;

/// Client id and secret, from HTTP Basic or from body parameters.
#[derive(Clone, PartialEq, Eq)]
pub struct ClientAuth {
    /// Client identifier.
    pub client_id: String,
    /// Client secret.
    pub client_secret: String,
}

impl std::fmt::Debug for ClientAuth {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientAuth")
            .field("client_id", &self.client_id)
            .field("client_secret", &"<redacted>")
            .finish()
    }
}

impl ClientAuth {
    /// Creates credentials from explicit values.
    #[must_use]
    pub fn new(client_id: impl Into<String>, client_secret: impl Into<String>) -> Self {
        Self {
            client_id: client_id.into(),
            client_secret: client_secret.into(),
        }
    }

    /// Parses an `Authorization: Basic ...` header value.
    ///
    /// Both parts are percent-decoded as RFC 6749 §2.3.1 requires.
    #[must_use]
    pub fn from_basic_header(header_value: &str) -> Option<Self> {
        let encoded = header_value.trim().strip_prefix("Basic ")?;
        let decoded = STANDARD.decode(encoded.trim()).ok()?;
        let credentials = String::from_utf8(decoded).ok()?;

        // Split on first colon (secret may contain colons)
        let (client_id, client_secret) = credentials.split_once(':')?;
        let client_id = urlencoding::decode(client_id).ok()?;
        let client_secret = urlencoding::decode(client_secret).ok()?;

        Some(Self::new(client_id, client_secret))
    }
}
