//! Persisted authorization codes and the SSO session staged with them.

use serde::{Deserialize, Serialize};
use time::{Duration, OffsetDateTime};

use super::client::Client;
use super::token::Token;
use crate::oauth::pkce::PkceChallengeMethod;

/// SSO parent session established by an approved CODE, TOKEN or LOGIN request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SsoData {
    /// Parent token, either fresh or reused from an active session.
    pub parent_token: Token,
    /// Authenticated user.
    pub uid: i64,
    /// Platform label supplied by the front door (e.g. `web`).
    #[serde(default)]
    pub platform: String,
    /// Client IP at login.
    #[serde(default)]
    pub client_ip: String,
    /// User agent at login.
    #[serde(default)]
    pub user_agent: String,
    /// Unix seconds when the session data was staged.
    pub ctime: i64,
}

/// A short-lived authorization code.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuthorizeData {
    /// Client the code was issued to.
    pub client: Client,
    /// The code itself. Empty for LOGIN requests.
    pub code: String,
    /// Lifetime in seconds.
    pub expires_in: i64,
    /// Lifetime of the parent token staged with this code.
    pub parent_token_expires_in: i64,
    /// Granted scope.
    pub scope: String,
    /// Redirect URI the code was issued for.
    pub redirect_uri: String,
    /// Opaque client state.
    pub state: String,
    /// Issue time.
    #[serde(with = "time::serde::timestamp")]
    pub created_at: OffsetDateTime,
    /// Data attached by the caller at approval.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_data: Option<serde_json::Value>,
    /// PKCE challenge.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code_challenge: Option<String>,
    /// PKCE challenge method.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code_challenge_method: Option<PkceChallengeMethod>,
    /// SSO session staged at approval.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sso_data: Option<SsoData>,
}

impl AuthorizeData {
    /// Instant after which the code is no longer valid.
    #[must_use]
    pub fn expire_at(&self) -> OffsetDateTime {
        self.created_at + Duration::seconds(self.expires_in)
    }

    /// Returns `true` iff `at >= created_at + expires_in`.
    #[must_use]
    pub fn is_expired_at(&self, at: OffsetDateTime) -> bool {
        at >= self.expire_at()
    }

    /// Returns `true` if the code has expired by now.
    #[must_use]
    pub fn is_expired(&self) -> bool {
        self.is_expired_at(OffsetDateTime::now_utc())
    }

    /// Uid of the staged SSO session, if any.
    #[must_use]
    pub fn uid(&self) -> Option<i64> {
        self.sso_data.as_ref().map(|sso| sso.uid)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn data(created_at: OffsetDateTime, expires_in: i64) -> AuthorizeData {
        AuthorizeData {
            client: Client::new("1234", "aabbccdd", "http://localhost/cb"),
            code: "code".to_string(),
            expires_in,
            parent_token_expires_in: 0,
            scope: String::new(),
            redirect_uri: "http://localhost/cb".to_string(),
            state: String::new(),
            created_at,
            user_data: None,
            code_challenge: None,
            code_challenge_method: None,
            sso_data: None,
        }
    }

    #[test]
    fn expiry_is_inclusive_at_boundary() {
        let created = OffsetDateTime::from_unix_timestamp(1_700_000_000).unwrap();
        let data = data(created, 300);

        assert!(!data.is_expired_at(created));
        assert!(!data.is_expired_at(created + Duration::seconds(299)));
        assert!(data.is_expired_at(created + Duration::seconds(300)));
        assert!(data.is_expired_at(created + Duration::seconds(301)));
    }

    #[test]
    fn zero_lifetime_is_immediately_expired() {
        let created = OffsetDateTime::from_unix_timestamp(1_700_000_000).unwrap();
        assert!(data(created, 0).is_expired_at(created));
    }
}
