//! Persisted access tokens and their lineage.

use serde::{Deserialize, Serialize};
use time::{Duration, OffsetDateTime};

use super::authorize::AuthorizeData;
use super::client::Client;

/// What an access token was issued in exchange for.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind", content = "data")]
pub enum Lineage {
    /// Implicit grant, or a record loaded without its predecessor.
    #[default]
    None,
    /// Issued for an authorization code.
    Authorize(Box<AuthorizeData>),
    /// Issued by refreshing a previous access token.
    Access(Box<AccessData>),
}

/// An issued access token, optionally paired with a refresh token.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AccessData {
    /// Client the token was issued to.
    pub client: Client,
    /// The access token.
    pub access_token: String,
    /// The refresh token, if one was issued.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
    /// Lifetime of the access token in seconds.
    pub expires_in: i64,
    /// Granted scope.
    pub scope: String,
    /// Redirect URI of the originating request.
    pub redirect_uri: String,
    /// Issue time.
    #[serde(with = "time::serde::timestamp")]
    pub created_at: OffsetDateTime,
    /// Data attached by the caller at approval.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_data: Option<serde_json::Value>,
    /// Predecessor code or access token.
    #[serde(default)]
    pub lineage: Lineage,
    /// SSO parent session this token belongs to.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_token: Option<String>,
    /// Client IP of the token request.
    #[serde(default)]
    pub client_ip: String,
    /// User agent of the token request.
    #[serde(default)]
    pub user_agent: String,
}

impl AccessData {
    /// Instant after which the access token is no longer valid.
    #[must_use]
    pub fn expire_at(&self) -> OffsetDateTime {
        self.created_at + Duration::seconds(self.expires_in)
    }

    /// Returns `true` iff `at >= created_at + expires_in`.
    #[must_use]
    pub fn is_expired_at(&self, at: OffsetDateTime) -> bool {
        at >= self.expire_at()
    }

    /// Returns `true` if the access token has expired by now.
    #[must_use]
    pub fn is_expired(&self) -> bool {
        self.is_expired_at(OffsetDateTime::now_utc())
    }

    /// The predecessor authorization, for code-flow tokens.
    #[must_use]
    pub fn authorize_data(&self) -> Option<&AuthorizeData> {
        match &self.lineage {
            Lineage::Authorize(data) => Some(data),
            _ => None,
        }
    }

    /// The predecessor access token, for refreshed tokens.
    #[must_use]
    pub fn previous_access(&self) -> Option<&AccessData> {
        match &self.lineage {
            Lineage::Access(data) => Some(data),
            _ => None,
        }
    }

    /// Code this token was exchanged for, if known.
    #[must_use]
    pub fn authorize_code(&self) -> Option<&str> {
        self.authorize_data().map(|data| data.code.as_str())
    }

    /// Access token this token replaced, if known.
    #[must_use]
    pub fn previous_access_token(&self) -> Option<&str> {
        self.previous_access().map(|data| data.access_token.as_str())
    }

    /// Copy of this record without its lineage, used when it becomes a
    /// predecessor itself so chains do not grow without bound.
    #[must_use]
    pub fn detached(&self) -> Self {
        Self {
            lineage: Lineage::None,
            ..self.clone()
        }
    }
}
