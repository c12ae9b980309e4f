//! Serialized record shapes stored under each key family.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use ssogate_auth::AccessData;

use crate::expiry::TokenSet;

/// Per-uid login metadata kept on the parent session.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserMetadata {
    pub ctime: i64,
    #[serde(default)]
    pub platform: String,
    #[serde(default)]
    pub client_ip: String,
    #[serde(default)]
    pub user_agent: String,
}

/// One SSO login. Sub sessions hang off it, user indexes point to it.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ParentSession {
    pub ctime: i64,
    /// Lifetime the session is renewed to.
    pub expires_in: i64,
    /// Absolute expiry of the record. Never decreases while live.
    pub expires_at: i64,
    /// Uids logged in, first is the primary account.
    #[serde(default)]
    pub uids: Vec<i64>,
    #[serde(default)]
    pub users: BTreeMap<i64, UserMetadata>,
    /// Access tokens issued under this session.
    #[serde(default)]
    pub sub_sessions: TokenSet,
    /// Set once the session has been removed. The record lingers for the
    /// grace period only.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub revoked: bool,
}

impl ParentSession {
    /// Whether the session can still resolve tokens at `now`.
    #[must_use]
    pub fn is_live_at(&self, now: i64) -> bool {
        !self.revoked && self.expires_at > now
    }

    #[must_use]
    pub fn primary_uid(&self) -> Option<i64> {
        self.uids.first().copied()
    }
}

/// Uid to parent sessions.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UserIndex {
    pub ctime: i64,
    pub expires_at: i64,
    #[serde(default)]
    pub parent_sessions: TokenSet,
}

/// What was issued for a sub session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AccessSnapshot {
    pub client_id: String,
    pub access_token: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
    /// Access token this one replaced on refresh.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub previous_token: Option<String>,
    /// Authorization code it was exchanged for.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub authorize_code: Option<String>,
    pub scope: String,
    pub redirect_uri: String,
    pub expires_in: i64,
    /// Unix seconds at issue.
    pub ctime: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_data: Option<serde_json::Value>,
}

impl AccessSnapshot {
    pub fn from_access(data: &AccessData) -> Self {
        Self {
            client_id: data.client.id.clone(),
            access_token: data.access_token.clone(),
            refresh_token: data.refresh_token.clone(),
            previous_token: data.previous_access_token().map(str::to_string),
            authorize_code: data
                .authorize_code()
                .filter(|code| !code.is_empty())
                .map(str::to_string),
            scope: data.scope.clone(),
            redirect_uri: data.redirect_uri.clone(),
            expires_in: data.expires_in,
            ctime: data.created_at.unix_timestamp(),
            user_data: data.user_data.clone(),
        }
    }
}

/// One access token under a parent session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubSession {
    pub ctime: i64,
    pub parent_token: String,
    pub client_id: String,
    #[serde(default)]
    pub client_ip: String,
    #[serde(default)]
    pub user_agent: String,
    pub access: AccessSnapshot,
}

/// Refresh token pointing back at its access token and parent session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RefreshRecord {
    pub parent_token: String,
    #[serde(default)]
    pub client_ip: String,
    #[serde(default)]
    pub user_agent: String,
    pub access: AccessSnapshot,
}

/// A record together with the remaining TTL of its key.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordView<T> {
    pub record: T,
    /// Seconds left, `None` when the key has no expiry.
    pub ttl: Option<i64>,
}
