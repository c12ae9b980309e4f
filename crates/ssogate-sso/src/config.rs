//! SSO configuration.
//!
//! Key naming lives in [`SsoConfig`], built once at startup and passed to the
//! hierarchy. Nothing here is global.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Settings for the SSO token hierarchy.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct SsoConfig {
    /// Allow one parent session to carry several uids.
    pub enable_multiple_accounts: bool,

    /// TTL applied to soft-deleted sessions.
    #[serde(with = "humantime_serde")]
    pub grace_period: Duration,

    /// Key prefixes for every record family.
    pub keys: KeyScheme,
}

impl Default for SsoConfig {
    fn default() -> Self {
        Self {
            enable_multiple_accounts: false,
            grace_period: Duration::from_secs(30),
            keys: KeyScheme::default(),
        }
    }
}

impl SsoConfig {
    /// Grace period in whole seconds (at least one).
    #[must_use]
    pub fn grace_secs(&self) -> i64 {
        i64::try_from(self.grace_period.as_secs()).unwrap_or(i64::MAX).max(1)
    }
}

/// Key prefixes. A record key is its prefix followed by its identifier.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct KeyScheme {
    /// User index, keyed by uid.
    pub user_index: String,
    /// Parent session, keyed by parent token.
    pub parent_session: String,
    /// Sub session, keyed by access token.
    pub sub_session: String,
    /// Refresh record, keyed by refresh token.
    pub refresh: String,
    /// Authorization code record.
    pub authorize: String,
    /// Client directory entry, keyed by client id.
    pub client: String,
}

impl Default for KeyScheme {
    fn default() -> Self {
        Self {
            user_index: "sso:uid:".to_string(),
            parent_session: "sso:ptk:".to_string(),
            sub_session: "sso:stk:".to_string(),
            refresh: "sso:rtk:".to_string(),
            authorize: "sso:auth:".to_string(),
            client: "sso:client:".to_string(),
        }
    }
}

impl KeyScheme {
    #[must_use]
    pub fn user_index(&self, uid: i64) -> String {
        format!("{}{uid}", self.user_index)
    }

    #[must_use]
    pub fn parent_session(&self, token: &str) -> String {
        format!("{}{token}", self.parent_session)
    }

    #[must_use]
    pub fn sub_session(&self, token: &str) -> String {
        format!("{}{token}", self.sub_session)
    }

    #[must_use]
    pub fn refresh(&self, token: &str) -> String {
        format!("{}{token}", self.refresh)
    }

    #[must_use]
    pub fn authorize(&self, code: &str) -> String {
        format!("{}{code}", self.authorize)
    }

    #[must_use]
    pub fn client(&self, client_id: &str) -> String {
        format!("{}{client_id}", self.client)
    }
}

/// Redis connection settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RedisConfig {
    /// Use Redis. When disabled the in-memory store is used.
    pub enabled: bool,

    /// Redis connection URL (e.g., "redis://localhost:6379")
    pub url: String,

    /// Connection pool size
    pub pool_size: usize,

    /// Connection timeout in milliseconds
    pub timeout_ms: u64,
}

impl Default for RedisConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            url: "redis://localhost:6379".to_string(),
            pool_size: 10,
            timeout_ms: 5000,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_keys() {
        let keys = KeyScheme::default();
        assert_eq!(keys.user_index(42), "sso:uid:42");
        assert_eq!(keys.parent_session("p"), "sso:ptk:p");
        assert_eq!(keys.sub_session("s"), "sso:stk:s");
        assert_eq!(keys.client("1234"), "sso:client:1234");
    }

    #[test]
    fn grace_has_floor() {
        let config = SsoConfig {
            grace_period: Duration::ZERO,
            ..Default::default()
        };
        assert_eq!(config.grace_secs(), 1);
        assert_eq!(SsoConfig::default().grace_secs(), 30);
    }

    #[test]
    fn custom_prefixes_deserialize() {
        let config: SsoConfig = serde_json::from_str(
            r#"{"enable_multiple_accounts": true, "grace_period": "45s", "keys": {"user_index": "u:"}}"#,
        )
        .unwrap();
        assert!(config.enable_multiple_accounts);
        assert_eq!(config.grace_secs(), 45);
        assert_eq!(config.keys.user_index(1), "u:1");
        assert_eq!(config.keys.parent_session("x"), "sso:ptk:x");
    }
}
