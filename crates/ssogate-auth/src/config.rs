//! Engine configuration.
//!
//! [`OAuthServerConfig`] is constructed once at startup and shared by every
//! request the engines handle. All durations accept humantime strings.
//!
//! # Example (TOML)
//!
//! ```toml
//! [oauth]
//! authorization_expiration = "5m"
//! access_expiration = "1d"
//! parent_token_expiration = "30d"
//! allowed_authorize_types = ["code", "token", "login"]
//! redirect_uri_separator = ","
//! ```

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::types::{AccessRequestType, AuthorizeRequestType};

/// Settings for the authorize and access engines.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct OAuthServerConfig {
    /// Lifetime of authorization codes.
    #[serde(with = "humantime_serde")]
    pub authorization_expiration: Duration,

    /// Lifetime of access tokens (and of LOGIN requests).
    #[serde(with = "humantime_serde")]
    pub access_expiration: Duration,

    /// Lifetime of freshly created SSO parent tokens.
    #[serde(with = "humantime_serde")]
    pub parent_token_expiration: Duration,

    /// Refresh tokens older than this are rejected.
    #[serde(with = "humantime_serde")]
    pub refresh_token_expiration: Duration,

    /// Value of the `token_type` output.
    pub token_type: String,

    /// Response types accepted at the authorize endpoint.
    pub allowed_authorize_types: Vec<AuthorizeRequestType>,

    /// Grant types accepted at the token endpoint.
    pub allowed_access_types: Vec<AccessRequestType>,

    /// Accept `client_id`/`client_secret` as body parameters.
    pub allow_client_secret_in_params: bool,

    /// Accept token requests sent with GET.
    pub allow_get_access_request: bool,

    /// Require a PKCE challenge from clients without a secret.
    pub require_pkce_for_public_clients: bool,

    /// Separator between multiple redirect URIs registered for one client.
    /// Empty means a client has exactly one redirect URI.
    pub redirect_uri_separator: String,

    /// Issue refresh tokens for non-implicit grants.
    pub generate_refresh: bool,

    /// Keep the previous access token alive after a refresh.
    pub retain_token_after_refresh: bool,

    /// Log every inbound authorize and access request.
    pub log_requests: bool,
}

impl Default for OAuthServerConfig {
    fn default() -> Self {
        Self {
            authorization_expiration: Duration::from_secs(300),
            access_expiration: Duration::from_secs(86_400),
            parent_token_expiration: Duration::from_secs(30 * 86_400),
            refresh_token_expiration: Duration::from_secs(30 * 86_400),
            token_type: "Bearer".to_string(),
            allowed_authorize_types: vec![AuthorizeRequestType::Code, AuthorizeRequestType::Login],
            allowed_access_types: vec![
                AccessRequestType::AuthorizationCode,
                AccessRequestType::RefreshToken,
            ],
            allow_client_secret_in_params: true,
            allow_get_access_request: false,
            require_pkce_for_public_clients: false,
            redirect_uri_separator: String::new(),
            generate_refresh: true,
            retain_token_after_refresh: false,
            log_requests: false,
        }
    }
}

/// Configuration validation errors.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ConfigError {
    /// An invalid configuration value was provided.
    #[error("Invalid configuration value: {0}")]
    InvalidValue(String),

    /// A required configuration value is missing.
    #[error("Missing required configuration: {0}")]
    Missing(String),
}

impl OAuthServerConfig {
    /// Validates the configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if a lifetime is zero, the token type is empty, or no
    /// response/grant type is enabled.
    pub fn validate(&self) -> Result<(), ConfigError> {
        for (name, value) in [
            ("authorization_expiration", self.authorization_expiration),
            ("access_expiration", self.access_expiration),
            ("parent_token_expiration", self.parent_token_expiration),
            ("refresh_token_expiration", self.refresh_token_expiration),
        ] {
            if value.as_secs() == 0 {
                return Err(ConfigError::InvalidValue(format!(
                    "{name} must be at least one second"
                )));
            }
        }

        if self.token_type.trim().is_empty() {
            return Err(ConfigError::Missing("token_type".to_string()));
        }

        if self.allowed_authorize_types.is_empty() {
            return Err(ConfigError::InvalidValue(
                "allowed_authorize_types cannot be empty".to_string(),
            ));
        }

        if self.allowed_access_types.is_empty() {
            return Err(ConfigError::InvalidValue(
                "allowed_access_types cannot be empty".to_string(),
            ));
        }

        Ok(())
    }

    /// Authorization code lifetime in seconds.
    #[must_use]
    pub fn authorization_expiration_secs(&self) -> i64 {
        secs(self.authorization_expiration)
    }

    /// Access token lifetime in seconds.
    #[must_use]
    pub fn access_expiration_secs(&self) -> i64 {
        secs(self.access_expiration)
    }

    /// Parent token lifetime in seconds.
    #[must_use]
    pub fn parent_token_expiration_secs(&self) -> i64 {
        secs(self.parent_token_expiration)
    }

    /// Refresh token lifetime in seconds.
    #[must_use]
    pub fn refresh_token_expiration_secs(&self) -> i64 {
        secs(self.refresh_token_expiration)
    }
}

fn secs(duration: Duration) -> i64 {
    i64::try_from(duration.as_secs()).unwrap_or(i64::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let config = OAuthServerConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.authorization_expiration_secs(), 300);
        assert_eq!(config.access_expiration_secs(), 86_400);
        assert_eq!(config.parent_token_expiration_secs(), 2_592_000);
        assert_eq!(config.token_type, "Bearer");
        assert!(config.allow_client_secret_in_params);
        assert!(!config.allow_get_access_request);
    }

    #[test]
    fn zero_lifetime_rejected() {
        let config = OAuthServerConfig {
            access_expiration: Duration::ZERO,
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(ConfigError::InvalidValue(_))));
    }

    #[test]
    fn deserializes_humantime_and_types() {
        let json = r#"{
            "authorization_expiration": "10m",
            "allowed_authorize_types": ["code", "token"],
            "allowed_access_types": ["authorization_code"]
        }"#;
        let config: OAuthServerConfig = serde_json::from_str(json).unwrap();
        assert_eq!(config.authorization_expiration_secs(), 600);
        assert_eq!(
            config.allowed_authorize_types,
            vec![AuthorizeRequestType::Code, AuthorizeRequestType::Token]
        );
        assert_eq!(config.token_type, "Bearer");
    }
}
