//! Response and grant type enums.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Value of the `response_type` parameter at the authorize endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthorizeRequestType {
    /// Authorization code flow.
    Code,
    /// Implicit flow: the access token is issued directly.
    Token,
    /// Direct login: records an SSO session without a code.
    Login,
}

impl AuthorizeRequestType {
    /// Returns the wire value.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Code => "code",
            Self::Token => "token",
            Self::Login => "login",
        }
    }

    /// Parses a wire value.
    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "code" => Some(Self::Code),
            "token" => Some(Self::Token),
            "login" => Some(Self::Login),
            _ => None,
        }
    }
}

impl fmt::Display for AuthorizeRequestType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Value of the `grant_type` parameter at the token endpoint.
///
/// `Password`, `ClientCredentials` and `Assertion` are recognised but never
/// executed; requests using them fail with `unsupported_grant_type`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AccessRequestType {
    /// Exchange an authorization code.
    AuthorizationCode,
    /// Exchange a refresh token.
    RefreshToken,
    /// Resource owner password credentials.
    Password,
    /// Client credentials.
    ClientCredentials,
    /// JWT or SAML assertion.
    Assertion,
    /// Token issued straight from the authorize endpoint.
    Implicit,
}

impl AccessRequestType {
    /// Returns the wire value.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::AuthorizationCode => "authorization_code",
            Self::RefreshToken => "refresh_token",
            Self::Password => "password",
            Self::ClientCredentials => "client_credentials",
            Self::Assertion => "assertion",
            Self::Implicit => "__implicit",
        }
    }

    /// Parses a wire value. The implicit pseudo-grant cannot be requested.
    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "authorization_code" => Some(Self::AuthorizationCode),
            "refresh_token" => Some(Self::RefreshToken),
            "password" => Some(Self::Password),
            "client_credentials" => Some(Self::ClientCredentials),
            "assertion" => Some(Self::Assertion),
            _ => None,
        }
    }
}

impl fmt::Display for AccessRequestType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_round_trips_wire_values() {
        for ty in [
            AuthorizeRequestType::Code,
            AuthorizeRequestType::Token,
            AuthorizeRequestType::Login,
        ] {
            assert_eq!(AuthorizeRequestType::parse(ty.as_str()), Some(ty));
        }
        assert_eq!(AuthorizeRequestType::parse("id_token"), None);
    }

    #[test]
    fn implicit_is_not_requestable() {
        assert_eq!(AccessRequestType::parse("__implicit"), None);
        assert_eq!(AccessRequestType::parse("implicit"), None);
        assert_eq!(
            AccessRequestType::parse("client_credentials"),
            Some(AccessRequestType::ClientCredentials)
        );
    }
}
