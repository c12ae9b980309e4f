//! Error types for the authorization engines and their storage backends.
//!
//! Two layers live here:
//!
//! - [`AuthError`] is returned by storage backends and SSO bookkeeping. It
//!   carries enough context (operation, key) to diagnose a failure.
//! - [`OAuthError`] is what a request's error slot holds. It pairs a stable
//!   [`ErrorCode`] from RFC 6749 with a human-readable description and keeps
//!   the underlying [`AuthError`] as its source.

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

/// Result alias used by storage backends.
pub type AuthResult<T> = Result<T, AuthError>;

// =============================================================================
// Storage / Bookkeeping Errors
// =============================================================================

/// Errors raised by storage backends and session bookkeeping.
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    /// The requested record does not exist (or is no longer resolvable).
    #[error("Not found: {what}")]
    NotFound {
        /// What was looked up.
        what: String,
    },

    /// The record exists but its lifetime has elapsed.
    #[error("Expired: {what}")]
    Expired {
        /// What expired.
        what: String,
    },

    /// The backing store failed.
    #[error("Storage error during {operation} ({key}): {message}")]
    Storage {
        /// Operation being performed, e.g. `save_access`.
        operation: String,
        /// Key or identifier involved.
        key: String,
        /// Underlying failure.
        message: String,
    },

    /// A stored record could not be encoded or decoded.
    #[error("Serialization error: {message}")]
    Serialization {
        /// Description of the failure.
        message: String,
    },

    /// The caller handed over data that cannot be stored.
    #[error("Invalid input: {message}")]
    InvalidInput {
        /// Description of the problem.
        message: String,
    },

    /// Misconfiguration detected at runtime.
    #[error("Configuration error: {message}")]
    Configuration {
        /// Description of the configuration problem.
        message: String,
    },

    /// Anything else.
    #[error("Internal error: {message}")]
    Internal {
        /// Description of the failure.
        message: String,
    },
}

impl AuthError {
    // -------------------------------------------------------------------------
    // Constructor Methods
    // -------------------------------------------------------------------------

    /// Creates a `NotFound` error.
    #[must_use]
    pub fn not_found(what: impl Into<String>) -> Self {
        Self::NotFound { what: what.into() }
    }

    /// Creates an `Expired` error.
    #[must_use]
    pub fn expired(what: impl Into<String>) -> Self {
        Self::Expired { what: what.into() }
    }

    /// Creates a `Storage` error with operation and key context.
    #[must_use]
    pub fn storage(
        operation: impl Into<String>,
        key: impl Into<String>,
        message: impl fmt::Display,
    ) -> Self {
        Self::Storage {
            operation: operation.into(),
            key: key.into(),
            message: message.to_string(),
        }
    }

    /// Creates a `Serialization` error.
    #[must_use]
    pub fn serialization(message: impl fmt::Display) -> Self {
        Self::Serialization {
            message: message.to_string(),
        }
    }

    /// Creates an `InvalidInput` error.
    #[must_use]
    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::InvalidInput {
            message: message.into(),
        }
    }

    /// Creates a `Configuration` error.
    #[must_use]
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    /// Creates an `Internal` error.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    // -------------------------------------------------------------------------
    // Predicate Methods
    // -------------------------------------------------------------------------

    /// Returns `true` for `NotFound`.
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    /// Returns `true` for `Expired`.
    #[must_use]
    pub fn is_expired(&self) -> bool {
        matches!(self, Self::Expired { .. })
    }

    /// Returns `true` when the caller asked for something that is not there
    /// (missing or expired), as opposed to an infrastructure failure.
    #[must_use]
    pub fn is_lookup_miss(&self) -> bool {
        self.is_not_found() || self.is_expired()
    }

    /// Returns the category of this error.
    #[must_use]
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::NotFound { .. } | Self::Expired { .. } => ErrorCategory::Lookup,
            Self::InvalidInput { .. } => ErrorCategory::Validation,
            Self::Storage { .. } | Self::Serialization { .. } => ErrorCategory::Infrastructure,
            Self::Configuration { .. } => ErrorCategory::Configuration,
            Self::Internal { .. } => ErrorCategory::Internal,
        }
    }
}

/// Coarse classification of [`AuthError`] for logging and metrics labels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCategory {
    /// Missing or expired records.
    Lookup,
    /// Rejected input.
    Validation,
    /// Store or codec failures.
    Infrastructure,
    /// Configuration errors.
    Configuration,
    /// Internal errors.
    Internal,
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Lookup => write!(f, "lookup"),
            Self::Validation => write!(f, "validation"),
            Self::Infrastructure => write!(f, "infrastructure"),
            Self::Configuration => write!(f, "configuration"),
            Self::Internal => write!(f, "internal"),
        }
    }
}

impl From<serde_json::Error> for AuthError {
    fn from(err: serde_json::Error) -> Self {
        Self::serialization(err)
    }
}

// =============================================================================
// Protocol Errors
// =============================================================================

/// RFC 6749 error codes surfaced by the authorize and token endpoints.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    /// The request is missing a parameter or is otherwise malformed.
    InvalidRequest,
    /// The client is unknown, misconfigured or failed authentication.
    UnauthorizedClient,
    /// The resource owner or server denied the request.
    AccessDenied,
    /// The response type is not enabled.
    UnsupportedResponseType,
    /// The grant type is not enabled.
    UnsupportedGrantType,
    /// The code or refresh token is invalid, expired or bound elsewhere.
    InvalidGrant,
    /// The requested scope exceeds what was granted.
    InvalidScope,
    /// Unexpected condition, typically a storage failure.
    ServerError,
}

impl ErrorCode {
    /// Returns the wire representation of this code.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::InvalidRequest => "invalid_request",
            Self::UnauthorizedClient => "unauthorized_client",
            Self::AccessDenied => "access_denied",
            Self::UnsupportedResponseType => "unsupported_response_type",
            Self::UnsupportedGrantType => "unsupported_grant_type",
            Self::InvalidGrant => "invalid_grant",
            Self::InvalidScope => "invalid_scope",
            Self::ServerError => "server_error",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error recorded in a request's error slot.
///
/// Cloning is cheap; every `build` call on a failed request hands back a clone
/// of the first error recorded.
#[derive(Debug, Clone, thiserror::Error)]
#[error("{code}: {description}")]
pub struct OAuthError {
    /// Stable error kind.
    pub code: ErrorCode,
    /// Human-readable detail.
    pub description: String,
    /// Underlying storage failure, if any.
    #[source]
    pub cause: Option<Arc<AuthError>>,
}

impl OAuthError {
    /// Creates an error with no underlying cause.
    #[must_use]
    pub fn new(code: ErrorCode, description: impl Into<String>) -> Self {
        Self {
            code,
            description: description.into(),
            cause: None,
        }
    }

    /// Attaches the storage failure that triggered this error.
    #[must_use]
    pub fn with_cause(mut self, cause: AuthError) -> Self {
        self.cause = Some(Arc::new(cause));
        self
    }

    // -------------------------------------------------------------------------
    // Constructor Methods
    // -------------------------------------------------------------------------

    /// Creates an `invalid_request` error.
    #[must_use]
    pub fn invalid_request(description: impl Into<String>) -> Self {
        Self::new(ErrorCode::InvalidRequest, description)
    }

    /// Creates an `unauthorized_client` error.
    #[must_use]
    pub fn unauthorized_client(description: impl Into<String>) -> Self {
        Self::new(ErrorCode::UnauthorizedClient, description)
    }

    /// Creates an `access_denied` error.
    #[must_use]
    pub fn access_denied(description: impl Into<String>) -> Self {
        Self::new(ErrorCode::AccessDenied, description)
    }

    /// Creates an `unsupported_response_type` error.
    #[must_use]
    pub fn unsupported_response_type(description: impl Into<String>) -> Self {
        Self::new(ErrorCode::UnsupportedResponseType, description)
    }

    /// Creates an `unsupported_grant_type` error.
    #[must_use]
    pub fn unsupported_grant_type(description: impl Into<String>) -> Self {
        Self::new(ErrorCode::UnsupportedGrantType, description)
    }

    /// Creates an `invalid_grant` error.
    #[must_use]
    pub fn invalid_grant(description: impl Into<String>) -> Self {
        Self::new(ErrorCode::InvalidGrant, description)
    }

    /// Creates an `invalid_scope` error.
    #[must_use]
    pub fn invalid_scope(description: impl Into<String>) -> Self {
        Self::new(ErrorCode::InvalidScope, description)
    }

    /// Creates a `server_error` wrapping a storage failure.
    #[must_use]
    pub fn server_error(description: impl Into<String>, cause: AuthError) -> Self {
        Self::new(ErrorCode::ServerError, description).with_cause(cause)
    }

    /// Maps a failed lookup into a protocol error.
    ///
    /// Missing or expired records become `miss_code`; anything else is a
    /// `server_error` carrying the original failure.
    #[must_use]
    pub fn from_lookup(
        miss_code: ErrorCode,
        description: impl Into<String>,
        cause: AuthError,
    ) -> Self {
        if cause.is_lookup_miss() {
            Self::new(miss_code, description).with_cause(cause)
        } else {
            Self::server_error(description, cause)
        }
    }
}
