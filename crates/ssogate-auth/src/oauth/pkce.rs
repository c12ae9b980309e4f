//! PKCE (Proof Key for Code Exchange), RFC 7636.
//!
//! Both `plain` and `S256` are accepted. The authorize endpoint validates the
//! challenge shape; the token endpoint verifies the verifier against it.
//!
//! ```
//! use ssogate_auth::oauth::pkce::{PkceChallengeMethod, validate_challenge, verify};
//!
//! let verifier = "dBjftJeZ4CVP-mB92K27uhbUJU1p1r_wW1gFWFOEjXk";
//! let challenge = "E9Melhoa2OwvFrEMTJguCHaoeK1t8URWbuGJSstw-cM";
//! assert!(validate_challenge(challenge).is_ok());
//! assert!(verify(challenge, PkceChallengeMethod::S256, verifier).is_ok());
//! ```

use std::fmt;
use std::sync::LazyLock;

use base64::{Engine, engine::general_purpose::URL_SAFE_NO_PAD};
use regex::Regex;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// RFC 7636 §4.1/4.2 character set and length for verifiers and challenges.
static CHALLENGE_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[A-Za-z0-9~._-]{43,128}$").expect("Invalid PKCE challenge regex")
});

// =============================================================================
// Error Types
// =============================================================================

/// Errors that can occur during PKCE operations.
#[derive(Debug, thiserror::Error)]
pub enum PkceError {
    /// Challenge length or character set is invalid.
    #[error("Invalid code challenge: must be 43-128 characters of [A-Za-z0-9-._~]")]
    InvalidChallenge,

    /// Verifier length or character set is invalid.
    #[error("Invalid code verifier: must be 43-128 characters of [A-Za-z0-9-._~]")]
    InvalidVerifier,

    /// Challenge method other than `plain` or `S256`.
    #[error("Unsupported code challenge method: {0}")]
    UnsupportedMethod(String),

    /// Verifier does not match the challenge.
    #[error("PKCE verification failed: verifier does not match challenge")]
    VerificationFailed,
}

impl PkceError {
    /// Returns `true` if this is a verification failure.
    #[must_use]
    pub fn is_verification_error(&self) -> bool {
        matches!(self, Self::VerificationFailed)
    }
}

// =============================================================================
// Challenge Method
// =============================================================================

/// PKCE challenge method.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum PkceChallengeMethod {
    /// The challenge equals the verifier.
    #[default]
    #[serde(rename = "plain")]
    Plain,
    /// The challenge is `BASE64URL(SHA256(verifier))`.
    #[serde(rename = "S256")]
    S256,
}

impl PkceChallengeMethod {
    /// Returns the wire value.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Plain => "plain",
            Self::S256 => "S256",
        }
    }

    /// Parses a `code_challenge_method` parameter.
    ///
    /// # Errors
    ///
    /// Returns `PkceError::UnsupportedMethod` for anything but `plain`/`S256`.
    pub fn parse(value: &str) -> Result<Self, PkceError> {
        match value {
            "plain" => Ok(Self::Plain),
            "S256" => Ok(Self::S256),
            other => Err(PkceError::UnsupportedMethod(other.to_string())),
        }
    }
}

impl fmt::Display for PkceChallengeMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// =============================================================================
// Validation
// =============================================================================

/// Checks a code challenge against RFC 7636 §4.2, whatever the method.
///
/// # Errors
///
/// Returns `PkceError::InvalidChallenge` on a length or character violation.
pub fn validate_challenge(challenge: &str) -> Result<(), PkceError> {
    if CHALLENGE_PATTERN.is_match(challenge) {
        Ok(())
    } else {
        Err(PkceError::InvalidChallenge)
    }
}

/// Verifies a code verifier against the stored challenge.
///
/// # Errors
///
/// Returns `PkceError::InvalidVerifier` for a malformed verifier and
/// `PkceError::VerificationFailed` when it does not match.
pub fn verify(
    challenge: &str,
    method: PkceChallengeMethod,
    verifier: &str,
) -> Result<(), PkceError> {
    if !CHALLENGE_PATTERN.is_match(verifier) {
        return Err(PkceError::InvalidVerifier);
    }

    let computed = match method {
        PkceChallengeMethod::Plain => verifier.to_string(),
        PkceChallengeMethod::S256 => URL_SAFE_NO_PAD.encode(Sha256::digest(verifier.as_bytes())),
    };

    if constant_time_eq(computed.as_bytes(), challenge.as_bytes()) {
        Ok(())
    } else {
        Err(PkceError::VerificationFailed)
    }
}

fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

#[cfg(test)]
mod tests {
    use super::*;

    // RFC 7636 Appendix B
    const RFC_VERIFIER: &str = "dBjftJeZ4CVP-mB92K27uhbUJU1p1r_wW1gFWFOEjXk";
    const RFC_CHALLENGE: &str = "E9Melhoa2OwvFrEMTJguCHaoeK1t8URWbuGJSstw-cM";

    #[test]
    fn challenge_length_bounds() {
        assert!(validate_challenge(&"a".repeat(42)).is_err());
        assert!(validate_challenge(&"a".repeat(43)).is_ok());
        assert!(validate_challenge(&"a".repeat(128)).is_ok());
        assert!(validate_challenge(&"a".repeat(129)).is_err());
    }

    #[test]
    fn challenge_charset() {
        let base = "a".repeat(42);
        for bad in ['+', '/', '=', ' ', '!', 'é'] {
            let challenge = format!("{base}{bad}");
            assert!(validate_challenge(&challenge).is_err(), "accepted {bad:?}");
        }
        for good in ['~', '.', '_', '-', 'Z', '9'] {
            let challenge = format!("{base}{good}");
            assert!(validate_challenge(&challenge).is_ok(), "rejected {good:?}");
        }
    }

    #[test]
    fn method_parse() {
        assert_eq!(PkceChallengeMethod::parse("plain").unwrap(), PkceChallengeMethod::Plain);
        assert_eq!(PkceChallengeMethod::parse("S256").unwrap(), PkceChallengeMethod::S256);
        assert!(matches!(
            PkceChallengeMethod::parse("s256"),
            Err(PkceError::UnsupportedMethod(_))
        ));
    }

    #[test]
    fn s256_rfc_vector() {
        assert!(verify(RFC_CHALLENGE, PkceChallengeMethod::S256, RFC_VERIFIER).is_ok());
        let err = verify(RFC_CHALLENGE, PkceChallengeMethod::Plain, RFC_VERIFIER).unwrap_err();
        assert!(err.is_verification_error());
    }

    #[test]
    fn plain_compares_directly() {
        assert!(verify(RFC_VERIFIER, PkceChallengeMethod::Plain, RFC_VERIFIER).is_ok());
        assert!(matches!(
            verify(RFC_VERIFIER, PkceChallengeMethod::Plain, "short"),
            Err(PkceError::InvalidVerifier)
        ));
    }
}
