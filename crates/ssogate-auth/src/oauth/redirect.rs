//! Redirect URI whitelisting.
//!
//! A client may register several redirect URIs joined by a separator. The
//! separator is configured per deployment; an empty separator means the
//! registered value is a single URI.

use url::Url;

/// Errors raised while resolving a redirect URI.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum RedirectError {
    /// The client has no redirect URI registered.
    #[error("client has no redirect URI configured")]
    NotConfigured,

    /// No redirect URI was supplied and the client has several.
    #[error("redirect_uri is required when the client registers more than one")]
    Ambiguous,

    /// The supplied redirect URI is not an absolute URL without fragment.
    #[error("invalid redirect_uri: {0}")]
    Malformed(String),

    /// The supplied redirect URI does not match any registered URI.
    #[error("redirect_uri does not match any registered URI")]
    Mismatch,

    /// The value could not be percent-decoded.
    #[error("redirect_uri is not valid percent-encoded UTF-8")]
    Undecodable,
}

/// Splits a registered redirect URI list.
#[must_use]
pub fn split_uris<'a>(list: &'a str, separator: &str) -> Vec<&'a str> {
    if separator.is_empty() {
        return if list.is_empty() { Vec::new() } else { vec![list] };
    }
    list.split(separator)
        .map(str::trim)
        .filter(|uri| !uri.is_empty())
        .collect()
}

/// Returns the first registered URI.
#[must_use]
pub fn first_uri<'a>(list: &'a str, separator: &str) -> Option<&'a str> {
    split_uris(list, separator).into_iter().next()
}

/// Percent-decodes a redirect URI parameter.
///
/// # Errors
///
/// Returns `RedirectError::Undecodable` if the decoded bytes are not UTF-8.
pub fn unescape(raw: &str) -> Result<String, RedirectError> {
    urlencoding::decode(raw)
        .map(|decoded| decoded.into_owned())
        .map_err(|_| RedirectError::Undecodable)
}

/// Resolves the effective redirect URI for a request.
///
/// With no requested URI, the single registered URI is used. Otherwise the
/// requested URI must be an absolute URL without fragment and equal one of
/// the registered URIs.
///
/// # Errors
///
/// See [`RedirectError`].
pub fn resolve(registered: &str, separator: &str, requested: &str) -> Result<String, RedirectError> {
    let uris = split_uris(registered, separator);
    if uris.is_empty() {
        return Err(RedirectError::NotConfigured);
    }

    if requested.is_empty() {
        return match uris.as_slice() {
            [only] => Ok((*only).to_string()),
            _ => Err(RedirectError::Ambiguous),
        };
    }

    let parsed = Url::parse(requested).map_err(|e| RedirectError::Malformed(e.to_string()))?;
    if parsed.fragment().is_some() {
        return Err(RedirectError::Malformed("fragment not allowed".to_string()));
    }

    if uris.contains(&requested) {
        Ok(requested.to_string())
    } else {
        Err(RedirectError::Mismatch)
    }
}
