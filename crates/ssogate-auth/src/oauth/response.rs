//! Result object produced by the engines.
//!
//! A [`Response`] collects named outputs (`code`, `state`, `access_token`, ...)
//! and the request's error slot. The transport decides how to render it: as a
//! redirect with query parameters, a redirect with a URL fragment, or a JSON
//! body.

use serde_json::{Map, Value};
use url::Url;

use crate::error::OAuthError;

/// Named outputs plus error/success status of one engine call.
#[derive(Debug, Clone, Default)]
pub struct Response {
    output: Map<String, Value>,
    error: Option<OAuthError>,
    redirect_uri: Option<String>,
    redirect_in_fragment: bool,
}

impl Response {
    /// Creates an empty response.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// All outputs.
    #[must_use]
    pub fn output(&self) -> &Map<String, Value> {
        &self.output
    }

    /// A single output value.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.output.get(key)
    }

    /// A single output value, if it is a string.
    #[must_use]
    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.output.get(key).and_then(Value::as_str)
    }

    pub(crate) fn set(&mut self, key: &str, value: impl Into<Value>) {
        self.output.insert(key.to_string(), value.into());
    }

    /// The recorded error, if the request failed.
    #[must_use]
    pub fn error(&self) -> Option<&OAuthError> {
        self.error.as_ref()
    }

    /// Returns `true` if an error has been recorded.
    #[must_use]
    pub fn is_error(&self) -> bool {
        self.error.is_some()
    }

    /// Records an error unless one is already present, and returns the error
    /// that ends up in the slot.
    pub(crate) fn set_error(&mut self, error: OAuthError) -> OAuthError {
        if let Some(existing) = &self.error {
            return existing.clone();
        }
        self.output.remove("code");
        self.output.remove("access_token");
        self.output.remove("refresh_token");
        self.set("error", error.code.as_str());
        self.set("error_description", error.description.clone());
        self.error = Some(error.clone());
        error
    }

    /// Redirect target, once resolved.
    #[must_use]
    pub fn redirect_uri(&self) -> Option<&str> {
        self.redirect_uri.as_deref()
    }

    pub(crate) fn set_redirect(&mut self, uri: impl Into<String>) {
        self.redirect_uri = Some(uri.into());
    }

    /// Returns `true` if outputs belong in the URL fragment.
    #[must_use]
    pub fn redirect_in_fragment(&self) -> bool {
        self.redirect_in_fragment
    }

    pub(crate) fn set_redirect_fragment(&mut self, in_fragment: bool) {
        self.redirect_in_fragment = in_fragment;
    }

    /// Builds the redirect URL carrying all outputs, either as query
    /// parameters or in the fragment.
    ///
    /// Returns `None` when no redirect target was resolved.
    #[must_use]
    pub fn redirect_url(&self) -> Option<Url> {
        let mut url = Url::parse(self.redirect_uri.as_deref()?).ok()?;
        let pairs: Vec<(&str, String)> = self
            .output
            .iter()
            .map(|(key, value)| (key.as_str(), value_to_param(value)))
            .collect();

        if self.redirect_in_fragment {
            let mut fragment = url::form_urlencoded::Serializer::new(String::new());
            for (key, value) in &pairs {
                fragment.append_pair(key, value);
            }
            url.set_fragment(Some(&fragment.finish()));
        } else {
            let mut query = url.query_pairs_mut();
            for (key, value) in &pairs {
                query.append_pair(key, value);
            }
        }
        Some(url)
    }

    /// Outputs as a JSON object, for token endpoint bodies.
    #[must_use]
    pub fn to_json(&self) -> Value {
        Value::Object(self.output.clone())
    }
}

fn value_to_param(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorCode;

    #[test]
    fn first_error_is_terminal() {
        let mut response = Response::new();
        response.set("state", "xyz");
        let first = response.set_error(OAuthError::invalid_request("first"));
        let second = response.set_error(OAuthError::access_denied("second"));

        assert_eq!(first.code, ErrorCode::InvalidRequest);
        assert_eq!(second.code, ErrorCode::InvalidRequest);
        assert_eq!(response.get_str("error"), Some("invalid_request"));
        assert_eq!(response.get_str("error_description"), Some("first"));
        assert_eq!(response.get_str("state"), Some("xyz"));
    }

    #[test]
    fn redirect_in_query() {
        let mut response = Response::new();
        response.set_redirect("http://localhost/cb?keep=1");
        response.set("code", "abc");
        response.set("state", "s t");

        let url = response.redirect_url().unwrap();
        let pairs: Vec<(String, String)> = url.query_pairs().into_owned().collect();
        assert!(pairs.contains(&("keep".to_string(), "1".to_string())));
        assert!(pairs.contains(&("code".to_string(), "abc".to_string())));
        assert!(pairs.contains(&("state".to_string(), "s t".to_string())));
        assert!(url.fragment().is_none());
    }

    #[test]
    fn redirect_in_fragment() {
        let mut response = Response::new();
        response.set_redirect("http://localhost/cb");
        response.set_redirect_fragment(true);
        response.set("access_token", "tok");
        response.set("expires_in", 3600);

        let url = response.redirect_url().unwrap();
        assert!(url.query().is_none());
        let fragment = url.fragment().unwrap();
        assert!(fragment.contains("access_token=tok"));
        assert!(fragment.contains("expires_in=3600"));
    }
}
