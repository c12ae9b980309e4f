//! HTTP handlers.
//!
//! - `GET|POST /authorize` - sign in and issue a code, token or login session
//! - `GET|POST /token` - exchange a code or refresh token
//! - `GET /session` - uids of the current parent session
//! - `POST /logout` - revoke the current parent session

pub mod authorize;
pub mod session;
pub mod token;

use axum::{
    Json,
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Redirect, Response},
};
use axum_extra::extract::cookie::{Cookie, SameSite};

use crate::config::SessionConfig;

pub(crate) fn extract_user_agent(headers: &HeaderMap) -> String {
    headers
        .get("user-agent")
        .and_then(|h| h.to_str().ok())
        .map(|s| s.to_string())
        .unwrap_or_default()
}

pub(crate) fn extract_ip_address(headers: &HeaderMap) -> String {
    // X-Forwarded-For can contain multiple IPs: "client, proxy1, proxy2"
    if let Some(forwarded) = headers.get("x-forwarded-for")
        && let Ok(value) = forwarded.to_str()
        && let Some(client_ip) = value.split(',').next()
    {
        return client_ip.trim().to_string();
    }

    if let Some(real_ip) = headers.get("x-real-ip")
        && let Ok(value) = real_ip.to_str()
    {
        return value.to_string();
    }

    String::new()
}

pub(crate) fn error_json(status: StatusCode, error: &str, description: &str) -> Response {
    (
        status,
        Json(serde_json::json!({
            "error": error,
            "error_description": description,
        })),
    )
        .into_response()
}

/// Redirect if the engine resolved a redirect URI, JSON otherwise.
pub(crate) fn engine_response(response: &ssogate_auth::Response) -> Response {
    if let Some(url) = response.redirect_url() {
        return Redirect::to(url.as_str()).into_response();
    }
    let status = if response.is_error() {
        StatusCode::BAD_REQUEST
    } else {
        StatusCode::OK
    };
    (status, Json(response.to_json())).into_response()
}

pub(crate) fn session_cookie(config: &SessionConfig, token: &str, max_age_secs: i64) -> Cookie<'static> {
    Cookie::build((config.cookie_name.clone(), token.to_string()))
        .http_only(true)
        .secure(config.secure)
        .same_site(SameSite::Lax)
        .path("/")
        .max_age(time::Duration::seconds(max_age_secs))
        .build()
}

pub(crate) fn removal_cookie(config: &SessionConfig) -> Cookie<'static> {
    Cookie::build((config.cookie_name.clone(), String::new()))
        .path("/")
        .build()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn forwarded_for_takes_first_hop() {
        let mut headers = HeaderMap::new();
        headers.insert("x-forwarded-for", "10.0.0.1, 10.0.0.2".parse().unwrap());
        headers.insert("x-real-ip", "10.0.0.9".parse().unwrap());
        assert_eq!(extract_ip_address(&headers), "10.0.0.1");
    }

    #[test]
    fn missing_headers_yield_empty() {
        let headers = HeaderMap::new();
        assert_eq!(extract_ip_address(&headers), "");
        assert_eq!(extract_user_agent(&headers), "");
    }

    #[test]
    fn session_cookie_is_http_only() {
        let cookie = session_cookie(&SessionConfig::default(), "ptk", 60);
        assert_eq!(cookie.name(), "ssogate_session");
        assert_eq!(cookie.http_only(), Some(true));
        assert_eq!(cookie.max_age(), Some(time::Duration::seconds(60)));
    }
}
