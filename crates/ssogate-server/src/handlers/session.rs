//! Parent session inspection and logout.

use axum::{
    Json,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use axum_extra::extract::CookieJar;
use tracing::{info, warn};

use super::{error_json, removal_cookie};
use crate::state::AppState;

pub async fn session_get(State(state): State<AppState>, jar: CookieJar) -> Response {
    let Some(sso) = &state.sso else {
        return error_json(StatusCode::NOT_FOUND, "not_found", "SSO sessions are disabled");
    };
    let Some(cookie) = jar.get(&state.session.cookie_name) else {
        return error_json(StatusCode::UNAUTHORIZED, "login_required", "no session cookie");
    };

    let parent_token = cookie.value();
    let uids = match sso.get_uids_by_parent_token(parent_token).await {
        Ok(uids) => uids,
        Err(e) if e.is_lookup_miss() => {
            return error_json(StatusCode::UNAUTHORIZED, "login_required", "session has ended");
        }
        Err(e) => {
            warn!(error = %e, "Session lookup failed");
            return error_json(StatusCode::INTERNAL_SERVER_ERROR, "server_error", "session lookup failed");
        }
    };
    let expires_in = match sso.parent_session(parent_token).await {
        Ok(Some(view)) => view.ttl,
        _ => None,
    };

    Json(serde_json::json!({
        "uids": uids,
        "expires_in": expires_in,
    }))
    .into_response()
}

pub async fn logout(State(state): State<AppState>, jar: CookieJar) -> Response {
    if let (Some(sso), Some(cookie)) = (&state.sso, jar.get(&state.session.cookie_name)) {
        if let Err(e) = sso.remove_parent_token(cookie.value()).await {
            warn!(error = %e, "Failed to revoke parent session");
            return error_json(StatusCode::INTERNAL_SERVER_ERROR, "server_error", "logout failed");
        }
        info!("Parent session logged out");
    }
    let jar = jar.remove(removal_cookie(&state.session));
    (jar, StatusCode::NO_CONTENT).into_response()
}
