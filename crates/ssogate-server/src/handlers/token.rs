//! Token endpoint.
//!
//! Client credentials come from the Basic `Authorization` header, or from
//! `client_id`/`client_secret` fields when the engine allows it.

use axum::{
    Form, Json,
    extract::{Query, State},
    http::{HeaderMap, StatusCode, header},
    response::{IntoResponse, Response},
};
use serde::Deserialize;
use ssogate_auth::{AccessOptions, AccessParams, ClientAuth, ErrorCode};
use tracing::warn;

use super::{extract_ip_address, extract_user_agent};
use crate::state::AppState;

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct TokenForm {
    pub grant_type: String,
    pub code: String,
    pub redirect_uri: String,
    pub refresh_token: String,
    pub scope: String,
    pub code_verifier: String,
    pub client_id: String,
    pub client_secret: String,
}

pub async fn token_post(
    State(state): State<AppState>,
    headers: HeaderMap,
    Form(form): Form<TokenForm>,
) -> Response {
    token(state, headers, "POST", form).await
}

pub async fn token_get(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(form): Query<TokenForm>,
) -> Response {
    token(state, headers, "GET", form).await
}

async fn token(state: AppState, headers: HeaderMap, method: &str, form: TokenForm) -> Response {
    let client_auth = headers
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(ClientAuth::from_basic_header);

    let params = AccessParams {
        method: method.to_string(),
        grant_type: form.grant_type,
        code: form.code,
        redirect_uri: form.redirect_uri,
        refresh_token: form.refresh_token,
        scope: form.scope,
        code_verifier: form.code_verifier,
        client_auth,
        client_id: form.client_id,
        client_secret: form.client_secret,
    };

    let mut request = state.oauth.handle_access_request(params).await;
    if request.error().is_none() {
        let options = AccessOptions::authorized()
            .with_client_ip(extract_ip_address(&headers))
            .with_user_agent(extract_user_agent(&headers));
        if let Err(e) = request.build(options).await {
            warn!(code = %e.code, "Token not issued");
        }
    }

    let response = request.response();
    let status = match response.error() {
        None => StatusCode::OK,
        Some(e) if e.code == ErrorCode::ServerError => StatusCode::INTERNAL_SERVER_ERROR,
        Some(e) if e.code == ErrorCode::UnauthorizedClient => StatusCode::UNAUTHORIZED,
        Some(_) => StatusCode::BAD_REQUEST,
    };

    (
        status,
        [
            (header::CACHE_CONTROL, "no-store"),
            (header::PRAGMA, "no-cache"),
        ],
        Json(response.to_json()),
    )
        .into_response()
}
