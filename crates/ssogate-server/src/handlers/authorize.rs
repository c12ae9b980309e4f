//! Authorization endpoint.
//!
//! The resource owner is authenticated by `username`/`password` fields when
//! present, otherwise by the parent-token cookie. A password sign-in made
//! with a live cookie joins that parent session. The engine then issues a
//! code (query redirect), a token (fragment redirect), or records a login
//! session (JSON).

use axum::{
    Form,
    extract::{Query, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
};
use axum_extra::extract::CookieJar;
use serde::Deserialize;
use ssogate_auth::{AuthorizeOptions, AuthorizeParams, AuthorizeRequestType};
use tracing::{debug, warn};

use super::{engine_response, error_json, extract_ip_address, extract_user_agent, session_cookie};
use crate::state::AppState;

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct AuthorizeForm {
    pub client_id: String,
    pub redirect_uri: String,
    pub scope: String,
    pub state: String,
    pub response_type: String,
    pub code_challenge: String,
    pub code_challenge_method: String,
    pub username: Option<String>,
    pub password: Option<String>,
}

impl AuthorizeForm {
    fn params(&self) -> AuthorizeParams {
        AuthorizeParams {
            client_id: self.client_id.clone(),
            redirect_uri: self.redirect_uri.clone(),
            scope: self.scope.clone(),
            state: self.state.clone(),
            response_type: self.response_type.clone(),
            code_challenge: self.code_challenge.clone(),
            code_challenge_method: self.code_challenge_method.clone(),
        }
    }
}

/// Who the resource owner turned out to be.
enum Owner {
    /// Signed in through an existing parent session.
    Session { uid: i64, parent_token: String },
    /// Signed in with a password, joining the cookie's parent session if it
    /// is still live.
    Password { uid: i64, parent_token: Option<String> },
    /// Presented credentials that did not verify.
    Rejected,
    /// Presented nothing.
    Anonymous,
}

pub async fn authorize_get(
    State(state): State<AppState>,
    headers: HeaderMap,
    jar: CookieJar,
    Query(form): Query<AuthorizeForm>,
) -> Response {
    authorize(state, headers, jar, form).await
}

pub async fn authorize_post(
    State(state): State<AppState>,
    headers: HeaderMap,
    jar: CookieJar,
    Form(form): Form<AuthorizeForm>,
) -> Response {
    authorize(state, headers, jar, form).await
}

async fn authorize(state: AppState, headers: HeaderMap, jar: CookieJar, form: AuthorizeForm) -> Response {
    let mut request = state.oauth.handle_authorize_request(form.params()).await;
    if request.error().is_some() {
        return engine_response(request.response());
    }

    let owner = identify(&state, &jar, &form).await;
    let options = match owner {
        Owner::Anonymous => {
            return error_json(
                StatusCode::UNAUTHORIZED,
                "login_required",
                "sign in with a session cookie or username and password",
            );
        }
        Owner::Rejected => AuthorizeOptions::denied(),
        Owner::Session { uid, parent_token }
        | Owner::Password { uid, parent_token: Some(parent_token) } => {
            AuthorizeOptions::authorized().with_uid(uid).with_parent_token(parent_token)
        }
        Owner::Password { uid, parent_token: None } => AuthorizeOptions::authorized().with_uid(uid),
    }
    .with_platform(state.session.platform.clone())
    .with_client_ip(extract_ip_address(&headers))
    .with_user_agent(extract_user_agent(&headers));

    if let Err(e) = request.build(options).await {
        warn!(code = %e.code, "Authorization not granted");
    }

    let jar = match (&state.sso, request.parent_token()) {
        (Some(_), Some(parent)) if !request.response().is_error() => {
            jar.add(session_cookie(&state.session, &parent.token, parent.expires_in))
        }
        _ => jar,
    };

    let body = if request.request_type() == Some(AuthorizeRequestType::Login)
        && !request.response().is_error()
    {
        let mut output = request.response().to_json();
        if let (Some(object), Some(parent)) = (output.as_object_mut(), request.parent_token()) {
            object.insert("expires_in".into(), parent.expires_in.into());
        }
        (StatusCode::OK, axum::Json(output)).into_response()
    } else {
        engine_response(request.response())
    };

    (jar, body).into_response()
}

/// Credentials win over the cookie: a password sign-in with a live cookie
/// adds the account to that parent session.
async fn identify(state: &AppState, jar: &CookieJar, form: &AuthorizeForm) -> Owner {
    let session = live_session(state, jar).await;

    match (&form.username, &form.password) {
        (Some(username), Some(password)) => match state.users.verify(username, password) {
            Some(uid) => Owner::Password {
                uid,
                parent_token: session.map(|(_, parent_token)| parent_token),
            },
            None => {
                warn!(username = %username, "Password sign-in failed");
                Owner::Rejected
            }
        },
        _ => match session {
            Some((uid, parent_token)) => {
                debug!(uid, "Resource owner resumed parent session");
                Owner::Session { uid, parent_token }
            }
            None => Owner::Anonymous,
        },
    }
}

/// Uid and parent token named by the session cookie, if it is live.
async fn live_session(state: &AppState, jar: &CookieJar) -> Option<(i64, String)> {
    let sso = state.sso.as_ref()?;
    let cookie = jar.get(&state.session.cookie_name)?;
    let parent_token = cookie.value().to_string();
    match sso.get_uid_by_parent_token(&parent_token).await {
        Ok(uid) => Some((uid, parent_token)),
        Err(e) => {
            debug!(error = %e, "Session cookie did not resolve");
            None
        }
    }
}
