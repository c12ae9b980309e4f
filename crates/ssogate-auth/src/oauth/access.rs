//! Access engine.
//!
//! Handles the token endpoint: authorization code exchange and refresh. The
//! implicit grant reuses [`AccessRequest`] internally from the authorize
//! engine; it cannot be requested directly.
//!
//! Ordering on exchange: the authorization code is removed before the new
//! access token is saved. A failure in between leaves a consumed code and no
//! token; it never leaves a token next to a code that could be replayed.

use std::collections::HashSet;
use std::sync::Arc;

use serde_json::Value;
use time::{Duration, OffsetDateTime};
use tracing::{debug, info, warn};

use crate::config::OAuthServerConfig;
use crate::error::{ErrorCode, OAuthError};
use crate::oauth::client_auth::ClientAuth;
use crate::oauth::pkce::{self, PkceError};
use crate::oauth::redirect;
use crate::oauth::response::Response;
use crate::storage::Storage;
use crate::types::{AccessData, AccessRequestType, AuthorizeData, Client, Lineage, generate_token};

// =============================================================================
// Parameters and Options
// =============================================================================

/// Parameters of a token request, as parsed by the transport.
#[derive(Debug, Clone, Default)]
pub struct AccessParams {
    /// HTTP method of the request.
    pub method: String,
    /// `grant_type`
    pub grant_type: String,
    /// `code`
    pub code: String,
    /// `redirect_uri`, still percent-encoded.
    pub redirect_uri: String,
    /// `refresh_token`
    pub refresh_token: String,
    /// `scope` (refresh only)
    pub scope: String,
    /// `code_verifier`
    pub code_verifier: String,
    /// Credentials from the `Authorization: Basic` header.
    pub client_auth: Option<ClientAuth>,
    /// `client_id` body parameter.
    pub client_id: String,
    /// `client_secret` body parameter.
    pub client_secret: String,
}

/// Caller decision applied by [`AccessRequest::build`].
#[derive(Debug, Clone, Default)]
pub struct AccessOptions {
    /// The caller approves issuing the token.
    pub authorized: bool,
    /// Client IP recorded with the token.
    pub client_ip: Option<String>,
    /// User agent recorded with the token.
    pub user_agent: Option<String>,
    /// Replaces the user data inherited from the predecessor.
    pub user_data: Option<Value>,
}

impl AccessOptions {
    /// Options approving the request.
    #[must_use]
    pub fn authorized() -> Self {
        Self {
            authorized: true,
            ..Self::default()
        }
    }

    /// Sets the client IP.
    #[must_use]
    pub fn with_client_ip(mut self, client_ip: impl Into<String>) -> Self {
        self.client_ip = Some(client_ip.into());
        self
    }

    /// Sets the user agent.
    #[must_use]
    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = Some(user_agent.into());
        self
    }
}

// =============================================================================
// Access Request
// =============================================================================

/// One inbound token call (or an implicit grant from the authorize engine).
pub struct AccessRequest {
    storage: Arc<dyn Storage>,
    config: Arc<OAuthServerConfig>,
    response: Response,
    request_type: Option<AccessRequestType>,
    client: Client,
    code: String,
    redirect_uri: String,
    scope: String,
    authorize_data: Option<AuthorizeData>,
    access_data: Option<AccessData>,
    generate_refresh: bool,
    authorized: bool,
    expiration: i64,
    user_data: Option<Value>,
    parent_token: Option<String>,
    client_ip: String,
    user_agent: String,
}

impl std::fmt::Debug for AccessRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AccessRequest")
            .field("request_type", &self.request_type)
            .field("client_id", &self.client.id)
            .field("authorized", &self.authorized)
            .field("error", &self.response.error())
            .finish_non_exhaustive()
    }
}

impl AccessRequest {
    fn empty(storage: Arc<dyn Storage>, config: Arc<OAuthServerConfig>, response: Response) -> Self {
        Self {
            expiration: config.access_expiration_secs(),
            storage,
            config,
            response,
            request_type: None,
            client: Client::default(),
            code: String::new(),
            redirect_uri: String::new(),
            scope: String::new(),
            authorize_data: None,
            access_data: None,
            generate_refresh: false,
            authorized: false,
            user_data: None,
            parent_token: None,
            client_ip: String::new(),
            user_agent: String::new(),
        }
    }

    /// Validates `params` and returns the staged, not yet authorized request.
    pub(crate) async fn handle(
        storage: Arc<dyn Storage>,
        config: Arc<OAuthServerConfig>,
        params: AccessParams,
    ) -> Self {
        if config.log_requests {
            info!(
                method = %params.method,
                grant_type = %params.grant_type,
                client_id = %params
                    .client_auth
                    .as_ref()
                    .map_or(params.client_id.as_str(), |auth| auth.client_id.as_str()),
                "Access request"
            );
        }

        let mut request = Self::empty(storage, config, Response::new());
        if let Err(err) = request.validate(params).await {
            warn!(code = %err.code, error = %err.description, "Access request rejected");
            request.response.set_error(err);
        }
        request
    }

    /// Stages an implicit grant on behalf of the authorize engine. Outputs
    /// are written into `response`, which already carries the redirect.
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn implicit(
        storage: Arc<dyn Storage>,
        config: Arc<OAuthServerConfig>,
        response: Response,
        client: Client,
        scope: String,
        redirect_uri: String,
        expiration: i64,
        user_data: Option<Value>,
        parent_token: Option<String>,
    ) -> Self {
        let mut request = Self::empty(storage, config, response);
        request.response.set_redirect_fragment(true);
        request.request_type = Some(AccessRequestType::Implicit);
        request.client = client;
        request.scope = scope;
        request.redirect_uri = redirect_uri;
        request.expiration = expiration;
        request.user_data = user_data;
        request.parent_token = parent_token;
        request
    }

    async fn validate(&mut self, params: AccessParams) -> Result<(), OAuthError> {
        let method_allowed = params.method.eq_ignore_ascii_case("POST")
            || (self.config.allow_get_access_request && params.method.eq_ignore_ascii_case("GET"));
        if !method_allowed {
            return Err(OAuthError::invalid_request(format!(
                "access requests must use POST, got '{}'",
                params.method
            )));
        }

        let grant_type = AccessRequestType::parse(&params.grant_type)
            .filter(|ty| self.config.allowed_access_types.contains(ty))
            .ok_or_else(|| {
                OAuthError::unsupported_grant_type(format!(
                    "grant_type '{}' is not supported",
                    params.grant_type
                ))
            })?;
        self.request_type = Some(grant_type);

        match grant_type {
            AccessRequestType::AuthorizationCode => self.validate_authorization_code(params).await,
            AccessRequestType::RefreshToken => self.validate_refresh_token(params).await,
            AccessRequestType::Password
            | AccessRequestType::ClientCredentials
            | AccessRequestType::Assertion
            | AccessRequestType::Implicit => Err(OAuthError::unsupported_grant_type(format!(
                "grant_type '{grant_type}' is not implemented"
            ))),
        }
    }

    /// Authenticates the client from the Basic header or, if allowed, from
    /// body parameters.
    async fn authenticate_client(&self, params: &AccessParams) -> Result<Client, OAuthError> {
        let auth = match &params.client_auth {
            Some(auth) => auth.clone(),
            None if self.config.allow_client_secret_in_params && !params.client_id.is_empty() => {
                ClientAuth::new(params.client_id.clone(), params.client_secret.clone())
            }
            None => return Err(OAuthError::invalid_request("client authentication required")),
        };

        let client = self
            .storage
            .get_client(&auth.client_id)
            .await
            .map_err(|e| OAuthError::from_lookup(ErrorCode::UnauthorizedClient, "unknown client", e))?;

        if !client.check_secret(&auth.client_secret) {
            return Err(OAuthError::unauthorized_client("invalid client secret"));
        }
        if client.redirect_uri.is_empty() {
            return Err(OAuthError::unauthorized_client(
                "client has no redirect URI configured",
            ));
        }
        Ok(client)
    }

    async fn validate_authorization_code(&mut self, params: AccessParams) -> Result<(), OAuthError> {
        let client = self.authenticate_client(&params).await?;

        if params.code.is_empty() {
            return Err(OAuthError::invalid_grant("code is required"));
        }

        let authorize = self
            .storage
            .load_authorize(&params.code)
            .await
            .map_err(|e| {
                OAuthError::from_lookup(ErrorCode::InvalidGrant, "authorization code not found", e)
            })?;
        if authorize.is_expired() {
            return Err(OAuthError::invalid_grant("authorization code expired"));
        }
        if authorize.client.id != client.id {
            return Err(OAuthError::invalid_grant(
                "authorization code was issued to another client",
            ));
        }

        let separator = &self.config.redirect_uri_separator;
        let mut redirect_uri = redirect::unescape(&params.redirect_uri)
            .map_err(|e| OAuthError::invalid_request(e.to_string()))?;
        if redirect_uri.is_empty() {
            redirect_uri = redirect::first_uri(&client.redirect_uri, separator)
                .unwrap_or_default()
                .to_string();
        }
        redirect::resolve(&client.redirect_uri, separator, &redirect_uri)
            .map_err(|e| OAuthError::invalid_request(e.to_string()))?;
        if authorize.redirect_uri != redirect_uri {
            return Err(OAuthError::invalid_request(
                "redirect_uri does not match the authorization request",
            ));
        }

        if let Some(challenge) = &authorize.code_challenge {
            if params.code_verifier.is_empty() {
                return Err(OAuthError::invalid_request("code_verifier is required"));
            }
            let method = authorize.code_challenge_method.unwrap_or_default();
            pkce::verify(challenge, method, &params.code_verifier).map_err(|e| match e {
                PkceError::VerificationFailed => OAuthError::invalid_grant(e.to_string()),
                other => OAuthError::invalid_request(other.to_string()),
            })?;
        }

        debug!(client_id = %client.id, "Authorization code accepted");
        self.client = client;
        self.code = params.code;
        self.redirect_uri = redirect_uri;
        self.scope = authorize.scope.clone();
        self.user_data = authorize.user_data.clone();
        self.generate_refresh = self.config.generate_refresh;
        self.parent_token = authorize
            .sso_data
            .as_ref()
            .map(|sso| sso.parent_token.token.clone());
        self.authorize_data = Some(authorize);
        Ok(())
    }

    async fn validate_refresh_token(&mut self, params: AccessParams) -> Result<(), OAuthError> {
        let client = self.authenticate_client(&params).await?;

        if params.refresh_token.is_empty() {
            return Err(OAuthError::invalid_grant("refresh_token is required"));
        }

        let previous = self
            .storage
            .load_refresh(&params.refresh_token)
            .await
            .map_err(|e| {
                OAuthError::from_lookup(ErrorCode::InvalidGrant, "refresh token not found", e)
            })?;
        if previous.client.id != client.id {
            return Err(OAuthError::invalid_grant(
                "refresh token was issued to another client",
            ));
        }
        let refresh_deadline =
            previous.created_at + Duration::seconds(self.config.refresh_token_expiration_secs());
        if OffsetDateTime::now_utc() >= refresh_deadline {
            return Err(OAuthError::invalid_grant("refresh token expired"));
        }

        self.scope = if params.scope.trim().is_empty() {
            previous.scope.clone()
        } else if scope_within(&params.scope, &previous.scope) {
            params.scope
        } else {
            return Err(OAuthError::invalid_scope(
                "the requested scope must not include any scope not originally granted",
            ));
        };

        debug!(client_id = %client.id, "Refresh token accepted");
        self.client = client;
        self.code = params.refresh_token;
        self.redirect_uri = previous.redirect_uri.clone();
        self.user_data = previous.user_data.clone();
        self.generate_refresh = self.config.generate_refresh;
        self.parent_token = previous.parent_token.clone();
        self.access_data = Some(previous);
        Ok(())
    }

    // -------------------------------------------------------------------------
    // Build
    // -------------------------------------------------------------------------

    /// Issues the access token once the caller approves.
    ///
    /// # Errors
    ///
    /// Returns the recorded error if the request already failed, otherwise the
    /// error that made this call fail (which is then recorded as well).
    pub async fn build(&mut self, options: AccessOptions) -> Result<(), OAuthError> {
        if let Some(err) = self.response.error() {
            return Err(err.clone());
        }

        self.authorized = options.authorized;
        if let Some(client_ip) = options.client_ip {
            self.client_ip = client_ip;
        }
        if let Some(user_agent) = options.user_agent {
            self.user_agent = user_agent;
        }
        if let Some(user_data) = options.user_data {
            self.user_data = Some(user_data);
        }

        match self.finish().await {
            Ok(()) => Ok(()),
            Err(err) => {
                warn!(
                    client_id = %self.client.id,
                    code = %err.code,
                    error = %err.description,
                    "Access build failed"
                );
                Err(self.response.set_error(err))
            }
        }
    }

    async fn finish(&mut self) -> Result<(), OAuthError> {
        if !self.authorized {
            return Err(OAuthError::access_denied("the request was not authorized"));
        }
        let grant_type = self
            .request_type
            .ok_or_else(|| OAuthError::invalid_request("not a supported type"))?;

        let refresh_token = (self.generate_refresh && grant_type != AccessRequestType::Implicit)
            .then(generate_token);

        let lineage = match (&self.authorize_data, &self.access_data) {
            (Some(authorize), _) => Lineage::Authorize(Box::new(authorize.clone())),
            (None, Some(previous)) => Lineage::Access(Box::new(previous.detached())),
            (None, None) => Lineage::None,
        };

        let data = AccessData {
            client: self.client.clone(),
            access_token: generate_token(),
            refresh_token,
            expires_in: self.expiration,
            scope: self.scope.clone(),
            redirect_uri: self.redirect_uri.clone(),
            created_at: OffsetDateTime::now_utc(),
            user_data: self.user_data.clone(),
            lineage,
            parent_token: self.parent_token.clone(),
            client_ip: self.client_ip.clone(),
            user_agent: self.user_agent.clone(),
        };

        if let Some(authorize) = &self.authorize_data {
            self.storage
                .remove_authorize(&authorize.code)
                .await
                .map_err(|e| OAuthError::server_error("failed to consume authorization code", e))?;
        }

        self.storage
            .save_access(&data)
            .await
            .map_err(|e| OAuthError::server_error("failed to save access token", e))?;

        if let Some(previous) = &self.access_data {
            self.rotate(previous).await;
        }

        self.response.set("access_token", data.access_token.clone());
        self.response.set("token_type", self.config.token_type.clone());
        self.response.set("expires_in", data.expires_in);
        if let Some(refresh_token) = &data.refresh_token {
            self.response.set("refresh_token", refresh_token.clone());
        }
        if !data.scope.is_empty() {
            self.response.set("scope", data.scope.clone());
        }

        info!(
            client_id = %data.client.id,
            grant_type = %grant_type,
            expires_in = data.expires_in,
            refresh = data.refresh_token.is_some(),
            "Access token issued"
        );
        Ok(())
    }

    /// Retires the tokens a refresh replaced. Failures only get logged; the
    /// new token is already saved.
    async fn rotate(&self, previous: &AccessData) {
        if self.config.retain_token_after_refresh {
            return;
        }
        if let Some(refresh_token) = &previous.refresh_token {
            if let Err(e) = self.storage.remove_refresh(refresh_token).await {
                warn!(error = %e, "Failed to remove previous refresh token");
            }
        }
        if let Err(e) = self.storage.remove_access(&previous.access_token).await {
            warn!(error = %e, "Failed to remove previous access token");
        }
    }

    // -------------------------------------------------------------------------
    // Accessors
    // -------------------------------------------------------------------------

    /// Validated grant type, if validation got that far.
    #[must_use]
    pub fn request_type(&self) -> Option<AccessRequestType> {
        self.request_type
    }

    /// Authenticated client.
    #[must_use]
    pub fn client(&self) -> &Client {
        &self.client
    }

    /// Code or refresh token the request presented.
    #[must_use]
    pub fn code(&self) -> &str {
        &self.code
    }

    /// Scope the token will carry.
    #[must_use]
    pub fn scope(&self) -> &str {
        &self.scope
    }

    /// Authorization being exchanged, for code grants.
    #[must_use]
    pub fn authorize_data(&self) -> Option<&AuthorizeData> {
        self.authorize_data.as_ref()
    }

    /// Access data being refreshed, for refresh grants.
    #[must_use]
    pub fn access_data(&self) -> Option<&AccessData> {
        self.access_data.as_ref()
    }

    /// Uid of the SSO session behind a code grant.
    #[must_use]
    pub fn uid(&self) -> Option<i64> {
        self.authorize_data.as_ref().and_then(AuthorizeData::uid)
    }

    /// Recorded error, if any.
    #[must_use]
    pub fn error(&self) -> Option<&OAuthError> {
        self.response.error()
    }

    /// Outputs produced so far.
    #[must_use]
    pub fn response(&self) -> &Response {
        &self.response
    }

    /// Consumes the request, returning its outputs.
    #[must_use]
    pub fn into_response(self) -> Response {
        self.response
    }
}

/// Returns `true` if every scope in `requested` appears in `granted`.
fn scope_within(requested: &str, granted: &str) -> bool {
    let granted: HashSet<&str> = granted.split_whitespace().collect();
    requested
        .split_whitespace()
        .all(|scope| granted.contains(scope))
}
