//! Authorize engine.
//!
//! [`AuthorizeRequest`] is created by
//! [`OAuthServer::handle_authorize_request`](crate::OAuthServer::handle_authorize_request),
//! which validates the inbound parameters. The caller then authenticates the
//! resource owner and calls [`AuthorizeRequest::build`] with the outcome.
//!
//! Validation failures land in the request's error slot. Once set, the slot
//! is terminal: `build` returns the same error without touching storage.

use std::sync::Arc;

use serde::Deserialize;
use serde_json::Value;
use time::OffsetDateTime;
use tracing::{debug, info, warn};

use crate::config::OAuthServerConfig;
use crate::error::{ErrorCode, OAuthError};
use crate::oauth::access::{AccessOptions, AccessRequest};
use crate::oauth::pkce::{self, PkceChallengeMethod};
use crate::oauth::redirect::{self, RedirectError};
use crate::oauth::response::Response;
use crate::storage::Storage;
use crate::types::{AuthorizeData, AuthorizeRequestType, Client, SsoData, Token, generate_token, now_unix};

// =============================================================================
// Parameters and Options
// =============================================================================

/// Parameters of an authorize request, as parsed by the transport.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct AuthorizeParams {
    /// `client_id`
    pub client_id: String,
    /// `redirect_uri`, still percent-encoded.
    pub redirect_uri: String,
    /// `scope`
    pub scope: String,
    /// `state`
    pub state: String,
    /// `response_type`
    pub response_type: String,
    /// `code_challenge`
    pub code_challenge: String,
    /// `code_challenge_method`
    pub code_challenge_method: String,
}

/// Outcome of resource-owner authentication, applied by
/// [`AuthorizeRequest::build`].
///
/// Unset fields keep whatever the request already holds.
#[derive(Debug, Clone, Default)]
pub struct AuthorizeOptions {
    /// The resource owner approved the request.
    pub authorized: bool,
    /// Data stored alongside the code or token.
    pub user_data: Option<Value>,
    /// Existing parent token to reuse instead of minting one.
    pub parent_token: Option<String>,
    /// Authenticated user.
    pub uid: Option<i64>,
    /// Platform label for the SSO session.
    pub platform: Option<String>,
    /// Client IP for the SSO session.
    pub client_ip: Option<String>,
    /// User agent for the SSO session.
    pub user_agent: Option<String>,
}

impl AuthorizeOptions {
    /// Options approving the request.
    #[must_use]
    pub fn authorized() -> Self {
        Self {
            authorized: true,
            ..Self::default()
        }
    }

    /// Options denying the request.
    #[must_use]
    pub fn denied() -> Self {
        Self::default()
    }

    /// Sets the authenticated user.
    #[must_use]
    pub fn with_uid(mut self, uid: i64) -> Self {
        self.uid = Some(uid);
        self
    }

    /// Reuses an active parent session.
    #[must_use]
    pub fn with_parent_token(mut self, parent_token: impl Into<String>) -> Self {
        self.parent_token = Some(parent_token.into());
        self
    }

    /// Attaches caller data.
    #[must_use]
    pub fn with_user_data(mut self, user_data: Value) -> Self {
        self.user_data = Some(user_data);
        self
    }

    /// Sets the platform label.
    #[must_use]
    pub fn with_platform(mut self, platform: impl Into<String>) -> Self {
        self.platform = Some(platform.into());
        self
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

/// SSO linkage staged on the request until `build` materializes it.
#[derive(Debug, Clone, Default)]
struct SsoStaging {
    parent_token: Option<String>,
    uid: Option<i64>,
    platform: String,
    client_ip: String,
    user_agent: String,
}

// =============================================================================
// Authorize Request
// =============================================================================

/// One inbound authorize call.
pub struct AuthorizeRequest {
    storage: Arc<dyn Storage>,
    config: Arc<OAuthServerConfig>,
    response: Response,
    request_type: Option<AuthorizeRequestType>,
    client: Client,
    scope: String,
    state: String,
    redirect_uri: String,
    expiration: i64,
    parent_token_expiration: i64,
    code_challenge: Option<String>,
    code_challenge_method: Option<PkceChallengeMethod>,
    authorized: bool,
    user_data: Option<Value>,
    sso: SsoStaging,
    parent_token: Option<Token>,
}

impl std::fmt::Debug for AuthorizeRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthorizeRequest")
            .field("request_type", &self.request_type)
            .field("client_id", &self.client.id)
            .field("redirect_uri", &self.redirect_uri)
            .field("authorized", &self.authorized)
            .field("error", &self.response.error())
            .finish_non_exhaustive()
    }
}

impl AuthorizeRequest {
    /// Validates `params` and returns the staged request. Failures are
    /// recorded in the request's error slot.
    pub(crate) async fn handle(
        storage: Arc<dyn Storage>,
        config: Arc<OAuthServerConfig>,
        params: AuthorizeParams,
    ) -> Self {
        if config.log_requests {
            info!(
                response_type = %params.response_type,
                client_id = %params.client_id,
                redirect_uri = %params.redirect_uri,
                scope = %params.scope,
                "Authorize request"
            );
        }

        let mut request = Self {
            parent_token_expiration: config.parent_token_expiration_secs(),
            storage,
            config,
            response: Response::new(),
            request_type: None,
            client: Client::default(),
            scope: String::new(),
            state: String::new(),
            redirect_uri: String::new(),
            expiration: 0,
            code_challenge: None,
            code_challenge_method: None,
            authorized: false,
            user_data: None,
            sso: SsoStaging::default(),
            parent_token: None,
        };

        if !params.state.is_empty() {
            request.response.set("state", params.state.clone());
        }

        if let Err(err) = request.validate(params).await {
            warn!(code = %err.code, error = %err.description, "Authorize request rejected");
            request.response.set_error(err);
        }
        request
    }

    async fn validate(&mut self, params: AuthorizeParams) -> Result<(), OAuthError> {
        let request_type = AuthorizeRequestType::parse(&params.response_type)
            .filter(|ty| self.config.allowed_authorize_types.contains(ty))
            .ok_or_else(|| {
                OAuthError::unsupported_response_type(format!(
                    "response_type '{}' is not supported",
                    params.response_type
                ))
            })?;
        self.request_type = Some(request_type);
        self.scope = params.scope;
        self.state = params.state;

        if request_type == AuthorizeRequestType::Login {
            // Direct login: the front door authenticated the user itself.
            self.client = Client::default();
            self.expiration = self.config.access_expiration_secs();
            return Ok(());
        }

        if params.client_id.is_empty() {
            return Err(OAuthError::unauthorized_client("client_id is required"));
        }

        let requested_redirect = redirect::unescape(&params.redirect_uri)
            .map_err(|e| OAuthError::invalid_request(e.to_string()))?;

        let client = self
            .storage
            .get_client(&params.client_id)
            .await
            .map_err(|e| {
                OAuthError::from_lookup(ErrorCode::UnauthorizedClient, "unknown client", e)
            })?;
        if client.redirect_uri.is_empty() {
            return Err(OAuthError::unauthorized_client(
                "client has no redirect URI configured",
            ));
        }

        let redirect_uri = redirect::resolve(
            &client.redirect_uri,
            &self.config.redirect_uri_separator,
            &requested_redirect,
        )
        .map_err(|e| match e {
            RedirectError::NotConfigured => OAuthError::unauthorized_client(e.to_string()),
            other => OAuthError::invalid_request(other.to_string()),
        })?;
        self.response.set_redirect(redirect_uri.clone());
        self.redirect_uri = redirect_uri;

        match request_type {
            AuthorizeRequestType::Code => {
                self.expiration = self.config.authorization_expiration_secs();
                if !params.code_challenge.is_empty() {
                    let method = if params.code_challenge_method.is_empty() {
                        PkceChallengeMethod::Plain
                    } else {
                        PkceChallengeMethod::parse(&params.code_challenge_method)
                            .map_err(|e| OAuthError::invalid_request(e.to_string()))?
                    };
                    pkce::validate_challenge(&params.code_challenge)
                        .map_err(|e| OAuthError::invalid_request(e.to_string()))?;
                    self.code_challenge = Some(params.code_challenge);
                    self.code_challenge_method = Some(method);
                } else if self.config.require_pkce_for_public_clients && client.is_public() {
                    return Err(OAuthError::invalid_request(
                        "code_challenge (rfc7636) required for public clients",
                    ));
                }
            }
            AuthorizeRequestType::Token => {
                self.expiration = self.config.access_expiration_secs();
                self.response.set_redirect_fragment(true);
            }
            AuthorizeRequestType::Login => {}
        }

        debug!(
            client_id = %client.id,
            response_type = %request_type,
            "Authorize request validated"
        );
        self.client = client;
        Ok(())
    }

    // -------------------------------------------------------------------------
    // Build
    // -------------------------------------------------------------------------

    /// Applies the resource owner's decision and, if approved, issues a code,
    /// an implicit access token, or an SSO session.
    ///
    /// # Errors
    ///
    /// Returns the recorded error if the request already failed, otherwise the
    /// error that made this call fail (which is then recorded as well).
    pub async fn build(&mut self, options: AuthorizeOptions) -> Result<(), OAuthError> {
        if let Some(err) = self.response.error() {
            return Err(err.clone());
        }

        self.apply(options);
        match self.finish().await {
            Ok(()) => Ok(()),
            Err(err) => {
                warn!(
                    client_id = %self.client.id,
                    code = %err.code,
                    error = %err.description,
                    "Authorize build failed"
                );
                Err(self.response.set_error(err))
            }
        }
    }

    fn apply(&mut self, options: AuthorizeOptions) {
        self.authorized = options.authorized;
        if let Some(user_data) = options.user_data {
            self.user_data = Some(user_data);
        }
        if let Some(parent_token) = options.parent_token.filter(|t| !t.is_empty()) {
            self.sso.parent_token = Some(parent_token);
        }
        if let Some(uid) = options.uid {
            self.sso.uid = Some(uid);
        }
        if let Some(platform) = options.platform {
            self.sso.platform = platform;
        }
        if let Some(client_ip) = options.client_ip {
            self.sso.client_ip = client_ip;
        }
        if let Some(user_agent) = options.user_agent {
            self.sso.user_agent = user_agent;
        }
    }

    async fn finish(&mut self) -> Result<(), OAuthError> {
        if !self.authorized {
            return Err(OAuthError::access_denied(
                "the resource owner denied the request",
            ));
        }

        match self.request_type {
            Some(AuthorizeRequestType::Token) => self.finish_implicit().await,
            Some(AuthorizeRequestType::Code) => {
                let code = generate_token();
                self.record_session(code.clone()).await?;
                self.response.set("code", code);
                info!(client_id = %self.client.id, "Authorization code issued");
                Ok(())
            }
            Some(AuthorizeRequestType::Login) => {
                if self.sso.uid.is_none() {
                    return Err(OAuthError::invalid_request(
                        "uid is required to record a login session",
                    ));
                }
                self.record_session(String::new()).await?;
                info!(uid = ?self.sso.uid, "SSO login recorded");
                Ok(())
            }
            None => Err(OAuthError::invalid_request("not a supported type")),
        }
    }

    async fn finish_implicit(&mut self) -> Result<(), OAuthError> {
        if self.sso.uid.is_some() {
            self.record_session(String::new()).await?;
        }

        let mut access = AccessRequest::implicit(
            Arc::clone(&self.storage),
            Arc::clone(&self.config),
            std::mem::take(&mut self.response),
            self.client.clone(),
            self.scope.clone(),
            self.redirect_uri.clone(),
            self.expiration,
            self.user_data.clone(),
            self.parent_token.as_ref().map(|t| t.token.clone()),
        );
        let result = access
            .build(AccessOptions {
                authorized: true,
                client_ip: Some(self.sso.client_ip.clone()),
                user_agent: Some(self.sso.user_agent.clone()),
                user_data: None,
            })
            .await;
        self.response = access.into_response();
        result
    }

    /// Persists an authorization record (with an empty code for LOGIN and
    /// implicit requests) carrying the staged SSO session.
    async fn record_session(&mut self, code: String) -> Result<(), OAuthError> {
        let sso_data = self.stage_sso();
        let data = AuthorizeData {
            client: self.client.clone(),
            code,
            expires_in: self.expiration,
            parent_token_expires_in: self.parent_token_expiration,
            scope: self.scope.clone(),
            redirect_uri: self.redirect_uri.clone(),
            state: self.state.clone(),
            created_at: OffsetDateTime::now_utc(),
            user_data: self.user_data.clone(),
            code_challenge: self.code_challenge.clone(),
            code_challenge_method: self.code_challenge_method,
            sso_data: sso_data.clone(),
        };

        self.storage
            .save_authorize(&data)
            .await
            .map_err(|e| OAuthError::server_error("failed to save authorization", e))?;

        self.parent_token = sso_data.map(|sso| sso.parent_token);
        Ok(())
    }

    /// SSO session data for the authenticated user. A caller-supplied parent
    /// token is reused; otherwise a fresh one is minted.
    fn stage_sso(&self) -> Option<SsoData> {
        let uid = self.sso.uid?;
        let parent_token = match &self.sso.parent_token {
            Some(existing) => Token::from_existing(existing.clone(), self.parent_token_expiration),
            None => Token::new(self.parent_token_expiration),
        };
        Some(SsoData {
            parent_token,
            uid,
            platform: self.sso.platform.clone(),
            client_ip: self.sso.client_ip.clone(),
            user_agent: self.sso.user_agent.clone(),
            ctime: now_unix(),
        })
    }

    // -------------------------------------------------------------------------
    // Accessors
    // -------------------------------------------------------------------------

    /// Validated response type, if validation got that far.
    #[must_use]
    pub fn request_type(&self) -> Option<AuthorizeRequestType> {
        self.request_type
    }

    /// Client the request is for (a placeholder for LOGIN).
    #[must_use]
    pub fn client(&self) -> &Client {
        &self.client
    }

    /// Requested scope.
    #[must_use]
    pub fn scope(&self) -> &str {
        &self.scope
    }

    /// Client state.
    #[must_use]
    pub fn state(&self) -> &str {
        &self.state
    }

    /// Resolved redirect URI.
    #[must_use]
    pub fn redirect_uri(&self) -> &str {
        &self.redirect_uri
    }

    /// Lifetime of what this request will issue, in seconds.
    #[must_use]
    pub fn expiration(&self) -> i64 {
        self.expiration
    }

    /// Parent token of the SSO session recorded by `build`.
    #[must_use]
    pub fn parent_token(&self) -> Option<&Token> {
        self.parent_token.as_ref()
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

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStorage;

    const CHALLENGE: &str = "E9Melhoa2OwvFrEMTJguCHaoeK1t8URWbuGJSstw-cM";

    fn setup(config: OAuthServerConfig) -> (Arc<MemoryStorage>, Arc<OAuthServerConfig>) {
        let storage = Arc::new(MemoryStorage::new());
        storage.set_client(Client::new("1234", "aabbccdd", "http://localhost/cb"));
        storage.set_client(Client::new("public", "", "http://localhost/pub"));
        storage.set_client(Client::new("noredirect", "secret", ""));
        storage.set_client(Client::new(
            "multi",
            "secret",
            "http://localhost/a,http://localhost/b",
        ));
        (storage, Arc::new(config))
    }

    fn code_params(client_id: &str) -> AuthorizeParams {
        AuthorizeParams {
            client_id: client_id.to_string(),
            response_type: "code".to_string(),
            state: "xyz".to_string(),
            ..Default::default()
        }
    }

    async fn handle(
        storage: &Arc<MemoryStorage>,
        config: &Arc<OAuthServerConfig>,
        params: AuthorizeParams,
    ) -> AuthorizeRequest {
        AuthorizeRequest::handle(storage.clone(), config.clone(), params).await
    }

    #[tokio::test]
    async fn rejects_disallowed_response_type() {
        let (storage, config) = setup(OAuthServerConfig::default());
        let mut params = code_params("1234");
        params.response_type = "token".to_string();

        let request = handle(&storage, &config, params).await;
        assert_eq!(
            request.error().unwrap().code,
            ErrorCode::UnsupportedResponseType
        );
    }

    #[tokio::test]
    async fn missing_or_unknown_client_is_unauthorized() {
        let (storage, config) = setup(OAuthServerConfig::default());

        let request = handle(&storage, &config, code_params("")).await;
        assert_eq!(request.error().unwrap().code, ErrorCode::UnauthorizedClient);

        let request = handle(&storage, &config, code_params("ghost")).await;
        assert_eq!(request.error().unwrap().code, ErrorCode::UnauthorizedClient);

        let request = handle(&storage, &config, code_params("noredirect")).await;
        assert_eq!(request.error().unwrap().code, ErrorCode::UnauthorizedClient);
    }

    #[tokio::test]
    async fn redirect_defaults_and_mismatch() {
        let (storage, config) = setup(OAuthServerConfig {
            redirect_uri_separator: ",".to_string(),
            ..Default::default()
        });

        let request = handle(&storage, &config, code_params("1234")).await;
        assert!(request.error().is_none());
        assert_eq!(request.redirect_uri(), "http://localhost/cb");

        let request = handle(&storage, &config, code_params("multi")).await;
        assert_eq!(request.error().unwrap().code, ErrorCode::InvalidRequest);

        let mut params = code_params("multi");
        params.redirect_uri = "http%3A%2F%2Flocalhost%2Fb".to_string();
        let request = handle(&storage, &config, params).await;
        assert!(request.error().is_none());
        assert_eq!(request.redirect_uri(), "http://localhost/b");

        let mut params = code_params("1234");
        params.redirect_uri = "http://evil.example/cb".to_string();
        let request = handle(&storage, &config, params).await;
        assert_eq!(request.error().unwrap().code, ErrorCode::InvalidRequest);
        assert!(request.response().redirect_uri().is_none());
    }

    #[tokio::test]
    async fn pkce_method_defaults_to_plain() {
        let (storage, config) = setup(OAuthServerConfig::default());
        let mut params = code_params("1234");
        params.code_challenge = CHALLENGE.to_string();

        let mut request = handle(&storage, &config, params).await;
        assert!(request.error().is_none());
        request.build(AuthorizeOptions::authorized()).await.unwrap();

        let code = request.response().get_str("code").unwrap().to_string();
        let data = storage.load_authorize(&code).await.unwrap();
        assert_eq!(data.code_challenge_method, Some(PkceChallengeMethod::Plain));
    }

    #[tokio::test]
    async fn pkce_rejects_bad_method_and_shape() {
        let (storage, config) = setup(OAuthServerConfig::default());

        let mut params = code_params("1234");
        params.code_challenge = CHALLENGE.to_string();
        params.code_challenge_method = "S512".to_string();
        let request = handle(&storage, &config, params).await;
        assert_eq!(request.error().unwrap().code, ErrorCode::InvalidRequest);

        for challenge in ["a".repeat(42), "a".repeat(129), format!("{}+", "a".repeat(42))] {
            for method in ["plain", "S256"] {
                let mut params = code_params("1234");
                params.code_challenge = challenge.clone();
                params.code_challenge_method = method.to_string();
                let request = handle(&storage, &config, params).await;
                assert_eq!(request.error().unwrap().code, ErrorCode::InvalidRequest);
            }
        }
    }

    #[tokio::test]
    async fn pkce_required_for_public_clients_when_configured() {
        let (storage, config) = setup(OAuthServerConfig {
            require_pkce_for_public_clients: true,
            ..Default::default()
        });

        let request = handle(&storage, &config, code_params("public")).await;
        assert_eq!(request.error().unwrap().code, ErrorCode::InvalidRequest);

        // Confidential clients are not affected
        let request = handle(&storage, &config, code_params("1234")).await;
        assert!(request.error().is_none());
    }

    #[tokio::test]
    async fn denied_build_is_access_denied_and_terminal() {
        let (storage, config) = setup(OAuthServerConfig::default());
        let mut request = handle(&storage, &config, code_params("1234")).await;

        let err = request.build(AuthorizeOptions::denied()).await.unwrap_err();
        assert_eq!(err.code, ErrorCode::AccessDenied);

        // The slot is terminal: approving afterwards changes nothing
        let err = request.build(AuthorizeOptions::authorized()).await.unwrap_err();
        assert_eq!(err.code, ErrorCode::AccessDenied);
        assert_eq!(storage.authorize_count(), 0);
        assert_eq!(request.response().get_str("state"), Some("xyz"));
    }

    #[tokio::test]
    async fn failed_validation_never_persists() {
        let (storage, config) = setup(OAuthServerConfig::default());
        let mut request = handle(&storage, &config, code_params("ghost")).await;

        let err = request.build(AuthorizeOptions::authorized()).await.unwrap_err();
        assert_eq!(err.code, ErrorCode::UnauthorizedClient);
        assert_eq!(storage.authorize_count(), 0);
    }

    #[tokio::test]
    async fn code_build_stages_sso_session() {
        let (storage, config) = setup(OAuthServerConfig::default());
        let mut request = handle(&storage, &config, code_params("1234")).await;
        request
            .build(
                AuthorizeOptions::authorized()
                    .with_uid(42)
                    .with_platform("web")
                    .with_client_ip("10.0.0.1"),
            )
            .await
            .unwrap();

        let parent = request.parent_token().unwrap().clone();
        assert_eq!(parent.expires_in, config.parent_token_expiration_secs());

        let code = request.response().get_str("code").unwrap().to_string();
        let data = storage.load_authorize(&code).await.unwrap();
        let sso = data.sso_data.unwrap();
        assert_eq!(sso.uid, 42);
        assert_eq!(sso.platform, "web");
        assert_eq!(sso.parent_token, parent);
        assert_eq!(data.expires_in, 300);
    }

    #[tokio::test]
    async fn parent_token_override_is_reused() {
        let (storage, config) = setup(OAuthServerConfig::default());
        let mut request = handle(&storage, &config, code_params("1234")).await;
        request
            .build(
                AuthorizeOptions::authorized()
                    .with_uid(7)
                    .with_parent_token("existing-parent"),
            )
            .await
            .unwrap();

        assert_eq!(request.parent_token().unwrap().token, "existing-parent");
    }

    #[tokio::test]
    async fn login_skips_client_validation() {
        let (storage, config) = setup(OAuthServerConfig::default());
        let params = AuthorizeParams {
            response_type: "login".to_string(),
            ..Default::default()
        };
        let mut request = handle(&storage, &config, params).await;
        assert!(request.error().is_none());
        assert_eq!(request.client().id, "");
        assert_eq!(request.expiration(), config.access_expiration_secs());

        request
            .build(AuthorizeOptions::authorized().with_uid(1))
            .await
            .unwrap();
        assert!(request.response().get("code").is_none());
        assert!(request.parent_token().is_some());
        // Empty-code records are not kept by the map storage
        assert_eq!(storage.authorize_count(), 0);
    }

    #[tokio::test]
    async fn login_without_uid_is_rejected() {
        let (storage, config) = setup(OAuthServerConfig::default());
        let params = AuthorizeParams {
            response_type: "login".to_string(),
            ..Default::default()
        };
        let mut request = handle(&storage, &config, params).await;

        let err = request.build(AuthorizeOptions::authorized()).await.unwrap_err();
        assert_eq!(err.code, ErrorCode::InvalidRequest);
        assert!(request.parent_token().is_none());
        assert!(request.response().is_error());

        // The error slot is terminal
        let again = request
            .build(AuthorizeOptions::authorized().with_uid(1))
            .await
            .unwrap_err();
        assert_eq!(again.code, ErrorCode::InvalidRequest);
        assert!(request.parent_token().is_none());
    }
}
