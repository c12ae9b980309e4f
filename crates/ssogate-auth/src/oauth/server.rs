//! Entry points for the authorize and token endpoints.

use std::sync::Arc;

use crate::config::OAuthServerConfig;
use crate::oauth::access::{AccessParams, AccessRequest};
use crate::oauth::authorize::{AuthorizeParams, AuthorizeRequest};
use crate::storage::Storage;

/// Shares configuration and storage across requests.
///
/// Holds no per-request state; clone it freely.
#[derive(Clone)]
pub struct OAuthServer {
    config: Arc<OAuthServerConfig>,
    storage: Arc<dyn Storage>,
}

impl OAuthServer {
    /// Creates a server over the given storage.
    #[must_use]
    pub fn new(config: OAuthServerConfig, storage: Arc<dyn Storage>) -> Self {
        Self {
            config: Arc::new(config),
            storage,
        }
    }

    /// Engine configuration.
    #[must_use]
    pub fn config(&self) -> &OAuthServerConfig {
        &self.config
    }

    /// Storage backend.
    #[must_use]
    pub fn storage(&self) -> &Arc<dyn Storage> {
        &self.storage
    }

    /// Validates an authorize request.
    ///
    /// Check [`AuthorizeRequest::error`] before authenticating the resource
    /// owner, then call [`AuthorizeRequest::build`].
    pub async fn handle_authorize_request(&self, params: AuthorizeParams) -> AuthorizeRequest {
        AuthorizeRequest::handle(Arc::clone(&self.storage), Arc::clone(&self.config), params).await
    }

    /// Validates a token request.
    ///
    /// The returned request is not yet authorized; call
    /// [`AccessRequest::build`] to issue the token.
    pub async fn handle_access_request(&self, params: AccessParams) -> AccessRequest {
        AccessRequest::handle(Arc::clone(&self.storage), Arc::clone(&self.config), params).await
    }
}

impl std::fmt::Debug for OAuthServer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OAuthServer")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}
