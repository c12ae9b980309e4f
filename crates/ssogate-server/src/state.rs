use std::sync::Arc;

use ssogate_auth::OAuthServer;
use ssogate_sso::SsoStorage;

use crate::config::SessionConfig;
use crate::users::UserDirectory;

/// Shared handler state.
#[derive(Clone)]
pub struct AppState {
    pub oauth: OAuthServer,
    /// Present when the SSO backend is in use.
    pub sso: Option<Arc<SsoStorage>>,
    pub users: Arc<UserDirectory>,
    pub session: SessionConfig,
}
