//! Storage contract consumed by the authorize and access engines.
//!
//! Two families of backends implement [`Storage`]:
//!
//! - a relational adapter (`ssogate-auth-postgres`)
//! - the SSO token hierarchy over a key/value store (`ssogate-sso`)
//!
//! [`MemoryStorage`] is a map-backed implementation for tests and demos.
//!
//! Implementations must be safe for concurrent use; the engines share one
//! `Arc<dyn Storage>` across all requests.

mod memory;

pub use memory::MemoryStorage;

use async_trait::async_trait;

use crate::error::AuthResult;
use crate::types::{AccessData, AuthorizeData, Client};

/// Persistence operations needed by the engines.
///
/// Lookups return `AuthError::NotFound` for unknown keys. `load_authorize`
/// additionally returns `AuthError::Expired` for codes past their lifetime.
#[async_trait]
pub trait Storage: Send + Sync {
    /// Looks up a client by id.
    async fn get_client(&self, client_id: &str) -> AuthResult<Client>;

    /// Persists an authorization code together with its SSO data.
    async fn save_authorize(&self, data: &AuthorizeData) -> AuthResult<()>;

    /// Loads an authorization code.
    async fn load_authorize(&self, code: &str) -> AuthResult<AuthorizeData>;

    /// Removes an authorization code. Removing an unknown code is not an error.
    async fn remove_authorize(&self, code: &str) -> AuthResult<()>;

    /// Persists an access token (and its refresh token, if any).
    async fn save_access(&self, data: &AccessData) -> AuthResult<()>;

    /// Loads an access token.
    async fn load_access(&self, token: &str) -> AuthResult<AccessData>;

    /// Removes an access token. Removing an unknown token is not an error.
    async fn remove_access(&self, token: &str) -> AuthResult<()>;

    /// Loads the access data a refresh token was issued with.
    async fn load_refresh(&self, token: &str) -> AuthResult<AccessData>;

    /// Removes a refresh token. Removing an unknown token is not an error.
    async fn remove_refresh(&self, token: &str) -> AuthResult<()>;
}
