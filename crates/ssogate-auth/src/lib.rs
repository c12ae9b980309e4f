//! OAuth2 authorize/access engines for ssogate.
//!
//! The engines validate requests, apply PKCE and redirect rules, and persist
//! codes and tokens through the [`Storage`] contract. Two backends implement
//! that contract: a relational adapter and the SSO token hierarchy.
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use ssogate_auth::{AccessOptions, AuthorizeOptions, AuthorizeParams, MemoryStorage, OAuthServer, OAuthServerConfig};
//!
//! let server = OAuthServer::new(OAuthServerConfig::default(), Arc::new(MemoryStorage::new()));
//!
//! let mut request = server.handle_authorize_request(params).await;
//! if request.error().is_none() {
//!     request.build(AuthorizeOptions::authorized().with_uid(42)).await?;
//! }
//! let redirect = request.response().redirect_url();
//! ```

pub mod config;
pub mod error;
pub mod oauth;
pub mod storage;
pub mod types;

pub use config::{ConfigError, OAuthServerConfig};
pub use error::{AuthError, AuthResult, ErrorCategory, ErrorCode, OAuthError};
pub use oauth::{
    AccessOptions, AccessParams, AccessRequest, AuthorizeOptions, AuthorizeParams,
    AuthorizeRequest, ClientAuth, OAuthServer, PkceChallengeMethod, Response,
};
pub use storage::{MemoryStorage, Storage};
pub use types::{
    AccessData, AccessRequestType, AuthorizeData, AuthorizeRequestType, Client, Lineage, SsoData,
    Token,
};
