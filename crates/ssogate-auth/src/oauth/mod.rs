//! OAuth2 request state machines.
//!
//! - [`authorize`] - authorize endpoint (code, implicit, direct login)
//! - [`access`] - token endpoint (code exchange, refresh)
//! - [`pkce`] - RFC 7636 challenge validation and verification
//! - [`redirect`] - redirect URI whitelisting
//! - [`response`] - named outputs and error slot
//! - [`server`] - entry points sharing config and storage

pub mod access;
pub mod authorize;
pub mod client_auth;
pub mod pkce;
pub mod redirect;
pub mod response;
pub mod server;

pub use access::{AccessOptions, AccessParams, AccessRequest};
pub use authorize::{AuthorizeOptions, AuthorizeParams, AuthorizeRequest};
pub use client_auth::ClientAuth;
pub use pkce::{PkceChallengeMethod, PkceError};
pub use redirect::RedirectError;
pub use response::Response;
pub use server::OAuthServer;
