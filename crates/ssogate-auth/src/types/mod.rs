//! Data model shared by the engines and the storage backends.
//!
//! - [`Token`] - opaque token string with issue time and lifetime
//! - [`Client`] - registered client as seen by the engines
//! - [`AuthorizeData`] - persisted authorization code
//! - [`AccessData`] - persisted access/refresh token pair
//! - [`SsoData`] - SSO parent session staged during authorization

pub mod access;
pub mod authorize;
pub mod client;
pub mod grant;
pub mod token;

pub use access::{AccessData, Lineage};
pub use authorize::{AuthorizeData, SsoData};
pub use client::Client;
pub use grant::{AccessRequestType, AuthorizeRequestType};
pub use token::{Token, generate_token, now_unix};
