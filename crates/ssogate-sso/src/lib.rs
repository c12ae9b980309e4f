//! SSO token hierarchy for ssogate.
//!
//! Three record families over a key/value store:
//!
//! - **user index** - uid to the parent sessions that uid is logged into
//! - **parent session** - one SSO login, shared by every client the user
//!   authorizes through it
//! - **sub session** - one access token issued under a parent session
//!
//! [`SsoStorage`] implements the engines' `Storage` contract on top of the
//! hierarchy and adds session-level operations (uid lookup, logout, renew).
//!
//! ```ignore
//! let store = create_kv_store(&redis_config).await;
//! let storage = Arc::new(SsoStorage::new(store, SsoConfig::default()));
//! let server = OAuthServer::new(oauth_config, storage.clone());
//! ```

pub mod config;
pub mod expiry;
pub mod hierarchy;
pub mod records;
pub mod storage;
pub mod store;

pub use config::{KeyScheme, RedisConfig, SsoConfig};
pub use expiry::{Admission, ExpiryEntry, TokenSet};
pub use hierarchy::TokenHierarchy;
pub use records::{
    AccessSnapshot, ParentSession, RecordView, RefreshRecord, SubSession, UserIndex, UserMetadata,
};
pub use storage::SsoStorage;
pub use store::{KeyTtl, KvStore, create_kv_store};
