//! PostgreSQL storage backend for ssogate.
//!
//! Implements the `Storage` contract over five tables:
//!
//! - `oauth_apps` - registered clients, soft-deleted, with a call counter
//! - `oauth_authorize` - authorization codes
//! - `oauth_access` - access tokens and their lineage
//! - `oauth_refresh` - refresh token to access token
//! - `oauth_expires` - expiry instant of every code and token
//!
//! Multi-row writes run in one transaction.
//!
//! # Example
//!
//! ```ignore
//! use ssogate_auth_postgres::PostgresOAuthStorage;
//!
//! let storage = PostgresOAuthStorage::connect("postgres://localhost/ssogate").await?;
//! storage.init_schema().await?;
//! let server = OAuthServer::new(config, Arc::new(storage));
//! ```

pub mod access;
pub mod app;
pub mod authorize;
mod expires;
mod oauth_storage;
mod schema;

use std::sync::Arc;

use sqlx_core::pool::Pool;
use sqlx_core::query::query;
use sqlx_postgres::Postgres;
use ssogate_auth::AuthError;
use ssogate_auth::types::now_unix;

/// PostgreSQL connection pool type alias.
pub type PgPool = Pool<Postgres>;

pub use access::AccessRow;
pub use app::{AppRow, AppStorage, AppUpdate, NewApp};
pub use authorize::AuthorizeRow;

// =============================================================================
// Error Types
// =============================================================================

/// Errors that can occur during storage operations.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// Database operation failed.
    #[error("Database error: {0}")]
    Database(#[from] sqlx_core::Error),

    /// Requested row was not found.
    #[error("Not found: {0}")]
    NotFound(String),

    /// Row already exists (conflict).
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Serialization/deserialization failed.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Invalid input data.
    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

impl StorageError {
    // -------------------------------------------------------------------------
    // Constructor Methods
    // -------------------------------------------------------------------------

    /// Create a `NotFound` error.
    #[must_use]
    pub fn not_found(resource: impl Into<String>) -> Self {
        Self::NotFound(resource.into())
    }

    /// Create a `Conflict` error.
    #[must_use]
    pub fn conflict(message: impl Into<String>) -> Self {
        Self::Conflict(message.into())
    }

    /// Create an `InvalidInput` error.
    #[must_use]
    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::InvalidInput(message.into())
    }

    // -------------------------------------------------------------------------
    // Predicate Methods
    // -------------------------------------------------------------------------

    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }

    #[must_use]
    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::Conflict(_))
    }

    /// Returns `true` if this is a client error (4xx equivalent).
    #[must_use]
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            Self::NotFound(_) | Self::Conflict(_) | Self::InvalidInput(_)
        )
    }

    // -------------------------------------------------------------------------
    // Conversion
    // -------------------------------------------------------------------------

    /// Convert to the engines' error type, keeping lookup misses as misses.
    #[must_use]
    pub fn into_auth(self, operation: &str, table: &str) -> AuthError {
        match self {
            Self::NotFound(what) => AuthError::not_found(what),
            Self::Serialization(e) => AuthError::serialization(e),
            Self::InvalidInput(message) => AuthError::invalid_input(message),
            other => AuthError::storage(operation, table, other),
        }
    }
}

/// Result type for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

// =============================================================================
// PostgreSQL OAuth Storage
// =============================================================================

/// PostgreSQL storage backend for the engines.
#[derive(Debug, Clone)]
pub struct PostgresOAuthStorage {
    pool: Arc<PgPool>,
}

impl PostgresOAuthStorage {
    /// Create new storage with an existing connection pool.
    #[must_use]
    pub fn new(pool: Arc<PgPool>) -> Self {
        Self { pool }
    }

    /// Create new storage by connecting to the database.
    ///
    /// # Errors
    ///
    /// Returns an error if the connection fails.
    pub async fn connect(database_url: &str) -> Result<Self, StorageError> {
        use sqlx_core::pool::PoolOptions;
        let pool = PoolOptions::<Postgres>::new().connect(database_url).await?;
        Ok(Self::new(Arc::new(pool)))
    }

    /// Get a reference to the connection pool.
    #[must_use]
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Application (client) maintenance.
    #[must_use]
    pub fn apps(&self) -> AppStorage<'_> {
        AppStorage::new(&self.pool)
    }

    /// Create the tables if they do not exist.
    pub async fn init_schema(&self) -> StorageResult<()> {
        for statement in schema::STATEMENTS {
            query(statement).execute(self.pool()).await?;
        }
        tracing::debug!("OAuth schema ready");
        Ok(())
    }

    /// Delete codes and tokens whose expiry has passed, with their refresh
    /// and expiry rows. Returns the number of codes and tokens deleted.
    pub async fn purge_expired(&self) -> StorageResult<u64> {
        let now = now_unix();
        let mut tx = self.pool.begin().await?;

        let codes = query(
            r#"
            DELETE FROM oauth_authorize
            WHERE code IN (SELECT token FROM oauth_expires WHERE expires_at <= $1)
            "#,
        )
        .bind(now)
        .execute(&mut *tx)
        .await?
        .rows_affected();

        query(
            r#"
            DELETE FROM oauth_refresh
            WHERE access_token IN (SELECT token FROM oauth_expires WHERE expires_at <= $1)
            "#,
        )
        .bind(now)
        .execute(&mut *tx)
        .await?;

        let tokens = query(
            r#"
            DELETE FROM oauth_access
            WHERE access_token IN (SELECT token FROM oauth_expires WHERE expires_at <= $1)
            "#,
        )
        .bind(now)
        .execute(&mut *tx)
        .await?
        .rows_affected();

        query("DELETE FROM oauth_expires WHERE expires_at <= $1")
            .bind(now)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;

        if codes + tokens > 0 {
            tracing::info!(codes, tokens, "Purged expired OAuth rows");
        }
        Ok(codes + tokens)
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_storage_error_not_found() {
        let err = StorageError::not_found("client abc123");
        assert!(err.is_not_found());
        assert!(err.is_client_error());
        assert_eq!(err.to_string(), "Not found: client abc123");
        assert!(err.into_auth("get_client", "oauth_apps").is_not_found());
    }

    #[test]
    fn test_storage_error_conflict() {
        let err = StorageError::conflict("client already exists");
        assert!(err.is_conflict());
        assert!(err.is_client_error());
        let auth = err.into_auth("create", "oauth_apps");
        assert!(matches!(auth, AuthError::Storage { ref key, .. } if key == "oauth_apps"));
    }

    #[test]
    fn test_storage_error_serialization() {
        let json_err = serde_json::from_str::<serde_json::Value>("invalid json").unwrap_err();
        let err = StorageError::from(json_err);
        assert!(!err.is_client_error());
        assert!(matches!(
            err.into_auth("load_authorize", "oauth_authorize"),
            AuthError::Serialization { .. }
        ));
    }
}
