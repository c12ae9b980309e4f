//! Registered applications (OAuth clients).
//!
//! Rows are soft-deleted: `dtime` is stamped and lookups skip the row.

use serde::{Deserialize, Serialize};
use sqlx_core::executor::Executor;
use sqlx_core::query::query;
use sqlx_core::query_as::query_as;
use sqlx_postgres::Postgres;
use ssogate_auth::Client;
use ssogate_auth::types::now_unix;

use crate::{PgPool, StorageError, StorageResult};

type AppTuple = (
    i64,
    String,
    String,
    String,
    String,
    String,
    Option<serde_json::Value>,
    i64,
    i32,
    i64,
    i64,
    i64,
);

const SELECT_APP: &str = r#"
    SELECT aid, name, client_id, secret, redirect_uri, url, extra,
           call_count, state, ctime, utime, dtime
    FROM oauth_apps
    WHERE client_id = $1 AND dtime = 0
"#;

// =============================================================================
// App Storage
// =============================================================================

/// Application storage operations.
pub struct AppStorage<'a> {
    pool: &'a PgPool,
}

impl<'a> AppStorage<'a> {
    #[must_use]
    pub fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }

    /// Register an application.
    ///
    /// # Errors
    ///
    /// Returns `Conflict` if the client id is already registered.
    pub async fn create(&self, app: &NewApp) -> StorageResult<AppRow> {
        if app.client_id.is_empty() {
            return Err(StorageError::invalid_input("client_id must not be empty"));
        }
        let now = now_unix();
        let row: AppTuple = query_as(
            r#"
            INSERT INTO oauth_apps
                (name, client_id, secret, redirect_uri, url, extra, ctime, utime)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $7)
            RETURNING aid, name, client_id, secret, redirect_uri, url, extra,
                      call_count, state, ctime, utime, dtime
            "#,
        )
        .bind(&app.name)
        .bind(&app.client_id)
        .bind(&app.secret)
        .bind(&app.redirect_uri)
        .bind(&app.url)
        .bind(&app.extra)
        .bind(now)
        .fetch_one(self.pool)
        .await
        .map_err(|e| match e {
            sqlx_core::Error::Database(db) if db.is_unique_violation() => {
                StorageError::conflict(format!("client {} already exists", app.client_id))
            }
            other => StorageError::Database(other),
        })?;

        tracing::info!(client_id = %app.client_id, "Application registered");
        Ok(AppRow::from(row))
    }

    /// Update the mutable fields of an active application.
    pub async fn update(&self, client_id: &str, update: &AppUpdate) -> StorageResult<AppRow> {
        let row: Option<AppTuple> = query_as(
            r#"
            UPDATE oauth_apps
            SET name = COALESCE($2, name),
                secret = COALESCE($3, secret),
                redirect_uri = COALESCE($4, redirect_uri),
                url = COALESCE($5, url),
                extra = COALESCE($6, extra),
                utime = $7
            WHERE client_id = $1 AND dtime = 0
            RETURNING aid, name, client_id, secret, redirect_uri, url, extra,
                      call_count, state, ctime, utime, dtime
            "#,
        )
        .bind(client_id)
        .bind(&update.name)
        .bind(&update.secret)
        .bind(&update.redirect_uri)
        .bind(&update.url)
        .bind(&update.extra)
        .bind(now_unix())
        .fetch_optional(self.pool)
        .await?;

        row.map(AppRow::from)
            .ok_or_else(|| StorageError::not_found(format!("client {client_id}")))
    }

    /// Soft-delete an application.
    pub async fn delete(&self, client_id: &str) -> StorageResult<()> {
        let rows_affected = query(
            r#"
            UPDATE oauth_apps
            SET dtime = $2
            WHERE client_id = $1 AND dtime = 0
            "#,
        )
        .bind(client_id)
        .bind(now_unix())
        .execute(self.pool)
        .await?
        .rows_affected();

        if rows_affected == 0 {
            return Err(StorageError::not_found(format!("client {client_id}")));
        }
        Ok(())
    }

    /// Find an active application.
    pub async fn find_by_client_id(&self, client_id: &str) -> StorageResult<Option<AppRow>> {
        find_active(self.pool, client_id).await
    }

    /// Number of access tokens issued to an application.
    pub async fn call_count(&self, client_id: &str) -> StorageResult<i64> {
        self.find_by_client_id(client_id)
            .await?
            .map(|app| app.call_count)
            .ok_or_else(|| StorageError::not_found(format!("client {client_id}")))
    }
}

pub(crate) async fn find_active<'c, E>(executor: E, client_id: &str) -> StorageResult<Option<AppRow>>
where
    E: Executor<'c, Database = Postgres>,
{
    let row: Option<AppTuple> = query_as(SELECT_APP)
        .bind(client_id)
        .fetch_optional(executor)
        .await?;
    Ok(row.map(AppRow::from))
}

/// Bump the call counter. Fails with `NotFound` for unknown or deleted apps.
pub(crate) async fn increment_call_count<'c, E>(executor: E, client_id: &str) -> StorageResult<()>
where
    E: Executor<'c, Database = Postgres>,
{
    let rows_affected = query(
        r#"
        UPDATE oauth_apps
        SET call_count = call_count + 1
        WHERE client_id = $1 AND dtime = 0
        "#,
    )
    .bind(client_id)
    .execute(executor)
    .await?
    .rows_affected();

    if rows_affected == 0 {
        return Err(StorageError::not_found(format!("client {client_id}")));
    }
    Ok(())
}

// =============================================================================
// Rows
// =============================================================================

/// Fields for a new application.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NewApp {
    pub name: String,
    pub client_id: String,
    pub secret: String,
    pub redirect_uri: String,
    pub url: String,
    pub extra: Option<serde_json::Value>,
}

/// Partial update. `None` leaves the column unchanged.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppUpdate {
    pub name: Option<String>,
    pub secret: Option<String>,
    pub redirect_uri: Option<String>,
    pub url: Option<String>,
    pub extra: Option<serde_json::Value>,
}

/// Row from the oauth_apps table.
#[derive(Debug, Clone)]
pub struct AppRow {
    pub aid: i64,
    pub name: String,
    pub client_id: String,
    pub secret: String,
    pub redirect_uri: String,
    pub url: String,
    pub extra: Option<serde_json::Value>,
    pub call_count: i64,
    pub state: i32,
    pub ctime: i64,
    pub utime: i64,
    pub dtime: i64,
}

impl From<AppTuple> for AppRow {
    fn from(r: AppTuple) -> Self {
        Self {
            aid: r.0,
            name: r.1,
            client_id: r.2,
            secret: r.3,
            redirect_uri: r.4,
            url: r.5,
            extra: r.6,
            call_count: r.7,
            state: r.8,
            ctime: r.9,
            utime: r.10,
            dtime: r.11,
        }
    }
}

impl AppRow {
    /// The engine-facing client.
    #[must_use]
    pub fn to_client(&self) -> Client {
        Client {
            id: self.client_id.clone(),
            secret: self.secret.clone(),
            redirect_uri: self.redirect_uri.clone(),
            user_data: self.extra.clone(),
        }
    }
}
