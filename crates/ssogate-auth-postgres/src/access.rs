//! Access token and refresh token rows.

use sqlx_core::executor::Executor;
use sqlx_core::query::query;
use sqlx_core::query_as::query_as;
use sqlx_postgres::Postgres;
use ssogate_auth::{AccessData, Client, Lineage};
use time::OffsetDateTime;

use crate::{StorageError, StorageResult};

type AccessTuple = (
    String,
    String,
    String,
    String,
    String,
    i64,
    String,
    String,
    i64,
    Option<serde_json::Value>,
    Option<String>,
    String,
    String,
);

/// Row from the oauth_access table.
#[derive(Debug, Clone)]
pub struct AccessRow {
    pub access_token: String,
    pub client_id: String,
    /// Code the token was exchanged for, empty if none.
    pub authorize_code: String,
    /// Access token this one replaced, empty if none.
    pub previous: String,
    pub refresh_token: String,
    pub expires_in: i64,
    pub scope: String,
    pub redirect_uri: String,
    pub ctime: i64,
    pub extra: Option<serde_json::Value>,
    pub parent_token: Option<String>,
    pub client_ip: String,
    pub user_agent: String,
}

impl From<AccessTuple> for AccessRow {
    fn from(r: AccessTuple) -> Self {
        Self {
            access_token: r.0,
            client_id: r.1,
            authorize_code: r.2,
            previous: r.3,
            refresh_token: r.4,
            expires_in: r.5,
            scope: r.6,
            redirect_uri: r.7,
            ctime: r.8,
            extra: r.9,
            parent_token: r.10,
            client_ip: r.11,
            user_agent: r.12,
        }
    }
}

impl AccessRow {
    /// Rebuild the engine record without lineage.
    pub fn into_data(self, client: Client) -> StorageResult<AccessData> {
        let created_at = OffsetDateTime::from_unix_timestamp(self.ctime)
            .map_err(|e| StorageError::invalid_input(format!("access ctime: {e}")))?;
        Ok(AccessData {
            client,
            access_token: self.access_token,
            refresh_token: Some(self.refresh_token).filter(|token| !token.is_empty()),
            expires_in: self.expires_in,
            scope: self.scope,
            redirect_uri: self.redirect_uri,
            created_at,
            user_data: self.extra,
            lineage: Lineage::None,
            parent_token: self.parent_token,
            client_ip: self.client_ip,
            user_agent: self.user_agent,
        })
    }
}

pub(crate) async fn insert<'c, E>(executor: E, data: &AccessData) -> StorageResult<()>
where
    E: Executor<'c, Database = Postgres>,
{
    query(
        r#"
        INSERT INTO oauth_access
            (access_token, client_id, authorize_code, previous, refresh_token,
             expires_in, scope, redirect_uri, ctime, extra, parent_token,
             client_ip, user_agent)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)
        "#,
    )
    .bind(&data.access_token)
    .bind(&data.client.id)
    .bind(data.authorize_code().unwrap_or_default())
    .bind(data.previous_access_token().unwrap_or_default())
    .bind(data.refresh_token.as_deref().unwrap_or_default())
    .bind(data.expires_in)
    .bind(&data.scope)
    .bind(&data.redirect_uri)
    .bind(data.created_at.unix_timestamp())
    .bind(&data.user_data)
    .bind(&data.parent_token)
    .bind(&data.client_ip)
    .bind(&data.user_agent)
    .execute(executor)
    .await?;
    Ok(())
}

pub(crate) async fn find<'c, E>(executor: E, token: &str) -> StorageResult<Option<AccessRow>>
where
    E: Executor<'c, Database = Postgres>,
{
    let row: Option<AccessTuple> = query_as(
        r#"
        SELECT access_token, client_id, authorize_code, previous, refresh_token,
               expires_in, scope, redirect_uri, ctime, extra, parent_token,
               client_ip, user_agent
        FROM oauth_access
        WHERE access_token = $1
        "#,
    )
    .bind(token)
    .fetch_optional(executor)
    .await?;
    Ok(row.map(AccessRow::from))
}

pub(crate) async fn delete<'c, E>(executor: E, token: &str) -> StorageResult<()>
where
    E: Executor<'c, Database = Postgres>,
{
    query("DELETE FROM oauth_access WHERE access_token = $1")
        .bind(token)
        .execute(executor)
        .await?;
    Ok(())
}

// =============================================================================
// Refresh tokens
// =============================================================================

pub(crate) async fn insert_refresh<'c, E>(
    executor: E,
    token: &str,
    access_token: &str,
) -> StorageResult<()>
where
    E: Executor<'c, Database = Postgres>,
{
    query(
        r#"
        INSERT INTO oauth_refresh (token, access_token)
        VALUES ($1, $2)
        "#,
    )
    .bind(token)
    .bind(access_token)
    .execute(executor)
    .await?;
    Ok(())
}

/// Access token a refresh token points at.
pub(crate) async fn find_refresh<'c, E>(executor: E, token: &str) -> StorageResult<Option<String>>
where
    E: Executor<'c, Database = Postgres>,
{
    let row: Option<(String,)> =
        query_as("SELECT access_token FROM oauth_refresh WHERE token = $1")
            .bind(token)
            .fetch_optional(executor)
            .await?;
    Ok(row.map(|r| r.0))
}

pub(crate) async fn delete_refresh<'c, E>(executor: E, token: &str) -> StorageResult<()>
where
    E: Executor<'c, Database = Postgres>,
{
    query("DELETE FROM oauth_refresh WHERE token = $1")
        .bind(token)
        .execute(executor)
        .await?;
    Ok(())
}
