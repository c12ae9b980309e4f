//! Authorization code rows.

use sqlx_core::executor::Executor;
use sqlx_core::query::query;
use sqlx_core::query_as::query_as;
use sqlx_postgres::Postgres;
use ssogate_auth::oauth::pkce::PkceChallengeMethod;
use ssogate_auth::{AuthorizeData, Client, SsoData};
use time::OffsetDateTime;

use crate::{StorageError, StorageResult};

type AuthorizeTuple = (
    String,
    String,
    i64,
    String,
    String,
    String,
    i64,
    Option<serde_json::Value>,
    Option<String>,
    Option<String>,
    Option<serde_json::Value>,
);

/// Row from the oauth_authorize table.
#[derive(Debug, Clone)]
pub struct AuthorizeRow {
    pub code: String,
    pub client_id: String,
    pub expires_in: i64,
    pub scope: String,
    pub redirect_uri: String,
    pub state: String,
    pub ctime: i64,
    pub extra: Option<serde_json::Value>,
    pub code_challenge: Option<String>,
    pub code_challenge_method: Option<String>,
    pub sso: Option<serde_json::Value>,
}

impl From<AuthorizeTuple> for AuthorizeRow {
    fn from(r: AuthorizeTuple) -> Self {
        Self {
            code: r.0,
            client_id: r.1,
            expires_in: r.2,
            scope: r.3,
            redirect_uri: r.4,
            state: r.5,
            ctime: r.6,
            extra: r.7,
            code_challenge: r.8,
            code_challenge_method: r.9,
            sso: r.10,
        }
    }
}

impl AuthorizeRow {
    /// Rebuild the engine record with its client attached.
    pub fn into_data(self, client: Client) -> StorageResult<AuthorizeData> {
        let created_at = OffsetDateTime::from_unix_timestamp(self.ctime)
            .map_err(|e| StorageError::invalid_input(format!("authorize ctime: {e}")))?;
        let code_challenge_method = self
            .code_challenge_method
            .as_deref()
            .map(PkceChallengeMethod::parse)
            .transpose()
            .map_err(|e| StorageError::invalid_input(e.to_string()))?;
        let sso_data = self
            .sso
            .map(serde_json::from_value::<SsoData>)
            .transpose()?;
        let parent_token_expires_in = sso_data
            .as_ref()
            .map_or(0, |sso| sso.parent_token.expires_in);

        Ok(AuthorizeData {
            client,
            code: self.code,
            expires_in: self.expires_in,
            parent_token_expires_in,
            scope: self.scope,
            redirect_uri: self.redirect_uri,
            state: self.state,
            created_at,
            user_data: self.extra,
            code_challenge: self.code_challenge,
            code_challenge_method,
            sso_data,
        })
    }
}

pub(crate) async fn insert<'c, E>(executor: E, data: &AuthorizeData) -> StorageResult<()>
where
    E: Executor<'c, Database = Postgres>,
{
    let sso = data.sso_data.as_ref().map(serde_json::to_value).transpose()?;
    query(
        r#"
        INSERT INTO oauth_authorize
            (code, client_id, expires_in, scope, redirect_uri, state, ctime,
             extra, code_challenge, code_challenge_method, sso)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
        "#,
    )
    .bind(&data.code)
    .bind(&data.client.id)
    .bind(data.expires_in)
    .bind(&data.scope)
    .bind(&data.redirect_uri)
    .bind(&data.state)
    .bind(data.created_at.unix_timestamp())
    .bind(&data.user_data)
    .bind(&data.code_challenge)
    .bind(data.code_challenge_method.map(|m| m.as_str()))
    .bind(sso)
    .execute(executor)
    .await?;
    Ok(())
}

pub(crate) async fn find<'c, E>(executor: E, code: &str) -> StorageResult<Option<AuthorizeRow>>
where
    E: Executor<'c, Database = Postgres>,
{
    let row: Option<AuthorizeTuple> = query_as(
        r#"
        SELECT code, client_id, expires_in, scope, redirect_uri, state, ctime,
               extra, code_challenge, code_challenge_method, sso
        FROM oauth_authorize
        WHERE code = $1
        "#,
    )
    .bind(code)
    .fetch_optional(executor)
    .await?;
    Ok(row.map(AuthorizeRow::from))
}

pub(crate) async fn delete<'c, E>(executor: E, code: &str) -> StorageResult<()>
where
    E: Executor<'c, Database = Postgres>,
{
    query("DELETE FROM oauth_authorize WHERE code = $1")
        .bind(code)
        .execute(executor)
        .await?;
    Ok(())
}
