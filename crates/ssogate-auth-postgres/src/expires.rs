//! Expiry rows tracking when each code or token lapses.

use sqlx_core::executor::Executor;
use sqlx_core::query::query;
use sqlx_postgres::Postgres;

use crate::StorageResult;

pub(crate) async fn insert<'c, E>(executor: E, token: &str, expires_at: i64) -> StorageResult<()>
where
    E: Executor<'c, Database = Postgres>,
{
    query(
        r#"
        INSERT INTO oauth_expires (token, expires_at)
        VALUES ($1, $2)
        "#,
    )
    .bind(token)
    .bind(expires_at)
    .execute(executor)
    .await?;
    Ok(())
}

pub(crate) async fn delete<'c, E>(executor: E, token: &str) -> StorageResult<()>
where
    E: Executor<'c, Database = Postgres>,
{
    query("DELETE FROM oauth_expires WHERE token = $1")
        .bind(token)
        .execute(executor)
        .await?;
    Ok(())
}
