//! `Storage` contract over the oauth_* tables.

use async_trait::async_trait;
use ssogate_auth::{AccessData, AuthError, AuthResult, AuthorizeData, Client, Lineage, Storage};

use crate::{PostgresOAuthStorage, StorageError, StorageResult, access, app, authorize, expires};

impl PostgresOAuthStorage {
    async fn client(&self, client_id: &str) -> StorageResult<Client> {
        app::find_active(self.pool(), client_id)
            .await?
            .map(|row| row.to_client())
            .ok_or_else(|| StorageError::not_found(format!("client {client_id}")))
    }

    async fn authorize_data(&self, code: &str) -> StorageResult<AuthorizeData> {
        let row = authorize::find(self.pool(), code)
            .await?
            .ok_or_else(|| StorageError::not_found("authorization code"))?;
        let client = self.client(&row.client_id).await?;
        row.into_data(client)
    }

    /// Access record with one level of lineage. Predecessors that have
    /// already been removed are left out.
    async fn access_data(&self, token: &str) -> StorageResult<AccessData> {
        let row = access::find(self.pool(), token)
            .await?
            .ok_or_else(|| StorageError::not_found("access token"))?;
        let client = self.client(&row.client_id).await?;
        let authorize_code = row.authorize_code.clone();
        let previous = row.previous.clone();
        let mut data = row.into_data(client)?;

        if !authorize_code.is_empty()
            && let Ok(authorize) = self.authorize_data(&authorize_code).await
        {
            data.lineage = Lineage::Authorize(Box::new(authorize));
        } else if !previous.is_empty()
            && let Some(row) = access::find(self.pool(), &previous).await?
        {
            let previous = row.into_data(data.client.clone())?;
            data.lineage = Lineage::Access(Box::new(previous));
        }
        Ok(data)
    }

    async fn save_access_rows(&self, data: &AccessData) -> StorageResult<()> {
        let mut tx = self.pool().begin().await?;
        if let Some(refresh_token) = &data.refresh_token {
            access::insert_refresh(&mut *tx, refresh_token, &data.access_token).await?;
        }
        access::insert(&mut *tx, data).await?;
        app::increment_call_count(&mut *tx, &data.client.id).await?;
        expires::insert(&mut *tx, &data.access_token, data.expire_at().unix_timestamp()).await?;
        tx.commit().await?;
        Ok(())
    }
}

#[async_trait]
impl Storage for PostgresOAuthStorage {
    async fn get_client(&self, client_id: &str) -> AuthResult<Client> {
        self.client(client_id)
            .await
            .map_err(|e| e.into_auth("get_client", "oauth_apps"))
    }

    async fn save_authorize(&self, data: &AuthorizeData) -> AuthResult<()> {
        if data.code.is_empty() {
            return Ok(());
        }
        let result: StorageResult<()> = async {
            let mut tx = self.pool().begin().await?;
            authorize::insert(&mut *tx, data).await?;
            expires::insert(&mut *tx, &data.code, data.expire_at().unix_timestamp()).await?;
            tx.commit().await?;
            Ok(())
        }
        .await;
        result.map_err(|e| e.into_auth("save_authorize", "oauth_authorize"))
    }

    async fn load_authorize(&self, code: &str) -> AuthResult<AuthorizeData> {
        let data = self
            .authorize_data(code)
            .await
            .map_err(|e| e.into_auth("load_authorize", "oauth_authorize"))?;
        if data.is_expired() {
            return Err(AuthError::expired("authorization code"));
        }
        Ok(data)
    }

    async fn remove_authorize(&self, code: &str) -> AuthResult<()> {
        let result: StorageResult<()> = async {
            let mut tx = self.pool().begin().await?;
            authorize::delete(&mut *tx, code).await?;
            expires::delete(&mut *tx, code).await?;
            tx.commit().await?;
            Ok(())
        }
        .await;
        result.map_err(|e| e.into_auth("remove_authorize", "oauth_authorize"))
    }

    async fn save_access(&self, data: &AccessData) -> AuthResult<()> {
        self.save_access_rows(data)
            .await
            .map_err(|e| e.into_auth("save_access", "oauth_access"))
    }

    async fn load_access(&self, token: &str) -> AuthResult<AccessData> {
        self.access_data(token)
            .await
            .map_err(|e| e.into_auth("load_access", "oauth_access"))
    }

    async fn remove_access(&self, token: &str) -> AuthResult<()> {
        let result: StorageResult<()> = async {
            let mut tx = self.pool().begin().await?;
            access::delete(&mut *tx, token).await?;
            expires::delete(&mut *tx, token).await?;
            tx.commit().await?;
            Ok(())
        }
        .await;
        result.map_err(|e| e.into_auth("remove_access", "oauth_access"))
    }

    async fn load_refresh(&self, token: &str) -> AuthResult<AccessData> {
        let result: StorageResult<AccessData> = async {
            let access_token = access::find_refresh(self.pool(), token)
                .await?
                .ok_or_else(|| StorageError::not_found("refresh token"))?;
            self.access_data(&access_token).await
        }
        .await;
        result.map_err(|e| e.into_auth("load_refresh", "oauth_refresh"))
    }

    async fn remove_refresh(&self, token: &str) -> AuthResult<()> {
        access::delete_refresh(self.pool(), token)
            .await
            .map_err(|e| e.into_auth("remove_refresh", "oauth_refresh"))
    }
}
