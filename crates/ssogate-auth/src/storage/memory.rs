use async_trait::async_trait;
use dashmap::DashMap;
use time::OffsetDateTime;

use super::Storage;
use crate::error::{AuthError, AuthResult};
use crate::types::{AccessData, AuthorizeData, Client};

/// Map-backed storage.
///
/// Expired codes are reported as `Expired` on load and otherwise left in
/// place until removed. Nothing is persisted.
#[derive(Debug, Default)]
pub struct MemoryStorage {
    clients: DashMap<String, Client>,
    authorize: DashMap<String, AuthorizeData>,
    access: DashMap<String, AccessData>,
    refresh: DashMap<String, String>,
}

impl MemoryStorage {
    /// Creates empty storage.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers or replaces a client.
    pub fn set_client(&self, client: Client) {
        self.clients.insert(client.id.clone(), client);
    }

    /// Number of stored authorization codes.
    #[must_use]
    pub fn authorize_count(&self) -> usize {
        self.authorize.len()
    }

    /// Number of stored access tokens.
    #[must_use]
    pub fn access_count(&self) -> usize {
        self.access.len()
    }
}

#[async_trait]
impl Storage for MemoryStorage {
    async fn get_client(&self, client_id: &str) -> AuthResult<Client> {
        self.clients
            .get(client_id)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| AuthError::not_found(format!("client {client_id}")))
    }

    async fn save_authorize(&self, data: &AuthorizeData) -> AuthResult<()> {
        if data.code.is_empty() {
            return Ok(());
        }
        self.authorize.insert(data.code.clone(), data.clone());
        Ok(())
    }

    async fn load_authorize(&self, code: &str) -> AuthResult<AuthorizeData> {
        let data = self
            .authorize
            .get(code)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| AuthError::not_found("authorization code"))?;
        if data.is_expired_at(OffsetDateTime::now_utc()) {
            return Err(AuthError::expired("authorization code"));
        }
        Ok(data)
    }

    async fn remove_authorize(&self, code: &str) -> AuthResult<()> {
        self.authorize.remove(code);
        Ok(())
    }

    async fn save_access(&self, data: &AccessData) -> AuthResult<()> {
        if let Some(refresh) = &data.refresh_token {
            self.refresh
                .insert(refresh.clone(), data.access_token.clone());
        }
        self.access.insert(data.access_token.clone(), data.clone());
        Ok(())
    }

    async fn load_access(&self, token: &str) -> AuthResult<AccessData> {
        self.access
            .get(token)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| AuthError::not_found("access token"))
    }

    async fn remove_access(&self, token: &str) -> AuthResult<()> {
        self.access.remove(token);
        Ok(())
    }

    async fn load_refresh(&self, token: &str) -> AuthResult<AccessData> {
        let access_token = self
            .refresh
            .get(token)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| AuthError::not_found("refresh token"))?;
        self.load_access(&access_token).await
    }

    async fn remove_refresh(&self, token: &str) -> AuthResult<()> {
        self.refresh.remove(token);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Lineage;

    fn access(token: &str, refresh: Option<&str>) -> AccessData {
        AccessData {
            client: Client::new("1234", "aabbccdd", "http://localhost/cb"),
            access_token: token.to_string(),
            refresh_token: refresh.map(str::to_string),
            expires_in: 3600,
            scope: String::new(),
            redirect_uri: "http://localhost/cb".to_string(),
            created_at: OffsetDateTime::now_utc(),
            user_data: None,
            lineage: Lineage::None,
            parent_token: None,
            client_ip: String::new(),
            user_agent: String::new(),
        }
    }

    #[tokio::test]
    async fn refresh_resolves_to_access() {
        let storage = MemoryStorage::new();
        storage.save_access(&access("a1", Some("r1"))).await.unwrap();

        let loaded = storage.load_refresh("r1").await.unwrap();
        assert_eq!(loaded.access_token, "a1");

        storage.remove_access("a1").await.unwrap();
        assert!(storage.load_refresh("r1").await.unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn unknown_client_is_not_found() {
        let storage = MemoryStorage::new();
        assert!(storage.get_client("nope").await.unwrap_err().is_not_found());
    }
}
