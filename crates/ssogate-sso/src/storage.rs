//! [`Storage`] over the SSO hierarchy, plus the session API the front door
//! uses directly.

use std::sync::Arc;

use async_trait::async_trait;
use ssogate_auth::types::now_unix;
use ssogate_auth::{
    AccessData, AuthError, AuthResult, AuthorizeData, Client, Lineage, Storage, Token,
};
use time::OffsetDateTime;

use crate::config::SsoConfig;
use crate::hierarchy::TokenHierarchy;
use crate::records::{
    AccessSnapshot, ParentSession, RecordView, RefreshRecord, SubSession, UserIndex,
};
use crate::store::KvStore;

/// SSO-backed storage.
///
/// Authorization codes and the client directory are plain records. Access
/// tokens are sub sessions of the parent session named by
/// `AccessData::parent_token`, and refresh tokens point back at them.
#[derive(Debug, Clone)]
pub struct SsoStorage {
    hierarchy: TokenHierarchy,
}

impl SsoStorage {
    pub fn new(store: KvStore, config: SsoConfig) -> Self {
        Self {
            hierarchy: TokenHierarchy::new(store, Arc::new(config)),
        }
    }

    /// In-memory storage with default settings.
    pub fn in_memory() -> Self {
        Self::new(KvStore::new_memory(), SsoConfig::default())
    }

    pub fn hierarchy(&self) -> &TokenHierarchy {
        &self.hierarchy
    }

    fn keys(&self) -> &crate::config::KeyScheme {
        &self.hierarchy.config().keys
    }

    // ========================================================================
    // Client directory
    // ========================================================================

    /// Registers or replaces a client.
    pub async fn put_client(&self, client: &Client) -> AuthResult<()> {
        let raw = serde_json::to_string(client)?;
        self.hierarchy
            .store()
            .set(&self.keys().client(&client.id), &raw)
            .await
    }

    /// Removes a client. Tokens already issued to it stop loading.
    pub async fn delete_client(&self, client_id: &str) -> AuthResult<()> {
        self.hierarchy.store().del(&self.keys().client(client_id)).await
    }

    // ========================================================================
    // Session lookups
    // ========================================================================

    /// Uids logged into a live parent session.
    pub async fn get_uids_by_parent_token(&self, parent_token: &str) -> AuthResult<Vec<i64>> {
        let session = self.hierarchy.live_parent(parent_token).await?;
        Ok(session.uids)
    }

    /// Primary uid of a live parent session.
    pub async fn get_uid_by_parent_token(&self, parent_token: &str) -> AuthResult<i64> {
        self.get_uids_by_parent_token(parent_token)
            .await?
            .first()
            .copied()
            .ok_or_else(|| AuthError::not_found("uid"))
    }

    /// Uids of the parent session an access token belongs to.
    pub async fn get_uids_by_token(&self, token: &str) -> AuthResult<Vec<i64>> {
        let (_, parent) = self.hierarchy.live_sub_session(token).await?;
        Ok(parent.uids)
    }

    /// Primary uid of the parent session an access token belongs to.
    pub async fn get_uid_by_token(&self, token: &str) -> AuthResult<i64> {
        let (_, parent) = self.hierarchy.live_sub_session(token).await?;
        parent
            .primary_uid()
            .ok_or_else(|| AuthError::not_found("uid"))
    }

    /// Parent token an access token was issued under.
    pub async fn parent_token(&self, token: &str) -> AuthResult<String> {
        self.hierarchy.parent_token_of(token).await
    }

    // ========================================================================
    // Session maintenance
    // ========================================================================

    /// Logs out a parent session and every access token under it.
    pub async fn remove_parent_token(&self, parent_token: &str) -> AuthResult<()> {
        self.hierarchy.remove_parent_session(parent_token).await
    }

    /// Logs out the whole parent session an access token belongs to.
    pub async fn remove_all_access(&self, token: &str) -> AuthResult<()> {
        let parent_token = self.hierarchy.parent_token_of(token).await?;
        self.hierarchy.remove_parent_session(&parent_token).await
    }

    /// Extends a live parent session.
    pub async fn renew_parent_token(&self, parent_token: &str) -> AuthResult<()> {
        self.hierarchy.renew_parent_session(parent_token).await
    }

    // ========================================================================
    // Inspection
    // ========================================================================

    pub async fn parent_session(
        &self,
        parent_token: &str,
    ) -> AuthResult<Option<RecordView<ParentSession>>> {
        self.hierarchy.parent_session(parent_token).await
    }

    pub async fn user_index(&self, uid: i64) -> AuthResult<Option<RecordView<UserIndex>>> {
        self.hierarchy.user_index(uid).await
    }

    pub async fn sub_session(&self, token: &str) -> AuthResult<Option<RecordView<SubSession>>> {
        self.hierarchy.sub_session(token).await
    }

    // ========================================================================
    // Record assembly
    // ========================================================================

    /// Rebuilds an access record from its snapshot. The predecessor, if any,
    /// is attached without its own lineage.
    async fn assemble_access(
        &self,
        snapshot: &AccessSnapshot,
        parent_token: &str,
        client_ip: &str,
        user_agent: &str,
    ) -> AuthResult<AccessData> {
        let client = self.get_client(&snapshot.client_id).await?;
        let mut data = access_from_snapshot(client, snapshot, parent_token, client_ip, user_agent)?;

        if let Some(previous) = &snapshot.previous_token
            && let Some(view) = self.hierarchy.sub_session(previous).await?
        {
            let sub = view.record;
            let previous = access_from_snapshot(
                data.client.clone(),
                &sub.access,
                &sub.parent_token,
                &sub.client_ip,
                &sub.user_agent,
            )?;
            data.lineage = Lineage::Access(Box::new(previous));
        }
        Ok(data)
    }
}

fn access_from_snapshot(
    client: Client,
    snapshot: &AccessSnapshot,
    parent_token: &str,
    client_ip: &str,
    user_agent: &str,
) -> AuthResult<AccessData> {
    let created_at = OffsetDateTime::from_unix_timestamp(snapshot.ctime)
        .map_err(|e| AuthError::serialization(format!("access ctime: {e}")))?;
    Ok(AccessData {
        client,
        access_token: snapshot.access_token.clone(),
        refresh_token: snapshot.refresh_token.clone(),
        expires_in: snapshot.expires_in,
        scope: snapshot.scope.clone(),
        redirect_uri: snapshot.redirect_uri.clone(),
        created_at,
        user_data: snapshot.user_data.clone(),
        lineage: Lineage::None,
        parent_token: Some(parent_token.to_string()),
        client_ip: client_ip.to_string(),
        user_agent: user_agent.to_string(),
    })
}

#[async_trait]
impl Storage for SsoStorage {
    async fn get_client(&self, client_id: &str) -> AuthResult<Client> {
        let key = self.keys().client(client_id);
        self.hierarchy
            .read::<Client>(&key)
            .await?
            .ok_or_else(|| AuthError::not_found(format!("client {client_id}")))
    }

    async fn save_authorize(&self, data: &AuthorizeData) -> AuthResult<()> {
        let now = now_unix();
        if !data.code.is_empty() {
            let expires_at = data.created_at.unix_timestamp().saturating_add(data.expires_in);
            self.hierarchy
                .write(&self.keys().authorize(&data.code), data, expires_at, now)
                .await?;
        }
        if let Some(sso) = &data.sso_data {
            self.hierarchy.create_parent_session(sso).await?;
        }
        Ok(())
    }

    async fn load_authorize(&self, code: &str) -> AuthResult<AuthorizeData> {
        let data = self
            .hierarchy
            .read::<AuthorizeData>(&self.keys().authorize(code))
            .await?
            .ok_or_else(|| AuthError::not_found("authorization code"))?;
        if data.is_expired() {
            return Err(AuthError::expired("authorization code"));
        }
        Ok(data)
    }

    async fn remove_authorize(&self, code: &str) -> AuthResult<()> {
        self.hierarchy.store().del(&self.keys().authorize(code)).await
    }

    async fn save_access(&self, data: &AccessData) -> AuthResult<()> {
        let parent_token = match &data.parent_token {
            Some(token) => token.clone(),
            None => match data.previous_access_token() {
                Some(previous) => self.hierarchy.parent_token_of(previous).await?,
                None => {
                    return Err(AuthError::invalid_input(
                        "access token has no SSO parent session",
                    ));
                }
            },
        };

        let snapshot = AccessSnapshot::from_access(data);
        let token = Token {
            token: data.access_token.clone(),
            auth_at: snapshot.ctime,
            expires_in: data.expires_in,
        };
        let sub = SubSession {
            ctime: now_unix(),
            parent_token: parent_token.clone(),
            client_id: data.client.id.clone(),
            client_ip: data.client_ip.clone(),
            user_agent: data.user_agent.clone(),
            access: snapshot.clone(),
        };
        let parent_expires_at = self.hierarchy.create_sub_session(&token, &sub).await?;

        if let Some(refresh_token) = &data.refresh_token {
            let record = RefreshRecord {
                parent_token,
                client_ip: data.client_ip.clone(),
                user_agent: data.user_agent.clone(),
                access: snapshot,
            };
            self.hierarchy
                .write(
                    &self.keys().refresh(refresh_token),
                    &record,
                    parent_expires_at,
                    now_unix(),
                )
                .await?;
        }
        Ok(())
    }

    async fn load_access(&self, token: &str) -> AuthResult<AccessData> {
        let (sub, _) = self.hierarchy.live_sub_session(token).await?;
        self.assemble_access(&sub.access, &sub.parent_token, &sub.client_ip, &sub.user_agent)
            .await
    }

    async fn remove_access(&self, token: &str) -> AuthResult<()> {
        self.hierarchy.remove_sub_session(token).await
    }

    async fn load_refresh(&self, token: &str) -> AuthResult<AccessData> {
        let record = self
            .hierarchy
            .read::<RefreshRecord>(&self.keys().refresh(token))
            .await?
            .ok_or_else(|| AuthError::not_found("refresh token"))?;
        self.hierarchy.live_parent(&record.parent_token).await?;
        self.assemble_access(
            &record.access,
            &record.parent_token,
            &record.client_ip,
            &record.user_agent,
        )
        .await
    }

    async fn remove_refresh(&self, token: &str) -> AuthResult<()> {
        self.hierarchy.store().del(&self.keys().refresh(token)).await
    }
}
