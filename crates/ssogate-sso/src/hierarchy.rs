//! The three-level token hierarchy: user index, parent session, sub session.
//!
//! Invariants maintained here:
//!
//! - a sub session resolves only while its parent session is live
//! - container records never shorten their expiry while live
//! - removing a parent session soft-deletes its sub sessions and unlinks it
//!   from every user index before the parent itself is retired
//!
//! Record writes are read-modify-write of one serialized value. Concurrent
//! writers to the same parent session are last-writer-wins.

use std::sync::Arc;

use serde::Serialize;
use serde::de::DeserializeOwned;
use ssogate_auth::types::now_unix;
use ssogate_auth::{AuthError, AuthResult, SsoData, Token};

use crate::config::SsoConfig;
use crate::expiry::extend_expiry;
use crate::records::{ParentSession, RecordView, SubSession, UserIndex, UserMetadata};
use crate::store::{KeyTtl, KvStore};

/// Handle over the hierarchy records in a [`KvStore`].
#[derive(Debug, Clone)]
pub struct TokenHierarchy {
    store: KvStore,
    config: Arc<SsoConfig>,
}

impl TokenHierarchy {
    pub fn new(store: KvStore, config: Arc<SsoConfig>) -> Self {
        Self { store, config }
    }

    pub fn store(&self) -> &KvStore {
        &self.store
    }

    pub fn config(&self) -> &SsoConfig {
        &self.config
    }

    // ========================================================================
    // Record I/O
    // ========================================================================

    pub(crate) async fn read<T: DeserializeOwned>(&self, key: &str) -> AuthResult<Option<T>> {
        match self.store.get(key).await? {
            Some(raw) => serde_json::from_str(&raw)
                .map(Some)
                .map_err(AuthError::serialization),
            None => Ok(None),
        }
    }

    /// Writes `record` so that its key expires at `expires_at`. A record whose
    /// expiry has already passed is deleted instead.
    pub(crate) async fn write<T: Serialize>(
        &self,
        key: &str,
        record: &T,
        expires_at: i64,
        now: i64,
    ) -> AuthResult<()> {
        let remaining = expires_at.saturating_sub(now);
        if remaining <= 0 {
            return self.store.del(key).await;
        }
        let raw = serde_json::to_string(record)?;
        self.store
            .set_ex(key, &raw, u64::try_from(remaining).unwrap_or(u64::MAX))
            .await
    }

    async fn view<T: DeserializeOwned>(&self, key: &str) -> AuthResult<Option<RecordView<T>>> {
        let Some(record) = self.read::<T>(key).await? else {
            return Ok(None);
        };
        let ttl = match self.store.ttl(key).await? {
            KeyTtl::Missing => return Ok(None),
            KeyTtl::Persistent => None,
            KeyTtl::Expires(secs) => Some(secs),
        };
        Ok(Some(RecordView { record, ttl }))
    }

    /// Shortens a key to the grace period. Keys already inside the grace
    /// window, or absent, are left alone.
    async fn soft_delete(&self, key: &str) -> AuthResult<()> {
        let grace = self.config.grace_secs();
        let extend = match self.store.ttl(key).await? {
            KeyTtl::Missing => false,
            KeyTtl::Persistent => true,
            KeyTtl::Expires(secs) => secs > grace,
        };
        if extend {
            self.store
                .expire(key, u64::try_from(grace).unwrap_or(1))
                .await?;
        }
        Ok(())
    }

    // ========================================================================
    // User index
    // ========================================================================

    pub async fn user_index(&self, uid: i64) -> AuthResult<Option<RecordView<UserIndex>>> {
        self.view(&self.config.keys.user_index(uid)).await
    }

    async fn link_user(&self, uid: i64, parent: &Token, now: i64) -> AuthResult<()> {
        let key = self.config.keys.user_index(uid);
        let mut index = self.read::<UserIndex>(&key).await?.unwrap_or_default();
        if index.ctime == 0 {
            index.ctime = now;
        }

        let admission = index.parent_sessions.admit(parent.clone(), now);
        extend_expiry(&mut index.expires_at, admission.expires_at);
        if !admission.expired.is_empty() {
            tracing::debug!(uid, expired = admission.expired.len(), "Collected expired parent sessions");
        }

        self.write(&key, &index, index.expires_at, now).await
    }

    async fn unlink_user(&self, uid: i64, parent_token: &str, now: i64) -> AuthResult<()> {
        let key = self.config.keys.user_index(uid);
        let Some(mut index) = self.read::<UserIndex>(&key).await? else {
            return Ok(());
        };
        if index.parent_sessions.remove(parent_token).is_none() {
            return Ok(());
        }
        self.write(&key, &index, index.expires_at, now).await
    }

    // ========================================================================
    // Parent session
    // ========================================================================

    pub async fn parent_session(&self, token: &str) -> AuthResult<Option<RecordView<ParentSession>>> {
        self.view(&self.config.keys.parent_session(token)).await
    }

    /// Loads a parent session that can still resolve tokens.
    pub async fn live_parent(&self, token: &str) -> AuthResult<ParentSession> {
        let now = now_unix();
        match self
            .read::<ParentSession>(&self.config.keys.parent_session(token))
            .await?
        {
            Some(parent) if parent.is_live_at(now) => Ok(parent),
            _ => Err(AuthError::not_found("parent session")),
        }
    }

    /// Creates a parent session for `sso`, or adds its uid to the existing
    /// session when the parent token is being reused.
    ///
    /// The user index is linked first, so a crash in between leaves an index
    /// entry pointing at a missing parent, which lookups tolerate.
    pub async fn create_parent_session(&self, sso: &SsoData) -> AuthResult<()> {
        let now = now_unix();
        let parent = &sso.parent_token;
        let key = self.config.keys.parent_session(&parent.token);

        let existing = self.read::<ParentSession>(&key).await?;
        if existing.as_ref().is_some_and(|session| session.revoked) {
            return Err(AuthError::invalid_input("parent session has been revoked"));
        }

        self.link_user(sso.uid, parent, now).await?;

        let metadata = UserMetadata {
            ctime: now,
            platform: sso.platform.clone(),
            client_ip: sso.client_ip.clone(),
            user_agent: sso.user_agent.clone(),
        };

        let mut session = existing.unwrap_or_else(|| ParentSession {
            ctime: now,
            ..Default::default()
        });
        session.expires_in = parent.expires_in;
        extend_expiry(&mut session.expires_at, now.saturating_add(parent.expires_in));

        let displaced = if self.config.enable_multiple_accounts {
            if !session.uids.contains(&sso.uid) {
                session.uids.push(sso.uid);
            }
            Vec::new()
        } else {
            let displaced: Vec<i64> = session
                .uids
                .iter()
                .copied()
                .filter(|uid| *uid != sso.uid)
                .collect();
            session.uids = vec![sso.uid];
            session.users.retain(|uid, _| *uid == sso.uid);
            displaced
        };
        session.users.insert(sso.uid, metadata);

        self.write(&key, &session, session.expires_at, now).await?;

        for uid in displaced {
            self.unlink_user(uid, &parent.token, now).await?;
        }

        tracing::debug!(uid = sso.uid, uids = session.uids.len(), "Parent session recorded");
        Ok(())
    }

    /// Extends a live parent session by its own lifetime, and each user index
    /// entry pointing at it.
    pub async fn renew_parent_session(&self, token: &str) -> AuthResult<()> {
        let now = now_unix();
        let mut session = self.live_parent(token).await?;
        let renewed = Token {
            token: token.to_string(),
            auth_at: now,
            expires_in: session.expires_in,
        };

        extend_expiry(&mut session.expires_at, renewed.expires_at());
        self.write(
            &self.config.keys.parent_session(token),
            &session,
            session.expires_at,
            now,
        )
        .await?;

        for uid in &session.uids {
            self.link_user(*uid, &renewed, now).await?;
        }
        Ok(())
    }

    /// Revokes a parent session and everything under it.
    ///
    /// Order: sub sessions are soft-deleted, then user indexes are unlinked,
    /// then the parent is marked revoked and left to expire after the grace
    /// period. Removing an unknown session is not an error.
    pub async fn remove_parent_session(&self, token: &str) -> AuthResult<()> {
        let now = now_unix();
        let key = self.config.keys.parent_session(token);
        let Some(mut session) = self.read::<ParentSession>(&key).await? else {
            return Ok(());
        };
        if session.revoked {
            return Ok(());
        }

        let subs: Vec<String> = session.sub_sessions.keys().map(str::to_string).collect();
        for sub in &subs {
            self.soft_delete(&self.config.keys.sub_session(sub)).await?;
            session.sub_sessions.remove(sub);
        }

        for uid in &session.uids {
            self.unlink_user(*uid, token, now).await?;
        }

        session.revoked = true;
        self.write(&key, &session, now.saturating_add(self.config.grace_secs()), now)
            .await?;

        tracing::info!(
            sub_sessions = subs.len(),
            uids = session.uids.len(),
            "Parent session removed"
        );
        Ok(())
    }

    // ========================================================================
    // Sub session
    // ========================================================================

    pub async fn sub_session(&self, token: &str) -> AuthResult<Option<RecordView<SubSession>>> {
        self.view(&self.config.keys.sub_session(token)).await
    }

    /// Records `sub` under its parent. Returns the parent's expiry.
    pub async fn create_sub_session(&self, token: &Token, sub: &SubSession) -> AuthResult<i64> {
        let now = now_unix();
        let parent_key = self.config.keys.parent_session(&sub.parent_token);
        let mut parent = match self.read::<ParentSession>(&parent_key).await? {
            Some(parent) if parent.is_live_at(now) => parent,
            _ => return Err(AuthError::not_found("parent session")),
        };

        let admission = parent.sub_sessions.admit(token.clone(), now);
        extend_expiry(&mut parent.expires_at, admission.expires_at);
        self.write(&parent_key, &parent, parent.expires_at, now).await?;

        self.write(
            &self.config.keys.sub_session(&token.token),
            sub,
            token.expires_at(),
            now,
        )
        .await?;
        Ok(parent.expires_at)
    }

    /// Loads a sub session whose parent is live.
    pub async fn live_sub_session(&self, token: &str) -> AuthResult<(SubSession, ParentSession)> {
        let sub = self
            .read::<SubSession>(&self.config.keys.sub_session(token))
            .await?
            .ok_or_else(|| AuthError::not_found("sub session"))?;
        let parent = self.live_parent(&sub.parent_token).await?;
        Ok((sub, parent))
    }

    /// Parent token of a sub token. Fails unless both records are live.
    pub async fn parent_token_of(&self, token: &str) -> AuthResult<String> {
        self.live_sub_session(token)
            .await
            .map(|(sub, _)| sub.parent_token)
    }

    /// Soft-deletes a sub session and drops it from its parent.
    pub async fn remove_sub_session(&self, token: &str) -> AuthResult<()> {
        let key = self.config.keys.sub_session(token);
        let Some(sub) = self.read::<SubSession>(&key).await? else {
            return Ok(());
        };
        self.soft_delete(&key).await?;

        let now = now_unix();
        let parent_key = self.config.keys.parent_session(&sub.parent_token);
        if let Some(mut parent) = self.read::<ParentSession>(&parent_key).await?
            && !parent.revoked
            && parent.sub_sessions.remove(token).is_some()
        {
            self.write(&parent_key, &parent, parent.expires_at, now).await?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hierarchy(multi: bool) -> TokenHierarchy {
        let config = SsoConfig {
            enable_multiple_accounts: multi,
            ..Default::default()
        };
        TokenHierarchy::new(KvStore::new_memory(), Arc::new(config))
    }

    fn sso(parent: &Token, uid: i64) -> SsoData {
        SsoData {
            parent_token: parent.clone(),
            uid,
            platform: "web".to_string(),
            client_ip: "127.0.0.1".to_string(),
            user_agent: "test".to_string(),
            ctime: now_unix(),
        }
    }

    #[tokio::test]
    async fn parent_session_links_user_index() {
        let h = hierarchy(false);
        let parent = Token::new(3600);
        h.create_parent_session(&sso(&parent, 7)).await.unwrap();

        let session = h.live_parent(&parent.token).await.unwrap();
        assert_eq!(session.uids, vec![7]);
        assert_eq!(session.users[&7].platform, "web");

        let index = h.user_index(7).await.unwrap().unwrap();
        assert!(index.record.parent_sessions.contains(&parent.token));
        assert!(index.ttl.unwrap() > 3500);
    }

    #[tokio::test]
    async fn revoked_parent_cannot_be_recreated() {
        let h = hierarchy(false);
        let parent = Token::new(3600);
        h.create_parent_session(&sso(&parent, 7)).await.unwrap();
        h.remove_parent_session(&parent.token).await.unwrap();

        let err = h.create_parent_session(&sso(&parent, 7)).await.unwrap_err();
        assert!(matches!(err, AuthError::InvalidInput { .. }));
        assert!(h.live_parent(&parent.token).await.unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn sub_session_requires_live_parent() {
        let h = hierarchy(false);
        let sub = SubSession {
            ctime: now_unix(),
            parent_token: "missing".to_string(),
            client_id: "1234".to_string(),
            client_ip: String::new(),
            user_agent: String::new(),
            access: crate::records::AccessSnapshot {
                client_id: "1234".to_string(),
                access_token: "a".to_string(),
                refresh_token: None,
                previous_token: None,
                authorize_code: None,
                scope: String::new(),
                redirect_uri: String::new(),
                expires_in: 60,
                ctime: now_unix(),
                user_data: None,
            },
        };
        let err = h.create_sub_session(&Token::new(60), &sub).await.unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn removing_unknown_parent_is_noop() {
        let h = hierarchy(true);
        h.remove_parent_session("nope").await.unwrap();
        h.remove_sub_session("nope").await.unwrap();
    }
}
