//! Token containers with a most-recent-first expiry index.
//!
//! Every container record (parent session, user index) tracks its members in a
//! [`TokenSet`]. Admitting a member garbage-collects expired members first,
//! then pushes the new one to the front of the index.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use ssogate_auth::Token;

/// One slot of the expiry index.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExpiryEntry {
    /// Member key (the member's token string).
    pub key: String,
    /// Absolute expiry in Unix seconds.
    pub expires_at: i64,
}

/// Result of [`TokenSet::admit`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Admission {
    /// Members removed because they had expired.
    pub expired: Vec<String>,
    /// Absolute expiry of the admitted member.
    pub expires_at: i64,
}

/// Members of a container record keyed by token string.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TokenSet {
    /// Member tokens.
    #[serde(default)]
    pub entries: BTreeMap<String, Token>,
    /// Expiry index, newest first. At most one slot per key.
    #[serde(default)]
    pub expiry_index: Vec<ExpiryEntry>,
}

impl TokenSet {
    /// Admits `token` under its own token string as of `now`.
    ///
    /// Expired slots are dropped along with their entries, any slot for the
    /// same key is replaced, and the new slot goes to the front.
    pub fn admit(&mut self, token: Token, now: i64) -> Admission {
        let key = token.token.clone();
        let expires_at = now.saturating_add(token.expires_in);

        let (expired, live): (Vec<ExpiryEntry>, Vec<ExpiryEntry>) = self
            .expiry_index
            .drain(..)
            .partition(|entry| entry.expires_at <= now);

        let expired: Vec<String> = expired
            .into_iter()
            .map(|entry| {
                self.entries.remove(&entry.key);
                entry.key
            })
            .collect();

        let mut index = Vec::with_capacity(live.len() + 1);
        index.push(ExpiryEntry {
            key: key.clone(),
            expires_at,
        });
        index.extend(live.into_iter().filter(|entry| entry.key != key));
        self.expiry_index = index;
        self.entries.insert(key, token);

        Admission {
            expired,
            expires_at,
        }
    }

    /// Removes a member. Returns the removed token, if present.
    pub fn remove(&mut self, key: &str) -> Option<Token> {
        self.expiry_index.retain(|entry| entry.key != key);
        self.entries.remove(key)
    }

    #[must_use]
    pub fn contains(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    /// Every tracked member key, newest first.
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.expiry_index.iter().map(|entry| entry.key.as_str())
    }

    /// Member keys still live at `now`, newest first.
    pub fn live_keys(&self, now: i64) -> impl Iterator<Item = &str> {
        self.expiry_index
            .iter()
            .filter(move |entry| entry.expires_at > now)
            .map(|entry| entry.key.as_str())
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Raises `current` to `candidate` if it is later. Returns whether it moved.
pub fn extend_expiry(current: &mut i64, candidate: i64) -> bool {
    if candidate > *current {
        *current = candidate;
        true
    } else {
        false
    }
}
