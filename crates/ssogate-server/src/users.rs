//! Password sign-in for resource owners.

use std::collections::HashMap;

use argon2::{
    Argon2,
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString, rand_core::OsRng},
};

use crate::config::UserCredential;

/// Username to credential lookup.
#[derive(Debug, Clone, Default)]
pub struct UserDirectory {
    users: HashMap<String, UserCredential>,
}

impl UserDirectory {
    pub fn new(users: &[UserCredential]) -> Self {
        Self {
            users: users
                .iter()
                .map(|user| (user.username.clone(), user.clone()))
                .collect(),
        }
    }

    /// Uid of the user if the password matches.
    ///
    /// Unknown users and malformed hashes both verify as `None`.
    pub fn verify(&self, username: &str, password: &str) -> Option<i64> {
        let user = self.users.get(username)?;
        let parsed_hash = match PasswordHash::new(&user.password_hash) {
            Ok(hash) => hash,
            Err(e) => {
                tracing::warn!(username = %username, error = %e, "Malformed password hash");
                return None;
            }
        };
        Argon2::default()
            .verify_password(password.as_bytes(), &parsed_hash)
            .ok()
            .map(|()| user.uid)
    }

    pub fn len(&self) -> usize {
        self.users.len()
    }

    pub fn is_empty(&self) -> bool {
        self.users.is_empty()
    }
}

/// Hash a password into an Argon2id PHC string.
pub fn hash_password(password: &str) -> Result<String, argon2::password_hash::Error> {
    let salt = SaltString::generate(&mut OsRng);
    let hash = Argon2::default().hash_password(password.as_bytes(), &salt)?;
    Ok(hash.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn directory() -> UserDirectory {
        UserDirectory::new(&[
            UserCredential {
                uid: 7,
                username: "alice".into(),
                password_hash: hash_password("wonderland").unwrap(),
            },
            UserCredential {
                uid: 8,
                username: "broken".into(),
                password_hash: "not-a-phc-string".into(),
            },
        ])
    }

    #[test]
    fn verifies_correct_password() {
        assert_eq!(directory().verify("alice", "wonderland"), Some(7));
    }

    #[test]
    fn rejects_wrong_password_and_unknown_user() {
        let users = directory();
        assert_eq!(users.verify("alice", "nope"), None);
        assert_eq!(users.verify("bob", "wonderland"), None);
        assert_eq!(users.verify("broken", "anything"), None);
    }

    #[test]
    fn hashes_are_salted() {
        let a = hash_password("pw").unwrap();
        let b = hash_password("pw").unwrap();
        assert_ne!(a, b);
        assert!(a.starts_with("$argon2id$"));
    }
}
