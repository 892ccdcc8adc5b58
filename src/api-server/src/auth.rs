//! Password digests and session tokens

use argon2::{
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use clinic_rbac::UserId;
use parking_lot::RwLock;
use std::collections::HashMap;
use uuid::Uuid;

use crate::error::{ApiError, Result};

/// Argon2id digest in PHC string format
pub fn hash_password(password: &str) -> Result<String> {
    let salt = SaltString::encode_b64(Uuid::new_v4().as_bytes())
        .map_err(|e| ApiError::Internal(format!("salt encoding failed: {}", e)))?;
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| ApiError::Internal(format!("password hashing failed: {}", e)))
}

/// Check a password against a stored PHC string; malformed digests never match
pub fn verify_password(password: &str, stored: &str) -> bool {
    PasswordHash::new(stored).is_ok_and(|parsed| {
        Argon2::default()
            .verify_password(password.as_bytes(), &parsed)
            .is_ok()
    })
}

/// Opaque bearer tokens issued at login
#[derive(Default)]
pub struct SessionStore {
    sessions: RwLock<HashMap<String, UserId>>,
}

impl SessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start a session and return its token
    pub fn issue(&self, user: UserId) -> String {
        let token = Uuid::new_v4().to_string();
        self.sessions.write().insert(token.clone(), user);
        token
    }

    pub fn resolve(&self, token: &str) -> Option<UserId> {
        self.sessions.read().get(token).copied()
    }

    pub fn revoke(&self, token: &str) -> bool {
        self.sessions.write().remove(token).is_some()
    }

    pub fn len(&self) -> usize {
        self.sessions.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.read().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_password_round_trip() {
        let stored = hash_password("correct horse").unwrap();
        assert!(verify_password("correct horse", &stored));
        assert!(!verify_password("wrong horse", &stored));
        assert!(!verify_password("correct horse", "garbage"));
    }

    #[test]
    fn test_digests_are_salted() {
        assert_ne!(
            hash_password("same").unwrap(),
            hash_password("same").unwrap()
        );
    }

    #[test]
    fn test_digest_is_argon2_phc_string() {
        let stored = hash_password("correct horse").unwrap();
        assert!(stored.starts_with("$argon2id$"), "{}", stored);
        assert!(!stored.contains("correct horse"));
    }

    #[test]
    fn test_session_lifecycle() {
        let sessions = SessionStore::new();
        let token = sessions.issue(UserId(5));

        assert_eq!(sessions.resolve(&token), Some(UserId(5)));
        assert!(sessions.revoke(&token));
        assert_eq!(sessions.resolve(&token), None);
        assert!(sessions.is_empty());
    }
}
