//! Password hashing and bearer session tokens.
//!
//! Tokens are 32 random bytes, hex encoded, handed to the client once. Only
//! their SHA-256 digest is stored, so a leaked sessions table cannot be
//! replayed.

use argon2::{
  password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
  Argon2,
};
use chrono::{Duration, Utc};
use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::db::{DocumentStore, Session};

/// Hash a password using Argon2id
pub fn hash_password(password: &str) -> Result<String, argon2::password_hash::Error> {
  let salt = SaltString::generate(&mut OsRng);
  let hash = Argon2::default().hash_password(password.as_bytes(), &salt)?;
  Ok(hash.to_string())
}

pub fn verify_password(password: &str, hash: &str) -> bool {
  let Ok(parsed) = PasswordHash::new(hash) else {
    return false;
  };
  Argon2::default()
    .verify_password(password.as_bytes(), &parsed)
    .is_ok()
}

pub fn generate_session_token() -> String {
  use rand::Rng;
  let bytes: [u8; 32] = rand::thread_rng().gen();
  hex::encode(bytes)
}

/// Digest under which a token is looked up.
pub fn hash_session_token(token: &str) -> String {
  let mut hasher = Sha256::new();
  hasher.update(token.as_bytes());
  hex::encode(hasher.finalize())
}

/// Bearer token from an `Authorization` header value.
pub fn bearer_token(header: &str) -> Option<&str> {
  let (scheme, token) = header.split_once(' ')?;
  let token = token.trim();
  (scheme.eq_ignore_ascii_case("bearer") && !token.is_empty()).then_some(token)
}

/// A freshly issued token. `token` is the only copy of the plaintext.
#[derive(Debug, Clone)]
pub struct IssuedSession {
  pub token: String,
  pub session: Session,
}

pub async fn issue_session(
  store: &dyn DocumentStore,
  user_id: Uuid,
  ttl_hours: u64,
) -> Result<IssuedSession, anyhow::Error> {
  let token = generate_session_token();
  let expires_at = Utc::now() + Duration::hours(ttl_hours as i64);
  let session = store
    .create_session(user_id, &hash_session_token(&token), expires_at)
    .await?;
  Ok(IssuedSession { token, session })
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_password_hash_and_verify() {
    let hash = hash_password("calm-waters-42").unwrap();
    assert!(verify_password("calm-waters-42", &hash));
    assert!(!verify_password("calm-waters-43", &hash));
    assert!(!verify_password("calm-waters-42", "not-a-phc-string"));
  }

  #[test]
  fn test_session_token_shape() {
    let token = generate_session_token();
    assert_eq!(token.len(), 64);
    assert_ne!(token, generate_session_token());
    let hash = hash_session_token(&token);
    assert_eq!(hash.len(), 64);
    assert_eq!(hash, hash_session_token(&token));
  }

  #[test]
  fn test_bearer_token_parsing() {
    assert_eq!(bearer_token("Bearer abc123"), Some("abc123"));
    assert_eq!(bearer_token("bearer  abc123 "), Some("abc123"));
    assert_eq!(bearer_token("Basic abc123"), None);
    assert_eq!(bearer_token("Bearer "), None);
    assert_eq!(bearer_token("abc123"), None);
  }
}
