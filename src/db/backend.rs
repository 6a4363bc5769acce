use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;
use uuid::Uuid;

use crate::types::{Document, FieldFilter};

/// Mutation run by [`DocumentStore::transform`] while the document is locked.
pub type DocumentMutation = Box<dyn FnOnce(&mut Value) + Send + 'static>;

/// Login credentials for a user document.
#[derive(Debug, Clone)]
pub struct Credential {
  pub user_id: Uuid,
  pub email: String,
  pub password_hash: String,
  pub created_at: DateTime<Utc>,
  pub updated_at: DateTime<Utc>,
}

/// A bearer session. Only the SHA-256 of the token is ever stored.
#[derive(Debug, Clone)]
pub struct Session {
  pub id: Uuid,
  pub user_id: Uuid,
  pub expires_at: DateTime<Utc>,
  pub created_at: DateTime<Utc>,
}

impl Session {
  pub fn is_expired(&self) -> bool {
    self.expires_at <= Utc::now()
  }
}

/// Persistence for collections of JSON documents plus the account tables.
#[async_trait]
pub trait DocumentStore: Send + Sync {
  async fn init_schema(&self) -> Result<(), anyhow::Error>;
  async fn ping(&self) -> Result<(), anyhow::Error>;

  // Documents
  async fn insert(&self, collection: &str, data: Value) -> Result<Document, anyhow::Error>;
  async fn get(&self, collection: &str, id: Uuid) -> Result<Option<Document>, anyhow::Error>;
  /// Shallow-merges `patch` into the stored document.
  async fn update(
    &self,
    collection: &str,
    id: Uuid,
    patch: Value,
  ) -> Result<Option<Document>, anyhow::Error>;
  async fn delete(&self, collection: &str, id: Uuid) -> Result<Option<Document>, anyhow::Error>;
  async fn list(
    &self,
    collection: &str,
    filters: &[FieldFilter],
  ) -> Result<Vec<Document>, anyhow::Error>;
  /// Atomic read-modify-write. Returns the document as stored after `mutation`.
  async fn transform(
    &self,
    collection: &str,
    id: Uuid,
    mutation: DocumentMutation,
  ) -> Result<Option<Document>, anyhow::Error>;

  // Credentials
  async fn create_credential(
    &self,
    user_id: Uuid,
    email: &str,
    password_hash: &str,
  ) -> Result<Credential, anyhow::Error>;
  async fn credential_by_email(&self, email: &str) -> Result<Option<Credential>, anyhow::Error>;
  async fn credential(&self, user_id: Uuid) -> Result<Option<Credential>, anyhow::Error>;
  async fn update_password(&self, user_id: Uuid, password_hash: &str)
    -> Result<bool, anyhow::Error>;
  async fn delete_credential(&self, user_id: Uuid) -> Result<bool, anyhow::Error>;

  // Sessions
  async fn create_session(
    &self,
    user_id: Uuid,
    token_hash: &str,
    expires_at: DateTime<Utc>,
  ) -> Result<Session, anyhow::Error>;
  async fn find_session(&self, token_hash: &str) -> Result<Option<Session>, anyhow::Error>;
  async fn delete_session(&self, id: Uuid) -> Result<bool, anyhow::Error>;
  async fn delete_user_sessions(&self, user_id: Uuid) -> Result<u64, anyhow::Error>;
  async fn cleanup_expired_sessions(&self) -> Result<u64, anyhow::Error>;
}
