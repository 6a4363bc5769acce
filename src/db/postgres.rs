use async_trait::async_trait;
use chrono::{DateTime, Utc};
use deadpool_postgres::{Config, ManagerConfig, Pool, PoolConfig, RecyclingMethod, Runtime};
use serde_json::{json, Value};
use tokio_postgres::types::ToSql;
use tokio_postgres::{NoTls, Row};
use uuid::Uuid;

use super::backend::{Credential, DocumentMutation, DocumentStore, Session};
use super::sanitize::{validate_collection_name, validate_identifier};
use crate::types::{Document, FieldFilter, FilterOp};

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS documents (
    id UUID PRIMARY KEY DEFAULT gen_random_uuid(),
    collection VARCHAR(64) NOT NULL,
    data JSONB NOT NULL,
    created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
    updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
);
CREATE INDEX IF NOT EXISTS idx_documents_collection ON documents(collection, created_at);
CREATE INDEX IF NOT EXISTS idx_documents_data ON documents USING GIN(data);

CREATE TABLE IF NOT EXISTS credentials (
    user_id UUID PRIMARY KEY,
    email VARCHAR(320) NOT NULL UNIQUE,
    password_hash TEXT NOT NULL,
    created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
    updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
);

CREATE TABLE IF NOT EXISTS sessions (
    id UUID PRIMARY KEY,
    user_id UUID NOT NULL,
    token_hash VARCHAR(64) NOT NULL UNIQUE,
    expires_at TIMESTAMPTZ NOT NULL,
    created_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
);
CREATE INDEX IF NOT EXISTS idx_sessions_user ON sessions(user_id);
CREATE INDEX IF NOT EXISTS idx_sessions_expiry ON sessions(expires_at);
"#;

const DOC_COLUMNS: &str = "id, collection, data, created_at, updated_at";

type Param = Box<dyn ToSql + Sync + Send>;

pub struct PostgresBackend {
  pool: Pool,
}

impl PostgresBackend {
  pub fn new(url: &str, max_connections: usize) -> Result<Self, anyhow::Error> {
    let mut cfg = Config::new();
    cfg.url = Some(url.into());
    cfg.manager = Some(ManagerConfig {
      recycling_method: RecyclingMethod::Fast,
    });
    cfg.pool = Some(PoolConfig::new(max_connections.max(1)));
    let pool = cfg.create_pool(Some(Runtime::Tokio1), NoTls)?;
    Ok(Self { pool })
  }
}

fn row_to_doc(row: &Row) -> Document {
  Document {
    id: row.get("id"),
    collection: row.get("collection"),
    data: row.get("data"),
    created_at: row.get("created_at"),
    updated_at: row.get("updated_at"),
  }
}

fn row_to_credential(row: &Row) -> Credential {
  Credential {
    user_id: row.get("user_id"),
    email: row.get("email"),
    password_hash: row.get("password_hash"),
    created_at: row.get("created_at"),
    updated_at: row.get("updated_at"),
  }
}

fn row_to_session(row: &Row) -> Session {
  Session {
    id: row.get("id"),
    user_id: row.get("user_id"),
    expires_at: row.get("expires_at"),
    created_at: row.get("created_at"),
  }
}

/// Builds the `AND ...` tail for a list query. Parameter numbering starts at
/// `$2`; `$1` is the collection.
fn compile_filters(filters: &[FieldFilter]) -> Result<(String, Vec<Param>), anyhow::Error> {
  let mut sql = String::new();
  let mut params: Vec<Param> = Vec::with_capacity(filters.len());
  for filter in filters {
    validate_identifier(&filter.field)?;
    let field = &filter.field;
    if filter.op == FilterOp::Eq && filter.value.is_null() {
      sql.push_str(&format!(
        " AND (data->'{0}' IS NULL OR data->'{0}' = 'null'::jsonb)",
        field
      ));
      continue;
    }
    let n = params.len() + 2;
    match filter.op {
      FilterOp::Eq => {
        sql.push_str(&format!(" AND data @> ${}::jsonb", n));
        params.push(Box::new(json!({ field.as_str(): filter.value })));
      }
      FilterOp::ArrayContains => {
        sql.push_str(&format!(" AND data @> ${}::jsonb", n));
        params.push(Box::new(json!({ field.as_str(): [filter.value] })));
      }
      FilterOp::Gte | FilterOp::Lte => {
        let op = if filter.op == FilterOp::Gte { ">=" } else { "<=" };
        sql.push_str(&format!(" AND data->>'{}' {} ${}", field, op, n));
        let text = match &filter.value {
          Value::String(s) => s.clone(),
          other => other.to_string(),
        };
        params.push(Box::new(text));
      }
    }
  }
  Ok((sql, params))
}

#[async_trait]
impl DocumentStore for PostgresBackend {
  async fn init_schema(&self) -> Result<(), anyhow::Error> {
    self.pool.get().await?.batch_execute(SCHEMA).await?;
    tracing::info!("PostgreSQL schema initialized");
    Ok(())
  }

  async fn ping(&self) -> Result<(), anyhow::Error> {
    self.pool.get().await?.execute("SELECT 1", &[]).await?;
    Ok(())
  }

  async fn insert(&self, collection: &str, data: Value) -> Result<Document, anyhow::Error> {
    validate_collection_name(collection)?;

    let id = Uuid::new_v4();
    let now = Utc::now();
    self.pool.get().await?.execute(
      "INSERT INTO documents (id, collection, data, created_at, updated_at) VALUES ($1, $2, $3, $4, $5)",
      &[&id, &collection, &data, &now, &now],
    ).await?;
    Ok(Document {
      id,
      collection: collection.into(),
      data,
      created_at: now,
      updated_at: now,
    })
  }

  async fn get(&self, collection: &str, id: Uuid) -> Result<Option<Document>, anyhow::Error> {
    validate_collection_name(collection)?;

    let row = self
      .pool
      .get()
      .await?
      .query_opt(
        &format!(
          "SELECT {} FROM documents WHERE collection = $1 AND id = $2",
          DOC_COLUMNS
        ),
        &[&collection, &id],
      )
      .await?;
    Ok(row.as_ref().map(row_to_doc))
  }

  async fn update(
    &self,
    collection: &str,
    id: Uuid,
    patch: Value,
  ) -> Result<Option<Document>, anyhow::Error> {
    validate_collection_name(collection)?;

    // jsonb `||` replaces top-level keys, which is the merge the trait promises
    let row = self
      .pool
      .get()
      .await?
      .query_opt(
        &format!(
          "UPDATE documents SET data = data || $1::jsonb, updated_at = NOW() WHERE collection = $2 AND id = $3 RETURNING {}",
          DOC_COLUMNS
        ),
        &[&patch, &collection, &id],
      )
      .await?;
    Ok(row.as_ref().map(row_to_doc))
  }

  async fn delete(&self, collection: &str, id: Uuid) -> Result<Option<Document>, anyhow::Error> {
    validate_collection_name(collection)?;

    let row = self
      .pool
      .get()
      .await?
      .query_opt(
        &format!(
          "DELETE FROM documents WHERE collection = $1 AND id = $2 RETURNING {}",
          DOC_COLUMNS
        ),
        &[&collection, &id],
      )
      .await?;
    Ok(row.as_ref().map(row_to_doc))
  }

  async fn list(
    &self,
    collection: &str,
    filters: &[FieldFilter],
  ) -> Result<Vec<Document>, anyhow::Error> {
    validate_collection_name(collection)?;

    let (clauses, mut params) = compile_filters(filters)?;
    params.insert(0, Box::new(collection.to_string()));
    let sql = format!(
      "SELECT {} FROM documents WHERE collection = $1{} ORDER BY created_at, id",
      DOC_COLUMNS, clauses
    );
    let refs: Vec<&(dyn ToSql + Sync)> = params
      .iter()
      .map(|p| p.as_ref() as &(dyn ToSql + Sync))
      .collect();

    let rows = self.pool.get().await?.query(&sql, &refs).await?;
    Ok(rows.iter().map(row_to_doc).collect())
  }

  async fn transform(
    &self,
    collection: &str,
    id: Uuid,
    mutation: DocumentMutation,
  ) -> Result<Option<Document>, anyhow::Error> {
    validate_collection_name(collection)?;

    let mut client = self.pool.get().await?;
    let tx = client.transaction().await?;
    let row = tx
      .query_opt(
        "SELECT data FROM documents WHERE collection = $1 AND id = $2 FOR UPDATE",
        &[&collection, &id],
      )
      .await?;
    let Some(row) = row else {
      return Ok(None);
    };

    let mut data: Value = row.get(0);
    mutation(&mut data);
    let row = tx
      .query_one(
        &format!(
          "UPDATE documents SET data = $1, updated_at = NOW() WHERE collection = $2 AND id = $3 RETURNING {}",
          DOC_COLUMNS
        ),
        &[&data, &collection, &id],
      )
      .await?;
    tx.commit().await?;
    Ok(Some(row_to_doc(&row)))
  }

  async fn create_credential(
    &self,
    user_id: Uuid,
    email: &str,
    password_hash: &str,
  ) -> Result<Credential, anyhow::Error> {
    let row = self
      .pool
      .get()
      .await?
      .query_one(
        "INSERT INTO credentials (user_id, email, password_hash) VALUES ($1, $2, $3)
         RETURNING user_id, email, password_hash, created_at, updated_at",
        &[&user_id, &email, &password_hash],
      )
      .await?;
    Ok(row_to_credential(&row))
  }

  async fn credential_by_email(&self, email: &str) -> Result<Option<Credential>, anyhow::Error> {
    let row = self
      .pool
      .get()
      .await?
      .query_opt(
        "SELECT user_id, email, password_hash, created_at, updated_at FROM credentials WHERE email = $1",
        &[&email],
      )
      .await?;
    Ok(row.as_ref().map(row_to_credential))
  }

  async fn credential(&self, user_id: Uuid) -> Result<Option<Credential>, anyhow::Error> {
    let row = self
      .pool
      .get()
      .await?
      .query_opt(
        "SELECT user_id, email, password_hash, created_at, updated_at FROM credentials WHERE user_id = $1",
        &[&user_id],
      )
      .await?;
    Ok(row.as_ref().map(row_to_credential))
  }

  async fn update_password(
    &self,
    user_id: Uuid,
    password_hash: &str,
  ) -> Result<bool, anyhow::Error> {
    let changed = self
      .pool
      .get()
      .await?
      .execute(
        "UPDATE credentials SET password_hash = $1, updated_at = NOW() WHERE user_id = $2",
        &[&password_hash, &user_id],
      )
      .await?;
    Ok(changed > 0)
  }

  async fn delete_credential(&self, user_id: Uuid) -> Result<bool, anyhow::Error> {
    let changed = self
      .pool
      .get()
      .await?
      .execute("DELETE FROM credentials WHERE user_id = $1", &[&user_id])
      .await?;
    Ok(changed > 0)
  }

  async fn create_session(
    &self,
    user_id: Uuid,
    token_hash: &str,
    expires_at: DateTime<Utc>,
  ) -> Result<Session, anyhow::Error> {
    let id = Uuid::new_v4();
    let row = self
      .pool
      .get()
      .await?
      .query_one(
        "INSERT INTO sessions (id, user_id, token_hash, expires_at) VALUES ($1, $2, $3, $4)
         RETURNING id, user_id, expires_at, created_at",
        &[&id, &user_id, &token_hash, &expires_at],
      )
      .await?;
    Ok(row_to_session(&row))
  }

  async fn find_session(&self, token_hash: &str) -> Result<Option<Session>, anyhow::Error> {
    let row = self
      .pool
      .get()
      .await?
      .query_opt(
        "SELECT id, user_id, expires_at, created_at FROM sessions WHERE token_hash = $1",
        &[&token_hash],
      )
      .await?;
    Ok(row.as_ref().map(row_to_session))
  }

  async fn delete_session(&self, id: Uuid) -> Result<bool, anyhow::Error> {
    let changed = self
      .pool
      .get()
      .await?
      .execute("DELETE FROM sessions WHERE id = $1", &[&id])
      .await?;
    Ok(changed > 0)
  }

  async fn delete_user_sessions(&self, user_id: Uuid) -> Result<u64, anyhow::Error> {
    Ok(
      self
        .pool
        .get()
        .await?
        .execute("DELETE FROM sessions WHERE user_id = $1", &[&user_id])
        .await?,
    )
  }

  async fn cleanup_expired_sessions(&self) -> Result<u64, anyhow::Error> {
    Ok(
      self
        .pool
        .get()
        .await?
        .execute("DELETE FROM sessions WHERE expires_at <= NOW()", &[])
        .await?,
    )
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_compile_filters_uses_containment_for_equality() {
    let (sql, params) = compile_filters(&[
      FieldFilter::eq("status", "pending"),
      FieldFilter::lte("createdAt", "2024-02-01T00:00:00.000Z"),
      FieldFilter::contains("targetAudience", "students"),
    ])
    .unwrap();
    assert_eq!(
      sql,
      " AND data @> $2::jsonb AND data->>'createdAt' <= $3 AND data @> $4::jsonb"
    );
    assert_eq!(params.len(), 3);
  }

  #[test]
  fn test_compile_filters_null_check_has_no_param() {
    let (sql, params) = compile_filters(&[FieldFilter::eq("studentId", Value::Null)]).unwrap();
    assert!(sql.contains("data->'studentId' IS NULL"));
    assert!(params.is_empty());
  }
}
