use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::types::Value as SqlValue;
use rusqlite::{params, params_from_iter, OptionalExtension};
use serde_json::Value;
use tokio_rusqlite::Connection;
use uuid::Uuid;

use super::backend::{Credential, DocumentMutation, DocumentStore, Session};
use super::sanitize::{validate_collection_name, validate_identifier};
use crate::types::{merge_patch, Document, FieldFilter, FilterOp};

const PRAGMAS: &str = r#"
PRAGMA journal_mode = WAL;
PRAGMA synchronous = NORMAL;
PRAGMA cache_size = -64000;
PRAGMA temp_store = MEMORY;
PRAGMA foreign_keys = ON;
"#;

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS documents (
    id TEXT PRIMARY KEY,
    collection TEXT NOT NULL,
    data TEXT NOT NULL,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
) WITHOUT ROWID;
CREATE INDEX IF NOT EXISTS idx_documents_collection ON documents(collection, created_at);

CREATE TABLE IF NOT EXISTS credentials (
    user_id TEXT PRIMARY KEY,
    email TEXT NOT NULL UNIQUE,
    password_hash TEXT NOT NULL,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
) WITHOUT ROWID;

CREATE TABLE IF NOT EXISTS sessions (
    id TEXT PRIMARY KEY,
    user_id TEXT NOT NULL,
    token_hash TEXT NOT NULL UNIQUE,
    expires_at TEXT NOT NULL,
    created_at TEXT NOT NULL
) WITHOUT ROWID;
CREATE INDEX IF NOT EXISTS idx_sessions_user ON sessions(user_id);
CREATE INDEX IF NOT EXISTS idx_sessions_expiry ON sessions(expires_at);
"#;

const SELECT_DOC: &str = "SELECT id, collection, data, created_at, updated_at FROM documents";

pub struct SqliteBackend {
  conn: Connection,
}

impl SqliteBackend {
  pub async fn new(path: &str) -> Result<Self, anyhow::Error> {
    let conn = if path == ":memory:" {
      Connection::open_in_memory().await?
    } else {
      Connection::open(path).await?
    };

    conn
      .call(|conn| conn.execute_batch(PRAGMAS).map_err(|e| e.into()))
      .await?;

    Ok(Self { conn })
  }

  pub async fn in_memory() -> Result<Self, anyhow::Error> {
    Self::new(":memory:").await
  }
}

/// Fixed-width timestamps so text comparison in SQL orders correctly.
fn ts(dt: DateTime<Utc>) -> String {
  dt.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn parse_ts(s: &str) -> DateTime<Utc> {
  DateTime::parse_from_rfc3339(s)
    .map(|d| d.with_timezone(&Utc))
    .unwrap_or_else(|_| Utc::now())
}

fn parse_uuid(idx: usize, s: &str) -> Result<Uuid, rusqlite::Error> {
  Uuid::parse_str(s).map_err(|e| {
    rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, Box::new(e))
  })
}

fn other<E: std::error::Error + Send + Sync + 'static>(e: E) -> tokio_rusqlite::Error {
  tokio_rusqlite::Error::Other(Box::new(e))
}

fn row_to_doc(row: &rusqlite::Row) -> Result<Document, rusqlite::Error> {
  let id_str: String = row.get(0)?;
  let data_str: String = row.get(2)?;
  let created_str: String = row.get(3)?;
  let updated_str: String = row.get(4)?;
  Ok(Document {
    id: parse_uuid(0, &id_str)?,
    collection: row.get(1)?,
    data: serde_json::from_str(&data_str).map_err(|e| {
      rusqlite::Error::FromSqlConversionFailure(2, rusqlite::types::Type::Text, Box::new(e))
    })?,
    created_at: parse_ts(&created_str),
    updated_at: parse_ts(&updated_str),
  })
}

fn row_to_credential(row: &rusqlite::Row) -> Result<Credential, rusqlite::Error> {
  let user_id: String = row.get(0)?;
  let created_str: String = row.get(3)?;
  let updated_str: String = row.get(4)?;
  Ok(Credential {
    user_id: parse_uuid(0, &user_id)?,
    email: row.get(1)?,
    password_hash: row.get(2)?,
    created_at: parse_ts(&created_str),
    updated_at: parse_ts(&updated_str),
  })
}

fn row_to_session(row: &rusqlite::Row) -> Result<Session, rusqlite::Error> {
  let id: String = row.get(0)?;
  let user_id: String = row.get(1)?;
  let expires_str: String = row.get(2)?;
  let created_str: String = row.get(3)?;
  Ok(Session {
    id: parse_uuid(0, &id)?,
    user_id: parse_uuid(1, &user_id)?,
    expires_at: parse_ts(&expires_str),
    created_at: parse_ts(&created_str),
  })
}

/// Converts a JSON scalar into the value `json_extract` yields for it.
fn to_sql_value(value: &Value) -> SqlValue {
  match value {
    Value::Null => SqlValue::Null,
    Value::Bool(b) => SqlValue::Integer(i64::from(*b)),
    Value::Number(n) => match n.as_i64() {
      Some(i) => SqlValue::Integer(i),
      None => SqlValue::Real(n.as_f64().unwrap_or_default()),
    },
    Value::String(s) => SqlValue::Text(s.clone()),
    other => SqlValue::Text(other.to_string()),
  }
}

/// Builds the `AND ...` tail for a list query. Parameter numbering starts at
/// `?2`; `?1` is the collection.
fn compile_filters(filters: &[FieldFilter]) -> Result<(String, Vec<SqlValue>), anyhow::Error> {
  let mut sql = String::new();
  let mut values = Vec::with_capacity(filters.len());
  for filter in filters {
    validate_identifier(&filter.field)?;
    let path = format!("json_extract(data, '$.{}')", filter.field);
    if filter.op == FilterOp::Eq && filter.value.is_null() {
      sql.push_str(&format!(" AND {} IS NULL", path));
      continue;
    }
    let n = values.len() + 2;
    let clause = match filter.op {
      FilterOp::Eq => format!(" AND {} = ?{}", path, n),
      FilterOp::Gte => format!(" AND {} >= ?{}", path, n),
      FilterOp::Lte => format!(" AND {} <= ?{}", path, n),
      FilterOp::ArrayContains => format!(
        " AND EXISTS (SELECT 1 FROM json_each(data, '$.{}') WHERE json_each.value = ?{})",
        filter.field, n
      ),
    };
    sql.push_str(&clause);
    values.push(to_sql_value(&filter.value));
  }
  Ok((sql, values))
}

/// Applies `f` to a stored document inside a transaction and returns the result.
fn modify_document(
  conn: &mut rusqlite::Connection,
  collection: &str,
  id: &str,
  f: impl FnOnce(&mut Value),
) -> Result<Option<Document>, tokio_rusqlite::Error> {
  let tx = conn.transaction()?;
  let current: Option<String> = tx
    .query_row(
      "SELECT data FROM documents WHERE collection = ?1 AND id = ?2",
      params![collection, id],
      |row| row.get(0),
    )
    .optional()?;
  let Some(current) = current else {
    return Ok(None);
  };

  let mut data: Value = serde_json::from_str(&current).map_err(other)?;
  f(&mut data);
  let data_str = serde_json::to_string(&data).map_err(other)?;
  tx.execute(
    "UPDATE documents SET data = ?1, updated_at = ?2 WHERE collection = ?3 AND id = ?4",
    params![data_str, ts(Utc::now()), collection, id],
  )?;
  let doc = tx.query_row(
    &format!("{} WHERE collection = ?1 AND id = ?2", SELECT_DOC),
    params![collection, id],
    row_to_doc,
  )?;
  tx.commit()?;
  Ok(Some(doc))
}

#[async_trait]
impl DocumentStore for SqliteBackend {
  async fn init_schema(&self) -> Result<(), anyhow::Error> {
    self
      .conn
      .call(|conn| conn.execute_batch(SCHEMA).map_err(|e| e.into()))
      .await?;
    tracing::info!("SQLite schema initialized");
    Ok(())
  }

  async fn ping(&self) -> Result<(), anyhow::Error> {
    self
      .conn
      .call(|conn| {
        conn
          .query_row("SELECT 1", [], |row| row.get::<_, i64>(0))
          .map_err(|e| e.into())
      })
      .await?;
    Ok(())
  }

  async fn insert(&self, collection: &str, data: Value) -> Result<Document, anyhow::Error> {
    validate_collection_name(collection)?;

    let id = Uuid::new_v4();
    let now = Utc::now();
    let data_str = serde_json::to_string(&data)?;
    let now_str = ts(now);
    let col = collection.to_string();
    let id_str = id.to_string();

    self.conn.call(move |conn| {
      conn.execute(
        "INSERT INTO documents (id, collection, data, created_at, updated_at) VALUES (?1, ?2, ?3, ?4, ?5)",
        params![id_str, col, data_str, now_str, now_str],
      ).map_err(|e| e.into())
    }).await?;

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

    let col = collection.to_string();
    let id_str = id.to_string();

    let doc = self
      .conn
      .call(move |conn| {
        let mut stmt =
          conn.prepare_cached(&format!("{} WHERE collection = ?1 AND id = ?2", SELECT_DOC))?;
        Ok(stmt.query_row(params![col, id_str], row_to_doc).optional()?)
      })
      .await?;
    Ok(doc)
  }

  async fn update(
    &self,
    collection: &str,
    id: Uuid,
    patch: Value,
  ) -> Result<Option<Document>, anyhow::Error> {
    validate_collection_name(collection)?;

    let col = collection.to_string();
    let id_str = id.to_string();

    let doc = self
      .conn
      .call(move |conn| modify_document(conn, &col, &id_str, |data| merge_patch(data, patch)))
      .await?;
    Ok(doc)
  }

  async fn delete(&self, collection: &str, id: Uuid) -> Result<Option<Document>, anyhow::Error> {
    validate_collection_name(collection)?;

    let col = collection.to_string();
    let id_str = id.to_string();

    let doc = self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;
        let doc = tx
          .query_row(
            &format!("{} WHERE collection = ?1 AND id = ?2", SELECT_DOC),
            params![col, id_str],
            row_to_doc,
          )
          .optional()?;
        if doc.is_some() {
          tx.execute(
            "DELETE FROM documents WHERE collection = ?1 AND id = ?2",
            params![col, id_str],
          )?;
        }
        tx.commit()?;
        Ok(doc)
      })
      .await?;
    Ok(doc)
  }

  async fn list(
    &self,
    collection: &str,
    filters: &[FieldFilter],
  ) -> Result<Vec<Document>, anyhow::Error> {
    validate_collection_name(collection)?;

    let (clauses, mut values) = compile_filters(filters)?;
    values.insert(0, SqlValue::Text(collection.to_string()));
    let sql = format!(
      "{} WHERE collection = ?1{} ORDER BY created_at, id",
      SELECT_DOC, clauses
    );

    let docs = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(&sql)?;
        let mut rows = stmt.query(params_from_iter(values.iter()))?;
        let mut docs = Vec::new();
        while let Some(row) = rows.next()? {
          docs.push(row_to_doc(row)?);
        }
        Ok(docs)
      })
      .await?;
    Ok(docs)
  }

  async fn transform(
    &self,
    collection: &str,
    id: Uuid,
    mutation: DocumentMutation,
  ) -> Result<Option<Document>, anyhow::Error> {
    validate_collection_name(collection)?;

    let col = collection.to_string();
    let id_str = id.to_string();

    let doc = self
      .conn
      .call(move |conn| modify_document(conn, &col, &id_str, mutation))
      .await?;
    Ok(doc)
  }

  async fn create_credential(
    &self,
    user_id: Uuid,
    email: &str,
    password_hash: &str,
  ) -> Result<Credential, anyhow::Error> {
    let now = Utc::now();
    let credential = Credential {
      user_id,
      email: email.to_string(),
      password_hash: password_hash.to_string(),
      created_at: now,
      updated_at: now,
    };
    let row = credential.clone();
    self
      .conn
      .call(move |conn| {
        conn
          .execute(
            "INSERT INTO credentials (user_id, email, password_hash, created_at, updated_at) VALUES (?1, ?2, ?3, ?4, ?4)",
            params![row.user_id.to_string(), row.email, row.password_hash, ts(row.created_at)],
          )
          .map_err(|e| e.into())
      })
      .await?;
    Ok(credential)
  }

  async fn credential_by_email(&self, email: &str) -> Result<Option<Credential>, anyhow::Error> {
    let email = email.to_string();
    let credential = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare_cached(
          "SELECT user_id, email, password_hash, created_at, updated_at FROM credentials WHERE email = ?1",
        )?;
        Ok(stmt.query_row(params![email], row_to_credential).optional()?)
      })
      .await?;
    Ok(credential)
  }

  async fn credential(&self, user_id: Uuid) -> Result<Option<Credential>, anyhow::Error> {
    let id_str = user_id.to_string();
    let credential = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare_cached(
          "SELECT user_id, email, password_hash, created_at, updated_at FROM credentials WHERE user_id = ?1",
        )?;
        Ok(stmt.query_row(params![id_str], row_to_credential).optional()?)
      })
      .await?;
    Ok(credential)
  }

  async fn update_password(
    &self,
    user_id: Uuid,
    password_hash: &str,
  ) -> Result<bool, anyhow::Error> {
    let id_str = user_id.to_string();
    let hash = password_hash.to_string();
    let changed = self
      .conn
      .call(move |conn| {
        conn
          .execute(
            "UPDATE credentials SET password_hash = ?1, updated_at = ?2 WHERE user_id = ?3",
            params![hash, ts(Utc::now()), id_str],
          )
          .map_err(|e| e.into())
      })
      .await?;
    Ok(changed > 0)
  }

  async fn delete_credential(&self, user_id: Uuid) -> Result<bool, anyhow::Error> {
    let id_str = user_id.to_string();
    let changed = self
      .conn
      .call(move |conn| {
        conn
          .execute("DELETE FROM credentials WHERE user_id = ?1", params![id_str])
          .map_err(|e| e.into())
      })
      .await?;
    Ok(changed > 0)
  }

  async fn create_session(
    &self,
    user_id: Uuid,
    token_hash: &str,
    expires_at: DateTime<Utc>,
  ) -> Result<Session, anyhow::Error> {
    let session = Session {
      id: Uuid::new_v4(),
      user_id,
      expires_at,
      created_at: Utc::now(),
    };
    let row = session.clone();
    let hash = token_hash.to_string();
    self
      .conn
      .call(move |conn| {
        conn
          .execute(
            "INSERT INTO sessions (id, user_id, token_hash, expires_at, created_at) VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
              row.id.to_string(),
              row.user_id.to_string(),
              hash,
              ts(row.expires_at),
              ts(row.created_at)
            ],
          )
          .map_err(|e| e.into())
      })
      .await?;
    Ok(session)
  }

  async fn find_session(&self, token_hash: &str) -> Result<Option<Session>, anyhow::Error> {
    let hash = token_hash.to_string();
    let session = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare_cached(
          "SELECT id, user_id, expires_at, created_at FROM sessions WHERE token_hash = ?1",
        )?;
        Ok(stmt.query_row(params![hash], row_to_session).optional()?)
      })
      .await?;
    Ok(session)
  }

  async fn delete_session(&self, id: Uuid) -> Result<bool, anyhow::Error> {
    let id_str = id.to_string();
    let changed = self
      .conn
      .call(move |conn| {
        conn
          .execute("DELETE FROM sessions WHERE id = ?1", params![id_str])
          .map_err(|e| e.into())
      })
      .await?;
    Ok(changed > 0)
  }

  async fn delete_user_sessions(&self, user_id: Uuid) -> Result<u64, anyhow::Error> {
    let id_str = user_id.to_string();
    let changed = self
      .conn
      .call(move |conn| {
        conn
          .execute("DELETE FROM sessions WHERE user_id = ?1", params![id_str])
          .map_err(|e| e.into())
      })
      .await?;
    Ok(changed as u64)
  }

  async fn cleanup_expired_sessions(&self) -> Result<u64, anyhow::Error> {
    let now = ts(Utc::now());
    let removed = self
      .conn
      .call(move |conn| {
        conn
          .execute("DELETE FROM sessions WHERE expires_at <= ?1", params![now])
          .map_err(|e| e.into())
      })
      .await?;
    Ok(removed as u64)
  }
}
