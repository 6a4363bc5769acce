mod backend;
mod postgres;
pub mod sanitize;
mod sqlite;

pub use backend::{Credential, DocumentMutation, DocumentStore, Session};
pub use postgres::PostgresBackend;
pub use sqlite::SqliteBackend;
