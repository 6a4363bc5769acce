use regex::{Captures, Regex};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::OnceLock;

const CONFIG_FILES: [&str; 2] = ["mindcare.yaml", "mindcare.yml"];

/// Replaces `${VAR}` and `$VAR` with the environment value, or nothing when
/// the variable is unset.
fn expand_env_vars(input: &str) -> String {
  static RE: OnceLock<Regex> = OnceLock::new();
  let re = RE.get_or_init(|| {
    Regex::new(r"\$\{([A-Za-z0-9_]+)\}|\$([A-Za-z0-9_]+)").expect("valid regex")
  });
  re.replace_all(input, |caps: &Captures| {
    let name = caps.get(1).or_else(|| caps.get(2)).map_or("", |m| m.as_str());
    std::env::var(name).unwrap_or_default()
  })
  .into_owned()
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendType {
  Postgres,
  #[default]
  Sqlite,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ServerConfig {
  #[serde(default)]
  pub server: ServerSection,
  #[serde(default)]
  pub backend: BackendType,
  #[serde(default)]
  pub postgres: PostgresSection,
  #[serde(default)]
  pub sqlite: SqliteSection,
  #[serde(default)]
  pub logging: LoggingSection,
  #[serde(default)]
  pub auth: AuthSection,
  #[serde(default)]
  pub uploads: UploadsSection,
  #[serde(default)]
  pub limits: LimitsSection,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerSection {
  #[serde(default = "default_host")]
  pub host: String,
  #[serde(default = "default_port")]
  pub port: u16,
  /// `["*"]` allows any origin.
  #[serde(default = "default_cors_origins")]
  pub cors_origins: Vec<String>,
}

fn default_host() -> String {
  "0.0.0.0".into()
}
fn default_port() -> u16 {
  5000
}
fn default_cors_origins() -> Vec<String> {
  vec!["*".to_string()]
}

impl Default for ServerSection {
  fn default() -> Self {
    Self {
      host: default_host(),
      port: default_port(),
      cors_origins: default_cors_origins(),
    }
  }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthSection {
  /// Lifetime of a bearer session
  #[serde(default = "default_token_ttl_hours")]
  pub token_ttl_hours: u64,
  #[serde(default = "default_min_password_length")]
  pub min_password_length: usize,
  /// Accounts registered with one of these emails get the admin role.
  #[serde(default)]
  pub admin_emails: Vec<String>,
}

fn default_token_ttl_hours() -> u64 {
  24
}
fn default_min_password_length() -> usize {
  6
}

impl Default for AuthSection {
  fn default() -> Self {
    Self {
      token_ttl_hours: default_token_ttl_hours(),
      min_password_length: default_min_password_length(),
      admin_emails: Vec::new(),
    }
  }
}

impl AuthSection {
  pub fn is_admin_email(&self, email: &str) -> bool {
    self
      .admin_emails
      .iter()
      .any(|e| e.eq_ignore_ascii_case(email))
  }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UploadsSection {
  #[serde(default = "default_uploads_path")]
  pub path: String,
  /// Per-file limit in bytes
  #[serde(default = "default_max_file_size")]
  pub max_file_size: u64,
}

fn default_uploads_path() -> String {
  "./uploads".into()
}
fn default_max_file_size() -> u64 {
  10 * 1024 * 1024
}

impl Default for UploadsSection {
  fn default() -> Self {
    Self {
      path: default_uploads_path(),
      max_file_size: default_max_file_size(),
    }
  }
}

/// Per-client request limits
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LimitsSection {
  /// Maximum requests per second per client (0 = unlimited)
  #[serde(default = "default_requests_per_second")]
  pub requests_per_second: u32,
  #[serde(default = "default_burst_size")]
  pub burst_size: u32,
}

fn default_requests_per_second() -> u32 {
  100
}
fn default_burst_size() -> u32 {
  50
}

impl Default for LimitsSection {
  fn default() -> Self {
    Self {
      requests_per_second: default_requests_per_second(),
      burst_size: default_burst_size(),
    }
  }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PostgresSection {
  #[serde(default = "default_pg_url")]
  pub url: String,
  #[serde(default = "default_max_conn")]
  pub max_connections: usize,
}
fn default_pg_url() -> String {
  "postgres://localhost/mindcare".into()
}
fn default_max_conn() -> usize {
  20
}
impl Default for PostgresSection {
  fn default() -> Self {
    Self {
      url: default_pg_url(),
      max_connections: default_max_conn(),
    }
  }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SqliteSection {
  #[serde(default = "default_sqlite_path")]
  pub path: String,
}
fn default_sqlite_path() -> String {
  "mindcare.db".into()
}
impl Default for SqliteSection {
  fn default() -> Self {
    Self {
      path: default_sqlite_path(),
    }
  }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingSection {
  #[serde(default = "default_level")]
  pub level: String,
}
fn default_level() -> String {
  "info".into()
}
impl Default for LoggingSection {
  fn default() -> Self {
    Self {
      level: default_level(),
    }
  }
}

impl ServerConfig {
  pub fn from_file(path: impl AsRef<Path>) -> Result<Self, anyhow::Error> {
    let content = std::fs::read_to_string(&path)?;
    Self::from_yaml(&content)
  }

  pub fn from_yaml(content: &str) -> Result<Self, anyhow::Error> {
    Ok(serde_yaml::from_str(&expand_env_vars(content))?)
  }

  /// Loads the first config file found in the working directory.
  pub fn find_and_load() -> Result<Option<Self>, anyhow::Error> {
    for p in CONFIG_FILES {
      if Path::new(p).exists() {
        tracing::info!("Loading config from {}", p);
        return Ok(Some(Self::from_file(p)?));
      }
    }
    Ok(None)
  }

  pub fn address(&self) -> String {
    format!("{}:{}", self.server.host, self.server.port)
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_expand_env_vars() {
    std::env::set_var("MINDCARE_TEST_HOST", "db.internal");
    assert_eq!(
      expand_env_vars("postgres://${MINDCARE_TEST_HOST}/app"),
      "postgres://db.internal/app"
    );
    assert_eq!(expand_env_vars("$MINDCARE_TEST_HOST:5432"), "db.internal:5432");
    assert_eq!(expand_env_vars("${MINDCARE_TEST_UNSET_VAR}x"), "x");
    assert_eq!(expand_env_vars("no vars here"), "no vars here");
  }

  #[test]
  fn test_admin_email_match_is_case_insensitive() {
    let auth = AuthSection {
      admin_emails: vec!["Head@School.edu".into()],
      ..Default::default()
    };
    assert!(auth.is_admin_email("head@school.edu"));
    assert!(!auth.is_admin_email("other@school.edu"));
  }
}
