use mindcare::server::{BackendType, ServerConfig};

#[test]
fn test_defaults() {
  let config = ServerConfig::default();
  assert_eq!(config.backend, BackendType::Sqlite);
  assert_eq!(config.server.port, 5000);
  assert_eq!(config.server.cors_origins, vec!["*".to_string()]);
  assert_eq!(config.auth.token_ttl_hours, 24);
  assert_eq!(config.auth.min_password_length, 6);
  assert_eq!(config.uploads.max_file_size, 10 * 1024 * 1024);
  assert_eq!(config.limits.requests_per_second, 100);
  assert_eq!(config.address(), "0.0.0.0:5000");
}

#[test]
fn test_empty_yaml_uses_defaults() {
  let config = ServerConfig::from_yaml("{}").unwrap();
  assert_eq!(config.sqlite.path, "mindcare.db");
  assert_eq!(config.logging.level, "info");
}

#[test]
fn test_partial_sections() {
  let yaml = r#"
server:
  port: 8080
backend: postgres
postgres:
  url: postgres://app@db/mindcare
auth:
  token_ttl_hours: 2
  admin_emails: [principal@school.edu]
uploads:
  max_file_size: 1024
limits:
  requests_per_second: 0
"#;
  let config = ServerConfig::from_yaml(yaml).unwrap();
  assert_eq!(config.server.port, 8080);
  assert_eq!(config.server.host, "0.0.0.0");
  assert_eq!(config.backend, BackendType::Postgres);
  assert_eq!(config.postgres.url, "postgres://app@db/mindcare");
  assert_eq!(config.postgres.max_connections, 20);
  assert_eq!(config.auth.token_ttl_hours, 2);
  assert_eq!(config.auth.min_password_length, 6);
  assert!(config.auth.is_admin_email("Principal@School.edu"));
  assert_eq!(config.uploads.max_file_size, 1024);
  assert_eq!(config.uploads.path, "./uploads");
  assert_eq!(config.limits.requests_per_second, 0);
  assert_eq!(config.limits.burst_size, 50);
}

#[test]
fn test_env_expansion_in_file() {
  std::env::set_var("MINDCARE_IT_SQLITE", "/var/lib/mindcare/data.db");
  let config = ServerConfig::from_yaml("sqlite:\n  path: ${MINDCARE_IT_SQLITE}\n").unwrap();
  assert_eq!(config.sqlite.path, "/var/lib/mindcare/data.db");
}

#[test]
fn test_from_file() {
  let dir = tempfile::tempdir().unwrap();
  let path = dir.path().join("mindcare.yaml");
  std::fs::write(&path, "server:\n  host: 127.0.0.1\n  port: 9000\n").unwrap();
  let config = ServerConfig::from_file(&path).unwrap();
  assert_eq!(config.address(), "127.0.0.1:9000");
}

#[test]
fn test_invalid_backend_rejected() {
  assert!(ServerConfig::from_yaml("backend: mongo\n").is_err());
}
