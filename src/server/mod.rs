mod config;
mod daemon;
mod rate_limiter;

pub use config::{
  AuthSection, BackendType, LimitsSection, LoggingSection, PostgresSection, ServerConfig,
  ServerSection, SqliteSection, UploadsSection,
};
pub use daemon::Daemon;
pub use rate_limiter::{RateLimited, RateLimiter};
