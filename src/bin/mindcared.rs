use clap::Parser;
use mindcare::db::{DocumentStore, PostgresBackend, SqliteBackend};
use mindcare::server::{BackendType, Daemon, ServerConfig};
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

/// How long in-flight requests get to finish after a shutdown signal.
const DRAIN_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Parser)]
#[command(name = "mindcared", about = "MindCare counselling API server", version)]
struct Args {
  /// YAML config file (default: ./mindcare.yaml if present)
  #[arg(short, long)]
  config: Option<String>,
  /// Use PostgreSQL at this URL
  #[arg(long, env = "MINDCARE_PG_URL")]
  pg_url: Option<String>,
  /// Use SQLite at this path
  #[arg(long, env = "MINDCARE_SQLITE_PATH")]
  sqlite: Option<String>,
  #[arg(long)]
  host: Option<String>,
  #[arg(short, long, env = "PORT")]
  port: Option<u16>,
  #[arg(long)]
  log_level: Option<String>,
  #[arg(long, env = "MINDCARE_UPLOAD_DIR")]
  upload_dir: Option<String>,
}

impl Args {
  /// Config file first, then flags and environment on top.
  fn into_config(self) -> Result<ServerConfig, anyhow::Error> {
    let mut config = match &self.config {
      Some(path) => ServerConfig::from_file(path)?,
      None => ServerConfig::find_and_load()?.unwrap_or_default(),
    };

    if let Some(url) = self.pg_url {
      config.backend = BackendType::Postgres;
      config.postgres.url = url;
    }
    if let Some(path) = self.sqlite {
      config.backend = BackendType::Sqlite;
      config.sqlite.path = path;
    }
    config.server.host = self.host.unwrap_or(config.server.host);
    config.server.port = self.port.unwrap_or(config.server.port);
    config.logging.level = self.log_level.unwrap_or(config.logging.level);
    config.uploads.path = self.upload_dir.unwrap_or(config.uploads.path);
    Ok(config)
  }
}

fn init_tracing(level: &str) {
  let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
  tracing_subscriber::registry()
    .with(filter)
    .with(tracing_subscriber::fmt::layer())
    .init();
}

async fn open_store(config: &ServerConfig) -> Result<Arc<dyn DocumentStore>, anyhow::Error> {
  let store: Arc<dyn DocumentStore> = match config.backend {
    BackendType::Sqlite => Arc::new(SqliteBackend::new(&config.sqlite.path).await?),
    BackendType::Postgres => Arc::new(PostgresBackend::new(
      &config.postgres.url,
      config.postgres.max_connections,
    )?),
  };
  Ok(store)
}

#[tokio::main]
async fn main() -> Result<(), anyhow::Error> {
  let config = Args::parse().into_config()?;
  init_tracing(&config.logging.level);

  let store = open_store(&config).await?;
  tracing::info!(backend = ?config.backend, "document store opened");

  let daemon = Arc::new(Daemon::new(config, store));
  let signalled = daemon.clone();
  tokio::spawn(async move {
    match wait_for_signal().await {
      Ok(name) => tracing::info!(signal = name, "shutting down"),
      Err(e) => tracing::error!(error = %e, "signal handler failed, shutting down"),
    }
    signalled.shutdown();

    tokio::time::sleep(DRAIN_TIMEOUT).await;
    tracing::warn!("requests still running after {:?}, exiting", DRAIN_TIMEOUT);
    std::process::exit(1);
  });

  daemon.run().await?;
  tracing::info!("server stopped cleanly");
  Ok(())
}

/// Resolves with the name of the first SIGINT or SIGTERM received.
async fn wait_for_signal() -> std::io::Result<&'static str> {
  #[cfg(unix)]
  {
    use tokio::signal::unix::{signal, SignalKind};
    let mut term = signal(SignalKind::terminate())?;
    tokio::select! {
      res = tokio::signal::ctrl_c() => res.map(|_| "SIGINT"),
      _ = term.recv() => Ok("SIGTERM"),
    }
  }

  #[cfg(not(unix))]
  {
    tokio::signal::ctrl_c().await.map(|_| "SIGINT")
  }
}
