use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;

use super::ServerConfig;
use crate::api::{build_router, AppState};
use crate::db::DocumentStore;

const LIMITER_CLEANUP_INTERVAL: Duration = Duration::from_secs(60);
const SESSION_CLEANUP_INTERVAL: Duration = Duration::from_secs(15 * 60);

pub struct Daemon {
  state: AppState,
  shutdown_tx: broadcast::Sender<()>,
}

impl Daemon {
  pub fn new(config: ServerConfig, store: Arc<dyn DocumentStore>) -> Self {
    let (shutdown_tx, _) = broadcast::channel(1);
    tracing::info!(
      "Rate limiter: {} req/s, burst {}",
      config.limits.requests_per_second,
      config.limits.burst_size
    );
    Self {
      state: AppState::new(config, store),
      shutdown_tx,
    }
  }

  /// Trigger graceful shutdown of the HTTP server
  pub fn shutdown(&self) {
    tracing::info!("Initiating graceful shutdown...");
    let _ = self.shutdown_tx.send(());
  }

  pub async fn run(&self) -> Result<(), anyhow::Error> {
    tracing::info!("Initializing database schema...");
    self.state.store.init_schema().await?;
    tracing::info!("Database schema initialized");

    self.state.uploads.init().await?;
    tracing::info!(path = %self.state.uploads.base_path().display(), "Upload directory ready");

    self.spawn_cleanup_tasks();

    let addr = self.state.config.address();
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("MindCare API listening on {}", addr);

    let router = build_router(self.state.clone());
    let mut shutdown_rx = self.shutdown_tx.subscribe();
    axum::serve(
      listener,
      router.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(async move {
      let _ = shutdown_rx.recv().await;
    })
    .await?;

    tracing::info!("HTTP server stopped");
    Ok(())
  }

  fn spawn_cleanup_tasks(&self) {
    let limiter = self.state.rate_limiter.clone();
    let mut shutdown_rx = self.shutdown_tx.subscribe();
    tokio::spawn(async move {
      loop {
        tokio::select! {
          _ = tokio::time::sleep(LIMITER_CLEANUP_INTERVAL) => {
            let removed = limiter.cleanup();
            if removed > 0 {
              tracing::debug!(removed, "Pruned idle rate limit buckets");
            }
          }
          _ = shutdown_rx.recv() => break,
        }
      }
    });

    let store = self.state.store.clone();
    let mut shutdown_rx = self.shutdown_tx.subscribe();
    tokio::spawn(async move {
      loop {
        tokio::select! {
          _ = tokio::time::sleep(SESSION_CLEANUP_INTERVAL) => {
            match store.cleanup_expired_sessions().await {
              Ok(0) => {}
              Ok(n) => tracing::info!("Removed {} expired sessions", n),
              Err(e) => tracing::error!("Session cleanup failed: {}", e),
            }
          }
          _ = shutdown_rx.recv() => break,
        }
      }
    });
  }
}
