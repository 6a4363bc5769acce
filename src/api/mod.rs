//! HTTP surface: one router per collection plus the shared plumbing they use.

mod accounts;
mod appointments;
pub mod error;
pub mod extract;
pub mod guard;
mod journals;
pub mod listing;
mod qna;
mod reports;
mod resources;
pub mod response;
mod users;

use axum::{
  extract::{ConnectInfo, Request, State},
  http::Uri,
  middleware::{self, Next},
  response::{IntoResponse, Response},
  routing::get,
  Json, Router,
};
use serde_json::{json, Value};
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::Arc;
use std::time::Instant;
use tower_http::cors::{Any, CorsLayer};
use tower_http::services::ServeDir;
use uuid::Uuid;

pub use error::ApiError;
pub use guard::{ActiveUser, AuthUser, MaybeUser};

use crate::db::DocumentStore;
use crate::models::timestamp;
use crate::server::{RateLimiter, ServerConfig};
use crate::storage::LocalFileStorage;
use crate::types::{Document, FieldFilter, OrderDirection};

/// Shared application state
#[derive(Clone)]
pub struct AppState {
  pub store: Arc<dyn DocumentStore>,
  pub config: Arc<ServerConfig>,
  pub uploads: Arc<LocalFileStorage>,
  pub rate_limiter: Arc<RateLimiter>,
  pub start_time: Instant,
}

impl AppState {
  pub fn new(config: ServerConfig, store: Arc<dyn DocumentStore>) -> Self {
    let uploads = LocalFileStorage::new(&config.uploads.path, config.uploads.max_file_size);
    let rate_limiter = RateLimiter::new(config.limits.clone());
    Self {
      store,
      uploads: Arc::new(uploads),
      rate_limiter: Arc::new(rate_limiter),
      config: Arc::new(config),
      start_time: Instant::now(),
    }
  }
}

pub fn build_router(state: AppState) -> Router {
  let cors = if state.config.server.cors_origins.is_empty()
    || state.config.server.cors_origins.iter().any(|o| o == "*")
  {
    CorsLayer::permissive()
  } else {
    let origins: Vec<_> = state
      .config
      .server
      .cors_origins
      .iter()
      .filter_map(|o| o.parse().ok())
      .collect();
    CorsLayer::new()
      .allow_origin(origins)
      .allow_methods(Any)
      .allow_headers(Any)
  };

  Router::new()
    .route("/health", get(health_check))
    .route("/ready", get(readiness_check))
    .nest("/auth", accounts::router())
    .nest("/appointments", appointments::router())
    .nest("/journals", journals::router())
    .nest("/qna", qna::router())
    .nest("/resources", resources::router(&state))
    .nest("/reports", reports::router())
    .nest("/users", users::router())
    .nest_service("/uploads", ServeDir::new(state.uploads.base_path()))
    .fallback(not_found)
    .layer(middleware::from_fn_with_state(state.clone(), rate_limit))
    .layer(cors)
    .with_state(state)
}

/// Liveness probe
async fn health_check(State(state): State<AppState>) -> Json<Value> {
  Json(json!({
    "status": "OK",
    "uptime": state.start_time.elapsed().as_secs(),
    "timestamp": timestamp::now(),
  }))
}

/// Readiness probe - 503 when the store is unreachable
async fn readiness_check(State(state): State<AppState>) -> Result<Json<Value>, ApiError> {
  match state.store.ping().await {
    Ok(()) => Ok(Json(json!({"status": "ready", "timestamp": timestamp::now()}))),
    Err(e) => {
      tracing::warn!(error = %e, "readiness check failed");
      Err(ApiError::Unavailable)
    }
  }
}

async fn not_found(uri: Uri) -> ApiError {
  ApiError::not_found(format!("Not found - {}", uri.path()))
}

fn client_ip(req: &Request) -> IpAddr {
  if let Some(ConnectInfo(addr)) = req.extensions().get::<ConnectInfo<SocketAddr>>() {
    return addr.ip();
  }
  req
    .headers()
    .get("x-forwarded-for")
    .and_then(|v| v.to_str().ok())
    .and_then(|v| v.split(',').next())
    .and_then(|v| v.trim().parse().ok())
    .unwrap_or(IpAddr::V4(Ipv4Addr::UNSPECIFIED))
}

async fn rate_limit(State(state): State<AppState>, req: Request, next: Next) -> Response {
  let ip = client_ip(&req);
  match state.rate_limiter.check_request(ip) {
    Ok(()) => next.run(req).await,
    Err(limited) => {
      tracing::warn!(%ip, "rate limit exceeded");
      ApiError::RateLimited {
        retry_after_secs: limited.retry_after_secs(),
      }
      .into_response()
    }
  }
}

// Helpers shared by the collection handlers.

/// Ids that do not parse cannot exist, so they are reported as missing.
pub(crate) fn parse_id(id: &str, not_found: &str) -> Result<Uuid, ApiError> {
  id.parse().map_err(|_| ApiError::not_found(not_found))
}

pub(crate) async fn load(
  state: &AppState,
  collection: &str,
  id: &str,
  not_found: &str,
) -> Result<Document, ApiError> {
  let id = parse_id(id, not_found)?;
  state
    .store
    .get(collection, id)
    .await?
    .ok_or_else(|| ApiError::not_found(not_found))
}

pub(crate) async fn records(
  state: &AppState,
  collection: &str,
  filters: &[FieldFilter],
) -> Result<Vec<Value>, ApiError> {
  let docs = state.store.list(collection, filters).await?;
  Ok(docs.into_iter().map(Document::into_record).collect())
}

/// `field >= from` and `field <= to` on a stored timestamp.
pub(crate) fn date_range(
  field: &str,
  from: Option<chrono::DateTime<chrono::Utc>>,
  to: Option<chrono::DateTime<chrono::Utc>>,
) -> Vec<FieldFilter> {
  let mut filters = Vec::new();
  if let Some(from) = from {
    filters.push(FieldFilter::gte(field, timestamp::format(from)));
  }
  if let Some(to) = to {
    filters.push(FieldFilter::lte(field, timestamp::format(to)));
  }
  filters
}

/// Search, sort and paginate `items`, then wrap the page in the paginated
/// envelope.
pub(crate) struct ListParams<'a> {
  pub search: Option<&'a str>,
  pub search_fields: &'a [&'a str],
  pub sort_by: &'a str,
  pub order: OrderDirection,
  pub page: Option<u32>,
  pub limit: Option<u32>,
}

pub(crate) fn list_response(
  message: &str,
  items: Vec<Value>,
  params: ListParams<'_>,
) -> Result<Response, ApiError> {
  let mut items = listing::search(items, params.search, params.search_fields);
  listing::sort(&mut items, params.sort_by, params.order);
  let (page, pagination) = listing::paginate(items, params.page, params.limit);
  response::paginated(message, page, pagination)
}

/// Adds one to a numeric counter inside a single store transform.
pub(crate) async fn bump(
  state: &AppState,
  collection: &str,
  id: Uuid,
  field: &'static str,
) -> Result<Option<Document>, ApiError> {
  let doc = state
    .store
    .transform(
      collection,
      id,
      Box::new(move |data| {
        let current = data.get(field).and_then(Value::as_u64).unwrap_or(0);
        data[field] = json!(current + 1);
      }),
    )
    .await?;
  Ok(doc)
}

pub(crate) fn deleted(message: &str, id: Uuid) -> Result<Response, ApiError> {
  response::ok(message, json!({"id": id.to_string()}))
}
