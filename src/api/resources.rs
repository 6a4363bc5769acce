use axum::{
  extract::{
    multipart::{Multipart, MultipartRejection},
    DefaultBodyLimit, Path, State,
  },
  http::{header, StatusCode},
  response::{IntoResponse, Response},
  routing::{get, post},
  Router,
};
use chrono::Utc;
use serde_json::{json, Value};

use super::extract::{ValidJson, ValidQuery};
use super::{
  listing, load, records, response, ActiveUser, ApiError, AppState, ListParams, MaybeUser,
};
use crate::models::resource::{
  next_rating, upload_name, Audience, NewResource, Rating, Resource, ResourceCategory,
  ResourceQuery, ResourceSort, ResourceType, ResourceUpdate, COLLECTION, UPLOADS_PREFIX,
};
use crate::models::{timestamp, DateWindow};
use crate::storage::{extension, format_file_size, mime_type};
use crate::types::{Document, FieldFilter, OrderDirection};

const NOT_FOUND: &str = "Resource not found";
const FILE_FIELD: &str = "file";
/// Room for multipart boundaries and headers on top of the file itself.
const MULTIPART_OVERHEAD: usize = 64 * 1024;

pub fn router(state: &AppState) -> Router<AppState> {
  let upload_limit = state.uploads.max_file_size() as usize + MULTIPART_OVERHEAD;
  Router::new()
    .route("/", get(list_resources).post(create_resource))
    .route("/stats/overview", get(resource_stats))
    .route(
      "/upload",
      post(upload_file).layer(DefaultBodyLimit::max(upload_limit)),
    )
    .route(
      "/{id}",
      get(get_resource)
        .put(update_resource)
        .delete(delete_resource),
    )
    .route("/{id}/download", get(download_resource))
    .route("/{id}/rate", post(rate_resource))
}

/// Anonymous callers and students only ever see public resources.
fn check_visible(caller: &MaybeUser, doc: &Document) -> Result<(), ApiError> {
  if !caller.is_staff() && doc.bool_field("isPublic") != Some(true) {
    return Err(ApiError::access_denied());
  }
  Ok(())
}

async fn load_owned(state: &AppState, user: &ActiveUser, id: &str) -> Result<Document, ApiError> {
  let doc = load(state, COLLECTION, id, NOT_FOUND).await?;
  if !user.owns_or_admin(doc.str_field("createdBy")) {
    return Err(ApiError::access_denied());
  }
  Ok(doc)
}

/// GET /resources
async fn list_resources(
  State(state): State<AppState>,
  caller: MaybeUser,
  ValidQuery(q): ValidQuery<ResourceQuery>,
) -> Result<Response, ApiError> {
  let mut filters = Vec::new();
  if let Some(category) = q.category {
    filters.push(FieldFilter::eq("category", category.as_str()));
  }
  if let Some(kind) = q.kind {
    filters.push(FieldFilter::eq("type", kind.as_str()));
  }
  if let Some(audience) = q.target_audience {
    filters.push(FieldFilter::contains("targetAudience", audience.as_str()));
  }
  if let Some(difficulty) = q.difficulty {
    filters.push(FieldFilter::eq("difficulty", difficulty.as_str()));
  }
  if let Some(featured) = q.is_featured {
    filters.push(FieldFilter::eq("isFeatured", featured));
  }
  if let Some(created_by) = &q.created_by {
    filters.push(FieldFilter::eq("createdBy", created_by.as_str()));
  }
  if !caller.is_staff() {
    filters.push(FieldFilter::eq("isPublic", true));
  } else if let Some(public) = q.is_public {
    filters.push(FieldFilter::eq("isPublic", public));
  }

  let items = records(&state, COLLECTION, &filters).await?;
  super::list_response(
    "Resources retrieved successfully",
    items,
    ListParams {
      search: q.search.as_deref(),
      search_fields: &["title", "description", "tags"],
      sort_by: q.sort_by.unwrap_or(ResourceSort::CreatedAt).as_str(),
      order: q.sort_order.unwrap_or(OrderDirection::Desc),
      page: q.page,
      limit: q.limit,
    },
  )
}

/// GET /resources/{id}
async fn get_resource(
  State(state): State<AppState>,
  caller: MaybeUser,
  Path(id): Path<String>,
) -> Result<Response, ApiError> {
  let doc = load(&state, COLLECTION, &id, NOT_FOUND).await?;
  check_visible(&caller, &doc)?;
  let doc = super::bump(&state, COLLECTION, doc.id, "views")
    .await?
    .ok_or_else(|| ApiError::not_found(NOT_FOUND))?;
  response::ok("Resource retrieved successfully", doc.into_record())
}

/// POST /resources
async fn create_resource(
  State(state): State<AppState>,
  user: ActiveUser,
  ValidJson(body): ValidJson<NewResource>,
) -> Result<Response, ApiError> {
  user.require_staff()?;

  let now = timestamp::now();
  let resource = Resource {
    title: body.title,
    description: body.description,
    category: body.category,
    kind: body.kind,
    content: body.content,
    file_url: body.file_url,
    external_url: body.external_url,
    thumbnail_url: body.thumbnail_url,
    tags: body.tags.unwrap_or_default(),
    target_audience: body
      .target_audience
      .unwrap_or_else(|| vec![Audience::Students]),
    difficulty: body.difficulty.unwrap_or_default(),
    duration: body.duration,
    is_public: body.is_public.unwrap_or(true),
    is_featured: body.is_featured.unwrap_or(false),
    downloads: 0,
    views: 0,
    rating: 0.0,
    rating_count: 0,
    created_by: user.uid(),
    updated_by: user.uid(),
    created_at: now.clone(),
    updated_at: now,
  };

  let doc = state
    .store
    .insert(COLLECTION, serde_json::to_value(&resource)?)
    .await?;
  tracing::info!(resource_id = %doc.id, user_id = %user.id, "resource created");
  response::created("Resource created successfully", doc.into_record())
}

/// POST /resources/upload
async fn upload_file(
  State(state): State<AppState>,
  user: ActiveUser,
  multipart: Result<Multipart, MultipartRejection>,
) -> Result<Response, ApiError> {
  user.require_staff()?;
  let mut multipart = multipart.map_err(|_| ApiError::bad_request("No file uploaded"))?;

  let field = multipart.next_field().await.map_err(multipart_error)?;
  let field = field.ok_or_else(|| ApiError::bad_request("No file uploaded"))?;
  if field.name() != Some(FILE_FIELD) {
    return Err(ApiError::bad_request("Unexpected file field"));
  }
  let original_name = field
    .file_name()
    .map(str::to_string)
    .filter(|name| !name.is_empty())
    .ok_or_else(|| ApiError::bad_request("No file uploaded"))?;
  let data = field.bytes().await.map_err(multipart_error)?;

  let stored = state.uploads.save(&original_name, &data).await?;
  tracing::info!(
    file_name = %stored.file_name,
    size = stored.size,
    user_id = %user.id,
    "file uploaded"
  );

  response::created(
    "File uploaded successfully",
    json!({
      "originalName": stored.original_name,
      "fileName": stored.file_name,
      "filePath": stored.path.display().to_string(),
      "fileUrl": format!("{}{}", UPLOADS_PREFIX, stored.file_name),
      "fileSize": stored.size,
      "fileSizeFormatted": format_file_size(stored.size),
      "mimeType": stored.mime_type,
      "uploadedAt": stored.uploaded_at,
    }),
  )
}

fn multipart_error(e: axum::extract::multipart::MultipartError) -> ApiError {
  if e.status() == StatusCode::PAYLOAD_TOO_LARGE {
    ApiError::PayloadTooLarge("File too large".into())
  } else {
    ApiError::bad_request(e.body_text())
  }
}

/// PUT /resources/{id}
async fn update_resource(
  State(state): State<AppState>,
  user: ActiveUser,
  Path(id): Path<String>,
  ValidJson(body): ValidJson<ResourceUpdate>,
) -> Result<Response, ApiError> {
  let doc = load_owned(&state, &user, &id).await?;
  let mut patch = serde_json::to_value(&body)?;
  patch["updatedBy"] = json!(user.uid());
  patch["updatedAt"] = json!(timestamp::now());
  let updated = state
    .store
    .update(COLLECTION, doc.id, patch)
    .await?
    .ok_or_else(|| ApiError::not_found(NOT_FOUND))?;
  tracing::info!(resource_id = %doc.id, user_id = %user.id, "resource updated");
  response::ok("Resource updated successfully", updated.into_record())
}

/// DELETE /resources/{id}
async fn delete_resource(
  State(state): State<AppState>,
  user: ActiveUser,
  Path(id): Path<String>,
) -> Result<Response, ApiError> {
  let doc = load_owned(&state, &user, &id).await?;
  if let Some(file_url) = doc.str_field("fileUrl") {
    remove_unshared_upload(&state, doc.id, file_url).await?;
  }
  state.store.delete(COLLECTION, doc.id).await?;
  tracing::info!(resource_id = %doc.id, user_id = %user.id, "resource deleted");
  super::deleted("Resource deleted successfully", doc.id)
}

/// Removes the uploaded file behind `file_url` unless another resource
/// still links to it.
async fn remove_unshared_upload(
  state: &AppState,
  owner: uuid::Uuid,
  file_url: &str,
) -> Result<(), ApiError> {
  let Some(name) = upload_name(file_url) else {
    return Ok(());
  };
  let linked = state
    .store
    .list(COLLECTION, &[FieldFilter::eq("fileUrl", file_url)])
    .await?;
  if linked.iter().any(|other| other.id != owner) {
    tracing::debug!(file_name = name, "upload still referenced, keeping file");
    return Ok(());
  }
  if let Err(e) = state.uploads.delete(name).await {
    tracing::warn!(file_name = name, error = %e, "failed to remove uploaded file");
  }
  Ok(())
}

/// GET /resources/{id}/download
async fn download_resource(
  State(state): State<AppState>,
  caller: MaybeUser,
  Path(id): Path<String>,
) -> Result<Response, ApiError> {
  let doc = load(&state, COLLECTION, &id, NOT_FOUND).await?;
  check_visible(&caller, &doc)?;

  let file_url = doc
    .str_field("fileUrl")
    .ok_or_else(|| ApiError::not_found("No file available for download"))?;
  let name = upload_name(file_url).ok_or_else(|| ApiError::not_found("File not found"))?;
  let data = state.uploads.read(name).await?;
  let content_type = extension(name)
    .as_deref()
    .and_then(mime_type)
    .unwrap_or("application/octet-stream");
  let disposition = format!("attachment; filename=\"{}\"", name);

  super::bump(&state, COLLECTION, doc.id, "downloads").await?;
  tracing::debug!(resource_id = %doc.id, file_name = name, "resource downloaded");

  Ok(
    (
      [
        (header::CONTENT_TYPE, content_type.to_string()),
        (header::CONTENT_DISPOSITION, disposition),
      ],
      data,
    )
      .into_response(),
  )
}

/// POST /resources/{id}/rate
async fn rate_resource(
  State(state): State<AppState>,
  user: ActiveUser,
  Path(id): Path<String>,
  ValidJson(body): ValidJson<Rating>,
) -> Result<Response, ApiError> {
  let id = super::parse_id(&id, NOT_FOUND)?;
  let rating = body.rating;
  let doc = state
    .store
    .transform(
      COLLECTION,
      id,
      Box::new(move |data| {
        let current = data.get("rating").and_then(Value::as_f64).unwrap_or(0.0);
        let count = data.get("ratingCount").and_then(Value::as_u64).unwrap_or(0);
        data["rating"] = json!(next_rating(current, count, rating));
        data["ratingCount"] = json!(count + 1);
      }),
    )
    .await?
    .ok_or_else(|| ApiError::not_found(NOT_FOUND))?;
  tracing::info!(resource_id = %id, rating, user_id = %user.id, "resource rated");

  let record = doc.into_record();
  response::ok(
    "Resource rated successfully",
    json!({
      "id": record["id"],
      "rating": record["rating"],
      "ratingCount": record["ratingCount"],
    }),
  )
}

/// GET /resources/stats/overview
async fn resource_stats(
  State(state): State<AppState>,
  _user: ActiveUser,
  ValidQuery(window): ValidQuery<DateWindow>,
) -> Result<Response, ApiError> {
  let filters = super::date_range("createdAt", window.date_from, window.date_to);
  let items = records(&state, COLLECTION, &filters).await?;

  let stats = json!({
    "total": items.len(),
    "public": listing::count_where(&items, "isPublic", &json!(true)),
    "featured": listing::count_where(&items, "isFeatured", &json!(true)),
    "byCategory": listing::count_by(&items, "category", ResourceCategory::NAMES),
    "byType": listing::count_by(&items, "type", ResourceType::NAMES),
    "totalDownloads": listing::sum_field(&items, "downloads"),
    "totalViews": listing::sum_field(&items, "views"),
    "thisWeek": listing::count_since(&items, "createdAt", 7, Utc::now()),
  });
  response::ok("Resource statistics retrieved successfully", stats)
}
