use chrono::{Duration, Utc};
use serde_json::json;
use mindcare::db::{DocumentStore, SqliteBackend};
use mindcare::types::FieldFilter;
use std::sync::Arc;
use uuid::Uuid;

async fn store() -> SqliteBackend {
  let backend = SqliteBackend::in_memory().await.unwrap();
  backend.init_schema().await.unwrap();
  backend
}

#[tokio::test]
async fn test_init_schema_is_idempotent() {
  let backend = store().await;
  backend.init_schema().await.unwrap();
  backend.ping().await.unwrap();
}

#[tokio::test]
async fn test_insert_get_update_delete() {
  let backend = store().await;

  let doc = backend
    .insert("journals", json!({"title": "First week", "mood": "neutral"}))
    .await
    .unwrap();
  assert_eq!(doc.collection, "journals");

  let fetched = backend.get("journals", doc.id).await.unwrap().unwrap();
  assert_eq!(fetched.data["title"], "First week");

  // Update is a shallow merge: untouched keys survive.
  let updated = backend
    .update("journals", doc.id, json!({"mood": "positive"}))
    .await
    .unwrap()
    .unwrap();
  assert_eq!(updated.data["mood"], "positive");
  assert_eq!(updated.data["title"], "First week");

  let deleted = backend.delete("journals", doc.id).await.unwrap().unwrap();
  assert_eq!(deleted.id, doc.id);
  assert!(backend.get("journals", doc.id).await.unwrap().is_none());
  assert!(backend.delete("journals", doc.id).await.unwrap().is_none());
}

#[tokio::test]
async fn test_missing_documents() {
  let backend = store().await;
  let id = Uuid::new_v4();
  assert!(backend.get("qna", id).await.unwrap().is_none());
  assert!(backend
    .update("qna", id, json!({"views": 1}))
    .await
    .unwrap()
    .is_none());
}

#[tokio::test]
async fn test_collections_are_isolated() {
  let backend = store().await;
  let doc = backend.insert("qna", json!({"question": "x"})).await.unwrap();
  assert!(backend.get("journals", doc.id).await.unwrap().is_none());
  assert!(backend.list("journals", &[]).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_list_filters() {
  let backend = store().await;
  for (status, flagged, date, tags) in [
    ("pending", false, "2024-06-01T09:00:00.000Z", json!(["exams"])),
    ("reviewed", true, "2024-06-10T09:00:00.000Z", json!(["sleep", "exams"])),
    ("pending", true, "2024-06-20T09:00:00.000Z", json!([])),
  ] {
    backend
      .insert(
        "journals",
        json!({"status": status, "isFlagged": flagged, "createdAt": date, "tags": tags}),
      )
      .await
      .unwrap();
  }

  let pending = backend
    .list("journals", &[FieldFilter::eq("status", "pending")])
    .await
    .unwrap();
  assert_eq!(pending.len(), 2);

  let flagged = backend
    .list("journals", &[FieldFilter::eq("isFlagged", true)])
    .await
    .unwrap();
  assert_eq!(flagged.len(), 2);

  let window = backend
    .list(
      "journals",
      &[
        FieldFilter::gte("createdAt", "2024-06-05T00:00:00.000Z"),
        FieldFilter::lte("createdAt", "2024-06-15T00:00:00.000Z"),
      ],
    )
    .await
    .unwrap();
  assert_eq!(window.len(), 1);
  assert_eq!(window[0].data["status"], "reviewed");

  let exams = backend
    .list("journals", &[FieldFilter::contains("tags", "exams")])
    .await
    .unwrap();
  assert_eq!(exams.len(), 2);

  let combined = backend
    .list(
      "journals",
      &[
        FieldFilter::eq("status", "pending"),
        FieldFilter::eq("isFlagged", true),
      ],
    )
    .await
    .unwrap();
  assert_eq!(combined.len(), 1);
}

#[tokio::test]
async fn test_list_rejects_unsafe_field_names() {
  let backend = store().await;
  let result = backend
    .list("journals", &[FieldFilter::eq("status') OR 1=1 --", "x")])
    .await;
  assert!(result.is_err());
}

#[tokio::test]
async fn test_transform_counters_do_not_lose_updates() {
  let backend: Arc<dyn DocumentStore> = Arc::new(store().await);
  let doc = backend.insert("qna", json!({"views": 0})).await.unwrap();

  let mut handles = Vec::new();
  for _ in 0..20 {
    let backend = backend.clone();
    handles.push(tokio::spawn(async move {
      backend
        .transform(
          "qna",
          doc.id,
          Box::new(|data| {
            let views = data["views"].as_u64().unwrap_or(0);
            data["views"] = json!(views + 1);
          }),
        )
        .await
        .unwrap()
    }));
  }
  for handle in handles {
    handle.await.unwrap();
  }

  let doc = backend.get("qna", doc.id).await.unwrap().unwrap();
  assert_eq!(doc.data["views"], 20);
}

#[tokio::test]
async fn test_credentials() {
  let backend = store().await;
  let user_id = Uuid::new_v4();
  backend
    .create_credential(user_id, "sam@school.edu", "hash-1")
    .await
    .unwrap();

  let found = backend
    .credential_by_email("sam@school.edu")
    .await
    .unwrap()
    .unwrap();
  assert_eq!(found.user_id, user_id);

  // Emails are unique.
  assert!(backend
    .create_credential(Uuid::new_v4(), "sam@school.edu", "hash-2")
    .await
    .is_err());

  assert!(backend.update_password(user_id, "hash-3").await.unwrap());
  let found = backend.credential(user_id).await.unwrap().unwrap();
  assert_eq!(found.password_hash, "hash-3");

  assert!(backend.delete_credential(user_id).await.unwrap());
  assert!(backend.credential(user_id).await.unwrap().is_none());
}

#[tokio::test]
async fn test_sessions() {
  let backend = store().await;
  let user_id = Uuid::new_v4();

  let live = backend
    .create_session(user_id, "live-hash", Utc::now() + Duration::hours(1))
    .await
    .unwrap();
  backend
    .create_session(user_id, "stale-hash", Utc::now() - Duration::hours(1))
    .await
    .unwrap();

  let found = backend.find_session("live-hash").await.unwrap().unwrap();
  assert_eq!(found.id, live.id);
  assert!(!found.is_expired());
  assert!(backend
    .find_session("stale-hash")
    .await
    .unwrap()
    .unwrap()
    .is_expired());

  assert_eq!(backend.cleanup_expired_sessions().await.unwrap(), 1);
  assert!(backend.find_session("stale-hash").await.unwrap().is_none());

  backend
    .create_session(user_id, "second-hash", Utc::now() + Duration::hours(1))
    .await
    .unwrap();
  assert_eq!(backend.delete_user_sessions(user_id).await.unwrap(), 2);
  assert!(!backend.delete_session(live.id).await.unwrap());
}
