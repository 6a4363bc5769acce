use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Document {
  pub id: Uuid,
  pub collection: String,
  pub data: Value,
  pub created_at: DateTime<Utc>,
  pub updated_at: DateTime<Utc>,
}

impl Document {
  /// Flattens the document into the shape handed to clients: `{ "id": ..., ...data }`.
  pub fn into_record(self) -> Value {
    let mut map = match self.data {
      Value::Object(map) => map,
      other => {
        let mut map = Map::new();
        map.insert("value".into(), other);
        map
      }
    };
    map.insert("id".into(), Value::String(self.id.to_string()));
    Value::Object(map)
  }

  pub fn str_field(&self, field: &str) -> Option<&str> {
    self.data.get(field).and_then(Value::as_str)
  }

  pub fn bool_field(&self, field: &str) -> Option<bool> {
    self.data.get(field).and_then(Value::as_bool)
  }
}

/// Shallow merge of `patch` into `target`. Top-level keys in the patch replace
/// the target's keys wholesale, matching document-store `update` semantics.
pub fn merge_patch(target: &mut Value, patch: Value) {
  match (target, patch) {
    (Value::Object(target), Value::Object(patch)) => {
      for (key, value) in patch {
        target.insert(key, value);
      }
    }
    (target, patch) => *target = patch,
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use serde_json::json;

  #[test]
  fn test_into_record_flattens_id() {
    let id = Uuid::new_v4();
    let doc = Document {
      id,
      collection: "journals".into(),
      data: json!({"title": "A day"}),
      created_at: Utc::now(),
      updated_at: Utc::now(),
    };
    let record = doc.into_record();
    assert_eq!(record["id"], id.to_string());
    assert_eq!(record["title"], "A day");
  }

  #[test]
  fn test_merge_patch_keeps_untouched_fields() {
    let mut data = json!({"a": 1, "b": {"x": true}});
    merge_patch(&mut data, json!({"b": {"y": false}, "c": "new"}));
    assert_eq!(data, json!({"a": 1, "b": {"y": false}, "c": "new"}));
  }
}
