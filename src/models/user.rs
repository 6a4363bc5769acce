use serde::Deserialize;
use serde_json::{json, Map, Value};

use super::{check_paging, Role};
use crate::types::OrderDirection;
use crate::validation::{FieldError, Validate, Validator};

pub const COLLECTION: &str = "users";

string_enum! {
  UserSort {
    Name => "name",
    Email => "email",
    CreatedAt => "createdAt",
    LastLogin => "lastLogin",
  }
}

/// Preferences every new account starts with.
pub fn default_preferences() -> Value {
  json!({
    "notifications": {
      "newAppointments": true,
      "urgentQuestions": true,
      "flaggedJournals": true,
      "systemUpdates": false,
      "emailSummary": true
    },
    "privacy": {
      "profileVisibility": true,
      "activityStatus": false,
      "dataCollection": true
    }
  })
}

/// Merges a preferences patch one sub-object at a time, so updating a single
/// notification flag leaves its siblings untouched.
pub fn merge_preferences(current: &Value, patch: &Map<String, Value>) -> Value {
  let mut merged = match current {
    Value::Object(map) => map.clone(),
    _ => Map::new(),
  };
  for (section, value) in patch {
    match (merged.get_mut(section), value) {
      (Some(Value::Object(existing)), Value::Object(changes)) => {
        for (k, v) in changes {
          existing.insert(k.clone(), v.clone());
        }
      }
      _ => {
        merged.insert(section.clone(), value.clone());
      }
    }
  }
  Value::Object(merged)
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct Register {
  pub email: String,
  pub password: String,
  pub name: String,
  pub title: Option<String>,
  pub department: Option<String>,
  pub phone: Option<String>,
  pub role: Option<Role>,
}

impl Register {
  /// Length rules that depend on configuration are checked by the handler.
  pub fn check(&self, min_password_length: usize) -> Result<(), Vec<FieldError>> {
    let mut v = Validator::new();
    v.email("email", &self.email)
      .length("password", &self.password, min_password_length, 128)
      .length("name", &self.name, 2, 100)
      .opt_length("title", self.title.as_deref(), 0, 100)
      .opt_length("department", self.department.as_deref(), 0, 100)
      .opt_length("phone", self.phone.as_deref(), 0, 20);
    if self.role == Some(Role::Admin) {
      v.push(
        FieldError::new("role", "\"role\" must be one of [counsellor, student]")
          .with_value("admin"),
      );
    }
    v.finish()
  }
}

impl Validate for Register {
  fn validate(&self) -> Result<(), Vec<FieldError>> {
    Ok(())
  }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Login {
  pub email: String,
  pub password: String,
}

impl Validate for Login {
  fn validate(&self) -> Result<(), Vec<FieldError>> {
    let mut v = Validator::new();
    v.email("email", &self.email);
    if self.password.is_empty() {
      v.push(FieldError::new("password", "\"password\" is not allowed to be empty"));
    }
    v.finish()
  }
}

/// Body of `PUT /users/{id}` and `PUT /auth/me`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct ProfileUpdate {
  pub name: Option<String>,
  pub title: Option<String>,
  pub department: Option<String>,
  pub phone: Option<String>,
  pub profile_image: Option<String>,
  pub preferences: Option<Map<String, Value>>,
}

impl ProfileUpdate {
  /// Top-level patch for the user document. Preferences are merged against
  /// the stored value rather than replaced.
  pub fn into_patch(self, current_preferences: &Value) -> Value {
    let mut patch = Map::new();
    let fields = [
      ("name", self.name),
      ("title", self.title),
      ("department", self.department),
      ("phone", self.phone),
      ("profileImage", self.profile_image),
    ];
    for (key, value) in fields {
      if let Some(value) = value {
        patch.insert(key.to_string(), Value::String(value));
      }
    }
    if let Some(preferences) = self.preferences {
      patch.insert(
        "preferences".to_string(),
        merge_preferences(current_preferences, &preferences),
      );
    }
    Value::Object(patch)
  }
}

impl Validate for ProfileUpdate {
  fn validate(&self) -> Result<(), Vec<FieldError>> {
    let mut v = Validator::new();
    v.opt_length("name", self.name.as_deref(), 2, 100)
      .opt_length("title", self.title.as_deref(), 0, 100)
      .opt_length("department", self.department.as_deref(), 0, 100)
      .opt_length("phone", self.phone.as_deref(), 0, 20)
      .uri("profileImage", self.profile_image.as_deref());
    if let Some(preferences) = &self.preferences {
      for (section, value) in preferences {
        let known = section == "notifications" || section == "privacy";
        if !known || !value.is_object() {
          v.push(
            FieldError::new(
              format!("preferences.{}", section),
              format!("\"preferences.{}\" is not allowed", section),
            )
            .with_value(value.clone()),
          );
          continue;
        }
        for (key, flag) in value.as_object().into_iter().flatten() {
          if !flag.is_boolean() {
            let field = format!("preferences.{}.{}", section, key);
            v.push(
              FieldError::new(&field, format!("\"{}\" must be a boolean", field))
                .with_value(flag.clone()),
            );
          }
        }
      }
    }
    v.finish()
  }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct ChangePassword {
  #[serde(default)]
  pub current_password: String,
  #[serde(default)]
  pub new_password: String,
}

impl ChangePassword {
  pub fn check(&self, min_password_length: usize) -> Result<(), Vec<FieldError>> {
    let mut v = Validator::new();
    if self.current_password.is_empty() {
      v.push(FieldError::new("currentPassword", "\"currentPassword\" is required"));
    }
    if self.new_password.is_empty() {
      v.push(FieldError::new("newPassword", "\"newPassword\" is required"));
    } else {
      v.length("newPassword", &self.new_password, min_password_length, 128);
    }
    v.finish()
  }
}

impl Validate for ChangePassword {
  fn validate(&self) -> Result<(), Vec<FieldError>> {
    Ok(())
  }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RoleChange {
  pub role: Role,
}

impl Validate for RoleChange {
  fn validate(&self) -> Result<(), Vec<FieldError>> {
    Ok(())
  }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct UserQuery {
  pub role: Option<Role>,
  pub is_active: Option<bool>,
  pub search: Option<String>,
  pub page: Option<u32>,
  pub limit: Option<u32>,
  pub sort_by: Option<UserSort>,
  pub sort_order: Option<OrderDirection>,
}

impl Validate for UserQuery {
  fn validate(&self) -> Result<(), Vec<FieldError>> {
    let mut v = Validator::new();
    v.opt_length("search", self.search.as_deref(), 0, 100);
    check_paging(&mut v, self.page, self.limit);
    v.finish()
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_merge_preferences_keeps_siblings() {
    let patch = json!({"notifications": {"systemUpdates": true}});
    let merged = merge_preferences(&default_preferences(), patch.as_object().unwrap());
    assert_eq!(merged["notifications"]["systemUpdates"], json!(true));
    assert_eq!(merged["notifications"]["newAppointments"], json!(true));
    assert_eq!(merged["privacy"]["activityStatus"], json!(false));
  }

  #[test]
  fn test_profile_update_patch_only_has_given_fields() {
    let update: ProfileUpdate =
      serde_json::from_value(json!({"department": "Student Services"})).unwrap();
    assert!(update.validate().is_ok());
    let patch = update.into_patch(&default_preferences());
    assert_eq!(patch, json!({"department": "Student Services"}));
  }

  #[test]
  fn test_profile_update_rejects_unknown_preference_section() {
    let update: ProfileUpdate =
      serde_json::from_value(json!({"preferences": {"theme": {"dark": true}}})).unwrap();
    let errors = update.validate().unwrap_err();
    assert_eq!(errors[0].field, "preferences.theme");
  }

  #[test]
  fn test_register_rules() {
    let body: Register = serde_json::from_value(json!({
      "email": "sam@school.edu",
      "password": "12345",
      "name": "Sam",
      "role": "admin"
    }))
    .unwrap();
    let fields: Vec<_> = body.check(6).unwrap_err().into_iter().map(|e| e.field).collect();
    assert_eq!(fields, vec!["password", "role"]);
  }

  #[test]
  fn test_change_password_requires_both() {
    let body: ChangePassword = serde_json::from_value(json!({})).unwrap();
    assert_eq!(body.check(6).unwrap_err().len(), 2);
  }
}
