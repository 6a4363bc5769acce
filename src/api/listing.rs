//! In-memory stages run after the store query: text search, sorting,
//! pagination, and the aggregations behind the stats endpoints.
//!
//! Items are flattened records (`{id, ...data}`) as returned to clients.

use chrono::{DateTime, Duration, Utc};
use serde_json::{json, Map, Value};
use std::cmp::Ordering;
use std::collections::{BTreeMap, HashSet};

use super::response::Pagination;
use crate::models::{timestamp, Priority};
use crate::types::OrderDirection;

/// Number of days covered by [`trends`].
pub const TREND_DAYS: i64 = 30;

/// Resolves a dotted path like `preferences.privacy.activityStatus`.
pub fn lookup<'a>(item: &'a Value, path: &str) -> Option<&'a Value> {
  path
    .split('.')
    .try_fold(item, |value, key| value.get(key))
    .filter(|v| !v.is_null())
}

/// Keeps items where any of `fields` contains `needle`, ignoring case. String
/// arrays match on any element.
pub fn search(items: Vec<Value>, needle: Option<&str>, fields: &[&str]) -> Vec<Value> {
  let needle = match needle.map(str::trim) {
    Some(n) if !n.is_empty() => n.to_lowercase(),
    _ => return items,
  };
  let matches = |value: &Value| match value {
    Value::String(s) => s.to_lowercase().contains(&needle),
    Value::Array(values) => values
      .iter()
      .filter_map(Value::as_str)
      .any(|s| s.to_lowercase().contains(&needle)),
    _ => false,
  };
  items
    .into_iter()
    .filter(|item| {
      fields
        .iter()
        .filter_map(|f| lookup(item, f))
        .any(&matches)
    })
    .collect()
}

fn compare_values(field: &str, a: &Value, b: &Value) -> Ordering {
  if field == "priority" {
    if let (Some(a), Some(b)) = (
      a.as_str().and_then(Priority::rank),
      b.as_str().and_then(Priority::rank),
    ) {
      return a.cmp(&b);
    }
  }
  match (a, b) {
    (Value::Number(a), Value::Number(b)) => {
      let (a, b) = (a.as_f64().unwrap_or(0.0), b.as_f64().unwrap_or(0.0));
      a.partial_cmp(&b).unwrap_or(Ordering::Equal)
    }
    (Value::String(a), Value::String(b)) => a.to_lowercase().cmp(&b.to_lowercase()),
    (Value::Bool(a), Value::Bool(b)) => a.cmp(b),
    _ => type_rank(a).cmp(&type_rank(b)),
  }
}

fn type_rank(v: &Value) -> u8 {
  match v {
    Value::Null => 0,
    Value::Bool(_) => 1,
    Value::Number(_) => 2,
    Value::String(_) => 3,
    Value::Array(_) => 4,
    Value::Object(_) => 5,
  }
}

/// Stable sort on `field`. Items without the field go last in either order.
pub fn sort(items: &mut [Value], field: &str, order: OrderDirection) {
  items.sort_by(|a, b| match (lookup(a, field), lookup(b, field)) {
    (None, None) => Ordering::Equal,
    (None, Some(_)) => Ordering::Greater,
    (Some(_), None) => Ordering::Less,
    (Some(a), Some(b)) => {
      let ord = compare_values(field, a, b);
      match order {
        OrderDirection::Asc => ord,
        OrderDirection::Desc => ord.reverse(),
      }
    }
  });
}

/// Cuts one page out of `items`.
pub fn paginate(
  items: Vec<Value>,
  page: Option<u32>,
  limit: Option<u32>,
) -> (Vec<Value>, Pagination) {
  let pagination = Pagination::new(page, limit, items.len());
  let page_items = items
    .into_iter()
    .skip(pagination.offset())
    .take(pagination.limit as usize)
    .collect();
  (page_items, pagination)
}

pub fn count_where(items: &[Value], field: &str, expected: &Value) -> usize {
  items
    .iter()
    .filter(|item| lookup(item, field) == Some(expected))
    .count()
}

/// Counts per value of `field`, with every name in `variants` present even
/// when zero. Values outside `variants` are counted too.
pub fn count_by(items: &[Value], field: &str, variants: &[&str]) -> Map<String, Value> {
  let mut counts: BTreeMap<String, u64> = variants.iter().map(|v| (v.to_string(), 0)).collect();
  for value in items.iter().filter_map(|item| lookup(item, field)) {
    if let Some(key) = value.as_str() {
      *counts.entry(key.to_string()).or_insert(0) += 1;
    }
  }
  counts
    .into_iter()
    .map(|(k, v)| (k, Value::from(v)))
    .collect()
}

pub fn sum_field(items: &[Value], field: &str) -> u64 {
  items
    .iter()
    .filter_map(|item| lookup(item, field))
    .filter_map(|v| v.as_u64().or_else(|| v.as_f64().map(|f| f.max(0.0) as u64)))
    .sum()
}

pub fn distinct_count(items: &[Value], field: &str) -> usize {
  items
    .iter()
    .filter_map(|item| lookup(item, field))
    .filter_map(Value::as_str)
    .collect::<HashSet<_>>()
    .len()
}

/// Items whose timestamp `field` falls within the last `days` days.
pub fn count_since(items: &[Value], field: &str, days: i64, now: DateTime<Utc>) -> usize {
  let cutoff = timestamp::format(now - Duration::days(days));
  items
    .iter()
    .filter_map(|item| lookup(item, field))
    .filter_map(Value::as_str)
    .filter(|ts| *ts >= cutoff.as_str())
    .count()
}

/// Per-day counts over the last [`TREND_DAYS`] days, oldest first, with
/// empty days included.
pub fn trends(items: &[Value], field: &str, now: DateTime<Utc>) -> Vec<Value> {
  let today = now.date_naive();
  let mut days: BTreeMap<String, u64> = (0..TREND_DAYS)
    .map(|i| ((today - Duration::days(i)).format("%Y-%m-%d").to_string(), 0))
    .collect();
  for ts in items
    .iter()
    .filter_map(|item| lookup(item, field))
    .filter_map(Value::as_str)
  {
    if let Some(day) = ts.get(..10) {
      if let Some(count) = days.get_mut(day) {
        *count += 1;
      }
    }
  }
  days
    .into_iter()
    .map(|(date, count)| json!({"date": date, "count": count}))
    .collect()
}

#[cfg(test)]
mod tests {
  use super::*;

  fn items() -> Vec<Value> {
    vec![
      json!({"id": "1", "title": "Exam nerves", "priority": "low", "views": 5, "tags": ["exams"]}),
      json!({"id": "2", "title": "sleep routine", "priority": "urgent", "views": 12}),
      json!({"id": "3", "title": "Friendship", "views": 1, "tags": ["social", "Exams"]}),
      json!({"id": "4", "title": "Anxiety", "priority": "high"}),
    ]
  }

  fn ids(items: &[Value]) -> Vec<&str> {
    items.iter().map(|i| i["id"].as_str().unwrap()).collect()
  }

  #[test]
  fn test_search_matches_strings_and_arrays() {
    let found = search(items(), Some("EXAM"), &["title", "tags"]);
    assert_eq!(ids(&found), vec!["1", "3"]);
    assert_eq!(search(items(), Some("  "), &["title"]).len(), 4);
    assert_eq!(search(items(), None, &["title"]).len(), 4);
  }

  #[test]
  fn test_sort_priority_by_rank_missing_last() {
    let mut list = items();
    sort(&mut list, "priority", OrderDirection::Desc);
    assert_eq!(ids(&list), vec!["2", "4", "1", "3"]);
    sort(&mut list, "priority", OrderDirection::Asc);
    assert_eq!(ids(&list), vec!["1", "4", "2", "3"]);
  }

  #[test]
  fn test_sort_strings_ignore_case_and_numbers() {
    let mut list = items();
    sort(&mut list, "title", OrderDirection::Asc);
    assert_eq!(ids(&list), vec!["4", "1", "3", "2"]);
    sort(&mut list, "views", OrderDirection::Desc);
    assert_eq!(ids(&list), vec!["2", "1", "3", "4"]);
  }

  #[test]
  fn test_paginate() {
    let (page, p) = paginate(items(), Some(2), Some(3));
    assert_eq!(ids(&page), vec!["4"]);
    assert_eq!((p.total, p.pages), (4, 2));
    assert!(!p.has_next);
    assert!(p.has_prev);

    let (page, _) = paginate(items(), Some(9), Some(3));
    assert!(page.is_empty());
  }

  #[test]
  fn test_aggregations() {
    let list = items();
    let by_priority = count_by(&list, "priority", Priority::NAMES);
    assert_eq!(by_priority["medium"], json!(0));
    assert_eq!(by_priority["urgent"], json!(1));
    assert_eq!(sum_field(&list, "views"), 18);
    assert_eq!(count_where(&list, "priority", &json!("high")), 1);
    assert_eq!(distinct_count(&list, "priority"), 3);
  }

  #[test]
  fn test_trends_and_recent_counts() {
    let now = timestamp::parse("2024-06-30T12:00:00Z").unwrap();
    let list = vec![
      json!({"createdAt": "2024-06-30T08:00:00.000Z"}),
      json!({"createdAt": "2024-06-30T09:00:00.000Z"}),
      json!({"createdAt": "2024-06-25T09:00:00.000Z"}),
      json!({"createdAt": "2024-01-01T00:00:00.000Z"}),
    ];
    let series = trends(&list, "createdAt", now);
    assert_eq!(series.len(), TREND_DAYS as usize);
    assert_eq!(series[0]["date"], "2024-06-01");
    assert_eq!(series.last().unwrap(), &json!({"date": "2024-06-30", "count": 2}));
    assert_eq!(count_since(&list, "createdAt", 7, now), 3);
  }
}
