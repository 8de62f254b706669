#![warn(missing_docs)]
//! # punchcard-store
//!
//! ## Purpose
//! Defines the persistence/authorization collaborator contract consumed by
//! the session lifecycle and capture pipeline.
//!
//! ## Responsibilities
//! - Expose a generic async insert/update/query API over named record
//!   collections.
//! - Model the small filter/order/limit query surface the tracker needs.
//! - Provide a deterministic in-memory store for tests and the demo binary.
//!
//! ## Data flow
//! Callers hand `serde_json::Value` records to a [`RecordStore`]; the
//! backing service applies its own role-scoped authorization before reading
//! or writing (an external concern, outside this contract).
//!
//! ## Ownership and lifetimes
//! Records are owned values; query results are deep copies so callers never
//! observe later mutations.
//!
//! ## Error model
//! All operations surface [`StoreError`]. Failed writes leave the store
//! unchanged; callers may retry the same operation.
//!
//! ## Security and privacy notes
//! This crate never logs record payloads.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};

use serde_json::Value;
use thiserror::Error;
use uuid::Uuid;

/// One query predicate over a record field.
#[derive(Debug, Clone, PartialEq)]
pub enum Filter {
    /// Field equals the given value.
    Eq {
        /// Record field name.
        field: String,
        /// Expected value.
        value: Value,
    },
    /// Field is absent or JSON null.
    IsNull {
        /// Record field name.
        field: String,
    },
}

/// Sort key applied after filtering.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Order {
    /// Record field to sort by.
    pub field: String,
    /// Sort direction; `true` puts the greatest value first.
    pub descending: bool,
}

/// Filter/order/limit description of one collection read.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Query {
    filters: Vec<Filter>,
    order: Option<Order>,
    limit: Option<usize>,
}

impl Query {
    /// Empty query matching every record in a collection.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds an equality predicate.
    pub fn filter_eq(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.filters.push(Filter::Eq {
            field: field.into(),
            value: value.into(),
        });
        self
    }

    /// Adds an absent-or-null predicate.
    pub fn filter_null(mut self, field: impl Into<String>) -> Self {
        self.filters.push(Filter::IsNull {
            field: field.into(),
        });
        self
    }

    /// Sorts results by `field`, greatest value first.
    pub fn order_desc(mut self, field: impl Into<String>) -> Self {
        self.order = Some(Order {
            field: field.into(),
            descending: true,
        });
        self
    }

    /// Sorts results by `field`, smallest value first.
    pub fn order_asc(mut self, field: impl Into<String>) -> Self {
        self.order = Some(Order {
            field: field.into(),
            descending: false,
        });
        self
    }

    /// Caps the number of returned records.
    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Returns `true` when `record` satisfies every predicate.
    pub fn matches(&self, record: &Value) -> bool {
        self.filters.iter().all(|filter| match filter {
            Filter::Eq { field, value } => record.get(field) == Some(value),
            Filter::IsNull { field } => {
                record.get(field).map(Value::is_null).unwrap_or(true)
            }
        })
    }

    fn apply(&self, mut records: Vec<Value>) -> Vec<Value> {
        records.retain(|record| self.matches(record));

        if let Some(order) = &self.order {
            records.sort_by(|left, right| {
                let ordering = compare_fields(left.get(&order.field), right.get(&order.field));
                if order.descending {
                    ordering.reverse()
                } else {
                    ordering
                }
            });
        }

        if let Some(limit) = self.limit {
            records.truncate(limit);
        }

        records
    }
}

/// Total order over optional JSON field values.
///
/// Strings compare lexicographically (RFC 3339 timestamps sort
/// chronologically under this rule), numbers numerically; absent values sort
/// first and mixed types keep their relative order.
fn compare_fields(left: Option<&Value>, right: Option<&Value>) -> std::cmp::Ordering {
    use std::cmp::Ordering;

    match (left, right) {
        (Some(Value::String(a)), Some(Value::String(b))) => a.cmp(b),
        (Some(Value::Number(a)), Some(Value::Number(b))) => a
            .as_f64()
            .partial_cmp(&b.as_f64())
            .unwrap_or(Ordering::Equal),
        (None, Some(_)) => Ordering::Less,
        (Some(_), None) => Ordering::Greater,
        _ => Ordering::Equal,
    }
}

/// Generic record persistence contract.
///
/// The backing service owns authorization; callers see only the collection
/// API. Write failures must leave stored data unchanged.
pub trait RecordStore: Send + Sync + 'static {
    /// Inserts one record, assigning an `id` when the record carries none,
    /// and returns the stored record.
    fn insert(
        &self,
        collection: &str,
        record: Value,
    ) -> impl Future<Output = Result<Value, StoreError>> + Send;

    /// Inserts several records as one batch write; either all records are
    /// stored or none are.
    fn insert_many(
        &self,
        collection: &str,
        records: Vec<Value>,
    ) -> impl Future<Output = Result<Vec<Value>, StoreError>> + Send;

    /// Merges `patch` object fields into the record with the given id and
    /// returns the patched record.
    fn update(
        &self,
        collection: &str,
        id: &str,
        patch: Value,
    ) -> impl Future<Output = Result<Value, StoreError>> + Send;

    /// Returns the records matching `query`.
    fn query(
        &self,
        collection: &str,
        query: Query,
    ) -> impl Future<Output = Result<Vec<Value>, StoreError>> + Send;
}

/// Deterministic in-memory store for tests and the demo binary.
///
/// Write failure can be injected to exercise retry paths, mirroring the
/// synthetic capture device's failure budget.
#[derive(Debug, Default)]
pub struct MemoryStore {
    collections: Mutex<HashMap<String, Vec<Value>>>,
    fail_writes: AtomicBool,
}

impl MemoryStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every subsequent write fail with [`StoreError::Backend`] until
    /// cleared. Reads are unaffected.
    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    /// Returns the number of records currently held in `collection`.
    pub fn record_count(&self, collection: &str) -> usize {
        self.lock_collections()
            .get(collection)
            .map(Vec::len)
            .unwrap_or(0)
    }

    fn lock_collections(&self) -> std::sync::MutexGuard<'_, HashMap<String, Vec<Value>>> {
        self.collections
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn check_writable(&self) -> Result<(), StoreError> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(StoreError::Backend(
                "injected memory store write failure".to_string(),
            ));
        }
        Ok(())
    }

    fn prepare(record: Value) -> Result<Value, StoreError> {
        let mut record = match record {
            Value::Object(map) => Value::Object(map),
            other => return Err(StoreError::NotAnObject(other.to_string())),
        };

        let missing_id = record
            .get("id")
            .map(|id| id.is_null())
            .unwrap_or(true);
        if missing_id {
            record["id"] = Value::String(Uuid::new_v4().to_string());
        }

        Ok(record)
    }
}

impl RecordStore for MemoryStore {
    async fn insert(&self, collection: &str, record: Value) -> Result<Value, StoreError> {
        self.check_writable()?;
        let record = Self::prepare(record)?;

        let mut collections = self.lock_collections();
        collections
            .entry(collection.to_string())
            .or_default()
            .push(record.clone());
        Ok(record)
    }

    async fn insert_many(
        &self,
        collection: &str,
        records: Vec<Value>,
    ) -> Result<Vec<Value>, StoreError> {
        self.check_writable()?;
        let prepared = records
            .into_iter()
            .map(Self::prepare)
            .collect::<Result<Vec<_>, _>>()?;

        let mut collections = self.lock_collections();
        collections
            .entry(collection.to_string())
            .or_default()
            .extend(prepared.clone());
        Ok(prepared)
    }

    async fn update(&self, collection: &str, id: &str, patch: Value) -> Result<Value, StoreError> {
        self.check_writable()?;
        let Value::Object(patch) = patch else {
            return Err(StoreError::NotAnObject(patch.to_string()));
        };

        let mut collections = self.lock_collections();
        let records = collections
            .get_mut(collection)
            .ok_or_else(|| StoreError::NotFound {
                collection: collection.to_string(),
                id: id.to_string(),
            })?;

        let record = records
            .iter_mut()
            .find(|record| record.get("id").and_then(Value::as_str) == Some(id))
            .ok_or_else(|| StoreError::NotFound {
                collection: collection.to_string(),
                id: id.to_string(),
            })?;

        for (field, value) in patch {
            record[field.as_str()] = value;
        }
        Ok(record.clone())
    }

    async fn query(&self, collection: &str, query: Query) -> Result<Vec<Value>, StoreError> {
        let collections = self.lock_collections();
        let records = collections
            .get(collection)
            .cloned()
            .unwrap_or_default();
        Ok(query.apply(records))
    }
}

/// Persistence layer error type.
#[derive(Debug, Error)]
pub enum StoreError {
    /// No record with the given id exists in the collection.
    #[error("no record '{id}' in collection '{collection}'")]
    NotFound {
        /// Collection name.
        collection: String,
        /// Record identifier.
        id: String,
    },
    /// Records and patches must be JSON objects.
    #[error("record is not a JSON object: {0}")]
    NotAnObject(String),
    /// Backing service failure; the operation may be retried.
    #[error("store backend failure: {0}")]
    Backend(String),
}

#[cfg(test)]
mod tests {
    //! Unit tests for query semantics and memory store writes.

    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn insert_assigns_id_when_absent() {
        let store = MemoryStore::new();
        let stored = store
            .insert("things", json!({ "name": "a" }))
            .await
            .expect("insert should succeed");
        assert!(stored.get("id").and_then(Value::as_str).is_some());

        let kept_id = store
            .insert("things", json!({ "id": "fixed", "name": "b" }))
            .await
            .expect("insert should succeed");
        assert_eq!(kept_id.get("id").and_then(Value::as_str), Some("fixed"));
    }

    #[tokio::test]
    async fn query_filters_orders_and_limits() {
        let store = MemoryStore::new();
        for (id, user, start) in [
            ("s1", "u1", "2024-01-01T08:00:00Z"),
            ("s2", "u1", "2024-01-01T10:00:00Z"),
            ("s3", "u2", "2024-01-01T09:00:00Z"),
        ] {
            store
                .insert(
                    "time_entries",
                    json!({ "id": id, "user_id": user, "start_time": start, "end_time": null }),
                )
                .await
                .expect("insert should succeed");
        }

        let latest_open = store
            .query(
                "time_entries",
                Query::new()
                    .filter_eq("user_id", "u1")
                    .filter_null("end_time")
                    .order_desc("start_time")
                    .limit(1),
            )
            .await
            .expect("query should succeed");
        assert_eq!(latest_open.len(), 1);
        assert_eq!(
            latest_open[0].get("id").and_then(Value::as_str),
            Some("s2")
        );
    }

    #[tokio::test]
    async fn null_filter_matches_absent_and_null_fields() {
        let query = Query::new().filter_null("end_time");
        assert!(query.matches(&json!({ "id": "a" })));
        assert!(query.matches(&json!({ "id": "a", "end_time": null })));
        assert!(!query.matches(&json!({ "id": "a", "end_time": "2024-01-01T00:00:00Z" })));
    }

    #[tokio::test]
    async fn update_merges_patch_fields() {
        let store = MemoryStore::new();
        store
            .insert("time_entries", json!({ "id": "s1", "end_time": null }))
            .await
            .expect("insert should succeed");

        let patched = store
            .update("time_entries", "s1", json!({ "end_time": "2024-01-01T00:05:10Z" }))
            .await
            .expect("update should succeed");
        assert_eq!(
            patched.get("end_time").and_then(Value::as_str),
            Some("2024-01-01T00:05:10Z")
        );

        let missing = store
            .update("time_entries", "nope", json!({ "end_time": null }))
            .await;
        assert!(matches!(missing, Err(StoreError::NotFound { .. })));
    }

    #[tokio::test]
    async fn injected_write_failure_leaves_store_unchanged_and_clears() {
        let store = MemoryStore::new();
        store.set_fail_writes(true);
        let result = store.insert("things", json!({ "name": "a" })).await;
        assert!(matches!(result, Err(StoreError::Backend(_))));
        assert_eq!(store.record_count("things"), 0);

        store.set_fail_writes(false);
        store
            .insert("things", json!({ "name": "a" }))
            .await
            .expect("retry should succeed");
        assert_eq!(store.record_count("things"), 1);
    }

    #[tokio::test]
    async fn insert_many_is_all_or_nothing() {
        let store = MemoryStore::new();
        let result = store
            .insert_many("captures", vec![json!({ "kind": "screen" }), json!(3)])
            .await;
        assert!(matches!(result, Err(StoreError::NotAnObject(_))));
        assert_eq!(store.record_count("captures"), 0);

        let stored = store
            .insert_many(
                "captures",
                vec![json!({ "kind": "screen" }), json!({ "kind": "webcam" })],
            )
            .await
            .expect("batch insert should succeed");
        assert_eq!(stored.len(), 2);
        assert_eq!(store.record_count("captures"), 2);
    }
}
