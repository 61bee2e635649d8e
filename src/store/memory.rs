//! In-memory document store with change subscriptions.
//!
//! Stands in for the hosted store in tests and demos while honoring its whole
//! contract, including the parts that make the resilient layer necessary:
//! composite queries are rejected with `IndexRequired` unless the index was
//! declared, and collections can be marked permission-denied. Writes fan out
//! to subscribers through a broadcast channel in the event-bus style; each
//! subscription re-runs its query and delivers ordered snapshots.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use chrono::Utc;
use serde_json::Value;
use tokio::sync::broadcast;
use uuid::Uuid;

use super::constraint::{self, Constraint};
use super::{CancelHandle, Document, DocumentStore, ErrorHandler, Fields, SnapshotHandler, StoreError};

const DEFAULT_CHANNEL_CAPACITY: usize = 64;

/// Composite index registration: which filter fields may be combined with
/// which ordering field. Mirrors the hosted store's rule that an equality
/// clause plus an ordering on a different field needs a precomputed index.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct IndexKey {
    collection: String,
    filter_fields: Vec<String>,
    order_field: String,
}

struct StoreInner {
    collections: RwLock<HashMap<String, BTreeMap<String, Fields>>>,
    indexes: RwLock<HashSet<IndexKey>>,
    denied: RwLock<HashSet<String>>,
    changes: broadcast::Sender<String>,
}

#[derive(Clone)]
pub struct MemoryStore {
    inner: Arc<StoreInner>,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CHANNEL_CAPACITY)
    }

    /// `capacity` bounds the change-notification channel; slow subscribers
    /// that lag simply re-query and catch up with the latest snapshot.
    pub fn with_capacity(capacity: usize) -> Self {
        let (changes, _) = broadcast::channel(capacity);
        Self {
            inner: Arc::new(StoreInner {
                collections: RwLock::new(HashMap::new()),
                indexes: RwLock::new(HashSet::new()),
                denied: RwLock::new(HashSet::new()),
                changes,
            }),
        }
    }

    /// Declare a composite index so the matching query shape succeeds.
    pub fn define_index(&self, collection: &str, filter_fields: &[&str], order_field: &str) {
        let mut filter_fields: Vec<String> =
            filter_fields.iter().map(|f| f.to_string()).collect();
        filter_fields.sort();
        self.inner.indexes.write().unwrap().insert(IndexKey {
            collection: collection.to_string(),
            filter_fields,
            order_field: order_field.to_string(),
        });
    }

    /// Make every operation on `collection` fail with `PermissionDenied`.
    pub fn deny_collection(&self, collection: &str) {
        self.inner
            .denied
            .write()
            .unwrap()
            .insert(collection.to_string());
        // Live listeners observe the denial on their next re-query.
        let _ = self.inner.changes.send(collection.to_string());
    }

    pub fn allow_collection(&self, collection: &str) {
        self.inner.denied.write().unwrap().remove(collection);
    }
}

impl StoreInner {
    fn check_permission(&self, collection: &str) -> Result<(), StoreError> {
        if self.denied.read().unwrap().contains(collection) {
            return Err(StoreError::PermissionDenied {
                collection: collection.to_string(),
            });
        }
        Ok(())
    }

    /// A query needs a composite index when it combines at least one filter
    /// clause with an ordering on a field outside the filter set.
    fn check_index(&self, collection: &str, constraints: &[Constraint]) -> Result<(), StoreError> {
        let mut filter_fields: Vec<String> = constraints
            .iter()
            .filter_map(|c| match c {
                Constraint::Equality { field, .. } | Constraint::Membership { field, .. } => {
                    Some(field.clone())
                }
                _ => None,
            })
            .collect();
        filter_fields.sort();
        filter_fields.dedup();

        let order_field = constraints.iter().find_map(|c| match c {
            Constraint::Ordering { field, .. } => Some(field.clone()),
            _ => None,
        });

        let Some(order_field) = order_field else {
            return Ok(());
        };
        if filter_fields.is_empty() || filter_fields.contains(&order_field) {
            return Ok(());
        }

        let key = IndexKey {
            collection: collection.to_string(),
            filter_fields: filter_fields.clone(),
            order_field: order_field.clone(),
        };
        if self.indexes.read().unwrap().contains(&key) {
            return Ok(());
        }

        Err(StoreError::IndexRequired {
            collection: collection.to_string(),
            constraints: constraint::summarize(constraints),
            hint: format!(
                "declare index on {collection} ({}, {order_field})",
                filter_fields.join("+")
            ),
        })
    }

    fn run_query(
        &self,
        collection: &str,
        constraints: &[Constraint],
    ) -> Result<Vec<Document>, StoreError> {
        self.check_permission(collection)?;
        self.check_index(collection, constraints)?;
        let collections = self.collections.read().unwrap();
        let docs: Vec<Document> = collections
            .get(collection)
            .map(|docs| {
                docs.iter()
                    .map(|(id, fields)| Document {
                        id: id.clone(),
                        fields: fields.clone(),
                    })
                    .collect()
            })
            .unwrap_or_default();
        Ok(constraint::apply(docs, constraints))
    }

    fn notify(&self, collection: &str) {
        // No receivers is fine; nobody is watching yet.
        let _ = self.changes.send(collection.to_string());
    }
}

#[async_trait]
impl DocumentStore for MemoryStore {
    async fn insert(&self, collection: &str, mut fields: Fields) -> Result<String, StoreError> {
        self.inner.check_permission(collection)?;
        let id = Uuid::new_v4().to_string();
        // Server-timestamp semantics: stamp createdAt unless the caller did.
        fields
            .entry("createdAt".to_string())
            .or_insert_with(|| Value::String(Utc::now().to_rfc3339()));
        self.inner
            .collections
            .write()
            .unwrap()
            .entry(collection.to_string())
            .or_default()
            .insert(id.clone(), fields);
        tracing::debug!(collection, id = %id, "Inserted document");
        self.inner.notify(collection);
        Ok(id)
    }

    async fn update(&self, collection: &str, id: &str, patch: Fields) -> Result<(), StoreError> {
        self.inner.check_permission(collection)?;
        {
            let mut collections = self.inner.collections.write().unwrap();
            let fields = collections
                .get_mut(collection)
                .and_then(|docs| docs.get_mut(id))
                .ok_or_else(|| StoreError::NotFound {
                    collection: collection.to_string(),
                    id: id.to_string(),
                })?;
            for (key, value) in patch {
                fields.insert(key, value);
            }
        }
        tracing::debug!(collection, id, "Updated document");
        self.inner.notify(collection);
        Ok(())
    }

    async fn delete(&self, collection: &str, id: &str) -> Result<(), StoreError> {
        self.inner.check_permission(collection)?;
        let removed = self
            .inner
            .collections
            .write()
            .unwrap()
            .get_mut(collection)
            .and_then(|docs| docs.remove(id))
            .is_some();
        if removed {
            tracing::debug!(collection, id, "Deleted document");
            self.inner.notify(collection);
        }
        Ok(())
    }

    async fn get(&self, collection: &str, id: &str) -> Result<Document, StoreError> {
        self.inner.check_permission(collection)?;
        self.inner
            .collections
            .read()
            .unwrap()
            .get(collection)
            .and_then(|docs| docs.get(id))
            .map(|fields| Document {
                id: id.to_string(),
                fields: fields.clone(),
            })
            .ok_or_else(|| StoreError::NotFound {
                collection: collection.to_string(),
                id: id.to_string(),
            })
    }

    async fn query(
        &self,
        collection: &str,
        constraints: &[Constraint],
    ) -> Result<Vec<Document>, StoreError> {
        self.inner.run_query(collection, constraints)
    }

    fn subscribe(
        &self,
        collection: &str,
        constraints: &[Constraint],
        on_data: SnapshotHandler,
        on_error: ErrorHandler,
    ) -> CancelHandle {
        let inner = self.inner.clone();
        let collection = collection.to_string();
        let constraints = constraints.to_vec();
        let closed = Arc::new(AtomicBool::new(false));
        let closed_task = closed.clone();

        let task = tokio::spawn(async move {
            // Subscribe before the initial snapshot so no write is missed
            // between the two.
            let mut rx = inner.changes.subscribe();

            let deliver = |closed: &AtomicBool| -> bool {
                match inner.run_query(&collection, &constraints) {
                    Ok(docs) => {
                        if !closed.load(Ordering::SeqCst) {
                            on_data(docs);
                        }
                        true
                    }
                    Err(e) => {
                        if !closed.load(Ordering::SeqCst) {
                            on_error(e);
                        }
                        false
                    }
                }
            };

            if !deliver(&closed_task) {
                return;
            }
            loop {
                match rx.recv().await {
                    Ok(changed) if changed == collection => {
                        if !deliver(&closed_task) {
                            return;
                        }
                    }
                    Ok(_) => {}
                    // Lagged: changes were dropped, but a fresh re-query
                    // already reflects all of them.
                    Err(broadcast::error::RecvError::Lagged(_)) => {
                        if !deliver(&closed_task) {
                            return;
                        }
                    }
                    Err(broadcast::error::RecvError::Closed) => return,
                }
            }
        });

        CancelHandle::new(move || {
            closed.store(true, Ordering::SeqCst);
            task.abort();
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::Direction;
    use serde_json::json;

    fn fields(value: Value) -> Fields {
        match value {
            Value::Object(map) => map,
            _ => unreachable!(),
        }
    }

    #[tokio::test]
    async fn insert_stamps_created_at() {
        let store = MemoryStore::new();
        let id = store
            .insert("leaves", fields(json!({"status": "pending"})))
            .await
            .unwrap();
        let doc = store.get("leaves", &id).await.unwrap();
        assert!(doc.field("createdAt").is_string());
    }

    #[tokio::test]
    async fn composite_query_requires_declared_index() {
        let store = MemoryStore::new();
        let constraints = vec![
            Constraint::eq("teacherId", "t-1"),
            Constraint::eq("status", "pending"),
            Constraint::order_by("createdAt", Direction::Descending),
        ];
        let err = store.query("leaves", &constraints).await.unwrap_err();
        assert!(err.is_index_required());

        store.define_index("leaves", &["status", "teacherId"], "createdAt");
        assert!(store.query("leaves", &constraints).await.is_ok());
    }

    #[tokio::test]
    async fn ordering_on_filtered_field_needs_no_index() {
        let store = MemoryStore::new();
        let constraints = vec![
            Constraint::eq("status", "pending"),
            Constraint::order_by("status", Direction::Ascending),
        ];
        assert!(store.query("leaves", &constraints).await.is_ok());
    }

    #[tokio::test]
    async fn denied_collection_fails_all_operations() {
        let store = MemoryStore::new();
        store.deny_collection("leaves");
        let err = store.query("leaves", &[]).await.unwrap_err();
        assert_eq!(
            err,
            StoreError::PermissionDenied {
                collection: "leaves".to_string()
            }
        );
        assert!(store
            .insert("leaves", Fields::new())
            .await
            .unwrap_err()
            .is_fatal_for_subscription());
    }

    #[tokio::test]
    async fn update_merges_partial_fields() {
        let store = MemoryStore::new();
        let id = store
            .insert(
                "leaves",
                fields(json!({"status": "pending", "reason": "fever"})),
            )
            .await
            .unwrap();
        store
            .update("leaves", &id, fields(json!({"status": "approved"})))
            .await
            .unwrap();
        let doc = store.get("leaves", &id).await.unwrap();
        assert_eq!(doc.field("status"), &json!("approved"));
        assert_eq!(doc.field("reason"), &json!("fever"));
    }

    #[tokio::test]
    async fn delete_is_idempotent() {
        let store = MemoryStore::new();
        assert!(store.delete("leaves", "missing").await.is_ok());
    }
}
