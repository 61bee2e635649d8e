pub mod constraint;
pub mod error;
pub mod memory;

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

pub use constraint::{Constraint, Direction, compare_values, lookup_field, sort_documents};
pub use error::StoreError;
pub use memory::MemoryStore;

/// Raw field map of one document, as stored on the wire (camelCase keys).
pub type Fields = serde_json::Map<String, Value>;

/// One document as returned by the store: opaque id plus field map.
#[derive(Debug, Clone, PartialEq)]
pub struct Document {
    pub id: String,
    pub fields: Fields,
}

impl Document {
    /// Field lookup supporting dotted paths (`assignedTeacher.id`).
    pub fn field(&self, path: &str) -> &Value {
        lookup_field(&self.fields, path)
    }
}

/// Snapshot callback: receives the full current result set on every delivery.
pub type SnapshotHandler = Arc<dyn Fn(Vec<Document>) + Send + Sync>;

/// Error callback for subscription-level failures.
pub type ErrorHandler = Arc<dyn Fn(StoreError) + Send + Sync>;

/// Disposable unsubscribe handle. Cancelling twice is a no-op; dropping the
/// handle cancels the underlying listener.
pub struct CancelHandle {
    cancel: Option<Box<dyn FnOnce() + Send>>,
}

impl CancelHandle {
    pub fn new(cancel: impl FnOnce() + Send + 'static) -> Self {
        Self {
            cancel: Some(Box::new(cancel)),
        }
    }

    pub fn noop() -> Self {
        Self { cancel: None }
    }

    pub fn cancel(&mut self) {
        if let Some(cancel) = self.cancel.take() {
            cancel();
        }
    }
}

impl Drop for CancelHandle {
    fn drop(&mut self) {
        self.cancel();
    }
}

impl std::fmt::Debug for CancelHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CancelHandle")
            .field("active", &self.cancel.is_some())
            .finish()
    }
}

/// Uniform contract against the external document store.
///
/// Constraints are an ordered clause list; order is preserved verbatim when
/// composing the underlying query, since it determines which composite index
/// the store demands. The adapter holds no state between calls; every failure
/// surfaces through [`StoreError`], never a panic.
///
/// `subscribe` registers a change listener and returns immediately; data and
/// errors (including index rejections) are delivered through the callbacks,
/// matching the push model of the underlying store.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    async fn insert(&self, collection: &str, fields: Fields) -> Result<String, StoreError>;

    /// Point update merging `patch` into the document. Partial-field patches
    /// only; absent keys are left untouched.
    async fn update(&self, collection: &str, id: &str, patch: Fields) -> Result<(), StoreError>;

    /// Point delete. Deleting an absent document is a no-op.
    async fn delete(&self, collection: &str, id: &str) -> Result<(), StoreError>;

    async fn get(&self, collection: &str, id: &str) -> Result<Document, StoreError>;

    /// One-shot predicate query.
    async fn query(
        &self,
        collection: &str,
        constraints: &[Constraint],
    ) -> Result<Vec<Document>, StoreError>;

    /// Change subscription: pushes the current result set on every write that
    /// affects it. Within one subscription, snapshots are delivered in order.
    fn subscribe(
        &self,
        collection: &str,
        constraints: &[Constraint],
        on_data: SnapshotHandler,
        on_error: ErrorHandler,
    ) -> CancelHandle;
}
