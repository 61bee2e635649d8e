//! Resilient query engine.
//!
//! Attempts the precise (possibly composite) query first. When the store
//! rejects it for a missing composite index, the query is re-issued without
//! its ordering and limit clauses and the dropped semantics are restored
//! client-side: same sort field and direction (timestamps by instant, nulls
//! earliest), limit re-applied after the sort. Degraded operation is reported
//! through a non-fatal advisory, never through the error callback. Every
//! other error kind propagates unchanged.

use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::store::constraint::{self, Constraint, Direction};
use crate::store::{
    CancelHandle, Document, DocumentStore, ErrorHandler, SnapshotHandler, StoreError,
    sort_documents,
};

/// Non-fatal degraded-mode notification, distinct from an error. The UI
/// renders it as an informational banner, not a failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Advisory {
    pub collection: String,
    pub message: String,
}

pub type AdvisoryHandler = Arc<dyn Fn(Advisory) + Send + Sync>;

/// One-shot query outcome; `degraded` is the advisory for the non-streaming
/// path.
#[derive(Debug, Clone)]
pub struct QueryResult {
    pub documents: Vec<Document>,
    pub degraded: bool,
}

/// ===============================
/// Degradation plan
/// ===============================
///
/// What remains of a constraint list once the store refuses it, plus the
/// clauses to restore client-side.
#[derive(Debug, Clone)]
struct DegradedPlan {
    reduced: Vec<Constraint>,
    order: Option<(String, Direction)>,
    limit: Option<usize>,
}

impl DegradedPlan {
    fn new(constraints: &[Constraint], fallback: Option<&Constraint>) -> Self {
        let reduced: Vec<Constraint> = constraints
            .iter()
            .filter(|c| c.is_filter())
            .cloned()
            .collect();
        let order = constraints.iter().find_map(|c| match c {
            Constraint::Ordering { field, direction } => Some((field.clone(), *direction)),
            _ => None,
        });
        let limit = constraints.iter().find_map(|c| match c {
            Constraint::Limit(n) => Some(*n),
            _ => None,
        });
        let reduced = if reduced.is_empty() {
            // No filters survive: use the supplied fallback clause, or fetch
            // the whole collection unfiltered.
            fallback.cloned().into_iter().collect()
        } else {
            reduced
        };
        Self {
            reduced,
            order,
            limit,
        }
    }

    /// Restore the dropped semantics on a raw degraded result set.
    fn finish(&self, mut docs: Vec<Document>) -> Vec<Document> {
        if let Some((field, direction)) = &self.order {
            sort_documents(&mut docs, field, *direction);
        }
        if let Some(n) = self.limit {
            docs.truncate(n);
        }
        docs
    }
}

pub struct QueryEngine {
    store: Arc<dyn DocumentStore>,
}

impl QueryEngine {
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &Arc<dyn DocumentStore> {
        &self.store
    }

    /// One-shot query with index-failure degradation.
    pub async fn run(
        &self,
        collection: &str,
        constraints: &[Constraint],
        fallback: Option<&Constraint>,
    ) -> Result<QueryResult, StoreError> {
        match self.store.query(collection, constraints).await {
            Ok(documents) => Ok(QueryResult {
                documents,
                degraded: false,
            }),
            Err(e) if e.is_index_required() => {
                tracing::warn!(
                    collection,
                    constraints = %constraint::summarize(constraints),
                    "Missing index, degrading to client-side filter/sort"
                );
                let plan = DegradedPlan::new(constraints, fallback);
                let documents = self.store.query(collection, &plan.reduced).await?;
                Ok(QueryResult {
                    documents: plan.finish(documents),
                    degraded: true,
                })
            }
            Err(e) => Err(e),
        }
    }

    /// Streaming query with transparent degrade-and-resubscribe. The handle
    /// cancels the active underlying subscription, whichever one that is.
    pub fn watch(
        &self,
        collection: &str,
        constraints: &[Constraint],
        fallback: Option<Constraint>,
        on_data: SnapshotHandler,
        on_error: ErrorHandler,
        on_advisory: AdvisoryHandler,
    ) -> WatchHandle {
        let shared = Arc::new(WatchShared {
            store: self.store.clone(),
            collection: collection.to_string(),
            constraints: constraints.to_vec(),
            fallback,
            on_data,
            on_error,
            on_advisory,
            closed: AtomicBool::new(false),
            degraded: AtomicBool::new(false),
            active: Mutex::new(None),
        });

        shared.swap_subscription(subscribe_precise);
        WatchHandle { shared }
    }
}

struct WatchShared {
    store: Arc<dyn DocumentStore>,
    collection: String,
    constraints: Vec<Constraint>,
    fallback: Option<Constraint>,
    on_data: SnapshotHandler,
    on_error: ErrorHandler,
    on_advisory: AdvisoryHandler,
    closed: AtomicBool,
    degraded: AtomicBool,
    /// At most one underlying store subscription at any time; degrading
    /// replaces (cancel, then re-subscribe), never layers.
    active: Mutex<Option<CancelHandle>>,
}

impl WatchShared {
    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Cancel the current underlying subscription (if any) and install the
    /// one produced by `subscribe`. The slot lock is held across the swap so
    /// a callback firing from the new subscription's task cannot observe a
    /// half-replaced state, and a concurrent cancel always wins.
    fn swap_subscription(
        self: &Arc<Self>,
        subscribe: impl FnOnce(&Arc<WatchShared>) -> CancelHandle,
    ) {
        let mut active = self.active.lock().unwrap();
        if let Some(mut old) = active.take() {
            old.cancel();
        }
        if self.is_closed() {
            return;
        }
        *active = Some(subscribe(self));
    }
}

/// Subscribe with the full constraint list.
fn subscribe_precise(shared: &Arc<WatchShared>) -> CancelHandle {
    let data_shared = shared.clone();
    let error_shared = shared.clone();
    shared.store.subscribe(
        &shared.collection,
        &shared.constraints,
        Arc::new(move |docs| {
            if !data_shared.is_closed() {
                (data_shared.on_data)(docs);
            }
        }),
        Arc::new(move |e| handle_store_error(&error_shared, e)),
    )
}

/// Subscribe with the degraded constraint list, restoring dropped clauses
/// client-side on every snapshot.
fn subscribe_degraded(shared: &Arc<WatchShared>, plan: DegradedPlan) -> CancelHandle {
    let data_shared = shared.clone();
    let error_shared = shared.clone();
    let reduced = plan.reduced.clone();
    shared.store.subscribe(
        &shared.collection,
        &reduced,
        Arc::new(move |docs| {
            if !data_shared.is_closed() {
                (data_shared.on_data)(plan.finish(docs));
            }
        }),
        Arc::new(move |e| handle_store_error(&error_shared, e)),
    )
}

fn handle_store_error(shared: &Arc<WatchShared>, err: StoreError) {
    if shared.is_closed() {
        return;
    }
    if err.is_index_required() {
        if shared.degraded.swap(true, Ordering::SeqCst) {
            // Already degraded; a reduced query should never index-fail, so
            // log and keep the subscription as-is.
            tracing::warn!(
                collection = %shared.collection,
                error = %err,
                "Index failure on an already-degraded subscription"
            );
            return;
        }
        tracing::warn!(
            collection = %shared.collection,
            constraints = %constraint::summarize(&shared.constraints),
            "Missing index, re-subscribing with degraded query"
        );
        let plan = DegradedPlan::new(&shared.constraints, shared.fallback.as_ref());
        shared.swap_subscription(move |s| subscribe_degraded(s, plan));
        // Exactly once per degraded subscription, not once per snapshot.
        (shared.on_advisory)(Advisory {
            collection: shared.collection.clone(),
            message: format!(
                "Results for '{}' are filtered and sorted locally until the \
                 composite index is created; records outside the retained \
                 filters may be missing.",
                shared.collection
            ),
        });
        return;
    }
    (shared.on_error)(err);
}

/// Cancel/unsubscribe handle for a watched query. Idempotent; dropping the
/// handle cancels the watch.
pub struct WatchHandle {
    shared: Arc<WatchShared>,
}

impl WatchHandle {
    /// Stops the underlying subscription and suppresses any callback already
    /// scheduled but not yet delivered. Safe to call repeatedly and from
    /// within the watch's own callbacks.
    pub fn cancel(&self) {
        self.shared.closed.store(true, Ordering::SeqCst);
        let mut active = self.shared.active.lock().unwrap();
        if let Some(mut handle) = active.take() {
            handle.cancel();
        }
    }

    pub fn is_degraded(&self) -> bool {
        self.shared.degraded.load(Ordering::SeqCst)
    }
}

impl Drop for WatchHandle {
    fn drop(&mut self) {
        self.cancel();
    }
}

impl std::fmt::Debug for WatchHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WatchHandle")
            .field("collection", &self.shared.collection)
            .field("closed", &self.shared.is_closed())
            .field("degraded", &self.is_degraded())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::Fields;
    use serde_json::json;

    fn doc(id: &str, created: &str) -> Document {
        let mut fields = Fields::new();
        fields.insert("createdAt".to_string(), json!(created));
        Document {
            id: id.to_string(),
            fields,
        }
    }

    #[test]
    fn plan_keeps_filters_drops_ordering_and_limit() {
        let constraints = vec![
            Constraint::eq("teacherId", "t-1"),
            Constraint::eq("status", "pending"),
            Constraint::order_by("createdAt", Direction::Descending),
            Constraint::limit(5),
        ];
        let plan = DegradedPlan::new(&constraints, None);
        assert_eq!(
            plan.reduced,
            vec![
                Constraint::eq("teacherId", "t-1"),
                Constraint::eq("status", "pending"),
            ]
        );
        assert_eq!(
            plan.order,
            Some(("createdAt".to_string(), Direction::Descending))
        );
        assert_eq!(plan.limit, Some(5));
    }

    #[test]
    fn plan_substitutes_fallback_when_no_filters_remain() {
        let constraints = vec![Constraint::order_by("createdAt", Direction::Ascending)];
        let fallback = Constraint::eq("status", "approved");
        let plan = DegradedPlan::new(&constraints, Some(&fallback));
        assert_eq!(plan.reduced, vec![fallback]);
    }

    #[test]
    fn plan_fetches_unfiltered_without_fallback() {
        let constraints = vec![Constraint::order_by("createdAt", Direction::Ascending)];
        let plan = DegradedPlan::new(&constraints, None);
        assert!(plan.reduced.is_empty());
    }

    #[test]
    fn finish_restores_sort_then_limit() {
        let constraints = vec![
            Constraint::eq("status", "pending"),
            Constraint::order_by("createdAt", Direction::Descending),
            Constraint::limit(2),
        ];
        let plan = DegradedPlan::new(&constraints, None);
        let docs = vec![
            doc("a", "2024-01-01T00:00:00Z"),
            doc("c", "2024-01-03T00:00:00Z"),
            doc("b", "2024-01-02T00:00:00Z"),
        ];
        let out = plan.finish(docs);
        let ids: Vec<_> = out.iter().map(|d| d.id.as_str()).collect();
        assert_eq!(ids, vec!["c", "b"]);
    }
}
