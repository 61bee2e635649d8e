//! Live subscription registry.
//!
//! Replaces the ad-hoc unsubscribe closures the screens used to hold with a
//! single registry keyed by subscription id and explicit lifecycle states.
//! Registrations against the same collection with different constraints are
//! fully independent; delivery is ordered only within a single registration.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use derive_more::Display;

use crate::store::{Constraint, DocumentStore, ErrorHandler, SnapshotHandler};

use super::query::{AdvisoryHandler, QueryEngine, WatchHandle};

#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash, Display)]
pub struct SubscriptionId(u64);

/// Per-registration lifecycle. `Degraded` is sticky: the precise query is not
/// re-attempted once the store has rejected it. `Closed` is terminal, reached
/// only through `unregister` or an unrecoverable store failure.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum SubscriptionState {
    Connecting,
    Live,
    Degraded,
    Closed,
}

struct Registration {
    state: Arc<Mutex<SubscriptionState>>,
    /// None only during the registration window before the watch handle is
    /// stored; an unregister landing in that window marks the state Closed
    /// and `register` cleans up.
    handle: Option<WatchHandle>,
}

pub struct SubscriptionManager {
    engine: QueryEngine,
    registry: Mutex<HashMap<SubscriptionId, Registration>>,
    next_id: AtomicU64,
}

impl SubscriptionManager {
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self {
            engine: QueryEngine::new(store),
            registry: Mutex::new(HashMap::new()),
            next_id: AtomicU64::new(1),
        }
    }

    pub fn engine(&self) -> &QueryEngine {
        &self.engine
    }

    /// Open a live query. `on_data` receives the full current result set on
    /// every relevant write; `on_advisory` fires at most once, when the query
    /// degrades; `on_error` fires once if the subscription dies.
    pub fn register(
        &self,
        collection: &str,
        constraints: Vec<Constraint>,
        fallback: Option<Constraint>,
        on_data: SnapshotHandler,
        on_error: ErrorHandler,
        on_advisory: AdvisoryHandler,
    ) -> SubscriptionId {
        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::SeqCst));
        let state = Arc::new(Mutex::new(SubscriptionState::Connecting));
        self.registry.lock().unwrap().insert(
            id,
            Registration {
                state: state.clone(),
                handle: None,
            },
        );
        tracing::info!(subscription = %id, collection, "Registered live query");

        let data_state = state.clone();
        let wrapped_data: SnapshotHandler = Arc::new(move |docs| {
            {
                let mut s = data_state.lock().unwrap();
                match *s {
                    SubscriptionState::Closed => return,
                    SubscriptionState::Connecting => *s = SubscriptionState::Live,
                    _ => {}
                }
            }
            on_data(docs);
        });

        let advisory_state = state.clone();
        let wrapped_advisory: AdvisoryHandler = Arc::new(move |advisory| {
            {
                let mut s = advisory_state.lock().unwrap();
                if *s == SubscriptionState::Closed {
                    return;
                }
                *s = SubscriptionState::Degraded;
            }
            on_advisory(advisory);
        });

        let error_state = state.clone();
        let wrapped_error: ErrorHandler = Arc::new(move |err| {
            {
                let mut s = error_state.lock().unwrap();
                if *s == SubscriptionState::Closed {
                    return;
                }
                if err.is_fatal_for_subscription() {
                    tracing::error!(error = %err, "Live query closed by store failure");
                    *s = SubscriptionState::Closed;
                } else {
                    tracing::warn!(error = %err, "Live query error surfaced to caller");
                }
            }
            on_error(err);
        });

        let handle = self.engine.watch(
            collection,
            &constraints,
            fallback,
            wrapped_data,
            wrapped_error,
            wrapped_advisory,
        );

        let mut registry = self.registry.lock().unwrap();
        match registry.get_mut(&id) {
            Some(registration) => registration.handle = Some(handle),
            // Unregistered while still connecting.
            None => handle.cancel(),
        }
        id
    }

    /// Cancel a registration. Idempotent, safe from within the registration's
    /// own callback; no `on_data`/`on_error` is delivered for this id
    /// afterwards, including deliveries already scheduled.
    pub fn unregister(&self, id: SubscriptionId) {
        let registration = self.registry.lock().unwrap().remove(&id);
        match registration {
            Some(registration) => {
                *registration.state.lock().unwrap() = SubscriptionState::Closed;
                if let Some(handle) = registration.handle {
                    handle.cancel();
                }
                tracing::info!(subscription = %id, "Unregistered live query");
            }
            // Unknown or already removed.
            None => {}
        }
    }

    pub fn state(&self, id: SubscriptionId) -> Option<SubscriptionState> {
        self.registry
            .lock()
            .unwrap()
            .get(&id)
            .map(|r| *r.state.lock().unwrap())
    }

    /// Number of open registrations, closed ones included until unregistered.
    pub fn len(&self) -> usize {
        self.registry.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.registry.lock().unwrap().is_empty()
    }
}
