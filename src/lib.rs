//! Campus leave-management core: the leave record lifecycle state machine and
//! the resilient query/sync layer that keeps role dashboards live against a
//! document store that may reject composite queries, deny access, or lag.
//!
//! The rendering layer consumes exactly this surface: register/unregister
//! live queries ([`sync::SubscriptionManager`]), run leave actions
//! ([`service::LeaveService`] over [`lifecycle`]), and project snapshots into
//! dashboard figures ([`dashboard`]).

pub mod config;
pub mod dashboard;
pub mod lifecycle;
pub mod logging;
pub mod model;
pub mod service;
pub mod store;
pub mod sync;

pub use config::Config;
pub use lifecycle::{Actor, LeaveAction, LeaveRequestForm, RecordPatch, TransitionError};
pub use model::leave::{GateStatus, LeaveRecord, LeaveStatus, LeaveType};
pub use model::user::{Role, TeacherRef, UserRecord};
pub use service::{LeaveService, ServiceError};
pub use store::{
    CancelHandle, Constraint, Direction, Document, DocumentStore, Fields, MemoryStore, StoreError,
};
pub use sync::{Advisory, QueryEngine, SubscriptionId, SubscriptionManager, SubscriptionState};
