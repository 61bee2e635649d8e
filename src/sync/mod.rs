pub mod manager;
pub mod query;

pub use manager::{SubscriptionId, SubscriptionManager, SubscriptionState};
pub use query::{Advisory, AdvisoryHandler, QueryEngine, QueryResult, WatchHandle};
