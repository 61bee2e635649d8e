use thiserror::Error;

/// Closed taxonomy for everything the document store can throw at us.
///
/// `IndexRequired` is the only kind recovered locally (by query degradation);
/// every other kind is passed through to the caller unchanged, annotated with
/// enough context to render a useful message.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StoreError {
    #[error("permission denied on '{collection}'")]
    PermissionDenied { collection: String },

    #[error("query on '{collection}' ({constraints}) requires a composite index; see {hint}")]
    IndexRequired {
        collection: String,
        constraints: String,
        hint: String,
    },

    #[error("document '{collection}/{id}' not found")]
    NotFound { collection: String, id: String },

    #[error("store unavailable: {0}")]
    Unavailable(String),

    #[error("store error: {0}")]
    Unknown(String),
}

impl StoreError {
    pub fn is_index_required(&self) -> bool {
        matches!(self, StoreError::IndexRequired { .. })
    }

    /// Kinds that permanently end a subscription (no retry, no degradation).
    pub fn is_fatal_for_subscription(&self) -> bool {
        matches!(self, StoreError::PermissionDenied { .. })
    }
}
