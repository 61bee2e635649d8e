//! Leave actions: the read-validate-patch glue between the UI triggers and
//! the store. Each method point-reads the record, runs the pure transition,
//! and persists the resulting partial patch; the live subscriptions carry the
//! change to every open dashboard from there.

use std::sync::Arc;

use chrono::Utc;
use thiserror::Error;

use crate::config::Config;
use crate::lifecycle::{self, Actor, LeaveAction, LeaveRequestForm, RecordPatch, TransitionError};
use crate::model::leave::LeaveRecord;
use crate::model::user::UserRecord;
use crate::store::{DocumentStore, StoreError};

#[derive(Debug, Error)]
pub enum ServiceError {
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Transition(#[from] TransitionError),
    #[error("leave record '{id}' is malformed: {source}")]
    Decode {
        id: String,
        #[source]
        source: serde_json::Error,
    },
}

pub struct LeaveService {
    store: Arc<dyn DocumentStore>,
    leaves: String,
}

impl LeaveService {
    pub fn new(store: Arc<dyn DocumentStore>, config: &Config) -> Self {
        Self {
            store,
            leaves: config.leaves_collection.clone(),
        }
    }

    /// Submit a new leave request. Validation runs before any store call: an
    /// invalid form never reaches the wire.
    pub async fn file_leave(
        &self,
        student: &UserRecord,
        form: &LeaveRequestForm,
    ) -> Result<String, ServiceError> {
        let fields = lifecycle::file_leave(form, student)?;
        let id = self
            .store
            .insert(&self.leaves, fields)
            .await
            .map_err(|e| {
                tracing::error!(error = %e, student_id = %student.id, "Failed to file leave");
                e
            })?;
        tracing::info!(leave_id = %id, student_id = %student.id, "Leave request filed");
        Ok(id)
    }

    pub async fn approve(
        &self,
        actor: &Actor,
        leave_id: &str,
        remarks: impl Into<String>,
    ) -> Result<(), ServiceError> {
        self.act(
            actor,
            leave_id,
            LeaveAction::Approve {
                remarks: remarks.into(),
            },
        )
        .await
    }

    pub async fn reject(
        &self,
        actor: &Actor,
        leave_id: &str,
        remarks: impl Into<String>,
    ) -> Result<(), ServiceError> {
        self.act(
            actor,
            leave_id,
            LeaveAction::Reject {
                remarks: remarks.into(),
            },
        )
        .await
    }

    pub async fn record_exit(
        &self,
        actor: &Actor,
        leave_id: &str,
        remarks: Option<String>,
    ) -> Result<(), ServiceError> {
        self.act(actor, leave_id, LeaveAction::RecordExit { remarks })
            .await
    }

    pub async fn record_return(
        &self,
        actor: &Actor,
        leave_id: &str,
        remarks: Option<String>,
    ) -> Result<(), ServiceError> {
        self.act(actor, leave_id, LeaveAction::RecordReturn { remarks })
            .await
    }

    pub async fn delete(&self, actor: &Actor, leave_id: &str) -> Result<(), ServiceError> {
        self.act(actor, leave_id, LeaveAction::Delete).await
    }

    async fn act(
        &self,
        actor: &Actor,
        leave_id: &str,
        action: LeaveAction,
    ) -> Result<(), ServiceError> {
        let doc = self.store.get(&self.leaves, leave_id).await?;
        let record = LeaveRecord::from_document(&doc).map_err(|source| ServiceError::Decode {
            id: leave_id.to_string(),
            source,
        })?;
        let patch = lifecycle::transition(&record, &action, actor, Utc::now())?;
        match patch {
            RecordPatch::Update(fields) => {
                self.store
                    .update(&self.leaves, leave_id, fields)
                    .await
                    .map_err(|e| {
                        tracing::error!(error = %e, leave_id, "Failed to update leave");
                        e
                    })?;
            }
            RecordPatch::Delete => {
                self.store.delete(&self.leaves, leave_id).await.map_err(|e| {
                    tracing::error!(error = %e, leave_id, "Failed to delete leave");
                    e
                })?;
            }
        }
        tracing::info!(leave_id, action = action.name(), actor = %actor.id, "Leave action applied");
        Ok(())
    }
}
