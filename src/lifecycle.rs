//! Leave record lifecycle state machine.
//!
//! The single authority for every status/gatemanStatus move, replacing the
//! scattered per-screen conditionals the workflow grew out of. Pure logic: it
//! validates a requested action against the current record, computes the
//! partial-field patch, and stops there; callers persist the patch through
//! the store adapter and let the live subscriptions fan the change out.
//!
//! Legal transitions (status, gatemanStatus):
//!
//! | From                | Action       | Actor   | To                    |
//! |---------------------|--------------|---------|-----------------------|
//! | (pending, waiting)  | approve      | teacher | (approved, waiting)   |
//! | (pending, waiting)  | reject       | teacher | (rejected, waiting)   |
//! | (approved, waiting) | recordExit   | gateman | (approved, out)       |
//! | (approved, out)     | recordReturn | gateman | (completed, returned) |
//! | any                 | delete       | admin   | (removed)             |

use chrono::{DateTime, Utc};
use serde_json::{Value, json};
use std::str::FromStr;
use thiserror::Error;

use crate::model::leave::{GateStatus, LeaveRecord, LeaveStatus, LeaveType};
use crate::model::user::{Role, UserRecord};
use crate::store::Fields;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LeaveAction {
    Approve { remarks: String },
    Reject { remarks: String },
    RecordExit { remarks: Option<String> },
    RecordReturn { remarks: Option<String> },
    Delete,
}

impl LeaveAction {
    pub fn name(&self) -> &'static str {
        match self {
            LeaveAction::Approve { .. } => "approve",
            LeaveAction::Reject { .. } => "reject",
            LeaveAction::RecordExit { .. } => "recordExit",
            LeaveAction::RecordReturn { .. } => "recordReturn",
            LeaveAction::Delete => "delete",
        }
    }
}

/// Who is asking. Identity comes from the session layer, which this core
/// treats as already authenticated.
#[derive(Debug, Clone)]
pub struct Actor {
    pub id: String,
    pub name: String,
    pub role: Role,
}

/// Verdict of a legal transition: a partial-field patch (never a full-record
/// overwrite, so concurrent unrelated edits are not clobbered) or a removal.
#[derive(Debug, Clone, PartialEq)]
pub enum RecordPatch {
    Update(Fields),
    Delete,
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TransitionError {
    #[error("cannot {action} a leave in state ({status}, {gate})")]
    IllegalTransition {
        action: &'static str,
        status: LeaveStatus,
        gate: GateStatus,
    },
    #[error("'{actor}' is not allowed to {action} this leave")]
    Unauthorized { actor: String, action: &'static str },
    #[error("{0}")]
    Validation(String),
}

/// Validate `action` against `record` and compute the resulting patch.
///
/// Pure: the input record is never mutated, and no store call is made. `now`
/// is injected so exit/return stamps are deterministic under test.
pub fn transition(
    record: &LeaveRecord,
    action: &LeaveAction,
    actor: &Actor,
    now: DateTime<Utc>,
) -> Result<RecordPatch, TransitionError> {
    let illegal = || TransitionError::IllegalTransition {
        action: action.name(),
        status: record.status,
        gate: record.gateman_status,
    };
    let unauthorized = || TransitionError::Unauthorized {
        actor: actor.id.clone(),
        action: action.name(),
    };

    match action {
        LeaveAction::Approve { remarks } | LeaveAction::Reject { remarks } => {
            if record.status != LeaveStatus::Pending || record.gateman_status != GateStatus::Waiting
            {
                return Err(illegal());
            }
            // Only the teacher the request was filed under may decide it.
            if actor.role != Role::Teacher || record.teacher_id.as_deref() != Some(actor.id.as_str())
            {
                return Err(unauthorized());
            }
            let status = match action {
                LeaveAction::Approve { .. } => LeaveStatus::Approved,
                _ => LeaveStatus::Rejected,
            };
            let mut fields = Fields::new();
            fields.insert("status".to_string(), json!(status.to_string()));
            fields.insert("teacherRemarks".to_string(), json!(remarks));
            Ok(RecordPatch::Update(fields))
        }

        LeaveAction::RecordExit { remarks } => {
            if record.status != LeaveStatus::Approved
                || record.gateman_status != GateStatus::Waiting
            {
                return Err(illegal());
            }
            // Any gateman may act: a single shared campus gate.
            if actor.role != Role::Gateman {
                return Err(unauthorized());
            }
            let mut fields = Fields::new();
            fields.insert(
                "gatemanStatus".to_string(),
                json!(GateStatus::Out.to_string()),
            );
            fields.insert("exitTime".to_string(), json!(now.to_rfc3339()));
            fields.insert(
                "gateRemarks".to_string(),
                json!(remarks.clone().unwrap_or_default()),
            );
            Ok(RecordPatch::Update(fields))
        }

        LeaveAction::RecordReturn { remarks } => {
            if record.status != LeaveStatus::Approved || record.gateman_status != GateStatus::Out {
                return Err(illegal());
            }
            if actor.role != Role::Gateman {
                return Err(unauthorized());
            }
            if let Some(exit_time) = record.exit_time {
                if now <= exit_time {
                    return Err(TransitionError::Validation(
                        "return time must be after exit time".to_string(),
                    ));
                }
            }
            let mut fields = Fields::new();
            fields.insert(
                "status".to_string(),
                json!(LeaveStatus::Completed.to_string()),
            );
            fields.insert(
                "gatemanStatus".to_string(),
                json!(GateStatus::Returned.to_string()),
            );
            fields.insert("returnTime".to_string(), json!(now.to_rfc3339()));
            // Absent remark keeps the exit-time remark; the key stays out of
            // the patch entirely.
            if let Some(remarks) = remarks {
                fields.insert("gateRemarks".to_string(), json!(remarks));
            }
            Ok(RecordPatch::Update(fields))
        }

        LeaveAction::Delete => {
            if actor.role != Role::Admin {
                return Err(unauthorized());
            }
            Ok(RecordPatch::Delete)
        }
    }
}

/// What the apply-leave form submits.
#[derive(Debug, Clone)]
pub struct LeaveRequestForm {
    /// Raw type string from the form; must parse to a known [`LeaveType`].
    pub leave_type: String,
    pub reason: String,
    pub from_date: DateTime<Utc>,
    pub to_date: DateTime<Utc>,
}

/// The zeroth transition: produce the insert fields for a new request in
/// (pending, waiting), with the student/teacher identity snapshot denormalized
/// in. `createdAt` is left for the store to stamp.
pub fn file_leave(form: &LeaveRequestForm, student: &UserRecord) -> Result<Fields, TransitionError> {
    if student.role != Role::Student {
        return Err(TransitionError::Unauthorized {
            actor: student.id.clone(),
            action: "fileLeave",
        });
    }
    let leave_type = LeaveType::from_str(&form.leave_type).map_err(|_| {
        TransitionError::Validation(format!(
            "unknown leave type '{}'; allowed: home, sick, other",
            form.leave_type
        ))
    })?;
    if form.reason.trim().is_empty() {
        return Err(TransitionError::Validation(
            "reason must not be empty".to_string(),
        ));
    }
    if form.from_date > form.to_date {
        return Err(TransitionError::Validation(
            "fromDate cannot be after toDate".to_string(),
        ));
    }

    let (teacher_id, teacher_name) = match &student.assigned_teacher {
        Some(teacher) => (json!(teacher.id), json!(teacher.name)),
        None => (Value::Null, Value::Null),
    };

    let mut fields = Fields::new();
    fields.insert("studentId".to_string(), json!(student.id));
    fields.insert("studentName".to_string(), json!(student.name));
    fields.insert("teacherId".to_string(), teacher_id);
    fields.insert("teacherName".to_string(), teacher_name);
    fields.insert("type".to_string(), json!(leave_type.to_string()));
    fields.insert("reason".to_string(), json!(form.reason));
    fields.insert("fromDate".to_string(), json!(form.from_date.to_rfc3339()));
    fields.insert("toDate".to_string(), json!(form.to_date.to_rfc3339()));
    fields.insert(
        "status".to_string(),
        json!(LeaveStatus::Pending.to_string()),
    );
    fields.insert(
        "gatemanStatus".to_string(),
        json!(GateStatus::Waiting.to_string()),
    );
    Ok(fields)
}
