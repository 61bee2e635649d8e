use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum_macros::{Display, EnumIter, EnumString};

use crate::store::{Document, Fields};

/// Collection the leave documents live in (default, see [`crate::config::Config`]).
pub const LEAVES_COLLECTION: &str = "leaves";

#[derive(Debug, Copy, Clone, Eq, PartialEq, Serialize, Deserialize, Display, EnumString, EnumIter)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum LeaveType {
    Home,
    Sick,
    Other,
}

/// Approval axis. Moves only through teacher/gateman actions, never automatically.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Serialize, Deserialize, Display, EnumString, EnumIter)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum LeaveStatus {
    Pending,
    Approved,
    Rejected,
    Completed,
}

/// Physical-presence axis, causally gated by [`LeaveStatus::Approved`].
#[derive(Debug, Copy, Clone, Eq, PartialEq, Serialize, Deserialize, Display, EnumString, EnumIter)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum GateStatus {
    Waiting,
    Out,
    Returned,
}

/// One leave request document.
///
/// Student/teacher identity is a denormalized snapshot captured at filing time
/// and never re-synced. `created_at` is stamped by the store on insert; it is
/// `None` only on a record that has not been persisted yet.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LeaveRecord {
    pub id: String,
    pub student_id: String,
    pub student_name: String,
    #[serde(default)]
    pub teacher_id: Option<String>,
    #[serde(default)]
    pub teacher_name: Option<String>,
    #[serde(rename = "type")]
    pub leave_type: LeaveType,
    pub reason: String,
    pub from_date: DateTime<Utc>,
    pub to_date: DateTime<Utc>,
    pub status: LeaveStatus,
    #[serde(default)]
    pub teacher_remarks: Option<String>,
    pub gateman_status: GateStatus,
    #[serde(default)]
    pub exit_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub return_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub gate_remarks: Option<String>,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
}

impl LeaveRecord {
    /// Decode a raw store document into a typed record.
    pub fn from_document(doc: &Document) -> Result<Self, serde_json::Error> {
        let mut fields = doc.fields.clone();
        fields.insert("id".to_string(), serde_json::Value::String(doc.id.clone()));
        serde_json::from_value(serde_json::Value::Object(fields))
    }

    /// Encode the record back into store fields (`id` stays out of the body).
    pub fn to_fields(&self) -> Result<Fields, serde_json::Error> {
        let value = serde_json::to_value(self)?;
        let mut fields = match value {
            serde_json::Value::Object(map) => map,
            _ => unreachable!("struct serializes to an object"),
        };
        fields.remove("id");
        Ok(fields)
    }

    /// Decode a whole snapshot, skipping documents that fail to decode.
    ///
    /// A malformed document must not take down a live dashboard; it is logged
    /// and dropped from the projection.
    pub fn from_snapshot(docs: &[Document]) -> Vec<Self> {
        docs.iter()
            .filter_map(|doc| match Self::from_document(doc) {
                Ok(record) => Some(record),
                Err(e) => {
                    tracing::warn!(error = %e, id = %doc.id, "Skipping undecodable leave document");
                    None
                }
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample_fields() -> Fields {
        let value = json!({
            "studentId": "s-1",
            "studentName": "Asha",
            "teacherId": "t-1",
            "teacherName": "Mr. Rao",
            "type": "sick",
            "reason": "fever",
            "fromDate": "2024-01-10T09:00:00Z",
            "toDate": "2024-01-10T18:00:00Z",
            "status": "pending",
            "gatemanStatus": "waiting",
            "createdAt": "2024-01-09T08:00:00Z"
        });
        match value {
            serde_json::Value::Object(map) => map,
            _ => unreachable!(),
        }
    }

    #[test]
    fn decodes_wire_document() {
        let doc = Document {
            id: "l-1".to_string(),
            fields: sample_fields(),
        };
        let record = LeaveRecord::from_document(&doc).unwrap();
        assert_eq!(record.id, "l-1");
        assert_eq!(record.leave_type, LeaveType::Sick);
        assert_eq!(record.status, LeaveStatus::Pending);
        assert_eq!(record.gateman_status, GateStatus::Waiting);
        assert_eq!(record.teacher_id.as_deref(), Some("t-1"));
        assert!(record.exit_time.is_none());
    }

    #[test]
    fn round_trips_through_fields() {
        let doc = Document {
            id: "l-1".to_string(),
            fields: sample_fields(),
        };
        let record = LeaveRecord::from_document(&doc).unwrap();
        let fields = record.to_fields().unwrap();
        assert!(!fields.contains_key("id"));
        let again = LeaveRecord::from_document(&Document {
            id: "l-1".to_string(),
            fields,
        })
        .unwrap();
        assert_eq!(again.student_name, "Asha");
        assert_eq!(again.from_date, record.from_date);
    }

    #[test]
    fn snapshot_skips_malformed_documents() {
        let good = Document {
            id: "l-1".to_string(),
            fields: sample_fields(),
        };
        let bad = Document {
            id: "l-2".to_string(),
            fields: Fields::new(),
        };
        let records = LeaveRecord::from_snapshot(&[good, bad]);
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].id, "l-1");
    }
}
