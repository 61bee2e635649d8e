//! Role dashboard aggregation: pure, synchronous projections over the record
//! set a live subscription delivered. No store calls are made here; callers
//! recompute on every snapshot.

use std::collections::BTreeMap;

use strum::IntoEnumIterator;

use crate::model::leave::{GateStatus, LeaveRecord, LeaveStatus};

/// Which axis to count by.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum GroupBy {
    Status,
    GatemanStatus,
}

/// Counts per enum value, zero-filled over the whole domain so dashboard
/// cards render a 0 instead of disappearing.
pub fn summarize(records: &[LeaveRecord], group_by: GroupBy) -> BTreeMap<String, usize> {
    let mut counts: BTreeMap<String, usize> = match group_by {
        GroupBy::Status => LeaveStatus::iter().map(|s| (s.to_string(), 0)).collect(),
        GroupBy::GatemanStatus => GateStatus::iter().map(|s| (s.to_string(), 0)).collect(),
    };
    for record in records {
        let key = match group_by {
            GroupBy::Status => record.status.to_string(),
            GroupBy::GatemanStatus => record.gateman_status.to_string(),
        };
        *counts.entry(key).or_insert(0) += 1;
    }
    counts
}

/// The `n` most recently filed records, `createdAt` descending. Records the
/// store has not stamped yet sort last.
pub fn recent(records: &[LeaveRecord], n: usize) -> Vec<LeaveRecord> {
    let mut sorted: Vec<LeaveRecord> = records.to_vec();
    sorted.sort_by(|a, b| b.created_at.cmp(&a.created_at));
    sorted.truncate(n);
    sorted
}

/// Elapsed time between exit and return, formatted for the history table.
/// `"N/A"` when either stamp is missing (or the stamps are inconsistent).
pub fn duration(record: &LeaveRecord) -> String {
    let (Some(exit), Some(ret)) = (record.exit_time, record.return_time) else {
        return "N/A".to_string();
    };
    let elapsed = ret - exit;
    if elapsed < chrono::Duration::zero() {
        return "N/A".to_string();
    }
    let hours = elapsed.num_hours();
    let minutes = elapsed.num_minutes() % 60;
    let min_part = format!("{minutes} min{}", if minutes == 1 { "" } else { "s" });
    if hours > 0 {
        format!("{hours} hr{} {min_part}", if hours == 1 { "" } else { "s" })
    } else {
        min_part
    }
}

/// Gate-desk home cards.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct GatemanStats {
    /// Approved and still waiting to exit.
    pub pending_exits: usize,
    /// Out of campus, return not yet recorded.
    pub pending_returns: usize,
}

pub fn gateman_stats(records: &[LeaveRecord]) -> GatemanStats {
    let mut stats = GatemanStats::default();
    for record in records {
        if record.status != LeaveStatus::Approved {
            continue;
        }
        match record.gateman_status {
            GateStatus::Waiting => stats.pending_exits += 1,
            GateStatus::Out => stats.pending_returns += 1,
            GateStatus::Returned => {}
        }
    }
    stats
}

/// Pending requests awaiting a given teacher's decision.
pub fn pending_for_teacher(records: &[LeaveRecord], teacher_id: &str) -> usize {
    records
        .iter()
        .filter(|r| r.status == LeaveStatus::Pending && r.teacher_id.as_deref() == Some(teacher_id))
        .count()
}
