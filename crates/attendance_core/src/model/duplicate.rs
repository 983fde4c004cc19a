//! Duplicate same-day record groups and their resolution plans.
//!
//! # Invariants
//! - A group always holds at least two records sharing `(student_id, date)`.
//! - Group members are ordered by `(recorded_at, id)`; the first member is the
//!   record resolution keeps.

use crate::model::record::{AttendanceRecord, RecordId};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Records colliding on one `(student_id, date)` key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DuplicateGroup {
    pub student_id: String,
    pub date: NaiveDate,
    /// Sorted by `(recorded_at, id)`.
    pub records: Vec<AttendanceRecord>,
}

impl DuplicateGroup {
    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// The record that survives resolution.
    pub fn keeper(&self) -> Option<&AttendanceRecord> {
        self.records
            .iter()
            .min_by_key(|record| record.precedence_key())
    }
}

/// Audit output for one class/section slice.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DuplicateAuditReport {
    pub group_count: usize,
    /// Every record that belongs to some group, keepers included.
    pub duplicate_record_count: usize,
    /// Records that resolution would delete.
    pub surplus_record_count: usize,
    pub groups: Vec<DuplicateGroup>,
}

impl DuplicateAuditReport {
    pub fn from_groups(groups: Vec<DuplicateGroup>) -> Self {
        let duplicate_record_count = groups.iter().map(DuplicateGroup::len).sum();
        let surplus_record_count = groups
            .iter()
            .map(|group| group.len().saturating_sub(1))
            .sum();
        Self {
            group_count: groups.len(),
            duplicate_record_count,
            surplus_record_count,
            groups,
        }
    }

    pub fn is_clean(&self) -> bool {
        self.groups.is_empty()
    }
}

/// Keep-one/delete-rest decision for a single group.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolutionPlan {
    pub student_id: String,
    pub date: NaiveDate,
    pub keep: RecordId,
    pub delete: Vec<RecordId>,
}
