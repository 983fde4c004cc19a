//! Per-student presence aggregation.
//!
//! # Invariants
//! - Pure over the input multiset: any permutation yields the same summary.
//! - `late` counts toward `present`.
//! - Zero records yields `percentage == 0`.

use crate::model::record::AttendanceRecord;
use crate::model::summary::AttendanceSummary;
use std::collections::BTreeMap;

/// Summarizes the records belonging to `student_id`.
///
/// Records of other students are ignored, so a class slice may be passed.
pub fn summarize(student_id: &str, records: &[AttendanceRecord]) -> AttendanceSummary {
    let student_id = student_id.trim();
    let (present, total) = records
        .iter()
        .filter(|record| record.student_id == student_id)
        .fold((0u32, 0u32), |(present, total), record| {
            (
                present + u32::from(record.status.counts_as_present()),
                total + 1,
            )
        });
    AttendanceSummary::from_counts(student_id, present, total)
}

/// Summarizes every student present in `records`, sorted by student id.
pub fn summarize_all(records: &[AttendanceRecord]) -> Vec<AttendanceSummary> {
    let mut counts: BTreeMap<&str, (u32, u32)> = BTreeMap::new();
    for record in records {
        let entry = counts.entry(record.student_id.as_str()).or_default();
        entry.0 += u32::from(record.status.counts_as_present());
        entry.1 += 1;
    }

    counts
        .into_iter()
        .map(|(student_id, (present, total))| {
            AttendanceSummary::from_counts(student_id, present, total)
        })
        .collect()
}
