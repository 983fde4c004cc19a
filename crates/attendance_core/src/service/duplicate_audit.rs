//! Same-day duplicate detection and deterministic resolution.
//!
//! # Responsibility
//! - Group records by `(student_id, date)` and report collisions.
//! - Decide which record survives without depending on fetch order.
//!
//! # Invariants
//! - The keeper is the record with the earliest `recorded_at`, ties broken by
//!   the smallest id.
//! - `resolve` never deletes the keeper and deletes every other member.
//! - Detection and planning are pure; deletion happens only through
//!   `AttendanceStore::apply_resolutions`.

use crate::model::duplicate::{DuplicateAuditReport, DuplicateGroup, ResolutionPlan};
use crate::model::record::AttendanceRecord;
use chrono::NaiveDate;
use std::collections::BTreeMap;

/// Groups colliding records by `(student_id, date)`.
///
/// Groups come back sorted by key; members sorted by `(recorded_at, id)`.
pub fn find_duplicates(records: &[AttendanceRecord]) -> Vec<DuplicateGroup> {
    let mut buckets: BTreeMap<(&str, NaiveDate), Vec<&AttendanceRecord>> = BTreeMap::new();
    for record in records {
        buckets.entry(record.day_key()).or_default().push(record);
    }

    buckets
        .into_iter()
        .filter(|(_, members)| members.len() > 1)
        .map(|((student_id, date), members)| {
            let mut records: Vec<AttendanceRecord> = members.into_iter().cloned().collect();
            records.sort_by_key(AttendanceRecord::precedence_key);
            DuplicateGroup {
                student_id: student_id.to_string(),
                date,
                records,
            }
        })
        .collect()
}

/// Runs detection and wraps the result with reporting counters.
pub fn audit(records: &[AttendanceRecord]) -> DuplicateAuditReport {
    DuplicateAuditReport::from_groups(find_duplicates(records))
}

/// Plans keep-one/delete-rest for one group.
///
/// Returns `None` for groups with fewer than two members.
pub fn resolve(group: &DuplicateGroup) -> Option<ResolutionPlan> {
    if group.len() < 2 {
        return None;
    }
    let keep = group.keeper()?.id;
    let mut delete: Vec<_> = group
        .records
        .iter()
        .map(|record| record.id)
        .filter(|id| *id != keep)
        .collect();
    delete.sort();

    Some(ResolutionPlan {
        student_id: group.student_id.clone(),
        date: group.date,
        keep,
        delete,
    })
}

/// Plans resolution for every group in a report.
pub fn resolve_all(report: &DuplicateAuditReport) -> Vec<ResolutionPlan> {
    report.groups.iter().filter_map(resolve).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::record::NewAttendanceRecord;
    use uuid::Uuid;

    fn record_at(student_id: &str, date: &str, recorded_at: i64) -> AttendanceRecord {
        let mut entry = NewAttendanceRecord::new(student_id, date, "present");
        entry.recorded_at = Some(recorded_at);
        entry.into_record().unwrap()
    }

    #[test]
    fn n_colliding_records_form_one_group_and_resolve_keeps_earliest() {
        let records = vec![
            record_at("S1", "2025-10-10", 3_000),
            record_at("S1", "2025-10-10T14:00:00", 1_000),
            record_at("S1", "2025-10-10", 2_000),
            record_at("S1", "2025-10-11", 500),
        ];

        let groups = find_duplicates(&records);
        assert_eq!(groups.len(), 1);
        assert_eq!(groups[0].len(), 3);

        let plan = resolve(&groups[0]).unwrap();
        assert_eq!(plan.keep, records[1].id);
        assert_eq!(plan.delete.len(), 2);
        assert!(!plan.delete.contains(&records[1].id));
    }

    #[test]
    fn resolution_is_independent_of_input_order() {
        let mut records = vec![
            record_at("S1", "2025-10-10", 2_000),
            record_at("S1", "2025-10-10", 1_000),
            record_at("S1", "2025-10-10", 1_500),
        ];
        let expected = resolve(&find_duplicates(&records)[0]).unwrap();

        records.reverse();
        assert_eq!(resolve(&find_duplicates(&records)[0]).unwrap(), expected);
        records.swap(0, 1);
        assert_eq!(resolve(&find_duplicates(&records)[0]).unwrap(), expected);
    }

    #[test]
    fn equal_recorded_at_breaks_tie_by_id() {
        let low = Uuid::parse_str("00000000-0000-4000-8000-000000000001").unwrap();
        let high = Uuid::parse_str("00000000-0000-4000-8000-000000000002").unwrap();
        let mut a = record_at("S1", "2025-10-10", 1_000);
        a.id = high;
        let mut b = record_at("S1", "2025-10-10", 1_000);
        b.id = low;

        let plan = resolve(&find_duplicates(&[a, b])[0]).unwrap();
        assert_eq!(plan.keep, low);
        assert_eq!(plan.delete, vec![high]);
    }

    #[test]
    fn report_counts_groups_and_surplus() {
        let records = vec![
            record_at("S1", "2025-10-10", 1),
            record_at("S1", "2025-10-10", 2),
            record_at("S2", "2025-10-10", 1),
            record_at("S2", "2025-10-10", 2),
            record_at("S2", "2025-10-10", 3),
            record_at("S3", "2025-10-10", 1),
        ];
        let report = audit(&records);
        assert_eq!(report.group_count, 2);
        assert_eq!(report.duplicate_record_count, 5);
        assert_eq!(report.surplus_record_count, 3);
        assert_eq!(resolve_all(&report).len(), 2);
    }

    #[test]
    fn clean_slice_reports_nothing() {
        let records = vec![
            record_at("S1", "2025-10-10", 1),
            record_at("S2", "2025-10-10", 1),
        ];
        assert!(audit(&records).is_clean());
    }
}
