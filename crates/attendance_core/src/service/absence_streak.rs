//! Consecutive-absence and late detection.
//!
//! # Invariants
//! - A streak counts consecutive most-recent *school days with a record*, not
//!   calendar days. Non-school days have no records, so a Friday absence
//!   followed by a Monday absence is a streak of two. Do not convert this to
//!   calendar continuity: alert thresholds would shift across weekends and
//!   holidays.
//! - Each day contributes exactly one record: the canonical one (earliest
//!   `recorded_at`, then smallest id), the same row duplicate resolution keeps.
//!   Unresolved duplicates therefore never change the result.
//! - Only `absent` extends a streak; `present`, `late` and `excused` end it.
//! - A `late` most-recent day raises a late alert independent of streaks.
//! - Input order does not matter.

use crate::model::alert::{AbsenceAlert, AlertTier, ESCALATION_THRESHOLD};
use crate::model::record::{AttendanceRecord, AttendanceStatus};
use chrono::NaiveDate;
use std::collections::BTreeMap;

/// One canonical record per day, newest day first.
pub fn canonical_days_newest_first(records: &[AttendanceRecord]) -> Vec<&AttendanceRecord> {
    let mut by_day: BTreeMap<NaiveDate, &AttendanceRecord> = BTreeMap::new();
    for record in records {
        by_day
            .entry(record.date)
            .and_modify(|current| {
                if record.precedence_key() < current.precedence_key() {
                    *current = record;
                }
            })
            .or_insert(record);
    }
    by_day.into_values().rev().collect()
}

/// Length of the leading `absent` run over canonical days, newest first.
pub fn absence_streak(records: &[AttendanceRecord]) -> u32 {
    leading_absences(&canonical_days_newest_first(records))
}

fn leading_absences(days: &[&AttendanceRecord]) -> u32 {
    days.iter()
        .take_while(|record| record.status == AttendanceStatus::Absent)
        .count() as u32
}

/// Detects the alert condition for one student's records.
///
/// `latest` is the canonical record of the most recent day.
/// - streak 0 and latest not late: `None`
/// - latest `late`: `LateToday` with `consecutive_days = 1`
/// - streak 1..3: `AbsentToday`
/// - streak >= 3: `ConsecutiveAbsence`
pub fn detect(records: &[AttendanceRecord]) -> Option<AbsenceAlert> {
    let days = canonical_days_newest_first(records);
    let latest = *days.first()?;

    if latest.status == AttendanceStatus::Late {
        return Some(AbsenceAlert::new(
            latest.student_id.as_str(),
            latest.student_name.as_str(),
            latest.date,
            1,
            AlertTier::LateToday,
        ));
    }

    let streak = leading_absences(&days);
    if streak == 0 {
        return None;
    }
    let tier = if streak >= ESCALATION_THRESHOLD {
        AlertTier::ConsecutiveAbsence
    } else {
        AlertTier::AbsentToday
    };

    Some(AbsenceAlert::new(
        latest.student_id.as_str(),
        latest.student_name.as_str(),
        latest.date,
        streak,
        tier,
    ))
}

/// Runs detection per student over a mixed slice, sorted by student id.
pub fn detect_all(records: &[AttendanceRecord]) -> Vec<AbsenceAlert> {
    let mut by_student: BTreeMap<&str, Vec<AttendanceRecord>> = BTreeMap::new();
    for record in records {
        by_student
            .entry(record.student_id.as_str())
            .or_default()
            .push(record.clone());
    }

    by_student
        .values()
        .filter_map(|student_records| detect(student_records))
        .collect()
}
