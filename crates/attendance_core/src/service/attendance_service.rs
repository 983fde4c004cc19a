//! Attendance use-case service.
//!
//! # Responsibility
//! - Expose the ingestion, summary, audit and alert contracts over one store.
//! - Pull snapshots from the store and hand them to pure aggregation, audit
//!   and streak logic. Nothing is recomputed implicitly on write.
//!
//! # Invariants
//! - Service APIs never bypass store validation/persistence contracts.
//! - Duplicate resolution only executes through the store's atomic batch.

use crate::model::alert::AbsenceAlert;
use crate::model::duplicate::{DuplicateAuditReport, DuplicateGroup, ResolutionPlan};
use crate::model::record::{AttendanceRecord, NewAttendanceRecord};
use crate::model::summary::AttendanceSummary;
use crate::repo::attendance_repo::{AttendanceStore, RepoResult};
use crate::service::{absence_streak, duplicate_audit, summary};
use chrono::NaiveDate;
use log::info;

/// Inclusive day window for class/section audits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuditWindow {
    Day(NaiveDate),
    Range { from: NaiveDate, to: NaiveDate },
}

/// Use-case facade over an `AttendanceStore`.
pub struct AttendanceService<S: AttendanceStore> {
    store: S,
}

impl<S: AttendanceStore> AttendanceService<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn into_store(self) -> S {
        self.store
    }

    /// Raw append for bulk importers; never merges with existing rows.
    pub fn append(&mut self, entry: NewAttendanceRecord) -> RepoResult<AttendanceRecord> {
        self.store.append(entry)
    }

    /// Records attendance keyed on `(student_id, date)`.
    ///
    /// Updates the canonical existing record (earliest `recorded_at`, then id)
    /// in place, or appends when the key is new. Two callers racing on a new
    /// key can still both append.
    pub fn record_attendance(
        &mut self,
        entry: NewAttendanceRecord,
    ) -> RepoResult<AttendanceRecord> {
        let candidate = entry.clone().into_record()?;
        let existing = self
            .store
            .query_by_student_day(&candidate.student_id, candidate.date)?;

        let canonical = existing
            .iter()
            .min_by_key(|record| record.precedence_key());
        match canonical {
            Some(record) => {
                self.store
                    .update_record(record.id, candidate.status, candidate.remarks.as_deref())
            }
            None => self.store.append(entry),
        }
    }

    /// Summary read contract.
    pub fn summary_for_student(&self, student_id: &str) -> RepoResult<AttendanceSummary> {
        let records = self.store.query_by_student(student_id)?;
        Ok(summary::summarize(student_id, &records))
    }

    /// Per-student summaries for one class/section.
    pub fn summaries_for_class_section(
        &self,
        class_name: &str,
        section: &str,
    ) -> RepoResult<Vec<AttendanceSummary>> {
        let records = self.store.query_by_class_section(class_name, section, None)?;
        Ok(summary::summarize_all(&records))
    }

    /// Audit contract: finds duplicate groups in a class/section window.
    pub fn audit_duplicates(
        &self,
        class_name: &str,
        section: &str,
        window: AuditWindow,
    ) -> RepoResult<DuplicateAuditReport> {
        let records = match window {
            AuditWindow::Day(day) => {
                self.store
                    .query_by_class_section(class_name, section, Some(day))?
            }
            AuditWindow::Range { from, to } => self
                .store
                .query_by_class_section_between(class_name, section, from, to)?,
        };
        let report = duplicate_audit::audit(&records);
        info!(
            "event=duplicate_audit module=service status=ok scanned={} groups={} surplus={}",
            records.len(),
            report.group_count,
            report.surplus_record_count
        );
        Ok(report)
    }

    /// Resolves one confirmed group atomically.
    ///
    /// Returns the executed plan; a group with fewer than two members is a
    /// no-op and returns `None`.
    pub fn resolve_group(&mut self, group: &DuplicateGroup) -> RepoResult<Option<ResolutionPlan>> {
        let Some(plan) = duplicate_audit::resolve(group) else {
            return Ok(None);
        };
        self.store.apply_resolutions(std::slice::from_ref(&plan))?;
        Ok(Some(plan))
    }

    /// Resolves every group of a report in one transaction.
    pub fn resolve_report(
        &mut self,
        report: &DuplicateAuditReport,
    ) -> RepoResult<Vec<ResolutionPlan>> {
        let plans = duplicate_audit::resolve_all(report);
        if !plans.is_empty() {
            self.store.apply_resolutions(&plans)?;
        }
        Ok(plans)
    }

    /// Alert contract for one student.
    pub fn alert_for_student(&self, student_id: &str) -> RepoResult<Option<AbsenceAlert>> {
        let records = self.store.query_by_student(student_id)?;
        Ok(absence_streak::detect(&records))
    }

    /// Alert contract for one class/section.
    ///
    /// Streaks are computed over each student's full history, not only the
    /// class/section slice.
    pub fn alerts_for_class_section(
        &self,
        class_name: &str,
        section: &str,
    ) -> RepoResult<Vec<AbsenceAlert>> {
        let slice = self.store.query_by_class_section(class_name, section, None)?;
        let mut student_ids: Vec<&str> = slice.iter().map(|r| r.student_id.as_str()).collect();
        student_ids.sort_unstable();
        student_ids.dedup();

        let mut alerts = Vec::new();
        for student_id in student_ids {
            let records = self.store.query_by_student(student_id)?;
            if let Some(alert) = absence_streak::detect(&records) {
                alerts.push(alert);
            }
        }
        Ok(alerts)
    }
}
