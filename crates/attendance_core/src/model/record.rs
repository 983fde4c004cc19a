//! Attendance record domain model.
//!
//! # Responsibility
//! - Define the canonical attendance row shared by every derived view.
//! - Normalize and validate ingestion input before it reaches storage.
//!
//! # Invariants
//! - `id` is stable and never reused for another record.
//! - `date` is a calendar day; time of day is stripped on ingestion.
//! - `recorded_at` is distinct from `date` and only orders same-day rows.
//! - At most one record per `(student_id, date)` is intended but not enforced
//!   by default; see `UniquenessPolicy`.

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use std::error::Error;
use std::fmt::{Display, Formatter};
use uuid::Uuid;

/// Stable identifier for one attendance row.
pub type RecordId = Uuid;

/// Presence state captured for one student on one day.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttendanceStatus {
    Present,
    Absent,
    Late,
    Excused,
}

impl AttendanceStatus {
    /// Whether this status counts toward the present tally.
    ///
    /// `Late` counts as present for rate purposes. This is a business rule.
    pub fn counts_as_present(self) -> bool {
        matches!(self, Self::Present | Self::Late)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Present => "present",
            Self::Absent => "absent",
            Self::Late => "late",
            Self::Excused => "excused",
        }
    }

    /// Parses a case-insensitive status name.
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "present" => Some(Self::Present),
            "absent" => Some(Self::Absent),
            "late" => Some(Self::Late),
            "excused" => Some(Self::Excused),
            _ => None,
        }
    }
}

/// Channel through which a record was captured.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordSource {
    #[default]
    Manual,
    Qr,
    Biometric,
}

impl RecordSource {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Manual => "manual",
            Self::Qr => "qr",
            Self::Biometric => "biometric",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "manual" => Some(Self::Manual),
            "qr" => Some(Self::Qr),
            "biometric" => Some(Self::Biometric),
            _ => None,
        }
    }
}

/// Validation failures for attendance ingestion input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttendanceValidationError {
    NilId,
    MissingStudentId,
    MissingDate,
    InvalidDate(String),
    MissingStatus,
    InvalidStatus(String),
    InvalidSource(String),
}

impl Display for AttendanceValidationError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NilId => write!(f, "record id must not be nil"),
            Self::MissingStudentId => write!(f, "student id is required"),
            Self::MissingDate => write!(f, "attendance date is required"),
            Self::InvalidDate(value) => write!(
                f,
                "invalid attendance date `{value}`; expected YYYY-MM-DD or an ISO timestamp"
            ),
            Self::MissingStatus => write!(f, "attendance status is required"),
            Self::InvalidStatus(value) => write!(
                f,
                "invalid attendance status `{value}`; expected present|absent|late|excused"
            ),
            Self::InvalidSource(value) => write!(
                f,
                "invalid record source `{value}`; expected manual|qr|biometric"
            ),
        }
    }
}

impl Error for AttendanceValidationError {}

/// Canonical stored attendance row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttendanceRecord {
    pub id: RecordId,
    pub student_id: String,
    /// Denormalized display name captured at ingestion time.
    pub student_name: String,
    #[serde(rename = "class")]
    pub class_name: String,
    pub section: String,
    pub date: NaiveDate,
    pub status: AttendanceStatus,
    pub remarks: Option<String>,
    pub source: RecordSource,
    pub recorded_by: String,
    /// Unix epoch milliseconds of capture.
    pub recorded_at: i64,
}

impl AttendanceRecord {
    /// Key used for duplicate detection and in-place updates.
    pub fn day_key(&self) -> (&str, NaiveDate) {
        (self.student_id.as_str(), self.date)
    }

    /// Ordering among same-day rows: earliest `recorded_at`, then smallest id.
    ///
    /// The row with the smallest key is the canonical record for its day.
    pub fn precedence_key(&self) -> (i64, RecordId) {
        (self.recorded_at, self.id)
    }

    pub fn validate(&self) -> Result<(), AttendanceValidationError> {
        if self.id.is_nil() {
            return Err(AttendanceValidationError::NilId);
        }
        if self.student_id.trim().is_empty() {
            return Err(AttendanceValidationError::MissingStudentId);
        }
        Ok(())
    }
}

/// Form-shaped ingestion input.
///
/// `date` and `status` arrive as text from UI forms or bulk importers and are
/// normalized by `into_record`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewAttendanceRecord {
    /// Caller-provided id for import paths; generated when `None`.
    pub id: Option<RecordId>,
    pub student_id: String,
    pub student_name: String,
    #[serde(rename = "class")]
    pub class_name: String,
    pub section: String,
    pub date: String,
    pub status: String,
    pub remarks: Option<String>,
    /// Defaults to `manual` when `None`.
    pub source: Option<String>,
    pub recorded_by: String,
    /// Epoch milliseconds; defaults to now when `None`.
    pub recorded_at: Option<i64>,
}

impl NewAttendanceRecord {
    /// Convenience constructor with the three required fields.
    pub fn new(
        student_id: impl Into<String>,
        date: impl Into<String>,
        status: impl Into<String>,
    ) -> Self {
        Self {
            student_id: student_id.into(),
            date: date.into(),
            status: status.into(),
            ..Self::default()
        }
    }

    /// Validates required fields and produces a storable record.
    ///
    /// # Errors
    /// - `MissingStudentId`, `MissingDate`, `MissingStatus` for blank fields.
    /// - `InvalidDate`, `InvalidStatus`, `InvalidSource` for malformed values.
    pub fn into_record(self) -> Result<AttendanceRecord, AttendanceValidationError> {
        let student_id = self.student_id.trim().to_string();
        if student_id.is_empty() {
            return Err(AttendanceValidationError::MissingStudentId);
        }

        let date = normalize_record_date(&self.date)?;

        if self.status.trim().is_empty() {
            return Err(AttendanceValidationError::MissingStatus);
        }
        let status = AttendanceStatus::parse(&self.status)
            .ok_or_else(|| AttendanceValidationError::InvalidStatus(self.status.clone()))?;

        let source = match self.source.as_deref() {
            None => RecordSource::default(),
            Some(value) if value.trim().is_empty() => RecordSource::default(),
            Some(value) => RecordSource::parse(value)
                .ok_or_else(|| AttendanceValidationError::InvalidSource(value.to_string()))?,
        };

        let record = AttendanceRecord {
            id: self.id.unwrap_or_else(Uuid::new_v4),
            student_id,
            student_name: self.student_name.trim().to_string(),
            class_name: self.class_name.trim().to_string(),
            section: self.section.trim().to_string(),
            date,
            status,
            remarks: self
                .remarks
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty()),
            source,
            recorded_by: self.recorded_by.trim().to_string(),
            recorded_at: self
                .recorded_at
                .unwrap_or_else(|| Utc::now().timestamp_millis()),
        };
        record.validate()?;
        Ok(record)
    }
}

/// Normalizes date input to calendar-day granularity.
///
/// Timestamps keep the calendar day as written in their own offset; the time
/// of day is discarded.
pub fn normalize_record_date(value: &str) -> Result<NaiveDate, AttendanceValidationError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(AttendanceValidationError::MissingDate);
    }

    if let Ok(date) = NaiveDate::parse_from_str(trimmed, "%Y-%m-%d") {
        return Ok(date);
    }
    if let Ok(timestamp) = DateTime::parse_from_rfc3339(trimmed) {
        return Ok(timestamp.date_naive());
    }
    for format in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"] {
        if let Ok(timestamp) = NaiveDateTime::parse_from_str(trimmed, format) {
            return Ok(timestamp.date());
        }
    }

    Err(AttendanceValidationError::InvalidDate(trimmed.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_strips_time_of_day() {
        let day = NaiveDate::from_ymd_opt(2025, 10, 10).unwrap();
        assert_eq!(normalize_record_date("2025-10-10").unwrap(), day);
        assert_eq!(normalize_record_date("2025-10-10T23:59:30").unwrap(), day);
        assert_eq!(normalize_record_date("2025-10-10 07:15:00.250").unwrap(), day);
        assert_eq!(
            normalize_record_date("2025-10-10T08:30:00+05:30").unwrap(),
            day
        );
    }

    #[test]
    fn normalize_rejects_blank_and_garbage() {
        assert_eq!(
            normalize_record_date("  ").unwrap_err(),
            AttendanceValidationError::MissingDate
        );
        assert_eq!(
            normalize_record_date("10/10/2025").unwrap_err(),
            AttendanceValidationError::InvalidDate("10/10/2025".to_string())
        );
    }

    #[test]
    fn late_counts_as_present_but_excused_does_not() {
        assert!(AttendanceStatus::Present.counts_as_present());
        assert!(AttendanceStatus::Late.counts_as_present());
        assert!(!AttendanceStatus::Absent.counts_as_present());
        assert!(!AttendanceStatus::Excused.counts_as_present());
    }

    #[test]
    fn into_record_requires_student_date_and_status() {
        let err = NewAttendanceRecord::new(" ", "2025-10-10", "present")
            .into_record()
            .unwrap_err();
        assert_eq!(err, AttendanceValidationError::MissingStudentId);

        let err = NewAttendanceRecord::new("S1", "", "present")
            .into_record()
            .unwrap_err();
        assert_eq!(err, AttendanceValidationError::MissingDate);

        let err = NewAttendanceRecord::new("S1", "2025-10-10", "")
            .into_record()
            .unwrap_err();
        assert_eq!(err, AttendanceValidationError::MissingStatus);

        let err = NewAttendanceRecord::new("S1", "2025-10-10", "sleeping")
            .into_record()
            .unwrap_err();
        assert_eq!(
            err,
            AttendanceValidationError::InvalidStatus("sleeping".to_string())
        );
    }

    #[test]
    fn into_record_applies_defaults() {
        let mut entry = NewAttendanceRecord::new("S1", "2025-10-10T09:00:00Z", "LATE");
        entry.remarks = Some("   ".to_string());
        let record = entry.into_record().unwrap();

        assert!(!record.id.is_nil());
        assert_eq!(record.status, AttendanceStatus::Late);
        assert_eq!(record.source, RecordSource::Manual);
        assert_eq!(record.remarks, None);
        assert!(record.recorded_at > 0);
    }
}
