//! Absence/late alert model and delivery state machine.
//!
//! # Invariants
//! - `AlertId` is derived from `(student_id, date)`, so recomputing alerts from
//!   the same records yields the same ids.
//! - `notified == true` implies `notified_at.is_some()`.
//! - State transitions: `Unsent -> Notified` or `Unsent -> Dismissed`. Both
//!   targets are terminal.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Stable alert identifier.
pub type AlertId = Uuid;

/// Minimum consecutive absences for the escalated tier.
pub const ESCALATION_THRESHOLD: u32 = 3;

/// Message tier for a detected alert.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertTier {
    AbsentToday,
    ConsecutiveAbsence,
    LateToday,
}

impl AlertTier {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::AbsentToday => "absent_today",
            Self::ConsecutiveAbsence => "consecutive_absence",
            Self::LateToday => "late_today",
        }
    }
}

/// Delivery lifecycle of one tracked alert.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertState {
    Unsent,
    Notified,
    Dismissed,
}

/// Ephemeral alert derived from a student's most recent records.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AbsenceAlert {
    pub id: AlertId,
    pub student_id: String,
    pub student_name: String,
    /// Date of the most recent record that triggered the alert.
    pub date: NaiveDate,
    pub consecutive_days: u32,
    pub tier: AlertTier,
    pub notified: bool,
    /// Epoch milliseconds of first successful delivery.
    pub notified_at: Option<i64>,
}

impl AbsenceAlert {
    pub fn new(
        student_id: impl Into<String>,
        student_name: impl Into<String>,
        date: NaiveDate,
        consecutive_days: u32,
        tier: AlertTier,
    ) -> Self {
        let student_id = student_id.into();
        Self {
            id: alert_id_for(&student_id, date),
            student_id,
            student_name: student_name.into(),
            date,
            consecutive_days: consecutive_days.max(1),
            tier,
            notified: false,
            notified_at: None,
        }
    }

    /// Parent-facing message text for this alert.
    pub fn message(&self) -> String {
        let name = if self.student_name.is_empty() {
            self.student_id.as_str()
        } else {
            self.student_name.as_str()
        };
        match self.tier {
            AlertTier::AbsentToday => {
                format!("{name} was marked absent today ({}).", self.date)
            }
            AlertTier::ConsecutiveAbsence => format!(
                "{name} has been absent for {} consecutive school days (latest {}).",
                self.consecutive_days, self.date
            ),
            AlertTier::LateToday => format!("{name} was marked late today ({}).", self.date),
        }
    }
}

/// Derives the deterministic alert id for a `(student_id, date)` key.
pub fn alert_id_for(student_id: &str, date: NaiveDate) -> AlertId {
    let key = format!("attendance-alert|{student_id}|{date}");
    Uuid::new_v5(&Uuid::NAMESPACE_OID, key.as_bytes())
}
