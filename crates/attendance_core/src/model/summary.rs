//! Derived per-student presence summary.

use serde::{Deserialize, Serialize};

/// Present/total/percentage tuple for one student.
///
/// Never stored; always recomputed from records.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttendanceSummary {
    pub student_id: String,
    /// Records whose status is `present` or `late`.
    pub present: u32,
    /// All records for the student.
    pub total: u32,
    /// `round(present / total * 100)`, or `0` when `total == 0`.
    pub percentage: u32,
}

impl AttendanceSummary {
    /// Builds a summary from raw counts.
    pub fn from_counts(student_id: impl Into<String>, present: u32, total: u32) -> Self {
        Self {
            student_id: student_id.into(),
            present,
            total,
            percentage: rounded_percentage(present, total),
        }
    }
}

/// Half-up integer rounding of `present / total * 100`.
pub fn rounded_percentage(present: u32, total: u32) -> u32 {
    if total == 0 {
        return 0;
    }
    let present = u64::from(present);
    let total = u64::from(total);
    ((present * 200 + total) / (2 * total)) as u32
}

#[cfg(test)]
mod tests {
    use super::rounded_percentage;

    #[test]
    fn rounding_is_half_up() {
        assert_eq!(rounded_percentage(0, 0), 0);
        assert_eq!(rounded_percentage(1, 4), 25);
        assert_eq!(rounded_percentage(1, 3), 33);
        assert_eq!(rounded_percentage(2, 3), 67);
        assert_eq!(rounded_percentage(1, 8), 13);
        assert_eq!(rounded_percentage(5, 5), 100);
    }
}
