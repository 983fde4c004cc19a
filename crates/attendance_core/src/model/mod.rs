//! Attendance domain model.
//!
//! # Responsibility
//! - Define the stored record shape and every derived projection.
//! - Keep derived views (summaries, duplicate groups, alerts) separate from
//!   ground truth.
//!
//! # Invariants
//! - `AttendanceRecord` is the only persisted ground truth.
//! - Summaries, duplicate groups and alerts are recomputable from records.

pub mod alert;
pub mod duplicate;
pub mod record;
pub mod summary;
