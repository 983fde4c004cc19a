//! Attendance use-case services.
//!
//! # Responsibility
//! - Pure aggregation, duplicate audit and streak detection over record
//!   snapshots.
//! - Alert delivery tracking and the store-backed use-case facade.
//!
//! # Invariants
//! - Aggregation, audit and detection hold no mutable state.
//! - The store is the only mutable shared resource.

pub mod absence_streak;
pub mod attendance_service;
pub mod duplicate_audit;
pub mod notification;
pub mod summary;
