//! Repository layer abstractions and persistence implementations.
//!
//! # Responsibility
//! - Define the attendance store contract consumed by services.
//! - Isolate SQLite query details from aggregation and audit logic.
//!
//! # Invariants
//! - Store writes validate ingestion input before persistence.
//! - Store APIs return semantic errors (`NotFound`, `Conflict`, `Transient`)
//!   in addition to DB transport errors.

pub mod attendance_repo;
