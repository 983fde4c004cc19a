//! Core attendance aggregation and audit logic.
//! This crate is the single source of truth for attendance invariants.

pub mod config;
pub mod db;
pub mod logging;
pub mod model;
pub mod repo;
pub mod service;

pub use config::{ConfigError, CoreConfig};
pub use logging::{default_log_level, init_logging, logging_status};
pub use model::alert::{AbsenceAlert, AlertId, AlertState, AlertTier, ESCALATION_THRESHOLD};
pub use model::duplicate::{DuplicateAuditReport, DuplicateGroup, ResolutionPlan};
pub use model::record::{
    AttendanceRecord, AttendanceStatus, AttendanceValidationError, NewAttendanceRecord, RecordId,
    RecordSource,
};
pub use model::summary::AttendanceSummary;
pub use repo::attendance_repo::{
    AttendanceStore, RepoError, RepoResult, SqliteAttendanceStore, UniquenessPolicy,
};
pub use service::attendance_service::{AttendanceService, AuditWindow};
pub use service::notification::{
    Clock, ContactDirectory, DispatchError, DispatchOutcome, GatewayError, NotificationDispatcher,
    NotificationGateway, SystemClock,
};

/// Returns the core crate version.
pub fn core_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
