//! Attendance store contract and SQLite implementation.
//!
//! # Responsibility
//! - Own the arena of attendance rows keyed by record id.
//! - Serve the student and class/section/day slices consumed by the pure
//!   aggregation, audit and streak logic.
//! - Execute duplicate resolution as one atomic batch.
//!
//! # Invariants
//! - Write paths validate input before SQL mutations.
//! - Read paths reject invalid persisted state instead of masking it.
//! - Query results carry no ordering contract; consumers sort explicitly.
//! - With `UniquenessPolicy::Tolerate`, two concurrent appends for the same
//!   `(student_id, date)` both succeed. The duplicate auditor cleans this up.

use crate::db::DbError;
use crate::model::duplicate::ResolutionPlan;
use crate::model::record::{
    AttendanceRecord, AttendanceStatus, AttendanceValidationError, NewAttendanceRecord,
    RecordId, RecordSource,
};
use chrono::NaiveDate;
use log::{info, warn};
use rusqlite::{params, Connection, Row, Transaction, TransactionBehavior};
use serde::{Deserialize, Serialize};
use std::error::Error;
use std::fmt::{Display, Formatter};
use uuid::Uuid;

const RECORD_SELECT_SQL: &str = "SELECT
    id,
    student_id,
    student_name,
    class_name,
    section,
    day,
    status,
    remarks,
    source,
    recorded_by,
    recorded_at
FROM attendance_records";

const RECORD_ORDER_SQL: &str = "ORDER BY day ASC, recorded_at ASC, id ASC";

pub type RepoResult<T> = Result<T, RepoError>;

/// Store-level error taxonomy.
#[derive(Debug)]
pub enum RepoError {
    /// Missing or malformed ingestion field.
    Validation(AttendanceValidationError),
    /// Target record no longer exists.
    NotFound(RecordId),
    /// Same-day key is contended: an append under `UniquenessPolicy::Reject`,
    /// or a resolution whose key gained rows after the audit snapshot.
    Conflict { student_id: String, date: NaiveDate },
    /// Store temporarily unavailable (busy/locked); safe to retry.
    Transient(DbError),
    Db(DbError),
    InvalidData(String),
}

impl RepoError {
    /// Whether a caller may retry the same operation unchanged.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Transient(_))
    }
}

impl Display for RepoError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Validation(err) => write!(f, "{err}"),
            Self::NotFound(id) => write!(f, "attendance record not found: {id}"),
            Self::Conflict { student_id, date } => write!(
                f,
                "attendance already recorded for student `{student_id}` on {date}"
            ),
            Self::Transient(err) => write!(f, "attendance store temporarily unavailable: {err}"),
            Self::Db(err) => write!(f, "{err}"),
            Self::InvalidData(message) => {
                write!(f, "invalid persisted attendance data: {message}")
            }
        }
    }
}

impl Error for RepoError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Validation(err) => Some(err),
            Self::Transient(err) | Self::Db(err) => Some(err),
            Self::NotFound(_) | Self::Conflict { .. } | Self::InvalidData(_) => None,
        }
    }
}

impl From<AttendanceValidationError> for RepoError {
    fn from(value: AttendanceValidationError) -> Self {
        Self::Validation(value)
    }
}

impl From<DbError> for RepoError {
    fn from(value: DbError) -> Self {
        if value.is_busy() {
            Self::Transient(value)
        } else {
            Self::Db(value)
        }
    }
}

impl From<rusqlite::Error> for RepoError {
    fn from(value: rusqlite::Error) -> Self {
        DbError::Sqlite(value).into()
    }
}

/// Ingestion policy for the `(student_id, date)` key.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UniquenessPolicy {
    /// Duplicates are stored and left to the auditor.
    #[default]
    Tolerate,
    /// Appends for an existing key fail with `RepoError::Conflict`.
    Reject,
}

impl UniquenessPolicy {
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "tolerate" => Some(Self::Tolerate),
            "reject" => Some(Self::Reject),
            _ => None,
        }
    }
}

/// Store interface for attendance rows.
pub trait AttendanceStore {
    /// Validates, normalizes and inserts one record.
    fn append(&mut self, entry: NewAttendanceRecord) -> RepoResult<AttendanceRecord>;
    fn get_record(&self, id: RecordId) -> RepoResult<Option<AttendanceRecord>>;
    /// Updates status/remarks of an existing record in place.
    fn update_record(
        &mut self,
        id: RecordId,
        status: AttendanceStatus,
        remarks: Option<&str>,
    ) -> RepoResult<AttendanceRecord>;
    fn query_by_student(&self, student_id: &str) -> RepoResult<Vec<AttendanceRecord>>;
    fn query_by_student_day(
        &self,
        student_id: &str,
        date: NaiveDate,
    ) -> RepoResult<Vec<AttendanceRecord>>;
    /// Class/section slice, optionally narrowed to one day.
    fn query_by_class_section(
        &self,
        class_name: &str,
        section: &str,
        date: Option<NaiveDate>,
    ) -> RepoResult<Vec<AttendanceRecord>>;
    /// Class/section slice over an inclusive day range.
    fn query_by_class_section_between(
        &self,
        class_name: &str,
        section: &str,
        from: NaiveDate,
        to: NaiveDate,
    ) -> RepoResult<Vec<AttendanceRecord>>;
    /// Deletes every planned duplicate in one transaction.
    ///
    /// Either all deletions apply or none do. A plan whose key still holds
    /// rows other than its keeper after deletion is stale and fails with
    /// `RepoError::Conflict`.
    fn apply_resolutions(&mut self, plans: &[ResolutionPlan]) -> RepoResult<usize>;
    fn count_records(&self) -> RepoResult<u64>;
}

/// SQLite-backed attendance store.
pub struct SqliteAttendanceStore<'conn> {
    conn: &'conn mut Connection,
    policy: UniquenessPolicy,
}

impl<'conn> SqliteAttendanceStore<'conn> {
    /// Creates a store that tolerates same-day duplicates.
    pub fn new(conn: &'conn mut Connection) -> Self {
        Self::with_policy(conn, UniquenessPolicy::default())
    }

    pub fn with_policy(conn: &'conn mut Connection, policy: UniquenessPolicy) -> Self {
        Self { conn, policy }
    }

    pub fn policy(&self) -> UniquenessPolicy {
        self.policy
    }

    fn query_records(
        &self,
        filter: &str,
        bind: &[&dyn rusqlite::ToSql],
    ) -> RepoResult<Vec<AttendanceRecord>> {
        let mut stmt = self.conn.prepare(&format!(
            "{RECORD_SELECT_SQL} WHERE {filter} {RECORD_ORDER_SQL};"
        ))?;
        let mut rows = stmt.query(bind)?;
        let mut records = Vec::new();
        while let Some(row) = rows.next()? {
            records.push(parse_record_row(row)?);
        }
        Ok(records)
    }
}

impl AttendanceStore for SqliteAttendanceStore<'_> {
    fn append(&mut self, entry: NewAttendanceRecord) -> RepoResult<AttendanceRecord> {
        let record = entry.into_record()?;

        let tx = self
            .conn
            .transaction_with_behavior(TransactionBehavior::Immediate)?;
        if self.policy == UniquenessPolicy::Reject
            && day_key_exists_in_tx(&tx, &record.student_id, record.date)?
        {
            warn!(
                "event=attendance_append module=repo status=error error_code=duplicate_day_key day={}",
                record.date
            );
            return Err(RepoError::Conflict {
                student_id: record.student_id,
                date: record.date,
            });
        }

        tx.execute(
            "INSERT INTO attendance_records (
                id,
                student_id,
                student_name,
                class_name,
                section,
                day,
                status,
                remarks,
                source,
                recorded_by,
                recorded_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11);",
            params![
                record.id.to_string(),
                record.student_id.as_str(),
                record.student_name.as_str(),
                record.class_name.as_str(),
                record.section.as_str(),
                record.date,
                record.status.as_str(),
                record.remarks.as_deref(),
                record.source.as_str(),
                record.recorded_by.as_str(),
                record.recorded_at,
            ],
        )?;
        tx.commit()?;

        info!(
            "event=attendance_append module=repo status=ok record_id={} day={} source={}",
            record.id,
            record.date,
            record.source.as_str()
        );
        Ok(record)
    }

    fn get_record(&self, id: RecordId) -> RepoResult<Option<AttendanceRecord>> {
        let mut stmt = self
            .conn
            .prepare(&format!("{RECORD_SELECT_SQL} WHERE id = ?1;"))?;
        let mut rows = stmt.query([id.to_string()])?;
        if let Some(row) = rows.next()? {
            return Ok(Some(parse_record_row(row)?));
        }
        Ok(None)
    }

    fn update_record(
        &mut self,
        id: RecordId,
        status: AttendanceStatus,
        remarks: Option<&str>,
    ) -> RepoResult<AttendanceRecord> {
        let remarks = remarks.map(str::trim).filter(|value| !value.is_empty());
        let changed = self.conn.execute(
            "UPDATE attendance_records
             SET
                status = ?2,
                remarks = ?3,
                updated_at = (strftime('%s', 'now') * 1000)
             WHERE id = ?1;",
            params![id.to_string(), status.as_str(), remarks],
        )?;

        if changed == 0 {
            return Err(RepoError::NotFound(id));
        }

        info!(
            "event=attendance_update module=repo status=ok record_id={id} new_status={}",
            status.as_str()
        );
        self.get_record(id)?.ok_or(RepoError::NotFound(id))
    }

    fn query_by_student(&self, student_id: &str) -> RepoResult<Vec<AttendanceRecord>> {
        self.query_records("student_id = ?1", params![student_id.trim()])
    }

    fn query_by_student_day(
        &self,
        student_id: &str,
        date: NaiveDate,
    ) -> RepoResult<Vec<AttendanceRecord>> {
        self.query_records("student_id = ?1 AND day = ?2", params![student_id.trim(), date])
    }

    fn query_by_class_section(
        &self,
        class_name: &str,
        section: &str,
        date: Option<NaiveDate>,
    ) -> RepoResult<Vec<AttendanceRecord>> {
        match date {
            Some(day) => self.query_records(
                "class_name = ?1 AND section = ?2 AND day = ?3",
                params![class_name.trim(), section.trim(), day],
            ),
            None => self.query_records(
                "class_name = ?1 AND section = ?2",
                params![class_name.trim(), section.trim()],
            ),
        }
    }

    fn query_by_class_section_between(
        &self,
        class_name: &str,
        section: &str,
        from: NaiveDate,
        to: NaiveDate,
    ) -> RepoResult<Vec<AttendanceRecord>> {
        let (from, to) = if from <= to { (from, to) } else { (to, from) };
        self.query_records(
            "class_name = ?1 AND section = ?2 AND day BETWEEN ?3 AND ?4",
            params![class_name.trim(), section.trim(), from, to],
        )
    }

    fn apply_resolutions(&mut self, plans: &[ResolutionPlan]) -> RepoResult<usize> {
        let tx = self
            .conn
            .transaction_with_behavior(TransactionBehavior::Immediate)?;
        let mut deleted = 0usize;

        for plan in plans {
            if plan.delete.contains(&plan.keep) {
                return Err(RepoError::InvalidData(format!(
                    "resolution plan for day {} deletes its own keeper {}",
                    plan.date, plan.keep
                )));
            }
            if !record_matches_key_in_tx(&tx, plan.keep, &plan.student_id, plan.date)? {
                return Err(RepoError::NotFound(plan.keep));
            }

            for id in &plan.delete {
                let changed = tx.execute(
                    "DELETE FROM attendance_records
                     WHERE id = ?1
                       AND student_id = ?2
                       AND day = ?3;",
                    params![id.to_string(), plan.student_id.as_str(), plan.date],
                )?;
                if changed == 0 {
                    // Dropping `tx` rolls back deletions already applied in this batch.
                    warn!(
                        "event=duplicate_resolve module=repo status=error error_code=record_missing record_id={id}"
                    );
                    return Err(RepoError::NotFound(*id));
                }
                deleted += changed;
            }

            let remaining = day_key_count_in_tx(&tx, &plan.student_id, plan.date)?;
            if remaining != 1 {
                warn!(
                    "event=duplicate_resolve module=repo status=error error_code=stale_plan remaining={remaining} keep={}",
                    plan.keep
                );
                return Err(RepoError::Conflict {
                    student_id: plan.student_id.clone(),
                    date: plan.date,
                });
            }
        }

        tx.commit()?;
        info!(
            "event=duplicate_resolve module=repo status=ok groups={} deleted={deleted}",
            plans.len()
        );
        Ok(deleted)
    }

    fn count_records(&self) -> RepoResult<u64> {
        let count: i64 =
            self.conn
                .query_row("SELECT COUNT(*) FROM attendance_records;", [], |row| {
                    row.get(0)
                })?;
        u64::try_from(count)
            .map_err(|_| RepoError::InvalidData(format!("negative record count `{count}`")))
    }
}

fn day_key_exists_in_tx(
    tx: &Transaction<'_>,
    student_id: &str,
    date: NaiveDate,
) -> RepoResult<bool> {
    let exists: i64 = tx.query_row(
        "SELECT EXISTS(
            SELECT 1
            FROM attendance_records
            WHERE student_id = ?1
              AND day = ?2
        );",
        params![student_id, date],
        |row| row.get(0),
    )?;
    Ok(exists == 1)
}

fn day_key_count_in_tx(
    tx: &Transaction<'_>,
    student_id: &str,
    date: NaiveDate,
) -> RepoResult<i64> {
    let count: i64 = tx.query_row(
        "SELECT COUNT(*)
         FROM attendance_records
         WHERE student_id = ?1
           AND day = ?2;",
        params![student_id, date],
        |row| row.get(0),
    )?;
    Ok(count)
}

fn record_matches_key_in_tx(
    tx: &Transaction<'_>,
    id: RecordId,
    student_id: &str,
    date: NaiveDate,
) -> RepoResult<bool> {
    let exists: i64 = tx.query_row(
        "SELECT EXISTS(
            SELECT 1
            FROM attendance_records
            WHERE id = ?1
              AND student_id = ?2
              AND day = ?3
        );",
        params![id.to_string(), student_id, date],
        |row| row.get(0),
    )?;
    Ok(exists == 1)
}

fn parse_record_row(row: &Row<'_>) -> RepoResult<AttendanceRecord> {
    let id_text: String = row.get("id")?;
    let id = Uuid::parse_str(&id_text).map_err(|_| {
        RepoError::InvalidData(format!("invalid uuid value `{id_text}` in attendance_records.id"))
    })?;

    let day_text: String = row.get("day")?;
    let date = NaiveDate::parse_from_str(&day_text, "%Y-%m-%d").map_err(|_| {
        RepoError::InvalidData(format!("invalid day `{day_text}` in attendance_records.day"))
    })?;

    let status_text: String = row.get("status")?;
    let status = AttendanceStatus::parse(&status_text).ok_or_else(|| {
        RepoError::InvalidData(format!(
            "invalid status `{status_text}` in attendance_records.status"
        ))
    })?;

    let source_text: String = row.get("source")?;
    let source = RecordSource::parse(&source_text).ok_or_else(|| {
        RepoError::InvalidData(format!(
            "invalid source `{source_text}` in attendance_records.source"
        ))
    })?;

    let record = AttendanceRecord {
        id,
        student_id: row.get("student_id")?,
        student_name: row.get("student_name")?,
        class_name: row.get("class_name")?,
        section: row.get("section")?,
        date,
        status,
        remarks: row.get("remarks")?,
        source,
        recorded_by: row.get("recorded_by")?,
        recorded_at: row.get("recorded_at")?,
    };
    record.validate()?;
    Ok(record)
}
