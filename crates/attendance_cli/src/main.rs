//! CLI smoke entry point.
//!
//! # Responsibility
//! - Verify `attendance_core` linkage and configuration from the environment.
//! - Open the configured store and print deterministic key=value lines.

use attendance_core::db::{open_db, open_db_in_memory};
use attendance_core::logging::init_from_config;
use attendance_core::{core_version, AttendanceStore, CoreConfig, SqliteAttendanceStore};
use std::process::ExitCode;

fn main() -> ExitCode {
    match run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("attendance_core error={err}");
            ExitCode::FAILURE
        }
    }
}

fn run() -> Result<(), Box<dyn std::error::Error>> {
    let config = CoreConfig::from_env()?;
    let logging_active = init_from_config(&config)?;

    let (mut conn, store_label) = match config.db_path.as_deref() {
        Some(path) => (open_db(path)?, path.display().to_string()),
        None => (open_db_in_memory()?, "memory".to_string()),
    };
    let store = SqliteAttendanceStore::with_policy(&mut conn, config.uniqueness);
    let records = store.count_records()?;

    log::info!("event=cli_probe module=cli status=ok records={records}");
    println!("attendance_core version={}", core_version());
    println!("attendance_core logging={logging_active}");
    println!("attendance_core store={store_label}");
    println!("attendance_core uniqueness={:?}", store.policy());
    println!("attendance_core records={records}");
    Ok(())
}
