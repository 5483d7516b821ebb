//! # nexus-test
//!
//! Integration tests for the NexusDB in-memory engine.
//!
//! This crate contains:
//! - Shared fixtures for the suites under `tests/`
//! - Tracing setup that routes engine logs through the test harness

#![warn(missing_docs)]
#![warn(clippy::all)]

use std::sync::Once;

use nexus_memdb::{Database, DatabaseConfig, ResultRow, Value};

static TRACING: Once = Once::new();

/// Installs a test-writer subscriber once per process. The filter comes
/// from `RUST_LOG`, defaulting to warnings.
pub fn init_tracing() {
    TRACING.call_once(|| {
        let filter = tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn"));
        let _ = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_test_writer()
            .try_init();
    });
}

/// A database with the testing configuration and the given setup script
/// applied.
///
/// # Panics
///
/// Panics if the setup script fails.
pub fn simple_db(setup: &str) -> Database {
    init_tracing();
    let db = Database::with_config(DatabaseConfig::for_testing()).expect("valid test config");
    if !setup.trim().is_empty() {
        db.execute_none(setup).expect("setup script failed");
    }
    db
}

/// Like [`simple_db`], but any query needing a full table scan fails.
/// Used to prove that a query is answered from an index.
///
/// # Panics
///
/// Panics if the setup script fails.
pub fn strict_db(setup: &str) -> Database {
    init_tracing();
    let config = DatabaseConfig::for_testing().with_forbid_seq_scan(true);
    let db = Database::with_config(config).expect("valid test config");
    if !setup.trim().is_empty() {
        db.execute_none(setup).expect("setup script failed");
    }
    db
}

/// Values of one output column, in row order.
///
/// # Panics
///
/// Panics if a row lacks the column.
pub fn values_of(rows: &[ResultRow], column: &str) -> Vec<Value> {
    rows.iter()
        .map(|row| {
            row.get(column)
                .cloned()
                .unwrap_or_else(|| panic!("no column {:?} in {:?}", column, row))
        })
        .collect()
}

/// Runs a query and returns one output column.
///
/// # Panics
///
/// Panics if the query fails.
pub fn query_column(db: &Database, sql: &str, column: &str) -> Vec<Value> {
    let rows = db
        .execute_many(sql)
        .unwrap_or_else(|e| panic!("query {:?} failed: {}", sql, e));
    values_of(&rows, column)
}

/// Integer values, for terse expectations.
pub fn ints(values: &[i64]) -> Vec<Value> {
    values.iter().map(|&v| Value::Int(v)).collect()
}

/// Text values, for terse expectations.
pub fn texts(values: &[&str]) -> Vec<Value> {
    values.iter().map(|&v| Value::Text(v.to_string())).collect()
}

/// Sorts values by their natural order, for order-insensitive checks.
pub fn sorted(mut values: Vec<Value>) -> Vec<Value> {
    values.sort();
    values
}
