//! # nexus-memdb
//!
//! An embeddable, in-process SQL engine that emulates PostgreSQL semantics
//! over in-memory tables.
//!
//! This crate provides:
//!
//! - **Types**: SQL data types, values and conversions
//! - **Expressions**: Typed expression trees with three-valued logic
//! - **Parser**: SQL text to statement AST, memoized by an LRU parse cache
//! - **Selections**: Filter, projection, join, grouping, ordering and limits,
//!   with index-driven filtering
//! - **Storage**: Tables over persistent maps, B-tree indexes, constraints
//!   and serial columns
//!
//! ## Example
//!
//! ```rust
//! use nexus_memdb::{Database, Value};
//!
//! let db = Database::new();
//! db.execute_none(
//!     "CREATE TABLE users (id serial PRIMARY KEY, name text NOT NULL);
//!      INSERT INTO users (name) VALUES ('alice'), ('bob');",
//! )
//! .unwrap();
//!
//! let rows = db
//!     .execute_many("SELECT name FROM users WHERE id BETWEEN 1 AND 2 ORDER BY name DESC")
//!     .unwrap();
//! assert_eq!(rows[0]["name"], Value::Text("bob".into()));
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

/// SQL data types and values.
pub mod types;

/// Stored and result rows.
pub mod row;

/// Typed expression trees.
pub mod expr;

/// SQL parsing and the parse cache.
pub mod parser;

/// Binding parsed expressions against column scopes.
pub mod predicate;

/// Tables, indexes and the catalog.
pub mod storage;

/// The selection algebra queries are planned into.
pub mod selection;

mod database;
mod executor;

pub use database::{Database, DatabaseStats, IndexOptions};
pub use row::{ResultRow, Row};
pub use storage::{
    ColumnDefault, ColumnInfo, IndexInfo, SchemaField, TableId, TableInfo, TableSchema, TableStats,
};
pub use types::{DataType, Value};

pub use nexus_common::{DatabaseConfig, ErrorCode, ErrorKind, NexusError, NexusResult};
