//! Table storage: persistent row snapshots, B-tree indexes, tables and
//! the catalog.

pub mod catalog;
pub mod index;
pub mod persistent;
pub mod schema;
pub mod table;
pub mod transaction;

use std::fmt;

use serde::{Deserialize, Serialize};

pub use catalog::{Catalog, TableInfo};
pub use index::{BIndex, IndexColumn, IndexInfo};
pub use persistent::PersistentMap;
pub use schema::{ColumnDefault, SchemaField, TableSchema};
pub use table::{Column, ColumnInfo, IndexSpec, Table, TableStats};
pub use transaction::{RowSnapshot, Transaction};

/// Identity of a table, stable across renames.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TableId(pub u64);

impl fmt::Display for TableId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "t{}", self.0)
    }
}
