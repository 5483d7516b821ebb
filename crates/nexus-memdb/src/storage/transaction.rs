//! Transaction scope.
//!
//! A [`Transaction`] maps each table to the current version of its row
//! set. Versions are [`PersistentMap`]s, so forking a transaction or
//! holding on to an older row set is a pointer copy; writers publish a new
//! version with [`Transaction::set`] once a mutation has fully succeeded.

use std::collections::HashMap;
use std::sync::Arc;

use super::persistent::PersistentMap;
use super::TableId;
use crate::row::{Row, RowId};

/// Row set of one table at one point in time.
pub type RowSnapshot = PersistentMap<RowId, Arc<Row>>;

/// Table row sets visible to a session.
#[derive(Debug, Clone, Default)]
pub struct Transaction {
    snapshots: HashMap<TableId, RowSnapshot>,
}

impl Transaction {
    /// Creates an empty transaction scope.
    pub fn new() -> Self {
        Self::default()
    }

    /// Current row set of a table (empty if it was never written).
    pub fn get(&self, table: TableId) -> RowSnapshot {
        self.snapshots.get(&table).cloned().unwrap_or_default()
    }

    /// Publishes a new row set for a table.
    pub fn set(&mut self, table: TableId, rows: RowSnapshot) {
        self.snapshots.insert(table, rows);
    }

    /// Forgets a table.
    pub fn drop_table(&mut self, table: TableId) {
        self.snapshots.remove(&table);
    }

    /// An independent scope starting from the current versions.
    pub fn fork(&self) -> Transaction {
        self.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Value;

    #[test]
    fn test_fork_is_isolated() {
        let table = TableId(1);
        let mut txn = Transaction::new();
        assert!(txn.get(table).is_empty());

        let row = Arc::new(Row::stored(RowId(1), vec![Value::Int(1)]));
        txn.set(table, txn.get(table).insert(RowId(1), row));

        let forked = txn.fork();
        let row = Arc::new(Row::stored(RowId(2), vec![Value::Int(2)]));
        txn.set(table, txn.get(table).insert(RowId(2), row));

        assert_eq!(txn.get(table).len(), 2);
        assert_eq!(forked.get(table).len(), 1);
    }
}
