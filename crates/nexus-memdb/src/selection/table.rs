//! Table scan, the leaf of every plan that reads stored rows.

use nexus_common::{DatabaseConfig, NexusError};
use tracing::warn;

use super::{IndexRef, RowIter};
use crate::expr::Expression;
use crate::storage::{RowSnapshot, Table, Transaction};

/// What to do when a statement falls back to scanning a whole table.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ScanPolicy {
    /// Log a warning.
    pub warn: bool,
    /// Fail the statement.
    pub forbid: bool,
}

impl ScanPolicy {
    /// Policy taken from the engine configuration.
    pub fn from_config(config: &DatabaseConfig) -> Self {
        Self {
            warn: config.warn_on_seq_scan,
            forbid: config.forbid_seq_scan,
        }
    }
}

/// Reads every row of a table snapshot.
#[derive(Debug)]
pub struct TableScan<'a> {
    table: &'a Table,
    rows: RowSnapshot,
    columns: Vec<Expression>,
    policy: ScanPolicy,
}

impl<'a> TableScan<'a> {
    /// Scan of `table` as seen by `txn`.
    pub fn new(table: &'a Table, txn: &Transaction, policy: ScanPolicy) -> Self {
        let columns = table
            .columns()
            .iter()
            .map(|c| c.expression().clone().with_qualifier(Some(table.name().to_string())))
            .collect();
        Self {
            table,
            rows: table.rows(txn),
            columns,
            policy,
        }
    }

    /// The scanned table.
    pub fn table(&self) -> &'a Table {
        self.table
    }

    pub(super) fn columns(&self) -> &[Expression] {
        &self.columns
    }

    pub(super) fn entropy(&self) -> usize {
        self.rows.len()
    }

    pub(super) fn get_index(&self, expr: &Expression) -> Option<IndexRef<'a>> {
        let table = self.table;
        table.index_for(expr).map(|index| IndexRef { table, index })
    }

    pub(super) fn enumerate(&self) -> RowIter<'_> {
        if self.policy.forbid {
            return Box::new(std::iter::once(Err(NexusError::query(format!(
                "sequential scan of table \"{}\" is forbidden",
                self.table.name()
            )))));
        }
        if self.policy.warn {
            warn!(table = %self.table.name(), rows = self.rows.len(), "sequential scan");
        }
        self.table.record_seq_scan();
        Box::new(self.rows.values().cloned().map(Ok))
    }
}
