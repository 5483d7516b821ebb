//! Selection algebra.
//!
//! A [`Selection`] is a node of the logical plan. Each node exposes its
//! output columns as expressions over its own rows, resolves column names,
//! can hand out an index of the table underneath it, and enumerates its
//! rows lazily. Enumerating twice starts over from the base data.
//!
//! Nodes borrow tables from the catalog for `'a`; the executor builds and
//! drains a plan while it holds the engine state.

mod alias;
mod filter;
mod group_by;
mod join;
mod limit;
mod order_by;
mod projection;
mod table;

use std::sync::Arc;

use nexus_common::{NexusError, NexusResult};

pub use alias::Alias;
pub use filter::{Filter, FilterPlan, IndexLookup, LookupOp};
pub use group_by::{AggregateCall, GroupBy, GroupScope};
pub use join::{Join, JoinStrategy};
pub use limit::Limit;
pub use order_by::{OrderBy, SortKey};
pub use projection::{build_items, output_columns, Projection, ProjectionItem};
pub use table::{ScanPolicy, TableScan};

use crate::expr::Expression;
use crate::predicate::ColumnScope;
use crate::row::Row;
use crate::storage::{BIndex, Table};

/// Lazily produced rows.
pub type RowIter<'s> = Box<dyn Iterator<Item = NexusResult<Arc<Row>>> + 's>;

/// An index reachable from a selection, with the table that owns it.
#[derive(Debug, Clone, Copy)]
pub struct IndexRef<'a> {
    /// Owning table.
    pub table: &'a Table,
    /// The index.
    pub index: &'a BIndex,
}

/// A node of the logical plan.
#[derive(Debug)]
pub enum Selection<'a> {
    /// One row with no columns, for `SELECT` without `FROM`.
    Unit,
    /// Full scan of a table snapshot.
    Table(TableScan<'a>),
    /// Rows already materialized, such as the output of `RETURNING`.
    Rows {
        /// Output columns.
        columns: Vec<Expression>,
        /// The rows.
        rows: Vec<Arc<Row>>,
    },
    /// Requalified columns.
    Alias(Box<Alias<'a>>),
    /// `WHERE` and `HAVING`.
    Filter(Box<Filter<'a>>),
    /// Select list.
    Projection(Box<Projection<'a>>),
    /// Two-way join.
    Join(Box<Join<'a>>),
    /// Grouping and aggregation.
    GroupBy(Box<GroupBy<'a>>),
    /// Sorting.
    OrderBy(Box<OrderBy<'a>>),
    /// `LIMIT` / `OFFSET`.
    Limit(Box<Limit<'a>>),
}

impl<'a> Selection<'a> {
    /// Output columns.
    pub fn columns(&self) -> &[Expression] {
        match self {
            Selection::Unit => &[],
            Selection::Table(t) => t.columns(),
            Selection::Rows { columns, .. } => columns,
            Selection::Alias(a) => a.columns(),
            Selection::Filter(f) => f.columns(),
            Selection::Projection(p) => p.columns(),
            Selection::Join(j) => j.columns(),
            Selection::GroupBy(g) => g.columns(),
            Selection::OrderBy(o) => o.columns(),
            Selection::Limit(l) => l.columns(),
        }
    }

    /// Enumerates the rows.
    pub fn enumerate(&self) -> RowIter<'_> {
        match self {
            Selection::Unit => Box::new(std::iter::once(Ok(Arc::new(Row::empty())))),
            Selection::Table(t) => t.enumerate(),
            Selection::Rows { rows, .. } => Box::new(rows.iter().cloned().map(Ok)),
            Selection::Alias(a) => a.enumerate(),
            Selection::Filter(f) => f.enumerate(),
            Selection::Projection(p) => p.enumerate(),
            Selection::Join(j) => j.enumerate(),
            Selection::GroupBy(g) => g.enumerate(),
            Selection::OrderBy(o) => o.enumerate(),
            Selection::Limit(l) => l.enumerate(),
        }
    }

    /// Finds an index whose leading expression computes `expr` over this
    /// selection's rows.
    pub fn get_index(&self, expr: &Expression) -> Option<IndexRef<'a>> {
        match self {
            Selection::Table(t) => t.get_index(expr),
            Selection::Alias(a) => a.base().get_index(expr),
            _ => None,
        }
    }

    /// Rough number of rows, used to order joins.
    pub fn entropy(&self) -> usize {
        match self {
            Selection::Unit => 1,
            Selection::Table(t) => t.entropy(),
            Selection::Rows { rows, .. } => rows.len(),
            Selection::Alias(a) => a.base().entropy(),
            Selection::Filter(f) => f.entropy(),
            Selection::Projection(p) => p.base().entropy(),
            Selection::Join(j) => j.entropy(),
            Selection::GroupBy(g) => g.base().entropy(),
            Selection::OrderBy(o) => o.base().entropy(),
            Selection::Limit(l) => l.entropy(),
        }
    }

    /// Resolves a possibly qualified column name.
    pub fn get_column(&self, table: Option<&str>, name: &str) -> NexusResult<Expression> {
        find_column(self.columns(), table, name)
    }

    /// Wraps this selection under an alias.
    pub fn alias(self, name: impl Into<String>) -> Selection<'a> {
        Selection::Alias(Box::new(Alias::new(self, name)))
    }
}

impl ColumnScope for Selection<'_> {
    fn resolve_column(&self, table: Option<&str>, name: &str) -> NexusResult<Expression> {
        self.get_column(table, name)
    }
}

/// A bare list of columns as a scope, used to bind join conditions
/// before the join exists and `ORDER BY` against select-list outputs.
#[derive(Debug)]
pub struct ColumnList<'c>(pub &'c [Expression]);

impl ColumnScope for ColumnList<'_> {
    fn resolve_column(&self, table: Option<&str>, name: &str) -> NexusResult<Expression> {
        find_column(self.0, table, name)
    }
}

/// Finds a column by name, optionally restricted to a qualifier.
/// Names compare case-insensitively; more than one match is an error.
pub fn find_column(columns: &[Expression], table: Option<&str>, name: &str) -> NexusResult<Expression> {
    let mut found = columns.iter().filter(|c| {
        c.id().map_or(false, |id| id.eq_ignore_ascii_case(name))
            && table.map_or(true, |t| {
                c.qualifier().map_or(false, |q| q.eq_ignore_ascii_case(t))
            })
    });
    let display = match table {
        Some(t) => format!("{}.{}", t, name),
        None => name.to_string(),
    };
    match (found.next(), found.next()) {
        (Some(column), None) => Ok(column.clone()),
        (Some(_), Some(_)) => Err(NexusError::query(format!(
            "column reference \"{}\" is ambiguous",
            display
        ))),
        (None, _) => Err(NexusError::ColumnNotFound { column: display }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::DataType;

    fn columns() -> Vec<Expression> {
        vec![
            Expression::column(0, DataType::Int, "id", 1).with_qualifier(Some("a".into())),
            Expression::column(1, DataType::Int, "id", 2).with_qualifier(Some("b".into())),
            Expression::column(2, DataType::text(), "Name", 3).with_qualifier(Some("b".into())),
        ]
    }

    #[test]
    fn test_find_column() {
        let cols = columns();
        assert_eq!(find_column(&cols, None, "name").unwrap().column_index(), Some(2));
        assert_eq!(find_column(&cols, Some("B"), "id").unwrap().column_index(), Some(1));

        let err = find_column(&cols, None, "id").unwrap_err();
        assert!(err.to_string().contains("ambiguous"));

        let err = find_column(&cols, Some("c"), "id").unwrap_err();
        assert!(matches!(err, NexusError::ColumnNotFound { .. }));
    }

    #[test]
    fn test_unit_yields_one_empty_row() {
        let unit = Selection::Unit;
        let rows: Vec<_> = unit.enumerate().collect::<NexusResult<_>>().unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].num_columns(), 0);
        assert!(unit.columns().is_empty());
    }
}
