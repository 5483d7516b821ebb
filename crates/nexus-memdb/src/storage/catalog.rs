//! Table catalog.

use std::collections::HashMap;

use nexus_common::{NexusError, NexusResult};
use serde::Serialize;
use tracing::info;

use super::index::{IndexColumn, IndexInfo};
use super::schema::{ColumnDefault, TableSchema};
use super::table::{Column, ColumnInfo, IndexSpec, Table, TableStats};
use super::transaction::Transaction;
use super::TableId;
use crate::expr::Expression;
use crate::parser::TableConstraint;
use crate::predicate::{build_value, NoColumns};

/// Public description of a table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TableInfo {
    /// Table identity.
    pub id: TableId,
    /// Table name.
    pub name: String,
    /// Columns in declaration order.
    pub columns: Vec<ColumnInfo>,
    /// Indexes in creation order.
    pub indexes: Vec<IndexInfo>,
    /// Protected from mutation.
    pub read_only: bool,
    /// Rows currently stored.
    pub row_count: usize,
    /// Scan counters.
    pub stats: TableStats,
}

/// All tables, addressable by lowercased name or by identity.
#[derive(Debug, Default)]
pub struct Catalog {
    tables: HashMap<TableId, Table>,
    by_name: HashMap<String, TableId>,
    next_id: u64,
}

impl Catalog {
    /// Creates an empty catalog.
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether a table with that name exists.
    pub fn contains(&self, name: &str) -> bool {
        self.by_name.contains_key(&name.to_lowercase())
    }

    /// Looks a table up by name.
    pub fn table(&self, name: &str) -> NexusResult<&Table> {
        self.by_name
            .get(&name.to_lowercase())
            .and_then(|id| self.tables.get(id))
            .ok_or_else(|| NexusError::TableNotFound {
                table: name.to_string(),
            })
    }

    /// Looks a table up by name, for mutation.
    pub fn table_mut(&mut self, name: &str) -> NexusResult<&mut Table> {
        let id = self
            .by_name
            .get(&name.to_lowercase())
            .copied()
            .ok_or_else(|| NexusError::TableNotFound {
                table: name.to_string(),
            })?;
        self.tables
            .get_mut(&id)
            .ok_or_else(|| NexusError::internal(format!("table {} missing from catalog", id)))
    }

    /// Looks a table up by identity.
    pub fn table_by_id(&self, id: TableId) -> Option<&Table> {
        self.tables.get(&id)
    }

    /// Tables ordered by identity.
    pub fn tables(&self) -> Vec<&Table> {
        let mut tables: Vec<&Table> = self.tables.values().collect();
        tables.sort_by_key(|t| t.id());
        tables
    }

    /// Describes a table.
    pub fn info(&self, table: &Table, txn: &Transaction) -> TableInfo {
        TableInfo {
            id: table.id(),
            name: table.name().to_string(),
            columns: table.column_info(),
            indexes: table.list_indexes(),
            read_only: table.is_read_only(),
            row_count: table.row_count(txn),
            stats: table.stats(),
        }
    }

    /// Creates a table with its column and table constraints. The catalog
    /// is unchanged if any part of the definition is invalid.
    pub fn create_table(&mut self, schema: &TableSchema, txn: &Transaction) -> NexusResult<TableId> {
        if self.contains(&schema.name) {
            return Err(NexusError::TableExists {
                table: schema.name.clone(),
            });
        }
        let id = TableId(self.next_id + 1);

        let mut columns = Vec::with_capacity(schema.fields.len());
        for (i, field) in schema.fields.iter().enumerate() {
            let mut column = Column::new(id, i, &field.name, field.data_type.clone());
            column.set_not_null(field.not_null || field.primary_key);
            column.set_serial(field.serial);
            let default = match &field.default {
                None => None,
                Some(ColumnDefault::Value(v)) => Some(Expression::constant(v.clone())),
                Some(ColumnDefault::Expr(expr)) => Some(build_value(&NoColumns, expr)?),
            };
            let default = default
                .map(|d| d.convert(&field.data_type))
                .transpose()?;
            column.set_default(default);
            columns.push(column);
        }
        let mut table = Table::new(id, &schema.name, columns)?;

        let mut specs = Vec::new();
        for field in &schema.fields {
            if field.primary_key || field.unique {
                specs.push((None, vec![field.name.clone()], field.primary_key));
            }
        }
        for constraint in &schema.constraints {
            match constraint {
                TableConstraint::PrimaryKey { name, columns } => {
                    specs.push((name.clone(), columns.clone(), true))
                }
                TableConstraint::Unique { name, columns } => {
                    specs.push((name.clone(), columns.clone(), false))
                }
            }
        }
        for (name, columns, primary) in specs {
            let columns = columns
                .iter()
                .map(|c| Ok(IndexColumn::asc(table.column(c)?.expression().clone())))
                .collect::<NexusResult<Vec<_>>>()?;
            table.create_index(
                txn,
                IndexSpec {
                    name,
                    columns,
                    unique: true,
                    primary,
                },
            )?;
        }

        self.next_id += 1;
        self.by_name.insert(schema.name.to_lowercase(), id);
        self.tables.insert(id, table);
        info!(table = %schema.name, id = id.0, columns = schema.fields.len(), "created table");
        Ok(id)
    }

    /// Renames a table.
    pub fn rename(&mut self, from: &str, to: &str) -> NexusResult<()> {
        if self.contains(to) {
            return Err(NexusError::TableExists {
                table: to.to_string(),
            });
        }
        let id = self
            .by_name
            .remove(&from.to_lowercase())
            .ok_or_else(|| NexusError::TableNotFound {
                table: from.to_string(),
            })?;
        if let Some(table) = self.tables.get_mut(&id) {
            table.rename(to);
        }
        self.by_name.insert(to.to_lowercase(), id);
        Ok(())
    }
}
