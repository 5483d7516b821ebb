//! Statement execution.
//!
//! The executor runs one parsed statement against the engine state:
//! `SELECT` is planned into a selection tree and drained into result rows,
//! DDL goes through the catalog, and `INSERT` coerces its literal values
//! to the column types before touching the table.

mod select;

use std::collections::HashSet;

use nexus_common::{DatabaseConfig, NexusError, NexusResult, UNNAMED_COLUMN_PREFIX};
use tracing::debug;

pub(crate) use select::QueryContext;

use crate::expr::Expression;
use crate::parser::{
    ColumnConstraint, CreateIndexStatement, CreateTableStatement, InsertStatement, Statement,
    TableRef,
};
use crate::predicate::{build_value, NoColumns};
use crate::row::ResultRow;
use crate::selection::{build_items, ColumnList, Projection, Selection};
use crate::storage::{
    Catalog, ColumnDefault, IndexColumn, IndexSpec, SchemaField, TableSchema, Transaction,
};
use crate::types::{DataType, Value};

/// Everything statements read and write.
#[derive(Debug, Default)]
pub(crate) struct EngineState {
    pub catalog: Catalog,
    pub txn: Transaction,
}

/// Runs statements against an [`EngineState`].
pub(crate) struct Executor<'e> {
    state: &'e mut EngineState,
    config: &'e DatabaseConfig,
}

impl<'e> Executor<'e> {
    pub fn new(state: &'e mut EngineState, config: &'e DatabaseConfig) -> Self {
        Self { state, config }
    }

    /// Executes one statement and returns its result rows.
    pub fn execute(&mut self, stmt: &Statement) -> NexusResult<Vec<ResultRow>> {
        debug!(statement = statement_kind(stmt), "executing statement");
        match stmt {
            // single-writer engine: every statement applies immediately
            Statement::StartTransaction | Statement::Commit => Ok(Vec::new()),
            Statement::Rollback => Err(NexusError::query("Transaction rollback not supported")),
            Statement::Select(select) => {
                let ctx = QueryContext {
                    catalog: &self.state.catalog,
                    txn: &self.state.txn,
                    config: self.config,
                };
                let selection = ctx.select(select)?;
                materialize(&selection)
            }
            Statement::Insert(insert) => self.insert(insert),
            Statement::CreateTable(create) => self.create_table(create),
            Statement::CreateIndex(create) => self.create_index(create),
        }
    }

    fn table_name<'t>(&self, table: &'t TableRef) -> NexusResult<&'t str> {
        match &table.schema {
            Some(schema) if !schema.eq_ignore_ascii_case(&self.config.default_schema) => {
                Err(NexusError::TableNotFound {
                    table: format!("{}.{}", schema, table.table),
                })
            }
            _ => Ok(&table.table),
        }
    }

    fn insert(&mut self, stmt: &InsertStatement) -> NexusResult<Vec<ResultRow>> {
        let name = self.table_name(&stmt.table)?;
        let EngineState { catalog, txn } = &mut *self.state;
        let table = catalog.table_mut(name)?;

        let targets: Vec<usize> = if stmt.columns.is_empty() {
            (0..table.columns().len()).collect()
        } else {
            let mut seen = HashSet::new();
            stmt.columns
                .iter()
                .map(|c| {
                    if !seen.insert(c.to_lowercase()) {
                        return Err(NexusError::query(format!(
                            "column \"{}\" specified more than once",
                            c
                        )));
                    }
                    table.column_index(c).ok_or_else(|| NexusError::ColumnNotFound {
                        column: c.clone(),
                    })
                })
                .collect::<NexusResult<_>>()?
        };

        // coerce every value first so that a bad literal changes nothing
        let mut rows = Vec::with_capacity(stmt.values.len());
        for values in &stmt.values {
            if values.len() > targets.len() {
                return Err(NexusError::query("INSERT has more expressions than target columns"));
            }
            if values.len() < targets.len() {
                return Err(NexusError::query("INSERT has more target columns than expressions"));
            }
            let mut row: Vec<Option<Value>> = vec![None; table.columns().len()];
            for (&position, expr) in targets.iter().zip(values) {
                let target = table.columns()[position].data_type();
                row[position] = Some(insert_value(build_value(&NoColumns, expr)?, target)?);
            }
            rows.push(row);
        }

        let mut inserted = Vec::with_capacity(rows.len());
        for row in rows {
            match table.insert(txn, row) {
                Ok(row) => inserted.push(row),
                Err(e) => {
                    // undo the rows of this statement already stored
                    for row in inserted.iter().rev() {
                        if let Some(id) = row.id() {
                            table.delete(txn, id)?;
                        }
                    }
                    return Err(e);
                }
            }
        }
        debug!(table = %table.name(), rows = inserted.len(), "inserted rows");

        if stmt.returning.is_empty() {
            return Ok(Vec::new());
        }
        let columns: Vec<Expression> = table
            .columns()
            .iter()
            .map(|c| c.expression().clone().with_qualifier(Some(table.name().to_string())))
            .collect();
        let source = Selection::Rows {
            columns,
            rows: inserted,
        };
        let items = build_items(&source, source.columns(), &stmt.returning)?;
        materialize(&Selection::Projection(Box::new(Projection::new(source, items))))
    }

    fn create_table(&mut self, stmt: &CreateTableStatement) -> NexusResult<Vec<ResultRow>> {
        let name = self.table_name(&stmt.name)?;
        if self.state.catalog.contains(name) {
            if stmt.if_not_exists {
                debug!(table = %name, "table already exists, skipping");
                return Ok(Vec::new());
            }
            return Err(NexusError::TableExists {
                table: name.to_string(),
            });
        }

        let mut schema = TableSchema::new(name);
        for column in &stmt.columns {
            let (data_type, serial) = DataType::from_sql_name(&column.data_type)?;
            let mut field = SchemaField::new(&column.name, data_type);
            field.serial = serial;
            field.not_null = column.not_null || serial;
            field.default = column.default.clone().map(ColumnDefault::Expr);
            for constraint in &column.constraints {
                match constraint {
                    ColumnConstraint::PrimaryKey => field = field.primary_key(),
                    ColumnConstraint::Unique => field = field.unique(),
                }
            }
            schema = schema.field(field);
        }
        schema.constraints = stmt.constraints.clone();

        self.state.catalog.create_table(&schema, &self.state.txn)?;
        Ok(Vec::new())
    }

    fn create_index(&mut self, stmt: &CreateIndexStatement) -> NexusResult<Vec<ResultRow>> {
        let name = self.table_name(&stmt.table)?;
        let EngineState { catalog, txn } = &mut *self.state;
        let table = catalog.table_mut(name)?;

        if let Some(index_name) = &stmt.name {
            if stmt.if_not_exists && table.has_index(index_name) {
                debug!(index = %index_name, "index already exists, skipping");
                return Ok(Vec::new());
            }
        }

        let scope: Vec<Expression> = table
            .columns()
            .iter()
            .map(|c| c.expression().clone().with_qualifier(Some(table.name().to_string())))
            .collect();
        let columns = stmt
            .columns
            .iter()
            .map(|key| {
                Ok(IndexColumn {
                    expression: build_value(&ColumnList(&scope), &key.expr)?,
                    descending: key.descending,
                    nulls_last: key.nulls_last(),
                })
            })
            .collect::<NexusResult<Vec<_>>>()?;

        table.create_index(
            txn,
            IndexSpec {
                name: stmt.name.clone(),
                columns,
                unique: stmt.unique,
                primary: false,
            },
        )?;
        Ok(Vec::new())
    }
}

/// Converts a bound `INSERT` value to the column type. Only constants are
/// accepted; anything castable to text is stored as its text form.
fn insert_value(expr: Expression, target: &DataType) -> NexusResult<Value> {
    if !expr.is_constant() {
        return Err(NexusError::not_supported(format!(
            "non-constant INSERT value {}",
            expr.sql()
        )));
    }
    let converted = if expr.data_type().can_convert(target) {
        expr.convert(target)?
    } else if target.is_text() {
        expr.cast(target)?
    } else {
        return Err(NexusError::cast(expr.data_type(), target));
    };
    converted.eval(&[])
}

/// Drains a selection into owned result rows keyed by output name.
pub(crate) fn materialize(selection: &Selection<'_>) -> NexusResult<Vec<ResultRow>> {
    let names: Vec<String> = selection
        .columns()
        .iter()
        .enumerate()
        .map(|(i, c)| c.id().map_or_else(|| format!("{}{}", UNNAMED_COLUMN_PREFIX, i), str::to_string))
        .collect();
    selection
        .enumerate()
        .map(|row| {
            let row = row?;
            Ok(names
                .iter()
                .cloned()
                .zip(row.values().iter().cloned())
                .collect())
        })
        .collect()
}

fn statement_kind(stmt: &Statement) -> &'static str {
    match stmt {
        Statement::StartTransaction => "begin",
        Statement::Commit => "commit",
        Statement::Rollback => "rollback",
        Statement::Select(_) => "select",
        Statement::Insert(_) => "insert",
        Statement::CreateTable(_) => "create table",
        Statement::CreateIndex(_) => "create index",
    }
}
