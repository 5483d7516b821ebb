//! Table storage.
//!
//! A [`Table`] owns its column definitions, serial counters and indexes.
//! Row data lives in the [`Transaction`]: every write builds the next
//! snapshot, validates the row against every column and index constraint,
//! and only then touches the indexes and publishes the snapshot. A failed
//! write leaves both the row set and the indexes exactly as they were.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use nexus_common::{NexusError, NexusResult};
use serde::Serialize;
use tracing::info;

use super::index::{BIndex, IndexColumn, IndexInfo, IndexKey};
use super::transaction::{RowSnapshot, Transaction};
use super::TableId;
use crate::expr::Expression;
use crate::row::{Row, RowId};
use crate::types::{DataType, Value};

/// A column of a stored table.
#[derive(Debug, Clone)]
pub struct Column {
    name: String,
    data_type: DataType,
    default: Option<Expression>,
    not_null: bool,
    serial: bool,
    expression: Expression,
}

impl Column {
    /// Creates a column bound to position `index` of table `table`.
    pub fn new(table: TableId, index: usize, name: &str, data_type: DataType) -> Self {
        let expression = Expression::column(
            index,
            data_type.clone(),
            name,
            Expression::column_hash(table.0, name),
        );
        Self {
            name: name.to_string(),
            data_type,
            default: None,
            not_null: false,
            serial: false,
            expression,
        }
    }

    /// Column name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Column type.
    pub fn data_type(&self) -> &DataType {
        &self.data_type
    }

    /// Whether nulls are rejected.
    pub fn is_not_null(&self) -> bool {
        self.not_null
    }

    /// Whether the column auto-increments.
    pub fn is_serial(&self) -> bool {
        self.serial
    }

    /// Default expression.
    pub fn default(&self) -> Option<&Expression> {
        self.default.as_ref()
    }

    /// The column as an expression over the table's rows.
    pub fn expression(&self) -> &Expression {
        &self.expression
    }

    pub(crate) fn set_not_null(&mut self, not_null: bool) {
        self.not_null = not_null;
    }

    pub(crate) fn set_serial(&mut self, serial: bool) {
        self.serial = serial;
    }

    pub(crate) fn set_default(&mut self, default: Option<Expression>) {
        self.default = default;
    }
}

/// Public description of a column.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ColumnInfo {
    /// Column name.
    pub name: String,
    /// Column type.
    pub data_type: DataType,
    /// `NOT NULL`.
    pub not_null: bool,
    /// Auto-incremented.
    pub serial: bool,
    /// Default SQL, if any.
    pub default: Option<String>,
}

/// Scan counters of one table.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct TableStats {
    /// Full table scans performed.
    pub seq_scans: u64,
    /// Index lookups performed.
    pub index_lookups: u64,
}

/// Options for building an index.
#[derive(Debug, Clone)]
pub struct IndexSpec {
    /// Explicit name; derived from the table and columns when absent.
    pub name: Option<String>,
    /// Indexed expressions.
    pub columns: Vec<IndexColumn>,
    /// Enforce unique keys.
    pub unique: bool,
    /// Primary key (implies unique and not null).
    pub primary: bool,
}

/// A stored table.
#[derive(Debug)]
pub struct Table {
    id: TableId,
    name: String,
    columns: Vec<Column>,
    serials: Vec<i64>,
    next_row_id: u64,
    indexes: Vec<BIndex>,
    read_only: bool,
    seq_scans: AtomicU64,
    index_lookups: AtomicU64,
}

impl Table {
    /// Creates an empty table.
    pub fn new(id: TableId, name: impl Into<String>, columns: Vec<Column>) -> NexusResult<Self> {
        let name = name.into();
        for (i, column) in columns.iter().enumerate() {
            if columns[..i]
                .iter()
                .any(|c| c.name.eq_ignore_ascii_case(&column.name))
            {
                return Err(NexusError::query(format!(
                    "column \"{}\" specified more than once",
                    column.name
                )));
            }
        }
        Ok(Self {
            id,
            name,
            serials: vec![0; columns.len()],
            columns,
            next_row_id: 1,
            indexes: Vec::new(),
            read_only: false,
            seq_scans: AtomicU64::new(0),
            index_lookups: AtomicU64::new(0),
        })
    }

    // ---------------------------------------------------------------------
    // Metadata
    // ---------------------------------------------------------------------

    /// Table identity.
    pub fn id(&self) -> TableId {
        self.id
    }

    /// Table name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Columns in declaration order.
    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    /// Position of a column, matched case-insensitively.
    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns
            .iter()
            .position(|c| c.name.eq_ignore_ascii_case(name))
    }

    /// Looks a column up by name.
    pub fn column(&self, name: &str) -> NexusResult<&Column> {
        self.column_index(name)
            .map(|i| &self.columns[i])
            .ok_or_else(|| NexusError::ColumnNotFound {
                column: name.to_string(),
            })
    }

    /// Whether mutations are rejected.
    pub fn is_read_only(&self) -> bool {
        self.read_only
    }

    /// Protects (or unprotects) the table from mutation.
    pub fn set_read_only(&mut self, read_only: bool) {
        self.read_only = read_only;
    }

    pub(crate) fn rename(&mut self, name: impl Into<String>) {
        self.name = name.into();
    }

    /// Column descriptions.
    pub fn column_info(&self) -> Vec<ColumnInfo> {
        self.columns
            .iter()
            .map(|c| ColumnInfo {
                name: c.name.clone(),
                data_type: c.data_type.clone(),
                not_null: c.not_null,
                serial: c.serial,
                default: c.default.as_ref().map(|d| d.sql().to_string()),
            })
            .collect()
    }

    /// Index descriptions.
    pub fn list_indexes(&self) -> Vec<IndexInfo> {
        self.indexes.iter().map(BIndex::info).collect()
    }

    /// Whether an index with that name exists.
    pub fn has_index(&self, name: &str) -> bool {
        self.indexes.iter().any(|i| i.name().eq_ignore_ascii_case(name))
    }

    /// Whether a primary key is declared.
    pub fn has_primary_key(&self) -> bool {
        self.indexes.iter().any(BIndex::is_primary)
    }

    /// Finds an index whose leading expression computes `expr`,
    /// preferring unique and then narrower indexes.
    pub fn index_for(&self, expr: &Expression) -> Option<&BIndex> {
        self.indexes
            .iter()
            .filter(|i| i.leading().map_or(false, |lead| lead.same_as(expr)))
            .min_by_key(|i| (!i.is_unique(), i.width()))
    }

    // ---------------------------------------------------------------------
    // Statistics
    // ---------------------------------------------------------------------

    /// Records a full scan.
    pub fn record_seq_scan(&self) {
        self.seq_scans.fetch_add(1, Ordering::Relaxed);
    }

    /// Records an index lookup.
    pub fn record_index_lookup(&self) {
        self.index_lookups.fetch_add(1, Ordering::Relaxed);
    }

    /// Scan counters.
    pub fn stats(&self) -> TableStats {
        TableStats {
            seq_scans: self.seq_scans.load(Ordering::Relaxed),
            index_lookups: self.index_lookups.load(Ordering::Relaxed),
        }
    }

    // ---------------------------------------------------------------------
    // Rows
    // ---------------------------------------------------------------------

    /// Current row set.
    pub fn rows(&self, txn: &Transaction) -> RowSnapshot {
        txn.get(self.id)
    }

    /// Number of rows.
    pub fn row_count(&self, txn: &Transaction) -> usize {
        txn.get(self.id).len()
    }

    fn check_writable(&self) -> NexusResult<()> {
        if self.read_only {
            return Err(NexusError::ReadOnly {
                table: self.name.clone(),
            });
        }
        Ok(())
    }

    /// Inserts a row. `None` entries take the column's serial value or
    /// default; supplied values must already have the column types.
    pub fn insert(&mut self, txn: &mut Transaction, values: Vec<Option<Value>>) -> NexusResult<Arc<Row>> {
        self.check_writable()?;
        let id = RowId(self.next_row_id);
        self.next_row_id += 1;
        self.insert_with_id(txn, id, values)
    }

    fn insert_with_id(
        &mut self,
        txn: &mut Transaction,
        id: RowId,
        values: Vec<Option<Value>>,
    ) -> NexusResult<Arc<Row>> {
        if values.len() != self.columns.len() {
            return Err(NexusError::internal(format!(
                "row of {} values for table \"{}\" of {} columns",
                values.len(),
                self.name,
                self.columns.len()
            )));
        }

        let mut row = Vec::with_capacity(values.len());
        for (i, value) in values.into_iter().enumerate() {
            let column = &self.columns[i];
            let value = match value {
                Some(v) => v,
                None if column.serial => {
                    self.serials[i] += 1;
                    Value::Int(self.serials[i])
                }
                None => match &column.default {
                    Some(default) => column
                        .data_type
                        .convert_value(default.eval(&[])?, &column.data_type)?,
                    None => Value::Null,
                },
            };
            if value.is_null() && column.not_null {
                return Err(NexusError::ConstraintViolation {
                    constraint: format!("{}_{}_not_null", self.name, column.name),
                    message: format!(
                        "null value in column \"{}\" of relation \"{}\" violates not-null constraint",
                        column.name, self.name
                    ),
                });
            }
            row.push(value);
        }
        let row = Arc::new(Row::stored(id, row));

        let keys = self
            .indexes
            .iter()
            .map(|index| index.key_of(&row))
            .collect::<NexusResult<Vec<IndexKey>>>()?;
        for (index, key) in self.indexes.iter().zip(&keys) {
            index.check(&row, key)?;
        }

        for (index, key) in self.indexes.iter_mut().zip(keys) {
            index.add(&row, key)?;
        }
        txn.set(self.id, txn.get(self.id).insert(id, row.clone()));
        Ok(row)
    }

    /// Deletes a row by identity.
    pub fn delete(&mut self, txn: &mut Transaction, id: RowId) -> NexusResult<Arc<Row>> {
        self.check_writable()?;
        let (rows, removed) = txn.get(self.id).remove(&id).ok_or_else(|| {
            NexusError::internal(format!(
                "row {} does not exist in table \"{}\"",
                id, self.name
            ))
        })?;
        for index in &mut self.indexes {
            index.delete(id);
        }
        txn.set(self.id, rows);
        Ok(removed)
    }

    /// Replaces a row's values, keeping its identity. On failure the
    /// previous row is restored.
    pub fn update(&mut self, txn: &mut Transaction, id: RowId, values: Vec<Value>) -> NexusResult<Arc<Row>> {
        let previous = self.delete(txn, id)?;
        match self.insert_with_id(txn, id, values.into_iter().map(Some).collect()) {
            Ok(row) => Ok(row),
            Err(err) => {
                self.restore(txn, previous)?;
                Err(err)
            }
        }
    }

    fn restore(&mut self, txn: &mut Transaction, row: Arc<Row>) -> NexusResult<()> {
        let id = row
            .id()
            .ok_or_else(|| NexusError::internal("cannot restore a row without identity"))?;
        for index in &mut self.indexes {
            let key = index.key_of(&row)?;
            index.add(&row, key)?;
        }
        txn.set(self.id, txn.get(self.id).insert(id, row));
        Ok(())
    }

    // ---------------------------------------------------------------------
    // Indexes
    // ---------------------------------------------------------------------

    /// Builds an index over the existing rows and attaches it. Nothing is
    /// attached if any existing row violates the new constraints.
    pub fn create_index(&mut self, txn: &Transaction, spec: IndexSpec) -> NexusResult<&BIndex> {
        if spec.columns.is_empty() {
            return Err(NexusError::query("index must have at least one column"));
        }
        if spec.primary && self.has_primary_key() {
            return Err(NexusError::query(format!(
                "multiple primary keys for table \"{}\" are not allowed",
                self.name
            )));
        }
        let name = match spec.name {
            Some(name) => name,
            None => self.default_index_name(&spec.columns, spec.unique, spec.primary),
        };
        if self.has_index(&name) {
            return Err(NexusError::query(format!(
                "Index \"{}\" already exists",
                name
            )));
        }

        let mut index = BIndex::new(name, spec.columns, spec.unique, spec.primary);
        if let Some(existing) = self.indexes.iter().find(|i| i.signature() == index.signature()) {
            return Err(NexusError::query(format!(
                "Index already exists: \"{}\" covers the same expressions",
                existing.name()
            )));
        }
        for row in self.rows(txn).values() {
            let key = index.key_of(row)?;
            index.check(row, &key)?;
            index.add(row, key)?;
        }

        if spec.primary {
            let positions: Vec<usize> = index.expressions().filter_map(Expression::column_index).collect();
            for position in positions {
                if let Some(column) = self.columns.get_mut(position) {
                    column.not_null = true;
                }
            }
        }

        info!(table = %self.name, index = %index.name(), rows = index.len(), "created index");
        self.indexes.push(index);
        let last = self.indexes.len() - 1;
        Ok(&self.indexes[last])
    }

    fn default_index_name(&self, columns: &[IndexColumn], unique: bool, primary: bool) -> String {
        if primary {
            return format!("{}_pkey", self.name);
        }
        let parts: Vec<&str> = columns
            .iter()
            .map(|c| c.expression.id().unwrap_or("expr"))
            .collect();
        let base = format!(
            "{}_{}_{}",
            self.name,
            parts.join("_"),
            if unique { "key" } else { "idx" }
        );
        let mut name = base.clone();
        let mut n = 1;
        while self.has_index(&name) {
            name = format!("{}{}", base, n);
            n += 1;
        }
        name
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn users() -> Table {
        let id = TableId(1);
        let mut serial = Column::new(id, 0, "id", DataType::Int);
        serial.set_serial(true);
        serial.set_not_null(true);
        let mut name = Column::new(id, 1, "name", DataType::text());
        name.set_default(Some(Expression::constant(Value::from("anon"))));
        Table::new(id, "users", vec![serial, name]).unwrap()
    }

    fn primary_on_id(table: &mut Table, txn: &Transaction) {
        let expr = table.columns()[0].expression().clone();
        table
            .create_index(
                txn,
                IndexSpec {
                    name: None,
                    columns: vec![IndexColumn::asc(expr)],
                    unique: true,
                    primary: true,
                },
            )
            .unwrap();
    }

    #[test]
    fn test_serials_and_defaults() {
        let mut txn = Transaction::new();
        let mut table = users();
        let a = table.insert(&mut txn, vec![None, None]).unwrap();
        let b = table.insert(&mut txn, vec![None, Some(Value::from("bob"))]).unwrap();
        assert_eq!(a.values(), &[Value::Int(1), Value::from("anon")]);
        assert_eq!(b.values(), &[Value::Int(2), Value::from("bob")]);
        assert_eq!(table.row_count(&txn), 2);
    }

    #[test]
    fn test_duplicate_key_leaves_table_unchanged() {
        let mut txn = Transaction::new();
        let mut table = users();
        primary_on_id(&mut table, &txn);
        table.insert(&mut txn, vec![Some(Value::Int(1)), None]).unwrap();

        let before = table.rows(&txn);
        let err = table
            .insert(&mut txn, vec![Some(Value::Int(1)), Some(Value::from("dup"))])
            .unwrap_err();
        assert!(matches!(err, NexusError::ConstraintViolation { .. }));
        assert_eq!(table.row_count(&txn), 1);
        assert_eq!(before.len(), table.rows(&txn).len());
        assert_eq!(table.indexes[0].len(), 1);
    }

    #[test]
    fn test_not_null_rejected() {
        let mut txn = Transaction::new();
        let mut table = users();
        let err = table
            .insert(&mut txn, vec![Some(Value::Null), None])
            .unwrap_err();
        assert!(err.to_string().contains("violates not-null constraint"));
        assert_eq!(table.row_count(&txn), 0);
    }

    #[test]
    fn test_delete_and_update() {
        let mut txn = Transaction::new();
        let mut table = users();
        primary_on_id(&mut table, &txn);
        let a = table.insert(&mut txn, vec![None, None]).unwrap();
        let b = table.insert(&mut txn, vec![None, None]).unwrap();
        let (a_id, b_id) = (a.id().unwrap(), b.id().unwrap());

        // conflicting update restores the old row
        let err = table
            .update(&mut txn, b_id, vec![Value::Int(1), Value::from("x")])
            .unwrap_err();
        assert!(matches!(err, NexusError::ConstraintViolation { .. }));
        assert_eq!(table.rows(&txn).get(&b_id).map(|r| r.values().to_vec()), Some(b.values().to_vec()));
        assert_eq!(table.indexes[0].len(), 2);

        let updated = table
            .update(&mut txn, b_id, vec![Value::Int(7), Value::from("x")])
            .unwrap();
        assert_eq!(updated.id(), Some(b_id));

        table.delete(&mut txn, a_id).unwrap();
        assert_eq!(table.row_count(&txn), 1);
        let err = table.delete(&mut txn, a_id).unwrap_err();
        assert_eq!(err.kind(), nexus_common::ErrorKind::Internal);
    }

    #[test]
    fn test_read_only() {
        let mut txn = Transaction::new();
        let mut table = users();
        table.set_read_only(true);
        let err = table.insert(&mut txn, vec![None, None]).unwrap_err();
        assert!(matches!(err, NexusError::ReadOnly { .. }));
    }

    #[test]
    fn test_failed_index_build_not_attached() {
        let mut txn = Transaction::new();
        let mut table = users();
        table.insert(&mut txn, vec![Some(Value::Int(1)), None]).unwrap();
        table.insert(&mut txn, vec![Some(Value::Int(2)), None]).unwrap();

        let name_expr = table.columns()[1].expression().clone();
        let err = table
            .create_index(
                &txn,
                IndexSpec {
                    name: None,
                    columns: vec![IndexColumn::asc(name_expr.clone())],
                    unique: true,
                    primary: false,
                },
            )
            .unwrap_err();
        assert!(matches!(err, NexusError::ConstraintViolation { .. }));
        assert!(table.list_indexes().is_empty());

        let index = table
            .create_index(
                &txn,
                IndexSpec {
                    name: None,
                    columns: vec![IndexColumn::asc(name_expr)],
                    unique: false,
                    primary: false,
                },
            )
            .unwrap();
        assert_eq!(index.name(), "users_name_idx");
        assert_eq!(index.len(), 2);
    }

    #[test]
    fn test_default_index_names() {
        let txn = Transaction::new();
        let mut table = users();
        primary_on_id(&mut table, &txn);
        assert!(table.has_index("users_pkey"));
        assert!(table.has_primary_key());

        let expr = table.columns()[0].expression().clone();
        let err = table
            .create_index(
                &txn,
                IndexSpec {
                    name: Some("users_pkey".into()),
                    columns: vec![IndexColumn::asc(expr)],
                    unique: false,
                    primary: false,
                },
            )
            .unwrap_err();
        assert!(err.to_string().contains("already exists"));

        // same expression under another name
        let id_expr = table.columns()[0].expression().clone();
        let err = table
            .create_index(
                &txn,
                IndexSpec {
                    name: Some("users_id_again".into()),
                    columns: vec![IndexColumn::asc(id_expr)],
                    unique: false,
                    primary: false,
                },
            )
            .unwrap_err();
        assert!(err.to_string().contains("users_pkey"), "{}", err);
        assert_eq!(table.list_indexes().len(), 1);
    }
}
