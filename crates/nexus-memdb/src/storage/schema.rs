//! Programmatic table definitions.
//!
//! [`TableSchema`] is what `CREATE TABLE` lowers to, and what
//! [`Database::declare_table`](crate::Database::declare_table) accepts
//! directly.

use nexus_common::NexusResult;

use crate::parser::{self, Expr, TableConstraint};
use crate::types::{DataType, Value};

/// Column default.
#[derive(Debug, Clone, PartialEq)]
pub enum ColumnDefault {
    /// A fixed value.
    Value(Value),
    /// An expression evaluated for every inserted row, such as `now()`.
    Expr(Expr),
}

/// One column of a [`TableSchema`].
#[derive(Debug, Clone, PartialEq)]
pub struct SchemaField {
    /// Column name.
    pub name: String,
    /// Column type.
    pub data_type: DataType,
    /// Auto-incremented when no value is supplied.
    pub serial: bool,
    /// `NOT NULL`.
    pub not_null: bool,
    /// Column-level `UNIQUE`.
    pub unique: bool,
    /// Column-level `PRIMARY KEY`.
    pub primary_key: bool,
    /// `DEFAULT`.
    pub default: Option<ColumnDefault>,
}

impl SchemaField {
    /// A nullable column without default.
    pub fn new(name: impl Into<String>, data_type: DataType) -> Self {
        Self {
            name: name.into(),
            data_type,
            serial: false,
            not_null: false,
            unique: false,
            primary_key: false,
            default: None,
        }
    }

    /// An auto-incremented integer column.
    pub fn serial(name: impl Into<String>) -> Self {
        Self {
            serial: true,
            not_null: true,
            ..Self::new(name, DataType::Int)
        }
    }

    /// Marks the column `NOT NULL`.
    #[must_use]
    pub fn not_null(mut self) -> Self {
        self.not_null = true;
        self
    }

    /// Marks the column `UNIQUE`.
    #[must_use]
    pub fn unique(mut self) -> Self {
        self.unique = true;
        self
    }

    /// Marks the column as the primary key.
    #[must_use]
    pub fn primary_key(mut self) -> Self {
        self.primary_key = true;
        self.not_null = true;
        self
    }

    /// Sets a constant default.
    #[must_use]
    pub fn default_value(mut self, value: impl Into<Value>) -> Self {
        self.default = Some(ColumnDefault::Value(value.into()));
        self
    }

    /// Sets a default expression given as SQL text.
    pub fn default_sql(mut self, sql: &str) -> NexusResult<Self> {
        self.default = Some(ColumnDefault::Expr(parser::parse_expr(sql)?));
        Ok(self)
    }
}

/// A table definition.
#[derive(Debug, Clone, PartialEq)]
pub struct TableSchema {
    /// Table name.
    pub name: String,
    /// Columns in declaration order.
    pub fields: Vec<SchemaField>,
    /// Table-level `PRIMARY KEY (...)` and `UNIQUE (...)`.
    pub constraints: Vec<TableConstraint>,
}

impl TableSchema {
    /// An empty definition.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            fields: Vec::new(),
            constraints: Vec::new(),
        }
    }

    /// Appends a column.
    #[must_use]
    pub fn field(mut self, field: SchemaField) -> Self {
        self.fields.push(field);
        self
    }

    /// Adds a table-level primary key.
    #[must_use]
    pub fn primary_key(mut self, columns: &[&str]) -> Self {
        self.constraints.push(TableConstraint::PrimaryKey {
            name: None,
            columns: columns.iter().map(|c| c.to_string()).collect(),
        });
        self
    }

    /// Adds a table-level unique constraint.
    #[must_use]
    pub fn unique(mut self, columns: &[&str]) -> Self {
        self.constraints.push(TableConstraint::Unique {
            name: None,
            columns: columns.iter().map(|c| c.to_string()).collect(),
        });
        self
    }
}
