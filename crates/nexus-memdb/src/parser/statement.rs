//! SQL statement AST.
//!
//! Each supported statement kind lowers into its own struct. Clauses the
//! engine cannot honor are rejected during lowering instead of being
//! dropped silently.

use nexus_common::{NexusError, NexusResult};
use serde::{Deserialize, Serialize};
use sqlparser::ast as sql_ast;

use super::{Expr, JoinType, Literal, OrderByExpr, TableRef};

/// A SQL statement.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Statement {
    /// `BEGIN` / `START TRANSACTION`.
    StartTransaction,
    /// `COMMIT`.
    Commit,
    /// `ROLLBACK`.
    Rollback,
    /// `SELECT`.
    Select(Box<SelectStatement>),
    /// `INSERT`.
    Insert(InsertStatement),
    /// `CREATE TABLE`.
    CreateTable(CreateTableStatement),
    /// `CREATE INDEX`.
    CreateIndex(CreateIndexStatement),
}

impl Statement {
    /// Converts from sqlparser's Statement.
    pub fn from_sql_ast(stmt: sql_ast::Statement) -> NexusResult<Self> {
        match stmt {
            sql_ast::Statement::Query(query) => {
                Ok(Statement::Select(Box::new(SelectStatement::from_sql_ast(*query)?)))
            }
            sql_ast::Statement::Insert {
                or,
                ignore,
                into: _,
                table_name,
                table_alias,
                columns,
                overwrite,
                source,
                partitioned,
                after_columns,
                table,
                on,
                returning,
                replace_into,
                priority,
            } => {
                if or.is_some() || ignore || replace_into || priority.is_some() {
                    return Err(NexusError::not_supported("INSERT conflict modifiers"));
                }
                if overwrite || table || partitioned.is_some() || !after_columns.is_empty() {
                    return Err(NexusError::not_supported("INSERT OVERWRITE/PARTITION"));
                }
                if table_alias.is_some() {
                    return Err(NexusError::not_supported("INSERT target alias"));
                }
                if on.is_some() {
                    return Err(NexusError::not_supported("INSERT ... ON CONFLICT"));
                }
                Ok(Statement::Insert(InsertStatement::from_parts(
                    table_name, columns, source, returning,
                )?))
            }
            sql_ast::Statement::CreateTable {
                or_replace,
                temporary,
                external,
                global,
                if_not_exists,
                transient,
                name,
                columns,
                constraints,
                hive_distribution,
                hive_formats,
                table_properties,
                with_options,
                file_format,
                location,
                query,
                without_rowid,
                like,
                clone,
                engine,
                comment,
                auto_increment_offset,
                default_charset,
                collation,
                on_commit,
                on_cluster,
                order_by,
                partition_by,
                cluster_by,
                options,
                strict,
            } => {
                if or_replace {
                    return Err(NexusError::not_supported("CREATE OR REPLACE TABLE"));
                }
                if temporary || external || transient || global.is_some() {
                    return Err(NexusError::not_supported("CREATE TEMPORARY/EXTERNAL TABLE"));
                }
                if query.is_some() {
                    return Err(NexusError::not_supported("CREATE TABLE ... AS"));
                }
                if like.is_some() || clone.is_some() {
                    return Err(NexusError::not_supported("CREATE TABLE ... LIKE/CLONE"));
                }
                if on_commit.is_some() {
                    return Err(NexusError::not_supported("CREATE TABLE ... ON COMMIT"));
                }
                let has_storage_options = !matches!(hive_distribution, sql_ast::HiveDistributionStyle::NONE)
                    || hive_formats.is_some_and(|f| {
                        f.row_format.is_some() || f.storage.is_some() || f.location.is_some()
                    })
                    || !table_properties.is_empty()
                    || !with_options.is_empty()
                    || file_format.is_some()
                    || location.is_some()
                    || without_rowid
                    || engine.is_some()
                    || comment.is_some()
                    || auto_increment_offset.is_some()
                    || default_charset.is_some()
                    || collation.is_some()
                    || on_cluster.is_some()
                    || order_by.is_some()
                    || partition_by.is_some()
                    || cluster_by.is_some()
                    || options.is_some()
                    || strict;
                if has_storage_options {
                    return Err(NexusError::not_supported("table storage options"));
                }
                Ok(Statement::CreateTable(CreateTableStatement::from_parts(
                    name,
                    columns,
                    constraints,
                    if_not_exists,
                )?))
            }
            sql_ast::Statement::CreateIndex {
                name,
                table_name,
                using,
                columns,
                unique,
                concurrently,
                if_not_exists,
                include,
                nulls_distinct,
                predicate,
            } => {
                if predicate.is_some() {
                    return Err(NexusError::not_supported("partial index (CREATE INDEX ... WHERE)"));
                }
                if nulls_distinct.is_some() {
                    return Err(NexusError::not_supported("CREATE INDEX ... NULLS [NOT] DISTINCT"));
                }
                if !include.is_empty() {
                    return Err(NexusError::not_supported("CREATE INDEX ... INCLUDE"));
                }
                if let Some(method) = using {
                    if !method.value.eq_ignore_ascii_case("btree") {
                        return Err(NexusError::not_supported(format!(
                            "index method {}",
                            method.value
                        )));
                    }
                }
                if concurrently {
                    return Err(NexusError::not_supported("CREATE INDEX CONCURRENTLY"));
                }
                Ok(Statement::CreateIndex(CreateIndexStatement::from_parts(
                    name,
                    table_name,
                    columns,
                    unique,
                    if_not_exists,
                )?))
            }
            sql_ast::Statement::StartTransaction { .. } => Ok(Statement::StartTransaction),
            sql_ast::Statement::Commit { .. } => Ok(Statement::Commit),
            sql_ast::Statement::Rollback { .. } => Ok(Statement::Rollback),
            other => Err(NexusError::not_supported(format!(
                "statement {}",
                statement_keyword(&other)
            ))),
        }
    }
}

/// First words of a statement, for error messages.
fn statement_keyword(stmt: &sql_ast::Statement) -> String {
    stmt.to_string()
        .split_whitespace()
        .take(2)
        .collect::<Vec<_>>()
        .join(" ")
}

/// A SELECT statement.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SelectStatement {
    /// Selected columns.
    pub columns: Vec<SelectItem>,
    /// FROM clause; `None` selects one implicit empty row.
    pub from: Option<FromItem>,
    /// WHERE clause.
    pub where_clause: Option<Expr>,
    /// GROUP BY clause.
    pub group_by: Vec<Expr>,
    /// HAVING clause.
    pub having: Option<Expr>,
    /// ORDER BY clause.
    pub order_by: Vec<OrderByExpr>,
    /// LIMIT clause.
    pub limit: Option<u64>,
    /// OFFSET clause.
    pub offset: Option<u64>,
}

impl SelectStatement {
    /// Converts from sqlparser's Query.
    pub fn from_sql_ast(query: sql_ast::Query) -> NexusResult<Self> {
        if query.with.is_some() {
            return Err(NexusError::not_supported("WITH"));
        }
        if query.fetch.is_some() {
            return Err(NexusError::not_supported("FETCH"));
        }
        if !query.locks.is_empty() {
            return Err(NexusError::not_supported("FOR UPDATE/SHARE"));
        }
        if !query.limit_by.is_empty() {
            return Err(NexusError::not_supported("LIMIT BY"));
        }
        if query.for_clause.is_some() {
            return Err(NexusError::not_supported("FOR XML/JSON"));
        }

        let select = match *query.body {
            sql_ast::SetExpr::Select(select) => select,
            sql_ast::SetExpr::SetOperation { op, .. } => {
                return Err(NexusError::not_supported(op.to_string()))
            }
            sql_ast::SetExpr::Values(_) => {
                return Err(NexusError::not_supported("VALUES as a query"))
            }
            _ => return Err(NexusError::not_supported("non-SELECT query body")),
        };

        if select.distinct.is_some() {
            return Err(NexusError::not_supported("DISTINCT"));
        }
        if select.top.is_some() {
            return Err(NexusError::not_supported("TOP"));
        }
        if select.into.is_some() {
            return Err(NexusError::not_supported("SELECT INTO"));
        }
        if !select.named_window.is_empty() {
            return Err(NexusError::not_supported("WINDOW"));
        }
        if select.qualify.is_some() {
            return Err(NexusError::not_supported("QUALIFY"));
        }
        if !select.lateral_views.is_empty() {
            return Err(NexusError::not_supported("LATERAL VIEW"));
        }
        if !select.cluster_by.is_empty() || !select.distribute_by.is_empty() || !select.sort_by.is_empty() {
            return Err(NexusError::not_supported("CLUSTER/DISTRIBUTE/SORT BY"));
        }

        let columns: NexusResult<Vec<_>> = select
            .projection
            .into_iter()
            .map(SelectItem::from_sql_ast)
            .collect();

        let mut from = select.from.into_iter();
        let first = from.next().map(FromItem::from_sql_ast).transpose()?;
        if from.next().is_some() {
            return Err(NexusError::not_supported(
                "comma-separated FROM (implicit cross join)",
            ));
        }

        let where_clause = select.selection.map(Expr::from_sql_ast).transpose()?;

        let group_by: NexusResult<Vec<_>> = match select.group_by {
            sql_ast::GroupByExpr::Expressions(exprs) => {
                exprs.into_iter().map(Expr::from_sql_ast).collect()
            }
            sql_ast::GroupByExpr::All => return Err(NexusError::not_supported("GROUP BY ALL")),
        };

        let having = select.having.map(Expr::from_sql_ast).transpose()?;

        let order_by: NexusResult<Vec<_>> = query
            .order_by
            .into_iter()
            .map(OrderByExpr::from_sql_ast)
            .collect();

        let limit = query.limit.map(extract_count).transpose()?;
        let offset = query.offset.map(|o| extract_count(o.value)).transpose()?;

        Ok(Self {
            columns: columns?,
            from: first,
            where_clause,
            group_by: group_by?,
            having,
            order_by: order_by?,
            limit,
            offset,
        })
    }

    /// Returns true if the select list, HAVING or ORDER BY uses an
    /// aggregate function.
    pub fn uses_aggregates(&self) -> bool {
        self.columns.iter().any(|c| match c {
            SelectItem::Expr { expr, .. } => expr.contains_aggregate(),
            _ => false,
        }) || self.having.as_ref().is_some_and(Expr::contains_aggregate)
            || self.order_by.iter().any(|o| o.expr.contains_aggregate())
    }
}

/// Extracts a LIMIT/OFFSET count.
fn extract_count(expr: sql_ast::Expr) -> NexusResult<u64> {
    match Expr::from_sql_ast(expr)? {
        Expr::Literal(Literal::Integer(n)) if n >= 0 => Ok(n as u64),
        Expr::Literal(Literal::Integer(_)) => {
            Err(NexusError::query("LIMIT/OFFSET must not be negative"))
        }
        other => Err(NexusError::not_supported(format!(
            "non-constant LIMIT/OFFSET {}",
            other
        ))),
    }
}

/// A selected item.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum SelectItem {
    /// `*`.
    Wildcard,
    /// `t.*`.
    QualifiedWildcard(String),
    /// An expression with an optional alias.
    Expr {
        /// The expression.
        expr: Expr,
        /// Optional alias.
        alias: Option<String>,
    },
}

impl SelectItem {
    /// Creates an unaliased select item.
    pub fn new(expr: Expr) -> Self {
        SelectItem::Expr { expr, alias: None }
    }

    /// Converts from sqlparser's SelectItem.
    pub fn from_sql_ast(item: sql_ast::SelectItem) -> NexusResult<Self> {
        match item {
            sql_ast::SelectItem::UnnamedExpr(expr) => Ok(SelectItem::Expr {
                expr: Expr::from_sql_ast(expr)?,
                alias: None,
            }),
            sql_ast::SelectItem::ExprWithAlias { expr, alias } => Ok(SelectItem::Expr {
                expr: Expr::from_sql_ast(expr)?,
                alias: Some(alias.value),
            }),
            sql_ast::SelectItem::Wildcard(_) => Ok(SelectItem::Wildcard),
            sql_ast::SelectItem::QualifiedWildcard(name, _) => Ok(SelectItem::QualifiedWildcard(
                name.0.last().map(|i| i.value.clone()).unwrap_or_default(),
            )),
        }
    }
}

/// A FROM clause item.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum FromItem {
    /// A table reference.
    Table(TableRef),
    /// A joined table.
    Join {
        /// Left side.
        left: Box<FromItem>,
        /// Join type.
        join_type: JoinType,
        /// Right side.
        right: Box<FromItem>,
        /// Join condition.
        on: Expr,
    },
    /// A subquery.
    Subquery {
        /// The subquery.
        query: Box<SelectStatement>,
        /// Alias.
        alias: String,
    },
}

impl FromItem {
    /// Creates a table reference.
    pub fn table(name: impl Into<String>) -> Self {
        FromItem::Table(TableRef::new(name))
    }

    /// Converts from sqlparser's TableWithJoins.
    pub fn from_sql_ast(table: sql_ast::TableWithJoins) -> NexusResult<Self> {
        let mut result = from_table_factor(table.relation)?;

        for join in table.joins {
            let right = from_table_factor(join.relation)?;
            let (join_type, on) = JoinType::from_sql_ast(join.join_operator)?;
            result = FromItem::Join {
                left: Box::new(result),
                join_type,
                right: Box::new(right),
                on,
            };
        }

        Ok(result)
    }
}

/// Converts a TableFactor to FromItem.
fn from_table_factor(factor: sql_ast::TableFactor) -> NexusResult<FromItem> {
    match factor {
        sql_ast::TableFactor::Table {
            name,
            alias,
            args,
            with_hints,
            version,
            partitions,
        } => {
            if args.is_some() {
                return Err(NexusError::not_supported("table function in FROM"));
            }
            if !with_hints.is_empty() || version.is_some() || !partitions.is_empty() {
                return Err(NexusError::not_supported("table hints"));
            }
            let mut table_ref = TableRef::from_object_name(&name);
            if let Some(a) = alias {
                if !a.columns.is_empty() {
                    return Err(NexusError::not_supported("column aliases on a table"));
                }
                table_ref.alias = Some(a.name.value);
            }
            Ok(FromItem::Table(table_ref))
        }
        sql_ast::TableFactor::Derived {
            lateral,
            subquery,
            alias,
        } => {
            if lateral {
                return Err(NexusError::not_supported("LATERAL subquery"));
            }
            let alias = alias
                .ok_or_else(|| NexusError::query("subquery in FROM must have an alias"))?
                .name
                .value;
            Ok(FromItem::Subquery {
                query: Box::new(SelectStatement::from_sql_ast(*subquery)?),
                alias,
            })
        }
        sql_ast::TableFactor::NestedJoin {
            table_with_joins,
            alias,
        } => {
            if alias.is_some() {
                return Err(NexusError::not_supported("alias on a parenthesized join"));
            }
            FromItem::from_sql_ast(*table_with_joins)
        }
        other => Err(NexusError::not_supported(format!("FROM item {}", other))),
    }
}

/// An INSERT statement.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InsertStatement {
    /// Target table.
    pub table: TableRef,
    /// Target columns (empty means all, in declaration order).
    pub columns: Vec<String>,
    /// Rows of the VALUES clause.
    pub values: Vec<Vec<Expr>>,
    /// RETURNING clause.
    pub returning: Vec<SelectItem>,
}

impl InsertStatement {
    /// Converts from sqlparser's Insert parts.
    pub fn from_parts(
        table_name: sql_ast::ObjectName,
        columns: Vec<sql_ast::Ident>,
        source: Option<Box<sql_ast::Query>>,
        returning: Option<Vec<sql_ast::SelectItem>>,
    ) -> NexusResult<Self> {
        let table = TableRef::from_object_name(&table_name);
        let columns: Vec<_> = columns.into_iter().map(|c| c.value).collect();

        let source = source.ok_or_else(|| NexusError::not_supported("INSERT ... DEFAULT VALUES"))?;
        if source.with.is_some() || !source.order_by.is_empty() || source.limit.is_some() {
            return Err(NexusError::not_supported("INSERT with a query modifier"));
        }
        let values = match *source.body {
            sql_ast::SetExpr::Values(values) => {
                let rows: NexusResult<Vec<Vec<Expr>>> = values
                    .rows
                    .into_iter()
                    .map(|row| row.into_iter().map(Expr::from_sql_ast).collect())
                    .collect();
                rows?
            }
            sql_ast::SetExpr::Select(_) => {
                return Err(NexusError::not_supported("INSERT ... SELECT"))
            }
            _ => return Err(NexusError::not_supported("INSERT source")),
        };

        let returning: NexusResult<Vec<_>> = returning
            .unwrap_or_default()
            .into_iter()
            .map(SelectItem::from_sql_ast)
            .collect();

        Ok(Self {
            table,
            columns,
            values,
            returning: returning?,
        })
    }
}

/// A CREATE TABLE statement.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CreateTableStatement {
    /// Table name.
    pub name: TableRef,
    /// Column definitions.
    pub columns: Vec<ColumnDef>,
    /// Table-level constraints.
    pub constraints: Vec<TableConstraint>,
    /// IF NOT EXISTS.
    pub if_not_exists: bool,
}

impl CreateTableStatement {
    /// Converts from sqlparser's CreateTable parts.
    pub fn from_parts(
        name: sql_ast::ObjectName,
        columns: Vec<sql_ast::ColumnDef>,
        constraints: Vec<sql_ast::TableConstraint>,
        if_not_exists: bool,
    ) -> NexusResult<Self> {
        let columns: NexusResult<Vec<_>> =
            columns.into_iter().map(ColumnDef::from_sql_ast).collect();

        let constraints: NexusResult<Vec<_>> = constraints
            .into_iter()
            .map(TableConstraint::from_sql_ast)
            .collect();

        Ok(Self {
            name: TableRef::from_object_name(&name),
            columns: columns?,
            constraints: constraints?,
            if_not_exists,
        })
    }
}

/// Column definition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnDef {
    /// Column name.
    pub name: String,
    /// Data type name as written.
    pub data_type: String,
    /// `NOT NULL` was specified.
    pub not_null: bool,
    /// Default value.
    pub default: Option<Expr>,
    /// Column constraints.
    pub constraints: Vec<ColumnConstraint>,
}

impl ColumnDef {
    /// Converts from sqlparser's ColumnDef.
    pub fn from_sql_ast(col: sql_ast::ColumnDef) -> NexusResult<Self> {
        if col.collation.is_some() {
            return Err(NexusError::not_supported("COLLATE"));
        }
        let mut not_null = false;
        let mut default = None;
        let mut constraints = Vec::new();

        for opt in col.options {
            match opt.option {
                sql_ast::ColumnOption::Null => not_null = false,
                sql_ast::ColumnOption::NotNull => not_null = true,
                sql_ast::ColumnOption::Default(expr) => {
                    default = Some(Expr::from_sql_ast(expr)?);
                }
                sql_ast::ColumnOption::Unique {
                    is_primary,
                    characteristics,
                } => {
                    if characteristics.is_some() {
                        return Err(NexusError::not_supported("constraint characteristics"));
                    }
                    if is_primary {
                        constraints.push(ColumnConstraint::PrimaryKey);
                    } else {
                        constraints.push(ColumnConstraint::Unique);
                    }
                }
                other => {
                    return Err(NexusError::not_supported(format!(
                        "column option {}",
                        other
                    )))
                }
            }
        }

        Ok(Self {
            name: col.name.value,
            data_type: col.data_type.to_string(),
            not_null,
            default,
            constraints,
        })
    }
}

/// Column constraint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ColumnConstraint {
    /// PRIMARY KEY.
    PrimaryKey,
    /// UNIQUE.
    Unique,
}

/// Table constraint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum TableConstraint {
    /// PRIMARY KEY.
    PrimaryKey {
        /// Constraint name.
        name: Option<String>,
        /// Columns.
        columns: Vec<String>,
    },
    /// UNIQUE.
    Unique {
        /// Constraint name.
        name: Option<String>,
        /// Columns.
        columns: Vec<String>,
    },
}

impl TableConstraint {
    /// Converts from sqlparser's TableConstraint.
    pub fn from_sql_ast(constraint: sql_ast::TableConstraint) -> NexusResult<Self> {
        match constraint {
            sql_ast::TableConstraint::Unique {
                name,
                columns,
                is_primary,
                characteristics,
            } => {
                if characteristics.is_some() {
                    return Err(NexusError::not_supported("constraint characteristics"));
                }
                let name = name.map(|n| n.value);
                let columns: Vec<_> = columns.into_iter().map(|c| c.value).collect();
                if is_primary {
                    Ok(TableConstraint::PrimaryKey { name, columns })
                } else {
                    Ok(TableConstraint::Unique { name, columns })
                }
            }
            other => Err(NexusError::not_supported(format!("constraint {}", other))),
        }
    }
}

/// A CREATE INDEX statement.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CreateIndexStatement {
    /// Index name (generated when absent).
    pub name: Option<String>,
    /// Indexed table.
    pub table: TableRef,
    /// Indexed expressions with their ordering.
    pub columns: Vec<OrderByExpr>,
    /// UNIQUE index.
    pub unique: bool,
    /// IF NOT EXISTS.
    pub if_not_exists: bool,
}

impl CreateIndexStatement {
    /// Converts from sqlparser's CreateIndex parts.
    pub fn from_parts(
        name: Option<sql_ast::ObjectName>,
        table_name: sql_ast::ObjectName,
        columns: Vec<sql_ast::OrderByExpr>,
        unique: bool,
        if_not_exists: bool,
    ) -> NexusResult<Self> {
        let columns: NexusResult<Vec<_>> =
            columns.into_iter().map(OrderByExpr::from_sql_ast).collect();

        Ok(Self {
            name: name.and_then(|n| n.0.last().map(|i| i.value.clone())),
            table: TableRef::from_object_name(&table_name),
            columns: columns?,
            unique,
            if_not_exists,
        })
    }
}
