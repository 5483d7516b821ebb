//! Building selection trees from `SELECT` statements.

use std::collections::HashSet;

use nexus_common::{DatabaseConfig, NexusError, NexusResult};

use crate::expr::Expression;
use crate::parser::{Expr, FromItem, Literal, OrderByExpr, SelectStatement, TableRef};
use crate::predicate::{build_predicate, build_value, ColumnScope};
use crate::selection::{
    build_items, output_columns, ColumnList, Filter, GroupBy, GroupScope, Join, Limit, OrderBy,
    Projection, ProjectionItem, ScanPolicy, Selection, SortKey, TableScan,
};
use crate::storage::{Catalog, Table, Transaction};

/// Read-only view of the engine a query is planned against.
#[derive(Debug, Clone, Copy)]
pub(crate) struct QueryContext<'a> {
    pub catalog: &'a Catalog,
    pub txn: &'a Transaction,
    pub config: &'a DatabaseConfig,
}

impl<'a> QueryContext<'a> {
    /// Resolves a possibly schema-qualified table name.
    pub fn resolve_table(&self, table: &TableRef) -> NexusResult<&'a Table> {
        if let Some(schema) = &table.schema {
            if !schema.eq_ignore_ascii_case(&self.config.default_schema) {
                return Err(NexusError::TableNotFound {
                    table: format!("{}.{}", schema, table.table),
                });
            }
        }
        self.catalog.table(&table.table)
    }

    fn scan(&self, table: &'a Table) -> Selection<'a> {
        Selection::Table(TableScan::new(
            table,
            self.txn,
            ScanPolicy::from_config(self.config),
        ))
    }

    /// Plans a full `SELECT`.
    pub fn select(&self, stmt: &SelectStatement) -> NexusResult<Selection<'a>> {
        let mut base = match &stmt.from {
            None => Selection::Unit,
            Some(item) => self.from_item(item, &mut HashSet::new())?,
        };
        if let Some(where_clause) = &stmt.where_clause {
            let predicate = build_predicate(&base, where_clause)?;
            base = Selection::Filter(Box::new(Filter::new(base, predicate)));
        }

        let grouped = !stmt.group_by.is_empty() || stmt.having.is_some() || stmt.uses_aggregates();
        let selection = if grouped {
            let keys = stmt
                .group_by
                .iter()
                .map(|e| build_value(&base, e))
                .collect::<NexusResult<Vec<_>>>()?;
            let scope = GroupScope::new(&base, keys);
            let items = build_items(&scope, base.columns(), &stmt.columns)?;
            let having = stmt
                .having
                .as_ref()
                .map(|h| build_predicate(&scope, h))
                .transpose()?;
            let order = bind_order(&scope, &items, &stmt.order_by)?;
            let (keys, aggregates) = scope.into_parts();

            let mut groups = Selection::GroupBy(Box::new(GroupBy::new(base, keys, aggregates)));
            if let Some(having) = having {
                groups = Selection::Filter(Box::new(Filter::new(groups, having)));
            }
            order.apply(groups, items)
        } else {
            let items = build_items(&base, base.columns(), &stmt.columns)?;
            let order = bind_order(&base, &items, &stmt.order_by)?;
            order.apply(base, items)
        };

        Ok(match (stmt.limit, stmt.offset) {
            (None, None) => selection,
            (limit, offset) => Selection::Limit(Box::new(Limit::new(selection, limit, offset))),
        })
    }

    fn from_item(&self, item: &FromItem, aliases: &mut HashSet<String>) -> NexusResult<Selection<'a>> {
        match item {
            FromItem::Table(table_ref) => {
                let table = self.resolve_table(table_ref)?;
                register_alias(aliases, table_ref.effective_name())?;
                let scan = self.scan(table);
                Ok(match &table_ref.alias {
                    Some(alias) => scan.alias(alias.clone()),
                    None => scan,
                })
            }
            FromItem::Join {
                left,
                join_type,
                right,
                on,
            } => {
                let left = self.from_item(left, aliases)?;
                let right = self.from_item(right, aliases)?;
                Ok(Selection::Join(Box::new(Join::new(left, right, *join_type, on)?)))
            }
            FromItem::Subquery { query, alias } => {
                let inner = self.select(query)?;
                register_alias(aliases, alias)?;
                Ok(inner.alias(alias.clone()))
            }
        }
    }
}

fn register_alias(aliases: &mut HashSet<String>, name: &str) -> NexusResult<()> {
    if !aliases.insert(name.to_lowercase()) {
        return Err(NexusError::query(format!(
            "Table name \"{}\" specified more than once",
            name
        )));
    }
    Ok(())
}

/// Where the sort happens relative to the select list.
enum SortPlacement {
    None,
    /// Keys bound against the select-list outputs.
    AfterProjection(Vec<SortKey>),
    /// Keys bound against the projection input.
    BeforeProjection(Vec<SortKey>),
}

impl SortPlacement {
    fn apply<'a>(self, input: Selection<'a>, items: Vec<ProjectionItem>) -> Selection<'a> {
        match self {
            SortPlacement::None => Selection::Projection(Box::new(Projection::new(input, items))),
            SortPlacement::AfterProjection(keys) => {
                let projected = Selection::Projection(Box::new(Projection::new(input, items)));
                Selection::OrderBy(Box::new(OrderBy::new(projected, keys)))
            }
            SortPlacement::BeforeProjection(keys) => {
                let sorted = Selection::OrderBy(Box::new(OrderBy::new(input, keys)));
                Selection::Projection(Box::new(Projection::new(sorted, items)))
            }
        }
    }
}

/// Binds `ORDER BY` keys. Output names and aliases win over input
/// columns; when any key needs an input column the sort runs before the
/// projection, with output references replaced by the item expressions.
fn bind_order(
    scope: &dyn ColumnScope,
    items: &[ProjectionItem],
    order_by: &[OrderByExpr],
) -> NexusResult<SortPlacement> {
    if order_by.is_empty() {
        return Ok(SortPlacement::None);
    }
    let outputs = output_columns(items);
    let mut bound = Vec::with_capacity(order_by.len());
    for key in order_by {
        if let Expr::Literal(Literal::Integer(position)) = &key.expr {
            let column = usize::try_from(*position)
                .ok()
                .and_then(|p| p.checked_sub(1))
                .and_then(|p| outputs.get(p))
                .ok_or_else(|| {
                    NexusError::query(format!("ORDER BY position {} is not in select list", position))
                })?;
            bound.push((key, column.clone(), true));
            continue;
        }
        match build_value(&ColumnList(&outputs), &key.expr) {
            Ok(expr) => bound.push((key, expr, true)),
            Err(_) => bound.push((key, build_value(scope, &key.expr)?, false)),
        }
    }

    let sort_key = |key: &OrderByExpr, expr: Expression| SortKey {
        expr,
        descending: key.descending,
        nulls_last: key.nulls_last(),
    };
    if bound.iter().all(|(_, _, on_output)| *on_output) {
        return Ok(SortPlacement::AfterProjection(
            bound.into_iter().map(|(key, expr, _)| sort_key(key, expr)).collect(),
        ));
    }
    let item_exprs: Vec<Expression> = items.iter().map(|i| i.expr.clone()).collect();
    Ok(SortPlacement::BeforeProjection(
        bound
            .into_iter()
            .map(|(key, expr, on_output)| {
                let expr = if on_output {
                    expr.replace_columns(&item_exprs)
                } else {
                    expr
                };
                sort_key(key, expr)
            })
            .collect(),
    ))
}
