//! `GROUP BY` and aggregation.
//!
//! Binding happens in two steps. A [`GroupScope`] resolves the select
//! list, `HAVING` and `ORDER BY` against the grouping keys, registering
//! every aggregate call it meets; then [`GroupBy`] computes rows laid out
//! as the key values followed by one value per registered aggregate.

use std::cell::RefCell;
use std::sync::Arc;

use indexmap::IndexMap;
use nexus_common::{NexusError, NexusResult, UNNAMED_COLUMN_PREFIX};

use super::{RowIter, Selection};
use crate::expr::{Accumulator, AggregateFunction, Expression};
use crate::parser::{Expr, FunctionCall};
use crate::predicate::{build_value, ColumnScope};
use crate::row::Row;
use crate::types::{DataType, Value};

/// An aggregate call registered while binding.
#[derive(Debug, Clone)]
pub struct AggregateCall {
    /// Function.
    pub func: AggregateFunction,
    /// `DISTINCT`.
    pub distinct: bool,
    /// Argument over the input rows; `None` for `count(*)`.
    pub arg: Option<Expression>,
    /// Result type.
    pub data_type: DataType,
    hash: u64,
}

impl AggregateCall {
    fn matches(&self, func: AggregateFunction, distinct: bool, arg: Option<&Expression>) -> bool {
        self.func == func
            && self.distinct == distinct
            && match (&self.arg, arg) {
                (Some(a), Some(b)) => a.same_as(b),
                (None, None) => true,
                _ => false,
            }
    }

    fn accumulator(&self) -> Accumulator {
        Accumulator::new(
            self.func,
            self.distinct,
            self.arg.as_ref().map(Expression::data_type),
        )
    }
}

/// Binding scope of everything computed after grouping.
#[derive(Debug)]
pub struct GroupScope<'s, 'a> {
    base: &'s Selection<'a>,
    keys: Vec<Expression>,
    aggregates: RefCell<Vec<AggregateCall>>,
}

impl<'s, 'a> GroupScope<'s, 'a> {
    /// Scope grouping `base` by `keys`, which are bound against `base`.
    pub fn new(base: &'s Selection<'a>, keys: Vec<Expression>) -> Self {
        Self {
            base,
            keys,
            aggregates: RefCell::new(Vec::new()),
        }
    }

    /// Keys and the aggregates registered so far.
    pub fn into_parts(self) -> (Vec<Expression>, Vec<AggregateCall>) {
        (self.keys, self.aggregates.into_inner())
    }

    fn key_column(&self, expr: &Expression) -> Option<Expression> {
        self.keys.iter().position(|k| k.same_as(expr)).map(|i| {
            Expression::output_column(i, &self.keys[i], expr.id().unwrap_or_default())
                .with_qualifier(expr.qualifier().map(str::to_string))
        })
    }

    fn not_grouped(expr: &Expression) -> NexusError {
        let name = match expr.qualifier() {
            Some(q) => format!("{}.{}", q, expr.sql()),
            None => expr.sql().to_string(),
        };
        NexusError::query(format!(
            "column \"{}\" must appear in the GROUP BY clause or be used in an aggregate function",
            name
        ))
    }
}

impl ColumnScope for GroupScope<'_, '_> {
    fn resolve_column(&self, table: Option<&str>, name: &str) -> NexusResult<Expression> {
        let column = self.base.get_column(table, name)?;
        self.key_column(&column)
            .ok_or_else(|| Self::not_grouped(&column))
    }

    fn resolve_aggregate(&self, call: &FunctionCall) -> NexusResult<Option<Expression>> {
        let func = AggregateFunction::from_name(&call.name, call.star)
            .ok_or_else(|| NexusError::not_supported(format!("{}(*)", call.name)))?;
        let arg = if call.star {
            None
        } else {
            match call.args.as_slice() {
                [arg] if arg.contains_aggregate() => {
                    return Err(NexusError::query("aggregate function calls cannot be nested"))
                }
                [arg] => Some(build_value(self.base, arg)?),
                _ => {
                    return Err(NexusError::query(format!(
                        "function {}() takes exactly one argument",
                        call.name
                    )))
                }
            }
        };
        let data_type = func.result_type(arg.as_ref().map(Expression::data_type))?;
        let hash = Expression::aggregate_hash(func.name(), call.distinct, arg.as_ref());

        let mut aggregates = self.aggregates.borrow_mut();
        let position = match aggregates
            .iter()
            .position(|a| a.matches(func, call.distinct, arg.as_ref()))
        {
            Some(position) => position,
            None => {
                aggregates.push(AggregateCall {
                    func,
                    distinct: call.distinct,
                    arg,
                    data_type: data_type.clone(),
                    hash,
                });
                aggregates.len() - 1
            }
        };
        Ok(Some(Expression::column(
            self.keys.len() + position,
            data_type,
            func.name(),
            hash,
        )))
    }

    fn resolve_expr(&self, expr: &Expr) -> NexusResult<Option<Expression>> {
        // whole expressions may match a key, as in GROUP BY a + b
        if matches!(expr, Expr::Column(_) | Expr::Literal(_)) || expr.contains_aggregate() {
            return Ok(None);
        }
        match build_value(self.base, expr) {
            Ok(built) if !built.referenced_columns().is_empty() => Ok(self.key_column(&built)),
            _ => Ok(None),
        }
    }

    fn resolve_wildcard(&self, column: &Expression) -> NexusResult<Expression> {
        self.key_column(column)
            .ok_or_else(|| Self::not_grouped(column))
    }
}

/// Groups the base rows and computes aggregates per group.
#[derive(Debug)]
pub struct GroupBy<'a> {
    base: Selection<'a>,
    keys: Vec<Expression>,
    aggregates: Vec<AggregateCall>,
    columns: Vec<Expression>,
}

impl<'a> GroupBy<'a> {
    /// Groups `base` by `keys`. Without keys the whole input is one group,
    /// even when it is empty.
    pub fn new(base: Selection<'a>, keys: Vec<Expression>, aggregates: Vec<AggregateCall>) -> Self {
        let mut columns: Vec<Expression> = keys
            .iter()
            .enumerate()
            .map(|(i, key)| {
                let name = key.id().map_or_else(|| format!("{}{}", UNNAMED_COLUMN_PREFIX, i), str::to_string);
                Expression::output_column(i, key, &name)
            })
            .collect();
        columns.extend(aggregates.iter().enumerate().map(|(j, agg)| {
            Expression::column(keys.len() + j, agg.data_type.clone(), agg.func.name(), agg.hash)
        }));
        Self {
            base,
            keys,
            aggregates,
            columns,
        }
    }

    pub(super) fn base(&self) -> &Selection<'a> {
        &self.base
    }

    pub(super) fn columns(&self) -> &[Expression] {
        &self.columns
    }

    pub(super) fn enumerate(&self) -> RowIter<'_> {
        match self.groups() {
            Ok(rows) => Box::new(rows.into_iter().map(Ok)),
            Err(e) => Box::new(std::iter::once(Err(e))),
        }
    }

    fn accumulators(&self) -> Vec<Accumulator> {
        self.aggregates.iter().map(AggregateCall::accumulator).collect()
    }

    fn groups(&self) -> NexusResult<Vec<Arc<Row>>> {
        let mut groups: IndexMap<Vec<Value>, Vec<Accumulator>> = IndexMap::new();
        for row in self.base.enumerate() {
            let row = row?;
            let key = self
                .keys
                .iter()
                .map(|k| k.eval(row.values()))
                .collect::<NexusResult<Vec<_>>>()?;
            let accumulators = groups.entry(key).or_insert_with(|| self.accumulators());
            for (acc, agg) in accumulators.iter_mut().zip(&self.aggregates) {
                let value = match &agg.arg {
                    Some(arg) => arg.eval(row.values())?,
                    None => Value::Null,
                };
                acc.accumulate(&value)?;
            }
        }
        if groups.is_empty() && self.keys.is_empty() {
            groups.insert(Vec::new(), self.accumulators());
        }
        Ok(groups
            .into_iter()
            .map(|(mut values, accumulators)| {
                values.extend(accumulators.iter().map(Accumulator::result));
                Arc::new(Row::new(values))
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse_expr;

    fn base() -> Selection<'static> {
        let columns = vec![
            Expression::column(0, DataType::text(), "k", 1).with_qualifier(Some("t".into())),
            Expression::column(1, DataType::Int, "v", 2).with_qualifier(Some("t".into())),
        ];
        let rows = [("a", Some(1)), ("b", Some(2)), ("a", None), ("a", Some(3))]
            .into_iter()
            .map(|(k, v)| {
                Arc::new(Row::new(vec![
                    Value::Text(k.into()),
                    v.map_or(Value::Null, Value::Int),
                ]))
            })
            .collect();
        Selection::Rows { columns, rows }
    }

    fn bind(scope: &GroupScope<'_, '_>, sql: &str) -> NexusResult<Expression> {
        build_value(scope, &parse_expr(sql).unwrap())
    }

    #[test]
    fn test_group_and_aggregate() {
        let base = base();
        let key = build_value(&base, &parse_expr("k").unwrap()).unwrap();
        let scope = GroupScope::new(&base, vec![key]);
        let k = bind(&scope, "k").unwrap();
        let count = bind(&scope, "count(*)").unwrap();
        let sum = bind(&scope, "sum(v) + 1").unwrap();
        // the same aggregate is registered once
        let again = bind(&scope, "count(*)").unwrap();
        assert_eq!(count.column_index(), again.column_index());

        let (keys, aggregates) = scope.into_parts();
        assert_eq!(aggregates.len(), 2);
        let group = GroupBy::new(base, keys, aggregates);
        let rows: Vec<_> = group.enumerate().collect::<NexusResult<_>>().unwrap();
        let out: Vec<Vec<Value>> = rows
            .iter()
            .map(|r| {
                vec![
                    k.eval(r.values()).unwrap(),
                    count.eval(r.values()).unwrap(),
                    sum.eval(r.values()).unwrap(),
                ]
            })
            .collect();
        assert_eq!(
            out,
            vec![
                vec![Value::Text("a".into()), Value::Int(3), Value::Int(5)],
                vec![Value::Text("b".into()), Value::Int(1), Value::Int(3)],
            ]
        );
    }

    #[test]
    fn test_ungrouped_column_is_rejected() {
        let base = base();
        let key = build_value(&base, &parse_expr("k").unwrap()).unwrap();
        let scope = GroupScope::new(&base, vec![key]);
        let err = bind(&scope, "v").unwrap_err();
        assert!(err.to_string().contains("must appear in the GROUP BY clause"));
        assert!(bind(&scope, "max(v) > 1").is_ok());
    }

    #[test]
    fn test_no_keys_yields_one_row_on_empty_input() {
        let empty = Selection::Rows {
            columns: base().columns().to_vec(),
            rows: Vec::new(),
        };
        let scope = GroupScope::new(&empty, Vec::new());
        let count = bind(&scope, "count(v)").unwrap();
        let (keys, aggregates) = scope.into_parts();
        let group = GroupBy::new(empty, keys, aggregates);
        let rows: Vec<_> = group.enumerate().collect::<NexusResult<_>>().unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(count.eval(rows[0].values()).unwrap(), Value::Int(0));
    }
}
