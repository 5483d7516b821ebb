//! `INNER`, `LEFT` and `RIGHT` joins.
//!
//! Output rows are the left columns followed by the right columns,
//! whichever side drives the loop. The driving (outer) side is the
//! preserved side of an outer join; inner joins drive from whichever side
//! lets the other be probed through an index.

use std::collections::HashMap;
use std::sync::Arc;

use nexus_common::NexusResult;
use tracing::debug;

use super::{ColumnList, IndexRef, RowIter, Selection};
use crate::expr::{CompareOp, ExprKind, Expression};
use crate::parser::{Expr, JoinType};
use crate::predicate::build_predicate;
use crate::row::Row;
use crate::types::{DataType, Value};

/// How the inner side is probed for each outer row.
#[derive(Debug, Clone)]
pub enum JoinStrategy<'a> {
    /// Equality lookup in an index of the inner table.
    IndexLookup {
        /// Index probed.
        target: IndexRef<'a>,
        /// Key computed from the outer row.
        outer_key: Expression,
    },
    /// Inner rows hashed on an equi-join key.
    Hash {
        /// Key computed from the outer row.
        outer_key: Expression,
        /// Key computed from the inner row.
        inner_key: Expression,
    },
    /// Every outer row against every inner row.
    NestedLoop,
}

impl JoinStrategy<'_> {
    /// Short name of the strategy.
    pub fn name(&self) -> &'static str {
        match self {
            JoinStrategy::IndexLookup { .. } => "index",
            JoinStrategy::Hash { .. } => "hash",
            JoinStrategy::NestedLoop => "nested-loop",
        }
    }
}

enum Probe {
    Index,
    Hash(HashMap<Value, Vec<Arc<Row>>>),
    All(Vec<Arc<Row>>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Side {
    Left,
    Right,
}

/// A two-way join.
#[derive(Debug)]
pub struct Join<'a> {
    left: Selection<'a>,
    right: Selection<'a>,
    join_type: JoinType,
    on: Expression,
    columns: Vec<Expression>,
    outer_is_left: bool,
    strategy: JoinStrategy<'a>,
}

impl<'a> Join<'a> {
    /// Joins two selections on a condition bound against both.
    pub fn new(left: Selection<'a>, right: Selection<'a>, join_type: JoinType, on: &Expr) -> NexusResult<Self> {
        let left_width = left.columns().len();
        let mut columns = left.columns().to_vec();
        columns.extend(right.columns().iter().map(|c| c.shifted(left_width)));
        let on = build_predicate(&ColumnList(&columns), on)?;

        let orientations: &[bool] = match join_type {
            JoinType::Left => &[true],
            JoinType::Right => &[false],
            JoinType::Inner if right.entropy() >= left.entropy() => &[true, false],
            JoinType::Inner => &[false, true],
        };

        let mut chosen = None;
        'search: for &outer_is_left in orientations {
            let inner = if outer_is_left { &right } else { &left };
            for (outer_key, inner_key) in equi_keys(&on, left_width, outer_is_left) {
                if let Some(target) = inner.get_index(&inner_key) {
                    chosen = Some((outer_is_left, JoinStrategy::IndexLookup { target, outer_key }));
                    break 'search;
                }
            }
        }
        let (outer_is_left, strategy) = chosen.unwrap_or_else(|| {
            let outer_is_left = orientations[0];
            let strategy = match equi_keys(&on, left_width, outer_is_left).into_iter().next() {
                Some((outer_key, inner_key)) => JoinStrategy::Hash {
                    outer_key,
                    inner_key,
                },
                None => JoinStrategy::NestedLoop,
            };
            (outer_is_left, strategy)
        });
        debug!(
            join = ?join_type,
            strategy = strategy.name(),
            outer = if outer_is_left { "left" } else { "right" },
            on = %on.sql(),
            "join"
        );

        Ok(Self {
            left,
            right,
            join_type,
            on,
            columns,
            outer_is_left,
            strategy,
        })
    }

    /// Chosen strategy.
    pub fn strategy(&self) -> &JoinStrategy<'a> {
        &self.strategy
    }

    pub(super) fn columns(&self) -> &[Expression] {
        &self.columns
    }

    pub(super) fn entropy(&self) -> usize {
        self.left.entropy().max(self.right.entropy())
    }

    fn sides(&self) -> (&Selection<'a>, &Selection<'a>) {
        if self.outer_is_left {
            (&self.left, &self.right)
        } else {
            (&self.right, &self.left)
        }
    }

    pub(super) fn enumerate(&self) -> RowIter<'_> {
        let (outer, inner) = self.sides();
        let probe = match self.probe(inner) {
            Ok(probe) => probe,
            Err(e) => return Box::new(std::iter::once(Err(e))),
        };
        let inner_width = inner.columns().len();
        Box::new(outer.enumerate().flat_map(move |row| {
            match row.and_then(|row| self.matches(&row, &probe, inner_width)) {
                Ok(rows) => rows.into_iter().map(Ok).collect::<Vec<_>>(),
                Err(e) => vec![Err(e)],
            }
        }))
    }

    fn probe(&self, inner: &Selection<'a>) -> NexusResult<Probe> {
        match &self.strategy {
            JoinStrategy::IndexLookup { .. } => Ok(Probe::Index),
            JoinStrategy::Hash { inner_key, .. } => {
                let mut map: HashMap<Value, Vec<Arc<Row>>> = HashMap::new();
                for row in inner.enumerate() {
                    let row = row?;
                    let key = inner_key.eval(row.values())?;
                    if !key.is_null() {
                        map.entry(key).or_default().push(row);
                    }
                }
                Ok(Probe::Hash(map))
            }
            JoinStrategy::NestedLoop => Ok(Probe::All(inner.enumerate().collect::<NexusResult<_>>()?)),
        }
    }

    fn matches(&self, outer_row: &Row, probe: &Probe, inner_width: usize) -> NexusResult<Vec<Arc<Row>>> {
        let mut out = Vec::new();
        match (&self.strategy, probe) {
            (JoinStrategy::IndexLookup { target, outer_key }, _) => {
                let key = outer_key.eval(outer_row.values())?;
                if !key.is_null() {
                    target.table.record_index_lookup();
                    for inner_row in target.index.eq(&key) {
                        self.push_if_match(&mut out, outer_row, inner_row)?;
                    }
                }
            }
            (JoinStrategy::Hash { outer_key, .. }, Probe::Hash(map)) => {
                let key = outer_key.eval(outer_row.values())?;
                for inner_row in map.get(&key).into_iter().flatten() {
                    self.push_if_match(&mut out, outer_row, inner_row)?;
                }
            }
            (_, Probe::All(rows)) => {
                for inner_row in rows {
                    self.push_if_match(&mut out, outer_row, inner_row)?;
                }
            }
            _ => {}
        }
        if out.is_empty() && self.join_type != JoinType::Inner {
            let padding = Row::nulls(inner_width);
            out.push(Arc::new(self.combine(outer_row, &padding)));
        }
        Ok(out)
    }

    fn push_if_match(&self, out: &mut Vec<Arc<Row>>, outer_row: &Row, inner_row: &Row) -> NexusResult<()> {
        let combined = self.combine(outer_row, inner_row);
        if self.on.eval_bool(combined.values())? {
            out.push(Arc::new(combined));
        }
        Ok(())
    }

    fn combine(&self, outer_row: &Row, inner_row: &Row) -> Row {
        if self.outer_is_left {
            Row::concat(outer_row.values(), inner_row.values())
        } else {
            Row::concat(inner_row.values(), outer_row.values())
        }
    }
}

/// Equality conjuncts of `on` relating one side to the other, as
/// `(outer key, inner key)` over each side's own rows.
fn equi_keys(on: &Expression, left_width: usize, outer_is_left: bool) -> Vec<(Expression, Expression)> {
    fn conjuncts<'e>(expr: &'e Expression, out: &mut Vec<&'e Expression>) {
        match expr.kind() {
            ExprKind::And(l, r) => {
                conjuncts(l, out);
                conjuncts(r, out);
            }
            _ => out.push(expr),
        }
    }
    let side = |expr: &Expression| {
        let columns = expr.referenced_columns();
        if columns.is_empty() {
            None
        } else if columns.iter().all(|&i| i < left_width) {
            Some(Side::Left)
        } else if columns.iter().all(|&i| i >= left_width) {
            Some(Side::Right)
        } else {
            None
        }
    };

    let mut found = Vec::new();
    conjuncts(on, &mut found);
    found
        .into_iter()
        .filter_map(|expr| match expr.kind() {
            ExprKind::Compare {
                op: CompareOp::Eq,
                left,
                right,
            } if exact_key(left) && exact_key(right) => match (side(left), side(right)) {
                (Some(Side::Left), Some(Side::Right)) => Some((left, right)),
                (Some(Side::Right), Some(Side::Left)) => Some((right, left)),
                _ => None,
            },
            _ => None,
        })
        .map(|(l, r)| {
            let r = r.map_columns(&|i| i - left_width);
            if outer_is_left {
                (l.clone(), r)
            } else {
                (r, l.clone())
            }
        })
        .collect()
}

/// Whether equality on `expr` is exact, so that hashing and index keys
/// find every match. Float comparisons are tolerant and need a loop.
fn exact_key(expr: &Expression) -> bool {
    let mut ty = expr.data_type();
    while let Some(element) = ty.element_type() {
        ty = element;
    }
    !matches!(ty, DataType::Float)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse_expr;

    fn side(name: &str, ids: &[i64]) -> Selection<'static> {
        Selection::Rows {
            columns: vec![
                Expression::column(0, DataType::Int, "id", 1).with_qualifier(Some(name.into())),
                Expression::column(1, DataType::text(), "v", 2).with_qualifier(Some(name.into())),
            ],
            rows: ids
                .iter()
                .map(|&i| Arc::new(Row::new(vec![Value::Int(i), Value::Text(format!("{}{}", name, i))])))
                .collect(),
        }
    }

    fn run(join: &Join<'_>) -> Vec<Vec<Value>> {
        join.enumerate()
            .map(|r| r.unwrap().values().to_vec())
            .collect()
    }

    #[test]
    fn test_inner_join_hashes_on_equality() {
        let on = parse_expr("a.id = b.id").unwrap();
        let join = Join::new(side("a", &[1, 2, 3]), side("b", &[2, 3, 4]), JoinType::Inner, &on).unwrap();
        assert_eq!(join.strategy().name(), "hash");
        let rows = run(&join);
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0][0], Value::Int(2));
        assert_eq!(rows[0][2], Value::Int(2));
    }

    #[test]
    fn test_left_join_pads_with_nulls() {
        let on = parse_expr("a.id = b.id").unwrap();
        let join = Join::new(side("a", &[1, 2]), side("b", &[2]), JoinType::Left, &on).unwrap();
        let rows = run(&join);
        assert_eq!(
            rows,
            vec![
                vec![Value::Int(1), Value::Text("a1".into()), Value::Null, Value::Null],
                vec![
                    Value::Int(2),
                    Value::Text("a2".into()),
                    Value::Int(2),
                    Value::Text("b2".into())
                ],
            ]
        );
    }

    #[test]
    fn test_right_join_keeps_column_order() {
        let on = parse_expr("a.id < b.id").unwrap();
        let join = Join::new(side("a", &[5]), side("b", &[1, 9]), JoinType::Right, &on).unwrap();
        assert_eq!(join.strategy().name(), "nested-loop");
        let rows = run(&join);
        assert_eq!(rows[0], vec![Value::Null, Value::Null, Value::Int(1), Value::Text("b1".into())]);
        assert_eq!(rows[1][0], Value::Int(5));
        assert_eq!(rows[1][2], Value::Int(9));
    }

    #[test]
    fn test_float_keys_match_within_tolerance() {
        let floats = |name: &str, values: &[f64]| Selection::Rows {
            columns: vec![Expression::column(0, DataType::Float, "x", 1).with_qualifier(Some(name.into()))],
            rows: values
                .iter()
                .map(|&v| Arc::new(Row::new(vec![Value::Float(v)])))
                .collect(),
        };
        let on = parse_expr("a.x = b.x").unwrap();
        let join = Join::new(floats("a", &[1.0, 2.0]), floats("b", &[1.00001, 3.0]), JoinType::Inner, &on)
            .unwrap();
        assert_eq!(join.strategy().name(), "nested-loop");
        assert_eq!(run(&join), vec![vec![Value::Float(1.0), Value::Float(1.00001)]]);
    }

    #[test]
    fn test_unknown_column_in_condition() {
        let on = parse_expr("a.id = c.id").unwrap();
        assert!(Join::new(side("a", &[1]), side("b", &[1]), JoinType::Inner, &on).is_err());
    }
}
