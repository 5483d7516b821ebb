//! Row filtering, with index selection.
//!
//! A filter first tries to answer its predicate from an index of the
//! table beneath it. Comparisons, `IN`, `BETWEEN`, `LIKE` with a literal
//! prefix and `IS [NOT] NULL` on an indexed expression are answered by key
//! lookups; `AND` uses whichever side has a plan and `OR` needs both.
//! Rows coming out of an index are always checked against the full
//! predicate again.

use std::collections::HashSet;
use std::ops::Bound;

use nexus_common::FLOAT_EQUALITY_DELTA;
use tracing::debug;

use super::{IndexRef, RowIter, Selection};
use crate::expr::{like_prefix, CompareOp, ExprKind, Expression};
use crate::storage::index::IndexRows;
use crate::types::{DataType, Value};

/// Key lookup on the leading expression of an index.
#[derive(Debug, Clone, PartialEq)]
pub enum LookupOp {
    /// `= v`
    Eq(Value),
    /// `<> v`
    Neq(Value),
    /// `> v`
    Gt(Value),
    /// `>= v`
    Ge(Value),
    /// `< v`
    Lt(Value),
    /// `<= v`
    Le(Value),
    /// Between two bounds.
    Range(Bound<Value>, Bound<Value>),
    /// Text keys starting with a prefix.
    Prefix(String),
}

/// A lookup bound to an index.
#[derive(Debug, Clone)]
pub struct IndexLookup<'a> {
    target: IndexRef<'a>,
    op: LookupOp,
}

impl<'a> IndexLookup<'a> {
    fn rows(&self) -> IndexRows<'_> {
        let index = self.target.index;
        match &self.op {
            LookupOp::Eq(v) => index.eq(v),
            LookupOp::Neq(v) => index.neq(v),
            LookupOp::Gt(v) => index.gt(v),
            LookupOp::Ge(v) => index.ge(v),
            LookupOp::Lt(v) => index.lt(v),
            LookupOp::Le(v) => index.le(v),
            LookupOp::Range(low, high) => index.range(low.as_ref(), high.as_ref()),
            LookupOp::Prefix(p) => index.prefix(p),
        }
    }

    /// The lookup operation.
    pub fn op(&self) -> &LookupOp {
        &self.op
    }

    /// Name of the index used.
    pub fn index_name(&self) -> &str {
        self.target.index.name()
    }
}

/// How a filter finds its candidate rows.
#[derive(Debug, Clone)]
pub enum FilterPlan<'a> {
    /// Enumerate the base selection.
    Scan,
    /// The predicate is never true.
    Empty,
    /// One index lookup.
    Index(IndexLookup<'a>),
    /// Several lookups whose results are merged without duplicates.
    Union(Vec<IndexLookup<'a>>),
}

impl<'a> FilterPlan<'a> {
    /// Short name of the strategy.
    pub fn strategy(&self) -> &'static str {
        match self {
            FilterPlan::Scan => "scan",
            FilterPlan::Empty => "empty",
            FilterPlan::Index(_) => "index",
            FilterPlan::Union(_) => "index-union",
        }
    }

    fn rank(&self) -> u8 {
        match self {
            FilterPlan::Empty => 0,
            FilterPlan::Index(_) => 1,
            FilterPlan::Union(_) => 2,
            FilterPlan::Scan => 3,
        }
    }

    fn into_lookups(self) -> Vec<IndexLookup<'a>> {
        match self {
            FilterPlan::Index(lookup) => vec![lookup],
            FilterPlan::Union(lookups) => lookups,
            FilterPlan::Scan | FilterPlan::Empty => Vec::new(),
        }
    }
}

/// `WHERE` / `HAVING`.
#[derive(Debug)]
pub struct Filter<'a> {
    base: Selection<'a>,
    predicate: Expression,
    plan: FilterPlan<'a>,
}

impl<'a> Filter<'a> {
    /// Filters `base` by a boolean predicate bound against it.
    pub fn new(base: Selection<'a>, predicate: Expression) -> Self {
        let plan = plan_for(&base, &predicate);
        debug!(
            strategy = plan.strategy(),
            predicate = %predicate.sql(),
            "filter"
        );
        Self {
            base,
            predicate,
            plan,
        }
    }

    /// Chosen strategy.
    pub fn plan(&self) -> &FilterPlan<'a> {
        &self.plan
    }

    pub(super) fn columns(&self) -> &[Expression] {
        self.base.columns()
    }

    pub(super) fn entropy(&self) -> usize {
        match &self.plan {
            FilterPlan::Empty => 0,
            FilterPlan::Index(IndexLookup {
                target,
                op: LookupOp::Eq(_),
            }) if target.index.is_unique() => 1,
            _ => self.base.entropy(),
        }
    }

    pub(super) fn enumerate(&self) -> RowIter<'_> {
        let predicate = &self.predicate;
        let candidates: RowIter<'_> = match &self.plan {
            FilterPlan::Empty => return Box::new(std::iter::empty()),
            FilterPlan::Scan => self.base.enumerate(),
            FilterPlan::Index(lookup) => {
                lookup.target.table.record_index_lookup();
                Box::new(lookup.rows().cloned().map(Ok))
            }
            FilterPlan::Union(lookups) => {
                let mut seen = HashSet::new();
                Box::new(
                    lookups
                        .iter()
                        .flat_map(|lookup| {
                            lookup.target.table.record_index_lookup();
                            lookup.rows()
                        })
                        .filter(move |row| seen.insert(row.id()))
                        .cloned()
                        .map(Ok),
                )
            }
        };
        Box::new(candidates.filter_map(move |row| match row {
            Ok(row) => match predicate.eval_bool(row.values()) {
                Ok(true) => Some(Ok(row)),
                Ok(false) => None,
                Err(e) => Some(Err(e)),
            },
            Err(e) => Some(Err(e)),
        }))
    }
}

fn plan_for<'a>(base: &Selection<'a>, predicate: &Expression) -> FilterPlan<'a> {
    match predicate.kind() {
        ExprKind::Constant(Value::Bool(true)) => FilterPlan::Scan,
        ExprKind::Constant(_) => FilterPlan::Empty,
        ExprKind::And(left, right) => {
            let left = plan_for(base, left);
            let right = plan_for(base, right);
            if right.rank() < left.rank() {
                right
            } else {
                left
            }
        }
        ExprKind::Or(left, right) => {
            let left = plan_for(base, left);
            if matches!(left, FilterPlan::Scan) {
                return FilterPlan::Scan;
            }
            let right = plan_for(base, right);
            match (left, right) {
                (FilterPlan::Scan, _) | (_, FilterPlan::Scan) => FilterPlan::Scan,
                (FilterPlan::Empty, other) | (other, FilterPlan::Empty) => other,
                (left, right) => {
                    let mut lookups = left.into_lookups();
                    lookups.extend(right.into_lookups());
                    FilterPlan::Union(lookups)
                }
            }
        }
        ExprKind::Compare { op, left, right } => {
            if let (Some(value), Some(target)) = (right.as_constant(), base.get_index(left)) {
                compare_plan(target, *op, value)
            } else if let (Some(value), Some(target)) = (left.as_constant(), base.get_index(right)) {
                compare_plan(target, op.flip(), value)
            } else {
                FilterPlan::Scan
            }
        }
        ExprKind::InList {
            expr,
            list,
            negated: false,
        } => {
            let Some(target) = base.get_index(expr) else {
                return FilterPlan::Scan;
            };
            let mut lookups = Vec::with_capacity(list.len());
            for item in list {
                match item.as_constant() {
                    Some(Value::Null) => {}
                    Some(v) => lookups.push(IndexLookup {
                        target,
                        op: equality_op(target, v),
                    }),
                    None => return FilterPlan::Scan,
                }
            }
            match lookups.len() {
                0 => FilterPlan::Empty,
                1 => lookups.pop().map_or(FilterPlan::Empty, FilterPlan::Index),
                _ => FilterPlan::Union(lookups),
            }
        }
        ExprKind::Between {
            expr,
            low,
            high,
            negated,
        } => {
            let (Some(low), Some(high), Some(target)) =
                (low.as_constant(), high.as_constant(), base.get_index(expr))
            else {
                return FilterPlan::Scan;
            };
            match (low.is_null() || high.is_null(), *negated) {
                (true, false) => FilterPlan::Empty,
                (true, true) => FilterPlan::Scan,
                (false, false) => {
                    if approximate(target, low) || approximate(target, high) {
                        if let (Some((low, _)), Some((_, high))) =
                            (tolerant_bounds(low), tolerant_bounds(high))
                        {
                            return FilterPlan::Index(IndexLookup {
                                target,
                                op: LookupOp::Range(Bound::Included(low), Bound::Included(high)),
                            });
                        }
                    }
                    if low > high {
                        return FilterPlan::Empty;
                    }
                    FilterPlan::Index(IndexLookup {
                        target,
                        op: LookupOp::Range(Bound::Included(low.clone()), Bound::Included(high.clone())),
                    })
                }
                (false, true) => FilterPlan::Union(vec![
                    IndexLookup {
                        target,
                        op: LookupOp::Range(Bound::Unbounded, Bound::Excluded(low.clone())),
                    },
                    IndexLookup {
                        target,
                        op: LookupOp::Range(Bound::Excluded(high.clone()), Bound::Unbounded),
                    },
                ]),
            }
        }
        ExprKind::Like {
            expr,
            pattern,
            case_insensitive: false,
            negated: false,
        } => {
            let (Some(pattern), Some(target)) = (pattern.as_constant(), base.get_index(expr)) else {
                return FilterPlan::Scan;
            };
            let Value::Text(pattern) = pattern else {
                return FilterPlan::Empty;
            };
            if pattern.contains('\\') {
                return FilterPlan::Scan;
            }
            let op = match like_prefix(pattern) {
                (exact, false) => LookupOp::Eq(Value::Text(exact)),
                (prefix, true) if !prefix.is_empty() => LookupOp::Prefix(prefix),
                _ => return FilterPlan::Scan,
            };
            FilterPlan::Index(IndexLookup { target, op })
        }
        ExprKind::IsNull { expr, negated } => match base.get_index(expr) {
            Some(target) => FilterPlan::Index(IndexLookup {
                target,
                op: if *negated {
                    LookupOp::Range(Bound::Unbounded, Bound::Unbounded)
                } else {
                    LookupOp::Eq(Value::Null)
                },
            }),
            None => FilterPlan::Scan,
        },
        _ => FilterPlan::Scan,
    }
}

fn compare_plan<'a>(target: IndexRef<'a>, op: CompareOp, value: &Value) -> FilterPlan<'a> {
    // comparisons with null are never true
    if value.is_null() {
        return FilterPlan::Empty;
    }
    if approximate(target, value) {
        if let Some((low, high)) = tolerant_bounds(value) {
            let value = value.clone();
            let op = match op {
                CompareOp::Eq => LookupOp::Range(Bound::Included(low), Bound::Included(high)),
                CompareOp::NotEq => {
                    return FilterPlan::Union(vec![
                        IndexLookup {
                            target,
                            op: LookupOp::Range(Bound::Unbounded, Bound::Excluded(value.clone())),
                        },
                        IndexLookup {
                            target,
                            op: LookupOp::Range(Bound::Excluded(value), Bound::Unbounded),
                        },
                    ]);
                }
                CompareOp::Gt => LookupOp::Range(Bound::Excluded(value), Bound::Unbounded),
                CompareOp::GtEq => LookupOp::Range(Bound::Included(low), Bound::Unbounded),
                CompareOp::Lt => LookupOp::Range(Bound::Unbounded, Bound::Excluded(value)),
                CompareOp::LtEq => LookupOp::Range(Bound::Unbounded, Bound::Included(high)),
            };
            return FilterPlan::Index(IndexLookup { target, op });
        }
    }
    let value = value.clone();
    let op = match op {
        CompareOp::Eq => LookupOp::Eq(value),
        CompareOp::NotEq => LookupOp::Neq(value),
        CompareOp::Gt => LookupOp::Gt(value),
        CompareOp::GtEq => LookupOp::Ge(value),
        CompareOp::Lt => LookupOp::Lt(value),
        CompareOp::LtEq => LookupOp::Le(value),
    };
    FilterPlan::Index(IndexLookup { target, op })
}

fn equality_op(target: IndexRef<'_>, value: &Value) -> LookupOp {
    match tolerant_bounds(value).filter(|_| approximate(target, value)) {
        Some((low, high)) => LookupOp::Range(Bound::Included(low), Bound::Included(high)),
        None => LookupOp::Eq(value.clone()),
    }
}

/// Whether comparing the leading key with `value` is tolerant, which is
/// the case as soon as either side is a float.
fn approximate(target: IndexRef<'_>, value: &Value) -> bool {
    matches!(value, Value::Float(_))
        || target
            .index
            .leading()
            .is_some_and(|key| matches!(key.data_type(), DataType::Float))
}

/// Candidate bounds around a numeric value. They are wider than the
/// equality tolerance; the predicate recheck trims the surplus.
fn tolerant_bounds(value: &Value) -> Option<(Value, Value)> {
    let v = value.as_f64()?;
    let slack = 2.0 * FLOAT_EQUALITY_DELTA;
    Some((Value::Float(v - slack), Value::Float(v + slack)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::predicate::build_predicate;
    use crate::selection::{ScanPolicy, TableScan};
    use crate::storage::{Catalog, IndexColumn, IndexSpec, SchemaField, TableSchema, Transaction};

    fn setup() -> (Catalog, Transaction) {
        let mut txn = Transaction::new();
        let mut catalog = Catalog::new();
        let schema = TableSchema::new("t")
            .field(SchemaField::new("a", DataType::Int))
            .field(SchemaField::new("b", DataType::text()));
        catalog.create_table(&schema, &txn).unwrap();
        let table = catalog.table_mut("t").unwrap();
        for (a, b) in [(0, "foo"), (1, "foobar"), (50, "bar"), (100, "FOOBAR"), (101, "baz")] {
            table
                .insert(&mut txn, vec![Some(Value::Int(a)), Some(Value::Text(b.into()))])
                .unwrap();
        }
        table
            .insert(&mut txn, vec![Some(Value::Null), Some(Value::Null)])
            .unwrap();
        for name in ["a", "b"] {
            let column = table.column(name).unwrap().expression().clone();
            table
                .create_index(
                    &txn,
                    IndexSpec {
                        name: None,
                        columns: vec![IndexColumn::asc(column)],
                        unique: false,
                        primary: false,
                    },
                )
                .unwrap();
        }
        (catalog, txn)
    }

    fn filter<'a>(catalog: &'a Catalog, txn: &Transaction, sql: &str) -> Filter<'a> {
        let policy = ScanPolicy {
            warn: false,
            forbid: true,
        };
        let base = Selection::Table(TableScan::new(catalog.table("t").unwrap(), txn, policy));
        let expr = crate::parser::parse_expr(sql).unwrap();
        let predicate = build_predicate(&base, &expr).unwrap();
        Filter::new(base, predicate)
    }

    fn column_a(filter: &Filter<'_>) -> Vec<Value> {
        filter
            .enumerate()
            .map(|r| r.unwrap().values()[0].clone())
            .collect()
    }

    #[test]
    fn test_between_uses_range() {
        let (catalog, txn) = setup();
        let f = filter(&catalog, &txn, "a BETWEEN 1 AND 100");
        assert_eq!(f.plan().strategy(), "index");
        assert_eq!(column_a(&f), vec![Value::Int(1), Value::Int(50), Value::Int(100)]);

        let f = filter(&catalog, &txn, "a NOT BETWEEN 1 AND 100");
        assert_eq!(f.plan().strategy(), "index-union");
        assert_eq!(column_a(&f), vec![Value::Int(0), Value::Int(101)]);
    }

    #[test]
    fn test_constant_on_the_left_is_flipped() {
        let (catalog, txn) = setup();
        let f = filter(&catalog, &txn, "50 < a");
        assert_eq!(
            f.plan().clone().into_lookups()[0].op(),
            &LookupOp::Gt(Value::Int(50))
        );
        assert_eq!(column_a(&f), vec![Value::Int(100), Value::Int(101)]);
    }

    #[test]
    fn test_like_prefix_and_null_checks() {
        let (catalog, txn) = setup();
        let f = filter(&catalog, &txn, "b LIKE 'fo%'");
        assert!(matches!(f.plan(), FilterPlan::Index(l) if l.op() == &LookupOp::Prefix("fo".into())));
        assert_eq!(column_a(&f), vec![Value::Int(0), Value::Int(1)]);

        let f = filter(&catalog, &txn, "a IS NULL");
        assert_eq!(column_a(&f), vec![Value::Null]);
        let f = filter(&catalog, &txn, "a = NULL");
        assert_eq!(f.plan().strategy(), "empty");
    }

    #[test]
    fn test_and_or_in() {
        let (catalog, txn) = setup();
        let f = filter(&catalog, &txn, "a IN (0, 101, NULL) AND a + 0 = a");
        assert_eq!(f.plan().strategy(), "index-union");
        assert_eq!(column_a(&f), vec![Value::Int(0), Value::Int(101)]);

        let f = filter(&catalog, &txn, "a = 1 OR b = 'baz'");
        assert_eq!(column_a(&f), vec![Value::Int(1), Value::Int(101)]);
    }

    fn float_setup(indexed: bool) -> (Catalog, Transaction) {
        let mut txn = Transaction::new();
        let mut catalog = Catalog::new();
        let schema = TableSchema::new("t").field(SchemaField::new("a", DataType::Float));
        catalog.create_table(&schema, &txn).unwrap();
        let table = catalog.table_mut("t").unwrap();
        for v in [1.0, 2.0] {
            table.insert(&mut txn, vec![Some(Value::Float(v))]).unwrap();
        }
        if indexed {
            let column = table.column("a").unwrap().expression().clone();
            table
                .create_index(
                    &txn,
                    IndexSpec {
                        name: None,
                        columns: vec![IndexColumn::asc(column)],
                        unique: false,
                        primary: false,
                    },
                )
                .unwrap();
        }
        (catalog, txn)
    }

    #[test]
    fn test_float_lookups_match_tolerant_scan() {
        let (indexed, indexed_txn) = float_setup(true);
        let (plain, plain_txn) = float_setup(false);
        let scan = |sql: &str| {
            let base = Selection::Table(TableScan::new(plain.table("t").unwrap(), &plain_txn, ScanPolicy::default()));
            let expr = crate::parser::parse_expr(sql).unwrap();
            let predicate = build_predicate(&base, &expr).unwrap();
            let mut values = column_a(&Filter::new(base, predicate));
            values.sort();
            values
        };
        for sql in [
            "a = 1.00001",
            "a = 1",
            "a <> 1.00001",
            "a > 0.99999",
            "a >= 1.00001",
            "a < 2.00001",
            "a <= 0.99999",
            "a BETWEEN 1.00001 AND 3",
            "a BETWEEN 1.00001 AND 1.00002",
            "a NOT BETWEEN 1.00001 AND 1.99999",
            "a IN (1.00001, 5)",
        ] {
            let f = filter(&indexed, &indexed_txn, sql);
            assert_ne!(f.plan().strategy(), "scan", "{}", sql);
            let mut values = column_a(&f);
            values.sort();
            assert_eq!(values, scan(sql), "{}", sql);
        }
        let f = filter(&indexed, &indexed_txn, "a = 1.00001");
        assert_eq!(column_a(&f), vec![Value::Float(1.0)]);
    }

    #[test]
    fn test_unindexable_predicate_scans() {
        let (catalog, txn) = setup();
        let f = filter(&catalog, &txn, "a + 1 = 2");
        assert_eq!(f.plan().strategy(), "scan");
        let err = f.enumerate().next().unwrap().unwrap_err();
        assert!(err.to_string().contains("sequential scan"));
    }
}
