//! B-tree index.
//!
//! Keys are the values of the index expressions, compared lexicographically
//! with nulls first. Each key maps to a bucket of rows keyed by row id, kept
//! in insertion order. Lookups take a value for the first key position, so
//! a composite index also serves lookups on its leading expression.
//!
//! The index itself does not enforce uniqueness or nullability; the table
//! calls [`BIndex::check`] before [`BIndex::add`].

use std::collections::{BTreeMap, HashMap};
use std::ops::Bound;
use std::sync::Arc;

use indexmap::IndexMap;
use nexus_common::{NexusError, NexusResult};
use serde::Serialize;

use crate::expr::Expression;
use crate::row::{Row, RowId};
use crate::types::Value;

/// Composite index key.
pub type IndexKey = Vec<Value>;

type Bucket = IndexMap<RowId, Arc<Row>>;

/// Lazily produced index rows.
pub type IndexRows<'a> = Box<dyn Iterator<Item = &'a Arc<Row>> + 'a>;

/// One indexed expression with its declared ordering.
#[derive(Debug, Clone)]
pub struct IndexColumn {
    /// Indexed expression, bound to the table's columns.
    pub expression: Expression,
    /// Declared `DESC`.
    pub descending: bool,
    /// Declared `NULLS LAST`.
    pub nulls_last: bool,
}

impl IndexColumn {
    /// Ascending, nulls first.
    pub fn asc(expression: Expression) -> Self {
        Self {
            expression,
            descending: false,
            nulls_last: false,
        }
    }
}

/// Public description of an index.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IndexInfo {
    /// Index name.
    pub name: String,
    /// SQL of each indexed expression.
    pub expressions: Vec<String>,
    /// `DESC` flag per expression.
    pub descending: Vec<bool>,
    /// `NULLS LAST` flag per expression.
    pub nulls_last: Vec<bool>,
    /// Unique index.
    pub unique: bool,
    /// Backs the primary key.
    pub primary: bool,
}

/// An ordered index over table rows.
#[derive(Debug)]
pub struct BIndex {
    name: String,
    columns: Vec<IndexColumn>,
    unique: bool,
    not_null: bool,
    primary: bool,
    signature: Vec<u64>,
    tree: BTreeMap<IndexKey, Bucket>,
    by_id: HashMap<RowId, IndexKey>,
}

impl BIndex {
    /// Creates an empty index.
    pub fn new(name: impl Into<String>, columns: Vec<IndexColumn>, unique: bool, primary: bool) -> Self {
        let mut signature: Vec<u64> = columns.iter().map(|c| c.expression.hash()).collect();
        signature.sort_unstable();
        Self {
            name: name.into(),
            signature,
            columns,
            unique: unique || primary,
            not_null: primary,
            primary,
            tree: BTreeMap::new(),
            by_id: HashMap::new(),
        }
    }

    /// Index name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Indexed expressions in key order.
    pub fn expressions(&self) -> impl Iterator<Item = &Expression> + '_ {
        self.columns.iter().map(|c| &c.expression)
    }

    /// Sorted structural hashes of the indexed expressions. Two indexes
    /// with the same signature cover the same expressions.
    pub fn signature(&self) -> &[u64] {
        &self.signature
    }

    /// Leading expression, the one lookups are keyed on.
    pub fn leading(&self) -> Option<&Expression> {
        self.columns.first().map(|c| &c.expression)
    }

    /// Number of key positions.
    pub fn width(&self) -> usize {
        self.columns.len()
    }

    /// Whether keys must be unique.
    pub fn is_unique(&self) -> bool {
        self.unique
    }

    /// Whether this index backs the primary key.
    pub fn is_primary(&self) -> bool {
        self.primary
    }

    /// Number of indexed rows.
    pub fn len(&self) -> usize {
        self.by_id.len()
    }

    /// Whether no row is indexed.
    pub fn is_empty(&self) -> bool {
        self.by_id.is_empty()
    }

    /// Public description.
    pub fn info(&self) -> IndexInfo {
        IndexInfo {
            name: self.name.clone(),
            expressions: self.columns.iter().map(|c| c.expression.sql().to_string()).collect(),
            descending: self.columns.iter().map(|c| c.descending).collect(),
            nulls_last: self.columns.iter().map(|c| c.nulls_last).collect(),
            unique: self.unique,
            primary: self.primary,
        }
    }

    /// Evaluates the key of a row.
    pub fn key_of(&self, row: &Row) -> NexusResult<IndexKey> {
        self.columns
            .iter()
            .map(|c| c.expression.eval(row.values()))
            .collect()
    }

    /// Validates a row against the index constraints without changing
    /// anything. A row never conflicts with itself.
    pub fn check(&self, row: &Row, key: &[Value]) -> NexusResult<()> {
        if self.not_null {
            if let Some(position) = key.iter().position(Value::is_null) {
                let column = self.columns[position].expression.sql();
                return Err(NexusError::ConstraintViolation {
                    constraint: self.name.clone(),
                    message: format!(
                        "null value in column \"{}\" violates not-null constraint",
                        column
                    ),
                });
            }
        }

        // nulls never collide
        if !self.unique || key.iter().any(Value::is_null) {
            return Ok(());
        }
        let own = row.id();
        let conflict = self
            .tree
            .get(key)
            .map_or(false, |bucket| bucket.keys().any(|id| Some(*id) != own));
        if conflict {
            let rendered: Vec<String> = key.iter().map(ToString::to_string).collect();
            let columns: Vec<&str> = self.columns.iter().map(|c| c.expression.sql()).collect();
            return Err(NexusError::ConstraintViolation {
                constraint: self.name.clone(),
                message: format!(
                    "duplicate key value violates unique constraint \"{}\": ({})=({})",
                    self.name,
                    columns.join(", "),
                    rendered.join(", ")
                ),
            });
        }
        Ok(())
    }

    /// Indexes a stored row under a precomputed key. Adding an already
    /// indexed row is a no-op.
    pub fn add(&mut self, row: &Arc<Row>, key: IndexKey) -> NexusResult<()> {
        let id = row
            .id()
            .ok_or_else(|| NexusError::internal("cannot index a row without identity"))?;
        if self.by_id.contains_key(&id) {
            return Ok(());
        }
        self.tree.entry(key.clone()).or_default().insert(id, row.clone());
        self.by_id.insert(id, key);
        Ok(())
    }

    /// Removes a row, dropping its bucket once empty.
    pub fn delete(&mut self, id: RowId) {
        if let Some(key) = self.by_id.remove(&id) {
            if let Some(bucket) = self.tree.get_mut(&key) {
                bucket.shift_remove(&id);
                if bucket.is_empty() {
                    self.tree.remove(&key);
                }
            }
        }
    }

    // ---------------------------------------------------------------------
    // Lookups on the leading key position
    // ---------------------------------------------------------------------

    /// Rows whose leading key equals `value`, ascending.
    pub fn eq<'a>(&'a self, value: &'a Value) -> IndexRows<'a> {
        Box::new(
            self.tree
                .range::<IndexKey, _>((Bound::Included(vec![value.clone()]), Bound::Unbounded))
                .take_while(move |(key, _)| leading(key) == Some(value))
                .flat_map(|(_, bucket)| bucket.values()),
        )
    }

    /// Rows whose leading key is greater than `value`, ascending.
    pub fn gt<'a>(&'a self, value: &'a Value) -> IndexRows<'a> {
        Box::new(
            self.tree
                .range::<IndexKey, _>((Bound::Included(vec![value.clone()]), Bound::Unbounded))
                .skip_while(move |(key, _)| leading(key) == Some(value))
                .flat_map(|(_, bucket)| bucket.values()),
        )
    }

    /// Rows whose leading key is at least `value`, ascending.
    pub fn ge<'a>(&'a self, value: &'a Value) -> IndexRows<'a> {
        Box::new(
            self.tree
                .range::<IndexKey, _>((Bound::Included(vec![value.clone()]), Bound::Unbounded))
                .flat_map(|(_, bucket)| bucket.values()),
        )
    }

    /// Rows whose leading key is below `value`, descending. Null keys
    /// are never returned.
    pub fn lt<'a>(&'a self, value: &'a Value) -> IndexRows<'a> {
        Box::new(
            self.tree
                .range::<IndexKey, _>((Bound::Unbounded, Bound::Excluded(vec![value.clone()])))
                .rev()
                .take_while(|(key, _)| leading(key).map_or(false, |v| !v.is_null()))
                .flat_map(|(_, bucket)| bucket.values().rev()),
        )
    }

    /// Rows whose leading key is at most `value`, descending.
    pub fn le<'a>(&'a self, value: &'a Value) -> IndexRows<'a> {
        Box::new(
            self.tree
                .iter()
                .rev()
                .skip_while(move |(key, _)| leading(key).map_or(false, |v| v > value))
                .take_while(|(key, _)| leading(key).map_or(false, |v| !v.is_null()))
                .flat_map(|(_, bucket)| bucket.values().rev()),
        )
    }

    /// Rows whose leading key differs from `value`: ascending below it,
    /// then descending above it.
    pub fn neq<'a>(&'a self, value: &'a Value) -> IndexRows<'a> {
        let below = self
            .tree
            .range::<IndexKey, _>((Bound::Unbounded, Bound::Excluded(vec![value.clone()])))
            .skip_while(|(key, _)| leading(key).map_or(true, Value::is_null));
        let above = self
            .tree
            .iter()
            .rev()
            .take_while(move |(key, _)| leading(key).map_or(false, |v| v > value));
        Box::new(below.chain(above).flat_map(|(_, bucket)| bucket.values()))
    }

    /// Rows whose leading key lies within the bounds, ascending.
    pub fn range<'a>(&'a self, lower: Bound<&'a Value>, upper: Bound<&'a Value>) -> IndexRows<'a> {
        if let (Bound::Included(low) | Bound::Excluded(low), Bound::Included(high) | Bound::Excluded(high)) =
            (lower, upper)
        {
            if low > high {
                return Box::new(std::iter::empty());
            }
        }
        let start = match lower {
            Bound::Included(v) | Bound::Excluded(v) => Bound::Included(vec![v.clone()]),
            Bound::Unbounded => Bound::Unbounded,
        };
        let end = match upper {
            Bound::Excluded(v) => Bound::Excluded(vec![v.clone()]),
            _ => Bound::Unbounded,
        };
        Box::new(
            self.tree
                .range::<IndexKey, _>((start, end))
                .skip_while(move |(key, _)| match (lower, leading(key)) {
                    (_, None) => true,
                    (_, Some(v)) if v.is_null() => true,
                    (Bound::Excluded(low), Some(v)) => v == low,
                    _ => false,
                })
                .take_while(move |(key, _)| match (upper, leading(key)) {
                    (Bound::Included(high), Some(v)) => v <= high,
                    _ => true,
                })
                .flat_map(|(_, bucket)| bucket.values()),
        )
    }

    /// Rows whose leading text key starts with `prefix`, ascending.
    pub fn prefix<'a>(&'a self, prefix: &'a str) -> IndexRows<'a> {
        Box::new(
            self.tree
                .range::<IndexKey, _>((
                    Bound::Included(vec![Value::Text(prefix.to_string())]),
                    Bound::Unbounded,
                ))
                .take_while(move |(key, _)| match leading(key) {
                    Some(Value::Text(s)) => s.starts_with(prefix),
                    _ => false,
                })
                .flat_map(|(_, bucket)| bucket.values()),
        )
    }

    /// Every indexed row in key order.
    pub fn all(&self) -> IndexRows<'_> {
        Box::new(self.tree.values().flat_map(|bucket| bucket.values()))
    }
}

fn leading(key: &IndexKey) -> Option<&Value> {
    key.first()
}
