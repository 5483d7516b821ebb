//! `ORDER BY`.

use std::cmp::Ordering;
use std::sync::Arc;

use nexus_common::NexusResult;

use super::{RowIter, Selection};
use crate::expr::Expression;
use crate::row::Row;
use crate::types::Value;

/// One sort key.
#[derive(Debug, Clone)]
pub struct SortKey {
    /// Expression over the input rows.
    pub expr: Expression,
    /// `DESC`.
    pub descending: bool,
    /// `NULLS LAST`. Nulls come first otherwise, in both directions.
    pub nulls_last: bool,
}

impl SortKey {
    fn compare(&self, a: &Value, b: &Value) -> Ordering {
        match (a.is_null(), b.is_null()) {
            (true, true) => Ordering::Equal,
            (true, false) if self.nulls_last => Ordering::Greater,
            (true, false) => Ordering::Less,
            (false, true) if self.nulls_last => Ordering::Less,
            (false, true) => Ordering::Greater,
            // total order; the float tolerance of comparisons is not transitive
            (false, false) => {
                let ord = a.cmp(b);
                if self.descending {
                    ord.reverse()
                } else {
                    ord
                }
            }
        }
    }
}

/// Stable sort of the base rows.
#[derive(Debug)]
pub struct OrderBy<'a> {
    base: Selection<'a>,
    keys: Vec<SortKey>,
}

impl<'a> OrderBy<'a> {
    /// Sorts `base` by `keys`, most significant first.
    pub fn new(base: Selection<'a>, keys: Vec<SortKey>) -> Self {
        Self { base, keys }
    }

    pub(super) fn base(&self) -> &Selection<'a> {
        &self.base
    }

    pub(super) fn columns(&self) -> &[Expression] {
        self.base.columns()
    }

    pub(super) fn enumerate(&self) -> RowIter<'_> {
        match self.sorted() {
            Ok(rows) => Box::new(rows.into_iter().map(Ok)),
            Err(e) => Box::new(std::iter::once(Err(e))),
        }
    }

    fn sorted(&self) -> NexusResult<Vec<Arc<Row>>> {
        let mut keyed = Vec::new();
        for row in self.base.enumerate() {
            let row = row?;
            let key = self
                .keys
                .iter()
                .map(|k| k.expr.eval(row.values()))
                .collect::<NexusResult<Vec<_>>>()?;
            keyed.push((key, row));
        }
        keyed.sort_by(|(a, _), (b, _)| {
            self.keys
                .iter()
                .zip(a.iter().zip(b))
                .map(|(key, (a, b))| key.compare(a, b))
                .find(|ord| *ord != Ordering::Equal)
                .unwrap_or(Ordering::Equal)
        });
        Ok(keyed.into_iter().map(|(_, row)| row).collect())
    }
}
