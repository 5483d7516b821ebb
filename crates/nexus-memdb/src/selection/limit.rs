//! `LIMIT` and `OFFSET`.

use super::{RowIter, Selection};
use crate::expr::Expression;

/// Skips `offset` rows, then yields at most `limit`.
#[derive(Debug)]
pub struct Limit<'a> {
    base: Selection<'a>,
    limit: Option<u64>,
    offset: u64,
}

impl<'a> Limit<'a> {
    /// Wraps `base`.
    pub fn new(base: Selection<'a>, limit: Option<u64>, offset: Option<u64>) -> Self {
        Self {
            base,
            limit,
            offset: offset.unwrap_or(0),
        }
    }

    pub(super) fn columns(&self) -> &[Expression] {
        self.base.columns()
    }

    pub(super) fn entropy(&self) -> usize {
        let remaining = self.base.entropy().saturating_sub(to_usize(self.offset));
        match self.limit {
            Some(limit) => remaining.min(to_usize(limit)),
            None => remaining,
        }
    }

    pub(super) fn enumerate(&self) -> RowIter<'_> {
        // errors are never skipped
        let mut to_skip = self.offset;
        let rows = self.base.enumerate().filter(move |row| {
            if row.is_ok() && to_skip > 0 {
                to_skip -= 1;
                return false;
            }
            true
        });
        match self.limit {
            Some(limit) => Box::new(rows.take(to_usize(limit))),
            None => Box::new(rows),
        }
    }
}

fn to_usize(n: u64) -> usize {
    usize::try_from(n).unwrap_or(usize::MAX)
}
