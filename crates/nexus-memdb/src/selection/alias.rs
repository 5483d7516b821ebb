//! `FROM t AS x` and `FROM (SELECT ...) AS x`.

use super::{RowIter, Selection};
use crate::expr::Expression;

/// Exposes the base columns under another qualifier.
#[derive(Debug)]
pub struct Alias<'a> {
    base: Selection<'a>,
    name: String,
    columns: Vec<Expression>,
}

impl<'a> Alias<'a> {
    /// Requalifies every column of `base` as `name`.
    pub fn new(base: Selection<'a>, name: impl Into<String>) -> Self {
        let name = name.into();
        let columns = base
            .columns()
            .iter()
            .map(|c| c.clone().with_qualifier(Some(name.clone())))
            .collect();
        Self {
            base,
            name,
            columns,
        }
    }

    /// Alias name.
    pub fn name(&self) -> &str {
        &self.name
    }

    pub(super) fn base(&self) -> &Selection<'a> {
        &self.base
    }

    pub(super) fn columns(&self) -> &[Expression] {
        &self.columns
    }

    pub(super) fn enumerate(&self) -> RowIter<'_> {
        self.base.enumerate()
    }
}
