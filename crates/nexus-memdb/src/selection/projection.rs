//! Select list.

use std::sync::Arc;

use nexus_common::{NexusError, NexusResult, UNNAMED_COLUMN_PREFIX};

use super::{RowIter, Selection};
use crate::expr::Expression;
use crate::parser::SelectItem;
use crate::predicate::{build_value, ColumnScope};
use crate::row::Row;

/// One output column: its expression over the input rows and its name.
#[derive(Debug, Clone)]
pub struct ProjectionItem {
    /// Value computed from the input row.
    pub expr: Expression,
    /// Output name.
    pub name: String,
}

/// Binds a select list. `*` and `t.*` expand over `wildcard_columns`;
/// expressions without an alias or natural name are called `column<i>`.
pub fn build_items(
    scope: &dyn ColumnScope,
    wildcard_columns: &[Expression],
    items: &[SelectItem],
) -> NexusResult<Vec<ProjectionItem>> {
    let mut out = Vec::with_capacity(items.len());
    for item in items {
        match item {
            SelectItem::Wildcard => {
                for column in wildcard_columns {
                    out.push(wildcard_item(scope, column)?);
                }
            }
            SelectItem::QualifiedWildcard(table) => {
                let mut matched = wildcard_columns
                    .iter()
                    .filter(|c| c.qualifier().is_some_and(|q| q.eq_ignore_ascii_case(table)))
                    .peekable();
                if matched.peek().is_none() {
                    return Err(NexusError::query(format!(
                        "missing FROM-clause entry for table \"{}\"",
                        table
                    )));
                }
                for column in matched {
                    out.push(wildcard_item(scope, column)?);
                }
            }
            SelectItem::Expr { expr, alias } => {
                let expr = build_value(scope, expr)?;
                let name = match (alias, expr.id()) {
                    (Some(alias), _) => alias.clone(),
                    (None, Some(id)) => id.to_string(),
                    (None, None) => format!("{}{}", UNNAMED_COLUMN_PREFIX, out.len()),
                };
                out.push(ProjectionItem { expr, name });
            }
        }
    }
    Ok(out)
}

fn wildcard_item(scope: &dyn ColumnScope, column: &Expression) -> NexusResult<ProjectionItem> {
    let expr = scope.resolve_wildcard(column)?;
    let name = column.id().unwrap_or_default().to_string();
    Ok(ProjectionItem { expr, name })
}

/// Computes the select list for every input row.
#[derive(Debug)]
pub struct Projection<'a> {
    base: Selection<'a>,
    items: Vec<ProjectionItem>,
    columns: Vec<Expression>,
}

impl<'a> Projection<'a> {
    /// Projects `base` through bound items.
    pub fn new(base: Selection<'a>, items: Vec<ProjectionItem>) -> Self {
        let columns = output_columns(&items);
        Self {
            base,
            items,
            columns,
        }
    }

    /// Bound items.
    pub fn items(&self) -> &[ProjectionItem] {
        &self.items
    }

    pub(super) fn base(&self) -> &Selection<'a> {
        &self.base
    }

    pub(super) fn columns(&self) -> &[Expression] {
        &self.columns
    }

    pub(super) fn enumerate(&self) -> RowIter<'_> {
        Box::new(self.base.enumerate().map(move |row| {
            let row = row?;
            let values = self
                .items
                .iter()
                .map(|item| item.expr.eval(row.values()))
                .collect::<NexusResult<Vec<_>>>()?;
            Ok(Arc::new(Row::new(values)))
        }))
    }
}

/// Output columns of a select list. A bare column keeps the qualifier it
/// was reached through, so `ORDER BY t.a` still finds it.
pub fn output_columns(items: &[ProjectionItem]) -> Vec<Expression> {
    items
        .iter()
        .enumerate()
        .map(|(i, item)| {
            let qualifier = item
                .expr
                .column_index()
                .and(item.expr.qualifier())
                .map(str::to_string);
            Expression::output_column(i, &item.expr, &item.name).with_qualifier(qualifier)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::{Expr, Literal};
    use crate::selection::ColumnList;
    use crate::types::{DataType, Value};

    fn columns() -> Vec<Expression> {
        vec![
            Expression::column(0, DataType::Int, "id", 1).with_qualifier(Some("t".into())),
            Expression::column(1, DataType::text(), "name", 2).with_qualifier(Some("t".into())),
        ]
    }

    #[test]
    fn test_names() {
        let cols = columns();
        let items = vec![
            SelectItem::Wildcard,
            SelectItem::new(crate::parser::parse_expr("id + 1").unwrap()),
            SelectItem::Expr {
                expr: Expr::Literal(Literal::Integer(7)),
                alias: Some("seven".into()),
            },
            SelectItem::new(crate::parser::parse_expr("lower(name)").unwrap()),
        ];
        let built = build_items(&ColumnList(&cols), &cols, &items).unwrap();
        let names: Vec<_> = built.iter().map(|i| i.name.as_str()).collect();
        assert_eq!(names, vec!["id", "name", "column2", "seven", "lower"]);

        let outputs = output_columns(&built);
        assert_eq!(outputs[0].qualifier(), Some("t"));
        assert_eq!(outputs[2].qualifier(), None);
        assert_eq!(outputs[3].column_index(), Some(3));
    }

    #[test]
    fn test_projection_rows() {
        let cols = columns();
        let rows = vec![Arc::new(Row::new(vec![Value::Int(1), Value::Text("a".into())]))];
        let base = Selection::Rows {
            columns: cols.clone(),
            rows,
        };
        let items = vec![SelectItem::new(crate::parser::parse_expr("id * 10").unwrap())];
        let built = build_items(&base, &cols, &items).unwrap();
        let projection = Projection::new(base, built);
        let out: Vec<_> = projection.enumerate().collect::<NexusResult<_>>().unwrap();
        assert_eq!(out[0].values(), &[Value::Int(10)]);
    }

    #[test]
    fn test_unknown_qualified_wildcard() {
        let cols = columns();
        let err = build_items(
            &ColumnList(&cols),
            &cols,
            &[SelectItem::QualifiedWildcard("x".into())],
        )
        .unwrap_err();
        assert!(err.to_string().contains("missing FROM-clause entry"));
    }
}
