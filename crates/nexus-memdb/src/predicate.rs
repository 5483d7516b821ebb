//! Binding parsed expressions to typed ones.
//!
//! [`build_value`] walks a parsed [`Expr`] and produces an [`Expression`],
//! resolving column names and aggregate calls through a [`ColumnScope`].
//! Every selection is a scope; the group-by stage overrides the hooks so
//! that select items are rewritten in terms of group keys and aggregates.

use nexus_common::{NexusError, NexusResult};

use crate::expr::{ArithmeticOp, CompareOp, Expression};
use crate::parser::{BinaryOperator, Expr, FunctionCall, Literal, UnaryOperator};
use crate::types::{DataType, Value};

/// Something column references can be resolved against.
pub trait ColumnScope {
    /// Resolves a possibly qualified column name.
    fn resolve_column(&self, table: Option<&str>, name: &str) -> NexusResult<Expression>;

    /// Resolves an aggregate call. `None` means aggregates are not
    /// allowed in this context.
    fn resolve_aggregate(&self, _call: &FunctionCall) -> NexusResult<Option<Expression>> {
        Ok(None)
    }

    /// Resolves a whole sub-expression before it is decomposed.
    fn resolve_expr(&self, _expr: &Expr) -> NexusResult<Option<Expression>> {
        Ok(None)
    }

    /// Resolves one column of a `*` expansion.
    fn resolve_wildcard(&self, column: &Expression) -> NexusResult<Expression> {
        Ok(column.clone())
    }
}

/// Scope with no columns, for constant contexts such as column defaults.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoColumns;

impl ColumnScope for NoColumns {
    fn resolve_column(&self, table: Option<&str>, name: &str) -> NexusResult<Expression> {
        Err(NexusError::ColumnNotFound {
            column: match table {
                Some(t) => format!("{}.{}", t, name),
                None => name.to_string(),
            },
        })
    }
}

/// Builds a typed expression from a parsed one.
pub fn build_value(scope: &dyn ColumnScope, expr: &Expr) -> NexusResult<Expression> {
    if let Some(resolved) = scope.resolve_expr(expr)? {
        return Ok(resolved);
    }
    let build = |e: &Expr| build_value(scope, e);

    match expr {
        Expr::Column(col) => scope.resolve_column(col.table.as_deref(), &col.column),
        Expr::Literal(lit) => Ok(literal(lit)),
        Expr::Binary { left, op, right } => build_binary(scope, left, *op, right),
        Expr::Unary { op, expr: inner } => {
            let inner = build(inner)?;
            match op {
                UnaryOperator::Not => Expression::not(inner),
                UnaryOperator::Minus => Expression::negate(inner),
                UnaryOperator::Plus if inner.data_type().is_numeric() => Ok(inner),
                UnaryOperator::Plus => Err(NexusError::query(format!(
                    "operator does not exist: + {}",
                    inner.data_type()
                ))),
            }
        }
        Expr::IsNull {
            expr: inner,
            negated,
        } => Expression::is_null(build(inner)?, *negated),
        Expr::Between {
            expr: inner,
            low,
            high,
            negated,
        } => Expression::between(build(inner)?, build(low)?, build(high)?, *negated),
        Expr::InList {
            expr: inner,
            list,
            negated,
        } => {
            let list = list.iter().map(build).collect::<NexusResult<Vec<_>>>()?;
            Expression::in_list(build(inner)?, list, *negated)
        }
        Expr::Like {
            expr: inner,
            pattern,
            negated,
            case_insensitive,
        } => Expression::like(build(inner)?, build(pattern)?, *case_insensitive, *negated),
        Expr::Any { left, op, right } => {
            let op = CompareOp::from_operator(*op)
                .ok_or_else(|| NexusError::not_supported(format!("{} ANY", op)))?;
            Expression::any(op, build(left)?, build(right)?)
        }
        Expr::Cast {
            expr: inner,
            data_type,
        } => {
            let (ty, serial) = DataType::from_sql_name(data_type)?;
            if serial {
                return Err(NexusError::not_supported(format!("cast to {}", data_type)));
            }
            build(inner)?.cast(&ty)
        }
        Expr::Function(call) => build_function(scope, call),
        Expr::JsonAccess {
            expr: inner,
            key,
            as_text,
        } => Expression::json_member(build(inner)?, build(key)?, *as_text),
        Expr::Subscript {
            expr: inner,
            indexes,
        } => {
            let indexes = indexes.iter().map(build).collect::<NexusResult<Vec<_>>>()?;
            Expression::subscript(build(inner)?, indexes)
        }
        Expr::Array(items) => {
            let items = items.iter().map(build).collect::<NexusResult<Vec<_>>>()?;
            Expression::array(items)
        }
    }
}

/// Builds a typed boolean predicate.
pub fn build_predicate(scope: &dyn ColumnScope, expr: &Expr) -> NexusResult<Expression> {
    let built = build_value(scope, expr)?;
    match built.data_type() {
        DataType::Bool | DataType::Null => built.convert(&DataType::Bool),
        other => Err(NexusError::query(format!(
            "argument of WHERE must be type boolean, not type {}",
            other
        ))),
    }
}

fn literal(lit: &Literal) -> Expression {
    match lit {
        Literal::Null => Expression::constant(Value::Null),
        Literal::Boolean(b) => Expression::constant(Value::Bool(*b)),
        Literal::Integer(i) => Expression::constant(Value::Int(*i)),
        Literal::Float(f) => Expression::constant(Value::Float(*f)),
        Literal::String(s) => Expression::constant(Value::Text(s.clone())),
    }
}

fn build_binary(
    scope: &dyn ColumnScope,
    left: &Expr,
    op: BinaryOperator,
    right: &Expr,
) -> NexusResult<Expression> {
    let left = build_value(scope, left)?;
    let right = build_value(scope, right)?;

    if let Some(cmp) = CompareOp::from_operator(op) {
        return Expression::compare(cmp, left, right);
    }
    if let Some(arith) = ArithmeticOp::from_operator(op) {
        return Expression::arithmetic(arith, left, right);
    }
    match op {
        BinaryOperator::And => Expression::and(left, right),
        BinaryOperator::Or => Expression::or(left, right),
        BinaryOperator::Concat => Expression::concat(left, right),
        BinaryOperator::JsonGet => Expression::json_member(left, right, false),
        BinaryOperator::JsonGetText => Expression::json_member(left, right, true),
        BinaryOperator::Contains => Expression::json_contains(left, right),
        other => Err(NexusError::not_supported(format!("operator {}", other))),
    }
}

fn build_function(scope: &dyn ColumnScope, call: &FunctionCall) -> NexusResult<Expression> {
    if call.is_aggregate() {
        return scope
            .resolve_aggregate(call)?
            .ok_or_else(|| NexusError::query("aggregate functions are not allowed here"));
    }
    if call.star || call.distinct {
        return Err(NexusError::not_supported(format!(
            "{}({}...)",
            call.name,
            if call.star { "*" } else { "DISTINCT " }
        )));
    }
    let args = call
        .args
        .iter()
        .map(|a| build_value(scope, a))
        .collect::<NexusResult<Vec<_>>>()?;
    Expression::function(&call.name, args)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse_expr;

    struct TwoColumns;

    impl ColumnScope for TwoColumns {
        fn resolve_column(&self, _table: Option<&str>, name: &str) -> NexusResult<Expression> {
            match name {
                "id" => Ok(Expression::column(0, DataType::Int, "id", 1)),
                "name" => Ok(Expression::column(1, DataType::text(), "name", 2)),
                _ => NoColumns.resolve_column(None, name),
            }
        }
    }

    fn eval(sql: &str, row: &[Value]) -> Value {
        build_value(&TwoColumns, &parse_expr(sql).unwrap())
            .unwrap()
            .eval(row)
            .unwrap()
    }

    #[test]
    fn test_build_and_eval() {
        let row = [Value::Int(5), Value::from("foo")];
        assert_eq!(eval("id + 1", &row), Value::Int(6));
        assert_eq!(eval("id BETWEEN 1 AND 10", &row), Value::Bool(true));
        assert_eq!(eval("name LIKE 'f%'", &row), Value::Bool(true));
        assert_eq!(eval("upper(name)", &row), Value::from("FOO"));
        assert_eq!(eval("name || '!'", &row), Value::from("foo!"));
        assert_eq!(eval("id::text", &row), Value::from("5"));
        assert_eq!(eval("id = ANY('{4,5}')", &row), Value::Bool(true));
    }

    #[test]
    fn test_aggregates_rejected_without_group_scope() {
        let err = build_value(&TwoColumns, &parse_expr("count(*)").unwrap()).unwrap_err();
        assert_eq!(err.to_string(), "aggregate functions are not allowed here");
    }

    #[test]
    fn test_unknown_column_and_function() {
        let err = build_value(&TwoColumns, &parse_expr("missing + 1").unwrap()).unwrap_err();
        assert!(matches!(err, NexusError::ColumnNotFound { .. }));

        let err = build_value(&NoColumns, &parse_expr("frobnicate(1)").unwrap()).unwrap_err();
        assert_eq!(err.kind(), nexus_common::ErrorKind::NotSupported);
    }

    #[test]
    fn test_predicate_must_be_boolean() {
        let err = build_predicate(&TwoColumns, &parse_expr("id + 1").unwrap()).unwrap_err();
        assert!(err.to_string().contains("must be type boolean"));
        assert!(build_predicate(&TwoColumns, &parse_expr("NULL").unwrap()).is_ok());
    }

    #[test]
    fn test_serial_cast_not_supported() {
        let err = build_value(&NoColumns, &parse_expr("1::serial").unwrap()).unwrap_err();
        assert_eq!(err.kind(), nexus_common::ErrorKind::NotSupported);
    }
}
