//! SQL expression AST.
//!
//! `sqlparser` expressions are lowered into the closed [`Expr`] enum below.
//! Anything the engine does not interpret is rejected here with
//! `NotSupported`, so later stages can match exhaustively.

use std::fmt;

use nexus_common::{NexusError, NexusResult};
use serde::{Deserialize, Serialize};
use sqlparser::ast as sql_ast;

use super::{ColumnRef, Literal};

/// A SQL expression.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Expr {
    /// A column reference.
    Column(ColumnRef),
    /// A literal value.
    Literal(Literal),
    /// A binary operation (e.g., a + b, x = y).
    Binary {
        /// Left operand.
        left: Box<Expr>,
        /// Operator.
        op: BinaryOperator,
        /// Right operand.
        right: Box<Expr>,
    },
    /// A unary operation (e.g., NOT x, -y).
    Unary {
        /// Operator.
        op: UnaryOperator,
        /// Operand.
        expr: Box<Expr>,
    },
    /// `IS [NOT] NULL`.
    IsNull {
        /// Tested expression.
        expr: Box<Expr>,
        /// `IS NOT NULL`.
        negated: bool,
    },
    /// `[NOT] BETWEEN low AND high`.
    Between {
        /// Expression to test.
        expr: Box<Expr>,
        /// Low bound.
        low: Box<Expr>,
        /// High bound.
        high: Box<Expr>,
        /// Whether this is NOT BETWEEN.
        negated: bool,
    },
    /// `[NOT] IN (list)`.
    InList {
        /// Expression to test.
        expr: Box<Expr>,
        /// List of values.
        list: Vec<Expr>,
        /// Whether this is NOT IN.
        negated: bool,
    },
    /// `[NOT] LIKE` / `[NOT] ILIKE`.
    Like {
        /// Matched text.
        expr: Box<Expr>,
        /// Pattern.
        pattern: Box<Expr>,
        /// NOT LIKE.
        negated: bool,
        /// ILIKE.
        case_insensitive: bool,
    },
    /// `left op ANY(right)`.
    Any {
        /// Left operand.
        left: Box<Expr>,
        /// Comparison operator.
        op: BinaryOperator,
        /// Array operand.
        right: Box<Expr>,
    },
    /// `CAST(expr AS type)` or `expr::type`.
    Cast {
        /// Expression to cast.
        expr: Box<Expr>,
        /// Target type name as written.
        data_type: String,
    },
    /// A function call.
    Function(FunctionCall),
    /// `->` or `->>`.
    JsonAccess {
        /// JSON operand.
        expr: Box<Expr>,
        /// Member name or element index.
        key: Box<Expr>,
        /// `->>` returns text.
        as_text: bool,
    },
    /// Array subscript, `expr[i][j]`.
    Subscript {
        /// Array operand.
        expr: Box<Expr>,
        /// 1-based indexes, outermost first.
        indexes: Vec<Expr>,
    },
    /// `ARRAY[a, b]`.
    Array(Vec<Expr>),
}

impl Expr {
    /// Creates a column expression.
    pub fn column(name: impl Into<String>) -> Self {
        Expr::Column(ColumnRef::new(name))
    }

    /// Creates an integer literal expression.
    pub fn int(value: i64) -> Self {
        Expr::Literal(Literal::Integer(value))
    }

    /// Creates a string literal expression.
    pub fn string(value: impl Into<String>) -> Self {
        Expr::Literal(Literal::String(value.into()))
    }

    /// Builds a binary node, mapping the JSON operators onto their own
    /// variants.
    ///
    /// JSON operators bind tighter than comparisons, but the grammar takes
    /// everything to their right as the operand (`a->>'k' = 'v'` arrives as
    /// `a ->> ('k' = 'v')`). The JSON access is re-attached to the leftmost
    /// operand of the right-hand side.
    fn binary(left: Expr, op: BinaryOperator, right: Expr) -> Expr {
        match op {
            BinaryOperator::JsonGet | BinaryOperator::JsonGetText | BinaryOperator::Contains => {
                let mut left = Some(left);
                right.rebind_leftmost(&mut |key| match left.take() {
                    Some(json) if op == BinaryOperator::Contains => Expr::Binary {
                        left: Box::new(json),
                        op,
                        right: Box::new(key),
                    },
                    Some(json) => Expr::JsonAccess {
                        expr: Box::new(json),
                        key: Box::new(key),
                        as_text: op == BinaryOperator::JsonGetText,
                    },
                    None => key,
                })
            }
            _ => Expr::Binary {
                left: Box::new(left),
                op,
                right: Box::new(right),
            },
        }
    }

    /// Replaces the leftmost operand of a loosely-bound operator chain.
    fn rebind_leftmost(self, wrap: &mut dyn FnMut(Expr) -> Expr) -> Expr {
        match self {
            Expr::Binary { left, op, right } => Expr::Binary {
                left: Box::new(left.rebind_leftmost(wrap)),
                op,
                right,
            },
            Expr::JsonAccess { expr, key, as_text } => Expr::JsonAccess {
                expr: Box::new(expr.rebind_leftmost(wrap)),
                key,
                as_text,
            },
            Expr::Between {
                expr,
                low,
                high,
                negated,
            } => Expr::Between {
                expr: Box::new(expr.rebind_leftmost(wrap)),
                low,
                high,
                negated,
            },
            Expr::InList {
                expr,
                list,
                negated,
            } => Expr::InList {
                expr: Box::new(expr.rebind_leftmost(wrap)),
                list,
                negated,
            },
            Expr::Like {
                expr,
                pattern,
                negated,
                case_insensitive,
            } => Expr::Like {
                expr: Box::new(expr.rebind_leftmost(wrap)),
                pattern,
                negated,
                case_insensitive,
            },
            Expr::IsNull { expr, negated } => Expr::IsNull {
                expr: Box::new(expr.rebind_leftmost(wrap)),
                negated,
            },
            Expr::Any { left, op, right } => Expr::Any {
                left: Box::new(left.rebind_leftmost(wrap)),
                op,
                right,
            },
            other => wrap(other),
        }
    }

    /// Returns true if this is a call to an aggregate function, or
    /// contains one.
    pub fn contains_aggregate(&self) -> bool {
        match self {
            Expr::Function(call) if call.is_aggregate() => true,
            Expr::Function(call) => call.args.iter().any(Expr::contains_aggregate),
            Expr::Column(_) | Expr::Literal(_) => false,
            Expr::Binary { left, right, .. } | Expr::Any { left, right, .. } => {
                left.contains_aggregate() || right.contains_aggregate()
            }
            Expr::Unary { expr, .. } | Expr::IsNull { expr, .. } | Expr::Cast { expr, .. } => {
                expr.contains_aggregate()
            }
            Expr::Between { expr, low, high, .. } => {
                expr.contains_aggregate() || low.contains_aggregate() || high.contains_aggregate()
            }
            Expr::InList { expr, list, .. } => {
                expr.contains_aggregate() || list.iter().any(Expr::contains_aggregate)
            }
            Expr::Like { expr, pattern, .. } => {
                expr.contains_aggregate() || pattern.contains_aggregate()
            }
            Expr::JsonAccess { expr, key, .. } => expr.contains_aggregate() || key.contains_aggregate(),
            Expr::Subscript { expr, indexes } => {
                expr.contains_aggregate() || indexes.iter().any(Expr::contains_aggregate)
            }
            Expr::Array(items) => items.iter().any(Expr::contains_aggregate),
        }
    }

    /// Converts from sqlparser's Expr.
    pub fn from_sql_ast(expr: sql_ast::Expr) -> NexusResult<Self> {
        let boxed = |e: sql_ast::Expr| Expr::from_sql_ast(e).map(Box::new);

        match expr {
            sql_ast::Expr::Identifier(ident) => Ok(Expr::Column(ColumnRef::new(ident.value))),
            sql_ast::Expr::CompoundIdentifier(mut idents) => match idents.len() {
                1 => Ok(Expr::Column(ColumnRef::new(idents.remove(0).value))),
                // schema.table.column keeps the table part
                2 | 3 => {
                    let column = idents.pop().map(|i| i.value).unwrap_or_default();
                    let table = idents.pop().map(|i| i.value).unwrap_or_default();
                    Ok(Expr::Column(ColumnRef::qualified(table, column)))
                }
                _ => Err(NexusError::not_supported(
                    "compound identifier with more than 3 parts",
                )),
            },
            sql_ast::Expr::Value(value) => Ok(Expr::Literal(Literal::from_sql_ast(&value)?)),
            sql_ast::Expr::Nested(inner) => Expr::from_sql_ast(*inner),
            sql_ast::Expr::BinaryOp { left, op, right } => {
                let op = BinaryOperator::from_sql_ast(&op)?;
                Ok(Expr::binary(Expr::from_sql_ast(*left)?, op, Expr::from_sql_ast(*right)?))
            }
            sql_ast::Expr::JsonAccess {
                left,
                operator,
                right,
            } => {
                let op = BinaryOperator::from_symbol(&operator.to_string())?;
                Ok(Expr::binary(Expr::from_sql_ast(*left)?, op, Expr::from_sql_ast(*right)?))
            }
            sql_ast::Expr::UnaryOp { op, expr } => Ok(Expr::Unary {
                op: UnaryOperator::from_sql_ast(&op)?,
                expr: boxed(*expr)?,
            }),
            sql_ast::Expr::IsNull(expr) => Ok(Expr::IsNull {
                expr: boxed(*expr)?,
                negated: false,
            }),
            sql_ast::Expr::IsNotNull(expr) => Ok(Expr::IsNull {
                expr: boxed(*expr)?,
                negated: true,
            }),
            sql_ast::Expr::Between {
                expr,
                negated,
                low,
                high,
            } => Ok(Expr::Between {
                expr: boxed(*expr)?,
                low: boxed(*low)?,
                high: boxed(*high)?,
                negated,
            }),
            sql_ast::Expr::InList {
                expr,
                list,
                negated,
            } => {
                let list: NexusResult<Vec<_>> = list.into_iter().map(Expr::from_sql_ast).collect();
                Ok(Expr::InList {
                    expr: boxed(*expr)?,
                    list: list?,
                    negated,
                })
            }
            sql_ast::Expr::Like {
                negated,
                expr,
                pattern,
                escape_char,
            } => {
                check_like_escape(escape_char)?;
                Ok(Expr::Like {
                    expr: boxed(*expr)?,
                    pattern: boxed(*pattern)?,
                    negated,
                    case_insensitive: false,
                })
            }
            sql_ast::Expr::ILike {
                negated,
                expr,
                pattern,
                escape_char,
            } => {
                check_like_escape(escape_char)?;
                Ok(Expr::Like {
                    expr: boxed(*expr)?,
                    pattern: boxed(*pattern)?,
                    negated,
                    case_insensitive: true,
                })
            }
            sql_ast::Expr::AnyOp {
                left,
                compare_op,
                right,
            } => {
                let op = BinaryOperator::from_sql_ast(&compare_op)?;
                if !op.is_comparison() {
                    return Err(NexusError::not_supported(format!("operator {} ANY", op)));
                }
                Ok(Expr::Any {
                    left: boxed(*left)?,
                    op,
                    right: boxed(*right)?,
                })
            }
            sql_ast::Expr::Cast {
                expr,
                data_type,
                format,
            } => {
                if format.is_some() {
                    return Err(NexusError::not_supported("CAST ... FORMAT"));
                }
                Ok(Expr::Cast {
                    expr: boxed(*expr)?,
                    data_type: data_type.to_string(),
                })
            }
            sql_ast::Expr::TypedString { data_type, value } => Ok(Expr::Cast {
                expr: Box::new(Expr::string(value)),
                data_type: data_type.to_string(),
            }),
            sql_ast::Expr::Function(func) => Ok(Expr::Function(FunctionCall::from_sql_ast(func)?)),
            sql_ast::Expr::ArrayIndex { obj, indexes } => {
                let indexes: NexusResult<Vec<_>> =
                    indexes.into_iter().map(Expr::from_sql_ast).collect();
                let obj = Expr::from_sql_ast(*obj)?;
                // a[1][2] may arrive as nested subscripts
                Ok(match obj {
                    Expr::Subscript {
                        expr,
                        indexes: mut outer,
                    } => {
                        outer.extend(indexes?);
                        Expr::Subscript {
                            expr,
                            indexes: outer,
                        }
                    }
                    obj => Expr::Subscript {
                        expr: Box::new(obj),
                        indexes: indexes?,
                    },
                })
            }
            sql_ast::Expr::Array(array) => {
                let items: NexusResult<Vec<_>> =
                    array.elem.into_iter().map(Expr::from_sql_ast).collect();
                Ok(Expr::Array(items?))
            }
            other => Err(NexusError::not_supported(format!("expression {}", other))),
        }
    }
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expr::Column(col) => write!(f, "{}", col),
            Expr::Literal(lit) => write!(f, "{}", lit),
            Expr::Binary { left, op, right } => write!(f, "({} {} {})", left, op, right),
            Expr::Unary { op, expr } => write!(f, "{} {}", op, expr),
            Expr::IsNull { expr, negated } => {
                if *negated {
                    write!(f, "{} IS NOT NULL", expr)
                } else {
                    write!(f, "{} IS NULL", expr)
                }
            }
            Expr::Between {
                expr,
                low,
                high,
                negated,
            } => {
                let not = if *negated { "NOT " } else { "" };
                write!(f, "{} {}BETWEEN {} AND {}", expr, not, low, high)
            }
            Expr::InList {
                expr,
                list,
                negated,
            } => {
                let list_str: Vec<_> = list.iter().map(|e| e.to_string()).collect();
                let not = if *negated { "NOT " } else { "" };
                write!(f, "{} {}IN ({})", expr, not, list_str.join(", "))
            }
            Expr::Like {
                expr,
                pattern,
                negated,
                case_insensitive,
            } => {
                let not = if *negated { "NOT " } else { "" };
                let like = if *case_insensitive { "ILIKE" } else { "LIKE" };
                write!(f, "{} {}{} {}", expr, not, like, pattern)
            }
            Expr::Any { left, op, right } => write!(f, "{} {} ANY({})", left, op, right),
            Expr::Cast { expr, data_type } => write!(f, "CAST({} AS {})", expr, data_type),
            Expr::Function(func) => write!(f, "{}", func),
            Expr::JsonAccess { expr, key, as_text } => {
                write!(f, "{}{}{}", expr, if *as_text { "->>" } else { "->" }, key)
            }
            Expr::Subscript { expr, indexes } => {
                write!(f, "{}", expr)?;
                for index in indexes {
                    write!(f, "[{}]", index)?;
                }
                Ok(())
            }
            Expr::Array(items) => {
                let items: Vec<_> = items.iter().map(|e| e.to_string()).collect();
                write!(f, "ARRAY[{}]", items.join(", "))
            }
        }
    }
}

/// Binary operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BinaryOperator {
    // Comparison
    /// Equal.
    Eq,
    /// Not equal.
    NotEq,
    /// Less than.
    Lt,
    /// Less than or equal.
    LtEq,
    /// Greater than.
    Gt,
    /// Greater than or equal.
    GtEq,

    // Arithmetic
    /// Addition.
    Plus,
    /// Subtraction.
    Minus,
    /// Multiplication.
    Multiply,
    /// Division.
    Divide,
    /// Modulo.
    Modulo,

    // Logical
    /// Logical AND.
    And,
    /// Logical OR.
    Or,

    // String
    /// String concatenation.
    Concat,

    // JSON
    /// `->`.
    JsonGet,
    /// `->>`.
    JsonGetText,
    /// `@>` containment.
    Contains,
}

impl BinaryOperator {
    /// Returns true if this is a comparison operator.
    pub fn is_comparison(&self) -> bool {
        matches!(
            self,
            BinaryOperator::Eq
                | BinaryOperator::NotEq
                | BinaryOperator::Lt
                | BinaryOperator::LtEq
                | BinaryOperator::Gt
                | BinaryOperator::GtEq
        )
    }

    /// Returns true if this is an arithmetic operator.
    pub fn is_arithmetic(&self) -> bool {
        matches!(
            self,
            BinaryOperator::Plus
                | BinaryOperator::Minus
                | BinaryOperator::Multiply
                | BinaryOperator::Divide
                | BinaryOperator::Modulo
        )
    }

    /// Converts from sqlparser's BinaryOperator.
    pub fn from_sql_ast(op: &sql_ast::BinaryOperator) -> NexusResult<Self> {
        match op {
            sql_ast::BinaryOperator::Eq => Ok(BinaryOperator::Eq),
            sql_ast::BinaryOperator::NotEq => Ok(BinaryOperator::NotEq),
            sql_ast::BinaryOperator::Lt => Ok(BinaryOperator::Lt),
            sql_ast::BinaryOperator::LtEq => Ok(BinaryOperator::LtEq),
            sql_ast::BinaryOperator::Gt => Ok(BinaryOperator::Gt),
            sql_ast::BinaryOperator::GtEq => Ok(BinaryOperator::GtEq),
            sql_ast::BinaryOperator::Plus => Ok(BinaryOperator::Plus),
            sql_ast::BinaryOperator::Minus => Ok(BinaryOperator::Minus),
            sql_ast::BinaryOperator::Multiply => Ok(BinaryOperator::Multiply),
            sql_ast::BinaryOperator::Divide => Ok(BinaryOperator::Divide),
            sql_ast::BinaryOperator::Modulo => Ok(BinaryOperator::Modulo),
            sql_ast::BinaryOperator::And => Ok(BinaryOperator::And),
            sql_ast::BinaryOperator::Or => Ok(BinaryOperator::Or),
            sql_ast::BinaryOperator::StringConcat => Ok(BinaryOperator::Concat),
            // JSON operators are not stable variants across dialects
            other => BinaryOperator::from_symbol(&other.to_string()),
        }
    }

    /// Looks an operator up by its SQL symbol.
    pub fn from_symbol(symbol: &str) -> NexusResult<Self> {
        match symbol.trim() {
            "->" => Ok(BinaryOperator::JsonGet),
            "->>" => Ok(BinaryOperator::JsonGetText),
            "@>" => Ok(BinaryOperator::Contains),
            other => Err(NexusError::not_supported(format!("operator {}", other))),
        }
    }
}

impl fmt::Display for BinaryOperator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BinaryOperator::Eq => write!(f, "="),
            BinaryOperator::NotEq => write!(f, "<>"),
            BinaryOperator::Lt => write!(f, "<"),
            BinaryOperator::LtEq => write!(f, "<="),
            BinaryOperator::Gt => write!(f, ">"),
            BinaryOperator::GtEq => write!(f, ">="),
            BinaryOperator::Plus => write!(f, "+"),
            BinaryOperator::Minus => write!(f, "-"),
            BinaryOperator::Multiply => write!(f, "*"),
            BinaryOperator::Divide => write!(f, "/"),
            BinaryOperator::Modulo => write!(f, "%"),
            BinaryOperator::And => write!(f, "AND"),
            BinaryOperator::Or => write!(f, "OR"),
            BinaryOperator::Concat => write!(f, "||"),
            BinaryOperator::JsonGet => write!(f, "->"),
            BinaryOperator::JsonGetText => write!(f, "->>"),
            BinaryOperator::Contains => write!(f, "@>"),
        }
    }
}

/// Unary operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum UnaryOperator {
    /// Logical NOT.
    Not,
    /// Numeric negation.
    Minus,
    /// Numeric positive (no-op).
    Plus,
}

impl UnaryOperator {
    /// Converts from sqlparser's UnaryOperator.
    pub fn from_sql_ast(op: &sql_ast::UnaryOperator) -> NexusResult<Self> {
        match op {
            sql_ast::UnaryOperator::Not => Ok(UnaryOperator::Not),
            sql_ast::UnaryOperator::Minus => Ok(UnaryOperator::Minus),
            sql_ast::UnaryOperator::Plus => Ok(UnaryOperator::Plus),
            _ => Err(NexusError::not_supported(format!("unary operator {}", op))),
        }
    }
}

impl fmt::Display for UnaryOperator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UnaryOperator::Not => write!(f, "NOT"),
            UnaryOperator::Minus => write!(f, "-"),
            UnaryOperator::Plus => write!(f, "+"),
        }
    }
}

/// A function call expression.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionCall {
    /// Function name, lowercased.
    pub name: String,
    /// Arguments.
    pub args: Vec<Expr>,
    /// Called with `*`, as in `count(*)`.
    pub star: bool,
    /// DISTINCT modifier (for aggregates).
    pub distinct: bool,
}

/// Names of the aggregate functions.
pub const AGGREGATE_FUNCTIONS: &[&str] = &["count", "sum", "min", "max", "avg"];

impl FunctionCall {
    /// Creates a new function call.
    pub fn new(name: impl Into<String>, args: Vec<Expr>) -> Self {
        Self {
            name: name.into().to_lowercase(),
            args,
            star: false,
            distinct: false,
        }
    }

    /// Returns true if this calls an aggregate function.
    pub fn is_aggregate(&self) -> bool {
        AGGREGATE_FUNCTIONS.contains(&self.name.as_str())
    }

    /// Converts from sqlparser's Function.
    pub fn from_sql_ast(func: sql_ast::Function) -> NexusResult<Self> {
        if func.over.is_some() {
            return Err(NexusError::not_supported("window functions"));
        }
        if func.filter.is_some() {
            return Err(NexusError::not_supported("aggregate FILTER clause"));
        }
        if !func.order_by.is_empty() {
            return Err(NexusError::not_supported("ORDER BY in function arguments"));
        }
        if func.null_treatment.is_some() {
            return Err(NexusError::not_supported("IGNORE/RESPECT NULLS"));
        }

        // pg_catalog.lower(x) resolves like lower(x)
        let name = func
            .name
            .0
            .last()
            .map(|ident| ident.value.to_lowercase())
            .unwrap_or_default();

        let mut args = Vec::with_capacity(func.args.len());
        let mut star = false;
        for arg in func.args {
            match arg {
                sql_ast::FunctionArg::Unnamed(sql_ast::FunctionArgExpr::Expr(e)) => {
                    args.push(Expr::from_sql_ast(e)?);
                }
                sql_ast::FunctionArg::Unnamed(sql_ast::FunctionArgExpr::Wildcard) => star = true,
                other => {
                    return Err(NexusError::not_supported(format!(
                        "function argument {}",
                        other
                    )))
                }
            }
        }

        Ok(Self {
            name,
            args,
            star,
            distinct: func.distinct,
        })
    }
}

impl fmt::Display for FunctionCall {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}(", self.name)?;
        if self.distinct {
            write!(f, "DISTINCT ")?;
        }
        if self.star {
            write!(f, "*")?;
        }
        let args: Vec<_> = self.args.iter().map(|a| a.to_string()).collect();
        write!(f, "{})", args.join(", "))
    }
}

/// Only the default backslash escape is understood by the matcher.
fn check_like_escape(escape_char: Option<char>) -> NexusResult<()> {
    match escape_char {
        None | Some('\\') => Ok(()),
        Some(c) => Err(NexusError::not_supported(format!("LIKE ... ESCAPE '{}'", c))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse_expr;

    #[test]
    fn test_lower_comparison() {
        let expr = parse_expr("a.b >= 3").unwrap();
        assert_eq!(
            expr,
            Expr::Binary {
                left: Box::new(Expr::Column(ColumnRef::qualified("a", "b"))),
                op: BinaryOperator::GtEq,
                right: Box::new(Expr::int(3)),
            }
        );
    }

    #[test]
    fn test_nested_parentheses_unwrapped() {
        assert_eq!(parse_expr("((x))").unwrap(), Expr::column("x"));
    }

    #[test]
    fn test_lower_json_and_subscript() {
        match parse_expr("data->>'name'").unwrap() {
            Expr::JsonAccess { as_text, .. } => assert!(as_text),
            other => panic!("unexpected {:?}", other),
        }
        match parse_expr("doc @> '{\"a\": 1}'").unwrap() {
            Expr::Binary { op, .. } => assert_eq!(op, BinaryOperator::Contains),
            other => panic!("unexpected {:?}", other),
        }
        match parse_expr("val[2][1]").unwrap() {
            Expr::Subscript { indexes, .. } => assert_eq!(indexes.len(), 2),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_json_access_binds_tighter_than_comparison() {
        let expr = parse_expr("data->>'k' = 'v' AND x = 1").unwrap();
        let Expr::Binary { left, op, .. } = expr else {
            panic!("expected AND");
        };
        assert_eq!(op, BinaryOperator::And);
        let Expr::Binary { left, op, right } = *left else {
            panic!("expected comparison");
        };
        assert_eq!(op, BinaryOperator::Eq);
        assert!(matches!(*left, Expr::JsonAccess { as_text: true, .. }));
        assert_eq!(*right, Expr::string("v"));
    }

    #[test]
    fn test_lower_like_between_any() {
        assert!(matches!(
            parse_expr("v NOT ILIKE 'x%'").unwrap(),
            Expr::Like {
                negated: true,
                case_insensitive: true,
                ..
            }
        ));
        assert!(matches!(
            parse_expr("v NOT BETWEEN 1 AND 2").unwrap(),
            Expr::Between { negated: true, .. }
        ));
        assert!(matches!(
            parse_expr("v = ANY('{1,2}')").unwrap(),
            Expr::Any {
                op: BinaryOperator::Eq,
                ..
            }
        ));
    }

    #[test]
    fn test_function_call() {
        match parse_expr("COUNT(*)").unwrap() {
            Expr::Function(call) => {
                assert_eq!(call.name, "count");
                assert!(call.star);
                assert!(call.is_aggregate());
            }
            other => panic!("unexpected {:?}", other),
        }
        let e = parse_expr("lower(name) || 'x'").unwrap();
        assert!(!e.contains_aggregate());
        assert!(parse_expr("1 + sum(x)").unwrap().contains_aggregate());
    }

    #[test]
    fn test_unsupported_expression() {
        let err = parse_expr("EXISTS (SELECT 1)").unwrap_err();
        assert_eq!(err.kind(), nexus_common::ErrorKind::NotSupported);
    }
}
