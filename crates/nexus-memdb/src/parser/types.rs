//! Small AST building blocks shared by expressions and statements.

use std::fmt;

use nexus_common::{NexusError, NexusResult};
use serde::{Deserialize, Serialize};
use sqlparser::ast as sql_ast;

use super::Expr;

/// A literal value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Literal {
    /// NULL literal.
    Null,
    /// Boolean literal.
    Boolean(bool),
    /// Integer literal.
    Integer(i64),
    /// Floating-point literal.
    Float(f64),
    /// String literal.
    String(String),
}

impl Literal {
    /// Converts from sqlparser's Value.
    pub fn from_sql_ast(value: &sql_ast::Value) -> NexusResult<Self> {
        match value {
            sql_ast::Value::Null => Ok(Literal::Null),
            sql_ast::Value::Boolean(b) => Ok(Literal::Boolean(*b)),
            sql_ast::Value::Number(n, _) => {
                // Try to parse as integer first, then as float
                if let Ok(i) = n.parse::<i64>() {
                    Ok(Literal::Integer(i))
                } else if let Ok(f) = n.parse::<f64>() {
                    Ok(Literal::Float(f))
                } else {
                    Err(NexusError::query(format!("invalid number: {}", n)))
                }
            }
            sql_ast::Value::SingleQuotedString(s)
            | sql_ast::Value::EscapedStringLiteral(s)
            | sql_ast::Value::DoubleQuotedString(s) => Ok(Literal::String(s.clone())),
            _ => Err(NexusError::not_supported(format!("literal {}", value))),
        }
    }
}

impl fmt::Display for Literal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Literal::Null => write!(f, "NULL"),
            Literal::Boolean(b) => write!(f, "{}", if *b { "TRUE" } else { "FALSE" }),
            Literal::Integer(i) => write!(f, "{}", i),
            Literal::Float(v) => write!(f, "{}", v),
            Literal::String(s) => write!(f, "'{}'", s.replace('\'', "''")),
        }
    }
}

/// Join types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum JoinType {
    /// INNER JOIN.
    Inner,
    /// LEFT OUTER JOIN.
    Left,
    /// RIGHT OUTER JOIN.
    Right,
}

impl JoinType {
    /// Converts from sqlparser's JoinOperator, returning the ON condition.
    pub fn from_sql_ast(op: sql_ast::JoinOperator) -> NexusResult<(Self, Expr)> {
        let (join_type, constraint) = match op {
            sql_ast::JoinOperator::Inner(c) => (JoinType::Inner, c),
            sql_ast::JoinOperator::LeftOuter(c) => (JoinType::Left, c),
            sql_ast::JoinOperator::RightOuter(c) => (JoinType::Right, c),
            sql_ast::JoinOperator::FullOuter(_) => {
                return Err(NexusError::not_supported("FULL OUTER JOIN"))
            }
            sql_ast::JoinOperator::CrossJoin => return Err(NexusError::not_supported("CROSS JOIN")),
            other => return Err(NexusError::not_supported(format!("join {:?}", other))),
        };
        match constraint {
            sql_ast::JoinConstraint::On(expr) => Ok((join_type, Expr::from_sql_ast(expr)?)),
            sql_ast::JoinConstraint::Using(_) => Err(NexusError::not_supported("JOIN ... USING")),
            sql_ast::JoinConstraint::Natural => Err(NexusError::not_supported("NATURAL JOIN")),
            sql_ast::JoinConstraint::None => Err(NexusError::query("JOIN requires an ON condition")),
        }
    }
}

impl fmt::Display for JoinType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JoinType::Inner => write!(f, "INNER JOIN"),
            JoinType::Left => write!(f, "LEFT JOIN"),
            JoinType::Right => write!(f, "RIGHT JOIN"),
        }
    }
}

/// One `ORDER BY` (or index column) entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderByExpr {
    /// Sort expression.
    pub expr: Expr,
    /// `DESC` was specified.
    pub descending: bool,
    /// Explicit `NULLS FIRST` (true) or `NULLS LAST` (false).
    pub nulls_first: Option<bool>,
}

impl OrderByExpr {
    /// Ascending ordering on an expression.
    pub fn asc(expr: Expr) -> Self {
        Self {
            expr,
            descending: false,
            nulls_first: None,
        }
    }

    /// Converts from sqlparser's OrderByExpr.
    pub fn from_sql_ast(item: sql_ast::OrderByExpr) -> NexusResult<Self> {
        Ok(Self {
            expr: Expr::from_sql_ast(item.expr)?,
            descending: item.asc == Some(false),
            nulls_first: item.nulls_first,
        })
    }

    /// Whether nulls come last for this entry.
    pub fn nulls_last(&self) -> bool {
        self.nulls_first == Some(false)
    }
}

impl fmt::Display for OrderByExpr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.expr)?;
        if self.descending {
            write!(f, " DESC")?;
        }
        match self.nulls_first {
            Some(true) => write!(f, " NULLS FIRST"),
            Some(false) => write!(f, " NULLS LAST"),
            None => Ok(()),
        }
    }
}
