//! Typed expressions.
//!
//! An [`Expression`] is the bound, type-checked form of a parsed
//! [`Expr`](crate::parser::Expr). Column references are resolved to
//! positions in the row produced by a selection, operands are coerced to a
//! common type when the expression is built, and any sub-tree whose inputs
//! are all constants is folded on the spot.
//!
//! Every expression carries a structural hash. Column hashes derive from
//! the owning table and the column name, so the same column reached through
//! different aliases or positions hashes identically; indexes and group-by
//! keys are matched by this hash.

mod eval;
mod functions;

use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use nexus_common::{NexusError, NexusResult};
use siphasher::sip::SipHasher13;

use crate::parser::BinaryOperator;
use crate::types::{DataType, Value};

pub use eval::{like_match, like_prefix};
pub use functions::{Accumulator, AggregateFunction, ScalarFunction};

const EXPR_HASH_KEYS: (u64, u64) = (0x6e65_7875_735f_6578, 0x7072_5f68_6173_6800);

/// Comparison operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CompareOp {
    /// `=`
    Eq,
    /// `<>`
    NotEq,
    /// `<`
    Lt,
    /// `<=`
    LtEq,
    /// `>`
    Gt,
    /// `>=`
    GtEq,
}

impl CompareOp {
    /// Maps a parsed operator, if it is a comparison.
    pub fn from_operator(op: BinaryOperator) -> Option<Self> {
        match op {
            BinaryOperator::Eq => Some(CompareOp::Eq),
            BinaryOperator::NotEq => Some(CompareOp::NotEq),
            BinaryOperator::Lt => Some(CompareOp::Lt),
            BinaryOperator::LtEq => Some(CompareOp::LtEq),
            BinaryOperator::Gt => Some(CompareOp::Gt),
            BinaryOperator::GtEq => Some(CompareOp::GtEq),
            _ => None,
        }
    }

    /// The operator with its operands swapped: `a < b` is `b > a`.
    pub fn flip(self) -> Self {
        match self {
            CompareOp::Lt => CompareOp::Gt,
            CompareOp::LtEq => CompareOp::GtEq,
            CompareOp::Gt => CompareOp::Lt,
            CompareOp::GtEq => CompareOp::LtEq,
            other => other,
        }
    }

    /// Applies the comparison to two non-null values of type `ty`.
    pub fn holds(self, ty: &DataType, a: &Value, b: &Value) -> bool {
        use std::cmp::Ordering::*;
        match self {
            CompareOp::Eq => ty.equals(a, b),
            CompareOp::NotEq => !ty.equals(a, b),
            CompareOp::Lt => ty.compare(a, b) == Less,
            CompareOp::LtEq => ty.compare(a, b) != Greater,
            CompareOp::Gt => ty.compare(a, b) == Greater,
            CompareOp::GtEq => ty.compare(a, b) != Less,
        }
    }

    fn symbol(self) -> &'static str {
        match self {
            CompareOp::Eq => "=",
            CompareOp::NotEq => "<>",
            CompareOp::Lt => "<",
            CompareOp::LtEq => "<=",
            CompareOp::Gt => ">",
            CompareOp::GtEq => ">=",
        }
    }
}

impl fmt::Display for CompareOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.symbol())
    }
}

/// Arithmetic operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ArithmeticOp {
    /// `+`
    Add,
    /// `-`
    Subtract,
    /// `*`
    Multiply,
    /// `/`
    Divide,
    /// `%`
    Modulo,
}

impl ArithmeticOp {
    /// Maps a parsed operator, if it is arithmetic.
    pub fn from_operator(op: BinaryOperator) -> Option<Self> {
        match op {
            BinaryOperator::Plus => Some(ArithmeticOp::Add),
            BinaryOperator::Minus => Some(ArithmeticOp::Subtract),
            BinaryOperator::Multiply => Some(ArithmeticOp::Multiply),
            BinaryOperator::Divide => Some(ArithmeticOp::Divide),
            BinaryOperator::Modulo => Some(ArithmeticOp::Modulo),
            _ => None,
        }
    }
}

impl fmt::Display for ArithmeticOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ArithmeticOp::Add => "+",
            ArithmeticOp::Subtract => "-",
            ArithmeticOp::Multiply => "*",
            ArithmeticOp::Divide => "/",
            ArithmeticOp::Modulo => "%",
        })
    }
}

/// The node of an expression tree.
#[allow(missing_docs)]
#[derive(Debug)]
pub enum ExprKind {
    /// A constant value.
    Constant(Value),
    /// The value at a position of the input row.
    Column(usize),
    /// Comparison; both operands share a type.
    Compare {
        op: CompareOp,
        left: Expression,
        right: Expression,
    },
    /// Arithmetic; both operands share a numeric type.
    Arithmetic {
        op: ArithmeticOp,
        left: Expression,
        right: Expression,
    },
    /// Three-valued `AND`.
    And(Expression, Expression),
    /// Three-valued `OR`.
    Or(Expression, Expression),
    /// Three-valued `NOT`.
    Not(Expression),
    /// Unary minus.
    Negate(Expression),
    /// `IS [NOT] NULL`.
    IsNull { expr: Expression, negated: bool },
    /// `[NOT] BETWEEN`.
    Between {
        expr: Expression,
        low: Expression,
        high: Expression,
        negated: bool,
    },
    /// `[NOT] IN (...)`.
    InList {
        expr: Expression,
        list: Vec<Expression>,
        negated: bool,
    },
    /// `[NOT] LIKE` and `[NOT] ILIKE`.
    Like {
        expr: Expression,
        pattern: Expression,
        case_insensitive: bool,
        negated: bool,
    },
    /// `expr op ANY(array)`.
    Any {
        op: CompareOp,
        expr: Expression,
        array: Expression,
    },
    /// Conversion to another type, implicit or explicit.
    Convert { expr: Expression, to: DataType },
    /// Text concatenation.
    Concat(Expression, Expression),
    /// `->` and `->>`.
    JsonMember {
        json: Expression,
        key: Expression,
        as_text: bool,
    },
    /// `@>`.
    JsonContains(Expression, Expression),
    /// `array[i][j]`, 1-based.
    Subscript {
        array: Expression,
        indexes: Vec<Expression>,
    },
    /// `ARRAY[...]`.
    Array(Vec<Expression>),
    /// Scalar function call.
    Function {
        func: ScalarFunction,
        args: Vec<Expression>,
    },
}

impl ExprKind {
    /// Direct sub-expressions, left to right.
    pub fn children(&self) -> Vec<&Expression> {
        match self {
            ExprKind::Constant(_) | ExprKind::Column(_) => Vec::new(),
            ExprKind::Compare { left, right, .. }
            | ExprKind::Arithmetic { left, right, .. }
            | ExprKind::And(left, right)
            | ExprKind::Or(left, right)
            | ExprKind::Concat(left, right)
            | ExprKind::JsonContains(left, right) => vec![left, right],
            ExprKind::Not(expr)
            | ExprKind::Negate(expr)
            | ExprKind::IsNull { expr, .. }
            | ExprKind::Convert { expr, .. } => vec![expr],
            ExprKind::Between {
                expr, low, high, ..
            } => vec![expr, low, high],
            ExprKind::InList { expr, list, .. } => {
                std::iter::once(expr).chain(list.iter()).collect()
            }
            ExprKind::Like { expr, pattern, .. } => vec![expr, pattern],
            ExprKind::Any { expr, array, .. } => vec![expr, array],
            ExprKind::JsonMember { json, key, .. } => vec![json, key],
            ExprKind::Subscript { array, indexes } => {
                std::iter::once(array).chain(indexes.iter()).collect()
            }
            ExprKind::Array(items) | ExprKind::Function { args: items, .. } => {
                items.iter().collect()
            }
        }
    }

    /// Rebuilds this node with every child replaced by `f(child)`.
    fn map_children(&self, f: &mut dyn FnMut(&Expression) -> Expression) -> ExprKind {
        fn all(
            items: &[Expression],
            f: &mut dyn FnMut(&Expression) -> Expression,
        ) -> Vec<Expression> {
            items.iter().map(|e| f(e)).collect()
        }
        match self {
            ExprKind::Constant(v) => ExprKind::Constant(v.clone()),
            ExprKind::Column(i) => ExprKind::Column(*i),
            ExprKind::Compare { op, left, right } => ExprKind::Compare {
                op: *op,
                left: f(left),
                right: f(right),
            },
            ExprKind::Arithmetic { op, left, right } => ExprKind::Arithmetic {
                op: *op,
                left: f(left),
                right: f(right),
            },
            ExprKind::And(l, r) => ExprKind::And(f(l), f(r)),
            ExprKind::Or(l, r) => ExprKind::Or(f(l), f(r)),
            ExprKind::Not(e) => ExprKind::Not(f(e)),
            ExprKind::Negate(e) => ExprKind::Negate(f(e)),
            ExprKind::IsNull { expr, negated } => ExprKind::IsNull {
                expr: f(expr),
                negated: *negated,
            },
            ExprKind::Between {
                expr,
                low,
                high,
                negated,
            } => ExprKind::Between {
                expr: f(expr),
                low: f(low),
                high: f(high),
                negated: *negated,
            },
            ExprKind::InList {
                expr,
                list,
                negated,
            } => ExprKind::InList {
                expr: f(expr),
                list: all(list, f),
                negated: *negated,
            },
            ExprKind::Like {
                expr,
                pattern,
                case_insensitive,
                negated,
            } => ExprKind::Like {
                expr: f(expr),
                pattern: f(pattern),
                case_insensitive: *case_insensitive,
                negated: *negated,
            },
            ExprKind::Any { op, expr, array } => ExprKind::Any {
                op: *op,
                expr: f(expr),
                array: f(array),
            },
            ExprKind::Convert { expr, to } => ExprKind::Convert {
                expr: f(expr),
                to: to.clone(),
            },
            ExprKind::Concat(l, r) => ExprKind::Concat(f(l), f(r)),
            ExprKind::JsonMember { json, key, as_text } => ExprKind::JsonMember {
                json: f(json),
                key: f(key),
                as_text: *as_text,
            },
            ExprKind::JsonContains(l, r) => ExprKind::JsonContains(f(l), f(r)),
            ExprKind::Subscript { array, indexes } => ExprKind::Subscript {
                array: f(array),
                indexes: all(indexes, f),
            },
            ExprKind::Array(items) => ExprKind::Array(all(items, f)),
            ExprKind::Function { func, args } => ExprKind::Function {
                func: *func,
                args: all(args, f),
            },
        }
    }

    fn is_foldable(&self) -> bool {
        match self {
            ExprKind::Constant(_) | ExprKind::Column(_) => false,
            ExprKind::Function { func, .. } if func.is_volatile() => false,
            other => other.children().iter().all(|c| c.is_constant()),
        }
    }

    fn structural_hash(&self, data_type: &DataType) -> u64 {
        let mut hasher = SipHasher13::new_with_keys(EXPR_HASH_KEYS.0, EXPR_HASH_KEYS.1);
        std::mem::discriminant(self).hash(&mut hasher);
        data_type.hash(&mut hasher);
        match self {
            ExprKind::Constant(v) => v.hash(&mut hasher),
            ExprKind::Column(i) => i.hash(&mut hasher),
            ExprKind::Compare { op, .. } | ExprKind::Any { op, .. } => op.hash(&mut hasher),
            ExprKind::Arithmetic { op, .. } => op.hash(&mut hasher),
            ExprKind::IsNull { negated, .. }
            | ExprKind::Between { negated, .. }
            | ExprKind::InList { negated, .. } => negated.hash(&mut hasher),
            ExprKind::Like {
                case_insensitive,
                negated,
                ..
            } => (case_insensitive, negated).hash(&mut hasher),
            ExprKind::JsonMember { as_text, .. } => as_text.hash(&mut hasher),
            ExprKind::Function { func, .. } => func.hash(&mut hasher),
            _ => {}
        }
        for child in self.children() {
            hasher.write_u64(child.hash);
        }
        hasher.finish()
    }
}

/// A bound, typed expression.
///
/// Cloning is cheap: the tree itself is shared.
#[derive(Debug, Clone)]
pub struct Expression {
    data_type: DataType,
    id: Option<String>,
    qualifier: Option<String>,
    sql: String,
    hash: u64,
    kind: Arc<ExprKind>,
}

impl Expression {
    fn build(kind: ExprKind, data_type: DataType, sql: String) -> NexusResult<Self> {
        let hash = kind.structural_hash(&data_type);
        let expr = Self {
            data_type,
            id: None,
            qualifier: None,
            sql,
            hash,
            kind: Arc::new(kind),
        };
        if expr.kind.is_foldable() {
            let value = expr.eval(&[])?;
            return Ok(Self {
                kind: Arc::new(ExprKind::Constant(value)),
                ..expr
            });
        }
        Ok(expr)
    }

    // ---------------------------------------------------------------------
    // Accessors
    // ---------------------------------------------------------------------

    /// The node.
    pub fn kind(&self) -> &ExprKind {
        &self.kind
    }

    /// Result type.
    pub fn data_type(&self) -> &DataType {
        &self.data_type
    }

    /// Output name, for columns and aliased expressions.
    pub fn id(&self) -> Option<&str> {
        self.id.as_deref()
    }

    /// Table alias a column was reached through.
    pub fn qualifier(&self) -> Option<&str> {
        self.qualifier.as_deref()
    }

    /// SQL text the expression was built from.
    pub fn sql(&self) -> &str {
        &self.sql
    }

    /// Structural hash.
    pub fn hash(&self) -> u64 {
        self.hash
    }

    /// Returns the same expression under another output name.
    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    /// Returns the same expression reached through another alias.
    pub fn with_qualifier(mut self, qualifier: Option<String>) -> Self {
        self.qualifier = qualifier;
        self
    }

    /// Whether the expression folded to a constant.
    pub fn is_constant(&self) -> bool {
        matches!(*self.kind, ExprKind::Constant(_))
    }

    /// The folded value, if constant.
    pub fn as_constant(&self) -> Option<&Value> {
        match &*self.kind {
            ExprKind::Constant(v) => Some(v),
            _ => None,
        }
    }

    /// Row position, if this is a bare column.
    pub fn column_index(&self) -> Option<usize> {
        match &*self.kind {
            ExprKind::Column(i) => Some(*i),
            _ => None,
        }
    }

    /// Sorted, de-duplicated positions of every column referenced.
    pub fn referenced_columns(&self) -> Vec<usize> {
        fn walk(expr: &Expression, out: &mut Vec<usize>) {
            if let ExprKind::Column(i) = &*expr.kind {
                out.push(*i);
            }
            for child in expr.kind.children() {
                walk(child, out);
            }
        }
        let mut out = Vec::new();
        walk(self, &mut out);
        out.sort_unstable();
        out.dedup();
        out
    }

    /// Whether two expressions compute the same thing over the same row.
    pub fn same_as(&self, other: &Expression) -> bool {
        self.hash == other.hash && self.referenced_columns() == other.referenced_columns()
    }

    /// Rewrites column positions through `f`, keeping hashes and names.
    pub fn map_columns(&self, f: &dyn Fn(usize) -> usize) -> Expression {
        let kind = match &*self.kind {
            ExprKind::Column(i) => ExprKind::Column(f(*i)),
            other => other.map_children(&mut |child| child.map_columns(f)),
        };
        Expression {
            kind: Arc::new(kind),
            ..self.clone()
        }
    }

    /// Substitutes `replacements[i]` for every reference to column `i`.
    pub fn replace_columns(&self, replacements: &[Expression]) -> Expression {
        match &*self.kind {
            ExprKind::Column(i) => replacements.get(*i).cloned().unwrap_or_else(|| self.clone()),
            other => Expression {
                kind: Arc::new(other.map_children(&mut |child| child.replace_columns(replacements))),
                ..self.clone()
            },
        }
    }

    /// Shifts every column position by `offset`.
    pub fn shifted(&self, offset: usize) -> Expression {
        if offset == 0 {
            return self.clone();
        }
        self.map_columns(&|i| i + offset)
    }

    /// Evaluates the expression and tests for `true`.
    pub fn eval_bool(&self, row: &[Value]) -> NexusResult<bool> {
        Ok(matches!(self.eval(row)?, Value::Bool(true)))
    }

    // ---------------------------------------------------------------------
    // Leaves
    // ---------------------------------------------------------------------

    /// A constant of the value's own type.
    pub fn constant(value: Value) -> Self {
        let data_type = value.data_type();
        Self::typed_constant(value, data_type)
    }

    /// A constant with an explicit type.
    pub fn typed_constant(value: Value, data_type: DataType) -> Self {
        let sql = match &value {
            Value::Null => "NULL".to_string(),
            Value::Int(_) | Value::Float(_) | Value::Bool(_) => value.to_string(),
            Value::Text(s) => format!("'{}'", s.replace('\'', "''")),
            other => format!("'{}'", other),
        };
        let kind = ExprKind::Constant(value);
        let hash = kind.structural_hash(&data_type);
        Self {
            data_type,
            id: None,
            qualifier: None,
            sql,
            hash,
            kind: Arc::new(kind),
        }
    }

    /// A column at `index` with an explicit hash.
    pub fn column(index: usize, data_type: DataType, name: &str, hash: u64) -> Self {
        Self {
            data_type,
            id: Some(name.to_string()),
            qualifier: None,
            sql: name.to_string(),
            hash,
            kind: Arc::new(ExprKind::Column(index)),
        }
    }

    /// A column at `index` computing what `source` computes.
    pub fn output_column(index: usize, source: &Expression, name: &str) -> Self {
        Self {
            data_type: source.data_type.clone(),
            id: Some(name.to_string()),
            qualifier: None,
            sql: name.to_string(),
            hash: source.hash,
            kind: Arc::new(ExprKind::Column(index)),
        }
    }

    /// Hash of a stored table column.
    pub fn column_hash(table_id: u64, name: &str) -> u64 {
        let mut hasher = SipHasher13::new_with_keys(EXPR_HASH_KEYS.0, EXPR_HASH_KEYS.1);
        hasher.write(b"column");
        hasher.write_u64(table_id);
        hasher.write(name.to_lowercase().as_bytes());
        hasher.finish()
    }

    /// Hash of an aggregate call's result column.
    pub fn aggregate_hash(name: &str, distinct: bool, arg: Option<&Expression>) -> u64 {
        let mut hasher = SipHasher13::new_with_keys(EXPR_HASH_KEYS.0, EXPR_HASH_KEYS.1);
        hasher.write(b"aggregate");
        hasher.write(name.as_bytes());
        hasher.write_u8(u8::from(distinct));
        if let Some(arg) = arg {
            hasher.write_u64(arg.hash);
        }
        hasher.finish()
    }

    // ---------------------------------------------------------------------
    // Conversions
    // ---------------------------------------------------------------------

    /// Implicit conversion to `to`.
    pub fn convert(self, to: &DataType) -> NexusResult<Self> {
        if self.data_type.same_kind(to) {
            return Ok(self);
        }
        if !self.data_type.can_convert(to) {
            return Err(NexusError::cast(&self.data_type, to));
        }
        self.wrap_convert(to)
    }

    /// Explicit `CAST` to `to`.
    pub fn cast(self, to: &DataType) -> NexusResult<Self> {
        if self.data_type == *to {
            return Ok(self);
        }
        if !self.data_type.can_cast(to) {
            return Err(NexusError::cast(&self.data_type, to));
        }
        let sql = format!("{}::{}", self.sql, to);
        let id = self.id.clone();
        let converted = self.wrap_convert(to)?;
        Ok(Self {
            sql,
            id,
            ..converted
        })
    }

    fn wrap_convert(self, to: &DataType) -> NexusResult<Self> {
        let sql = self.sql.clone();
        let id = self.id.clone();
        let converted = Self::build(
            ExprKind::Convert {
                expr: self,
                to: to.clone(),
            },
            to.clone(),
            sql,
        )?;
        Ok(Self { id, ..converted })
    }

    /// Brings two operands to a common type.
    fn unify(left: Self, right: Self) -> NexusResult<(Self, Self)> {
        let ty = DataType::unify(&left.data_type, &right.data_type)?;
        Ok((left.convert(&ty)?, right.convert(&ty)?))
    }

    // ---------------------------------------------------------------------
    // Operators
    // ---------------------------------------------------------------------

    /// `left op right`.
    pub fn compare(op: CompareOp, left: Self, right: Self) -> NexusResult<Self> {
        let sql = format!("{} {} {}", left.sql, op, right.sql);
        let (left, right) = Self::unify(left, right)?;
        Self::build(ExprKind::Compare { op, left, right }, DataType::Bool, sql)
    }

    /// `left op right` over numbers.
    pub fn arithmetic(op: ArithmeticOp, left: Self, right: Self) -> NexusResult<Self> {
        let sql = format!("{} {} {}", left.sql, op, right.sql);
        let no_operator = |l: &DataType, r: &DataType| {
            NexusError::query(format!("operator does not exist: {} {} {}", l, op, r))
        };
        let ty = DataType::unify(&left.data_type, &right.data_type)
            .map_err(|_| no_operator(&left.data_type, &right.data_type))?;
        if !(ty.is_numeric() || ty == DataType::Null) {
            return Err(no_operator(&left.data_type, &right.data_type));
        }
        let (left, right) = (left.convert(&ty)?, right.convert(&ty)?);
        Self::build(ExprKind::Arithmetic { op, left, right }, ty, sql)
    }

    /// `left AND right`.
    pub fn and(left: Self, right: Self) -> NexusResult<Self> {
        let sql = format!("{} AND {}", left.sql, right.sql);
        let left = left.convert(&DataType::Bool)?;
        let right = right.convert(&DataType::Bool)?;
        Self::build(ExprKind::And(left, right), DataType::Bool, sql)
    }

    /// `left OR right`.
    pub fn or(left: Self, right: Self) -> NexusResult<Self> {
        let sql = format!("{} OR {}", left.sql, right.sql);
        let left = left.convert(&DataType::Bool)?;
        let right = right.convert(&DataType::Bool)?;
        Self::build(ExprKind::Or(left, right), DataType::Bool, sql)
    }

    /// `NOT expr`.
    pub fn not(expr: Self) -> NexusResult<Self> {
        let sql = format!("NOT {}", expr.sql);
        let expr = expr.convert(&DataType::Bool)?;
        Self::build(ExprKind::Not(expr), DataType::Bool, sql)
    }

    /// `-expr`.
    pub fn negate(expr: Self) -> NexusResult<Self> {
        let sql = format!("-{}", expr.sql);
        let ty = match &expr.data_type {
            DataType::Null | DataType::Int => DataType::Int,
            DataType::Float => DataType::Float,
            other => {
                return Err(NexusError::query(format!(
                    "operator does not exist: - {}",
                    other
                )))
            }
        };
        let expr = expr.convert(&ty)?;
        Self::build(ExprKind::Negate(expr), ty, sql)
    }

    /// `expr IS [NOT] NULL`.
    pub fn is_null(expr: Self, negated: bool) -> NexusResult<Self> {
        let sql = format!(
            "{} IS {}NULL",
            expr.sql,
            if negated { "NOT " } else { "" }
        );
        Self::build(ExprKind::IsNull { expr, negated }, DataType::Bool, sql)
    }

    /// `expr [NOT] BETWEEN low AND high`.
    pub fn between(expr: Self, low: Self, high: Self, negated: bool) -> NexusResult<Self> {
        let sql = format!(
            "{} {}BETWEEN {} AND {}",
            expr.sql,
            if negated { "NOT " } else { "" },
            low.sql,
            high.sql
        );
        let ty = DataType::unify(&expr.data_type, &low.data_type)?;
        let ty = DataType::unify(&ty, &high.data_type)?;
        Self::build(
            ExprKind::Between {
                expr: expr.convert(&ty)?,
                low: low.convert(&ty)?,
                high: high.convert(&ty)?,
                negated,
            },
            DataType::Bool,
            sql,
        )
    }

    /// `expr [NOT] IN (list)`.
    pub fn in_list(expr: Self, list: Vec<Self>, negated: bool) -> NexusResult<Self> {
        let items: Vec<_> = list.iter().map(|e| e.sql.as_str()).collect();
        let sql = format!(
            "{} {}IN ({})",
            expr.sql,
            if negated { "NOT " } else { "" },
            items.join(", ")
        );
        let mut ty = expr.data_type.clone();
        for item in &list {
            ty = DataType::unify(&ty, &item.data_type)?;
        }
        let list = list
            .into_iter()
            .map(|e| e.convert(&ty))
            .collect::<NexusResult<Vec<_>>>()?;
        Self::build(
            ExprKind::InList {
                expr: expr.convert(&ty)?,
                list,
                negated,
            },
            DataType::Bool,
            sql,
        )
    }

    /// `expr [NOT] [I]LIKE pattern`.
    pub fn like(
        expr: Self,
        pattern: Self,
        case_insensitive: bool,
        negated: bool,
    ) -> NexusResult<Self> {
        let sql = format!(
            "{} {}{} {}",
            expr.sql,
            if negated { "NOT " } else { "" },
            if case_insensitive { "ILIKE" } else { "LIKE" },
            pattern.sql
        );
        Self::build(
            ExprKind::Like {
                expr: expr.convert(&DataType::text())?,
                pattern: pattern.convert(&DataType::text())?,
                case_insensitive,
                negated,
            },
            DataType::Bool,
            sql,
        )
    }

    /// `expr op ANY(array)`.
    ///
    /// A text operand is parsed as an array literal of the left type.
    pub fn any(op: CompareOp, expr: Self, array: Self) -> NexusResult<Self> {
        let sql = format!("{} {} ANY({})", expr.sql, op, array.sql);
        let (expr, array) = match array.data_type.clone() {
            DataType::Array(element) => {
                let ty = DataType::unify(&expr.data_type, &element)?;
                let array = array.convert(&DataType::array_of(ty.clone()))?;
                (expr.convert(&ty)?, array)
            }
            DataType::Text(_) | DataType::Null => {
                let array_type = DataType::array_of(expr.data_type.clone());
                (expr, array.convert(&array_type)?)
            }
            other => {
                return Err(NexusError::query(format!(
                    "op ANY/ALL (array) requires array on right side, got {}",
                    other
                )))
            }
        };
        Self::build(ExprKind::Any { op, expr, array }, DataType::Bool, sql)
    }

    /// `left || right`.
    pub fn concat(left: Self, right: Self) -> NexusResult<Self> {
        let sql = format!("{} || {}", left.sql, right.sql);
        let left = left.cast(&DataType::text())?;
        let right = right.cast(&DataType::text())?;
        Self::build(ExprKind::Concat(left, right), DataType::text(), sql)
    }

    /// `json -> key` or `json ->> key`.
    pub fn json_member(json: Self, key: Self, as_text: bool) -> NexusResult<Self> {
        let sql = format!(
            "{}{}{}",
            json.sql,
            if as_text { "->>" } else { "->" },
            key.sql
        );
        let json = match &json.data_type {
            DataType::Json | DataType::Jsonb => json,
            _ => json.convert(&DataType::Jsonb)?,
        };
        let key = match &key.data_type {
            DataType::Int | DataType::Text(_) => key,
            DataType::Null => key.convert(&DataType::text())?,
            other => {
                return Err(NexusError::query(format!(
                    "operator does not exist: {} -> {}",
                    json.data_type, other
                )))
            }
        };
        let ty = if as_text {
            DataType::text()
        } else {
            json.data_type.clone()
        };
        Self::build(ExprKind::JsonMember { json, key, as_text }, ty, sql)
    }

    /// `left @> right` over JSON documents.
    pub fn json_contains(left: Self, right: Self) -> NexusResult<Self> {
        let sql = format!("{} @> {}", left.sql, right.sql);
        let left = left.convert(&DataType::Jsonb)?;
        let right = right.convert(&DataType::Jsonb)?;
        Self::build(ExprKind::JsonContains(left, right), DataType::Bool, sql)
    }

    /// `array[i]...`.
    pub fn subscript(array: Self, indexes: Vec<Self>) -> NexusResult<Self> {
        let rendered: String = indexes.iter().map(|i| format!("[{}]", i.sql)).collect();
        let sql = format!("{}{}", array.sql, rendered);
        if array.data_type.element_type().is_none() {
            return Err(NexusError::query(format!(
                "cannot subscript type {} because it is not an array",
                array.data_type
            )));
        }
        let mut ty = array.data_type.clone();
        for _ in 0..indexes.len() {
            match ty.element_type() {
                Some(element) => ty = element.clone(),
                None => break,
            }
        }
        let indexes = indexes
            .into_iter()
            .map(|i| i.convert(&DataType::Int))
            .collect::<NexusResult<Vec<_>>>()?;
        Self::build(ExprKind::Subscript { array, indexes }, ty, sql)
    }

    /// `ARRAY[items]`.
    pub fn array(items: Vec<Self>) -> NexusResult<Self> {
        let rendered: Vec<_> = items.iter().map(|e| e.sql.as_str()).collect();
        let sql = format!("ARRAY[{}]", rendered.join(", "));
        let mut element = DataType::Null;
        for item in &items {
            element = if element == DataType::Null {
                item.data_type.clone()
            } else {
                DataType::unify(&element, &item.data_type)?
            };
        }
        let items = items
            .into_iter()
            .map(|e| e.convert(&element))
            .collect::<NexusResult<Vec<_>>>()?;
        Self::build(ExprKind::Array(items), DataType::array_of(element), sql)
    }

    /// Scalar function call by name.
    pub fn function(name: &str, args: Vec<Self>) -> NexusResult<Self> {
        let rendered: Vec<_> = args.iter().map(|e| e.sql.as_str()).collect();
        let sql = format!("{}({})", name, rendered.join(", "));
        let (func, args, ty) = ScalarFunction::resolve(name, args)?;
        let expr = Self::build(ExprKind::Function { func, args }, ty, sql)?;
        Ok(expr.with_id(func.name()))
    }
}

impl fmt::Display for Expression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.sql)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn int(i: i64) -> Expression {
        Expression::constant(Value::Int(i))
    }

    fn text(s: &str) -> Expression {
        Expression::constant(Value::from(s))
    }

    fn col(i: usize, ty: DataType, name: &str) -> Expression {
        Expression::column(i, ty, name, Expression::column_hash(1, name))
    }

    #[test]
    fn test_constant_folding() {
        let sum = Expression::arithmetic(ArithmeticOp::Add, int(1), int(2)).unwrap();
        assert_eq!(sum.as_constant(), Some(&Value::Int(3)));
        assert_eq!(sum.sql(), "1 + 2");

        let now = Expression::function("now", vec![]).unwrap();
        assert!(!now.is_constant());
    }

    #[test]
    fn test_text_constant_converts_to_column_type() {
        let cmp = Expression::compare(CompareOp::Eq, col(0, DataType::Int, "id"), text("5")).unwrap();
        match cmp.kind() {
            ExprKind::Compare { right, .. } => {
                assert_eq!(right.as_constant(), Some(&Value::Int(5)));
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_incompatible_operands() {
        let err = Expression::compare(
            CompareOp::Eq,
            Expression::constant(Value::Bool(true)),
            Expression::constant(Value::Date(chrono::NaiveDate::default())),
        )
        .unwrap_err();
        assert_eq!(err.kind(), nexus_common::ErrorKind::Cast);

        let err = Expression::arithmetic(ArithmeticOp::Add, col(0, DataType::Bool, "b"), int(1))
            .unwrap_err();
        assert!(err.to_string().contains("operator does not exist"));
    }

    #[test]
    fn test_column_hash_ignores_position_and_case() {
        let a = col(0, DataType::Int, "id");
        let b = col(3, DataType::Int, "ID");
        assert_eq!(a.hash(), b.hash());
        assert!(!a.same_as(&b));
        assert_eq!(a.shifted(3).column_index(), Some(3));
        assert!(a.shifted(3).same_as(&b));
    }

    #[test]
    fn test_referenced_columns() {
        let expr = Expression::and(
            Expression::compare(CompareOp::Gt, col(2, DataType::Int, "a"), int(1)).unwrap(),
            Expression::compare(CompareOp::Lt, col(0, DataType::Int, "b"), col(2, DataType::Int, "a"))
                .unwrap(),
        )
        .unwrap();
        assert_eq!(expr.referenced_columns(), vec![0, 2]);
    }

    #[test]
    fn test_subscript_requires_array() {
        assert!(Expression::subscript(int(1), vec![int(1)]).is_err());
        let arr = Expression::array(vec![int(1), int(2)]).unwrap();
        let first = Expression::subscript(arr, vec![int(1)]).unwrap();
        assert_eq!(first.as_constant(), Some(&Value::Int(1)));
        assert_eq!(first.data_type(), &DataType::Int);
    }
}
